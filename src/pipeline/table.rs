//! Table structurer: make every parsed table rectangular and header-marked.
//!
//! Markdown tables from OCR are assumed to encode the visual first row as a
//! header, so row 0 is always the header row. Tables with no true header
//! therefore get a degenerate, but still marked, header row.

use crate::model::{CellKind, TableBlock, TableCell};

/// Normalise a table in place.
///
/// - pads short rows with [`CellKind::Padding`] cells up to the widest row
/// - sets `header_row_index` to 0
/// - tags empty source cells that follow a populated cell on the same row
///   as [`CellKind::SpanContinuation`]
///
/// Running it twice changes nothing.
pub fn structure_table(table: &mut TableBlock) {
    let columns = table.column_count();
    table.header_row_index = 0;

    for row in &mut table.rows {
        tag_span_continuations(row);
        while row.len() < columns {
            row.push(TableCell {
                text: String::new(),
                kind: CellKind::Padding,
            });
        }
    }
}

fn tag_span_continuations(row: &mut [TableCell]) {
    let mut after_populated = false;
    for cell in row.iter_mut() {
        match cell.kind {
            CellKind::Padding => return,
            _ if !cell.text.trim().is_empty() => {
                cell.kind = CellKind::Content;
                after_populated = true;
            }
            _ if after_populated => cell.kind = CellKind::SpanContinuation,
            _ => {}
        }
    }
}

/// Horizontal span of the cell at `col`: 1 plus the number of
/// span-continuation cells that directly follow it.
pub fn span_width(row: &[TableCell], col: usize) -> usize {
    1 + row[col + 1..]
        .iter()
        .take_while(|c| c.kind == CellKind::SpanContinuation)
        .count()
}

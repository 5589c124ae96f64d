//! VLM interaction: describe one image through an `edgequake-llm` provider.
//!
//! [`VisionAltText`] is the production [`AltTextSynthesizer`]. The compiler
//! core is synchronous, so each call is driven to completion on a tokio
//! runtime: the one the synthesizer was created in, or a private
//! current-thread runtime when created outside any runtime.
//!
//! `describe` is safe to call from a plain thread, a `spawn_blocking` thread
//! or an async task: it picks the blocking strategy from the caller's
//! runtime context at call time.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors are transient under concurrent load. Exponential
//! backoff (`retry_backoff_ms * 2^attempt`) with 500 ms base and 3 retries
//! waits 500 ms → 1 s → 2 s. Each attempt is bounded by `timeout_secs`.

use crate::config::DEFAULT_ALT_MODEL;
use crate::error::Md2DocxError;
use crate::pipeline::alt_text::{AltTextRequest, AltTextSynthesizer, SynthesisError};
use crate::pipeline::encode::encode_image_file;
use crate::prompts::{alt_text_context, ALT_TEXT_RULES, DEFAULT_ALT_TEXT_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Tuning for alt-text requests.
#[derive(Debug, Clone)]
pub struct AltTextOptions {
    /// Provider name (`"mistral"`, `"openai"`, …). `None` = auto-detect.
    pub provider_name: Option<String>,
    /// Vision model. `None` = [`DEFAULT_ALT_MODEL`] for named providers.
    pub model: Option<String>,
    /// System prompt override.
    pub prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Per-attempt limit.
    pub timeout_secs: u64,
}

impl Default for AltTextOptions {
    fn default() -> Self {
        Self {
            provider_name: None,
            model: None,
            prompt: None,
            temperature: 0.2,
            max_tokens: 300,
            max_retries: 3,
            retry_backoff_ms: 500,
            timeout_secs: 60,
        }
    }
}

enum Bridge {
    Shared(Handle),
    Owned(Runtime),
}

/// Alt-text synthesizer backed by a vision LLM.
pub struct VisionAltText {
    provider: Arc<dyn LLMProvider>,
    options: AltTextOptions,
    bridge: Bridge,
}

impl fmt::Debug for VisionAltText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionAltText")
            .field("provider", &"<dyn LLMProvider>")
            .field("options", &self.options)
            .finish()
    }
}

impl VisionAltText {
    /// Wrap an already-configured provider.
    pub fn new(provider: Arc<dyn LLMProvider>, options: AltTextOptions) -> Result<Self, Md2DocxError> {
        let bridge = match Handle::try_current() {
            Ok(handle) => Bridge::Shared(handle),
            Err(_) => Bridge::Owned(
                current_thread_runtime()
                    .map_err(|e| Md2DocxError::Internal(format!("tokio runtime: {e}")))?,
            ),
        };
        Ok(Self {
            provider,
            options,
            bridge,
        })
    }

    /// Resolve the provider from `options` and the environment.
    pub fn from_env(options: AltTextOptions) -> Result<Self, Md2DocxError> {
        let provider = resolve_provider(options.provider_name.as_deref(), options.model.as_deref())?;
        Self::new(provider, options)
    }

    /// Describe one image, with retries.
    pub async fn describe_async(&self, request: &AltTextRequest) -> Result<String, SynthesisError> {
        let start = Instant::now();
        let image = encode_image_file(&request.path).map_err(|e| SynthesisError::Image {
            path: request.path.clone(),
            detail: e.to_string(),
        })?;

        let system_prompt = format!(
            "{}{}",
            self.options.prompt.as_deref().unwrap_or(DEFAULT_ALT_TEXT_PROMPT),
            ALT_TEXT_RULES
        );
        let user_text = alt_text_context(request.context.as_deref());
        let messages = vec![
            ChatMessage::system(&system_prompt),
            ChatMessage::user_with_images(&user_text, vec![image]),
        ];
        let options = build_options(&self.options);
        let per_attempt = Duration::from_secs(self.options.timeout_secs);

        let mut last_err: Option<SynthesisError> = None;
        for attempt in 0..=self.options.max_retries {
            if attempt > 0 {
                let backoff = self.options.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "Image '{}': retry {}/{} after {}ms",
                    request.src, attempt, self.options.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(per_attempt, self.provider.chat(&messages, Some(&options))).await {
                Ok(Ok(response)) => {
                    debug!(
                        "Image '{}': {} input tokens, {} output tokens, {:?}",
                        request.src,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(response.content);
                }
                Ok(Err(e)) => {
                    warn!("Image '{}': attempt {} failed — {}", request.src, attempt + 1, e);
                    last_err = Some(SynthesisError::ProviderFailed {
                        retries: self.options.max_retries,
                        detail: e.to_string(),
                    });
                }
                Err(_) => {
                    warn!("Image '{}': attempt {} timed out", request.src, attempt + 1);
                    last_err = Some(SynthesisError::Timeout {
                        secs: self.options.timeout_secs,
                    });
                }
            }
        }

        Err(last_err.unwrap_or(SynthesisError::Empty))
    }
}

impl AltTextSynthesizer for VisionAltText {
    fn describe(&self, request: &AltTextRequest) -> Result<String, SynthesisError> {
        drive(&self.bridge, || self.describe_async(request))
    }
}

impl Bridge {
    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        match self {
            Bridge::Shared(handle) => handle.block_on(fut),
            Bridge::Owned(runtime) => runtime.block_on(fut),
        }
    }
}

fn current_thread_runtime() -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

/// Run the future built by `make` to completion from synchronous code,
/// whatever runtime context the caller is in.
///
/// - no runtime context (plain thread): block on the bridge directly
/// - multi-thread runtime, worker or blocking-pool thread: `block_in_place`
/// - current-thread runtime: its only thread cannot be re-entered, so the
///   future runs on a scoped thread with a private runtime
fn drive<F>(bridge: &Bridge, make: impl Fn() -> F + Sync) -> Result<String, SynthesisError>
where
    F: Future<Output = Result<String, SynthesisError>>,
{
    match Handle::try_current().map(|h| h.runtime_flavor()) {
        Err(_) => bridge.block_on(make()),
        Ok(RuntimeFlavor::CurrentThread) => std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let runtime = current_thread_runtime().map_err(|e| SynthesisError::Runtime {
                        detail: e.to_string(),
                    })?;
                    runtime.block_on(make())
                })
                .join()
                .unwrap_or_else(|_| {
                    Err(SynthesisError::Runtime {
                        detail: "alt-text worker thread panicked".to_string(),
                    })
                })
        }),
        Ok(_) => tokio::task::block_in_place(|| bridge.block_on(make())),
    }
}

/// Build `CompletionOptions` from the alt-text options.
fn build_options(options: &AltTextOptions) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(options.temperature),
        max_tokens: Some(options.max_tokens),
        ..Default::default()
    }
}

fn create_vision_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Md2DocxError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Md2DocxError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Resolve the vision provider, from most-specific to least-specific:
///
/// 1. **Named provider** (`--provider`) with `model` or [`DEFAULT_ALT_MODEL`]
/// 2. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`
/// 3. **`MISTRAL_API_KEY`** → Mistral with the pixtral default
/// 4. **`OPENAI_API_KEY`** → OpenAI (`gpt-4.1-nano` unless `model` is set)
/// 5. **Full auto-detection** via [`ProviderFactory::from_env`]
pub fn resolve_provider(
    provider_name: Option<&str>,
    model: Option<&str>,
) -> Result<Arc<dyn LLMProvider>, Md2DocxError> {
    if let Some(name) = provider_name {
        return create_vision_provider(name, model.unwrap_or(DEFAULT_ALT_MODEL));
    }

    if let (Some(prov), Some(env_model)) = (
        non_empty_env("EDGEQUAKE_LLM_PROVIDER"),
        non_empty_env("EDGEQUAKE_MODEL"),
    ) {
        return create_vision_provider(&prov, model.unwrap_or(&env_model));
    }

    if non_empty_env("MISTRAL_API_KEY").is_some() {
        return create_vision_provider("mistral", model.unwrap_or(DEFAULT_ALT_MODEL));
    }

    if non_empty_env("OPENAI_API_KEY").is_some() {
        return create_vision_provider("openai", model.unwrap_or("gpt-4.1-nano"));
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Md2DocxError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision provider could be auto-detected from environment.\n\
                Set MISTRAL_API_KEY or OPENAI_API_KEY, or pass --no-auto-alt.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

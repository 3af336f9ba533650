//! Completion driver: prompt assembly and provider invocation.
//!
//! Builds the role-tagged message sequence from the system prompt, the
//! context window and the new input, then drives the provider in either
//! blocking or streaming mode. Provider failures come back as typed
//! errors; rendering them for a client is the transport's job.

use std::sync::Arc;
use std::time::Duration;

use parley_config::AppConfig;
use parley_core::error::ProviderError;
use parley_core::exchange::Exchange;
use parley_core::message::Message;
use parley_core::provider::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, Provider, ProviderRequest};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One element of a streamed reply.
#[derive(Debug, Clone)]
pub enum Fragment {
    /// A piece of assistant text, in emission order.
    Text(String),
    /// Terminal failure. Nothing follows it.
    Error(ProviderError),
}

impl Fragment {
    /// Client-facing text for this fragment.
    pub fn render(&self) -> String {
        match self {
            Fragment::Text(text) => text.clone(),
            Fragment::Error(e) => render_error(e),
        }
    }
}

/// The text shown to a client in place of a failed reply.
pub fn render_error(error: &ProviderError) -> String {
    format!("Error processing message: {error}")
}

/// Receiving half of a fragment stream.
pub type FragmentReceiver = mpsc::Receiver<Fragment>;

/// Build the prompt for `input`.
///
/// Exactly one system message, then for each exchange in `window` a user
/// message and (if present) an assistant message, then the new input.
pub fn build_messages(input: &str, window: &[Exchange], system_prompt: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(window.len() * 2 + 2);
    messages.push(Message::system(system_prompt));
    for exchange in window {
        messages.push(Message::user(exchange.input.as_str()));
        if let Some(response) = &exchange.response {
            messages.push(Message::assistant(response.as_str()));
        }
    }
    messages.push(Message::user(input));
    messages
}

/// Drives one provider with fixed sampling settings.
pub struct CompletionDriver {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    request_timeout: Duration,
    idle_timeout: Duration,
}

impl CompletionDriver {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            request_timeout: Duration::from_secs(120),
            idle_timeout: Duration::from_secs(60),
        }
    }

    pub fn from_config(provider: Arc<dyn Provider>, config: &AppConfig) -> Self {
        Self::new(provider, config.model.as_str())
            .with_temperature(config.llm.temperature)
            .with_max_tokens(config.llm.max_tokens)
            .with_request_timeout(Duration::from_secs(config.llm.request_timeout_secs))
            .with_idle_timeout(Duration::from_secs(config.llm.idle_timeout_secs))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Upper bound on a whole blocking completion.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Upper bound on each wait for the next streamed fragment.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, input: &str, window: &[Exchange], system_prompt: &str, stream: bool) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            messages: build_messages(input, window, system_prompt),
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
            stream,
        }
    }

    /// Blocking completion. No retries: the first provider error ends the
    /// attempt.
    pub async fn complete(
        &self,
        input: &str,
        window: &[Exchange],
        system_prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        let request = self.request(input, window, system_prompt, false);
        debug!(
            provider = %self.provider.name(),
            messages = request.messages.len(),
            "Requesting completion"
        );

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            result = tokio::time::timeout(self.request_timeout, self.provider.complete(request)) => {
                result.map_err(|_| {
                    ProviderError::Timeout(format!(
                        "no completion within {}s",
                        self.request_timeout.as_secs()
                    ))
                })?
            }
        };

        match response {
            Ok(response) => Ok(response.content),
            Err(e) => {
                warn!(provider = %self.provider.name(), error = %e, "Completion failed");
                Err(e)
            }
        }
    }

    /// Streaming completion.
    ///
    /// Every wait on the provider is bounded by the idle timeout and the
    /// cancellation token. The stream ends after the provider signals
    /// completion, or after exactly one [`Fragment::Error`].
    pub fn stream(
        &self,
        input: &str,
        window: &[Exchange],
        system_prompt: &str,
        cancel: CancellationToken,
    ) -> FragmentReceiver {
        let request = self.request(input, window, system_prompt, true);
        let provider = Arc::clone(&self.provider);
        let idle = self.idle_timeout;
        let (tx, rx) = mpsc::channel(32);

        debug!(
            provider = %provider.name(),
            messages = request.messages.len(),
            "Requesting stream"
        );

        tokio::spawn(async move {
            let idle_error = || ProviderError::Timeout(format!("no data for {}s", idle.as_secs()));

            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ProviderError::Cancelled),
                _ = tx.closed() => return,
                result = tokio::time::timeout(idle, provider.stream(request)) => {
                    result.unwrap_or_else(|_| Err(idle_error()))
                }
            };

            let mut chunks = match opened {
                Ok(chunks) => chunks,
                Err(e) => {
                    warn!(provider = %provider.name(), error = %e, "Stream failed to open");
                    let _ = tx.send(Fragment::Error(e)).await;
                    return;
                }
            };

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(ProviderError::Cancelled),
                    _ = tx.closed() => return,
                    result = tokio::time::timeout(idle, chunks.recv()) => {
                        result.map_err(|_| idle_error())
                    }
                };

                match next {
                    Ok(Some(Ok(chunk))) => {
                        if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
                            if tx.send(Fragment::Text(text)).await.is_err() {
                                return; // consumer dropped
                            }
                        }
                        if chunk.done {
                            return;
                        }
                    }
                    Ok(None) => return,
                    Ok(Some(Err(e))) | Err(e) => {
                        warn!(provider = %provider.name(), error = %e, "Stream ended with error");
                        let _ = tx.send(Fragment::Error(e)).await;
                        return;
                    }
                }
            }
        });

        rx
    }
}

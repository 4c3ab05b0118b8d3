//! Reply classification through a language model with quota-aware backoff

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::circuit_breaker::QuotaBreaker;
use crate::config::ClassifierConfig;
use crate::llm::{CompletionProvider, ProviderError};
use crate::models::ClassificationResult;
use crate::retry::RetryPolicy;

/// Labels the model is asked to choose from
pub const TAXONOMY: [&str; 4] = ["interested", "not interested", "more info", "default"];

/// Build the fixed system instruction sent with every request
pub fn build_system_prompt(signature: &str, disclaimer: &str) -> String {
    let labels = TAXONOMY
        .iter()
        .map(|l| format!("'{}'", l))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are an assistant that labels emails as {}. \
         Provide the label on the first line, followed by a response. \
         End the mail with 'Best Regards, {}'. Add '{}'",
        labels, signature, disclaimer
    )
}

fn build_user_prompt(content: &str) -> String {
    format!(
        "Label the following email and generate a response:\n\n{}",
        content
    )
}

/// Split model output into label (first line) and reply (remaining lines)
///
/// Returns None when fewer than two non-empty lines remain after trimming.
pub fn parse_model_output(output: &str) -> Option<ClassificationResult> {
    let lines: Vec<&str> = output.trim().lines().map(str::trim).collect();

    if lines.iter().filter(|l| !l.is_empty()).count() < 2 {
        return None;
    }

    let (label, rest) = lines.split_first()?;
    let reply_body = rest.join("\n").trim().to_string();

    Some(ClassificationResult::new(*label, reply_body))
}

/// Classifies messages and drafts replies
///
/// Never returns an error: provider failures and unusable output degrade to
/// [`ClassificationResult::fallback`], and a tripped breaker yields
/// [`ClassificationResult::quota_exceeded`] without a provider call.
pub struct ReplyClassifier {
    provider: Arc<dyn CompletionProvider>,
    breaker: QuotaBreaker,
    policy: RetryPolicy,
    system_prompt: String,
    max_tokens: u16,
}

impl ReplyClassifier {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        breaker: QuotaBreaker,
        config: &ClassifierConfig,
    ) -> Self {
        Self {
            provider,
            breaker,
            policy: RetryPolicy::new(config.max_retries, config.initial_backoff()),
            system_prompt: build_system_prompt(&config.signature, &config.disclaimer),
            max_tokens: config.max_tokens,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn breaker(&self) -> &QuotaBreaker {
        &self.breaker
    }

    pub async fn classify(&self, content: &str) -> ClassificationResult {
        if !self.breaker.allows_request() {
            warn!("Quota exceeded, skipping provider call");
            self.breaker.record_short_circuit();
            return ClassificationResult::quota_exceeded();
        }

        let user_prompt = build_user_prompt(content);
        let mut retry = 0;

        loop {
            let attempt = retry + 1;
            let outcome = self
                .provider
                .complete(&self.system_prompt, &user_prompt, self.max_tokens)
                .await;

            match outcome {
                Ok(output) => {
                    debug!(attempt, "Model output: {}", output);
                    return match parse_model_output(&output) {
                        Some(result) => {
                            info!(attempt, label = %result.label, "Classified message");
                            result
                        }
                        None => {
                            warn!("Invalid response format, using fallback: {:?}", output);
                            ClassificationResult::fallback()
                        }
                    };
                }
                Err(ProviderError::RateLimited(reason)) => {
                    // In-flight retries of this message still go out; later
                    // messages see the tripped breaker
                    self.breaker.trip();
                    retry += 1;

                    match self.policy.delay_before_retry(retry) {
                        Some(delay) => {
                            warn!(
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                "Rate limit exceeded ({}), retrying after delay",
                                reason
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            error!(
                                attempts = attempt,
                                "Rate limit persisted after all retries, using fallback"
                            );
                            return ClassificationResult::fallback();
                        }
                    }
                }
                Err(e) => {
                    error!(attempt, "Completion provider failed: {}", e);
                    return ClassificationResult::fallback();
                }
            }
        }
    }
}

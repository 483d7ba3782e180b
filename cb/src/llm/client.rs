//! LlmClient trait definition

use async_trait::async_trait;

use super::LlmError;

/// Single-shot language model client
///
/// Each call sends one fully rendered prompt and returns the model's text.
/// No conversation state is kept by the client; history travels inside the
/// prompt, assembled by the prompt builder.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a prompt and wait for the complete reply text
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;

    /// Model identifier, for logging
    fn model(&self) -> &str;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tracing::debug;

    /// Scripted LLM client for unit tests
    ///
    /// Replies are handed out in order; every prompt is recorded so tests can
    /// inspect what the engine rendered.
    pub struct MockLlmClient {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl MockLlmClient {
        pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            debug!(reply_count = %replies.len(), "MockLlmClient::new: called");
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        /// Client that answers every prompt with the given texts, in order
        pub fn with_texts(texts: &[&str]) -> Self {
            Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
        }

        pub fn call_count(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }

        pub fn last_prompt(&self) -> Option<String> {
            self.prompts.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
            debug!(prompt_len = prompt.len(), "MockLlmClient::generate: called");
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
                debug!("MockLlmClient::generate: no more mock replies");
                Err(LlmError::InvalidResponse("No more mock responses".to_string()))
            })
        }

        fn model(&self) -> &str {
            "mock"
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::time::Duration;

        #[tokio::test]
        async fn test_mock_client_returns_replies_in_order() {
            let client = MockLlmClient::with_texts(&["Response 1", "Response 2"]);

            assert_eq!(client.generate("first").await.unwrap(), "Response 1");
            assert_eq!(client.generate("second").await.unwrap(), "Response 2");

            assert_eq!(client.call_count(), 2);
            assert_eq!(client.prompts(), vec!["first".to_string(), "second".to_string()]);
        }

        #[tokio::test]
        async fn test_mock_client_replays_scripted_errors() {
            let client = MockLlmClient::new(vec![Err(LlmError::Timeout(Duration::from_secs(5)))]);

            let result = client.generate("prompt").await;
            assert!(matches!(result, Err(LlmError::Timeout(_))));
        }

        #[tokio::test]
        async fn test_mock_client_errors_when_exhausted() {
            let client = MockLlmClient::new(vec![]);
            assert!(client.generate("prompt").await.is_err());
        }
    }
}

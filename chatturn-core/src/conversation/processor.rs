//! Turn Processor

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{ChatTurnConfig, ProcessorConfig};
use crate::error::Result;
use crate::llm::{LLMProvider, LLMProviderFactory, LLMRequest, Message, ModelParams};

use super::history::HistoryStore;
use super::turn::TurnStream;

/// Runs conversational turns against a streaming provider.
///
/// Each turn sends the optional system message, the stored history and the
/// new user message, then records the exchange once the reply has been
/// streamed in full. History left idle for longer than the configured
/// timeout is discarded at the start of the next turn.
pub struct TurnProcessor {
    provider: Arc<dyn LLMProvider>,
    history: HistoryStore,
    system_message: Option<String>,
    idle_timeout: Duration,
    params: ModelParams,
}

impl TurnProcessor {
    /// Create a processor.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid (e.g. a zero idle timeout).
    pub fn new(provider: Arc<dyn LLMProvider>, config: ProcessorConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            provider,
            history: HistoryStore::new(),
            system_message: config.system_message,
            idle_timeout: config.idle_timeout,
            params: ModelParams::default(),
        })
    }

    /// Create a processor and its provider from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the provider cannot be built.
    pub fn from_config(config: &ChatTurnConfig) -> Result<Self> {
        config.validate()?;
        let provider = LLMProviderFactory::create(&config.llm)?;
        Ok(Self::new(provider, config.processor.clone())?.with_model_params(config.llm.params()))
    }

    /// Set the generation parameters forwarded with every request
    pub fn with_model_params(mut self, params: ModelParams) -> Self {
        self.params = params;
        self
    }

    /// Start a turn for `user_text`.
    ///
    /// Discards history first if the idle timeout has elapsed since the last
    /// completed turn. The returned stream yields reply fragments; the turn
    /// is recorded only once it has been drained.
    ///
    /// # Errors
    ///
    /// Returns the provider's error if the request could not be started.
    /// History is left as it was, apart from an idle-timeout reset.
    pub async fn chat(&mut self, user_text: impl Into<String>) -> Result<TurnStream<'_>> {
        let user_text = user_text.into();

        let now = Instant::now();
        if self.history.is_expired(now, self.idle_timeout) {
            tracing::info!(
                idle_timeout = ?self.idle_timeout,
                discarded = self.history.len(),
                "Idle timeout elapsed, discarding history"
            );
            self.history.reset();
        }

        let request = LLMRequest::new(self.build_messages(&user_text)).with_params(&self.params);

        let info = self.provider.model_info();
        tracing::debug!(
            provider = %info.provider,
            model = %info.model_name,
            messages = request.messages.len(),
            "Sending chat request"
        );

        let fragments = self.provider.generate_stream(&request).await?;
        Ok(TurnStream::new(&mut self.history, fragments, user_text))
    }

    /// Assemble the messages for a request: the system message (if any),
    /// then history oldest first, then `user_text`.
    pub fn build_messages(&self, user_text: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);

        if let Some(ref system) = self.system_message {
            messages.push(Message::system(system.clone()));
        }

        messages.extend_from_slice(self.history.messages());
        messages.push(Message::user(user_text));

        messages
    }

    /// Discard all history. Leaves the idle clock untouched.
    pub fn reset_histories(&mut self) {
        tracing::debug!(discarded = self.history.len(), "History reset");
        self.history.reset();
    }

    /// Get the stored history, oldest first
    pub fn histories(&self) -> &[Message] {
        self.history.messages()
    }

    /// Get the number of stored records
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Get the system message
    pub fn system_message(&self) -> Option<&str> {
        self.system_message.as_deref()
    }

    /// Replace the system message. `None` stops sending one.
    pub fn set_system_message(&mut self, content: Option<String>) {
        self.system_message = content;
    }

    /// Get the idle timeout
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Get the generation parameters
    pub fn model_params(&self) -> &ModelParams {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatTurnError;
    use crate::llm::{FragmentStream, MessageRole, ModelInfo};
    use async_trait::async_trait;
    use futures::{StreamExt, stream};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum Reply {
        Fragments(Vec<&'static str>),
        FailAfter(Vec<&'static str>),
        Reject,
        Slow(Vec<&'static str>, Duration),
    }

    /// Provider that plays back queued replies and records every request.
    #[derive(Default)]
    struct ScriptedProvider {
        replies: Mutex<VecDeque<Reply>>,
        requests: Mutex<Vec<LLMRequest>>,
    }

    impl ScriptedProvider {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn push(&self, reply: Reply) {
            self.replies.lock().unwrap().push_back(reply);
        }

        fn requests(&self) -> Vec<LLMRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn generate_stream(&self, request: &LLMRequest) -> Result<FragmentStream> {
            self.requests.lock().unwrap().push(request.clone());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Reply::Fragments(vec!["ok"]));

            let to_items = |parts: Vec<&'static str>| -> Vec<Result<String>> {
                parts.into_iter().map(|p| Ok(p.to_string())).collect()
            };

            match reply {
                Reply::Fragments(parts) => Ok(Box::pin(stream::iter(to_items(parts)))),
                Reply::FailAfter(parts) => {
                    let mut items = to_items(parts);
                    items.push(Err(ChatTurnError::Stream("connection reset".to_string())));
                    Ok(Box::pin(stream::iter(items)))
                }
                Reply::Reject => Err(ChatTurnError::Provider("401 Unauthorized".to_string())),
                Reply::Slow(parts, delay) => Ok(Box::pin(stream::iter(parts).then(
                    move |p| async move {
                        tokio::time::sleep(delay).await;
                        Ok::<_, ChatTurnError>(p.to_string())
                    },
                ))),
            }
        }

        fn model_info(&self) -> ModelInfo {
            ModelInfo {
                provider: "scripted".to_string(),
                model_name: "test".to_string(),
            }
        }
    }

    fn processor_with(provider: Arc<ScriptedProvider>, timeout_secs: f64) -> TurnProcessor {
        let config = ProcessorConfig::new()
            .with_idle_timeout_secs(timeout_secs)
            .unwrap();
        TurnProcessor::new(provider, config).unwrap()
    }

    async fn run_turn(processor: &mut TurnProcessor, text: &str) -> String {
        let mut turn = processor.chat(text).await.unwrap();
        let mut reply = String::new();
        while let Some(fragment) = turn.next().await {
            let fragment = fragment.unwrap();
            assert!(!fragment.is_empty());
            reply.push_str(&fragment);
        }
        reply
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat() {
        let provider = ScriptedProvider::new();
        provider.push(Reply::Fragments(vec!["Sure", ", let's", " talk!"]));
        let mut processor = processor_with(provider.clone(), 5.0);

        let reply = run_turn(&mut processor, "Let's chat").await;
        assert_eq!(reply, "Sure, let's talk!");
        assert_eq!(processor.history_len(), 2);

        run_turn(&mut processor, "Talk more").await;
        assert_eq!(processor.history_len(), 4);

        // Wait for history timeout
        tokio::time::advance(processor.idle_timeout() + Duration::from_secs(1)).await;

        run_turn(&mut processor, "Keep talking").await;
        assert_eq!(processor.history_len(), 2);
        assert_eq!(processor.histories()[0], Message::user("Keep talking"));

        let requests = provider.requests();
        assert_eq!(requests[1].messages.len(), 3);
        assert_eq!(requests[2].messages.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_grows_two_per_turn_within_timeout() {
        let provider = ScriptedProvider::new();
        let mut processor = processor_with(provider, 5.0);

        for n in 1..=5 {
            run_turn(&mut processor, &format!("turn {}", n)).await;
            assert_eq!(processor.history_len(), 2 * n);
            tokio::time::advance(Duration::from_secs(4)).await;
        }

        let roles: Vec<MessageRole> = processor.histories().iter().map(|m| m.role).collect();
        for pair in roles.chunks(2) {
            assert_eq!(pair, &[MessageRole::User, MessageRole::Assistant][..]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_clock_measured_from_turn_completion() {
        let provider = ScriptedProvider::new();
        // Streaming takes 8s in total, longer than the timeout
        provider.push(Reply::Slow(vec!["a", "b"], Duration::from_secs(4)));
        let mut processor = processor_with(provider, 5.0);

        run_turn(&mut processor, "first").await;
        tokio::time::advance(Duration::from_secs(2)).await;
        run_turn(&mut processor, "second").await;

        assert_eq!(processor.history_len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_turn_after_long_idle_keeps_nothing_stale() {
        let provider = ScriptedProvider::new();
        let mut processor = processor_with(provider.clone(), 5.0);

        // Expiry before the first turn only clears an already empty history
        tokio::time::advance(Duration::from_secs(30)).await;
        run_turn(&mut processor, "hello").await;
        assert_eq!(processor.history_len(), 2);
        assert_eq!(provider.requests()[0].messages.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_histories() {
        let provider = ScriptedProvider::new();
        let mut processor = processor_with(provider, 5.0);

        processor.reset_histories();
        assert_eq!(processor.history_len(), 0);

        processor.history.append(Message::user("a"));
        processor.history.append(Message::assistant("b"));
        assert_eq!(processor.history_len(), 2);

        processor.reset_histories();
        assert_eq!(processor.history_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_histories_keeps_idle_clock() {
        let provider = ScriptedProvider::new();
        let mut processor = processor_with(provider, 5.0);
        run_turn(&mut processor, "hello").await;
        let committed_at = processor.history.last_activity();

        tokio::time::advance(Duration::from_secs(3)).await;
        processor.reset_histories();
        assert_eq!(processor.history.last_activity(), committed_at);
        assert!(!processor.history.is_expired(Instant::now(), processor.idle_timeout()));

        // Still measured from the last turn, not from the reset
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(processor.history.is_expired(Instant::now(), processor.idle_timeout()));
    }

    #[tokio::test]
    async fn test_build_messages() {
        let provider = ScriptedProvider::new();
        let mut processor = processor_with(provider, 5.0);
        let current = "current user message";

        // Just current user message
        let messages = processor.build_messages(current);
        assert_eq!(messages, vec![Message::user(current)]);

        // With system message
        processor.set_system_message(Some("system message content".to_string()));
        let messages = processor.build_messages(current);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], Message::system("system message content"));
        assert_eq!(messages[1].content, current);

        // Make histories
        processor.history.append(Message::user("user message 1"));
        processor.history.append(Message::assistant("assistant message 1"));
        processor.history.append(Message::user("user message 2"));
        processor.history.append(Message::assistant("assistant message 2"));

        // With histories
        processor.set_system_message(None);
        let messages = processor.build_messages(current);
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0].content, "user message 1");
        assert_eq!(messages[3].content, "assistant message 2");
        assert_eq!(messages[4], Message::user(current));

        // With system message + histories
        processor.set_system_message(Some("system message content".to_string()));
        let messages = processor.build_messages(current);
        assert_eq!(messages.len(), 6);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[1].content, "user message 1");
        assert_eq!(messages[5].content, current);

        // After reset histories
        processor.reset_histories();
        let messages = processor.build_messages(current);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "system message content");
        assert_eq!(messages[1].content, current);
    }

    #[tokio::test]
    async fn test_build_messages_has_no_side_effects() {
        let provider = ScriptedProvider::new();
        let mut processor = processor_with(provider, 5.0);
        processor.history.append(Message::user("u"));
        processor.history.append(Message::assistant("a"));

        processor.build_messages("x");
        processor.build_messages("y");
        assert_eq!(processor.history_len(), 2);
    }

    #[tokio::test]
    async fn test_request_carries_system_message_and_params() {
        let provider = ScriptedProvider::new();
        let config = ProcessorConfig::new().with_system_message("Be brief.");
        let mut processor = TurnProcessor::new(provider.clone(), config)
            .unwrap()
            .with_model_params(ModelParams::new().with_temperature(0.0));

        run_turn(&mut processor, "hi").await;

        let request = &provider.requests()[0];
        assert_eq!(request.messages[0], Message::system("Be brief."));
        assert_eq!(request.messages[1], Message::user("hi"));
        assert_eq!(request.temperature, Some(0.0));
        // The system message is never stored
        assert_eq!(processor.history_len(), 2);
        assert_eq!(processor.histories()[0].role, MessageRole::User);
    }

    #[tokio::test]
    async fn test_undrained_turn_leaves_history_unchanged() {
        let provider = ScriptedProvider::new();
        provider.push(Reply::Fragments(vec!["a"]));
        provider.push(Reply::Fragments(vec!["partial", " reply"]));
        let mut processor = processor_with(provider, 5.0);

        run_turn(&mut processor, "first").await;
        assert_eq!(processor.history_len(), 2);

        {
            let mut turn = processor.chat("second").await.unwrap();
            assert_eq!(turn.next().await.unwrap().unwrap(), "partial");
        }
        assert_eq!(processor.history_len(), 2);

        // Never polled at all
        {
            let _turn = processor.chat("third").await.unwrap();
        }
        assert_eq!(processor.history_len(), 2);
    }

    #[tokio::test]
    async fn test_stream_failure_propagates_without_commit() {
        let provider = ScriptedProvider::new();
        provider.push(Reply::Fragments(vec!["fine"]));
        provider.push(Reply::FailAfter(vec!["half"]));
        let mut processor = processor_with(provider, 5.0);

        run_turn(&mut processor, "first").await;
        let before = processor.histories().to_vec();

        let turn = processor.chat("second").await.unwrap();
        let result = turn.collect_reply().await;
        assert!(matches!(result, Err(ChatTurnError::Stream(_))));
        assert_eq!(processor.histories(), before.as_slice());
    }

    #[tokio::test]
    async fn test_rejected_request_propagates_without_commit() {
        let provider = ScriptedProvider::new();
        provider.push(Reply::Reject);
        let mut processor = processor_with(provider, 5.0);

        let result = processor.chat("hello").await;
        assert!(matches!(result, Err(ChatTurnError::Provider(_))));
        assert_eq!(processor.history_len(), 0);

        // The processor stays usable
        run_turn(&mut processor, "hello again").await;
        assert_eq!(processor.history_len(), 2);
    }

    #[tokio::test]
    async fn test_collect_reply_commits() {
        let provider = ScriptedProvider::new();
        provider.push(Reply::Fragments(vec!["one ", "two"]));
        let mut processor = processor_with(provider, 5.0);

        let reply = processor.chat("count").await.unwrap().collect_reply().await.unwrap();
        assert_eq!(reply, "one two");
        assert_eq!(processor.histories()[1], Message::assistant("one two"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let provider = ScriptedProvider::new();
        let config = ProcessorConfig::new().with_idle_timeout(Duration::ZERO);
        assert!(matches!(
            TurnProcessor::new(provider, config),
            Err(ChatTurnError::Configuration(_))
        ));
    }
}

//! End-to-end tests of the chat session through a provider registry.
//! A scripted provider stands in for the network.

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use futures::stream;

    use colloquy::chat::{ChatListener, ChatSession, parse_overrides};
    use colloquy::{
        Assistant, AssistantConfig, CompletionEvent, CompletionParams, CompletionProvider,
        CompletionStream, Error, Message, ProviderRegistry, RawOverrides, Result, UsageEvent,
    };

    type Calls = Arc<Mutex<Vec<(Vec<Message>, CompletionParams)>>>;

    #[derive(Default)]
    struct ScriptedProvider {
        replies: Mutex<VecDeque<Result<Vec<CompletionEvent>>>>,
        calls: Calls,
    }

    impl ScriptedProvider {
        fn reply(&self, reply: Result<Vec<CompletionEvent>>) {
            self.replies.lock().unwrap().push_back(reply);
        }

        fn text(&self, text: &str) {
            self.reply(Ok(vec![CompletionEvent::MessageDelta(text.to_string())]));
        }

        fn calls(&self) -> Vec<(Vec<Message>, CompletionParams)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn complete(
            &self,
            messages: &[Message],
            params: &CompletionParams,
            _stream: bool,
        ) -> Result<CompletionStream> {
            self.calls
                .lock()
                .unwrap()
                .push((messages.to_vec(), params.clone()));
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("no scripted reply left")?;
            Ok(Box::pin(stream::iter(reply.into_iter().map(Ok))))
        }
    }

    #[derive(Default)]
    struct Events {
        errors: Vec<String>,
        reruns: Vec<bool>,
        clears: usize,
        messages: Vec<Message>,
        responses: Vec<(usize, Message, Option<UsageEvent>)>,
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Events>>);

    impl ChatListener for Recorder {
        fn on_chat_clear(&mut self) {
            self.0.lock().unwrap().clears += 1;
        }

        fn on_chat_rerun(&mut self, success: bool) {
            self.0.lock().unwrap().reruns.push(success);
        }

        fn on_error(&mut self, error: &Error) {
            self.0.lock().unwrap().errors.push(error.to_string());
        }

        fn on_chat_message(&mut self, message: &Message) {
            self.0.lock().unwrap().messages.push(message.clone());
        }

        fn on_chat_response(
            &mut self,
            messages: &[Message],
            response: &Message,
            usage: Option<&UsageEvent>,
        ) {
            self.0
                .lock()
                .unwrap()
                .responses
                .push((messages.len(), response.clone(), usage.copied()));
        }
    }

    fn setup() -> (ChatSession, Arc<ScriptedProvider>, Recorder) {
        let provider = Arc::new(ScriptedProvider::default());
        let mut registry = ProviderRegistry::new();
        registry.register("mock", provider.clone());
        let config = AssistantConfig {
            messages: Some(vec![Message::system("S")]),
            model: Some("mock-1".to_string()),
            ..AssistantConfig::default()
        };
        let assistant = Assistant::new(config, Arc::new(registry));
        let recorder = Recorder::default();
        let session = ChatSession::new(assistant, Box::new(recorder.clone()));
        (session, provider, recorder)
    }

    async fn say(session: &mut ChatSession, line: &str) -> bool {
        let (text, overrides) = parse_overrides(line);
        session.process_input(&text, &overrides).await
    }

    fn assert_balanced(session: &ChatSession) {
        assert_eq!(
            session.messages().len(),
            1 + 2 * session.user_prompts().len(),
            "transcript: {:?}",
            session.messages()
        );
    }

    #[tokio::test]
    async fn hello_hi_there() {
        let (mut session, provider, recorder) = setup();
        let usage = UsageEvent {
            prompt_tokens: 3,
            completion_tokens: 2,
            total_tokens: 5,
            cost: 0.0,
        };
        provider.reply(Ok(vec![
            CompletionEvent::MessageDelta("Hi ".into()),
            CompletionEvent::MessageDelta("there".into()),
            CompletionEvent::Usage(usage),
        ]));

        assert!(say(&mut session, "Hello").await);

        assert_eq!(
            session.messages(),
            &[
                Message::system("S"),
                Message::user("Hello"),
                Message::assistant("Hi there"),
            ]
        );
        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, vec![Message::system("S"), Message::user("Hello")]);
        assert_eq!(calls[0].1.model, "mock-1");

        let events = recorder.0.lock().unwrap();
        assert_eq!(
            events.messages,
            vec![Message::user("Hello"), Message::assistant("Hi there")]
        );
        assert_eq!(
            events.responses,
            vec![(2, Message::assistant("Hi there"), Some(usage))]
        );
        assert!(events.errors.is_empty());
    }

    #[tokio::test]
    async fn transcript_stays_balanced() {
        let (mut session, provider, _) = setup();
        for (i, line) in ["one", "two", "three"].iter().enumerate() {
            provider.text(&format!("reply {i}"));
            say(&mut session, line).await;
            assert_balanced(&session);
        }
        provider.text("again");
        say(&mut session, ":r").await;
        assert_balanced(&session);
        assert_eq!(session.user_prompts().len(), 3);
        assert_eq!(
            session.messages().last(),
            Some(&Message::assistant("again"))
        );
    }

    #[tokio::test]
    async fn rejected_request_leaves_state_unchanged() {
        let (mut session, provider, recorder) = setup();
        provider.text("first");
        say(&mut session, "first").await;
        let before = session.messages().to_vec();
        let prompts_before = session.user_prompts().len();

        provider.reply(Err(Error::bad_request("context too long", None)));
        assert!(say(&mut session, "second").await);

        assert_eq!(session.messages(), before.as_slice());
        assert_eq!(session.user_prompts().len(), prompts_before);
        let events = recorder.0.lock().unwrap();
        assert_eq!(events.errors.len(), 1);
        assert!(events.errors[0].contains("context too long"));
    }

    #[tokio::test]
    async fn retryable_error_keeps_message_for_rerun() {
        let (mut session, provider, recorder) = setup();
        provider.reply(Err(Error::service_unavailable("overloaded", Some(1))));
        say(&mut session, "Hello").await;

        assert_eq!(
            session.messages(),
            &[Message::system("S"), Message::user("Hello")]
        );
        assert_eq!(session.user_prompts().len(), 1);

        provider.text("Hi");
        say(&mut session, ":rerun").await;
        assert_eq!(
            session.messages(),
            &[
                Message::system("S"),
                Message::user("Hello"),
                Message::assistant("Hi"),
            ]
        );
        let events = recorder.0.lock().unwrap();
        assert_eq!(events.errors.len(), 1);
        assert_eq!(events.reruns, vec![true]);
    }

    #[tokio::test]
    async fn consecutive_reruns_send_identical_requests() {
        let (mut session, provider, _) = setup();
        provider.text("a");
        say(&mut session, "tell me a joke --temperature 0.2").await;
        provider.text("b");
        say(&mut session, ":r").await;
        provider.text("c");
        say(&mut session, ":r").await;

        let calls = provider.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1], calls[2]);
        assert_eq!(calls[0], calls[1]);
        assert_eq!(calls[1].1.temperature, Some(0.2));
        assert_eq!(
            calls[1].0.last(),
            Some(&Message::user("tell me a joke"))
        );
        assert_eq!(session.messages().last(), Some(&Message::assistant("c")));
        assert_balanced(&session);
    }

    #[tokio::test]
    async fn rerun_with_nothing_to_rerun() {
        let (mut session, provider, recorder) = setup();
        assert!(say(&mut session, ":r").await);
        assert!(provider.calls().is_empty());
        assert_eq!(session.messages(), &[Message::system("S")]);
        assert_eq!(recorder.0.lock().unwrap().reruns, vec![false]);
    }

    #[tokio::test]
    async fn clear_restores_persona() {
        let (mut session, provider, recorder) = setup();
        provider.text("x");
        say(&mut session, "hi").await;
        assert!(say(&mut session, ":c").await);
        assert_eq!(session.messages(), &[Message::system("S")]);
        assert!(session.user_prompts().is_empty());
        assert_eq!(recorder.0.lock().unwrap().clears, 1);

        assert!(say(&mut session, ":r").await);
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn command_aliases() {
        let (mut session, provider, recorder) = setup();
        assert!(!say(&mut session, ":quit").await);
        assert!(!say(&mut session, ":q").await);
        assert!(say(&mut session, ":clear").await);
        assert!(say(&mut session, ":c").await);
        assert!(say(&mut session, ":rerun").await);
        assert!(say(&mut session, ":r").await);
        assert!(provider.calls().is_empty());
        let events = recorder.0.lock().unwrap();
        assert_eq!(events.clears, 2);
        assert_eq!(events.reruns, vec![false, false]);
    }

    #[tokio::test]
    async fn near_miss_commands_are_messages() {
        let (mut session, provider, _) = setup();
        provider.text("ok");
        assert!(say(&mut session, ":Quit").await);
        assert_eq!(provider.calls().len(), 1);
        assert_eq!(session.messages()[1], Message::user(":Quit"));
    }

    #[tokio::test]
    async fn bogus_override_is_refused() {
        let (mut session, provider, recorder) = setup();
        assert!(say(&mut session, "Hello --bogus 1").await);
        assert!(provider.calls().is_empty());
        assert_eq!(session.messages(), &[Message::system("S")]);
        assert!(session.user_prompts().is_empty());
        let events = recorder.0.lock().unwrap();
        assert_eq!(events.errors.len(), 1);
        assert!(events.errors[0].contains("bogus"));
        assert!(events.errors[0].contains("Allowed arguments"));
    }

    #[tokio::test]
    async fn unknown_model_override_is_rolled_back() {
        let (mut session, provider, recorder) = setup();
        let mut overrides = RawOverrides::new();
        overrides.insert("model".to_string(), "nonexistent-7".to_string());
        assert!(session.process_input("Hello", &overrides).await);
        assert!(provider.calls().is_empty());
        assert_eq!(session.messages(), &[Message::system("S")]);
        assert!(session.user_prompts().is_empty());
        assert!(recorder.0.lock().unwrap().errors[0].contains("nonexistent-7"));
    }

    #[tokio::test]
    async fn model_override_reaches_provider() {
        let (mut session, provider, _) = setup();
        provider.text("ok");
        say(&mut session, "hi --model mock-2").await;
        assert_eq!(provider.calls()[0].1.model, "mock-2");
    }
}

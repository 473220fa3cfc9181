//! # Consumer Scenarios
//!
//! The application under test is the server side: its handlers are bound on
//! the test bed server and the test plays the remote caller.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::{eventually, exclaim, quick_testbed};
    use async_trait::async_trait;
    use microservices_testbed::{
        handler_fn, HandlerBinding, HandlerKind, HandlerOutput, MessageHandler, PatternResolver,
        ResultSelection, TestBedConfig,
    };
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    /// Wraps a handler and appends `!` to whatever it returns.
    struct Exclaiming(Arc<dyn MessageHandler>);

    #[async_trait]
    impl MessageHandler for Exclaiming {
        async fn handle(&self, data: Value) -> anyhow::Result<HandlerOutput> {
            match self.0.handle(data).await? {
                HandlerOutput::Value(Value::String(s)) => Ok(json!(format!("{s}!")).into()),
                other => Ok(other),
            }
        }
    }

    /// Registration layer standing in for the host framework.
    struct StaticRoutes(HashMap<String, HandlerBinding>);

    impl PatternResolver for StaticRoutes {
        fn resolve(&self, pattern: &str) -> Option<HandlerBinding> {
            self.0.get(pattern).cloned()
        }
    }

    #[tokio::test]
    async fn test_echo_scenario() {
        let testbed = quick_testbed(TestBedConfig::default());
        testbed
            .server()
            .handlers()
            .add_message_handler("echo", exclaim());
        testbed.listen();

        assert_eq!(
            testbed.send_call("echo", json!("hi")).await.unwrap(),
            json!("hi!")
        );
    }

    #[tokio::test]
    async fn test_notify_scenario_creates_no_call() {
        let testbed = quick_testbed(TestBedConfig::default());
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        testbed.server().handlers().add_event_handler(
            "notify",
            handler_fn(move |data: Value| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().push(data);
                    Ok(HandlerOutput::none())
                }
            }),
        );
        testbed.listen();

        testbed.send_event("notify", json!("x")).await.unwrap();

        assert!(eventually(|| log.lock().len() == 1).await);
        assert_eq!(log.lock()[0], json!("x"));
        let client = testbed.client();
        let stats = client.pending().stats();
        assert_eq!(stats.total_registered.load(Ordering::Relaxed), 0);
        assert_eq!(testbed.fabric().replies().messages_published(), 0);
    }

    #[tokio::test]
    async fn test_interceptor_wraps_handler() {
        let testbed = quick_testbed(TestBedConfig::default());
        testbed
            .server()
            .handlers()
            .add_message_handler("shout", Arc::new(Exclaiming(exclaim())));
        testbed.listen();

        assert_eq!(
            testbed.send_call("shout", json!("hey")).await.unwrap(),
            json!("hey!!")
        );
    }

    #[tokio::test]
    async fn test_external_resolver() {
        let testbed = quick_testbed(TestBedConfig::default());
        let mut routes = HashMap::new();
        routes.insert(
            "echo".to_string(),
            HandlerBinding::new("echo", HandlerKind::MessageCall, exclaim()),
        );
        testbed
            .server()
            .set_resolver(Arc::new(StaticRoutes(routes)));
        testbed.listen();

        assert_eq!(
            testbed.send_call("echo", json!("a")).await.unwrap(),
            json!("a!")
        );
        // The built-in registry is bypassed
        assert!(testbed.server().handlers().is_empty());
    }

    #[tokio::test]
    async fn test_streamed_result_selection() {
        for (selection, expected) in [(ResultSelection::First, 1), (ResultSelection::Last, 3)] {
            let testbed = quick_testbed(TestBedConfig::default().with_result_selection(selection));
            testbed.server().handlers().add_message_handler(
                "count",
                handler_fn(|_data: Value| async move {
                    Ok(HandlerOutput::stream(futures::stream::iter(vec![
                        json!(1),
                        json!(2),
                        json!(3),
                    ])))
                }),
            );
            testbed.listen();

            assert_eq!(
                testbed.send_call("count", Value::Null).await.unwrap(),
                json!(expected)
            );
        }
    }

    #[tokio::test]
    async fn test_each_request_dispatched_once() {
        let testbed = quick_testbed(TestBedConfig::default());
        testbed
            .server()
            .handlers()
            .add_message_handler("echo", exclaim());
        testbed.listen();

        for word in ["a", "b", "c"] {
            testbed.send_call("echo", json!(word)).await.unwrap();
        }

        let stats = testbed.server();
        assert_eq!(stats.stats().received.load(Ordering::Relaxed), 3);
        assert_eq!(stats.stats().replied.load(Ordering::Relaxed), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_events_handled_in_send_order() {
        let testbed = quick_testbed(TestBedConfig::default());
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        testbed.server().handlers().add_event_handler(
            "notify",
            handler_fn(move |data: Value| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().push(data);
                    Ok(HandlerOutput::none())
                }
            }),
        );
        testbed.listen();

        for i in 0..200 {
            testbed.send_event("notify", json!(i)).await.unwrap();
        }

        assert!(eventually(|| log.lock().len() == 200).await);
        let expected: Vec<Value> = (0..200).map(|i| json!(i)).collect();
        assert_eq!(*log.lock(), expected);
    }
}

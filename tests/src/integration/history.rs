//! # History and Timeout Scenarios
//!
//! What the test bed records for assertions, and what an abandoned call
//! leaves behind.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::{eventually, exclaim, quick_testbed};
    use microservices_testbed::{handler_fn, HandlerOutput, Message, TestBedConfig, TestBedError};
    use serde_json::{json, Value};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    #[tokio::test]
    async fn test_recent_preserves_send_order() {
        let testbed = quick_testbed(TestBedConfig::default());
        testbed.listen();

        testbed.send_event("log", json!("m1")).await.unwrap();
        testbed.send_event("log", json!("m2")).await.unwrap();

        assert_eq!(
            testbed.recent_for_pattern("log", 2),
            vec![
                Message::event("log", json!("m1")),
                Message::event("log", json!("m2")),
            ]
        );
        assert_eq!(
            testbed.recent("log"),
            vec![Message::event("log", json!("m2"))]
        );
    }

    #[tokio::test]
    async fn test_clear_for_pattern_is_idempotent() {
        let testbed = quick_testbed(TestBedConfig::default());
        testbed.listen();
        for i in 0..5 {
            testbed.send_event("bulk", json!(i)).await.unwrap();
        }
        testbed.send_event("kept", Value::Null).await.unwrap();

        testbed.clear_for_pattern("bulk");
        assert!(testbed.recent_for_pattern("bulk", 10).is_empty());
        testbed.clear_for_pattern("bulk");
        assert!(testbed.recent_for_pattern("bulk", 10).is_empty());
        testbed.clear_for_pattern("never-seen");
        assert!(testbed.recent_for_pattern("never-seen", 10).is_empty());

        assert_eq!(testbed.recent_for_pattern("kept", 10).len(), 1);
    }

    #[tokio::test]
    async fn test_clear_all_then_last_is_sentinel() {
        let testbed = quick_testbed(TestBedConfig::default());
        testbed
            .server()
            .handlers()
            .add_message_handler("echo", exclaim());
        testbed.listen();
        testbed.send_call("echo", json!("hi")).await.unwrap();
        assert_eq!(testbed.last_for_pattern("echo").data, json!("hi!"));

        testbed.clear_all();

        assert_eq!(testbed.last_for_pattern("echo"), Message::sentinel());
    }

    #[tokio::test]
    async fn test_slow_handler_times_out_and_late_reply_is_inert() {
        let testbed = quick_testbed(TestBedConfig::default());
        testbed.server().handlers().add_message_handler(
            "slow",
            handler_fn(|data: Value| async move {
                tokio::time::sleep(Duration::from_millis(250)).await;
                Ok(HandlerOutput::from(data))
            }),
        );
        testbed.listen();
        let client = testbed.client();

        let err = testbed.send_call("slow", json!("late")).await.unwrap_err();

        match err {
            TestBedError::Timeout {
                ref pattern,
                timeout,
            } => {
                assert_eq!(pattern, "slow");
                assert_eq!(timeout, Duration::from_millis(100));
            }
            ref other => panic!("expected timeout, got {other:?}"),
        }
        assert!(err.to_string().contains("100ms"));

        // Only the history store still listens for replies
        assert_eq!(testbed.fabric().replies().subscriber_count(), 1);
        assert_eq!(client.pending().pending_count(), 0);

        // The late reply is recorded but settles nothing
        let late_recorded = || testbed.recent_for_pattern("slow", 10).len() == 2;
        assert!(eventually(late_recorded).await);
        let stats = client.pending().stats();
        assert_eq!(stats.total_timeouts.load(Ordering::Relaxed), 1);
        assert_eq!(stats.total_completed.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_request_and_reply_share_correlation_id() {
        let testbed = quick_testbed(TestBedConfig::default());
        testbed
            .server()
            .handlers()
            .add_message_handler("echo", exclaim());
        testbed.listen();

        testbed.send_call("echo", json!("a")).await.unwrap();
        testbed.send_call("echo", json!("b")).await.unwrap();

        let recorded = testbed.recent_for_pattern("echo", 4);
        let data: Vec<Value> = recorded.iter().map(|m| m.data.clone()).collect();
        assert_eq!(data, vec![json!("a"), json!("a!"), json!("b"), json!("b!")]);
        assert_eq!(recorded[0].correlation_id, recorded[1].correlation_id);
        assert_ne!(recorded[0].correlation_id, recorded[2].correlation_id);
    }
}

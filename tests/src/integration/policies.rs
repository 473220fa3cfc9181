//! # Behavior Policy Scenarios
//!
//! Unknown patterns and kind mismatches under each policy action, plus
//! handler failures, which no policy suppresses.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::{eventually, exclaim, quick_testbed};
    use microservices_testbed::{
        handler_fn, BehaviorPolicy, DispatchError, HandlerKind, HandlerOutput, PolicyAction,
        TestBedConfig, TestBedError,
    };
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn policy(
        on_unknown_pattern: PolicyAction,
        on_handler_kind_mismatch: PolicyAction,
    ) -> TestBedConfig {
        TestBedConfig::default().with_behavior(BehaviorPolicy {
            on_unknown_pattern,
            on_handler_kind_mismatch,
        })
    }

    #[tokio::test]
    async fn test_ghost_call_under_throw_rejects() {
        let testbed = quick_testbed(policy(PolicyAction::Throw, PolicyAction::Throw));
        testbed.listen();

        let err = testbed.send_call("ghost", json!(1)).await.unwrap_err();

        match err {
            TestBedError::Dispatch(DispatchError::UnknownPattern { pattern }) => {
                assert_eq!(pattern, "ghost");
            }
            other => panic!("expected unknown pattern, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ghost_event_under_throw_reaches_error_channel() {
        let testbed = quick_testbed(policy(PolicyAction::Throw, PolicyAction::Throw));
        let mut errors = testbed.server().subscribe_errors();
        testbed.listen();

        testbed.send_event("ghost", json!(1)).await.unwrap();

        let error = tokio::time::timeout(std::time::Duration::from_secs(1), errors.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(error.pattern(), "ghost");
        // Events never produce reply traffic, not even for errors
        assert_eq!(testbed.fabric().replies().messages_published(), 0);
    }

    #[tokio::test]
    async fn test_ghost_under_ignore_leaves_only_request_record() {
        let testbed = quick_testbed(policy(PolicyAction::Ignore, PolicyAction::Throw));
        testbed.listen();

        let err = testbed.send_call("ghost", json!(1)).await.unwrap_err();

        assert!(err.is_timeout());
        let recorded = testbed.recent_for_pattern("ghost", 10);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].data, json!(1));
        assert!(recorded[0].correlation_id.is_some());
        assert_eq!(testbed.fabric().replies().messages_published(), 0);
    }

    #[tokio::test]
    async fn test_ghost_under_log_is_dropped() {
        let testbed = quick_testbed(TestBedConfig::default());
        testbed.listen();

        testbed.send_event("ghost", Value::Null).await.unwrap();

        let server = testbed.server();
        let dropped = || server.stats().unknown_pattern.load(Ordering::Relaxed) == 1;
        assert!(eventually(dropped).await);
        assert_eq!(testbed.recent_for_pattern("ghost", 10).len(), 1);
    }

    #[tokio::test]
    async fn test_call_to_event_binding_mismatch() {
        let testbed = quick_testbed(TestBedConfig::default());
        testbed
            .server()
            .handlers()
            .add_event_handler("notify", exclaim());
        testbed.listen();

        let err = testbed.send_call("notify", json!("x")).await.unwrap_err();

        match err {
            TestBedError::Dispatch(DispatchError::HandlerKindMismatch {
                pattern,
                expected,
                actual,
            }) => {
                assert_eq!(pattern, "notify");
                assert_eq!(expected, HandlerKind::MessageCall);
                assert_eq!(actual, HandlerKind::Event);
            }
            other => panic!("expected kind mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_event_to_call_binding_mismatch_skips_handler() {
        let testbed = quick_testbed(policy(PolicyAction::Log, PolicyAction::Ignore));
        let invoked = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&invoked);
        testbed.server().handlers().add_message_handler(
            "echo",
            handler_fn(move |data: Value| {
                let counter = Arc::clone(&counter);
                async move {
                    *counter.lock() += 1;
                    Ok(HandlerOutput::from(data))
                }
            }),
        );
        testbed.listen();

        testbed.send_event("echo", json!("x")).await.unwrap();

        let server = testbed.server();
        let mismatched = || server.stats().kind_mismatch.load(Ordering::Relaxed) == 1;
        assert!(eventually(mismatched).await);
        assert_eq!(*invoked.lock(), 0);
    }

    #[tokio::test]
    async fn test_handler_failure_always_surfaces() {
        let testbed = quick_testbed(policy(PolicyAction::Ignore, PolicyAction::Ignore));
        testbed.server().handlers().add_message_handler(
            "broken",
            handler_fn(|_data: Value| async move {
                Err::<HandlerOutput, _>(anyhow::anyhow!("database unavailable"))
            }),
        );
        testbed.listen();

        let err = testbed.send_call("broken", Value::Null).await.unwrap_err();

        match err {
            TestBedError::Dispatch(DispatchError::HandlerFailed { pattern, reason }) => {
                assert_eq!(pattern, "broken");
                assert!(reason.contains("database unavailable"));
            }
            other => panic!("expected handler failure, got {other:?}"),
        }
    }
}

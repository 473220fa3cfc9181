//! Scenario tests across the bus and endpoint crates.

pub mod consumer;
pub mod history;
pub mod policies;

#[cfg(test)]
pub(crate) mod fixtures {
    use microservices_testbed::{
        handler_fn, HandlerOutput, MessageHandler, MicroservicesTestBed, TestBedConfig,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    /// Test bed with a short reply window so timeout paths stay fast.
    pub fn quick_testbed(config: TestBedConfig) -> MicroservicesTestBed {
        microservices_testbed::init_test_tracing();
        let config = config.with_call_timeout(Duration::from_millis(100));
        match MicroservicesTestBed::with_config(config) {
            Ok(testbed) => testbed,
            Err(e) => panic!("invalid test bed config: {e}"),
        }
    }

    /// Poll `condition` until it holds or a second passes.
    pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
        let poll = async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(1), poll)
            .await
            .is_ok()
    }

    /// Handler appending `!` to a string payload.
    pub fn exclaim() -> Arc<dyn MessageHandler> {
        handler_fn(|data: Value| async move {
            let s = data.as_str().unwrap_or_default().to_string();
            Ok(HandlerOutput::from(json!(format!("{s}!"))))
        })
    }
}

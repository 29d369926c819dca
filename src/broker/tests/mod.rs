//! Test suites for the broker layer


use crate::broker::{BrokerSettings, JobMessage};
use std::time::Duration;

pub(crate) const QUEUE: &str = "test.jobs";

pub(crate) fn fast_settings() -> BrokerSettings {
    BrokerSettings {
        queue: QUEUE.to_string(),
        reconnect_delay: Duration::from_millis(50),
    }
}

pub(crate) fn job(id: u64) -> JobMessage {
    JobMessage::new(id, "test-run", id * 10)
}

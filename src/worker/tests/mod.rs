//! Test suites for the consumer pipeline

mod document_store;

use crate::broker::{BrokerChannel, BrokerTransport, Delivery, JobMessage, MemoryBroker};
use crate::state::{MemoryStateBackend, RunStatePatch, StateStore, StoreSettings};
use std::sync::Arc;

pub(crate) const QUEUE: &str = "worker.jobs";

/// Store with an active run so snapshots carry counters
pub(crate) async fn running_store() -> (StateStore, Arc<MemoryStateBackend>) {
    let backend = Arc::new(MemoryStateBackend::new());
    let store = StateStore::new(backend.clone(), StoreSettings::default());
    store
        .patch_state(&RunStatePatch::running(true))
        .await
        .unwrap();
    (store, backend)
}

/// Publish `body` to a fresh broker and receive it as a delivery
pub(crate) async fn deliver(body: Vec<u8>) -> (MemoryBroker, Arc<dyn BrokerChannel>, Delivery) {
    let broker = MemoryBroker::new(100);
    let connection = broker.connect().await.unwrap();
    let channel = connection.create_channel().await.unwrap();
    channel.declare_queue(QUEUE, true).await.unwrap();
    channel.publish(QUEUE, body, true).await.unwrap();
    let mut deliveries = channel.consume(QUEUE).await.unwrap();
    let raw = deliveries.recv().await.unwrap();
    let delivery = Delivery::new(raw, channel.clone());
    (broker, channel, delivery)
}

pub(crate) fn job_body(job_id: u64, value: u64) -> Vec<u8> {
    JobMessage::new(job_id, "run-under-test", value)
        .to_bytes()
        .unwrap()
}

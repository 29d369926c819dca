//! Ready channels, deliveries and the post-ready hook

use crate::broker::{BrokerChannel, BrokerError, BrokerResult, RawDelivery};
use crate::core::sync::handle_mutex_poison;
use async_trait::async_trait;
use log::debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Role-specific setup run each time a connection reaches the ready state
///
/// A consumer sets its prefetch and starts consuming here; a producer does
/// nothing. An error aborts the connection attempt and schedules a reconnect.
#[async_trait]
pub trait ChannelReadyHook: Send + Sync {
    async fn on_channel_ready(&self, channel: &ReadyChannel) -> BrokerResult<()>;
}

/// Hook for publish-only roles
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

#[async_trait]
impl ChannelReadyHook for NoopHook {
    async fn on_channel_ready(&self, _channel: &ReadyChannel) -> BrokerResult<()> {
        Ok(())
    }
}

/// Callback invoked once per delivered message
///
/// The handler owns the acknowledgement: every delivery must end in
/// [`Delivery::ack`] or [`Delivery::nack`].
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, delivery: Delivery);
}

/// A received message, acknowledged through the channel it arrived on
pub struct Delivery {
    pub tag: u64,
    pub body: Vec<u8>,
    pub redelivered: bool,
    channel: Arc<dyn BrokerChannel>,
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("tag", &self.tag)
            .field("len", &self.body.len())
            .field("redelivered", &self.redelivered)
            .finish()
    }
}

impl Delivery {
    pub fn new(raw: RawDelivery, channel: Arc<dyn BrokerChannel>) -> Self {
        Self {
            tag: raw.tag,
            body: raw.body,
            redelivered: raw.redelivered,
            channel,
        }
    }

    pub async fn ack(&self) -> BrokerResult<()> {
        self.channel.ack(self.tag).await
    }

    /// Reject the delivery; with `requeue` it goes back to the queue for immediate redelivery
    pub async fn nack(&self, requeue: bool) -> BrokerResult<()> {
        self.channel.nack(self.tag, requeue).await
    }
}

#[derive(Debug, Default)]
struct HandlerCount {
    running: AtomicUsize,
    idle: Notify,
}

/// Count of delivery handlers still running on a connection
#[derive(Debug, Clone, Default)]
pub(crate) struct InFlightHandlers {
    count: Arc<HandlerCount>,
}

impl InFlightHandlers {
    fn enter(&self) -> HandlerGuard {
        self.count.running.fetch_add(1, Ordering::SeqCst);
        HandlerGuard {
            count: self.count.clone(),
        }
    }

    pub(crate) fn running(&self) -> usize {
        self.count.running.load(Ordering::SeqCst)
    }

    /// Wait up to `timeout` for every running handler to finish
    pub(crate) async fn wait_idle(&self, timeout: Duration) -> bool {
        let idle = async {
            loop {
                let notified = self.count.idle.notified();
                if self.running() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, idle).await.is_ok()
    }
}

/// Held by a handler task; dropping it (finished or aborted) releases the slot
struct HandlerGuard {
    count: Arc<HandlerCount>,
}

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        if self.count.running.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.count.idle.notify_waiters();
        }
    }
}

/// The channel of a connection that has declared its queue
///
/// Handed to [`ChannelReadyHook::on_channel_ready`]. Dispatcher tasks started
/// here belong to the connection and are aborted when it is torn down; the
/// handler tasks they spawn are counted so shutdown can let them finish.
#[derive(Clone)]
pub struct ReadyChannel {
    channel: Arc<dyn BrokerChannel>,
    queue: String,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    handlers: InFlightHandlers,
}

impl ReadyChannel {
    pub(crate) fn new(
        channel: Arc<dyn BrokerChannel>,
        queue: String,
        tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
        handlers: InFlightHandlers,
    ) -> Self {
        Self {
            channel,
            queue,
            tasks,
            handlers,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub async fn set_prefetch(&self, count: u16) -> BrokerResult<()> {
        self.channel.set_prefetch(count).await
    }

    /// Start consuming the queue, dispatching each delivery to `handler` on its own task
    pub async fn consume(&self, handler: Arc<dyn DeliveryHandler>) -> BrokerResult<()> {
        let mut deliveries = self.channel.consume(&self.queue).await?;
        let channel = self.channel.clone();
        let queue = self.queue.clone();
        let handlers = self.handlers.clone();

        let dispatcher = tokio::spawn(async move {
            while let Some(raw) = deliveries.recv().await {
                let delivery = Delivery::new(raw, channel.clone());
                let handler = handler.clone();
                let guard = handlers.enter();
                tokio::spawn(async move {
                    handler.handle(delivery).await;
                    drop(guard);
                });
            }
            debug!("Delivery stream for queue '{}' ended", queue);
        });

        let mut tasks = handle_mutex_poison(self.tasks.lock(), |message| BrokerError::Internal {
            message,
        })?;
        tasks.push(dispatcher);
        Ok(())
    }
}

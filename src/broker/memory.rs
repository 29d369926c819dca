//! In-process broker
//!
//! Implements the transport traits with the delivery semantics the pipeline
//! relies on:
//! - durable queues and persistent messages survive [`MemoryBroker::restart`]
//! - per-consumer prefetch caps unacknowledged deliveries
//! - unacknowledged messages of a closed channel or dropped connection are
//!   requeued at the front with the `redelivered` flag
//! - `nack(requeue=false)` moves the message to the queue's dead-letter list
//! - publishing into a queue holding `max_pending` ready messages returns false

use crate::broker::{
    BrokerChannel, BrokerConnection, BrokerError, BrokerResult, BrokerTransport,
    ConnectionEvent, RawDelivery,
};
use crate::core::sync::handle_mutex_poison;
use async_trait::async_trait;
use log::{debug, info};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc};

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
struct StoredMessage {
    body: Vec<u8>,
    persistent: bool,
    redelivered: bool,
}

#[derive(Debug)]
struct ConsumerSlot {
    connection_id: u64,
    channel_id: u64,
    /// 0 means unlimited
    prefetch: usize,
    in_flight: usize,
    sender: mpsc::UnboundedSender<RawDelivery>,
}

impl ConsumerSlot {
    fn has_capacity(&self) -> bool {
        self.prefetch == 0 || self.in_flight < self.prefetch
    }
}

#[derive(Debug)]
struct Unacked {
    connection_id: u64,
    channel_id: u64,
    message: StoredMessage,
}

#[derive(Debug, Default)]
struct QueueTable {
    durable: bool,
    ready: VecDeque<StoredMessage>,
    consumers: Vec<ConsumerSlot>,
    unacked: HashMap<u64, Unacked>,
    dead_letters: Vec<Vec<u8>>,
    /// Round-robin cursor into `consumers`
    cursor: usize,
}

impl QueueTable {
    /// Hand ready messages to consumers with spare prefetch capacity
    fn dispatch(&mut self, next_tag: &mut u64) {
        while !self.ready.is_empty() && !self.consumers.is_empty() {
            let count = self.consumers.len();
            let Some(index) = (0..count)
                .map(|offset| (self.cursor + offset) % count)
                .find(|&i| self.consumers[i].has_capacity())
            else {
                return;
            };
            let Some(message) = self.ready.pop_front() else {
                return;
            };

            *next_tag += 1;
            let tag = *next_tag;
            let delivery = RawDelivery {
                tag,
                body: message.body.clone(),
                redelivered: message.redelivered,
            };

            let consumer = &mut self.consumers[index];
            if consumer.sender.send(delivery).is_err() {
                // Receiver dropped: forget the consumer and keep the message
                self.consumers.remove(index);
                self.ready.push_front(message);
                continue;
            }
            consumer.in_flight += 1;
            self.unacked.insert(
                tag,
                Unacked {
                    connection_id: consumer.connection_id,
                    channel_id: consumer.channel_id,
                    message,
                },
            );
            self.cursor = (index + 1) % self.consumers.len();
        }
    }

    /// Take the unacked entry for `tag`, only if it belongs to the given channel
    fn settle(&mut self, tag: u64, connection_id: u64, channel_id: u64) -> BrokerResult<StoredMessage> {
        match self.unacked.get(&tag) {
            Some(entry) if entry.connection_id == connection_id && entry.channel_id == channel_id => {}
            _ => return Err(BrokerError::UnknownDeliveryTag { tag }),
        }
        let entry = self
            .unacked
            .remove(&tag)
            .ok_or(BrokerError::UnknownDeliveryTag { tag })?;
        if let Some(consumer) = self
            .consumers
            .iter_mut()
            .find(|c| c.connection_id == connection_id && c.channel_id == channel_id)
        {
            consumer.in_flight = consumer.in_flight.saturating_sub(1);
        }
        Ok(entry.message)
    }

    /// Requeue unacked messages and drop consumers matching `owned`
    fn release(&mut self, owned: impl Fn(u64, u64) -> bool) -> usize {
        let tags: Vec<u64> = self
            .unacked
            .iter()
            .filter(|(_, entry)| owned(entry.connection_id, entry.channel_id))
            .map(|(tag, _)| *tag)
            .collect();
        let mut released = Vec::with_capacity(tags.len());
        for tag in tags {
            if let Some(entry) = self.unacked.remove(&tag) {
                released.push((tag, entry.message));
            }
        }
        // Oldest delivery first at the head of the queue
        released.sort_by_key(|(tag, _)| *tag);
        let count = released.len();
        for (_, mut message) in released.into_iter().rev() {
            message.redelivered = true;
            self.ready.push_front(message);
        }

        self.consumers
            .retain(|c| !owned(c.connection_id, c.channel_id));
        if self.cursor >= self.consumers.len() {
            self.cursor = 0;
        }
        count
    }
}

#[derive(Debug, Default)]
struct BrokerTables {
    queues: HashMap<String, QueueTable>,
    /// Open connections and their event senders
    connections: HashMap<u64, broadcast::Sender<ConnectionEvent>>,
    next_tag: u64,
}

impl BrokerTables {
    fn queue_mut(&mut self, queue: &str) -> BrokerResult<&mut QueueTable> {
        self.queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotFound {
                queue: queue.to_string(),
            })
    }

    fn dispatch_all(&mut self) {
        let mut next_tag = self.next_tag;
        for queue in self.queues.values_mut() {
            queue.dispatch(&mut next_tag);
        }
        self.next_tag = next_tag;
    }

    fn dispatch(&mut self, queue: &str) -> BrokerResult<()> {
        let mut next_tag = self.next_tag;
        self.queue_mut(queue)?.dispatch(&mut next_tag);
        self.next_tag = next_tag;
        Ok(())
    }

    /// Close a connection, requeueing everything it held
    fn drop_connection(&mut self, connection_id: u64, reason: &str) -> bool {
        let Some(events) = self.connections.remove(&connection_id) else {
            return false;
        };
        for queue in self.queues.values_mut() {
            queue.release(|conn, _| conn == connection_id);
        }
        let _ = events.send(ConnectionEvent::Closed {
            reason: reason.to_string(),
        });
        true
    }
}

#[derive(Debug)]
struct BrokerCore {
    tables: Mutex<BrokerTables>,
    online: AtomicBool,
    max_pending: usize,
    next_connection_id: AtomicU64,
}

impl BrokerCore {
    fn tables(&self) -> BrokerResult<MutexGuard<'_, BrokerTables>> {
        handle_mutex_poison(self.tables.lock(), |message| BrokerError::Internal { message })
    }
}

/// Shared handle to an in-process broker
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    core: Arc<BrokerCore>,
}

impl MemoryBroker {
    /// `max_pending` caps ready messages per queue before publish reports a full buffer
    pub fn new(max_pending: usize) -> Self {
        Self {
            core: Arc::new(BrokerCore {
                tables: Mutex::new(BrokerTables::default()),
                online: AtomicBool::new(true),
                max_pending: max_pending.max(1),
                next_connection_id: AtomicU64::new(0),
            }),
        }
    }

    /// Take the broker offline (dropping every connection) or bring it back
    pub fn set_online(&self, online: bool) -> BrokerResult<()> {
        self.core.online.store(online, Ordering::SeqCst);
        if !online {
            self.drop_connections()?;
        }
        info!("Memory broker {}", if online { "online" } else { "offline" });
        Ok(())
    }

    pub fn is_online(&self) -> bool {
        self.core.online.load(Ordering::SeqCst)
    }

    /// Drop every open connection; returns how many were dropped
    pub fn drop_connections(&self) -> BrokerResult<usize> {
        let mut tables = self.core.tables()?;
        let ids: Vec<u64> = tables.connections.keys().copied().collect();
        let dropped = ids
            .into_iter()
            .filter(|id| tables.drop_connection(*id, "connection dropped by broker"))
            .count();
        debug!("Memory broker dropped {} connection(s)", dropped);
        Ok(dropped)
    }

    /// Simulate a broker restart: connections drop, non-durable queues and
    /// transient messages are lost
    pub fn restart(&self) -> BrokerResult<()> {
        self.drop_connections()?;
        let mut tables = self.core.tables()?;
        tables.queues.retain(|_, queue| queue.durable);
        for queue in tables.queues.values_mut() {
            queue.ready.retain(|message| message.persistent);
        }
        info!("Memory broker restarted");
        Ok(())
    }

    /// Ready (undelivered) messages in a queue
    pub fn queue_depth(&self, queue: &str) -> BrokerResult<usize> {
        Ok(self.core.tables()?.queue_mut(queue)?.ready.len())
    }

    /// Delivered but not yet acknowledged messages in a queue
    pub fn unacked_count(&self, queue: &str) -> BrokerResult<usize> {
        Ok(self.core.tables()?.queue_mut(queue)?.unacked.len())
    }

    pub fn consumer_count(&self, queue: &str) -> BrokerResult<usize> {
        Ok(self.core.tables()?.queue_mut(queue)?.consumers.len())
    }

    /// Bodies rejected without requeue, oldest first
    pub fn dead_letters(&self, queue: &str) -> BrokerResult<Vec<Vec<u8>>> {
        Ok(self.core.tables()?.queue_mut(queue)?.dead_letters.clone())
    }

    pub fn connection_count(&self) -> BrokerResult<usize> {
        Ok(self.core.tables()?.connections.len())
    }
}

#[async_trait]
impl BrokerTransport for MemoryBroker {
    async fn connect(&self) -> BrokerResult<Arc<dyn BrokerConnection>> {
        if !self.is_online() {
            return Err(BrokerError::Unreachable {
                endpoint: self.endpoint(),
                message: "broker is offline".to_string(),
            });
        }
        let id = self.core.next_connection_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        self.core.tables()?.connections.insert(id, events.clone());
        debug!("Memory broker accepted connection {}", id);

        Ok(Arc::new(MemoryConnection {
            core: self.core.clone(),
            id,
            events,
            next_channel_id: AtomicU64::new(0),
        }))
    }

    fn endpoint(&self) -> String {
        "memory://".to_string()
    }
}

struct MemoryConnection {
    core: Arc<BrokerCore>,
    id: u64,
    events: broadcast::Sender<ConnectionEvent>,
    next_channel_id: AtomicU64,
}

fn ensure_open(tables: &BrokerTables, connection_id: u64) -> BrokerResult<()> {
    if tables.connections.contains_key(&connection_id) {
        Ok(())
    } else {
        Err(BrokerError::ConnectionClosed {
            reason: format!("connection {} is closed", connection_id),
        })
    }
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    async fn create_channel(&self) -> BrokerResult<Arc<dyn BrokerChannel>> {
        ensure_open(&*self.core.tables()?, self.id)?;
        let channel_id = self.next_channel_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Arc::new(MemoryChannel {
            core: self.core.clone(),
            connection_id: self.id,
            channel_id,
            prefetch: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> BrokerResult<()> {
        let mut tables = self.core.tables()?;
        if tables.drop_connection(self.id, "closed by client") {
            tables.dispatch_all();
        }
        Ok(())
    }
}

struct MemoryChannel {
    core: Arc<BrokerCore>,
    connection_id: u64,
    channel_id: u64,
    prefetch: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryChannel {
    fn open_tables(&self) -> BrokerResult<MutexGuard<'_, BrokerTables>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::ConnectionClosed {
                reason: format!("channel {} is closed", self.channel_id),
            });
        }
        let tables = self.core.tables()?;
        ensure_open(&tables, self.connection_id)?;
        Ok(tables)
    }

    fn owns(&self, connection_id: u64, channel_id: u64) -> bool {
        connection_id == self.connection_id && channel_id == self.channel_id
    }
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn declare_queue(&self, queue: &str, durable: bool) -> BrokerResult<()> {
        let mut tables = self.open_tables()?;
        let table = tables
            .queues
            .entry(queue.to_string())
            .or_insert_with(QueueTable::default);
        table.durable |= durable;
        Ok(())
    }

    async fn publish(&self, queue: &str, body: Vec<u8>, persistent: bool) -> BrokerResult<bool> {
        let mut tables = self.open_tables()?;
        let max_pending = self.core.max_pending;
        let table = tables.queue_mut(queue)?;
        if table.ready.len() >= max_pending {
            return Ok(false);
        }
        table.ready.push_back(StoredMessage {
            body,
            persistent,
            redelivered: false,
        });
        tables.dispatch(queue)?;
        Ok(true)
    }

    async fn set_prefetch(&self, count: u16) -> BrokerResult<()> {
        self.open_tables()?;
        self.prefetch.store(count as usize, Ordering::SeqCst);
        Ok(())
    }

    async fn consume(&self, queue: &str) -> BrokerResult<mpsc::UnboundedReceiver<RawDelivery>> {
        let mut tables = self.open_tables()?;
        let (sender, receiver) = mpsc::unbounded_channel();
        tables.queue_mut(queue)?.consumers.push(ConsumerSlot {
            connection_id: self.connection_id,
            channel_id: self.channel_id,
            prefetch: self.prefetch.load(Ordering::SeqCst),
            in_flight: 0,
            sender,
        });
        tables.dispatch(queue)?;
        Ok(receiver)
    }

    async fn ack(&self, tag: u64) -> BrokerResult<()> {
        let mut tables = self.open_tables()?;
        let queue = find_queue_for_tag(&tables, tag)?;
        tables
            .queue_mut(&queue)?
            .settle(tag, self.connection_id, self.channel_id)?;
        tables.dispatch(&queue)
    }

    async fn nack(&self, tag: u64, requeue: bool) -> BrokerResult<()> {
        let mut tables = self.open_tables()?;
        let queue = find_queue_for_tag(&tables, tag)?;
        let table = tables.queue_mut(&queue)?;
        let mut message = table.settle(tag, self.connection_id, self.channel_id)?;
        if requeue {
            message.redelivered = true;
            table.ready.push_front(message);
        } else {
            table.dead_letters.push(message.body);
        }
        tables.dispatch(&queue)
    }

    async fn close(&self) -> BrokerResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut tables = self.core.tables()?;
        for queue in tables.queues.values_mut() {
            queue.release(|conn, chan| self.owns(conn, chan));
        }
        tables.dispatch_all();
        Ok(())
    }
}

fn find_queue_for_tag(tables: &BrokerTables, tag: u64) -> BrokerResult<String> {
    tables
        .queues
        .iter()
        .find(|(_, table)| table.unacked.contains_key(&tag))
        .map(|(name, _)| name.clone())
        .ok_or(BrokerError::UnknownDeliveryTag { tag })
}

//! Progress Fanout
//!
//! Relays progress snapshots from the state store's broadcast channel to
//! every connected listener. Nothing is persisted or replayed: a listener
//! sees only snapshots published after it connected and should read the
//! current state through the status path first. A listener that goes away
//! is dropped on the next broadcast.

mod error;
mod fanout;

pub use error::{ProgressError, ProgressResult};
pub use fanout::{ListenerStatistics, ProgressFanout};

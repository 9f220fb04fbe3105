//! Socket transport abstraction.
//!
//! The client drives the connection through the [`Transport`] trait so the
//! protocol state machine can be exercised against an in-memory transport
//! in tests. [`ws`] provides the production WebSocket implementation.

pub mod ws;

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One inbound transport item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A text frame carrying a JSON-encoded server event.
    Frame(String),
    /// The peer closed the socket.
    Closed { code: u16, reason: String },
}

pub trait Transport: Send {
    /// Write one text frame to the socket.
    fn send_text(&mut self, text: String) -> BoxFuture<'_, Result<()>>;

    /// Next inbound item; `None` means the stream ended without a close
    /// frame (abnormal termination).
    fn next_incoming(&mut self) -> BoxFuture<'_, Result<Option<Incoming>>>;

    /// Initiate a normal closure.
    fn close(&mut self) -> BoxFuture<'_, Result<()>>;
}

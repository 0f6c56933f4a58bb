//! Command channel between the caller side and the execution context.
//!
//! Commands travel on a crossbeam channel so the engine thread can select
//! over commands, flush completions and its debounce deadline at once.
//! Responses travel back on a tokio channel so the caller side can await
//! them. When the execution context goes away for any reason, a final
//! [`ChannelEvent::Terminated`] is delivered; that event is the only
//! trigger for rejecting every pending request.

use cairn_core::{CommandMessage, ResponseMessage};
use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;
use tokio::sync::mpsc;

/// The execution context is gone; nothing more can be sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("command channel closed")]
pub struct ChannelClosed;

/// Inbound events for the caller side.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A response to a previously sent command
    Response(ResponseMessage),
    /// The execution context stopped; no further responses will arrive
    Terminated {
        /// Why the context stopped
        reason: String,
    },
}

/// Create a connected pair of channel ends.
pub fn duplex() -> (ClientEnd, ContextEnd) {
    let (command_tx, command_rx) = crossbeam_channel::unbounded();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    (
        ClientEnd {
            commands: CommandSender { inner: command_tx },
            events: EventReceiver { inner: event_rx },
        },
        ContextEnd {
            commands: command_rx,
            events: EventSender { inner: event_tx },
        },
    )
}

/// Caller-side end: sends commands, receives events.
#[derive(Debug)]
pub struct ClientEnd {
    /// Outbound command sender
    pub commands: CommandSender,
    /// Inbound event stream
    pub events: EventReceiver,
}

impl ClientEnd {
    /// Split into the sender and the event stream.
    pub fn split(self) -> (CommandSender, EventReceiver) {
        (self.commands, self.events)
    }
}

/// Context-side end: receives commands, emits events.
#[derive(Debug)]
pub struct ContextEnd {
    /// Inbound commands
    pub commands: Receiver<CommandMessage>,
    /// Outbound events
    pub events: EventSender,
}

/// Sends commands to the execution context. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CommandSender {
    inner: Sender<CommandMessage>,
}

impl CommandSender {
    /// Enqueue a command. Messages from one sender arrive in send order.
    pub fn send(&self, message: CommandMessage) -> Result<(), ChannelClosed> {
        self.inner.send(message).map_err(|_| ChannelClosed)
    }
}

/// Receives events from the execution context.
#[derive(Debug)]
pub struct EventReceiver {
    inner: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl EventReceiver {
    /// Next event, or `None` once the context end has been dropped and
    /// every event was delivered.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.inner.recv().await
    }

    /// Blocking variant for use outside an async runtime.
    pub fn blocking_recv(&mut self) -> Option<ChannelEvent> {
        self.inner.blocking_recv()
    }
}

/// Emits events towards the caller side.
#[derive(Debug, Clone)]
pub struct EventSender {
    inner: mpsc::UnboundedSender<ChannelEvent>,
}

impl EventSender {
    /// Deliver a response. Returns `false` when nobody is listening.
    pub fn respond(&self, response: ResponseMessage) -> bool {
        self.inner.send(ChannelEvent::Response(response)).is_ok()
    }

    /// Announce termination. Returns `false` when nobody is listening.
    pub fn terminate(&self, reason: impl Into<String>) -> bool {
        self.inner
            .send(ChannelEvent::Terminated {
                reason: reason.into(),
            })
            .is_ok()
    }
}

//! Environment signals.
//!
//! Two external signals drive recovery work: `reconnect` (connectivity
//! restored) and `became-visible` (the application returned to the
//! foreground). The bus itself does not detect either condition; platform
//! glue observes the environment and calls [`SignalBus::emit`].
//!
//! Standard wiring:
//!
//! - `reconnect` → drain the pending-operation queue, then refresh stale
//!   foreground keys
//! - `became-visible` → refresh stale foreground keys
//!
//! Both handlers are idempotent downstream (draining an empty queue and
//! refreshing zero stale keys are no-ops), so duplicate or overlapping
//! signals are harmless.

use std::fmt;
use std::future::Future;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const SIGNAL_CHANNEL_CAPACITY: usize = 16;

/// An environment transition worth reacting to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    /// Network connectivity was restored.
    Reconnect,
    /// The application came back into the foreground.
    BecameVisible,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Reconnect => write!(f, "reconnect"),
            Signal::BecameVisible => write!(f, "became-visible"),
        }
    }
}

/// Broadcast fan-out for environment signals.
///
/// Cheap to clone; clones share the channel.
#[derive(Clone)]
pub struct SignalBus {
    sender: broadcast::Sender<Signal>,
}

impl SignalBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);
        SignalBus { sender }
    }

    /// Publish a signal to every subscriber.
    ///
    /// Returns the number of subscribers that received it. Emitting with
    /// no subscribers is not an error.
    pub fn emit(&self, signal: Signal) -> usize {
        debug!("Signal: {}", signal);
        self.sender.send(signal).unwrap_or(0)
    }

    /// Subscribe to future signals.
    pub fn subscribe(&self) -> SignalReceiver {
        SignalReceiver {
            inner: self.sender.subscribe(),
        }
    }

    /// Spawn a task that runs `handler` for every signal.
    ///
    /// The handler runs to completion before the next signal is taken, so
    /// a reconnect drain finishes before an overlapping refresh starts.
    /// The task ends when the bus is dropped; abort the handle to stop it
    /// earlier.
    pub fn spawn_handler<F, Fut>(&self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(Signal) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            while let Some(signal) = receiver.recv().await {
                handler(signal).await;
            }
        })
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        SignalBus::new()
    }
}

/// Receiving end of a [`SignalBus`].
pub struct SignalReceiver {
    inner: broadcast::Receiver<Signal>,
}

impl SignalReceiver {
    /// Wait for the next signal; `None` once the bus is dropped.
    ///
    /// If the receiver lags behind the channel capacity, intermediate
    /// signals are skipped. That is acceptable here: handlers react to the
    /// latest state of the environment, not to signal counts.
    pub async fn recv(&mut self) -> Option<Signal> {
        loop {
            match self.inner.recv().await {
                Ok(signal) => return Some(signal),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

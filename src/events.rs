//! The uniform connection-event surface and its listener registry.
//!
//! Backends remap their raw event streams into [`ConnectionEvent`]s and
//! publish them through a [`Listeners`] registry; the wallet service
//! re-publishes them unchanged on its own registry. Delivery order across
//! distinct listeners is unspecified.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::connection::Connection;
use crate::error::WalletError;

/// The kind of a [`ConnectionEvent`], used to register listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    Disconnect,
    ChainChanged,
    AccountsChanged,
}

/// An event on the uniform connection-event surface.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A connection was established.
    Connect(Connection),
    /// The connection was closed, with the triggering error if there was one.
    Disconnect(Option<WalletError>),
    /// The connected wallet switched to another chain.
    ChainChanged(u64),
    /// The connected wallet's account list changed.
    AccountsChanged(Vec<String>),
}

impl ConnectionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ConnectionEvent::Connect(_) => EventKind::Connect,
            ConnectionEvent::Disconnect(_) => EventKind::Disconnect,
            ConnectionEvent::ChainChanged(_) => EventKind::ChainChanged,
            ConnectionEvent::AccountsChanged(_) => EventKind::AccountsChanged,
        }
    }
}

/// A registered event listener.
pub type EventListener = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

/// Handle for removing a listener from a [`Listeners`] registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

/// A listener registry: event kind → set of callbacks.
#[derive(Default)]
pub struct Listeners {
    seq: AtomicU64,
    entries: Mutex<Vec<(ListenerId, EventKind, EventListener)>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for events of `kind`.
    pub fn listen(&self, kind: EventKind, listener: EventListener) -> ListenerId {
        let id = ListenerId(self.seq.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .expect("listener registry poisoned")
            .push((id, kind, listener));
        id
    }

    /// Remove a previously registered listener. Unknown ids are ignored.
    pub fn unlisten(&self, id: ListenerId) {
        self.entries
            .lock()
            .expect("listener registry poisoned")
            .retain(|(entry_id, _, _)| *entry_id != id);
    }

    /// Remove all listeners.
    pub fn clear(&self) {
        self.entries
            .lock()
            .expect("listener registry poisoned")
            .clear();
    }

    /// Dispatch `event` to every listener registered for its kind.
    ///
    /// Listeners are cloned out of the registry before being invoked, so a
    /// listener may listen/unlisten reentrantly.
    pub fn dispatch(&self, event: &ConnectionEvent) {
        for listener in self.matching(event.kind()) {
            listener(event);
        }
    }

    /// Dispatch `event` on the next scheduling tick, decoupled from the
    /// caller — the caller's own continuation runs before listeners fire.
    /// The listener set is captured at call time.
    pub fn dispatch_later(&self, event: ConnectionEvent) {
        let listeners = self.matching(event.kind());
        tokio::spawn(async move {
            for listener in listeners {
                listener(&event);
            }
        });
    }

    fn matching(&self, kind: EventKind) -> Vec<EventListener> {
        self.entries
            .lock()
            .expect("listener registry poisoned")
            .iter()
            .filter(|(_, entry_kind, _)| *entry_kind == kind)
            .map(|(_, _, listener)| Arc::clone(listener))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_listener(counter: &Arc<AtomicUsize>) -> EventListener {
        let counter = Arc::clone(counter);
        Arc::new(move |_event| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_dispatch_reaches_matching_kind_only() {
        let listeners = Listeners::new();
        let chain = Arc::new(AtomicUsize::new(0));
        let accounts = Arc::new(AtomicUsize::new(0));

        listeners.listen(EventKind::ChainChanged, counting_listener(&chain));
        listeners.listen(EventKind::AccountsChanged, counting_listener(&accounts));

        listeners.dispatch(&ConnectionEvent::ChainChanged(5));

        assert_eq!(chain.load(Ordering::SeqCst), 1);
        assert_eq!(accounts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unlisten_removes_listener() {
        let listeners = Listeners::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let id = listeners.listen(EventKind::Disconnect, counting_listener(&counter));
        listeners.dispatch(&ConnectionEvent::Disconnect(None));
        listeners.unlisten(id);
        listeners.dispatch(&ConnectionEvent::Disconnect(None));

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_removes_all_listeners() {
        let listeners = Listeners::new();
        let counter = Arc::new(AtomicUsize::new(0));

        listeners.listen(EventKind::ChainChanged, counting_listener(&counter));
        listeners.listen(EventKind::ChainChanged, counting_listener(&counter));
        listeners.clear();
        listeners.dispatch(&ConnectionEvent::ChainChanged(1));

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dispatch_later_is_decoupled() {
        let listeners = Listeners::new();
        let counter = Arc::new(AtomicUsize::new(0));

        listeners.listen(EventKind::ChainChanged, counting_listener(&counter));
        listeners.dispatch_later(ConnectionEvent::ChainChanged(1));

        // not delivered inline
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::task::yield_now().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}

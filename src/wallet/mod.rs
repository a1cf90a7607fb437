//! The wallet service — the connection state machine.
//!
//! Owns the canonical [`WalletState`], sequences connect/disconnect calls
//! against its backend and guarantees single-flight semantics: concurrent
//! calls in the same direction coalesce onto one outcome, calls in opposite
//! directions serialize by chaining on the in-flight operation's settlement.
//! Every transition publishes an immutable state snapshot to subscribers.

pub mod state;

mod pending;

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};

use crate::connection::{ConnectOptions, Connection, ConnectionBackend};
use crate::error::WalletError;
use crate::events::{ConnectionEvent, EventKind, EventListener, ListenerId, Listeners};

use pending::Settlement;
use state::{Observers, ObserverId, StateObserver, WalletState, WalletStatus};

struct StateCell {
    state: WalletState,
    /// At most one pending operation per direction; cleared on settlement.
    connecting: Option<Settlement<Connection>>,
    disconnecting: Option<Settlement<()>>,
}

struct ServiceInner {
    backend: Arc<dyn ConnectionBackend>,
    cell: Mutex<StateCell>,
    observers: Observers,
    listeners: Listeners,
    backend_listeners: Mutex<Vec<ListenerId>>,
}

/// How a connect/disconnect call proceeds, decided atomically under the
/// state lock.
enum Plan<T: Clone, U: Clone> {
    /// Already in the target state — nothing to do.
    Immediate(T),
    /// An operation in the same direction is in flight — share its outcome.
    Join(Settlement<T>),
    /// An operation in the opposite direction is in flight — re-issue after
    /// it settles, sharing the pending outcome with the caller meanwhile.
    Defer(Settlement<T>, Option<Settlement<U>>),
    /// We own the transition — drive the backend.
    Start(Settlement<T>),
}

/// The wallet service.
///
/// Cheap to clone; clones share the same state machine.
#[derive(Clone)]
pub struct WalletService {
    inner: Arc<ServiceInner>,
}

impl WalletService {
    /// Create a wallet service over a connection backend.
    ///
    /// The service assumes exclusive use of the backend — sharing one
    /// backend instance across services is unsupported.
    pub fn new(backend: Arc<dyn ConnectionBackend>) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                backend,
                cell: Mutex::new(StateCell {
                    state: WalletState::default(),
                    connecting: None,
                    disconnecting: None,
                }),
                observers: Observers::default(),
                listeners: Listeners::new(),
                backend_listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The current state snapshot.
    pub fn state(&self) -> WalletState {
        self.cell().state.clone()
    }

    /// Connect through the backend.
    ///
    /// Returns the current connection immediately when already connected.
    /// Concurrent calls share one outcome; a call issued while a disconnect
    /// is in flight waits for it to settle and then re-issues itself.
    pub async fn connect(
        &self,
        options: Option<ConnectOptions>,
    ) -> Result<Connection, WalletError> {
        let (plan, snapshot) = {
            let mut cell = self.cell();

            if let WalletState::Connected(connection) = &cell.state {
                (Plan::Immediate(connection.clone()), None)
            } else {
                let pending = cell.connecting.get_or_insert_with(Settlement::new).clone();
                match cell.state.status() {
                    WalletStatus::Connecting => (Plan::Join(pending), None),
                    WalletStatus::Disconnecting => {
                        (Plan::Defer(pending, cell.disconnecting.clone()), None)
                    }
                    _ => {
                        cell.state = WalletState::Connecting;
                        (Plan::Start(pending), Some(cell.state.clone()))
                    }
                }
            }
        };

        if let Some(snapshot) = snapshot {
            self.inner.observers.notify(&snapshot);
        }

        match plan {
            Plan::Immediate(connection) => Ok(connection),
            Plan::Join(pending) => pending.wait().await,
            Plan::Defer(pending, in_flight) => {
                self.reissue_connect(in_flight, options);
                pending.wait().await
            }
            Plan::Start(pending) => {
                self.attach_backend_listeners();

                if let Err(error) = self.inner.backend.connect(options).await {
                    tracing::warn!(%error, "backend connect failed");
                    self.detach_backend_listeners();
                    self.fail(error, |cell| cell.connecting.take());
                }

                // resolved by the backend's connect event
                pending.wait().await
            }
        }
    }

    /// Disconnect from the backend.
    ///
    /// Resolves immediately when already disconnected. Concurrent calls
    /// share one outcome; a call issued while a connect is in flight waits
    /// for it to settle and then re-issues itself.
    pub async fn disconnect(&self) -> Result<(), WalletError> {
        let (plan, snapshot) = {
            let mut cell = self.cell();

            if cell.state.status() == WalletStatus::Disconnected {
                (Plan::Immediate(()), None)
            } else {
                let pending = cell
                    .disconnecting
                    .get_or_insert_with(Settlement::new)
                    .clone();
                match cell.state.status() {
                    WalletStatus::Disconnecting => (Plan::Join(pending), None),
                    WalletStatus::Connecting => {
                        (Plan::Defer(pending, cell.connecting.clone()), None)
                    }
                    _ => {
                        cell.state = WalletState::Disconnecting;
                        (Plan::Start(pending), Some(cell.state.clone()))
                    }
                }
            }
        };

        if let Some(snapshot) = snapshot {
            self.inner.observers.notify(&snapshot);
        }

        match plan {
            Plan::Immediate(()) => Ok(()),
            Plan::Join(pending) => pending.wait().await,
            Plan::Defer(pending, in_flight) => {
                self.reissue_disconnect(in_flight);
                pending.wait().await
            }
            Plan::Start(pending) => {
                // a disconnect after a failed connect must still observe the
                // backend's disconnect event
                self.attach_backend_listeners();

                if let Err(error) = self.inner.backend.disconnect(None).await {
                    tracing::warn!(%error, "backend disconnect failed");
                    self.fail(error, |cell| cell.disconnecting.take());
                }

                // resolved by the backend's disconnect event
                let outcome = pending.wait().await;
                if outcome.is_ok() {
                    self.detach_backend_listeners();
                }
                outcome
            }
        }
    }

    /// Wait for a connection without initiating one.
    ///
    /// Resolves immediately when connected; otherwise waits on (or creates)
    /// the pending connect settlement. Never triggers a connect — use
    /// [`WalletService::connect`] for that.
    pub async fn connection(&self) -> Result<Connection, WalletError> {
        let pending = {
            let mut cell = self.cell();
            if let WalletState::Connected(connection) = &cell.state {
                return Ok(connection.clone());
            }
            cell.connecting.get_or_insert_with(Settlement::new).clone()
        };

        pending.wait().await
    }

    // ── Events + subscriptions ───────────────────────────────────────────

    /// Listen for connection events.
    pub fn listen(&self, kind: EventKind, listener: EventListener) -> ListenerId {
        self.inner.listeners.listen(kind, listener)
    }

    /// Stop listening for connection events.
    pub fn unlisten(&self, id: ListenerId) {
        self.inner.listeners.unlisten(id);
    }

    /// Subscribe to state snapshots.
    pub fn subscribe(&self, observer: StateObserver) -> ObserverId {
        self.inner.observers.subscribe(observer)
    }

    /// Unsubscribe from state snapshots.
    pub fn unsubscribe(&self, id: ObserverId) {
        self.inner.observers.unsubscribe(id);
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn cell(&self) -> std::sync::MutexGuard<'_, StateCell> {
        self.inner.cell.lock().expect("wallet state poisoned")
    }

    /// Move to the error state and reject the pending operation taken by
    /// `take_pending`.
    fn fail<T: Clone>(
        &self,
        error: WalletError,
        take_pending: impl FnOnce(&mut StateCell) -> Option<Settlement<T>>,
    ) {
        let (snapshot, pending) = {
            let mut cell = self.cell();
            cell.state = WalletState::Error(error.clone());
            (cell.state.clone(), take_pending(&mut cell))
        };

        self.inner.observers.notify(&snapshot);
        if let Some(pending) = pending {
            pending.settle(Err(error));
        }
    }

    /// Re-issue a connect once `after` settles, success or failure.
    fn reissue_connect(&self, after: Option<Settlement<()>>, options: Option<ConnectOptions>) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Some(in_flight) = after {
                let _ = in_flight.wait().await;
            }
            let _ = service.connect_erased(options).await;
        });
    }

    /// Re-issue a disconnect once `after` settles, success or failure.
    fn reissue_disconnect(&self, after: Option<Settlement<Connection>>) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Some(in_flight) = after {
                let _ = in_flight.wait().await;
            }
            let _ = service.disconnect_erased().await;
        });
    }

    // boxed so the re-issue tasks don't make the futures self-referential
    fn connect_erased(
        &self,
        options: Option<ConnectOptions>,
    ) -> Pin<Box<dyn Future<Output = Result<Connection, WalletError>> + Send + '_>> {
        Box::pin(self.connect(options))
    }

    fn disconnect_erased(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<(), WalletError>> + Send + '_>> {
        Box::pin(self.disconnect())
    }

    fn attach_backend_listeners(&self) {
        let mut attached = self
            .inner
            .backend_listeners
            .lock()
            .expect("listener ids poisoned");
        if !attached.is_empty() {
            return;
        }

        let weak: Weak<ServiceInner> = Arc::downgrade(&self.inner);
        let handler: EventListener = Arc::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                WalletService { inner }.handle_backend_event(event);
            }
        });

        for kind in [
            EventKind::Connect,
            EventKind::Disconnect,
            EventKind::ChainChanged,
            EventKind::AccountsChanged,
        ] {
            attached.push(self.inner.backend.listen(kind, Arc::clone(&handler)));
        }
    }

    fn detach_backend_listeners(&self) {
        let ids: Vec<ListenerId> = std::mem::take(
            &mut *self
                .inner
                .backend_listeners
                .lock()
                .expect("listener ids poisoned"),
        );
        for id in ids {
            self.inner.backend.unlisten(id);
        }
    }

    fn handle_backend_event(&self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Connect(connection) => self.handle_connect(connection.clone()),
            ConnectionEvent::Disconnect(error) => self.handle_disconnect(error.clone()),
            // chain and account changes pass through unchanged
            ConnectionEvent::ChainChanged(chain_id) => self
                .inner
                .listeners
                .dispatch(&ConnectionEvent::ChainChanged(*chain_id)),
            ConnectionEvent::AccountsChanged(accounts) => self
                .inner
                .listeners
                .dispatch(&ConnectionEvent::AccountsChanged(accounts.clone())),
        }
    }

    fn handle_connect(&self, connection: Connection) {
        let (snapshot, pending) = {
            let mut cell = self.cell();
            cell.state = WalletState::Connected(connection.clone());
            (cell.state.clone(), cell.connecting.take())
        };

        self.inner.observers.notify(&snapshot);
        if let Some(pending) = pending {
            pending.settle(Ok(connection.clone()));
        }
        self.inner
            .listeners
            .dispatch(&ConnectionEvent::Connect(connection));
    }

    fn handle_disconnect(&self, error: Option<WalletError>) {
        let (snapshot, pending) = {
            let mut cell = self.cell();
            cell.state = WalletState::Disconnected;
            (cell.state.clone(), cell.disconnecting.take())
        };

        self.inner.observers.notify(&snapshot);
        if let Some(pending) = pending {
            pending.settle(Ok(()));
        }
        self.inner
            .listeners
            .dispatch(&ConnectionEvent::Disconnect(error));
    }
}

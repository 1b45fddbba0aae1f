use super::CollectorClient;
use crate::{config, error::MetricsError, item::Item};
use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

/// Failed lookups allowed before this process stops trying to reach the collector.
pub const BIND_ATTEMPTS: u32 = 2;

/// Establishes a connection to the collector.
pub trait Connector {
    type Client: CollectorClient + Send + Sync + 'static;

    /// Looks up the collector and connects to it.
    ///
    /// The client should call [`DeathNotifier::binder_died`] once the
    /// connection is lost. It must not do so from inside `connect`.
    ///
    /// # Errors
    /// Returns an error if the collector cannot be reached.
    fn connect(&self, notifier: DeathNotifier) -> Result<Self::Client, MetricsError>;
}

/// Where a [`ServiceConnection`] stands with respect to the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindState {
    /// No connection yet; the next request will look the collector up.
    Unbound,
    /// Connected.
    Bound,
    /// Lookups failed [`BIND_ATTEMPTS`] times; requests are dropped until reset.
    Exhausted,
}

struct Binding<T> {
    service: Option<Arc<T>>,
    remaining: u32,
    generation: u64,
}

impl<T> Binding<T> {
    const fn new() -> Self {
        Self {
            service: None,
            remaining: BIND_ATTEMPTS,
            generation: 0,
        }
    }

    fn reset(&mut self) {
        self.remaining = BIND_ATTEMPTS;
        self.service = None;
    }
}

fn lock<T>(binding: &Mutex<Binding<T>>) -> MutexGuard<'_, Binding<T>> {
    binding.lock().unwrap_or_else(PoisonError::into_inner)
}

trait Unbind: Send + Sync {
    fn unbind(&self, generation: u64);
}

impl<T: Send + Sync> Unbind for Mutex<Binding<T>> {
    fn unbind(&self, generation: u64) {
        let mut binding = lock(self);
        if binding.generation == generation && binding.service.is_some() {
            log::warn!("reacquire collector connection on next request");
            binding.reset();
        }
    }
}

/// Liveness callback handed to a connected client.
///
/// May be fired from any thread. Notifications for a connection that has
/// already been replaced are ignored.
///
#[derive(Clone)]
pub struct DeathNotifier {
    binding: Weak<dyn Unbind>,
    generation: u64,
}

impl DeathNotifier {
    /// A notifier that is not attached to any connection.
    #[must_use]
    pub fn detached() -> Self {
        let binding: Weak<Mutex<Binding<()>>> = Weak::new();
        Self {
            binding,
            generation: 0,
        }
    }

    /// Marks the connection as dead so the next request binds again.
    pub fn binder_died(&self) {
        if let Some(binding) = self.binding.upgrade() {
            binding.unbind(self.generation);
        }
    }
}

impl fmt::Debug for DeathNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeathNotifier")
            .field("generation", &self.generation)
            .field("attached", &(self.binding.strong_count() > 0))
            .finish()
    }
}

/// Shared, lazily established connection to the collector.
///
/// Lookups happen on demand under a mutex. After [`BIND_ATTEMPTS`] failed
/// lookups the connection gives up until [`ServiceConnection::drop_instance`]
/// or a death notification resets it.
///
pub struct ServiceConnection<C: Connector> {
    connector: C,
    enabled: bool,
    binding: Arc<Mutex<Binding<C::Client>>>,
}

impl<C: Connector> ServiceConnection<C> {
    /// Creates a connection gated by [`config::is_logging_enabled`].
    pub fn new(connector: C) -> Self {
        Self::with_enabled(connector, config::is_logging_enabled())
    }

    pub fn with_enabled(connector: C, enabled: bool) -> Self {
        Self {
            connector,
            enabled,
            binding: Arc::new(Mutex::new(Binding::new())),
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn state(&self) -> BindState {
        let binding = lock(&self.binding);
        if binding.service.is_some() {
            BindState::Bound
        } else if binding.remaining == 0 {
            BindState::Exhausted
        } else {
            BindState::Unbound
        }
    }

    fn notifier(&self, generation: u64) -> DeathNotifier {
        let strong: Arc<dyn Unbind> = self.binding.clone();
        DeathNotifier {
            binding: Arc::downgrade(&strong),
            generation,
        }
    }

    /// Returns the connected client, looking the collector up if needed.
    pub fn get_instance(&self) -> Option<Arc<C::Client>> {
        if !self.enabled {
            log::debug!("metrics submission disabled");
            return None;
        }
        let mut binding = lock(&self.binding);
        // a missing service with attempts left means we have not tried yet
        // or the previous connection died
        if binding.service.is_none() && binding.remaining > 0 {
            let generation = binding.generation + 1;
            match self.connector.connect(self.notifier(generation)) {
                Ok(client) => {
                    binding.generation = generation;
                    binding.service = Some(Arc::new(client));
                }
                Err(e) => {
                    binding.remaining -= 1;
                    log::debug!(
                        "unable to bind to collector: {e} ({} attempts left)",
                        binding.remaining
                    );
                }
            }
        }
        binding.service.clone()
    }

    /// Forgets the current connection and restores the lookup budget.
    pub fn drop_instance(&self) {
        lock(&self.binding).reset();
    }
}

impl<C: Connector> CollectorClient for ServiceConnection<C> {
    fn submit(&self, item: &Item) -> Result<(), MetricsError> {
        let service = self
            .get_instance()
            .ok_or(MetricsError::ServiceUnavailable)?;
        service.submit(item)
    }

    fn submit_encoded(&self, bytes: &[u8]) -> Result<(), MetricsError> {
        log::trace!("delivering {} bytes", bytes.len());
        let service = self
            .get_instance()
            .ok_or(MetricsError::ServiceUnavailable)?;
        service.submit_encoded(bytes).inspect_err(|e| {
            log::warn!("failed({e}) to record: {} bytes", bytes.len());
        })
    }
}

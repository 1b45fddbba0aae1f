mod service;
mod socket;
mod unnamed_pipe;

use crate::{error::MetricsError, item::Item};

pub use service::{BIND_ATTEMPTS, BindState, Connector, DeathNotifier, ServiceConnection};
pub use socket::{IPCSocketClient, IPCSocketConnector};
pub use unnamed_pipe::{IPCPipeClient, PipeSender};

/// Something that forwards finished items to the collector.
///
/// Implementations report failures to the caller and never retry.
pub trait CollectorClient {
    /// Submits a fully built item.
    ///
    /// # Errors
    /// Returns an error if the item cannot be encoded or delivered.
    fn submit(&self, item: &Item) -> Result<(), MetricsError>;

    /// Submits an item that was already encoded with [`Item::write_to_byte_string`].
    ///
    /// # Errors
    /// Returns an error if the bytes cannot be delivered.
    fn submit_encoded(&self, bytes: &[u8]) -> Result<(), MetricsError>;
}

impl<T: CollectorClient + ?Sized> CollectorClient for std::sync::Arc<T> {
    fn submit(&self, item: &Item) -> Result<(), MetricsError> {
        (**self).submit(item)
    }

    fn submit_encoded(&self, bytes: &[u8]) -> Result<(), MetricsError> {
        (**self).submit_encoded(bytes)
    }
}

use super::{
    CollectorClient,
    service::{Connector, DeathNotifier, ServiceConnection},
};
use crate::{
    error::MetricsError,
    events::{CollectorEvent, DEFAULT_SOCKET, socket_name, write_frame},
    item::Item,
};
use interprocess::local_socket::prelude::*;
use std::{
    io::ErrorKind,
    sync::{Mutex, PoisonError},
};

fn is_disconnect(error: &MetricsError) -> bool {
    matches!(
        error,
        MetricsError::Io(e) if matches!(
            e.kind(),
            ErrorKind::BrokenPipe
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::NotConnected
                | ErrorKind::UnexpectedEof
        )
    )
}

/// A client connected to the collector over a local socket.
#[derive(Debug)]
pub struct IPCSocketClient {
    stream: Mutex<LocalSocketStream>,
    notifier: DeathNotifier,
}

impl IPCSocketClient {
    /// Connects to the collector listening on `socket_path`.
    ///
    /// # Errors
    /// Returns an error if the socket name is invalid or nothing is listening.
    pub fn connect(socket_path: &str) -> Result<Self, MetricsError> {
        Self::connect_with(socket_path, DeathNotifier::detached())
    }

    fn connect_with(socket_path: &str, notifier: DeathNotifier) -> Result<Self, MetricsError> {
        let stream = LocalSocketStream::connect(socket_name(socket_path)?)?;
        log::debug!("connected to collector on {socket_path}");
        Ok(Self {
            stream: Mutex::new(stream),
            notifier,
        })
    }

    fn send(&self, event: &CollectorEvent) -> Result<(), MetricsError> {
        let mut stream = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        write_frame(&mut *stream, event).inspect_err(|e| {
            if is_disconnect(e) {
                self.notifier.binder_died();
            }
        })
    }
}

impl CollectorClient for IPCSocketClient {
    fn submit(&self, item: &Item) -> Result<(), MetricsError> {
        self.send(&CollectorEvent::try_from(item)?)
    }

    fn submit_encoded(&self, bytes: &[u8]) -> Result<(), MetricsError> {
        self.send(&CollectorEvent::ByteString(bytes.to_vec()))
    }
}

/// Looks the collector up by socket name.
#[derive(Debug, Clone)]
pub struct IPCSocketConnector {
    socket_path: String,
}

impl Default for IPCSocketConnector {
    fn default() -> Self {
        Self {
            socket_path: DEFAULT_SOCKET.into(),
        }
    }
}

impl IPCSocketConnector {
    /// Sets the name of the collector's socket.
    #[must_use]
    pub fn socket(mut self, socket_path: &str) -> Self {
        self.socket_path = socket_path.to_string();
        self
    }

    /// Wraps the connector in a lazily bound [`ServiceConnection`].
    ///
    /// Nothing is connected until the first submission.
    ///
    /// # Example
    /// ```no_run
    /// use metrics_item::{CollectorClient, IPCSocketConnector, Item};
    ///
    /// let service = IPCSocketConnector::default().socket("my_metrics.sock").build();
    /// let mut item = Item::new("audiotrack");
    /// item.set("latency", 42i32).unwrap();
    /// if let Err(e) = service.submit(&item) {
    ///     eprintln!("Failed to submit item: {e}");
    /// }
    /// ```
    #[must_use]
    pub fn build(self) -> ServiceConnection<Self> {
        ServiceConnection::new(self)
    }
}

impl Connector for IPCSocketConnector {
    type Client = IPCSocketClient;

    fn connect(&self, notifier: DeathNotifier) -> Result<IPCSocketClient, MetricsError> {
        IPCSocketClient::connect_with(&self.socket_path, notifier)
    }
}

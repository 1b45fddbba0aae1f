use super::CollectorClient;
use crate::{
    error::MetricsError,
    events::{CollectorEvent, write_frame},
    item::Item,
};
use std::sync::{Mutex, PoisonError};

/// Writing end of the pipe handed out by [`crate::IPCPipeCollector::new`].
pub type PipeSender = interprocess::unnamed_pipe::Sender;

/// A client writing to a collector over an unnamed pipe.
#[derive(Debug)]
pub struct IPCPipeClient {
    sender: Mutex<PipeSender>,
}

impl IPCPipeClient {
    /// Creates a client from the sending end of a pipe.
    /// This is typically called in a child process after receiving the handle
    /// from the parent process.
    ///
    /// # Example
    /// ```
    /// use metrics_item::{CollectorClient, IPCPipeClient, IPCPipeCollector, Item};
    ///
    /// let (collector, sender) = IPCPipeCollector::new().unwrap();
    /// let client = IPCPipeClient::new(sender);
    /// client.submit(&Item::new("codec")).unwrap();
    /// # drop(collector);
    /// ```
    #[must_use]
    pub fn new(sender: PipeSender) -> Self {
        Self {
            sender: Mutex::new(sender),
        }
    }

    fn send(&self, event: &CollectorEvent) -> Result<(), MetricsError> {
        let mut sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        write_frame(&mut *sender, event)
    }
}

impl CollectorClient for IPCPipeClient {
    fn submit(&self, item: &Item) -> Result<(), MetricsError> {
        self.send(&CollectorEvent::try_from(item)?)
    }

    fn submit_encoded(&self, bytes: &[u8]) -> Result<(), MetricsError> {
        self.send(&CollectorEvent::ByteString(bytes.to_vec()))
    }
}

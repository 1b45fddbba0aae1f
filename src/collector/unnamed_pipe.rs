use super::handlers::{ItemHandler, default_handler, handle_frame};
use crate::{client::PipeSender, error::MetricsError, events::read_frame, item::Item};
use interprocess::unnamed_pipe::{Recver, pipe};
use std::{io::BufReader, sync::Arc};
#[cfg(not(feature = "tokio"))]
use std::thread;
#[cfg(feature = "tokio")]
use tokio::task;

/// Receives items written to one end of an unnamed pipe.
pub struct IPCPipeCollector {
    receiver: Recver,
    handler: ItemHandler,
}

impl IPCPipeCollector {
    /// Creates a new collector with the receiving end of an unnamed pipe.
    /// Returns both the collector and the sending handle that should be transferred
    /// to child processes.
    ///
    /// # Example
    /// ```
    /// let (collector, sender_handle) = metrics_item::IPCPipeCollector::new().unwrap();
    /// // Pass sender_handle to child process via inheritance or serialization
    /// # drop((collector, sender_handle));
    /// ```
    ///
    /// # Errors
    /// Returns an error if pipe creation fails.
    pub fn new() -> Result<(Self, PipeSender), MetricsError> {
        let (sender, receiver) = pipe()?;
        Ok((
            Self {
                receiver,
                handler: default_handler(),
            },
            sender,
        ))
    }

    /// Sets the callback invoked for each decoded item.
    ///
    /// Defaults to [`super::forward_to_metrics`].
    #[must_use]
    pub fn on_item<F>(mut self, handler: F) -> Self
    where
        F: Fn(Item) + Send + Sync + 'static,
    {
        self.handler = Arc::new(handler);
        self
    }

    /// Starts collecting items from the unnamed pipe.
    /// This consumes the receiver and reads it on a dedicated thread, or on
    /// the blocking pool when running under tokio. Collection stops once every
    /// sender has been dropped.
    ///
    /// # Errors
    /// Returns an error if the reader thread cannot be spawned.
    pub fn start_collecting(self) -> Result<(), MetricsError> {
        let Self { receiver, handler } = self;

        #[cfg(not(feature = "tokio"))]
        thread::Builder::new()
            .name("mediametrics-pipe".into())
            .spawn(move || run_collector(receiver, &handler))?;

        #[cfg(feature = "tokio")]
        task::spawn_blocking(move || run_collector(receiver, &handler));

        Ok(())
    }
}

fn run_collector(receiver: Recver, handler: &ItemHandler) {
    let mut reader = BufReader::new(receiver);
    loop {
        match read_frame(&mut reader) {
            Ok(Some(frame)) => handle_frame(&frame, handler),
            Ok(None) => {
                log::info!("Metrics sender closed, stopping collector");
                break;
            }
            Err(e) => {
                log::error!("Error reading from pipe: {e}");
                break;
            }
        }
    }
}

use super::handlers::{ItemHandler, default_handler, handle_frame};
use crate::{
    error::MetricsError,
    events::{DEFAULT_SOCKET, socket_name},
    item::Item,
};
#[cfg(feature = "tokio")]
use crate::events::read_frame_async;
#[cfg(not(feature = "tokio"))]
use crate::events::read_frame;
#[cfg(feature = "tokio")]
use interprocess::local_socket::tokio::{Stream, prelude::*};
use interprocess::local_socket::ListenerOptions;
#[cfg(not(feature = "tokio"))]
use interprocess::local_socket::{Stream, prelude::*};
use std::{path::PathBuf, sync::Arc};
#[cfg(not(feature = "tokio"))]
use std::{io::BufReader, thread};
#[cfg(feature = "tokio")]
use tokio::{io::BufReader, task};

/// Receives items from any number of clients over a local socket.
pub struct IPCSocketCollector {
    socket_path: String,
    handler: ItemHandler,
}

impl Default for IPCSocketCollector {
    fn default() -> Self {
        Self {
            socket_path: DEFAULT_SOCKET.into(),
            handler: default_handler(),
        }
    }
}

impl IPCSocketCollector {
    /// Sets the path for the IPC socket file.
    #[must_use]
    pub fn socket(mut self, socket_path: &str) -> Self {
        self.socket_path = socket_path.to_string();
        self
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

    /// Binds the socket and starts accepting clients.
    /// Each connection is served on its own thread/task; every frame it
    /// carries is decoded and handed to the item handler. Frames that fail to
    /// decode are logged and counted, and the connection carries on.
    /// If the socket file already exists, it will be removed before binding.
    ///
    /// # Example
    /// ```no_run
    /// let collector = metrics_item::IPCSocketCollector::default().socket("doc_metrics.sock");
    /// if let Err(e) = collector.start_collecting() {
    ///     eprintln!("Failed to start metrics collector: {}", e);
    /// }
    /// ```
    ///
    /// # Errors
    /// Returns an error if the socket cannot be bound.
    pub fn start_collecting(self) -> Result<(), MetricsError> {
        let socket_path = self.socket_path;
        let socket_file: PathBuf = format!("/tmp/{socket_path}").into();
        if socket_file.exists() {
            std::fs::remove_file(&socket_file)?;
        }
        let options = ListenerOptions::new().name(socket_name(&socket_path)?);
        let handler = self.handler;

        #[cfg(not(feature = "tokio"))]
        {
            let listener = options.create_sync()?;
            thread::spawn(move || {
                for conn in listener.incoming() {
                    match conn {
                        Ok(stream) => {
                            let handler = handler.clone();
                            thread::spawn(move || serve(stream, &handler));
                        }
                        Err(e) => log::debug!("failed to accept collector client: {e}"),
                    }
                }
                let _ = std::fs::remove_file(&socket_file);
            });
        }

        #[cfg(feature = "tokio")]
        {
            let listener = options.create_tokio()?;
            task::spawn(async move {
                loop {
                    match listener.accept().await {
                        Ok(stream) => {
                            task::spawn(serve(stream, handler.clone()));
                        }
                        Err(e) => log::debug!("failed to accept collector client: {e}"),
                    }
                }
            });
        }

        log::info!("collecting items on {socket_path}");
        Ok(())
    }
}

#[cfg(not(feature = "tokio"))]
fn serve(stream: Stream, handler: &ItemHandler) {
    let mut reader = BufReader::new(stream);
    loop {
        match read_frame(&mut reader) {
            Ok(Some(frame)) => handle_frame(&frame, handler),
            Ok(None) => break,
            // the stream cannot be resynchronised after a bad length prefix
            Err(e) => {
                log::debug!("dropping collector client: {e}");
                break;
            }
        }
    }
}

#[cfg(feature = "tokio")]
async fn serve(stream: Stream, handler: ItemHandler) {
    let mut reader = BufReader::new(stream);
    loop {
        match read_frame_async(&mut reader).await {
            Ok(Some(frame)) => handle_frame(&frame, &handler),
            Ok(None) => break,
            Err(e) => {
                log::debug!("dropping collector client: {e}");
                break;
            }
        }
    }
}

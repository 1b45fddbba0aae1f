#![warn(clippy::pedantic, clippy::nursery, clippy::cargo, clippy::perf)]

//! # `metrics_item`
//!
//! Self-describing metrics records for out-of-process collection.
//!
//! An [`Item`] is a keyed record carrying the reporting process's identity and
//! a small set of named, typed properties. Items are built in the reporting
//! process, encoded with one of two wire layouts ([`Parcel`] or the flat byte
//! string), and shipped over IPC to a collector that decodes them again.
//!
//! ```
//! use metrics_item::Item;
//!
//! let mut item = Item::new("audiorecord");
//! item.set("channels", 2i32)?
//!     .set("encoding", "pcm16")?
//!     .add_int64("frames", 480)?;
//!
//! let bytes = item.write_to_byte_string()?;
//! let decoded = Item::read_from_byte_string(&bytes)?;
//! assert_eq!(decoded.get_int64("frames"), Some(480));
//! # Ok::<(), metrics_item::MetricsError>(())
//! ```
//!
//! ## Async Support
//!
//! Async support is available via the `tokio` feature flag. When enabled, collectors run as
//! Tokio tasks and require a Tokio runtime. Enable with:
//!
//! ```toml
//! [dependencies]
//! metrics_item = { version = "...", features = ["tokio"] }
//! ```
//!
//! If the `tokio` feature is not enabled, collectors use threads and blocking IO.
//! Clients always write synchronously.
//!
//! See README and demos for details.

mod client;
mod codec;
mod collector;
pub mod config;
mod error;
mod events;
mod item;
mod prop;
mod store;
mod util;
mod value;

pub use client::{
    BIND_ATTEMPTS, BindState, CollectorClient, Connector, DeathNotifier, IPCPipeClient,
    IPCSocketClient, IPCSocketConnector, PipeSender, ServiceConnection,
};
pub use codec::{BYTE_STRING_VERSION, PARCEL_VERSION, Parcel};
pub use collector::{
    ITEMS_RECEIVED, ITEMS_REJECTED, IPCPipeCollector, IPCSocketCollector, ItemHandler,
    forward_to_metrics,
};
pub use config::is_logging_enabled;
pub use error::MetricsError;
pub use events::{CollectorEvent, DEFAULT_SOCKET, MAX_FRAME_SIZE};
pub use item::{Item, PROTO_LAST};
pub use prop::Property;
pub use store::{GROW_PROPS, PropertyStore};
pub use util::monotonic_now_ns;
pub use value::{PropertyValue, ValueType};

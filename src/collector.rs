mod handlers;
mod socket;
mod unnamed_pipe;

pub use handlers::{ITEMS_RECEIVED, ITEMS_REJECTED, ItemHandler, forward_to_metrics};
pub use socket::IPCSocketCollector;
pub use unnamed_pipe::IPCPipeCollector;

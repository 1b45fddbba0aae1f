//! This example demonstrates handing the sending end of an unnamed pipe to a worker and collecting its items.
//!
//! The sender handle is converted to a raw OS handle, passed over a channel the way it would be
//! inherited by a child process, and turned back into an `IPCPipeClient` on the other side.

use metrics_item::{CollectorClient, IPCPipeClient, IPCPipeCollector, Item, PipeSender};
use std::{os, sync::mpsc, thread};

#[cfg(windows)]
type PipeHandle = os::windows::io::OwnedHandle;
#[cfg(unix)]
type PipeHandle = os::unix::io::OwnedFd;

fn worker(handle: PipeHandle) {
    let client = IPCPipeClient::new(PipeSender::from(handle));
    for attempt in 0..3i32 {
        let mut item = Item::new("mediadrm");
        if let Err(e) = item
            .set("attempt", attempt)
            .and_then(|item| item.set("vendor", "example"))
        {
            eprintln!("Failed to build item: {e}");
            return;
        }
        if let Err(e) = client.submit(&item) {
            eprintln!("Failed to submit item: {e}");
            return;
        }
    }
    // dropping the client closes the pipe and stops the collector
}

#[cfg(not(feature = "tokio"))]
fn main() {
    let (done_tx, done_rx) = mpsc::channel();
    let (collector, sender) = IPCPipeCollector::new().expect("Failed to create IPC collector");
    let collector = collector.on_item(move |item| {
        println!("{item}");
        let _ = done_tx.send(());
    });
    if let Err(e) = collector.start_collecting() {
        eprintln!("Failed to start metrics collector: {e}");
        return;
    }

    let (handle_tx, handle_rx) = mpsc::sync_channel(1);
    handle_tx.send(PipeHandle::from(sender)).unwrap();
    thread::spawn(move || worker(handle_rx.recv().unwrap()));

    for _ in 0..3 {
        done_rx.recv().expect("collector stopped early");
    }
    println!("Collected every item.");
}

#[cfg(feature = "tokio")]
#[tokio::main]
async fn main() {
    let (collector, sender) = IPCPipeCollector::new().expect("Failed to create IPC collector");
    if let Err(e) = collector.start_collecting() {
        eprintln!("Failed to start metrics collector: {e}");
        return;
    }

    let (handle_tx, handle_rx) = mpsc::sync_channel(1);
    handle_tx.send(PipeHandle::from(sender)).unwrap();
    thread::spawn(move || worker(handle_rx.recv().unwrap()))
        .join()
        .expect("worker panicked");

    println!("Items sent; press Ctrl+C to exit.");
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl-c signal");
}

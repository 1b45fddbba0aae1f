//! This example demonstrates how to set up the IPCSocketCollector for gathering items and the Prometheus exporter for exposing them.
//!
//! The IPCSocketCollector listens for items from other processes via an IPC socket. Every numeric property is mirrored into a gauge labelled with the item key, and the Prometheus exporter makes these gauges accessible via an HTTP endpoint for scraping. The example also gracefully handles termination signals (Ctrl+C) to ensure clean shutdown.
//! The metrics are available on `0.0.0.0:9000` for inspection

use metrics_exporter_prometheus::PrometheusBuilder;
use metrics_item::{IPCSocketCollector, forward_to_metrics};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

fn main() {
    // Set up the Prometheus exporter.
    PrometheusBuilder::new()
        .install()
        .expect("Failed to install Prometheus recorder");

    // Set up the collector, printing each item before forwarding it.
    let collector = IPCSocketCollector::default().on_item(|item| {
        println!("{item}");
        forward_to_metrics(&item);
    });
    if let Err(e) = collector.start_collecting() {
        eprintln!("Failed to start metrics collector: {e}");
        return;
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    // Handle Ctrl+C to exit gracefully.
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl-C handler");

    println!("Metrics listener is running. Press Ctrl+C to exit.");

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_secs(1));
    }

    println!("Shutting down metrics listener.");
}

//! This example demonstrates how to run the IPCSocketCollector on a Tokio runtime alongside the Prometheus exporter.
//!
//! Each client connection is served on its own task and every decoded item is mirrored into gauges. The example waits for Ctrl+C before shutting down.
//! The metrics are available on `0.0.0.0:9000` for inspection

#[cfg(not(feature = "tokio"))]
fn main() {
    eprintln!("This example is not available when the Tokio feature is disabled.");
}

#[cfg(feature = "tokio")]
#[tokio::main]
async fn main() {
    // Set up the Prometheus exporter.
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install()
        .expect("Failed to install Prometheus recorder");

    // The default handler forwards every item to the installed recorder.
    let collector = metrics_item::IPCSocketCollector::default();
    if let Err(e) = collector.start_collecting() {
        eprintln!("Failed to start metrics collector: {e}");
        return;
    }

    println!("Metrics listener is running. Press Ctrl+C to exit.");

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl-c signal");

    println!("Shutting down metrics listener.");
}

//! This example demonstrates how to submit items to a collector listening on a local socket.
//!
//! `IPCSocketConnector` names the collector's socket and `build` wraps it in a lazily bound
//! `ServiceConnection`, which looks the collector up on first use and gives up after two failed
//! lookups. Run the `listener` example first.
//!
//! The example submits one item built field by field and one pre-encoded as a byte string.

use metrics_item::{CollectorClient, IPCSocketConnector, Item, MetricsError, monotonic_now_ns};

fn build_item() -> Result<Item, MetricsError> {
    let mut item = Item::new("audiotrack");
    item.set_pid(i32::try_from(std::process::id()).unwrap_or(-1))
        .set_package_name("com.example.player")
        .set_package_version_code(42)
        .set_timestamp(monotonic_now_ns());
    item.set("channelCount", 2i32)?
        .set("underruns", 0i64)?
        .set("latencyMs", 12.5)?
        .set("framesPerBurst", (192i64, 48_000i64))?
        .set("encoding", "AUDIO_FORMAT_PCM_16_BIT")?;
    Ok(item)
}

fn main() {
    let service = IPCSocketConnector::default().build();
    if !service.is_enabled() {
        eprintln!("Metrics submission is disabled for this process.");
        return;
    }

    let mut item = match build_item() {
        Ok(item) => item,
        Err(e) => {
            eprintln!("Failed to build item: {e}");
            return;
        }
    };
    if let Err(e) = service.submit(&item) {
        eprintln!("Failed to submit item: {e}");
        return;
    }

    let encoded = item
        .add_int64("underruns", 1)
        .and_then(|item| item.write_to_byte_string());
    match encoded {
        Ok(bytes) => {
            if let Err(e) = service.submit_encoded(&bytes) {
                eprintln!("Failed to submit encoded item: {e}");
                return;
            }
        }
        Err(e) => {
            eprintln!("Failed to encode item: {e}");
            return;
        }
    }

    println!("Submitted {item}");
}

use crate::{events::CollectorEvent, item::Item, value::PropertyValue};
use std::sync::Arc;

/// Counter bumped for every item decoded by a collector.
pub const ITEMS_RECEIVED: &str = "mediametrics_items_received_total";
/// Counter bumped for every frame a collector could not decode.
pub const ITEMS_REJECTED: &str = "mediametrics_items_rejected_total";

/// Callback receiving each decoded item.
pub type ItemHandler = Arc<dyn Fn(Item) + Send + Sync>;

pub(crate) fn default_handler() -> ItemHandler {
    Arc::new(|item| forward_to_metrics(&item))
}

/// Decodes one frame body and passes the item on.
pub(crate) fn handle_frame(frame: &[u8], handler: &ItemHandler) {
    match CollectorEvent::try_from(frame) {
        Ok(event) => handle_event(&event, handler),
        Err(e) => {
            log::trace!("Failed to parse collector event: {e}");
            metrics::counter!(ITEMS_REJECTED, "encoding" => "unknown").increment(1);
        }
    }
}

pub(crate) fn handle_event(event: &CollectorEvent, handler: &ItemHandler) {
    let encoding = event.encoding();
    match event.decode() {
        Ok(item) => {
            log::trace!("received {encoding} item {item}");
            metrics::counter!(ITEMS_RECEIVED, "encoding" => encoding).increment(1);
            handler(item);
        }
        Err(e) => {
            log::warn!("dropping undecodable {encoding} item: {e}");
            metrics::counter!(ITEMS_REJECTED, "encoding" => encoding).increment(1);
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn gauge_value(value: &PropertyValue) -> Option<f64> {
    match *value {
        PropertyValue::Int32(v) => Some(f64::from(v)),
        PropertyValue::Int64(v) => Some(v as f64),
        PropertyValue::Double(v) => Some(v),
        PropertyValue::Rate(num, den) if den != 0 => Some(num as f64 / den as f64),
        PropertyValue::Rate(..) | PropertyValue::Text(_) | PropertyValue::None => None,
    }
}

/// Mirrors the numeric properties of an item into gauges.
///
/// Each property becomes a gauge named after it and labelled with the item
/// key. Rates are reported as `num / den`. Text, empty values, and rates with
/// a zero denominator are skipped.
///
/// This is the handler collectors use unless given another.
pub fn forward_to_metrics(item: &Item) {
    for prop in item.properties() {
        if let Some(value) = gauge_value(prop.value()) {
            metrics::gauge!(prop.name().to_owned(), "key" => item.key().to_owned()).set(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording_handler() -> (ItemHandler, Arc<Mutex<Vec<Item>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: ItemHandler = Arc::new(move |item| sink.lock().unwrap().push(item));
        (handler, seen)
    }

    #[test]
    fn decoded_frames_reach_the_handler() {
        let mut item = Item::new("nuplayer");
        item.set("frames", 120i64).unwrap();
        let frame: Vec<u8> = (&CollectorEvent::try_from(&item).unwrap()).try_into().unwrap();

        let (handler, seen) = recording_handler();
        handle_frame(&frame, &handler);
        assert_eq!(*seen.lock().unwrap(), vec![item]);
    }

    #[test]
    fn bad_frames_are_dropped() {
        let (handler, seen) = recording_handler();
        handle_frame(b"not messagepack", &handler);
        handle_event(&CollectorEvent::Parcel(vec![9, 0, 0, 0]), &handler);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn only_numeric_values_become_gauges() {
        assert_eq!(gauge_value(&PropertyValue::Int32(-3)), Some(-3.0));
        assert_eq!(gauge_value(&PropertyValue::Int64(1 << 40)), Some(1_099_511_627_776.0));
        assert_eq!(gauge_value(&PropertyValue::Double(0.5)), Some(0.5));
        assert_eq!(gauge_value(&PropertyValue::Rate(3, 4)), Some(0.75));
        assert_eq!(gauge_value(&PropertyValue::Rate(3, 0)), None);
        assert_eq!(gauge_value(&PropertyValue::Text("x".into())), None);
        assert_eq!(gauge_value(&PropertyValue::None), None);
    }

    #[test]
    fn forwarding_without_a_recorder_is_harmless() {
        let mut item = Item::new("k");
        item.set("a", 1i32).unwrap().set("b", "text").unwrap();
        forward_to_metrics(&item);
    }
}

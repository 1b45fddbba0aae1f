use crate::{
    client::CollectorClient,
    error::MetricsError,
    prop::Property,
    store::PropertyStore,
    value::PropertyValue,
};
use std::fmt::{self, Write};

/// Dump format version reported by [`Item`]'s `Display` output.
pub const PROTO_LAST: i32 = 2;

// Longest single `name=value:` fragment in the dump output.
const MAX_PROPERTY_STRING_SIZE: usize = 4096;

/// A metrics record: identity fields plus a bag of named, typed properties.
///
/// An item is owned by one caller at a time. [`Item::duplicate`] produces an
/// independent deep copy that can be handed elsewhere.
///
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    key: String,
    pid: i32,
    uid: u32,
    package_name: String,
    package_version_code: i64,
    timestamp: i64,
    props: PropertyStore,
}

impl Default for Item {
    fn default() -> Self {
        Self::new("")
    }
}

impl Item {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            pid: -1,
            uid: u32::MAX,
            package_name: String::new(),
            package_version_code: 0,
            timestamp: 0,
            props: PropertyStore::new(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn set_key(&mut self, key: impl Into<String>) -> &mut Self {
        self.key = key.into();
        self
    }

    #[must_use]
    pub const fn pid(&self) -> i32 {
        self.pid
    }

    pub const fn set_pid(&mut self, pid: i32) -> &mut Self {
        self.pid = pid;
        self
    }

    #[must_use]
    pub const fn uid(&self) -> u32 {
        self.uid
    }

    pub const fn set_uid(&mut self, uid: u32) -> &mut Self {
        self.uid = uid;
        self
    }

    #[must_use]
    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn set_package_name(&mut self, package_name: impl Into<String>) -> &mut Self {
        self.package_name = package_name.into();
        self
    }

    #[must_use]
    pub const fn package_version_code(&self) -> i64 {
        self.package_version_code
    }

    pub const fn set_package_version_code(&mut self, version_code: i64) -> &mut Self {
        self.package_version_code = version_code;
        self
    }

    /// Nanoseconds on the monotonic clock.
    #[must_use]
    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub const fn set_timestamp(&mut self, timestamp: i64) -> &mut Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub const fn properties(&self) -> &PropertyStore {
        &self.props
    }

    pub(crate) const fn properties_mut(&mut self) -> &mut PropertyStore {
        &mut self.props
    }

    /// Number of properties.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.props.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.props.find(name).is_some()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.props.find_prop(name).map(Property::value)
    }

    #[must_use]
    pub fn get_int32(&self, name: &str) -> Option<i32> {
        self.get(name).and_then(|v| v.as_int32().ok())
    }

    #[must_use]
    pub fn get_int64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|v| v.as_int64().ok())
    }

    #[must_use]
    pub fn get_double(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|v| v.as_double().ok())
    }

    #[must_use]
    pub fn get_rate(&self, name: &str) -> Option<(i64, i64)> {
        self.get(name).and_then(|v| v.as_rate().ok())
    }

    #[must_use]
    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.as_text().ok())
    }

    /// Sets `name` to `value`, replacing whatever kind it held before.
    ///
    /// # Errors
    /// Returns [`MetricsError::AllocationFailed`] if a new property cannot be stored.
    pub fn set(
        &mut self,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<&mut Self, MetricsError> {
        self.props.find_or_allocate(name)?.set_value(value);
        Ok(self)
    }

    /// Registers `name` without a value.
    ///
    /// # Errors
    /// Returns [`MetricsError::AllocationFailed`] if a new property cannot be stored.
    pub fn set_none(&mut self, name: &str) -> Result<&mut Self, MetricsError> {
        self.set(name, PropertyValue::None)
    }

    fn add(&mut self, name: &str, value: PropertyValue) -> Result<&mut Self, MetricsError> {
        self.props.find_or_allocate(name)?.value_mut().accumulate(value);
        Ok(self)
    }

    /// Adds to an existing `Int32` property, or sets it.
    ///
    /// # Errors
    /// Returns [`MetricsError::AllocationFailed`] if a new property cannot be stored.
    pub fn add_int32(&mut self, name: &str, value: i32) -> Result<&mut Self, MetricsError> {
        self.add(name, PropertyValue::Int32(value))
    }

    /// Adds to an existing `Int64` property, or sets it.
    ///
    /// # Errors
    /// Returns [`MetricsError::AllocationFailed`] if a new property cannot be stored.
    pub fn add_int64(&mut self, name: &str, value: i64) -> Result<&mut Self, MetricsError> {
        self.add(name, PropertyValue::Int64(value))
    }

    /// Adds to an existing `Double` property, or sets it.
    ///
    /// # Errors
    /// Returns [`MetricsError::AllocationFailed`] if a new property cannot be stored.
    pub fn add_double(&mut self, name: &str, value: f64) -> Result<&mut Self, MetricsError> {
        self.add(name, PropertyValue::Double(value))
    }

    /// Adds both halves of a rate to an existing `Rate` property, or sets it.
    ///
    /// # Errors
    /// Returns [`MetricsError::AllocationFailed`] if a new property cannot be stored.
    pub fn add_rate(&mut self, name: &str, num: i64, den: i64) -> Result<&mut Self, MetricsError> {
        self.add(name, PropertyValue::Rate(num, den))
    }

    /// Removes `name`, returning whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        self.props.remove(name)
    }

    /// Removes the listed properties. Returns the number removed.
    pub fn filter_drop<S: AsRef<str>>(&mut self, names: &[S]) -> usize {
        self.props.filter_drop(names)
    }

    /// Removes every property that is not listed. Returns the number removed.
    pub fn filter_keep_only<S: AsRef<str>>(&mut self, names: &[S]) -> usize {
        self.props.filter_keep_only(names)
    }

    /// Drops the key and every property.
    pub fn clear(&mut self) {
        self.key.clear();
        self.props.clear();
    }

    /// Deep copy of this item.
    ///
    /// # Errors
    /// Returns [`MetricsError::AllocationFailed`] if the property slots cannot be allocated.
    pub fn duplicate(&self) -> Result<Self, MetricsError> {
        Ok(Self {
            key: self.key.clone(),
            pid: self.pid,
            uid: self.uid,
            package_name: self.package_name.clone(),
            package_version_code: self.package_version_code,
            timestamp: self.timestamp,
            props: self.props.duplicate()?,
        })
    }

    /// Folds `incoming` into this item.
    ///
    /// The key is adopted only when this item has none. Properties from
    /// `incoming` overwrite same-named ones here and are appended otherwise.
    /// Unnamed properties are skipped. A property that cannot be stored is
    /// logged and dropped; the merge itself always succeeds.
    pub fn merge(&mut self, incoming: &Self) {
        if self.key.is_empty() {
            self.key.clone_from(&incoming.key);
        }

        for iprop in &incoming.props {
            if iprop.name().is_empty() {
                continue;
            }
            match self.props.find_or_allocate(iprop.name()) {
                Ok(oprop) => oprop.set_value(iprop.value().clone()),
                Err(e) => log::warn!("dropped property '{}': {e}", iprop.name()),
            }
        }
    }

    /// Hands this item to `client`, logging on failure.
    pub fn self_record(&self, client: &impl CollectorClient) -> bool {
        log::trace!("delivering {self}");
        match client.submit(self) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("failed to record {}: {e}", self.key);
                false
            }
        }
    }

    /// Dump string at a given format version.
    #[must_use]
    pub fn to_string_versioned(&self, version: i32) -> String {
        let mut result = format!(
            "[{version}:{}:{}:{}:{}:{}:{}:",
            self.key,
            self.pid,
            self.uid,
            self.timestamp,
            self.package_name,
            self.props.len()
        );
        let mut fragment = String::new();
        for prop in &self.props {
            fragment.clear();
            let _ = write_prop(&mut fragment, prop);
            result.push_str(truncate(&fragment, MAX_PROPERTY_STRING_SIZE - 1));
        }
        result.push(']');
        result
    }
}

fn write_prop(out: &mut String, prop: &Property) -> fmt::Result {
    let name = prop.name();
    match prop.value() {
        PropertyValue::Int32(v) => write!(out, "{name}={v}:"),
        PropertyValue::Int64(v) => write!(out, "{name}={v}:"),
        PropertyValue::Double(v) => {
            write!(out, "{name}=")?;
            write_scientific(out, *v)?;
            out.write_char(':')
        }
        PropertyValue::Rate(num, den) => write!(out, "{name}={num}/{den}:"),
        PropertyValue::Text(v) => write!(out, "{name}={v}:"),
        PropertyValue::None => write!(out, "{name}=:"),
    }
}

// printf `%e`: six fractional digits and a signed, two digit minimum exponent.
fn write_scientific(out: &mut String, value: f64) -> fmt::Result {
    if value.is_nan() {
        return out.write_str("nan");
    }
    if value.is_infinite() {
        return out.write_str(if value < 0.0 { "-inf" } else { "inf" });
    }
    let formatted = format!("{value:.6e}");
    let (mantissa, exponent) = formatted.split_once('e').unwrap_or((formatted.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    write!(out, "{mantissa}e{sign}{:02}", exponent.unsigned_abs())
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_versioned(PROTO_LAST))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn sample() -> Item {
        let mut item = Item::new("audio.track");
        item.set_pid(42)
            .set_uid(10_001)
            .set_package_name("com.example.player")
            .set_package_version_code(7)
            .set_timestamp(1_000);
        item.set("frames", 1024i32)
            .unwrap()
            .set("bytes", 1_i64 << 40)
            .unwrap()
            .set("gain", 0.5f64)
            .unwrap()
            .set("rate", (44_100i64, 1i64))
            .unwrap()
            .set("codec", "opus")
            .unwrap()
            .set_none("pending")
            .unwrap();
        item
    }

    fn names(item: &Item) -> BTreeSet<&str> {
        item.properties().iter().map(Property::name).collect()
    }

    #[test]
    fn new_item_has_sentinel_identity() {
        let item = Item::new("k");
        assert_eq!(item.key(), "k");
        assert_eq!(item.pid(), -1);
        assert_eq!(item.uid(), u32::MAX);
        assert!(item.is_empty());
    }

    #[test]
    fn typed_getters_follow_kind() {
        let item = sample();
        assert_eq!(item.get_int32("frames"), Some(1024));
        assert_eq!(item.get_int64("frames"), None);
        assert_eq!(item.get_rate("rate"), Some((44_100, 1)));
        assert_eq!(item.get_text("codec"), Some("opus"));
        assert_eq!(item.get("pending"), Some(&PropertyValue::None));
        assert_eq!(item.get("missing"), None);
    }

    #[test]
    fn set_replaces_kind() {
        let mut item = sample();
        item.set("frames", "many").unwrap();
        assert_eq!(item.get_text("frames"), Some("many"));
        assert_eq!(item.len(), 6);
    }

    #[test]
    fn add_accumulates_same_kind() {
        let mut item = Item::new("k");
        item.add_int32("n", 2).unwrap().add_int32("n", 3).unwrap();
        item.add_double("d", 1.5).unwrap().add_double("d", 1.0).unwrap();
        item.add_rate("r", 1, 10).unwrap().add_rate("r", 2, 20).unwrap();
        item.add_int64("l", 5).unwrap();
        assert_eq!(item.get_int32("n"), Some(5));
        assert_eq!(item.get_double("d"), Some(2.5));
        assert_eq!(item.get_rate("r"), Some((3, 30)));
        assert_eq!(item.get_int64("l"), Some(5));
    }

    #[test]
    fn duplicate_is_independent() {
        let item = sample();
        let mut copy = item.duplicate().unwrap();
        assert_eq!(copy, item);

        copy.set("codec", "aac").unwrap();
        copy.set_package_name("other");
        assert_eq!(item.get_text("codec"), Some("opus"));
        assert_eq!(item.package_name(), "com.example.player");
    }

    #[test]
    fn merge_adopts_key_when_empty() {
        let mut a = Item::new("");
        let b = Item::new("source");
        a.merge(&b);
        assert_eq!(a.key(), "source");

        let mut c = Item::new("mine");
        c.merge(&b);
        assert_eq!(c.key(), "mine");
    }

    #[test]
    fn merge_overwrites_and_appends() {
        let mut a = Item::new("a");
        a.set("x", 0i32).unwrap().set("y", 2i32).unwrap();
        let mut b = Item::new("b");
        b.set("x", 1i32).unwrap();
        a.merge(&b);
        assert_eq!(a.get_int32("x"), Some(1));
        assert_eq!(a.get_int32("y"), Some(2));
        assert_eq!(a.len(), 2);

        let mut c = Item::new("c");
        c.set("z", "text").unwrap();
        a.merge(&c);
        assert_eq!(a.get_text("z"), Some("text"));
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn merge_only_touches_key_and_properties() {
        let mut a = Item::new("a");
        a.set_pid(1).set_uid(2).set_package_name("pkg");
        let b = sample();
        a.merge(&b);
        assert_eq!(a.pid(), 1);
        assert_eq!(a.uid(), 2);
        assert_eq!(a.package_name(), "pkg");
    }

    #[test]
    fn merge_skips_unnamed_properties() {
        let mut b = Item::new("b");
        b.properties_mut().allocate().unwrap().set_value(9i32);
        b.set("named", 1i32).unwrap();
        let mut a = Item::new("a");
        a.merge(&b);
        assert_eq!(names(&a), BTreeSet::from(["named"]));
    }

    #[test]
    fn merged_text_is_a_deep_copy() {
        let mut b = Item::new("b");
        b.set("t", "original").unwrap();
        let mut a = Item::new("a");
        a.merge(&b);
        b.set("t", "changed").unwrap();
        assert_eq!(a.get_text("t"), Some("original"));
    }

    #[test]
    fn filters_apply_set_algebra() {
        let mut item = Item::new("k");
        item.set("x", 1i32).unwrap().set("y", 2i32).unwrap().set("z", 3i32).unwrap();
        let mut dropped = item.duplicate().unwrap();
        assert_eq!(dropped.filter_drop(&["x"]), 1);
        assert_eq!(names(&dropped), BTreeSet::from(["y", "z"]));

        assert_eq!(item.filter_keep_only(&["y"]), 2);
        assert_eq!(names(&item), BTreeSet::from(["y"]));
    }

    #[test]
    fn clear_drops_key_and_properties() {
        let mut item = sample();
        item.clear();
        assert_eq!(item.key(), "");
        assert!(item.is_empty());
    }

    #[test]
    fn dump_lists_identity_then_properties() {
        let mut item = Item::new("k");
        item.set_pid(1).set_uid(2).set_timestamp(3).set_package_name("p");
        item.set("a", 5i32)
            .unwrap()
            .set("r", (1i64, 2i64))
            .unwrap()
            .set("s", "v")
            .unwrap();
        assert_eq!(item.to_string(), "[2:k:1:2:3:p:3:a=5:r=1/2:s=v:]");
        assert!(item.to_string_versioned(0).starts_with("[0:k:"));
    }

    #[test]
    fn doubles_dump_like_printf_e() {
        let mut item = Item::new("k");
        item.set("half", 0.5)
            .unwrap()
            .set("big", -12_345.678)
            .unwrap()
            .set("zero", 0.0)
            .unwrap()
            .set("tiny", 1.5e-300)
            .unwrap();
        assert_eq!(
            item.to_string(),
            "[2:k:-1:4294967295:0::4:half=5.000000e-01:big=-1.234568e+04:\
             zero=0.000000e+00:tiny=1.500000e-300:]"
        );
    }

    #[test]
    fn dump_truncates_huge_properties() {
        let mut item = Item::new("k");
        item.set("big", "x".repeat(10_000)).unwrap();
        let dump = item.to_string();
        assert!(dump.len() < 4096 + 32);
        assert!(dump.ends_with(']'));
    }
}

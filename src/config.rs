use once_cell::sync::OnceCell;
use std::collections::HashMap;

/// Property consulted first when deciding whether to submit items.
pub const ENABLED_PROPERTY: &str = "media.metrics.enabled";
/// Persistent fallback for [`ENABLED_PROPERTY`].
pub const ENABLED_PROPERTY_PERSIST: &str = "persist.media.metrics.enabled";
/// Used when neither property is set.
pub const ENABLED_PROPERTY_DEFAULT: i32 = 1;

/// Telephony stack uid. Never submits.
pub const AID_RADIO: u32 = 1001;

/// Uids that never submit items.
pub const DENIED_UIDS: &[u32] = &[AID_RADIO];

/// Value a property source reports for a property that is not set.
pub const PROPERTY_UNSET: i32 = -1;

/// A source of integer configuration properties.
pub trait PropertySource {
    /// The value of `name`, or `None` when it is not set.
    fn get_i32(&self, name: &str) -> Option<i32>;
}

/// Reads properties from the environment.
///
/// `media.metrics.enabled` is looked up as `MEDIA_METRICS_ENABLED`.
/// Values that do not parse are treated as unset.
///
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvProperties;

impl EnvProperties {
    #[must_use]
    pub fn variable_name(property: &str) -> String {
        property
            .chars()
            .map(|c| match c {
                '.' | '-' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect()
    }
}

impl PropertySource for EnvProperties {
    /// Reads the upper snake case variable for `name` and parses it as an `i32`.
    fn get_i32(&self, name: &str) -> Option<i32> {
        std::env::var(Self::variable_name(name))
            .ok()
            .and_then(|v| v.trim().parse().ok())
    }
}

impl PropertySource for HashMap<String, i32> {
    fn get_i32(&self, name: &str) -> Option<i32> {
        self.get(name).copied()
    }
}

/// Decides whether this process should submit items at all.
///
/// Denied uids never submit. Otherwise the first of [`ENABLED_PROPERTY`] and
/// [`ENABLED_PROPERTY_PERSIST`] holding a value other than [`PROPERTY_UNSET`]
/// decides, falling back to the default. Values above zero enable submission.
///
#[derive(Debug, Clone)]
pub struct LoggingPolicy<P> {
    uid: u32,
    denied_uids: Vec<u32>,
    source: P,
    default: i32,
}

impl LoggingPolicy<EnvProperties> {
    /// Policy for the current process, reading the environment.
    #[must_use]
    pub fn current() -> Self {
        Self::new(current_uid(), EnvProperties)
    }
}

impl<P: PropertySource> LoggingPolicy<P> {
    pub fn new(uid: u32, source: P) -> Self {
        Self {
            uid,
            denied_uids: DENIED_UIDS.to_vec(),
            source,
            default: ENABLED_PROPERTY_DEFAULT,
        }
    }

    #[must_use]
    pub fn denied_uids(mut self, uids: &[u32]) -> Self {
        self.denied_uids = uids.to_vec();
        self
    }

    #[must_use]
    pub const fn default_value(mut self, default: i32) -> Self {
        self.default = default;
        self
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        // skip the lookup entirely for uids the service would refuse anyway
        if self.denied_uids.contains(&self.uid) {
            return false;
        }
        let lookup = |name: &str| {
            self.source
                .get_i32(name)
                .filter(|value| *value != PROPERTY_UNSET)
        };
        let enabled = lookup(ENABLED_PROPERTY)
            .or_else(|| lookup(ENABLED_PROPERTY_PERSIST))
            .unwrap_or(self.default);
        enabled > 0
    }
}

/// Whether this process submits items. Evaluated once per process.
pub fn is_logging_enabled() -> bool {
    static ENABLED: OnceCell<bool> = OnceCell::new();
    *ENABLED.get_or_init(|| {
        let enabled = LoggingPolicy::current().is_enabled();
        log::debug!("metrics submission enabled: {enabled}");
        enabled
    })
}

#[cfg(unix)]
fn current_uid() -> u32 {
    // SAFETY: getuid has no preconditions and cannot fail.
    unsafe { libc::getuid() }
}

#[cfg(not(unix))]
const fn current_uid() -> u32 {
    0
}

use crate::error::MetricsError;
use std::fmt;

/// The kind of value a property holds.
///
/// The discriminants are the type tags written by both wire encodings.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueType {
    None = 0,
    Int32 = 1,
    Int64 = 2,
    Double = 3,
    Text = 4,
    Rate = 5,
}

impl ValueType {
    /// The wire tag for this kind.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Maps a wire tag back to its kind, `None` for tags this version does not define.
    #[must_use]
    pub const fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(Self::None),
            1 => Some(Self::Int32),
            2 => Some(Self::Int64),
            3 => Some(Self::Double),
            4 => Some(Self::Text),
            5 => Some(Self::Rate),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Double => "double",
            Self::Text => "text",
            Self::Rate => "rate",
        };
        f.write_str(name)
    }
}

/// A single typed property value.
///
/// `Rate` is a numerator/denominator pair and is never reduced.
/// `None` marks a name that has been allocated but not assigned.
///
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PropertyValue {
    #[default]
    None,
    Int32(i32),
    Int64(i64),
    Double(f64),
    Rate(i64, i64),
    Text(String),
}

impl PropertyValue {
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::None => ValueType::None,
            Self::Int32(_) => ValueType::Int32,
            Self::Int64(_) => ValueType::Int64,
            Self::Double(_) => ValueType::Double,
            Self::Rate(..) => ValueType::Rate,
            Self::Text(_) => ValueType::Text,
        }
    }

    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    fn mismatch(&self, expected: ValueType) -> MetricsError {
        MetricsError::TypeMismatch {
            expected,
            actual: self.value_type(),
        }
    }

    /// # Errors
    /// Returns [`MetricsError::TypeMismatch`] unless the value is an `Int32`.
    pub fn as_int32(&self) -> Result<i32, MetricsError> {
        match self {
            Self::Int32(v) => Ok(*v),
            _ => Err(self.mismatch(ValueType::Int32)),
        }
    }

    /// # Errors
    /// Returns [`MetricsError::TypeMismatch`] unless the value is an `Int64`.
    pub fn as_int64(&self) -> Result<i64, MetricsError> {
        match self {
            Self::Int64(v) => Ok(*v),
            _ => Err(self.mismatch(ValueType::Int64)),
        }
    }

    /// # Errors
    /// Returns [`MetricsError::TypeMismatch`] unless the value is a `Double`.
    pub fn as_double(&self) -> Result<f64, MetricsError> {
        match self {
            Self::Double(v) => Ok(*v),
            _ => Err(self.mismatch(ValueType::Double)),
        }
    }

    /// # Errors
    /// Returns [`MetricsError::TypeMismatch`] unless the value is a `Rate`.
    pub fn as_rate(&self) -> Result<(i64, i64), MetricsError> {
        match self {
            Self::Rate(num, den) => Ok((*num, *den)),
            _ => Err(self.mismatch(ValueType::Rate)),
        }
    }

    /// # Errors
    /// Returns [`MetricsError::TypeMismatch`] unless the value is `Text`.
    pub fn as_text(&self) -> Result<&str, MetricsError> {
        match self {
            Self::Text(v) => Ok(v),
            _ => Err(self.mismatch(ValueType::Text)),
        }
    }

    /// Adds `other` into this value when both are the same numeric kind,
    /// otherwise replaces this value with `other`.
    pub(crate) fn accumulate(&mut self, other: Self) {
        *self = match (&*self, other) {
            (Self::Int32(a), Self::Int32(b)) => Self::Int32(a.wrapping_add(b)),
            (Self::Int64(a), Self::Int64(b)) => Self::Int64(a.wrapping_add(b)),
            (Self::Double(a), Self::Double(b)) => Self::Double(a + b),
            (Self::Rate(an, ad), Self::Rate(bn, bd)) => {
                Self::Rate(an.wrapping_add(bn), ad.wrapping_add(bd))
            }
            (_, other) => other,
        };
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Int32(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<(i64, i64)> for PropertyValue {
    fn from((num, den): (i64, i64)) -> Self {
        Self::Rate(num, den)
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

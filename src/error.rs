use crate::value::ValueType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("bad value: {0}")]
    BadValue(String),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("unsupported encoding version {0}")]
    UnsupportedVersion(i32),
    #[error("out of memory allocating encode buffer")]
    OutOfMemory,
    #[error("property holds {actual}, not {expected}")]
    TypeMismatch {
        expected: ValueType,
        actual: ValueType,
    },
    #[error("failed allocation for new properties")]
    AllocationFailed,
    #[error("not enough data left in parcel")]
    NotEnoughData,
    #[error("metrics collector service is unavailable")]
    ServiceUnavailable,
    #[error("IO error talking to metrics collector {0}")]
    Io(#[from] std::io::Error),
    #[error("couldnt serialize event: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),
    #[error("failed to deserialize event: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),
}

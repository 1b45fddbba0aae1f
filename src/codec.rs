//! Wire encodings for [`crate::Item`].
//!
//! Two independent layouts share the same data model:
//!
//! - [`Parcel`]: typed, 4 byte aligned parameter buffer carrying every item field.
//! - byte string: a flat, self-describing blob that omits the package fields.

mod byte_string;
mod parcel;

pub use byte_string::BYTE_STRING_VERSION;
pub use parcel::{PARCEL_VERSION, Parcel};

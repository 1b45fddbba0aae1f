use crate::{codec::Parcel, error::MetricsError, item::Item};
use interprocess::local_socket::{GenericFilePath, GenericNamespaced, Name, prelude::*};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};

/// Largest frame body accepted off the wire.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Socket the collector listens on unless told otherwise.
pub const DEFAULT_SOCKET: &str = "media.metrics.sock";

/// Resolves a socket name, preferring the abstract namespace where supported.
pub(crate) fn socket_name(socket_path: &str) -> std::io::Result<Name<'static>> {
    if GenericNamespaced::is_supported() {
        socket_path.to_owned().to_ns_name::<GenericNamespaced>()
    } else {
        format!("/tmp/{socket_path}").to_fs_name::<GenericFilePath>()
    }
}

/// An encoded item sent over IPC to the collector.
///
/// The payload is one of the two item encodings, untouched.
///
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "encoding", content = "payload")]
#[serde(rename_all = "snake_case")]
pub enum CollectorEvent {
    /// A versioned parcel encoding of a whole item.
    Parcel(Vec<u8>),
    /// A flat byte-string encoding.
    ByteString(Vec<u8>),
}

impl CollectorEvent {
    /// Label used in logs and metrics for this event's encoding.
    #[must_use]
    pub const fn encoding(&self) -> &'static str {
        match self {
            Self::Parcel(_) => "parcel",
            Self::ByteString(_) => "byte_string",
        }
    }

    /// # Errors
    /// Returns whatever error the encoding's decoder reports.
    pub fn decode(&self) -> Result<Item, MetricsError> {
        match self {
            Self::Parcel(bytes) => Item::read_from_parcel(&mut Parcel::from(bytes.as_slice())),
            Self::ByteString(bytes) => Item::read_from_byte_string(bytes),
        }
    }
}

impl TryFrom<&Item> for CollectorEvent {
    type Error = MetricsError;

    fn try_from(item: &Item) -> Result<Self, Self::Error> {
        Ok(Self::Parcel(item.to_parcel()?.into_bytes()))
    }
}

impl TryFrom<&[u8]> for CollectorEvent {
    type Error = MetricsError;

    fn try_from(buffer: &[u8]) -> Result<Self, Self::Error> {
        rmp_serde::from_slice(buffer).map_err(MetricsError::from)
    }
}

impl TryFrom<&CollectorEvent> for Vec<u8> {
    type Error = MetricsError;

    fn try_from(event: &CollectorEvent) -> Result<Self, Self::Error> {
        rmp_serde::to_vec(event).map_err(MetricsError::from)
    }
}

/// Frames an event as a little-endian `u32` length and its `MessagePack` body.
pub(crate) fn encode_frame(event: &CollectorEvent) -> Result<Vec<u8>, MetricsError> {
    let body: Vec<u8> = event.try_into()?;
    let len = frame_len(body.len())?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

pub(crate) fn frame_len(len: usize) -> Result<u32, MetricsError> {
    if len > MAX_FRAME_SIZE {
        return Err(MetricsError::BadValue(format!(
            "frame of {len} bytes exceeds {MAX_FRAME_SIZE}"
        )));
    }
    u32::try_from(len).map_err(|_| MetricsError::BadValue(format!("frame of {len} bytes")))
}

pub(crate) fn write_frame<W: Write>(writer: &mut W, event: &CollectorEvent) -> Result<(), MetricsError> {
    let frame = encode_frame(event)?;
    writer.write_all(&frame)?;
    writer.flush().map_err(Into::into)
}

/// Reads the next frame body, `None` once the peer has closed the stream.
pub(crate) fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, MetricsError> {
    let mut len = [0u8; 4];
    match reader.read_exact(&mut len) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = usize::try_from(u32::from_le_bytes(len)).unwrap_or(usize::MAX);
    frame_len(len)?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(Some(body))
}

#[cfg(feature = "tokio")]
pub(crate) async fn read_frame_async<R>(reader: &mut R) -> Result<Option<Vec<u8>>, MetricsError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;

    let mut len = [0u8; 4];
    match reader.read_exact(&mut len).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = usize::try_from(u32::from_le_bytes(len)).unwrap_or(usize::MAX);
    frame_len(len)?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

use crate::{
    error::MetricsError,
    item::Item,
    prop::Property,
    value::{PropertyValue, ValueType},
};

/// The only byte-string layout this crate writes or reads.
pub const BYTE_STRING_VERSION: u16 = 0;

// total size, header size, version, key size
const FIXED_HEADER_PREFIX: usize = 4 + 4 + 2 + 2;
// pid, uid, timestamp
const FIXED_HEADER_SUFFIX: usize = 4 + 4 + 8;
// record length, type tag
const RECORD_PREFIX: usize = 2 + 1;

/// Size of a NUL terminated string, rejecting anything that would not fit a `u16`
/// or could not be terminated.
fn cstring_size(value: &str) -> Result<u16, MetricsError> {
    let size = value.len() + 1;
    let Ok(size) = u16::try_from(size) else {
        log::error!("string size {size} exceeds {}", u16::MAX);
        return Err(MetricsError::BadValue(format!("string size {size} too large")));
    };
    if value.as_bytes().contains(&0) {
        return Err(MetricsError::BadValue(format!(
            "string {value:?} has an embedded NUL"
        )));
    }
    Ok(size)
}

struct Header<'a> {
    size: u32,
    header_size: u32,
    version: u16,
    key_size: u16,
    key: &'a str,
    pid: i32,
    uid: u32,
    timestamp: i64,
}

impl<'a> Header<'a> {
    fn read(reader: &mut Reader<'a>) -> Result<Self, MetricsError> {
        Ok(Self {
            size: reader.u32()?,
            header_size: reader.u32()?,
            version: reader.u16()?,
            key_size: reader.u16()?,
            key: reader.cstring()?,
            pid: reader.i32()?,
            uid: reader.u32()?,
            timestamp: reader.i64()?,
        })
    }
}

struct Filler {
    buf: Vec<u8>,
    limit: usize,
}

impl Filler {
    fn insert(&mut self, bytes: &[u8]) -> Result<(), MetricsError> {
        if self.buf.len() + bytes.len() > self.limit {
            log::error!("buffer exceeded with size {}", bytes.len());
            return Err(MetricsError::BadValue(format!(
                "buffer exceeded with size {}",
                bytes.len()
            )));
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn insert_cstring(&mut self, value: &str) -> Result<(), MetricsError> {
        cstring_size(value)?;
        self.insert(value.as_bytes())?;
        self.insert(&[0])
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], MetricsError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                MetricsError::InvalidOperation(format!("buffer exceeded reading {len} bytes"))
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], MetricsError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, MetricsError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, MetricsError> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32, MetricsError> {
        self.array().map(u32::from_le_bytes)
    }

    fn i32(&mut self) -> Result<i32, MetricsError> {
        self.array().map(i32::from_le_bytes)
    }

    fn i64(&mut self) -> Result<i64, MetricsError> {
        self.array().map(i64::from_le_bytes)
    }

    fn f64(&mut self) -> Result<f64, MetricsError> {
        self.array().map(f64::from_le_bytes)
    }

    fn cstring(&mut self) -> Result<&'a str, MetricsError> {
        let rest = &self.data[self.pos..];
        let len = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| MetricsError::InvalidOperation("unterminated string".into()))?;
        let value = std::str::from_utf8(&rest[..len])
            .map_err(|e| MetricsError::InvalidOperation(format!("string is not UTF-8: {e}")))?;
        self.pos += len + 1;
        Ok(value)
    }
}

impl Property {
    /// Encoded record length: length field, tag, name and payload.
    fn byte_string_size(&self) -> usize {
        let header = RECORD_PREFIX + self.name().len() + 1;
        let payload = match self.value() {
            PropertyValue::Int32(_) => 4,
            PropertyValue::Int64(_) | PropertyValue::Double(_) => 8,
            PropertyValue::Rate(..) => 16,
            PropertyValue::Text(v) => v.len() + 1,
            PropertyValue::None => 0,
        };
        header + payload
    }

    fn write_to_byte_string(&self, filler: &mut Filler) -> Result<(), MetricsError> {
        let len = u16::try_from(self.byte_string_size()).map_err(|_| {
            MetricsError::BadValue(format!("property '{}' is too large", self.name()))
        })?;
        filler.insert(&len.to_le_bytes())?;
        filler.insert(&[self.value().value_type().tag()])?;
        filler.insert_cstring(self.name())?;
        match self.value() {
            PropertyValue::Int32(v) => filler.insert(&v.to_le_bytes()),
            PropertyValue::Int64(v) => filler.insert(&v.to_le_bytes()),
            PropertyValue::Double(v) => filler.insert(&v.to_le_bytes()),
            PropertyValue::Rate(num, den) => {
                filler.insert(&num.to_le_bytes())?;
                filler.insert(&den.to_le_bytes())
            }
            PropertyValue::Text(v) => filler.insert_cstring(v),
            PropertyValue::None => Ok(()),
        }
    }

    fn read_from_byte_string(&mut self, reader: &mut Reader<'_>) -> Result<(), MetricsError> {
        let start = reader.pos;
        let len = usize::from(reader.u16()?);
        let tag = reader.u8()?;
        let name = reader.cstring()?;
        let value = match ValueType::from_tag(i32::from(tag)) {
            Some(ValueType::Int32) => PropertyValue::Int32(reader.i32()?),
            Some(ValueType::Int64) => PropertyValue::Int64(reader.i64()?),
            Some(ValueType::Double) => PropertyValue::Double(reader.f64()?),
            Some(ValueType::Rate) => PropertyValue::Rate(reader.i64()?, reader.i64()?),
            Some(ValueType::Text) => PropertyValue::Text(reader.cstring()?.to_owned()),
            Some(ValueType::None) => PropertyValue::None,
            None => {
                log::error!("found bad prop type: {tag}, name {name}");
                return Err(MetricsError::InvalidOperation(format!(
                    "unknown property type {tag} for '{name}'"
                )));
            }
        };
        let consumed = reader.pos - start;
        if len < consumed {
            return Err(MetricsError::InvalidOperation(format!(
                "record length {len} shorter than its {consumed} bytes of fields"
            )));
        }
        // newer writers may append fields to a record
        reader.take(len - consumed)?;
        self.set_name(name);
        self.set_value(value);
        Ok(())
    }
}

impl Item {
    /// Encodes this item into a self-contained byte string.
    ///
    /// Package name and version code are not part of this encoding.
    ///
    /// # Errors
    /// Returns [`MetricsError::BadValue`] when a string or property is too
    /// large for its length field or the total size overflows, and
    /// [`MetricsError::OutOfMemory`] if the buffer cannot be allocated.
    pub fn write_to_byte_string(&self) -> Result<Vec<u8>, MetricsError> {
        let key_size =
            cstring_size(self.key()).inspect_err(|e| log::warn!("cannot encode key: {e}"))?;
        let header_size =
            u32::try_from(FIXED_HEADER_PREFIX + usize::from(key_size) + FIXED_HEADER_SUFFIX)
                .map_err(|_| MetricsError::BadValue("header size overflow".into()))?;

        let mut size = header_size + 4;
        for (i, prop) in self.properties().iter().enumerate() {
            let prop_size = prop.byte_string_size();
            if prop_size > usize::from(u16::MAX) {
                log::warn!("prop {i} size {prop_size} too large");
                return Err(MetricsError::BadValue(format!(
                    "property '{}' size {prop_size} too large",
                    prop.name()
                )));
            }
            size = u32::try_from(prop_size)
                .ok()
                .and_then(|prop_size| size.checked_add(prop_size))
                .ok_or_else(|| {
                    log::warn!("item size overflow at property {i}");
                    MetricsError::BadValue(format!("item size overflow at property {i}"))
                })?;
        }
        let prop_count = u32::try_from(self.len())
            .map_err(|_| MetricsError::BadValue("too many properties".into()))?;
        let limit = usize::try_from(size)
            .map_err(|_| MetricsError::BadValue(format!("item size {size} too large")))?;

        let mut buf = Vec::new();
        buf.try_reserve_exact(limit)
            .map_err(|_| MetricsError::OutOfMemory)?;
        let mut filler = Filler { buf, limit };

        filler.insert(&size.to_le_bytes())?;
        filler.insert(&header_size.to_le_bytes())?;
        filler.insert(&BYTE_STRING_VERSION.to_le_bytes())?;
        filler.insert(&key_size.to_le_bytes())?;
        filler.insert_cstring(self.key())?;
        filler.insert(&self.pid().to_le_bytes())?;
        filler.insert(&self.uid().to_le_bytes())?;
        filler.insert(&self.timestamp().to_le_bytes())?;
        filler.insert(&prop_count.to_le_bytes())?;
        for (i, prop) in self.properties().iter().enumerate() {
            prop.write_to_byte_string(&mut filler).inspect_err(|e| {
                log::error!("could not write prop {i} of {prop_count}: {e}");
            })?;
        }

        if filler.buf.len() != limit {
            log::error!(
                "problems populating; wrote={} planned={limit}",
                filler.buf.len()
            );
            return Err(MetricsError::InvalidOperation(format!(
                "wrote {} of {limit} planned bytes",
                filler.buf.len()
            )));
        }
        Ok(filler.buf)
    }

    /// Decodes an item from a byte string produced by [`Item::write_to_byte_string`].
    ///
    /// Header fields this version does not know about are skipped using the
    /// declared header size. Nothing is returned unless the whole item decodes.
    ///
    /// # Errors
    /// Returns [`MetricsError::InvalidOperation`] for any inconsistent header
    /// or out of bounds read, and [`MetricsError::UnsupportedVersion`] for an
    /// unknown layout version.
    pub fn read_from_byte_string(buffer: &[u8]) -> Result<Self, MetricsError> {
        let mut reader = Reader::new(buffer);
        let Header {
            size,
            header_size,
            version,
            key_size,
            key,
            pid,
            uid,
            timestamp,
        } = Header::read(&mut reader).inspect_err(|e| log::warn!("invalid header: {e}"))?;

        let size = usize::try_from(size).unwrap_or(usize::MAX);
        let header_size = usize::try_from(header_size).unwrap_or(usize::MAX);
        if size > buffer.len() {
            log::warn!("invalid header: size {size} exceeds buffer {}", buffer.len());
            return Err(MetricsError::InvalidOperation(format!(
                "declared size {size} exceeds buffer length {}",
                buffer.len()
            )));
        }
        if key.len() + 1 != usize::from(key_size) {
            log::warn!("invalid header: key size {key_size} mismatch");
            return Err(MetricsError::InvalidOperation(format!(
                "key size {key_size} does not match key of {} bytes",
                key.len() + 1
            )));
        }
        if header_size > size {
            log::warn!("invalid header: header size {header_size} exceeds size {size}");
            return Err(MetricsError::InvalidOperation(format!(
                "header size {header_size} exceeds size {size}"
            )));
        }
        if version != BYTE_STRING_VERSION {
            log::error!("unsupported byte string version: {version}");
            return Err(MetricsError::UnsupportedVersion(i32::from(version)));
        }

        let pos = reader.pos;
        if pos > header_size {
            log::warn!("invalid header pos:{pos} > header_size:{header_size}");
            return Err(MetricsError::InvalidOperation(format!(
                "header fields end at {pos}, past declared header size {header_size}"
            )));
        } else if pos < header_size {
            log::warn!("mismatched header pos:{pos} < header_size:{header_size}, advancing");
        }
        let mut reader = Reader {
            data: &buffer[..size],
            pos: header_size,
        };

        let prop_count = reader
            .u32()
            .inspect_err(|_| log::debug!("cannot read prop count"))?;
        let mut item = Self::new(key);
        item.set_pid(pid).set_uid(uid).set_timestamp(timestamp);
        for i in 0..prop_count {
            item.properties_mut()
                .allocate()?
                .read_from_byte_string(&mut reader)
                .inspect_err(|e| log::warn!("cannot read prop {i}: {e}"))?;
        }
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Item {
        let mut item = Item::new("audio.record");
        item.set_pid(77)
            .set_uid(u32::MAX - 1)
            .set_package_name("com.example.recorder")
            .set_package_version_code(12)
            .set_timestamp(-9);
        item.set("channels", 2i32)
            .unwrap()
            .set("frames", 1_i64 << 33)
            .unwrap()
            .set("level", -3.25f64)
            .unwrap()
            .set("drift", (-1i64, 1_000i64))
            .unwrap()
            .set("source", "mic")
            .unwrap()
            .set_none("empty")
            .unwrap();
        item
    }

    // Offset of the property count for an item keyed `k`.
    const fn header_len(key: &str) -> usize {
        FIXED_HEADER_PREFIX + key.len() + 1 + FIXED_HEADER_SUFFIX
    }

    fn patch_u32(bytes: &mut [u8], at: usize, value: u32) {
        bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    #[test]
    fn round_trip_carries_everything_but_package() {
        let item = sample();
        let bytes = item.write_to_byte_string().unwrap();
        let decoded = Item::read_from_byte_string(&bytes).unwrap();

        assert_eq!(decoded.key(), item.key());
        assert_eq!(decoded.pid(), item.pid());
        assert_eq!(decoded.uid(), item.uid());
        assert_eq!(decoded.timestamp(), item.timestamp());
        assert_eq!(decoded.properties(), item.properties());
        assert_eq!(decoded.package_name(), "");
        assert_eq!(decoded.package_version_code(), 0);
    }

    #[test]
    fn header_layout() {
        let bytes = Item::new("k").write_to_byte_string().unwrap();
        let header = header_len("k");
        assert_eq!(bytes.len(), header + 4);
        assert_eq!(&bytes[0..4], &u32::try_from(header + 4).unwrap().to_le_bytes());
        assert_eq!(&bytes[4..8], &u32::try_from(header).unwrap().to_le_bytes());
        assert_eq!(&bytes[8..10], &0u16.to_le_bytes());
        assert_eq!(&bytes[10..12], &2u16.to_le_bytes());
        assert_eq!(&bytes[12..14], b"k\0");
        assert_eq!(&bytes[header..], &0u32.to_le_bytes());
    }

    #[test]
    fn none_record_is_tag_zero_without_payload() {
        let mut item = Item::new("k");
        item.set_none("n").unwrap();
        let bytes = item.write_to_byte_string().unwrap();
        let record = &bytes[header_len("k") + 4..];
        assert_eq!(record, &[5, 0, 0, b'n', 0]);
    }

    #[test]
    fn truncated_header_is_invalid() {
        let bytes = sample().write_to_byte_string().unwrap();
        for len in [0, 3, 11, 20] {
            assert!(matches!(
                Item::read_from_byte_string(&bytes[..len]),
                Err(MetricsError::InvalidOperation(_))
            ));
        }
    }

    #[test]
    fn declared_size_past_buffer_is_invalid() {
        let mut bytes = sample().write_to_byte_string().unwrap();
        let len = u32::try_from(bytes.len()).unwrap();
        patch_u32(&mut bytes, 0, len + 1);
        assert!(matches!(
            Item::read_from_byte_string(&bytes),
            Err(MetricsError::InvalidOperation(_))
        ));
    }

    #[test]
    fn truncated_properties_are_invalid() {
        let bytes = sample().write_to_byte_string().unwrap();
        let mut short = bytes[..bytes.len() - 4].to_vec();
        let len = u32::try_from(short.len()).unwrap();
        patch_u32(&mut short, 0, len);
        assert!(matches!(
            Item::read_from_byte_string(&short),
            Err(MetricsError::InvalidOperation(_))
        ));
    }

    #[test]
    fn unknown_version_is_unsupported() {
        let mut bytes = Item::new("k").write_to_byte_string().unwrap();
        bytes[8..10].copy_from_slice(&3u16.to_le_bytes());
        assert!(matches!(
            Item::read_from_byte_string(&bytes),
            Err(MetricsError::UnsupportedVersion(3))
        ));
    }

    #[test]
    fn key_size_mismatch_is_invalid() {
        let mut bytes = Item::new("key").write_to_byte_string().unwrap();
        bytes[10..12].copy_from_slice(&3u16.to_le_bytes());
        assert!(matches!(
            Item::read_from_byte_string(&bytes),
            Err(MetricsError::InvalidOperation(_))
        ));
    }

    #[test]
    fn header_size_past_total_is_invalid() {
        let mut bytes = Item::new("k").write_to_byte_string().unwrap();
        let len = u32::try_from(bytes.len()).unwrap();
        patch_u32(&mut bytes, 4, len + 1);
        assert!(matches!(
            Item::read_from_byte_string(&bytes),
            Err(MetricsError::InvalidOperation(_))
        ));
    }

    #[test]
    fn header_size_short_of_fixed_fields_is_invalid() {
        let mut bytes = Item::new("k").write_to_byte_string().unwrap();
        let header = u32::try_from(header_len("k")).unwrap();
        patch_u32(&mut bytes, 4, header - 1);
        assert!(matches!(
            Item::read_from_byte_string(&bytes),
            Err(MetricsError::InvalidOperation(_))
        ));
    }

    #[test]
    fn unknown_header_fields_are_skipped() {
        let item = sample();
        let bytes = item.write_to_byte_string().unwrap();
        let header = header_len(item.key());

        let mut extended = bytes[..header].to_vec();
        extended.extend_from_slice(&[0xAB; 6]);
        extended.extend_from_slice(&bytes[header..]);
        patch_u32(&mut extended, 0, u32::try_from(bytes.len() + 6).unwrap());
        patch_u32(&mut extended, 4, u32::try_from(header + 6).unwrap());

        let decoded = Item::read_from_byte_string(&extended).unwrap();
        assert_eq!(decoded.properties(), item.properties());
    }

    #[test]
    fn longer_records_are_skipped_to_their_end() {
        let mut item = Item::new("k");
        item.set("a", 1i32).unwrap().set("b", 2i32).unwrap();
        let bytes = item.write_to_byte_string().unwrap();
        let first = header_len("k") + 4;
        // a: len(2) tag(1) "a\0"(2) i32(4)
        let record = 9;

        let mut extended = bytes[..first + record].to_vec();
        extended.extend_from_slice(&[0xCD; 2]);
        extended.extend_from_slice(&bytes[first + record..]);
        extended[first..first + 2].copy_from_slice(&11u16.to_le_bytes());
        patch_u32(&mut extended, 0, u32::try_from(bytes.len() + 2).unwrap());

        let decoded = Item::read_from_byte_string(&extended).unwrap();
        assert_eq!(decoded.get_int32("a"), Some(1));
        assert_eq!(decoded.get_int32("b"), Some(2));
    }

    #[test]
    fn short_record_length_is_invalid() {
        let mut item = Item::new("k");
        item.set("a", 1i32).unwrap();
        let mut bytes = item.write_to_byte_string().unwrap();
        let first = header_len("k") + 4;
        bytes[first..first + 2].copy_from_slice(&4u16.to_le_bytes());
        assert!(matches!(
            Item::read_from_byte_string(&bytes),
            Err(MetricsError::InvalidOperation(_))
        ));
    }

    #[test]
    fn unknown_property_tag_is_invalid() {
        let mut item = Item::new("k");
        item.set("a", 1i32).unwrap();
        let mut bytes = item.write_to_byte_string().unwrap();
        bytes[header_len("k") + 4 + 2] = 9;
        assert!(matches!(
            Item::read_from_byte_string(&bytes),
            Err(MetricsError::InvalidOperation(_))
        ));
    }

    #[test]
    fn oversized_property_is_bad_value_and_item_survives() {
        let mut item = Item::new("k");
        item.set("ok", 1i32).unwrap();
        // 2 + 1 + "big\0" + text + NUL = 65536
        item.set("big", "x".repeat(65_536 - 2 - 1 - 4 - 1)).unwrap();
        assert!(matches!(
            item.write_to_byte_string(),
            Err(MetricsError::BadValue(_))
        ));

        item.set("big", "x".repeat(65_535 - 2 - 1 - 4 - 1)).unwrap();
        let bytes = item.write_to_byte_string().unwrap();
        let decoded = Item::read_from_byte_string(&bytes).unwrap();
        assert_eq!(decoded.get_int32("ok"), Some(1));
        assert_eq!(decoded.get_text("big").map(str::len), Some(65_527));
    }

    #[test]
    fn oversized_key_is_bad_value() {
        let item = Item::new("k".repeat(65_535));
        assert!(matches!(
            item.write_to_byte_string(),
            Err(MetricsError::BadValue(_))
        ));
    }

    #[test]
    fn duplicate_encodes_identically() {
        let item = sample();
        assert_eq!(
            item.duplicate().unwrap().write_to_byte_string().unwrap(),
            item.write_to_byte_string().unwrap()
        );
    }
}

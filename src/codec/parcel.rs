use crate::{
    error::MetricsError,
    item::Item,
    prop::Property,
    value::{PropertyValue, ValueType},
};

/// The only parcel layout this crate writes or reads.
pub const PARCEL_VERSION: i32 = 0;

/// A typed parameter buffer in the style of a binder parcel.
///
/// Values are little-endian and every write is padded to a 4 byte boundary.
/// Reads advance a cursor that starts at the beginning of the buffer.
///
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parcel {
    data: Vec<u8>,
    position: usize,
}

const fn pad4(len: usize) -> usize {
    (len + 3) & !3
}

impl Parcel {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            data: Vec::new(),
            position: 0,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    #[must_use]
    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub const fn data_position(&self) -> usize {
        self.position
    }

    pub fn set_data_position(&mut self, position: usize) {
        self.position = position.min(self.data.len());
    }

    #[must_use]
    pub fn data_avail(&self) -> usize {
        self.data.len() - self.position
    }

    /// Drops everything written past `size`.
    pub(crate) fn truncate(&mut self, size: usize) {
        self.data.truncate(size);
        self.position = self.position.min(size);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes `value` NUL terminated and padded.
    ///
    /// # Errors
    /// Returns [`MetricsError::BadValue`] if `value` contains a NUL byte.
    pub fn write_cstring(&mut self, value: &str) -> Result<(), MetricsError> {
        if value.as_bytes().contains(&0) {
            return Err(MetricsError::BadValue(format!(
                "string {value:?} has an embedded NUL"
            )));
        }
        let padded = pad4(value.len() + 1);
        self.data.extend_from_slice(value.as_bytes());
        self.data.resize(self.data.len() + padded - value.len(), 0);
        Ok(())
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], MetricsError> {
        let end = self
            .position
            .checked_add(N)
            .filter(|end| *end <= self.data.len())
            .ok_or(MetricsError::NotEnoughData)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.position..end]);
        self.position = end;
        Ok(out)
    }

    /// # Errors
    /// Returns [`MetricsError::NotEnoughData`] past the end of the parcel.
    pub fn read_i32(&mut self) -> Result<i32, MetricsError> {
        self.read_array().map(i32::from_le_bytes)
    }

    /// # Errors
    /// Returns [`MetricsError::NotEnoughData`] past the end of the parcel.
    pub fn read_u32(&mut self) -> Result<u32, MetricsError> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// # Errors
    /// Returns [`MetricsError::NotEnoughData`] past the end of the parcel.
    pub fn read_i64(&mut self) -> Result<i64, MetricsError> {
        self.read_array().map(i64::from_le_bytes)
    }

    /// # Errors
    /// Returns [`MetricsError::NotEnoughData`] past the end of the parcel.
    pub fn read_f64(&mut self) -> Result<f64, MetricsError> {
        self.read_array().map(f64::from_le_bytes)
    }

    /// # Errors
    /// Returns [`MetricsError::NotEnoughData`] if no terminator is found and
    /// [`MetricsError::BadValue`] if the bytes are not UTF-8.
    pub fn read_cstring(&mut self) -> Result<String, MetricsError> {
        let rest = &self.data[self.position..];
        let len = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or(MetricsError::NotEnoughData)?;
        let value = std::str::from_utf8(&rest[..len])
            .map_err(|e| MetricsError::BadValue(format!("parcel string is not UTF-8: {e}")))?
            .to_owned();
        self.position = (self.position + pad4(len + 1)).min(self.data.len());
        Ok(value)
    }
}

impl From<Vec<u8>> for Parcel {
    fn from(data: Vec<u8>) -> Self {
        Self { data, position: 0 }
    }
}

impl From<&[u8]> for Parcel {
    fn from(data: &[u8]) -> Self {
        Self::from(data.to_vec())
    }
}

impl Property {
    fn write_to_parcel(&self, parcel: &mut Parcel) -> Result<(), MetricsError> {
        parcel.write_cstring(self.name())?;
        parcel.write_i32(i32::from(self.value().value_type().tag()));
        match self.value() {
            PropertyValue::Int32(v) => parcel.write_i32(*v),
            PropertyValue::Int64(v) => parcel.write_i64(*v),
            PropertyValue::Double(v) => parcel.write_f64(*v),
            PropertyValue::Rate(num, den) => {
                parcel.write_i64(*num);
                parcel.write_i64(*den);
            }
            PropertyValue::Text(v) => parcel.write_cstring(v)?,
            PropertyValue::None => {}
        }
        Ok(())
    }

    fn read_from_parcel(&mut self, parcel: &mut Parcel) -> Result<(), MetricsError> {
        let name = parcel.read_cstring()?;
        let tag = parcel.read_i32()?;
        let value = match ValueType::from_tag(tag) {
            Some(ValueType::Int32) => PropertyValue::Int32(parcel.read_i32()?),
            Some(ValueType::Int64) => PropertyValue::Int64(parcel.read_i64()?),
            Some(ValueType::Double) => PropertyValue::Double(parcel.read_f64()?),
            Some(ValueType::Rate) => PropertyValue::Rate(parcel.read_i64()?, parcel.read_i64()?),
            Some(ValueType::Text) => PropertyValue::Text(parcel.read_cstring()?),
            Some(ValueType::None) => PropertyValue::None,
            None => {
                log::error!("reading bad item type: {tag}, name {name}");
                return Err(MetricsError::BadValue(format!(
                    "unknown property type {tag} for '{name}'"
                )));
            }
        };
        self.set_name(&name);
        self.set_value(value);
        Ok(())
    }
}

impl Item {
    /// Appends the versioned parcel encoding of this item.
    ///
    /// On failure the parcel is left as it was before the call.
    ///
    /// # Errors
    /// Returns [`MetricsError::BadValue`] if a string cannot be written.
    pub fn write_to_parcel(&self, parcel: &mut Parcel) -> Result<(), MetricsError> {
        let start = parcel.data_size();
        parcel.write_i32(PARCEL_VERSION);
        self.write_to_parcel0(parcel).inspect_err(|e| {
            log::warn!("failed to write {} to parcel: {e}", self.key());
            parcel.truncate(start);
        })
    }

    fn write_to_parcel0(&self, parcel: &mut Parcel) -> Result<(), MetricsError> {
        let count = i32::try_from(self.len()).map_err(|_| {
            MetricsError::BadValue(format!("{} properties do not fit a parcel", self.len()))
        })?;
        parcel.write_cstring(self.key())?;
        parcel.write_i32(self.pid());
        parcel.write_u32(self.uid());
        parcel.write_cstring(self.package_name())?;
        parcel.write_i64(self.package_version_code());
        parcel.write_i64(self.timestamp());
        parcel.write_i32(count);
        for prop in self.properties() {
            prop.write_to_parcel(parcel)?;
        }
        Ok(())
    }

    /// Encodes this item into a fresh parcel.
    ///
    /// # Errors
    /// See [`Item::write_to_parcel`].
    pub fn to_parcel(&self) -> Result<Parcel, MetricsError> {
        let mut parcel = Parcel::new();
        self.write_to_parcel(&mut parcel)?;
        Ok(parcel)
    }

    /// Decodes an item from the parcel's current position.
    ///
    /// Nothing is returned unless the whole item decodes.
    ///
    /// # Errors
    /// Returns [`MetricsError::UnsupportedVersion`] for versions other than
    /// [`PARCEL_VERSION`], [`MetricsError::BadValue`] for unknown property
    /// types or a negative count, and [`MetricsError::NotEnoughData`] when the
    /// parcel ends early.
    pub fn read_from_parcel(parcel: &mut Parcel) -> Result<Self, MetricsError> {
        let version = parcel.read_i32()?;
        match version {
            PARCEL_VERSION => Self::read_from_parcel0(parcel),
            _ => {
                log::error!("unsupported parcel version: {version}");
                Err(MetricsError::UnsupportedVersion(version))
            }
        }
    }

    fn read_from_parcel0(parcel: &mut Parcel) -> Result<Self, MetricsError> {
        let mut item = Self::new(parcel.read_cstring()?);
        item.set_pid(parcel.read_i32()?).set_uid(parcel.read_u32()?);
        item.set_package_name(parcel.read_cstring()?);
        item.set_package_version_code(parcel.read_i64()?)
            .set_timestamp(parcel.read_i64()?);
        let count = parcel.read_i32()?;
        if count < 0 {
            return Err(MetricsError::BadValue(format!(
                "negative property count {count}"
            )));
        }
        for _ in 0..count {
            item.properties_mut()
                .allocate()?
                .read_from_parcel(parcel)?;
        }
        Ok(item)
    }
}

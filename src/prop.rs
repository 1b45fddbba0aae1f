use crate::value::PropertyValue;

/// A named property value.
///
/// Name uniqueness is tracked by [`crate::PropertyStore`], not here.
///
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Property {
    name: String,
    value: PropertyValue,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn value(&self) -> &PropertyValue {
        &self.value
    }

    pub const fn value_mut(&mut self) -> &mut PropertyValue {
        &mut self.value
    }

    pub fn set_value(&mut self, value: impl Into<PropertyValue>) {
        self.value = value.into();
    }

    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        self.name == name
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        name.clone_into(&mut self.name);
    }

    /// Releases the name and any text payload.
    pub(crate) fn clear(&mut self) {
        self.name = String::new();
        self.value = PropertyValue::None;
    }
}

//! Per-column change tracking

use super::value::Value;

/// A column value paired with the value last read from or written to storage.
///
/// A field is dirty while the two differ; a field that was never persisted is
/// always dirty.
#[derive(Debug, Clone, PartialEq)]
pub struct Tracked<T> {
    original: Option<T>,
    current: T,
}

impl<T: Clone + PartialEq> Tracked<T> {
    /// A value that has not been persisted yet
    pub fn new(value: T) -> Self {
        Self {
            original: None,
            current: value,
        }
    }

    /// A value as loaded from storage
    pub fn loaded(value: T) -> Self {
        Self {
            original: Some(value.clone()),
            current: value,
        }
    }

    pub fn get(&self) -> &T {
        &self.current
    }

    pub fn set(&mut self, value: T) {
        self.current = value;
    }

    pub fn is_dirty(&self) -> bool {
        self.original.as_ref() != Some(&self.current)
    }

    /// Mark the current value as persisted
    pub fn sync(&mut self) {
        self.original = Some(self.current.clone());
    }
}

impl<T: Clone + PartialEq + Into<Value>> Tracked<T> {
    /// Describe this field as a record attribute
    pub fn attribute(&self, column: &'static str) -> Attribute {
        Attribute {
            column,
            value: self.current.clone().into(),
            dirty: self.is_dirty(),
        }
    }
}

impl<T: Clone + PartialEq + Default> Default for Tracked<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// A column snapshot produced by a record
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub column: &'static str,
    pub value: Value,
    pub dirty: bool,
}

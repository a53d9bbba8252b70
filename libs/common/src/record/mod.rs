//! Active-record style persistence
//!
//! Entities are plain structs whose columns are [`Tracked`] values. The
//! [`Record`] trait describes the backing table and exposes the columns as
//! [`Attribute`]s; [`RecordStore`] turns that description into SQL.

pub mod query;
pub mod store;
pub mod tracked;
pub mod value;

use sqlx::any::AnyRow;

use crate::error::RecordError;

pub use query::{Criteria, Direction, OrderBy};
pub use store::{RecordStore, Saved};
pub use tracked::{Attribute, Tracked};
pub use value::Value;

/// Where a record stands relative to its row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordState {
    /// Never inserted
    #[default]
    New,
    /// Loaded from or written to storage
    Persisted,
    /// Row removed; the record is dead
    Deleted,
}

/// Primary key and lifecycle state shared by every record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordMeta {
    pub id: Option<i64>,
    pub state: RecordState,
}

impl RecordMeta {
    pub fn loaded(id: i64) -> Self {
        Self {
            id: Some(id),
            state: RecordState::Persisted,
        }
    }
}

/// A typed entity backed by one table row
pub trait Record: Sized + Send + Sync {
    const TABLE: &'static str;
    const PRIMARY_KEY: &'static str = "id";
    /// Columns bulk assignment may set; when empty, everything not guarded
    const FILLABLE: &'static [&'static str] = &[];
    const GUARDED: &'static [&'static str] = &["id", "created_at", "updated_at"];
    /// Columns left out of serialization
    const HIDDEN: &'static [&'static str] = &[];
    /// Maintain `created_at` / `updated_at`
    const TIMESTAMPS: bool = true;

    /// Hydrate from a row; the result is persisted and clean
    fn from_row(row: &AnyRow) -> Result<Self, sqlx::Error>;

    fn meta(&self) -> &RecordMeta;

    fn meta_mut(&mut self) -> &mut RecordMeta;

    /// Every column except the primary key, in table order
    fn attributes(&self) -> Vec<Attribute>;

    /// Set a column by name, converting the value to the field type
    fn assign(&mut self, column: &str, value: Value) -> Result<(), RecordError>;

    /// Mark every column as persisted
    fn sync_original(&mut self);

    fn id(&self) -> Option<i64> {
        self.meta().id
    }

    /// Whether the record currently has a row
    fn exists(&self) -> bool {
        self.meta().state == RecordState::Persisted
    }

    fn is_fillable(column: &str) -> bool {
        if !Self::FILLABLE.is_empty() {
            return Self::FILLABLE.iter().any(|fillable| *fillable == column);
        }
        column != Self::PRIMARY_KEY && !Self::GUARDED.iter().any(|guarded| *guarded == column)
    }

    /// Bulk assignment; columns that are not fillable or not on the record
    /// are skipped
    fn fill<K, V, I>(&mut self, input: I) -> Result<(), RecordError>
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (column, value) in input {
            let column = column.as_ref();
            if !Self::is_fillable(column) {
                continue;
            }
            match self.assign(column, value.into()) {
                Ok(()) | Err(RecordError::UnknownColumn { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn dirty_columns(&self) -> Vec<&'static str> {
        self.attributes()
            .into_iter()
            .filter(|attribute| attribute.dirty)
            .map(|attribute| attribute.column)
            .collect()
    }

    fn is_dirty(&self) -> bool {
        self.attributes().iter().any(|attribute| attribute.dirty)
    }

    /// Plain mapping of the current attributes, hidden columns removed
    fn to_array(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert(
            Self::PRIMARY_KEY.to_string(),
            self.id().map(serde_json::Value::from).unwrap_or_default(),
        );
        for attribute in self.attributes() {
            if !Self::HIDDEN.contains(&attribute.column) {
                map.insert(attribute.column.to_string(), attribute.value.to_json());
            }
        }
        map
    }

    fn to_json(&self) -> String {
        serde_json::Value::Object(self.to_array()).to_string()
    }
}

//! Records and the sync metadata that travels with them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Timestamp};

/// Well-known field names.
///
/// Models may or may not declare these; the schema registry decides which
/// ones a given model carries.
pub mod fields {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const SORT: &str = "sort";
    pub const LOCALE: &str = "locale";
    pub const GRAY_RELEASE: &str = "grayRelease";
    pub const MATERIAL_ID: &str = "materialID";
    pub const UPDATED_AT: &str = "updatedAt";

    /// Sync metadata keys inside a wire item.
    pub const VERSION: &str = "_version";
    pub const LAST_CHANGED_AT: &str = "_lastChangedAt";
    pub const DELETED: &str = "_deleted";
}

/// One instance of a named model.
///
/// `fields` never contains `id`; the identifier lives in its own slot so it
/// cannot be overwritten by a field update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub model: String,
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Record {
    /// Creates a record with no fields.
    pub fn new(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a field. Setting `id` is ignored.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        if name == fields::ID {
            return;
        }
        self.fields.insert(name.to_string(), value.into());
    }

    /// Returns a raw field value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        if name == fields::ID {
            return None;
        }
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// Returns a string field.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Returns an integer field. Integral floats and numeric strings are accepted.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn sort(&self) -> Option<i64> {
        self.get_i64(fields::SORT)
    }

    pub fn locale(&self) -> Option<&str> {
        self.get_str(fields::LOCALE)
    }

    pub fn gray_release(&self) -> Option<i64> {
        self.get_i64(fields::GRAY_RELEASE)
    }

    /// The base record a locale overlay points at.
    pub fn material_id(&self) -> Option<&str> {
        self.get_str(fields::MATERIAL_ID)
    }

    /// Display name, ignoring empty strings.
    pub fn display_name(&self) -> Option<&str> {
        self.get_str(fields::NAME).filter(|s| !s.is_empty())
    }

    /// `updatedAt` parsed as an ISO-8601 date-time.
    pub fn updated_at(&self) -> Option<Timestamp> {
        self.get_str(fields::UPDATED_AT)
            .and_then(|s| Timestamp::parse_rfc3339(s).ok())
    }

    /// The record as a flat JSON object including `id`.
    pub fn to_json(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert(fields::ID.to_string(), Value::String(self.id.clone()));
        Value::Object(object)
    }

    /// Builds a record from a flat JSON object; `id` is required.
    ///
    /// Sync metadata keys (`_version`, `_deleted`, ...) are dropped.
    pub fn from_json(model: impl Into<String>, value: &Value) -> crate::Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::InvalidRecord("expected a JSON object".into()))?;
        let id = match object.get(fields::ID) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(Error::InvalidRecord("missing id".into())),
        };
        let fields = object
            .iter()
            .filter(|(k, _)| k.as_str() != fields::ID && !k.starts_with('_'))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Self {
            model: model.into(),
            id,
            fields,
        })
    }
}

/// Sync metadata carried next to a record in a sync payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Server-side monotonic version. Advisory unless version-checked
    /// conflict resolution is enabled.
    pub version: i64,
    pub last_changed_at: Timestamp,
    /// Tombstone flag.
    pub is_deleted: bool,
}

impl RecordMetadata {
    pub fn new(version: i64, last_changed_at: Timestamp, is_deleted: bool) -> Self {
        Self {
            version,
            last_changed_at,
            is_deleted,
        }
    }
}

/// A record plus its sync metadata, as delivered by one sync page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelWithMetadata {
    pub record: Record,
    pub metadata: RecordMetadata,
}

impl ModelWithMetadata {
    pub fn new(record: Record, metadata: RecordMetadata) -> Self {
        Self { record, metadata }
    }

    /// Splits one wire item into record and metadata.
    ///
    /// Missing metadata keys default to version 0, epoch, not deleted.
    pub fn from_item(model: impl Into<String>, item: &Value) -> crate::Result<Self> {
        let record = Record::from_json(model, item)?;
        let version = item
            .get(fields::VERSION)
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let last_changed_at = item
            .get(fields::LAST_CHANGED_AT)
            .and_then(Value::as_u64)
            .map(Timestamp::from_millis)
            .unwrap_or_default();
        let is_deleted = item
            .get(fields::DELETED)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(Self {
            record,
            metadata: RecordMetadata::new(version, last_changed_at, is_deleted),
        })
    }

    /// Renders the wire shape: record fields plus metadata keys.
    pub fn to_item(&self) -> Value {
        let mut item = self.record.to_json();
        if let Value::Object(object) = &mut item {
            object.insert(fields::VERSION.into(), self.metadata.version.into());
            object.insert(
                fields::LAST_CHANGED_AT.into(),
                self.metadata.last_changed_at.as_millis().into(),
            );
            object.insert(fields::DELETED.into(), self.metadata.is_deleted.into());
        }
        item
    }

    pub fn is_deleted(&self) -> bool {
        self.metadata.is_deleted
    }
}

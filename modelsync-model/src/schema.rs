use modelsync_types::fields;
use serde::{Deserialize, Serialize};

/// Name suffix that marks a locale overlay model (`StickerLocale` overlays `Sticker`).
pub const LOCALE_SUFFIX: &str = "Locale";

/// Static description of one replicated model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSchema {
    pub name: String,
    /// Name used by the backend's list operation (`list<plural_name>`).
    pub plural_name: String,
    pub fields: Vec<FieldDef>,
}

impl ModelSchema {
    /// Creates a schema with an `id` field and a plural name of `<name>s`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            plural_name: format!("{name}s"),
            name,
            fields: vec![FieldDef::new(fields::ID, FieldType::Id)],
        }
    }

    #[must_use]
    pub fn with_plural(mut self, plural_name: impl Into<String>) -> Self {
        self.plural_name = plural_name.into();
        self
    }

    /// Adds a field, replacing any existing field of the same name.
    #[must_use]
    pub fn field(mut self, name: &str, field_type: FieldType) -> Self {
        self.fields.retain(|f| f.name != name);
        self.fields.push(FieldDef::new(name, field_type));
        self
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// True for `<Base>Locale` models.
    pub fn is_locale_overlay(&self) -> bool {
        self.name.len() > LOCALE_SUFFIX.len() && self.name.ends_with(LOCALE_SUFFIX)
    }

    /// Name of the model this overlay targets, by naming convention only.
    pub fn overlay_base_name(&self) -> Option<&str> {
        if self.is_locale_overlay() {
            self.name.strip_suffix(LOCALE_SUFFIX)
        } else {
            None
        }
    }

    /// Derives the capability descriptor from the declared fields.
    pub fn capabilities(&self) -> ModelCapabilities {
        ModelCapabilities {
            gray_release: self.has_field(fields::GRAY_RELEASE),
            locale: self.has_field(fields::LOCALE),
            sort: self.has_field(fields::SORT),
            material_id: self.has_field(fields::MATERIAL_ID),
            locale_overlay: self.is_locale_overlay(),
        }
    }
}

/// A declared field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldDef {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Scalar type of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Id,
    String,
    Int,
    Float,
    Boolean,
    DateTime,
    Json,
}

/// Which optional well-known fields a model declares.
///
/// Built once per model at registration; predicate building, query ordering
/// and overlay merging consult this instead of inspecting record payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelCapabilities {
    pub gray_release: bool,
    pub locale: bool,
    pub sort: bool,
    pub material_id: bool,
    pub locale_overlay: bool,
}

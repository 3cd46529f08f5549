use modelsync_model::{FieldType, ModelCapabilities, ModelError, ModelSchema, SchemaRegistry};
use pretty_assertions::assert_eq;

fn sticker() -> ModelSchema {
    ModelSchema::new("Sticker")
        .field("name", FieldType::String)
        .field("sort", FieldType::Int)
        .field("grayRelease", FieldType::Int)
        .field("updatedAt", FieldType::DateTime)
}

fn sticker_locale() -> ModelSchema {
    ModelSchema::new("StickerLocale")
        .field("name", FieldType::String)
        .field("sort", FieldType::Int)
        .field("locale", FieldType::String)
        .field("materialID", FieldType::String)
}

// ── ModelSchema ──────────────────────────────────────────────────

#[test]
fn new_schema_declares_id() {
    let schema = ModelSchema::new("Font");
    assert!(schema.has_field("id"));
    assert_eq!(schema.plural_name, "Fonts");
}

#[test]
fn custom_plural() {
    let schema = ModelSchema::new("Category").with_plural("Categories");
    assert_eq!(schema.plural_name, "Categories");
}

#[test]
fn redeclared_field_replaces() {
    let schema = ModelSchema::new("Font")
        .field("sort", FieldType::String)
        .field("sort", FieldType::Int);
    let sorts: Vec<_> = schema.fields.iter().filter(|f| f.name == "sort").collect();
    assert_eq!(sorts.len(), 1);
    assert_eq!(sorts[0].field_type, FieldType::Int);
}

#[test]
fn overlay_detection_by_suffix() {
    assert!(sticker_locale().is_locale_overlay());
    assert_eq!(sticker_locale().overlay_base_name(), Some("Sticker"));
    assert!(!sticker().is_locale_overlay());
    assert!(!ModelSchema::new("Locale").is_locale_overlay());
}

#[test]
fn field_type_serde_snake_case() {
    let json = serde_json::to_string(&FieldType::DateTime).unwrap();
    assert_eq!(json, "\"date_time\"");
}

// ── Capabilities ─────────────────────────────────────────────────

#[test]
fn capabilities_of_base_model() {
    assert_eq!(
        sticker().capabilities(),
        ModelCapabilities {
            gray_release: true,
            locale: false,
            sort: true,
            material_id: false,
            locale_overlay: false,
        }
    );
}

#[test]
fn capabilities_of_overlay_model() {
    let caps = sticker_locale().capabilities();
    assert!(caps.locale_overlay);
    assert!(caps.locale);
    assert!(caps.material_id);
    assert!(!caps.gray_release);
}

// ── SchemaRegistry ───────────────────────────────────────────────

#[test]
fn registry_preserves_order() {
    let registry = SchemaRegistry::new("v1")
        .with_model(sticker())
        .unwrap()
        .with_model(sticker_locale())
        .unwrap();
    let names: Vec<_> = registry.model_names().collect();
    assert_eq!(names, vec!["Sticker", "StickerLocale"]);
    assert_eq!(registry.version(), "v1");
}

#[test]
fn duplicate_registration_rejected() {
    let mut registry = SchemaRegistry::new("v1");
    registry.register(sticker()).unwrap();
    assert!(matches!(
        registry.register(sticker()),
        Err(ModelError::InvalidSchema(_))
    ));
}

#[test]
fn invalid_names_rejected() {
    let mut registry = SchemaRegistry::new("v1");
    assert!(registry.register(ModelSchema::new("")).is_err());
    assert!(registry.register(ModelSchema::new("bad name")).is_err());
    assert!(registry.is_empty());
}

#[test]
fn unknown_model_lookup() {
    let registry = SchemaRegistry::new("v1");
    assert_eq!(
        registry.capabilities("Nope"),
        Err(ModelError::UnknownModel("Nope".into()))
    );
    assert!(registry.fields_of("Nope").is_err());
}

#[test]
fn fields_of_lists_declared_fields() {
    let registry = SchemaRegistry::new("v1").with_model(sticker()).unwrap();
    let fields = registry.fields_of("Sticker").unwrap();
    assert_eq!(fields, vec!["id", "name", "sort", "grayRelease", "updatedAt"]);
}

#[test]
fn overlay_target_requires_registered_base() {
    let only_overlay = SchemaRegistry::new("v1").with_model(sticker_locale()).unwrap();
    assert!(only_overlay.overlay_target("StickerLocale").is_none());

    let both = SchemaRegistry::new("v1")
        .with_model(sticker())
        .unwrap()
        .with_model(sticker_locale())
        .unwrap();
    assert_eq!(both.overlay_target("StickerLocale").unwrap().name, "Sticker");
    assert!(both.overlay_target("Sticker").is_none());
}

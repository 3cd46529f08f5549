use std::collections::HashMap;

use crate::{ModelCapabilities, ModelError, ModelSchema, Result};

/// The set of models a replica synchronizes.
///
/// Registration order is preserved: it is the order child queries appear in a
/// composite request and the order groups are merged.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    version: String,
    models: Vec<ModelSchema>,
    capabilities: Vec<ModelCapabilities>,
    index: HashMap<String, usize>,
}

impl SchemaRegistry {
    /// Creates an empty registry tagged with a model-set version.
    ///
    /// The version is persisted next to the watermark; bump it whenever the
    /// model set changes shape.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Default::default()
        }
    }

    /// Registers a model. Names must be unique and non-empty.
    pub fn register(&mut self, schema: ModelSchema) -> Result<()> {
        if schema.name.is_empty() || schema.plural_name.is_empty() {
            return Err(ModelError::InvalidSchema("model name must not be empty".into()));
        }
        if !schema.name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ModelError::InvalidSchema(format!(
                "model name {:?} is not a valid identifier",
                schema.name
            )));
        }
        if self.index.contains_key(&schema.name) {
            return Err(ModelError::InvalidSchema(format!(
                "model {} registered twice",
                schema.name
            )));
        }
        self.index.insert(schema.name.clone(), self.models.len());
        self.capabilities.push(schema.capabilities());
        self.models.push(schema);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_model(mut self, schema: ModelSchema) -> Result<Self> {
        self.register(schema)?;
        Ok(self)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Registered models in registration order.
    pub fn models(&self) -> &[ModelSchema] {
        &self.models
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&ModelSchema> {
        self.index
            .get(name)
            .map(|&i| &self.models[i])
            .ok_or_else(|| ModelError::UnknownModel(name.to_string()))
    }

    /// Declared field names of a model.
    pub fn fields_of(&self, name: &str) -> Result<Vec<&str>> {
        Ok(self.get(name)?.field_names().collect())
    }

    pub fn capabilities(&self, name: &str) -> Result<ModelCapabilities> {
        self.index
            .get(name)
            .map(|&i| self.capabilities[i])
            .ok_or_else(|| ModelError::UnknownModel(name.to_string()))
    }

    /// The registered base model a locale overlay targets.
    ///
    /// Returns `None` for non-overlay models and for overlays whose base
    /// model is not registered.
    pub fn overlay_target(&self, name: &str) -> Option<&ModelSchema> {
        let base = self.get(name).ok()?.overlay_base_name()?;
        self.get(base).ok()
    }
}

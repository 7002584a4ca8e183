use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::entity::{EntityError, EntityKind, UsergridEntity};

/// Post-processing applied to a freshly parsed entity of a registered type
pub type Hydrator = Arc<dyn Fn(UsergridEntity) -> UsergridEntity + Send + Sync>;

struct Mapping {
    kind: EntityKind,
    hydrator: Option<Hydrator>,
}

/// Maps entity `type` strings to the kind (and optional hook) used when
/// hydrating server JSON. `user` and `device` are registered by default.
pub struct TypeRegistry {
    mappings: HashMap<String, Mapping>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            mappings: HashMap::new(),
        };
        registry.map_kind("user", EntityKind::User);
        registry.map_kind("device", EntityKind::Device);
        registry
    }

    /// Treat entities of `entity_type` as the given kind
    pub fn map_kind(&mut self, entity_type: impl Into<String>, kind: EntityKind) {
        self.mappings.insert(
            entity_type.into(),
            Mapping {
                kind,
                hydrator: None,
            },
        );
    }

    /// Register a hook run on every hydrated entity of `entity_type`
    pub fn register<F>(&mut self, entity_type: impl Into<String>, kind: EntityKind, hydrator: F)
    where
        F: Fn(UsergridEntity) -> UsergridEntity + Send + Sync + 'static,
    {
        self.mappings.insert(
            entity_type.into(),
            Mapping {
                kind,
                hydrator: Some(Arc::new(hydrator)),
            },
        );
    }

    pub fn kind_for(&self, entity_type: &str) -> EntityKind {
        self.mappings
            .get(entity_type)
            .map(|m| m.kind)
            .unwrap_or_default()
    }

    pub fn is_registered(&self, entity_type: &str) -> bool {
        self.mappings.contains_key(entity_type)
    }

    pub fn hydrate(&self, json: Value) -> Result<UsergridEntity, EntityError> {
        let mut entity = UsergridEntity::from_json(json)?;
        match self.mappings.get(entity.entity_type()) {
            Some(mapping) => {
                entity.set_kind(mapping.kind);
                Ok(match &mapping.hydrator {
                    Some(hydrator) => hydrator(entity),
                    None => entity,
                })
            }
            None => {
                entity.set_kind(EntityKind::Entity);
                Ok(entity)
            }
        }
    }

    /// Hydrate a list of server objects, skipping the ones without a type
    pub fn hydrate_all(&self, values: Vec<Value>) -> Vec<UsergridEntity> {
        values
            .into_iter()
            .filter_map(|value| match self.hydrate(value) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    warn!("Skipping entity in response: {}", e);
                    None
                }
            })
            .collect()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.mappings.keys().collect();
        types.sort();
        f.debug_struct("TypeRegistry").field("types", &types).finish()
    }
}

use crate::{
    ConfigError, Entity, Error, Model, Orientation, Relation, RelationSpec, Result, Target,
    relation::derive_relation, util::unpoison,
};
use std::{
    any::TypeId,
    collections::HashMap,
    sync::{Arc, RwLock},
};

type RelationKey = (String, String, Orientation);

/// Models and relation descriptors, built once and shared afterwards.
#[derive(Debug, Default)]
pub struct Registry {
    by_type: RwLock<HashMap<TypeId, Arc<Model>>>,
    by_name: RwLock<HashMap<String, Arc<Model>>>,
    relations: RwLock<HashMap<RelationKey, Arc<Relation>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Model of `T`, described and registered on first use.
    pub fn model<T: Entity>(&self) -> Result<Arc<Model>> {
        if let Some(model) = unpoison(self.by_type.read()).get(&TypeId::of::<T>()) {
            return Ok(model.clone());
        }
        self.register(Model::of::<T>()?)
    }

    /// Registers a model. Registering an equal model again returns the existing one.
    pub fn register(&self, model: Model) -> Result<Arc<Model>> {
        let mut by_name = unpoison(self.by_name.write());
        if let Some(existing) = by_name.get(model.name()) {
            let same = match model.type_id() {
                Some(id) => existing.type_id() == Some(id),
                None => **existing == model,
            };
            if same {
                return Ok(existing.clone());
            }
            let error = ConfigError::DuplicateModel {
                model: model.name().into(),
            };
            log::error!("{}", error);
            return Err(Error::new(error));
        }
        let model = Arc::new(model);
        by_name.insert(model.name().into(), model.clone());
        if let Some(id) = model.type_id() {
            unpoison(self.by_type.write()).insert(id, model.clone());
        }
        log::debug!("Registered model `{}`", model.name());
        Ok(model)
    }

    pub fn by_name(&self, name: &str) -> Result<Arc<Model>> {
        unpoison(self.by_name.read())
            .get(name)
            .cloned()
            .ok_or_else(|| {
                Error::new(ConfigError::UnknownModel {
                    model: name.into(),
                })
            })
    }

    pub fn resolve(&self, target: &Target) -> Result<Arc<Model>> {
        match target {
            Target::Named(name) => self.by_name(name),
            Target::Entity { resolve, .. } => resolve(self),
        }
    }

    /// Descriptor of the relation field `field` of `owner`, derived once and cached.
    pub fn relation(
        &self,
        owner: &Arc<Model>,
        field: &str,
        orientation: Orientation,
    ) -> Result<Arc<Relation>> {
        let key = (owner.name().to_string(), field.to_string(), orientation);
        if let Some(relation) = unpoison(self.relations.read()).get(&key) {
            return Ok(relation.clone());
        }
        let declared = owner.relation_field(field).ok_or_else(|| {
            Error::new(ConfigError::UnknownRelation {
                model: owner.name().into(),
                field: field.into(),
            })
        })?;
        let spec = RelationSpec::from_hint(&declared.hint, orientation);
        let relation = Arc::new(derive_relation(self, owner, declared, &spec)?);
        Ok(unpoison(self.relations.write())
            .entry(key)
            .or_insert(relation)
            .clone())
    }

    /// Descriptor following `spec` instead of the field declaration, never cached.
    pub fn custom_relation(
        &self,
        owner: &Arc<Model>,
        field: &str,
        spec: &RelationSpec,
    ) -> Result<Arc<Relation>> {
        let declared = owner.relation_field(field).ok_or_else(|| {
            Error::new(ConfigError::UnknownRelation {
                model: owner.name().into(),
                field: field.into(),
            })
        })?;
        Ok(Arc::new(derive_relation(self, owner, declared, spec)?))
    }
}

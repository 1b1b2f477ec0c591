use crate::{
    ConfigError, DynEntity, Entity, Error, InvalidRecordType, Model, Result, Value,
};
use std::{any, collections::BTreeMap, fmt, sync::Arc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Native struct.
    Structured,
    /// Map keyed by field name.
    Named,
    /// Map keyed by field position.
    Offset,
}

/// One entity, whatever backs it.
#[derive(Clone)]
pub enum Record {
    Structured {
        model: Arc<Model>,
        entity: Box<dyn DynEntity>,
        virtuals: BTreeMap<String, Value>,
    },
    Named {
        model: Arc<Model>,
        values: BTreeMap<String, Value>,
        related: BTreeMap<String, Vec<Record>>,
    },
    Offset {
        model: Arc<Model>,
        values: BTreeMap<usize, Value>,
        virtuals: BTreeMap<String, Value>,
        related: BTreeMap<String, Vec<Record>>,
    },
}

/// Field slot inside a record.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Declared(usize),
    Virtual(String),
}

/// Write through access to one field of a record, the scan target of a row.
pub struct FieldHandle<'r> {
    record: &'r mut Record,
    slot: Slot,
}

impl<'r> FieldHandle<'r> {
    pub fn get(&self) -> Option<Value> {
        match &self.slot {
            Slot::Declared(i) => self.record.declared(*i),
            Slot::Virtual(name) => self.record.virtual_field(name).cloned(),
        }
    }
    pub fn set(&mut self, value: Value) -> Result<()> {
        match &self.slot {
            Slot::Declared(i) => self.record.set_declared(*i, value),
            Slot::Virtual(name) => {
                self.record.set_virtual(name.clone(), value);
                Ok(())
            }
        }
    }
    pub fn is_virtual(&self) -> bool {
        matches!(self.slot, Slot::Virtual(..))
    }
}

impl Record {
    pub fn from_entity<T: Entity>(model: Arc<Model>, entity: T) -> Result<Self> {
        check_entity_type::<T>(&model)?;
        Ok(Record::Structured {
            model,
            entity: Box::new(entity),
            virtuals: Default::default(),
        })
    }

    pub fn named(model: Arc<Model>, values: BTreeMap<String, Value>) -> Self {
        Record::Named {
            model,
            values,
            related: Default::default(),
        }
    }

    pub fn offset(model: Arc<Model>, values: BTreeMap<usize, Value>) -> Result<Self> {
        if let Some(i) = values.keys().find(|i| **i >= model.fields().len()) {
            return Err(Error::new(InvalidRecordType(format!(
                "`{}` has no field at position {i}",
                model.name()
            ))));
        }
        Ok(Record::Offset {
            model,
            values,
            virtuals: Default::default(),
            related: Default::default(),
        })
    }

    /// Empty record of the given kind.
    pub fn new(model: Arc<Model>, kind: RecordKind) -> Result<Self> {
        Ok(match kind {
            RecordKind::Structured => {
                let entity = model.create_entity().ok_or_else(|| {
                    Error::new(InvalidRecordType(format!(
                        "`{}` has no native type",
                        model.name()
                    )))
                })?;
                Record::Structured {
                    model,
                    entity,
                    virtuals: Default::default(),
                }
            }
            RecordKind::Named => Record::named(model, Default::default()),
            RecordKind::Offset => Record::Offset {
                model,
                values: Default::default(),
                virtuals: Default::default(),
                related: Default::default(),
            },
        })
    }

    pub fn model(&self) -> &Arc<Model> {
        match self {
            Record::Structured { model, .. }
            | Record::Named { model, .. }
            | Record::Offset { model, .. } => model,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Structured { .. } => RecordKind::Structured,
            Record::Named { .. } => RecordKind::Named,
            Record::Offset { .. } => RecordKind::Offset,
        }
    }

    /// Value of a declared or virtual field, `None` when there is no such field.
    pub fn field(&self, name: &str) -> Option<Value> {
        match self.model().field_index(name) {
            Some(i) => self.declared(i),
            None => self.virtual_field(name).cloned(),
        }
    }

    /// Sets a field, names the model doesn't declare become virtual fields.
    pub fn set_field(&mut self, name: &str, value: Value) -> Result<()> {
        self.field_handle(name).set(value)
    }

    pub fn field_handle(&mut self, name: &str) -> FieldHandle<'_> {
        let slot = match self.model().field_index(name) {
            Some(i) => Slot::Declared(i),
            None => Slot::Virtual(name.to_string()),
        };
        FieldHandle { record: self, slot }
    }

    /// Handle of the declared field at position `slot`.
    pub fn handle(&mut self, slot: usize) -> Result<FieldHandle<'_>> {
        if slot >= self.model().fields().len() {
            return Err(Error::new(ConfigError::UnknownField {
                model: self.model().name().into(),
                field: format!("#{slot}"),
            }));
        }
        Ok(FieldHandle {
            record: self,
            slot: Slot::Declared(slot),
        })
    }

    /// Prototype of the field type, for virtual fields the type of the current value.
    pub fn field_type(&self, name: &str) -> Option<Value> {
        match self.model().field(name) {
            Some(field) => Some(field.value.clone()),
            None => self.field(name).map(|v| v.as_null()),
        }
    }

    /// True when the field is declared and carries a value, every declared field of a native
    /// struct does.
    pub fn has_field(&self, index: usize) -> bool {
        match self {
            Record::Structured { .. } => index < self.model().fields().len(),
            Record::Named { model, values, .. } => model
                .fields()
                .get(index)
                .is_some_and(|f| values.contains_key(&f.name)),
            Record::Offset { values, .. } => values.contains_key(&index),
        }
    }

    /// Virtual fields, in name order.
    pub fn virtuals(&self) -> Vec<(&str, &Value)> {
        match self {
            Record::Structured { virtuals, .. } | Record::Offset { virtuals, .. } => {
                virtuals.iter().map(|(k, v)| (k.as_str(), v)).collect()
            }
            Record::Named { model, values, .. } => values
                .iter()
                .filter(|(k, _)| model.field_index(k).is_none())
                .map(|(k, v)| (k.as_str(), v))
                .collect(),
        }
    }

    /// Moves the related entities of `field` out of the record.
    pub fn take_related(&mut self, field: &str, sub: &Arc<Model>) -> Result<Vec<Record>> {
        let model = self.model().clone();
        let index = model.relation_index(field).ok_or_else(|| {
            Error::new(ConfigError::UnknownRelation {
                model: model.name().into(),
                field: field.into(),
            })
        })?;
        Ok(match self {
            Record::Structured { entity, .. } => match &model.relations()[index].access {
                Some(access) => (access.take)(entity.as_any_mut())
                    .into_iter()
                    .map(|entity| Record::Structured {
                        model: sub.clone(),
                        entity,
                        virtuals: Default::default(),
                    })
                    .collect(),
                None => Vec::new(),
            },
            Record::Named { related, .. } | Record::Offset { related, .. } => {
                related.remove(field).unwrap_or_default()
            }
        })
    }

    /// Stores related entities into `field`, replacing what was there.
    pub fn put_related(&mut self, field: &str, records: Vec<Record>) -> Result<()> {
        let model = self.model().clone();
        let index = model.relation_index(field).ok_or_else(|| {
            Error::new(ConfigError::UnknownRelation {
                model: model.name().into(),
                field: field.into(),
            })
        })?;
        match self {
            Record::Structured { entity, .. } => {
                let Some(access) = &model.relations()[index].access else {
                    return Ok(());
                };
                let entities = records
                    .into_iter()
                    .map(|record| match record {
                        Record::Structured { entity, .. } => Ok(entity),
                        other => Err(Error::new(InvalidRecordType(format!(
                            "cannot store a {:?} record into `{}.{}`",
                            other.kind(),
                            model.name(),
                            field
                        )))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                (access.put)(entity.as_any_mut(), entities)
            }
            Record::Named { related, .. } | Record::Offset { related, .. } => {
                if !model.relations()[index].collection && records.len() > 1 {
                    return Err(Error::msg(format!(
                        "Cannot store {} records into the single relation `{}.{}`",
                        records.len(),
                        model.name(),
                        field
                    )));
                }
                related.insert(field.to_string(), records);
                Ok(())
            }
        }
    }

    /// Related records currently held in `field` of a map record.
    pub fn related(&self, field: &str) -> Option<&[Record]> {
        match self {
            Record::Structured { .. } => None,
            Record::Named { related, .. } | Record::Offset { related, .. } => {
                related.get(field).map(Vec::as_slice)
            }
        }
    }

    pub fn into_entity<T: Entity>(self) -> Result<T> {
        match self {
            Record::Structured { entity, .. } => entity
                .into_any()
                .downcast::<T>()
                .map(|v| *v)
                .map_err(|_| {
                    Error::new(InvalidRecordType(format!(
                        "expected {}",
                        any::type_name::<T>()
                    )))
                }),
            other => Err(Error::new(InvalidRecordType(format!(
                "a {:?} record is not a {}",
                other.kind(),
                any::type_name::<T>()
            )))),
        }
    }

    pub fn entity<T: Entity>(&self) -> Option<&T> {
        match self {
            Record::Structured { entity, .. } => entity.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Map keyed by field name with the declared values, then the virtual ones.
    pub fn to_named(&self) -> BTreeMap<String, Value> {
        let mut result = BTreeMap::new();
        for (i, field) in self.model().fields().iter().enumerate() {
            if let Some(value) = self.declared(i) {
                result.insert(field.name.clone(), value);
            }
        }
        for (name, value) in self.virtuals() {
            result.entry(name.to_string()).or_insert_with(|| value.clone());
        }
        result
    }

    fn declared(&self, index: usize) -> Option<Value> {
        let field = self.model().fields().get(index)?;
        match self {
            Record::Structured { entity, .. } => {
                field.access.as_ref().and_then(|a| (a.get)(entity.as_any()))
            }
            Record::Named { values, .. } => values.get(&field.name).cloned(),
            Record::Offset { values, .. } => values.get(&index).cloned(),
        }
    }

    fn set_declared(&mut self, index: usize, value: Value) -> Result<()> {
        let model = self.model().clone();
        let Some(field) = model.fields().get(index) else {
            return Err(Error::new(ConfigError::UnknownField {
                model: model.name().into(),
                field: format!("#{index}"),
            }));
        };
        match self {
            Record::Structured { entity, virtuals, .. } => match &field.access {
                Some(access) => (access.set)(entity.as_any_mut(), value)?,
                None => {
                    virtuals.insert(field.name.clone(), value);
                }
            },
            Record::Named { values, .. } => {
                let value = value.convert_to(&field.value).map_err(|e| {
                    e.context(format!("While setting {}.{}", model.name(), field.name))
                })?;
                values.insert(field.name.clone(), value);
            }
            Record::Offset { values, .. } => {
                let value = value.convert_to(&field.value).map_err(|e| {
                    e.context(format!("While setting {}.{}", model.name(), field.name))
                })?;
                values.insert(index, value);
            }
        }
        Ok(())
    }

    fn virtual_field(&self, name: &str) -> Option<&Value> {
        match self {
            Record::Structured { virtuals, .. } | Record::Offset { virtuals, .. } => {
                virtuals.get(name)
            }
            Record::Named { values, .. } => values.get(name),
        }
    }

    fn set_virtual(&mut self, name: String, value: Value) {
        match self {
            Record::Structured { virtuals, .. } | Record::Offset { virtuals, .. } => {
                virtuals.insert(name, value);
            }
            Record::Named { values, .. } => {
                values.insert(name, value);
            }
        }
    }
}

pub(crate) fn check_entity_type<T: Entity>(model: &Model) -> Result<()> {
    if model.type_id() != Some(any::TypeId::of::<T>()) {
        return Err(Error::new(InvalidRecordType(format!(
            "`{}` is not described by {}",
            model.name(),
            any::type_name::<T>()
        ))));
    }
    Ok(())
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("model", &self.model().name())
            .field("kind", &self.kind())
            .field("values", &self.to_named())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Registry,
        testing::{Author, Book},
    };

    #[test]
    fn structured_fields_and_virtuals() {
        let registry = Registry::new();
        let model = registry.model::<Author>().unwrap();
        let mut record = Record::from_entity(
            model,
            Author {
                id: 3,
                name: "Ursula".into(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(record.field("id"), Some(Value::Int64(Some(3))));
        assert_eq!(record.field("nope"), None);
        record.set_field("id", Value::Int32(Some(4))).unwrap();
        record.set_field("score", Value::Float64(Some(1.5))).unwrap();
        assert_eq!(record.field("score"), Some(Value::Float64(Some(1.5))));
        assert_eq!(record.field_type("score"), Some(Value::Float64(None)));
        assert_eq!(record.field_type("name"), Some(Value::Varchar(None)));
        let author = record.into_entity::<Author>().unwrap();
        assert_eq!(author.id, 4);
    }

    #[test]
    fn maps_convert_declared_fields() {
        let registry = Registry::new();
        let model = registry.model::<Book>().unwrap();
        let mut named = Record::new(model.clone(), RecordKind::Named).unwrap();
        named.set_field("id", Value::Varchar(Some("12".into()))).unwrap();
        named.set_field("extra", Value::Boolean(Some(true))).unwrap();
        assert_eq!(named.field("id"), Some(Value::Int64(Some(12))));
        assert_eq!(named.field("title"), None);
        assert_eq!(named.virtuals(), vec![("extra", &Value::Boolean(Some(true)))]);

        let mut offset = Record::new(model.clone(), RecordKind::Offset).unwrap();
        let mut handle = offset.handle(0).unwrap();
        handle.set(Value::UInt8(Some(7))).unwrap();
        assert_eq!(handle.get(), Some(Value::Int64(Some(7))));
        assert!(offset.has_field(0));
        assert!(!offset.has_field(1));
        assert!(offset.handle(99).is_err());
        assert!(Record::offset(model, BTreeMap::from([(42, Value::Null)])).is_err());
    }

    #[test]
    fn related_moves_in_and_out() {
        let registry = Registry::new();
        let author = registry.model::<Author>().unwrap();
        let book = registry.model::<Book>().unwrap();
        let mut record = Record::from_entity(
            author,
            Author {
                books: vec![Book::default(), Book::default()],
                ..Default::default()
            },
        )
        .unwrap();
        let books = record.take_related("books", &book).unwrap();
        assert_eq!(books.len(), 2);
        assert!(record.take_related("books", &book).unwrap().is_empty());
        record.put_related("books", books).unwrap();
        assert_eq!(record.entity::<Author>().unwrap().books.len(), 2);
        assert!(record.take_related("ghost", &book).is_err());
    }

    #[test]
    fn wrong_entity_type() {
        let registry = Registry::new();
        let model = registry.model::<Author>().unwrap();
        let error = Record::from_entity(model, Book::default()).unwrap_err();
        assert!(error.downcast_ref::<InvalidRecordType>().is_some());
    }
}

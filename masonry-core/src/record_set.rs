use crate::{
    Entity, Error, InvalidRecordType, Model, Record, RecordKind, Result, Value,
    record::check_entity_type,
};
use std::{collections::BTreeMap, fmt, sync::Arc};

/// Ordered batch of records sharing one model and one representation.
#[derive(Clone)]
pub struct RecordSet {
    model: Arc<Model>,
    kind: RecordKind,
    records: Vec<Record>,
}

impl RecordSet {
    pub fn empty(model: Arc<Model>, kind: RecordKind) -> Self {
        Self {
            model,
            kind,
            records: Vec::new(),
        }
    }

    pub fn from_entities<T: Entity>(model: Arc<Model>, entities: Vec<T>) -> Result<Self> {
        check_entity_type::<T>(&model)?;
        let records = entities
            .into_iter()
            .map(|entity| Record::Structured {
                model: model.clone(),
                entity: Box::new(entity),
                virtuals: Default::default(),
            })
            .collect();
        Ok(Self {
            model,
            kind: RecordKind::Structured,
            records,
        })
    }

    pub fn from_named(model: Arc<Model>, rows: Vec<BTreeMap<String, Value>>) -> Self {
        let records = rows
            .into_iter()
            .map(|values| Record::named(model.clone(), values))
            .collect();
        Self {
            model,
            kind: RecordKind::Named,
            records,
        }
    }

    pub fn from_offset(model: Arc<Model>, rows: Vec<BTreeMap<usize, Value>>) -> Result<Self> {
        let records = rows
            .into_iter()
            .map(|values| Record::offset(model.clone(), values))
            .collect::<Result<_>>()?;
        Ok(Self {
            model,
            kind: RecordKind::Offset,
            records,
        })
    }

    /// Batch over existing records, all of them must match `model` and `kind`.
    pub fn from_records(model: Arc<Model>, kind: RecordKind, records: Vec<Record>) -> Result<Self> {
        let mut result = Self::empty(model, kind);
        result.records.reserve(records.len());
        for record in records {
            result.add(record)?;
        }
        Ok(result)
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }
    pub fn kind(&self) -> RecordKind {
        self.kind
    }
    pub fn len(&self) -> usize {
        self.records.len()
    }
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
    /// Maps only carry the fields that were set, so the write path takes their keys as is.
    pub fn is_variable_container(&self) -> bool {
        self.kind != RecordKind::Structured
    }

    /// Appends a record, it must have the same kind and model as the set.
    pub fn add(&mut self, record: Record) -> Result<&mut Record> {
        if record.kind() != self.kind
            || !(Arc::ptr_eq(record.model(), &self.model) || **record.model() == *self.model)
        {
            return Err(Error::new(InvalidRecordType(format!(
                "cannot add a {:?} record of `{}` to a {:?} set of `{}`",
                record.kind(),
                record.model().name(),
                self.kind,
                self.model.name()
            ))));
        }
        self.records.push(record);
        let last = self.records.len() - 1;
        Ok(&mut self.records[last])
    }

    /// Appends an empty record.
    pub fn add_default(&mut self) -> Result<&mut Record> {
        let record = Record::new(self.model.clone(), self.kind)?;
        self.records.push(record);
        let last = self.records.len() - 1;
        Ok(&mut self.records[last])
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Record> {
        self.records.get_mut(index)
    }
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Record> {
        self.records.iter_mut()
    }
    pub fn records(&self) -> &[Record] {
        &self.records
    }
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
    /// Field type prototype, as declared by the model or observed on the first record.
    pub fn field_type(&self, name: &str) -> Option<Value> {
        match self.model.field(name) {
            Some(field) => Some(field.value.clone()),
            None => self.records.first().and_then(|r| r.field_type(name)),
        }
    }

    pub fn into_entities<T: Entity>(self) -> Result<Vec<T>> {
        self.records
            .into_iter()
            .map(Record::into_entity::<T>)
            .collect()
    }

    /// Appends the records of a set of the same model and kind, nothing is appended on mismatch.
    pub fn extend(&mut self, mut other: RecordSet) -> Result<()> {
        if other.is_empty() {
            return Ok(());
        }
        if other.kind != self.kind
            || !(Arc::ptr_eq(&other.model, &self.model) || *other.model == *self.model)
        {
            return Err(Error::new(InvalidRecordType(format!(
                "cannot append a {:?} set of `{}` to a {:?} set of `{}`",
                other.kind,
                other.model.name(),
                self.kind,
                self.model.name()
            ))));
        }
        self.records.append(&mut other.records);
        Ok(())
    }

    /// Batch over records known to match `model` and `kind`.
    pub(crate) fn with_records(model: Arc<Model>, kind: RecordKind, records: Vec<Record>) -> Self {
        Self {
            model,
            kind,
            records,
        }
    }

    pub(crate) fn take_records(&mut self) -> Vec<Record> {
        std::mem::take(&mut self.records)
    }

    pub(crate) fn put_records(&mut self, records: Vec<Record>) {
        self.records = records;
    }
}

impl fmt::Debug for RecordSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordSet")
            .field("model", &self.model.name())
            .field("kind", &self.kind)
            .field("records", &self.records)
            .finish()
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;
    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
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
    fn length_follows_adds() {
        let registry = Registry::new();
        let model = registry.model::<Book>().unwrap();
        for kind in [RecordKind::Structured, RecordKind::Named, RecordKind::Offset] {
            let mut set = RecordSet::empty(model.clone(), kind);
            for i in 0..5 {
                let record = set.add_default().unwrap();
                record.set_field("id", Value::Int64(Some(i))).unwrap();
                record
                    .set_field("title", Value::Varchar(Some(format!("t{i}"))))
                    .unwrap();
                assert_eq!(set.len(), i as usize + 1);
            }
            for (i, record) in set.iter().enumerate() {
                assert_eq!(record.field("id"), Some(Value::Int64(Some(i as i64))));
                assert_eq!(
                    record.field("title"),
                    Some(Value::Varchar(Some(format!("t{i}"))))
                );
            }
            assert_eq!(set.is_variable_container(), kind != RecordKind::Structured);
        }
    }

    #[test]
    fn mismatched_records_are_rejected() {
        let registry = Registry::new();
        let author = registry.model::<Author>().unwrap();
        let book = registry.model::<Book>().unwrap();
        let mut set = RecordSet::empty(author.clone(), RecordKind::Structured);
        assert!(set.add(Record::new(book, RecordKind::Structured).unwrap()).is_err());
        assert!(set.add(Record::new(author.clone(), RecordKind::Named).unwrap()).is_err());
        assert_eq!(set.len(), 0);
        assert!(RecordSet::from_entities(author, vec![Book::default()]).is_err());
    }

    #[test]
    fn entities_round_trip() {
        let registry = Registry::new();
        let model = registry.model::<Author>().unwrap();
        let set = RecordSet::from_entities(
            model,
            vec![
                Author {
                    id: 1,
                    ..Default::default()
                },
                Author {
                    id: 2,
                    ..Default::default()
                },
            ],
        )
        .unwrap();
        assert_eq!(set.field_type("id"), Some(Value::Int64(None)));
        let authors = set.into_entities::<Author>().unwrap();
        assert_eq!(authors.iter().map(|a| a.id).collect::<Vec<_>>(), [1, 2]);
    }
}

use crate::{AsValue, ConfigError, Error, InvalidRecordType, Registry, Result, Value};
use convert_case::{Case, Casing};
use std::{
    any::{self, Any, TypeId},
    collections::{BTreeMap, HashMap},
    fmt,
    marker::PhantomData,
    mem,
    sync::Arc,
};

/// Type erased entity as stored inside structured records.
pub type AnyEntity = dyn Any + Send + Sync;

type Getter = Arc<dyn Fn(&AnyEntity) -> Option<Value> + Send + Sync>;
type Setter = Arc<dyn Fn(&mut AnyEntity, Value) -> Result<()> + Send + Sync>;
type Taker = Arc<dyn Fn(&mut AnyEntity) -> Vec<Box<dyn DynEntity>> + Send + Sync>;
type Putter = Arc<dyn Fn(&mut AnyEntity, Vec<Box<dyn DynEntity>>) -> Result<()> + Send + Sync>;

/// Object safe view of an [`Entity`], lets boxed entities be cloned.
pub trait DynEntity: Send + Sync {
    fn as_any(&self) -> &AnyEntity;
    fn as_any_mut(&mut self) -> &mut AnyEntity;
    fn into_any(self: Box<Self>) -> Box<AnyEntity>;
    fn clone_boxed(&self) -> Box<dyn DynEntity>;
}

impl<T: Entity> DynEntity for T {
    fn as_any(&self) -> &AnyEntity {
        self
    }
    fn as_any_mut(&mut self) -> &mut AnyEntity {
        self
    }
    fn into_any(self: Box<Self>) -> Box<AnyEntity> {
        self
    }
    fn clone_boxed(&self) -> Box<dyn DynEntity> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn DynEntity> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

#[derive(Clone)]
pub(crate) struct FieldAccess {
    pub(crate) get: Getter,
    pub(crate) set: Setter,
}

#[derive(Clone)]
pub(crate) struct RelationAccess {
    pub(crate) take: Taker,
    pub(crate) put: Putter,
}

#[derive(Clone, Copy)]
pub(crate) struct EntityFactory {
    pub(crate) create: fn() -> Box<dyn DynEntity>,
}

/// A mapped struct. Usually implemented with `#[derive(Entity)]`.
pub trait Entity: Any + Clone + Default + Send + Sync {
    /// Declares table, columns and relation fields on the builder.
    fn describe(model: &mut ModelBuilder<Self>);
}

/// Field holding related entities: `Option<S>` for a single one, `Vec<S>` for many.
pub trait Related: Send + Sync + 'static {
    type Item: Entity;
    const COLLECTION: bool;
    fn take_items(&mut self) -> Vec<Self::Item>;
    fn put_items(&mut self, items: Vec<Self::Item>) -> Result<()>;
}

impl<S: Entity> Related for Option<S> {
    type Item = S;
    const COLLECTION: bool = false;
    fn take_items(&mut self) -> Vec<S> {
        self.take().into_iter().collect()
    }
    fn put_items(&mut self, items: Vec<S>) -> Result<()> {
        if items.len() > 1 {
            return Err(Error::msg(format!(
                "Cannot store {} values of {} into a single relation field",
                items.len(),
                any::type_name::<S>()
            )));
        }
        *self = items.into_iter().next();
        Ok(())
    }
}

impl<S: Entity> Related for Vec<S> {
    type Item = S;
    const COLLECTION: bool = true;
    fn take_items(&mut self) -> Vec<S> {
        mem::take(self)
    }
    fn put_items(&mut self, items: Vec<S>) -> Result<()> {
        *self = items;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldRole {
    #[default]
    Plain,
    CreatedAt,
    UpdatedAt,
    /// Marks the model as soft deletable.
    DeletedAt,
}

#[derive(Clone)]
pub struct ModelField {
    pub name: String,
    pub column: String,
    /// Typed null carrying the declared type.
    pub value: Value,
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    /// Not mapped to any column.
    pub ignore: bool,
    pub unique: bool,
    pub index: Option<String>,
    pub unique_index: Option<String>,
    /// SQL expression used as column default.
    pub default: Option<String>,
    /// Overrides the SQL type the dialect would derive from `value`.
    pub sql_type: Option<String>,
    pub role: FieldRole,
    pub(crate) access: Option<FieldAccess>,
}

impl ModelField {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            value,
            nullable: true,
            primary_key: false,
            auto_increment: false,
            ignore: false,
            unique: false,
            index: None,
            unique_index: None,
            default: None,
            sql_type: None,
            role: FieldRole::Plain,
            access: None,
        }
    }
}

impl PartialEq for ModelField {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.column == other.column
            && self.value == other.value
            && self.nullable == other.nullable
            && self.primary_key == other.primary_key
            && self.auto_increment == other.auto_increment
            && self.ignore == other.ignore
            && self.unique == other.unique
            && self.index == other.index
            && self.unique_index == other.unique_index
            && self.default == other.default
            && self.sql_type == other.sql_type
            && self.role == other.role
    }
}

impl fmt::Debug for ModelField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelField")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("value", &self.value)
            .field("nullable", &self.nullable)
            .field("primary_key", &self.primary_key)
            .field("auto_increment", &self.auto_increment)
            .field("ignore", &self.ignore)
            .field("unique", &self.unique)
            .field("index", &self.index)
            .field("unique_index", &self.unique_index)
            .field("default", &self.default)
            .field("sql_type", &self.sql_type)
            .field("role", &self.role)
            .finish()
    }
}

/// How a relation field is linked, `Auto` derives it from field names.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum RelationHint {
    #[default]
    Auto,
    BelongsTo {
        link: String,
    },
    OneToOne {
        link: String,
    },
    OneToMany {
        link: String,
    },
    ManyToMany {
        junction: Option<String>,
    },
}

/// Model a relation field points to.
#[derive(Clone)]
pub enum Target {
    /// Registered by name, used by dynamic models.
    Named(String),
    Entity {
        type_id: TypeId,
        type_name: &'static str,
        resolve: fn(&Registry) -> Result<Arc<Model>>,
    },
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Target::Named(l), Target::Named(r)) => l == r,
            (Target::Entity { type_id: l, .. }, Target::Entity { type_id: r, .. }) => l == r,
            _ => false,
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Named(name) => write!(f, "Named({name})"),
            Target::Entity { type_name, .. } => write!(f, "Entity({type_name})"),
        }
    }
}

#[derive(Clone)]
pub struct RelationField {
    pub name: String,
    pub target: Target,
    pub collection: bool,
    pub hint: RelationHint,
    pub(crate) access: Option<RelationAccess>,
}

impl PartialEq for RelationField {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.target == other.target
            && self.collection == other.collection
            && self.hint == other.hint
    }
}

impl fmt::Debug for RelationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationField")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("collection", &self.collection)
            .field("hint", &self.hint)
            .finish()
    }
}

/// Static description of one mapped table.
#[derive(Clone)]
pub struct Model {
    name: String,
    type_id: Option<TypeId>,
    type_name: Option<&'static str>,
    fields: Vec<ModelField>,
    relations: Vec<RelationField>,
    by_name: HashMap<String, usize>,
    primary_key: Vec<usize>,
    indexes: BTreeMap<String, Vec<usize>>,
    unique_indexes: BTreeMap<String, Vec<usize>>,
    factory: Option<EntityFactory>,
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.type_id == other.type_id
            && self.fields == other.fields
            && self.relations == other.relations
            && self.primary_key == other.primary_key
            && self.indexes == other.indexes
            && self.unique_indexes == other.unique_indexes
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("fields", &self.fields)
            .field("relations", &self.relations)
            .field("primary_key", &self.primary_key)
            .field("indexes", &self.indexes)
            .field("unique_indexes", &self.unique_indexes)
            .finish()
    }
}

impl Model {
    /// Describes `T` through its [`Entity`] implementation.
    pub fn of<T: Entity>() -> Result<Model> {
        let type_name = any::type_name::<T>();
        let short = type_name.rsplit("::").next().unwrap_or(type_name);
        let mut builder = ModelBuilder::<T>::new(short.to_case(Case::Snake));
        T::describe(&mut builder);
        builder.finish(
            Some(TypeId::of::<T>()),
            Some(type_name),
            Some(EntityFactory {
                create: create_entity::<T>,
            }),
        )
    }

    /// Starts a model without a Rust type, its records are maps.
    pub fn dynamic(name: impl Into<String>) -> ModelBuilder<Dynamic> {
        ModelBuilder::new(name.into())
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }
    pub fn type_name(&self) -> &str {
        self.type_name.unwrap_or(&self.name)
    }
    /// True when records can be backed by native structs.
    pub fn is_structured(&self) -> bool {
        self.factory.is_some()
    }
    pub fn fields(&self) -> &[ModelField] {
        &self.fields
    }
    /// Fields mapped to a column, in declaration order.
    pub fn sql_fields(&self) -> impl Iterator<Item = &ModelField> + Clone {
        self.fields.iter().filter(|f| !f.ignore)
    }
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }
    pub fn field(&self, name: &str) -> Option<&ModelField> {
        self.field_index(name).map(|i| &self.fields[i])
    }
    pub fn field_by_column(&self, column: &str) -> Option<(usize, &ModelField)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| !f.ignore && f.column == column)
    }
    /// The field, addressed by name first and by column second.
    pub fn resolve_field(&self, name: &str) -> Result<&ModelField> {
        self.field(name)
            .or_else(|| self.field_by_column(name).map(|(_, f)| f))
            .ok_or_else(|| {
                Error::new(ConfigError::UnknownField {
                    model: self.name.clone(),
                    field: name.into(),
                })
            })
    }
    pub fn primary_key(&self) -> impl Iterator<Item = &ModelField> + Clone {
        self.primary_key.iter().map(|i| &self.fields[*i])
    }
    pub fn primary_key_indices(&self) -> &[usize] {
        &self.primary_key
    }
    /// The primary key, for operations that need exactly one.
    pub fn single_primary_key(&self) -> Result<&ModelField> {
        match self.primary_key.as_slice() {
            [i] => Ok(&self.fields[*i]),
            _ => Err(Error::new(ConfigError::SinglePrimaryKeyRequired {
                model: self.name.clone(),
            })),
        }
    }
    pub fn indexes(&self) -> &BTreeMap<String, Vec<usize>> {
        &self.indexes
    }
    pub fn unique_indexes(&self) -> &BTreeMap<String, Vec<usize>> {
        &self.unique_indexes
    }
    pub fn field_with_role(&self, role: FieldRole) -> Option<&ModelField> {
        self.fields.iter().find(|f| f.role == role && !f.ignore)
    }
    pub fn deleted_at(&self) -> Option<&ModelField> {
        self.field_with_role(FieldRole::DeletedAt)
    }
    pub fn is_soft_deletable(&self) -> bool {
        self.deleted_at().is_some()
    }
    pub fn relations(&self) -> &[RelationField] {
        &self.relations
    }
    pub fn relation_field(&self, name: &str) -> Option<&RelationField> {
        self.relations.iter().find(|r| r.name == name)
    }
    pub(crate) fn relation_index(&self, name: &str) -> Option<usize> {
        self.relations.iter().position(|r| r.name == name)
    }
    pub(crate) fn create_entity(&self) -> Option<Box<dyn DynEntity>> {
        self.factory.map(|f| (f.create)())
    }
}

fn create_entity<T: Entity>() -> Box<dyn DynEntity> {
    Box::new(T::default())
}

fn registry_model<S: Entity>(registry: &Registry) -> Result<Arc<Model>> {
    registry.model::<S>()
}

/// Marker for builders of models without a Rust type.
pub struct Dynamic;

pub struct ModelBuilder<T> {
    name: String,
    fields: Vec<ModelField>,
    relations: Vec<RelationField>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> ModelBuilder<T> {
    fn new(name: String) -> Self {
        Self {
            name,
            fields: Vec::new(),
            relations: Vec::new(),
            _entity: PhantomData,
        }
    }

    /// Sets the table name.
    pub fn table(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    fn push_field(&mut self, field: ModelField) -> FieldBuilder<'_> {
        self.fields.push(field);
        let len = self.fields.len();
        FieldBuilder {
            field: &mut self.fields[len - 1],
        }
    }

    fn push_relation(&mut self, relation: RelationField) -> RelationBuilder<'_> {
        self.relations.push(relation);
        let len = self.relations.len();
        RelationBuilder {
            relation: &mut self.relations[len - 1],
        }
    }

    fn finish(
        self,
        type_id: Option<TypeId>,
        type_name: Option<&'static str>,
        factory: Option<EntityFactory>,
    ) -> Result<Model> {
        let mut by_name = HashMap::with_capacity(self.fields.len());
        for (i, field) in self.fields.iter().enumerate() {
            if by_name.insert(field.name.clone(), i).is_some() {
                return Err(duplicate(&self.name, &field.name));
            }
        }
        for relation in &self.relations {
            if by_name.contains_key(&relation.name)
                || self
                    .relations
                    .iter()
                    .filter(|r| r.name == relation.name)
                    .count()
                    > 1
            {
                return Err(duplicate(&self.name, &relation.name));
            }
        }
        let mut fields = self.fields;
        let mut indexes = BTreeMap::<String, Vec<usize>>::new();
        let mut unique_indexes = BTreeMap::<String, Vec<usize>>::new();
        let mut primary_key = Vec::new();
        for (i, field) in fields.iter_mut().enumerate() {
            if field.primary_key {
                field.nullable = false;
                primary_key.push(i);
            }
            if field.role == FieldRole::DeletedAt {
                field.nullable = true;
            }
            if field.ignore {
                continue;
            }
            if let Some(index) = &mut field.index {
                if index.is_empty() {
                    *index = format!("idx_{}_{}", self.name, field.column);
                }
                indexes.entry(index.clone()).or_default().push(i);
            }
            if let Some(index) = &mut field.unique_index {
                if index.is_empty() {
                    *index = format!("uidx_{}_{}", self.name, field.column);
                }
                unique_indexes.entry(index.clone()).or_default().push(i);
            }
        }
        Ok(Model {
            name: self.name,
            type_id,
            type_name,
            fields,
            relations: self.relations,
            by_name,
            primary_key,
            indexes,
            unique_indexes,
            factory,
        })
    }
}

fn duplicate(model: &str, field: &str) -> Error {
    let error = ConfigError::DuplicateField {
        model: model.into(),
        field: field.into(),
    };
    log::error!("{}", error);
    Error::new(error)
}

impl<T: Entity> ModelBuilder<T> {
    /// Maps a struct field to a column named like the field.
    pub fn column<V>(
        &mut self,
        name: &str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> FieldBuilder<'_>
    where
        V: AsValue + Clone + Send + Sync + 'static,
    {
        let field_name: Arc<str> = name.into();
        let access = FieldAccess {
            get: Arc::new(move |entity: &AnyEntity| {
                entity
                    .downcast_ref::<T>()
                    .map(|entity| get(entity).clone().as_value())
            }),
            set: Arc::new(move |entity: &mut AnyEntity, value: Value| {
                let entity = entity.downcast_mut::<T>().ok_or_else(|| {
                    Error::new(InvalidRecordType(format!(
                        "expected {}",
                        any::type_name::<T>()
                    )))
                })?;
                *get_mut(entity) = V::try_from_value(value).map_err(|e| {
                    e.context(format!(
                        "While setting {}.{}",
                        any::type_name::<T>(),
                        field_name
                    ))
                })?;
                Ok(())
            }),
        };
        let mut field = ModelField::new(name, V::as_empty_value());
        field.nullable = V::NULLABLE;
        field.access = Some(access);
        self.push_field(field)
    }

    /// Declares a field holding related entities.
    pub fn related<C: Related>(
        &mut self,
        name: &str,
        get_mut: fn(&mut T) -> &mut C,
    ) -> RelationBuilder<'_> {
        let access = RelationAccess {
            take: Arc::new(move |entity: &mut AnyEntity| match entity.downcast_mut::<T>() {
                Some(entity) => get_mut(entity)
                    .take_items()
                    .into_iter()
                    .map(|v| Box::new(v) as Box<dyn DynEntity>)
                    .collect(),
                None => Vec::new(),
            }),
            put: Arc::new(move |entity: &mut AnyEntity, items: Vec<Box<dyn DynEntity>>| {
                let entity = entity.downcast_mut::<T>().ok_or_else(|| {
                    Error::new(InvalidRecordType(format!(
                        "expected {}",
                        any::type_name::<T>()
                    )))
                })?;
                let items = items
                    .into_iter()
                    .map(|v| {
                        v.into_any().downcast::<C::Item>().map(|v| *v).map_err(|_| {
                            Error::new(InvalidRecordType(format!(
                                "expected {}",
                                any::type_name::<C::Item>()
                            )))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                get_mut(entity).put_items(items)
            }),
        };
        self.push_relation(RelationField {
            name: name.into(),
            target: Target::Entity {
                type_id: TypeId::of::<C::Item>(),
                type_name: any::type_name::<C::Item>(),
                resolve: registry_model::<C::Item>,
            },
            collection: C::COLLECTION,
            hint: RelationHint::Auto,
            access: Some(access),
        })
    }
}

impl ModelBuilder<Dynamic> {
    /// Declares a field by its type prototype, e.g. `Value::Int64(None)`.
    pub fn field(&mut self, name: &str, prototype: Value) -> FieldBuilder<'_> {
        self.push_field(ModelField::new(name, prototype.as_null()))
    }

    /// Declares a relation towards a model registered under `target`.
    pub fn related(&mut self, name: &str, target: &str, collection: bool) -> RelationBuilder<'_> {
        self.push_relation(RelationField {
            name: name.into(),
            target: Target::Named(target.into()),
            collection,
            hint: RelationHint::Auto,
            access: None,
        })
    }

    pub fn build(self) -> Result<Model> {
        self.finish(None, None, None)
    }
}

pub struct FieldBuilder<'a> {
    field: &'a mut ModelField,
}

impl<'a> FieldBuilder<'a> {
    /// Column name, defaults to the field name.
    pub fn column(self, name: impl Into<String>) -> Self {
        self.field.column = name.into();
        self
    }
    pub fn primary_key(self) -> Self {
        self.field.primary_key = true;
        self
    }
    pub fn auto_increment(self) -> Self {
        self.field.auto_increment = true;
        self
    }
    pub fn ignore(self) -> Self {
        self.field.ignore = true;
        self
    }
    pub fn unique(self) -> Self {
        self.field.unique = true;
        self
    }
    pub fn nullable(self, nullable: bool) -> Self {
        self.field.nullable = nullable;
        self
    }
    /// Single column index with a generated name.
    pub fn index(self) -> Self {
        self.field.index = Some(String::new());
        self
    }
    /// Member of the named (possibly composite) index.
    pub fn index_named(self, name: impl Into<String>) -> Self {
        self.field.index = Some(name.into());
        self
    }
    pub fn unique_index_named(self, name: impl Into<String>) -> Self {
        self.field.unique_index = Some(name.into());
        self
    }
    pub fn default_sql(self, expression: impl Into<String>) -> Self {
        self.field.default = Some(expression.into());
        self
    }
    pub fn sql_type(self, sql_type: impl Into<String>) -> Self {
        self.field.sql_type = Some(sql_type.into());
        self
    }
    pub fn created_at(self) -> Self {
        self.field.role = FieldRole::CreatedAt;
        self
    }
    pub fn updated_at(self) -> Self {
        self.field.role = FieldRole::UpdatedAt;
        self
    }
    pub fn deleted_at(self) -> Self {
        self.field.role = FieldRole::DeletedAt;
        self
    }
}

pub struct RelationBuilder<'a> {
    relation: &'a mut RelationField,
}

impl<'a> RelationBuilder<'a> {
    /// The owner stores the key of the related entity in `link`.
    pub fn belongs_to(self, link: impl Into<String>) -> Self {
        self.relation.hint = RelationHint::BelongsTo { link: link.into() };
        self
    }
    /// The related entity stores the owner key in `link`.
    pub fn one_to_one(self, link: impl Into<String>) -> Self {
        self.relation.hint = RelationHint::OneToOne { link: link.into() };
        self
    }
    /// The related entities store the owner key in `link`.
    pub fn one_to_many(self, link: impl Into<String>) -> Self {
        self.relation.hint = RelationHint::OneToMany { link: link.into() };
        self
    }
    pub fn many_to_many(self) -> Self {
        self.relation.hint = RelationHint::ManyToMany { junction: None };
        self
    }
    /// Many to many through the junction table `name`.
    pub fn junction(self, name: impl Into<String>) -> Self {
        self.relation.hint = RelationHint::ManyToMany {
            junction: Some(name.into()),
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{find_error, testing::Account};

    #[test]
    fn describing_twice_is_deep_equal() {
        let first = Model::of::<Account>().unwrap();
        let second = Model::of::<Account>().unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.fields().iter().map(|f| &f.name).collect::<Vec<_>>(),
            ["id", "email", "nickname", "deleted_at"]
        );
        assert_eq!(first.primary_key_indices(), &[0]);
        assert_eq!(
            first.indexes().get("idx_account_nickname"),
            Some(&vec![2usize])
        );
        assert!(first.is_soft_deletable());
        assert!(first.field("deleted_at").unwrap().nullable);
    }

    #[test]
    fn duplicate_fields_fail() {
        let mut builder = Model::dynamic("pair");
        builder.field("a", Value::Int64(None));
        builder.field("a", Value::Varchar(None));
        let error = builder.build().unwrap_err();
        assert_eq!(
            find_error::<ConfigError>(&error),
            Some(&ConfigError::DuplicateField {
                model: "pair".into(),
                field: "a".into(),
            })
        );
    }

    #[test]
    fn relation_name_cannot_shadow_a_field() {
        let mut builder = Model::dynamic("node");
        builder.field("parent", Value::Int64(None));
        builder.related("parent", "node", false);
        assert!(builder.build().is_err());
    }

    #[test]
    fn accessors_read_and_write() {
        let model = Model::of::<Account>().unwrap();
        let mut entity = model.create_entity().unwrap();
        let access = model.field("email").unwrap().access.clone().unwrap();
        (access.set)(entity.as_any_mut(), Value::Varchar(Some("a@b.c".into()))).unwrap();
        assert_eq!(
            (access.get)(entity.as_any()),
            Some(Value::Varchar(Some("a@b.c".into())))
        );
        let account = entity.into_any().downcast::<Account>().unwrap();
        assert_eq!(account.email, "a@b.c");
    }
}

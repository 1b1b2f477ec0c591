use crate::{
    ConfigError, Error, Model, ModelField, Registry, RelationField, RelationHint, Result,
};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// The owner stores the key of the sub.
    BelongsTo,
    OneToOne,
    OneToMany,
    ManyToMany,
}

/// Side the owner takes in a many to many junction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Orientation {
    #[default]
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Junction {
    pub model: Arc<Model>,
    pub owner_column: String,
    pub sub_column: String,
}

/// Resolved link between an owner model and the model behind one of its relation fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub kind: RelationKind,
    pub field: String,
    pub owner: Arc<Model>,
    pub sub: Arc<Model>,
    /// Owner field compared in the key equation.
    pub owner_key: String,
    /// Sub field compared in the key equation.
    pub sub_key: String,
    pub junction: Option<Junction>,
    pub orientation: Orientation,
    pub collection: bool,
}

impl Relation {
    pub fn owner_key_field(&self) -> Result<&ModelField> {
        self.owner.resolve_field(&self.owner_key)
    }
    pub fn sub_key_field(&self) -> Result<&ModelField> {
        self.sub.resolve_field(&self.sub_key)
    }
    /// The sub holds the link to the owner, so it's written after and deleted before it.
    pub fn is_child(&self) -> bool {
        matches!(self.kind, RelationKind::OneToOne | RelationKind::OneToMany)
    }
}

/// Explicit relation layout, overrides what would be derived from field names.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelationSpec {
    pub kind: Option<RelationKind>,
    pub owner_key: Option<String>,
    pub sub_key: Option<String>,
    pub junction: Option<String>,
    pub junction_owner: Option<String>,
    pub junction_sub: Option<String>,
    pub orientation: Orientation,
}

impl RelationSpec {
    /// The owner field `link` holds the key of the sub.
    pub fn belongs_to(link: impl Into<String>) -> Self {
        Self {
            kind: Some(RelationKind::BelongsTo),
            owner_key: Some(link.into()),
            ..Default::default()
        }
    }
    /// The sub field `link` holds the key of the owner.
    pub fn one_to_one(link: impl Into<String>) -> Self {
        Self {
            kind: Some(RelationKind::OneToOne),
            sub_key: Some(link.into()),
            ..Default::default()
        }
    }
    pub fn one_to_many(link: impl Into<String>) -> Self {
        Self {
            kind: Some(RelationKind::OneToMany),
            sub_key: Some(link.into()),
            ..Default::default()
        }
    }
    pub fn many_to_many() -> Self {
        Self {
            kind: Some(RelationKind::ManyToMany),
            ..Default::default()
        }
    }
    pub fn junction(mut self, table: impl Into<String>) -> Self {
        self.kind = Some(RelationKind::ManyToMany);
        self.junction = Some(table.into());
        self
    }
    /// Junction columns holding the owner and the sub keys.
    pub fn junction_columns(mut self, owner: impl Into<String>, sub: impl Into<String>) -> Self {
        self.junction_owner = Some(owner.into());
        self.junction_sub = Some(sub.into());
        self
    }
    pub fn owner_key(mut self, field: impl Into<String>) -> Self {
        self.owner_key = Some(field.into());
        self
    }
    pub fn sub_key(mut self, field: impl Into<String>) -> Self {
        self.sub_key = Some(field.into());
        self
    }
    pub fn orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub(crate) fn from_hint(hint: &RelationHint, orientation: Orientation) -> Self {
        let spec = match hint {
            RelationHint::Auto => Self::default(),
            RelationHint::BelongsTo { link } => Self::belongs_to(link.clone()),
            RelationHint::OneToOne { link } => Self::one_to_one(link.clone()),
            RelationHint::OneToMany { link } => Self::one_to_many(link.clone()),
            RelationHint::ManyToMany { junction: None } => Self::many_to_many(),
            RelationHint::ManyToMany {
                junction: Some(junction),
            } => Self::many_to_many().junction(junction.clone()),
        };
        spec.orientation(orientation)
    }
}

fn invalid(owner: &Model, field: &str, reason: impl Into<String>) -> Error {
    Error::new(ConfigError::InvalidRelation {
        model: owner.name().into(),
        field: field.into(),
        reason: reason.into(),
    })
}

fn require_field<'m>(
    owner: &Model,
    relation: &str,
    on: &'m Model,
    link: &str,
) -> Result<&'m ModelField> {
    on.field(link)
        .or_else(|| on.field_by_column(link).map(|(_, f)| f))
        .ok_or_else(|| {
            Error::new(ConfigError::MissingLinkField {
                model: owner.name().into(),
                field: relation.into(),
                link: link.into(),
                on: on.name().into(),
            })
        })
}

fn key_field<'m>(model: &'m Model, name: Option<&String>) -> Result<&'m ModelField> {
    match name {
        Some(name) => model.resolve_field(name),
        None => model.single_primary_key(),
    }
}

fn check_key_types(
    owner: &Model,
    field: &str,
    owner_key: &ModelField,
    sub_key: &ModelField,
) -> Result<()> {
    let (l, r) = (owner_key.value.key_class(), sub_key.value.key_class());
    if l.is_some() && r.is_some() && l != r {
        return Err(Error::new(ConfigError::KeyTypeMismatch {
            model: owner.name().into(),
            field: field.into(),
            owner: owner_key.value.type_name().into(),
            sub: sub_key.value.type_name().into(),
        }));
    }
    Ok(())
}

pub(crate) fn derive_relation(
    registry: &Registry,
    owner: &Arc<Model>,
    field: &RelationField,
    spec: &RelationSpec,
) -> Result<Relation> {
    let name = field.name.as_str();
    let sub = registry.resolve(&field.target)?;
    let owner_link = format!("{name}_id");
    let sub_link = format!("{}_id", owner.name());
    let kind = match spec.kind {
        Some(kind) => kind,
        None if !field.collection => {
            if owner.field(&owner_link).is_some() {
                RelationKind::BelongsTo
            } else if sub.field(&sub_link).is_some() {
                RelationKind::OneToOne
            } else {
                return Err(invalid(
                    owner,
                    name,
                    format!(
                        "neither `{}.{owner_link}` nor `{}.{sub_link}` exists",
                        owner.name(),
                        sub.name()
                    ),
                ));
            }
        }
        None if sub.name() != owner.name() && sub.field(&sub_link).is_some() => {
            RelationKind::OneToMany
        }
        None => RelationKind::ManyToMany,
    };
    match (kind, field.collection) {
        (RelationKind::BelongsTo | RelationKind::OneToOne, true) => {
            return Err(invalid(owner, name, "a collection field cannot hold a single entity"));
        }
        (RelationKind::OneToMany, false) => {
            return Err(invalid(owner, name, "one to many requires a collection field"));
        }
        _ => {}
    }
    let (owner_key, sub_key) = match kind {
        RelationKind::BelongsTo => {
            let link = spec.owner_key.as_deref().unwrap_or(&owner_link);
            (
                require_field(owner, name, owner, link)?,
                key_field(&sub, spec.sub_key.as_ref())?,
            )
        }
        RelationKind::OneToOne | RelationKind::OneToMany => {
            let link = spec.sub_key.as_deref().unwrap_or(&sub_link);
            (
                key_field(owner, spec.owner_key.as_ref())?,
                require_field(owner, name, &sub, link)?,
            )
        }
        RelationKind::ManyToMany => (
            key_field(owner, spec.owner_key.as_ref())?,
            key_field(&sub, spec.sub_key.as_ref())?,
        ),
    };
    check_key_types(owner, name, owner_key, sub_key)?;
    let junction = if kind == RelationKind::ManyToMany {
        Some(derive_junction(
            registry, owner, &sub, name, owner_key, sub_key, spec,
        )?)
    } else {
        None
    };
    Ok(Relation {
        kind,
        field: name.into(),
        owner_key: owner_key.name.clone(),
        sub_key: sub_key.name.clone(),
        owner: owner.clone(),
        sub,
        junction,
        orientation: spec.orientation,
        collection: field.collection,
    })
}

fn derive_junction(
    registry: &Registry,
    owner: &Arc<Model>,
    sub: &Arc<Model>,
    field: &str,
    owner_key: &ModelField,
    sub_key: &ModelField,
    spec: &RelationSpec,
) -> Result<Junction> {
    let right = spec.orientation == Orientation::Right;
    let (owner_column, sub_column) = if owner.name() == sub.name() {
        let (l, r) = (
            format!("left_{}_id", owner.name()),
            format!("right_{}_id", owner.name()),
        );
        if right { (r, l) } else { (l, r) }
    } else {
        (format!("{}_id", owner.name()), format!("{}_id", sub.name()))
    };
    let owner_column = spec.junction_owner.clone().unwrap_or(owner_column);
    let sub_column = spec.junction_sub.clone().unwrap_or(sub_column);
    let table = spec.junction.clone().unwrap_or_else(|| {
        if right {
            format!("{}_{}", sub.name(), owner.name())
        } else {
            format!("{}_{}", owner.name(), sub.name())
        }
    });
    let model = match registry.by_name(&table) {
        Ok(model) => {
            require_field(owner, field, &model, &owner_column)?;
            require_field(owner, field, &model, &sub_column)?;
            model
        }
        Err(..) => {
            let mut columns = [
                (owner_column.clone(), owner_key.value.as_null()),
                (sub_column.clone(), sub_key.value.as_null()),
            ];
            if right {
                columns.swap(0, 1);
            }
            let mut builder = Model::dynamic(table);
            for (column, prototype) in columns {
                builder.field(&column, prototype).primary_key();
            }
            registry.register(builder.build()?)?
        }
    };
    Ok(Junction {
        model,
        owner_column,
        sub_column,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Value, find_error,
        testing::{Author, Book, Person},
    };

    #[test]
    fn derives_from_field_names() {
        let registry = Registry::default();
        let author = registry.model::<Author>().unwrap();
        let books = registry
            .relation(&author, "books", Orientation::Left)
            .unwrap();
        assert_eq!(books.kind, RelationKind::OneToMany);
        assert_eq!(books.owner_key, "id");
        assert_eq!(books.sub_key, "author_id");
        let profile = registry
            .relation(&author, "profile", Orientation::Left)
            .unwrap();
        assert_eq!(profile.kind, RelationKind::OneToOne);
        let book = registry.model::<Book>().unwrap();
        let publisher = registry
            .relation(&book, "publisher", Orientation::Left)
            .unwrap();
        assert_eq!(publisher.kind, RelationKind::BelongsTo);
        assert_eq!(publisher.owner_key, "publisher_id");
        assert_eq!(publisher.sub_key, "id");
    }

    #[test]
    fn many_to_many_builds_a_junction() {
        let registry = Registry::default();
        let author = registry.model::<Author>().unwrap();
        let tags = registry
            .relation(&author, "tags", Orientation::Left)
            .unwrap();
        assert_eq!(tags.kind, RelationKind::ManyToMany);
        let junction = tags.junction.as_ref().unwrap();
        assert_eq!(junction.model.name(), "author_tag");
        assert_eq!(junction.owner_column, "author_id");
        assert_eq!(junction.sub_column, "tag_id");
        assert_eq!(junction.model.primary_key_indices(), &[0, 1]);
        assert_eq!(registry.by_name("author_tag").unwrap(), junction.model);
    }

    #[test]
    fn self_reference_shares_the_junction() {
        let registry = Registry::default();
        let person = registry.model::<Person>().unwrap();
        let left = registry
            .relation(&person, "friends", Orientation::Left)
            .unwrap();
        let right = registry
            .relation(&person, "friends", Orientation::Right)
            .unwrap();
        let (l, r) = (
            left.junction.as_ref().unwrap(),
            right.junction.as_ref().unwrap(),
        );
        assert_eq!(l.model.name(), "person_person");
        assert_eq!(l.model, r.model);
        assert_eq!(
            (l.owner_column.as_str(), l.sub_column.as_str()),
            ("left_person_id", "right_person_id")
        );
        assert_eq!(
            (r.owner_column.as_str(), r.sub_column.as_str()),
            ("right_person_id", "left_person_id")
        );
    }

    #[test]
    fn cached_descriptors_are_stable() {
        let registry = Registry::default();
        let author = registry.model::<Author>().unwrap();
        let first = registry.relation(&author, "books", Orientation::Left).unwrap();
        let second = registry.relation(&author, "books", Orientation::Left).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        let field = author.relation_field("books").unwrap();
        let derived = derive_relation(&registry, &author, field, &RelationSpec::default()).unwrap();
        assert_eq!(*first, derived);
    }

    #[test]
    fn missing_link_and_key_mismatch() {
        let registry = Registry::default();
        let mut node = Model::dynamic("node");
        node.field("id", Value::Int64(None)).primary_key();
        node.related("owner", "holder", false).belongs_to("holder_ref");
        node.related("items", "item", true).one_to_many("node_id");
        let node = registry.register(node.build().unwrap()).unwrap();
        let mut holder = Model::dynamic("holder");
        holder.field("id", Value::Int64(None)).primary_key();
        registry.register(holder.build().unwrap()).unwrap();
        let mut item = Model::dynamic("item");
        item.field("id", Value::Int64(None)).primary_key();
        item.field("node_id", Value::Varchar(None));
        registry.register(item.build().unwrap()).unwrap();

        let error = registry
            .relation(&node, "owner", Orientation::Left)
            .unwrap_err();
        assert!(matches!(
            find_error::<ConfigError>(&error),
            Some(ConfigError::MissingLinkField { link, .. }) if link == "holder_ref"
        ));
        let error = registry
            .relation(&node, "items", Orientation::Left)
            .unwrap_err();
        assert!(matches!(
            find_error::<ConfigError>(&error),
            Some(ConfigError::KeyTypeMismatch { .. })
        ));
        let error = registry
            .relation(&node, "missing", Orientation::Left)
            .unwrap_err();
        assert!(matches!(
            find_error::<ConfigError>(&error),
            Some(ConfigError::UnknownRelation { .. })
        ));
    }
}

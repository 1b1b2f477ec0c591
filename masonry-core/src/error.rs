use crate::{Error, Outcome};
use std::{error::Error as StdError, fmt};
use thiserror::Error as ThisError;

/// Programming mistakes detected while describing models, registering them or configuring a brick.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ConfigError {
    #[error("model `{model}` declares the field `{field}` more than once")]
    DuplicateField { model: String, field: String },
    #[error("model `{model}` is already registered by a different type")]
    DuplicateModel { model: String },
    #[error("model `{model}` is not registered")]
    UnknownModel { model: String },
    #[error("model `{model}` has no field `{field}`")]
    UnknownField { model: String, field: String },
    #[error("model `{model}` has no relation field `{field}`")]
    UnknownRelation { model: String, field: String },
    #[error("relation `{model}.{field}` requires the field `{link}` on `{on}`")]
    MissingLinkField {
        model: String,
        field: String,
        link: String,
        on: String,
    },
    #[error("relation `{model}.{field}` pairs a {owner} key with a {sub} key")]
    KeyTypeMismatch {
        model: String,
        field: String,
        owner: String,
        sub: String,
    },
    #[error("relation `{model}.{field}`: {reason}")]
    InvalidRelation {
        model: String,
        field: String,
        reason: String,
    },
    #[error("model `{model}` must have exactly one primary key to take part in relations")]
    SinglePrimaryKeyRequired { model: String },
    #[error("condition on `{field}`: {reason}")]
    InvalidCondition { field: String, reason: String },
    #[error("no pipeline is registered for the operation `{operation}`")]
    UnknownOperation { operation: String },
}

/// Record container of the wrong shape for the model it is used with.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("invalid record type: {0}")]
pub struct InvalidRecordType(pub String);

/// A record that has to carry its primary key (to be linked, routed or deleted) does not.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("record {index} of `{model}` is missing its primary key ({reason})")]
pub struct MissingPrimaryKey {
    pub model: String,
    pub index: usize,
    pub reason: &'static str,
}

/// Value that cannot be represented as the requested type.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("cannot convert {value} to {target}")]
pub struct ConversionError {
    pub value: String,
    pub target: &'static str,
}

/// Failures of an operation fanned out over several shards, one entry per failing shard.
#[derive(Debug)]
pub struct ShardErrors {
    pub errors: Vec<(usize, Error)>,
}

impl fmt::Display for ShardErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} shard(s) failed", self.errors.len())?;
        for (shard, error) in &self.errors {
            write!(f, "\n  shard {shard}: {error:#}")?;
        }
        Ok(())
    }
}

impl StdError for ShardErrors {}

/// Error returned by every pipeline run, it keeps what was done before the failure.
#[derive(Debug)]
pub struct OperationError {
    pub operation: String,
    pub outcome: Box<Outcome>,
    pub source: Error,
}

impl OperationError {
    pub fn new(operation: impl Into<String>, outcome: Outcome, source: Error) -> Self {
        Self {
            operation: operation.into(),
            outcome: Box::new(outcome),
            source,
        }
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed", self.operation)
    }
}

impl StdError for OperationError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        let source: &(dyn StdError + Send + Sync + 'static) = self.source.as_ref();
        Some(source)
    }
}

/// Finds an error of type `E` anywhere in the chain, looking inside [`ShardErrors`] too.
pub fn find_error<E>(error: &Error) -> Option<&E>
where
    E: StdError + Send + Sync + 'static,
{
    for cause in error.chain() {
        if let Some(found) = cause.downcast_ref::<E>() {
            return Some(found);
        }
        if let Some(shards) = cause.downcast_ref::<ShardErrors>() {
            if let Some(found) = shards.errors.iter().find_map(|(_, e)| find_error::<E>(e)) {
                return Some(found);
            }
        }
    }
    None
}

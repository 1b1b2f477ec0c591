mod as_value;
mod brick;
mod collection;
mod condition;
mod context;
mod database;
mod dialect;
mod error;
mod executor;
mod model;
mod outcome;
mod pipeline;
mod preload;
mod record;
mod record_set;
mod registry;
mod relation;
mod search;
mod stages;
mod util;
mod value;

pub use ::anyhow::Context as ErrorContext;
pub use as_value::*;
pub use brick::*;
pub use collection::*;
pub use condition::*;
pub use context::*;
pub use database::*;
pub use dialect::*;
pub use error::*;
pub use executor::*;
pub use model::*;
pub use outcome::*;
pub use pipeline::*;
pub use record::*;
pub use record_set::*;
pub use registry::*;
pub use relation::*;
pub use search::*;
pub use util::*;
pub use value::*;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;

#[cfg(test)]
pub(crate) mod testing;

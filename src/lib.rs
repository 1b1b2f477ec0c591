//! Masonry is a synchronous ORM execution engine. Entities become records, every operation runs
//! as a pipeline of stages over an [`Executor`], and relations are written, read and deleted
//! together with their owners through preloads.
//!
//! ```ignore
//! use masonry::{Condition, Entity};
//!
//! #[derive(Entity, Clone, Default)]
//! struct Book {
//!     #[masonry(primary_key, auto_increment)]
//!     id: i64,
//!     title: String,
//! }
//!
//! let database = masonry_sqlite::connect("sqlite::memory:")?;
//! let books = database.brick::<Book>()?;
//! books.create_table()?;
//! books.insert_one(&mut Book { title: "Emma".into(), ..Default::default() })?;
//! let found = books.filter(Condition::like("title", "E%"))?.find::<Book>()?;
//! ```

pub use masonry_core::*;
pub use masonry_macros::*;

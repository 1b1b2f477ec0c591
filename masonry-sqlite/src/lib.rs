mod dialect;
mod executor;
mod extract;

pub use dialect::*;
pub use executor::*;

use masonry_core::{Database, Result};

/// Database over a single sqlite connection opened from `url`.
pub fn connect(url: &str) -> Result<Database> {
    Database::new(SqliteExecutor::connect(url)?, SqliteDialect)
}

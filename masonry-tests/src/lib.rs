mod conditions;
mod friends;
mod relations;
mod simple;
mod soft_delete;
mod timestamps;

use crate::{
    conditions::conditions, friends::friends, relations::relations, simple::simple,
    soft_delete::soft_delete, timestamps::timestamps,
};
use log::LevelFilter;
use masonry::Database;
use std::env;

pub fn init_logs() {
    let mut logger = env_logger::builder();
    logger
        .is_test(true)
        .format_file(true)
        .format_line_number(true);
    if env::var("RUST_LOG").is_err() {
        logger.filter_level(LevelFilter::Warn);
    }
    let _ = logger.try_init();
}

/// Runs every scenario against `database`, each one recreates the tables it uses.
pub fn execute_tests(database: &Database) {
    simple(database);
    conditions(database);
    relations(database);
    friends(database);
    soft_delete(database);
    timestamps(database);
}

#[macro_export]
macro_rules! silent_logs {
    ($($code:tt)+) => {{
        let level = log::max_level();
        log::set_max_level(log::LevelFilter::Off);
        $($code)+
        log::set_max_level(level);
    }};
}

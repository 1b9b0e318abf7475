//! Background worker, index maintenance and database lifecycle tests.

#[path = "../common/mod.rs"]
mod common;

mod fulltext;
mod index_patching;
mod lifecycle;
mod worker;

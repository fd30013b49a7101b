pub mod acquire;
pub mod batch;
pub mod common;
pub mod info;
pub mod list;
pub mod profile;
pub mod query;
pub mod reduce;

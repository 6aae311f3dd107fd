pub mod catalog;
pub mod position;
pub mod raw;
pub mod report;
pub mod schema;
pub mod transaction;

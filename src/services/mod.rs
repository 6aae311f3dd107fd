pub mod cost_basis;
pub mod dedup;
pub mod numbers;
pub mod parsers;
pub mod pipeline;
pub mod reconciliation;
pub mod resolver;
pub mod sections;
pub mod shared;
pub mod stitch;

//! Shared foundation for the stocky workspace: configuration loading,
//! the product domain model, and the domain-level error taxonomy.

pub mod config;
pub mod domain;
pub mod errors;

//! Shared types and models for the Field Service Management backend
//!
//! Domain entities, status rules, the role-based access policy and the
//! statistics math live here so they can be exercised without a database.

pub mod access;
pub mod models;
pub mod stats;
pub mod types;
pub mod validation;

pub use access::*;
pub use models::*;
pub use stats::*;
pub use types::*;
pub use validation::*;

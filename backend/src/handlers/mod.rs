//! HTTP request handlers

pub mod auth;
pub mod client;
pub mod equipment;
pub mod health;
pub mod quote;
pub mod service_job;
pub mod stats;
pub mod technician;

pub use auth::*;
pub use client::*;
pub use equipment::*;
pub use health::*;
pub use quote::*;
pub use service_job::*;
pub use stats::*;
pub use technician::*;

//! Business logic services for the Field Service Management backend

pub mod auth;
pub mod client;
pub mod equipment;
pub mod quote;
pub mod service_job;
pub mod stats;
pub mod technician;

pub use auth::AuthService;
pub use client::ClientService;
pub use equipment::EquipmentService;
pub use quote::QuoteService;
pub use service_job::ServiceJobService;
pub use stats::StatsService;
pub use technician::TechnicianService;

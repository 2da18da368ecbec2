//! Domain models for the Field Service Management backend

mod client;
mod equipment;
mod quote;
mod service_job;
mod technician;
mod user;

pub use client::*;
pub use equipment::*;
pub use quote::*;
pub use service_job::*;
pub use technician::*;
pub use user::*;

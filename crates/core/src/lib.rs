//! Domain core for the campus portal.
//!
//! This crate has zero internal dependencies. It holds the journey engine,
//! the curriculum builder, the class-session scheduler and the gradebook,
//! each written against the store traits in [`store`] so that the Postgres
//! backend (`campus-db`) and the in-process [`store::memory::MemoryStore`]
//! are interchangeable.

pub mod audit;
pub mod capabilities;
pub mod context;
pub mod curriculum;
pub mod error;
pub mod gradebook;
pub mod hashing;
pub mod journey;
pub mod localized;
pub mod playbook;
pub mod roles;
pub mod scheduling;
pub mod store;
pub mod tenancy;
pub mod types;

//! # Repositories
//!
//! Database access layers wrapping SeaORM operations for the tables the
//! sync pipeline touches. Each repository is passed explicitly to its
//! consumers; none of them is a process-wide singleton.

pub mod binding;
pub mod credential;
pub mod metric;

pub use binding::BindingRepository;
pub use credential::{CredentialRepository, NewCredential};
pub use metric::MetricRepository;

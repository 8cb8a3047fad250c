//! HTTP handlers, grouped by resource. [`crate::build_app`] wires these into a [`axum::Router`].

pub mod attachments;
pub mod callback;
pub mod health;
pub mod internal;
pub mod projects;
pub mod runs;
pub mod sessions;
pub mod workspace;

//! HTTP route handlers.

pub mod entities;
pub mod fields;
pub mod health;

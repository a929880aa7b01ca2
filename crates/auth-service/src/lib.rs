//! Auth Service Library
//!
//! Validates identity provider JWTs and reports the identity they carry.

pub mod api;
pub mod auth;

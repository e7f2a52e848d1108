//! Stages installed by route registration.

pub mod body;
pub mod cookie;
pub mod cors;
pub mod provider;
pub mod security;

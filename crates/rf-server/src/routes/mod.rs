//! Route handlers for the HTTP API.

pub mod health;
pub mod jobs;
pub mod media;
pub mod tools;

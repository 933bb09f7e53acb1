//! Route handlers.

pub mod health;
pub mod ingest;
pub mod pages;

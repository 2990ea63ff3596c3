//! HTTP request handlers, grouped by caller population.

pub mod admin;
pub mod client;
pub mod health;
pub mod worker;

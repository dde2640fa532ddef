pub mod auth;
pub mod catalog;
pub mod integration;
pub mod sync;
pub mod tenancy;

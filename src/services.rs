pub mod auth;
pub mod erp_client;
pub mod integration_service;
pub mod scheduler;
pub mod sync_service;

#[cfg(test)]
pub mod testing;

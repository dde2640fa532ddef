pub mod tenancy_repo;
pub use tenancy_repo::TenantRepository;
pub mod integration_repo;
pub use integration_repo::{IntegrationRepository, IntegrationStore};
pub mod sync_run_repo;
pub use sync_run_repo::{SyncRunLedger, SyncRunRepository};
pub mod catalog_repo;
pub use catalog_repo::{CatalogRepository, ProductCatalog};

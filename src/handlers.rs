pub mod catalog;
pub mod erp;
pub mod settings;

pub mod inline_catalog_test;
pub mod registry_client_test;
pub mod schema_store_test;

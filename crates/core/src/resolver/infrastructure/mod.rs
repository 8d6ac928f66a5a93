pub mod catalog_metadata_store;

//! Storage backends and the folder logic layered over them.

pub mod auth;
pub mod background;
pub mod counter_store;
pub mod file_manager;
pub mod memory_store;
pub mod object_store;
pub mod size_ledger;
pub mod storage_service;
pub mod traversal;

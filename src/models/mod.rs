//! Core data models for the folder-oriented file manager.
//!
//! Objects are flat keys with a payload; folders are a naming convention
//! layered on top of them (see [`path`]).

pub mod listing;
pub mod object;
pub mod path;
pub mod tree;

//! Trait definitions for Finite State entity operations.
//!
//! Each entity type implements the traits it supports; the GraphQL or REST
//! details live in the implementations.

mod get;
mod list;

pub use get::Get;
pub use list::List;

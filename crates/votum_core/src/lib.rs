//! Measures, votes and comments for the Votum civic voting client.
//!
//! Storage sits behind [`backend::VotingBackend`]: [`backend::LocalBackend`]
//! keeps everything in a local key/value store, [`remote::RemoteBackend`]
//! talks to the REST backend. [`portal::Portal`] wires one of them up with
//! the local identity and comment log.

pub mod backend;
pub mod comments;
pub mod config;
pub mod db;
pub mod documents;
pub mod error;
pub mod feed;
pub mod identity;
mod ids;
pub mod ledger;
pub mod logging;
pub mod mapper;
pub mod portal;
pub mod query;
pub mod remote;
pub mod repository;
pub mod schema;
pub mod seed;
pub mod store;
pub mod validation;

pub use backend::{LocalBackend, VotingBackend};
pub use error::{BackendError, MappingError, StoreError, ValidationError};
pub use portal::Portal;

//! API-compatible types.
//!
//! The types in this module are serialised in an API-friendly way, e.g.:
//!
//! - IDs are serialised as hex strings.
//! - Datetimes are serialised as RFC 3339 strings.
//! - Field names are camelCase.

pub mod account;
pub mod auth;
pub mod ballot;
pub mod candidate;
pub mod election;
pub mod id;
pub mod logs;
pub mod pagination;
pub mod registry;
pub mod results;

pub use auth::{Admin, AnyUser, AuthToken, Candidate, Voter, AUTH_TOKEN_COOKIE};

//! API-compatible types.
//!
//! The types in this module are serialised in an API-friendly way, e.g.:
//!
//! - IDs are serialised as hex strings.
//! - Tokens are serialised in their hyphenated form.

pub mod auth;
pub mod email;
pub mod page;

pub use email::{Email, EmailError, EmailPolicy};
pub use page::{CandidateSummary, Page, PositionProgress, View};

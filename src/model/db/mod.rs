//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs are serialised in MongoDB's own format.

pub mod candidate;
pub mod vote;
pub mod voter;

pub use candidate::{Candidate, NewCandidate};
pub use vote::Vote;
pub use voter::{EmailHash, NewVoter, Voter};

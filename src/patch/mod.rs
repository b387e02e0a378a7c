//! The patch format: a structural digest matching patches to source
//! projects, a textual micro-bytecode describing byte deltas against a
//! shared pool, and the create/apply transforms between two projects.

pub mod apply;
pub mod container;
pub mod create;
pub mod digest;
pub mod diffstr;

pub use apply::apply_patch;
pub use container::{PatchContainer, PatchObject};
pub use create::{create_patch, CreatedPatch};
pub use digest::project_digest;

use std::fmt;

/// Fatal patch-application failures. Unlike structural decode problems
/// these are reported to the caller, never recovered silently.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchError {
    /// No patch in the container matches the source project's digest.
    NoMatchingPatch,
    /// A diff-string token reads past the end of the source or the pool.
    ReadPastEnd,
    /// A reconstructed object/loop/cel list has gaps after trimming
    /// trailing deletions.
    IndexGaps,
    /// The reconstructed project's digest does not match `hashPatched`.
    HashMismatch { expected: String, actual: String },
    /// The patch document itself is malformed or unsupported.
    BadPatch(String),
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchError::NoMatchingPatch => write!(f, "no patch matches the source project"),
            PatchError::ReadPastEnd => write!(f, "read past end of input"),
            PatchError::IndexGaps => {
                write!(f, "reconstructed list contains index gaps after trimming")
            }
            PatchError::HashMismatch { expected, actual } => {
                write!(f, "hash check failed: expected {}, got {}", expected, actual)
            }
            PatchError::BadPatch(message) => write!(f, "bad patch: {}", message),
        }
    }
}

impl std::error::Error for PatchError {}

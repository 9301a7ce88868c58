//! Error types shared by every layer of the crate.
use alloc::string::String;

/// Failures reported by a `Cable` implementation.  These are passed through the upper layers
/// unchanged, wrapped in `Error::Cable`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CableError {
    #[error("no cable matching {0:?} was found")]
    NotFound(String),
    #[error("cable I/O failed: {0}")]
    Io(String),
    #[error("short transfer: expected {expected}, got {actual}")]
    ShortTransfer { expected: usize, actual: usize },
    #[error("pin access failed")]
    Pin,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Topology or virtual instance parameters are unusable
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("virtual JTAG instance {index} out of range ({count} configured)")]
    OutOfRange { index: i64, count: usize },
    #[error("instruction {instruction:#x} does not fit in a {width}-bit virtual IR")]
    InstructionTooWide { instruction: u32, width: usize },
    #[error(transparent)]
    Cable(#[from] CableError),
    #[error("JTAG protocol violation: {0}")]
    Protocol(&'static str),
}

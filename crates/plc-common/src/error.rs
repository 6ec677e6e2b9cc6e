use crate::section::Section;
use thiserror::Error;

/// Error taxonomy shared by every crate in the workspace.
///
/// Variants map directly onto the error kinds a boundary can raise: a
/// malformed configuration document halts startup, an out-of-bounds access
/// is contained at the request or simulation tick that caused it, a
/// malformed frame or unsupported function code is reported to the client
/// without taking down the process, and a transport error closes just the
/// session that hit it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlcError {
    /// Malformed or inconsistent configuration, surfaced at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// An access addressed outside the bounds of a memory section.
    #[error("out of bounds: section {section:?} address {address} length {length} exceeds configured size")]
    OutOfBounds {
        /// Section the access targeted.
        section: Section,
        /// Starting address of the access.
        address: u32,
        /// Number of elements requested.
        length: u32,
    },

    /// A frame-level or function-code-level protocol violation.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A transport (socket) level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// A generic runtime fault, e.g. a simulation function failing mid-tick.
    #[error("runtime fault: {0}")]
    Fault(String),
}

/// Convenience type alias for PLC operations.
pub type PlcResult<T> = Result<T, PlcError>;

// This module defines error types for the RISCPI backend layer using the thiserror crate.
// The frame-lowering hooks themselves are total and never fail; CodegenError covers the
// surfaces around them: looking up a target in the registry, parsing textual machine IR,
// and I/O in the driver binary. Each variant carries the context needed for a useful
// message. CodegenResult<T> is the convenience alias used throughout the crate.

//! Error types for the backend layer.

use thiserror::Error;

/// Main error type for target lookup and machine IR handling.
#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("No registered target supports triple '{triple}'")]
    UnknownTarget { triple: String },

    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Function not found: {name}")]
    FunctionNotFound { name: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CodegenError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}

/// Result type alias for backend operations.
pub type CodegenResult<T> = Result<T, CodegenError>;

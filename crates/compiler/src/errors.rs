//! Compiler error types.
//!
//! Every detected error is fatal: compilation stops at the first diagnostic.
//! The rendered form is `<file> line <n>: <message>`, which is what the
//! driver prints to stderr before exiting nonzero.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    /// A diagnostic tied to a source position.
    #[error("{filename} line {line}: {message}")]
    Fatal {
        filename: String,
        line: u32,
        message: String,
    },

    /// A command-line usage error.
    #[error("{0}")]
    Usage(String),

    /// An I/O failure on the input, output, or debug stream.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl CompileError {
    pub fn fatal(filename: impl Into<String>, line: u32, message: impl Into<String>) -> Self {
        CompileError::Fatal {
            filename: filename.into(),
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;

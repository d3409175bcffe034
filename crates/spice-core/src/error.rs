use std::path::PathBuf;

use spice_exec::ExecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("simulator: {0}")]
    Exec(#[from] ExecError),

    #[error("unknown edit '{name}' for circuit {}", .circuit.display())]
    UnknownEdit { name: String, circuit: PathBuf },

    #[error("cannot materialize circuit: {0}")]
    Materialize(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("a tokio runtime is required")]
    NoRuntime,

    #[error("scheduler stopped")]
    Stopped,

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Io(e.to_string())
    }
}

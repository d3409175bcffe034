use thiserror::Error;

pub type ExecResult<T> = Result<T, ExecError>;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("{backend} executable not found{}", detail_suffix(.detail))]
    ExecutableNotFound {
        backend: &'static str,
        detail: Option<String>,
    },
    #[error("invalid switch '{switch}' for {backend}")]
    InvalidSwitch {
        backend: &'static str,
        switch: String,
    },
    #[error("invalid parameter '{param}' for switch '{switch}'")]
    InvalidSwitchParameter { switch: String, param: String },
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("io error: {0}")]
    Io(String),
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_ref().map(|d| format!(": {d}")).unwrap_or_default()
}

impl ExecError {
    /// Configuration errors are raised synchronously and never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ExecError::ExecutableNotFound { .. }
                | ExecError::InvalidSwitch { .. }
                | ExecError::InvalidSwitchParameter { .. }
                | ExecError::Unsupported(_)
        )
    }
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}

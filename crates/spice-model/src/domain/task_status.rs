use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Lifecycle state of a simulation run.
///
/// `Pending -> Running -> {Succeeded, Failed, TimedOut}`; terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    /// Queued, waiting for a worker slot.
    Pending,
    /// The backend process is running (or its callback is).
    Running,
    /// Process exited with code 0 and every expected artifact exists.
    Succeeded,
    /// Non-zero exit, spawn failure or a missing artifact.
    Failed,
    /// The process was forcibly terminated after its timeout expired.
    TimedOut,
}

impl TaskStatus {
    /// Succeeded, failed or timed out. Nothing moves a task out of these.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::TimedOut
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::TimedOut => "timedOut",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "succeeded" => Ok(TaskStatus::Succeeded),
            "failed" => Ok(TaskStatus::Failed),
            "timedout" | "timed-out" | "timeout" => Ok(TaskStatus::TimedOut),
            _ => Err(ModelError::InvalidStatus(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_and_active_partition_the_states() {
        use TaskStatus::*;
        for s in [Pending, Running, Succeeded, Failed, TimedOut] {
            assert_ne!(s.is_terminal(), s.is_active(), "{s}");
        }
        assert!(TimedOut.is_terminal());
        assert!(Running.is_active());
    }

    #[test]
    fn serde_uses_camel_case() {
        let json = serde_json::to_string(&TaskStatus::TimedOut).unwrap();
        assert_eq!(json, r#""timedOut""#);

        let back: TaskStatus = serde_json::from_str(r#""running""#).unwrap();
        assert_eq!(back, TaskStatus::Running);
    }

    #[test]
    fn parse_accepts_aliases() {
        assert_eq!("Timed-Out".parse::<TaskStatus>(), Ok(TaskStatus::TimedOut));
        assert_eq!(" failed ".parse::<TaskStatus>(), Ok(TaskStatus::Failed));
        assert_eq!(
            "exhausted".parse::<TaskStatus>(),
            Err(ModelError::InvalidStatus("exhausted".into()))
        );
    }
}

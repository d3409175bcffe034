use std::{
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Serialize};

use crate::{Edits, RunNumber, TaskStatus};

/// One simulation attempt: its inputs, artifacts and outcome.
///
/// Built at submission with status [`TaskStatus::Pending`], mutated only by the worker executing it and
/// frozen once it reaches the completed list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTask {
    pub run_number: RunNumber,
    /// Materialized circuit description handed to the backend.
    pub netlist_file: PathBuf,
    /// Argument tokens already validated by the backend adapter.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub switches: Vec<String>,
    #[serde(default, with = "duration_ms", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    #[serde(default, skip_serializing_if = "Edits::is_empty")]
    pub edits: Edits,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    pub status: TaskStatus,
    #[serde(default, with = "time_serde", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<SystemTime>,
    #[serde(default, with = "time_serde", skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<SystemTime>,
    /// Raw process return code; absent if the process never exited on its own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Value produced by the callback; absent without callback or when it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_outcome: Option<serde_json::Value>,
    /// Last error message (spawn failure, missing artifact, callback failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunTask {
    pub fn new(run_number: RunNumber, netlist_file: PathBuf) -> Self {
        Self {
            run_number,
            netlist_file,
            switches: Vec::new(),
            timeout: None,
            edits: Edits::new(),
            raw_file: None,
            log_file: None,
            status: TaskStatus::Pending,
            started_at: None,
            stopped_at: None,
            exit_code: None,
            callback_outcome: None,
            error: None,
        }
    }

    /// Value of the edit recorded under `name`.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.edits.value(name)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn succeeded(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }

    /// Wall time between start and stop, callback included.
    pub fn elapsed(&self) -> Option<Duration> {
        let start = self.started_at?;
        let stop = self.stopped_at?;
        stop.duration_since(start).ok()
    }

    /// The `(raw, log)` pair as handed to callbacks.
    pub fn results(&self) -> (Option<&Path>, Option<&Path>) {
        (self.raw_file.as_deref(), self.log_file.as_deref())
    }

    /// Every file this run may have left on disk.
    pub fn artifacts(&self) -> impl Iterator<Item = &Path> {
        [
            Some(self.netlist_file.as_path()),
            self.raw_file.as_deref(),
            self.log_file.as_deref(),
        ]
        .into_iter()
        .flatten()
    }
}

mod time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &Option<SystemTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match time {
            Some(t) => {
                let since_epoch = t
                    .duration_since(UNIX_EPOCH)
                    .map_err(serde::ser::Error::custom)?;
                (since_epoch.as_millis() as u64).serialize(serializer)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SystemTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = Option::<u64>::deserialize(deserializer)?;
        Ok(ms.map(|ms| UNIX_EPOCH + Duration::from_millis(ms)))
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(d: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        d.map(|d| d.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished() -> RunTask {
        let mut task = RunTask::new(RunNumber::new(3), PathBuf::from("/tmp/rc_3.net"));
        task.edits = Edits::new().with("R2", "4k").unwrap();
        task.status = TaskStatus::Succeeded;
        task.raw_file = Some(PathBuf::from("/tmp/rc_3.raw"));
        task.log_file = Some(PathBuf::from("/tmp/rc_3.log"));
        task.exit_code = Some(0);
        task.started_at = Some(SystemTime::UNIX_EPOCH + Duration::from_millis(1_000));
        task.stopped_at = Some(SystemTime::UNIX_EPOCH + Duration::from_millis(3_500));
        task
    }

    #[test]
    fn new_task_is_pending_without_artifacts() {
        let task = RunTask::new(RunNumber::new(1), PathBuf::from("a.net"));
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.results(), (None, None));
        assert_eq!(task.artifacts().count(), 1);
    }

    #[test]
    fn value_reads_edits() {
        let task = finished();
        assert_eq!(task.value("R2"), Some("4k"));
        assert!(task.value("R1").is_none());
    }

    #[test]
    fn elapsed_uses_start_and_stop() {
        assert_eq!(finished().elapsed(), Some(Duration::from_millis(2_500)));
    }

    #[test]
    fn serde_roundtrip_keeps_times_and_outcome() {
        let mut task = finished();
        task.callback_outcome = Some(serde_json::json!({"gain": 3.2}));

        let json = serde_json::to_string(&task).unwrap();
        assert!(json.contains("\"runNumber\":3"));
        assert!(!json.contains("\"error\""));

        let back: RunTask = serde_json::from_str(&json).unwrap();
        assert_eq!(back.run_number, task.run_number);
        assert_eq!(back.started_at, task.started_at);
        assert_eq!(back.callback_outcome, task.callback_outcome);
        assert_eq!(back.edits, task.edits);
    }
}

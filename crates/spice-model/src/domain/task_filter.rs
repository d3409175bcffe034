use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::{RunTask, TaskStatus};

type Predicate = Arc<dyn Fn(&RunTask) -> bool + Send + Sync>;

/// Selects completed runs, typically to correlate results back to the sweep dimension that produced them.
///
/// All configured conditions must hold:
/// - every accepted edit name must be recorded on the task with one of the accepted values;
/// - the status must match, if one is set;
/// - the predicate must return `true`, if one is set.
///
/// An empty filter matches every task.
#[derive(Clone, Default)]
pub struct TaskFilter {
    accepted: BTreeMap<String, Vec<String>>,
    status: Option<TaskStatus>,
    predicate: Option<Predicate>,
}

impl TaskFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept tasks whose edit `name` has one of `values`.
    ///
    /// Calling it again for the same name extends the accepted set.
    pub fn with_edit<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.accepted
            .entry(name.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Arbitrary predicate over a task.
    pub fn with_predicate<F>(mut self, f: F) -> Self
    where
        F: Fn(&RunTask) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(f));
        self
    }

    pub fn matches(&self, task: &RunTask) -> bool {
        if let Some(status) = self.status
            && task.status != status
        {
            return false;
        }

        let edits_ok = self.accepted.iter().all(|(name, values)| {
            task.value(name)
                .is_some_and(|v| values.iter().any(|accepted| accepted == v))
        });
        if !edits_ok {
            return false;
        }

        self.predicate.as_ref().is_none_or(|p| p(task))
    }
}

impl<K, V> FromIterator<(K, Vec<V>)> for TaskFilter
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, Vec<V>)>>(iter: T) -> Self {
        iter.into_iter()
            .fold(TaskFilter::new(), |f, (k, vs)| f.with_edit(k, vs))
    }
}

impl fmt::Debug for TaskFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFilter")
            .field("accepted", &self.accepted)
            .field("status", &self.status)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::{Edits, RunNumber};

    fn task(n: u64, r2: &str) -> RunTask {
        let mut t = RunTask::new(RunNumber::new(n), PathBuf::from(format!("rc_{n}.net")));
        t.edits = Edits::new().with("R2", r2).unwrap();
        t.status = TaskStatus::Succeeded;
        t
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(TaskFilter::new().matches(&task(1, "1k")));
    }

    #[test]
    fn edit_filter_keeps_only_accepted_values() {
        let filter = TaskFilter::new().with_edit("R2", ["1k", "4k"]);
        let tasks = [task(1, "1k"), task(2, "2k"), task(3, "4k")];

        let hits: Vec<u64> = tasks
            .iter()
            .filter(|t| filter.matches(t))
            .map(|t| t.run_number.get())
            .collect();
        assert_eq!(hits, vec![1, 3]);
    }

    #[test]
    fn missing_edit_never_matches() {
        let filter = TaskFilter::new().with_edit("R1", ["1k"]);
        assert!(!filter.matches(&task(1, "1k")));
    }

    #[test]
    fn predicate_and_status_combine() {
        let filter = TaskFilter::new()
            .with_status(TaskStatus::Succeeded)
            .with_predicate(|t| t.run_number.get() % 2 == 0);
        assert!(filter.matches(&task(2, "1k")));
        assert!(!filter.matches(&task(3, "1k")));

        let mut failed = task(4, "1k");
        failed.status = TaskStatus::Failed;
        assert!(!filter.matches(&failed));
    }

    #[test]
    fn collects_from_mapping() {
        let filter: TaskFilter = [("R2", vec!["2k"])].into_iter().collect();
        assert!(filter.matches(&task(1, "2k")));
        assert!(!filter.matches(&task(1, "4k")));
    }
}

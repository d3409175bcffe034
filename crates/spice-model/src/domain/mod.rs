mod run_number;
pub use run_number::RunNumber;

mod task_status;
pub use task_status::TaskStatus;

mod edit;
pub use edit::{Edit, EditKind, Edits};

mod switch;
pub use switch::Switch;

mod run_task;
pub use run_task::RunTask;

mod task_filter;
pub use task_filter::TaskFilter;

/// Ordered name/value pairs handed to a callback after the two artifact paths.
pub type CallbackArgs = Vec<(String, String)>;

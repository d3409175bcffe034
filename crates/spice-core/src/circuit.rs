use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use spice_model::Edits;

use crate::callback::BoxError;

/// An in-memory circuit description that can write itself out as a netlist.
///
/// Implemented by circuit editors that live outside this crate. The scheduler only needs the three
/// operations below plus [`CircuitEditor::has_reference`] to validate sweep names.
pub trait CircuitEditor: Send + Sync {
    /// File the editor was loaded from; names run netlists.
    fn circuit_file(&self) -> &Path;

    /// Edits applied so far, recorded on every task submitted from this editor.
    fn edits(&self) -> Edits;

    /// Serialize the current state to `path`.
    fn save_netlist(&self, path: &Path) -> Result<(), BoxError>;

    /// Whether `name` is a component or parameter this circuit knows about.
    fn has_reference(&self, _name: &str) -> bool {
        true
    }
}

/// What gets submitted: a circuit file on disk or an editor that serializes one.
#[derive(Clone)]
pub enum Circuit {
    Path(PathBuf),
    Editor(Arc<dyn CircuitEditor>),
}

impl Circuit {
    pub fn editor(editor: impl CircuitEditor + 'static) -> Self {
        Circuit::Editor(Arc::new(editor))
    }

    /// The source file runs are named after.
    pub fn source(&self) -> &Path {
        match self {
            Circuit::Path(p) => p,
            Circuit::Editor(e) => e.circuit_file(),
        }
    }
}

impl From<PathBuf> for Circuit {
    fn from(p: PathBuf) -> Self {
        Circuit::Path(p)
    }
}

impl From<&Path> for Circuit {
    fn from(p: &Path) -> Self {
        Circuit::Path(p.to_path_buf())
    }
}

impl From<&str> for Circuit {
    fn from(p: &str) -> Self {
        Circuit::Path(PathBuf::from(p))
    }
}

impl<E: CircuitEditor + 'static> From<Arc<E>> for Circuit {
    fn from(e: Arc<E>) -> Self {
        Circuit::Editor(e)
    }
}

impl fmt::Debug for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Circuit::Path(p) => f.debug_tuple("Path").field(p).finish(),
            Circuit::Editor(e) => f.debug_tuple("Editor").field(&e.circuit_file()).finish(),
        }
    }
}

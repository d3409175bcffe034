//! Backend adapters for external SPICE simulators.
//!
//! A [`Backend`] describes one simulator family: where its executable usually lives, how its command line
//! is built and which switches it accepts. A [`Simulator`] binds a backend to a resolved [`Executable`] and
//! a [`SimulatorConfig`], and runs exactly one OS process per call.

mod error;
pub use error::{ExecError, ExecResult};

mod config;
pub use config::{ConsoleOutput, SimulatorConfig};

pub mod backend;
pub use backend::{Backend, LTspice, NGspice, Qspice, Xyce, backend_by_name};

#[cfg(any(test, feature = "shell"))]
pub use backend::Shell;

mod discovery;
pub use discovery::{Executable, expand_local_dir, wine_host_path};

mod limits;
pub use limits::{RlimitConfig, attach_rlimits};

mod simulator;
pub use simulator::{RunOutcome, Simulator};

mod util;

pub mod prelude {
    pub use crate::backend::Backend;
    pub use crate::error::{ExecError, ExecResult};
    pub use crate::{RunOutcome, Simulator, SimulatorConfig};
}

use serde::{Deserialize, Serialize};

/// Symbolic command-line switch as requested by a caller.
///
/// The backend adapter turns it into the exact argument tokens (or rejects it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Switch {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub param: String,
}

impl Switch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param: String::new(),
        }
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = param.into();
        self
    }
}

impl From<&str> for Switch {
    fn from(name: &str) -> Self {
        Switch::new(name)
    }
}

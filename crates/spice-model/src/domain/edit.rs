use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// What a recorded edit changed in the circuit description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EditKind {
    /// A `.param` value.
    Parameter,
    /// The value of a component (e.g. `R2 = 4k`).
    ComponentValue,
    /// A named parameter of a component instance.
    ComponentParameter,
    /// A simulation directive.
    Instruction,
    /// Anything the caller did not classify.
    #[default]
    Other,
}

/// One parameter/component change applied before a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub kind: EditKind,
}

impl Edit {
    pub fn new(name: impl Into<String>, value: impl Into<String>, kind: EditKind) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            kind,
        }
    }
}

/// Ordered list of edits recorded for a run.
///
/// Serialized as a transparent array. Lookups are linear in the number of edits, which stays small
/// (one entry per swept dimension).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Edits(Vec<Edit>);

impl Edits {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Edit> {
        self.0.iter()
    }

    /// Positional lookup.
    pub fn get_index(&self, index: usize) -> Option<&Edit> {
        self.0.get(index)
    }

    /// Name-keyed lookup; the first edit with that name wins.
    pub fn get(&self, name: &str) -> Option<&Edit> {
        self.0.iter().find(|e| e.name == name)
    }

    /// Value recorded under `name`, whatever its kind.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(|e| e.value.as_str())
    }

    /// Record an edit.
    ///
    /// An existing entry with the same name and kind is updated in place, so the list keeps one entry per
    /// edited item and its original position. Instructions are only merged when the text is identical.
    pub fn push(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        kind: EditKind,
    ) -> Result<&Edit, ModelError> {
        let name = name.into();
        let value = value.into();
        if name.trim().is_empty() {
            return Err(ModelError::EmptyEditName);
        }

        let pos = self.0.iter().position(|e| {
            e.name == name && e.kind == kind && (kind != EditKind::Instruction || e.value == value)
        });
        let idx = match pos {
            Some(idx) => {
                self.0[idx].value = value;
                idx
            }
            None => {
                self.0.push(Edit { name, value, kind });
                self.0.len() - 1
            }
        };
        Ok(&self.0[idx])
    }

    /// Shorthand for [`Edits::push`] with [`EditKind::Other`], chaining.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Result<Self, ModelError> {
        self.push(name, value, EditKind::Other)?;
        Ok(self)
    }
}

impl Index<usize> for Edits {
    type Output = Edit;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl<'a> IntoIterator for &'a Edits {
    type Item = &'a Edit;
    type IntoIter = std::slice::Iter<'a, Edit>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_empty() {
        let edits = Edits::new();
        assert!(edits.is_empty());
        assert!(edits.value("R1").is_none());
    }

    #[test]
    fn push_updates_in_place() {
        let mut edits = Edits::new();
        edits.push("R1", "1k", EditKind::ComponentValue).unwrap();
        edits.push("temp", "25", EditKind::Parameter).unwrap();
        edits.push("R1", "2k", EditKind::ComponentValue).unwrap();

        assert_eq!(edits.len(), 2);
        assert_eq!(edits[0].value, "2k");
        assert_eq!(edits.value("R1"), Some("2k"));
        assert_eq!(edits.get("temp").map(|e| e.kind), Some(EditKind::Parameter));
    }

    #[test]
    fn instructions_with_different_text_are_kept_apart() {
        let mut edits = Edits::new();
        edits.push("INSTRUCTION", ".tran 1m", EditKind::Instruction).unwrap();
        edits.push("INSTRUCTION", ".ac dec 10 1 1k", EditKind::Instruction).unwrap();
        edits.push("INSTRUCTION", ".tran 1m", EditKind::Instruction).unwrap();
        assert_eq!(edits.len(), 2);
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut edits = Edits::new();
        assert_eq!(
            edits.push("  ", "1", EditKind::Other).unwrap_err(),
            ModelError::EmptyEditName
        );
    }

    #[test]
    fn positional_and_named_lookup_agree() {
        let edits = Edits::new().with("V1", "5").unwrap().with("V2", "-5").unwrap();
        assert_eq!(edits.get_index(1), edits.get("V2"));
        assert!(edits.get_index(2).is_none());
    }

    #[test]
    fn serde_is_a_plain_array() {
        let edits = Edits::new().with("R2", "4k").unwrap();
        let json = serde_json::to_string(&edits).unwrap();
        assert!(json.starts_with('['));
        assert!(json.contains("\"name\":\"R2\""));

        let back: Edits = serde_json::from_str(&json).unwrap();
        assert_eq!(back, edits);
    }
}

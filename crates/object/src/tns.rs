use rivet_errors::AssemblyError;

use crate::{Scope, SectionId};

/// A `.equ` symbol whose expression could not be reduced yet.
///
/// The entry keeps the original expression text; the fixed-point resolver
/// re-tokenizes it on every round and deletes the entry once it reduces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TnsEntry {
    /// The section that was current when the `.equ` appeared.
    pub section: SectionId,
    /// The symbol being defined.
    pub name: String,
    /// The unreduced expression text.
    pub expression: String,
    /// Scope recorded at insertion time.
    pub scope: Scope,
}

/// The table of deferred `.equ` definitions.
#[derive(Debug, Default)]
pub struct TnsTable {
    entries: Vec<TnsEntry>,
}

impl TnsTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a deferred definition, rejecting duplicate names.
    pub fn insert(
        &mut self,
        section: SectionId,
        name: impl Into<String>,
        expression: impl Into<String>,
        scope: Scope,
    ) -> Result<(), AssemblyError> {
        let name = name.into();

        if self.get_by_name(&name).is_some() {
            return Err(AssemblyError::DuplicateTnsSymbol { name });
        }

        self.entries.push(TnsEntry { section, name, expression: expression.into(), scope });

        Ok(())
    }

    /// Looks an entry up by position.
    pub fn get(&self, index: usize) -> Option<&TnsEntry> {
        self.entries.get(index)
    }

    /// Looks an entry up by symbol name.
    pub fn get_by_name(&self, name: &str) -> Option<&TnsEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Removes a resolved entry.
    pub fn delete_by_name(&mut self, name: &str) {
        self.entries.retain(|entry| entry.name != name);
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &TnsEntry> {
        self.entries.iter()
    }

    /// Number of entries still unresolved.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether every deferred definition has been resolved.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

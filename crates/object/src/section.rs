use std::fmt;

use rivet_errors::AssemblyError;

use crate::{SectionId, SymbolId, CELL_WIDTH};

/// One section-table entry.
///
/// Every section owns a companion symbol of the same name, marking its
/// origin; intra-object references to LOCAL symbols relocate against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionEntry {
    /// Dense id, assigned on insertion. Id 0 is the reserved `UND`.
    pub id: SectionId,
    /// The section name. Unique across the table.
    pub name: String,
    /// Final byte length, written when the section is closed.
    pub length: usize,
    /// Id of the companion symbol.
    pub symbol: SymbolId,
}

/// The section table.
#[derive(Debug, Default)]
pub struct SectionTable {
    entries: Vec<SectionEntry>,
}

impl SectionTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new section, rejecting duplicate names. The companion
    /// symbol is not known yet at this point; the caller attaches it with
    /// [`SectionTable::attach_symbol`] right after creating it.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        length: usize,
    ) -> Result<SectionId, AssemblyError> {
        let name = name.into();

        if self.get_by_name(&name).is_some() {
            return Err(AssemblyError::DuplicateSection { name });
        }

        let id = self.entries.len();
        self.entries.push(SectionEntry { id, name, length, symbol: 0 });

        Ok(id)
    }

    /// Stores the companion-symbol id of `section`.
    pub fn attach_symbol(&mut self, section: SectionId, symbol: SymbolId) {
        if let Some(entry) = self.entries.get_mut(section) {
            entry.symbol = symbol;
        }
    }

    /// Writes the final byte length of `section`.
    pub fn set_length(&mut self, section: SectionId, length: usize) {
        if let Some(entry) = self.entries.get_mut(section) {
            entry.length = length;
        }
    }

    /// Looks a section up by id.
    pub fn get(&self, id: SectionId) -> Option<&SectionEntry> {
        self.entries.get(id)
    }

    /// Looks a section up by name.
    pub fn get_by_name(&self, name: &str) -> Option<&SectionEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Iterates over the entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = &SectionEntry> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for SectionTable {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            formatter,
            "{:<w$}{:<w$}{:<w$}{:<w$}",
            "EntryNumber",
            "Name",
            "Length",
            "SymbolEntryNumber",
            w = CELL_WIDTH,
        )?;

        for entry in &self.entries {
            writeln!(
                formatter,
                "{:<w$x}{:<w$}{:<w$x}{:<w$x}",
                entry.id,
                entry.name,
                entry.length,
                entry.symbol,
                w = CELL_WIDTH,
            )?;
        }

        Ok(())
    }
}

use std::fmt;

use rivet_errors::AssemblyError;

use crate::{SectionId, SymbolId, CELL_WIDTH};

/// Visibility of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The symbol is not visible outside this unit.
    Local,
    /// The symbol is exported to other units.
    Global,
    /// The symbol is imported from another unit and lives in `UND`.
    Extern,
}

impl fmt::Display for Scope {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `pad` keeps the table renderers' column widths working.
        formatter.pad(match self {
            Self::Local => "LOCAL",
            Self::Global => "GLOBAL",
            Self::Extern => "EXTERN",
        })
    }
}

/// One symbol-table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    /// Dense id, assigned on insertion.
    pub id: SymbolId,
    /// The symbol name. Unique across the table.
    pub name: String,
    /// The section this symbol belongs to (`UND` for externals).
    pub section: SectionId,
    /// Offset within `section`. Meaningless while `defined` is false.
    pub value: u16,
    /// Visibility.
    pub scope: Scope,
    /// Whether the value is final.
    pub defined: bool,
}

/// The symbol table.
///
/// Ids are indices into the backing vector, so lookups by id are O(1);
/// lookups by name scan, which is fine for the name sets an assembly unit
/// produces.
#[derive(Debug, Default)]
pub struct SymbolTable {
    entries: Vec<SymbolEntry>,
}

impl SymbolTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new symbol, rejecting duplicate names.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        section: SectionId,
        value: u16,
        scope: Scope,
        defined: bool,
    ) -> Result<SymbolId, AssemblyError> {
        let name = name.into();

        if self.get_by_name(&name).is_some() {
            return Err(AssemblyError::DuplicateSymbol { name });
        }

        let id = self.entries.len();
        self.entries.push(SymbolEntry { id, name, section, value, scope, defined });

        Ok(id)
    }

    /// Looks a symbol up by id.
    pub fn get(&self, id: SymbolId) -> Option<&SymbolEntry> {
        self.entries.get(id)
    }

    /// Looks a symbol up by name.
    pub fn get_by_name(&self, name: &str) -> Option<&SymbolEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Looks a symbol up by name, for mutation.
    pub fn get_by_name_mut(&mut self, name: &str) -> Option<&mut SymbolEntry> {
        self.entries.iter_mut().find(|entry| entry.name == name)
    }

    /// Iterates over the entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = &SymbolEntry> {
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

impl fmt::Display for SymbolTable {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            formatter,
            "{:<w$}{:<w$}{:<w$}{:<w$}{:<w$}",
            "EntryNumber",
            "Name",
            "SectionNumber",
            "Value",
            "Scope",
            w = CELL_WIDTH,
        )?;

        for entry in &self.entries {
            writeln!(
                formatter,
                "{:<w$x}{:<w$}{:<w$x}{:<w$x}{:<w$}",
                entry.id,
                entry.name,
                entry.section,
                entry.value,
                entry.scope,
                w = CELL_WIDTH,
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_assigns_dense_ids() {
        let mut table = SymbolTable::new();

        assert_eq!(table.insert("UND", 0, 0, Scope::Extern, false).unwrap(), 0);
        assert_eq!(table.insert("start", 1, 4, Scope::Local, true).unwrap(), 1);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1).map(|entry| entry.name.as_str()), Some("start"));
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut table = SymbolTable::new();

        table.insert("x", 1, 0, Scope::Local, true).unwrap();

        let error = table.insert("x", 2, 8, Scope::Local, true).unwrap_err();

        assert_eq!(error.to_string(), "Symbol 'x' is already declared.");
    }

    #[test]
    fn test_render() {
        let mut table = SymbolTable::new();
        table.insert("UND", 0, 0, Scope::Extern, false).unwrap();
        table.insert("text", 1, 0x1a, Scope::Global, true).unwrap();

        let rendered = table.to_string();
        let mut lines = rendered.lines();

        assert_eq!(
            lines.next(),
            Some("EntryNumber    Name           SectionNumber  Value          Scope          ")
        );
        assert_eq!(
            lines.next(),
            Some("0              UND            0              0              EXTERN         ")
        );
        assert_eq!(
            lines.next(),
            Some("1              text           1              1a             GLOBAL         ")
        );
        assert_eq!(lines.next(), None);
    }
}

use std::fmt;

use crate::{SectionId, SymbolId, CELL_WIDTH};

/// How a patched location relates to its target symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationKind {
    /// Absolute 16-bit value.
    Absolute16,
    /// 16-bit displacement relative to the program counter.
    PcRelative16,
}

impl fmt::Display for RelocationKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `pad` keeps the table renderers' column widths working.
        formatter.pad(match self {
            Self::Absolute16 => "R_386_16",
            Self::PcRelative16 => "R_386_PC16",
        })
    }
}

/// One relocation-table entry. Entries never mutate once inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationEntry {
    /// The section whose bytes need the fixup.
    pub section: SectionId,
    /// Byte offset of the patched location within `section`.
    pub offset: usize,
    /// Relocation kind.
    pub kind: RelocationKind,
    /// Symbol-table id of the target: the symbol itself for GLOBAL/EXTERN
    /// targets, the defining section's companion symbol for LOCAL ones.
    pub value: SymbolId,
}

/// The relocation table, an append-only log grouped by section at render
/// time.
#[derive(Debug, Default)]
pub struct RelocationTable {
    entries: Vec<RelocationEntry>,
}

impl RelocationTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one relocation entry.
    pub fn insert(
        &mut self,
        section: SectionId,
        offset: usize,
        kind: RelocationKind,
        value: SymbolId,
    ) {
        self.entries.push(RelocationEntry { section, offset, kind, value });
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &RelocationEntry> {
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

    /// Renders the relocation rows belonging to `section`, header included.
    pub fn section_listing(&self, section: SectionId) -> String {
        use std::fmt::Write as _;

        let mut output = String::new();

        // Infallible on `String`.
        let _ = writeln!(
            output,
            "{:<w$}{:<w$}{:<w$}",
            "Offset",
            "RelocationType",
            "Value",
            w = CELL_WIDTH,
        );

        for entry in self.entries.iter().filter(|entry| entry.section == section) {
            let _ = writeln!(
                output,
                "{:<w$x}{:<w$}{:<w$x}",
                entry.offset,
                entry.kind,
                entry.value,
                w = CELL_WIDTH,
            );
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_listing_filters_by_section() {
        let mut table = RelocationTable::new();
        table.insert(1, 0x1f, RelocationKind::Absolute16, 4);
        table.insert(2, 2, RelocationKind::PcRelative16, 1);
        table.insert(1, 0x30, RelocationKind::PcRelative16, 2);

        let listing = table.section_listing(1);
        let mut lines = listing.lines();

        assert_eq!(lines.next(), Some("Offset         RelocationType Value          "));
        assert_eq!(lines.next(), Some("1f             R_386_16       4              "));
        assert_eq!(lines.next(), Some("30             R_386_PC16     2              "));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_empty_section_renders_header_only() {
        let table = RelocationTable::new();

        assert_eq!(table.section_listing(0).lines().count(), 1);
    }
}

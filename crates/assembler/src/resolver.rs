//! The post-pass resolver: scope promotion, the TNS fixed point, and
//! backpatching of deferred references.

use log::debug;
use rivet_errors::AssemblyError;
use rivet_object::{RelocationKind, Scope, SectionId, UND_SECTION};

use crate::arithmetic;
use crate::assembler::Assembler;
use crate::token::{Prefix, TokenKind};

/// One deferred reference: a placeholder emitted by the encoder, waiting
/// for the symbol table to become final. Consumed once, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SymbolReference {
    pub(crate) symbol: String,
    pub(crate) in_section: SectionId,
    pub(crate) patch: usize,
    pub(crate) kind: RelocationKind,
    pub(crate) next_instruction_lc: usize,
    pub(crate) modify_one_byte: bool,
}

impl Assembler {
    /// Phase 1: applies the pending `.global` and `.extern` declarations.
    pub(crate) fn resolve_scopes(&mut self) -> Result<(), AssemblyError> {
        for name in &self.pending_globals {
            match self.symbol_table.get_by_name_mut(name) {
                Some(entry) if entry.defined => entry.scope = Scope::Global,
                _ => return Err(AssemblyError::GlobalUndefined { name: name.clone() }),
            }
        }

        for name in &self.pending_externs {
            if self.symbol_table.get_by_name(name).is_some() {
                return Err(AssemblyError::ExternDefined { name: name.clone() });
            }

            self.symbol_table.insert(name.clone(), UND_SECTION, 0, Scope::Extern, false)?;
        }

        Ok(())
    }

    /// Checks the per-section signed occurrence counts of one `.equ`
    /// expression: every section must cancel to 0, or exactly one may land
    /// on +1. External symbols count toward `UND` regardless of sign.
    fn classification_index_ok(
        &self,
        symbol: &str,
        expression: &str,
    ) -> Result<(), AssemblyError> {
        let mut counts: Vec<i64> = vec![0; self.section_table.len()];
        let mut plus = false;
        let mut minus = false;

        for token in arithmetic::tokenize(expression, 0)? {
            match token.kind() {
                TokenKind::Decimal(_) | TokenKind::Hexadecimal(_) => {
                    plus = false;
                    minus = false;
                }

                TokenKind::ArithmeticOperator => {
                    if token.value() == "+" {
                        plus = true;
                    } else {
                        minus = true;
                    }
                }

                TokenKind::Symbol(Prefix::None | Prefix::Immediate) => {
                    let entry = self.symbol_table.get_by_name(token.value()).ok_or_else(
                        || AssemblyError::EquSymbolUndeclared {
                            name: token.value().to_string(),
                        },
                    )?;

                    if entry.section == UND_SECTION {
                        counts[UND_SECTION] += 1;
                        plus = false;
                        minus = false;
                    } else if plus {
                        counts[entry.section] += 1;
                        plus = false;
                    } else if minus {
                        counts[entry.section] -= 1;
                        minus = false;
                    } else {
                        // A leading symbol carries an implicit plus.
                        counts[entry.section] += 1;
                    }
                }

                _ => {}
            }
        }

        let mut carried = false;

        for count in counts {
            match count {
                0 => {}
                1 if !carried => carried = true,
                _ => {
                    return Err(AssemblyError::ClassificationIndex {
                        name: symbol.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Phase 2: validates every TNS expression, then evaluates the table to
    /// a fixed point. A full pass that resolves nothing while entries
    /// remain means the definitions chase each other.
    pub(crate) fn resolve_tns_symbols(&mut self) -> Result<(), AssemblyError> {
        let pending: Vec<(String, String)> = self
            .tns
            .iter()
            .map(|entry| (entry.name.clone(), entry.expression.clone()))
            .collect();

        for (name, expression) in &pending {
            self.classification_index_ok(name, expression)?;
        }

        loop {
            let mut resolved = None;

            for index in 0..self.tns.len() {
                let entry = match self.tns.get(index) {
                    Some(entry) => entry,
                    None => break,
                };

                let tokens = match arithmetic::tokenize(&entry.expression, 0) {
                    Ok(tokens) => tokens,
                    Err(_) => continue,
                };

                let postfix = match arithmetic::to_postfix(tokens) {
                    Ok(postfix) => postfix,
                    Err(_) => continue,
                };

                let value = match arithmetic::evaluate(&postfix, &self.symbol_table) {
                    Ok(value) => value,
                    Err(_) => continue,
                };

                let references_extern = postfix.iter().any(|token| {
                    matches!(token.kind(), TokenKind::Symbol(Prefix::None | Prefix::Immediate))
                        && self
                            .symbol_table
                            .get_by_name(token.value())
                            .map(|entry| entry.scope == Scope::Extern)
                            .unwrap_or(false)
                });

                resolved = Some((entry.name.clone(), value, references_extern));
                break;
            }

            let Some((name, value, references_extern)) = resolved else {
                if self.tns.is_empty() {
                    return Ok(());
                }

                return Err(AssemblyError::CircularTns);
            };

            if let Some(entry) = self.symbol_table.get_by_name_mut(&name) {
                entry.value = value as u16;
                entry.defined = true;

                if references_extern {
                    entry.scope = Scope::Extern;
                }
            }

            debug!("resolved TNS symbol '{name}' to {:x}", value as u16);
            self.tns.delete_by_name(&name);

            if self.tns.is_empty() {
                return Ok(());
            }
        }
    }

    /// Phase 3: walks the deferred-reference log in arrival order, writing
    /// the final bytes and emitting relocation entries.
    pub(crate) fn backpatch(&mut self) -> Result<(), AssemblyError> {
        let references = std::mem::take(&mut self.references);

        for reference in references {
            let symbol = self
                .symbol_table
                .get_by_name(&reference.symbol)
                .ok_or_else(|| AssemblyError::BackpatchUndefined {
                    name: reference.symbol.clone(),
                })?;

            if matches!(symbol.scope, Scope::Local | Scope::Global) && !symbol.defined {
                return Err(AssemblyError::BackpatchUndefined { name: symbol.name.clone() });
            }

            let patch_value = match reference.kind {
                RelocationKind::PcRelative16 => {
                    if symbol.section == reference.in_section {
                        // Intra-section displacements fold into the bytes
                        // with no relocation.
                        symbol.value.wrapping_sub(reference.next_instruction_lc as u16)
                    } else if symbol.scope == Scope::Local {
                        let section_symbol = self
                            .section_table
                            .get(symbol.section)
                            .map(|entry| entry.symbol)
                            .unwrap_or(0);

                        self.relocation_table.insert(
                            reference.in_section,
                            reference.patch,
                            RelocationKind::PcRelative16,
                            section_symbol,
                        );

                        symbol.value.wrapping_sub(2)
                    } else {
                        self.relocation_table.insert(
                            reference.in_section,
                            reference.patch,
                            RelocationKind::PcRelative16,
                            symbol.id,
                        );

                        0u16.wrapping_sub(2)
                    }
                }

                RelocationKind::Absolute16 => {
                    if symbol.scope == Scope::Local {
                        if symbol.section != reference.in_section {
                            let section_symbol = self
                                .section_table
                                .get(symbol.section)
                                .map(|entry| entry.symbol)
                                .unwrap_or(0);

                            self.relocation_table.insert(
                                reference.in_section,
                                reference.patch,
                                RelocationKind::Absolute16,
                                section_symbol,
                            );
                        }

                        symbol.value
                    } else {
                        self.relocation_table.insert(
                            reference.in_section,
                            reference.patch,
                            RelocationKind::Absolute16,
                            symbol.id,
                        );

                        0
                    }
                }
            };

            if let Some(buffer) = self.machine_code.get_mut(&reference.in_section) {
                if let Some(slot) = buffer.get_mut(reference.patch) {
                    *slot = (patch_value & 0xff) as u8;
                }

                if !reference.modify_one_byte {
                    if let Some(slot) = buffer.get_mut(reference.patch + 1) {
                        *slot = (patch_value >> 8) as u8;
                    }
                }
            }
        }

        Ok(())
    }
}

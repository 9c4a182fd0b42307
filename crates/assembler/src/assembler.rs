use std::collections::BTreeMap;
use std::io;

use log::debug;
use rivet_errors::AssemblyError;
use rivet_object::{
    RelocationKind, RelocationTable, Scope, SectionId, SectionTable, SymbolTable, TnsTable,
};

use crate::instruction;
use crate::resolver::SymbolReference;
use crate::token::{Prefix, Token, TokenKind};

const BYTES_PER_LINE: usize = 8;

/// The single-pass driver.
///
/// One `Assembler` owns the tables, the per-section byte buffers, and the
/// deferred-reference log for the lifetime of one assembly run. [`Assembler::assemble`]
/// drives the whole pipeline: the one-and-only encoding pass, scope
/// promotion, the TNS fixed point, and backpatching.
#[derive(Debug)]
pub struct Assembler {
    pub(crate) symbol_table: SymbolTable,
    pub(crate) section_table: SectionTable,
    pub(crate) relocation_table: RelocationTable,
    pub(crate) tns: TnsTable,
    pub(crate) machine_code: BTreeMap<SectionId, Vec<u8>>,
    pub(crate) references: Vec<SymbolReference>,
    pub(crate) pending_globals: Vec<String>,
    pub(crate) pending_externs: Vec<String>,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    /// Creates a driver with the reserved `UND` section and its companion
    /// symbol already seated at id 0.
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        let mut section_table = SectionTable::new();

        // It's OK to `unwrap` as fresh tables cannot collide on the
        // reserved name.
        let und_section = section_table.insert("UND", 0).unwrap();
        let und_symbol =
            symbol_table.insert("UND", und_section, 0, Scope::Extern, false).unwrap();
        section_table.attach_symbol(und_section, und_symbol);

        Self {
            symbol_table,
            section_table,
            relocation_table: RelocationTable::new(),
            tns: TnsTable::new(),
            machine_code: BTreeMap::new(),
            references: Vec::new(),
            pending_globals: Vec::new(),
            pending_externs: Vec::new(),
        }
    }

    /// Runs the whole pipeline over one source text.
    pub fn assemble(&mut self, source: &str) -> Result<(), AssemblyError> {
        let assembly = load_lines(source);
        debug!("loaded {} source lines", assembly.len());

        self.one_and_only_pass(&assembly)?;
        self.resolve_scopes()?;
        self.resolve_tns_symbols()?;
        self.backpatch()?;

        Ok(())
    }

    /// The symbol table, as left by the last run.
    pub fn symbol_table(&self) -> &SymbolTable {
        &self.symbol_table
    }

    /// The section table, as left by the last run.
    pub fn section_table(&self) -> &SectionTable {
        &self.section_table
    }

    /// The relocation table, as left by the last run.
    pub fn relocation_table(&self) -> &RelocationTable {
        &self.relocation_table
    }

    /// The emitted bytes of one section, if it emitted any.
    pub fn machine_code(&self, section: SectionId) -> Option<&[u8]> {
        self.machine_code.get(&section).map(Vec::as_slice)
    }

    fn one_and_only_pass(&mut self, assembly: &[Vec<String>]) -> Result<(), AssemblyError> {
        let mut current_section: Option<SectionId> = None;
        let mut location_counter: usize = 0;

        for (index, line) in assembly.iter().enumerate() {
            let line_number = (index + 1) as u64;

            if line.is_empty() {
                continue;
            }

            let mut rest = line.as_slice();
            let mut head = Token::scan(&rest[0], line_number)?;
            rest = &rest[1..];

            if head.kind() == TokenKind::Label {
                let label = head.value().to_string();

                let section = current_section.ok_or_else(|| {
                    AssemblyError::LabelOutsideSection { name: label.clone(), line: line_number }
                })?;

                match self.symbol_table.get_by_name(&label).map(|entry| entry.defined) {
                    Some(true) => {
                        return Err(AssemblyError::LabelRedefined {
                            name: label,
                            line: line_number,
                        });
                    }
                    Some(false) => {
                        if let Some(entry) = self.symbol_table.get_by_name_mut(&label) {
                            entry.value = location_counter as u16;
                            entry.defined = true;
                        }
                    }
                    None => {
                        self.symbol_table.insert(
                            &label,
                            section,
                            location_counter as u16,
                            Scope::Local,
                            true,
                        )?;
                    }
                }

                if rest.is_empty() {
                    continue;
                }

                head = Token::scan(&rest[0], line_number)?;
                rest = &rest[1..];

                if head.kind() == TokenKind::Label {
                    return Err(AssemblyError::SyntaxAfterLabel {
                        name: label,
                        line: line_number,
                    });
                }
            }

            match head.kind() {
                TokenKind::AccessModifier => {
                    self.handle_access_modifier(&head, rest, line_number)?;
                }

                TokenKind::Directive => {
                    let section = current_section.ok_or_else(|| {
                        AssemblyError::DirectiveOutsideSection {
                            directive: head.value().to_string(),
                            line: line_number,
                        }
                    })?;

                    match head.value() {
                        ".byte" => self.handle_data(
                            ".byte",
                            rest,
                            section,
                            &mut location_counter,
                            line_number,
                            true,
                        )?,
                        ".word" => self.handle_data(
                            ".word",
                            rest,
                            section,
                            &mut location_counter,
                            line_number,
                            false,
                        )?,
                        ".skip" => {
                            self.handle_skip(rest, section, &mut location_counter, line_number)?;
                        }
                        _ => self.handle_equ(rest, section, line_number)?,
                    }
                }

                TokenKind::SectionDirective => {
                    self.handle_section(
                        rest,
                        &mut current_section,
                        &mut location_counter,
                        line_number,
                    )?;
                }

                TokenKind::EndOfSections => {
                    if let Some(section) = current_section {
                        self.section_table.set_length(section, location_counter);
                        debug!("section {section} finalized at {location_counter} bytes");
                    }
                }

                TokenKind::Instruction => {
                    let section = current_section.ok_or_else(|| {
                        AssemblyError::InstructionOutsideSection {
                            mnemonic: head.value().to_string(),
                            line: line_number,
                        }
                    })?;

                    let mut tokens = vec![head];

                    for lexeme in rest {
                        tokens.push(Token::scan(lexeme, line_number)?);
                    }

                    let encoded = instruction::encode(
                        &tokens,
                        line_number,
                        location_counter,
                        section,
                        &mut self.references,
                    )?;

                    location_counter += encoded.size();
                    self.machine_code
                        .entry(section)
                        .or_default()
                        .extend_from_slice(encoded.bytes());
                }

                _ => {
                    return Err(AssemblyError::UnexpectedLineHead {
                        lexeme: head.value().to_string(),
                        line: line_number,
                    });
                }
            }
        }

        Ok(())
    }

    fn handle_access_modifier(
        &mut self,
        head: &Token,
        operands: &[String],
        line: u64,
    ) -> Result<(), AssemblyError> {
        let expected = || AssemblyError::ExpectedSymbolList {
            directive: head.value().to_string(),
            line,
        };

        if operands.is_empty() {
            return Err(expected());
        }

        for lexeme in operands {
            let operand = Token::scan(lexeme, line)?;

            if operand.kind() != TokenKind::Symbol(Prefix::None) {
                return Err(expected());
            }

            if head.value() == ".extern" {
                self.pending_externs.push(operand.value().to_string());
            } else {
                self.pending_globals.push(operand.value().to_string());
            }
        }

        Ok(())
    }

    fn handle_data(
        &mut self,
        directive: &str,
        operands: &[String],
        section: SectionId,
        location_counter: &mut usize,
        line: u64,
        one_byte: bool,
    ) -> Result<(), AssemblyError> {
        let expected = || AssemblyError::ExpectedDataOperand {
            directive: directive.to_string(),
            line,
        };

        if operands.is_empty() {
            return Err(expected());
        }

        for lexeme in operands {
            let operand = Token::scan(lexeme, line)?;

            let value = match operand.kind() {
                TokenKind::Decimal(Prefix::None) | TokenKind::Hexadecimal(Prefix::None) => {
                    operand.literal_value().ok_or_else(|| AssemblyError::UnparsableLexeme {
                        lexeme: lexeme.clone(),
                        line,
                    })?
                }
                TokenKind::Symbol(Prefix::None) => {
                    self.references.push(SymbolReference {
                        symbol: operand.value().to_string(),
                        in_section: section,
                        patch: *location_counter,
                        kind: RelocationKind::Absolute16,
                        next_instruction_lc: 0,
                        modify_one_byte: one_byte,
                    });

                    0
                }
                _ => return Err(expected()),
            };

            let word = value as u16;

            self.emit(section, (word & 0xff) as u8);

            if one_byte {
                *location_counter += 1;
            } else {
                self.emit(section, (word >> 8) as u8);
                *location_counter += 2;
            }
        }

        Ok(())
    }

    fn handle_skip(
        &mut self,
        operands: &[String],
        section: SectionId,
        location_counter: &mut usize,
        line: u64,
    ) -> Result<(), AssemblyError> {
        let operand = operands
            .first()
            .map(|lexeme| Token::scan(lexeme, line))
            .transpose()?
            .ok_or(AssemblyError::ExpectedSkipLiteral { line })?;

        let padding = match operand.kind() {
            TokenKind::Decimal(Prefix::None) | TokenKind::Hexadecimal(Prefix::None) => {
                operand.literal_value().unwrap_or(-1)
            }
            _ => -1,
        };

        let padding = usize::try_from(padding)
            .map_err(|_| AssemblyError::ExpectedSkipLiteral { line })?;

        for _ in 0..padding {
            self.emit(section, 0);
        }

        *location_counter += padding;

        Ok(())
    }

    fn handle_equ(
        &mut self,
        operands: &[String],
        section: SectionId,
        line: u64,
    ) -> Result<(), AssemblyError> {
        let name = operands
            .first()
            .map(|lexeme| Token::scan_flat(lexeme, line))
            .transpose()?
            .filter(|operand| operand.kind() == TokenKind::Symbol(Prefix::None))
            .ok_or(AssemblyError::ExpectedEquSymbol { line })?;

        let expression = operands[1..].concat();
        let tokens = crate::arithmetic::tokenize(&expression, line)?;

        let all_literals = tokens.iter().all(|token| {
            matches!(
                token.kind(),
                TokenKind::ArithmeticOperator
                    | TokenKind::Decimal(Prefix::None | Prefix::Immediate)
                    | TokenKind::Hexadecimal(Prefix::None | Prefix::Immediate)
            )
        });

        if all_literals {
            let postfix = crate::arithmetic::to_postfix(tokens)?;
            let value = crate::arithmetic::evaluate(&postfix, &self.symbol_table)?;

            self.symbol_table.insert(
                name.value(),
                section,
                value as u16,
                Scope::Local,
                true,
            )?;
        } else {
            self.symbol_table.insert(name.value(), section, 0, Scope::Local, false)?;
            self.tns.insert(section, name.value(), expression, Scope::Local)?;
        }

        Ok(())
    }

    fn handle_section(
        &mut self,
        operands: &[String],
        current_section: &mut Option<SectionId>,
        location_counter: &mut usize,
        line: u64,
    ) -> Result<(), AssemblyError> {
        if let Some(section) = *current_section {
            self.section_table.set_length(section, *location_counter);
        }

        if operands.is_empty() {
            return Err(AssemblyError::MissingSectionName { line });
        }

        let operand = Token::scan(&operands[0], line)?;

        let name = match operand.kind() {
            TokenKind::Symbol(Prefix::None) | TokenKind::Label => operand.value(),
            _ => return Err(AssemblyError::MissingSectionName { line }),
        };

        if operands.len() > 1 {
            return Err(AssemblyError::TrailingTokens { line });
        }

        let section = self.section_table.insert(name, 0)?;
        let symbol = self.symbol_table.insert(name, section, 0, Scope::Local, true)?;
        self.section_table.attach_symbol(section, symbol);

        debug!("opened section '{name}' as id {section}");

        *current_section = Some(section);
        *location_counter = 0;

        Ok(())
    }

    fn emit(&mut self, section: SectionId, byte: u8) {
        self.machine_code.entry(section).or_default().push(byte);
    }

    /// Writes the object listing: symbol table, section table, then the
    /// relocations and raw bytes of every section that emitted any.
    pub fn write_listing<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "<--Symbol table-->")?;
        write!(writer, "{}", self.symbol_table)?;
        writeln!(writer)?;
        writeln!(writer)?;

        writeln!(writer, "<--Section table-->")?;
        write!(writer, "{}", self.section_table)?;
        writeln!(writer)?;
        writeln!(writer)?;

        for (&section, bytes) in &self.machine_code {
            let name =
                self.section_table.get(section).map(|entry| entry.name.as_str()).unwrap_or("");

            writeln!(writer, "<--Section '{name}'-->")?;
            writeln!(writer)?;
            write!(writer, "{}", self.relocation_table.section_listing(section))?;
            writeln!(writer)?;

            let mut bytes_in_line = 0;

            for byte in bytes {
                write!(writer, "{byte:02x}")?;
                bytes_in_line += 1;

                if bytes_in_line == BYTES_PER_LINE {
                    bytes_in_line = 0;
                    writeln!(writer)?;
                } else {
                    write!(writer, " ")?;
                }
            }

            writeln!(writer)?;
            writeln!(writer)?;
            writeln!(writer)?;
        }

        Ok(())
    }
}

/// Splits the source into lines of lexemes: comments stripped, everything
/// lowercased, separators collapsed. Reading stops at `.end`; a missing
/// `.end` is synthesized.
fn load_lines(source: &str) -> Vec<Vec<String>> {
    let mut assembly = Vec::new();
    let mut terminated = false;

    for raw_line in source.lines() {
        let line = match raw_line.find('#') {
            Some(comment) => &raw_line[..comment],
            None => raw_line,
        };

        let lexemes: Vec<String> = line
            .to_lowercase()
            .split([' ', '\t', ',', '\r'])
            .filter(|lexeme| !lexeme.is_empty())
            .map(str::to_string)
            .collect();

        terminated = lexemes.first().map(|lexeme| lexeme == ".end").unwrap_or(false);
        assembly.push(lexemes);

        if terminated {
            break;
        }
    }

    if !terminated {
        assembly.push(vec![".end".to_string()]);
    }

    assembly
}

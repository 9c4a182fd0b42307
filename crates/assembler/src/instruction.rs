//! Instruction sizing and encoding.
//!
//! Sizing and encoding are two passes over the same operand list and must
//! agree byte for byte: the driver first asks for the size to know where
//! the next instruction starts, then encodes.

use std::collections::HashMap;
use std::sync::LazyLock;

use rivet_errors::AssemblyError;
use rivet_object::{RelocationKind, SectionId};

use crate::resolver::SymbolReference;
use crate::token::{Prefix, Token, TokenKind};

/// Static description of one mnemonic.
#[derive(Debug, Clone, Copy)]
struct InstructionDetails {
    op_code: u8,
    operand_count: usize,
}

static INSTRUCTIONS: LazyLock<HashMap<&str, InstructionDetails>> = LazyLock::new(|| {
    HashMap::from([
        ("halt", InstructionDetails { op_code: 0, operand_count: 0 }),
        ("iret", InstructionDetails { op_code: 1, operand_count: 0 }),
        ("ret", InstructionDetails { op_code: 2, operand_count: 0 }),
        ("int", InstructionDetails { op_code: 3, operand_count: 1 }),
        ("call", InstructionDetails { op_code: 4, operand_count: 1 }),
        ("jmp", InstructionDetails { op_code: 5, operand_count: 1 }),
        ("jeq", InstructionDetails { op_code: 6, operand_count: 1 }),
        ("jne", InstructionDetails { op_code: 7, operand_count: 1 }),
        ("jgt", InstructionDetails { op_code: 8, operand_count: 1 }),
        ("push", InstructionDetails { op_code: 9, operand_count: 1 }),
        ("pop", InstructionDetails { op_code: 10, operand_count: 1 }),
        ("xchg", InstructionDetails { op_code: 11, operand_count: 2 }),
        ("mov", InstructionDetails { op_code: 12, operand_count: 2 }),
        ("add", InstructionDetails { op_code: 13, operand_count: 2 }),
        ("sub", InstructionDetails { op_code: 14, operand_count: 2 }),
        ("mul", InstructionDetails { op_code: 15, operand_count: 2 }),
        ("div", InstructionDetails { op_code: 16, operand_count: 2 }),
        ("cmp", InstructionDetails { op_code: 17, operand_count: 2 }),
        ("not", InstructionDetails { op_code: 18, operand_count: 2 }),
        ("and", InstructionDetails { op_code: 19, operand_count: 2 }),
        ("or", InstructionDetails { op_code: 20, operand_count: 2 }),
        ("xor", InstructionDetails { op_code: 21, operand_count: 2 }),
        ("test", InstructionDetails { op_code: 22, operand_count: 2 }),
        ("shl", InstructionDetails { op_code: 23, operand_count: 2 }),
        ("shr", InstructionDetails { op_code: 24, operand_count: 2 }),
    ])
});

/// Operand width selected by the mnemonic suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperandSize {
    Byte,
    Word,
}

impl OperandSize {
    fn bit(self) -> u8 {
        match self {
            Self::Byte => 0,
            Self::Word => 1,
        }
    }
}

/// Splits the optional `b`/`w` size suffix off a mnemonic.
///
/// The literal mnemonic `sub` ends in `b` but never carries a byte suffix;
/// `subb` and `subw` are its sized forms.
fn strip_size_suffix(mnemonic: &str) -> (&str, OperandSize) {
    if let Some(stripped) = mnemonic.strip_suffix('w') {
        return (stripped, OperandSize::Word);
    }

    if mnemonic != "sub" {
        if let Some(stripped) = mnemonic.strip_suffix('b') {
            return (stripped, OperandSize::Byte);
        }
    }

    (mnemonic, OperandSize::Word)
}

fn is_jump(mnemonic: &str) -> bool {
    matches!(mnemonic, "jmp" | "jeq" | "jne" | "jgt")
}

/// Resolves a raw mnemonic to its table entry, size, and stripped name,
/// validating the operand count.
fn lookup(
    mnemonic: &str,
    operand_count: usize,
    line: u64,
) -> Result<(InstructionDetails, OperandSize, &str), AssemblyError> {
    let (stripped, size) = strip_size_suffix(mnemonic);

    let details = INSTRUCTIONS
        .get(stripped)
        .ok_or_else(|| AssemblyError::UnknownInstruction { mnemonic: stripped.to_string(), line })?;

    if details.operand_count != operand_count {
        return Err(AssemblyError::WrongOperandCount { mnemonic: stripped.to_string(), line });
    }

    Ok((*details, size, stripped))
}

/// Numeric value of a literal operand.
fn literal(token: &Token, line: u64) -> Result<i64, AssemblyError> {
    token.literal_value().ok_or_else(|| AssemblyError::UnparsableLexeme {
        lexeme: token.value().to_string(),
        line,
    })
}

/// Splits a register-direct operand into its index and `h`/`l` selector.
fn parse_register(text: &str) -> (u8, Option<char>) {
    let digits = text.trim_start_matches("%r");

    let (digits, half) = match digits.strip_suffix(['h', 'l']) {
        Some(stripped) => (stripped, digits.chars().next_back()),
        None => (digits, None),
    };

    (digits.parse().unwrap_or(0), half)
}

/// Splits a register-indirect operand into its optional offset token and
/// register index. The PSW cannot be an indirection base.
fn parse_indirect(token: &Token, line: u64) -> Result<(Option<Token>, u8), AssemblyError> {
    let text = token.value();
    let open = text.find('(').unwrap_or(0);

    let offset = if open == 0 {
        None
    } else {
        Some(Token::scan_flat(&text[..open], line)?)
    };

    let inside = &text[open + 1..text.len() - 1];
    let (register, _) = parse_register(inside);

    if register == 15 {
        return Err(AssemblyError::PswIndirect { line });
    }

    Ok((offset, register))
}

/// Computes the encoded byte size of one tokenized instruction line.
pub(crate) fn instruction_size(line: u64, tokens: &[Token]) -> Result<usize, AssemblyError> {
    let operands = &tokens[1..];
    let (_, size, _) = lookup(tokens[0].value(), operands.len(), line)?;

    let mut result = 1;

    for operand in operands {
        result += match operand.kind() {
            TokenKind::RegisterDirect => 1,

            TokenKind::Symbol(Prefix::Immediate) => 3,

            TokenKind::Decimal(Prefix::Immediate) | TokenKind::Hexadecimal(Prefix::Immediate) => {
                match size {
                    OperandSize::Byte => 2,
                    OperandSize::Word => 3,
                }
            }

            TokenKind::RegisterIndirect => {
                let (offset, _) = parse_indirect(operand, line)?;

                match offset {
                    None => 1,
                    Some(token) if token.literal_value() == Some(0) => 1,
                    Some(_) => 3,
                }
            }

            TokenKind::PcRelative => 3,

            TokenKind::Symbol(Prefix::Asterisk)
            | TokenKind::Decimal(Prefix::Asterisk)
            | TokenKind::Hexadecimal(Prefix::Asterisk) => 3,

            TokenKind::Symbol(Prefix::None)
            | TokenKind::Decimal(Prefix::None)
            | TokenKind::Hexadecimal(Prefix::None) => 3,

            _ => return Err(AssemblyError::NonExistentAddressing { line }),
        };
    }

    Ok(result)
}

/// One encoded instruction, at most seven bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EncodedInstruction {
    bytes: [u8; 7],
    size: usize,
}

impl EncodedInstruction {
    /// The encoded bytes.
    pub(crate) fn bytes(&self) -> &[u8] {
        &self.bytes[..self.size]
    }

    /// Byte length, equal to what the sizing pass predicted.
    pub(crate) fn size(&self) -> usize {
        self.size
    }
}

/// Encodes one tokenized instruction line.
///
/// Symbol-valued operands emit zero placeholders and append a deferred
/// reference pointing at their data bytes; the backpatcher writes the real
/// values once the symbol table is final.
pub(crate) fn encode(
    tokens: &[Token],
    line: u64,
    location_counter: usize,
    section: SectionId,
    references: &mut Vec<SymbolReference>,
) -> Result<EncodedInstruction, AssemblyError> {
    let size_in_bytes = instruction_size(line, tokens)?;

    let operands = &tokens[1..];
    let (details, size, stripped) = lookup(tokens[0].value(), operands.len(), line)?;

    let mut code = [0u8; 7];
    code[0] = (details.op_code << 3) | (size.bit() << 2);

    let mut to_write = 1usize;

    // Two-operand instructions write their second operand, except `shr`,
    // which writes its first; `pop` writes its single operand.
    let mut destination = matches!((operands.len(), stripped), (2, "shr") | (1, "pop"));

    let mut defer = |symbol: &str, patch: usize, kind: RelocationKind, one_byte: bool| {
        references.push(SymbolReference {
            symbol: symbol.to_string(),
            in_section: section,
            patch,
            kind,
            next_instruction_lc: location_counter + size_in_bytes,
            modify_one_byte: one_byte,
        });
    };

    for operand in operands {
        match operand.kind() {
            // Memory direct, or immediate under the jump override.
            TokenKind::Symbol(Prefix::None)
            | TokenKind::Decimal(Prefix::None)
            | TokenKind::Hexadecimal(Prefix::None) => {
                code[to_write] = if is_jump(stripped) { 0 } else { 4 << 5 };
                to_write += 1;

                let value = if operand.kind() == TokenKind::Symbol(Prefix::None) {
                    defer(
                        operand.value(),
                        location_counter + to_write,
                        RelocationKind::Absolute16,
                        false,
                    );

                    0
                } else {
                    literal(operand, line)?
                };

                let word = value as u16;
                code[to_write] = (word & 0xff) as u8;
                code[to_write + 1] = (word >> 8) as u8;
                to_write += 2;
            }

            TokenKind::RegisterIndirect => {
                let (offset, register) = parse_indirect(operand, line)?;

                let no_displacement = match &offset {
                    None => true,
                    Some(token) => token.literal_value() == Some(0),
                };

                if no_displacement {
                    code[to_write] = (2 << 5) | (register << 1);
                    to_write += 1;
                } else {
                    code[to_write] = (3 << 5) | (register << 1);
                    to_write += 1;

                    let value = match &offset {
                        Some(token) if matches!(token.kind(), TokenKind::Symbol(_)) => {
                            defer(
                                token.value(),
                                location_counter + to_write,
                                RelocationKind::Absolute16,
                                false,
                            );

                            0
                        }
                        Some(token) => literal(token, line)?,
                        None => 0,
                    };

                    let word = value as u16;
                    code[to_write] = (word & 0xff) as u8;
                    code[to_write + 1] = (word >> 8) as u8;
                    to_write += 2;
                }
            }

            // `*` forces memory direct.
            TokenKind::Symbol(Prefix::Asterisk)
            | TokenKind::Decimal(Prefix::Asterisk)
            | TokenKind::Hexadecimal(Prefix::Asterisk) => {
                code[to_write] = 4 << 5;
                to_write += 1;

                let value = if operand.kind() == TokenKind::Symbol(Prefix::Asterisk) {
                    defer(
                        operand.value(),
                        location_counter + to_write,
                        RelocationKind::Absolute16,
                        false,
                    );

                    0
                } else {
                    literal(operand, line)?
                };

                let word = value as u16;
                code[to_write] = (word & 0xff) as u8;
                code[to_write + 1] = (word >> 8) as u8;
                to_write += 2;
            }

            TokenKind::RegisterDirect => {
                let (register, half) = parse_register(operand.value());

                if destination && register == 15 {
                    return Err(AssemblyError::PswDestination { line });
                }

                let high = match size {
                    OperandSize::Byte => match half {
                        Some('h') => 1,
                        Some(_) => 0,
                        None => return Err(AssemblyError::MissingByteSelector { line }),
                    },
                    OperandSize::Word => {
                        if half.is_some() {
                            return Err(AssemblyError::ForbiddenByteSelector { line });
                        }

                        0
                    }
                };

                code[to_write] = (1 << 5) | (register << 1) | high;
                to_write += 1;
            }

            TokenKind::Symbol(Prefix::Immediate)
            | TokenKind::Decimal(Prefix::Immediate)
            | TokenKind::Hexadecimal(Prefix::Immediate) => {
                if destination {
                    return Err(AssemblyError::ImmediateDestination { line });
                }

                code[to_write] = 0;
                to_write += 1;

                if operand.kind() == TokenKind::Symbol(Prefix::Immediate) {
                    // An immediate symbol always reserves a full word; a
                    // byte-sized patch touches only the first data byte.
                    defer(
                        operand.value(),
                        location_counter + to_write,
                        RelocationKind::Absolute16,
                        size == OperandSize::Byte,
                    );

                    to_write += 2;
                } else {
                    let word = literal(operand, line)? as u16;

                    match size {
                        OperandSize::Byte => {
                            code[to_write] = (word & 0xff) as u8;
                            to_write += 1;
                        }
                        OperandSize::Word => {
                            code[to_write] = (word & 0xff) as u8;
                            code[to_write + 1] = (word >> 8) as u8;
                            to_write += 2;
                        }
                    }
                }
            }

            TokenKind::PcRelative => {
                let name = operand.value().split('(').next().unwrap_or_default();

                code[to_write] = (3 << 5) | (7 << 1);
                to_write += 1;

                defer(name, location_counter + to_write, RelocationKind::PcRelative16, false);
                to_write += 2;
            }

            _ => return Err(AssemblyError::NonExistentAddressing { line }),
        }

        destination = !destination;
    }

    debug_assert_eq!(to_write, size_in_bytes);

    Ok(EncodedInstruction { bytes: code, size: to_write })
}

use std::sync::LazyLock;

use regex::Regex;
use rivet_errors::AssemblyError;

/// Prefix carried by a value operand.
///
/// `$` marks an immediate operand, `*` a memory-direct one. They are
/// mutually exclusive and only meaningful in front of a symbol or a literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Prefix {
    /// No prefix.
    #[default]
    None,
    /// `$` — immediate.
    Immediate,
    /// `*` — memory direct.
    Asterisk,
}

/// What a lexeme classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `.global` or `.extern`.
    AccessModifier,
    /// `name:`. The token value drops the colon.
    Label,
    /// `.section`.
    SectionDirective,
    /// `.byte`, `.equ`, `.skip` or `.word`.
    Directive,
    /// A mnemonic, possibly carrying a `b`/`w` size suffix.
    Instruction,
    /// `.end`.
    EndOfSections,
    /// `+` or `-`.
    ArithmeticOperator,
    /// An identifier, under an optional prefix.
    Symbol(Prefix),
    /// A signed decimal literal, under an optional prefix.
    Decimal(Prefix),
    /// A `0x` hexadecimal literal, under an optional prefix.
    Hexadecimal(Prefix),
    /// `%rN`, optionally selecting the `h`igh or `l`ow byte.
    RegisterDirect,
    /// `sym(%r7)`.
    PcRelative,
    /// `offset(%rN)` with an optional literal or symbol offset.
    RegisterIndirect,
    /// A `+`/`-` chain of symbols and literals, kept as raw text for the
    /// arithmetic engine.
    ArithmeticExpression,
}

/// The raw pattern classes, in match order. First match wins.
enum Class {
    AccessModifier,
    Label,
    Section,
    Directive,
    Instruction,
    EndOfSections,
    ArithmeticOperator,
    Symbol,
    Decimal,
    Hexadecimal,
    RegisterDirect,
    PcRelative,
    RegisterIndirect,
}

static PATTERNS: LazyLock<Vec<(Regex, Class)>> = LazyLock::new(|| {
    [
        (r"^\.(global|extern)$", Class::AccessModifier),
        (r"^([a-zA-Z][a-zA-Z0-9_]*):$", Class::Label),
        (r"^\.section$", Class::Section),
        (r"^\.(byte|equ|skip|word)$", Class::Directive),
        (
            r"^(halt|ret|iret|int|jmp|jeq|jne|jgt|call|(not|push|pop|xchg|mov|add|sub|mul|div|cmp|and|or|xor|test|shl|shr)(b|w)?)$",
            Class::Instruction,
        ),
        (r"^\.end$", Class::EndOfSections),
        (r"^(\+|-)$", Class::ArithmeticOperator),
        (r"^[a-zA-Z][a-zA-Z0-9_]*$", Class::Symbol),
        (r"^(-|\+)?[0-9]+$", Class::Decimal),
        (r"^0x[0-9a-fA-F]+$", Class::Hexadecimal),
        (r"^%r([0-7]|15)(h|l)?$", Class::RegisterDirect),
        (r"^[a-zA-Z][a-zA-Z0-9_]*\(%r7\)$", Class::PcRelative),
        (
            r"^([a-zA-Z][a-zA-Z0-9_]*|(-|\+)?[0-9]+|0x[0-9a-fA-F]+|)\(%r([0-7]|15)(h|l)?\)$",
            Class::RegisterIndirect,
        ),
    ]
    .into_iter()
    .map(|(pattern, class)| {
        // The patterns are fixed at compile time.
        (Regex::new(pattern).unwrap(), class)
    })
    .collect()
});

/// A classified lexeme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    kind: TokenKind,
    value: String,
}

impl Token {
    /// Builds a token directly, bypassing classification.
    pub(crate) fn new(kind: TokenKind, value: impl Into<String>) -> Self {
        Self { kind, value: value.into() }
    }

    /// What the lexeme classified as.
    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// The canonical text: register aliases rewritten, prefixes and the
    /// label colon stripped. `ArithmeticExpression` tokens keep the lexeme
    /// as written.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Classifies one lexeme.
    ///
    /// A lexeme matching no pattern is retried as an arithmetic expression:
    /// split on `+`/`-`, every piece must classify as a symbol or a literal.
    pub fn scan(lexeme: &str, line: u64) -> Result<Self, AssemblyError> {
        Self::scan_with(lexeme, line, true)
    }

    /// Classifies one lexeme without the arithmetic-expression fallback.
    pub(crate) fn scan_flat(lexeme: &str, line: u64) -> Result<Self, AssemblyError> {
        Self::scan_with(lexeme, line, false)
    }

    fn scan_with(lexeme: &str, line: u64, recursive: bool) -> Result<Self, AssemblyError> {
        let cannot_parse = || AssemblyError::UnparsableLexeme { lexeme: lexeme.to_string(), line };

        if lexeme.is_empty() {
            return Err(cannot_parse());
        }

        let mut data =
            lexeme.replace("%sp", "%r6").replace("%pc", "%r7").replace("%psw", "%r15");

        let mut prefix = Prefix::None;

        if let Some(stripped) = data.strip_prefix('*') {
            data = stripped.to_string();
            prefix = Prefix::Asterisk;
        } else if let Some(stripped) = data.strip_prefix('$') {
            data = stripped.to_string();
            prefix = Prefix::Immediate;
        }

        for (pattern, class) in PATTERNS.iter() {
            if !pattern.is_match(&data) {
                continue;
            }

            let kind = match class {
                Class::AccessModifier => TokenKind::AccessModifier,
                Class::Label => TokenKind::Label,
                Class::Section => TokenKind::SectionDirective,
                Class::Directive => TokenKind::Directive,
                Class::Instruction => TokenKind::Instruction,
                Class::EndOfSections => TokenKind::EndOfSections,
                Class::ArithmeticOperator => TokenKind::ArithmeticOperator,
                Class::Symbol => TokenKind::Symbol(prefix),
                Class::Decimal => TokenKind::Decimal(prefix),
                Class::Hexadecimal => TokenKind::Hexadecimal(prefix),
                Class::RegisterDirect => TokenKind::RegisterDirect,
                Class::PcRelative => TokenKind::PcRelative,
                Class::RegisterIndirect => TokenKind::RegisterIndirect,
            };

            // `$` and `*` only make sense on symbols and literals.
            if prefix != Prefix::None
                && !matches!(
                    kind,
                    TokenKind::Symbol(_) | TokenKind::Decimal(_) | TokenKind::Hexadecimal(_)
                )
            {
                return Err(cannot_parse());
            }

            if matches!(kind, TokenKind::Label) {
                data.pop();
            }

            return Ok(Self::new(kind, data));
        }

        if recursive {
            for piece in lexeme.split(['+', '-']).filter(|piece| !piece.is_empty()) {
                let token = Self::scan_with(piece, line, false)?;

                if !token.is_expression_piece() {
                    return Err(cannot_parse());
                }
            }

            return Ok(Self::new(TokenKind::ArithmeticExpression, lexeme));
        }

        Err(cannot_parse())
    }

    /// Whether this token may appear as an operand of a `.equ` expression.
    pub(crate) fn is_expression_piece(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Symbol(Prefix::None | Prefix::Immediate)
                | TokenKind::Decimal(Prefix::None | Prefix::Immediate)
                | TokenKind::Hexadecimal(Prefix::None | Prefix::Immediate)
        )
    }

    /// Numeric value of a literal token, if it is one.
    pub fn literal_value(&self) -> Option<i64> {
        match self.kind {
            TokenKind::Decimal(_) => self.value.parse::<i64>().ok(),
            TokenKind::Hexadecimal(_) => {
                i64::from_str_radix(self.value.trim_start_matches("0x"), 16).ok()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(lexeme: &str) -> Token {
        Token::scan(lexeme, 1).unwrap()
    }

    #[test]
    fn test_statement_heads() {
        assert_eq!(scan(".global").kind(), TokenKind::AccessModifier);
        assert_eq!(scan(".extern").kind(), TokenKind::AccessModifier);
        assert_eq!(scan(".section").kind(), TokenKind::SectionDirective);
        assert_eq!(scan(".byte").kind(), TokenKind::Directive);
        assert_eq!(scan(".equ").kind(), TokenKind::Directive);
        assert_eq!(scan(".end").kind(), TokenKind::EndOfSections);

        // The end marker requires its dot.
        assert_eq!(scan("bend").kind(), TokenKind::Symbol(Prefix::None));
    }

    #[test]
    fn test_label_drops_colon() {
        let token = scan("loop:");

        assert_eq!(token.kind(), TokenKind::Label);
        assert_eq!(token.value(), "loop");
    }

    #[test]
    fn test_instructions_with_suffixes() {
        assert_eq!(scan("mov").kind(), TokenKind::Instruction);
        assert_eq!(scan("movb").kind(), TokenKind::Instruction);
        assert_eq!(scan("shrw").kind(), TokenKind::Instruction);
        assert_eq!(scan("halt").kind(), TokenKind::Instruction);

        // The no-operand and jump groups take no size suffix.
        assert_eq!(scan("haltb").kind(), TokenKind::Symbol(Prefix::None));
        assert_eq!(scan("jmpw").kind(), TokenKind::Symbol(Prefix::None));
    }

    #[test]
    fn test_prefixes() {
        assert_eq!(scan("$12").kind(), TokenKind::Decimal(Prefix::Immediate));
        assert_eq!(scan("*0x1f").kind(), TokenKind::Hexadecimal(Prefix::Asterisk));
        assert_eq!(scan("$start").kind(), TokenKind::Symbol(Prefix::Immediate));
        assert_eq!(scan("*start").kind(), TokenKind::Symbol(Prefix::Asterisk));

        // Prefixes on non-value kinds are a parse error.
        assert!(Token::scan("$%r3", 1).is_err());
        assert!(Token::scan("*lab:", 1).is_err());
    }

    #[test]
    fn test_register_aliases() {
        assert_eq!(scan("%sp").value(), "%r6");
        assert_eq!(scan("%pc").value(), "%r7");
        assert_eq!(scan("%psw").value(), "%r15");
        assert_eq!(scan("%pc").kind(), TokenKind::RegisterDirect);
        assert_eq!(scan("buffer(%pc)").kind(), TokenKind::PcRelative);
        assert_eq!(scan("buffer(%pc)").value(), "buffer(%r7)");
    }

    #[test]
    fn test_addressing_forms() {
        assert_eq!(scan("%r3h").kind(), TokenKind::RegisterDirect);
        assert_eq!(scan("(%r4)").kind(), TokenKind::RegisterIndirect);
        assert_eq!(scan("12(%r4)").kind(), TokenKind::RegisterIndirect);
        assert_eq!(scan("0x1f(%r4)").kind(), TokenKind::RegisterIndirect);
        assert_eq!(scan("table(%r4)").kind(), TokenKind::RegisterIndirect);
        assert_eq!(scan("table(%r7)").kind(), TokenKind::PcRelative);

        // Only registers 0-7 and 15 exist.
        assert!(Token::scan("%r9", 1).is_err());
    }

    #[test]
    fn test_arithmetic_expression_fallback() {
        let token = scan("a+b-3");

        assert_eq!(token.kind(), TokenKind::ArithmeticExpression);
        assert_eq!(token.value(), "a+b-3");

        // Pieces must be symbols or literals.
        assert!(Token::scan("a+(%r3)", 1).is_err());

        // The fallback is disabled for flat scans.
        assert!(Token::scan_flat("a+b-3", 1).is_err());
    }

    #[test]
    fn test_literal_values() {
        assert_eq!(scan("42").literal_value(), Some(42));
        assert_eq!(scan("-7").literal_value(), Some(-7));
        assert_eq!(scan("+7").literal_value(), Some(7));
        assert_eq!(scan("0x2a").literal_value(), Some(0x2a));
        assert_eq!(scan("start").literal_value(), None);
    }
}

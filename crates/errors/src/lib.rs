//! `rivet_errors` declares the human-understandable errors of the `rivet`
//! assembler, along with diagnostics.
//!
//! Every fatal condition the assembly pipeline can hit lives in the single
//! [`AssemblyError`] enum, which implements [`std::error::Error`] via
//! [`thiserror::Error`] and [`miette::Diagnostic`]. Variants that belong to a
//! documented error category carry a code, e.g. `E005`, which can be used to
//! further explain an error with `assembler --explain E005`, à la `rustc`.
//! The detailed diagnostics are Markdown files compiled into the
//! `DIAGNOSTICS` registry, available behind the `diagnostics` feature.

#![deny(unused)]
#![deny(warnings)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

mod error_codes;

#[cfg(feature = "diagnostics")]
pub use error_codes::DIAGNOSTICS;
pub use miette::Result;
use miette::Diagnostic;
use thiserror::Error;

/// A fatal assembly diagnostic.
///
/// The variants group into the five categories of the assembler's error
/// taxonomy — lexical, structural, semantic, expression, resolution — plus
/// the I/O failures of the thin file-handling shell. Message wording for the
/// long-standing diagnostics is kept stable because scripts grep for it.
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum AssemblyError {
    // Lexical.
    /// A lexeme matched none of the token patterns.
    #[error("Line {line}: unable to parse '{lexeme}'.")]
    #[diagnostic(
        code(E002),
        help("Check the lexeme against the instruction set and directive list; remember that `$` and `*` prefixes are only valid on symbols and literals.")
    )]
    UnparsableLexeme {
        /// The offending lexeme, after alias rewriting.
        lexeme: String,
        /// 1-based source line.
        line: u64,
    },

    // Structural.
    /// A label appeared before the first `.section`.
    #[error("Line {line}: label '{name}' is defined outside of any section.")]
    #[diagnostic(code(E003), help("Open a section first: `.section <name>`."))]
    LabelOutsideSection {
        /// The label name.
        name: String,
        /// 1-based source line.
        line: u64,
    },

    /// A label was defined twice.
    #[error("Line {line}: label '{name}' is already defined.")]
    #[diagnostic(code(E003), help("Every label defines its symbol exactly once."))]
    LabelRedefined {
        /// The label name.
        name: String,
        /// 1-based source line.
        line: u64,
    },

    /// Something other than a statement head followed a label.
    #[error("Line {line}: incorrect syntax after label '{name}'.")]
    #[diagnostic(code(E003), help("A label may stand alone or precede a directive or an instruction."))]
    SyntaxAfterLabel {
        /// The label name.
        name: String,
        /// 1-based source line.
        line: u64,
    },

    /// A directive appeared before the first `.section`.
    #[error("Line {line}: directive '{directive}' is defined outside of any section.")]
    #[diagnostic(code(E003), help("Open a section first: `.section <name>`."))]
    DirectiveOutsideSection {
        /// The directive text, e.g. `.byte`.
        directive: String,
        /// 1-based source line.
        line: u64,
    },

    /// An instruction appeared before the first `.section`.
    #[error("Line {line}: instruction '{mnemonic}' is defined outside of any section.")]
    #[diagnostic(code(E003), help("Open a section first: `.section <name>`."))]
    InstructionOutsideSection {
        /// The mnemonic as written.
        mnemonic: String,
        /// 1-based source line.
        line: u64,
    },

    /// The first token of a line cannot start a statement.
    #[error("Line {line}: '{lexeme}' cannot start a statement.")]
    #[diagnostic(
        code(E003),
        help("A statement starts with an optional label followed by a directive, an instruction, `.section`, `.global`, `.extern`, or `.end`.")
    )]
    UnexpectedLineHead {
        /// The offending lexeme.
        lexeme: String,
        /// 1-based source line.
        line: u64,
    },

    /// `.section` without a name operand.
    #[error("Line {line}: directive '.section' should be followed by the name of the new section.")]
    #[diagnostic(code(E003))]
    MissingSectionName {
        /// 1-based source line.
        line: u64,
    },

    /// Extra tokens after a complete `.section` statement.
    #[error("Line {line}: incorrect syntax.")]
    #[diagnostic(code(E003))]
    TrailingTokens {
        /// 1-based source line.
        line: u64,
    },

    /// `.global`/`.extern` with a non-symbol operand (or none at all).
    #[error("Line {line}: directive '{directive}' should be followed by a symbol or a list of symbols.")]
    #[diagnostic(code(E003))]
    ExpectedSymbolList {
        /// The access modifier text.
        directive: String,
        /// 1-based source line.
        line: u64,
    },

    /// `.byte`/`.word` with a non-data operand (or none at all).
    #[error("Line {line}: directive '{directive}' should be followed by a literal or symbol, or a list of literals and symbols.")]
    #[diagnostic(code(E003))]
    ExpectedDataOperand {
        /// The directive text.
        directive: String,
        /// 1-based source line.
        line: u64,
    },

    /// `.skip` with a non-literal operand.
    #[error("Line {line}: directive '.skip' should be followed by a literal.")]
    #[diagnostic(code(E003))]
    ExpectedSkipLiteral {
        /// 1-based source line.
        line: u64,
    },

    /// `.equ` whose first operand is not a plain symbol.
    #[error("Line {line}: directive '.equ' requires a symbol as its first operand.")]
    #[diagnostic(code(E003))]
    ExpectedEquSymbol {
        /// 1-based source line.
        line: u64,
    },

    /// Symbol-table name collision.
    #[error("Symbol '{name}' is already declared.")]
    #[diagnostic(code(E003))]
    DuplicateSymbol {
        /// The colliding name.
        name: String,
    },

    /// Section-table name collision.
    #[error("Section '{name}' is already declared.")]
    #[diagnostic(code(E003))]
    DuplicateSection {
        /// The colliding name.
        name: String,
    },

    /// TNS-table name collision.
    #[error("TNS symbol '{name}' is already declared.")]
    #[diagnostic(code(E003))]
    DuplicateTnsSymbol {
        /// The colliding name.
        name: String,
    },

    // Semantic.
    /// Unknown mnemonic after suffix stripping.
    #[error("Line {line}: instruction '{mnemonic}' does not exist.")]
    #[diagnostic(code(E004))]
    UnknownInstruction {
        /// The stripped mnemonic.
        mnemonic: String,
        /// 1-based source line.
        line: u64,
    },

    /// Operand count differs from the instruction table.
    #[error("Line {line}: wrong number of operands in instruction '{mnemonic}'.")]
    #[diagnostic(code(E004))]
    WrongOperandCount {
        /// The stripped mnemonic.
        mnemonic: String,
        /// 1-based source line.
        line: u64,
    },

    /// `%r15` used with register-indirect addressing.
    #[error("Line {line}: using the PSW register in indirect addressing mode is not allowed.")]
    #[diagnostic(code(E004))]
    PswIndirect {
        /// 1-based source line.
        line: u64,
    },

    /// `%r15` used as a destination operand.
    #[error("Line {line}: writing to the PSW register is not allowed.")]
    #[diagnostic(code(E004))]
    PswDestination {
        /// 1-based source line.
        line: u64,
    },

    /// Byte-sized register-direct operand without an `h`/`l` suffix.
    #[error("Line {line}: specify which byte of the register you want to use ('h' or 'l').")]
    #[diagnostic(code(E004))]
    MissingByteSelector {
        /// 1-based source line.
        line: u64,
    },

    /// Word-sized register-direct operand with an `h`/`l` suffix.
    #[error("Line {line}: word-sized operands must not select a single register byte.")]
    #[diagnostic(code(E004))]
    ForbiddenByteSelector {
        /// 1-based source line.
        line: u64,
    },

    /// Immediate operand in destination position.
    #[error("Line {line}: an immediate value is specified as the destination operand.")]
    #[diagnostic(code(E004))]
    ImmediateDestination {
        /// 1-based source line.
        line: u64,
    },

    /// Operand kind that no addressing mode covers.
    #[error("Line {line}: non-existent addressing mode.")]
    #[diagnostic(code(E004))]
    NonExistentAddressing {
        /// 1-based source line.
        line: u64,
    },

    // Expression.
    /// Infix-to-postfix conversion produced a rank other than 1.
    #[error("Can't process arithmetic expression")]
    #[diagnostic(
        code(E005),
        help("`.equ` expressions support only `+` and `-` over literals and symbols, without parentheses.")
    )]
    MalformedExpression,

    /// Postfix evaluation left more than one operand behind.
    #[error("Can't process given postfix expression.")]
    #[diagnostic(code(E005))]
    MalformedPostfix,

    /// An expression operand names a symbol missing from the table.
    #[error("Symbol is not found in symbol table when calculating symbol value")]
    #[diagnostic(code(E005))]
    SymbolNotFound,

    /// A `.equ` expression uses a name the resolver has never seen.
    #[error("Symbol '{name}' is used in .equ directive, but is not defined")]
    #[diagnostic(code(E005))]
    EquSymbolUndeclared {
        /// The unknown name.
        name: String,
    },

    /// Signed per-section occurrence counts violate the classification rule.
    #[error("Incorrect classification index for symbol '{name}'")]
    #[diagnostic(
        code(E005),
        help("Per section, symbol occurrences in a `.equ` expression must cancel out, or leave +1 in at most one section.")
    )]
    ClassificationIndex {
        /// The `.equ` symbol being defined.
        name: String,
    },

    // Resolution.
    /// `.global` names a symbol that was never defined.
    #[error("Symbol '{name}' is declared as global, but isn't defined")]
    #[diagnostic(code(E006))]
    GlobalUndefined {
        /// The pending global name.
        name: String,
    },

    /// `.extern` names a symbol this unit defines.
    #[error("Symbol '{name}' is declared as extern, but is defined")]
    #[diagnostic(code(E006))]
    ExternDefined {
        /// The pending extern name.
        name: String,
    },

    /// Backpatching found a reference to an unresolved symbol.
    #[error("Unsuccessful backpatching - symbol '{name}' is not defined.")]
    #[diagnostic(code(E006))]
    BackpatchUndefined {
        /// The referenced name.
        name: String,
    },

    /// The TNS fixed point made a full pass without resolving anything.
    #[error("Possible circular dependency between TNS symbols")]
    #[diagnostic(
        code(E006),
        help("Each `.equ` symbol must be reducible to a literal through a finite chain of already-resolved symbols.")
    )]
    CircularTns,

    // I/O shell.
    /// The input or output file could not be used.
    #[error("Cannot access '{path}': {source}")]
    #[diagnostic(code(E007))]
    Io {
        /// The file path as given on the command line.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The given error code is unknown to `--explain`.
    #[error("`{0}` is not a valid error code.")]
    #[diagnostic(
        code(E000),
        help("Did you mistype the error code? The pattern is `E[0-9]{{3}}`, i.e. an `E` followed by 3 digits, such as `E000`.")
    )]
    InvalidCode(String),
}

impl AssemblyError {
    /// Given a specific error code, returns the associated diagnostic, if the
    /// code exists.
    ///
    /// ```
    /// use rivet_errors::AssemblyError;
    ///
    /// # fn main() {
    /// // Explain a valid error.
    /// assert!(AssemblyError::explain("E005").is_ok());
    ///
    /// // Explain an invalid error.
    /// assert!(AssemblyError::explain("oops").is_err());
    /// # }
    /// ```
    #[cfg(feature = "diagnostics")]
    pub fn explain(error_code: &str) -> Result<&'static str, Self> {
        DIAGNOSTICS
            .iter()
            .find_map(
                |(current_error_code, diagnostic)| {
                    if *current_error_code == error_code {
                        Some(*diagnostic)
                    } else {
                        None
                    }
                },
            )
            .ok_or_else(|| Self::InvalidCode(error_code.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use miette::Diagnostic;

    use super::*;

    #[test]
    fn test_message_stability() {
        assert_eq!(
            AssemblyError::CircularTns.to_string(),
            "Possible circular dependency between TNS symbols"
        );
        assert_eq!(
            AssemblyError::MalformedExpression.to_string(),
            "Can't process arithmetic expression"
        );
        assert_eq!(
            AssemblyError::DuplicateSymbol { name: "x".to_string() }.to_string(),
            "Symbol 'x' is already declared."
        );
        assert_eq!(
            AssemblyError::BackpatchUndefined { name: "far".to_string() }.to_string(),
            "Unsuccessful backpatching - symbol 'far' is not defined."
        );
    }

    #[test]
    fn test_codes() {
        let code = |error: &AssemblyError| error.code().map(|code| code.to_string());

        assert_eq!(
            code(&AssemblyError::UnparsableLexeme { lexeme: "?".to_string(), line: 1 }),
            Some("E002".to_string())
        );
        assert_eq!(code(&AssemblyError::CircularTns), Some("E006".to_string()));
    }

    #[cfg(feature = "diagnostics")]
    #[test]
    fn test_explain() {
        assert!(AssemblyError::explain("E000").is_ok());
        assert!(AssemblyError::explain("E999").is_err());
    }
}

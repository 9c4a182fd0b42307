//! The `+`/`-` expression engine behind the `.equ` directive.
//!
//! Expressions go through three stages: [`tokenize`] splits the raw text
//! into operand and operator tokens, [`to_postfix`] produces the
//! left-associative postfix form, and [`evaluate`] reduces it against the
//! symbol table.

use rivet_errors::AssemblyError;
use rivet_object::{Scope, SymbolTable};

use crate::token::{Prefix, Token, TokenKind};

/// Why an evaluation could not produce a value.
///
/// `NotYetDefined` is the one recoverable case: the TNS fixed point keeps
/// retrying the entry until the missing symbol gains a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EvalError {
    /// An operand names a symbol missing from the table.
    NotFound,
    /// An operand names a symbol whose value is not final yet.
    NotYetDefined,
    /// The postfix stream did not reduce to exactly one value.
    Malformed,
}

impl From<EvalError> for AssemblyError {
    fn from(error: EvalError) -> Self {
        match error {
            EvalError::NotFound | EvalError::NotYetDefined => Self::SymbolNotFound,
            EvalError::Malformed => Self::MalformedPostfix,
        }
    }
}

fn is_operator(character: char) -> bool {
    character == '+' || character == '-'
}

/// One expression operand or operator, validated.
fn expression_token(text: &str, line: u64) -> Result<Token, AssemblyError> {
    let token = Token::scan(text, line)?;

    if token.kind() == TokenKind::ArithmeticOperator || token.is_expression_piece() {
        return Ok(token);
    }

    Err(AssemblyError::MalformedExpression)
}

/// Splits an expression text into an alternating operand/operator stream.
///
/// A leading operator synthesizes a `0` so `-x` reads as `0 - x`; a single
/// bare operand is padded with `+ 0` so the postfix form is never shorter
/// than three tokens.
pub(crate) fn tokenize(expression: &str, line: u64) -> Result<Vec<Token>, AssemblyError> {
    let mut result = Vec::new();
    let mut buffer = String::new();

    if expression.starts_with(is_operator) {
        result.push(Token::new(TokenKind::Decimal(Prefix::None), "0"));
    }

    for character in expression.chars() {
        if is_operator(character) {
            if !buffer.is_empty() {
                result.push(expression_token(&buffer, line)?);
            }

            result.push(expression_token(&character.to_string(), line)?);
            buffer.clear();
        } else {
            buffer.push(character);
        }
    }

    if !buffer.is_empty() {
        result.push(expression_token(&buffer, line)?);
    }

    if result.len() == 1 {
        result.push(Token::new(TokenKind::ArithmeticOperator, "+"));
        result.push(Token::new(TokenKind::Decimal(Prefix::None), "0"));
    }

    Ok(result)
}

/// Converts an infix token stream into left-associative postfix.
///
/// Operands move straight to the output; after each one, a single pending
/// operator is popped after it. The operand/operator rank of the output
/// must land on exactly 1.
pub(crate) fn to_postfix(input: Vec<Token>) -> Result<Vec<Token>, AssemblyError> {
    let mut result = Vec::new();
    let mut stack: Vec<Token> = Vec::new();
    let mut rank = 0i64;

    for next in input {
        if next.kind() != TokenKind::ArithmeticOperator {
            result.push(next);
            rank += 1;

            if let Some(operator) = stack.pop() {
                result.push(operator);
                rank -= 1;
            }
        } else {
            stack.push(next);
        }
    }

    if rank != 1 {
        return Err(AssemblyError::MalformedExpression);
    }

    Ok(result)
}

/// Reduces a postfix stream to a single value.
///
/// Literals resolve by radix, symbols through the table. Arithmetic wraps;
/// the caller truncates to the 16-bit value domain.
pub(crate) fn evaluate(postfix: &[Token], symbols: &SymbolTable) -> Result<i64, EvalError> {
    let mut stack: Vec<i64> = Vec::new();

    for token in postfix {
        match token.kind() {
            TokenKind::ArithmeticOperator => {
                let second = stack.pop().ok_or(EvalError::Malformed)?;
                let first = stack.pop().ok_or(EvalError::Malformed)?;

                stack.push(if token.value() == "-" {
                    first.wrapping_sub(second)
                } else {
                    first.wrapping_add(second)
                });
            }

            TokenKind::Symbol(Prefix::None | Prefix::Immediate) => {
                let entry = symbols.get_by_name(token.value()).ok_or(EvalError::NotFound)?;

                if matches!(entry.scope, Scope::Local | Scope::Global) && !entry.defined {
                    return Err(EvalError::NotYetDefined);
                }

                stack.push(i64::from(entry.value));
            }

            TokenKind::Decimal(_) | TokenKind::Hexadecimal(_) => {
                stack.push(token.literal_value().ok_or(EvalError::Malformed)?);
            }

            _ => {}
        }
    }

    let result = stack.pop().ok_or(EvalError::Malformed)?;

    if stack.is_empty() {
        Ok(result)
    } else {
        Err(EvalError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expression: &str, symbols: &SymbolTable) -> Result<i64, EvalError> {
        let tokens = tokenize(expression, 1).unwrap();
        let postfix = to_postfix(tokens).unwrap();

        evaluate(&postfix, symbols)
    }

    #[test]
    fn test_tokenize_pads_single_operand() {
        let tokens = tokenize("5", 1).unwrap();

        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].kind(), TokenKind::ArithmeticOperator);
        assert_eq!(tokens[2].value(), "0");
    }

    #[test]
    fn test_tokenize_synthesizes_zero_for_unary() {
        let tokens = tokenize("-x", 1).unwrap();

        assert_eq!(tokens[0].value(), "0");
        assert_eq!(tokens[1].kind(), TokenKind::ArithmeticOperator);
        assert_eq!(tokens[2].value(), "x");
    }

    #[test]
    fn test_literal_chains() {
        let symbols = SymbolTable::new();

        assert_eq!(eval("5", &symbols), Ok(5));
        assert_eq!(eval("5+3-2", &symbols), Ok(6));
        assert_eq!(eval("-4+0x10", &symbols), Ok(12));
        assert_eq!(eval("0x10-0x1", &symbols), Ok(15));
    }

    #[test]
    fn test_symbols_resolve_through_the_table() {
        let mut symbols = SymbolTable::new();
        symbols.insert("base", 1, 0x10, Scope::Local, true).unwrap();
        symbols.insert("off", 1, 2, Scope::Local, true).unwrap();

        assert_eq!(eval("base+off", &symbols), Ok(0x12));
        assert_eq!(eval("base-off", &symbols), Ok(0xe));
    }

    #[test]
    fn test_missing_and_pending_symbols() {
        let mut symbols = SymbolTable::new();
        symbols.insert("pending", 1, 0, Scope::Local, false).unwrap();
        symbols.insert("ext", 0, 0, Scope::Extern, false).unwrap();

        assert_eq!(eval("ghost+1", &symbols), Err(EvalError::NotFound));
        assert_eq!(eval("pending+1", &symbols), Err(EvalError::NotYetDefined));

        // Externals evaluate as their stored placeholder value.
        assert_eq!(eval("ext+1", &symbols), Ok(1));
    }

    #[test]
    fn test_rank_check_rejects_operator_runs() {
        let tokens = tokenize("1+2", 1).unwrap();
        let mut bad = tokens.clone();
        bad.push(Token::new(TokenKind::Decimal(Prefix::None), "9"));

        assert!(to_postfix(bad).is_err());
        assert!(to_postfix(tokens).is_ok());
    }

    #[test]
    fn test_rejects_foreign_tokens() {
        assert!(tokenize("(%r3)+1", 1).is_err());
    }
}

//! `rivet-assembler` contains the assembly pipeline for the 16-bit
//! educational architecture: the token scanner, the `.equ` arithmetic
//! engine, the single-pass encoder, and the resolver/backpatcher.
//!
//! The pipeline runs over one source text in a fixed order. The one-and-only
//! pass tokenizes each line, maintains the current section and its location
//! counter, emits machine bytes, and defers every symbol-valued operand into
//! a reference log. Afterwards the resolver promotes pending `.global`/
//! `.extern` scopes, evaluates deferred `.equ` definitions to a fixed point,
//! and finally walks the reference log to write the real bytes and the
//! relocation table.

#![deny(unused)]
#![deny(warnings)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

mod arithmetic;
mod assembler;
mod configuration;
mod instruction;
mod resolver;
mod token;

pub use assembler::*;
pub use configuration::*;
pub use token::{Prefix, Token, TokenKind};

//! End-to-end runs of the whole pipeline over literal source texts.

use rivet_assembler::Assembler;
use rivet_errors::AssemblyError;
use rivet_object::{RelocationKind, Scope};

fn assemble(source: &str) -> Assembler {
    let mut assembler = Assembler::new();
    assembler.assemble(source).expect("source should assemble");

    assembler
}

fn assemble_err(source: &str) -> AssemblyError {
    let mut assembler = Assembler::new();

    assembler.assemble(source).expect_err("source should be rejected")
}

#[test]
fn test_empty_section_boundary() {
    let assembler = assemble(".section a\n.end");

    let names: Vec<&str> =
        assembler.symbol_table().iter().map(|entry| entry.name.as_str()).collect();

    assert_eq!(names, vec!["UND", "a"]);

    let section = assembler.section_table().get_by_name("a").unwrap();

    assert_eq!(section.length, 0);
    assert_eq!(assembler.relocation_table().len(), 0);
    assert_eq!(assembler.machine_code(section.id), None);
}

#[test]
fn test_byte_directive_with_literal() {
    let assembler = assemble(".section t\nx: .byte 0x2a\n.end");

    let section = assembler.section_table().get_by_name("t").unwrap();

    assert_eq!(section.length, 1);
    assert_eq!(assembler.machine_code(section.id), Some(&[0x2a][..]));

    let x = assembler.symbol_table().get_by_name("x").unwrap();

    assert_eq!(x.value, 0);
    assert_eq!(x.section, section.id);
    assert!(x.defined);
    assert_eq!(x.scope, Scope::Local);
}

#[test]
fn test_forward_word_reference_folds_within_a_section() {
    let assembler = assemble(".section t\n.word y\ny: .byte 1\n.end");

    let section = assembler.section_table().get_by_name("t").unwrap();

    assert_eq!(section.length, 3);
    assert_eq!(assembler.machine_code(section.id), Some(&[0x02, 0x00, 0x01][..]));
    assert_eq!(assembler.relocation_table().len(), 0);
}

#[test]
fn test_cross_section_word_relocates_against_the_section_symbol() {
    let assembler = assemble(".section a\nlab: .byte 0\n.section b\n.word lab\n.end");

    let a = assembler.section_table().get_by_name("a").unwrap();
    let b = assembler.section_table().get_by_name("b").unwrap();

    assert_eq!(assembler.machine_code(b.id), Some(&[0x00, 0x00][..]));

    let relocations: Vec<_> = assembler.relocation_table().iter().collect();

    assert_eq!(relocations.len(), 1);
    assert_eq!(relocations[0].section, b.id);
    assert_eq!(relocations[0].offset, 0);
    assert_eq!(relocations[0].kind, RelocationKind::Absolute16);
    assert_eq!(relocations[0].value, a.symbol);
}

#[test]
fn test_jump_to_extern_through_memory_direct() {
    let assembler = assemble(".extern foo\n.section t\njmp *foo\n.end");

    let section = assembler.section_table().get_by_name("t").unwrap();

    assert_eq!(
        assembler.machine_code(section.id),
        Some(&[0x2c, 0x80, 0x00, 0x00][..])
    );

    let foo = assembler.symbol_table().get_by_name("foo").unwrap();

    assert_eq!(foo.scope, Scope::Extern);
    assert_eq!(foo.section, 0);
    assert!(!foo.defined);

    let relocations: Vec<_> = assembler.relocation_table().iter().collect();

    assert_eq!(relocations.len(), 1);
    assert_eq!(relocations[0].kind, RelocationKind::Absolute16);
    assert_eq!(relocations[0].value, foo.id);
}

#[test]
fn test_mutually_recursive_equ_definitions() {
    let error = assemble_err(".section t\n.equ a, b+1\n.equ b, a+1\n.end");

    assert!(matches!(error, AssemblyError::CircularTns));
    assert_eq!(error.to_string(), "Possible circular dependency between TNS symbols");
}

#[test]
fn test_equ_chains_resolve_to_a_fixed_point() {
    let assembler = assemble(
        ".section t\n\
         base: .word 0\n\
         .equ second, first+2\n\
         .equ first, base+1\n\
         .end",
    );

    let first = assembler.symbol_table().get_by_name("first").unwrap();
    let second = assembler.symbol_table().get_by_name("second").unwrap();

    assert!(first.defined);
    assert!(second.defined);
    assert_eq!(first.value, 1);
    assert_eq!(second.value, 3);
}

#[test]
fn test_equ_with_literal_expression_resolves_immediately() {
    let assembler = assemble(".section t\n.equ answer, 0x2a-2+4\n.end");

    let answer = assembler.symbol_table().get_by_name("answer").unwrap();

    assert!(answer.defined);
    assert_eq!(answer.value, 0x2c);
}

#[test]
fn test_equ_over_an_extern_promotes_the_scope() {
    let assembler = assemble(".extern base\n.section t\n.equ derived, base+4\n.end");

    let derived = assembler.symbol_table().get_by_name("derived").unwrap();

    assert!(derived.defined);
    assert_eq!(derived.scope, Scope::Extern);
    assert_eq!(derived.value, 4);
}

#[test]
fn test_classification_index_rejects_double_counts() {
    let error = assemble_err(
        ".section t\n\
         x: .byte 0\n\
         y: .byte 0\n\
         .equ bad, x+y\n\
         .end",
    );

    assert_eq!(error.to_string(), "Incorrect classification index for symbol 'bad'");
}

#[test]
fn test_classification_index_accepts_differences() {
    let assembler = assemble(
        ".section t\n\
         x: .byte 0\n\
         y: .byte 0\n\
         .equ span, y-x\n\
         .end",
    );

    let span = assembler.symbol_table().get_by_name("span").unwrap();

    assert!(span.defined);
    assert_eq!(span.value, 1);
}

#[test]
fn test_pc_relative_reference_folds_within_a_section() {
    let assembler = assemble(".section t\nstart: mov start(%r7), %r1\n.end");

    let section = assembler.section_table().get_by_name("t").unwrap();

    // `start` sits at 0 and the instruction ends at 5.
    assert_eq!(
        assembler.machine_code(section.id),
        Some(&[0x64, 0x6e, 0xfb, 0xff, 0x22][..])
    );
    assert_eq!(assembler.relocation_table().len(), 0);
}

#[test]
fn test_pc_relative_reference_to_an_extern() {
    let assembler = assemble(".extern far\n.section t\nmov far(%r7), %r1\n.end");

    let section = assembler.section_table().get_by_name("t").unwrap();

    // The displacement pre-bias is -2.
    assert_eq!(
        assembler.machine_code(section.id),
        Some(&[0x64, 0x6e, 0xfe, 0xff, 0x22][..])
    );

    let far = assembler.symbol_table().get_by_name("far").unwrap();
    let relocations: Vec<_> = assembler.relocation_table().iter().collect();

    assert_eq!(relocations.len(), 1);
    assert_eq!(relocations[0].kind, RelocationKind::PcRelative16);
    assert_eq!(relocations[0].offset, 2);
    assert_eq!(relocations[0].value, far.id);
}

#[test]
fn test_global_promotion() {
    let assembler = assemble(".global entry\n.section t\nentry: halt\n.end");

    let entry = assembler.symbol_table().get_by_name("entry").unwrap();

    assert_eq!(entry.scope, Scope::Global);
    assert!(entry.defined);
}

#[test]
fn test_global_reference_keeps_a_zero_placeholder() {
    let assembler = assemble(".global entry\n.section t\nentry: halt\n.word entry\n.end");

    let section = assembler.section_table().get_by_name("t").unwrap();
    let entry = assembler.symbol_table().get_by_name("entry").unwrap();

    // GLOBAL targets patch to zero and relocate against the symbol itself.
    assert_eq!(assembler.machine_code(section.id), Some(&[0x04, 0x00, 0x00][..]));

    let relocations: Vec<_> = assembler.relocation_table().iter().collect();

    assert_eq!(relocations.len(), 1);
    assert_eq!(relocations[0].value, entry.id);
}

#[test]
fn test_skip_emits_zeroes() {
    let assembler = assemble(".section t\n.skip 3\n.byte 1\n.end");

    let section = assembler.section_table().get_by_name("t").unwrap();

    assert_eq!(section.length, 4);
    assert_eq!(assembler.machine_code(section.id), Some(&[0x00, 0x00, 0x00, 0x01][..]));
}

#[test]
fn test_section_length_matches_emitted_bytes() {
    let assembler = assemble(
        ".section code\n\
         mov $0x10, %r1\n\
         push %r1\n\
         .section data\n\
         .word 0x1234, 7\n\
         .byte 1, 2, 3\n\
         .end",
    );

    for section in assembler.section_table().iter().skip(1) {
        let bytes = assembler.machine_code(section.id).unwrap_or(&[]);

        assert_eq!(bytes.len(), section.length, "section '{}'", section.name);
    }
}

#[test]
fn test_error_taxonomy() {
    // Structural.
    assert!(matches!(
        assemble_err("x: .byte 1\n.end"),
        AssemblyError::LabelOutsideSection { .. }
    ));
    assert!(matches!(
        assemble_err(".byte 1\n.end"),
        AssemblyError::DirectiveOutsideSection { .. }
    ));
    assert!(matches!(
        assemble_err(".section t\nx: halt\nx: halt\n.end"),
        AssemblyError::LabelRedefined { .. }
    ));
    assert!(matches!(
        assemble_err(".section t\n.section t\n.end"),
        AssemblyError::DuplicateSection { .. }
    ));

    // Lexical.
    assert!(matches!(
        assemble_err(".section t\nmov ?, %r1\n.end"),
        AssemblyError::UnparsableLexeme { .. }
    ));

    // Semantic.
    assert!(matches!(
        assemble_err(".section t\nmov %r1\n.end"),
        AssemblyError::WrongOperandCount { .. }
    ));
    assert!(matches!(
        assemble_err(".section t\nmov %r1, $4\n.end"),
        AssemblyError::ImmediateDestination { .. }
    ));

    // Resolution.
    assert!(matches!(
        assemble_err(".global ghost\n.section t\nhalt\n.end"),
        AssemblyError::GlobalUndefined { .. }
    ));
    assert!(matches!(
        assemble_err(".extern here\n.section t\nhere: halt\n.end"),
        AssemblyError::ExternDefined { .. }
    ));
    assert!(matches!(
        assemble_err(".section t\njmp nowhere\n.end"),
        AssemblyError::BackpatchUndefined { .. }
    ));
}

#[test]
fn test_case_is_folded_before_tokenization() {
    let assembler = assemble(".SECTION T\nX: .BYTE 0x2A\n.END");

    assert!(assembler.section_table().get_by_name("t").is_some());
    assert!(assembler.symbol_table().get_by_name("x").is_some());
}

#[test]
fn test_listing_layout() {
    let assembler = assemble(".section a\n.end");

    let mut buffer = Vec::new();
    assembler.write_listing(&mut buffer).unwrap();

    let listing = String::from_utf8(buffer).unwrap();

    assert_eq!(
        listing,
        "<--Symbol table-->\n\
         EntryNumber    Name           SectionNumber  Value          Scope          \n\
         0              UND            0              0              EXTERN         \n\
         1              a              1              0              LOCAL          \n\
         \n\
         \n\
         <--Section table-->\n\
         EntryNumber    Name           Length         SymbolEntryNumber\n\
         0              UND            0              0              \n\
         1              a              0              1              \n\
         \n\
         \n"
    );
}

#[test]
fn test_listing_renders_bytes_eight_per_line() {
    let assembler = assemble(".section t\n.byte 1, 2, 3, 4, 5, 6, 7, 8, 9\n.end");

    let mut buffer = Vec::new();
    assembler.write_listing(&mut buffer).unwrap();

    let listing = String::from_utf8(buffer).unwrap();

    assert!(listing.contains("<--Section 't'-->"));
    assert!(listing.contains("01 02 03 04 05 06 07 08\n09 "));
}

#[test]
fn test_round_trip_of_backward_references() {
    // With every symbol defined before use, backpatched bytes equal the
    // bytes of a literal substitution.
    let patched = assemble(".section t\n.skip 2\ny: .byte 1\n.word y\n.end");
    let literal = assemble(".section t\n.skip 2\ny: .byte 1\n.word 2\n.end");

    let section = patched.section_table().get_by_name("t").unwrap().id;

    assert_eq!(patched.machine_code(section), literal.machine_code(section));
}

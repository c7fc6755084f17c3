//! Mica compiler library.
//!
//! A single-pass front-end for the Mica language: a lexer over a
//! preprocessed text stream, a recursive-descent parser that types the
//! AST as it builds it, and a code generator that writes QBE IR straight
//! to the output sink. Any error is fatal; compilation stops at the
//! first diagnostic.
//!
//! ```no_run
//! use micac::{compile_source, DumpFlags};
//!
//! let ir = compile_source(
//!     "void main(void) { printf(\"%d\\n\", 42); }",
//!     "example.mc",
//!     Vec::new(),
//!     None,
//!     DumpFlags::default(),
//! )?;
//! # Ok::<(), micac::CompileError>(())
//! ```

pub mod ast;
pub mod codegen;
pub mod errors;
pub mod lexer;
pub mod parser;
pub mod symtab;
pub mod types;

pub use errors::{CompileError, Result};
pub use parser::Parser;

use std::io::Write;
use tracing::debug;

/// Which per-stage dumps go to the debug sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct DumpFlags {
    pub tokens: bool,
    pub syms: bool,
    pub ast: bool,
}

/// Compile one preprocessed source text into QBE IR written to `out`.
///
/// `filename` seeds diagnostic positions until the first linemark
/// overrides it. Returns the output sink once emission is complete.
pub fn compile_source<'a, W: Write>(
    source: &'a str,
    filename: &str,
    out: W,
    mut debug_out: Option<&'a mut dyn Write>,
    flags: DumpFlags,
) -> Result<W> {
    // The token dump is a separate pre-pass over the source.
    if flags.tokens
        && let Some(sink) = debug_out.as_deref_mut()
    {
        lexer::dump_tokens(source, filename, sink)?;
    }

    debug!(%filename, "compiling");
    let lex = lexer::Lexer::new(source, filename);
    let cg = codegen::CodeGen::new(out);
    let mut parser = Parser::new(lex, cg, flags, debug_out);
    parser.parse_file()?;
    Ok(parser.into_output())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str) -> String {
        let out = compile_source(source, "test.mc", Vec::new(), None, DumpFlags::default())
            .expect("compile");
        String::from_utf8(out).expect("utf8 IR")
    }

    #[test]
    fn test_functions_are_exported() {
        let ir = compile("void a(void) {} void b(void) {}");
        assert!(ir.contains("export function $a()"));
        assert!(ir.contains("export function $b()"));
    }

    #[test]
    fn test_every_body_closes_with_ret() {
        let ir = compile("void a(void) {} void b(void) { int32 x = 1; }");
        assert_eq!(ir.matches("@END\n  ret\n}").count(), 2);
    }

    #[test]
    fn test_labels_are_unique_across_compilation() {
        let ir = compile(
            "void a(int32 x) { if (x < 1) { x = 2; } while (x < 5) { x = x + 1; } \
             printf(\"%d\\n\", x); }",
        );
        let mut defined: Vec<&str> = ir
            .lines()
            .filter(|l| l.starts_with("@L") || l.starts_with("data $L"))
            .collect();
        let total = defined.len();
        defined.sort();
        defined.dedup();
        assert_eq!(defined.len(), total);
    }

    #[test]
    fn test_string_data_emitted_after_functions() {
        let ir = compile("void a(int32 x) { printf(\"done\\n\", x); }");
        let func = ir.find("export function").expect("function");
        let data = ir.find("data $L").expect("string data");
        assert!(data > func);
        assert!(ir.contains("b \"done\\n\", b 0"));
    }

    #[test]
    fn test_token_dump_goes_to_debug_sink() {
        let mut dump = Vec::new();
        let flags = DumpFlags {
            tokens: true,
            ..DumpFlags::default()
        };
        compile_source(
            "void f(void) {}",
            "test.mc",
            Vec::new(),
            Some(&mut dump),
            flags,
        )
        .unwrap();
        let text = String::from_utf8(dump).unwrap();
        assert!(text.starts_with("void\nident f\n(\nvoid\n)\n{\n}\n"));
    }

    #[test]
    fn test_symbol_dump_lists_functions() {
        let mut dump = Vec::new();
        let flags = DumpFlags {
            syms: true,
            ..DumpFlags::default()
        };
        compile_source(
            "void f(int32 a) { int32 x = 1; }",
            "test.mc",
            Vec::new(),
            Some(&mut dump),
            flags,
        )
        .unwrap();
        let text = String::from_utf8(dump).unwrap();
        assert!(text.contains("void f(int32 a);"));
        // The per-function dump sees the local while its scope is open.
        assert!(text.contains("int32 x"));
    }

    #[test]
    fn test_ast_dump_matches_traversal_order() {
        let mut dump = Vec::new();
        let flags = DumpFlags {
            ast: true,
            ..DumpFlags::default()
        };
        compile_source(
            "void f(void) { int32 x = 1; x = x + 2; }",
            "test.mc",
            Vec::new(),
            Some(&mut dump),
            flags,
        )
        .unwrap();
        let text = String::from_utf8(dump).unwrap();
        let local = text.find("LOCAL").expect("LOCAL node");
        let assign = text.find("ASSIGN").expect("ASSIGN node");
        assert!(local < assign);
        assert!(text.contains("NUMLIT 1"));
    }

    #[test]
    fn test_fatal_carries_file_and_line() {
        let err = compile_source(
            "void f(void) {\n  y = 1;\n}\n",
            "prog.mc",
            Vec::new(),
            None,
            DumpFlags::default(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "prog.mc line 2: Unknown variable y");
    }
}

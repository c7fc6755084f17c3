//! Abstract syntax tree nodes.
//!
//! The parser builds one tree per function body and hands it to the code
//! generator, which consumes it in a single pre-order walk. Nodes carry
//! their resolved type; see `types::add_type`.

use crate::symtab::SymRef;
use crate::types::{LitVal, Type};
use std::io::{self, Write};

/// The operation performed by an AST node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Op {
    Assign,
    Cast,
    Add,
    Subtract,
    Multiply,
    Divide,
    Negate,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Not,
    And,
    Or,
    Xor,
    Invert,
    Lshift,
    Rshift,
    NumLit,
    Ident,
    Print,
    #[default]
    Glue,
    If,
    While,
    For,
    Type,
    StrLit,
    Local,
    FuncCall,
}

impl Op {
    /// Relational comparisons and logical NOT produce a boolean.
    pub fn yields_bool(self) -> bool {
        matches!(
            self,
            Op::Eq | Op::Ne | Op::Lt | Op::Gt | Op::Le | Op::Ge | Op::Not
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(self, Op::Eq | Op::Ne | Op::Lt | Op::Gt | Op::Le | Op::Ge)
    }

    /// Name used by the AST dump.
    pub fn name(self) -> &'static str {
        match self {
            Op::Assign => "ASSIGN",
            Op::Cast => "CAST",
            Op::Add => "ADD",
            Op::Subtract => "SUBTRACT",
            Op::Multiply => "MULTIPLY",
            Op::Divide => "DIVIDE",
            Op::Negate => "NEGATE",
            Op::Eq => "EQ",
            Op::Ne => "NE",
            Op::Lt => "LT",
            Op::Gt => "GT",
            Op::Le => "LE",
            Op::Ge => "GE",
            Op::Not => "NOT",
            Op::And => "AND",
            Op::Or => "OR",
            Op::Xor => "XOR",
            Op::Invert => "INVERT",
            Op::Lshift => "LSHIFT",
            Op::Rshift => "RSHIFT",
            Op::NumLit => "NUMLIT",
            Op::Ident => "IDENT",
            Op::Print => "PRINT",
            Op::Glue => "GLUE",
            Op::If => "IF",
            Op::While => "WHILE",
            Op::For => "FOR",
            Op::Type => "TYPE",
            Op::StrLit => "STRLIT",
            Op::Local => "LOCAL",
            Op::FuncCall => "FUNCCALL",
        }
    }
}

/// A single AST node with up to three children.
///
/// `sym` is the resolved variable for IDENT/ASSIGN/LOCAL nodes (and the
/// callee for FUNCCALL); `name` holds identifier text before resolution,
/// string-literal values, and printf format strings.
#[derive(Debug, Default)]
pub struct AstNode {
    pub op: Op,
    pub ty: Option<Type>,
    pub rvalue: bool,
    pub left: Option<Box<AstNode>>,
    pub mid: Option<Box<AstNode>>,
    pub right: Option<Box<AstNode>>,
    pub sym: Option<SymRef>,
    pub lit: LitVal,
    pub name: Option<String>,
}

impl AstNode {
    /// Build an interior node.
    pub fn node(
        op: Op,
        left: Option<AstNode>,
        mid: Option<AstNode>,
        right: Option<AstNode>,
    ) -> AstNode {
        AstNode {
            op,
            left: left.map(Box::new),
            mid: mid.map(Box::new),
            right: right.map(Box::new),
            ..AstNode::default()
        }
    }

    /// Build a leaf node.
    pub fn leaf(op: Op, ty: Option<Type>, rvalue: bool, lit: LitVal) -> AstNode {
        AstNode {
            op,
            ty,
            rvalue,
            lit,
            ..AstNode::default()
        }
    }

    fn sym_name(&self) -> &str {
        self.sym.as_ref().map_or("?", |s| s.name.as_str())
    }

    /// Print the tree in the indented pre-order that the code generator
    /// traverses it.
    pub fn dump(&self, out: &mut dyn Write, level: usize) -> io::Result<()> {
        write!(out, "{:indent$}", "", indent = level)?;

        if let Some(ty) = self.ty {
            write!(out, "{} ", ty.name())?;
        }
        write!(out, "{} ", self.op.name())?;

        match self.op {
            Op::NumLit => {
                if self.ty.is_some_and(|t| t.is_float()) {
                    write!(out, "{}", self.lit.as_f64())?;
                } else {
                    write!(out, "{}", self.lit.as_i64())?;
                }
            }
            Op::Assign => write!(out, "{} = ", self.sym_name())?,
            Op::Local => write!(out, "{}", self.sym_name())?,
            Op::Ident => {
                if self.rvalue {
                    write!(out, "rval {}", self.sym_name())?;
                } else {
                    write!(out, "{}", self.sym_name())?;
                }
            }
            Op::Print | Op::FuncCall => {
                let label = self
                    .left
                    .as_deref()
                    .and_then(|l| l.name.as_deref())
                    .unwrap_or("");
                writeln!(out, "\"{}\"", label)?;
                if let Some(right) = self.right.as_deref() {
                    right.dump(out, level + 2)?;
                }
                return Ok(());
            }
            _ => {}
        }
        writeln!(out)?;

        // Chained declarations hang off the mid child; pull them back to
        // the parent's indent so the dump reads like the source.
        let level = if self.op == Op::Local {
            level.saturating_sub(2)
        } else {
            level
        };

        if let Some(left) = self.left.as_deref() {
            left.dump(out, level + 2)?;
        }
        if let Some(mid) = self.mid.as_deref() {
            mid.dump(out, level + 2)?;
        }
        if let Some(right) = self.right.as_deref() {
            right.dump(out, level + 2)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yields_bool_range() {
        for op in [Op::Eq, Op::Ne, Op::Lt, Op::Gt, Op::Le, Op::Ge, Op::Not] {
            assert!(op.yields_bool());
        }
        for op in [Op::Add, Op::And, Op::Invert, Op::Assign, Op::NumLit] {
            assert!(!op.yields_bool());
        }
    }

    #[test]
    fn test_dump_numlit_leaf() {
        let n = AstNode::leaf(
            Op::NumLit,
            Some(Type::Int8),
            true,
            LitVal::Int(42),
        );
        let mut out = Vec::new();
        n.dump(&mut out, 0).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "int8 NUMLIT 42\n");
    }

    #[test]
    fn test_dump_indents_children() {
        let lhs = AstNode::leaf(Op::NumLit, Some(Type::Int8), true, LitVal::Int(1));
        let rhs = AstNode::leaf(Op::NumLit, Some(Type::Int8), true, LitVal::Int(2));
        let mut add = AstNode::node(Op::Add, Some(lhs), None, Some(rhs));
        add.ty = Some(Type::Int8);
        let mut out = Vec::new();
        add.dump(&mut out, 0).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "int8 ADD \n  int8 NUMLIT 1\n  int8 NUMLIT 2\n"
        );
    }
}

//! Symbol table.
//!
//! A single flat list holds globals and the locals of the one active
//! function scope. Entering a function records a watermark; locals are
//! pushed above it and searched newest-first, so leaving the scope is a
//! truncation back to the watermark. Function parameters live on the
//! function's own symbol and are only visible while that function is the
//! active one.

use crate::types::{LitVal, Type};
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymKind {
    Variable,
    Function,
}

/// A declared variable or function.
#[derive(Debug, Clone)]
pub struct Sym {
    pub name: String,
    pub kind: SymKind,
    /// A variable's type, or a function's return type.
    pub ty: Type,
    /// True when the variable lives on the stack and needs load/store.
    pub has_addr: bool,
    /// A global variable's initial value.
    pub init: LitVal,
    /// For functions: a statement block has been attached.
    pub has_body: bool,
    /// Function parameters, in declaration order.
    pub params: Vec<Sym>,
}

impl Sym {
    pub fn variable(name: &str, ty: Type) -> Sym {
        Sym {
            name: name.to_string(),
            kind: SymKind::Variable,
            ty,
            has_addr: false,
            init: LitVal::default(),
            has_body: false,
            params: Vec::new(),
        }
    }

    pub fn function(name: &str, ty: Type) -> Sym {
        Sym {
            name: name.to_string(),
            kind: SymKind::Function,
            ty,
            has_addr: false,
            init: LitVal::default(),
            has_body: false,
            params: Vec::new(),
        }
    }
}

/// The slice of a symbol that AST nodes keep after resolution.
#[derive(Debug, Clone)]
pub struct SymRef {
    pub name: String,
    pub ty: Type,
    pub has_addr: bool,
}

impl From<&Sym> for SymRef {
    fn from(sym: &Sym) -> SymRef {
        SymRef {
            name: sym.name.clone(),
            ty: sym.ty,
            has_addr: sym.has_addr,
        }
    }
}

#[derive(Debug, Default)]
pub struct SymTable {
    syms: Vec<Sym>,
    /// Index of the first local of the active scope, when one is open.
    scope_start: Option<usize>,
    /// Index of the function whose parameters are currently visible.
    cur_func: Option<usize>,
}

impl SymTable {
    pub fn new() -> SymTable {
        SymTable::default()
    }

    /// Insert a symbol, rejecting duplicates anywhere in the main list.
    /// Returns the new symbol's index, or `None` if the name exists.
    pub fn add(&mut self, sym: Sym) -> Option<usize> {
        if self.syms.iter().any(|s| s.name == sym.name) {
            return None;
        }
        self.syms.push(sym);
        Some(self.syms.len() - 1)
    }

    pub fn get(&self, id: usize) -> &Sym {
        &self.syms[id]
    }

    pub fn get_mut(&mut self, id: usize) -> &mut Sym {
        &mut self.syms[id]
    }

    /// Index of a main-list symbol by name. Parameters are not searched.
    pub fn find_id(&self, name: &str) -> Option<usize> {
        self.syms.iter().position(|s| s.name == name)
    }

    /// Resolve a name: locals newest-first, then globals in declaration
    /// order. While scanning globals, the active function's parameter
    /// list is searched as the walk passes that function.
    pub fn find(&self, name: &str) -> Option<&Sym> {
        let scope = self.scope_start.unwrap_or(self.syms.len());

        for sym in self.syms[scope..].iter().rev() {
            if sym.name == name {
                return Some(sym);
            }
        }
        for (i, sym) in self.syms[..scope].iter().enumerate() {
            if sym.name == name {
                return Some(sym);
            }
            if Some(i) == self.cur_func
                && let Some(param) = sym.params.iter().find(|p| p.name == name)
            {
                return Some(param);
            }
        }
        None
    }

    /// Open the local scope for a function body.
    pub fn new_scope(&mut self, func: usize) {
        self.scope_start = Some(self.syms.len());
        self.cur_func = Some(func);
    }

    /// Drop every local added since `new_scope`.
    pub fn end_scope(&mut self) {
        if let Some(start) = self.scope_start.take() {
            self.syms.truncate(start);
        }
        self.cur_func = None;
    }

    pub fn cur_func(&self) -> Option<usize> {
        self.cur_func
    }

    /// All main-list symbols in stored order.
    pub fn iter(&self) -> impl Iterator<Item = &Sym> {
        self.syms.iter()
    }

    /// Write the table in resolution order: locals newest-first, then
    /// globals.
    pub fn dump(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "Global symbol table")?;
        writeln!(out, "-------------------")?;

        let scope = self.scope_start.unwrap_or(self.syms.len());
        let order = self.syms[scope..].iter().rev().chain(self.syms[..scope].iter());
        for sym in order {
            write!(out, "{} {}", sym.ty.name(), sym.name)?;
            if sym.kind == SymKind::Function {
                write!(out, "(")?;
                if sym.params.is_empty() {
                    write!(out, "void")?;
                } else {
                    for (i, p) in sym.params.iter().enumerate() {
                        if i > 0 {
                            write!(out, ", ")?;
                        }
                        write!(out, "{} {}", p.ty.name(), p.name)?;
                    }
                }
                write!(out, ");")?;
            }
            writeln!(out)?;
        }
        writeln!(out)?;
        Ok(())
    }
}

//! QBE code generation via text.
//!
//! The generator walks each function's typed AST and writes QBE IR
//! straight to the output sink. Temporaries are `%.tN` from one counter
//! shared across the whole compilation; control-flow labels and
//! string-literal labels are `@LN`/`$LN` from a second shared counter, so
//! the two label families never collide.
//!
//! String literals are deferred: each appearance reserves a label in a
//! dedup pool, and the data section is emitted after parsing completes.

use crate::ast::{AstNode, Op};
use crate::symtab::{Sym, SymKind, SymRef, SymTable};
use crate::types::{LitVal, Type};
use std::io::{self, Write};

/// Error type for code generation operations.
///
/// `Logic` covers invalid trees reaching the generator (a bug upstream,
/// reported as a fatal); `Io` covers write failures on the output sink.
#[derive(Debug)]
pub enum CodeGenError {
    Logic(String),
    Io(io::Error),
}

impl std::fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeGenError::Logic(s) => write!(f, "{}", s),
            CodeGenError::Io(e) => write!(f, "IR emission error: {}", e),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<String> for CodeGenError {
    fn from(s: String) -> Self {
        CodeGenError::Logic(s)
    }
}

impl From<io::Error> for CodeGenError {
    fn from(e: io::Error) -> Self {
        CodeGenError::Io(e)
    }
}

pub type CgResult<T> = Result<T, CodeGenError>;

/// The QBE base type used after `=` in instructions.
fn qbe_type(ty: Type) -> CgResult<&'static str> {
    match ty {
        Type::Void => Err(CodeGenError::Logic("no QBE void type".to_string())),
        Type::Bool
        | Type::Int8
        | Type::Int16
        | Type::Int32
        | Type::Uint8
        | Type::Uint16
        | Type::Uint32 => Ok("w"),
        Type::Int64 | Type::Uint64 => Ok("l"),
        Type::Flt32 => Ok("s"),
        Type::Flt64 => Ok("d"),
    }
}

/// The QBE width suffix for store instructions.
fn qbe_store_type(ty: Type) -> CgResult<&'static str> {
    match ty {
        Type::Void => Err(CodeGenError::Logic("no QBE void type".to_string())),
        Type::Bool | Type::Int8 | Type::Uint8 => Ok("b"),
        Type::Int16 | Type::Uint16 => Ok("h"),
        Type::Int32 | Type::Uint32 => Ok("w"),
        Type::Int64 | Type::Uint64 => Ok("l"),
        Type::Flt32 => Ok("s"),
        Type::Flt64 => Ok("d"),
    }
}

/// The QBE width suffix for load instructions, signedness included.
fn qbe_load_type(ty: Type) -> CgResult<&'static str> {
    match ty {
        Type::Void => Err(CodeGenError::Logic("no QBE void type".to_string())),
        Type::Bool | Type::Int8 => Ok("sb"),
        Type::Uint8 => Ok("ub"),
        Type::Int16 => Ok("sh"),
        Type::Uint16 => Ok("uh"),
        Type::Int32 => Ok("sw"),
        Type::Uint32 => Ok("uw"),
        Type::Int64 | Type::Uint64 => Ok("l"),
        Type::Flt32 => Ok("s"),
        Type::Flt64 => Ok("d"),
    }
}

/// The QBE source suffix for extension and int-to-float conversions.
fn qbe_ext_type(ty: Type) -> CgResult<&'static str> {
    match ty {
        Type::Void => Err(CodeGenError::Logic("no QBE void type".to_string())),
        Type::Bool | Type::Int8 | Type::Int16 | Type::Int32 => Ok("sw"),
        Type::Uint8 | Type::Uint16 | Type::Uint32 => Ok("uw"),
        Type::Int64 => Ok("sl"),
        Type::Uint64 => Ok("ul"),
        Type::Flt32 => Ok("s"),
        Type::Flt64 => Ok("d"),
    }
}

/// Comparison opcodes indexed EQ..GE; the unsigned family swaps in the
/// unsigned orderings.
const CMP_SIGNED: [&str; 6] = ["eq", "ne", "slt", "sgt", "sle", "sge"];
const CMP_UNSIGNED: [&str; 6] = ["eq", "ne", "ult", "ugt", "ule", "uge"];

/// Render a float constant with a guaranteed decimal point.
fn fmt_float(f: f64) -> String {
    format!("{:?}", f)
}

pub struct CodeGen<W: Write> {
    out: W,
    next_temp: u32,
    next_label: u32,
    /// Distinct string literals and their labels, in first-use order.
    strlits: Vec<(String, u32)>,
}

impl<W: Write> CodeGen<W> {
    pub fn new(out: W) -> CodeGen<W> {
        CodeGen {
            out,
            next_temp: 1,
            next_label: 1,
            strlits: Vec::new(),
        }
    }

    /// Hand back the output sink once emission is finished.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn alloc_temp(&mut self) -> u32 {
        self.next_temp += 1;
        self.next_temp
    }

    /// Generate and return a new label number.
    pub fn new_label(&mut self) -> u32 {
        let label = self.next_label;
        self.next_label += 1;
        label
    }

    /// Register a string literal, deduplicating on exact equality, and
    /// return its label.
    pub fn add_strlit(&mut self, value: &str) -> u32 {
        if let Some((_, label)) = self.strlits.iter().find(|(v, _)| v == value) {
            return *label;
        }
        let label = self.new_label();
        self.strlits.push((value.to_string(), label));
        label
    }

    fn label(&mut self, l: u32) -> CgResult<()> {
        writeln!(self.out, "@L{}", l)?;
        Ok(())
    }

    fn jump(&mut self, l: u32) -> CgResult<()> {
        writeln!(self.out, "  jmp @L{}", l)?;
        Ok(())
    }

    /// Jump to the label if the value in `t` is zero. QBE's jnz needs a
    /// second target, so a fallthrough label is minted on the spot.
    fn jump_if_false(&mut self, t: u32, label: u32) -> CgResult<()> {
        let fallthrough = self.new_label();
        writeln!(self.out, "  jnz %.t{}, @L{}, @L{}", t, fallthrough, label)?;
        self.label(fallthrough)
    }

    /// Emit the function header and entry label.
    pub fn func_preamble(&mut self, func: &Sym) -> CgResult<()> {
        write!(self.out, "export function ${}(", func.name)?;
        for (i, param) in func.params.iter().enumerate() {
            if i > 0 {
                write!(self.out, ", ")?;
            }
            write!(self.out, "{} %{}", qbe_type(param.ty)?, param.name)?;
        }
        writeln!(self.out, ") {{")?;
        writeln!(self.out, "@START")?;
        Ok(())
    }

    pub fn func_postamble(&mut self) -> CgResult<()> {
        writeln!(self.out, "@END")?;
        writeln!(self.out, "  ret")?;
        writeln!(self.out, "}}")?;
        Ok(())
    }

    /// Emit the data record for one global variable.
    pub fn globsym(&mut self, sym: &Sym) -> CgResult<()> {
        let sqt = qbe_store_type(sym.ty)?;
        if sym.ty.is_float() {
            writeln!(
                self.out,
                "export data ${} = {{ {} {}_{}, }}",
                sym.name,
                sqt,
                sqt,
                fmt_float(sym.init.as_f64())
            )?;
        } else {
            writeln!(
                self.out,
                "export data ${} = {{ {} {}, }}",
                sym.name,
                sqt,
                sym.init.as_i64()
            )?;
        }
        Ok(())
    }

    /// Emit data records for every global variable in the table.
    pub fn emit_globals(&mut self, syms: &SymTable) -> CgResult<()> {
        for sym in syms.iter().filter(|s| s.kind == SymKind::Variable) {
            self.globsym(sym)?;
        }
        Ok(())
    }

    /// Emit the deferred data section for every distinct string literal.
    pub fn emit_strlits(&mut self) -> CgResult<()> {
        let pool = std::mem::take(&mut self.strlits);
        for (value, label) in &pool {
            self.strlit(*label, value)?;
        }
        Ok(())
    }

    fn strlit(&mut self, label: u32, value: &str) -> CgResult<()> {
        write!(self.out, "data $L{} = {{ b \"", label)?;
        for b in value.bytes() {
            match b {
                0x07 => write!(self.out, "\\a")?,
                0x08 => write!(self.out, "\\b")?,
                0x0c => write!(self.out, "\\f")?,
                b'\n' => write!(self.out, "\\n")?,
                b'\r' => write!(self.out, "\\r")?,
                b'\t' => write!(self.out, "\\t")?,
                0x0b => write!(self.out, "\\v")?,
                _ => write!(self.out, "{}", b as char)?,
            }
        }
        writeln!(self.out, "\", b 0 }}")?;
        Ok(())
    }

    /// Load a literal value into a fresh temporary.
    fn load_lit(&mut self, value: LitVal, ty: Type) -> CgResult<u32> {
        let t = self.alloc_temp();
        let qt = qbe_type(ty)?;
        if ty.is_float() {
            writeln!(
                self.out,
                "  %.t{} ={} copy {}_{}",
                t,
                qt,
                qt,
                fmt_float(value.as_f64())
            )?;
        } else {
            writeln!(self.out, "  %.t{} ={} copy {}", t, qt, value.as_i64())?;
        }
        Ok(t)
    }

    /// Load a variable's value into a fresh temporary.
    fn load_var(&mut self, sym: &SymRef) -> CgResult<u32> {
        let t = self.alloc_temp();
        let qt = qbe_type(sym.ty)?;
        if sym.has_addr {
            let lqt = qbe_load_type(sym.ty)?;
            writeln!(self.out, "  %.t{} ={} load{} %{}", t, qt, lqt, sym.name)?;
        } else {
            writeln!(self.out, "  %.t{} ={} copy %{}", t, qt, sym.name)?;
        }
        Ok(t)
    }

    /// Store a temporary into a variable.
    fn stor_var(&mut self, t: u32, sym: &SymRef) -> CgResult<()> {
        if sym.has_addr {
            let sqt = qbe_store_type(sym.ty)?;
            writeln!(self.out, "  store{} %.t{}, %{}", sqt, t, sym.name)?;
        } else {
            let qt = qbe_type(sym.ty)?;
            writeln!(self.out, "  %{} ={} copy %.t{}", sym.name, qt, t)?;
        }
        Ok(())
    }

    /// Binary operation; the result reuses the left temporary.
    fn binop(&mut self, t1: u32, t2: u32, op: &str, ty: Type) -> CgResult<u32> {
        let qt = qbe_type(ty)?;
        writeln!(self.out, "  %.t{} ={} {} %.t{}, %.t{}", t1, qt, op, t1, t2)?;
        Ok(t1)
    }

    fn negate(&mut self, t: u32, ty: Type) -> CgResult<u32> {
        let qt = qbe_type(ty)?;
        writeln!(self.out, "  %.t{} ={} sub 0, %.t{}", t, qt, t)?;
        Ok(t)
    }

    fn invert(&mut self, t: u32, ty: Type) -> CgResult<u32> {
        let qt = qbe_type(ty)?;
        writeln!(self.out, "  %.t{} ={} xor %.t{}, -1", t, qt, t)?;
        Ok(t)
    }

    /// Logical NOT: compare the operand against zero. The result is a
    /// word; the comparison suffix comes from the operand's type.
    fn not(&mut self, t: u32, operand_ty: Type) -> CgResult<u32> {
        let qt = qbe_type(operand_ty)?;
        writeln!(self.out, "  %.t{} =w ceq{} %.t{}, 0", t, qt, t)?;
        Ok(t)
    }

    /// Compare two temporaries. The opcode family keys off the operand
    /// type's signedness; the boolean result lands in a fresh word.
    fn compare(&mut self, op: Op, t1: u32, t2: u32, ty: Type) -> CgResult<u32> {
        let idx = match op {
            Op::Eq => 0,
            Op::Ne => 1,
            Op::Lt => 2,
            Op::Gt => 3,
            Op::Le => 4,
            Op::Ge => 5,
            _ => {
                return Err(CodeGenError::Logic(format!(
                    "not a comparison operation: {}",
                    op.name()
                )));
            }
        };
        let cmp = if ty.is_unsigned() {
            CMP_UNSIGNED[idx]
        } else {
            CMP_SIGNED[idx]
        };
        let qt = qbe_type(ty)?;
        let t = self.alloc_temp();
        writeln!(self.out, "  %.t{} =w c{}{} %.t{}, %.t{}", t, cmp, qt, t1, t2)?;
        Ok(t)
    }

    /// Change a temporary's type. Sub-word sources are already word-sized
    /// in QBE, so signedness is taken from the promoted 32-bit view.
    fn cast(&mut self, t1: u32, from: Type, to: Type) -> CgResult<u32> {
        let from = match from {
            Type::Bool | Type::Int8 | Type::Int16 => Type::Int32,
            Type::Uint8 | Type::Uint16 => Type::Uint32,
            other => other,
        };
        let to_qt = qbe_type(to)?;

        // Conversion from int to float.
        if from.is_integer() && to.is_float() {
            let t2 = self.alloc_temp();
            let ext = qbe_ext_type(from)?;
            writeln!(self.out, "  %.t{} ={} {}tof %.t{}", t2, to_qt, ext, t1)?;
            return Ok(t2);
        }

        // Widening.
        if to.size() > from.size() {
            return match from {
                Type::Int32 | Type::Uint32 | Type::Flt32 => {
                    let t2 = self.alloc_temp();
                    let ext = qbe_ext_type(from)?;
                    writeln!(self.out, "  %.t{} ={} ext{} %.t{}", t2, to_qt, ext, t1)?;
                    Ok(t2)
                }
                _ => Err(CodeGenError::Logic(format!(
                    "Not sure how to widen from {} to {}",
                    from.name(),
                    to.name()
                ))),
            };
        }

        // Narrowing from a word-or-wider integer is a no-op; the high
        // bits are ignored by the narrower store.
        if to.size() < from.size() {
            return match from {
                Type::Int32 | Type::Uint32 | Type::Int64 | Type::Uint64 => Ok(t1),
                _ => Err(CodeGenError::Logic(format!(
                    "Not sure how to narrow from {} to {}",
                    from.name(),
                    to.name()
                ))),
            };
        }

        // Same size after promotion: nothing to emit.
        Ok(t1)
    }

    /// Reserve stack space for a local variable.
    fn add_local(&mut self, ty: Type, sym: &SymRef) -> CgResult<()> {
        // QBE needs at least four bytes for a stack slot.
        let size = ty.size().max(4);
        writeln!(self.out, "  %{} =l alloc{} 1", sym.name, size)?;
        Ok(())
    }

    /// Print a temporary's value through printf.
    fn print_call(&mut self, label: u32, temp: u32, ty: Type) -> CgResult<()> {
        let qt = qbe_type(ty)?;
        writeln!(
            self.out,
            "  call $printf(l $L{}, {} %.t{})",
            label, qt, temp
        )?;
        Ok(())
    }

    /// Generate code for one function body.
    pub fn gen_function(&mut self, body: Option<&AstNode>, syms: &SymTable) -> CgResult<()> {
        if let Some(body) = body {
            self.gen_ast(body, syms)?;
        }
        Ok(())
    }

    /// Walk an AST recursively and return the temporary holding the
    /// tree's value, if it produces one.
    pub fn gen_ast(&mut self, n: &AstNode, syms: &SymTable) -> CgResult<Option<u32>> {
        // Nodes that drive their own child traversal.
        match n.op {
            Op::Print => {
                let expr = n
                    .right
                    .as_deref()
                    .ok_or_else(|| CodeGenError::Logic("print without expression".into()))?;
                let t = self.gen_value(expr, syms)?;
                let format = n
                    .left
                    .as_deref()
                    .and_then(|l| l.name.as_deref())
                    .ok_or_else(|| CodeGenError::Logic("print without format string".into()))?;
                let label = self.add_strlit(format);
                self.print_call(label, t, node_type(expr)?)?;
                return Ok(None);
            }
            Op::Local => return self.gen_local(n, syms),
            Op::FuncCall => return self.gen_funccall(n, syms),
            Op::If => {
                self.gen_if(n, syms)?;
                return Ok(None);
            }
            Op::While => {
                self.gen_while(n, syms)?;
                return Ok(None);
            }
            Op::For => {
                // Run the initializer once, then fall into the while shape.
                if let Some(init) = n.right.as_deref() {
                    self.gen_ast(init, syms)?;
                }
                self.gen_while(n, syms)?;
                return Ok(None);
            }
            _ => {}
        }

        let lefttemp = match n.left.as_deref() {
            Some(l) => self.gen_ast(l, syms)?,
            None => None,
        };
        let righttemp = match n.right.as_deref() {
            Some(r) => self.gen_ast(r, syms)?,
            None => None,
        };

        match n.op {
            Op::NumLit => Ok(Some(self.load_lit(n.lit, node_type(n)?)?)),
            Op::Ident => {
                let sym = node_sym(n)?;
                Ok(Some(self.load_var(sym)?))
            }
            Op::Assign => {
                self.stor_var(need(lefttemp)?, node_sym(n)?)?;
                Ok(None)
            }
            Op::Cast => {
                let inner = n
                    .left
                    .as_deref()
                    .ok_or_else(|| CodeGenError::Logic("cast without operand".into()))?;
                let t = self.cast(need(lefttemp)?, node_type(inner)?, node_type(n)?)?;
                Ok(Some(t))
            }
            Op::Add => Ok(Some(self.binop(
                need(lefttemp)?,
                need(righttemp)?,
                "add",
                node_type(n)?,
            )?)),
            Op::Subtract => Ok(Some(self.binop(
                need(lefttemp)?,
                need(righttemp)?,
                "sub",
                node_type(n)?,
            )?)),
            Op::Multiply => Ok(Some(self.binop(
                need(lefttemp)?,
                need(righttemp)?,
                "mul",
                node_type(n)?,
            )?)),
            Op::Divide => Ok(Some(self.binop(
                need(lefttemp)?,
                need(righttemp)?,
                "div",
                node_type(n)?,
            )?)),
            Op::And => Ok(Some(self.binop(
                need(lefttemp)?,
                need(righttemp)?,
                "and",
                node_type(n)?,
            )?)),
            Op::Or => Ok(Some(self.binop(
                need(lefttemp)?,
                need(righttemp)?,
                "or",
                node_type(n)?,
            )?)),
            Op::Xor => Ok(Some(self.binop(
                need(lefttemp)?,
                need(righttemp)?,
                "xor",
                node_type(n)?,
            )?)),
            Op::Lshift => Ok(Some(self.binop(
                need(lefttemp)?,
                need(righttemp)?,
                "shl",
                node_type(n)?,
            )?)),
            Op::Rshift => Ok(Some(self.binop(
                need(lefttemp)?,
                need(righttemp)?,
                "shr",
                node_type(n)?,
            )?)),
            Op::Negate => Ok(Some(self.negate(need(lefttemp)?, node_type(n)?)?)),
            Op::Invert => Ok(Some(self.invert(need(lefttemp)?, node_type(n)?)?)),
            Op::Not => {
                let operand = n
                    .left
                    .as_deref()
                    .ok_or_else(|| CodeGenError::Logic("NOT without operand".into()))?;
                Ok(Some(self.not(need(lefttemp)?, node_type(operand)?)?))
            }
            Op::Eq | Op::Ne | Op::Lt | Op::Gt | Op::Le | Op::Ge => {
                // The opcode keys off the left operand's type, not the
                // unified result type.
                let operand = n
                    .left
                    .as_deref()
                    .ok_or_else(|| CodeGenError::Logic("comparison without operand".into()))?;
                let t = self.compare(
                    n.op,
                    need(lefttemp)?,
                    need(righttemp)?,
                    node_type(operand)?,
                )?;
                Ok(Some(t))
            }
            Op::Glue => Ok(None),
            _ => Err(CodeGenError::Logic(format!(
                "unknown AST operation {}",
                n.op.name()
            ))),
        }
    }

    /// Generate a subtree that must produce a value.
    fn gen_value(&mut self, n: &AstNode, syms: &SymTable) -> CgResult<u32> {
        need(self.gen_ast(n, syms)?)
    }

    fn gen_if(&mut self, n: &AstNode, syms: &SymTable) -> CgResult<()> {
        // When there is no else clause the false label is the end label.
        let l_false = self.new_label();
        let l_end = if n.right.is_some() {
            Some(self.new_label())
        } else {
            None
        };

        let cond = n
            .left
            .as_deref()
            .ok_or_else(|| CodeGenError::Logic("if without condition".into()))?;
        let t = self.gen_value(cond, syms)?;
        self.jump_if_false(t, l_false)?;

        if let Some(then) = n.mid.as_deref() {
            self.gen_ast(then, syms)?;
        }

        if let Some(l_end) = l_end {
            // The backend rejects two terminators in sequence, so a
            // filler label goes in front of the jump.
            let filler = self.new_label();
            self.label(filler)?;
            self.jump(l_end)?;
        }

        self.label(l_false)?;

        if let Some(els) = n.right.as_deref() {
            self.gen_ast(els, syms)?;
            if let Some(l_end) = l_end {
                self.label(l_end)?;
            }
        }
        Ok(())
    }

    /// The while emitter; FOR nodes reuse it after running their
    /// initializer.
    fn gen_while(&mut self, n: &AstNode, syms: &SymTable) -> CgResult<()> {
        let l_start = self.new_label();
        let l_end = self.new_label();
        self.label(l_start)?;

        let cond = n
            .left
            .as_deref()
            .ok_or_else(|| CodeGenError::Logic("while without condition".into()))?;
        let t = self.gen_value(cond, syms)?;
        self.jump_if_false(t, l_end)?;

        if let Some(body) = n.mid.as_deref() {
            self.gen_ast(body, syms)?;
        }
        self.jump(l_start)?;
        self.label(l_end)
    }

    /// Reserve a local's stack slot, evaluate its initializer, store it,
    /// then emit any chained declarations and trailing statements.
    fn gen_local(&mut self, n: &AstNode, syms: &SymTable) -> CgResult<Option<u32>> {
        let sym = node_sym(n)?;
        self.add_local(node_type(n)?, sym)?;

        let init = n
            .left
            .as_deref()
            .ok_or_else(|| CodeGenError::Logic("declaration without initializer".into()))?;
        let t = self.gen_value(init, syms)?;
        self.stor_var(t, node_sym(n)?)?;

        if let Some(mid) = n.mid.as_deref() {
            self.gen_ast(mid, syms)?;
        }
        if let Some(right) = n.right.as_deref() {
            self.gen_ast(right, syms)?;
        }
        Ok(None)
    }

    /// Evaluate call arguments left to right, then emit the call. The
    /// parser has already resolved the callee and widened every argument.
    fn gen_funccall(&mut self, n: &AstNode, syms: &SymTable) -> CgResult<Option<u32>> {
        let name = n
            .left
            .as_deref()
            .and_then(|l| l.name.as_deref())
            .ok_or_else(|| CodeGenError::Logic("function call without a name".into()))?;
        let func = syms
            .find(name)
            .ok_or_else(|| CodeGenError::Logic(format!("unknown function {}()", name)))?
            .clone();

        let mut args: Vec<(Type, u32)> = Vec::new();
        let mut cursor = n.right.as_deref();
        while let Some(glue) = cursor {
            if let Some(arg) = glue.left.as_deref() {
                let t = self.gen_value(arg, syms)?;
                args.push((node_type(arg)?, t));
            }
            cursor = glue.right.as_deref();
        }

        if func.ty == Type::Void {
            write!(self.out, "  call ${}(", func.name)?;
            self.call_args(&args)?;
            Ok(None)
        } else {
            let t = self.alloc_temp();
            write!(self.out, "  %.t{} ={} call ${}(", t, qbe_type(func.ty)?, func.name)?;
            self.call_args(&args)?;
            Ok(Some(t))
        }
    }

    fn call_args(&mut self, args: &[(Type, u32)]) -> CgResult<()> {
        for (i, (ty, t)) in args.iter().enumerate() {
            if i > 0 {
                write!(self.out, ", ")?;
            }
            write!(self.out, "{} %.t{}", qbe_type(*ty)?, t)?;
        }
        writeln!(self.out, ")")?;
        Ok(())
    }
}

fn need(t: Option<u32>) -> CgResult<u32> {
    t.ok_or_else(|| CodeGenError::Logic("expression produced no value".to_string()))
}

fn node_type(n: &AstNode) -> CgResult<Type> {
    n.ty
        .ok_or_else(|| CodeGenError::Logic("untyped AST node in code generation".to_string()))
}

fn node_sym(n: &AstNode) -> CgResult<&SymRef> {
    n.sym
        .as_ref()
        .ok_or_else(|| CodeGenError::Logic("AST node missing its symbol".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symtab::Sym;

    fn output(cg: CodeGen<Vec<u8>>) -> String {
        String::from_utf8(cg.into_inner()).expect("utf8 IR")
    }

    #[test]
    fn test_load_integer_literal() {
        let mut cg = CodeGen::new(Vec::new());
        let t = cg.load_lit(LitVal::Int(42), Type::Int32).unwrap();
        assert_eq!(t, 2);
        assert_eq!(output(cg), "  %.t2 =w copy 42\n");
    }

    #[test]
    fn test_load_float_literal_keeps_decimal_point() {
        let mut cg = CodeGen::new(Vec::new());
        cg.load_lit(LitVal::Flt(1.0), Type::Flt32).unwrap();
        assert_eq!(output(cg), "  %.t2 =s copy s_1.0\n");
    }

    #[test]
    fn test_temporaries_strictly_increase() {
        let mut cg = CodeGen::new(Vec::new());
        let a = cg.load_lit(LitVal::Int(1), Type::Int32).unwrap();
        let b = cg.load_lit(LitVal::Int(2), Type::Int64).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_signed_and_unsigned_compare_opcodes() {
        let mut cg = CodeGen::new(Vec::new());
        cg.compare(Op::Lt, 2, 3, Type::Int32).unwrap();
        cg.compare(Op::Lt, 4, 5, Type::Uint32).unwrap();
        cg.compare(Op::Ge, 6, 7, Type::Uint64).unwrap();
        let ir = output(cg);
        assert!(ir.contains("csltw %.t2, %.t3"));
        assert!(ir.contains("cultw %.t4, %.t5"));
        assert!(ir.contains("cugel %.t6, %.t7"));
    }

    #[test]
    fn test_compare_result_is_word() {
        let mut cg = CodeGen::new(Vec::new());
        cg.compare(Op::Eq, 2, 3, Type::Int64).unwrap();
        assert!(output(cg).contains("=w ceql"));
    }

    #[test]
    fn test_cast_int_to_float_uses_promoted_signedness() {
        let mut cg = CodeGen::new(Vec::new());
        cg.cast(2, Type::Int8, Type::Flt32).unwrap();
        cg.cast(3, Type::Uint16, Type::Flt64).unwrap();
        let ir = output(cg);
        assert!(ir.contains("=s swtof %.t2"));
        assert!(ir.contains("=d uwtof %.t3"));
    }

    #[test]
    fn test_cast_widens_with_ext() {
        let mut cg = CodeGen::new(Vec::new());
        cg.cast(2, Type::Int32, Type::Int64).unwrap();
        cg.cast(3, Type::Uint32, Type::Uint64).unwrap();
        cg.cast(4, Type::Flt32, Type::Flt64).unwrap();
        let ir = output(cg);
        assert!(ir.contains("=l extsw %.t2"));
        assert!(ir.contains("=l extuw %.t3"));
        assert!(ir.contains("=d exts %.t4"));
    }

    #[test]
    fn test_cast_narrowing_is_noop() {
        let mut cg = CodeGen::new(Vec::new());
        let t = cg.cast(5, Type::Int64, Type::Int8).unwrap();
        assert_eq!(t, 5);
        assert_eq!(output(cg), "");
    }

    #[test]
    fn test_cast_subword_same_size_emits_nothing() {
        let mut cg = CodeGen::new(Vec::new());
        let t = cg.cast(2, Type::Bool, Type::Int32).unwrap();
        assert_eq!(t, 2);
        assert_eq!(output(cg), "");
    }

    #[test]
    fn test_void_type_is_rejected() {
        assert!(qbe_type(Type::Void).is_err());
        assert!(qbe_store_type(Type::Void).is_err());
    }

    #[test]
    fn test_strlit_dedup_shares_label() {
        let mut cg = CodeGen::new(Vec::new());
        let a = cg.add_strlit("hello");
        let b = cg.add_strlit("world");
        let c = cg.add_strlit("hello");
        assert_eq!(a, c);
        assert_ne!(a, b);
        cg.emit_strlits().unwrap();
        let ir = output(cg);
        assert_eq!(ir.matches("b \"hello\"").count(), 1);
    }

    #[test]
    fn test_strlit_reescapes_control_characters() {
        let mut cg = CodeGen::new(Vec::new());
        let label = cg.add_strlit("%d\n");
        cg.emit_strlits().unwrap();
        let ir = output(cg);
        assert!(ir.contains(&format!("data $L{} = {{ b \"%d\\n\", b 0 }}", label)));
    }

    #[test]
    fn test_globsym_integer_and_float() {
        let mut cg = CodeGen::new(Vec::new());
        let mut g = Sym::variable("count", Type::Int32);
        g.init = LitVal::Int(7);
        cg.globsym(&g).unwrap();
        let mut f = Sym::variable("ratio", Type::Flt64);
        f.init = LitVal::Flt(0.5);
        cg.globsym(&f).unwrap();
        let ir = output(cg);
        assert!(ir.contains("export data $count = { w 7, }"));
        assert!(ir.contains("export data $ratio = { d d_0.5, }"));
    }

    #[test]
    fn test_func_preamble_and_postamble() {
        let mut cg = CodeGen::new(Vec::new());
        let mut f = Sym::function("sum", Type::Void);
        f.params.push(Sym::variable("a", Type::Int32));
        f.params.push(Sym::variable("b", Type::Int64));
        cg.func_preamble(&f).unwrap();
        cg.func_postamble().unwrap();
        let ir = output(cg);
        assert!(ir.contains("export function $sum(w %a, l %b) {"));
        assert!(ir.contains("@START\n@END\n  ret\n}\n"));
    }

    #[test]
    fn test_labels_are_unique() {
        let mut cg = CodeGen::new(Vec::new());
        let a = cg.new_label();
        let b = cg.new_label();
        let s = cg.add_strlit("x");
        assert!(a != b && b != s && a != s);
    }
}

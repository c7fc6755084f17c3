//! The Mica type system.
//!
//! All types are built-in scalars; user-defined types are a future
//! extension. `Type` is a `Copy` enum, so the original notion of
//! process-wide singletons compared by identity becomes plain value
//! equality here.
//!
//! The widening rules live in this module because the parser applies them
//! while it builds the AST: by the time a tree reaches the code generator
//! every node carries a resolved type.

use crate::ast::{AstNode, Op};
use thiserror::Error;

/// One built-in scalar kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Void,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Flt32,
    Flt64,
}

impl Type {
    /// sizeof() value in bytes.
    pub fn size(self) -> u32 {
        match self {
            Type::Void | Type::Bool | Type::Int8 | Type::Uint8 => 1,
            Type::Int16 | Type::Uint16 => 2,
            Type::Int32 | Type::Uint32 | Type::Flt32 => 4,
            Type::Int64 | Type::Uint64 | Type::Flt64 => 8,
        }
    }

    /// Alignment equals size for every scalar.
    pub fn align(self) -> u32 {
        self.size()
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            Type::Uint8 | Type::Uint16 | Type::Uint32 | Type::Uint64
        )
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Type::Int8
                | Type::Int16
                | Type::Int32
                | Type::Int64
                | Type::Uint8
                | Type::Uint16
                | Type::Uint32
                | Type::Uint64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Type::Flt32 | Type::Flt64)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// The source-level keyword for this type, used in diagnostics and in
    /// the symbol dump.
    pub fn name(self) -> &'static str {
        match self {
            Type::Void => "void",
            Type::Bool => "bool",
            Type::Int8 => "int8",
            Type::Int16 => "int16",
            Type::Int32 => "int32",
            Type::Int64 => "int64",
            Type::Uint8 => "uint8",
            Type::Uint16 => "uint16",
            Type::Uint32 => "uint32",
            Type::Uint64 => "uint64",
            Type::Flt32 => "flt32",
            Type::Flt64 => "flt64",
        }
    }
}

/// A numeric literal value: the 64-bit integer-or-float payload together
/// with how the lexer classified it. `Char` only appears on tokens; the
/// parser folds it into `Int` when building NUMLIT leaves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LitVal {
    Int(i64),
    Uint(u64),
    Flt(f64),
    Char(u8),
}

impl Default for LitVal {
    fn default() -> Self {
        LitVal::Int(0)
    }
}

impl LitVal {
    /// The payload viewed as a signed 64-bit integer. Unsigned values are
    /// reinterpreted bit-for-bit, matching the C-union view the IR
    /// emitter expects.
    pub fn as_i64(self) -> i64 {
        match self {
            LitVal::Int(v) => v,
            LitVal::Uint(v) => v as i64,
            LitVal::Char(c) => c as i64,
            LitVal::Flt(f) => f as i64,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            LitVal::Flt(f) => f,
            LitVal::Int(v) => v as f64,
            LitVal::Uint(v) => v as f64,
            LitVal::Char(c) => c as f64,
        }
    }
}

/// Errors raised by the widening engine. The parser stamps the current
/// source position onto these when it converts them to fatals.
#[derive(Debug, Error)]
pub enum TypeError {
    #[error("cannot widen anything of type void")]
    VoidWiden,
    #[error("Cannot cast negative literal value {0} to be unsigned")]
    NegativeUnsigned(i64),
    #[error("expression has no type")]
    Untyped,
}

/// Classify a scanned literal: floats are `flt32`; integers get the
/// smallest signed type whose range contains the value; only values above
/// `i64::MAX` that were not written with a leading minus become `uint64`.
pub fn litval_type(lit: LitVal) -> Type {
    match lit {
        LitVal::Flt(_) => Type::Flt32,
        LitVal::Int(v) => smallest_int(v),
        LitVal::Char(c) => smallest_int(c as i64),
        LitVal::Uint(v) => {
            if v > i64::MAX as u64 {
                Type::Uint64
            } else {
                smallest_int(v as i64)
            }
        }
    }
}

fn smallest_int(v: i64) -> Type {
    if v >= i8::MIN as i64 && v <= i8::MAX as i64 {
        Type::Int8
    } else if v >= i16::MIN as i64 && v <= i16::MAX as i64 {
        Type::Int16
    } else if v >= i32::MIN as i64 && v <= i32::MAX as i64 {
        Type::Int32
    } else {
        Type::Int64
    }
}

/// Try to widen `node` so its value is usable where `ty` is expected.
///
/// Returns `Ok(true)` when the node is compatible (possibly after being
/// retyped in place or wrapped in a CAST), `Ok(false)` when no widening is
/// possible, and `Err` for conditions that are fatal wherever they occur.
///
/// Literal nodes are retyped in place rather than cast-wrapped, so the
/// emitted IR never carries conversions for constants.
pub fn widen_type(node: &mut AstNode, ty: Type) -> Result<bool, TypeError> {
    let nty = node.ty.ok_or(TypeError::Untyped)?;

    // Same type, nothing to do.
    if nty == ty {
        return Ok(true);
    }

    // We can't widen to a boolean.
    if ty == Type::Bool {
        return Ok(false);
    }

    // We can't widen from a void.
    if nty == Type::Void {
        return Err(TypeError::VoidWiden);
    }

    // An integer literal becomes a float literal outright.
    if node.op == Op::NumLit && nty.is_integer() && ty.is_float() {
        node.lit = LitVal::Flt(node.lit.as_i64() as f64);
        node.ty = Some(ty);
        return Ok(true);
    }

    // Any other integer widens to float through a cast.
    if nty.is_integer() && ty.is_float() {
        wrap_cast(node, ty);
        return Ok(true);
    }

    // The target is smaller than the node's type: leave the node alone,
    // narrowing happens at the store or cast site.
    if ty.size() < nty.size() {
        return Ok(true);
    }

    // A literal adopts the target type in place, with one rule: a negative
    // value never becomes unsigned.
    if node.op == Op::NumLit {
        if ty.is_unsigned() && !nty.is_unsigned() && node.lit.as_i64() < 0 {
            return Err(TypeError::NegativeUnsigned(node.lit.as_i64()));
        }
        node.ty = Some(ty);
        return Ok(true);
    }

    // Signed and unsigned types cannot mix.
    if nty.is_unsigned() != ty.is_unsigned() {
        return Ok(false);
    }

    wrap_cast(node, ty);
    Ok(true)
}

/// Replace `node` with a CAST of the given type wrapping the old node.
fn wrap_cast(node: &mut AstNode, ty: Type) {
    let inner = std::mem::take(node);
    let mut cast = AstNode::node(Op::Cast, Some(inner), None, None);
    cast.ty = Some(ty);
    cast.rvalue = true;
    *node = cast;
}

/// Propagate types bottom-up through a freshly built binary node.
///
/// Comparisons and logical NOT force `bool`; everything else types its
/// children, widens each toward the other (whichever direction succeeds),
/// and adopts the left child's type. Incompatible operands are tolerated
/// here; sites with a fixed target type use [`widen_type`] directly and
/// treat failure as fatal.
pub fn add_type(node: &mut AstNode) -> Result<(), TypeError> {
    if node.ty.is_some() {
        return Ok(());
    }

    if node.op.yields_bool() {
        node.ty = Some(Type::Bool);
        return Ok(());
    }

    if let Some(left) = node.left.as_deref_mut() {
        add_type(left)?;
    }
    if let Some(right) = node.right.as_deref_mut() {
        add_type(right)?;
    }

    // Try to widen each child toward the other's type.
    let lty = node.left.as_deref().and_then(|n| n.ty);
    let rty = node.right.as_deref().and_then(|n| n.ty);
    if let (Some(mut lty), Some(rty)) = (lty, rty) {
        if let Some(left) = node.left.as_deref_mut() {
            widen_type(left, rty)?;
            lty = left.ty.unwrap_or(lty);
        }
        if let Some(right) = node.right.as_deref_mut() {
            widen_type(right, lty)?;
        }
    }

    node.ty = node.left.as_deref().and_then(|n| n.ty);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(v: LitVal) -> AstNode {
        AstNode::leaf(Op::NumLit, Some(litval_type(v)), true, v)
    }

    #[test]
    fn test_smallest_integer_rule() {
        assert_eq!(litval_type(LitVal::Uint(127)), Type::Int8);
        assert_eq!(litval_type(LitVal::Uint(128)), Type::Int16);
        assert_eq!(litval_type(LitVal::Uint(32767)), Type::Int16);
        assert_eq!(litval_type(LitVal::Uint(32768)), Type::Int32);
        assert_eq!(litval_type(LitVal::Uint(2147483647)), Type::Int32);
        assert_eq!(litval_type(LitVal::Uint(2147483648)), Type::Int64);
        assert_eq!(
            litval_type(LitVal::Uint(18446744073709551615)),
            Type::Uint64
        );
    }

    #[test]
    fn test_negative_literal_types() {
        assert_eq!(litval_type(LitVal::Int(-1)), Type::Int8);
        assert_eq!(litval_type(LitVal::Int(-129)), Type::Int16);
        assert_eq!(litval_type(LitVal::Int(-40000)), Type::Int32);
        assert_eq!(litval_type(LitVal::Int(-3000000000)), Type::Int64);
    }

    #[test]
    fn test_float_literals_are_flt32() {
        assert_eq!(litval_type(LitVal::Flt(3.14)), Type::Flt32);
        assert_eq!(litval_type(LitVal::Flt(1.0e300)), Type::Flt32);
    }

    #[test]
    fn test_char_literals_classify_as_integers() {
        assert_eq!(litval_type(LitVal::Char(b'x')), Type::Int8);
        assert_eq!(litval_type(LitVal::Char(255)), Type::Int16);
    }

    #[test]
    fn test_widen_same_type_is_noop() {
        let mut n = lit(LitVal::Int(1));
        assert!(widen_type(&mut n, Type::Int8).unwrap());
        assert_eq!(n.op, Op::NumLit);
        assert_eq!(n.ty, Some(Type::Int8));
    }

    #[test]
    fn test_bool_is_not_a_widening_target() {
        let mut n = lit(LitVal::Int(1));
        assert!(!widen_type(&mut n, Type::Bool).unwrap());
    }

    #[test]
    fn test_literal_retypes_in_place_to_float() {
        // No CAST node may appear around a literal.
        let mut n = lit(LitVal::Int(1));
        assert!(widen_type(&mut n, Type::Flt32).unwrap());
        assert_eq!(n.op, Op::NumLit);
        assert_eq!(n.ty, Some(Type::Flt32));
        assert_eq!(n.lit, LitVal::Flt(1.0));
    }

    #[test]
    fn test_literal_adopts_wider_integer_type() {
        let mut n = lit(LitVal::Int(7));
        assert!(widen_type(&mut n, Type::Int64).unwrap());
        assert_eq!(n.op, Op::NumLit);
        assert_eq!(n.ty, Some(Type::Int64));
    }

    #[test]
    fn test_negative_literal_rejects_unsigned_target() {
        let mut n = lit(LitVal::Int(-1));
        let err = widen_type(&mut n, Type::Uint8).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot cast negative literal value -1 to be unsigned"
        );
    }

    #[test]
    fn test_nonliteral_widen_wraps_cast() {
        let mut n = AstNode::leaf(Op::Ident, Some(Type::Int32), true, LitVal::Int(0));
        assert!(widen_type(&mut n, Type::Int64).unwrap());
        assert_eq!(n.op, Op::Cast);
        assert_eq!(n.ty, Some(Type::Int64));
        assert_eq!(n.left.as_deref().unwrap().ty, Some(Type::Int32));
    }

    #[test]
    fn test_signedness_mismatch_fails_for_nonliterals() {
        let mut n = AstNode::leaf(Op::Ident, Some(Type::Int32), true, LitVal::Int(0));
        assert!(!widen_type(&mut n, Type::Uint64).unwrap());
    }

    #[test]
    fn test_smaller_target_leaves_node_unchanged() {
        let mut n = AstNode::leaf(Op::Ident, Some(Type::Int32), true, LitVal::Int(0));
        assert!(widen_type(&mut n, Type::Int8).unwrap());
        assert_eq!(n.op, Op::Ident);
        assert_eq!(n.ty, Some(Type::Int32));
    }

    #[test]
    fn test_widen_from_void_is_fatal() {
        let mut n = AstNode::leaf(Op::Ident, Some(Type::Void), true, LitVal::Int(0));
        assert!(matches!(
            widen_type(&mut n, Type::Int32),
            Err(TypeError::VoidWiden)
        ));
    }

    #[test]
    fn test_add_type_forces_bool_on_comparisons() {
        let mut n = AstNode::node(
            Op::Lt,
            Some(lit(LitVal::Int(1))),
            None,
            Some(lit(LitVal::Int(2))),
        );
        add_type(&mut n).unwrap();
        assert_eq!(n.ty, Some(Type::Bool));
        // Children keep their own numeric types.
        assert_eq!(n.left.as_deref().unwrap().ty, Some(Type::Int8));
    }

    #[test]
    fn test_add_type_unifies_arithmetic_children() {
        let ident = AstNode::leaf(Op::Ident, Some(Type::Int32), true, LitVal::Int(0));
        let mut n = AstNode::node(Op::Add, Some(ident), None, Some(lit(LitVal::Int(2))));
        add_type(&mut n).unwrap();
        assert_eq!(n.ty, Some(Type::Int32));
        // The int8 literal was retyped, not cast.
        assert_eq!(n.right.as_deref().unwrap().op, Op::NumLit);
        assert_eq!(n.right.as_deref().unwrap().ty, Some(Type::Int32));
    }
}

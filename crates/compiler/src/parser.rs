//! Recursive-descent parser.
//!
//! The parser owns the lexer, the symbol table, and the code generator:
//! it types each expression as it builds it and hands every finished
//! function body straight to the generator. Grammar functions map onto
//! the productions one to one; precedence is encoded structurally
//! (bitwise < relational < shift < additive < multiplicative < factor).

use crate::DumpFlags;
use crate::ast::{AstNode, Op};
use crate::codegen::{CgResult, CodeGen};
use crate::errors::{CompileError, Result};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::symtab::{Sym, SymKind, SymRef, SymTable};
use crate::types::{self, LitVal, Type};
use std::io::Write;
use tracing::debug;

pub struct Parser<'a, W: Write> {
    lex: Lexer<'a>,
    /// The last token scanned.
    tok: Token,
    syms: SymTable,
    cg: CodeGen<W>,
    flags: DumpFlags,
    debug_out: Option<&'a mut dyn Write>,
}

impl<'a, W: Write> Parser<'a, W> {
    pub fn new(
        lex: Lexer<'a>,
        cg: CodeGen<W>,
        flags: DumpFlags,
        debug_out: Option<&'a mut dyn Write>,
    ) -> Parser<'a, W> {
        Parser {
            lex,
            tok: Token::default(),
            syms: SymTable::new(),
            cg,
            flags,
            debug_out,
        }
    }

    /// Parse the whole input and emit its IR, then the deferred string
    /// literal and global data sections.
    ///
    /// input_file = function_declaration* EOF
    pub fn parse_file(&mut self) -> Result<()> {
        self.scan()?;
        while self.tok.kind != TokenKind::Eof {
            self.function_declaration()?;
        }
        self.with_cg(|cg, _| cg.emit_strlits())?;
        self.with_cg(|cg, syms| cg.emit_globals(syms))?;

        if self.flags.syms
            && let Some(out) = self.debug_out.as_deref_mut()
        {
            self.syms.dump(out)?;
        }
        debug!("parse complete");
        Ok(())
    }

    /// Hand back the output sink once compilation is finished.
    pub fn into_output(self) -> W {
        self.cg.into_inner()
    }

    // ----- token plumbing -------------------------------------------------

    fn scan(&mut self) -> Result<()> {
        self.tok = self.lex.scan()?;
        Ok(())
    }

    fn fatal(&self, message: impl Into<String>) -> CompileError {
        self.lex.fatal(message)
    }

    /// Ensure the current token matches, without advancing.
    fn check(&self, kind: TokenKind) -> Result<()> {
        if self.tok.kind != kind {
            return Err(self.fatal(format!(
                "Expected {}, got {}",
                kind.name(),
                self.tok.kind.name()
            )));
        }
        Ok(())
    }

    /// Ensure the current token matches and advance past it.
    fn expect(&mut self, kind: TokenKind) -> Result<()> {
        self.check(kind)?;
        self.scan()
    }

    fn semi(&mut self) -> Result<()> {
        self.expect(TokenKind::Semi)
    }

    fn lbrace(&mut self) -> Result<()> {
        self.expect(TokenKind::LBrace)
    }

    fn rbrace(&mut self) -> Result<()> {
        self.expect(TokenKind::RBrace)
    }

    fn lparen(&mut self) -> Result<()> {
        self.expect(TokenKind::LParen)
    }

    fn rparen(&mut self) -> Result<()> {
        self.expect(TokenKind::RParen)
    }

    fn comma(&mut self) -> Result<()> {
        self.expect(TokenKind::Comma)
    }

    /// Run a code generation step, stamping the current source position
    /// onto any failure.
    fn with_cg<T>(
        &mut self,
        f: impl FnOnce(&mut CodeGen<W>, &SymTable) -> CgResult<T>,
    ) -> Result<T> {
        let filename = self.lex.filename().to_string();
        let line = self.lex.line();
        f(&mut self.cg, &self.syms)
            .map_err(|e| CompileError::fatal(filename, line, e.to_string()))
    }

    // ----- typing helpers -------------------------------------------------

    /// Widen an expression to a fixed target type or fail.
    fn widen_expr(&self, node: &mut AstNode, ty: Type) -> Result<()> {
        match types::widen_type(node, ty) {
            Ok(true) => Ok(()),
            Ok(false) => Err(self.fatal(format!(
                "Incompatible types {} vs {}",
                node.ty.map_or("?", |t| t.name()),
                ty.name()
            ))),
            Err(e) => Err(self.fatal(e.to_string())),
        }
    }

    /// Join two subtrees with a binary operator and type the result.
    fn binop(&self, left: AstNode, right: AstNode, op: Op) -> Result<AstNode> {
        let mut n = AstNode::node(op, Some(left), None, Some(right));
        n.rvalue = true;
        types::add_type(&mut n).map_err(|e| self.fatal(e.to_string()))?;
        Ok(n)
    }

    /// Apply a unary operator. NOT yields bool; the others keep the
    /// operand's type.
    fn unarop(&self, left: AstNode, op: Op) -> AstNode {
        let ty = if op == Op::Not {
            Some(Type::Bool)
        } else {
            left.ty
        };
        let mut n = AstNode::node(op, Some(left), None, None);
        n.ty = ty;
        n.rvalue = true;
        n
    }

    // ----- declarations ---------------------------------------------------

    /// function_declaration = function_prototype statement_block
    ///                      | function_prototype ';'
    fn function_declaration(&mut self) -> Result<()> {
        let func = self.function_prototype()?;

        if self.tok.kind == TokenKind::Semi {
            // A prototype only.
            self.add_function(&func)?;
            self.scan()?;
            return Ok(());
        }

        self.declare_function(&func)?;
        let body = self.statement_block()?;
        self.gen_func_statement_block(body)
    }

    /// function_prototype = typed_declaration '(' typed_declaration_list ')'
    ///                    | typed_declaration '(' 'void' ')'
    fn function_prototype(&mut self) -> Result<AstNode> {
        let mut func = self.typed_declaration()?;
        self.lparen()?;
        if self.tok.kind == TokenKind::Void {
            self.scan()?;
        } else {
            let params = self.typed_declaration_list()?;
            func.left = Some(Box::new(params));
        }
        self.rparen()?;
        Ok(func)
    }

    /// typed_declaration_list = typed_declaration (',' typed_declaration)*
    ///
    /// The declarations chain through the middle child.
    fn typed_declaration_list(&mut self) -> Result<AstNode> {
        let mut first = self.typed_declaration()?;
        if self.tok.kind == TokenKind::Comma {
            self.scan()?;
            first.mid = Some(Box::new(self.typed_declaration_list()?));
        }
        Ok(first)
    }

    /// typed_declaration = type IDENT
    fn typed_declaration(&mut self) -> Result<AstNode> {
        let ty = self.parse_type()?;
        self.check(TokenKind::Ident)?;
        let name = self.tok.text.take();
        self.scan()?;

        let mut n = AstNode::leaf(Op::Ident, Some(ty), false, LitVal::default());
        n.name = name;
        Ok(n)
    }

    fn parse_type(&mut self) -> Result<Type> {
        let ty = self
            .tok
            .kind
            .type_keyword()
            .ok_or_else(|| self.fatal(format!("Unknown type {}", self.tok.kind.name())))?;
        self.scan()?;
        Ok(ty)
    }

    fn node_name<'n>(&self, n: &'n AstNode) -> Result<&'n str> {
        n.name
            .as_deref()
            .ok_or_else(|| self.fatal("declaration without a name"))
    }

    fn node_type(&self, n: &AstNode) -> Result<Type> {
        n.ty.ok_or_else(|| self.fatal("declaration without a type"))
    }

    /// Record a function declaration in the symbol table, or verify it
    /// against a previous declaration. Returns true when a previous
    /// declaration already attached a statement block.
    fn add_function(&mut self, func: &AstNode) -> Result<bool> {
        let name = self.node_name(func)?.to_string();
        let ty = self.node_type(func)?;

        if let Some(id) = self.syms.find_id(&name) {
            let existing = self.syms.get(id);
            if existing.kind != SymKind::Function {
                return Err(self.fatal(format!("symbol {} already exists", name)));
            }
            if existing.ty != ty {
                return Err(self.fatal(format!(
                    "{}() declaration has different type than previous: {} vs {}",
                    name,
                    ty.name(),
                    existing.ty.name()
                )));
            }

            // Walk both parameter lists to verify they are the same.
            let mut i = 0;
            let mut plist = func.left.as_deref();
            loop {
                match (existing.params.get(i), plist) {
                    (None, None) => break,
                    (None, Some(_)) | (Some(_), None) => {
                        return Err(self.fatal(format!(
                            "{}() declaration: # params different than previous",
                            name
                        )));
                    }
                    (Some(prev), Some(node)) => {
                        let pname = self.node_name(node)?;
                        if prev.name != pname {
                            return Err(self.fatal(format!(
                                "{}() declaration: param name mismatch {} vs {}",
                                name, prev.name, pname
                            )));
                        }
                        let pty = self.node_type(node)?;
                        if prev.ty != pty {
                            return Err(self.fatal(format!(
                                "{}() declaration: param type mismatch {} vs {}",
                                name,
                                prev.ty.name(),
                                pty.name()
                            )));
                        }
                        i += 1;
                        plist = node.mid.as_deref();
                    }
                }
            }
            return Ok(existing.has_body);
        }

        // A new function: collect its parameters.
        let mut sym = Sym::function(&name, ty);
        let mut plist = func.left.as_deref();
        while let Some(node) = plist {
            let pname = self.node_name(node)?;
            if sym.params.iter().any(|p| p.name == pname) {
                return Err(self.fatal(format!("symbol {} already exists", pname)));
            }
            sym.params.push(Sym::variable(pname, self.node_type(node)?));
            plist = node.mid.as_deref();
        }

        if self.syms.add(sym).is_none() {
            return Err(self.fatal(format!("symbol {} already exists", name)));
        }
        Ok(false)
    }

    /// Declare a function that has a statement block: emit its preamble
    /// and open its scope.
    fn declare_function(&mut self, func: &AstNode) -> Result<()> {
        let name = self.node_name(func)?.to_string();

        // Bodies cannot yield a value, so only void functions may have
        // one; non-void prototypes stay legal for external functions.
        if self.node_type(func)? != Type::Void {
            return Err(self.fatal(format!("function {}() must return void", name)));
        }

        if self.add_function(func)? {
            return Err(self.fatal(format!("multiple declarations for {}()", name)));
        }

        let id = self
            .syms
            .find_id(&name)
            .ok_or_else(|| self.fatal(format!("unknown function {}()", name)))?;
        self.syms.get_mut(id).has_body = true;

        debug!(func = %name, "compiling function body");
        self.with_cg(|cg, syms| cg.func_preamble(syms.get(id)))?;
        self.syms.new_scope(id);
        Ok(())
    }

    /// Dump, generate, and release one function's statement block, then
    /// close its scope.
    fn gen_func_statement_block(&mut self, body: Option<AstNode>) -> Result<()> {
        if let Some(out) = self.debug_out.as_deref_mut() {
            if self.flags.syms {
                self.syms.dump(out)?;
            }
            if self.flags.ast
                && let Some(body) = &body
            {
                body.dump(out, 0)?;
            }
        }

        self.with_cg(|cg, syms| cg.gen_function(body.as_ref(), syms))?;
        self.with_cg(|cg, _| cg.func_postamble())?;
        self.syms.end_scope();
        Ok(())
    }

    // ----- statements -----------------------------------------------------

    /// statement_block = '{' declaration_stmt* procedural_stmt* '}'
    fn statement_block(&mut self) -> Result<Option<AstNode>> {
        self.lbrace()?;

        if self.tok.kind == TokenKind::RBrace {
            self.scan()?;
            return Ok(None);
        }

        // Declarations come first; they start with a type keyword.
        let decls = if self.tok.kind.type_keyword().is_some() {
            Some(self.declaration_stmts()?)
        } else {
            None
        };

        let stmts = self.procedural_stmts()?;
        self.rbrace()?;

        Ok(match decls {
            None => stmts,
            Some(mut decls) => {
                // Procedural statements hang off the first declaration.
                decls.right = stmts.map(Box::new);
                Some(decls)
            }
        })
    }

    /// declaration_stmts = (typed_declaration '=' expression ';')+
    ///
    /// Chained declarations link through the middle child.
    fn declaration_stmts(&mut self) -> Result<AstNode> {
        let decl = self.typed_declaration()?;
        self.expect(TokenKind::Assign)?;
        let init = self.expression()?;
        self.semi()?;

        let mut this = self.declaration_statement(decl, init)?;
        if self.tok.kind.type_keyword().is_some() {
            this.mid = Some(Box::new(self.declaration_stmts()?));
        }
        Ok(this)
    }

    /// Declare a local variable with its initializer and build the LOCAL
    /// node for it.
    fn declaration_statement(&mut self, mut s: AstNode, mut e: AstNode) -> Result<AstNode> {
        let ty = self.node_type(&s)?;
        self.widen_expr(&mut e, ty)?;

        let name = self.node_name(&s)?.to_string();
        let mut sym = Sym::variable(&name, ty);
        sym.has_addr = true;
        if self.syms.add(sym).is_none() {
            return Err(self.fatal(format!("symbol {} already exists", name)));
        }

        s.sym = Some(SymRef {
            name,
            ty,
            has_addr: true,
        });
        s.left = Some(Box::new(e));
        s.op = Op::Local;
        Ok(s)
    }

    /// Zero or more procedural statements glued into one tree.
    fn procedural_stmts(&mut self) -> Result<Option<AstNode>> {
        let mut left: Option<AstNode> = None;
        while let Some(right) = self.procedural_stmt()? {
            left = Some(match left {
                None => right,
                Some(left) => AstNode::node(Op::Glue, Some(left), None, Some(right)),
            });
        }
        Ok(left)
    }

    /// procedural_stmt = print_stmt | assign_stmt | if_stmt | while_stmt
    ///                 | for_stmt | function_call
    fn procedural_stmt(&mut self) -> Result<Option<AstNode>> {
        match self.tok.kind {
            TokenKind::RBrace => Ok(None),
            TokenKind::Printf => {
                // print_stmt = 'printf' '(' STRLIT ',' expression ')' ';'
                self.scan()?;
                self.lparen()?;

                self.check(TokenKind::StrLit)?;
                let mut fmt = AstNode::leaf(Op::StrLit, None, false, LitVal::default());
                fmt.name = self.tok.text.take();
                self.scan()?;
                self.comma()?;

                let expr = self.expression()?;
                self.rparen()?;
                self.semi()?;
                Ok(Some(self.print_statement(fmt, expr)?))
            }
            TokenKind::If => Ok(Some(self.if_stmt()?)),
            TokenKind::While => Ok(Some(self.while_stmt()?)),
            TokenKind::For => Ok(Some(self.for_stmt()?)),
            TokenKind::Ident => {
                // One token of lookahead picks between an assignment and
                // a function call.
                match self.lex.peek_kind()? {
                    TokenKind::Assign => Ok(Some(self.assign_stmt()?)),
                    TokenKind::LParen => Ok(Some(self.function_call()?)),
                    kind => Err(self.fatal(format!(
                        "Unexpected token {} after identifier",
                        kind.name()
                    ))),
                }
            }
            _ => Ok(None),
        }
    }

    /// Build the PRINT node; flt32 arguments ride the C variadic
    /// promotion up to flt64.
    fn print_statement(&mut self, fmt: AstNode, mut expr: AstNode) -> Result<AstNode> {
        if expr.ty == Some(Type::Flt32) {
            self.widen_expr(&mut expr, Type::Flt64)?;
        }
        Ok(AstNode::node(Op::Print, Some(fmt), None, Some(expr)))
    }

    /// assign_stmt = short_assign_stmt ';'
    fn assign_stmt(&mut self) -> Result<AstNode> {
        let node = self.short_assign_stmt()?;
        self.semi()?;
        Ok(node)
    }

    /// short_assign_stmt = variable '=' expression
    fn short_assign_stmt(&mut self) -> Result<AstNode> {
        let var = self.variable()?;
        self.expect(TokenKind::Assign)?;
        let expr = self.expression()?;
        self.assignment_statement(var, expr)
    }

    fn assignment_statement(&mut self, mut v: AstNode, mut e: AstNode) -> Result<AstNode> {
        let ty = self.node_type(&v)?;
        self.widen_expr(&mut e, ty)?;

        v.rvalue = false;
        v.op = Op::Assign;
        v.left = Some(Box::new(e));
        v.ty = v.sym.as_ref().map(|s| s.ty);
        Ok(v)
    }

    /// if_stmt = 'if' '(' relational_expression ')' statement_block
    ///           ('else' statement_block)?
    fn if_stmt(&mut self) -> Result<AstNode> {
        self.scan()?;
        self.lparen()?;
        let cond = self.relational_expression()?;
        self.rparen()?;
        let then = self.statement_block()?;

        let els = if self.tok.kind == TokenKind::Else {
            self.scan()?;
            self.statement_block()?
        } else {
            None
        };

        Ok(AstNode::node(Op::If, Some(cond), then, els))
    }

    /// while_stmt = 'while' '(' relational_expression ')' statement_block
    fn while_stmt(&mut self) -> Result<AstNode> {
        self.scan()?;
        self.lparen()?;
        let cond = self.relational_expression()?;
        self.rparen()?;
        let body = self.statement_block()?;

        Ok(AstNode::node(Op::While, Some(cond), body, None))
    }

    /// for_stmt = 'for' '(' (declaration | assignment) relational_expression ';'
    ///            short_assign_stmt ')' statement_block
    ///
    /// Lowered before codegen sees it: the body is glued in front of the
    /// increment and the initializer is stashed as the right child, so
    /// the FOR emitter runs the initializer once and falls into the
    /// while shape.
    fn for_stmt(&mut self) -> Result<AstNode> {
        self.scan()?;
        self.lparen()?;

        let init = if self.tok.kind.type_keyword().is_some() {
            // A declared loop variable joins the function scope.
            let decl = self.typed_declaration()?;
            self.expect(TokenKind::Assign)?;
            let e = self.expression()?;
            self.semi()?;
            self.declaration_statement(decl, e)?
        } else {
            self.assign_stmt()?
        };

        let cond = self.relational_expression()?;
        self.semi()?;
        let incr = self.short_assign_stmt()?;
        self.rparen()?;
        let body = self.statement_block()?;

        let body = AstNode::node(Op::Glue, body, None, Some(incr));
        Ok(AstNode::node(Op::For, Some(cond), Some(body), Some(init)))
    }

    /// function_call = IDENT '(' expression_list? ')' ';'
    ///
    /// The callee is resolved and every argument widened to its
    /// parameter type here, so the generator sees a fully typed call.
    fn function_call(&mut self) -> Result<AstNode> {
        self.check(TokenKind::Ident)?;
        let name = self
            .tok
            .text
            .take()
            .ok_or_else(|| self.fatal("identifier without text"))?;
        self.scan()?;
        self.lparen()?;

        let mut args = if self.tok.kind != TokenKind::RParen {
            Some(self.expression_list()?)
        } else {
            None
        };
        self.rparen()?;
        self.semi()?;

        let func = self
            .syms
            .find(&name)
            .ok_or_else(|| self.fatal(format!("unknown function {}()", name)))?;
        if func.kind != SymKind::Function {
            return Err(self.fatal(format!("{} is not a function", name)));
        }
        let ret = func.ty;
        let param_types: Vec<Type> = func.params.iter().map(|p| p.ty).collect();

        // Arguments sit on the right spine of GLUE nodes.
        let mut count = 0;
        let mut cursor = args.as_ref();
        while let Some(glue) = cursor {
            if glue.op == Op::Glue {
                count += 1;
            }
            cursor = glue.right.as_deref();
        }
        if count != param_types.len() {
            return Err(self.fatal(format!(
                "wrong number of arguments to {}(): {} vs. {}",
                name,
                count,
                param_types.len()
            )));
        }

        let mut i = 0;
        let mut cursor = args.as_mut();
        while let Some(glue) = cursor {
            if let Some(arg) = glue.left.as_deref_mut() {
                self.widen_expr(arg, param_types[i])?;
                i += 1;
            }
            cursor = glue.right.as_deref_mut();
        }

        let mut callee = AstNode::leaf(Op::Ident, None, false, LitVal::default());
        callee.name = Some(name.clone());

        let mut n = AstNode::node(Op::FuncCall, Some(callee), None, None);
        n.right = args.map(Box::new);
        n.ty = Some(ret);
        n.sym = Some(SymRef {
            name,
            ty: ret,
            has_addr: false,
        });
        Ok(n)
    }

    /// expression_list = expression (',' expression_list)*
    fn expression_list(&mut self) -> Result<AstNode> {
        let expr = self.expression()?;
        let rest = if self.tok.kind == TokenKind::Comma {
            self.scan()?;
            Some(self.expression_list()?)
        } else {
            None
        };
        Ok(AstNode::node(Op::Glue, Some(expr), None, rest))
    }

    // ----- expressions ----------------------------------------------------

    /// expression = bitwise_expression
    fn expression(&mut self) -> Result<AstNode> {
        self.bitwise_expression()
    }

    /// bitwise_expression = ['~'] relational_expression
    ///                      (('&'|'|'|'^') relational_expression)*
    fn bitwise_expression(&mut self) -> Result<AstNode> {
        let invert = self.tok.kind == TokenKind::Invert;
        if invert {
            self.scan()?;
        }

        let mut left = self.relational_expression()?;
        if invert {
            left = self.unarop(left, Op::Invert);
        }

        loop {
            let op = match self.tok.kind {
                TokenKind::Amper => Op::And,
                TokenKind::Or => Op::Or,
                TokenKind::Xor => Op::Xor,
                _ => break,
            };
            self.scan()?;
            let right = self.relational_expression()?;
            left = self.binop(left, right, op)?;
        }
        Ok(left)
    }

    /// relational_expression = ['!'] shift_expression
    ///                         (relop shift_expression)?
    ///
    /// Non-associative: at most one comparison operator.
    fn relational_expression(&mut self) -> Result<AstNode> {
        let not = self.tok.kind == TokenKind::LogNot;
        if not {
            self.scan()?;
        }

        let mut left = self.shift_expression()?;
        if not {
            left = self.unarop(left, Op::Not);
        }

        let op = match self.tok.kind {
            TokenKind::Ge => Some(Op::Ge),
            TokenKind::Gt => Some(Op::Gt),
            TokenKind::Le => Some(Op::Le),
            TokenKind::Lt => Some(Op::Lt),
            TokenKind::Eq => Some(Op::Eq),
            TokenKind::Ne => Some(Op::Ne),
            _ => None,
        };
        if let Some(op) = op {
            self.scan()?;
            let right = self.shift_expression()?;
            left = self.binop(left, right, op)?;
        }
        Ok(left)
    }

    /// shift_expression = additive_expression
    ///                    (('<<'|'>>') additive_expression)*
    fn shift_expression(&mut self) -> Result<AstNode> {
        let mut left = self.additive_expression()?;
        loop {
            let op = match self.tok.kind {
                TokenKind::Lshift => Op::Lshift,
                TokenKind::Rshift => Op::Rshift,
                _ => break,
            };
            self.scan()?;
            let right = self.additive_expression()?;
            left = self.binop(left, right, op)?;
        }
        Ok(left)
    }

    /// additive_expression = ['+'|'-'] multiplicative_expression
    ///                       (('+'|'-') multiplicative_expression)*
    fn additive_expression(&mut self) -> Result<AstNode> {
        let mut negate = false;
        match self.tok.kind {
            TokenKind::Plus => self.scan()?,
            TokenKind::Minus => {
                self.scan()?;
                negate = true;
            }
            _ => {}
        }

        let mut left = self.multiplicative_expression()?;
        if negate {
            left = self.unarop(left, Op::Negate);
        }

        loop {
            let op = match self.tok.kind {
                TokenKind::Plus => Op::Add,
                TokenKind::Minus => Op::Subtract,
                _ => break,
            };
            self.scan()?;
            let right = self.multiplicative_expression()?;
            left = self.binop(left, right, op)?;
        }
        Ok(left)
    }

    /// multiplicative_expression = factor (('*'|'/') factor)*
    fn multiplicative_expression(&mut self) -> Result<AstNode> {
        let mut left = self.factor()?;
        loop {
            let op = match self.tok.kind {
                TokenKind::Star => Op::Multiply,
                TokenKind::Slash => Op::Divide,
                _ => break,
            };
            self.scan()?;
            let right = self.factor()?;
            left = self.binop(left, right, op)?;
        }
        Ok(left)
    }

    /// factor = NUMLIT | 'true' | 'false' | variable
    fn factor(&mut self) -> Result<AstNode> {
        match self.tok.kind {
            TokenKind::NumLit => {
                let ty = types::litval_type(self.tok.num);
                let lit = match self.tok.num {
                    LitVal::Char(c) => LitVal::Int(c as i64),
                    v => v,
                };
                let f = AstNode::leaf(Op::NumLit, Some(ty), true, lit);
                self.scan()?;
                Ok(f)
            }
            TokenKind::True => {
                let f = AstNode::leaf(Op::NumLit, Some(Type::Bool), true, LitVal::Int(1));
                self.scan()?;
                Ok(f)
            }
            TokenKind::False => {
                let f = AstNode::leaf(Op::NumLit, Some(Type::Bool), true, LitVal::Int(0));
                self.scan()?;
                Ok(f)
            }
            TokenKind::Ident => self.variable(),
            kind => Err(self.fatal(format!("Unknown token as a factor: {}", kind.name()))),
        }
    }

    /// variable = IDENT, resolved against the symbol table.
    fn variable(&mut self) -> Result<AstNode> {
        self.check(TokenKind::Ident)?;
        let name = self
            .tok
            .text
            .take()
            .ok_or_else(|| self.fatal("identifier without text"))?;

        let sym = self
            .syms
            .find(&name)
            .ok_or_else(|| self.fatal(format!("Unknown variable {}", name)))?;
        if sym.kind != SymKind::Variable {
            return Err(self.fatal(format!("Symbol {} is not a variable", name)));
        }

        let mut n = AstNode::leaf(Op::Ident, Some(sym.ty), false, LitVal::default());
        n.sym = Some(SymRef::from(sym));
        n.name = Some(name);
        self.scan()?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn compile(source: &str) -> Result<String> {
        let lex = Lexer::new(source, "test.mc");
        let cg = CodeGen::new(Vec::new());
        let mut parser = Parser::new(lex, cg, DumpFlags::default(), None);
        parser.parse_file()?;
        Ok(String::from_utf8(parser.into_output()).expect("utf8 IR"))
    }

    fn errmsg(source: &str) -> String {
        compile(source).expect_err("expected a fatal").to_string()
    }

    #[test]
    fn test_local_declaration_and_assignment() {
        let ir = compile("void f(void) { int32 x = 1; x = x + 2; }").unwrap();
        assert!(ir.contains("export function $f() {"));
        assert!(ir.contains("%x =l alloc4 1"));
        assert!(ir.contains("copy 1"));
        assert!(ir.contains("storew %.t2, %x"));
        assert!(ir.contains("loadsw %x"));
        assert!(ir.contains("add"));
        assert!(ir.contains("@END\n  ret\n}"));
    }

    #[test]
    fn test_float_print_promotes_to_double() {
        let ir = compile("void g(void) { flt32 f = 1; printf(\"%f\\n\", f); }").unwrap();
        // The literal 1 was retyped to flt32, not cast.
        assert!(ir.contains("copy s_1.0"));
        assert!(ir.contains("=d exts"));
        assert!(ir.contains("call $printf(l $L"));
        assert!(ir.contains("d %.t"));
    }

    #[test]
    fn test_for_loop_lowers_to_while() {
        let ir =
            compile("void h(void) { for (int32 i = 0 ; i < 10 ; i = i + 1) { printf(\"%d\\n\", i); } }")
                .unwrap();
        // Initializer stored once, one conditional branch, one back jump.
        assert_eq!(ir.matches("alloc4").count(), 1);
        assert_eq!(ir.matches("jnz").count(), 1);
        assert_eq!(ir.matches("jmp").count(), 1);
        assert!(ir.contains("csltw"));
    }

    #[test]
    fn test_for_loop_with_assignment_initializer() {
        let ir = compile(
            "void h(void) { int32 i = 0; for (i = 0 ; i < 3 ; i = i + 1) { i = i; } }",
        )
        .unwrap();
        assert_eq!(ir.matches("jmp").count(), 1);
    }

    #[test]
    fn test_if_else_emission() {
        let ir = compile(
            "void f(int32 x) { if (x == 1) { x = 2; } else { x = 3; } }",
        )
        .unwrap();
        assert_eq!(ir.matches("jnz").count(), 1);
        // The filler label in front of the else-skipping jump keeps the
        // backend from seeing two terminators in a row.
        assert_eq!(ir.matches("jmp").count(), 1);
        assert!(ir.contains("ceqw"));
    }

    #[test]
    fn test_if_without_else_has_no_jump() {
        let ir = compile("void f(int32 x) { if (x == 1) { x = 2; } }").unwrap();
        assert_eq!(ir.matches("jnz").count(), 1);
        assert_eq!(ir.matches("jmp").count(), 0);
    }

    #[test]
    fn test_params_are_ssa_values() {
        let ir = compile("void f(int32 a) { a = a + 1; }").unwrap();
        assert!(ir.contains("export function $f(w %a) {"));
        // Parameters have no address: copies, not loads and stores.
        assert!(ir.contains("copy %a"));
        assert!(ir.contains("%a =w copy %.t"));
        assert!(!ir.contains("load"));
    }

    #[test]
    fn test_empty_body() {
        let ir = compile("void f(void) {}").unwrap();
        assert!(ir.contains("export function $f() {\n@START\n@END\n  ret\n}"));
    }

    #[test]
    fn test_prototype_then_body_accepted() {
        let ir = compile("void k(void); void k(void) { int32 x = 1; }").unwrap();
        assert_eq!(ir.matches("export function $k").count(), 1);
    }

    #[test]
    fn test_redeclaring_same_prototype_accepted() {
        let ir = compile("void k(int32 a); void k(int32 a); void k(int32 a) {}").unwrap();
        assert_eq!(ir.matches("export function $k").count(), 1);
    }

    #[test]
    fn test_uint64_literal_emits_reinterpreted_bits() {
        let ir = compile("void f(void) { uint64 x = 18446744073709551615; }").unwrap();
        assert!(ir.contains("=l copy -1"));
    }

    #[test]
    fn test_second_body_is_fatal() {
        let msg = errmsg("void k(void) {} void k(void) {}");
        assert!(msg.contains("multiple declarations for k()"));
    }

    #[test]
    fn test_prototype_mismatches() {
        assert!(
            errmsg("void k(void); int32 k(void);")
                .contains("k() declaration has different type than previous: int32 vs void")
        );
        assert!(
            errmsg("void k(int32 a); void k(int32 a, int32 b);")
                .contains("k() declaration: # params different than previous")
        );
        assert!(
            errmsg("void k(int32 a); void k(int32 b);")
                .contains("k() declaration: param name mismatch a vs b")
        );
        assert!(
            errmsg("void k(int32 a); void k(int64 a);")
                .contains("k() declaration: param type mismatch int32 vs int64")
        );
    }

    #[test]
    fn test_negative_to_unsigned_is_fatal() {
        let msg = errmsg("void f(void) { uint8 x = -1; }");
        assert!(msg.contains("Cannot cast negative literal value -1 to be unsigned"));
    }

    #[test]
    fn test_incompatible_types_fatal() {
        let msg = errmsg("void f(uint32 u) { int64 x = u; }");
        assert!(msg.contains("Incompatible types uint32 vs int64"));
    }

    #[test]
    fn test_string_literals_deduplicate() {
        let ir = compile(
            "void f(int32 x) { printf(\"hello\", x); printf(\"hello\", x); }",
        )
        .unwrap();
        assert_eq!(ir.matches("b \"hello\"").count(), 1);
    }

    #[test]
    fn test_unknown_variable_fatal() {
        let msg = errmsg("void f(void) { x = 1; }");
        assert!(msg.contains("Unknown variable x"));
    }

    #[test]
    fn test_call_to_unknown_function_fatal() {
        let msg = errmsg("void f(void) { g(); }");
        assert!(msg.contains("unknown function g()"));
    }

    #[test]
    fn test_variable_called_as_function_fatal() {
        let msg = errmsg("void f(void) { int32 x = 1; x(); }");
        assert!(msg.contains("x is not a function"));
    }

    #[test]
    fn test_function_used_as_variable_fatal() {
        let msg = errmsg("void g(void); void f(void) { g = 1; }");
        assert!(msg.contains("Symbol g is not a variable"));
    }

    #[test]
    fn test_wrong_argument_count_fatal() {
        let msg = errmsg("void g(int32 a); void f(void) { g(1, 2); }");
        assert!(msg.contains("wrong number of arguments to g(): 2 vs. 1"));
    }

    #[test]
    fn test_call_widens_arguments() {
        let ir = compile("void g(flt64 a); void f(void) { g(2); }").unwrap();
        // The literal was retyped to flt64 and passed as d.
        assert!(ir.contains("copy d_2.0"));
        assert!(ir.contains("call $g(d %.t"));
    }

    #[test]
    fn test_void_call_does_not_assign() {
        let ir = compile("void g(void); void f(void) { g(); }").unwrap();
        assert!(ir.contains("  call $g()"));
        assert!(!ir.contains("=w call $g"));
    }

    #[test]
    fn test_nonvoid_prototype_call_assigns_temp() {
        let ir = compile("int32 getchar(void); void f(void) { getchar(); }").unwrap();
        assert!(ir.contains("=w call $getchar()"));
    }

    #[test]
    fn test_nonvoid_body_is_fenced() {
        let msg = errmsg("int32 f(void) { int32 x = 1; }");
        assert!(msg.contains("function f() must return void"));
    }

    #[test]
    fn test_unexpected_token_after_identifier() {
        let msg = errmsg("void f(void) { int32 x = 1; x + 1; }");
        assert!(msg.contains("Unexpected token + after identifier"));
    }

    #[test]
    fn test_expected_token_diagnostic() {
        let msg = errmsg("void f(void) { int32 x = 1 }");
        assert!(msg.contains("Expected ;, got }"));
    }

    #[test]
    fn test_declarations_must_precede_statements() {
        // A declaration after a procedural statement is not part of the
        // grammar; the type keyword stops the statement list cold.
        let msg = errmsg("void f(void) { int32 x = 1; x = 2; int32 y = 3; }");
        assert!(msg.contains("Expected }, got int32"));
    }

    #[test]
    fn test_unsigned_compare_uses_unsigned_opcodes() {
        let ir = compile("void f(uint32 a) { if (a < 10) { a = 1; } }").unwrap();
        assert!(ir.contains("cultw"));
    }

    #[test]
    fn test_bool_compare_keys_off_left_operand() {
        let ir = compile("void f(bool b) { if (b == true) { b = false; } }").unwrap();
        // bool is signed-ish: the signed opcode family on a word.
        assert!(ir.contains("ceqw"));
    }

    #[test]
    fn test_widening_assignment_emits_ext() {
        let ir = compile("void f(int32 x) { int64 y = x; }").unwrap();
        assert!(ir.contains("=l extsw"));
    }

    #[test]
    fn test_bitwise_and_shift_operators() {
        let ir = compile("void f(int32 x) { x = ~x << 2 & x >> 1 ^ x | 3; }").unwrap();
        for op in ["shl", "shr", "and", "xor", "or"] {
            assert!(ir.contains(op), "missing {}", op);
        }
        assert!(ir.contains("xor %.t") && ir.contains(", -1"));
    }

    #[test]
    fn test_logical_not_compares_against_zero() {
        let ir = compile("void f(int64 x) { if (!x) { x = 1; } }").unwrap();
        // The suffix comes from the operand type, the result is a word.
        assert!(ir.contains("=w ceql %.t"));
    }

    #[test]
    fn test_negate_emits_sub_from_zero() {
        let ir = compile("void f(int32 x) { x = -x; }").unwrap();
        assert!(ir.contains("sub 0, %.t"));
    }

    #[test]
    fn test_char_literal_is_an_integer() {
        let ir = compile("void f(void) { int32 c = 'A'; }").unwrap();
        assert!(ir.contains("copy 65"));
    }

    #[test]
    fn test_chained_declarations() {
        let ir = compile("void f(void) { int32 x = 1; int32 y = 2; x = y; }").unwrap();
        assert!(ir.contains("%x =l alloc4 1"));
        assert!(ir.contains("%y =l alloc4 1"));
    }

    #[test]
    fn test_duplicate_local_fatal() {
        let msg = errmsg("void f(void) { int32 x = 1; int32 x = 2; }");
        assert!(msg.contains("symbol x already exists"));
    }

    #[test]
    fn test_locals_do_not_leak_between_functions() {
        let ir = compile("void f(void) { int32 x = 1; } void g(void) { int32 x = 2; }");
        assert!(ir.is_ok());
    }

    #[test]
    fn test_linemark_positions_diagnostics() {
        let msg = errmsg("# 7 \"prog.mc\"\nvoid f(void) { y = 1; }");
        assert!(msg.starts_with("prog.mc line 7:"), "got: {}", msg);
    }
}

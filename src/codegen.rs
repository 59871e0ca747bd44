//! x86-64 Code Generator
//!
//! Generates GNU (AT&T) assembly text from the C AST in a single pass.
//! Every expression leaves its result in %eax (32-bit values) or %rax
//! (pointers and addresses). Locals live in the stack frame and are
//! addressed relative to %rbp; arguments arrive in the System V integer
//! registers and are spilled to the frame on entry.

use std::collections::HashMap;

use thiserror::Error;

use crate::ast::*;

/// System V argument registers, in order.
const ARG_REGS: [&str; 6] = ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"];

#[derive(Debug, Error)]
#[error("codegen error: {message}")]
pub struct CodegenError {
    pub message: String,
}

impl CodegenError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

type Result<T> = std::result::Result<T, CodegenError>;

/// Symbol information
#[derive(Debug, Clone)]
enum Symbol {
    Local { offset: i64, ty: Type }, // stack offset from %rbp
    Global { ty: Type },             // named object in .data/.bss
}

/// A function's registered signature, from its prototype or definition.
#[derive(Debug, Clone)]
struct FnSig {
    #[allow(dead_code)]
    params: Vec<Type>,
    return_type: Type,
}

/// Code generator state. All of it is owned by one compilation; running
/// two compilations concurrently just means two `CodeGen` values.
pub struct CodeGen {
    out: String,
    // Current function context: flat map of locals and spilled parameters.
    // Re-declaring a name overwrites the binding (last writer wins).
    symbols: HashMap<String, Symbol>,
    // Global symbols (persist across functions)
    globals: HashMap<String, Type>,
    functions: HashMap<String, FnSig>,
    strings: Vec<(String, Vec<u8>)>, // (label, bytes) string pool
    label_counter: u32,
    frame_bytes: i64, // bytes allocated so far in the current frame
}

fn align_to(n: i64, align: i64) -> i64 {
    (n + align - 1) / align * align
}

/// Reserve a frame slot for one declaration and return its %rbp offset.
/// Scalars always take 8 bytes; arrays take their full size and end on a
/// 16-byte boundary so the data below stays aligned.
fn alloc_slot(bytes: &mut i64, ty: &Type) -> i64 {
    if ty.is_array() {
        *bytes += ty.size() as i64;
        *bytes = align_to(*bytes, 16);
    } else {
        *bytes += 8;
    }
    -*bytes
}

/// Total frame size for a function: one pass over the declarations using
/// the same allocation rule the body walk applies, rounded up to 16.
fn frame_size(func: &Function) -> i64 {
    let mut bytes = 0i64;
    for param in &func.params {
        alloc_slot(&mut bytes, &param.ty);
    }
    if let Some(body) = &func.body {
        walk_decls(body, &mut bytes);
    }
    align_to(bytes, 16)
}

fn walk_decls(stmts: &[Stmt], bytes: &mut i64) {
    for stmt in stmts {
        walk_decl(stmt, bytes);
    }
}

fn walk_decl(stmt: &Stmt, bytes: &mut i64) {
    match stmt {
        Stmt::VarDecl(ty, _, _) => {
            alloc_slot(bytes, ty);
        }
        Stmt::Block(stmts) => walk_decls(stmts, bytes),
        Stmt::If(_, then_branch, else_branch) => {
            walk_decl(then_branch, bytes);
            if let Some(else_branch) = else_branch {
                walk_decl(else_branch, bytes);
            }
        }
        Stmt::While(_, body) => walk_decl(body, bytes),
        Stmt::For(init, _, _, body) => {
            if let Some(init) = init {
                walk_decl(init, bytes);
            }
            walk_decl(body, bytes);
        }
        Stmt::Expr(_) | Stmt::Return(_) => {}
    }
}

/// Fold an initializer down to a constant, if it is one.
fn const_int(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::IntLit(n) => Some(*n),
        Expr::Unary(UnOp::Neg, inner) => const_int(inner).map(|v| -v),
        _ => None,
    }
}

/// `.comm` size and alignment for a global: full array size (at least one
/// element) and `min(size, 16)` alignment.
fn global_layout(ty: &Type) -> (usize, usize) {
    let size = match ty {
        Type::Array(inner, count) => inner.size() * (*count).max(1),
        other => other.size(),
    };
    (size, size.min(16))
}

/// Re-encode pooled bytes for a `.string` directive.
fn escape_string(bytes: &[u8]) -> String {
    let mut out = String::new();
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{:03o}", b)),
        }
    }
    out
}

impl CodeGen {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            symbols: HashMap::new(),
            globals: HashMap::new(),
            functions: HashMap::new(),
            strings: Vec::new(),
            label_counter: 0,
            frame_bytes: 0,
        }
    }

    fn emit(&mut self, line: &str) {
        self.out.push_str("    ");
        self.out.push_str(line);
        self.out.push('\n');
    }

    fn emit_label(&mut self, label: &str) {
        self.out.push_str(label);
        self.out.push_str(":\n");
    }

    fn raw(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push('\n');
    }

    fn new_label(&mut self, prefix: &str) -> String {
        self.label_counter += 1;
        format!(".L{}{}", prefix, self.label_counter)
    }

    fn new_string_label(&mut self) -> String {
        self.label_counter += 1;
        format!(".str{}", self.label_counter)
    }

    fn lookup(&self, name: &str) -> Option<Symbol> {
        self.symbols.get(name).cloned().or_else(|| {
            self.globals
                .get(name)
                .map(|ty| Symbol::Global { ty: ty.clone() })
        })
    }

    /// Generate the assembly document for a translation unit
    pub fn generate(&mut self, unit: &TranslationUnit) -> Result<String> {
        // Pre-pass: register every function signature and global name so
        // forward references work while walking bodies
        let mut global_order: Vec<Global> = Vec::new();
        for decl in &unit.decls {
            match decl {
                Decl::Function(func) => {
                    self.functions.insert(
                        func.name.clone(),
                        FnSig {
                            params: func.params.iter().map(|p| p.ty.clone()).collect(),
                            return_type: func.return_type.clone(),
                        },
                    );
                }
                Decl::Global(global) => {
                    self.globals.insert(global.name.clone(), global.ty.clone());
                    global_order.push(global.clone());
                }
            }
        }

        self.raw(".section .note.GNU-stack,\"\",@progbits");
        self.raw(".section .text");
        self.raw(".globl main");

        // Function bodies in source order; prototypes emit nothing
        for decl in &unit.decls {
            if let Decl::Function(func) = decl {
                self.gen_function(func)?;
            }
        }

        // Pooled string literals
        if !self.strings.is_empty() {
            self.raw(".section .rodata");
            let pooled = std::mem::take(&mut self.strings);
            for (label, bytes) in &pooled {
                self.emit_label(label);
                self.emit(&format!(".string \"{}\"", escape_string(bytes)));
            }
        }

        // Globals with a constant initializer land in .data, the rest in .bss
        let mut data_lines: Vec<String> = Vec::new();
        let mut bss_lines: Vec<String> = Vec::new();
        for global in &global_order {
            match &global.init {
                Some(init) => {
                    let value = const_int(init).ok_or_else(|| {
                        CodegenError::new(format!(
                            "initializer for global '{}' is not a constant integer",
                            global.name
                        ))
                    })?;
                    let directive = match global.ty {
                        Type::Char => "byte",
                        Type::Pointer(_) => "quad",
                        _ => "long",
                    };
                    data_lines.push(format!("{}:", global.name));
                    data_lines.push(format!("    .{directive} {value}"));
                }
                None => {
                    let (size, align) = global_layout(&global.ty);
                    bss_lines.push(format!("    .comm {}, {}, {}", global.name, size, align));
                }
            }
        }
        if !data_lines.is_empty() {
            self.raw(".section .data");
            for line in &data_lines {
                self.raw(line);
            }
        }
        if !bss_lines.is_empty() {
            self.raw(".section .bss");
            for line in &bss_lines {
                self.raw(line);
            }
        }

        Ok(std::mem::take(&mut self.out))
    }

    fn gen_function(&mut self, func: &Function) -> Result<()> {
        let Some(body) = &func.body else {
            return Ok(());
        };

        // Reset per-function state
        self.symbols.clear();
        self.frame_bytes = 0;

        self.emit_label(&func.name);
        self.emit("pushq %rbp");
        self.emit("movq %rsp, %rbp");
        let frame = frame_size(func);
        if frame > 0 {
            self.emit(&format!("subq ${frame}, %rsp"));
        }

        // Spill incoming arguments to their frame slots
        for (i, param) in func.params.iter().enumerate() {
            let offset = alloc_slot(&mut self.frame_bytes, &param.ty);
            self.emit(&format!("movq {}, {offset}(%rbp)", ARG_REGS[i]));
            if !param.name.is_empty() {
                self.symbols.insert(
                    param.name.clone(),
                    Symbol::Local {
                        offset,
                        ty: param.ty.clone(),
                    },
                );
            }
        }

        for stmt in body {
            self.gen_stmt(stmt)?;
        }

        // Fallback so a body without a trailing return does not fall through
        self.emit("movl $0, %eax");
        self.emit("leave");
        self.emit("ret");
        Ok(())
    }

    fn gen_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Expr(Some(expr)) => self.gen_expr(expr)?,
            Stmt::Expr(None) => {}

            Stmt::VarDecl(ty, name, init) => {
                let offset = alloc_slot(&mut self.frame_bytes, ty);
                self.symbols.insert(
                    name.clone(),
                    Symbol::Local {
                        offset,
                        ty: ty.clone(),
                    },
                );
                if let Some(init) = init {
                    self.gen_expr(init)?;
                    self.store_local(offset, ty);
                }
            }

            Stmt::Block(stmts) => {
                for s in stmts {
                    self.gen_stmt(s)?;
                }
            }

            Stmt::If(cond, then_branch, else_branch) => {
                self.gen_expr(cond)?;
                self.emit("cmpl $0, %eax");
                match else_branch {
                    Some(else_stmt) => {
                        let else_label = self.new_label("else");
                        let end_label = self.new_label("end");
                        self.emit(&format!("je {else_label}"));
                        self.gen_stmt(then_branch)?;
                        self.emit(&format!("jmp {end_label}"));
                        self.emit_label(&else_label);
                        self.gen_stmt(else_stmt)?;
                        self.emit_label(&end_label);
                    }
                    None => {
                        let end_label = self.new_label("end");
                        self.emit(&format!("je {end_label}"));
                        self.gen_stmt(then_branch)?;
                        self.emit_label(&end_label);
                    }
                }
            }

            Stmt::While(cond, body) => {
                let cond_label = self.new_label("while");
                let end_label = self.new_label("endwhile");
                self.emit_label(&cond_label);
                self.gen_expr(cond)?;
                self.emit("cmpl $0, %eax");
                self.emit(&format!("je {end_label}"));
                self.gen_stmt(body)?;
                self.emit(&format!("jmp {cond_label}"));
                self.emit_label(&end_label);
            }

            Stmt::For(init, cond, update, body) => {
                let cond_label = self.new_label("for");
                let end_label = self.new_label("endfor");
                if let Some(init) = init {
                    self.gen_stmt(init)?;
                }
                self.emit_label(&cond_label);
                // A missing condition is always true
                if let Some(cond) = cond {
                    self.gen_expr(cond)?;
                    self.emit("cmpl $0, %eax");
                    self.emit(&format!("je {end_label}"));
                }
                self.gen_stmt(body)?;
                if let Some(update) = update {
                    self.gen_expr(update)?;
                }
                self.emit(&format!("jmp {cond_label}"));
                self.emit_label(&end_label);
            }

            Stmt::Return(expr) => {
                match expr {
                    Some(e) => self.gen_expr(e)?,
                    None => self.emit("movl $0, %eax"),
                }
                self.emit("leave");
                self.emit("ret");
            }
        }
        Ok(())
    }

    /// Infer the type of an expression from the symbol environment.
    fn expr_type(&self, expr: &Expr) -> Option<Type> {
        match expr {
            Expr::IntLit(_) => Some(Type::Int),
            Expr::StringLit(_) => Some(Type::Pointer(Box::new(Type::Char))),
            Expr::Var(name) => self.lookup(name).map(|sym| match sym {
                Symbol::Local { ty, .. } => ty,
                Symbol::Global { ty } => ty,
            }),
            Expr::Unary(UnOp::Deref, inner) => {
                self.expr_type(inner).and_then(|t| t.element().cloned())
            }
            Expr::Unary(UnOp::AddrOf, inner) => self
                .expr_type(inner)
                .map(|t| Type::Pointer(Box::new(t))),
            Expr::Unary(_, _) => Some(Type::Int),
            Expr::Index(arr, _) => self.expr_type(arr).and_then(|t| t.element().cloned()),
            Expr::Call(name, _) => Some(
                self.functions
                    .get(name)
                    .map(|sig| sig.return_type.clone())
                    .unwrap_or(Type::Int),
            ),
            Expr::Assign(target, _) => self.expr_type(target),
            Expr::Binary(_, _, _) => Some(Type::Int),
        }
    }

    fn gen_expr(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::IntLit(n) => {
                self.emit(&format!("movl ${n}, %eax"));
            }

            Expr::StringLit(bytes) => {
                let label = self.new_string_label();
                self.strings.push((label.clone(), bytes.clone()));
                self.emit(&format!("leaq {label}(%rip), %rax"));
            }

            Expr::Var(name) => match self.lookup(name) {
                Some(Symbol::Local { offset, ty }) => self.load_local(offset, &ty),
                Some(Symbol::Global { ty }) => self.load_global(name, &ty),
                None => {
                    return Err(CodegenError::new(format!("undefined identifier '{name}'")));
                }
            },

            Expr::Unary(UnOp::AddrOf, inner) => self.gen_addr(inner)?,

            Expr::Unary(UnOp::Deref, inner) => {
                let elem = self
                    .expr_type(inner)
                    .and_then(|t| t.element().cloned())
                    .ok_or_else(|| {
                        CodegenError::new("cannot dereference a non-pointer expression")
                    })?;
                self.gen_expr(inner)?;
                self.load_indirect(&elem);
            }

            Expr::Unary(UnOp::Neg, inner) => {
                self.gen_expr(inner)?;
                self.emit("negl %eax");
            }

            Expr::Unary(UnOp::Not, inner) => {
                self.gen_expr(inner)?;
                self.emit("cmpl $0, %eax");
                self.emit("sete %al");
                self.emit("movzbl %al, %eax");
            }

            Expr::Binary(BinOp::LogAnd, lhs, rhs) => {
                // Short-circuit: the result is 0 or 1, never the operand
                let false_label = self.new_label("false");
                let end_label = self.new_label("end");
                self.gen_expr(lhs)?;
                self.emit("cmpl $0, %eax");
                self.emit(&format!("je {false_label}"));
                self.gen_expr(rhs)?;
                self.emit("cmpl $0, %eax");
                self.emit(&format!("je {false_label}"));
                self.emit("movl $1, %eax");
                self.emit(&format!("jmp {end_label}"));
                self.emit_label(&false_label);
                self.emit("movl $0, %eax");
                self.emit_label(&end_label);
            }

            Expr::Binary(BinOp::LogOr, lhs, rhs) => {
                let true_label = self.new_label("true");
                let end_label = self.new_label("end");
                self.gen_expr(lhs)?;
                self.emit("cmpl $0, %eax");
                self.emit(&format!("jne {true_label}"));
                self.gen_expr(rhs)?;
                self.emit("cmpl $0, %eax");
                self.emit(&format!("jne {true_label}"));
                self.emit("movl $0, %eax");
                self.emit(&format!("jmp {end_label}"));
                self.emit_label(&true_label);
                self.emit("movl $1, %eax");
                self.emit_label(&end_label);
            }

            Expr::Binary(op, lhs, rhs) => {
                // Evaluate right first and park it on the stack so the
                // left operand ends up in %eax, the right in %ecx
                self.gen_expr(rhs)?;
                self.emit("pushq %rax");
                self.gen_expr(lhs)?;
                self.emit("popq %rcx");
                match op {
                    BinOp::Add => self.emit("addl %ecx, %eax"),
                    BinOp::Sub => self.emit("subl %ecx, %eax"),
                    BinOp::Mul => self.emit("imull %ecx, %eax"),
                    BinOp::Div => {
                        self.emit("cltd");
                        self.emit("idivl %ecx");
                    }
                    BinOp::Mod => {
                        self.emit("cltd");
                        self.emit("idivl %ecx");
                        self.emit("movl %edx, %eax");
                    }
                    BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
                        // cmpl %ecx, %eax computes left - right
                        self.emit("cmpl %ecx, %eax");
                        let set = match op {
                            BinOp::Eq => "sete %al",
                            BinOp::Ne => "setne %al",
                            BinOp::Lt => "setl %al",
                            BinOp::Gt => "setg %al",
                            BinOp::Le => "setle %al",
                            BinOp::Ge => "setge %al",
                            _ => unreachable!(),
                        };
                        self.emit(set);
                        self.emit("movzbl %al, %eax");
                    }
                    BinOp::LogAnd | BinOp::LogOr => unreachable!(),
                }
            }

            Expr::Assign(target, value) => self.gen_assign(target, value)?,

            Expr::Index(arr, idx) => {
                let elem = self.gen_index_addr(arr, idx)?;
                self.load_indirect(&elem);
            }

            Expr::Call(name, args) => {
                // Push arguments right to left, pop into registers left
                // to right; an equal number of pushes and pops keeps the
                // 16-byte call alignment from the prologue intact
                for arg in args.iter().rev() {
                    self.gen_expr(arg)?;
                    self.emit("pushq %rax");
                }
                for reg in ARG_REGS.iter().take(args.len()) {
                    self.emit(&format!("popq {reg}"));
                }
                // %al = 0 for variadic callees such as printf
                self.emit("movl $0, %eax");
                self.emit(&format!("call {name}"));
            }
        }
        Ok(())
    }

    /// Assignment. Three lvalue shapes exist: a named variable, an
    /// indexed element, and a dereferenced pointer. The assigned value is
    /// left in %eax/%rax so chained assignment works.
    fn gen_assign(&mut self, target: &Expr, value: &Expr) -> Result<()> {
        match target {
            Expr::Var(name) => {
                self.gen_expr(value)?;
                match self.lookup(name) {
                    Some(Symbol::Local { offset, ty }) => {
                        if ty.is_array() {
                            return Err(CodegenError::new(format!(
                                "cannot assign to array '{name}'"
                            )));
                        }
                        self.store_local(offset, &ty);
                    }
                    Some(Symbol::Global { ty }) => {
                        if ty.is_array() {
                            return Err(CodegenError::new(format!(
                                "cannot assign to array '{name}'"
                            )));
                        }
                        self.store_global(name, &ty);
                    }
                    None => {
                        return Err(CodegenError::new(format!(
                            "undefined identifier '{name}'"
                        )));
                    }
                }
            }
            Expr::Index(arr, idx) => {
                self.gen_expr(value)?;
                self.emit("pushq %rax");
                let elem = self.gen_index_addr(arr, idx)?;
                self.emit("movq %rax, %rcx");
                self.emit("popq %rax");
                self.store_indirect(&elem);
            }
            Expr::Unary(UnOp::Deref, inner) => {
                let elem = self
                    .expr_type(inner)
                    .and_then(|t| t.element().cloned())
                    .ok_or_else(|| {
                        CodegenError::new("cannot dereference a non-pointer expression")
                    })?;
                self.gen_expr(value)?;
                self.emit("pushq %rax");
                self.gen_expr(inner)?;
                self.emit("movq %rax, %rcx");
                self.emit("popq %rax");
                self.store_indirect(&elem);
            }
            _ => {
                return Err(CodegenError::new(
                    "left-hand side of assignment is not an lvalue",
                ));
            }
        }
        Ok(())
    }

    /// Leave the address of `arr[idx]` in %rax; returns the element type.
    /// The base must be an array or pointer, checked at this use site.
    fn gen_index_addr(&mut self, arr: &Expr, idx: &Expr) -> Result<Type> {
        let elem = self
            .expr_type(arr)
            .and_then(|t| t.element().cloned())
            .ok_or_else(|| CodegenError::new("indexed expression is not an array or pointer"))?;
        self.gen_expr(arr)?; // base address: arrays decay, pointers load
        self.emit("pushq %rax");
        self.gen_expr(idx)?;
        self.emit("movslq %eax, %rax");
        match elem.size() {
            0 | 1 => {}
            4 => self.emit("shlq $2, %rax"),
            8 => self.emit("shlq $3, %rax"),
            n => self.emit(&format!("imulq ${n}, %rax, %rax")),
        }
        self.emit("popq %rcx");
        self.emit("addq %rcx, %rax");
        Ok(elem)
    }

    /// Leave the address of an lvalue in %rax.
    fn gen_addr(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Var(name) => match self.lookup(name) {
                Some(Symbol::Local { offset, .. }) => {
                    self.emit(&format!("leaq {offset}(%rbp), %rax"));
                }
                Some(Symbol::Global { .. }) => {
                    self.emit(&format!("leaq {name}(%rip), %rax"));
                }
                None => {
                    return Err(CodegenError::new(format!("undefined identifier '{name}'")));
                }
            },
            Expr::Index(arr, idx) => {
                self.gen_index_addr(arr, idx)?;
            }
            // &*p is p
            Expr::Unary(UnOp::Deref, inner) => self.gen_expr(inner)?,
            _ => {
                return Err(CodegenError::new(
                    "cannot take the address of this expression",
                ));
            }
        }
        Ok(())
    }

    /// Load a named local into the accumulator. Arrays decay to their
    /// address; char reads sign-extend from the low byte of the slot.
    fn load_local(&mut self, offset: i64, ty: &Type) {
        match ty {
            Type::Array(_, _) => self.emit(&format!("leaq {offset}(%rbp), %rax")),
            Type::Char => self.emit(&format!("movsbl {offset}(%rbp), %eax")),
            Type::Pointer(_) => self.emit(&format!("movq {offset}(%rbp), %rax")),
            _ => self.emit(&format!("movl {offset}(%rbp), %eax")),
        }
    }

    fn load_global(&mut self, name: &str, ty: &Type) {
        match ty {
            Type::Array(_, _) => self.emit(&format!("leaq {name}(%rip), %rax")),
            Type::Char => self.emit(&format!("movsbl {name}(%rip), %eax")),
            Type::Pointer(_) => self.emit(&format!("movq {name}(%rip), %rax")),
            _ => self.emit(&format!("movl {name}(%rip), %eax")),
        }
    }

    fn store_local(&mut self, offset: i64, ty: &Type) {
        match ty {
            Type::Char => self.emit(&format!("movb %al, {offset}(%rbp)")),
            Type::Pointer(_) => self.emit(&format!("movq %rax, {offset}(%rbp)")),
            _ => self.emit(&format!("movl %eax, {offset}(%rbp)")),
        }
    }

    fn store_global(&mut self, name: &str, ty: &Type) {
        match ty {
            Type::Char => self.emit(&format!("movb %al, {name}(%rip)")),
            Type::Pointer(_) => self.emit(&format!("movq %rax, {name}(%rip)")),
            _ => self.emit(&format!("movl %eax, {name}(%rip)")),
        }
    }

    /// Load through the address in %rax, by element type.
    fn load_indirect(&mut self, ty: &Type) {
        match ty {
            Type::Char => self.emit("movsbl (%rax), %eax"),
            Type::Pointer(_) => self.emit("movq (%rax), %rax"),
            _ => self.emit("movl (%rax), %eax"),
        }
    }

    /// Store the value in %eax/%rax through the address in %rcx.
    fn store_indirect(&mut self, ty: &Type) {
        match ty {
            Type::Char => self.emit("movb %al, (%rcx)"),
            Type::Pointer(_) => self.emit("movq %rax, (%rcx)"),
            _ => self.emit("movl %eax, (%rcx)"),
        }
    }
}

impl Default for CodeGen {
    fn default() -> Self {
        Self::new()
    }
}

//! C Parser - recursive descent parser

use thiserror::Error;

use crate::ast::*;
use crate::token::{Token, TokenKind};

/// Arguments beyond the six System V registers are not lowered, so the
/// grammar rejects them up front.
const MAX_CALL_ARGS: usize = 6;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

#[derive(Debug, Error)]
#[error("parse error at line {line}, col {col}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

type Result<T> = std::result::Result<T, ParseError>;

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.is_empty() {
            tokens.push(Token::new(TokenKind::Eof, 1, 1));
        }
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: TokenKind) -> Result<()> {
        if self.kind() == &expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("expected {:?}, got {:?}", expected, self.kind())))
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.kind() == kind
    }

    fn error(&self, message: &str) -> ParseError {
        let tok = self.peek();
        ParseError {
            message: message.to_string(),
            line: tok.line,
            col: tok.col,
        }
    }

    /// Parse a complete translation unit
    pub fn parse(&mut self) -> Result<TranslationUnit> {
        let mut decls = Vec::new();
        while !self.check(&TokenKind::Eof) {
            decls.push(self.parse_decl()?);
        }
        Ok(TranslationUnit { decls })
    }

    /// Parse a top-level declaration. The token after the identifier
    /// disambiguates: `(` means function, anything else a global variable.
    fn parse_decl(&mut self) -> Result<Decl> {
        let ty = self.parse_type()?;
        let name = self.parse_ident()?;

        if self.check(&TokenKind::LParen) {
            self.parse_function(ty, name)
        } else {
            self.parse_global(ty, name)
        }
    }

    fn parse_function(&mut self, return_type: Type, name: String) -> Result<Decl> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let mut ty = self.parse_type()?;
                // Parameter name is optional for prototypes
                let pname = if matches!(self.kind(), TokenKind::Ident(_)) {
                    self.parse_ident()?
                } else {
                    String::new()
                };
                // An array parameter decays to a pointer to its element type
                if self.check(&TokenKind::LBracket) {
                    self.advance();
                    self.expect(TokenKind::RBracket)?;
                    ty = Type::Pointer(Box::new(ty));
                }
                params.push(Param { ty, name: pname });
                if params.len() > MAX_CALL_ARGS {
                    return Err(self.error(&format!(
                        "functions support at most {MAX_CALL_ARGS} parameters"
                    )));
                }
                if !self.check(&TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(TokenKind::RParen)?;

        // Prototype (ends with semicolon) vs definition (has body)
        if self.check(&TokenKind::Semicolon) {
            self.advance();
            return Ok(Decl::Function(Function {
                return_type,
                name,
                params,
                body: None,
            }));
        }

        let body = self.parse_block()?;

        Ok(Decl::Function(Function {
            return_type,
            name,
            params,
            body: Some(body),
        }))
    }

    fn parse_global(&mut self, ty: Type, name: String) -> Result<Decl> {
        let ty = self.parse_array_suffix(ty)?;
        if ty == Type::Void {
            return Err(self.error(&format!("variable '{name}' declared void")));
        }

        let init = if self.check(&TokenKind::Eq) {
            if ty.is_array() {
                return Err(self.error("array initializers are not supported"));
            }
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon)?;
        Ok(Decl::Global(Global { ty, name, init }))
    }

    /// Consume `[ N ]` after a declarator name, if present. A zero count
    /// is accepted; what it does at runtime is the program's problem.
    fn parse_array_suffix(&mut self, ty: Type) -> Result<Type> {
        if self.check(&TokenKind::LBracket) {
            self.advance();
            let size = match self.advance().kind {
                TokenKind::IntLit(n) => n as usize,
                _ => return Err(self.error("expected array size")),
            };
            self.expect(TokenKind::RBracket)?;
            Ok(Type::Array(Box::new(ty), size))
        } else {
            Ok(ty)
        }
    }

    fn parse_type(&mut self) -> Result<Type> {
        // `const` is accepted and dropped; nothing downstream reads it
        while self.check(&TokenKind::Const) {
            self.advance();
        }

        let base = match self.kind() {
            TokenKind::Void => {
                self.advance();
                Type::Void
            }
            TokenKind::Char => {
                self.advance();
                Type::Char
            }
            TokenKind::Int => {
                self.advance();
                Type::Int
            }
            _ => return Err(self.error(&format!("expected type, got {:?}", self.kind()))),
        };

        // Handle pointers
        let mut ty = base;
        while self.check(&TokenKind::Star) {
            self.advance();
            ty = Type::Pointer(Box::new(ty));
        }

        Ok(ty)
    }

    fn parse_ident(&mut self) -> Result<String> {
        match self.kind() {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => Err(self.error(&format!("expected identifier, got {other:?}"))),
        }
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.check(&TokenKind::Eof) {
                return Err(self.error("expected '}', got end of input"));
            }
            stmts.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        match self.kind() {
            // Block
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            // If statement
            TokenKind::If => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                let then_branch = Box::new(self.parse_stmt()?);
                let else_branch = if self.check(&TokenKind::Else) {
                    self.advance();
                    Some(Box::new(self.parse_stmt()?))
                } else {
                    None
                };
                Ok(Stmt::If(cond, then_branch, else_branch))
            }
            // While loop
            TokenKind::While => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::While(cond, body))
            }
            // For loop
            TokenKind::For => {
                self.advance();
                self.expect(TokenKind::LParen)?;

                // Init: declaration, expression, or empty
                let init = if self.check(&TokenKind::Semicolon) {
                    self.advance();
                    None
                } else if self.kind().is_type_start() {
                    Some(Box::new(self.parse_var_decl()?))
                } else {
                    let expr = self.parse_expr()?;
                    self.expect(TokenKind::Semicolon)?;
                    Some(Box::new(Stmt::Expr(Some(expr))))
                };

                // Condition; missing means always true
                let cond = if self.check(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenKind::Semicolon)?;

                // Update
                let update = if self.check(&TokenKind::RParen) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenKind::RParen)?;

                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt::For(init, cond, update, body))
            }
            // Return
            TokenKind::Return => {
                self.advance();
                let expr = if self.check(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Return(expr))
            }
            // Bare semicolon is a null expression statement
            TokenKind::Semicolon => {
                self.advance();
                Ok(Stmt::Expr(None))
            }
            // Variable declaration
            _ if self.kind().is_type_start() => self.parse_var_decl(),
            // Expression statement
            _ => {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Expr(Some(expr)))
            }
        }
    }

    fn parse_var_decl(&mut self) -> Result<Stmt> {
        let ty = self.parse_type()?;
        let name = self.parse_ident()?;
        let ty = self.parse_array_suffix(ty)?;
        if ty == Type::Void {
            return Err(self.error(&format!("variable '{name}' declared void")));
        }

        let init = if self.check(&TokenKind::Eq) {
            if ty.is_array() {
                return Err(self.error("array initializers are not supported"));
            }
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon)?;
        Ok(Stmt::VarDecl(ty, name, init))
    }

    // Expression parsing with precedence climbing
    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_assignment()
    }

    /// Assignment is right-associative; anything may appear on the left,
    /// lvalue checking happens during code generation.
    fn parse_assignment(&mut self) -> Result<Expr> {
        let left = self.parse_log_or()?;

        if self.check(&TokenKind::Eq) {
            self.advance();
            let right = self.parse_assignment()?;
            return Ok(Expr::Assign(Box::new(left), Box::new(right)));
        }

        Ok(left)
    }

    fn parse_log_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_log_and()?;
        while self.check(&TokenKind::PipePipe) {
            self.advance();
            let right = self.parse_log_and()?;
            left = Expr::Binary(BinOp::LogOr, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_log_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_equality()?;
        while self.check(&TokenKind::AmpAmp) {
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::Binary(BinOp::LogAnd, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.kind() {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::BangEq => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.kind() {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::LtEq => BinOp::Le,
                TokenKind::GtEq => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.kind() {
            TokenKind::Minus => UnOp::Neg,
            TokenKind::Bang => UnOp::Not,
            TokenKind::Star => UnOp::Deref,
            TokenKind::Amp => UnOp::AddrOf,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let expr = self.parse_unary()?;
        Ok(Expr::Unary(op, Box::new(expr)))
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.kind() {
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(TokenKind::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                TokenKind::LParen => {
                    // A call is only valid directly on a bare identifier
                    let Expr::Var(name) = expr else {
                        return Err(self.error("expected function name"));
                    };
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_assignment()?);
                            if args.len() > MAX_CALL_ARGS {
                                return Err(self.error(&format!(
                                    "function calls support at most {MAX_CALL_ARGS} arguments"
                                )));
                            }
                            if !self.check(&TokenKind::Comma) {
                                break;
                            }
                            self.advance();
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                    expr = Expr::Call(name, args);
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.kind().clone() {
            TokenKind::IntLit(n) => {
                self.advance();
                Ok(Expr::IntLit(n))
            }
            TokenKind::StringLit(s) => {
                self.advance();
                Ok(Expr::StringLit(s))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::Var(name))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::Eof => Err(self.error("unexpected end of input")),
            other => Err(self.error(&format!("unexpected token: {other:?}"))),
        }
    }
}

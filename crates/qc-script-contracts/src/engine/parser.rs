//! # Parser
//!
//! Recursive descent parser producing a [`Program`].
//!
//! Nesting of blocks and expressions is bounded so that hostile sources
//! cannot exhaust the host stack at compile or run time.

use crate::engine::ast::{
    Accessor, AssignOp, BinaryOp, Binding, Expr, Function, LogicalOp, Place, Program, Stmt,
    UnaryOp,
};
use crate::engine::tokenizer::{tokenize, Keyword, Punct, Spanned, Token};
use crate::errors::CompileError;

/// Parses a source text into a program.
pub fn parse(source: &str, max_depth: usize) -> Result<Program, CompileError> {
    let tokens = tokenize(source)?;
    Parser {
        tokens,
        pos: 0,
        depth: 0,
        max_depth,
        loop_depth: 0,
    }
    .program()
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    max_depth: usize,
    loop_depth: usize,
}

impl Parser {
    // -------------------------------------------------------------------------
    // token helpers
    // -------------------------------------------------------------------------

    fn current(&self) -> &Spanned {
        // tokenize always ends with Eof and the parser never advances past it
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.current().token
    }

    fn advance(&mut self) -> Token {
        let token = self.current().token.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        let at = self.current();
        CompileError::new(message, at.line, at.column)
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        let found = match self.peek() {
            Token::Ident(name) => format!("identifier `{name}`"),
            Token::Int(i) => format!("integer `{i}`"),
            Token::Str(_) => "string literal".to_string(),
            Token::Keyword(k) => format!("keyword {k:?}"),
            Token::Punct(p) => format!("{p:?}"),
            Token::Eof => "end of input".to_string(),
        };
        self.error(format!("expected {expected}, found {found}"))
    }

    fn check(&self, punct: Punct) -> bool {
        self.peek() == &Token::Punct(punct)
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        self.peek() == &Token::Keyword(keyword)
    }

    fn eat(&mut self, punct: Punct) -> bool {
        if self.check(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: Punct, what: &str) -> Result<(), CompileError> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, CompileError> {
        match self.peek() {
            Token::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn end_statement(&mut self) {
        self.eat(Punct::Semicolon);
    }

    fn enter(&mut self) -> Result<(), CompileError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(self.error(format!(
                "nesting too deep, limit is {}",
                self.max_depth
            )));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // -------------------------------------------------------------------------
    // items
    // -------------------------------------------------------------------------

    fn program(mut self) -> Result<Program, CompileError> {
        let mut program = Program::default();
        loop {
            match self.peek() {
                Token::Eof => return Ok(program),
                Token::Punct(Punct::Semicolon) => {
                    self.advance();
                }
                Token::Keyword(Keyword::Function) => {
                    let (line, column) = (self.current().line, self.current().column);
                    let function = self.function()?;
                    if program.functions.contains_key(&function.name)
                        || program.globals.iter().any(|g| g.name == function.name)
                    {
                        return Err(CompileError::new(
                            format!("duplicate top-level name `{}`", function.name),
                            line,
                            column,
                        ));
                    }
                    program.functions.insert(function.name.clone(), function);
                }
                Token::Keyword(Keyword::Let | Keyword::Const) => {
                    let (line, column) = (self.current().line, self.current().column);
                    let binding = self.binding()?;
                    if program.functions.contains_key(&binding.name)
                        || program.globals.iter().any(|g| g.name == binding.name)
                    {
                        return Err(CompileError::new(
                            format!("duplicate top-level name `{}`", binding.name),
                            line,
                            column,
                        ));
                    }
                    program.globals.push(binding);
                }
                _ => {
                    return Err(self.error(
                        "only function declarations and let/const bindings are allowed at top level",
                    ));
                }
            }
        }
    }

    fn function(&mut self) -> Result<Function, CompileError> {
        self.advance();
        let name = self.ident("function name")?;
        self.expect(Punct::LParen, "`(`")?;
        let mut params = Vec::new();
        if !self.check(Punct::RParen) {
            loop {
                let param = self.ident("parameter name")?;
                if params.contains(&param) {
                    return Err(self.error(format!("duplicate parameter `{param}`")));
                }
                params.push(param);
                if !self.eat(Punct::Comma) {
                    break;
                }
            }
        }
        self.expect(Punct::RParen, "`)`")?;
        let body = self.block()?;
        Ok(Function { name, params, body })
    }

    fn binding(&mut self) -> Result<Binding, CompileError> {
        let constant = matches!(self.advance(), Token::Keyword(Keyword::Const));
        let name = self.ident("binding name")?;
        let init = if self.eat(Punct::Assign) {
            Some(self.expr()?)
        } else if constant {
            return Err(self.error("const binding requires an initializer"));
        } else {
            None
        };
        self.end_statement();
        Ok(Binding {
            name,
            init,
            constant,
        })
    }

    // -------------------------------------------------------------------------
    // statements
    // -------------------------------------------------------------------------

    fn block(&mut self) -> Result<Vec<Stmt>, CompileError> {
        self.expect(Punct::LBrace, "`{`")?;
        self.enter()?;
        let mut stmts = Vec::new();
        while !self.check(Punct::RBrace) {
            if self.peek() == &Token::Eof {
                return Err(self.unexpected("`}`"));
            }
            stmts.push(self.statement()?);
        }
        self.advance();
        self.leave();
        Ok(stmts)
    }

    fn body(&mut self) -> Result<Vec<Stmt>, CompileError> {
        if self.check(Punct::LBrace) {
            self.block()
        } else {
            Ok(vec![self.statement()?])
        }
    }

    fn statement(&mut self) -> Result<Stmt, CompileError> {
        match self.peek() {
            Token::Keyword(Keyword::Let | Keyword::Const) => Ok(Stmt::Let(self.binding()?)),
            Token::Keyword(Keyword::If) => self.if_statement(),
            Token::Keyword(Keyword::While) => {
                self.advance();
                self.expect(Punct::LParen, "`(`")?;
                let cond = self.expr()?;
                self.expect(Punct::RParen, "`)`")?;
                self.loop_depth += 1;
                let body = self.body();
                self.loop_depth -= 1;
                Ok(Stmt::While { cond, body: body? })
            }
            Token::Keyword(Keyword::Break) => {
                if self.loop_depth == 0 {
                    return Err(self.error("`break` outside of a loop"));
                }
                self.advance();
                self.end_statement();
                Ok(Stmt::Break)
            }
            Token::Keyword(Keyword::Continue) => {
                if self.loop_depth == 0 {
                    return Err(self.error("`continue` outside of a loop"));
                }
                self.advance();
                self.end_statement();
                Ok(Stmt::Continue)
            }
            Token::Keyword(Keyword::Return) => {
                self.advance();
                let value = if self.check(Punct::Semicolon) || self.check(Punct::RBrace) {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.end_statement();
                Ok(Stmt::Return(value))
            }
            Token::Keyword(Keyword::Throw) => {
                self.advance();
                let value = self.expr()?;
                self.end_statement();
                Ok(Stmt::Throw(value))
            }
            Token::Keyword(Keyword::Function) => {
                Err(self.error("nested function declarations are not supported"))
            }
            Token::Punct(Punct::LBrace) => Ok(Stmt::Block(self.block()?)),
            Token::Punct(Punct::Semicolon) => {
                self.advance();
                Ok(Stmt::Block(Vec::new()))
            }
            _ => self.expr_statement(),
        }
    }

    fn if_statement(&mut self) -> Result<Stmt, CompileError> {
        self.advance();
        self.expect(Punct::LParen, "`(`")?;
        let cond = self.expr()?;
        self.expect(Punct::RParen, "`)`")?;
        let then = self.body()?;
        let otherwise = if self.check_keyword(Keyword::Else) {
            self.advance();
            if self.check_keyword(Keyword::If) {
                self.enter()?;
                let nested = self.if_statement()?;
                self.leave();
                vec![nested]
            } else {
                self.body()?
            }
        } else {
            Vec::new()
        };
        Ok(Stmt::If {
            cond,
            then,
            otherwise,
        })
    }

    fn expr_statement(&mut self) -> Result<Stmt, CompileError> {
        let (line, column) = (self.current().line, self.current().column);
        let expr = self.expr()?;
        let op = match self.peek() {
            Token::Punct(Punct::Assign) => Some(AssignOp::Set),
            Token::Punct(Punct::PlusAssign) => Some(AssignOp::Add),
            Token::Punct(Punct::MinusAssign) => Some(AssignOp::Sub),
            _ => None,
        };
        let stmt = match op {
            Some(op) => {
                self.advance();
                let target = into_place(expr)
                    .ok_or_else(|| CompileError::new("invalid assignment target", line, column))?;
                let value = self.expr()?;
                Stmt::Assign { target, op, value }
            }
            None => Stmt::Expr(expr),
        };
        self.end_statement();
        Ok(stmt)
    }

    // -------------------------------------------------------------------------
    // expressions
    // -------------------------------------------------------------------------

    fn expr(&mut self) -> Result<Expr, CompileError> {
        self.enter()?;
        let expr = self.logical_or();
        self.leave();
        expr
    }

    fn logical_or(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.logical_and()?;
        while self.eat(Punct::OrOr) {
            let right = self.logical_and()?;
            left = Expr::Logical(LogicalOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.equality()?;
        while self.eat(Punct::AndAnd) {
            let right = self.equality()?;
            left = Expr::Logical(LogicalOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn binary_level(
        &mut self,
        ops: &[(Punct, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, CompileError>,
    ) -> Result<Expr, CompileError> {
        let mut left = next(self)?;
        'outer: loop {
            for (punct, op) in ops {
                if self.eat(*punct) {
                    let right = next(self)?;
                    left = Expr::Binary(*op, Box::new(left), Box::new(right));
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn equality(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            &[(Punct::Eq, BinaryOp::Eq), (Punct::NotEq, BinaryOp::NotEq)],
            Self::comparison,
        )
    }

    fn comparison(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            &[
                (Punct::LtEq, BinaryOp::LtEq),
                (Punct::Lt, BinaryOp::Lt),
                (Punct::GtEq, BinaryOp::GtEq),
                (Punct::Gt, BinaryOp::Gt),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            &[(Punct::Plus, BinaryOp::Add), (Punct::Minus, BinaryOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expr, CompileError> {
        self.binary_level(
            &[
                (Punct::Star, BinaryOp::Mul),
                (Punct::Slash, BinaryOp::Div),
                (Punct::Percent, BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        let op = if self.eat(Punct::Bang) {
            UnaryOp::Not
        } else if self.eat(Punct::Minus) {
            UnaryOp::Neg
        } else {
            return self.postfix();
        };
        self.enter()?;
        let operand = self.unary();
        self.leave();
        Ok(Expr::Unary(op, Box::new(operand?)))
    }

    fn postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(Punct::Dot) {
                let name = self.ident("property name")?;
                expr = Expr::Member(Box::new(expr), name);
            } else if self.eat(Punct::LBracket) {
                let index = self.expr()?;
                self.expect(Punct::RBracket, "`]`")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.check(Punct::LParen) {
                let Expr::Ident(name) = expr else {
                    return Err(self.error("only named functions can be called"));
                };
                self.advance();
                let args = self.list_items(Punct::RParen)?;
                expr = Expr::Call(name, args);
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, CompileError> {
        let expr = match self.peek().clone() {
            Token::Int(i) => {
                self.advance();
                Expr::Int(i)
            }
            Token::Str(s) => {
                self.advance();
                Expr::Str(s)
            }
            Token::Ident(name) => {
                self.advance();
                Expr::Ident(name)
            }
            Token::Keyword(Keyword::True) => {
                self.advance();
                Expr::Bool(true)
            }
            Token::Keyword(Keyword::False) => {
                self.advance();
                Expr::Bool(false)
            }
            Token::Keyword(Keyword::Null) => {
                self.advance();
                Expr::Null
            }
            Token::Punct(Punct::LParen) => {
                self.advance();
                let inner = self.expr()?;
                self.expect(Punct::RParen, "`)`")?;
                inner
            }
            Token::Punct(Punct::LBracket) => {
                self.advance();
                Expr::List(self.list_items(Punct::RBracket)?)
            }
            Token::Punct(Punct::LBrace) => {
                self.advance();
                self.map_literal()?
            }
            _ => return Err(self.unexpected("expression")),
        };
        Ok(expr)
    }

    fn list_items(&mut self, close: Punct) -> Result<Vec<Expr>, CompileError> {
        let mut items = Vec::new();
        while !self.eat(close) {
            items.push(self.expr()?);
            if !self.eat(Punct::Comma) {
                self.expect(close, "`,` or closing delimiter")?;
                break;
            }
        }
        Ok(items)
    }

    fn map_literal(&mut self) -> Result<Expr, CompileError> {
        let mut entries = Vec::new();
        while !self.eat(Punct::RBrace) {
            let key = match self.advance() {
                Token::Ident(name) => name,
                Token::Str(s) => s,
                _ => return Err(self.error("expected map key")),
            };
            self.expect(Punct::Colon, "`:`")?;
            let value = self.expr()?;
            entries.push((key, value));
            if !self.eat(Punct::Comma) {
                self.expect(Punct::RBrace, "`,` or `}`")?;
                break;
            }
        }
        Ok(Expr::Map(entries))
    }
}

fn into_place(expr: Expr) -> Option<Place> {
    match expr {
        Expr::Ident(root) => Some(Place {
            root,
            path: Vec::new(),
        }),
        Expr::Member(base, name) => {
            let mut place = into_place(*base)?;
            place.path.push(Accessor::Member(name));
            Some(place)
        }
        Expr::Index(base, index) => {
            let mut place = into_place(*base)?;
            place.path.push(Accessor::Index(*index));
            Some(place)
        }
        _ => None,
    }
}

//! Single-pass compilation: a recursive-descent parser that drives the
//! symbol table and the instruction stream in grammar order.

pub mod code;
pub mod table;

use logos::Logos;

use crate::compiler::code::{CodeError, CodeGen, Inst, Operator, RefOp, ValueOp};
use crate::compiler::table::{EntryKind, SymbolTable, TableError};
use crate::lexer::{LexError, Token};

/// First local-variable offset in every frame; slots 0 and 1 hold the
/// call header (saved display and return address).
pub const FIRST_LOCAL: i64 = 2;

#[derive(thiserror::Error, Debug, PartialEq, Clone)]
pub enum CompileError {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Code(#[from] CodeError),
    #[error("expected {expected}, found {found}")]
    UnexpectedToken {
        expected: Box<str>,
        found: Box<str>,
    },
    #[error("`{0}` cannot be assigned to")]
    NotAssignable(Box<str>),
    #[error("function `{name}` takes {expected} argument(s), {found} given")]
    WrongArgumentCount {
        name: Box<str>,
        expected: usize,
        found: usize,
    },
}

/// Compiles one whole program to an instruction sequence.
pub fn compile(source: &str) -> Result<Vec<Inst>, CompileError> {
    Compiler::new(source).compile()
}

/// Holds the token lookahead plus the two structures the grammar drives:
/// the symbol table and the instruction stream.
pub struct Compiler<'src> {
    lexer: logos::Lexer<'src, Token>,
    /// One token of lookahead; `None` past the end of input.
    token: Option<Token>,
    table: SymbolTable,
    code: CodeGen,
}

impl<'src> Compiler<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            lexer: Token::lexer(source),
            token: None,
            table: SymbolTable::new(),
            code: CodeGen::new(),
        }
    }

    /// program = block "." .
    pub fn compile(mut self) -> Result<Vec<Inst>, CompileError> {
        self.advance()?;
        self.table.begin_scope(FIRST_LOCAL);
        self.block(None)?;
        self.expect(Token::Period)?;
        Ok(self.code.into_insts())
    }

    /// block = { declaration } statement .
    ///
    /// Emits a jump over any nested function bodies, reserves the frame,
    /// compiles the one body statement and closes with a return. For a
    /// function block, `func_index` is the callee's table entry, patched
    /// here to the body's real position.
    fn block(&mut self, func_index: Option<usize>) -> Result<(), CompileError> {
        let skip = self.code.emit_value(ValueOp::Jmp, 0);
        loop {
            match self.token {
                Some(Token::Const) => {
                    self.advance()?;
                    self.const_decl()?;
                }
                Some(Token::Var) => {
                    self.advance()?;
                    self.var_decl()?;
                }
                Some(Token::Function) => {
                    self.advance()?;
                    self.func_decl()?;
                }
                _ => break,
            }
        }
        let body = self.code.next_position();
        self.code.backpatch(skip, body as i64)?;
        if let Some(index) = func_index {
            // from here on, call sites (including recursive ones in the
            // body below) resolve to the real entry address
            self.table.patch_function_entry(index, body)?;
        }
        self.code.emit_value(ValueOp::Ict, self.table.frame_size());
        self.statement()?;
        self.code.emit_return(&self.table);
        self.table.end_scope();
        Ok(())
    }

    /// constdecl = ident "=" number { "," ident "=" number } ";" .
    fn const_decl(&mut self) -> Result<(), CompileError> {
        loop {
            let name = self.expect_ident()?;
            self.expect(Token::Equal)?;
            let value = self.expect_number()?;
            self.table.declare_const(&name, value);
            if !self.eat(&Token::Comma)? {
                break;
            }
        }
        self.expect(Token::Semicolon)
    }

    /// vardecl = ident { "," ident } ";" .
    fn var_decl(&mut self) -> Result<(), CompileError> {
        loop {
            let name = self.expect_ident()?;
            self.table.declare_variable(&name);
            if !self.eat(&Token::Comma)? {
                break;
            }
        }
        self.expect(Token::Semicolon)
    }

    /// funcdecl = ident "(" [ ident { "," ident } ] ")" block ";" .
    fn func_decl(&mut self) -> Result<(), CompileError> {
        let name = self.expect_ident()?;
        let index = self.table.declare_function(&name, self.code.next_position());
        self.expect(Token::LParen)?;
        self.table.begin_scope(FIRST_LOCAL);
        if matches!(self.token, Some(Token::Ident(_))) {
            loop {
                let par = self.expect_ident()?;
                self.table.declare_parameter(&par)?;
                if !self.eat(&Token::Comma)? {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;
        self.table.end_parameter_list();
        self.block(Some(index))?;
        self.expect(Token::Semicolon)
    }

    fn statement(&mut self) -> Result<(), CompileError> {
        match self.token {
            Some(Token::Ident(_)) => {
                let name = self.expect_ident()?;
                let index = self.table.lookup(&name)?;
                match self.table.kind_of(index) {
                    EntryKind::Var | EntryKind::Par => {}
                    _ => return Err(CompileError::NotAssignable(name)),
                }
                self.expect(Token::Assign)?;
                self.expression()?;
                self.code.emit_addressed(RefOp::Sto, index, &self.table)?;
            }
            Some(Token::If) => {
                self.advance()?;
                self.condition()?;
                self.expect(Token::Then)?;
                let exit = self.code.emit_value(ValueOp::Jpc, 0);
                self.statement()?;
                self.code.backpatch(exit, self.code.next_position() as i64)?;
            }
            Some(Token::While) => {
                self.advance()?;
                let head = self.code.next_position();
                self.condition()?;
                self.expect(Token::Do)?;
                let exit = self.code.emit_value(ValueOp::Jpc, 0);
                self.statement()?;
                self.code.emit_value(ValueOp::Jmp, head as i64);
                self.code.backpatch(exit, self.code.next_position() as i64)?;
            }
            Some(Token::Return) => {
                self.advance()?;
                self.expression()?;
                self.code.emit_return(&self.table);
            }
            Some(Token::Begin) => {
                self.advance()?;
                while !self.eat(&Token::End)? {
                    if self.eat(&Token::Semicolon)? {
                        // empty statement
                        continue;
                    }
                    self.statement()?;
                    if !matches!(self.token, Some(Token::Semicolon | Token::End)) {
                        return Err(self.unexpected("`;` or `end`"));
                    }
                }
            }
            Some(Token::Write) => {
                self.advance()?;
                self.expression()?;
                self.code.emit_operator(Operator::Write);
            }
            Some(Token::WriteLn) => {
                self.advance()?;
                self.code.emit_operator(Operator::WriteLn);
            }
            // a statement may be empty; leave the follow token in place
            Some(Token::Semicolon | Token::End | Token::Period) | None => {}
            Some(_) => return Err(self.unexpected("a statement")),
        }
        Ok(())
    }

    /// condition = "odd" expression | expression relop expression .
    fn condition(&mut self) -> Result<(), CompileError> {
        if self.eat(&Token::Odd)? {
            self.expression()?;
            self.code.emit_operator(Operator::Odd);
            return Ok(());
        }
        self.expression()?;
        let op = match self.token {
            Some(Token::Equal) => Operator::Eq,
            Some(Token::NotEqual) => Operator::NotEq,
            Some(Token::Less) => Operator::Less,
            Some(Token::Greater) => Operator::Greater,
            Some(Token::LessEqual) => Operator::LessEq,
            Some(Token::GreaterEqual) => Operator::GreaterEq,
            _ => return Err(self.unexpected("a comparison operator")),
        };
        self.advance()?;
        self.expression()?;
        self.code.emit_operator(op);
        Ok(())
    }

    /// expression = [ "+" | "-" ] term { ("+"|"-") term } .
    fn expression(&mut self) -> Result<(), CompileError> {
        let negate = match self.token {
            Some(Token::Plus) => {
                self.advance()?;
                false
            }
            Some(Token::Minus) => {
                self.advance()?;
                true
            }
            _ => false,
        };
        self.term()?;
        if negate {
            self.code.emit_operator(Operator::Neg);
        }
        loop {
            let op = match self.token {
                Some(Token::Plus) => Operator::Add,
                Some(Token::Minus) => Operator::Sub,
                _ => break,
            };
            self.advance()?;
            self.term()?;
            self.code.emit_operator(op);
        }
        Ok(())
    }

    /// term = factor { ("*"|"/") factor } .
    fn term(&mut self) -> Result<(), CompileError> {
        self.factor()?;
        loop {
            let op = match self.token {
                Some(Token::Star) => Operator::Mul,
                Some(Token::Slash) => Operator::Div,
                _ => break,
            };
            self.advance()?;
            self.factor()?;
            self.code.emit_operator(op);
        }
        Ok(())
    }

    /// factor = ident | number | call | "(" expression ")" .
    fn factor(&mut self) -> Result<(), CompileError> {
        match self.token {
            Some(Token::Ident(_)) => {
                let name = self.expect_ident()?;
                let index = self.table.lookup(&name)?;
                match self.table.kind_of(index) {
                    EntryKind::Var | EntryKind::Par => {
                        self.code.emit_addressed(RefOp::Lod, index, &self.table)?;
                    }
                    EntryKind::Const => {
                        let value = self.table.value_of(index)?;
                        self.code.emit_value(ValueOp::Lit, value);
                    }
                    EntryKind::Func => self.call(name, index)?,
                }
            }
            Some(Token::Number(_)) => {
                let value = self.expect_number()?;
                self.code.emit_value(ValueOp::Lit, value);
            }
            Some(Token::LParen) => {
                self.advance()?;
                self.expression()?;
                self.expect(Token::RParen)?;
            }
            _ => return Err(self.unexpected("an identifier, a number, or `(`")),
        }
        Ok(())
    }

    /// call = "(" [ expression { "," expression } ] ")" .
    ///
    /// Arguments are pushed left to right, so they land at the negative
    /// offsets just below the callee's frame base.
    fn call(&mut self, name: Box<str>, index: usize) -> Result<(), CompileError> {
        self.expect(Token::LParen)?;
        let mut args = 0;
        if !self.eat(&Token::RParen)? {
            loop {
                self.expression()?;
                args += 1;
                if !self.eat(&Token::Comma)? {
                    break;
                }
            }
            self.expect(Token::RParen)?;
        }
        let expected = self.table.parameter_count_of(index)?;
        if expected != args {
            return Err(CompileError::WrongArgumentCount {
                name,
                expected,
                found: args,
            });
        }
        self.code.emit_addressed(RefOp::Cal, index, &self.table)?;
        Ok(())
    }

    fn advance(&mut self) -> Result<(), CompileError> {
        self.token = self.lexer.next().transpose()?;
        Ok(())
    }

    fn eat(&mut self, token: &Token) -> Result<bool, CompileError> {
        if self.token.as_ref() == Some(token) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), CompileError> {
        if self.eat(&token)? {
            Ok(())
        } else {
            Err(self.unexpected(token.to_string()))
        }
    }

    fn expect_ident(&mut self) -> Result<Box<str>, CompileError> {
        match self.token.take() {
            Some(Token::Ident(name)) => {
                self.advance()?;
                Ok(name)
            }
            token => {
                self.token = token;
                Err(self.unexpected("an identifier"))
            }
        }
    }

    fn expect_number(&mut self) -> Result<i64, CompileError> {
        match self.token {
            Some(Token::Number(value)) => {
                self.advance()?;
                Ok(value)
            }
            _ => Err(self.unexpected("a number")),
        }
    }

    fn unexpected(&self, expected: impl AsRef<str>) -> CompileError {
        CompileError::UnexpectedToken {
            expected: Box::from(expected.as_ref()),
            found: match &self.token {
                Some(token) => token.to_string().into_boxed_str(),
                None => Box::from("end of input"),
            },
        }
    }
}

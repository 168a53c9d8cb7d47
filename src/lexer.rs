//! Tokenization of source text, built on a [`logos`] scanner.

use core::fmt;

pub use logos::Span;
use logos::{Lexer, Logos};

fn process_number(lexer: &mut Lexer<Token>) -> Result<i64, LexError> {
    lexer.slice().parse().map_err(|_| LexError::NumberTooBig)
}

#[derive(thiserror::Error, Debug, PartialEq, Clone, Default)]
pub enum LexError {
    #[default]
    #[error("invalid character encountered")]
    Invalid,
    #[error("number literal too big")]
    NumberTooBig,
}

/// Tokens are lexed one at a time from some source text.
///
/// Keywords are reserved: `whilex` lexes as one identifier, but `while`
/// alone never does.
#[derive(Debug, Clone, PartialEq, Logos)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(error = LexError)]
pub enum Token {
    #[token("const")]
    Const,
    #[token("var")]
    Var,
    #[token("function")]
    Function,
    #[token("begin")]
    Begin,
    #[token("end")]
    End,
    #[token("if")]
    If,
    #[token("then")]
    Then,
    #[token("while")]
    While,
    #[token("do")]
    Do,
    #[token("return")]
    Return,
    #[token("write")]
    Write,
    #[token("writeln")]
    WriteLn,
    #[token("odd")]
    Odd,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("=")]
    Equal,
    #[token("<>")]
    NotEqual,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("<=")]
    LessEqual,
    #[token(">=")]
    GreaterEqual,
    #[token(",")]
    Comma,
    #[token(".")]
    Period,
    #[token(";")]
    Semicolon,
    #[token(":=")]
    Assign,

    #[regex(r"[A-Za-z][A-Za-z0-9]*", |l| Box::from(l.slice()))]
    Ident(Box<str>),
    #[regex(r"[0-9]+", process_number)]
    Number(i64),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Const => write!(f, "`const`"),
            Token::Var => write!(f, "`var`"),
            Token::Function => write!(f, "`function`"),
            Token::Begin => write!(f, "`begin`"),
            Token::End => write!(f, "`end`"),
            Token::If => write!(f, "`if`"),
            Token::Then => write!(f, "`then`"),
            Token::While => write!(f, "`while`"),
            Token::Do => write!(f, "`do`"),
            Token::Return => write!(f, "`return`"),
            Token::Write => write!(f, "`write`"),
            Token::WriteLn => write!(f, "`writeln`"),
            Token::Odd => write!(f, "`odd`"),
            Token::Plus => write!(f, "`+`"),
            Token::Minus => write!(f, "`-`"),
            Token::Star => write!(f, "`*`"),
            Token::Slash => write!(f, "`/`"),
            Token::LParen => write!(f, "`(`"),
            Token::RParen => write!(f, "`)`"),
            Token::Equal => write!(f, "`=`"),
            Token::NotEqual => write!(f, "`<>`"),
            Token::Less => write!(f, "`<`"),
            Token::Greater => write!(f, "`>`"),
            Token::LessEqual => write!(f, "`<=`"),
            Token::GreaterEqual => write!(f, "`>=`"),
            Token::Comma => write!(f, "`,`"),
            Token::Period => write!(f, "`.`"),
            Token::Semicolon => write!(f, "`;`"),
            Token::Assign => write!(f, "`:=`"),
            Token::Ident(name) => write!(f, "identifier `{name}`"),
            Token::Number(value) => write!(f, "number {value}"),
        }
    }
}

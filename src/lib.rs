pub mod compiler;
pub mod lexer;
pub mod runtime;

pub use compiler::{compile, CompileError, Compiler, FIRST_LOCAL};
pub use compiler::code::Inst;
pub use runtime::{execute, RuntimeError, Value};

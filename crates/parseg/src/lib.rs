//! An error tolerant LL(1) parser which reparses edited documents, containing the damage of an
//! edit to the block it was made in.

pub mod description;
pub mod error;
pub mod factory;
pub mod grammar;
pub mod linemap;
pub mod parser;
pub mod result;
pub mod session;
pub mod span;
pub mod token;
pub mod tokenizer;
pub mod tree;

#[cfg(test)]
mod test_support;

pub use factory::{Change, TokenFactory};
pub use grammar::{ExprId, Grammar, NonTerminalId};
pub use parser::{Parser, ParserOptions};
pub use result::ParseResult;
pub use session::{ParsingSession, SessionConfig};
pub use token::{Token, TokenId, TokenKind, Tokenizer};
pub use tree::{Tree, TreeKind};

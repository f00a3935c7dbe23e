//! Everything related to the `build.ninja` file format.
//!
//! The text format is handled in three layers, each a lazy transformation
//! of the previous one:
//!
//! > bytes → [`unescape`] → [`lex`] → [`statement`]
//!
//! [`scope`] and [`expand`] resolve variables in the parsed statements,
//! the way the [graph adapter][crate::adapt] needs them.

pub mod expand;
pub mod lex;
pub mod scope;
pub mod statement;
pub mod unescape;

pub use self::lex::{BuildToken, Lexer};
pub use self::statement::{NinjaStatement, StatementParser};
pub use self::unescape::{UnescapedToken, UnescapedTokens};

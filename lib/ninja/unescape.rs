//! Character-level interpretation of Ninja's `$`-escape sequences.
//!
//! The escaping grammar is small but easy to get wrong:
//!
//! - `$$` is a literal `$`, `$:` a literal `:`, and `$ ` a literal space.
//! - `$name` and `${name}` are variable references.
//! - `$` directly before a newline is a line continuation; the newline and
//!   the indentation of the next physical line disappear entirely.
//! - Anything else after a `$` is not a valid escape. It is recovered as a
//!   literal `$` so that arbitrary byte garbage can never make the
//!   tokenizer fail.
//!
//! A `#` that is the first non-whitespace byte of a physical line starts a
//! comment running to the end of that line. A `#` appearing after other
//! text is an ordinary byte; `foo = not # a comment` keeps its full value.

use raw_string::RawStr;
use std::str::from_utf8_unchecked;

/// One semantic token of the unescaped character stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnescapedToken<'a> {
	/// A run of ordinary text.
	Literal(&'a RawStr),
	/// A `$name` or `${name}` variable reference.
	Variable(&'a str),
	/// `$:`
	EscapedColon,
	/// `$$`
	EscapedDollar,
	/// `$ `
	EscapedSpace,
	/// A `#`-to-end-of-line comment, without the `#`.
	Comment(&'a RawStr),
}

/// Is `c` valid inside an unbraced `$name` reference?
///
/// `$name.so` is `${name}` followed by `.so`; only the braced form may
/// contain dots.
pub fn is_simple_identifier_char(c: u8) -> bool {
	c.is_ascii_alphanumeric() || c == b'_' || c == b'-'
}

/// Is `c` valid inside a braced `${name}` reference?
pub fn is_identifier_char(c: u8) -> bool {
	is_simple_identifier_char(c) || c == b'.'
}

fn eat_name<'a>(src: &mut &'a RawStr, valid: fn(u8) -> bool) -> Option<&'a str> {
	let end = src.bytes().position(|c| !valid(c)).unwrap_or(src.len());
	let (ident, rest) = src.split_at(end);
	*src = rest;
	if ident.is_empty() {
		None
	} else {
		// Identifier chars are all ASCII.
		Some(unsafe { from_utf8_unchecked(ident.as_bytes()) })
	}
}

/// Reads a braced-form identifier off the front of `src`, if there is one.
pub fn eat_identifier<'a>(src: &mut &'a RawStr) -> Option<&'a str> {
	eat_name(src, is_identifier_char)
}

/// A lazy stream of [`UnescapedToken`]s over a byte slice.
///
/// Restartable by constructing a fresh one over the same slice. Never
/// panics, whatever the input bytes are.
#[derive(Clone, Debug)]
pub struct UnescapedTokens<'a> {
	src: &'a RawStr,
	pos: usize,
	/// Only whitespace seen since the start of the current physical line.
	line_blank: bool,
}

impl<'a> UnescapedTokens<'a> {
	pub fn new(src: &'a RawStr) -> Self {
		UnescapedTokens {
			src,
			pos: 0,
			line_blank: true,
		}
	}

	fn rest(&self) -> &'a RawStr {
		&self.src[self.pos..]
	}

	/// The end of the literal run starting at `self.pos`: the offset of the
	/// next `$`, or of a `#` in comment position.
	fn literal_end(&mut self) -> usize {
		let bytes = self.rest().as_bytes();
		for (i, &c) in bytes.iter().enumerate() {
			match c {
				b'$' => return self.pos + i,
				b'#' if self.line_blank => return self.pos + i,
				b'\n' => self.line_blank = true,
				b' ' | b'\t' | b'\r' => {}
				_ => self.line_blank = false,
			}
		}
		self.src.len()
	}

	/// Consumes the escape sequence at `self.pos` (which holds a `$`) and
	/// returns its token, or `None` for a line continuation or a dangling
	/// `$` at the end of input.
	fn take_escape(&mut self) -> Option<UnescapedToken<'a>> {
		self.line_blank = false;
		self.pos += 1;
		let rest = self.rest();
		match rest.first() {
			None => None,
			Some(b'$') => {
				self.pos += 1;
				Some(UnescapedToken::EscapedDollar)
			}
			Some(b':') => {
				self.pos += 1;
				Some(UnescapedToken::EscapedColon)
			}
			Some(b' ') => {
				self.pos += 1;
				Some(UnescapedToken::EscapedSpace)
			}
			Some(b'\n') => {
				self.pos += 1;
				self.skip_continuation_indent();
				None
			}
			Some(b'\r') if rest.as_bytes().get(1) == Some(&b'\n') => {
				self.pos += 2;
				self.skip_continuation_indent();
				None
			}
			Some(b'{') => {
				let mut after = &rest[1..];
				if let Some(name) = eat_identifier(&mut after) {
					if after.first() == Some(b'}') {
						self.pos += 1 + name.len() + 1;
						return Some(UnescapedToken::Variable(name));
					}
				}
				// Unterminated or empty ${...}: recover as a literal `$`.
				Some(UnescapedToken::Literal(dollar(self.src, self.pos - 1)))
			}
			Some(c) if is_simple_identifier_char(c) => {
				let mut after = rest;
				let name = eat_name(&mut after, is_simple_identifier_char).unwrap_or("");
				self.pos += name.len();
				Some(UnescapedToken::Variable(name))
			}
			Some(_) => {
				// Invalid escape: recover the `$` as a literal and carry on
				// with the next byte.
				Some(UnescapedToken::Literal(dollar(self.src, self.pos - 1)))
			}
		}
	}

	fn skip_continuation_indent(&mut self) {
		let n = self
			.rest()
			.bytes()
			.position(|c| c != b' ' && c != b'\t')
			.unwrap_or(self.rest().len());
		self.pos += n;
	}
}

fn dollar(src: &RawStr, at: usize) -> &RawStr {
	&src[at..at + 1]
}

impl<'a> Iterator for UnescapedTokens<'a> {
	type Item = UnescapedToken<'a>;

	fn next(&mut self) -> Option<UnescapedToken<'a>> {
		loop {
			if self.pos >= self.src.len() {
				return None;
			}
			match self.src[self.pos] {
				b'$' => match self.take_escape() {
					Some(token) => return Some(token),
					// Line continuation or dangling `$`: nothing to emit
					// for it, look at what follows.
					None => continue,
				},
				b'#' if self.line_blank => {
					self.pos += 1;
					let start = self.pos;
					let len = self
						.rest()
						.bytes()
						.position(|c| c == b'\n')
						.unwrap_or(self.rest().len());
					self.pos += len;
					return Some(UnescapedToken::Comment(&self.src[start..start + len]));
				}
				_ => {
					let start = self.pos;
					let end = self.literal_end();
					self.pos = end;
					if end > start {
						return Some(UnescapedToken::Literal(&self.src[start..end]));
					}
					// A `#` became comment-position without any literal
					// text before it; loop to emit the comment itself.
				}
			}
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use raw_string::RawStr;

	fn tokens(s: &str) -> Vec<UnescapedToken> {
		UnescapedTokens::new(RawStr::from_str(s)).collect()
	}

	#[test]
	fn plain_text() {
		assert_eq!(
			tokens("hello world"),
			vec![UnescapedToken::Literal(RawStr::from_str("hello world"))]
		);
	}

	#[test]
	fn escapes() {
		assert_eq!(
			tokens("a$$b$:c$ d"),
			vec![
				UnescapedToken::Literal(RawStr::from_str("a")),
				UnescapedToken::EscapedDollar,
				UnescapedToken::Literal(RawStr::from_str("b")),
				UnescapedToken::EscapedColon,
				UnescapedToken::Literal(RawStr::from_str("c")),
				UnescapedToken::EscapedSpace,
				UnescapedToken::Literal(RawStr::from_str("d")),
			]
		);
	}

	#[test]
	fn variables() {
		assert_eq!(
			tokens("$in and ${some.var}"),
			vec![
				UnescapedToken::Variable("in"),
				UnescapedToken::Literal(RawStr::from_str(" and ")),
				UnescapedToken::Variable("some.var"),
			]
		);
	}

	#[test]
	fn invalid_escape_recovers_as_literal() {
		assert_eq!(
			tokens("a$\"b"),
			vec![
				UnescapedToken::Literal(RawStr::from_str("a")),
				UnescapedToken::Literal(RawStr::from_str("$")),
				UnescapedToken::Literal(RawStr::from_str("\"b")),
			]
		);
		// An unterminated ${ also falls back to a literal `$`.
		assert_eq!(
			tokens("${open"),
			vec![
				UnescapedToken::Literal(RawStr::from_str("$")),
				UnescapedToken::Literal(RawStr::from_str("{open")),
			]
		);
	}

	#[test]
	fn dangling_dollar_is_dropped() {
		assert_eq!(
			tokens("abc$"),
			vec![UnescapedToken::Literal(RawStr::from_str("abc"))]
		);
		assert_eq!(tokens("$"), vec![]);
	}

	#[test]
	fn line_continuation_elides_newline_and_indent() {
		assert_eq!(
			tokens("foo $\n    bar"),
			vec![
				UnescapedToken::Literal(RawStr::from_str("foo ")),
				UnescapedToken::Literal(RawStr::from_str("bar")),
			]
		);
		assert_eq!(
			tokens("foo$\r\n\tbar"),
			vec![
				UnescapedToken::Literal(RawStr::from_str("foo")),
				UnescapedToken::Literal(RawStr::from_str("bar")),
			]
		);
	}

	#[test]
	fn comment_only_at_line_start() {
		assert_eq!(
			tokens("# a comment"),
			vec![UnescapedToken::Comment(RawStr::from_str(" a comment"))]
		);
		assert_eq!(
			tokens("  # indented"),
			vec![
				UnescapedToken::Literal(RawStr::from_str("  ")),
				UnescapedToken::Comment(RawStr::from_str(" indented")),
			]
		);
		// After non-whitespace, `#` is ordinary text.
		assert_eq!(
			tokens("not # a comment"),
			vec![UnescapedToken::Literal(RawStr::from_str("not # a comment"))]
		);
	}

	#[test]
	fn comment_ends_at_newline() {
		assert_eq!(
			tokens("# one\nx"),
			vec![
				UnescapedToken::Comment(RawStr::from_str(" one")),
				UnescapedToken::Literal(RawStr::from_str("\nx")),
			]
		);
	}

	#[test]
	fn restartable() {
		let src = RawStr::from_str("a$$b");
		let first: Vec<_> = UnescapedTokens::new(src).collect();
		let second: Vec<_> = UnescapedTokens::new(src).collect();
		assert_eq!(first, second);
	}
}

//! Structural tokenization of `build.ninja` text.
//!
//! The lexer shares the `$`-escape rules with the
//! [`unescape`][super::unescape] module to decide where words end, but it
//! does *not* resolve the escapes: the `Text` payload keeps the original
//! escaped bytes, so that whoever later expands `$out`, `$in` and friends
//! still has them. `a$ b` is one word.
//!
//! Word boundaries are whitespace, unescaped `:` and `|`, and the end of a
//! line. An unescaped `:` is emitted as its own one-byte `Text` token. A
//! line ending in an unescaped `$` continues onto the next physical line,
//! whose leading whitespace is stripped; the joined text belongs to the
//! same logical line and, when the `$` sits inside a word, to the same
//! word.
//!
//! Lines come in two lexical shapes, mirroring Ninja's own grammar: when
//! the first word of a line is followed by an unescaped `=` (either glued
//! to it or after whitespace), the rest of the logical line is a single
//! raw value token. Everything after the `=` is kept verbatim, which is
//! why `foo = not # a comment` and `COMMAND = cmd.exe /C "..."` keep
//! their exact text. On any other line, words are cut at the boundary
//! characters above.
//!
//! The lexer tokenizes arbitrary bytes without ever failing; whether the
//! tokens make sense is decided one layer up.

use raw_string::{RawStr, RawString};
use std::collections::VecDeque;

/// One structural token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildToken {
	/// A word, with escape sequences preserved verbatim.
	Text(RawString),
	/// The leading whitespace of an indented line.
	Indent,
	/// End of a logical line.
	Eol,
	/// End of input.
	Eof,
	/// `|`
	Pipe,
	/// `||`
	DoublePipe,
}

/// A tokenizer over one `build.ninja` source.
#[derive(Debug)]
pub struct Lexer<'a> {
	src: &'a RawStr,
	pos: usize,
	line: u32,
	at_line_start: bool,
	first_word: bool,
	pending: VecDeque<BuildToken>,
	eof_emitted: bool,
}

impl<'a> Lexer<'a> {
	pub fn new(src: &'a RawStr) -> Self {
		Lexer {
			src,
			pos: 0,
			line: 1,
			at_line_start: true,
			first_word: false,
			pending: VecDeque::new(),
			eof_emitted: false,
		}
	}

	/// The 1-based physical line the lexer is currently at.
	pub fn line(&self) -> u32 {
		self.line
	}

	fn cur(&self) -> Option<u8> {
		self.src.as_bytes().get(self.pos).copied()
	}

	fn peek(&self, n: usize) -> Option<u8> {
		self.src.as_bytes().get(self.pos + n).copied()
	}

	fn skip_ws(&mut self) {
		while let Some(b' ') | Some(b'\t') | Some(b'\r') = self.cur() {
			self.pos += 1;
		}
	}

	/// Consumes a line continuation at the current position, if there is
	/// one, including the next line's indentation. Returns whether one was
	/// consumed.
	fn skip_continuation(&mut self) -> bool {
		if self.cur() != Some(b'$') {
			return false;
		}
		let skip = match self.peek(1) {
			Some(b'\n') => 2,
			Some(b'\r') if self.peek(2) == Some(b'\n') => 3,
			_ => return false,
		};
		self.pos += skip;
		self.line += 1;
		while let Some(b' ') | Some(b'\t') = self.cur() {
			self.pos += 1;
		}
		true
	}

	fn skip_comment_line(&mut self) {
		let rest = &self.src.as_bytes()[self.pos..];
		match memchr::memchr(b'\n', rest) {
			Some(n) => {
				self.pos += n + 1;
				self.line += 1;
			}
			None => self.pos = self.src.len(),
		}
	}

	/// The raw remainder of the logical line, used for assignment and
	/// property values. Escapes stay verbatim; continuations are spliced
	/// out. Stops before the `\n` so the caller still sees an `Eol`.
	fn lex_value(&mut self) -> RawString {
		while let Some(b' ') | Some(b'\t') = self.cur() {
			self.pos += 1;
		}
		let mut value = Vec::new();
		loop {
			match self.cur() {
				None | Some(b'\n') => break,
				Some(b'\r') if self.peek(1) == Some(b'\n') => break,
				Some(b'$') => {
					if self.skip_continuation() {
						continue;
					}
					value.push(b'$');
					self.pos += 1;
					if let Some(c) = self.cur() {
						value.push(c);
						self.pos += 1;
					}
				}
				Some(c) => {
					value.push(c);
					self.pos += 1;
				}
			}
		}
		RawString::from_bytes(value)
	}

	fn queue_assignment_tail(&mut self) {
		let value = self.lex_value();
		self.pending.push_back(BuildToken::Text(RawString::from("=")));
		self.pending.push_back(BuildToken::Text(value));
	}

	fn lex_word(&mut self) -> BuildToken {
		let assignment_candidate = self.first_word;
		self.first_word = false;
		let mut word = Vec::new();
		loop {
			match self.cur() {
				None
				| Some(b'\n')
				| Some(b' ')
				| Some(b'\t')
				| Some(b'\r')
				| Some(b':')
				| Some(b'|') => break,
				Some(b'=') if assignment_candidate && !word.is_empty() => {
					self.pos += 1;
					self.queue_assignment_tail();
					return BuildToken::Text(RawString::from_bytes(word));
				}
				Some(b'$') => {
					if self.skip_continuation() {
						continue;
					}
					word.push(b'$');
					self.pos += 1;
					if let Some(c) = self.cur() {
						word.push(c);
						self.pos += 1;
					}
				}
				Some(c) => {
					word.push(c);
					self.pos += 1;
				}
			}
		}
		if assignment_candidate {
			let save = self.pos;
			self.skip_ws();
			if self.cur() == Some(b'=') {
				self.pos += 1;
				self.queue_assignment_tail();
				return BuildToken::Text(RawString::from_bytes(word));
			}
			self.pos = save;
		}
		BuildToken::Text(RawString::from_bytes(word))
	}

	/// The next token. Returns `Eof` forever once the input is exhausted.
	pub fn next_token(&mut self) -> BuildToken {
		if let Some(token) = self.pending.pop_front() {
			return token;
		}
		loop {
			if self.at_line_start {
				let ws_start = self.pos;
				self.skip_ws();
				match self.cur() {
					None => return BuildToken::Eof,
					Some(b'\n') => {
						self.pos += 1;
						self.line += 1;
						continue;
					}
					Some(b'#') => {
						self.skip_comment_line();
						continue;
					}
					Some(_) => {
						self.at_line_start = false;
						self.first_word = true;
						if self.pos > ws_start {
							return BuildToken::Indent;
						}
					}
				}
			}
			loop {
				self.skip_ws();
				if !self.skip_continuation() {
					break;
				}
			}
			match self.cur() {
				None => {
					self.at_line_start = true;
					return BuildToken::Eol;
				}
				Some(b'\n') => {
					self.pos += 1;
					self.line += 1;
					self.at_line_start = true;
					return BuildToken::Eol;
				}
				Some(b'|') => {
					self.first_word = false;
					if self.peek(1) == Some(b'|') {
						self.pos += 2;
						return BuildToken::DoublePipe;
					}
					self.pos += 1;
					return BuildToken::Pipe;
				}
				Some(b':') => {
					self.first_word = false;
					self.pos += 1;
					return BuildToken::Text(RawString::from(":"));
				}
				Some(_) => return self.lex_word(),
			}
		}
	}
}

impl<'a> Iterator for Lexer<'a> {
	type Item = BuildToken;

	fn next(&mut self) -> Option<BuildToken> {
		if self.eof_emitted {
			return None;
		}
		let token = self.next_token();
		if token == BuildToken::Eof {
			self.eof_emitted = true;
		}
		Some(token)
	}
}

#[cfg(test)]
mod test {
	use super::BuildToken::*;
	use super::*;

	fn lex(s: &str) -> Vec<BuildToken> {
		Lexer::new(RawStr::from_str(s)).collect()
	}

	fn text(s: &str) -> BuildToken {
		Text(RawString::from(s))
	}

	#[test]
	fn words_and_eol() {
		assert_eq!(
			lex("rule cat"),
			vec![text("rule"), text("cat"), Eol, Eof]
		);
	}

	#[test]
	fn build_line_separators() {
		assert_eq!(
			lex("build a | b : RULE c | d || e"),
			vec![
				text("build"),
				text("a"),
				Pipe,
				text("b"),
				text(":"),
				text("RULE"),
				text("c"),
				Pipe,
				text("d"),
				DoublePipe,
				text("e"),
				Eol,
				Eof,
			]
		);
	}

	#[test]
	fn colon_glued_to_word() {
		assert_eq!(
			lex("build output.txt: RULE input.txt"),
			vec![
				text("build"),
				text("output.txt"),
				text(":"),
				text("RULE"),
				text("input.txt"),
				Eol,
				Eof,
			]
		);
	}

	#[test]
	fn escaped_boundaries_stay_in_words() {
		assert_eq!(
			lex("build a$ b|c$:d: ru$ le"),
			vec![
				text("build"),
				text("a$ b"),
				Pipe,
				text("c$:d"),
				text(":"),
				text("ru$ le"),
				Eol,
				Eof,
			]
		);
	}

	#[test]
	fn assignment_value_is_raw() {
		assert_eq!(
			lex("foo = not # a comment"),
			vec![text("foo"), text("="), text("not # a comment"), Eol, Eof]
		);
		assert_eq!(
			lex("a=b"),
			vec![text("a"), text("="), text("b"), Eol, Eof]
		);
		assert_eq!(
			lex("x = $$dollar"),
			vec![text("x"), text("="), text("$$dollar"), Eol, Eof]
		);
		// Colons and pipes in values are just bytes.
		assert_eq!(
			lex("COMMAND = cmd.exe /C \"cd /D C:\\a\\b\\c\""),
			vec![
				text("COMMAND"),
				text("="),
				text("cmd.exe /C \"cd /D C:\\a\\b\\c\""),
				Eol,
				Eof,
			]
		);
	}

	#[test]
	fn empty_value() {
		assert_eq!(
			lex("--HC_TEST_WAS_RUN ="),
			vec![text("--HC_TEST_WAS_RUN"), text("="), text(""), Eol, Eof]
		);
	}

	#[test]
	fn indent_and_property_line() {
		assert_eq!(
			lex("rule cat\n  command = cat $in > $out\n"),
			vec![
				text("rule"),
				text("cat"),
				Eol,
				Indent,
				text("command"),
				text("="),
				text("cat $in > $out"),
				Eol,
				Eof,
			]
		);
	}

	#[test]
	fn blank_and_comment_lines_vanish() {
		assert_eq!(
			lex("# header\n\nrule cat\n  # note\n  \n  command = a\n"),
			vec![
				text("rule"),
				text("cat"),
				Eol,
				Indent,
				text("command"),
				text("="),
				text("a"),
				Eol,
				Eof,
			]
		);
	}

	#[test]
	fn continuation_joins_logical_line() {
		assert_eq!(
			lex("build $\n  a: $\n    RULE $\n      b $\n"),
			vec![
				text("build"),
				text("a"),
				text(":"),
				text("RULE"),
				text("b"),
				Eol,
				Eof,
			]
		);
	}

	#[test]
	fn continuation_glues_words() {
		// `$$` is an escaped dollar; the trailing `$` continues the line
		// and glues `blah` onto the same word.
		assert_eq!(
			lex("command = ${out}bar$$baz$$$\nblah"),
			vec![
				text("command"),
				text("="),
				text("${out}bar$$baz$$blah"),
				Eol,
				Eof,
			]
		);
	}

	#[test]
	fn value_continuation() {
		assert_eq!(
			lex("  command = foo bar $\n    baz\n"),
			vec![
				Indent,
				text("command"),
				text("="),
				text("foo bar baz"),
				Eol,
				Eof,
			]
		);
	}

	#[test]
	fn crlf_line_endings() {
		assert_eq!(
			lex("rule cat\r\n  command = a\r\n"),
			vec![
				text("rule"),
				text("cat"),
				Eol,
				Indent,
				text("command"),
				text("="),
				text("a"),
				Eol,
				Eof,
			]
		);
	}

	#[test]
	fn lone_pipes() {
		assert_eq!(lex("|"), vec![Pipe, Eol, Eof]);
		assert_eq!(lex("||"), vec![DoublePipe, Eol, Eof]);
	}

	#[test]
	fn no_trailing_newline() {
		assert_eq!(lex("default all"), vec![text("default"), text("all"), Eol, Eof]);
		assert_eq!(lex(""), vec![Eof]);
	}

	#[test]
	fn line_numbers_follow_continuations() {
		let mut lexer = Lexer::new(RawStr::from_str("a = 1\nbuild $\n  x: R\n"));
		while lexer.next_token() != BuildToken::Eol {}
		assert_eq!(lexer.line(), 2);
		// The build line spans physical lines 2 and 3.
		while lexer.next_token() != BuildToken::Eol {}
		assert_eq!(lexer.line(), 4);
	}
}

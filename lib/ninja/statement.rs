//! Statement-level parsing of `build.ninja` files.
//!
//! [`StatementParser`] turns the token stream of a [`Lexer`] into a lazy
//! sequence of [`NinjaStatement`]s. Parsing never fails: a malformed
//! statement is reported through the [`DiagnosticsSink`] and dropped, and
//! parsing continues with the next line. Downstream consumers must
//! tolerate a partial statement list.
//!
//! Property blocks (indented `key = value` lines) belong to the
//! immediately preceding `rule`, `pool`, or `build` statement. Comment
//! lines and blank lines inside a block are skipped without terminating
//! it; an indented line after a statement which takes no properties is
//! ignored.

use super::lex::{BuildToken, Lexer};
use crate::diagnostics::{Diagnostic, DiagnosticsSink};
use indexmap::IndexMap;
use raw_string::{RawStr, RawString};
use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;

/// A top-level statement of a `build.ninja` file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NinjaStatement {
	/// A `rule` definition with its property block.
	RuleDef {
		name: String,
		properties: IndexMap<String, RawString>,
	},
	/// A `pool` definition with its property block.
	PoolDef {
		name: String,
		properties: IndexMap<String, RawString>,
	},
	/// A `build` edge.
	///
	/// `build O1 O2 | I1 : RULE E1 E2 | I3 I4 || OO1 OO2`
	BuildDef {
		explicit_outputs: Vec<RawString>,
		implicit_outputs: Vec<RawString>,
		rule: RawString,
		explicit_inputs: Vec<RawString>,
		implicit_inputs: Vec<RawString>,
		order_only_inputs: Vec<RawString>,
		properties: IndexMap<String, RawString>,
	},
	/// A file-level `name = value` assignment.
	Assignment { name: String, value: RawString },
	/// An `include` statement.
	Include { file: RawString },
	/// A `subninja` statement.
	SubNinja { file: RawString },
	/// A `default` target declaration.
	Default { targets: Vec<RawString> },
}

impl NinjaStatement {
	/// The property block of this statement, if it can have one.
	pub fn properties(&self) -> Option<&IndexMap<String, RawString>> {
		match self {
			NinjaStatement::RuleDef { properties, .. }
			| NinjaStatement::PoolDef { properties, .. }
			| NinjaStatement::BuildDef { properties, .. } => Some(properties),
			_ => None,
		}
	}
}

fn lossy(s: &RawStr) -> Cow<str> {
	String::from_utf8_lossy(s.as_bytes())
}

fn write_properties(
	f: &mut fmt::Formatter,
	properties: &IndexMap<String, RawString>,
) -> fmt::Result {
	for (name, value) in properties {
		write!(f, "\n  {} = {}", name, lossy(value))?;
	}
	Ok(())
}

fn write_paths(f: &mut fmt::Formatter, paths: &[RawString]) -> fmt::Result {
	for path in paths {
		write!(f, " {}", lossy(path))?;
	}
	Ok(())
}

/// The canonical rendering: single spaces, explicit ` : ` separator,
/// two-space indented properties. Independent of the original whitespace.
impl fmt::Display for NinjaStatement {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			NinjaStatement::RuleDef { name, properties } => {
				write!(f, "rule {}", name)?;
				write_properties(f, properties)
			}
			NinjaStatement::PoolDef { name, properties } => {
				write!(f, "pool {}", name)?;
				write_properties(f, properties)
			}
			NinjaStatement::BuildDef {
				explicit_outputs,
				implicit_outputs,
				rule,
				explicit_inputs,
				implicit_inputs,
				order_only_inputs,
				properties,
			} => {
				write!(f, "build")?;
				write_paths(f, explicit_outputs)?;
				if !implicit_outputs.is_empty() {
					write!(f, " |")?;
					write_paths(f, implicit_outputs)?;
				}
				write!(f, " : {}", lossy(rule))?;
				write_paths(f, explicit_inputs)?;
				if !implicit_inputs.is_empty() {
					write!(f, " |")?;
					write_paths(f, implicit_inputs)?;
				}
				if !order_only_inputs.is_empty() {
					write!(f, " ||")?;
					write_paths(f, order_only_inputs)?;
				}
				write_properties(f, properties)
			}
			NinjaStatement::Assignment { name, value } => {
				write!(f, "{} = {}", name, lossy(value))
			}
			NinjaStatement::Include { file } => write!(f, "include {}", lossy(file)),
			NinjaStatement::SubNinja { file } => write!(f, "subninja {}", lossy(file)),
			NinjaStatement::Default { targets } => {
				write!(f, "default")?;
				write_paths(f, targets)
			}
		}
	}
}

struct Line {
	number: u32,
	tokens: Vec<BuildToken>,
}

/// A streaming statement parser over one source.
pub struct StatementParser<'a, 's> {
	lexer: Lexer<'a>,
	sink: &'s mut dyn DiagnosticsSink,
	file: Option<PathBuf>,
	pending: Option<Line>,
}

impl<'a, 's> StatementParser<'a, 's> {
	pub fn new(source: &'a RawStr, sink: &'s mut dyn DiagnosticsSink) -> Self {
		StatementParser {
			lexer: Lexer::new(source),
			sink,
			file: None,
			pending: None,
		}
	}

	/// Sets the file name used in diagnostics.
	pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
		self.file = Some(file.into());
		self
	}

	fn error(&mut self, line: u32, message: impl Into<String>) {
		self.sink
			.report(Diagnostic::error(message).at(self.file.clone(), line));
	}

	fn read_line(&mut self) -> Option<Line> {
		if let Some(line) = self.pending.take() {
			return Some(line);
		}
		let number = self.lexer.line();
		let mut tokens = Vec::new();
		loop {
			match self.lexer.next_token() {
				BuildToken::Eol => return Some(Line { number, tokens }),
				BuildToken::Eof => {
					return if tokens.is_empty() {
						None
					} else {
						Some(Line { number, tokens })
					};
				}
				token => tokens.push(token),
			}
		}
	}

	fn push_back(&mut self, line: Line) {
		self.pending = Some(line);
	}

	/// Consumes the indented lines following a statement header and
	/// collects their `key = value` pairs.
	fn read_properties(&mut self) -> IndexMap<String, RawString> {
		let mut properties = IndexMap::new();
		loop {
			let line = match self.read_line() {
				Some(line) => line,
				None => return properties,
			};
			if line.tokens.first() != Some(&BuildToken::Indent) {
				self.push_back(line);
				return properties;
			}
			match key_value(&line.tokens[1..]) {
				Some((name, value)) => {
					properties.insert(name, value);
				}
				None => self.error(line.number, "Expected `key = value'"),
			}
		}
	}

	fn parse_build(&mut self, tokens: &[BuildToken], line: u32) -> Option<NinjaStatement> {
		let mut explicit_outputs = Vec::new();
		let mut implicit_outputs = Vec::new();
		let mut in_implicit = false;
		let mut rest = tokens.iter();
		let mut seen_colon = false;
		for token in &mut rest {
			match token {
				BuildToken::Text(t) if t.as_bytes() == b":" => {
					seen_colon = true;
					break;
				}
				BuildToken::Text(t) => {
					if in_implicit {
						implicit_outputs.push(t.clone());
					} else {
						explicit_outputs.push(t.clone());
					}
				}
				BuildToken::Pipe => in_implicit = true,
				BuildToken::DoublePipe => {
					self.error(line, "Unexpected `||' in build outputs");
					return None;
				}
				_ => {}
			}
		}
		if !seen_colon {
			self.error(line, "Missing `:' in build statement");
			return None;
		}
		if explicit_outputs.is_empty() && implicit_outputs.is_empty() {
			self.error(line, "build statement without outputs");
			return None;
		}
		let rule = match rest.next() {
			Some(BuildToken::Text(t)) if t.as_bytes() != b":" => t.clone(),
			_ => {
				self.error(line, "Missing rule name in build statement");
				return None;
			}
		};
		let mut explicit_inputs = Vec::new();
		let mut implicit_inputs = Vec::new();
		let mut order_only_inputs = Vec::new();
		let mut section = 0;
		for token in rest {
			match token {
				BuildToken::Pipe => {
					if section == 0 {
						section = 1;
					}
				}
				BuildToken::DoublePipe => section = 2,
				BuildToken::Text(t) => match section {
					0 => explicit_inputs.push(t.clone()),
					1 => implicit_inputs.push(t.clone()),
					_ => order_only_inputs.push(t.clone()),
				},
				_ => {}
			}
		}
		Some(NinjaStatement::BuildDef {
			explicit_outputs,
			implicit_outputs,
			rule,
			explicit_inputs,
			implicit_inputs,
			order_only_inputs,
			properties: IndexMap::new(),
		})
	}

	/// The next statement, or `None` at the end of input.
	pub fn next_statement(&mut self) -> Option<NinjaStatement> {
		loop {
			let line = self.read_line()?;
			let number = line.number;
			let first = match line.tokens.first() {
				Some(token) => token.clone(),
				None => continue,
			};
			match first {
				BuildToken::Indent => {
					// An indented line with no owner. Key-value lines are
					// ignored like comments; anything else is malformed.
					if key_value(&line.tokens[1..]).is_none() {
						self.error(number, "Expected `key = value'");
					}
					continue;
				}
				BuildToken::Pipe => continue,
				BuildToken::DoublePipe => {
					self.error(number, "Unexpected `||'");
					continue;
				}
				BuildToken::Eol | BuildToken::Eof => continue,
				BuildToken::Text(first) => {
					if let Some((name, value)) = key_value(&line.tokens) {
						return Some(NinjaStatement::Assignment { name, value });
					}
					match first.as_bytes() {
						b"build" => match self.parse_build(&line.tokens[1..], number) {
							Some(mut build) => {
								let properties = self.read_properties();
								if let NinjaStatement::BuildDef {
									properties: ref mut p,
									..
								} = build
								{
									*p = properties;
								}
								return Some(build);
							}
							None => {
								// Drop the orphaned property block along
								// with the statement.
								self.read_properties();
								continue;
							}
						},
						b"rule" | b"pool" => {
							// A missing name is tolerated; trailing tokens
							// after the name are ignored.
							let name = match line.tokens.get(1) {
								Some(BuildToken::Text(t)) => lossy(t).into_owned(),
								_ => String::new(),
							};
							let properties = self.read_properties();
							return Some(if first.as_bytes() == b"rule" {
								NinjaStatement::RuleDef { name, properties }
							} else {
								NinjaStatement::PoolDef { name, properties }
							});
						}
						b"include" | b"subninja" => {
							let path = match line.tokens.get(1) {
								Some(BuildToken::Text(t)) => t.clone(),
								_ => {
									self.error(number, "Missing path");
									continue;
								}
							};
							if line.tokens.len() > 2 {
								self.error(number, "Garbage at end of line");
								continue;
							}
							return Some(if first.as_bytes() == b"include" {
								NinjaStatement::Include { file: path }
							} else {
								NinjaStatement::SubNinja { file: path }
							});
						}
						b"default" => {
							let targets: Vec<RawString> = line.tokens[1..]
								.iter()
								.filter_map(|t| match t {
									BuildToken::Text(t) => Some(t.clone()),
									_ => None,
								})
								.collect();
							if targets.is_empty() {
								self.error(number, "Missing targets");
								continue;
							}
							return Some(NinjaStatement::Default { targets });
						}
						_ => {
							self.error(
								number,
								"Expected `build', `rule', `pool', `default', \
								 `include', `subninja', or `var = value'",
							);
							continue;
						}
					}
				}
			}
		}
	}
}

/// Matches a `name = value` token line as produced by the lexer.
fn key_value(tokens: &[BuildToken]) -> Option<(String, RawString)> {
	match tokens {
		[BuildToken::Text(name), BuildToken::Text(eq), BuildToken::Text(value)]
			if eq.as_bytes() == b"=" && !name.is_empty() =>
		{
			Some((lossy(name).into_owned(), value.clone()))
		}
		_ => None,
	}
}

impl<'a, 's> Iterator for StatementParser<'a, 's> {
	type Item = NinjaStatement;

	fn next(&mut self) -> Option<NinjaStatement> {
		self.next_statement()
	}
}

//! Parse and adaptation diagnostics.
//!
//! Malformed input never aborts a parse (see the error policy in the
//! [`ninja`][crate::ninja] and [`adapt`][crate::adapt] modules). Instead,
//! every recoverable problem is reported as a [`Diagnostic`] through a
//! caller-supplied [`DiagnosticsSink`], so embedders decide whether to
//! collect, log, or ignore them.

use std::fmt;
use std::path::PathBuf;

/// How bad a diagnostic is.
///
/// `Error` means a statement or edge was dropped; `Warning` means something
/// was suspicious but the result is still usable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
	Warning,
	Error,
}

/// A single recoverable problem found while parsing or adapting.
#[derive(Clone, Debug)]
pub struct Diagnostic {
	pub severity: Severity,
	pub message: String,
	/// The file in which the problem was found, if known.
	pub file: Option<PathBuf>,
	/// The 1-based physical line, if known.
	pub line: Option<u32>,
}

impl Diagnostic {
	pub fn warning(message: impl Into<String>) -> Diagnostic {
		Diagnostic {
			severity: Severity::Warning,
			message: message.into(),
			file: None,
			line: None,
		}
	}

	pub fn error(message: impl Into<String>) -> Diagnostic {
		Diagnostic {
			severity: Severity::Error,
			message: message.into(),
			file: None,
			line: None,
		}
	}

	pub fn at(mut self, file: Option<PathBuf>, line: u32) -> Diagnostic {
		self.file = file;
		self.line = Some(line);
		self
	}
}

impl fmt::Display for Diagnostic {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		if let Some(file) = &self.file {
			write!(f, "{}", file.display())?;
			if let Some(line) = self.line {
				write!(f, ":{}", line)?;
			}
			write!(f, ": ")?;
		} else if let Some(line) = self.line {
			write!(f, "line {}: ", line)?;
		}
		write!(f, "{}", self.message)
	}
}

/// Where diagnostics go.
pub trait DiagnosticsSink {
	fn report(&mut self, diagnostic: Diagnostic);
}

/// A sink which remembers everything it is given.
///
/// Useful in tests and for callers which inspect the problems afterwards.
#[derive(Debug, Default)]
pub struct CollectingSink {
	pub diagnostics: Vec<Diagnostic>,
}

impl CollectingSink {
	pub fn new() -> CollectingSink {
		CollectingSink {
			diagnostics: Vec::new(),
		}
	}

	/// The number of `Error`-level diagnostics seen so far.
	pub fn n_errors(&self) -> usize {
		self.diagnostics
			.iter()
			.filter(|d| d.severity == Severity::Error)
			.count()
	}
}

impl DiagnosticsSink for CollectingSink {
	fn report(&mut self, diagnostic: Diagnostic) {
		self.diagnostics.push(diagnostic);
	}
}

/// A sink which forwards everything to the `log` crate.
#[derive(Debug, Default)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
	fn report(&mut self, diagnostic: Diagnostic) {
		match diagnostic.severity {
			Severity::Warning => log::warn!("{}", diagnostic),
			Severity::Error => log::error!("{}", diagnostic),
		}
	}
}

//! Textual `$`-expansion of values, driven by the unescaper's tokens.
//!
//! Expansion resolves the escape sequences and variable references of a
//! raw value against a [`VarScope`]. Unresolved variables expand to the
//! empty string, matching what generated build files rely on. A definition
//! cycle (`a = $b`, `b = $a`) is broken by expanding the recurring
//! variable to nothing; a generated file containing one is already broken,
//! and expansion must never be able to hang or overflow.

use super::scope::{FoundVar, VarScope};
use super::unescape::{UnescapedToken, UnescapedTokens};
use raw_string::{RawStr, RawString};

/// Expands all escape sequences and variable references in `value`.
pub fn expand_str<S: VarScope>(value: &RawStr, scope: &S) -> RawString {
	let mut out = Vec::new();
	expand_str_to(value, scope, &mut out, None);
	RawString::from_bytes(out)
}

/// Expands the variable `name`, as if expanding `$name`.
pub fn expand_var<S: VarScope>(name: &str, scope: &S) -> RawString {
	let mut out = Vec::new();
	expand_var_to(name, scope, &mut out, None);
	RawString::from_bytes(out)
}

/// Expands every value of `values`, appending the results to `out`.
pub fn expand_strs_into<S: VarScope>(
	values: &[RawString],
	scope: &S,
	out: &mut Vec<RawString>,
) {
	for value in values {
		out.push(expand_str(value, scope));
	}
}

fn expand_str_to<S: VarScope>(
	value: &RawStr,
	scope: &S,
	out: &mut Vec<u8>,
	prot: Option<&RecursionProtection>,
) {
	for token in UnescapedTokens::new(value) {
		match token {
			UnescapedToken::Literal(text) => out.extend_from_slice(text.as_bytes()),
			UnescapedToken::Variable(name) => expand_var_to(name, scope, out, prot),
			UnescapedToken::EscapedColon => out.push(b':'),
			UnescapedToken::EscapedDollar => out.push(b'$'),
			UnescapedToken::EscapedSpace => out.push(b' '),
			UnescapedToken::Comment(_) => {}
		}
	}
}

fn expand_var_to<S: VarScope>(
	name: &str,
	scope: &S,
	out: &mut Vec<u8>,
	prot: Option<&RecursionProtection>,
) {
	match scope.lookup_var(name) {
		Some(FoundVar::Expanded(value)) => out.extend_from_slice(value.as_bytes()),
		Some(FoundVar::Unexpanded(value)) => {
			if in_recursion(name, prot) {
				return;
			}
			let prot = RecursionProtection { parent: prot, name };
			expand_str_to(value, scope, out, Some(&prot));
		}
		Some(FoundVar::Paths(paths)) => {
			for (i, path) in paths.iter().enumerate() {
				if i > 0 {
					out.push(b' ');
				}
				out.extend_from_slice(path.as_bytes());
			}
		}
		None => {}
	}
}

struct RecursionProtection<'a> {
	parent: Option<&'a RecursionProtection<'a>>,
	name: &'a str,
}

fn in_recursion(name: &str, mut prot: Option<&RecursionProtection>) -> bool {
	while let Some(p) = prot {
		if p.name == name {
			return true;
		}
		prot = p.parent;
	}
	false
}

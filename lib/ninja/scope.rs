//! Variable and rule definition scoping and lookup.

use indexmap::IndexMap;
use raw_string::{RawStr, RawString};

/// A variable with a name and an already expanded value.
#[derive(Debug)]
pub struct ExpandedVar {
	pub name: String,
	pub value: RawString,
}

/// A rule definition with its (unexpanded) property block.
#[derive(Debug)]
pub struct RuleInfo {
	pub name: String,
	pub properties: IndexMap<String, RawString>,
}

/// A file-level scope, containing variables and rules.
#[derive(Debug)]
pub struct FileScope<'p> {
	/// The scope of the file that subninja'd this file, if any.
	pub parent: Option<&'p FileScope<'p>>,

	/// The variables defined in this file (and included files).
	///
	/// Can contain duplicates. Definitions are added in order, so lookup
	/// starts at the end.
	pub vars: Vec<ExpandedVar>,

	/// The rules defined in this file (and included files).
	pub rules: Vec<RuleInfo>,
}

/// The scope of a `build` statement: its own properties on top of the
/// file scope. Input and output paths are expanded with this scope.
#[derive(Debug)]
pub struct BuildScope<'a> {
	pub file_scope: &'a FileScope<'a>,
	pub build_vars: &'a [ExpandedVar],
}

/// The scope used when expanding a rule's properties: the build scope plus
/// the rule's own properties, `$in`, and `$out`.
#[derive(Debug)]
pub struct BuildRuleScope<'a> {
	pub build_scope: &'a BuildScope<'a>,
	pub rule_properties: &'a IndexMap<String, RawString>,
	pub inputs: &'a [RawString],
	pub outputs: &'a [RawString],
}

/// The result of looking a variable up in a [`VarScope`].
pub enum FoundVar<'a> {
	/// Found, and the value was already expanded.
	Expanded(&'a RawStr),
	/// Found, but the value still needs expansion. This is the case for
	/// values defined in a `rule` property block.
	Unexpanded(&'a RawStr),
	/// `$in` or `$out`: a list of paths joined with single spaces.
	Paths(&'a [RawString]),
}

/// A scope in which variables can be looked up.
pub trait VarScope {
	fn lookup_var(&self, var_name: &str) -> Option<FoundVar>;
}

impl VarScope for [ExpandedVar] {
	fn lookup_var(&self, var_name: &str) -> Option<FoundVar> {
		self.iter()
			.rfind(|var| var.name == var_name)
			.map(|var| FoundVar::Expanded(&var.value))
	}
}

impl<'p> VarScope for FileScope<'p> {
	fn lookup_var(&self, var_name: &str) -> Option<FoundVar> {
		self.vars.lookup_var(var_name).or_else(|| {
			self.parent.and_then(|parent| parent.lookup_var(var_name))
		})
	}
}

impl<'a> VarScope for BuildScope<'a> {
	fn lookup_var(&self, var_name: &str) -> Option<FoundVar> {
		self.build_vars
			.lookup_var(var_name)
			.or_else(|| self.file_scope.lookup_var(var_name))
	}
}

impl<'a> VarScope for BuildRuleScope<'a> {
	fn lookup_var(&self, var_name: &str) -> Option<FoundVar> {
		match var_name {
			"in" => Some(FoundVar::Paths(self.inputs)),
			"out" => Some(FoundVar::Paths(self.outputs)),
			_ => self
				.build_scope
				.build_vars
				.lookup_var(var_name)
				.or_else(|| {
					self.rule_properties
						.get(var_name)
						.map(|value| FoundVar::Unexpanded(value))
				})
				.or_else(|| self.build_scope.file_scope.lookup_var(var_name)),
		}
	}
}

impl<'p> FileScope<'p> {
	/// An empty scope with no definitions.
	pub fn new() -> Self {
		FileScope {
			parent: None,
			vars: Vec::new(),
			rules: Vec::new(),
		}
	}

	/// An empty scope which inherits this scope's definitions.
	pub fn new_subscope(&'p self) -> FileScope<'p> {
		FileScope {
			parent: Some(self),
			vars: Vec::new(),
			rules: Vec::new(),
		}
	}

	/// Look up a rule definition. Later definitions shadow earlier ones.
	pub fn lookup_rule(&self, rule_name: &RawStr) -> Option<&RuleInfo> {
		self.rules
			.iter()
			.rfind(|rule| rule.name.as_bytes() == rule_name.as_bytes())
			.or_else(|| {
				self.parent.and_then(|parent| parent.lookup_rule(rule_name))
			})
	}
}

//! Turning a parsed `build.ninja` into a native-library build model.
//!
//! The adapter walks the statement stream of one `build.ninja` (following
//! `include` and `subninja`), resolves rules and variables, and produces:
//!
//! - a map from resolved library name to [`NativeLibrary`]: the artifacts
//!   the file builds, their outputs, and the shared libraries they need
//!   at runtime;
//! - the set of build files touched, for up-to-date checks: every parsed
//!   ninja file, plus the configuration inputs of the generator edge, plus
//!   the project files of passthrough edges;
//! - a binary summary of every per-source compile command, written through
//!   [`CompileCommandsEncoder`][crate::cmdlog::CompileCommandsEncoder].
//!
//! Generated files are taken as they come: a malformed edge or an
//! inconsistent definition is reported through the diagnostics sink and
//! the most recently seen definition wins. The adapter only fails on I/O.

pub mod classify;

use self::classify::{
	assign_target_name, command_tokens, is_archive, is_executable_output,
	is_ninja_tool_command, is_object_output, is_packageable, is_shared_library,
	is_wrapper_token, strip_args_for_ide,
};
use crate::cmdlog::CompileCommandsEncoder;
use crate::diagnostics::{Diagnostic, DiagnosticsSink};
use crate::ninja::expand::{expand_str, expand_strs_into, expand_var};
use crate::ninja::scope::{BuildRuleScope, BuildScope, ExpandedVar, FileScope, RuleInfo};
use crate::ninja::statement::{NinjaStatement, StatementParser};
use indexmap::IndexMap;
use raw_string::{RawStr, RawString};
use std::fs::File;
use std::io::{BufReader, Error, Read};
use std::path::{Path, PathBuf};

const PASSTHROUGH_SUFFIX: &str = ".passthrough";

/// How deep `include`/`subninja` and phony-alias chains are followed
/// before giving up on what must be a cycle.
const MAX_DEPTH: u32 = 32;

/// One native library (or executable) a `build.ninja` produces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeLibrary {
	/// The resolved name, e.g. `foo` for `libfoo.so`.
	pub artifact_name: String,
	/// The ABI this build file targets.
	pub abi: String,
	/// The artifact on disk. When an archive and a shared library resolve
	/// to the same name, the final `.so` (or executable) is the one shown.
	pub output: Option<PathBuf>,
	/// Shared libraries which must be packaged alongside the artifact.
	pub runtime_files: Vec<PathBuf>,
	/// Whether this target is built by handing off to an external build
	/// system through a `<name>.passthrough` edge.
	pub has_passthrough: bool,
	/// The command which builds this target, as assembled by the caller's
	/// command factory.
	pub build_command_components: Option<Vec<String>>,
}

/// The result of adapting one `build.ninja`.
#[derive(Clone, Debug, Default)]
pub struct NinjaBuildModel {
	/// Resolved library name → descriptor, in discovery order.
	pub libraries: IndexMap<String, NativeLibrary>,
	/// Every file whose change invalidates this model.
	pub build_files: Vec<PathBuf>,
}

fn read_bytes(file_name: &Path) -> Result<Vec<u8>, Error> {
	let mut bytes = Vec::new();
	File::open(file_name)
		.and_then(|f| BufReader::with_capacity(0x10000, f).read_to_end(&mut bytes))
		.map_err(|e| {
			Error::new(e.kind(), format!("Unable to read {:?}: {}", file_name, e))
		})?;
	Ok(bytes)
}

fn lossy(s: &RawStr) -> String {
	String::from_utf8_lossy(s.as_bytes()).into_owned()
}

fn resolve_path(base: &Path, path: &str) -> PathBuf {
	let p = Path::new(path);
	if p.is_absolute() {
		p.to_path_buf()
	} else {
		base.join(p)
	}
}

/// Read and adapt one `build.ninja`.
///
/// `abi` tags every produced library. `build_folder` is the directory
/// ninja runs in: relative paths resolve against it and it becomes the
/// working directory of every compile command. `create_ninja_command`
/// turns a target argument into the full command line recorded in
/// [`NativeLibrary::build_command_components`]. The compile-command
/// summary is written to `compile_commands_bin`.
pub fn adapt_ninja_to_build(
	ninja_build_file: &Path,
	abi: &str,
	build_folder: &Path,
	create_ninja_command: &dyn Fn(&[String]) -> Vec<String>,
	compile_commands_bin: &Path,
	sink: &mut dyn DiagnosticsSink,
) -> Result<NinjaBuildModel, Error> {
	let mut encoder = CompileCommandsEncoder::create(compile_commands_bin)?;
	let mut adapter = Adapter {
		abi,
		build_folder,
		create_ninja_command,
		encoder: &mut encoder,
		sink,
		libraries: IndexMap::new(),
		build_files: Vec::new(),
		aliases: IndexMap::new(),
		produced: IndexMap::new(),
		passthroughs: Vec::new(),
	};
	let mut scope = FileScope::new();
	adapter.process_file(ninja_build_file, &mut scope, 0, true)?;
	adapter.resolve_passthroughs();
	let model = NinjaBuildModel {
		libraries: adapter.libraries,
		build_files: adapter.build_files,
	};
	encoder.finish()?;
	Ok(model)
}

struct Adapter<'a> {
	abi: &'a str,
	build_folder: &'a Path,
	create_ninja_command: &'a dyn Fn(&[String]) -> Vec<String>,
	encoder: &'a mut CompileCommandsEncoder,
	sink: &'a mut dyn DiagnosticsSink,
	libraries: IndexMap<String, NativeLibrary>,
	build_files: Vec<PathBuf>,
	/// phony output → its inputs, both as written.
	aliases: IndexMap<String, Vec<String>>,
	/// real output as written → library key.
	produced: IndexMap<String, String>,
	/// outputs ending in `.passthrough`, resolved after the walk.
	passthroughs: Vec<String>,
}

impl<'a> Adapter<'a> {
	fn warn(&mut self, file: &Path, message: String) {
		let mut diagnostic = Diagnostic::warning(message);
		diagnostic.file = Some(file.to_owned());
		self.sink.report(diagnostic);
	}

	fn process_file<'p>(
		&mut self,
		file: &Path,
		scope: &mut FileScope<'p>,
		depth: u32,
		required: bool,
	) -> Result<(), Error> {
		if depth > MAX_DEPTH {
			self.warn(file, "Include depth limit reached; is there a cycle?".to_string());
			return Ok(());
		}
		let bytes = match read_bytes(file) {
			Ok(bytes) => bytes,
			Err(e) if !required => {
				self.warn(file, format!("Skipping unreadable ninja file: {}", e));
				return Ok(());
			}
			Err(e) => return Err(e),
		};
		self.build_files.push(file.to_owned());
		let statements: Vec<NinjaStatement> = {
			let source = RawStr::from_bytes(&bytes);
			StatementParser::new(source, &mut *self.sink)
				.with_file(file)
				.collect()
		};
		for statement in statements {
			match statement {
				NinjaStatement::Assignment { name, value } => {
					let value = expand_str(&value, &*scope);
					scope.vars.push(ExpandedVar { name, value });
				}
				NinjaStatement::RuleDef { name, properties } => {
					scope.rules.push(RuleInfo { name, properties });
				}
				NinjaStatement::PoolDef { .. } => {}
				NinjaStatement::Default { .. } => {}
				NinjaStatement::Include { file: path } => {
					let path = lossy(&expand_str(&path, &*scope));
					let resolved = file.with_file_name(&path);
					self.process_file(&resolved, scope, depth + 1, false)?;
				}
				NinjaStatement::SubNinja { file: path } => {
					let path = lossy(&expand_str(&path, &*scope));
					let resolved = file.with_file_name(&path);
					let mut sub_scope = scope.new_subscope();
					self.process_file(&resolved, &mut sub_scope, depth + 1, false)?;
				}
				NinjaStatement::BuildDef {
					explicit_outputs,
					implicit_outputs: _,
					rule,
					explicit_inputs,
					implicit_inputs,
					order_only_inputs: _,
					properties,
				} => {
					self.process_edge(
						file,
						scope,
						&explicit_outputs,
						&rule,
						&explicit_inputs,
						&implicit_inputs,
						&properties,
					)?;
				}
			}
		}
		Ok(())
	}

	fn process_edge(
		&mut self,
		file: &Path,
		scope: &FileScope,
		explicit_outputs: &[RawString],
		rule: &RawStr,
		explicit_inputs: &[RawString],
		implicit_inputs: &[RawString],
		properties: &IndexMap<String, RawString>,
	) -> Result<(), Error> {
		let build_vars: Vec<ExpandedVar> = properties
			.iter()
			.map(|(name, value)| ExpandedVar {
				name: name.clone(),
				value: expand_str(value, scope),
			})
			.collect();
		let build_scope = BuildScope {
			file_scope: scope,
			build_vars: &build_vars,
		};

		let mut outputs = Vec::new();
		expand_strs_into(explicit_outputs, &build_scope, &mut outputs);
		let mut inputs = Vec::new();
		expand_strs_into(explicit_inputs, &build_scope, &mut inputs);

		// `$out` and `$in` see only the explicit lists; implicit inputs
		// still count for aliasing, build files, and runtime files.
		let outputs_text: Vec<String> = outputs.iter().map(|o| lossy(o)).collect();
		let mut inputs_text: Vec<String> = inputs.iter().map(|i| lossy(i)).collect();
		{
			let mut implicit = Vec::new();
			expand_strs_into(implicit_inputs, &build_scope, &mut implicit);
			inputs_text.extend(implicit.iter().map(|i| lossy(i)));
		}

		if rule.as_bytes() == b"phony" {
			for output in &outputs_text {
				self.aliases.insert(output.clone(), inputs_text.clone());
			}
			return Ok(());
		}

		let rule_info = match scope.lookup_rule(rule) {
			Some(rule_info) => rule_info,
			None => {
				let message = format!("Undefined rule name: {}", lossy(rule));
				self.warn(file, message);
				return Ok(());
			}
		};

		let build_rule_scope = BuildRuleScope {
			build_scope: &build_scope,
			rule_properties: &rule_info.properties,
			inputs: &inputs,
			outputs: &outputs,
		};
		let command = expand_var("command", &build_rule_scope);
		let tokens = command_tokens(&command);

		let generator = rule_info.properties.contains_key("generator")
			|| properties.contains_key("generator");
		if generator {
			// The edge which re-runs the build generator. Its inputs are
			// the configuration files that require a re-configure.
			for input in &inputs_text {
				self.build_files.push(PathBuf::from(input));
			}
			return Ok(());
		}
		if is_ninja_tool_command(&tokens) {
			return Ok(());
		}

		let mut passthrough_edge = false;
		for output in &outputs_text {
			if output.ends_with(PASSTHROUGH_SUFFIX) {
				self.passthroughs.push(output.clone());
				passthrough_edge = true;
			}
		}
		if passthrough_edge {
			// The external build system's project files are part of the
			// build-file set; the edge itself produces nothing visible.
			for input in &inputs_text {
				self.build_files.push(PathBuf::from(input));
			}
			return Ok(());
		}

		if let Some(object) = outputs_text.iter().find(|o| is_object_output(o.as_str())) {
			self.emit_compile_command(object, &inputs_text, &tokens)?;
		}

		for output in &outputs_text {
			if is_shared_library(output) || is_archive(output) || is_executable_output(output)
			{
				self.materialize_library(file, output, &inputs_text);
			}
		}
		Ok(())
	}

	fn emit_compile_command(
		&mut self,
		object: &str,
		inputs: &[String],
		tokens: &[String],
	) -> Result<(), Error> {
		let source = match inputs.iter().find(|i| {
			!is_object_output(i.as_str())
				&& !is_archive(i.as_str())
				&& !is_shared_library(i.as_str())
		}) {
			Some(source) => source,
			None => return Ok(()),
		};
		let mut index = 0;
		while index < tokens.len() && is_wrapper_token(&tokens[index]) {
			index += 1;
		}
		let compiler = match tokens.get(index) {
			Some(compiler) => compiler,
			None => return Ok(()),
		};
		let flags = strip_args_for_ide(source, &tokens[index + 1..]);
		let resolved_source = resolve_path(self.build_folder, source);
		self.encoder.write_command(
			&resolved_source.to_string_lossy(),
			object,
			&self.build_folder.to_string_lossy(),
			compiler,
			&flags,
		)?;
		Ok(())
	}

	fn materialize_library(&mut self, file: &Path, output: &str, inputs: &[String]) {
		let artifact = assign_target_name(output);
		let new_is_archive = is_archive(output);
		let resolved = resolve_path(self.build_folder, output);
		let command =
			Some((self.create_ninja_command)(&[output.to_string()]));
		let mut conflict = None;
		match self.libraries.get_mut(&artifact) {
			Some(library) => {
				let existing_is_archive = library
					.output
					.as_ref()
					.map(|p| is_archive(&p.to_string_lossy()))
					.unwrap_or(true);
				if new_is_archive && !existing_is_archive {
					// An archive feeding into the final library of the
					// same name; the .so or executable stays visible.
				} else {
					if library.output.is_some()
						&& library.output.as_deref() != Some(resolved.as_path())
						&& new_is_archive == existing_is_archive
					{
						conflict = Some(format!(
							"Target {} has conflicting outputs; keeping the \
							 most recent one: {}",
							artifact, output
						));
					}
					library.output = Some(resolved);
					library.build_command_components = command;
				}
			}
			None => {
				self.libraries.insert(
					artifact.clone(),
					NativeLibrary {
						artifact_name: artifact.clone(),
						abi: self.abi.to_string(),
						output: Some(resolved),
						runtime_files: Vec::new(),
						has_passthrough: false,
						build_command_components: command,
					},
				);
			}
		}
		if let Some(message) = conflict {
			self.warn(file, message);
		}
		self.produced.insert(output.to_string(), artifact.clone());
		if let Some(library) = self.libraries.get_mut(&artifact) {
			for input in inputs {
				if is_shared_library(input) && is_packageable(input) {
					let path = PathBuf::from(input);
					if !library.runtime_files.contains(&path) {
						library.runtime_files.push(path);
					}
				}
			}
		}
	}

	/// Follow phony aliases from `name` to a produced output's library.
	fn resolve_alias(&self, name: &str, depth: u32) -> Option<String> {
		if let Some(key) = self.produced.get(name) {
			return Some(key.clone());
		}
		if depth == 0 {
			return None;
		}
		let targets = self.aliases.get(name)?;
		targets
			.iter()
			.find_map(|target| self.resolve_alias(target, depth - 1))
	}

	fn resolve_passthroughs(&mut self) {
		let passthroughs = std::mem::replace(&mut self.passthroughs, Vec::new());
		for passthrough in passthroughs {
			let base = &passthrough[..passthrough.len() - PASSTHROUGH_SUFFIX.len()];
			match self.resolve_alias(base, MAX_DEPTH) {
				Some(key) => {
					let command =
						Some((self.create_ninja_command)(&[passthrough.clone()]));
					if let Some(library) = self.libraries.get_mut(&key) {
						library.has_passthrough = true;
						library.build_command_components = command;
					}
				}
				None => {
					self.sink.report(Diagnostic::warning(format!(
						"Passthrough target {} does not alias any build output",
						passthrough
					)));
				}
			}
		}
	}
}

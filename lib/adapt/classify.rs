//! Path and command-line classification used by the graph adapter.

use raw_string::RawStr;

/// NDK runtime libraries which must be packaged with the app even though
/// they live inside the toolchain tree.
const REDISTRIBUTABLE_RUNTIMES: &[&str] = &[
	"libc++_shared.so",
	"libgnustl_shared.so",
	"libstlport_shared.so",
];

fn file_name(path: &str) -> &str {
	path.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(path)
}

fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
	if name.len() >= suffix.len()
		&& name.as_bytes()[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix.as_bytes())
	{
		Some(&name[..name.len() - suffix.len()])
	} else {
		None
	}
}

/// The library name a build output resolves to.
///
/// The final `.so` or `.a` suffix is stripped case-insensitively, and then
/// a `lib` prefix, so `libfoo.so` and `foo.a` both become `foo`. Only the
/// final suffix is stripped: `lib.xyz.so` is `lib.xyz`. An output with
/// neither prefix nor suffix (an executable) keeps its bare file name.
pub fn assign_target_name(output: &str) -> String {
	let name = file_name(output);
	let stripped = strip_suffix_ignore_case(name, ".so")
		.or_else(|| strip_suffix_ignore_case(name, ".a"));
	let body = match stripped {
		Some(body) => body,
		None => return name.to_string(),
	};
	if body.len() > 3
		&& body.as_bytes()[..3].eq_ignore_ascii_case(b"lib")
		&& body.as_bytes()[3] != b'.'
	{
		body[3..].to_string()
	} else {
		body.to_string()
	}
}

/// Whether a file is packaged alongside the built artifacts.
///
/// Static archives never are. Libraries provided by the platform sysroot
/// (`libEGL.so` and friends) are already on the device, so they are not,
/// with the exception of the redistributable C++ runtimes, which ship
/// inside the NDK tree but must travel with the app.
pub fn is_packageable(path: &str) -> bool {
	let name = file_name(path);
	if strip_suffix_ignore_case(name, ".a").is_some() {
		return false;
	}
	if REDISTRIBUTABLE_RUNTIMES.iter().any(|r| name == *r) {
		return true;
	}
	!path
		.split(|c| c == '/' || c == '\\')
		.any(|segment| segment == "sysroot")
}

/// Does this output name a shared library?
pub fn is_shared_library(path: &str) -> bool {
	strip_suffix_ignore_case(file_name(path), ".so").is_some()
}

/// Does this output name a static archive?
pub fn is_archive(path: &str) -> bool {
	strip_suffix_ignore_case(file_name(path), ".a").is_some()
}

/// Does this output name a compiled object, including precompiled headers?
pub fn is_object_output(path: &str) -> bool {
	let name = file_name(path);
	[".o", ".obj", ".pch", ".gch"]
		.iter()
		.any(|s| strip_suffix_ignore_case(name, s).is_some())
}

/// An extension-less output is taken to be an executable.
pub fn is_executable_output(path: &str) -> bool {
	!file_name(path).contains('.')
}

/// Whether a command token is a wrapper around the real compiler, such as
/// a launcher script or `cmd.exe /C`.
pub fn is_wrapper_token(token: &str) -> bool {
	let name = file_name(token);
	let lower = name.to_ascii_lowercase();
	if lower.ends_with(".sh") || lower.ends_with(".bat") || lower.ends_with(".cmd") {
		return true;
	}
	match lower.as_str() {
		"sh" | "bash" | "cmd" | "cmd.exe" | "ccache" => true,
		_ => token.starts_with('/') && token.len() == 2,
	}
}

/// Splits an expanded command into whitespace-separated tokens.
pub fn command_tokens(command: &RawStr) -> Vec<String> {
	String::from_utf8_lossy(command.as_bytes())
		.split_whitespace()
		.map(|t| t.to_string())
		.collect()
}

/// Does this command invoke the Ninja tool itself (`-t clean`,
/// `-t targets`)? Such edges are utilities, not build steps.
pub fn is_ninja_tool_command(tokens: &[String]) -> bool {
	tokens.windows(2).any(|w| {
		w[0] == "-t" && (w[1] == "clean" || w[1] == "targets")
	})
}

/// Strips the per-source noise out of a compile command's flags, so that
/// the flag lists of an entire target coalesce to one: the source path
/// itself, the output and depfile arguments, and the dependency-generation
/// flags the IDE has no use for.
pub fn strip_args_for_ide(source_file: &str, flags: &[String]) -> Vec<String> {
	const STRIP_WITH_ARG: &[&str] = &["-o", "--output", "-MF"];
	const STRIP_JOINED: &[&str] = &["--output=", "-MF"];
	const STRIP_ALONE: &[&str] = &["-M", "-MM", "-MD", "-MG", "-MP", "-MMD", "-c"];

	let mut out = Vec::with_capacity(flags.len());
	let mut skip_next = false;
	for flag in flags {
		if skip_next {
			skip_next = false;
			continue;
		}
		if !source_file.is_empty() && flag == source_file {
			continue;
		}
		if STRIP_ALONE.iter().any(|s| flag == s) {
			continue;
		}
		if STRIP_WITH_ARG.iter().any(|s| flag == s) {
			skip_next = true;
			continue;
		}
		if STRIP_JOINED
			.iter()
			.any(|s| flag.len() > s.len() && flag.starts_with(s))
		{
			continue;
		}
		out.push(flag.clone());
	}
	out
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn assign_target_names() {
		assert_eq!(assign_target_name("lib.so"), "lib");
		assert_eq!(assign_target_name("LIB.so"), "LIB");
		assert_eq!(assign_target_name("lib.a"), "lib");
		assert_eq!(assign_target_name("LIB.a"), "LIB");
		assert_eq!(assign_target_name("lib"), "lib");
		assert_eq!(assign_target_name("libNAME.so"), "NAME");
		assert_eq!(assign_target_name("LIBname.SO"), "name");
		assert_eq!(assign_target_name("libNAME.a"), "NAME");
		assert_eq!(assign_target_name("LIBname.a"), "name");
		assert_eq!(assign_target_name("NAME.so"), "NAME");
		assert_eq!(assign_target_name("name.SO"), "name");
		assert_eq!(assign_target_name("NAME.a"), "NAME");
		assert_eq!(assign_target_name("name.A"), "name");
		assert_eq!(assign_target_name("executable"), "executable");
		assert_eq!(assign_target_name("/path/to/libfoo_static.a"), "foo_static");
		assert_eq!(assign_target_name("lib.xyz.so"), "lib.xyz");
		assert_eq!(assign_target_name("lib.xyz"), "lib.xyz");
	}

	#[test]
	fn packageable() {
		assert!(is_packageable("libshared.so"));
		assert!(is_packageable("executable"));
		assert!(!is_packageable("/path/to/ndk/sysroot/libEGL.so"));
		assert!(is_packageable("/path/to/ndk/runtime/libc++_shared.so"));
		assert!(!is_packageable("libstatic.a"));
		assert!(is_packageable(
			"C:/Users/jomof/AppData/Local/Android/Sdk/ndk/22.1.7171670/toolchains/llvm/prebuilt/windows-x86_64/sysroot/usr/lib/aarch64-linux-android/libc++_shared.so"
		));
		assert!(!is_packageable(
			"/path/to/ndk/21.4.7075529/toolchains/llvm/prebuilt/darwin-x86_64/sysroot/usr/lib/aarch64-linux-android/21/libEGL.so"
		));
	}

	#[test]
	fn output_kinds() {
		assert!(is_object_output("a/b/c.o"));
		assert!(is_object_output("c.obj"));
		assert!(is_object_output("CMakeFiles/foo.dir/cmake_pch.hxx.pch"));
		assert!(!is_object_output("lib.so"));
		assert!(is_shared_library("libfoo.SO"));
		assert!(is_archive("libfoo.A"));
		assert!(is_executable_output("hello-executable"));
		assert!(!is_executable_output("edit_cache.util"));
	}

	#[test]
	fn wrappers() {
		assert!(is_wrapper_token("wrap.sh"));
		assert!(is_wrapper_token("path/to/wrapper.bat"));
		assert!(is_wrapper_token("cmd.exe"));
		assert!(is_wrapper_token("/C"));
		assert!(!is_wrapper_token("/ndk/clang"));
		assert!(!is_wrapper_token("clang.exe"));
	}

	#[test]
	fn ninja_tool_commands() {
		let clean = command_tokens(RawStr::from_str("/sdk/ninja.exe -t clean"));
		assert!(is_ninja_tool_command(&clean));
		let targets = command_tokens(RawStr::from_str("/sdk/ninja -t targets"));
		assert!(is_ninja_tool_command(&targets));
		let compile = command_tokens(RawStr::from_str("/ndk/clang in.cpp -o out.o"));
		assert!(!is_ninja_tool_command(&compile));
	}

	fn strings(flags: &[&str]) -> Vec<String> {
		flags.iter().map(|f| f.to_string()).collect()
	}

	#[test]
	fn strip_args() {
		assert_eq!(
			strip_args_for_ide("", &strings(&["-abc", "-def", "foo", "bar"])),
			strings(&["-abc", "-def", "foo", "bar"])
		);
		assert_eq!(
			strip_args_for_ide(
				"path/to/source",
				&strings(&["-abc", "-def", "foo", "bar", "path/to/source"])
			),
			strings(&["-abc", "-def", "foo", "bar"])
		);
		assert_eq!(
			strip_args_for_ide("", &strings(&["-abc", "foo", "-o", "blah.o"])),
			strings(&["-abc", "foo"])
		);
		assert_eq!(
			strip_args_for_ide("", &strings(&["-abc", "foo", "--output", "blah.o"])),
			strings(&["-abc", "foo"])
		);
		assert_eq!(
			strip_args_for_ide("", &strings(&["-abc", "foo", "--output=blah.o"])),
			strings(&["-abc", "foo"])
		);
		assert_eq!(
			strip_args_for_ide("", &strings(&["-abc", "foo", "-MFblah"])),
			strings(&["-abc", "foo"])
		);
		assert_eq!(
			strip_args_for_ide("", &strings(&["-abc", "foo", "-MF", "blah"])),
			strings(&["-abc", "foo"])
		);
		assert_eq!(
			strip_args_for_ide(
				"",
				&strings(&["-abc", "-M", "-MM", "-MD", "-MG", "-MP", "-MMD", "-c"])
			),
			strings(&["-abc"])
		);
	}

	#[test]
	fn strip_args_real_data() {
		let flags = strings(&[
			"-MMD",
			"-MP",
			"-MF",
			"app/src/main/cpp/native-lib.o.d",
			"-target",
			"i686-none-linux-android16",
			"--sysroot",
			"/ndk/sysroot",
			"-fPIC",
			"-O0",
			"-c",
			"src/main/cpp/native-lib.cpp",
			"-o",
			"app/src/main/cpp/native-lib.o",
		]);
		assert_eq!(
			strip_args_for_ide("src/main/cpp/native-lib.cpp", &flags),
			strings(&[
				"-target",
				"i686-none-linux-android16",
				"--sysroot",
				"/ndk/sysroot",
				"-fPIC",
				"-O0",
			])
		);
	}
}

//! Reading and writing the binary compile-commands summary.
//!
//! The graph adapter emits one record per compile command: source file,
//! output file, working directory, compiler, and the flag list. Strings
//! are interned into a table as they first appear, so the heavily repeated
//! parts (compiler paths, working directories, whole flag sets) cost four
//! bytes per reference, and verification tooling can stream the records
//! back in order.
//!
//! Layout: the magic `# cxxcmds\n`, a little-endian `u32` version, then
//! records framed by a `u32` head word. With the high bit clear the head
//! is the size of a string record (the next table entry, NUL-padded to a
//! multiple of four); with the high bit set it is the size of a command
//! record: five `u32`s (source, output, working directory, compiler, flag
//! count) followed by the flag string ids.

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use indexmap::map::Entry as IndexMapEntry;
use indexmap::map::IndexMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Error, ErrorKind, Read, Write};
use std::path::Path;

const MAGIC: &[u8] = b"# cxxcmds\n";

/// The current file format version.
pub const FORMAT_VERSION: u32 = 1;

/// One compile command, borrowed from a [`CompileCommandsLog`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileCommand<'a> {
	pub source_file: &'a Path,
	pub output_file: &'a Path,
	pub working_directory: &'a Path,
	pub compiler: &'a Path,
	pub flags: Vec<&'a str>,
}

#[derive(Clone, Debug)]
struct Record {
	source: u32,
	output: u32,
	working_directory: u32,
	compiler: u32,
	flags: Vec<u32>,
}

/// The decoded contents of a compile-commands file.
#[derive(Clone, Debug, Default)]
pub struct CompileCommandsLog {
	strings: Vec<String>,
	records: Vec<Record>,
}

fn invalid(message: String) -> Error {
	Error::new(ErrorKind::InvalidData, message)
}

impl CompileCommandsLog {
	/// Read a compile-commands file.
	pub fn read(file: impl AsRef<Path>) -> Result<CompileCommandsLog, Error> {
		let mut file = File::open(file.as_ref()).map_err(|e| {
			Error::new(
				e.kind(),
				format!("Unable to read {:?}: {}", file.as_ref(), e),
			)
		})?;
		CompileCommandsLog::read_from(&mut file)
	}

	pub fn read_from(file: &mut dyn Read) -> Result<CompileCommandsLog, Error> {
		let mut file = BufReader::new(file);

		{
			let mut magic = [0u8; 10];
			file.read_exact(&mut magic)?;
			if magic != *MAGIC {
				return Err(invalid("Not a compile-commands file".to_string()));
			}
		}

		let version = file.read_u32::<LE>()?;
		if version != FORMAT_VERSION {
			return Err(invalid(format!(
				"Only version {} is supported, but version {} was found",
				FORMAT_VERSION, version
			)));
		}

		let mut log = CompileCommandsLog::default();

		while let Some(head) = match file.read_u32::<LE>() {
			Ok(data) => Some(data),
			Err(ref e) if e.kind() == ErrorKind::UnexpectedEof => None,
			Err(e) => return Err(e),
		} {
			if head & 0x8000_0000 == 0 {
				// String record
				let size = head;
				if size % 4 != 0 {
					return Err(invalid(format!("Invalid string record size: 0x{:x}", size)));
				}
				let mut bytes = vec![0u8; size as usize];
				file.read_exact(&mut bytes)?;
				while bytes.last() == Some(&0u8) {
					bytes.pop();
				}
				let string = String::from_utf8(bytes)
					.map_err(|_| invalid("Invalid UTF-8 in string record".to_string()))?;
				log.strings.push(string);
			} else {
				// Command record
				let size = head & 0x7FFF_FFFF;
				if size % 4 != 0 || size < 20 {
					return Err(invalid(format!(
						"Invalid command record size: 0x{:x}",
						size
					)));
				}
				let n_strings = log.strings.len() as u32;
				let check = |id: u32| {
					if id < n_strings {
						Ok(id)
					} else {
						Err(invalid(format!("Undefined string ID: 0x{:x}", id)))
					}
				};
				let source = check(file.read_u32::<LE>()?)?;
				let output = check(file.read_u32::<LE>()?)?;
				let working_directory = check(file.read_u32::<LE>()?)?;
				let compiler = check(file.read_u32::<LE>()?)?;
				let n_flags = file.read_u32::<LE>()?;
				if size != 20 + n_flags * 4 {
					return Err(invalid(format!(
						"Command record size 0x{:x} does not match {} flags",
						size, n_flags
					)));
				}
				let mut flags = Vec::with_capacity(n_flags as usize);
				for _ in 0..n_flags {
					flags.push(check(file.read_u32::<LE>()?)?);
				}
				log.records.push(Record {
					source,
					output,
					working_directory,
					compiler,
					flags,
				});
			}
		}

		Ok(log)
	}

	/// The number of compile commands in the file.
	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	/// The commands, in the order they were written.
	pub fn commands(&self) -> impl Iterator<Item = CompileCommand> {
		self.records.iter().map(move |record| CompileCommand {
			source_file: Path::new(&self.strings[record.source as usize]),
			output_file: Path::new(&self.strings[record.output as usize]),
			working_directory: Path::new(&self.strings[record.working_directory as usize]),
			compiler: Path::new(&self.strings[record.compiler as usize]),
			flags: record
				.flags
				.iter()
				.map(|&id| self.strings[id as usize].as_str())
				.collect(),
		})
	}
}

/// Writes a compile-commands file.
#[derive(Debug)]
pub struct CompileCommandsEncoder {
	strings: IndexMap<String, ()>,
	file: BufWriter<File>,
}

impl CompileCommandsEncoder {
	/// Create a new file, truncating any existing one.
	pub fn create(path: impl AsRef<Path>) -> Result<CompileCommandsEncoder, Error> {
		let mut file = BufWriter::new(File::create(path)?);
		file.write_all(MAGIC)?;
		file.write_u32::<LE>(FORMAT_VERSION)?;
		Ok(CompileCommandsEncoder {
			strings: IndexMap::new(),
			file,
		})
	}

	/// Writes the string to the table if it is not already in there.
	///
	/// In both cases, returns the ID of the string.
	fn intern(&mut self, string: &str) -> Result<u32, Error> {
		let entry = self.strings.entry(string.to_string());
		let id = entry.index() as u32;
		if let IndexMapEntry::Vacant(entry) = entry {
			let padding = (4 - entry.key().len() % 4) % 4;
			self.file
				.write_u32::<LE>((entry.key().len() + padding) as u32)?;
			self.file.write_all(entry.key().as_bytes())?;
			self.file.write_all(&b"\0\0\0"[..padding])?;
			entry.insert(());
		}
		Ok(id)
	}

	/// Append one compile command.
	pub fn write_command(
		&mut self,
		source_file: &str,
		output_file: &str,
		working_directory: &str,
		compiler: &str,
		flags: &[String],
	) -> Result<(), Error> {
		let source = self.intern(source_file)?;
		let output = self.intern(output_file)?;
		let working_directory = self.intern(working_directory)?;
		let compiler = self.intern(compiler)?;
		let mut flag_ids = Vec::with_capacity(flags.len());
		for flag in flags {
			flag_ids.push(self.intern(flag)?);
		}
		let size = 20 + flag_ids.len() as u32 * 4;
		self.file.write_u32::<LE>(0x8000_0000 | size)?;
		self.file.write_u32::<LE>(source)?;
		self.file.write_u32::<LE>(output)?;
		self.file.write_u32::<LE>(working_directory)?;
		self.file.write_u32::<LE>(compiler)?;
		self.file.write_u32::<LE>(flag_ids.len() as u32)?;
		for id in flag_ids {
			self.file.write_u32::<LE>(id)?;
		}
		Ok(())
	}

	/// Flush everything to disk.
	pub fn finish(mut self) -> Result<(), Error> {
		self.file.flush()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn temp_file(name: &str) -> std::path::PathBuf {
		std::env::temp_dir().join(name)
	}

	#[test]
	fn round_trip() -> Result<(), Error> {
		let path = temp_file("ninjagraph-test-cmdlog");
		std::fs::remove_file(&path).ok();
		{
			let mut encoder = CompileCommandsEncoder::create(&path)?;
			encoder.write_command(
				"my/source/file.cpp",
				"my/output/file.o",
				"my/working/directory",
				"clang.exe",
				&["-a".to_string(), "-b".to_string()],
			)?;
			encoder.finish()?;
		}
		let log = CompileCommandsLog::read(&path)?;
		assert_eq!(log.len(), 1);
		let command = log.commands().next().unwrap();
		assert_eq!(command.source_file, Path::new("my/source/file.cpp"));
		assert_eq!(command.output_file, Path::new("my/output/file.o"));
		assert_eq!(command.working_directory, Path::new("my/working/directory"));
		assert_eq!(command.compiler, Path::new("clang.exe"));
		assert_eq!(command.flags, vec!["-a", "-b"]);
		std::fs::remove_file(&path)?;
		Ok(())
	}

	#[test]
	fn interning_shares_repeated_strings() -> Result<(), Error> {
		let path = temp_file("ninjagraph-test-cmdlog-intern");
		std::fs::remove_file(&path).ok();
		let flags = vec!["-a".to_string(), "-b".to_string()];
		{
			let mut encoder = CompileCommandsEncoder::create(&path)?;
			encoder.write_command("file-1.cpp", "file-1.o", "dir", "clang", &flags)?;
			encoder.write_command("file-2.cpp", "file-2.o", "dir", "clang", &flags)?;
			encoder.finish()?;
		}
		let log = CompileCommandsLog::read(&path)?;
		assert_eq!(log.len(), 2);
		let commands: Vec<_> = log.commands().collect();
		assert_eq!(commands[0].compiler, commands[1].compiler);
		assert_eq!(commands[0].flags, commands[1].flags);
		// Interned strings appear once: 4 distinct sources/outputs plus
		// dir, clang, -a, -b.
		assert_eq!(log.strings.len(), 8);
		std::fs::remove_file(&path)?;
		Ok(())
	}

	#[test]
	fn order_is_preserved() -> Result<(), Error> {
		let path = temp_file("ninjagraph-test-cmdlog-order");
		std::fs::remove_file(&path).ok();
		{
			let mut encoder = CompileCommandsEncoder::create(&path)?;
			for i in 0..100 {
				encoder.write_command(
					&format!("source-{}.cpp", i),
					&format!("output-{}.o", i),
					"dir",
					"clang",
					&[format!("-DINDEX={}", i)],
				)?;
			}
			encoder.finish()?;
		}
		let log = CompileCommandsLog::read(&path)?;
		assert_eq!(log.len(), 100);
		for (i, command) in log.commands().enumerate() {
			assert_eq!(
				command.source_file,
				Path::new(&format!("source-{}.cpp", i))
			);
			assert_eq!(command.flags, vec![format!("-DINDEX={}", i).as_str()]);
		}
		std::fs::remove_file(&path)?;
		Ok(())
	}

	#[test]
	fn rejects_garbage() {
		let mut garbage: &[u8] = b"This is an invalid file";
		let err = CompileCommandsLog::read_from(&mut garbage).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::InvalidData);
	}

	#[test]
	fn rejects_unknown_version() {
		let mut bytes = Vec::new();
		bytes.extend_from_slice(MAGIC);
		bytes.extend_from_slice(&99u32.to_le_bytes());
		let err = CompileCommandsLog::read_from(&mut &bytes[..]).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::InvalidData);
	}
}

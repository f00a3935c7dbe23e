//! Reading and writing dependency logs (i.e. `.ninja_deps` files).
//!
//! The log is append-only: a growing table of path records, each
//! implicitly numbered in order of first appearance, and dependency
//! records which refer to paths by id. A path record carries the bitwise
//! complement of its own id as a checksum, which catches truncated or
//! spliced files independently of the stream position. Versions 3 and 4
//! differ only in the width of the timestamp.

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use indexmap::map::Entry as IndexMapEntry;
use indexmap::map::IndexMap;
use raw_string::{RawStr, RawString};
use std::fs::File;
use std::io::{BufReader, BufWriter, Error, ErrorKind, Read, Write};
use std::mem::replace;
use std::path::Path;

const MAGIC: &[u8] = b"# ninjadeps\n";

#[derive(Clone, Debug, PartialEq, Eq)]
struct Record {
	deps: Vec<u32>,
	/// Nanoseconds. Version-3 logs store seconds; they are normalized to
	/// the last nanosecond of that second when read.
	timestamp: u64,
}

/// The contents of a `.ninja_deps` file.
#[derive(Clone, Debug)]
pub struct DepsLog {
	version: u32,
	records: IndexMap<RawString, Option<Record>>,
}

fn invalid(message: String) -> Error {
	Error::new(ErrorKind::InvalidData, message)
}

fn check_version(version: u32) -> Result<(), Error> {
	if version == 3 || version == 4 {
		Ok(())
	} else {
		Err(invalid(format!(
			"Only version 3 and 4 are supported, but version {} was found",
			version
		)))
	}
}

impl DepsLog {
	/// The format version of the file this log was read from.
	pub fn version(&self) -> u32 {
		self.version
	}

	/// The number of paths in the path table.
	pub fn path_count(&self) -> usize {
		self.records.len()
	}

	/// The path with the given id, if the table is that large.
	pub fn path_by_id(&self, id: u32) -> Option<&RawStr> {
		self.records.get_index(id as usize).map(|(k, _)| &k[..])
	}

	/// The dependencies recorded for a target, in record order.
	///
	/// `None` if the log has no dependencies record for this target. The
	/// most recently appended record is authoritative.
	pub fn get_dependencies(&self, target: &RawStr) -> Option<Vec<&RawStr>> {
		let record = self.records.get(target)?.as_ref()?;
		Some(
			record
				.deps
				.iter()
				.filter_map(|&id| self.path_by_id(id))
				.collect(),
		)
	}

	/// The timestamp recorded for a target, in nanoseconds.
	pub fn get_timestamp(&self, target: &RawStr) -> Option<u64> {
		Some(self.records.get(target)?.as_ref()?.timestamp)
	}

	/// Iterate over all targets with a dependencies record, in path-table
	/// order.
	pub fn targets(&self) -> impl Iterator<Item = &RawStr> {
		self.records
			.iter()
			.filter(|(_, v)| v.is_some())
			.map(|(k, _)| &k[..])
	}

	/// Read a log from a file.
	pub fn read(file: impl AsRef<Path>) -> Result<DepsLog, Error> {
		let mut file = File::open(file.as_ref()).map_err(|e| {
			Error::new(
				e.kind(),
				format!("Unable to read {:?}: {}", file.as_ref(), e),
			)
		})?;
		DepsLog::read_from(&mut file)
	}

	/// Read a log.
	pub fn read_from(file: &mut dyn Read) -> Result<DepsLog, Error> {
		let mut file = BufReader::new(file);

		{
			let mut header = [0u8; 12];
			file.read_exact(&mut header)?;
			if header != *MAGIC {
				return Err(invalid("Not a ninjadeps file".to_string()));
			}
		}

		let version = file.read_u32::<LE>()?;
		check_version(version)?;

		let mut records = IndexMap::<RawString, Option<Record>>::new();

		while let Some(record_head) = match file.read_u32::<LE>() {
			Ok(data) => Some(data),
			Err(ref e) if e.kind() == ErrorKind::UnexpectedEof => None,
			Err(e) => return Err(e),
		} {
			if record_head & 0x8000_0000 == 0 {
				// Path record
				let size = record_head;

				if size % 4 != 0 || size < 4 {
					return Err(invalid(format!("Invalid path record size: 0x{:x}", size)));
				}

				let id = records.len() as u32;

				let mut name = vec![0u8; size as usize - 4];
				file.read_exact(&mut name)?;
				while name.last() == Some(&0u8) {
					// Remove padding
					name.pop();
				}

				let checksum = file.read_u32::<LE>()?;
				if checksum != !id {
					return Err(invalid(format!(
						"Invalid checksum in file: 0x{:08x} for ID 0x{:08x}",
						checksum, id
					)));
				}

				if records.insert(RawString::from_bytes(name), None).is_some() {
					return Err(invalid(format!("Duplicate path in file, ID 0x{:x}", id)));
				}
			} else {
				// Dependencies record
				let size = record_head & 0x7FFF_FFFF;

				let min_size = if version < 4 { 8 } else { 12 };
				if size % 4 != 0 || size < min_size {
					return Err(invalid(format!(
						"Invalid dependencies record size: 0x{:x}",
						size
					)));
				}

				let len = (size / 4 - if version < 4 { 2 } else { 3 }) as usize;

				let id = file.read_u32::<LE>()? as usize;

				let timestamp = if version < 4 {
					u64::from(file.read_u32::<LE>()?) * 1_000_000_000 + 999_999_999
				} else {
					file.read_u64::<LE>()?
				};

				let n_records = records.len();

				let record = match records.get_index_mut(id) {
					Some((_, r)) => r,
					None => {
						return Err(invalid(format!(
							"Dependencies record for undefined path ID: 0x{:x}",
							id
						)));
					}
				};

				let mut record_deps = match record {
					Some(r) => {
						// Re-use the old deps vector.
						let mut d = replace(&mut r.deps, Vec::new());
						d.clear();
						d
					}
					None => Vec::new(),
				};

				record_deps.reserve_exact(len);

				for _ in 0..len {
					let dep = file.read_u32::<LE>()?;
					if dep as usize >= n_records {
						return Err(invalid(format!(
							"Undefined path ID in dependency: 0x{:x}",
							dep
						)));
					}
					record_deps.push(dep);
				}

				*record = Some(Record {
					deps: record_deps,
					timestamp,
				});
			}
		}

		Ok(DepsLog { version, records })
	}
}

/// Writes a `.ninja_deps` file, either fresh or appending to a valid
/// existing one.
///
/// The encoder holds the file handle exclusively for the duration of the
/// session; concurrent writers must be serialized by the caller.
#[derive(Debug)]
pub struct NinjaDepsEncoder {
	log: DepsLog,
	file: BufWriter<File>,
}

/// Create a minimal valid log containing only the version record.
pub fn create_empty_ninja_deps_file(
	file: impl AsRef<Path>,
	version: u32,
) -> Result<(), Error> {
	check_version(version)?;
	let mut file = File::create(file)?;
	file.write_all(MAGIC)?;
	file.write_u32::<LE>(version)?;
	Ok(())
}

/// Streaming-duplicate a log: replay the whole path table and every live
/// dependencies record into `dest`.
///
/// The duplicate's path table has exactly the source's contents and id
/// assignment, even though superseded dependency records are not carried
/// over.
pub fn duplicate(source: &DepsLog, dest: &mut NinjaDepsEncoder) -> Result<(), Error> {
	fn own(s: &RawStr) -> RawString {
		RawString::from_bytes(s.as_bytes().to_vec())
	}
	for id in 0..source.path_count() as u32 {
		if let Some(path) = source.path_by_id(id) {
			dest.write_path(own(path))?;
		}
	}
	let targets: Vec<RawString> = source.targets().map(own).collect();
	for target in targets {
		let deps: Vec<RawString> = source
			.get_dependencies(&target)
			.unwrap_or_default()
			.iter()
			.map(|&d| own(d))
			.collect();
		let timestamp = source.get_timestamp(&target).unwrap_or(0);
		dest.write_target(target, timestamp, deps)?;
	}
	Ok(())
}

impl NinjaDepsEncoder {
	/// Open a dependency log for appending, or start a new version-4 log
	/// if the file is empty or absent.
	///
	/// An existing file must be a valid log; a corrupt one is an error, so
	/// that the caller can fall back to treating all dependencies as
	/// stale.
	pub fn open(file: impl AsRef<Path>) -> Result<NinjaDepsEncoder, Error> {
		let mut file = std::fs::OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.open(file)?;
		if file.metadata()?.len() == 0 {
			file.write_all(MAGIC)?;
			file.write_u32::<LE>(4)?;
			Ok(NinjaDepsEncoder {
				log: DepsLog {
					version: 4,
					records: IndexMap::new(),
				},
				file: BufWriter::new(file),
			})
		} else {
			let log = DepsLog::read_from(&mut file)?;
			Ok(NinjaDepsEncoder {
				log,
				file: BufWriter::new(file),
			})
		}
	}

	/// Writes a path record, if the path isn't already in the table.
	///
	/// In both cases, returns the id of the path.
	pub fn write_path(&mut self, path: RawString) -> Result<u32, Error> {
		let entry = self.log.records.entry(path);
		let id = entry.index() as u32;
		if let IndexMapEntry::Vacant(entry) = entry {
			let padding = (4 - entry.key().len() % 4) % 4;
			let size = entry.key().len() as u32 + padding as u32 + 4;
			self.file.write_u32::<LE>(size)?;
			self.file.write_all(entry.key().as_bytes())?;
			self.file.write_all(&b"\0\0\0"[..padding])?;
			self.file.write_u32::<LE>(!id)?;
			entry.insert(None);
		}
		Ok(id)
	}

	/// Append a dependencies record, introducing any paths not yet in the
	/// table (the target first, then each dependency in order).
	///
	/// A record identical to what the log already holds for this target is
	/// not written again.
	pub fn write_target(
		&mut self,
		target: RawString,
		timestamp: u64,
		deps: Vec<RawString>,
	) -> Result<(), Error> {
		let target = self.write_path(target)?;

		let mut dep_ids = Vec::with_capacity(deps.len());
		for dep in deps {
			dep_ids.push(self.write_path(dep)?);
		}

		let new = Record {
			deps: dep_ids,
			timestamp,
		};
		match self.log.records.get_index(target as usize) {
			Some((_, record)) if record.as_ref() == Some(&new) => return Ok(()),
			_ => {}
		}

		let size = new.deps.len() as u32 * 4 + if self.log.version < 4 { 8 } else { 12 };
		self.file.write_u32::<LE>(0x8000_0000 | size)?;
		self.file.write_u32::<LE>(target)?;
		if self.log.version < 4 {
			self.file
				.write_u32::<LE>((new.timestamp / 1_000_000_000) as u32)?;
		} else {
			self.file.write_u64::<LE>(new.timestamp)?;
		}
		for &dep in &new.deps {
			self.file.write_u32::<LE>(dep)?;
		}

		if let Some((_, record)) = self.log.records.get_index_mut(target as usize) {
			*record = Some(new);
		}
		Ok(())
	}

	/// Flush and close the writing session.
	pub fn close(mut self) -> Result<(), Error> {
		self.file.flush()
	}
}

impl std::ops::Deref for NinjaDepsEncoder {
	type Target = DepsLog;
	fn deref(&self) -> &DepsLog {
		&self.log
	}
}

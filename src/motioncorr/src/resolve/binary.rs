
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use semver::Version;
use tracing::{debug, trace};

use super::{CudaVersion, Program, ResolveError};


/// An installed MotionCor binary, identified by its file name,
/// eg `MotionCor2_1.4.0_Cuda101` or `MotionCor3_1.0.1_Cuda121_06-23-2023`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
	pub path: PathBuf,
	pub program: Program,
	pub version: Version,
	pub cuda: CudaVersion
}


fn name_regex() -> &'static Regex {
	static REGEX: OnceLock<Regex> = OnceLock::new();
	REGEX.get_or_init(|| {
		Regex::new(r"^(MotionCor[23])_v?(\d+\.\d+\.\d+)_Cuda(\d{2,3})(?:_.*)?$")
			.expect("invalid regex")
	})
}


pub fn parse_binary_name(name: &str) -> Option<(Program, Version, CudaVersion)> {
	let caps = name_regex().captures(name)?;
	let program = caps[1].parse::<Program>().ok()?;
	let version = caps[2].parse::<Version>().ok()?;
	let cuda = CudaVersion::from_tag(&caps[3])?;
	Some((program, version, cuda))
}


/// Lists every binary for exactly this program and version in the folders.
/// Missing folders are skipped.
pub fn find_candidates(dirs: &[PathBuf], program: Program, version: &Version) -> Result<Vec<Candidate>,ResolveError> {

	let mut candidates = Vec::<Candidate>::new();

	for dir in dirs {

		if !dir.is_dir() {
			debug!("Skipping missing binary folder: {}", dir.to_string_lossy());
			continue;
		}

		let entries = fs::read_dir(dir)
			.map_err(|source| ResolveError::Io {
				path: dir.clone(),
				source
			})?;
		for entry in entries {
			let entry = entry
				.map_err(|source| ResolveError::Io {
					path: dir.clone(),
					source
				})?;
			let path = entry.path();
			if !path.is_file() {
				continue;
			}
			let name = entry.file_name();
			let Some((found_program, found_version, cuda)) = name.to_str().and_then(parse_binary_name)
				else { continue; };
			if found_program != program || &found_version != version {
				trace!("Ignoring {}: wrong program or version", path.to_string_lossy());
				continue;
			}
			debug!("Found candidate: {}", path.to_string_lossy());
			candidates.push(Candidate {
				path,
				program: found_program,
				version: found_version,
				cuda
			});
		}
	}

	Ok(candidates)
}


/// Picks the candidate built for exactly the local CUDA version,
/// or failing that, the newest one built for an older CUDA.
/// Binaries built for a newer CUDA won't run, so they're never picked.
/// Among binaries built for the same CUDA, the smallest file name wins.
pub fn select_cuda(candidates: &[Candidate], local: CudaVersion) -> Option<&Candidate> {
	candidates.iter()
		.filter(|c| c.cuda <= local)
		.min_by(|a, b| {
			b.cuda.cmp(&a.cuda)
				.then_with(|| file_name(&a.path).cmp(file_name(&b.path)))
		})
}


fn file_name(path: &Path) -> &std::ffi::OsStr {
	path.file_name()
		.unwrap_or(path.as_os_str())
}


//! Picks the MotionCor binary to run, and the command-line flags it understands.
//!
//! MotionCor ships one binary per release and CUDA toolkit,
//! and flags come and go between releases.

pub mod cuda;
pub mod capabilities;
pub mod config;
pub mod binary;

use std::env;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Command;
use std::str::FromStr;

use anyhow::{bail, Context};
use semver::Version;
use thiserror::Error;
use tracing::{debug, info};

pub use cuda::{cuda_home_from_lib, detect_cuda_version, CudaVersion};
pub use capabilities::{Capability, CapabilityTable, Release};
pub use config::BinaryConfig;
pub use binary::{find_candidates, parse_binary_name, select_cuda, Candidate};

use crate::args::McArgs;


#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Program {
	MotionCor2,
	MotionCor3
}

impl Program {

	pub fn name(&self) -> &'static str {
		match self {
			Self::MotionCor2 => "MotionCor2",
			Self::MotionCor3 => "MotionCor3"
		}
	}
}

impl fmt::Display for Program {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for Program {

	type Err = anyhow::Error;

	fn from_str(s: &str) -> anyhow::Result<Self> {
		match s.trim().to_lowercase().as_str() {
			"motioncor2" => Ok(Self::MotionCor2),
			"motioncor3" => Ok(Self::MotionCor3),
			_ => bail!("Unknown program: {}, try MotionCor2 or MotionCor3", s)
		}
	}
}


/// Parses release versions the way people write them: `1.4.0`, `v1.4.0`, or just `1.4`.
pub fn parse_version(s: &str) -> anyhow::Result<Version> {

	let trimmed = s.trim();
	let trimmed = trimmed.strip_prefix('v')
		.unwrap_or(trimmed);

	let padded = match trimmed.split('.').count() {
		1 => format!("{}.0.0", trimmed),
		2 => format!("{}.0", trimmed),
		_ => trimmed.to_string()
	};

	Version::parse(&padded)
		.context(format!("Failed to parse version: {}", s))
}


#[derive(Debug, Error)]
pub enum ResolveError {

	#[error("No {program} {version} binary for CUDA {cuda} or older: {reason}")]
	BinaryNotFound {
		program: Program,
		version: Version,
		cuda: CudaVersion,
		reason: String
	},

	#[error("{program} {version} doesn't support: {}", list(.options))]
	UnsupportedOption {
		program: Program,
		version: Version,
		options: Vec<Capability>
	},

	#[error("Unsupported input movie, expected .mrc, .tif, .tiff, or .eer: {}", .path.to_string_lossy())]
	UnsupportedInput {
		path: PathBuf
	},

	#[error("Invalid MotionCor configuration: {0}")]
	Config(String),

	#[error("Failed to read binary folder: {}", .path.to_string_lossy())]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error
	}
}

fn list(options: &[Capability]) -> String {
	options.iter()
		.map(|o| o.to_string())
		.collect::<Vec<_>>()
		.join(", ")
}


/// Which MotionCor the caller wants to run, and where to look for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryVersionSpec {
	pub program: Program,
	pub version: Version,
	/// the locally installed CUDA toolkit
	pub cuda: CudaVersion,
	pub config: BinaryConfig
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flag {
	pub name: &'static str,
	pub values: Vec<String>
}

impl Flag {

	pub fn new(name: &'static str, values: impl IntoIterator<Item=impl ToString>) -> Self {
		Self {
			name,
			values: values.into_iter()
				.map(|v| v.to_string())
				.collect()
		}
	}
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
	pub executable: PathBuf,
	/// prepended to LD_LIBRARY_PATH
	pub cuda_lib: Option<PathBuf>,
	pub flags: Vec<Flag>,
	/// passed through after the flags, untouched
	pub extra: Vec<String>
}

impl ResolvedCommand {

	pub fn args(&self) -> Vec<String> {
		let mut args = Vec::<String>::new();
		for flag in &self.flags {
			args.push(flag.name.to_string());
			args.extend(flag.values.iter().cloned());
		}
		args.extend(self.extra.iter().cloned());
		args
	}

	pub fn flag(&self, name: &str) -> Option<&Flag> {
		self.flags.iter()
			.find(|f| f.name == name)
	}

	pub fn command(&self) -> anyhow::Result<Command> {

		let mut cmd = Command::new(&self.executable);
		cmd.args(self.args());

		if let Some(cuda_lib) = &self.cuda_lib {
			let mut paths = vec![cuda_lib.clone()];
			if let Some(existing) = env::var_os("LD_LIBRARY_PATH") {
				paths.extend(env::split_paths(&existing));
			}
			let joined: OsString = env::join_paths(paths)
				.context(format!("CUDA library path can't be added to LD_LIBRARY_PATH: {}", cuda_lib.to_string_lossy()))?;
			cmd.env("LD_LIBRARY_PATH", joined);
		}

		Ok(cmd)
	}
}

impl fmt::Display for ResolvedCommand {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.executable.to_string_lossy())?;
		for arg in self.args() {
			write!(f, " {}", arg)?;
		}
		Ok(())
	}
}


pub struct Resolver<'t> {
	table: &'t CapabilityTable
}

impl<'t> Resolver<'t> {

	pub fn new(table: &'t CapabilityTable) -> Self {
		Self {
			table
		}
	}

	/// The search paths are only used when the config doesn't name an install home.
	#[tracing::instrument(skip_all, level = 5, name = "Resolve")]
	pub fn resolve(&self, spec: &BinaryVersionSpec, search_paths: &[PathBuf], args: &McArgs) -> Result<ResolvedCommand,ResolveError> {

		let executable = match &spec.config.explicit_binary {

			Some(path) => {
				info!("Using configured binary: {}", path.to_string_lossy());
				path.clone()
			}

			None => {
				let dirs = match &spec.config.install_home {
					Some(home) => vec![home.clone(), home.join("bin")],
					None => search_paths.to_vec()
				};
				let candidates = find_candidates(&dirs, spec.program, &spec.version)?;
				debug!("{} candidates for {} {}", candidates.len(), spec.program, spec.version);
				let not_found = |reason: String| ResolveError::BinaryNotFound {
					program: spec.program,
					version: spec.version.clone(),
					cuda: spec.cuda,
					reason
				};
				if candidates.is_empty() {
					let dirs = dirs.iter()
						.map(|d| d.to_string_lossy().to_string())
						.collect::<Vec<_>>()
						.join(", ");
					return Err(not_found(format!("nothing installed in [{}]", dirs)));
				}
				let Some(candidate) = select_cuda(&candidates, spec.cuda)
					else {
						let mut cudas = candidates.iter()
							.map(|c| c.cuda)
							.collect::<Vec<_>>();
						cudas.sort();
						cudas.dedup();
						let cudas = cudas.iter()
							.map(|c| c.to_string())
							.collect::<Vec<_>>()
							.join(", ");
						return Err(not_found(format!("only built for CUDA {}", cudas)));
					};
				info!("Using {} for CUDA {}", candidate.path.to_string_lossy(), spec.cuda);
				candidate.path.clone()
			}
		};

		let Some(supported) = self.table.capabilities(spec.program, &spec.version)
			else {
				return Err(ResolveError::Config(format!("No capabilities known for {} {}", spec.program, spec.version)));
			};

		let missing = args.required_capabilities()
			.into_iter()
			.filter(|c| !supported.contains(c))
			.collect::<Vec<_>>();
		if !missing.is_empty() {
			return Err(ResolveError::UnsupportedOption {
				program: spec.program,
				version: spec.version.clone(),
				options: missing
			});
		}

		Ok(ResolvedCommand {
			executable,
			cuda_lib: spec.config.explicit_cuda_lib.clone(),
			flags: args.flags(),
			extra: args.extra.clone()
		})
	}
}


/// Resolves against the built-in capability table.
pub fn resolve(spec: &BinaryVersionSpec, search_paths: &[PathBuf], args: &McArgs) -> Result<ResolvedCommand,ResolveError> {
	Resolver::new(CapabilityTable::builtin())
		.resolve(spec, search_paths, args)
}

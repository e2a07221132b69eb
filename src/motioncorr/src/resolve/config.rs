
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use toml::Table;
use tracing::debug;


pub const ENV_HOME: &'static str = "MOTIONCOR_HOME";
pub const ENV_BIN: &'static str = "MOTIONCOR_BIN";
pub const ENV_CUDA_LIB: &'static str = "MOTIONCOR_CUDA_LIB";
/// generic fallback for the CUDA library, shared with other GPU programs
pub const ENV_CUDA_LIB_FALLBACK: &'static str = "CUDA_LIB";


/// Where to find MotionCor, as configured by the user.
/// Anything left empty is auto-detected.
///
/// Precedence, highest first:
///  1. the `[motioncor]` table of a config file
///  2. MOTIONCOR_HOME, MOTIONCOR_BIN, MOTIONCOR_CUDA_LIB
///  3. CUDA_LIB, for the CUDA library only
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryConfig {

	/// folder holding the MotionCor binaries, directly or in `bin/`
	pub install_home: Option<PathBuf>,

	/// binary to run, used verbatim
	pub explicit_binary: Option<PathBuf>,

	/// folder to add to LD_LIBRARY_PATH
	pub explicit_cuda_lib: Option<PathBuf>
}

impl BinaryConfig {

	pub fn from_env() -> Self {
		Self::from_lookup(|name| env::var(name).ok())
	}

	/// reads the environment through `lookup`, so tests don't have to touch the process environment
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {

		let get = |name: &str| lookup(name)
			.filter(|value| !value.trim().is_empty())
			.map(PathBuf::from);

		Self {
			install_home: get(ENV_HOME),
			explicit_binary: get(ENV_BIN),
			explicit_cuda_lib: get(ENV_CUDA_LIB)
				.or_else(|| get(ENV_CUDA_LIB_FALLBACK))
		}
	}

	/// Reads the `[motioncor]` table:
	/// ```toml
	/// [motioncor]
	/// home = "/opt/motioncor"
	/// bin = "/opt/motioncor/bin/MotionCor2_1.4.0_Cuda101"
	/// cuda_lib = "/usr/local/cuda/lib64"
	/// ```
	/// `bin` is never joined to `home`: a bare name is looked up on the PATH when MotionCor runs.
	pub fn read(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let toml = fs::read_to_string(path)
			.with_context(|| format!("Failed to read config file at: {}", path.to_string_lossy()))?;
		Self::parse(&toml)
			.with_context(|| format!("Failed to parse config file at: {}", path.to_string_lossy()))
	}

	pub fn parse(toml: &str) -> Result<Self> {

		let toml = toml.parse::<Table>()?;

		let Some(section) = toml.get("motioncor")
			else {
				debug!("No [motioncor] section in config file");
				return Ok(Self::default());
			};
		let section = section.as_table()
			.context("motioncor key is not a table")?;

		let get = |key: &str| -> Result<Option<PathBuf>> {
			section.get(key)
				.map(|value| {
					value.as_str()
						.map(PathBuf::from)
						.with_context(|| format!("motioncor.{} was not a string", key))
				})
				.transpose()
		};

		Ok(Self {
			install_home: get("home")?,
			explicit_binary: get("bin")?,
			explicit_cuda_lib: get("cuda_lib")?
		})
	}

	/// fills anything missing here from `fallback`
	pub fn merge(self, fallback: Self) -> Self {
		Self {
			install_home: self.install_home.or(fallback.install_home),
			explicit_binary: self.explicit_binary.or(fallback.explicit_binary),
			explicit_cuda_lib: self.explicit_cuda_lib.or(fallback.explicit_cuda_lib)
		}
	}
}

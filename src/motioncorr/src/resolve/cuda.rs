
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use tracing::debug;


#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CudaVersion {
	pub major: u32,
	pub minor: u32
}

impl CudaVersion {

	pub fn new(major: u32, minor: u32) -> Self {
		Self {
			major,
			minor
		}
	}

	/// Parses the compact tag in MotionCor binary names: `101` is 10.1, `92` is 9.2.
	/// The last digit is always the minor version.
	pub fn from_tag(tag: &str) -> Option<Self> {
		if tag.len() < 2 || !tag.chars().all(|c| c.is_ascii_digit()) {
			return None;
		}
		let (major, minor) = tag.split_at(tag.len() - 1);
		Some(Self {
			major: major.parse().ok()?,
			minor: minor.parse().ok()?
		})
	}
}

impl FromStr for CudaVersion {

	type Err = anyhow::Error;

	/// accepts `11.2` and `11.2.152`
	fn from_str(s: &str) -> Result<Self> {
		let mut parts = s.trim().split('.');
		let major = parts.next()
			.context("Empty CUDA version")?
			.parse::<u32>()
			.with_context(|| format!("Failed to parse CUDA major version: {}", s))?;
		let minor = parts.next()
			.with_context(|| format!("CUDA version has no minor version: {}", s))?
			.parse::<u32>()
			.with_context(|| format!("Failed to parse CUDA minor version: {}", s))?;
		Ok(Self {
			major,
			minor
		})
	}
}

impl fmt::Display for CudaVersion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.major, self.minor)
	}
}


/// Reads the toolkit version from a CUDA installation folder,
/// from `version.json` (CUDA 11.1 and later) or `version.txt` (older releases).
pub fn detect_cuda_version(cuda_home: impl AsRef<Path>) -> Result<CudaVersion> {

	let cuda_home = cuda_home.as_ref();

	let json_path = cuda_home.join("version.json");
	if json_path.exists() {
		let json = fs::read_to_string(&json_path)
			.context(format!("Failed to read {}", json_path.to_string_lossy()))?;
		let json = serde_json::from_str::<serde_json::Value>(&json)
			.context(format!("Failed to parse {}", json_path.to_string_lossy()))?;
		let version = json["cuda"]["version"].as_str()
			.context(format!("No cuda.version in {}", json_path.to_string_lossy()))?;
		debug!("CUDA version from {}: {}", json_path.to_string_lossy(), version);
		return version.parse();
	}

	let txt_path = cuda_home.join("version.txt");
	if txt_path.exists() {
		let txt = fs::read_to_string(&txt_path)
			.context(format!("Failed to read {}", txt_path.to_string_lossy()))?;
		const PREFIX: &str = "CUDA Version ";
		let version = txt.lines()
			.find_map(|line| line.trim().strip_prefix(PREFIX))
			.context(format!("No CUDA version in {}", txt_path.to_string_lossy()))?;
		debug!("CUDA version from {}: {}", txt_path.to_string_lossy(), version);
		return version.parse();
	}

	bail!("No version.json or version.txt in CUDA folder: {}", cuda_home.to_string_lossy())
}


/// The CUDA library folder is usually `<cuda home>/lib64`.
pub fn cuda_home_from_lib(cuda_lib: &Path) -> &Path {
	match cuda_lib.file_name().and_then(|n| n.to_str()) {
		Some("lib64") | Some("lib") => cuda_lib.parent()
			.unwrap_or(cuda_lib),
		_ => cuda_lib
	}
}


#[cfg(test)]
mod test {

	use assert_fs::TempDir;
	use galvanic_assert::{assert_that, matchers::*};

	use super::*;


	#[test]
	fn tags() {
		assert_that!(&CudaVersion::from_tag("101"), eq(Some(CudaVersion::new(10, 1))));
		assert_that!(&CudaVersion::from_tag("112"), eq(Some(CudaVersion::new(11, 2))));
		assert_that!(&CudaVersion::from_tag("92"), eq(Some(CudaVersion::new(9, 2))));
		assert_that!(&CudaVersion::from_tag("8"), eq(None));
		assert_that!(&CudaVersion::from_tag("1x1"), eq(None));
	}


	#[test]
	fn parse() {
		assert_that!(&"11.0".parse::<CudaVersion>().ok(), eq(Some(CudaVersion::new(11, 0))));
		assert_that!(&"12.1.105".parse::<CudaVersion>().ok(), eq(Some(CudaVersion::new(12, 1))));
		assert!("12".parse::<CudaVersion>().is_err());
	}


	#[test]
	fn ordering() {
		assert!(CudaVersion::new(10, 2) < CudaVersion::new(11, 0));
		assert!(CudaVersion::new(11, 2) > CudaVersion::new(11, 0));
	}


	#[test]
	fn detect() {

		let dir = TempDir::new()
			.expect("Failed to make temp folder");

		assert!(detect_cuda_version(dir.path()).is_err());

		fs::write(dir.path().join("version.txt"), "CUDA Version 10.1.243\n")
			.expect("Failed to write version.txt");
		assert_that!(&detect_cuda_version(dir.path()).ok(), eq(Some(CudaVersion::new(10, 1))));

		// the json file wins when both exist
		fs::write(dir.path().join("version.json"), r#"{ "cuda": { "name": "CUDA SDK", "version": "11.2.2" } }"#)
			.expect("Failed to write version.json");
		assert_that!(&detect_cuda_version(dir.path()).ok(), eq(Some(CudaVersion::new(11, 2))));
	}


	#[test]
	fn home_from_lib() {
		assert_that!(&cuda_home_from_lib(Path::new("/usr/local/cuda/lib64")), eq(Path::new("/usr/local/cuda")));
		assert_that!(&cuda_home_from_lib(Path::new("/opt/cuda-11.2")), eq(Path::new("/opt/cuda-11.2")));
	}
}

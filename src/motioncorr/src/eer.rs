
//! EER movie fractionation.
//!
//! EER movies store hundreds of raw frames, which MotionCor groups into fractions
//! as described by a small text file passed with `-FmIntFile`.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::debug;


pub const FM_INT_FILENAME: &'static str = "FmIntFile.txt";


#[derive(Debug, Clone, PartialEq)]
pub struct FmIntFile {
	/// raw EER frames in the movie
	pub frames: u32,
	/// raw frames per fraction
	pub group: u32,
	/// electrons per square angstrom per raw frame, 0 without dose weighting
	pub dose: f64
}

impl FmIntFile {

	pub fn new(frames: u32, group: u32, dose: f64) -> Result<Self> {
		if group == 0 {
			bail!("EER frames must be grouped into fractions of at least one frame");
		}
		if group > frames {
			bail!("Can't group {} EER frames into fractions of {}", frames, group);
		}
		Ok(Self {
			frames,
			group,
			dose
		})
	}

	/// fractions MotionCor will align, leftover frames at the end are dropped
	pub fn fractions(&self) -> u32 {
		self.frames / self.group
	}

	pub fn to_text(&self) -> String {
		format!("{} {} {}", self.frames, self.group, self.dose)
	}

	pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
		let path = path.as_ref();
		fs::write(path, self.to_text())
			.context(format!("Failed to write FmIntFile: {}", path.to_string_lossy()))?;
		debug!("Wrote FmIntFile: {}, {} fractions", path.to_string_lossy(), self.fractions());
		Ok(())
	}
}


pub fn write_fm_int_file(path: impl AsRef<Path>, frames: u32, group: u32, dose: f64) -> Result<FmIntFile> {
	let file = FmIntFile::new(frames, group, dose)?;
	file.write(path)?;
	Ok(file)
}


/// Super-resolution EER sampling already upsamples the frames,
/// so the Fourier binning has to undo it too.
pub fn effective_bin_factor(bin_factor: f64, sampling: u32) -> f64 {
	bin_factor / sampling.max(1) as f64
}


#[cfg(test)]
mod test {

	use assert_fs::TempDir;
	use galvanic_assert::{assert_that, matchers::*};

	use super::*;


	#[test]
	fn text() {
		let file = FmIntFile::new(1200, 40, 0.025)
			.expect("Bad FmIntFile");
		assert_that!(&file.to_text(), eq("1200 40 0.025".to_string()));
		assert_that!(&file.fractions(), eq(30));

		let file = FmIntFile::new(1000, 30, 0.0)
			.expect("Bad FmIntFile");
		assert_that!(&file.to_text(), eq("1000 30 0".to_string()));
		assert_that!(&file.fractions(), eq(33));
	}


	#[test]
	fn bad_groups() {
		assert!(FmIntFile::new(1000, 0, 0.0).is_err());
		assert!(FmIntFile::new(10, 20, 0.0).is_err());
	}


	#[test]
	fn write() {

		let dir = TempDir::new()
			.expect("Failed to make temp folder");
		let path = dir.path().join(FM_INT_FILENAME);

		write_fm_int_file(&path, 600, 20, 0.05)
			.expect("Failed to write FmIntFile");

		let text = fs::read_to_string(&path)
			.expect("Failed to read FmIntFile");
		assert_that!(&text.as_str(), eq("600 20 0.05"));
	}


	#[test]
	fn bin_factor() {
		assert_that!(&effective_bin_factor(2.0, 2), eq(1.0));
		assert_that!(&effective_bin_factor(1.0, 1), eq(1.0));
		assert_that!(&effective_bin_factor(1.0, 0), eq(1.0));
	}
}

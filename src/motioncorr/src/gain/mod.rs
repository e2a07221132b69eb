
//! EER gain references.
//!
//! EER gain files are TIFF containers holding a single-plane gain image.
//! Falcon cameras also embed the sensor defect list as an XML document
//! in a private TIFF tag, which MotionCor can't read directly,
//! so we pull it out into a defects text file and repackage the image as MRC.

pub mod header;
pub mod defects;
pub mod pixels;
pub mod mrc;
pub mod prepare;

#[cfg(test)]
pub(crate) mod test_tiff;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use header::{parse_header, DefectMap, Endian, GainHeader, SampleLayout};
pub use defects::{build_defects, DefectList, DefectRegion};
pub use pixels::{GainImage, Pixels};
pub use mrc::{convert_to_mrc, MrcGain};
pub use prepare::{check_gain_dims, prepare_gain, PreparedGain};


#[derive(Debug, Error)]
pub enum GainError {

	/// the file isn't a gain container we understand
	#[error("Unrecognized gain reference format: {0}")]
	Format(String),

	/// the file ends before a structure it declares
	#[error("Gain reference is truncated: {what} needs {needed} bytes, but the file has only {available}")]
	TruncatedFile {
		what: &'static str,
		needed: u64,
		available: u64
	},

	/// the header declares a defect map, but it points outside the file
	#[error("Defect map at offset {offset} ({len} bytes) lies outside the gain file ({file_len} bytes)")]
	EmptyDefectMap {
		offset: u64,
		len: u64,
		file_len: u64
	},

	#[error("Failed to read gain reference: {}", .path.to_string_lossy())]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error
	}
}

impl GainError {

	pub(crate) fn format(msg: impl Into<String>) -> Self {
		Self::Format(msg.into())
	}

	pub(crate) fn check_len(what: &'static str, needed: u64, available: u64) -> Result<(),Self> {
		if needed > available {
			Err(Self::TruncatedFile {
				what,
				needed,
				available
			})
		} else {
			Ok(())
		}
	}
}

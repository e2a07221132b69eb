
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use super::{build_defects, convert_to_mrc, GainHeader, GainImage};


/// MotionCor's defect file name, in the output folder
pub const DEFECTS_FILENAME: &'static str = "defects_eer.txt";


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedGain {
	pub mrc_path: PathBuf,

	/// None when the camera reported no defects
	pub defects_path: Option<PathBuf>,

	pub num_defects: usize,
	pub width: u32,
	pub height: u32,
	pub flipped_vertically: bool
}


/// Extracts the defects from an EER gain reference and repackages the gain as MRC.
/// The gain file is read once and parsed once.
#[tracing::instrument(skip_all, level = 5, name = "PrepareGain")]
pub fn prepare_gain(gain_path: impl AsRef<Path>, out_dir: impl AsRef<Path>) -> Result<PreparedGain> {

	let gain_path = gain_path.as_ref();
	let out_dir = out_dir.as_ref();

	let bytes = fs::read(gain_path)
		.context(format!("Failed to read gain reference: {}", gain_path.to_string_lossy()))?;
	let header = GainHeader::parse(&bytes)
		.context(format!("Failed to parse gain reference: {}", gain_path.to_string_lossy()))?;
	info!("Gain reference: {}x{}, {:?}", header.width(), header.height(), header.layout());

	fs::create_dir_all(out_dir)
		.context(format!("Failed to create output folder: {}", out_dir.to_string_lossy()))?;

	// defects first: the converted gain no longer carries them
	let defects = build_defects(&header)
		.context("Failed to extract defects from the gain reference")?;
	let defects_path =
		if defects.is_empty() {
			info!("No defects found in the gain reference");
			None
		} else {
			let path = out_dir.join(DEFECTS_FILENAME);
			defects.write(&path)?;
			info!("Wrote {} defect regions to {}", defects.len(), path.to_string_lossy());
			Some(path)
		};

	let image = GainImage::decode(&bytes, &header)
		.context("Failed to decode gain image")?;
	let mrc = convert_to_mrc(&header, &image)
		.context("Failed to convert gain to MRC")?;

	let stem = gain_path.file_stem()
		.map(|s| s.to_string_lossy().to_string())
		.unwrap_or_else(|| "gain".to_string());
	let mrc_path = out_dir.join(format!("{}.mrc", stem));
	mrc.save(&mrc_path)?;
	info!("Wrote MRC gain to {}", mrc_path.to_string_lossy());

	// we can't tell from the pixels whether the camera wrote the gain upside down
	warn!(
		"The MRC gain keeps the orientation stored in {}. EER gains may need a vertical flip (-FlipGain 1) to match the movies, \
		and the defect coordinates follow the gain, not the movies.",
		gain_path.to_string_lossy()
	);

	Ok(PreparedGain {
		mrc_path,
		defects_path,
		num_defects: defects.len(),
		width: header.width(),
		height: header.height(),
		flipped_vertically: mrc.flipped_vertically
	})
}


/// Gain and movie must have the same size, but the gain may be rotated 90 degrees.
pub fn check_gain_dims(gain: (u32, u32), movie: (u32, u32)) -> Result<()> {

	let mut gain_sorted = [gain.0, gain.1];
	gain_sorted.sort();
	let mut movie_sorted = [movie.0, movie.1];
	movie_sorted.sort();

	if gain_sorted != movie_sorted {
		bail!("Gain image dimensions ({} x {}) do not match the movies ({} x {})!", gain.0, gain.1, movie.0, movie.1);
	}

	Ok(())
}

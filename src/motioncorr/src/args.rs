
//! MotionCor command-line arguments.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::eer::effective_bin_factor;
use crate::resolve::{Capability, Flag, ResolveError};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovieFormat {
	Mrc,
	Tiff,
	Eer
}

impl MovieFormat {

	pub fn from_path(path: &Path) -> Result<Self,ResolveError> {
		let ext = path.extension()
			.map(|e| e.to_string_lossy().to_lowercase());
		match ext.as_deref() {
			Some("mrc") | Some("mrcs") => Ok(Self::Mrc),
			Some("tif") | Some("tiff") => Ok(Self::Tiff),
			Some("eer") => Ok(Self::Eer),
			_ => Err(ResolveError::UnsupportedInput {
				path: path.to_path_buf()
			})
		}
	}

	pub fn flag(&self) -> &'static str {
		match self {
			Self::Mrc => "-InMrc",
			Self::Tiff => "-InTiff",
			Self::Eer => "-InEer"
		}
	}
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputMovie {
	pub path: PathBuf,
	pub format: MovieFormat
}

impl InputMovie {

	pub fn new(path: impl Into<PathBuf>) -> Result<Self,ResolveError> {
		let path = path.into();
		let format = MovieFormat::from_path(&path)?;
		Ok(Self {
			path,
			format
		})
	}
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Patches {
	pub x: u32,
	pub y: u32,
	/// percent of the patch size, 0 for none
	pub overlap: u32
}


#[derive(Debug, Clone, PartialEq)]
pub struct EerArgs {
	/// 1 for 4k, 2 for 8k, 3 for 16k super-resolution
	pub sampling: u32,
	pub fm_int_file: Option<PathBuf>
}

impl Default for EerArgs {
	fn default() -> Self {
		Self {
			sampling: 1,
			fm_int_file: None
		}
	}
}


#[derive(Debug, Clone, PartialEq, Default)]
pub struct DoseArgs {
	/// electrons per square angstrom before the first frame
	pub initial: f64,
	/// electrons per square angstrom per frame, dose weighting is off when None
	pub per_frame: Option<f64>
}

impl DoseArgs {

	pub fn weighting(&self) -> bool {
		self.per_frame.is_some()
	}
}


#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DefectArgs {
	pub file: Option<PathBuf>,
	pub map: Option<PathBuf>
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GainArgs {
	pub path: PathBuf,
	/// 0 none, 1 90 degrees, 2 180 degrees, 3 270 degrees
	pub rotation: u32,
	/// 0 none, 1 upside down, 2 left right
	pub flip: u32
}


#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagArgs {
	pub major: f64,
	pub minor: f64,
	pub angle: f64
}


/// Everything MotionCor needs to know about one alignment job.
/// Paths are passed through as-is, so relative paths are relative to wherever MotionCor runs.
#[derive(Debug, Clone, PartialEq)]
pub struct McArgs {
	pub input: Option<InputMovie>,
	pub output: Option<PathBuf>,
	/// frames to skip at the start
	pub throw: u32,
	/// frames to skip at the end
	pub trunc: u32,
	pub patches: Patches,
	pub crop_offset: (i32, i32),
	/// 0 means the full frame
	pub crop_size: (u32, u32),
	pub bin_factor: f64,
	pub tolerance: f64,
	pub pixel_size: Option<f64>,
	pub voltage: Option<f64>,
	pub cs: f64,
	pub save_movie: bool,
	pub gpus: Vec<u32>,
	pub log_dir: PathBuf,
	pub eer: EerArgs,
	pub dose: DoseArgs,
	pub group: (u32, u32),
	pub split_sum: bool,
	pub defects: DefectArgs,
	pub gain: Option<GainArgs>,
	pub dark: Option<PathBuf>,
	pub mag: Option<MagArgs>,
	pub extra: Vec<String>
}

impl Default for McArgs {
	fn default() -> Self {
		Self {
			input: None,
			output: None,
			throw: 0,
			trunc: 0,
			patches: Patches::default(),
			crop_offset: (0, 0),
			crop_size: (0, 0),
			bin_factor: 1.0,
			tolerance: 0.2,
			pixel_size: None,
			voltage: None,
			cs: 0.0,
			save_movie: false,
			gpus: vec![0],
			log_dir: PathBuf::from("./"),
			eer: EerArgs::default(),
			dose: DoseArgs::default(),
			group: (1, 4),
			split_sum: false,
			defects: DefectArgs::default(),
			gain: None,
			dark: None,
			mag: None,
			extra: Vec::new()
		}
	}
}

impl McArgs {

	fn is_eer(&self) -> bool {
		matches!(self.input, Some(InputMovie { format: MovieFormat::Eer, .. }))
	}

	/// pixel size of the aligned sum, in angstroms
	pub fn output_pixel_size(&self) -> Option<f64> {
		let bin_factor =
			if self.is_eer() {
				effective_bin_factor(self.bin_factor, self.eer.sampling)
			} else {
				self.bin_factor
			};
		self.pixel_size
			.map(|size| size*bin_factor)
	}

	/// the optional features these arguments use
	pub fn required_capabilities(&self) -> BTreeSet<Capability> {

		let mut out = BTreeSet::<Capability>::new();

		if self.dose.weighting() {
			out.insert(Capability::DoseWeighting);
		}
		if self.split_sum {
			out.insert(Capability::OddEvenSplit);
		}
		if self.save_movie {
			out.insert(Capability::PerFrameOutput);
		}
		if self.defects.file.is_some() {
			out.insert(Capability::DefectFile);
		} else if self.defects.map.is_some() {
			out.insert(Capability::DefectMap);
		}
		if self.is_eer() {
			out.insert(Capability::EerInput);
		}
		if self.mag.is_some() {
			out.insert(Capability::MagCorrection);
		}
		if self.patches.overlap > 0 {
			out.insert(Capability::PatchOverlap);
		}

		out
	}

	/// Renders the flags in the order MotionCor's usage lists them.
	pub fn flags(&self) -> Vec<Flag> {

		let mut flags = Vec::<Flag>::new();
		let eer = self.is_eer();

		if let Some(input) = &self.input {
			flags.push(Flag::new(input.format.flag(), [arg(&input.path)]));
		}
		if let Some(output) = &self.output {
			flags.push(Flag::new("-OutMrc", [arg(output)]));
		}

		// EER frames are fractionated by the FmIntFile instead
		let (throw, trunc) =
			if eer {
				(0, 0)
			} else {
				(self.throw, self.trunc)
			};
		flags.push(Flag::new("-Throw", [throw]));
		flags.push(Flag::new("-Trunc", [trunc]));

		// MotionCor treats a single patch as no patches
		let no_single = |n: u32| if n == 1 { 0 } else { n };
		let mut patch = vec![no_single(self.patches.x), no_single(self.patches.y)];
		if self.patches.overlap > 0 {
			patch.push(self.patches.overlap);
		}
		flags.push(Flag::new("-Patch", patch));

		flags.push(Flag::new("-MaskCent", [self.crop_offset.0, self.crop_offset.1]));
		let no_zero = |n: u32| n.max(1);
		flags.push(Flag::new("-MaskSize", [no_zero(self.crop_size.0), no_zero(self.crop_size.1)]));

		flags.push(Flag::new("-FtBin", [self.bin_factor]));
		flags.push(Flag::new("-Tol", [self.tolerance]));
		if let Some(pixel_size) = self.pixel_size {
			flags.push(Flag::new("-PixSize", [pixel_size]));
		}
		if let Some(voltage) = self.voltage {
			flags.push(Flag::new("-kV", [voltage]));
		}
		flags.push(Flag::new("-Cs", [self.cs]));
		if self.save_movie {
			flags.push(Flag::new("-OutStack", [1]));
		}
		flags.push(Flag::new("-Gpu", &self.gpus));
		// no dose-weighted sums for dose ranges
		flags.push(Flag::new("-SumRange", ["0.0", "0.0"]));
		flags.push(Flag::new("-LogDir", [arg(&self.log_dir)]));

		if eer {
			flags.push(Flag::new("-EerSampling", [self.eer.sampling]));
			if let Some(fm_int_file) = &self.eer.fm_int_file {
				flags.push(Flag::new("-FmIntFile", [arg(fm_int_file)]));
			}
		}

		if let Some(per_frame) = self.dose.per_frame {
			flags.push(Flag::new("-InitDose", [self.dose.initial]));
			// EER dose per frame goes in the FmIntFile
			if !eer {
				flags.push(Flag::new("-FmDose", [per_frame]));
			}
		}

		flags.push(Flag::new("-Group", [self.group.0, self.group.1]));

		if self.split_sum {
			flags.push(Flag::new("-SplitSum", [1]));
		}

		if let Some(file) = &self.defects.file {
			flags.push(Flag::new("-DefectFile", [arg(file)]));
		} else if let Some(map) = &self.defects.map {
			flags.push(Flag::new("-DefectMap", [arg(map)]));
		}

		if let Some(gain) = &self.gain {
			flags.push(Flag::new("-Gain", [arg(&gain.path)]));
			flags.push(Flag::new("-RotGain", [gain.rotation]));
			flags.push(Flag::new("-FlipGain", [gain.flip]));
		}

		if let Some(dark) = &self.dark {
			flags.push(Flag::new("-Dark", [arg(dark)]));
		}

		if let Some(mag) = &self.mag {
			flags.push(Flag::new("-Mag", [mag.major, mag.minor, mag.angle]));
		}

		flags
	}
}


fn arg(path: &Path) -> String {
	path.to_string_lossy().to_string()
}

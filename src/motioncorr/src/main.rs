
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use gumdrop::Options;
use tracing::info;

use motioncorr::args::{DefectArgs, DoseArgs, EerArgs, GainArgs, InputMovie, McArgs, MovieFormat, Patches};
use motioncorr::eer::{write_fm_int_file, FM_INT_FILENAME};
use motioncorr::gain::prepare_gain;
use motioncorr::logging::{self, ResultExt};
use motioncorr::resolve::{cuda_home_from_lib, detect_cuda_version, parse_version, BinaryConfig, BinaryVersionSpec, CapabilityTable, CudaVersion, Program, Resolver};
use motioncorr::shifts::read_shifts;


const DEFAULT_CUDA_HOME: &'static str = "/usr/local/cuda";


#[derive(Debug, Options)]
struct Args {

	/// print help message
	#[options()]
	help: bool,

	/// print version
	#[options()]
	version: bool,

	/// settings for log output
	#[options(default = "motioncorr=info")]
	log: String,

	#[options(command)]
	cmd: Option<Command>
}


#[derive(Debug, Options)]
enum Command {
	/// extract defects from an EER gain reference and convert it to MRC
	PrepareGain(ArgsPrepareGain),
	/// find the MotionCor binary and print its command line
	Resolve(ArgsResolve),
	/// print the global frame shifts from a MotionCor2 log
	Shifts(ArgsShifts),
	/// write the EER fractionation file for -FmIntFile
	FmIntFile(ArgsFmIntFile)
}


#[derive(Debug, Options)]
struct ArgsPrepareGain {

	/// print help message
	#[options()]
	help: bool,

	/// the EER gain reference
	#[options(free, required, parse(try_from_str))]
	gain: PathBuf,

	/// folder to write the defects and MRC gain
	#[options(free, required, parse(try_from_str))]
	out_dir: PathBuf
}


#[derive(Debug, Options)]
struct ArgsResolve {

	/// print help message
	#[options()]
	help: bool,

	/// MotionCor2 or MotionCor3
	#[options(no_short, required)]
	program: String,

	/// release version, eg 1.4.0
	#[options(no_short, required)]
	version: String,

	/// local CUDA version, eg 11.2, detected when missing
	#[options(no_short)]
	cuda: Option<String>,

	/// folder to look for binaries, when no install home is configured
	#[options(no_short, meta = "DIR", parse(try_from_str))]
	search: Vec<PathBuf>,

	/// TOML file with a [motioncor] table
	#[options(no_short, parse(try_from_str))]
	config: Option<PathBuf>,

	/// TOML file replacing the built-in capability table
	#[options(no_short, parse(try_from_str))]
	capabilities: Option<PathBuf>,

	/// input movie (.mrc, .tif, .eer)
	#[options(no_short, parse(try_from_str))]
	input: Option<PathBuf>,

	/// output micrograph
	#[options(no_short, parse(try_from_str))]
	output: Option<PathBuf>,

	/// patches in x
	#[options(no_short)]
	patch_x: u32,

	/// patches in y
	#[options(no_short)]
	patch_y: u32,

	/// patch overlap, in percent
	#[options(no_short)]
	patch_overlap: u32,

	/// Fourier binning factor
	#[options(no_short, default = "1")]
	bin: f64,

	/// pixel size in angstroms
	#[options(no_short)]
	pixel_size: Option<f64>,

	/// acceleration voltage in kV
	#[options(no_short)]
	kv: Option<f64>,

	/// GPU to use, repeat for several
	#[options(no_short)]
	gpu: Vec<u32>,

	/// write the aligned movie
	#[options(no_short)]
	save_movie: bool,

	/// apply dose weighting
	#[options(no_short)]
	dose_weighting: bool,

	/// dose per frame, in e/A^2
	#[options(no_short)]
	fm_dose: Option<f64>,

	/// dose before the first frame, in e/A^2
	#[options(no_short)]
	init_dose: f64,

	/// also write sums of the odd and even frames
	#[options(no_short)]
	split_sum: bool,

	/// EER super-resolution: 1, 2, or 3
	#[options(no_short, default = "1")]
	eer_sampling: u32,

	/// EER fractionation file
	#[options(no_short, parse(try_from_str))]
	fm_int_file: Option<PathBuf>,

	/// defects text file
	#[options(no_short, parse(try_from_str))]
	defect_file: Option<PathBuf>,

	/// defects image
	#[options(no_short, parse(try_from_str))]
	defect_map: Option<PathBuf>,

	/// gain reference
	#[options(no_short, parse(try_from_str))]
	gain: Option<PathBuf>,

	/// gain rotation: 0, 1 (90), 2 (180), 3 (270)
	#[options(no_short)]
	rot_gain: u32,

	/// gain flip: 0, 1 (upside down), 2 (left right)
	#[options(no_short)]
	flip_gain: u32,

	/// extra arguments, passed to MotionCor as-is
	#[options(free)]
	extra: Vec<String>
}


#[derive(Debug, Options)]
struct ArgsShifts {

	/// print help message
	#[options()]
	help: bool,

	/// the MotionCor2 full-frame alignment log
	#[options(free, required, parse(try_from_str))]
	log: PathBuf
}


#[derive(Debug, Options)]
struct ArgsFmIntFile {

	/// print help message
	#[options()]
	help: bool,

	/// raw frames in the EER movies
	#[options(no_short, required)]
	frames: u32,

	/// raw frames per fraction
	#[options(no_short, required)]
	group: u32,

	/// dose per raw frame, in e/A^2, 0 without dose weighting
	#[options(no_short)]
	dose: f64,

	/// file to write, or a folder to write FmIntFile.txt into
	#[options(free, required, parse(try_from_str))]
	path: PathBuf
}


fn main() -> ExitCode {

	let args = Args::parse_args_default_or_exit();

	if args.version {
		println!("motioncorr version {}", env!("CARGO_PKG_VERSION"));
		return ExitCode::SUCCESS;
	}

	let Ok(_) = logging::init(&args.log)
		.log_err()
		else { return ExitCode::FAILURE; };

	// handle the commands
	let result = match args.cmd {
		Some(Command::PrepareGain(args)) => run_prepare_gain(args),
		Some(Command::Resolve(args)) => run_resolve(args),
		Some(Command::Shifts(args)) => run_shifts(args),
		Some(Command::FmIntFile(args)) => run_fm_int_file(args),
		None => {
			println!("No command given");
			return ExitCode::FAILURE;
		}
	};

	match result.log_err() {
		Ok(()) => ExitCode::SUCCESS,
		Err(()) => ExitCode::FAILURE
	}
}


fn run_prepare_gain(args: ArgsPrepareGain) -> Result<()> {

	let prepared = prepare_gain(&args.gain, &args.out_dir)?;

	println!("gain: {}", prepared.mrc_path.to_string_lossy());
	match &prepared.defects_path {
		Some(path) => println!("defects: {} ({} regions)", path.to_string_lossy(), prepared.num_defects),
		None => println!("defects: none")
	}
	println!("size: {} x {}", prepared.width, prepared.height);

	Ok(())
}


#[tracing::instrument(skip_all, level = 5, name = "Resolve")]
fn run_resolve(args: ArgsResolve) -> Result<()> {

	let program = args.program.parse::<Program>()?;
	let version = parse_version(&args.version)?;

	// config file values win over the environment
	let config = match &args.config {
		Some(path) => BinaryConfig::read(path)?,
		None => BinaryConfig::default()
	}.merge(BinaryConfig::from_env());

	let cuda = match &args.cuda {
		Some(cuda) => cuda.parse::<CudaVersion>()?,
		None => {
			let cuda_home = config.explicit_cuda_lib.as_deref()
				.map(cuda_home_from_lib)
				.unwrap_or(Path::new(DEFAULT_CUDA_HOME));
			let detected = detect_cuda_version(cuda_home)
				.context("Failed to detect the CUDA version, try --cuda");
			if config.explicit_binary.is_some() {
				// the CUDA version only picks the binary
				detected
					.warn_err()
					.unwrap_or(CudaVersion::new(0, 0))
			} else {
				detected?
			}
		}
	};
	info!("CUDA version: {}", cuda);

	let table = match &args.capabilities {
		Some(path) => {
			let toml = fs::read_to_string(path)
				.context(format!("Failed to read capability table: {}", path.to_string_lossy()))?;
			Some(CapabilityTable::from_toml(&toml)?)
		}
		None => None
	};
	let resolver = Resolver::new(table.as_ref().unwrap_or(CapabilityTable::builtin()));

	let input = args.input
		.map(|path| InputMovie::new(path))
		.transpose()?;
	let eer = matches!(input, Some(InputMovie { format: MovieFormat::Eer, .. }));

	// EER movies get their dose from the fractionation file instead
	if args.dose_weighting {
		if eer && args.fm_int_file.is_none() {
			bail!("Dose weighting EER movies needs --fm-int-file");
		} else if !eer && args.fm_dose.is_none() {
			bail!("Dose weighting needs --fm-dose");
		}
	}

	let mc_args = McArgs {
		input,
		output: args.output,
		patches: Patches {
			x: args.patch_x,
			y: args.patch_y,
			overlap: args.patch_overlap
		},
		bin_factor: args.bin,
		pixel_size: args.pixel_size,
		voltage: args.kv,
		gpus: if args.gpu.is_empty() { vec![0] } else { args.gpu },
		save_movie: args.save_movie,
		eer: EerArgs {
			sampling: args.eer_sampling,
			fm_int_file: args.fm_int_file
		},
		dose: DoseArgs {
			initial: args.init_dose,
			per_frame:
				if args.dose_weighting || args.fm_dose.is_some() {
					Some(args.fm_dose.unwrap_or(0.0))
				} else {
					None
				}
		},
		split_sum: args.split_sum,
		defects: DefectArgs {
			file: args.defect_file,
			map: args.defect_map
		},
		gain: args.gain.map(|path| GainArgs {
			path,
			rotation: args.rot_gain,
			flip: args.flip_gain
		}),
		extra: args.extra,
		..McArgs::default()
	};

	let spec = BinaryVersionSpec {
		program,
		version,
		cuda,
		config
	};
	let resolved = resolver.resolve(&spec, &args.search, &mc_args)?;

	if let Some(size) = mc_args.output_pixel_size() {
		info!("Output pixel size: {} A", size);
	}

	if let Some(cuda_lib) = &resolved.cuda_lib {
		println!("LD_LIBRARY_PATH={}", cuda_lib.to_string_lossy());
	}
	println!("{}", resolved);

	Ok(())
}


fn run_shifts(args: ArgsShifts) -> Result<()> {

	let shifts = read_shifts(&args.log)?;

	for (i, (x, y)) in shifts.x.iter().zip(shifts.y.iter()).enumerate() {
		println!("{} {} {}", i + 1, x, y);
	}

	Ok(())
}


fn run_fm_int_file(args: ArgsFmIntFile) -> Result<()> {

	let path =
		if args.path.is_dir() {
			args.path.join(FM_INT_FILENAME)
		} else {
			args.path
		};

	let file = write_fm_int_file(&path, args.frames, args.group, args.dose)?;
	println!("{}: {} fractions", path.to_string_lossy(), file.fractions());

	Ok(())
}

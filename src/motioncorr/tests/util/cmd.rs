
use assert_cmd::assert::Assert;
use assert_cmd::Command;


const BIN_NAME: &'static str = "motioncorr";

const ENV_VARS: [&'static str; 5] = [
	"MOTIONCOR_HOME",
	"MOTIONCOR_BIN",
	"MOTIONCOR_CUDA_LIB",
	"CUDA_LIB",
	"MOTIONCORR_LOG"
];


/// the CLI, isolated from any MotionCor configuration in the test environment
pub fn cmd() -> Command {
	let mut cmd = Command::cargo_bin(BIN_NAME)
		.unwrap();
	for var in ENV_VARS {
		cmd.env_remove(var);
	}
	cmd
}


pub trait AssertExt {
	fn print_stdout(self) -> Self;
	fn print_stderr(self) -> Self;
}

impl AssertExt for Assert {

	fn print_stdout(self) -> Self {
		println!("STDOUT:\n{}", String::from_utf8_lossy(&self.get_output().stdout));
		self
	}

	fn print_stderr(self) -> Self {
		println!("STDERR:\n{}", String::from_utf8_lossy(&self.get_output().stderr));
		self
	}
}

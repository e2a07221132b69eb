
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use semver::Version;
use toml::Table;

use super::{parse_version, Program};
use Capability::*;


/// Optional MotionCor features that not every release has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
	/// -FmDose, -InitDose
	DoseWeighting,
	/// -SplitSum
	OddEvenSplit,
	/// -OutStack
	PerFrameOutput,
	/// -DefectFile
	DefectFile,
	/// -DefectMap
	DefectMap,
	/// -InEer, -EerSampling, -FmIntFile
	EerInput,
	/// -Mag
	MagCorrection,
	/// the third -Patch value
	PatchOverlap
}

impl Capability {

	pub const ALL: [Capability; 8] = [
		Self::DoseWeighting,
		Self::OddEvenSplit,
		Self::PerFrameOutput,
		Self::DefectFile,
		Self::DefectMap,
		Self::EerInput,
		Self::MagCorrection,
		Self::PatchOverlap
	];

	/// the name used in capability table files
	pub fn id(&self) -> &'static str {
		match self {
			Self::DoseWeighting => "dose-weighting",
			Self::OddEvenSplit => "odd-even-split",
			Self::PerFrameOutput => "per-frame-output",
			Self::DefectFile => "defect-file",
			Self::DefectMap => "defect-map",
			Self::EerInput => "eer-input",
			Self::MagCorrection => "mag-correction",
			Self::PatchOverlap => "patch-overlap"
		}
	}

	pub fn from_id(id: &str) -> Option<Self> {
		Self::ALL.iter()
			.find(|c| c.id() == id)
			.copied()
	}
}

impl fmt::Display for Capability {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::DoseWeighting => "dose weighting (-FmDose, -InitDose)",
			Self::OddEvenSplit => "odd/even frame sums (-SplitSum)",
			Self::PerFrameOutput => "aligned movie output (-OutStack)",
			Self::DefectFile => "defect file (-DefectFile)",
			Self::DefectMap => "defect map (-DefectMap)",
			Self::EerInput => "EER input (-InEer, -EerSampling, -FmIntFile)",
			Self::MagCorrection => "magnification correction (-Mag)",
			Self::PatchOverlap => "patch overlap (-Patch x y overlap)"
		};
		f.write_str(name)
	}
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
	pub program: Program,
	pub version: Version,
	pub capabilities: BTreeSet<Capability>
}


/// Which capabilities each MotionCor release supports.
/// Versions between listed releases get the capabilities of the newest listed release before them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityTable {
	releases: Vec<Release>
}

const BUILTIN: &[(Program, (u64, u64, u64), &[Capability])] = &[
	(Program::MotionCor2, (1, 0, 0), &[PerFrameOutput, DefectFile]),
	(Program::MotionCor2, (1, 0, 2), &[PerFrameOutput, DefectFile, DoseWeighting]),
	(Program::MotionCor2, (1, 1, 0), &[PerFrameOutput, DefectFile, DoseWeighting, MagCorrection]),
	(Program::MotionCor2, (1, 2, 0), &[PerFrameOutput, DefectFile, DoseWeighting, MagCorrection, DefectMap]),
	(Program::MotionCor2, (1, 3, 0), &[PerFrameOutput, DefectFile, DoseWeighting, MagCorrection, DefectMap, OddEvenSplit, PatchOverlap]),
	(Program::MotionCor2, (1, 4, 0), &[PerFrameOutput, DefectFile, DoseWeighting, MagCorrection, DefectMap, OddEvenSplit, PatchOverlap, EerInput]),
	(Program::MotionCor3, (1, 0, 0), &Capability::ALL)
];


impl CapabilityTable {

	pub fn new(mut releases: Vec<Release>) -> Self {
		releases.sort_by(|a, b| (a.program, &a.version).cmp(&(b.program, &b.version)));
		Self {
			releases
		}
	}

	/// the table for the MotionCor releases we know about, built once per process
	pub fn builtin() -> &'static Self {
		static TABLE: OnceLock<CapabilityTable> = OnceLock::new();
		TABLE.get_or_init(|| {
			let releases = BUILTIN.iter()
				.map(|(program, (major, minor, patch), capabilities)| Release {
					program: *program,
					version: Version::new(*major, *minor, *patch),
					capabilities: capabilities.iter().copied().collect()
				})
				.collect();
			Self::new(releases)
		})
	}

	/// Reads a table like:
	/// ```toml
	/// [[release]]
	/// program = "MotionCor2"
	/// version = "1.4.0"
	/// capabilities = ["dose-weighting", "eer-input"]
	/// ```
	pub fn from_toml(toml: &str) -> Result<Self> {

		let toml = toml.parse::<Table>()
			.context("Failed to parse capability table")?;

		let entries = toml.get("release")
			.context("Missing [[release]] entries")?
			.as_array()
			.context("release is not an array of tables")?;

		let mut releases = Vec::<Release>::with_capacity(entries.len());
		for (i, entry) in entries.iter().enumerate() {

			let entry = entry.as_table()
				.with_context(|| format!("release[{}] is not a table", i))?;

			let program = entry.get("program")
				.with_context(|| format!("Missing release[{}].program", i))?
				.as_str()
				.with_context(|| format!("release[{}].program was not a string", i))?
				.parse::<Program>()?;

			let version_str = entry.get("version")
				.with_context(|| format!("Missing release[{}].version", i))?
				.as_str()
				.with_context(|| format!("release[{}].version was not a string", i))?;
			let version = parse_version(version_str)?;

			let mut capabilities = BTreeSet::<Capability>::new();
			let ids = entry.get("capabilities")
				.with_context(|| format!("Missing release[{}].capabilities", i))?
				.as_array()
				.with_context(|| format!("release[{}].capabilities was not an array", i))?;
			for id in ids {
				let id = id.as_str()
					.with_context(|| format!("release[{}].capabilities has a non-string value", i))?;
				let Some(capability) = Capability::from_id(id)
					else { bail!("Unknown capability in release[{}]: {}", i, id) };
				capabilities.insert(capability);
			}

			releases.push(Release {
				program,
				version,
				capabilities
			});
		}

		Ok(Self::new(releases))
	}

	pub fn releases(&self) -> &[Release] {
		&self.releases
	}

	/// None if the version is older than every listed release of the program
	pub fn capabilities(&self, program: Program, version: &Version) -> Option<&BTreeSet<Capability>> {
		self.releases.iter()
			.filter(|r| r.program == program && &r.version <= version)
			.last()
			.map(|r| &r.capabilities)
	}
}


#[cfg(test)]
mod test {

	use galvanic_assert::{assert_that, matchers::*};
	use indoc::indoc;

	use super::*;


	#[test]
	fn builtin() {

		let table = CapabilityTable::builtin();

		let caps = table.capabilities(Program::MotionCor2, &Version::new(1, 0, 0))
			.expect("1.0.0 should be listed");
		assert_that!(&caps.contains(&DoseWeighting), eq(false));

		// unlisted versions inherit from the release before them
		let caps = table.capabilities(Program::MotionCor2, &Version::new(1, 3, 5))
			.expect("1.3.5 should resolve");
		assert_that!(&caps.contains(&OddEvenSplit), eq(true));
		assert_that!(&caps.contains(&EerInput), eq(false));

		let caps = table.capabilities(Program::MotionCor2, &Version::new(1, 6, 4))
			.expect("1.6.4 should resolve");
		assert_that!(&caps.contains(&EerInput), eq(true));

		assert_that!(&table.capabilities(Program::MotionCor2, &Version::new(0, 9, 0)), eq(None));
		assert_that!(&table.capabilities(Program::MotionCor3, &Version::new(1, 0, 1)).map(|c| c.len()), eq(Some(Capability::ALL.len())));
	}


	#[test]
	fn ids() {
		for capability in Capability::ALL {
			assert_that!(&Capability::from_id(capability.id()), eq(Some(capability)));
		}
		assert_that!(&Capability::from_id("time-travel"), eq(None));
	}


	#[test]
	fn from_toml() {

		let table = CapabilityTable::from_toml(indoc! { r#"
			[[release]]
			program = "MotionCor2"
			version = "1.5.0"
			capabilities = ["dose-weighting", "eer-input"]

			[[release]]
			program = "MotionCor2"
			version = "1.2"
			capabilities = []
		"# }).expect("Failed to read table");

		assert_that!(&table.releases().len(), eq(2));
		assert_that!(&table.releases()[0].version, eq(Version::new(1, 2, 0)));

		let caps = table.capabilities(Program::MotionCor2, &Version::new(1, 6, 0))
			.expect("1.6.0 should resolve");
		assert_that!(caps, eq(BTreeSet::from([DoseWeighting, EerInput])));
	}


	#[test]
	fn from_toml_unknown() {
		let result = CapabilityTable::from_toml(indoc! { r#"
			[[release]]
			program = "MotionCor2"
			version = "1.0.0"
			capabilities = ["warp-drive"]
		"# });
		assert!(result.is_err());
	}
}

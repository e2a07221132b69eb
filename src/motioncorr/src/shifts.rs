
//! Global frame shifts from MotionCor2's full-frame alignment log.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};


/// Shifts in pixels of the input movie, one per aligned frame, irrespective of binning.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Shifts {
	pub x: Vec<f64>,
	pub y: Vec<f64>
}

impl Shifts {

	pub fn len(&self) -> usize {
		self.x.len()
	}

	pub fn is_empty(&self) -> bool {
		self.x.is_empty()
	}
}


/// Reads lines like `   1    0.00    0.00`.
/// Comment lines (anything with a `#`) and blank lines are skipped.
pub fn parse_shifts(text: &str) -> Result<Shifts> {

	let mut shifts = Shifts::default();

	for (i, line) in text.lines().enumerate() {

		let line = line.trim();
		if line.is_empty() || line.contains('#') {
			continue;
		}

		let mut parts = line.split_whitespace();
		let _frame = parts.next()
			.context(format!("Missing frame number on line {}", i + 1))?
			.parse::<i64>()
			.context(format!("Failed to parse frame number on line {}: {}", i + 1, line))?;
		let mut shift = || -> Result<f64> {
			parts.next()
				.context(format!("Missing shift on line {}: {}", i + 1, line))?
				.parse::<f64>()
				.context(format!("Failed to parse shift on line {}: {}", i + 1, line))
		};
		let x = shift()?;
		let y = shift()?;

		shifts.x.push(x);
		shifts.y.push(y);
	}

	Ok(shifts)
}


pub fn read_shifts(path: impl AsRef<Path>) -> Result<Shifts> {
	let path = path.as_ref();
	let text = fs::read_to_string(path)
		.context(format!("Failed to read alignment log: {}", path.to_string_lossy()))?;
	parse_shifts(&text)
		.context(format!("Failed to parse alignment log: {}", path.to_string_lossy()))
}


#[cfg(test)]
mod test {

	use galvanic_assert::{assert_that, matchers::*};
	use indoc::indoc;

	use super::*;


	#[test]
	fn log() {

		let shifts = parse_shifts(indoc! { "
			# full-frame alignment
			# Pixel size (A): 0.83
			# Frame     x Shift     y Shift

			    1        0.00        0.00
			    2       -1.25        0.50
			    3       -2.75        1.00
		" }).expect("Failed to parse log");

		assert_that!(&shifts, eq(Shifts {
			x: vec![0.0, -1.25, -2.75],
			y: vec![0.0, 0.5, 1.0]
		}));
	}


	#[test]
	fn empty() {
		let shifts = parse_shifts("# nothing aligned\n\n")
			.expect("Failed to parse log");
		assert_that!(&shifts.is_empty(), eq(true));
	}


	#[test]
	fn malformed() {
		assert!(parse_shifts("1 0.0\n").is_err());
		assert!(parse_shifts("1 zero 0.0\n").is_err());
		assert!(parse_shifts("first 0.0 0.0\n").is_err());
	}
}

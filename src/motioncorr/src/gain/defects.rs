
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::{debug, warn};

use super::{DefectMap, GainError, GainHeader};


/// A rectangle of bad sensor pixels, 0-indexed, in the gain's own orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefectRegion {
	pub x: u32,
	pub y: u32,
	pub width: u32,
	pub height: u32
}

impl DefectRegion {

	pub fn pixel(x: u32, y: u32) -> Self {
		Self {
			x,
			y,
			width: 1,
			height: 1
		}
	}

	/// clips the region to the sensor, or None if nothing of it is left
	fn clip(self, sensor_width: u32, sensor_height: u32) -> Option<Self> {
		if self.x >= sensor_width || self.y >= sensor_height || self.width == 0 || self.height == 0 {
			return None;
		}
		Some(Self {
			width: self.width.min(sensor_width - self.x),
			height: self.height.min(sensor_height - self.y),
			..self
		})
	}
}

impl fmt::Display for DefectRegion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {} {} {}", self.x, self.y, self.width, self.height)
	}
}


#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DefectList {
	regions: Vec<DefectRegion>
}

impl DefectList {

	pub fn regions(&self) -> &[DefectRegion] {
		&self.regions
	}

	pub fn len(&self) -> usize {
		self.regions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.regions.is_empty()
	}

	/// renders the MotionCor defect file: one `x y width height` line per region
	pub fn to_text(&self) -> String {
		let mut out = String::new();
		for region in &self.regions {
			out.push_str(&region.to_string());
			out.push('\n');
		}
		out
	}

	pub fn write(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
		let path = path.as_ref();
		fs::write(path, self.to_text())
			.with_context(|| format!("Failed to write defects file: {}", path.to_string_lossy()))
	}
}


pub fn build_defects(header: &GainHeader) -> Result<DefectList,GainError> {

	let text = match header.defect_map() {
		DefectMap::Absent => {
			debug!("Gain has no defect map");
			return Ok(DefectList::default());
		}
		DefectMap::Dangling { offset, len, file_len } => return Err(GainError::EmptyDefectMap {
			offset: *offset,
			len: *len,
			file_len: *file_len
		}),
		DefectMap::Embedded { text, .. } => text
	};

	let width = header.width();
	let height = header.height();

	let doc = roxmltree::Document::parse(text)
		.map_err(|e| GainError::format(format!("Malformed defects XML: {}", e)))?;

	// single pixels get merged into runs, so collect them in row-major order first
	let mut points = BTreeSet::<(u32, u32)>::new();
	let mut others = Vec::<DefectRegion>::new();
	let mut num_elements = 0;
	let mut num_unknown = 0;

	for node in doc.root_element().children().filter(|n| n.is_element()) {

		num_elements += 1;
		let name = node.tag_name().name().to_lowercase();
		let value = node.text()
			.unwrap_or("")
			.trim();

		match name.as_str() {

			"point" => {
				let [x, y] = numbers::<2>(&name, value)?;
				if x < width && y < height {
					points.insert((y, x));
				} else {
					warn!("Dropping defect point {},{} outside the {}x{} sensor", x, y, width, height);
				}
			}

			"col" => {
				let (x1, x2) = range(&name, value)?;
				others.push(DefectRegion {
					x: x1,
					y: 0,
					width: (x2 - x1).saturating_add(1),
					height
				});
			}

			"row" => {
				let (y1, y2) = range(&name, value)?;
				others.push(DefectRegion {
					x: 0,
					y: y1,
					width,
					height: (y2 - y1).saturating_add(1)
				});
			}

			"area" => {
				let [x1, y1, x2, y2] = numbers::<4>(&name, value)?;
				if x2 < x1 || y2 < y1 {
					return Err(GainError::format(format!("Defect area has inverted corners: {}", value)));
				}
				others.push(DefectRegion {
					x: x1,
					y: y1,
					width: (x2 - x1).saturating_add(1),
					height: (y2 - y1).saturating_add(1)
				});
			}

			_ => {
				num_unknown += 1;
				warn!("Skipping unknown defect element <{}>", node.tag_name().name());
			}
		}
	}

	// elements we can't read are not the same thing as no defects
	if num_elements > 0 && num_unknown == num_elements {
		return Err(GainError::format(format!(
			"None of the {} elements in the defects XML is a point, col, row, or area",
			num_elements
		)));
	}

	let mut regions = merge_runs(&points);
	for region in others {
		match region.clip(width, height) {
			Some(region) => regions.push(region),
			None => warn!("Dropping defect region {} outside the {}x{} sensor", region, width, height)
		}
	}

	debug!("Found {} defect regions ({} single pixels)", regions.len(), points.len());

	Ok(DefectList {
		regions
	})
}


fn numbers<const N: usize>(element: &str, value: &str) -> Result<[u32; N],GainError> {

	let parts = value
		.split(|c: char| c == ',' || c.is_whitespace())
		.filter(|part| !part.is_empty())
		.map(|part| part.parse::<u32>())
		.collect::<Result<Vec<_>,_>>()
		.map_err(|_| GainError::format(format!("Malformed <{}> defect: {}", element, value)))?;

	parts.try_into()
		.map_err(|_| GainError::format(format!("<{}> defect needs {} numbers: {}", element, N, value)))
}


/// parses `n` or `n1-n2`, inclusive
fn range(element: &str, value: &str) -> Result<(u32, u32),GainError> {
	let (start, end) = match value.split_once('-') {
		Some((start, end)) => (start.trim(), end.trim()),
		None => (value, value)
	};
	let [start] = numbers::<1>(element, start)?;
	let [end] = numbers::<1>(element, end)?;
	if end < start {
		return Err(GainError::format(format!("Inverted <{}> defect range: {}", element, value)));
	}
	Ok((start, end))
}


/// Merges row-major (y, x) pixels into horizontal runs.
/// Only strictly consecutive pixels in the same row join a run.
fn merge_runs(points: &BTreeSet<(u32, u32)>) -> Vec<DefectRegion> {

	let mut runs = Vec::<DefectRegion>::new();

	for &(y, x) in points {
		if let Some(run) = runs.last_mut() {
			if run.y == y && run.x + run.width == x {
				run.width += 1;
				continue;
			}
		}
		runs.push(DefectRegion::pixel(x, y));
	}

	runs
}

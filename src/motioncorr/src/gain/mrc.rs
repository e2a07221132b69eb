
// MRC file (from the Medical Research Council, in the UK)
// https://en.wikipedia.org/wiki/MRC_(file_format)

// format specification:
// https://www.ccpem.ac.uk/mrc_format/mrc2014.php

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use byteorder::{WriteBytesExt, LE};

use super::{GainError, GainHeader, GainImage, Pixels};


/// 256 (4-byte) words
pub const HEADER_SIZE: usize = 1024;

const MODE_INT8: u32 = 0;
const MODE_INT16: u32 = 1;
const MODE_FLOAT32: u32 = 2;
const MODE_UINT16: u32 = 6;

const MRC_VERSION: u32 = 20140;


/// A complete MRC file in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct MrcGain {
	pub bytes: Vec<u8>,

	/// always false: we repackage the gain exactly as stored
	pub flipped_vertically: bool
}

impl MrcGain {

	pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {

		let path = path.as_ref();

		let mut file = File::create(&path)
			.context(format!("Failed to open file for writing: {}", path.to_string_lossy()))?;
		let mut writer = BufWriter::new(&mut file);

		writer.write_all(&self.bytes)
			.context(format!("Failed to write MRC file: {}", path.to_string_lossy()))?;

		// write buffers should be flushed before dropping
		writer.flush()?;

		Ok(())
	}
}


#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
	pub min: f32,
	pub max: f32,
	pub mean: f32,
	pub rms: f32
}

impl Stats {

	/// NaNs are skipped, an image of only NaNs gets all zeros
	pub fn of(pixels: &Pixels) -> Self {

		let mut min = f64::INFINITY;
		let mut max = f64::NEG_INFINITY;
		let mut sum = 0.0;
		let mut count = 0usize;
		for v in pixels.values().filter(|v| !v.is_nan()) {
			min = min.min(v);
			max = max.max(v);
			sum += v;
			count += 1;
		}
		if count == 0 {
			return Self {
				min: 0.0,
				max: 0.0,
				mean: 0.0,
				rms: 0.0
			};
		}
		let mean = sum/(count as f64);

		// rms deviation from the mean, per MRC2014
		let var = pixels.values()
			.filter(|v| !v.is_nan())
			.map(|v| (v - mean)*(v - mean))
			.sum::<f64>()/(count as f64);

		Self {
			min: min as f32,
			max: max as f32,
			mean: mean as f32,
			rms: var.sqrt() as f32
		}
	}
}


pub fn convert_to_mrc(header: &GainHeader, image: &GainImage) -> Result<MrcGain,GainError> {

	if image.width != header.width() || image.height != header.height() || image.pixels.len() != header.num_pixels() {
		return Err(GainError::format(format!(
			"Gain image is {}x{} ({} pixels), but its header says {}x{}",
			image.width,
			image.height,
			image.pixels.len(),
			header.width(),
			header.height()
		)));
	}

	let bytes = encode(image)
		.map_err(|e| GainError::format(format!("Failed to encode MRC: {}", e)))?;

	Ok(MrcGain {
		bytes,
		flipped_vertically: false
	})
}


fn encode(image: &GainImage) -> std::io::Result<Vec<u8>> {

	let mode = match &image.pixels {
		Pixels::Int8(..) => MODE_INT8,
		Pixels::Int16(..) => MODE_INT16,
		Pixels::Uint16(..) => MODE_UINT16,
		Pixels::Float32(..) => MODE_FLOAT32
	};
	let stats = Stats::of(&image.pixels);

	let bytes_per_pixel = match mode {
		MODE_INT8 => 1,
		MODE_INT16 | MODE_UINT16 => 2,
		_ => 4
	};
	let mut out = Vec::<u8>::with_capacity(HEADER_SIZE + image.pixels.len()*bytes_per_pixel);

	// write the dimensions (words 1-3), a gain is a single section
	out.write_u32::<LE>(image.width)?;
	out.write_u32::<LE>(image.height)?;
	out.write_u32::<LE>(1)?;

	// word 4
	out.write_u32::<LE>(mode)?;

	// start indices (words 5-7)
	out.write_all(&[0u8; 4*3])?;

	// sampling (words 8-10)
	out.write_u32::<LE>(image.width)?;
	out.write_u32::<LE>(image.height)?;
	out.write_u32::<LE>(1)?;

	// cell dimensions (words 11-13): one unit per pixel, we don't know the pixel size here
	out.write_f32::<LE>(image.width as f32)?;
	out.write_f32::<LE>(image.height as f32)?;
	out.write_f32::<LE>(1.0)?;

	// cell angles (words 14-16)
	for _ in 0 .. 3 {
		out.write_f32::<LE>(90.0)?;
	}

	// axis mapping (words 17-19): columns, rows, sections
	out.write_u32::<LE>(1)?;
	out.write_u32::<LE>(2)?;
	out.write_u32::<LE>(3)?;

	// density stats (words 20-22)
	out.write_f32::<LE>(stats.min)?;
	out.write_f32::<LE>(stats.max)?;
	out.write_f32::<LE>(stats.mean)?;

	// space group (word 23): 0 means image stack
	out.write_u32::<LE>(0)?;

	// no extended header (word 24)
	out.write_u32::<LE>(0)?;

	// we're at word 25 now: skip to word 28
	out.write_all(&[0u8; 4*(28 - 25)])?;

	out.write_u32::<LE>(MRC_VERSION)?;

	// we're at word 29 now: skip to word 53 (origin is 50-52, and zero)
	out.write_all(&[0u8; 4*(53 - 29)])?;

	out.write_all(b"MAP ")?;

	// write the machine stamp: signal little-endianess (note 11)
	out.write_all(&[0x44, 0x44, 0x00, 0x00])?;

	out.write_f32::<LE>(stats.rms)?;

	// no labels (word 56), then 10 empty 80-char labels
	out.write_u32::<LE>(0)?;
	out.write_all(&[0u8; 4*(257 - 57)])?;

	debug_assert_eq!(out.len(), HEADER_SIZE);

	// write the pixels: y(x) order, same as the source
	match &image.pixels {
		Pixels::Int8(v) => for p in v {
			out.write_i8(*p)?;
		}
		Pixels::Int16(v) => for p in v {
			out.write_i16::<LE>(*p)?;
		}
		Pixels::Uint16(v) => for p in v {
			out.write_u16::<LE>(*p)?;
		}
		Pixels::Float32(v) => for p in v {
			out.write_f32::<LE>(*p)?;
		}
	}

	Ok(out)
}


#[cfg(test)]
mod test {

	use byteorder::{ByteOrder, LittleEndian};
	use galvanic_assert::{assert_that, matchers::*};

	use super::*;
	use crate::gain::test_tiff::TestTiff;


	fn word(bytes: &[u8], i: usize) -> &[u8] {
		// MRC2014 words are 1-indexed
		&bytes[(i - 1)*4 .. i*4]
	}


	#[test]
	fn roundtrip() {

		let pixels = vec![0.25, 1.0, 1.5, -3.0, 7.75, 1e-3, 2.0, 9.5];
		for tiff in [TestTiff::new(4, 2), TestTiff::new(4, 2).big_endian()] {

			let bytes = tiff
				.pixels(pixels.clone())
				.build();
			let header = GainHeader::parse(&bytes)
				.expect("Failed to parse header");
			let image = GainImage::decode(&bytes, &header)
				.expect("Failed to decode");
			let mrc = convert_to_mrc(&header, &image)
				.expect("Failed to convert");

			assert_that!(&mrc.flipped_vertically, eq(false));
			assert_that!(&mrc.bytes.len(), eq(HEADER_SIZE + 4*pixels.len()));

			let nx = LittleEndian::read_u32(word(&mrc.bytes, 1));
			let ny = LittleEndian::read_u32(word(&mrc.bytes, 2));
			let mode = LittleEndian::read_u32(word(&mrc.bytes, 4));
			assert_that!(&nx, eq(4));
			assert_that!(&ny, eq(2));
			assert_that!(&mode, eq(MODE_FLOAT32));

			let payload = mrc.bytes[HEADER_SIZE ..]
				.chunks_exact(4)
				.map(LittleEndian::read_f32)
				.collect::<Vec<_>>();
			assert_that!(&payload, eq(pixels.clone()));
		}
	}


	#[test]
	fn header_fields() {

		let image = GainImage {
			width: 2,
			height: 2,
			pixels: Pixels::Int16(vec![-4, 0, 2, 6])
		};
		let bytes = encode(&image)
			.expect("Failed to encode");

		assert_that!(&LittleEndian::read_u32(word(&bytes, 3)), eq(1));
		assert_that!(&LittleEndian::read_u32(word(&bytes, 4)), eq(MODE_INT16));
		assert_that!(&LittleEndian::read_f32(word(&bytes, 20)), eq(-4.0));
		assert_that!(&LittleEndian::read_f32(word(&bytes, 21)), eq(6.0));
		assert_that!(&LittleEndian::read_f32(word(&bytes, 22)), eq(1.0));
		assert_that!(&LittleEndian::read_u32(word(&bytes, 24)), eq(0));
		assert_that!(&LittleEndian::read_u32(word(&bytes, 28)), eq(MRC_VERSION));
		assert_that!(&word(&bytes, 53), eq(&b"MAP "[..]));
		assert_that!(&word(&bytes, 54), eq(&b"\x44\x44\x00\x00"[..]));

		let payload = bytes[HEADER_SIZE ..]
			.chunks_exact(2)
			.map(LittleEndian::read_i16)
			.collect::<Vec<_>>();
		assert_that!(&payload, eq(vec![-4, 0, 2, 6]));
	}


	#[test]
	fn stats_skip_nan() {
		let stats = Stats::of(&Pixels::Float32(vec![1.0, f32::NAN, 3.0]));
		assert_that!(&stats.min, eq(1.0));
		assert_that!(&stats.max, eq(3.0));
		assert_that!(&stats.mean, eq(2.0));
		assert_that!(&stats.rms, eq(1.0));
	}


	#[test]
	fn wrong_size() {
		let bytes = TestTiff::new(4, 2)
			.build();
		let header = GainHeader::parse(&bytes)
			.expect("Failed to parse header");
		let image = GainImage {
			width: 2,
			height: 4,
			pixels: Pixels::Float32(vec![0.0; 8])
		};
		let result = convert_to_mrc(&header, &image);
		assert!(matches!(result, Err(GainError::Format(..))));
	}
}


use std::fs;
use std::io::Cursor;
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::TiffError;
use tracing::debug;

use super::{GainError, GainHeader};


/// TIFF Compression value for uncompressed strips
const COMPRESSION_NONE: u32 = 1;

/// super-resolution EER gains are 8k x 8k float32, leave room above that
const MAX_IMAGE_BYTES: u64 = 1 << 30;


#[derive(Debug, Clone, PartialEq)]
pub enum Pixels {
	Int8(Vec<i8>),
	Int16(Vec<i16>),
	Uint16(Vec<u16>),
	Float32(Vec<f32>)
}

impl Pixels {

	pub fn len(&self) -> usize {
		match self {
			Self::Int8(v) => v.len(),
			Self::Int16(v) => v.len(),
			Self::Uint16(v) => v.len(),
			Self::Float32(v) => v.len()
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// every pixel value, widened to f64 (losslessly, for all our sample types)
	pub fn values(&self) -> Box<dyn Iterator<Item=f64> + '_> {
		match self {
			Self::Int8(v) => Box::new(v.iter().map(|p| *p as f64)),
			Self::Int16(v) => Box::new(v.iter().map(|p| *p as f64)),
			Self::Uint16(v) => Box::new(v.iter().map(|p| *p as f64)),
			Self::Float32(v) => Box::new(v.iter().map(|p| *p as f64))
		}
	}
}


/// A gain image in row-major order, in the orientation it was stored.
#[derive(Debug, Clone, PartialEq)]
pub struct GainImage {
	pub width: u32,
	pub height: u32,
	pub pixels: Pixels
}

impl GainImage {

	pub fn read(path: impl AsRef<Path>, header: &GainHeader) -> Result<Self,GainError> {
		let path = path.as_ref();
		let bytes = fs::read(path)
			.map_err(|source| GainError::Io {
				path: path.to_path_buf(),
				source
			})?;
		Self::decode(&bytes, header)
	}

	pub fn decode(bytes: &[u8], header: &GainHeader) -> Result<Self,GainError> {

		let layout = header.layout();
		let needed = (header.width() as u64)
			.checked_mul(header.height() as u64)
			.and_then(|n| n.checked_mul(layout.bytes_per_sample() as u64))
			.filter(|n| *n <= MAX_IMAGE_BYTES)
			.ok_or_else(|| GainError::format(format!("Gain image is too large: {}x{} {:?}", header.width(), header.height(), layout)))?;

		// every strip must lie inside the file, before the decoder allocates anything
		let mut stored = 0u64;
		for strip in header.strips() {
			GainError::check_len("gain image strip", strip.offset + strip.len, bytes.len() as u64)?;
			stored += strip.len;
		}
		if header.compression() == COMPRESSION_NONE {
			GainError::check_len("gain image", needed, stored)?;
		}

		let mut limits = Limits::default();
		limits.decoding_buffer_size = MAX_IMAGE_BYTES as usize;

		let mut decoder = Decoder::new(Cursor::new(bytes))
			.map_err(decode_err)?
			.with_limits(limits);

		let (width, height) = decoder.dimensions()
			.map_err(decode_err)?;
		if (width, height) != (header.width(), header.height()) {
			return Err(GainError::format(format!(
				"Decoded gain is {}x{}, but the header says {}x{}",
				width, height,
				header.width(), header.height()
			)));
		}

		let pixels = match decoder.read_image().map_err(decode_err)? {
			DecodingResult::I8(v) => Pixels::Int8(v),
			// no unsigned 8-bit mode in MRC, but 16 bits holds every value
			DecodingResult::U8(v) => Pixels::Uint16(v.into_iter()
				.map(u16::from)
				.collect()),
			DecodingResult::U16(v) => Pixels::Uint16(v),
			DecodingResult::I16(v) => Pixels::Int16(v),
			DecodingResult::F32(v) => Pixels::Float32(v),
			_ => return Err(GainError::format(format!("Unsupported gain pixel layout: {:?}", layout)))
		};
		if pixels.len() != header.num_pixels() {
			return Err(GainError::format(format!("Decoded {} gain pixels, expected {}", pixels.len(), header.num_pixels())));
		}

		debug!(
			"Decoded {} gain pixels from {} strips, compression {}",
			pixels.len(),
			header.strips().len(),
			header.compression()
		);

		Ok(Self {
			width,
			height,
			pixels
		})
	}
}


fn decode_err(e: TiffError) -> GainError {
	GainError::format(format!("Failed to decode gain image: {}", e))
}

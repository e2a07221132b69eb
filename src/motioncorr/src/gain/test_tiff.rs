
use std::io::Cursor;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use tiff::encoder::{colortype, Compression, TiffEncoder};
use tiff::tags::Tag;

use super::header::TAG_EER_DEFECTS;


/// Builds small float32 TIFF gain files.
/// Little-endian files come from the TIFF encoder. Big-endian files,
/// and files with a defect tag pointing somewhere else, are written by hand
/// as file header, image file directory, defects XML, then pixels in one strip.
pub struct TestTiff {
	big_endian: bool,
	width: u32,
	height: u32,
	pixels: Vec<f32>,
	lzw: bool,
	defects: Option<String>,
	defects_offset: Option<u32>,
	declared_size: Option<(u32, u32)>
}

impl TestTiff {

	pub fn new(width: u32, height: u32) -> Self {
		let pixels = (0 .. width*height)
			.map(|i| 0.5 + i as f32)
			.collect();
		Self {
			big_endian: false,
			width,
			height,
			pixels,
			lzw: false,
			defects: None,
			defects_offset: None,
			declared_size: None
		}
	}

	pub fn big_endian(mut self) -> Self {
		self.big_endian = true;
		self
	}

	pub fn pixels(mut self, pixels: Vec<f32>) -> Self {
		assert_eq!(pixels.len(), (self.width*self.height) as usize);
		self.pixels = pixels;
		self
	}

	/// LZW strips, only for encoded files
	pub fn lzw(mut self) -> Self {
		self.lzw = true;
		self
	}

	pub fn defects(mut self, xml: impl Into<String>) -> Self {
		self.defects = Some(xml.into());
		self
	}

	pub fn defects_offset(mut self, offset: u32) -> Self {
		self.defects_offset = Some(offset);
		self
	}

	/// writes these dimensions into the header, but keeps the real pixels
	pub fn declared_size(mut self, width: u32, height: u32) -> Self {
		self.declared_size = Some((width, height));
		self
	}

	pub fn build(&self) -> Vec<u8> {
		if self.big_endian || self.defects_offset.is_some() || self.declared_size.is_some() {
			self.write_by_hand()
		} else {
			self.encode()
		}
	}

	fn encode(&self) -> Vec<u8> {

		let compression =
			if self.lzw {
				Compression::Lzw
			} else {
				Compression::Uncompressed
			};

		let mut bytes = Vec::<u8>::new();
		{
			let mut encoder = TiffEncoder::new(Cursor::new(&mut bytes))
				.expect("Failed to start TIFF")
				.with_compression(compression);
			let mut image = encoder.new_image::<colortype::Gray32Float>(self.width, self.height)
				.expect("Failed to start TIFF image");
			if let Some(xml) = &self.defects {
				image.encoder()
					.write_tag(Tag::Unknown(TAG_EER_DEFECTS), xml.as_str())
					.expect("Failed to write defects tag");
			}
			image.write_data(&self.pixels)
				.expect("Failed to write TIFF pixels");
		}

		bytes
	}

	fn u16(&self, v: u16) -> [u8; 2] {
		let mut buf = [0u8; 2];
		if self.big_endian {
			BigEndian::write_u16(&mut buf, v);
		} else {
			LittleEndian::write_u16(&mut buf, v);
		}
		buf
	}

	fn u32(&self, v: u32) -> [u8; 4] {
		let mut buf = [0u8; 4];
		if self.big_endian {
			BigEndian::write_u32(&mut buf, v);
		} else {
			LittleEndian::write_u32(&mut buf, v);
		}
		buf
	}

	fn write_by_hand(&self) -> Vec<u8> {

		let defects = self.defects.as_ref()
			.map(|xml| xml.as_bytes().to_vec());
		let (width, height) = self.declared_size
			.unwrap_or((self.width, self.height));

		let num_entries = 10 + if defects.is_some() { 1 } else { 0 };
		let data_start = 8 + 2 + 12*num_entries + 4;
		let defects_len = defects.as_ref()
			.map(|d| d.len() as u32)
			.unwrap_or(0);
		let pixels_offset = data_start + defects_len;
		let pixels_len = 4*self.pixels.len() as u32;

		// (tag, type, count, value)
		let mut entries = vec![
			(256u16, 4u16, 1u32, self.u32(width)),
			(257, 4, 1, self.u32(height)),
			(258, 3, 1, short(self.u16(32))),
			(259, 3, 1, short(self.u16(1))),
			(262, 3, 1, short(self.u16(1))),
			(273, 4, 1, self.u32(pixels_offset)),
			(277, 3, 1, short(self.u16(1))),
			(278, 4, 1, self.u32(height)),
			(279, 4, 1, self.u32(pixels_len)),
			(339, 3, 1, short(self.u16(3)))
		];
		if defects.is_some() {
			let offset = self.defects_offset.unwrap_or(data_start);
			entries.push((TAG_EER_DEFECTS, 2, defects_len, self.u32(offset)));
		}

		let mut out = Vec::<u8>::new();
		if self.big_endian {
			out.extend_from_slice(b"MM");
		} else {
			out.extend_from_slice(b"II");
		}
		out.extend_from_slice(&self.u16(42));
		out.extend_from_slice(&self.u32(8));

		out.extend_from_slice(&self.u16(num_entries as u16));
		for (tag, kind, count, value) in &entries {
			out.extend_from_slice(&self.u16(*tag));
			out.extend_from_slice(&self.u16(*kind));
			out.extend_from_slice(&self.u32(*count));
			out.extend_from_slice(value);
		}
		out.extend_from_slice(&self.u32(0));
		assert_eq!(out.len() as u32, data_start);

		if let Some(defects) = &defects {
			out.extend_from_slice(defects);
		}
		for px in &self.pixels {
			let mut buf = [0u8; 4];
			if self.big_endian {
				BigEndian::write_f32(&mut buf, *px);
			} else {
				LittleEndian::write_f32(&mut buf, *px);
			}
			out.extend_from_slice(&buf);
		}

		out
	}
}


/// SHORT values sit left-justified in the 4-byte value field
fn short(v: [u8; 2]) -> [u8; 4] {
	[v[0], v[1], 0, 0]
}

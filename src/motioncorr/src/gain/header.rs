
// TIFF 6.0 specification:
// https://www.itu.int/itudoc/itu-t/com16/tiff-fx/docs/tiff6.pdf

use std::fs;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use tracing::{debug, trace};

use super::GainError;


const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_COMPRESSION: u16 = 259;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_ROWS_PER_STRIP: u16 = 278;
const TAG_STRIP_BYTE_COUNTS: u16 = 279;
const TAG_SAMPLE_FORMAT: u16 = 339;

/// private tag where Falcon cameras write the defect list, as an XML document
pub const TAG_EER_DEFECTS: u16 = 65100;

const TYPE_BYTE: u16 = 1;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;

const SIG_LITTLE: [u8; 4] = [b'I', b'I', 42, 0];
const SIG_BIG: [u8; 4] = [b'M', b'M', 0, 42];
const SIG_BIGTIFF_LITTLE: [u8; 4] = [b'I', b'I', 43, 0];
const SIG_BIGTIFF_BIG: [u8; 4] = [b'M', b'M', 0, 43];

const FILE_HEADER_SIZE: u64 = 8;
const IFD_ENTRY_SIZE: u64 = 12;


/// Byte order of every multi-byte field in the container, chosen by the file's first two bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
	Little,
	Big
}

impl Endian {

	pub fn read_u16(self, buf: &[u8]) -> u16 {
		match self {
			Self::Little => LittleEndian::read_u16(buf),
			Self::Big => BigEndian::read_u16(buf)
		}
	}

	pub fn read_u32(self, buf: &[u8]) -> u32 {
		match self {
			Self::Little => LittleEndian::read_u32(buf),
			Self::Big => BigEndian::read_u32(buf)
		}
	}
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLayout {
	Uint8,
	Int8,
	Uint16,
	Int16,
	Float32
}

impl SampleLayout {

	/// maps the TIFF BitsPerSample and SampleFormat fields to a layout
	fn from_tiff(bits: u32, format: u32) -> Option<Self> {
		match (bits, format) {
			(8, 1) => Some(Self::Uint8),
			(8, 2) => Some(Self::Int8),
			(16, 1) => Some(Self::Uint16),
			(16, 2) => Some(Self::Int16),
			(32, 3) => Some(Self::Float32),
			_ => None
		}
	}

	pub fn bytes_per_sample(self) -> usize {
		match self {
			Self::Uint8 | Self::Int8 => 1,
			Self::Uint16 | Self::Int16 => 2,
			Self::Float32 => 4
		}
	}
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strip {
	pub offset: u64,
	pub len: u64
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefectMap {

	/// no defect tag, so the camera reported no defects
	Absent,

	Embedded {
		offset: u64,
		text: String
	},

	/// the defect tag points past the end of the file
	Dangling {
		offset: u64,
		len: u64,
		file_len: u64
	}
}


/// The parsed header of a gain reference: the TIFF file header plus the first image file directory.
#[derive(Debug, Clone, PartialEq)]
pub struct GainHeader {
	endian: Endian,
	width: u32,
	height: u32,
	layout: SampleLayout,
	compression: u32,
	rows_per_strip: u32,
	strips: Vec<Strip>,
	defect_map: DefectMap,
	raw_header: Vec<u8>,
	file_len: u64
}


pub fn parse_header(path: impl AsRef<Path>) -> Result<GainHeader,GainError> {

	let path = path.as_ref();

	let bytes = fs::read(path)
		.map_err(|source| GainError::Io {
			path: path.to_path_buf(),
			source
		})?;

	let header = GainHeader::parse(&bytes)?;
	debug!(
		"Parsed gain header from {}: {}x{} {:?} {:?}",
		path.to_string_lossy(),
		header.width,
		header.height,
		header.layout,
		header.endian
	);

	Ok(header)
}


impl GainHeader {

	pub fn parse(bytes: &[u8]) -> Result<Self,GainError> {

		let file_len = bytes.len() as u64;

		let endian = read_signature(bytes)?;
		GainError::check_len("TIFF file header", FILE_HEADER_SIZE, file_len)?;

		// the first IFD can be anywhere in the file, but never at 0
		let ifd_offset = endian.read_u32(&bytes[4..8]) as u64;
		if ifd_offset < FILE_HEADER_SIZE {
			return Err(GainError::format(format!("Invalid image file directory offset: {}", ifd_offset)));
		}
		GainError::check_len("image file directory", ifd_offset + 2, file_len)?;
		let num_entries = endian.read_u16(&bytes[ifd_offset as usize ..]) as u64;
		let ifd_end = ifd_offset + 2 + num_entries*IFD_ENTRY_SIZE + 4;
		GainError::check_len("image file directory", ifd_end, file_len)?;

		let entries = (0 .. num_entries)
			.map(|i| Entry::read(bytes, endian, ifd_offset + 2 + i*IFD_ENTRY_SIZE))
			.collect::<Vec<_>>();

		let mut width = None::<u32>;
		let mut height = None::<u32>;
		let mut bits = 1;
		let mut compression = 1;
		let mut samples_per_pixel = 1;
		let mut rows_per_strip = None::<u32>;
		let mut sample_format = 1;
		let mut strip_offsets = None::<Vec<u32>>;
		let mut strip_byte_counts = None::<Vec<u32>>;
		let mut defect_map = DefectMap::Absent;

		for entry in &entries {
			match entry.tag {
				TAG_IMAGE_WIDTH => width = Some(entry.uint(bytes, endian, "ImageWidth")?),
				TAG_IMAGE_LENGTH => height = Some(entry.uint(bytes, endian, "ImageLength")?),
				TAG_BITS_PER_SAMPLE => bits = entry.uint(bytes, endian, "BitsPerSample")?,
				TAG_COMPRESSION => compression = entry.uint(bytes, endian, "Compression")?,
				TAG_SAMPLES_PER_PIXEL => samples_per_pixel = entry.uint(bytes, endian, "SamplesPerPixel")?,
				TAG_ROWS_PER_STRIP => rows_per_strip = Some(entry.uint(bytes, endian, "RowsPerStrip")?),
				TAG_SAMPLE_FORMAT => sample_format = entry.uint(bytes, endian, "SampleFormat")?,
				TAG_STRIP_OFFSETS => strip_offsets = Some(entry.uints(bytes, endian, "StripOffsets")?),
				TAG_STRIP_BYTE_COUNTS => strip_byte_counts = Some(entry.uints(bytes, endian, "StripByteCounts")?),
				TAG_EER_DEFECTS => defect_map = entry.defect_map(bytes, endian)?,
				tag => trace!("Skipping TIFF tag {}", tag)
			}
		}

		let width = width
			.filter(|w| *w > 0)
			.ok_or_else(|| GainError::format("Missing or zero image width"))?;
		let height = height
			.filter(|h| *h > 0)
			.ok_or_else(|| GainError::format("Missing or zero image height"))?;

		if samples_per_pixel != 1 {
			return Err(GainError::format(format!("Gain must have one sample per pixel, not {}", samples_per_pixel)));
		}
		let layout = SampleLayout::from_tiff(bits, sample_format)
			.ok_or_else(|| GainError::format(format!("Unsupported pixel layout: {} bits, sample format {}", bits, sample_format)))?;

		let strip_offsets = strip_offsets
			.ok_or_else(|| GainError::format("Missing StripOffsets"))?;
		let strip_byte_counts = strip_byte_counts
			.ok_or_else(|| GainError::format("Missing StripByteCounts"))?;
		if strip_offsets.len() != strip_byte_counts.len() {
			return Err(GainError::format(format!(
				"Found {} strip offsets but {} strip byte counts",
				strip_offsets.len(),
				strip_byte_counts.len()
			)));
		}
		let strips = strip_offsets.iter()
			.zip(strip_byte_counts.iter())
			.map(|(&offset, &len)| Strip {
				offset: offset as u64,
				len: len as u64
			})
			.collect();

		Ok(Self {
			endian,
			width,
			height,
			layout,
			compression,
			rows_per_strip: rows_per_strip.unwrap_or(height),
			strips,
			defect_map,
			raw_header: bytes[.. ifd_end as usize].to_vec(),
			file_len
		})
	}

	pub fn endian(&self) -> Endian {
		self.endian
	}

	pub fn width(&self) -> u32 {
		self.width
	}

	pub fn height(&self) -> u32 {
		self.height
	}

	pub fn layout(&self) -> SampleLayout {
		self.layout
	}

	pub fn compression(&self) -> u32 {
		self.compression
	}

	pub fn rows_per_strip(&self) -> u32 {
		self.rows_per_strip
	}

	pub fn strips(&self) -> &[Strip] {
		&self.strips
	}

	pub fn defect_map(&self) -> &DefectMap {
		&self.defect_map
	}

	/// bytes from the start of the file through the end of the first image file directory
	pub fn raw_header(&self) -> &[u8] {
		&self.raw_header
	}

	pub fn file_len(&self) -> u64 {
		self.file_len
	}

	pub fn num_pixels(&self) -> usize {
		(self.width as usize)*(self.height as usize)
	}
}


fn read_signature(bytes: &[u8]) -> Result<Endian,GainError> {

	let prefix = &bytes[.. bytes.len().min(4)];

	// a short file that still looks like a TIFF is truncated, not malformed
	if prefix.len() < 4 {
		let known = [SIG_LITTLE, SIG_BIG, SIG_BIGTIFF_LITTLE, SIG_BIGTIFF_BIG];
		return if known.iter().any(|sig| sig.starts_with(prefix)) {
			Err(GainError::TruncatedFile {
				what: "TIFF file header",
				needed: FILE_HEADER_SIZE,
				available: bytes.len() as u64
			})
		} else {
			Err(GainError::format(format!("Not a TIFF signature: {:02x?}", prefix)))
		};
	}

	if prefix == SIG_LITTLE {
		Ok(Endian::Little)
	} else if prefix == SIG_BIG {
		Ok(Endian::Big)
	} else if prefix == SIG_BIGTIFF_LITTLE || prefix == SIG_BIGTIFF_BIG {
		Err(GainError::format("BigTIFF gain references are not supported"))
	} else {
		Err(GainError::format(format!("Not a TIFF signature: {:02x?}", prefix)))
	}
}


struct Entry {
	tag: u16,
	kind: u16,
	count: u32,
	/// file position of the 4-byte value/offset field
	field_pos: u64,
	field: [u8; 4]
}

impl Entry {

	fn read(bytes: &[u8], endian: Endian, pos: u64) -> Self {
		let pos = pos as usize;
		let mut field = [0u8; 4];
		field.copy_from_slice(&bytes[pos + 8 .. pos + 12]);
		Self {
			tag: endian.read_u16(&bytes[pos ..]),
			kind: endian.read_u16(&bytes[pos + 2 ..]),
			count: endian.read_u32(&bytes[pos + 4 ..]),
			field_pos: pos as u64 + 8,
			field
		}
	}

	fn type_size(&self) -> Option<u64> {
		match self.kind {
			1 | 2 | 6 | 7 => Some(1),
			3 | 8 => Some(2),
			4 | 9 | 11 => Some(4),
			5 | 10 | 12 => Some(8),
			_ => None
		}
	}

	fn byte_len(&self) -> Result<u64,GainError> {
		self.type_size()
			.map(|size| size*(self.count as u64))
			.ok_or_else(|| GainError::format(format!("Unknown type {} for TIFF tag {}", self.kind, self.tag)))
	}

	/// values up to 4 bytes live in the entry itself, anything bigger is at an offset
	fn location(&self, endian: Endian) -> Result<(u64, u64),GainError> {
		let len = self.byte_len()?;
		if len <= 4 {
			Ok((self.field_pos, len))
		} else {
			Ok((endian.read_u32(&self.field) as u64, len))
		}
	}

	fn data<'b>(&self, bytes: &'b [u8], endian: Endian, what: &'static str) -> Result<&'b [u8],GainError> {
		let (offset, len) = self.location(endian)?;
		GainError::check_len(what, offset + len, bytes.len() as u64)?;
		Ok(&bytes[offset as usize .. (offset + len) as usize])
	}

	fn uints(&self, bytes: &[u8], endian: Endian, what: &'static str) -> Result<Vec<u32>,GainError> {
		let data = self.data(bytes, endian, what)?;
		match self.kind {
			TYPE_BYTE => Ok(data.iter()
				.map(|b| *b as u32)
				.collect()),
			TYPE_SHORT => Ok(data.chunks_exact(2)
				.map(|c| endian.read_u16(c) as u32)
				.collect()),
			TYPE_LONG => Ok(data.chunks_exact(4)
				.map(|c| endian.read_u32(c))
				.collect()),
			kind => Err(GainError::format(format!("{} has non-integer type {}", what, kind)))
		}
	}

	fn uint(&self, bytes: &[u8], endian: Endian, what: &'static str) -> Result<u32,GainError> {
		self.uints(bytes, endian, what)?
			.first()
			.copied()
			.ok_or_else(|| GainError::format(format!("{} has no value", what)))
	}

	fn defect_map(&self, bytes: &[u8], endian: Endian) -> Result<DefectMap,GainError> {

		let (offset, len) = self.location(endian)?;
		let file_len = bytes.len() as u64;
		if offset + len > file_len {
			return Ok(DefectMap::Dangling {
				offset,
				len,
				file_len
			});
		}

		let data = &bytes[offset as usize .. (offset + len) as usize];
		let text = String::from_utf8_lossy(data)
			.trim_end_matches('\0')
			.to_string();

		Ok(DefectMap::Embedded {
			offset,
			text
		})
	}
}


#[cfg(test)]
mod test {

	use galvanic_assert::{assert_that, matchers::*};

	use super::*;
	use crate::gain::test_tiff::TestTiff;


	#[test]
	fn little_endian() {

		let bytes = TestTiff::new(4, 3)
			.defects("<defects><point>1,2</point></defects>")
			.build();
		let header = GainHeader::parse(&bytes)
			.expect("Failed to parse header");

		assert_that!(&header.endian(), eq(Endian::Little));
		assert_that!(&header.width(), eq(4));
		assert_that!(&header.height(), eq(3));
		assert_that!(&header.layout(), eq(SampleLayout::Float32));
		assert_that!(&header.strips().len(), eq(1));
		assert_that!(&header.file_len(), eq(bytes.len() as u64));
		assert!(matches!(header.defect_map(), DefectMap::Embedded { .. }));
	}


	#[test]
	fn big_endian() {

		let little = TestTiff::new(5, 2)
			.build();
		let big = TestTiff::new(5, 2)
			.big_endian()
			.build();

		let little = GainHeader::parse(&little)
			.expect("Failed to parse little-endian header");
		let big = GainHeader::parse(&big)
			.expect("Failed to parse big-endian header");

		assert_that!(&big.endian(), eq(Endian::Big));
		assert_that!(&big.width(), eq(little.width()));
		assert_that!(&big.height(), eq(little.height()));
		assert_that!(&big.layout(), eq(little.layout()));
		assert_that!(&big.strips()[0].len, eq(little.strips()[0].len));
	}


	#[test]
	fn no_defects() {
		let bytes = TestTiff::new(2, 2)
			.build();
		let header = GainHeader::parse(&bytes)
			.expect("Failed to parse header");
		assert_that!(&header.defect_map(), eq(&DefectMap::Absent));
	}


	#[test]
	fn dangling_defects() {
		let bytes = TestTiff::new(2, 2)
			.defects("<defects><point>0,0</point></defects>")
			.defects_offset(1_000_000)
			.build();
		let header = GainHeader::parse(&bytes)
			.expect("a dangling defect map should not fail the header");
		assert!(matches!(header.defect_map(), DefectMap::Dangling { .. }));
	}


	#[test]
	fn bad_signature() {
		let result = GainHeader::parse(b"GIF89a and then some more bytes");
		assert!(matches!(result, Err(GainError::Format(..))));
	}


	#[test]
	fn bigtiff() {
		let mut bytes = TestTiff::new(2, 2)
			.build();
		bytes[2] = 43;
		let result = GainHeader::parse(&bytes);
		assert!(matches!(result, Err(GainError::Format(..))));
	}


	#[test]
	fn truncated() {

		let bytes = TestTiff::new(4, 4)
			.build();
		let header_len = GainHeader::parse(&bytes)
			.expect("Failed to parse header")
			.raw_header()
			.len();

		// every cut inside the declared header must be reported as truncation
		for len in [0, 2, 3, 7, 8, 9, header_len/2, header_len - 1] {
			let result = GainHeader::parse(&bytes[.. len]);
			assert!(
				matches!(result, Err(GainError::TruncatedFile { .. })),
				"expected truncation at {} bytes, got {:?}", len, result
			);
		}
	}
}


use std::fs;
use std::io::Cursor;
use std::path::Path;

use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;


/// Writes a float32 gain file, optionally with a defects XML document in tag 65100.
pub fn write_gain(path: impl AsRef<Path>, width: u32, height: u32, defects: Option<&str>) {
	fs::write(path.as_ref(), gain(width, height, defects))
		.expect("Failed to write gain file");
}


pub fn gain(width: u32, height: u32, defects: Option<&str>) -> Vec<u8> {

	let pixels = (0 .. width*height)
		.map(|i| 1.0 + (i % 7) as f32/10.0)
		.collect::<Vec<_>>();

	let mut bytes = Vec::<u8>::new();
	{
		let mut encoder = TiffEncoder::new(Cursor::new(&mut bytes))
			.expect("Failed to start TIFF");
		let mut image = encoder.new_image::<colortype::Gray32Float>(width, height)
			.expect("Failed to start TIFF image");
		if let Some(defects) = defects {
			image.encoder()
				.write_tag(Tag::Unknown(65100), defects)
				.expect("Failed to write defects tag");
		}
		image.write_data(&pixels)
			.expect("Failed to write TIFF pixels");
	}

	bytes
}

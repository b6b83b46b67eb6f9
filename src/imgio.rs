use crate::image::{Bounds, Image, Pixel};
use failure::{format_err, Error};
use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageBuffer, Rgb, Rgba};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

/// Decodes any format the `image` crate recognizes into 16-bit straight RGBA.
pub fn load(path: impl AsRef<Path>) -> Result<Image<Pixel>, Error> {
    let decoded = image::open(path.as_ref())?.to_rgba16();
    let (width, height) = decoded.dimensions();
    let data = decoded.pixels().map(|px| px.0).collect();
    Ok(Image::new(data, Bounds::from_size(width, height)))
}

fn narrow(value: u16) -> u8 {
    (value >> 8) as u8
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

fn size_u32(image: &Image<Pixel>) -> Result<(u32, u32), Error> {
    let width = image.width() as u32;
    let height = image.height() as u32;
    if width == 0 || height == 0 {
        return Err(format_err!("cannot encode an empty image ({})", image.bounds));
    }
    Ok((width, height))
}

fn save_png(path: &Path, image: &Image<Pixel>) -> Result<(), Error> {
    let (width, height) = size_u32(image)?;
    let mut w = BufWriter::new(File::create(path)?);
    let mut encoder = png::Encoder::new(&mut w, width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Sixteen);
    let mut writer = encoder.write_header()?;
    let mut data = Vec::with_capacity(image.data.len() * 8);
    for pixel in &image.data {
        for channel in pixel {
            // big-endian
            data.extend_from_slice(&channel.to_be_bytes());
        }
    }
    writer.write_image_data(&data)?;
    writer.finish()?;
    w.flush()?;
    Ok(())
}

fn save_jpeg(path: &Path, image: &Image<Pixel>, quality: u8) -> Result<(), Error> {
    let (width, height) = size_u32(image)?;
    let rgb = ImageBuffer::from_fn(width, height, |x, y| {
        let [r, g, b, _] = image.data[y as usize * width as usize + x as usize];
        Rgb([narrow(r), narrow(g), narrow(b)])
    });
    let mut w = BufWriter::new(File::create(path)?);
    JpegEncoder::new_with_quality(&mut w, quality).encode_image(&rgb)?;
    // dropping a BufWriter swallows the error of its final write
    w.flush()?;
    Ok(())
}

fn save_other(path: &Path, image: &Image<Pixel>) -> Result<(), Error> {
    let (width, height) = size_u32(image)?;
    let rgba = ImageBuffer::from_fn(width, height, |x, y| {
        let pixel = image.data[y as usize * width as usize + x as usize];
        Rgba(pixel.map(narrow))
    });
    DynamicImage::ImageRgba8(rgba).save(path)?;
    Ok(())
}

/// Encodes by file extension: `.png` keeps all 16 bits, `.jpg`/`.jpeg` is 8-bit
/// at `quality` with alpha dropped, anything else goes through the `image` crate
/// at 8 bits.
pub fn save(path: impl AsRef<Path>, image: &Image<Pixel>, quality: u8) -> Result<(), Error> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("png") => save_png(path, image),
        Some("jpg") | Some("jpeg") => save_jpeg(path, image, quality),
        Some(_) => save_other(path, image),
        None => Err(format_err!(
            "output path {} has no extension to pick an image format from",
            path.display()
        )),
    }
}

// SPDX-License-Identifier: GPL-3.0-or-later
use std::error::Error as StdError;
use std::fmt;

use bytes::Bytes;
use tracing::trace;

#[cfg(not(feature = "mozjpeg"))]
use bytes::{BufMut, BytesMut};
#[cfg(not(feature = "mozjpeg"))]
use image::{codecs::jpeg::JpegEncoder as ImageJpegEncoder, ColorType};

#[cfg(feature = "mozjpeg")]
use mozjpeg::{ColorSpace, Compress};

use crate::frame::{Channels, Frame};

/// JPEG's dimension fields are 16 bits wide.
const MAX_DIMENSION: u32 = u16::MAX as u32;

#[derive(Debug)]
pub(crate) enum EncodeError {
    Dimensions { width: u32, height: u32 },

    #[cfg(not(feature = "mozjpeg"))]
    Image(image::ImageError),

    #[cfg(feature = "mozjpeg")]
    Mozjpeg,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::Dimensions { width, height } => {
                write!(f, "a {}x{} image cannot be stored as a JPEG", width, height)
            }
            #[cfg(not(feature = "mozjpeg"))]
            EncodeError::Image(err) => write!(f, "JPEG encoding failed: {}", err),
            #[cfg(feature = "mozjpeg")]
            EncodeError::Mozjpeg => f.write_str("mozjpeg was unable to encode the image"),
        }
    }
}

impl StdError for EncodeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            #[cfg(not(feature = "mozjpeg"))]
            EncodeError::Image(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(not(feature = "mozjpeg"))]
impl From<image::ImageError> for EncodeError {
    fn from(err: image::ImageError) -> Self {
        Self::Image(err)
    }
}

/// Turns frames into JPEG images. Nothing is carried over between frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct JpegEncoder {
    quality: u8,
}

impl JpegEncoder {
    pub(crate) const DEFAULT_QUALITY: u8 = 75;

    /// Quality is clamped to 1-100.
    pub(crate) fn new(quality: u8) -> Self {
        Self {
            quality: quality.max(1).min(100),
        }
    }

    pub(crate) fn quality(&self) -> u8 {
        self.quality
    }

    pub(crate) fn encode(&self, frame: &Frame) -> Result<Bytes, EncodeError> {
        let (width, height) = frame.dimensions();
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(EncodeError::Dimensions { width, height });
        }
        // JPEG has no alpha channel.
        let opaque;
        let frame = if frame.channels() == Channels::Rgba {
            opaque = frame.to_rgb();
            &opaque
        } else {
            frame
        };
        self.encode_opaque(frame)
    }

    #[cfg(not(feature = "mozjpeg"))]
    fn encode_opaque(&self, frame: &Frame) -> Result<Bytes, EncodeError> {
        trace!(quality = self.quality, "using image crate to encode JPEG image");
        let color_type = match frame.channels() {
            Channels::Gray => ColorType::L8,
            _ => ColorType::Rgb8,
        };
        let mut jpeg_buf = BytesMut::new().writer();
        let mut encoder = ImageJpegEncoder::new_with_quality(&mut jpeg_buf, self.quality);
        encoder.encode(frame.data(), frame.width(), frame.height(), color_type)?;
        Ok(jpeg_buf.into_inner().freeze())
    }

    #[cfg(feature = "mozjpeg")]
    fn encode_opaque(&self, frame: &Frame) -> Result<Bytes, EncodeError> {
        trace!(quality = self.quality, "using mozjpeg to encode JPEG image");
        let (input, output) = match frame.channels() {
            Channels::Gray => (ColorSpace::JCS_GRAYSCALE, ColorSpace::JCS_GRAYSCALE),
            _ => (ColorSpace::JCS_RGB, ColorSpace::JCS_YCbCr),
        };
        let mut jpeg_encoder = Compress::new(input);
        jpeg_encoder.set_color_space(output);
        jpeg_encoder.set_fastest_defaults();
        jpeg_encoder.set_quality(f32::from(self.quality));
        jpeg_encoder.set_mem_dest();
        jpeg_encoder.set_size(frame.width() as usize, frame.height() as usize);
        jpeg_encoder.start_compress();
        if !jpeg_encoder.write_scanlines(frame.data()) {
            return Err(EncodeError::Mozjpeg);
        }
        jpeg_encoder.finish_compress();
        jpeg_encoder
            .data_to_vec()
            .map(Bytes::from)
            .map_err(|_| EncodeError::Mozjpeg)
    }
}

impl Default for JpegEncoder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_QUALITY)
    }
}

#[cfg(test)]
mod jpeg_test {
    use image::ImageFormat;

    use super::JpegEncoder;
    use crate::frame::{Frame, Source};

    fn decode(jpeg: &[u8]) -> image::DynamicImage {
        image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg).unwrap()
    }

    #[test]
    fn encodes_rgb() {
        let frame = Frame::solid(16, 8, &[200, 100, 50], Source::Composite).unwrap();
        let jpeg = JpegEncoder::default().encode(&frame).unwrap();
        // SOI marker
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = decode(&jpeg).to_rgb8();
        assert_eq!(decoded.dimensions(), (16, 8));
        let pixel = decoded.get_pixel(8, 4);
        for (actual, expected) in pixel.0.iter().zip(&[200u8, 100, 50]) {
            assert!((*actual as i16 - *expected as i16).abs() < 8);
        }
    }

    #[test]
    fn encodes_gray_and_rgba() {
        let gray = Frame::solid(8, 8, &[42], Source::Thermal).unwrap();
        let decoded = decode(&JpegEncoder::default().encode(&gray).unwrap());
        assert_eq!(decoded.to_luma8().dimensions(), (8, 8));
        let rgba = Frame::solid(8, 8, &[1, 2, 3, 0], Source::Thermal).unwrap();
        let decoded = decode(&JpegEncoder::default().encode(&rgba).unwrap());
        assert_eq!(decoded.to_rgb8().dimensions(), (8, 8));
    }

    #[test]
    fn quality_is_clamped() {
        assert_eq!(JpegEncoder::new(0).quality(), 1);
        assert_eq!(JpegEncoder::new(250).quality(), 100);
        assert_eq!(JpegEncoder::default().quality(), 75);
    }

    #[test]
    fn stateless() {
        let encoder = JpegEncoder::new(90);
        let frame = Frame::solid(10, 10, &[9, 99, 199], Source::Composite).unwrap();
        let first = encoder.encode(&frame).unwrap();
        let other = Frame::solid(20, 4, &[0, 0, 0], Source::Composite).unwrap();
        encoder.encode(&other).unwrap();
        assert_eq!(encoder.encode(&frame).unwrap(), first);
    }

    #[test]
    fn too_wide() {
        let frame = Frame::solid(70_000, 1, &[0], Source::Composite).unwrap();
        assert!(JpegEncoder::default().encode(&frame).is_err());
    }
}

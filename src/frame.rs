// SPDX-License-Identifier: GPL-3.0-or-later
use std::convert::TryFrom;
use std::error::Error as StdError;
use std::fmt;
use std::time::SystemTime;

use image::{imageops, GrayImage, RgbImage, RgbaImage};

/// Apply the same expression to whichever kind of image is inside a [`FrameImage`], keeping the
/// variant.
macro_rules! map_frame_image {
    ($image:expr, $inner:ident => $body:expr) => {
        match $image {
            $crate::frame::FrameImage::Gray($inner) => $crate::frame::FrameImage::Gray($body),
            $crate::frame::FrameImage::Rgb($inner) => $crate::frame::FrameImage::Rgb($body),
            $crate::frame::FrameImage::Rgba($inner) => $crate::frame::FrameImage::Rgba($body),
        }
    };
}

/// Which sensor (or stage) a frame came from.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) enum Source {
    Visible,
    Thermal,
    Composite,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Source::Visible => "visible",
            Source::Thermal => "thermal",
            Source::Composite => "composite",
        })
    }
}

/// The pixel layout of a frame. The discriminant is the number of bytes per pixel.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) enum Channels {
    Gray = 1,
    Rgb = 3,
    Rgba = 4,
}

impl Channels {
    pub(crate) fn count(self) -> usize {
        self as usize
    }
}

impl TryFrom<usize> for Channels {
    type Error = FrameError;

    fn try_from(count: usize) -> Result<Self, Self::Error> {
        match count {
            1 => Ok(Self::Gray),
            3 => Ok(Self::Rgb),
            4 => Ok(Self::Rgba),
            _ => Err(FrameError::UnsupportedChannels(count)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum FrameError {
    /// A frame must have at least one pixel.
    EmptyDimensions { width: u32, height: u32 },

    /// The pixel buffer doesn't match `width * height * channels`.
    BufferSize { expected: usize, actual: usize },

    UnsupportedChannels(usize),

    /// A requested region doesn't fit inside the frame.
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::EmptyDimensions { width, height } => {
                write!(f, "frame dimensions {}x{} are empty", width, height)
            }
            FrameError::BufferSize { expected, actual } => write!(
                f,
                "frame buffer is {} bytes, expected {} bytes",
                actual, expected
            ),
            FrameError::UnsupportedChannels(count) => {
                write!(f, "{} channels per pixel is not supported", count)
            }
            FrameError::OutOfBounds {
                x,
                y,
                width,
                height,
            } => write!(
                f,
                "region {}x{} at ({}, {}) is outside of the frame",
                width, height, x, y
            ),
        }
    }
}

impl StdError for FrameError {}

/// An image buffer from the [`image`] crate, tagged with its pixel layout.
#[derive(Clone, Debug)]
pub(crate) enum FrameImage {
    Gray(GrayImage),
    Rgb(RgbImage),
    Rgba(RgbaImage),
}

impl FrameImage {
    pub(crate) fn dimensions(&self) -> (u32, u32) {
        match self {
            FrameImage::Gray(image) => image.dimensions(),
            FrameImage::Rgb(image) => image.dimensions(),
            FrameImage::Rgba(image) => image.dimensions(),
        }
    }
}

/// A single image from one of the sensors, or a composite of both.
///
/// The buffer is tightly packed, row-major, with `channels` bytes per pixel. A `Frame` always has
/// at least one pixel and its buffer length always matches its dimensions.
///
/// False-color frames also keep the gray levels their colors were mapped from. Those follow the
/// pixels through every crop, flip, rotation, resize and warp.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Frame {
    width: u32,
    height: u32,
    channels: Channels,
    data: Vec<u8>,
    levels: Option<GrayImage>,
    captured_at: SystemTime,
    source: Source,
}

impl Frame {
    pub(crate) fn new(
        width: u32,
        height: u32,
        channels: Channels,
        data: Vec<u8>,
        source: Source,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyDimensions { width, height });
        }
        let expected = width as usize * height as usize * channels.count();
        if data.len() != expected {
            return Err(FrameError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
            levels: None,
            captured_at: SystemTime::now(),
            source,
        })
    }

    /// Create a frame where every pixel has the same value. The number of channels is taken from
    /// the length of `pixel`.
    pub(crate) fn solid(
        width: u32,
        height: u32,
        pixel: &[u8],
        source: Source,
    ) -> Result<Self, FrameError> {
        let channels = Channels::try_from(pixel.len())?;
        let pixel_count = width as usize * height as usize;
        let data = pixel
            .iter()
            .copied()
            .cycle()
            .take(pixel_count * pixel.len())
            .collect();
        Self::new(width, height, channels, data, source)
    }

    pub(crate) fn from_image(image: FrameImage, source: Source) -> Result<Self, FrameError> {
        let (width, height) = image.dimensions();
        let (channels, data) = match image {
            FrameImage::Gray(image) => (Channels::Gray, image.into_raw()),
            FrameImage::Rgb(image) => (Channels::Rgb, image.into_raw()),
            FrameImage::Rgba(image) => (Channels::Rgba, image.into_raw()),
        };
        Self::new(width, height, channels, data, source)
    }

    /// Keep the capture time (and source) of `self`, but replace the pixels and levels.
    pub(crate) fn transformed(
        &self,
        image: FrameImage,
        levels: Option<GrayImage>,
    ) -> Result<Self, FrameError> {
        let frame = Self::from_image(image, self.source)?.captured_at(self.captured_at);
        match levels {
            Some(levels) => frame.with_levels(levels),
            None => Ok(frame),
        }
    }

    pub(crate) fn captured_at(mut self, timestamp: SystemTime) -> Self {
        self.captured_at = timestamp;
        self
    }

    /// Attach the gray levels this frame's colors were mapped from.
    pub(crate) fn with_levels(mut self, levels: GrayImage) -> Result<Self, FrameError> {
        if levels.dimensions() != self.dimensions() {
            return Err(FrameError::BufferSize {
                expected: self.pixel_count(),
                actual: levels.as_raw().len(),
            });
        }
        self.levels = Some(levels);
        Ok(self)
    }

    /// Apply a geometric operation to the attached levels, if there are any.
    pub(crate) fn map_levels<F>(&self, op: F) -> Option<GrayImage>
    where
        F: FnOnce(&GrayImage) -> GrayImage,
    {
        self.levels.as_ref().map(op)
    }

    pub(crate) fn width(&self) -> u32 {
        self.width
    }

    pub(crate) fn height(&self) -> u32 {
        self.height
    }

    pub(crate) fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub(crate) fn channels(&self) -> Channels {
        self.channels
    }

    pub(crate) fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn timestamp(&self) -> SystemTime {
        self.captured_at
    }

    pub(crate) fn source(&self) -> Source {
        self.source
    }

    pub(crate) fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// The bytes for the pixel at the given coordinates.
    pub(crate) fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let stride = self.channels.count();
        let start = (y as usize * self.width as usize + x as usize) * stride;
        &self.data[start..start + stride]
    }

    pub(crate) fn to_image(&self) -> FrameImage {
        self.clone().into_image()
    }

    pub(crate) fn into_image(self) -> FrameImage {
        // The length was checked on construction, so from_raw cannot fail.
        let (width, height) = (self.width, self.height);
        match self.channels {
            Channels::Gray => FrameImage::Gray(
                GrayImage::from_raw(width, height, self.data)
                    .unwrap_or_else(|| GrayImage::new(width, height)),
            ),
            Channels::Rgb => FrameImage::Rgb(
                RgbImage::from_raw(width, height, self.data)
                    .unwrap_or_else(|| RgbImage::new(width, height)),
            ),
            Channels::Rgba => FrameImage::Rgba(
                RgbaImage::from_raw(width, height, self.data)
                    .unwrap_or_else(|| RgbaImage::new(width, height)),
            ),
        }
    }

    /// Convert to 3-channel RGB. Alpha is dropped, gray is replicated.
    pub(crate) fn to_rgb(&self) -> Frame {
        let data = match self.channels {
            Channels::Rgb => self.data.clone(),
            Channels::Gray => self.data.iter().flat_map(|&v| [v, v, v]).collect(),
            Channels::Rgba => self
                .data
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
        };
        self.with_pixels(Channels::Rgb, data)
    }

    /// Per-pixel intensity.
    ///
    /// False-color frames report the levels they were colored from. Otherwise gray frames are
    /// their own intensity, and color frames use the ITU-R BT.601 luma weights.
    pub(crate) fn intensity(&self) -> Vec<u8> {
        if let Some(levels) = &self.levels {
            return levels.as_raw().clone();
        }
        match self.channels {
            Channels::Gray => self.data.clone(),
            Channels::Rgb | Channels::Rgba => self
                .data
                .chunks_exact(self.channels.count())
                .map(|px| luma(px[0], px[1], px[2]))
                .collect(),
        }
    }

    /// The alpha value of every pixel, if this frame has an alpha channel.
    pub(crate) fn alpha(&self) -> Option<Vec<u8>> {
        match self.channels {
            Channels::Rgba => Some(self.data.chunks_exact(4).map(|px| px[3]).collect()),
            Channels::Gray | Channels::Rgb => None,
        }
    }

    /// Copy out a rectangular region of this frame.
    pub(crate) fn cropped(
        &self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<Frame, FrameError> {
        let fits = x.checked_add(width).map_or(false, |right| right <= self.width)
            && y.checked_add(height).map_or(false, |bottom| bottom <= self.height);
        if !fits {
            return Err(FrameError::OutOfBounds {
                x,
                y,
                width,
                height,
            });
        }
        let cropped = map_frame_image!(
            self.to_image(),
            image => imageops::crop_imm(&image, x, y, width, height).to_image()
        );
        let levels =
            self.map_levels(|levels| imageops::crop_imm(levels, x, y, width, height).to_image());
        self.transformed(cropped, levels)
    }

    pub(crate) fn flipped_horizontal(&self) -> Result<Frame, FrameError> {
        let flipped = map_frame_image!(self.to_image(), image => {
            let mut image = image;
            imageops::flip_horizontal_in_place(&mut image);
            image
        });
        self.transformed(flipped, self.map_levels(|levels| imageops::flip_horizontal(levels)))
    }

    pub(crate) fn flipped_vertical(&self) -> Result<Frame, FrameError> {
        let flipped = map_frame_image!(self.to_image(), image => {
            let mut image = image;
            imageops::flip_vertical_in_place(&mut image);
            image
        });
        self.transformed(flipped, self.map_levels(|levels| imageops::flip_vertical(levels)))
    }

    /// Rotate clockwise by a multiple of 90 degrees.
    pub(crate) fn rotated(&self, quarter_turns: u8) -> Result<Frame, FrameError> {
        let (rotated, levels) = match quarter_turns % 4 {
            0 => return Ok(self.clone()),
            1 => (
                map_frame_image!(self.to_image(), image => imageops::rotate90(&image)),
                self.map_levels(|levels| imageops::rotate90(levels)),
            ),
            2 => (
                map_frame_image!(self.to_image(), image => imageops::rotate180(&image)),
                self.map_levels(|levels| imageops::rotate180(levels)),
            ),
            _ => (
                map_frame_image!(self.to_image(), image => imageops::rotate270(&image)),
                self.map_levels(|levels| imageops::rotate270(levels)),
            ),
        };
        self.transformed(rotated, levels)
    }

    /// Same dimensions and metadata, different pixel layout. Callers guarantee `data` matches.
    fn with_pixels(&self, channels: Channels, data: Vec<u8>) -> Frame {
        Frame {
            width: self.width,
            height: self.height,
            channels,
            data,
            levels: self.levels.clone(),
            captured_at: self.captured_at,
            source: self.source,
        }
    }
}

/// ITU-R BT.601 luma, rounded to the nearest integer.
pub(crate) fn luma(red: u8, green: u8, blue: u8) -> u8 {
    let weighted = 299 * red as u32 + 587 * green as u32 + 114 * blue as u32;
    ((weighted + 500) / 1000) as u8
}

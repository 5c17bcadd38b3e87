// SPDX-License-Identifier: GPL-3.0-or-later
use std::error::Error as StdError;
use std::fmt;

use image::imageops;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::frame::{Frame, FrameError};

/// Different resizing methods
#[derive(Copy, Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Method {
    /// Nearest neighbor sampling.
    Nearest,

    /// Triangle (aka linear) sampling.
    #[serde(alias = "linear")]
    Triangle,

    /// Catmull-Rom (aka bicubic) sampling.
    #[serde(alias = "bicubic")]
    CatmullRom,

    /// Lanczos sampling with a window size of 3.
    #[serde(alias = "lanczos")]
    Lanczos3,
}

impl Default for Method {
    fn default() -> Self {
        Self::CatmullRom
    }
}

impl From<Method> for imageops::FilterType {
    fn from(method: Method) -> Self {
        match method {
            Method::Nearest => imageops::Nearest,
            Method::Triangle => imageops::Triangle,
            Method::CatmullRom => imageops::CatmullRom,
            Method::Lanczos3 => imageops::Lanczos3,
        }
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum ResizeError {
    /// Resizing to zero width or height.
    EmptyTarget { width: u32, height: u32 },

    /// The resized pixels didn't make a valid frame.
    Frame(FrameError),
}

impl fmt::Display for ResizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResizeError::EmptyTarget { width, height } => {
                write!(f, "Unable to resize to {}x{}", width, height)
            }
            ResizeError::Frame(err) => err.fmt(f),
        }
    }
}

impl StdError for ResizeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ResizeError::EmptyTarget { .. } => None,
            ResizeError::Frame(err) => Some(err),
        }
    }
}

impl From<FrameError> for ResizeError {
    fn from(err: FrameError) -> Self {
        Self::Frame(err)
    }
}

/// Resample a frame to the given size. Frames that are already that size are returned unchanged.
pub(crate) fn resize_frame(
    frame: &Frame,
    width: u32,
    height: u32,
    method: Method,
) -> Result<Frame, ResizeError> {
    if width == 0 || height == 0 {
        return Err(ResizeError::EmptyTarget { width, height });
    }
    if frame.dimensions() == (width, height) {
        return Ok(frame.clone());
    }
    trace!(
        source_width = frame.width(),
        source_height = frame.height(),
        width,
        height,
        ?method,
        "resizing frame"
    );
    let filter_type = imageops::FilterType::from(method);
    let resized = map_frame_image!(
        frame.to_image(),
        image => imageops::resize(&image, width, height, filter_type)
    );
    let levels = frame.map_levels(|levels| imageops::resize(levels, width, height, filter_type));
    Ok(frame.transformed(resized, levels)?)
}

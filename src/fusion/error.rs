// SPDX-License-Identifier: GPL-3.0-or-later
use std::error::Error as StdError;
use std::fmt;

use crate::frame::FrameError;
use crate::render::ResizeError;

/// Reasons a composite couldn't be made (or a fusion setting was rejected).
#[derive(Debug, PartialEq)]
pub(crate) enum FusionError {
    /// At least one of the sensors hasn't produced a frame yet.
    NotReady,

    /// The crop margins leave nothing of the visible frame, or run past its edges.
    InvalidCrop {
        top: u32,
        bottom: u32,
        left: u32,
        right: u32,
        width: u32,
        height: u32,
    },

    /// A transform that can't be applied (not finite, or not invertible).
    InvalidTransform(String),

    /// Blend parameters out of range.
    InvalidPolicy(String),

    /// The output canvas can't hold the requested layout.
    InvalidCanvas { width: u32, height: u32 },

    Resize(ResizeError),

    Frame(FrameError),
}

impl fmt::Display for FusionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FusionError::NotReady => f.write_str("both sensors need a frame before compositing"),
            FusionError::InvalidCrop {
                top,
                bottom,
                left,
                right,
                width,
                height,
            } => write!(
                f,
                "crop (top {}, bottom {}, left {}, right {}) does not fit a {}x{} frame",
                top, bottom, left, right, width, height
            ),
            FusionError::InvalidTransform(msg) => write!(f, "invalid alignment: {}", msg),
            FusionError::InvalidPolicy(msg) => write!(f, "invalid blend policy: {}", msg),
            FusionError::InvalidCanvas { width, height } => {
                write!(f, "a {}x{} canvas is too small", width, height)
            }
            FusionError::Resize(err) => err.fmt(f),
            FusionError::Frame(err) => err.fmt(f),
        }
    }
}

impl StdError for FusionError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            FusionError::Resize(err) => Some(err),
            FusionError::Frame(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResizeError> for FusionError {
    fn from(err: ResizeError) -> Self {
        Self::Resize(err)
    }
}

impl From<FrameError> for FusionError {
    fn from(err: FrameError) -> Self {
        Self::Frame(err)
    }
}

// SPDX-License-Identifier: GPL-3.0-or-later
use std::convert::TryFrom;
use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context as _};
use linux_embedded_hal::I2cdev;
use serde::de::{Deserialize, Deserializer, Error};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::frame::{Frame, FrameError};
use crate::temperature::Temperature;

use super::error::SensorError;
use super::i2c::Bus;
use super::mock_camera::{MockThermalCamera, MockVisibleCamera, RepeatMode};
use super::thermal_camera::{self, ThermalCamera};
use super::visible_camera::VisibleCamera;

// This enum is purely used to restrict the acceptable values for rotation.
#[derive(Clone, Copy, Deserialize_repr, Serialize_repr, PartialEq, Debug)]
#[repr(u16)]
pub(crate) enum Rotation {
    Zero = 0,
    Ninety = 90,
    OneEighty = 180,
    TwoSeventy = 270,
}

impl Default for Rotation {
    fn default() -> Self {
        Self::Zero
    }
}

impl Rotation {
    fn quarter_turns(self) -> u8 {
        (self as u16 / 90) as u8
    }
}

/// Orientation fixes applied to every frame a camera produces.
#[derive(Clone, Copy, Default, Debug, PartialEq, serde::Deserialize)]
pub(crate) struct CommonCameraSettings {
    #[serde(default)]
    pub(crate) rotation: Rotation,

    #[serde(default)]
    pub(crate) flip_horizontal: bool,

    #[serde(default)]
    pub(crate) flip_vertical: bool,
}

impl CommonCameraSettings {
    /// Flip, then rotate.
    pub(crate) fn orient(&self, frame: Frame) -> Result<Frame, FrameError> {
        let frame = if self.flip_horizontal {
            frame.flipped_horizontal()?
        } else {
            frame
        };
        let frame = if self.flip_vertical {
            frame.flipped_vertical()?
        } else {
            frame
        };
        match self.rotation {
            Rotation::Zero => Ok(frame),
            rotation => frame.rotated(rotation.quarter_turns()),
        }
    }
}

struct TryFromNum<U>(PhantomData<U>);

impl<U> TryFromNum<U> {
    pub(super) fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<U>,
        <T as TryFrom<U>>::Error: fmt::Display,
        U: Deserialize<'de>,
    {
        let value: U = U::deserialize(deserializer)?;
        T::try_from(value).map_err(D::Error::custom)
    }
}

type TryFromF32 = TryFromNum<f32>;

fn default_mlx_address() -> u8 {
    0x33
}

fn default_mlx_frame_rate() -> mlx9064x::FrameRate {
    mlx9064x::FrameRate::Eight
}

fn default_thermal_frame_rate() -> f32 {
    8.0
}

#[derive(Clone, Debug, serde::Deserialize, PartialEq)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub(crate) enum ThermalSettings {
    Mlx90640 {
        bus: Bus,

        #[serde(default = "default_mlx_address")]
        address: u8,

        #[serde(default = "default_mlx_frame_rate", with = "TryFromF32")]
        frame_rate: mlx9064x::FrameRate,

        #[serde(flatten)]
        common: CommonCameraSettings,
    },
    /// Play back a recording from `path`, or report `uniform` everywhere.
    Mock {
        #[serde(default)]
        path: Option<PathBuf>,

        #[serde(default)]
        uniform: Option<Temperature>,

        #[serde(default)]
        repeat_mode: RepeatMode,

        #[serde(default = "default_thermal_frame_rate")]
        frame_rate: f32,

        #[serde(flatten)]
        common: CommonCameraSettings,
    },
}

impl ThermalSettings {
    pub(crate) fn common(&self) -> &CommonCameraSettings {
        match self {
            Self::Mlx90640 { common, .. } => common,
            Self::Mock { common, .. } => common,
        }
    }

    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if let Self::Mock {
            path,
            uniform,
            frame_rate,
            ..
        } = self
        {
            if !(*frame_rate > 0.0 && frame_rate.is_finite()) {
                bail!("thermal.frame_rate must be positive, not {}", frame_rate);
            }
            match (path, uniform) {
                (Some(_), Some(_)) => bail!("thermal.path and thermal.uniform are exclusive"),
                (None, None) => bail!("a mock thermal camera needs either path or uniform"),
                (None, Some(uniform)) if !uniform.is_finite() => {
                    bail!("thermal.uniform must be a finite temperature")
                }
                _ => (),
            }
        }
        Ok(())
    }

    pub(crate) fn create_camera(&self) -> Result<Box<dyn ThermalCamera + Send>, SensorError> {
        Ok(match self {
            Self::Mlx90640 {
                bus,
                address,
                frame_rate,
                ..
            } => {
                let i2c_bus = I2cdev::try_from(bus)
                    .with_context(|| format!("Unable to open I2C bus {}", bus))
                    .map_err(SensorError::Fatal)?;
                Box::new(thermal_camera::Mlx90640::new(
                    i2c_bus,
                    *address,
                    f32::from(*frame_rate),
                )?)
            }
            Self::Mock {
                path: Some(path),
                repeat_mode,
                frame_rate,
                ..
            } => Box::new(
                MockThermalCamera::from_path(path, *repeat_mode, *frame_rate)
                    .map_err(SensorError::Fatal)?,
            ),
            Self::Mock {
                uniform: Some(uniform),
                frame_rate,
                ..
            } => Box::new(
                MockThermalCamera::uniform(uniform.in_celsius(), *frame_rate)
                    .map_err(SensorError::Fatal)?,
            ),
            Self::Mock { .. } => {
                return Err(SensorError::Fatal(anyhow!(
                    "mock thermal camera has no data source"
                )))
            }
        })
    }
}

#[cfg(feature = "v4l2")]
fn default_video_device() -> PathBuf {
    PathBuf::from("/dev/video0")
}

fn default_visible_width() -> u32 {
    640
}

fn default_visible_height() -> u32 {
    480
}

fn default_visible_frame_rate() -> u32 {
    30
}

fn default_mock_color() -> [u8; 3] {
    [128, 128, 128]
}

#[derive(Clone, Debug, serde::Deserialize, PartialEq)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub(crate) enum VisibleSettings {
    #[cfg(feature = "v4l2")]
    V4l2 {
        #[serde(default = "default_video_device")]
        device: PathBuf,

        #[serde(default = "default_visible_width")]
        width: u32,

        #[serde(default = "default_visible_height")]
        height: u32,

        #[serde(default = "default_visible_frame_rate")]
        frame_rate: u32,

        #[serde(flatten)]
        common: CommonCameraSettings,
    },
    /// A solid color, for running without a camera.
    Mock {
        #[serde(default = "default_visible_width")]
        width: u32,

        #[serde(default = "default_visible_height")]
        height: u32,

        #[serde(default = "default_mock_color")]
        color: [u8; 3],

        #[serde(default = "default_visible_frame_rate")]
        frame_rate: u32,

        #[serde(flatten)]
        common: CommonCameraSettings,
    },
}

impl VisibleSettings {
    pub(crate) fn common(&self) -> &CommonCameraSettings {
        match self {
            #[cfg(feature = "v4l2")]
            Self::V4l2 { common, .. } => common,
            Self::Mock { common, .. } => common,
        }
    }

    fn dimensions_and_rate(&self) -> (u32, u32, u32) {
        match self {
            #[cfg(feature = "v4l2")]
            Self::V4l2 {
                width,
                height,
                frame_rate,
                ..
            } => (*width, *height, *frame_rate),
            Self::Mock {
                width,
                height,
                frame_rate,
                ..
            } => (*width, *height, *frame_rate),
        }
    }

    /// The size of the frames after rotation.
    pub(crate) fn output_dimensions(&self) -> (u32, u32) {
        let (width, height, _) = self.dimensions_and_rate();
        if self.common().rotation.quarter_turns() % 2 == 1 {
            (height, width)
        } else {
            (width, height)
        }
    }

    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        let (width, height, frame_rate) = self.dimensions_and_rate();
        if width == 0 || height == 0 {
            bail!("visible camera size {}x{} is empty", width, height);
        }
        if frame_rate == 0 {
            bail!("visible.frame_rate must be positive");
        }
        Ok(())
    }

    pub(crate) fn create_camera(&self) -> Result<Box<dyn VisibleCamera + Send>, SensorError> {
        Ok(match self {
            #[cfg(feature = "v4l2")]
            Self::V4l2 {
                device,
                width,
                height,
                frame_rate,
                ..
            } => Box::new(super::visible_camera::V4l2Camera::new(
                device,
                *width,
                *height,
                *frame_rate,
            )?),
            Self::Mock {
                width,
                height,
                color,
                frame_rate,
                ..
            } => Box::new(
                MockVisibleCamera::new(*width, *height, *color, *frame_rate as f32)
                    .map_err(SensorError::Fatal)?,
            ),
        })
    }
}

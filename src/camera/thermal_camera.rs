// SPDX-License-Identifier: GPL-3.0-or-later
use std::convert::TryFrom;
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, Context as _};
use embedded_hal::blocking::i2c;
use tracing::debug;

use super::error::SensorError;

/// One reading from a thermal camera: 24 rows of 32 temperatures in degrees Celsius, row-major.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ThermalSample {
    values: Vec<f32>,
}

impl ThermalSample {
    pub(crate) const ROWS: usize = 24;
    pub(crate) const COLUMNS: usize = 32;
    pub(crate) const LEN: usize = Self::ROWS * Self::COLUMNS;

    /// Every pixel at the same temperature.
    pub(crate) fn uniform(celsius: f32) -> Result<Self, MalformedSample> {
        Self::try_from(vec![celsius; Self::LEN])
    }

    pub(crate) fn width(&self) -> u32 {
        Self::COLUMNS as u32
    }

    pub(crate) fn height(&self) -> u32 {
        Self::ROWS as u32
    }

    pub(crate) fn values(&self) -> &[f32] {
        &self.values
    }

    pub(crate) fn min(&self) -> f32 {
        self.values.iter().copied().fold(f32::INFINITY, f32::min)
    }

    pub(crate) fn max(&self) -> f32 {
        self.values.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    pub(crate) fn mean(&self) -> f32 {
        self.values.iter().sum::<f32>() / self.values.len() as f32
    }
}

/// A thermal reading with the wrong number of values, or values that aren't numbers.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum MalformedSample {
    Length(usize),
    NotFinite { index: usize },
}

impl fmt::Display for MalformedSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedSample::Length(len) => write!(
                f,
                "thermal reading has {} values, expected {}",
                len,
                ThermalSample::LEN
            ),
            MalformedSample::NotFinite { index } => {
                write!(f, "thermal reading value {} is not finite", index)
            }
        }
    }
}

impl StdError for MalformedSample {}

impl TryFrom<Vec<f32>> for ThermalSample {
    type Error = MalformedSample;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        if values.len() != Self::LEN {
            return Err(MalformedSample::Length(values.len()));
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(MalformedSample::NotFinite { index });
        }
        Ok(Self { values })
    }
}

impl From<MalformedSample> for SensorError {
    fn from(err: MalformedSample) -> Self {
        SensorError::transient(err)
    }
}

/// The operations a thermal camera needs to provide to be fused with a visible camera.
pub(crate) trait ThermalCamera {
    /// Read one grid of temperatures from the camera.
    fn measure(&mut self) -> Result<ThermalSample, SensorError>;

    /// How long to wait between measurements.
    fn frame_delay(&self) -> Duration;
}

/// A Melexis MLX90640 connected over I2C.
#[derive(Debug)]
pub(crate) struct Mlx90640<I2C> {
    camera: mlx9064x::Mlx90640Driver<I2C>,
    temperature_buffer: Vec<f32>,
    frame_delay: Duration,
}

impl<I2C> Mlx90640<I2C>
where
    I2C: 'static + i2c::WriteRead + i2c::Write,
    <I2C as i2c::WriteRead>::Error: 'static + StdError + Sync + Send,
    <I2C as i2c::Write>::Error: 'static + StdError + Sync + Send,
{
    /// Connect to the camera and set its frame rate. Any failure here is fatal.
    pub(crate) fn new(bus: I2C, address: u8, frame_rate: f32) -> Result<Self, SensorError> {
        let mut camera = mlx9064x::Mlx90640Driver::new(bus, address)
            .map_err(anyhow::Error::from)
            .context("Unable to initialize MLX90640")
            .map_err(SensorError::Fatal)?;
        let mlx_frame_rate = mlx9064x::FrameRate::try_from(frame_rate)
            .map_err(|_| anyhow!("{} is not a valid MLX90640 frame rate", frame_rate))
            .map_err(SensorError::Fatal)?;
        camera
            .set_frame_rate(mlx_frame_rate)
            .map_err(anyhow::Error::from)
            .context("Error setting camera frame rate")
            .map_err(SensorError::Fatal)?;
        let num_pixels = camera.height() * camera.width();
        debug!(
            width = camera.width(),
            height = camera.height(),
            frame_rate,
            "connected to MLX90640"
        );
        Ok(Self {
            camera,
            temperature_buffer: vec![0f32; num_pixels],
            frame_delay: Duration::from_secs_f32(1.0 / frame_rate),
        })
    }
}

impl<I2C> ThermalCamera for Mlx90640<I2C>
where
    I2C: 'static + i2c::WriteRead + i2c::Write,
    <I2C as i2c::WriteRead>::Error: 'static + StdError + Sync + Send,
    <I2C as i2c::Write>::Error: 'static + StdError + Sync + Send,
{
    fn measure(&mut self) -> Result<ThermalSample, SensorError> {
        let ready = self
            .camera
            .generate_image_if_ready(&mut self.temperature_buffer)
            .map_err(SensorError::transient)?;
        if !ready {
            return Err(SensorError::NotReady);
        }
        // mlx9064x uses row-major ordering, so the buffer is already laid out the right way.
        Ok(ThermalSample::try_from(self.temperature_buffer.clone())?)
    }

    fn frame_delay(&self) -> Duration {
        self.frame_delay
    }
}

#[cfg(test)]
mod thermal_camera_test {
    use std::convert::TryFrom;

    use float_cmp::{approx_eq, F32Margin};

    use super::{MalformedSample, ThermalSample};
    use crate::camera::error::SensorError;

    #[test]
    fn wrong_length() {
        assert_eq!(
            ThermalSample::try_from(vec![20.0; 64]),
            Err(MalformedSample::Length(64))
        );
    }

    #[test]
    fn not_finite() {
        let mut values = vec![20.0; ThermalSample::LEN];
        values[100] = f32::NAN;
        assert_eq!(
            ThermalSample::try_from(values),
            Err(MalformedSample::NotFinite { index: 100 })
        );
    }

    #[test]
    fn malformed_is_transient() {
        let err: SensorError = MalformedSample::Length(0).into();
        assert!(matches!(err, SensorError::Transient(_)));
    }

    #[test]
    fn statistics() {
        let values: Vec<f32> = (0..ThermalSample::LEN)
            .map(|i| (i % 2) as f32 * 10.0 + 20.0)
            .collect();
        let sample = ThermalSample::try_from(values).unwrap();
        assert_eq!(sample.min(), 20.0);
        assert_eq!(sample.max(), 30.0);
        assert!(approx_eq!(f32, sample.mean(), 25.0, F32Margin::default()));
        assert_eq!((sample.width(), sample.height()), (32, 24));
    }
}

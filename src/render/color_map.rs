// SPDX-License-Identifier: GPL-3.0-or-later
use image::GrayImage;
use tracing::{instrument, trace};

use crate::camera::ThermalSample;
use crate::frame::{Channels, Frame, FrameError, Source};
use crate::temperature::Temperature;

use super::settings::{Limit, RenderSettings};

/// Turns grids of temperatures into false-color images.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ThermalColorMap {
    lower_limit: Limit,
    upper_limit: Limit,
    gradient: colorous::Gradient,
    transparent_below: Option<Temperature>,
}

impl ThermalColorMap {
    pub(crate) fn new(
        lower_limit: Limit,
        upper_limit: Limit,
        gradient: colorous::Gradient,
        transparent_below: Option<Temperature>,
    ) -> Self {
        Self {
            lower_limit,
            upper_limit,
            gradient,
            transparent_below,
        }
    }

    /// The temperature range for a sample, in Celsius.
    fn range(&self, sample: &ThermalSample) -> (f32, f32) {
        let lower = match self.lower_limit {
            Limit::Dynamic => sample.min(),
            Limit::Static(temperature) => temperature.in_celsius(),
        };
        let upper = match self.upper_limit {
            Limit::Dynamic => sample.max(),
            Limit::Static(temperature) => temperature.in_celsius(),
        };
        (lower, upper)
    }

    /// Scale every temperature to 0-255 across the current range.
    ///
    /// Values outside of a static range are clamped. An empty (or inverted) range maps everything
    /// to 0.
    pub(crate) fn intensities(&self, sample: &ThermalSample) -> Vec<u8> {
        let (lower, upper) = self.range(sample);
        let scale_range = upper - lower;
        sample
            .values()
            .iter()
            .map(|temperature| {
                if scale_range > 0.0 {
                    let scaled = (temperature - lower) / scale_range;
                    (scaled.max(0.0).min(1.0) * 255.0).round() as u8
                } else {
                    0
                }
            })
            .collect()
    }

    /// Whether the whole image should be hidden.
    fn is_transparent(&self, sample: &ThermalSample) -> bool {
        match self.transparent_below {
            Some(threshold) => sample.mean() < threshold.in_celsius(),
            None => false,
        }
    }

    /// Map a sample to colors. The result is RGB, or RGBA when `transparent_below` is set, and
    /// carries the intensities as its levels.
    #[instrument(level = "trace", skip(self, sample))]
    pub(crate) fn render(&self, sample: &ThermalSample) -> Result<Frame, FrameError> {
        let alpha = self.transparent_below.map(|_| {
            if self.is_transparent(sample) {
                u8::MIN
            } else {
                u8::MAX
            }
        });
        let channels = if alpha.is_some() {
            Channels::Rgba
        } else {
            Channels::Rgb
        };
        let intensities = self.intensities(sample);
        let mut data = Vec::with_capacity(intensities.len() * channels.count());
        for &intensity in &intensities {
            let color = self
                .gradient
                .eval_continuous(intensity as f64 / u8::MAX as f64);
            data.extend_from_slice(&color.as_array());
            if let Some(alpha) = alpha {
                data.push(alpha);
            }
        }
        trace!(?alpha, "mapped temperatures to colors");
        let (width, height) = (sample.width(), sample.height());
        let levels_len = intensities.len();
        let levels =
            GrayImage::from_raw(width, height, intensities).ok_or(FrameError::BufferSize {
                expected: width as usize * height as usize,
                actual: levels_len,
            })?;
        Frame::new(width, height, channels, data, Source::Thermal)?.with_levels(levels)
    }
}

impl Default for ThermalColorMap {
    fn default() -> Self {
        Self::from(&RenderSettings::default())
    }
}

impl<'a> From<&'a RenderSettings> for ThermalColorMap {
    fn from(settings: &'a RenderSettings) -> Self {
        Self::new(
            settings.lower_limit,
            settings.upper_limit,
            settings.colors,
            settings.transparent_below,
        )
    }
}

#[cfg(test)]
mod color_map_test {
    use std::convert::TryFrom;

    use super::ThermalColorMap;
    use crate::camera::ThermalSample;
    use crate::frame::{luma, Channels};
    use crate::render::settings::Limit;
    use crate::temperature::Temperature;

    /// Left half at `cold`, right half at `hot`.
    fn split_sample(cold: f32, hot: f32) -> ThermalSample {
        let values: Vec<f32> = (0..ThermalSample::LEN)
            .map(|i| {
                if i % ThermalSample::COLUMNS < ThermalSample::COLUMNS / 2 {
                    cold
                } else {
                    hot
                }
            })
            .collect();
        ThermalSample::try_from(values).unwrap()
    }

    fn gray_map(lower_limit: Limit, upper_limit: Limit) -> ThermalColorMap {
        ThermalColorMap::new(lower_limit, upper_limit, colorous::GREYS, None)
    }

    #[test]
    fn dynamic_range() {
        let map = gray_map(Limit::Dynamic, Limit::Dynamic);
        let intensities = map.intensities(&split_sample(20.0, 30.0));
        assert_eq!(intensities[0], 0);
        assert_eq!(intensities[ThermalSample::COLUMNS - 1], 255);
    }

    #[test]
    fn static_range_clamps() {
        let map = gray_map(
            Limit::Static(Temperature::Celsius(20.0)),
            Limit::Static(Temperature::Celsius(100.0)),
        );
        let intensities = map.intensities(&split_sample(10.0, 60.0));
        assert_eq!(intensities[0], 0);
        // (60 - 20) / 80 * 255 = 127.5
        assert_eq!(intensities[ThermalSample::COLUMNS - 1], 128);
    }

    #[test]
    fn flat_range_is_zero() {
        let map = gray_map(Limit::Dynamic, Limit::Dynamic);
        let sample = ThermalSample::uniform(25.0).unwrap();
        assert!(map.intensities(&sample).iter().all(|v| *v == 0));
    }

    #[test]
    fn renders_rgb() {
        let frame = ThermalColorMap::default()
            .render(&split_sample(20.0, 30.0))
            .unwrap();
        assert_eq!(frame.dimensions(), (32, 24));
        assert_eq!(frame.channels(), Channels::Rgb);
        let turbo_min = colorous::TURBO.eval_continuous(0.0).as_array();
        let turbo_max = colorous::TURBO.eval_continuous(1.0).as_array();
        assert_eq!(frame.pixel(0, 0), &turbo_min);
        assert_eq!(frame.pixel(31, 23), &turbo_max);
    }

    #[test]
    fn keeps_intensities() {
        let map = ThermalColorMap::default();
        let sample = split_sample(25.0, 90.0);
        let frame = map.render(&sample).unwrap();
        assert_eq!(frame.intensity(), map.intensities(&sample));
        // The hottest turbo colors are dark, the levels are not.
        let hot = frame.pixel(31, 0);
        assert!(luma(hot[0], hot[1], hot[2]) < 64);
        assert_eq!(frame.intensity()[ThermalSample::COLUMNS - 1], 255);
    }

    #[test]
    fn transparent_when_cold() {
        let map = ThermalColorMap::new(
            Limit::Dynamic,
            Limit::Dynamic,
            colorous::TURBO,
            Some(Temperature::Celsius(30.0)),
        );
        let cold = map.render(&split_sample(20.0, 30.0)).unwrap();
        assert_eq!(cold.channels(), Channels::Rgba);
        assert!(cold.alpha().unwrap().iter().all(|a| *a == 0));
        let warm = map.render(&split_sample(30.0, 40.0)).unwrap();
        assert!(warm.alpha().unwrap().iter().all(|a| *a == 255));
    }
}

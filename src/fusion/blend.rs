// SPDX-License-Identifier: GPL-3.0-or-later
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::frame::{Channels, Frame, Source};
use crate::render::{resize_frame, Method};
use crate::temperature::Temperature;

use super::error::FusionError;

/// How thermal pixels are mixed into the visible image.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum BlendPolicy {
    /// Every pixel is mixed with the same weight.
    FixedAlpha { alpha: f32 },

    /// Only pixels at least as hot as `threshold_temp` are mixed in, the rest show the visible
    /// image. The temperature range maps thermal intensities back to temperatures. False-color
    /// frames are compared by the levels they were colored from, not by their luma.
    ThresholdMask {
        min_temp: Temperature,
        max_temp: Temperature,
        threshold_temp: Temperature,
        alpha: f32,
    },

    /// The thermal frame's own alpha channel is the weight.
    AlphaChannelOverlay,
}

impl Default for BlendPolicy {
    fn default() -> Self {
        Self::FixedAlpha { alpha: 0.5 }
    }
}

pub(crate) fn validate_alpha(name: &str, alpha: f32) -> Result<(), FusionError> {
    if (0.0..=1.0).contains(&alpha) {
        Ok(())
    } else {
        Err(FusionError::InvalidPolicy(format!(
            "{} must be between 0 and 1, not {}",
            name, alpha
        )))
    }
}

impl BlendPolicy {
    pub(crate) fn validate(&self) -> Result<(), FusionError> {
        match self {
            BlendPolicy::FixedAlpha { alpha } => validate_alpha("alpha", *alpha),
            BlendPolicy::ThresholdMask {
                min_temp,
                max_temp,
                threshold_temp,
                alpha,
            } => {
                validate_alpha("alpha", *alpha)?;
                if !(min_temp.is_finite() && max_temp.is_finite() && threshold_temp.is_finite()) {
                    return Err(FusionError::InvalidPolicy(
                        "temperatures must be finite".to_string(),
                    ));
                }
                if max_temp <= min_temp {
                    return Err(FusionError::InvalidPolicy(format!(
                        "max_temp ({}) must be above min_temp ({})",
                        max_temp, min_temp
                    )));
                }
                Ok(())
            }
            BlendPolicy::AlphaChannelOverlay => Ok(()),
        }
    }

    /// The thermal intensity a pixel needs to reach before [`BlendPolicy::ThresholdMask`] mixes it
    /// in. Always 0 for the other policies.
    pub(crate) fn threshold_pixel(&self) -> u8 {
        match self {
            BlendPolicy::ThresholdMask {
                min_temp,
                max_temp,
                threshold_temp,
                ..
            } => {
                let min = min_temp.in_celsius();
                let range = max_temp.in_celsius() - min;
                let scaled = ((threshold_temp.in_celsius() - min) * 255.0 / range).trunc();
                // `as` saturates, but NaN would become 0 silently
                if scaled.is_nan() {
                    0
                } else {
                    scaled.max(0.0).min(255.0) as u8
                }
            }
            BlendPolicy::FixedAlpha { .. } | BlendPolicy::AlphaChannelOverlay => 0,
        }
    }

    /// The thermal weight for every pixel of `thermal`.
    fn weights(&self, thermal: &Frame, default_alpha: f32) -> Vec<f32> {
        let count = thermal.pixel_count();
        match self {
            BlendPolicy::FixedAlpha { alpha } => vec![*alpha; count],
            BlendPolicy::ThresholdMask { alpha, .. } => {
                let threshold = self.threshold_pixel();
                thermal
                    .intensity()
                    .into_iter()
                    .map(|intensity| if intensity >= threshold { *alpha } else { 0.0 })
                    .collect()
            }
            BlendPolicy::AlphaChannelOverlay => match thermal.alpha() {
                Some(alpha) => alpha
                    .into_iter()
                    .map(|a| f32::from(a) / f32::from(u8::MAX))
                    .collect(),
                None => vec![default_alpha; count],
            },
        }
    }
}

/// Mix a thermal frame into a visible frame.
///
/// The thermal frame is resized to the visible frame's size if needed. Where `coverage` is given,
/// each pixel's weight is scaled by it, so uncovered pixels are the visible image untouched. The
/// result is always RGB.
pub(crate) fn blend(
    visible: &Frame,
    thermal: &Frame,
    coverage: Option<&[u8]>,
    policy: &BlendPolicy,
    default_alpha: f32,
    method: Method,
) -> Result<Frame, FusionError> {
    let (width, height) = visible.dimensions();
    let resized;
    let thermal = if thermal.dimensions() != (width, height) {
        resized = resize_frame(thermal, width, height, method)?;
        &resized
    } else {
        thermal
    };
    let mut weights = policy.weights(thermal, default_alpha);
    if let Some(coverage) = coverage {
        weights
            .iter_mut()
            .zip(coverage)
            .for_each(|(weight, covered)| {
                *weight *= f32::from(*covered) / f32::from(u8::MAX);
            });
    }
    let visible = visible.to_rgb();
    let thermal = thermal.to_rgb();
    let row_len = width as usize * Channels::Rgb.count();
    let mut output = vec![0u8; row_len * height as usize];
    output
        .par_chunks_mut(row_len)
        .zip(visible.data().par_chunks(row_len))
        .zip(thermal.data().par_chunks(row_len))
        .zip(weights.par_chunks(width as usize))
        .for_each(|(((out_row, visible_row), thermal_row), weight_row)| {
            let pixels = out_row
                .chunks_exact_mut(3)
                .zip(visible_row.chunks_exact(3))
                .zip(thermal_row.chunks_exact(3))
                .zip(weight_row);
            for (((out, hd), hot), weight) in pixels {
                for channel in 0..3 {
                    out[channel] = mix(hot[channel], hd[channel], *weight);
                }
            }
        });
    Ok(Frame::new(width, height, Channels::Rgb, output, Source::Composite)?
        .captured_at(visible.timestamp().max(thermal.timestamp())))
}

/// `round(weight * thermal + (1 - weight) * visible)`
fn mix(thermal: u8, visible: u8, weight: f32) -> u8 {
    let mixed = weight * f32::from(thermal) + (1.0 - weight) * f32::from(visible);
    mixed.round().max(0.0).min(255.0) as u8
}

// SPDX-License-Identifier: GPL-3.0-or-later
use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::frame::{Frame, FrameImage};
use crate::render::{resize_frame, Method};

use super::error::FusionError;

/// How the thermal camera's field of view lines up with the visible camera's.
///
/// Matrices are row-major and map thermal pixel coordinates onto canvas pixel coordinates.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum AlignmentModel {
    /// Both images cover the whole canvas.
    Stretch,

    /// The thermal image covers the part of the visible frame left after trimming these margins.
    Crop {
        #[serde(default)]
        top: u32,
        #[serde(default)]
        bottom: u32,
        #[serde(default)]
        left: u32,
        #[serde(default)]
        right: u32,
    },

    /// `canvas = scale * thermal + offset`
    ScaleOffset {
        scale: f32,
        #[serde(default)]
        offset_x: f32,
        #[serde(default)]
        offset_y: f32,
    },

    Affine {
        matrix: [[f32; 3]; 2],
    },

    Homography {
        matrix: [[f32; 3]; 3],
    },
}

impl Default for AlignmentModel {
    fn default() -> Self {
        Self::Stretch
    }
}

/// A visible and thermal frame of identical size, ready to be blended.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Aligned {
    pub(crate) visible: Frame,
    pub(crate) thermal: Frame,
    /// How much of each canvas pixel the thermal image covers (0 = not at all). `None` means
    /// everything is covered.
    pub(crate) coverage: Option<Vec<u8>>,
}

impl AlignmentModel {
    /// The transform as a row-major 3x3 matrix, if this model warps the thermal image.
    fn matrix(&self) -> Option<[f32; 9]> {
        match *self {
            AlignmentModel::Stretch | AlignmentModel::Crop { .. } => None,
            AlignmentModel::ScaleOffset {
                scale,
                offset_x,
                offset_y,
            } => Some([scale, 0.0, offset_x, 0.0, scale, offset_y, 0.0, 0.0, 1.0]),
            AlignmentModel::Affine { matrix: [a, b] } => {
                Some([a[0], a[1], a[2], b[0], b[1], b[2], 0.0, 0.0, 1.0])
            }
            AlignmentModel::Homography { matrix: [a, b, c] } => Some([
                a[0], a[1], a[2], b[0], b[1], b[2], c[0], c[1], c[2],
            ]),
        }
    }

    fn projection(&self) -> Result<Option<Projection>, FusionError> {
        match self.matrix() {
            None => Ok(None),
            Some(matrix) => {
                if !matrix.iter().all(|v| v.is_finite()) {
                    return Err(FusionError::InvalidTransform(
                        "transform values must be finite".to_string(),
                    ));
                }
                Projection::from_matrix(matrix).map(Some).ok_or_else(|| {
                    FusionError::InvalidTransform("transform is not invertible".to_string())
                })
            }
        }
    }

    /// Reject transforms that can never be applied.
    pub(crate) fn validate(&self) -> Result<(), FusionError> {
        if let AlignmentModel::ScaleOffset { scale, .. } = self {
            if !(*scale > 0.0) {
                return Err(FusionError::InvalidTransform(format!(
                    "scale must be positive, not {}",
                    scale
                )));
            }
        }
        self.projection().map(|_| ())
    }

    /// Check that a crop fits inside visible frames of the given size.
    pub(crate) fn validate_for(&self, width: u32, height: u32) -> Result<(), FusionError> {
        self.validate()?;
        if let AlignmentModel::Crop {
            top,
            bottom,
            left,
            right,
        } = *self
        {
            crop_rect(width, height, top, bottom, left, right)?;
        }
        Ok(())
    }

    /// Bring both frames onto the same canvas.
    ///
    /// The canvas defaults to the size of the visible frame (after cropping).
    pub(crate) fn align(
        &self,
        visible: &Frame,
        thermal: &Frame,
        canvas: Option<(u32, u32)>,
        method: Method,
    ) -> Result<Aligned, FusionError> {
        let visible = match *self {
            AlignmentModel::Crop {
                top,
                bottom,
                left,
                right,
            } => crop_margins(visible, top, bottom, left, right)?,
            _ => visible.clone(),
        };
        let (width, height) = canvas.unwrap_or_else(|| visible.dimensions());
        trace!(model = ?self, width, height, "aligning frames");
        let visible = resize_frame(&visible, width, height, method)?;
        match self.projection()? {
            None => Ok(Aligned {
                visible,
                thermal: resize_frame(thermal, width, height, method)?,
                coverage: None,
            }),
            Some(projection) => {
                let (thermal, coverage) = warp_thermal(thermal, &projection, width, height)?;
                Ok(Aligned {
                    visible,
                    thermal,
                    coverage: Some(coverage),
                })
            }
        }
    }
}

/// The part of a `width` x `height` frame left after trimming margins, as `(x, y, width, height)`.
fn crop_rect(
    width: u32,
    height: u32,
    top: u32,
    bottom: u32,
    left: u32,
    right: u32,
) -> Result<(u32, u32, u32, u32), FusionError> {
    let invalid = || FusionError::InvalidCrop {
        top,
        bottom,
        left,
        right,
        width,
        height,
    };
    let cropped_width = width
        .checked_sub(left)
        .and_then(|w| w.checked_sub(right))
        .filter(|w| *w > 0)
        .ok_or_else(invalid)?;
    let cropped_height = height
        .checked_sub(top)
        .and_then(|h| h.checked_sub(bottom))
        .filter(|h| *h > 0)
        .ok_or_else(invalid)?;
    Ok((left, top, cropped_width, cropped_height))
}

fn crop_margins(
    frame: &Frame,
    top: u32,
    bottom: u32,
    left: u32,
    right: u32,
) -> Result<Frame, FusionError> {
    let (width, height) = frame.dimensions();
    let (x, y, cropped_width, cropped_height) = crop_rect(width, height, top, bottom, left, right)?;
    Ok(frame.cropped(x, y, cropped_width, cropped_height)?)
}

/// Warp the thermal frame into canvas space, along with a mask of which canvas pixels it covers.
fn warp_thermal(
    thermal: &Frame,
    projection: &Projection,
    width: u32,
    height: u32,
) -> Result<(Frame, Vec<u8>), FusionError> {
    let interpolation = Interpolation::Bilinear;
    let warped = match thermal.to_image() {
        FrameImage::Gray(image) => {
            let mut out = GrayImage::new(width, height);
            warp_into(&image, projection, interpolation, Luma([0]), &mut out);
            FrameImage::Gray(out)
        }
        FrameImage::Rgb(image) => {
            let mut out = RgbImage::new(width, height);
            warp_into(&image, projection, interpolation, Rgb([0, 0, 0]), &mut out);
            FrameImage::Rgb(out)
        }
        FrameImage::Rgba(image) => {
            let mut out = RgbaImage::new(width, height);
            warp_into(&image, projection, interpolation, Rgba([0, 0, 0, 0]), &mut out);
            FrameImage::Rgba(out)
        }
    };
    let levels = thermal.map_levels(|levels| {
        let mut out = GrayImage::new(width, height);
        warp_into(levels, projection, interpolation, Luma([0]), &mut out);
        out
    });
    let (thermal_width, thermal_height) = thermal.dimensions();
    let full = GrayImage::from_pixel(thermal_width, thermal_height, Luma([u8::MAX]));
    let mut coverage = GrayImage::new(width, height);
    warp_into(&full, projection, interpolation, Luma([0]), &mut coverage);
    Ok((thermal.transformed(warped, levels)?, coverage.into_raw()))
}

#[cfg(test)]
mod alignment_test {
    use image::{GrayImage, Luma};

    use super::{AlignmentModel, FusionError};
    use crate::frame::{Channels, Frame, Source};
    use crate::render::Method;

    fn visible() -> Frame {
        Frame::solid(64, 48, &[200, 200, 200], Source::Visible).unwrap()
    }

    fn thermal() -> Frame {
        Frame::solid(32, 24, &[255, 0, 0], Source::Thermal).unwrap()
    }

    #[test]
    fn stretch_to_visible_size() {
        let aligned = AlignmentModel::Stretch
            .align(&visible(), &thermal(), None, Method::default())
            .unwrap();
        assert_eq!(aligned.visible.dimensions(), (64, 48));
        assert_eq!(aligned.thermal.dimensions(), (64, 48));
        assert_eq!(aligned.coverage, None);
    }

    #[test]
    fn stretch_to_canvas() {
        let aligned = AlignmentModel::Stretch
            .align(&visible(), &thermal(), Some((40, 30)), Method::Nearest)
            .unwrap();
        assert_eq!(aligned.visible.dimensions(), (40, 30));
        assert_eq!(aligned.thermal.dimensions(), (40, 30));
    }

    #[test]
    fn crop_trims_visible() {
        // Each pixel of a 4x4 image is its own index
        let visible =
            Frame::new(4, 4, Channels::Gray, (0..16).collect(), Source::Visible).unwrap();
        let model = AlignmentModel::Crop {
            top: 1,
            bottom: 1,
            left: 1,
            right: 0,
        };
        let aligned = model
            .align(&visible, &thermal(), None, Method::Nearest)
            .unwrap();
        assert_eq!(aligned.visible.dimensions(), (3, 2));
        assert_eq!(aligned.visible.data(), &[5, 6, 7, 9, 10, 11]);
        assert_eq!(aligned.thermal.dimensions(), (3, 2));
    }

    #[test]
    fn crop_too_large() {
        let model = AlignmentModel::Crop {
            top: 0,
            bottom: 0,
            left: 40,
            right: 24,
        };
        let result = model.align(&visible(), &thermal(), None, Method::Nearest);
        assert!(matches!(result, Err(FusionError::InvalidCrop { .. })));
    }

    #[test]
    fn crop_checked_against_size() {
        let model = AlignmentModel::Crop {
            top: 10,
            bottom: 10,
            left: 0,
            right: 0,
        };
        assert_eq!(model.validate_for(64, 48), Ok(()));
        assert!(matches!(
            model.validate_for(64, 20),
            Err(FusionError::InvalidCrop { .. })
        ));
    }

    #[test]
    fn scale_offset_coverage() {
        // Thermal lands in the top-left quarter of the canvas
        let model = AlignmentModel::ScaleOffset {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        };
        let aligned = model
            .align(&visible(), &thermal(), None, Method::Nearest)
            .unwrap();
        let coverage = aligned.coverage.unwrap();
        assert_eq!(coverage.len(), 64 * 48);
        assert_eq!(coverage[0], 255);
        assert_eq!(aligned.thermal.pixel(0, 0), &[255, 0, 0]);
        // Far corner is outside of the thermal image
        assert_eq!(coverage[64 * 48 - 1], 0);
        assert_eq!(aligned.thermal.pixel(63, 47), &[0, 0, 0]);
    }

    #[test]
    fn warp_carries_levels() {
        let model = AlignmentModel::ScaleOffset {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        };
        let levels = GrayImage::from_pixel(32, 24, Luma([230]));
        let thermal = thermal().with_levels(levels).unwrap();
        let aligned = model
            .align(&visible(), &thermal, None, Method::Nearest)
            .unwrap();
        let intensity = aligned.thermal.intensity();
        assert_eq!(intensity.len(), 64 * 48);
        assert_eq!(intensity[0], 230);
        assert_eq!(intensity[64 * 48 - 1], 0);
    }

    #[test]
    fn singular_homography() {
        let model = AlignmentModel::Homography {
            matrix: [[1.0, 2.0, 0.0], [2.0, 4.0, 0.0], [0.0, 0.0, 1.0]],
        };
        assert!(matches!(
            model.validate(),
            Err(FusionError::InvalidTransform(_))
        ));
    }

    #[test]
    fn non_positive_scale() {
        let model = AlignmentModel::ScaleOffset {
            scale: 0.0,
            offset_x: 0.0,
            offset_y: 0.0,
        };
        assert!(model.validate().is_err());
    }

    #[test]
    fn affine_is_valid() {
        let model = AlignmentModel::Affine {
            matrix: [[20.0, 0.0, 5.0], [0.0, 20.0, -3.0]],
        };
        assert_eq!(model.validate(), Ok(()));
    }

    #[test]
    fn idempotent() {
        let model = AlignmentModel::Homography {
            matrix: [[1.9, 0.1, 2.0], [0.05, 2.1, 1.0], [0.0, 0.0005, 1.0]],
        };
        let visible = Frame::new(
            16,
            12,
            Channels::Rgb,
            (0..16 * 12 * 3).map(|v| (v % 251) as u8).collect(),
            Source::Visible,
        )
        .unwrap();
        let thermal = Frame::new(
            8,
            6,
            Channels::Rgb,
            (0..8 * 6 * 3).map(|v| (v * 7 % 256) as u8).collect(),
            Source::Thermal,
        )
        .unwrap();
        let first = model
            .align(&visible, &thermal, Some((20, 15)), Method::CatmullRom)
            .unwrap();
        let second = model
            .align(&visible, &thermal, Some((20, 15)), Method::CatmullRom)
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn deserialize_models() {
        #[derive(serde::Deserialize)]
        struct Wrapper {
            alignment: AlignmentModel,
        }
        let parsed: Wrapper = toml::from_str("alignment = { kind = \"stretch\" }").unwrap();
        assert_eq!(parsed.alignment, AlignmentModel::Stretch);
        let source = r#"
        [alignment]
        kind = "scale_offset"
        scale = 20
        offset_x = 5.5
        "#;
        let parsed: Wrapper = toml::from_str(source).unwrap();
        assert_eq!(
            parsed.alignment,
            AlignmentModel::ScaleOffset {
                scale: 20.0,
                offset_x: 5.5,
                offset_y: 0.0
            }
        );
        let source = r#"
        [alignment]
        kind = "crop"
        top = 10
        left = 20
        "#;
        let parsed: Wrapper = toml::from_str(source).unwrap();
        assert_eq!(
            parsed.alignment,
            AlignmentModel::Crop {
                top: 10,
                bottom: 0,
                left: 20,
                right: 0
            }
        );
    }
}

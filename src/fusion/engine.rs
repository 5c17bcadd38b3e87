// SPDX-License-Identifier: GPL-3.0-or-later
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{instrument, trace};

use crate::frame::{Channels, Frame, Source};
use crate::render::{resize_frame, Method};
use crate::slot::{FrameSlot, VersionedFrame};

use super::alignment::AlignmentModel;
use super::blend::{blend, BlendPolicy};
use super::error::FusionError;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Layout {
    /// Thermal mixed on top of the visible image.
    Overlay,

    /// Visible on the left half, thermal on the right.
    SideBySide,
}

impl Default for Layout {
    fn default() -> Self {
        Self::Overlay
    }
}

/// A shared, swappable [`BlendPolicy`].
///
/// Swaps are atomic: a composite uses either the old policy or the new one for every pixel.
#[derive(Clone, Debug, Default)]
pub(crate) struct PolicyHandle(Arc<RwLock<BlendPolicy>>);

impl PolicyHandle {
    pub(crate) fn new(policy: BlendPolicy) -> Self {
        Self(Arc::new(RwLock::new(policy)))
    }

    pub(crate) fn get(&self) -> BlendPolicy {
        *self.0.read()
    }

    /// Replace the active policy, if the new one is valid.
    pub(crate) fn set(&self, policy: BlendPolicy) -> Result<(), FusionError> {
        policy.validate()?;
        *self.0.write() = policy;
        Ok(())
    }
}

/// The two frames (and their slot versions) a composite was made from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct SourceVersions {
    pub(crate) visible: u64,
    pub(crate) thermal: u64,
}

/// Turns a visible and a thermal frame into one composite frame.
#[derive(Clone, Debug)]
pub(crate) struct BlendEngine {
    alignment: AlignmentModel,
    canvas: Option<(u32, u32)>,
    method: Method,
    policy: PolicyHandle,
    default_alpha: f32,
    layout: Layout,
}

impl BlendEngine {
    pub(crate) fn new(
        alignment: AlignmentModel,
        canvas: Option<(u32, u32)>,
        method: Method,
        policy: PolicyHandle,
        default_alpha: f32,
        layout: Layout,
    ) -> Self {
        Self {
            alignment,
            canvas,
            method,
            policy,
            default_alpha,
            layout,
        }
    }

    pub(crate) fn policy(&self) -> &PolicyHandle {
        &self.policy
    }

    /// Composite a pair of frames. The result is always RGB, and the size of the canvas (or the
    /// visible frame when no canvas is set).
    #[instrument(level = "trace", skip(self, visible, thermal))]
    pub(crate) fn compose(&self, visible: &Frame, thermal: &Frame) -> Result<Frame, FusionError> {
        match self.layout {
            Layout::Overlay => {
                let aligned = self
                    .alignment
                    .align(visible, thermal, self.canvas, self.method)?;
                // Read once so the whole frame uses the same policy.
                let policy = self.policy.get();
                blend(
                    &aligned.visible,
                    &aligned.thermal,
                    aligned.coverage.as_deref(),
                    &policy,
                    self.default_alpha,
                    self.method,
                )
            }
            Layout::SideBySide => self.side_by_side(visible, thermal),
        }
    }

    fn side_by_side(&self, visible: &Frame, thermal: &Frame) -> Result<Frame, FusionError> {
        let (width, height) = self.canvas.unwrap_or_else(|| {
            let (visible_width, visible_height) = visible.dimensions();
            (visible_width * 2, visible_height)
        });
        if width < 2 || height == 0 {
            return Err(FusionError::InvalidCanvas { width, height });
        }
        let left_width = width / 2;
        let right_width = width - left_width;
        let left = resize_frame(visible, left_width, height, self.method)?.to_rgb();
        let right = resize_frame(thermal, right_width, height, self.method)?.to_rgb();
        let stride = Channels::Rgb.count();
        let data: Vec<u8> = left
            .data()
            .chunks_exact(left_width as usize * stride)
            .zip(right.data().chunks_exact(right_width as usize * stride))
            .flat_map(|(left_row, right_row)| left_row.iter().chain(right_row).copied())
            .collect();
        Ok(Frame::new(width, height, Channels::Rgb, data, Source::Composite)?
            .captured_at(visible.timestamp().max(thermal.timestamp())))
    }

    /// Composite the latest frames from a pair of slots.
    ///
    /// The slots are only locked long enough to copy their frames out.
    pub(crate) fn composite(
        &self,
        visible: &FrameSlot,
        thermal: &FrameSlot,
    ) -> Result<(Frame, SourceVersions), FusionError> {
        let (visible, thermal) = match (visible.snapshot_versioned(), thermal.snapshot_versioned())
        {
            (Some(visible), Some(thermal)) => (visible, thermal),
            _ => return Err(FusionError::NotReady),
        };
        let VersionedFrame {
            frame: visible,
            version: visible_version,
        } = visible;
        let VersionedFrame {
            frame: thermal,
            version: thermal_version,
        } = thermal;
        trace!(visible_version, thermal_version, "compositing");
        let composite = self.compose(&visible, &thermal)?;
        Ok((
            composite,
            SourceVersions {
                visible: visible_version,
                thermal: thermal_version,
            },
        ))
    }
}

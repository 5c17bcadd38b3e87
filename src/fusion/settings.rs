// SPDX-License-Identifier: GPL-3.0-or-later
use std::time::Duration;

use serde::Deserialize;

use super::alignment::AlignmentModel;
use super::blend::{validate_alpha, BlendPolicy};
use super::engine::Layout;
use super::error::FusionError;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub(crate) struct FusionSettings {
    /// The size of the composite, as `[width, height]`. Defaults to the visible frame's size.
    #[serde(default)]
    pub(crate) canvas: Option<[u32; 2]>,

    #[serde(default)]
    pub(crate) alignment: AlignmentModel,

    #[serde(default)]
    pub(crate) policy: BlendPolicy,

    /// The weight used by `alpha_channel_overlay` when the thermal frame has no alpha channel.
    #[serde(default = "FusionSettings::default_alpha")]
    pub(crate) default_alpha: f32,

    #[serde(default)]
    pub(crate) layout: Layout,

    /// How long to wait before checking for new frames again.
    #[serde(default = "FusionSettings::default_poll_interval")]
    pub(crate) poll_interval_ms: u64,
}

impl FusionSettings {
    fn default_alpha() -> f32 {
        0.5
    }

    fn default_poll_interval() -> u64 {
        10
    }

    pub(crate) fn canvas(&self) -> Option<(u32, u32)> {
        self.canvas.map(|[width, height]| (width, height))
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub(crate) fn validate(&self) -> Result<(), FusionError> {
        if let Some([width, height]) = self.canvas {
            let too_narrow = self.layout == Layout::SideBySide && width < 2;
            if width == 0 || height == 0 || too_narrow {
                return Err(FusionError::InvalidCanvas { width, height });
            }
        }
        self.alignment.validate()?;
        self.policy.validate()?;
        validate_alpha("default_alpha", self.default_alpha)
    }
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            canvas: None,
            alignment: AlignmentModel::default(),
            policy: BlendPolicy::default(),
            default_alpha: Self::default_alpha(),
            layout: Layout::default(),
            poll_interval_ms: Self::default_poll_interval(),
        }
    }
}

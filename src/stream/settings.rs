// SPDX-License-Identifier: GPL-3.0-or-later
use serde::Deserialize;

use std::net;
use std::time::Duration;

use super::jpeg::JpegEncoder;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub(crate) struct StreamSettings {
    /// The address to bind the server to. Defaults to `127.0.0.1`.
    #[serde(default = "StreamSettings::default_address")]
    address: net::IpAddr,

    /// The port to bind the server to. Default to `9000`.
    #[serde(default = "StreamSettings::default_port")]
    port: u16,

    /// MJPEG-specific settings.
    #[serde(default)]
    pub(crate) mjpeg: MjpegSettings,

    /// JPEG quality, from 1 to 100. Defaults to 75.
    #[serde(default = "StreamSettings::default_jpeg_quality")]
    pub(crate) jpeg_quality: u8,

    /// An upper limit on how many composites are made each second. Unlimited by default.
    #[serde(default)]
    pub(crate) max_frame_rate: Option<f32>,
}

impl StreamSettings {
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if !(1..=100).contains(&self.jpeg_quality) {
            anyhow::bail!(
                "streams.jpeg_quality must be between 1 and 100, not {}",
                self.jpeg_quality
            );
        }
        if let Some(rate) = self.max_frame_rate {
            if !(rate.is_finite() && rate > 0.0) {
                anyhow::bail!("streams.max_frame_rate must be positive, not {}", rate);
            }
        }
        Ok(())
    }

    /// The shortest time allowed between two composites.
    pub(crate) fn min_frame_interval(&self) -> Option<Duration> {
        self.max_frame_rate
            .map(|rate| Duration::from_secs_f32(1.0 / rate))
    }

    pub(crate) fn encoder(&self) -> JpegEncoder {
        JpegEncoder::new(self.jpeg_quality)
    }

    pub(crate) fn socket_address(&self) -> net::SocketAddr {
        net::SocketAddr::new(self.address, self.port)
    }

    fn default_address() -> net::IpAddr {
        net::IpAddr::from([127u8, 0u8, 0u8, 1u8])
    }

    fn default_port() -> u16 {
        9000u16
    }

    fn default_jpeg_quality() -> u8 {
        JpegEncoder::DEFAULT_QUALITY
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            address: Self::default_address(),
            port: Self::default_port(),
            mjpeg: MjpegSettings::default(),
            jpeg_quality: Self::default_jpeg_quality(),
            max_frame_rate: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub(crate) struct MjpegSettings {
    /// Whether or not the MJPEG video stream should be enabled.
    #[serde(default = "MjpegSettings::default_enabled")]
    pub(crate) enabled: bool,
}

impl MjpegSettings {
    fn default_enabled() -> bool {
        true
    }
}

impl Default for MjpegSettings {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
        }
    }
}

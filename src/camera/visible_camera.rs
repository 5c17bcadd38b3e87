// SPDX-License-Identifier: GPL-3.0-or-later
use std::time::Duration;

use crate::frame::Frame;

use super::error::SensorError;

/// The operations a visible-light camera needs to provide.
pub(crate) trait VisibleCamera {
    /// Capture one frame. Implementations return RGB (or grayscale) frames.
    fn capture(&mut self) -> Result<Frame, SensorError>;

    /// How long to wait between captures.
    fn frame_delay(&self) -> Duration;
}

#[cfg(feature = "v4l2")]
pub(crate) use self::v4l2::V4l2Camera;

#[cfg(feature = "v4l2")]
mod v4l2 {
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use anyhow::{anyhow, Context as _};
    use image::ImageFormat;
    use ouroboros::self_referencing;
    use tracing::{debug, info, warn};
    use v4l::buffer::Type;
    use v4l::io::traits::CaptureStream;
    use v4l::video::Capture;
    use v4l::FourCC;

    use super::VisibleCamera;
    use crate::camera::error::SensorError;
    use crate::frame::{Channels, Frame, FrameImage, Source};

    const BUFFER_COUNT: u32 = 4;

    /// Pixel formats `decode` understands.
    const SUPPORTED_FORMATS: [&[u8; 4]; 3] = [b"RGB3", b"MJPG", b"YUYV"];

    #[self_referencing]
    struct CaptureState {
        device: v4l::Device,
        #[borrows(mut device)]
        #[covariant]
        stream: v4l::prelude::MmapStream<'this, v4l::Device>,
    }

    /// A USB (or CSI) camera exposed through Video4Linux2.
    pub(crate) struct V4l2Camera {
        device_path: PathBuf,
        state: CaptureState,
        width: u32,
        height: u32,
        fourcc: FourCC,
        frame_delay: Duration,
    }

    impl V4l2Camera {
        /// Open the device and start streaming. Failures here are fatal.
        pub(crate) fn new(
            device_path: &Path,
            width: u32,
            height: u32,
            frame_rate: u32,
        ) -> Result<Self, SensorError> {
            let mut device = v4l::Device::with_path(device_path)
                .with_context(|| format!("Unable to open {}", device_path.display()))
                .map_err(SensorError::Fatal)?;
            let mut format = device
                .format()
                .context("Unable to read capture format")
                .map_err(SensorError::Fatal)?;
            format.width = width;
            format.height = height;
            format.fourcc = FourCC::new(b"RGB3");
            let format = match device.set_format(&format) {
                Ok(format) => format,
                Err(err) => {
                    warn!(device = %device_path.display(), "failed to set capture format: {}", err);
                    device
                        .format()
                        .context("Unable to read capture format")
                        .map_err(SensorError::Fatal)?
                }
            };
            if !is_supported(format.fourcc) {
                return Err(SensorError::Fatal(anyhow!(
                    "{} only offers the unsupported pixel format {}",
                    device_path.display(),
                    format.fourcc
                )));
            }
            if frame_rate > 0 {
                let params = v4l::video::capture::Parameters::with_fps(frame_rate);
                if let Err(err) = device.set_params(&params) {
                    warn!(device = %device_path.display(), "failed to set frame rate: {}", err);
                }
            }
            debug!(
                device = %device_path.display(),
                width = format.width,
                height = format.height,
                fourcc = %format.fourcc,
                "negotiated capture format"
            );
            let state = CaptureStateTryBuilder {
                device,
                stream_builder: |device| {
                    v4l::prelude::MmapStream::with_buffers(
                        device,
                        Type::VideoCapture,
                        BUFFER_COUNT,
                    )
                    .context("Unable to create capture buffers")
                },
            }
            .try_build()
            .map_err(SensorError::Fatal)?;
            info!(device = %device_path.display(), "visible camera streaming");
            Ok(Self {
                device_path: device_path.to_path_buf(),
                state,
                width: format.width,
                height: format.height,
                fourcc: format.fourcc,
                frame_delay: Duration::from_secs_f32(1.0 / frame_rate.max(1) as f32),
            })
        }

        fn decode(&self, buffer: &[u8]) -> anyhow::Result<Frame> {
            if self.fourcc == FourCC::new(b"RGB3") {
                let len = self.width as usize * self.height as usize * 3;
                let data = buffer
                    .get(..len)
                    .ok_or_else(|| anyhow!("short RGB3 buffer ({} bytes)", buffer.len()))?;
                Ok(Frame::new(
                    self.width,
                    self.height,
                    Channels::Rgb,
                    data.to_vec(),
                    Source::Visible,
                )?)
            } else if self.fourcc == FourCC::new(b"MJPG") {
                let decoded = image::load_from_memory_with_format(buffer, ImageFormat::Jpeg)?;
                Ok(Frame::from_image(
                    FrameImage::Rgb(decoded.to_rgb8()),
                    Source::Visible,
                )?)
            } else if self.fourcc == FourCC::new(b"YUYV") {
                let data = yuyv_to_rgb(buffer, self.width, self.height)?;
                Ok(Frame::new(
                    self.width,
                    self.height,
                    Channels::Rgb,
                    data,
                    Source::Visible,
                )?)
            } else {
                Err(anyhow!("unsupported pixel format {}", self.fourcc))
            }
        }
    }

    impl VisibleCamera for V4l2Camera {
        fn capture(&mut self) -> Result<Frame, SensorError> {
            let buffer = self
                .state
                .with_stream_mut(|stream| stream.next().map(|(buf, _meta)| buf.to_vec()))
                .with_context(|| format!("Capture failed on {}", self.device_path.display()))
                .map_err(SensorError::Transient)?;
            self.decode(&buffer).map_err(SensorError::Transient)
        }

        fn frame_delay(&self) -> Duration {
            self.frame_delay
        }
    }

    fn is_supported(fourcc: FourCC) -> bool {
        SUPPORTED_FORMATS
            .iter()
            .any(|supported| fourcc == FourCC::new(supported))
    }

    fn yuyv_to_rgb(buffer: &[u8], width: u32, height: u32) -> anyhow::Result<Vec<u8>> {
        let len = width as usize * height as usize * 2;
        let buffer = buffer
            .get(..len)
            .ok_or_else(|| anyhow!("short YUYV buffer ({} bytes)", buffer.len()))?;
        let convert = |y: u8, u: u8, v: u8| {
            let y = y as f32;
            let u = u as f32 - 128.0;
            let v = v as f32 - 128.0;
            [
                (y + 1.402 * v).round().max(0.0).min(255.0) as u8,
                (y - 0.344 * u - 0.714 * v).round().max(0.0).min(255.0) as u8,
                (y + 1.772 * u).round().max(0.0).min(255.0) as u8,
            ]
        };
        Ok(buffer
            .chunks_exact(4)
            .flat_map(|px| {
                let [r0, g0, b0] = convert(px[0], px[1], px[3]);
                let [r1, g1, b1] = convert(px[2], px[1], px[3]);
                [r0, g0, b0, r1, g1, b1]
            })
            .collect())
    }

    #[cfg(test)]
    mod v4l2_test {
        use v4l::FourCC;

        use super::{is_supported, yuyv_to_rgb};

        #[test]
        fn supported_formats() {
            assert!(is_supported(FourCC::new(b"RGB3")));
            assert!(is_supported(FourCC::new(b"MJPG")));
            assert!(is_supported(FourCC::new(b"YUYV")));
            assert!(!is_supported(FourCC::new(b"NV12")));
            assert!(!is_supported(FourCC::new(b"H264")));
        }

        #[test]
        fn yuyv_gray() {
            // Neutral chroma is gray
            let rgb = yuyv_to_rgb(&[50, 128, 200, 128], 2, 1).unwrap();
            assert_eq!(rgb, vec![50, 50, 50, 200, 200, 200]);
        }

        #[test]
        fn yuyv_short_buffer() {
            assert!(yuyv_to_rgb(&[0; 6], 2, 2).is_err());
        }
    }
}

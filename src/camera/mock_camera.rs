// SPDX-License-Identifier: GPL-3.0-or-later
use std::convert::TryFrom;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context as _};
use serde::de::IntoDeserializer;
use serde::Deserialize;
use tracing::trace;

use crate::frame::{Frame, Source};

use super::error::SensorError;
use super::thermal_camera::{ThermalCamera, ThermalSample};
use super::visible_camera::VisibleCamera;

/// Controls how recorded samples are repeated by [`MockThermalCamera`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum RepeatMode {
    /// Don't repeat.
    ///
    /// Once the end of the recording has been reached, every measurement is a fatal error.
    None,

    /// Loop over the recording. This is the default mode.
    Loop,

    /// Alternate between forward and reverse playback. The samples at either end are *not*
    /// repeated.
    Bounce,
}

impl Default for RepeatMode {
    fn default() -> Self {
        Self::Loop
    }
}

impl FromStr for RepeatMode {
    type Err = serde::de::value::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RepeatMode::deserialize(s.into_deserializer())
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RepeatMode::None => "none",
            RepeatMode::Loop => "loop",
            RepeatMode::Bounce => "bounce",
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
struct RecordedSample {
    values: Vec<f32>,

    #[serde(default)]
    delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Recording {
    samples: Vec<RecordedSample>,
}

/// A thermal camera that plays back a recording (or just reports one temperature everywhere).
pub(crate) struct MockThermalCamera {
    samples: Vec<(ThermalSample, Option<Duration>)>,
    index: Box<dyn Iterator<Item = usize> + Send + Sync>,
    frame_delay: Duration,
}

impl MockThermalCamera {
    pub(crate) fn new(
        samples: Vec<(ThermalSample, Option<Duration>)>,
        repeat: RepeatMode,
        frame_rate: f32,
    ) -> Self {
        let count = samples.len();
        let index: Box<dyn Iterator<Item = usize> + Send + Sync> = match repeat {
            RepeatMode::None => Box::new(0..count),
            RepeatMode::Loop => Box::new((0..count).cycle()),
            RepeatMode::Bounce if count > 2 => {
                let forwards = 0..count;
                let backwards = (1..(count - 1)).rev();
                Box::new(forwards.chain(backwards).cycle())
            }
            RepeatMode::Bounce => Box::new((0..count).cycle()),
        };
        Self {
            samples,
            index,
            frame_delay: Duration::from_secs_f32(1.0 / frame_rate),
        }
    }

    pub(crate) fn uniform(celsius: f32, frame_rate: f32) -> anyhow::Result<Self> {
        let sample = ThermalSample::uniform(celsius)?;
        Ok(Self::new(vec![(sample, None)], RepeatMode::Loop, frame_rate))
    }

    /// Load a TOML recording made of `[[samples]]` tables.
    pub(crate) fn from_path(
        path: &Path,
        repeat: RepeatMode,
        frame_rate: f32,
    ) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to read recording {}", path.display()))?;
        let recording: Recording = toml::from_str(&contents)
            .with_context(|| format!("Unable to parse recording {}", path.display()))?;
        if recording.samples.is_empty() {
            return Err(anyhow!("{} has no samples", path.display()));
        }
        let samples = recording
            .samples
            .into_iter()
            .enumerate()
            .map(|(n, recorded)| {
                let delay = recorded.delay_ms.map(Duration::from_millis);
                ThermalSample::try_from(recorded.values)
                    .with_context(|| format!("Sample {} in {}", n, path.display()))
                    .map(|sample| (sample, delay))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self::new(samples, repeat, frame_rate))
    }
}

impl ThermalCamera for MockThermalCamera {
    fn measure(&mut self) -> Result<ThermalSample, SensorError> {
        let index = self
            .index
            .next()
            .ok_or_else(|| SensorError::Fatal(anyhow!("No more samples in recording")))?;
        let (sample, delay) = &self.samples[index];
        if let Some(delay) = delay {
            self.frame_delay = *delay;
        }
        trace!(index, delay = ?self.frame_delay, "playing back recorded sample");
        Ok(sample.clone())
    }

    fn frame_delay(&self) -> Duration {
        self.frame_delay
    }
}

/// A visible camera that always shows the same color.
pub(crate) struct MockVisibleCamera {
    frame: Frame,
    frame_delay: Duration,
}

impl MockVisibleCamera {
    pub(crate) fn new(
        width: u32,
        height: u32,
        color: [u8; 3],
        frame_rate: f32,
    ) -> anyhow::Result<Self> {
        let frame = Frame::solid(width, height, &color, Source::Visible)?;
        Ok(Self {
            frame,
            frame_delay: Duration::from_secs_f32(1.0 / frame_rate),
        })
    }
}

impl VisibleCamera for MockVisibleCamera {
    fn capture(&mut self) -> Result<Frame, SensorError> {
        Ok(self
            .frame
            .clone()
            .captured_at(std::time::SystemTime::now()))
    }

    fn frame_delay(&self) -> Duration {
        self.frame_delay
    }
}

#[cfg(test)]
mod mock_camera_test {
    use std::io::Write;
    use std::time::Duration;

    use super::{MockThermalCamera, MockVisibleCamera, RepeatMode, ThermalSample};
    use crate::camera::error::SensorError;
    use crate::camera::thermal_camera::ThermalCamera;
    use crate::camera::visible_camera::VisibleCamera;

    const COUNT: usize = 5;

    fn ramp() -> Vec<(ThermalSample, Option<Duration>)> {
        (0..COUNT)
            .map(|n| (ThermalSample::uniform(20.0 + n as f32).unwrap(), None))
            .collect()
    }

    fn played_back(repeat_mode: RepeatMode, take: usize) -> Vec<f32> {
        let mut cam = MockThermalCamera::new(ramp(), repeat_mode, 4.0);
        std::iter::from_fn(move || cam.measure().ok())
            .fuse()
            .take(take)
            .map(|sample| sample.values()[0])
            .collect()
    }

    #[test]
    fn repeat_none() {
        assert_eq!(
            played_back(RepeatMode::None, 12),
            vec![20.0, 21.0, 22.0, 23.0, 24.0]
        );
    }

    #[test]
    fn repeat_none_ends_fatally() {
        let mut cam = MockThermalCamera::new(ramp(), RepeatMode::None, 4.0);
        for _ in 0..COUNT {
            assert!(cam.measure().is_ok());
        }
        assert!(matches!(cam.measure(), Err(SensorError::Fatal(_))));
    }

    #[test]
    fn repeat_loop() {
        assert_eq!(
            played_back(RepeatMode::Loop, 7),
            vec![20.0, 21.0, 22.0, 23.0, 24.0, 20.0, 21.0]
        );
    }

    #[test]
    fn repeat_bounce() {
        assert_eq!(
            played_back(RepeatMode::Bounce, 11),
            vec![20.0, 21.0, 22.0, 23.0, 24.0, 23.0, 22.0, 21.0, 20.0, 21.0, 22.0]
        );
    }

    #[test]
    fn repeat_mode_from_str() {
        assert_eq!("bounce".parse::<RepeatMode>().unwrap(), RepeatMode::Bounce);
        assert!("sideways".parse::<RepeatMode>().is_err());
    }

    #[test]
    fn recording_from_file() {
        let row = vec!["30.5"; ThermalSample::LEN].join(", ");
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            "[[samples]]\nvalues = [{}]\ndelay_ms = 250\n\n[[samples]]\nvalues = [{}]\n",
            row, row
        )
        .unwrap();
        let mut cam = MockThermalCamera::from_path(file.path(), RepeatMode::Loop, 8.0).unwrap();
        assert_eq!(cam.frame_delay(), Duration::from_millis(125));
        let sample = cam.measure().unwrap();
        assert_eq!(sample.max(), 30.5);
        assert_eq!(cam.frame_delay(), Duration::from_millis(250));
        // The second sample has no delay, so the previous one sticks.
        cam.measure().unwrap();
        assert_eq!(cam.frame_delay(), Duration::from_millis(250));
    }

    #[test]
    fn recording_with_short_sample() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "[[samples]]\nvalues = [1.0, 2.0]\n").unwrap();
        assert!(MockThermalCamera::from_path(file.path(), RepeatMode::Loop, 8.0).is_err());
    }

    #[test]
    fn solid_visible() {
        let mut cam = MockVisibleCamera::new(8, 6, [10, 20, 30], 30.0).unwrap();
        let frame = cam.capture().unwrap();
        assert_eq!(frame.dimensions(), (8, 6));
        assert_eq!(frame.pixel(7, 5), &[10, 20, 30]);
    }
}

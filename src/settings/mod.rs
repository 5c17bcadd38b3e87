// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::Context as _;
use serde::Deserialize;

use std::fs;
use std::path::Path;

mod cli;
pub(crate) mod gradient;

use crate::camera::{ThermalSettings, VisibleSettings};
use crate::fusion::FusionSettings;
use crate::render::RenderSettings;
use crate::stream::StreamSettings;
pub(crate) use cli::Args;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Settings {
    /// Thermal camera settings.
    pub(crate) thermal: ThermalSettings,

    /// Visible light camera settings.
    pub(crate) visible: VisibleSettings,

    /// How thermal readings are turned into an image.
    #[serde(default)]
    pub(crate) render: RenderSettings,

    /// How the two images are lined up and combined.
    #[serde(default)]
    pub(crate) fusion: FusionSettings,

    /// Settings related to the HTTP server for the video streams.
    #[serde(default)]
    pub(crate) streams: StreamSettings,
}

impl Settings {
    pub(crate) fn from_path(path: &Path) -> anyhow::Result<Self> {
        let config_data = fs::read_to_string(path)
            .with_context(|| format!("Unable to read configuration file {}", path.display()))?;
        let settings: Self = toml::from_str(&config_data)
            .with_context(|| format!("Invalid configuration file {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        self.thermal.validate().context("Invalid [thermal] settings")?;
        self.visible.validate().context("Invalid [visible] settings")?;
        self.render.validate().context("Invalid [render] settings")?;
        self.fusion.validate().context("Invalid [fusion] settings")?;
        let (width, height) = self.visible.output_dimensions();
        self.fusion
            .alignment
            .validate_for(width, height)
            .context("Invalid [fusion.alignment] settings")?;
        self.streams.validate().context("Invalid [streams] settings")?;
        Ok(())
    }
}

#[cfg(test)]
mod settings_test {
    use std::io::Write;

    use super::Settings;
    use crate::fusion::{BlendPolicy, FusionSettings};

    const MINIMAL: &str = r#"
    [thermal]
    kind = "mock"
    uniform = 30

    [visible]
    kind = "mock"
    width = 64
    height = 48
    "#;

    #[test]
    fn minimal() {
        let parsed: Settings = toml::from_str(MINIMAL).unwrap();
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.fusion, FusionSettings::default());
        assert_eq!(parsed.fusion.policy, BlendPolicy::FixedAlpha { alpha: 0.5 });
        assert_eq!(parsed.streams.jpeg_quality, 75);
    }

    #[test]
    fn missing_sensor() {
        let parsed: Result<Settings, _> = toml::from_str("[thermal]\nkind = \"mock\"\nuniform = 30");
        assert!(parsed.is_err());
    }

    #[test]
    fn validation_names_section() {
        let source = format!(
            "{}\n[fusion]\npolicy = {{ kind = \"fixed_alpha\", alpha = 2.0 }}\n",
            MINIMAL
        );
        let parsed: Settings = toml::from_str(&source).unwrap();
        let err = parsed.validate().unwrap_err();
        assert!(format!("{:#}", err).contains("[fusion]"));
    }

    #[test]
    fn crop_larger_than_camera() {
        let source = format!(
            "{}\n[fusion.alignment]\nkind = \"crop\"\nleft = 40\nright = 30\n",
            MINIMAL
        );
        let parsed: Settings = toml::from_str(&source).unwrap();
        assert!(parsed.validate().is_err());
    }

    #[test]
    fn from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let parsed = Settings::from_path(file.path()).unwrap();
        assert_eq!(parsed.fusion.poll_interval_ms, 10);
    }

    #[test]
    fn from_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::from_path(&dir.path().join("nope.toml")).is_err());
    }

    #[cfg(feature = "v4l2")]
    #[test]
    fn example_config() {
        let parsed: Settings = toml::from_str(include_str!("../../config_example.toml")).unwrap();
        assert!(parsed.validate().is_ok());
    }
}

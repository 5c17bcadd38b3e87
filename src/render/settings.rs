// SPDX-License-Identifier: GPL-3.0-or-later
use std::convert::TryFrom;
use std::fmt;

use serde::Deserialize;

use crate::settings::gradient;
use crate::temperature::Temperature;

use super::resize::Method;

/// One end of the temperature range that gets mapped onto the color gradient.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(try_from = "LimitValue")]
pub(crate) enum Limit {
    /// Set the maximum (or minimum) to the largest (or smallest) value in the current image.
    Dynamic,

    /// Set the maximum (or minimum) to the given value.
    Static(Temperature),
}

impl Default for Limit {
    fn default() -> Self {
        Self::Dynamic
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LimitValue {
    Keyword(String),
    Temperature(Temperature),
}

#[derive(Debug)]
struct InvalidLimit(String);

impl fmt::Display for InvalidLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}\" is not a limit, expected \"dynamic\" or a temperature",
            self.0
        )
    }
}

impl TryFrom<LimitValue> for Limit {
    type Error = InvalidLimit;

    fn try_from(value: LimitValue) -> Result<Self, Self::Error> {
        match value {
            LimitValue::Keyword(keyword) if keyword.eq_ignore_ascii_case("dynamic") => {
                Ok(Limit::Dynamic)
            }
            LimitValue::Keyword(keyword) => Err(InvalidLimit(keyword)),
            LimitValue::Temperature(temperature) => Ok(Limit::Static(temperature)),
        }
    }
}

fn default_colors() -> colorous::Gradient {
    colorous::TURBO
}

/// How thermal readings are turned into an image.
#[derive(Copy, Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RenderSettings {
    #[serde(default)]
    pub(crate) upper_limit: Limit,

    #[serde(default)]
    pub(crate) lower_limit: Limit,

    #[serde(default = "default_colors", deserialize_with = "gradient::deserialize")]
    pub(crate) colors: colorous::Gradient,

    /// When set, the thermal image is fully transparent while the mean temperature is below this.
    #[serde(default)]
    pub(crate) transparent_below: Option<Temperature>,

    #[serde(default)]
    pub(crate) scaling_method: Method,
}

impl PartialEq for RenderSettings {
    fn eq(&self, other: &Self) -> bool {
        self.upper_limit == other.upper_limit
            && self.lower_limit == other.lower_limit
            && self.transparent_below == other.transparent_below
            && self.scaling_method == other.scaling_method
            // Gradient doesn't implement PartialEq
            && format!("{:?}", self.colors) == format!("{:?}", other.colors)
    }
}

impl RenderSettings {
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if let (Limit::Static(lower), Limit::Static(upper)) = (self.lower_limit, self.upper_limit) {
            if lower >= upper {
                anyhow::bail!(
                    "render.lower_limit ({}) must be below render.upper_limit ({})",
                    lower,
                    upper
                );
            }
        }
        Ok(())
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            upper_limit: Limit::default(),
            lower_limit: Limit::default(),
            colors: default_colors(),
            transparent_below: None,
            scaling_method: Method::default(),
        }
    }
}

#[cfg(test)]
mod render_test {
    use super::{Limit, Method, RenderSettings};
    use crate::temperature::Temperature;

    #[test]
    fn defaults() {
        let parsed: Result<RenderSettings, _> = toml::from_str("");
        assert!(
            parsed.is_ok(),
            "Failed to parse empty TOML: {}",
            parsed.unwrap_err()
        );
        assert_eq!(parsed.unwrap(), RenderSettings::default());
    }

    #[test]
    fn static_limits() {
        let source = r#"
        lower_limit = 20
        upper_limit = { fahrenheit = 212 }
        "#;
        let parsed: RenderSettings = toml::from_str(source).unwrap();
        let expected = RenderSettings {
            lower_limit: Limit::Static(Temperature::Celsius(20.0)),
            upper_limit: Limit::Static(Temperature::Celsius(100.0)),
            ..RenderSettings::default()
        };
        assert_eq!(parsed, expected);
    }

    #[test]
    fn dynamic_limit() {
        let parsed: RenderSettings = toml::from_str("upper_limit = \"dynamic\"").unwrap();
        assert_eq!(parsed.upper_limit, Limit::Dynamic);
    }

    #[test]
    fn bad_limit() {
        let parsed: Result<RenderSettings, _> = toml::from_str("upper_limit = \"hot\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn colors_and_scaling() {
        let source = r#"
        colors = "inferno"
        scaling_method = "nearest"
        transparent_below = 25.5
        "#;
        let parsed: RenderSettings = toml::from_str(source).unwrap();
        let expected = RenderSettings {
            colors: colorous::INFERNO,
            scaling_method: Method::Nearest,
            transparent_below: Some(Temperature::Celsius(25.5)),
            ..RenderSettings::default()
        };
        assert_eq!(parsed, expected);
    }

    #[test]
    fn unknown_field() {
        let parsed: Result<RenderSettings, _> = toml::from_str("grid_size = 50");
        assert!(parsed.is_err());
    }

    #[test]
    fn inverted_limits() {
        let source = r#"
        lower_limit = 40
        upper_limit = 20
        "#;
        let parsed: RenderSettings = toml::from_str(source).unwrap();
        assert!(parsed.validate().is_err());
        let source = r#"
        lower_limit = 20
        upper_limit = "dynamic"
        "#;
        let parsed: RenderSettings = toml::from_str(source).unwrap();
        assert!(parsed.validate().is_ok());
    }
}

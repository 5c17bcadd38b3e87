// SPDX-License-Identifier: GPL-3.0-or-later
use std::cmp;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Hash, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            TemperatureUnit::Celsius => "C",
            TemperatureUnit::Fahrenheit => "F",
        })
    }
}

impl FromStr for TemperatureUnit {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match &s.to_ascii_lowercase() as &str {
            "celsius" | "c" => Ok(TemperatureUnit::Celsius),
            "fahrenheit" | "f" => Ok(TemperatureUnit::Fahrenheit),
            _ => Err("unknown temperature unit"),
        }
    }
}

/// A temperature as written in the configuration (or an API request).
///
/// Everything internal works in Celsius (the thermal camera reports Celsius), so the unit is only
/// kept around to be able to show the value back the way it was given.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(from = "DeserializedTemperature", into = "SerializedTemperature")]
pub enum Temperature {
    Celsius(f32),
    Fahrenheit(f32),
}

impl Temperature {
    pub fn in_celsius(&self) -> f32 {
        match self {
            Self::Celsius(c) => *c,
            Self::Fahrenheit(f) => (f - 32.0) * 5.0 / 9.0,
        }
    }

    pub fn unit(&self) -> TemperatureUnit {
        match self {
            Temperature::Celsius(_) => TemperatureUnit::Celsius,
            Temperature::Fahrenheit(_) => TemperatureUnit::Fahrenheit,
        }
    }

    fn value(&self) -> f32 {
        match self {
            Temperature::Celsius(c) => *c,
            Temperature::Fahrenheit(f) => *f,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.value().is_finite()
    }
}

impl cmp::PartialEq for Temperature {
    fn eq(&self, other: &Self) -> bool {
        // Always compare in celsius.
        self.in_celsius().eq(&other.in_celsius())
    }
}

impl cmp::PartialOrd for Temperature {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        self.in_celsius().partial_cmp(&other.in_celsius())
    }
}

impl fmt::Display for Temperature {
    /// Format the temperature value like a numeric value. With the alternate flag (`#`) the degree
    /// symbol and unit are appended, ex: `40°C`.
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value().fmt(fmt)?;
        if fmt.alternate() {
            write!(fmt, "°{}", self.unit())?;
        }
        Ok(())
    }
}

impl From<f32> for Temperature {
    fn from(value: f32) -> Self {
        Self::Celsius(value)
    }
}

// Accept either a bare number (Celsius) or a single-entry map of a unit to a number.
#[derive(Copy, Clone, Debug, Deserialize)]
#[serde(untagged)]
enum DeserializedTemperature {
    Number(f32),
    Wrapped(SerializedTemperature),
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
enum SerializedTemperature {
    #[serde(alias = "c", alias = "C")]
    Celsius(f32),

    #[serde(alias = "f", alias = "F")]
    Fahrenheit(f32),
}

impl From<DeserializedTemperature> for Temperature {
    fn from(maybe_wrapped: DeserializedTemperature) -> Self {
        match maybe_wrapped {
            DeserializedTemperature::Number(temperature) => temperature.into(),
            DeserializedTemperature::Wrapped(SerializedTemperature::Celsius(c)) => {
                Self::Celsius(c)
            }
            DeserializedTemperature::Wrapped(SerializedTemperature::Fahrenheit(f)) => {
                Self::Fahrenheit(f)
            }
        }
    }
}

impl From<Temperature> for SerializedTemperature {
    fn from(value: Temperature) -> Self {
        match value {
            Temperature::Celsius(c) => Self::Celsius(c),
            Temperature::Fahrenheit(f) => Self::Fahrenheit(f),
        }
    }
}

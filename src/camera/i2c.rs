// SPDX-License-Identifier: GPL-3.0-or-later
use std::convert::TryFrom;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use i2cdev::linux::LinuxI2CError;
use linux_embedded_hal::I2cdev;
use serde::{Deserialize, Serialize};

use crate::util::parse_int_decimal_hex;

/// An I2C bus, either by number (`/dev/i2c-N`) or by the path to its device node.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub(crate) enum Bus {
    Number(u32),
    Path(PathBuf),
}

impl Bus {
    pub(crate) fn device_path(&self) -> PathBuf {
        match self {
            Bus::Number(n) => PathBuf::from(format!("/dev/i2c-{}", n)),
            Bus::Path(p) => p.clone(),
        }
    }
}

impl From<u32> for Bus {
    fn from(bus: u32) -> Self {
        Self::Number(bus)
    }
}

impl FromStr for Bus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(parse_int_decimal_hex(s)
            .map(Bus::Number)
            .unwrap_or_else(|_| Bus::Path(PathBuf::from(s))))
    }
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.device_path().display())
    }
}

impl TryFrom<&Bus> for I2cdev {
    type Error = LinuxI2CError;

    fn try_from(bus: &Bus) -> Result<Self, Self::Error> {
        I2cdev::new(bus.device_path())
    }
}

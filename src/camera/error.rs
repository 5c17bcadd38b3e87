// SPDX-License-Identifier: GPL-3.0-or-later
use std::error::Error as StdError;
use std::fmt;

/// Why a sensor failed to produce a reading.
///
/// Workers keep going after `NotReady` and `Transient` errors, and stop after a `Fatal` one.
#[derive(Debug)]
pub(crate) enum SensorError {
    /// The sensor has no new data yet.
    NotReady,

    /// A read failed, but the next one may succeed (bus errors, timeouts, garbage data).
    Transient(anyhow::Error),

    /// The sensor is unusable (missing device, permissions, failed initialization).
    Fatal(anyhow::Error),
}

impl SensorError {
    pub(crate) fn transient<E>(error: E) -> Self
    where
        anyhow::Error: From<E>,
    {
        Self::Transient(anyhow::Error::from(error))
    }
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::NotReady => f.write_str("sensor data is not ready"),
            SensorError::Transient(err) => write!(f, "transient sensor error: {:#}", err),
            SensorError::Fatal(err) => write!(f, "fatal sensor error: {:#}", err),
        }
    }
}

impl StdError for SensorError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            SensorError::NotReady => None,
            SensorError::Transient(err) | SensorError::Fatal(err) => Some(err.as_ref()),
        }
    }
}

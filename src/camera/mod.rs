// SPDX-License-Identifier: GPL-3.0-or-later
mod error;
mod i2c;
mod mock_camera;
mod settings;
mod thermal_camera;
mod visible_camera;
mod worker;

pub(crate) use settings::{ThermalSettings, VisibleSettings};
pub(crate) use thermal_camera::ThermalSample;
pub(crate) use worker::{Sensor, SensorWorker, ThermalSensor, VisibleSensor, WorkerCommand};

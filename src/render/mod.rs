// SPDX-License-Identifier: GPL-3.0-or-later
mod color_map;
mod resize;
mod settings;

pub(crate) use color_map::ThermalColorMap;
pub(crate) use resize::{resize_frame, Method, ResizeError};
pub(crate) use settings::RenderSettings;

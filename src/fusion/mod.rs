// SPDX-License-Identifier: GPL-3.0-or-later
//! Combining visible and thermal frames into one composite.
mod alignment;
mod blend;
mod compositor;
mod engine;
mod error;
mod settings;

pub(crate) use blend::BlendPolicy;
pub(crate) use compositor::{Compositor, CompositorCommand};
pub(crate) use engine::{BlendEngine, PolicyHandle};
pub(crate) use settings::FusionSettings;

// SPDX-License-Identifier: GPL-3.0-or-later
mod jpeg;
mod mjpeg;
mod routes;
mod settings;

pub(crate) use jpeg::JpegEncoder;
pub(crate) use mjpeg::MjpegStream;
pub(crate) use routes::{
    combine, mjpeg as mjpeg_route, policy as policy_route, snapshot as snapshot_route,
};
pub(crate) use settings::StreamSettings;

// SPDX-License-Identifier: GPL-3.0-or-later
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::frame::Frame;
use crate::slot::FrameSlot;
use crate::stream::{JpegEncoder, MjpegStream};

use super::engine::{BlendEngine, SourceVersions};
use super::error::FusionError;

#[derive(Debug)]
pub(crate) enum CompositorCommand {
    /// Make one last composite, then stop.
    Shutdown,
}

/// What happened during one pass of the compositor loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum CycleOutcome {
    /// A new composite was made and sent to clients.
    Published,
    /// Neither sensor has published anything since the last composite.
    Unchanged,
    /// Too soon after the last composite.
    Throttled,
    /// No composite was sent, for the logged reason.
    Skipped,
}

/// Pulls frames from the sensor slots, blends them, and pushes the encoded result to clients.
pub(crate) struct Compositor {
    engine: BlendEngine,
    encoder: JpegEncoder,
    visible: Arc<FrameSlot>,
    thermal: Arc<FrameSlot>,
    latest: Arc<FrameSlot>,
    stream: MjpegStream,
    poll_interval: Duration,
    min_frame_interval: Option<Duration>,
    last_versions: Option<SourceVersions>,
    last_published: Option<Instant>,
    command_receiver: mpsc::Receiver<CompositorCommand>,
}

impl Compositor {
    /// Create a compositor, along with the sender for its command channel.
    pub(crate) fn new(
        engine: BlendEngine,
        encoder: JpegEncoder,
        visible: Arc<FrameSlot>,
        thermal: Arc<FrameSlot>,
        stream: MjpegStream,
        poll_interval: Duration,
    ) -> (Self, mpsc::Sender<CompositorCommand>) {
        let (command_sender, command_receiver) = mpsc::channel();
        let compositor = Self {
            engine,
            encoder,
            visible,
            thermal,
            latest: Arc::new(FrameSlot::new()),
            stream,
            poll_interval,
            min_frame_interval: None,
            last_versions: None,
            last_published: None,
            command_receiver,
        };
        (compositor, command_sender)
    }

    /// Limit how often composites are made.
    pub(crate) fn with_min_frame_interval(mut self, interval: Option<Duration>) -> Self {
        self.min_frame_interval = interval;
        self
    }

    /// The slot holding the most recent composite.
    pub(crate) fn latest_slot(&self) -> Arc<FrameSlot> {
        Arc::clone(&self.latest)
    }

    /// A copy of the most recent composite, if one has been made.
    pub(crate) fn latest_composite(&self) -> Option<Frame> {
        self.latest.snapshot()
    }

    fn source_versions(&self) -> SourceVersions {
        SourceVersions {
            visible: self.visible.version(),
            thermal: self.thermal.version(),
        }
    }

    /// Make and publish one composite, if there's anything new to show.
    pub(crate) fn cycle(&mut self) -> CycleOutcome {
        if self.last_versions == Some(self.source_versions()) {
            return CycleOutcome::Unchanged;
        }
        if let (Some(interval), Some(last)) = (self.min_frame_interval, self.last_published) {
            if last.elapsed() < interval {
                return CycleOutcome::Throttled;
            }
        }
        let (composite, versions) = match self.engine.composite(&self.visible, &self.thermal) {
            Ok(composite) => composite,
            Err(FusionError::NotReady) => {
                trace!("waiting for both sensors to produce a frame");
                return CycleOutcome::Skipped;
            }
            Err(err) => {
                warn!("skipping composite: {}", err);
                // Don't retry the same broken pair of frames.
                self.last_versions = Some(self.source_versions());
                return CycleOutcome::Skipped;
            }
        };
        self.last_versions = Some(versions);
        let jpeg = match self.encoder.encode(&composite) {
            Ok(jpeg) => jpeg,
            Err(err) => {
                warn!("skipping composite, unable to encode: {}", err);
                return CycleOutcome::Skipped;
            }
        };
        trace!(
            bytes = jpeg.len(),
            visible = versions.visible,
            thermal = versions.thermal,
            "publishing composite"
        );
        if let Err(err) = self.stream.send_frame(&jpeg) {
            debug!("no MJPEG receivers left: {}", err);
        }
        self.latest.publish(composite);
        self.last_published = Some(Instant::now());
        CycleOutcome::Published
    }

    /// Composite frames until [`CompositorCommand::Shutdown`] is sent or the command sender is
    /// dropped.
    ///
    /// This is a blocking function, it should be run on its own thread.
    pub(crate) fn run(mut self) {
        debug!(poll_interval = ?self.poll_interval, "starting compositor loop");
        loop {
            let outcome = self.cycle();
            // Only sleep when there was nothing to do.
            let wait = if outcome == CycleOutcome::Published {
                Duration::from_millis(0)
            } else {
                self.poll_interval
            };
            match self.command_receiver.recv_timeout(wait) {
                Ok(CompositorCommand::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                    break;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => (),
            }
        }
        // One last composite of whatever the sensors left behind.
        self.min_frame_interval = None;
        let final_outcome = self.cycle();
        let last_size = self.latest_composite().map(|frame| frame.dimensions());
        info!(?final_outcome, ?last_size, "terminating compositor loop");
    }
}

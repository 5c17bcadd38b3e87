// SPDX-License-Identifier: GPL-3.0-or-later
use std::sync::{mpsc, Arc};
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::frame::{Frame, Source};
use crate::render::ThermalColorMap;
use crate::slot::FrameSlot;

use super::error::SensorError;
use super::settings::CommonCameraSettings;
use super::thermal_camera::ThermalCamera;
use super::visible_camera::VisibleCamera;

#[derive(Debug)]
pub(crate) enum WorkerCommand {
    /// Gracefully stop the worker thread.
    Shutdown,
}

/// Something that can be asked for a finished [`Frame`] over and over.
pub(crate) trait Sensor {
    fn source(&self) -> Source;

    fn acquire(&mut self) -> Result<Frame, SensorError>;

    fn frame_delay(&self) -> Duration;
}

/// A thermal camera, plus everything needed to turn its readings into an image.
pub(crate) struct ThermalSensor {
    camera: Box<dyn ThermalCamera + Send>,
    color_map: ThermalColorMap,
    orientation: CommonCameraSettings,
}

impl ThermalSensor {
    pub(crate) fn new(
        camera: Box<dyn ThermalCamera + Send>,
        color_map: ThermalColorMap,
        orientation: CommonCameraSettings,
    ) -> Self {
        Self {
            camera,
            color_map,
            orientation,
        }
    }
}

impl Sensor for ThermalSensor {
    fn source(&self) -> Source {
        Source::Thermal
    }

    fn acquire(&mut self) -> Result<Frame, SensorError> {
        let sample = self.camera.measure()?;
        trace!(
            min = sample.min(),
            max = sample.max(),
            mean = sample.mean(),
            "thermal sample"
        );
        let colored = self
            .color_map
            .render(&sample)
            .map_err(SensorError::transient)?;
        self.orientation
            .orient(colored)
            .map_err(SensorError::transient)
    }

    fn frame_delay(&self) -> Duration {
        self.camera.frame_delay()
    }
}

pub(crate) struct VisibleSensor {
    camera: Box<dyn VisibleCamera + Send>,
    orientation: CommonCameraSettings,
}

impl VisibleSensor {
    pub(crate) fn new(
        camera: Box<dyn VisibleCamera + Send>,
        orientation: CommonCameraSettings,
    ) -> Self {
        Self {
            camera,
            orientation,
        }
    }
}

impl Sensor for VisibleSensor {
    fn source(&self) -> Source {
        Source::Visible
    }

    fn acquire(&mut self) -> Result<Frame, SensorError> {
        let frame = self.camera.capture()?;
        self.orientation
            .orient(frame)
            .map_err(SensorError::transient)
    }

    fn frame_delay(&self) -> Duration {
        self.camera.frame_delay()
    }
}

/// Runs one sensor on its own thread, publishing every good frame into a [`FrameSlot`].
///
/// The worker never waits on whoever reads the slot. It stops when it receives
/// [`WorkerCommand::Shutdown`], when every command sender is dropped, or when the sensor reports a
/// fatal error.
pub(crate) struct SensorWorker<S> {
    sensor: S,
    slot: Arc<FrameSlot>,
    command_receiver: mpsc::Receiver<WorkerCommand>,
}

impl<S: Sensor> SensorWorker<S> {
    /// Create a worker, along with the sender for its command channel.
    pub(crate) fn new(sensor: S, slot: Arc<FrameSlot>) -> (Self, mpsc::Sender<WorkerCommand>) {
        let (command_sender, command_receiver) = mpsc::channel();
        let worker = Self {
            sensor,
            slot,
            command_receiver,
        };
        (worker, command_sender)
    }

    /// Take one reading and publish it.
    ///
    /// Returns `Ok(true)` if a frame was published, `Ok(false)` if the reading was skipped, and an
    /// error only when the sensor has failed for good.
    pub(crate) fn acquire_once(&mut self) -> Result<bool, SensorError> {
        let source = self.sensor.source();
        match self.sensor.acquire() {
            Ok(frame) => {
                trace!(%source, width = frame.width(), height = frame.height(), "publishing frame");
                self.slot.publish(frame);
                Ok(true)
            }
            Err(SensorError::NotReady) => {
                trace!(%source, "sensor not ready");
                Ok(false)
            }
            Err(SensorError::Transient(err)) => {
                warn!(%source, "skipping frame: {:#}", err);
                Ok(false)
            }
            Err(fatal) => Err(fatal),
        }
    }

    /// Acquire frames until shut down.
    ///
    /// This is a blocking function that won't return until a [`WorkerCommand::Shutdown`] is sent
    /// from another thread, the command sender is dropped, or the sensor fails.
    pub(crate) fn run(mut self) -> Result<(), SensorError> {
        let source = self.sensor.source();
        debug!(%source, delay = ?self.sensor.frame_delay(), "starting sensor loop");
        loop {
            // Respond to any pending commands
            match self.command_receiver.try_recv() {
                Ok(WorkerCommand::Shutdown) | Err(mpsc::TryRecvError::Disconnected) => {
                    info!(%source, "terminating sensor loop");
                    return Ok(());
                }
                Err(mpsc::TryRecvError::Empty) => (),
            }
            self.acquire_once()?;
            // Waiting on the command channel doubles as the inter-frame sleep.
            let frame_delay = self.sensor.frame_delay();
            trace!(%source, "waiting {}us for the next frame", frame_delay.as_micros());
            match self.command_receiver.recv_timeout(frame_delay) {
                Ok(WorkerCommand::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                    info!(%source, "terminating sensor loop");
                    return Ok(());
                }
                Err(mpsc::RecvTimeoutError::Timeout) => (),
            }
        }
    }
}

#[cfg(test)]
mod worker_test {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use anyhow::anyhow;

    use super::{Sensor, SensorWorker, ThermalSensor, WorkerCommand};
    use crate::camera::error::SensorError;
    use crate::camera::mock_camera::MockThermalCamera;
    use crate::camera::settings::CommonCameraSettings;
    use crate::frame::{Frame, Source};
    use crate::render::ThermalColorMap;
    use crate::slot::FrameSlot;

    /// Plays back a list of results, then keeps returning frames.
    struct ScriptedSensor {
        script: VecDeque<Result<Frame, SensorError>>,
    }

    impl ScriptedSensor {
        fn new(script: Vec<Result<Frame, SensorError>>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    fn frame(value: u8) -> Frame {
        Frame::solid(4, 4, &[value, value, value], Source::Visible).unwrap()
    }

    impl Sensor for ScriptedSensor {
        fn source(&self) -> Source {
            Source::Visible
        }

        fn acquire(&mut self) -> Result<Frame, SensorError> {
            self.script.pop_front().unwrap_or_else(|| Ok(frame(0)))
        }

        fn frame_delay(&self) -> Duration {
            Duration::from_millis(1)
        }
    }

    #[test]
    fn classifies_errors() {
        let slot = Arc::new(FrameSlot::new());
        let sensor = ScriptedSensor::new(vec![
            Err(SensorError::NotReady),
            Err(SensorError::Transient(anyhow!("bus hiccup"))),
            Ok(frame(7)),
            Err(SensorError::Fatal(anyhow!("device unplugged"))),
        ]);
        let (mut worker, _commands) = SensorWorker::new(sensor, Arc::clone(&slot));
        assert_eq!(worker.acquire_once().unwrap(), false);
        assert!(slot.is_empty());
        assert_eq!(worker.acquire_once().unwrap(), false);
        assert!(slot.is_empty());
        assert_eq!(worker.acquire_once().unwrap(), true);
        assert_eq!(slot.snapshot(), Some(frame(7)));
        let fatal = worker.acquire_once();
        assert!(matches!(fatal, Err(SensorError::Fatal(_))));
        // The last good frame is left alone
        assert_eq!(slot.snapshot(), Some(frame(7)));
        assert_eq!(slot.version(), 1);
    }

    #[test]
    fn fatal_error_ends_loop() {
        let slot = Arc::new(FrameSlot::new());
        let sensor = ScriptedSensor::new(vec![
            Ok(frame(1)),
            Err(SensorError::Transient(anyhow!("timeout"))),
            Err(SensorError::Fatal(anyhow!("permission denied"))),
        ]);
        let (worker, _commands) = SensorWorker::new(sensor, Arc::clone(&slot));
        let result = worker.run();
        assert!(matches!(result, Err(SensorError::Fatal(_))));
        assert_eq!(slot.version(), 1);
    }

    #[test]
    fn shutdown_stops_loop() {
        let slot = Arc::new(FrameSlot::new());
        let (worker, commands) =
            SensorWorker::new(ScriptedSensor::new(vec![]), Arc::clone(&slot));
        let handle = thread::spawn(move || worker.run());
        while slot.version() < 3 {
            thread::sleep(Duration::from_millis(1));
        }
        commands.send(WorkerCommand::Shutdown).unwrap();
        assert!(handle.join().unwrap().is_ok());
        let stopped_at = slot.version();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(slot.version(), stopped_at);
    }

    #[test]
    fn dropped_sender_stops_loop() {
        let slot = Arc::new(FrameSlot::new());
        let (worker, commands) =
            SensorWorker::new(ScriptedSensor::new(vec![]), Arc::clone(&slot));
        let handle = thread::spawn(move || worker.run());
        while slot.is_empty() {
            thread::sleep(Duration::from_millis(1));
        }
        drop(commands);
        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn thermal_sensor_colors_samples() {
        let camera = MockThermalCamera::uniform(30.0, 8.0).unwrap();
        let mut sensor = ThermalSensor::new(
            Box::new(camera),
            ThermalColorMap::default(),
            CommonCameraSettings::default(),
        );
        let frame = sensor.acquire().unwrap();
        assert_eq!(frame.source(), Source::Thermal);
        assert_eq!(frame.dimensions(), (32, 24));
        assert_eq!(sensor.frame_delay(), Duration::from_millis(125));
    }
}

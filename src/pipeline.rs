// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::{anyhow, Context as _};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::oneshot;
use tokio::task::spawn_blocking;
use tokio::time::{self, Duration};
use tracing::{debug, debug_span, error, info, info_span, warn};
use tracing_futures::Instrument;

use std::sync::{mpsc, Arc};

use crate::camera::{Sensor, SensorWorker, ThermalSensor, VisibleSensor, WorkerCommand};
use crate::fusion::{BlendEngine, Compositor, CompositorCommand, PolicyHandle};
use crate::render::ThermalColorMap;
use crate::settings::Settings;
use crate::slot::FrameSlot;
use crate::stream::{self, MjpegStream};
use crate::util::flatten_join_result;

type InnerTask = BoxFuture<'static, anyhow::Result<()>>;
type TaskList = FuturesUnordered<InnerTask>;

const SERVER_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Everything that's running: two sensor threads, the compositor thread, and the HTTP server.
pub(crate) struct Pipeline {
    worker_channels: Vec<mpsc::Sender<WorkerCommand>>,
    workers: TaskList,
    compositor_channel: mpsc::Sender<CompositorCommand>,
    compositor: InnerTask,
    server_shutdown: oneshot::Sender<()>,
    server: InnerTask,
}

/// Run a sensor on the blocking thread pool.
///
/// A sensor failing for good is logged, but doesn't stop anything else; its slot just stops
/// updating.
fn spawn_worker<S>(sensor: S, slot: Arc<FrameSlot>) -> (mpsc::Sender<WorkerCommand>, InnerTask)
where
    S: Sensor + Send + 'static,
{
    let source = sensor.source();
    let (worker, channel) = SensorWorker::new(sensor, slot);
    let span = debug_span!("sensor_worker", %source);
    let task = spawn_blocking(move || {
        let _entered = span.enter();
        if let Err(err) = worker.run() {
            error!("sensor stopped: {}", err);
        }
    })
    .map(|res| flatten_join_result(res.map(Ok::<(), anyhow::Error>)))
    .boxed();
    (channel, task)
}

impl Pipeline {
    pub(crate) fn new(config: Settings) -> anyhow::Result<Self> {
        let thermal_slot = Arc::new(FrameSlot::new());
        let visible_slot = Arc::new(FrameSlot::new());
        debug!("setting up thermal camera");
        let thermal_camera = config
            .thermal
            .create_camera()
            .context("Error configuring thermal camera")?;
        let thermal_sensor = ThermalSensor::new(
            thermal_camera,
            ThermalColorMap::from(&config.render),
            *config.thermal.common(),
        );
        debug!("setting up visible camera");
        let visible_camera = config
            .visible
            .create_camera()
            .context("Error configuring visible camera")?;
        let visible_sensor = VisibleSensor::new(visible_camera, *config.visible.common());
        let (thermal_channel, thermal_task) =
            spawn_worker(thermal_sensor, Arc::clone(&thermal_slot));
        let (visible_channel, visible_task) =
            spawn_worker(visible_sensor, Arc::clone(&visible_slot));
        let workers: TaskList = vec![thermal_task, visible_task].into_iter().collect();

        let policy = PolicyHandle::new(config.fusion.policy);
        let engine = BlendEngine::new(
            config.fusion.alignment,
            config.fusion.canvas(),
            config.render.scaling_method,
            policy.clone(),
            config.fusion.default_alpha,
            config.fusion.layout,
        );
        let mjpeg = MjpegStream::new();
        let (compositor, compositor_channel) = Compositor::new(
            engine,
            config.streams.encoder(),
            visible_slot,
            thermal_slot,
            mjpeg.clone(),
            config.fusion.poll_interval(),
        );
        let compositor = compositor.with_min_frame_interval(config.streams.min_frame_interval());
        let latest = compositor.latest_slot();
        let span = debug_span!("compositor");
        let compositor_task = spawn_blocking(move || span.in_scope(|| compositor.run()))
            .map(|res| flatten_join_result(res.map(Ok::<(), anyhow::Error>)))
            .boxed();

        let mut routes = Vec::new();
        if config.streams.mjpeg.enabled {
            routes.push(stream::mjpeg_route(mjpeg));
        } else {
            info!("MJPEG stream disabled");
        }
        routes.push(stream::snapshot_route(latest, config.streams.encoder()));
        routes.push(stream::policy_route(policy));
        let combined_route =
            stream::combine(routes).ok_or_else(|| anyhow!("problem creating HTTP routes"))?;
        let bind_address = config.streams.socket_address();
        debug!(address = ?bind_address, "creating warp server");
        let (server_shutdown, shutdown_signal) = oneshot::channel::<()>();
        let (bound_address, server) = warp::serve(combined_route)
            .try_bind_with_graceful_shutdown(bind_address, async {
                shutdown_signal.await.ok();
            })
            .with_context(|| format!("Unable to listen on {}", bind_address))?;
        info!(address = %bound_address, "serving composite stream");
        let server = tokio::spawn(server.instrument(info_span!("warp_server")))
            .map(|res| flatten_join_result(res.map(Ok::<(), anyhow::Error>)))
            .boxed();

        Ok(Self {
            worker_channels: vec![thermal_channel, visible_channel],
            workers,
            compositor_channel,
            compositor: compositor_task,
            server_shutdown,
            server,
        })
    }

    /// Run until Ctrl-C, then stop the sensors, the compositor, and the server, in that order.
    pub(crate) async fn run(self) -> anyhow::Result<()> {
        let Self {
            worker_channels,
            mut workers,
            compositor_channel,
            compositor,
            server_shutdown,
            mut server,
        } = self;
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("Unable to listen for Ctrl-C")?;
                info!("shutting down");
            }
            res = &mut server => {
                res?;
                return Err(anyhow!("HTTP server stopped unexpectedly"));
            }
        }
        for channel in worker_channels {
            // A worker that already stopped has dropped its receiver.
            if channel.send(WorkerCommand::Shutdown).is_err() {
                debug!("sensor worker already stopped");
            }
        }
        while let Some(res) = workers.next().await {
            res?;
        }
        if compositor_channel.send(CompositorCommand::Shutdown).is_err() {
            warn!("compositor already stopped");
        }
        compositor.await?;
        // MJPEG clients never hang up on their own, so they only get a moment to finish.
        drop(server_shutdown);
        match time::timeout(SERVER_SHUTDOWN_GRACE, server).await {
            Ok(res) => res,
            Err(_) => {
                debug!("closing remaining HTTP connections");
                Ok(())
            }
        }
    }
}

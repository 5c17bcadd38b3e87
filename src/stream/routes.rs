// SPDX-License-Identifier: GPL-3.0-or-later
use std::convert::Infallible;
use std::sync::Arc;

use anyhow::anyhow;
use http::header::CONTENT_TYPE;
use http::StatusCode;
use hyper::Body;
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};
use warp::filters::BoxedFilter;
use warp::reply::{self, Reply, Response};
use warp::Filter;

use crate::fusion::{BlendPolicy, PolicyHandle};
use crate::slot::FrameSlot;

use super::jpeg::JpegEncoder;
use super::mjpeg::MjpegStream;

pub(crate) type Route = BoxedFilter<(Response,)>;

/// Policies are small, anything bigger than this is a mistake.
const MAX_POLICY_BODY: u64 = 4 * 1024;

fn error_reply(message: impl ToString, status: StatusCode) -> Response {
    reply::with_status(message.to_string(), status).into_response()
}

/// `GET /mjpeg` and `GET /video_feed`
pub(crate) fn mjpeg(stream: MjpegStream) -> Route {
    warp::get()
        .and(warp::path("mjpeg").or(warp::path("video_feed")).unify())
        .and(warp::path::end())
        .map(move || {
            debug!("new MJPEG client");
            reply::with_header(
                Response::new(stream.body()),
                CONTENT_TYPE,
                stream.content_type(),
            )
            .into_response()
        })
        .boxed()
}

/// `GET /snapshot.jpg`
pub(crate) fn snapshot(latest: Arc<FrameSlot>, encoder: JpegEncoder) -> Route {
    warp::get()
        .and(warp::path("snapshot.jpg"))
        .and(warp::path::end())
        .and_then(move || {
            let latest = Arc::clone(&latest);
            async move { Ok::<_, Infallible>(snapshot_reply(&latest, encoder).await) }
        })
        .boxed()
}

async fn snapshot_reply(latest: &FrameSlot, encoder: JpegEncoder) -> Response {
    let frame = match latest.snapshot() {
        Some(frame) => frame,
        None => {
            return error_reply("no composite available yet", StatusCode::SERVICE_UNAVAILABLE)
        }
    };
    let encoded = spawn_blocking(move || encoder.encode(&frame))
        .await
        .map_err(|err| anyhow!("JPEG encoding thread failed: {}", err))
        .and_then(|res| res.map_err(anyhow::Error::from));
    match encoded {
        Ok(jpeg) => {
            reply::with_header(Response::new(Body::from(jpeg)), CONTENT_TYPE, "image/jpeg")
                .into_response()
        }
        Err(err) => {
            warn!("unable to encode snapshot: {:#}", err);
            error_reply("unable to encode snapshot", StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// `GET /policy` and `PUT /policy`
pub(crate) fn policy(handle: PolicyHandle) -> Route {
    let current = handle.clone();
    let get = warp::get()
        .and(warp::path::end())
        .map(move || reply::json(&current.get()).into_response());
    let put = warp::put()
        .and(warp::path::end())
        .and(warp::body::content_length_limit(MAX_POLICY_BODY))
        .and(warp::body::json())
        .map(move |policy: BlendPolicy| match handle.set(policy) {
            Ok(()) => {
                info!(?policy, "blend policy changed");
                reply::json(&policy).into_response()
            }
            Err(err) => {
                debug!("rejecting blend policy: {}", err);
                error_reply(err, StatusCode::BAD_REQUEST)
            }
        });
    warp::path("policy")
        .and(get.or(put).unify())
        .boxed()
}

/// Join a set of routes into one filter.
pub(crate) fn combine(routes: Vec<Route>) -> Option<Route> {
    routes
        .into_iter()
        .reduce(|combined, next| combined.or(next).unify().boxed())
}

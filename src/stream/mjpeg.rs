// SPDX-License-Identifier: GPL-3.0-or-later
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use futures::future;
use futures::stream::{Stream, StreamExt};
use hyper::Body;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

const BOUNDARY: &str = "frame";

type SendError = watch::error::SendError<Option<Bytes>>;

/// Wrap a JPEG image in a multipart section.
pub(crate) fn frame_chunk(jpeg: &[u8]) -> Bytes {
    let header = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", BOUNDARY);
    let mut chunk = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    chunk.put_slice(header.as_bytes());
    chunk.put_slice(jpeg);
    chunk.put_slice(b"\r\n");
    chunk.freeze()
}

/// Fans the latest framed JPEG out to every connected client.
///
/// Clients that fall behind skip straight to the newest frame. Until the first frame is sent,
/// clients receive nothing.
#[derive(Clone, Debug)]
pub(crate) struct MjpegStream {
    sender: Arc<watch::Sender<Option<Bytes>>>,
    receiver: watch::Receiver<Option<Bytes>>,
}

impl MjpegStream {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub(crate) fn content_type(&self) -> String {
        format!("multipart/x-mixed-replace; boundary={}", BOUNDARY)
    }

    pub(crate) fn send_frame(&self, jpeg: &[u8]) -> Result<(), SendError> {
        self.sender.send(Some(frame_chunk(jpeg)))
    }

    /// The most recently sent chunk, framing included.
    #[cfg(test)]
    pub(crate) fn latest_chunk(&self) -> Option<Bytes> {
        self.receiver.borrow().clone()
    }

    pub(crate) fn chunks(&self) -> impl Stream<Item = Bytes> {
        WatchStream::new(self.receiver.clone()).filter_map(future::ready)
    }

    pub(crate) fn body(&self) -> Body {
        let result_stream = self.chunks().map(Result::<Bytes, hyper::http::Error>::Ok);
        Body::wrap_stream(result_stream)
    }
}

impl Default for MjpegStream {
    fn default() -> Self {
        Self::new()
    }
}

// SPDX-License-Identifier: GPL-3.0-or-later
use parking_lot::Mutex;

use crate::frame::Frame;

/// A frame copied out of a [`FrameSlot`], along with the slot version it was published as.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct VersionedFrame {
    pub(crate) frame: Frame,
    pub(crate) version: u64,
}

#[derive(Debug, Default)]
struct SlotState {
    frame: Option<Frame>,
    version: u64,
}

/// A single-slot, latest-wins holder for the most recent frame from one producer.
///
/// Publishing replaces whatever was there, read or not. Readers always get their own copy of the
/// frame, and the lock is only held long enough to move a frame in or clone it out. The version
/// starts at 0 (empty) and increases by one with every publish.
#[derive(Debug, Default)]
pub(crate) struct FrameSlot {
    state: Mutex<SlotState>,
}

impl FrameSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn publish(&self, frame: Frame) {
        let previous = {
            let mut state = self.state.lock();
            state.version += 1;
            state.frame.replace(frame)
        };
        // Free the replaced buffer outside of the lock.
        drop(previous);
    }

    /// A copy of the latest frame, or `None` if nothing has been published yet.
    pub(crate) fn snapshot(&self) -> Option<Frame> {
        self.state.lock().frame.clone()
    }

    pub(crate) fn snapshot_versioned(&self) -> Option<VersionedFrame> {
        let state = self.state.lock();
        state.frame.clone().map(|frame| VersionedFrame {
            frame,
            version: state.version,
        })
    }

    pub(crate) fn version(&self) -> u64 {
        self.state.lock().version
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.state.lock().frame.is_none()
    }
}

#[cfg(test)]
mod slot_test {
    use std::sync::Arc;
    use std::thread;

    use super::FrameSlot;
    use crate::frame::{Frame, Source};

    fn gray(value: u8) -> Frame {
        Frame::solid(64, 48, &[value], Source::Thermal).unwrap()
    }

    #[test]
    fn starts_empty() {
        let slot = FrameSlot::new();
        assert!(slot.is_empty());
        assert_eq!(slot.snapshot(), None);
        assert_eq!(slot.snapshot_versioned(), None);
        assert_eq!(slot.version(), 0);
    }

    #[test]
    fn latest_wins() {
        let slot = FrameSlot::new();
        slot.publish(gray(1));
        slot.publish(gray(2));
        let latest = slot.snapshot_versioned().unwrap();
        assert_eq!(latest.version, 2);
        assert!(latest.frame.data().iter().all(|v| *v == 2));
    }

    #[test]
    fn snapshot_is_a_copy() {
        let slot = FrameSlot::new();
        slot.publish(gray(7));
        let before = slot.snapshot().unwrap();
        slot.publish(gray(8));
        assert!(before.data().iter().all(|v| *v == 7));
        assert_eq!(slot.version(), 2);
    }

    #[test]
    fn no_torn_frames() {
        const PUBLISHES: usize = 2_000;
        let slot = Arc::new(FrameSlot::new());
        let writer_slot = Arc::clone(&slot);
        let writer = thread::spawn(move || {
            for i in 0..PUBLISHES {
                writer_slot.publish(gray((i % 256) as u8));
            }
        });
        let readers: Vec<_> = (0..3)
            .map(|_| {
                let reader_slot = Arc::clone(&slot);
                thread::spawn(move || {
                    let mut last_version = 0;
                    for _ in 0..PUBLISHES {
                        if let Some(versioned) = reader_slot.snapshot_versioned() {
                            let first = versioned.frame.data()[0];
                            assert!(
                                versioned.frame.data().iter().all(|v| *v == first),
                                "torn frame read"
                            );
                            // Every frame with version n was written with value (n - 1) % 256
                            assert_eq!(first as u64, (versioned.version - 1) % 256);
                            assert!(versioned.version >= last_version);
                            last_version = versioned.version;
                        }
                    }
                })
            })
            .collect();
        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(slot.version(), PUBLISHES as u64);
    }
}

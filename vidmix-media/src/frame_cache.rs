//! Frame Buffer Cache
//!
//! A single-slot, last-writer-wins holder for the most recent frame of one track.
//! Producers overwrite the slot and bump a monotonic version; the renderer
//! compares versions to decide whether the texture needs re-uploading.

use crate::tracks::VideoFrame;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Counters kept by a cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Frames pushed since creation
    pub frames_received: u64,
    /// Frames overwritten before a renderer acknowledged them
    pub frames_dropped: u64,
    /// Current frame version
    pub version: u64,
}

/// Latest-frame slot for one track
#[derive(Debug)]
pub struct FrameBufferCache {
    track_id: String,
    slot: Mutex<Option<(Arc<VideoFrame>, u64)>>,
    version: AtomicU64,
    acknowledged: AtomicU64,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    disposed: AtomicBool,
}

impl FrameBufferCache {
    /// Create an empty cache; version 0 means "no frame yet"
    pub fn new(track_id: impl Into<String>) -> Self {
        Self {
            track_id: track_id.into(),
            slot: Mutex::new(None),
            version: AtomicU64::new(0),
            acknowledged: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    /// Store `frame` as the latest frame and return its version
    ///
    /// Never waits on the consumer: an unread frame is simply replaced.
    /// Frames pushed after [`dispose`](Self::dispose) are discarded.
    pub fn push(&self, frame: impl Into<Arc<VideoFrame>>) -> u64 {
        if self.disposed.load(Ordering::Acquire) {
            debug!("Dropping frame for disposed track {}", self.track_id);
            return self.version.load(Ordering::Acquire);
        }

        let frame = frame.into();
        self.frames_received.fetch_add(1, Ordering::Relaxed);

        let mut slot = self.slot.lock();
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some((_, previous)) = slot.as_ref() {
            if *previous > self.acknowledged.load(Ordering::Acquire) {
                self.frames_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        *slot = Some((frame, version));
        version
    }

    /// Current frame and its version, without blocking producers for longer than a pointer copy
    pub fn latest(&self) -> Option<(Arc<VideoFrame>, u64)> {
        self.slot
            .lock()
            .as_ref()
            .map(|(frame, version)| (Arc::clone(frame), *version))
    }

    /// Version of the latest frame (0 before the first push)
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Record that the frame with `version` has been consumed
    pub fn acknowledge(&self, version: u64) {
        self.acknowledged.fetch_max(version, Ordering::AcqRel);
    }

    /// Whether a frame newer than the last acknowledged one is waiting
    pub fn has_pending(&self) -> bool {
        self.version() > self.acknowledged.load(Ordering::Acquire)
    }

    /// Release the held frame; later pushes are ignored
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.slot.lock().take();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            version: self.version(),
        }
    }
}

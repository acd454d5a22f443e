//! Outbound frame queue
//!
//! Decouples the capture thread from the connection: `FrameSender::send`
//! is synchronous and never blocks, so it is safe to call from inside
//! the device callback. A writer task drains the other end.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::protocol::OutboundFrame;
use crate::transport::SendPolicy;

struct QueueInner {
    frames: Mutex<VecDeque<OutboundFrame>>,
    notify: Notify,
    policy: SendPolicy,
    closed: AtomicBool,
    /// Frames accepted into the queue
    frames_queued: AtomicU64,
    /// Frames discarded by the drop-oldest policy
    frames_dropped: AtomicU64,
}

/// Create a sender/receiver pair for outbound frames
pub fn outbound_channel(policy: SendPolicy) -> (FrameSender, FrameReceiver) {
    let inner = Arc::new(QueueInner {
        frames: Mutex::new(VecDeque::new()),
        notify: Notify::new(),
        policy,
        closed: AtomicBool::new(false),
        frames_queued: AtomicU64::new(0),
        frames_dropped: AtomicU64::new(0),
    });
    (
        FrameSender {
            inner: inner.clone(),
        },
        FrameReceiver { inner },
    )
}

/// Fire-and-forget producer half; cheap to clone
#[derive(Clone)]
pub struct FrameSender {
    inner: Arc<QueueInner>,
}

impl FrameSender {
    /// Queue a frame for delivery. Never blocks; under `DropOldest` a
    /// full queue evicts its head frame.
    pub fn send(&self, frame: OutboundFrame) {
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }

        let mut frames = self.inner.frames.lock();
        frames.push_back(frame);
        self.inner.frames_queued.fetch_add(1, Ordering::Relaxed);

        if let SendPolicy::DropOldest { capacity } = self.inner.policy {
            while frames.len() > capacity {
                frames.pop_front();
                self.inner.frames_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        drop(frames);

        self.inner.notify.notify_one();
    }

    /// Close the queue; the receiver drains what is left, then ends.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Get statistics
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            frames_queued: self.inner.frames_queued.load(Ordering::Relaxed),
            frames_dropped: self.inner.frames_dropped.load(Ordering::Relaxed),
            depth: self.inner.frames.lock().len(),
        }
    }
}

/// Consumer half, held by the connection's writer task
pub struct FrameReceiver {
    inner: Arc<QueueInner>,
}

impl FrameReceiver {
    /// Next frame in order, waiting if the queue is empty. Returns
    /// `None` once the queue is closed and drained.
    pub async fn recv(&mut self) -> Option<OutboundFrame> {
        loop {
            {
                let mut frames = self.inner.frames.lock();
                if let Some(frame) = frames.pop_front() {
                    return Some(frame);
                }
            }
            if self.inner.closed.load(Ordering::Acquire) {
                return None;
            }
            self.inner.notify.notified().await;
        }
    }

    /// Next frame if one is ready
    pub fn try_recv(&mut self) -> Option<OutboundFrame> {
        self.inner.frames.lock().pop_front()
    }
}

/// Outbound queue statistics
#[derive(Debug, Clone)]
pub struct QueueStats {
    pub frames_queued: u64,
    pub frames_dropped: u64,
    pub depth: usize,
}

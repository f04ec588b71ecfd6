//! Temporal presence gate: a recognition only counts once an identity has
//! been matched in `K` observations.
//!
//! Windows are FIFO by submission order and never expire by wall-clock time.
//! An identity that stops appearing keeps its stale window until it is
//! cleared or the process restarts.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

/// Default number of matched observations required for presence.
pub const DEFAULT_PRESENCE_FRAMES: usize = 3;

/// Outcome of one observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PresenceState {
    /// Observations currently in the window.
    pub observed: usize,
    /// Window capacity `K`.
    pub required: usize,
    /// Mean of the window once it is full.
    pub mean_confidence: Option<f32>,
}

impl PresenceState {
    pub fn is_confirmed(&self) -> bool {
        self.mean_confidence.is_some()
    }
}

/// Per-identity sliding windows of recent match confidences.
pub struct PresenceBuffer {
    inner: Mutex<Inner>,
}

struct Inner {
    capacity: usize,
    windows: HashMap<String, VecDeque<f32>>,
}

impl PresenceBuffer {
    /// Create a buffer requiring `presence_frames` observations. Zero is treated as one.
    pub fn new(presence_frames: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                capacity: presence_frames.max(1),
                windows: HashMap::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Record a confidence for `identity_id`; true once the window is full.
    pub fn observe(&self, identity_id: &str, confidence: f32) -> bool {
        self.observe_state(identity_id, confidence).is_confirmed()
    }

    /// Like [`observe`](Self::observe), returning the window state read under the same lock.
    pub fn observe_state(&self, identity_id: &str, confidence: f32) -> PresenceState {
        let mut inner = self.lock();
        let capacity = inner.capacity;
        let window = inner
            .windows
            .entry(identity_id.to_string())
            .or_insert_with(|| VecDeque::with_capacity(capacity));

        window.push_back(confidence);
        while window.len() > capacity {
            window.pop_front();
        }

        let state = PresenceState {
            observed: window.len(),
            required: capacity,
            mean_confidence: (window.len() == capacity).then(|| mean(window)),
        };
        tracing::trace!(
            identity = identity_id,
            confidence,
            observed = state.observed,
            required = state.required,
            "presence observation"
        );
        state
    }

    /// Mean of the identity's current window, if it has any entries.
    pub fn mean(&self, identity_id: &str) -> Option<f32> {
        self.lock()
            .windows
            .get(identity_id)
            .filter(|w| !w.is_empty())
            .map(mean)
    }

    pub fn window_len(&self, identity_id: &str) -> usize {
        self.lock().windows.get(identity_id).map_or(0, VecDeque::len)
    }

    pub fn clear(&self, identity_id: &str) {
        self.lock().windows.remove(identity_id);
    }

    pub fn clear_all(&self) {
        self.lock().windows.clear();
    }

    /// Change `K`. Existing windows are trimmed from the oldest end.
    pub fn set_capacity(&self, presence_frames: usize) {
        let mut inner = self.lock();
        let capacity = presence_frames.max(1);
        inner.capacity = capacity;
        for window in inner.windows.values_mut() {
            while window.len() > capacity {
                window.pop_front();
            }
        }
        tracing::info!(presence_frames = capacity, "presence window resized");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn mean(window: &VecDeque<f32>) -> f32 {
    window.iter().sum::<f32>() / window.len() as f32
}

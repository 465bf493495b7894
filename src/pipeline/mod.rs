//! Bounded, ordered, concurrent media loading.
//!
//! A ring of N slots tracks in-flight decodes. Paths are pulled from the
//! queue in order and dispatched to a worker pool; `pop` hands slots back
//! in the exact submission order regardless of decode timing.

pub mod loader;
pub mod path_queue;

pub use loader::{Frame, MediaLoader};
pub use path_queue::PathQueue;

use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Sender};
use parking_lot::{Condvar, Mutex};

use crate::error::Error;

/// A finished unit of work: either a loader or the error that prevented
/// one.
pub struct PipelineSlot {
    pub path: String,
    pub loader: Option<MediaLoader>,
    pub error: Option<Error>,
}

enum SlotState {
    Loading,
    Done(PipelineSlot),
}

struct PipeState {
    ring: Vec<Option<SlotState>>,
    first: usize,
}

struct Shared {
    state: Mutex<PipeState>,
    cond: Condvar,
}

pub struct MediaPipeline {
    shared: Arc<Shared>,
    queue: PathQueue,
    dispatch: Option<Sender<(usize, String)>>,
    workers: Vec<JoinHandle<()>>,
    n_slots: usize,
}

impl MediaPipeline {
    /// `n_threads` bounds both the worker pool and the decode-ahead
    /// window. The queue should be closed by the producer once all paths
    /// are pushed.
    pub fn new(queue: PathQueue, n_threads: usize) -> Self {
        let n_slots = n_threads.max(1);
        let shared = Arc::new(Shared {
            state: Mutex::new(PipeState {
                ring: (0..n_slots).map(|_| None).collect(),
                first: 0,
            }),
            cond: Condvar::new(),
        });

        let (tx, rx) = bounded::<(usize, String)>(n_slots);
        let mut workers = Vec::with_capacity(n_slots);
        for _ in 0..n_slots {
            let shared = Arc::clone(&shared);
            let rx = rx.clone();
            workers.push(std::thread::spawn(move || {
                while let Ok((index, path)) = rx.recv() {
                    let result = MediaLoader::open(Path::new(&path));
                    let slot = match result {
                        Ok(loader) => PipelineSlot {
                            path,
                            loader: Some(loader),
                            error: None,
                        },
                        Err(error) => PipelineSlot {
                            path,
                            loader: None,
                            error: Some(error),
                        },
                    };

                    let mut state = shared.state.lock();
                    state.ring[index] = Some(SlotState::Done(slot));
                    shared.cond.notify_all();
                }
            }));
        }

        Self {
            shared,
            queue,
            dispatch: Some(tx),
            workers,
            n_slots,
        }
    }

    fn nth_slot(&self, first: usize, n: usize) -> usize {
        (first + n) % self.n_slots
    }

    /// Pulls paths into any empty ring slots. Queue popping happens
    /// without the ring lock so workers can land results meanwhile.
    fn fill(&self) {
        for i in 0..self.n_slots {
            let index;
            {
                let state = self.shared.state.lock();
                index = self.nth_slot(state.first, i);
                if state.ring[index].is_some() {
                    continue;
                }
            }

            let Some(path) = self.queue.pop() else {
                return;
            };

            {
                let mut state = self.shared.state.lock();
                state.ring[index] = Some(SlotState::Loading);
            }
            if let Some(tx) = &self.dispatch {
                let _ = tx.send((index, path));
            }
        }
    }

    /// Returns the next slot in submission order, blocking until its
    /// decode finishes. `None` once the queue is exhausted and the ring
    /// has drained.
    pub fn pop(&self) -> Option<PipelineSlot> {
        loop {
            self.fill();

            let mut state = self.shared.state.lock();
            let head = self.nth_slot(state.first, 0);
            match &state.ring[head] {
                None => return None,
                Some(SlotState::Done(_)) => {
                    let Some(SlotState::Done(slot)) = state.ring[head].take() else {
                        unreachable!();
                    };
                    state.first = state.first.wrapping_add(1) % self.n_slots;
                    return Some(slot);
                }
                Some(SlotState::Loading) => {
                    self.shared.cond.wait(&mut state);
                }
            }
        }
    }
}

impl Drop for MediaPipeline {
    fn drop(&mut self) {
        // Stop feeding; workers finish whatever was dispatched and exit
        // when the channel closes.
        self.dispatch.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

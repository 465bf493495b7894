//! Ordered queue of input paths, fed from argument lists or token
//! streams, consumed by the media pipeline.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::term::stream::StreamReader;

/// Longest path token accepted from a stream.
const PATH_TOKEN_MAX: usize = 4096;

enum Entry {
    Path(String),
    /// A token stream (e.g. stdin with `\n` or NUL separators) drained
    /// lazily, in place, preserving overall ordering.
    Stream(StreamReader),
}

struct State {
    entries: VecDeque<Entry>,
    closed: bool,
    n_processed: u64,
}

struct Inner {
    state: Mutex<State>,
    cond: Condvar,
}

#[derive(Clone)]
pub struct PathQueue {
    inner: Arc<Inner>,
}

impl Default for PathQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PathQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    entries: VecDeque::new(),
                    closed: false,
                    n_processed: 0,
                }),
                cond: Condvar::new(),
            }),
        }
    }

    pub fn push(&self, path: &str) {
        let mut state = self.inner.state.lock();
        debug_assert!(!state.closed);
        state.entries.push_back(Entry::Path(path.to_string()));
        self.inner.cond.notify_all();
    }

    pub fn push_list<I: IntoIterator<Item = String>>(&self, paths: I) {
        let mut state = self.inner.state.lock();
        debug_assert!(!state.closed);
        for path in paths {
            state.entries.push_back(Entry::Path(path));
        }
        self.inner.cond.notify_all();
    }

    /// Appends a token stream; its tokens are yielded when the queue
    /// reaches this position.
    pub fn push_stream(&self, reader: StreamReader) {
        let mut state = self.inner.state.lock();
        debug_assert!(!state.closed);
        state.entries.push_back(Entry::Stream(reader));
        self.inner.cond.notify_all();
    }

    /// No more pushes will follow; unblocks poppers at end of queue.
    pub fn close(&self) {
        self.inner.state.lock().closed = true;
        self.inner.cond.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().entries.is_empty()
    }

    pub fn n_processed(&self) -> u64 {
        self.inner.state.lock().n_processed
    }

    /// Pops the next path, blocking until one is available or the queue
    /// is closed and drained (then `None`).
    pub fn pop(&self) -> Option<String> {
        loop {
            let mut state = self.inner.state.lock();
            match state.entries.front() {
                Some(Entry::Path(_)) => {
                    let Some(Entry::Path(path)) = state.entries.pop_front() else {
                        unreachable!();
                    };
                    state.n_processed += 1;
                    return Some(path);
                }
                Some(Entry::Stream(_)) => {
                    let Some(Entry::Stream(reader)) = state.entries.pop_front() else {
                        unreachable!();
                    };
                    drop(state);

                    // Wait on the stream without holding the queue lock.
                    let token = next_stream_token(&reader);
                    let mut state = self.inner.state.lock();
                    match token {
                        Some(path) => {
                            state.entries.push_front(Entry::Stream(reader));
                            state.n_processed += 1;
                            return Some(path);
                        }
                        // Stream exhausted; fall through to the next
                        // entry.
                        None => continue,
                    }
                }
                None => {
                    if state.closed {
                        return None;
                    }
                    self.inner.cond.wait(&mut state);
                }
            }
        }
    }

    /// Non-blocking pop; `None` when nothing is immediately available.
    pub fn try_pop(&self) -> Option<String> {
        let mut state = self.inner.state.lock();
        match state.entries.front() {
            Some(Entry::Path(_)) => {
                let Some(Entry::Path(path)) = state.entries.pop_front() else {
                    unreachable!();
                };
                state.n_processed += 1;
                Some(path)
            }
            _ => None,
        }
    }
}

/// Blocks until the stream yields a non-empty token or hits EOF.
fn next_stream_token(reader: &StreamReader) -> Option<String> {
    loop {
        match reader.read_token(PATH_TOKEN_MAX) {
            Ok(Some(token)) => {
                if token.is_empty() {
                    continue;
                }
                return Some(String::from_utf8_lossy(&token).into_owned());
            }
            Ok(None) => {
                if reader.is_eof() {
                    return None;
                }
                reader.wait(Some(100));
            }
            Err(err) => {
                log::warn!("skipping oversized path token: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_preserves_push_order() {
        let queue = PathQueue::new();
        queue.push("a.png");
        queue.push_list(["b.png".to_string(), "c.png".to_string()]);
        queue.close();

        assert_eq!(queue.pop().as_deref(), Some("a.png"));
        assert_eq!(queue.pop().as_deref(), Some("b.png"));
        assert_eq!(queue.pop().as_deref(), Some("c.png"));
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.n_processed(), 3);
    }

    #[test]
    fn pop_blocks_until_push() {
        let queue = PathQueue::new();
        let q2 = queue.clone();
        let handle = std::thread::spawn(move || q2.pop());

        std::thread::sleep(std::time::Duration::from_millis(30));
        queue.push("late.png");
        queue.close();

        assert_eq!(handle.join().unwrap().as_deref(), Some("late.png"));
    }

    #[test]
    fn stream_tokens_interleave_in_position() {
        let mut fds = [0 as libc::c_int; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let (rd, wr) = (fds[0], fds[1]);

        let payload = b"one.png\ntwo.png\n";
        unsafe {
            libc::write(wr, payload.as_ptr() as *const libc::c_void, payload.len());
            libc::close(wr);
        }

        let queue = PathQueue::new();
        queue.push("first.png");
        queue.push_stream(StreamReader::from_fd(rd));
        queue.push("last.png");
        queue.close();

        assert_eq!(queue.pop().as_deref(), Some("first.png"));
        assert_eq!(queue.pop().as_deref(), Some("one.png"));
        assert_eq!(queue.pop().as_deref(), Some("two.png"));
        assert_eq!(queue.pop().as_deref(), Some("last.png"));
        assert_eq!(queue.pop(), None);

        unsafe {
            libc::close(rd);
        }
    }
}

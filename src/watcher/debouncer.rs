//! Fixed-window debouncing of change events.
//!
//! Each (root, class) pair runs one [`Debouncer`]. The first event in a
//! quiet period opens a window; events arriving before the window closes
//! join it without extending it. When the deadline passes the buffered
//! changes are flushed as one batch, identical changes collapsed to their
//! first occurrence.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use super::event::{ChangeBatch, ChangeKind, PendingChange};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Buffering { deadline: Instant },
}

#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    state: DebounceState,
    buffer: Vec<PendingChange>,
    seen: HashSet<PendingChange>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: DebounceState::Idle,
            buffer: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Buffer a change, opening a window if none is open.
    pub fn record(&mut self, change: PendingChange, now: Instant) {
        if self.state == DebounceState::Idle {
            self.state = DebounceState::Buffering {
                deadline: now + self.window,
            };
        }
        if self.seen.insert(change.clone()) {
            self.buffer.push(change);
        }
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            DebounceState::Idle => None,
            DebounceState::Buffering { deadline } => Some(deadline),
        }
    }

    /// Take the buffered changes if the window has closed.
    pub fn poll(&mut self, now: Instant) -> Option<Vec<PendingChange>> {
        match self.state {
            DebounceState::Buffering { deadline } if now >= deadline => Some(self.flush()),
            _ => None,
        }
    }

    /// Take whatever is buffered and go back to idle.
    pub fn flush(&mut self) -> Vec<PendingChange> {
        self.state = DebounceState::Idle;
        self.seen.clear();
        std::mem::take(&mut self.buffer)
    }

    pub fn pending_count(&self) -> usize {
        self.buffer.len()
    }
}

/// Drive a debouncer from a class channel until either end closes.
///
/// A change still buffered when the input closes is discarded.
pub async fn run(
    root: PathBuf,
    kind: ChangeKind,
    window: Duration,
    mut changes: mpsc::Receiver<PendingChange>,
    batches: mpsc::Sender<ChangeBatch>,
) {
    let mut debouncer = Debouncer::new(window);

    loop {
        let change = match debouncer.deadline() {
            None => changes.recv().await,
            Some(deadline) => {
                tokio::select! {
                    change = changes.recv() => change,
                    _ = tokio::time::sleep_until(deadline.into()) => {
                        let Some(flushed) = debouncer.poll(Instant::now()) else {
                            continue;
                        };
                        if flushed.is_empty() {
                            continue;
                        }
                        crate::debug_event!(
                            "debouncer",
                            "flush",
                            "{} {} change(s) under {}",
                            flushed.len(),
                            kind.as_str(),
                            root.display()
                        );
                        let batch = ChangeBatch {
                            root: root.clone(),
                            kind,
                            changes: flushed,
                        };
                        if batches.send(batch).await.is_err() {
                            crate::debug_event!("debouncer", "applier gone, stopping");
                            return;
                        }
                        continue;
                    }
                }
            }
        };

        match change {
            Some(change) => debouncer.record(change, Instant::now()),
            None => {
                if debouncer.pending_count() > 0 {
                    crate::debug_event!(
                        "debouncer",
                        "discarded",
                        "{} buffered {} change(s)",
                        debouncer.pending_count(),
                        kind.as_str()
                    );
                }
                return;
            }
        }
    }
}

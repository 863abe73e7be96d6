// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
//! A carriage-return spinner on stderr with a pause/resume rendezvous.
//!
//! The confirmation gate must print a prompt on the same terminal while the
//! spinner repaints.  Pausing takes the paint lock before clearing the line,
//! so a repaint in flight finishes first and no partial frame survives under
//! the prompt — a single ownership handoff of the terminal.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const FRAMES: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
const TICK: Duration = Duration::from_millis(120);

/// Extra status text appended to the spinner label each tick (e.g. retry
/// progress from the backend).
pub type StatusFn = Box<dyn Fn() -> Option<String> + Send + Sync>;

struct Inner {
    active: AtomicBool,
    paused: AtomicBool,
    shutdown: AtomicBool,
    label: Mutex<String>,
    status: Mutex<Option<StatusFn>>,
    /// Held for the duration of one repaint; `pause` acquires it to wait
    /// out an in-flight frame before touching the terminal.
    paint: Mutex<()>,
}

#[derive(Clone)]
pub struct Spinner {
    inner: Arc<Inner>,
}

impl Spinner {
    /// Create the spinner and spawn its repaint task (idle until `start`).
    pub fn new() -> Self {
        let inner = Arc::new(Inner {
            active: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            label: Mutex::new(String::new()),
            status: Mutex::new(None),
            paint: Mutex::new(()),
        });

        let task_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            let mut frame = 0usize;
            loop {
                tokio::time::sleep(TICK).await;
                if task_inner.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                if !task_inner.active.load(Ordering::SeqCst)
                    || task_inner.paused.load(Ordering::SeqCst)
                {
                    continue;
                }
                let _guard = task_inner.paint.lock().unwrap();
                // Re-check under the lock: pause may have cleared the line.
                if task_inner.paused.load(Ordering::SeqCst) {
                    continue;
                }
                let label = task_inner.label.lock().unwrap().clone();
                let status = task_inner
                    .status
                    .lock()
                    .unwrap()
                    .as_ref()
                    .and_then(|f| f())
                    .map(|s| format!(" — {s}"))
                    .unwrap_or_default();
                let mut err = std::io::stderr();
                let _ = write!(err, "\r\x1b[2K{} {label}{status}", FRAMES[frame % FRAMES.len()]);
                let _ = err.flush();
                frame += 1;
            }
        });

        Self { inner }
    }

    pub fn start(&self, label: &str) {
        *self.inner.label.lock().unwrap() = label.to_string();
        self.inner.paused.store(false, Ordering::SeqCst);
        self.inner.active.store(true, Ordering::SeqCst);
    }

    pub fn set_label(&self, label: &str) {
        *self.inner.label.lock().unwrap() = label.to_string();
    }

    /// Install the per-tick status callback (retry progress display).
    pub fn set_status_fn(&self, f: Option<StatusFn>) {
        *self.inner.status.lock().unwrap() = f;
    }

    /// Stop repainting and clear the line.  The terminal belongs to the
    /// caller until `resume`.
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
        let _guard = self.inner.paint.lock().unwrap();
        clear_line();
    }

    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
    }

    /// End the current activity and clear the line.
    pub fn stop(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
        let _guard = self.inner.paint.lock().unwrap();
        clear_line();
    }

    /// Tear the repaint task down (process exit).
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.stop();
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }
}

fn clear_line() {
    let mut err = std::io::stderr();
    let _ = write!(err, "\r\x1b[2K");
    let _ = err.flush();
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_pause_resume_stop_transitions() {
        let spinner = Spinner::new();
        assert!(!spinner.is_active());

        spinner.start("thinking");
        assert!(spinner.is_active());
        assert!(!spinner.is_paused());

        spinner.pause();
        assert!(spinner.is_paused());
        assert!(spinner.is_active(), "pause keeps the activity");

        spinner.resume();
        assert!(!spinner.is_paused());

        spinner.stop();
        assert!(!spinner.is_active());
        spinner.shutdown();
    }

    #[tokio::test]
    async fn restart_clears_the_paused_flag() {
        let spinner = Spinner::new();
        spinner.start("a");
        spinner.pause();
        spinner.start("b");
        assert!(!spinner.is_paused());
        spinner.shutdown();
    }

    #[tokio::test]
    async fn status_fn_feeds_extra_text() {
        let spinner = Spinner::new();
        spinner.set_status_fn(Some(Box::new(|| Some("retry 1/3 in 2s".into()))));
        let status = spinner
            .inner
            .status
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|f| f());
        assert_eq!(status.as_deref(), Some("retry 1/3 in 2s"));
        spinner.shutdown();
    }
}

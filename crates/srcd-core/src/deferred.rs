//! Progress output that only appears when an operation turns out to be slow.
//!
//! A [`Deferred`] stays silent until its timeout elapses. If the operation
//! finishes first, nothing is printed at all. Otherwise a background worker
//! prints the message once, draws an `indicatif` spinner, or relays lines
//! from a channel until the handle is canceled.
//!
//! ```no_run
//! use srcd_core::Deferred;
//! use std::time::Duration;
//!
//! let progress = Deferred::new(Duration::from_millis(500), "starting gitbase")
//!     .spinner(srcd_core::DEFAULT_SPIN_INTERVAL)
//!     .start(console::Term::stderr());
//! // ... slow work ...
//! progress.cancel();
//! ```

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle, TermLike};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;

pub const DEFAULT_SPIN_INTERVAL: Duration = Duration::from_millis(200);

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const LINE_POLL: Duration = Duration::from_millis(50);

enum Mode {
    Plain,
    Spinner(Duration),
    Lines(Receiver<String>),
}

pub struct Deferred {
    timeout: Duration,
    message: String,
    mode: Mode,
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg} {spinner:.cyan}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS)
}

fn done_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

impl Deferred {
    pub fn new(timeout: Duration, message: impl Into<String>) -> Self {
        Self {
            timeout,
            message: message.into(),
            mode: Mode::Plain,
        }
    }

    #[must_use]
    pub fn spinner(mut self, interval: Duration) -> Self {
        self.mode = Mode::Spinner(interval);
        self
    }

    /// Print every line received on `lines` once active.
    #[must_use]
    pub fn lines(mut self, lines: Receiver<String>) -> Self {
        self.mode = Mode::Lines(lines);
        self
    }

    /// Spawn the worker and return immediately.
    pub fn start<T: TermLike + 'static>(self, term: T) -> DeferredHandle {
        let (cancel_tx, cancel_rx) = mpsc::channel();
        let worker = std::thread::spawn(move || self.run(&cancel_rx, Box::new(term)));
        DeferredHandle {
            cancel: Some(cancel_tx),
            worker: Some(worker),
        }
    }

    fn run(self, cancel: &Receiver<()>, term: Box<dyn TermLike>) {
        match cancel.recv_timeout(self.timeout) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }

        let message = self.message;
        match self.mode {
            Mode::Plain => {
                let _ = term.write_line(&message);
                let _ = term.flush();
                let _ = cancel.recv();
            }
            Mode::Spinner(interval) => {
                let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::term_like(term));
                bar.set_style(spinner_style());
                bar.set_message(message.clone());
                bar.tick();
                bar.enable_steady_tick(interval);
                let _ = cancel.recv();
                bar.set_style(done_style());
                bar.finish_with_message(format!("{message}, done"));
            }
            Mode::Lines(lines) => {
                let _ = term.write_line(&message);
                let _ = term.flush();
                loop {
                    if !matches!(cancel.try_recv(), Err(TryRecvError::Empty)) {
                        // relay what was produced before the cancel
                        for line in lines.try_iter() {
                            let _ = term.write_line(&line);
                        }
                        break;
                    }
                    match lines.recv_timeout(LINE_POLL) {
                        Ok(line) => {
                            let _ = term.write_line(&line);
                            let _ = term.flush();
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                let _ = term.flush();
            }
        }
    }
}

/// Running reporter. Canceling (or dropping) blocks until the worker has
/// written its last byte.
pub struct DeferredHandle {
    cancel: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl DeferredHandle {
    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for DeferredHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

//! Threaded interface for submitting scripts to a session.
//!
//! Tables hold `Rc` callbacks and can't cross threads, so the whole
//! [`Session`] lives on one worker thread. Callers send scripts through a
//! channel and get the result back on a per-request reply channel. Idle
//! notifiers run after every script.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::command::Session;
use crate::config::Settings;
use crate::error::{Result, TableError};

/// Opaque request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EvalId(u64);
impl EvalId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

enum Request {
    Eval {
        id: EvalId,
        script: String,
        reply: Sender<Result<String>>,
    },
    Shutdown,
}

/// Handle to a submitted script.
pub struct EvalHandle {
    pub id: EvalId,
    started: Instant,
    reply: Receiver<Result<String>>,
}
impl EvalHandle {
    /// Blocks until the worker has evaluated the script.
    pub fn wait(self) -> Result<String> {
        self.reply
            .recv()
            .unwrap_or_else(|_| Err(TableError::Argument("session worker has stopped".to_string())))
    }
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

pub struct SessionInterface {
    sender: Sender<Request>,
    next_id: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SessionInterface {
    /// Starts the worker thread with a fresh session.
    pub fn start(settings: Settings) -> Self {
        let (sender, requests) = mpsc::channel::<Request>();
        let worker = std::thread::spawn(move || {
            let mut session = Session::with_settings(&settings);
            while let Ok(request) = requests.recv() {
                let Request::Eval { id, script, reply } = request else {
                    break;
                };
                let result = session.eval(&script);
                let ran = session.update();
                for error in session.take_background_errors() {
                    warn!(eval = id.0, %error, "callback failed");
                }
                debug!(eval = id.0, idle = ran, ok = result.is_ok(), "script evaluated");
                // the caller may have given up on the reply
                let _ = reply.send(result);
            }
            debug!("session worker stopped");
        });
        Self {
            sender,
            next_id: AtomicU64::new(0),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queues a script behind any scripts submitted earlier.
    pub fn submit(&self, script: impl Into<String>) -> EvalHandle {
        let id = EvalId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (reply, receiver) = mpsc::channel();
        let request = Request::Eval {
            id,
            script: script.into(),
            reply,
        };
        if self.sender.send(request).is_err() {
            warn!(eval = id.0, "session worker is gone");
        }
        EvalHandle {
            id,
            started: Instant::now(),
            reply: receiver,
        }
    }

    /// Submits a script and waits for its result.
    pub fn eval(&self, script: impl Into<String>) -> Result<String> {
        self.submit(script).wait()
    }

    /// Stops the worker after the scripts already queued.
    pub fn shutdown(&self) {
        let _ = self.sender.send(Request::Shutdown);
        let worker = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(worker) = worker {
            let _ = worker.join();
        }
    }
}

impl Drop for SessionInterface {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Interactive sessions
///
/// A worker thread owns the child process. The caller talks to it through two
/// channels: an unbounded queue of input lines and an event stream carrying
/// output chunks in production order followed by exactly one `Finished`.
use crate::config::types::{CoderunError, ExecutionOutcome, Result};
use crate::exec::phase::CancelToken;
use crate::utils::output::OutputChunk;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Output(OutputChunk),
    /// Last event of every session
    Finished(ExecutionOutcome),
}

/// Detachable input side of a session, usable from another thread
#[derive(Debug, Clone)]
pub struct SessionInput {
    lines: Sender<String>,
    finished: Arc<AtomicBool>,
}

impl SessionInput {
    /// Queue one line for the program. A trailing newline is added if missing.
    pub fn send(&self, line: impl Into<String>) -> Result<()> {
        if self.finished.load(Ordering::SeqCst) {
            return Err(CoderunError::Session("session has ended".to_string()));
        }
        self.lines
            .send(line.into())
            .map_err(|_| CoderunError::Session("program is no longer reading input".to_string()))
    }
}

pub struct InteractiveSession {
    id: String,
    language: &'static str,
    input: Option<SessionInput>,
    events: Receiver<SessionEvent>,
    cancel: CancelToken,
    finished: Arc<AtomicBool>,
    worker: Option<JoinHandle<ExecutionOutcome>>,
}

impl InteractiveSession {
    pub(crate) fn new(
        id: String,
        language: &'static str,
        lines: Sender<String>,
        events: Receiver<SessionEvent>,
        cancel: CancelToken,
        finished: Arc<AtomicBool>,
        worker: JoinHandle<ExecutionOutcome>,
    ) -> Self {
        Self {
            id,
            language,
            input: Some(SessionInput {
                lines,
                finished: Arc::clone(&finished),
            }),
            events,
            cancel,
            finished,
            worker: Some(worker),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn language(&self) -> &'static str {
        self.language
    }

    pub fn send_input(&self, line: impl Into<String>) -> Result<()> {
        match &self.input {
            Some(input) => input.send(line),
            None => Err(CoderunError::Session(
                "input was closed or handed off".to_string(),
            )),
        }
    }

    /// Move the input side out, e.g. to a thread reading a terminal
    pub fn take_input(&mut self) -> Option<SessionInput> {
        self.input.take()
    }

    /// Signal end of input; the program sees EOF once queued lines are written
    pub fn close_input(&mut self) {
        self.input = None;
    }

    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events
    }

    /// Block for the next event; `None` once the stream is exhausted
    pub fn next_event(&self) -> Option<SessionEvent> {
        self.events.recv().ok()
    }

    pub fn next_event_timeout(&self, timeout: Duration) -> Option<SessionEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Terminate the running phase's process tree. The session still ends
    /// with a `Finished` event carrying a `Cancelled` outcome.
    pub fn cancel(&self) {
        log::debug!("Session {} cancelled by caller", self.id);
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Wait for the session to end and return its outcome
    pub fn wait(mut self) -> ExecutionOutcome {
        self.join()
    }

    fn join(&mut self) -> ExecutionOutcome {
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .unwrap_or_else(|_| ExecutionOutcome::internal("session worker panicked")),
            None => ExecutionOutcome::internal("session already joined"),
        }
    }
}

impl Drop for InteractiveSession {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if !self.is_finished() {
                self.cancel();
            }
            self.join();
        }
    }
}

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::{Transport, TransportEvent};

#[derive(Debug)]
struct ScriptState {
    events: VecDeque<TransportEvent>,
    sent: Vec<String>,
    connected: bool,
    auto_open: bool,
    failing_connects: usize,
    send_budget: Option<usize>,
    connects: usize,
    closes: usize,
}

impl Default for ScriptState {
    fn default() -> Self {
        Self {
            events: VecDeque::new(),
            sent: Vec::new(),
            connected: false,
            auto_open: true,
            failing_connects: 0,
            send_budget: None,
            connects: 0,
            closes: 0,
        }
    }
}

fn lock(state: &Mutex<ScriptState>) -> MutexGuard<'_, ScriptState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory [`Transport`] driven by a [`ScriptHandle`].
///
/// Nothing happens on its own: events appear only when the handle injects
/// them (or when `connect` queues `Open` in auto-open mode). A successful
/// `connect` discards events still queued. `poll_event` never blocks.
#[derive(Debug)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

/// Control side of a [`ScriptedTransport`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ScriptHandle {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    pub fn new() -> (Self, ScriptHandle) {
        let state = Arc::new(Mutex::new(ScriptState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            ScriptHandle { state },
        )
    }
}

impl Transport for ScriptedTransport {
    fn connect(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.connects += 1;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            trace!(attempt = state.connects, "scripted connect failure");
            return Err(TransportError::Rejected("scripted connect failure".into()));
        }
        state.connected = true;
        state.events.clear();
        if state.auto_open {
            state.events.push_back(TransportEvent::Open);
        }
        Ok(())
    }

    fn send_text(&mut self, text: &str) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if let Some(remaining) = state.send_budget.as_mut() {
            if *remaining == 0 {
                return Err(TransportError::Rejected("scripted send failure".into()));
            }
            *remaining -= 1;
        }
        state.sent.push(text.to_string());
        Ok(())
    }

    fn close(&mut self) {
        let mut state = lock(&self.state);
        state.closes += 1;
        if state.connected {
            state.connected = false;
            state.events.push_back(TransportEvent::Close);
        }
    }

    fn poll_event(&mut self, _timeout: Duration) -> Option<TransportEvent> {
        lock(&self.state).events.pop_front()
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

impl ScriptHandle {
    /// Queue an arbitrary event.
    pub fn push(&self, event: TransportEvent) {
        let mut state = lock(&self.state);
        match event {
            TransportEvent::Open => state.connected = true,
            TransportEvent::Close => state.connected = false,
            _ => {}
        }
        state.events.push_back(event);
    }

    pub fn open(&self) {
        self.push(TransportEvent::Open);
    }

    /// Queue an incoming message.
    pub fn message(&self, text: impl Into<String>) {
        self.push(TransportEvent::Message(text.into()));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(TransportEvent::Error(message.into()));
    }

    /// Simulate the peer dropping the connection.
    pub fn disconnect(&self) {
        self.push(TransportEvent::Close);
    }

    /// When disabled, successful connects wait for an explicit [`open`](Self::open).
    pub fn set_auto_open(&self, auto_open: bool) {
        lock(&self.state).auto_open = auto_open;
    }

    /// Make the next `count` connect attempts fail.
    pub fn fail_next_connects(&self, count: usize) {
        lock(&self.state).failing_connects = count;
    }

    /// Allow `count` more sends to succeed, then fail every send after that.
    pub fn limit_sends(&self, count: usize) {
        lock(&self.state).send_budget = Some(count);
    }

    pub fn unlimit_sends(&self) {
        lock(&self.state).send_budget = None;
    }

    /// Messages successfully sent so far.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.state).sent.clone()
    }

    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut lock(&self.state).sent)
    }

    pub fn connect_count(&self) -> usize {
        lock(&self.state).connects
    }

    pub fn close_count(&self) -> usize {
        lock(&self.state).closes
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    pub fn pending_events(&self) -> usize {
        lock(&self.state).events.len()
    }
}

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use shapewire_schema::{References, Schema, Validator, Verdict};
use shapewire_transport::{Transport, TransportEvent};
use tracing::{debug, error, info, warn};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, RequestError, Result};
use crate::route::{Route, Routes};
use crate::state::{ConnectionState, Transition};
use crate::wire::{parse_response, RequestFrame, ResponseBody};

/// Receives the outcome of one request. Invoked exactly once.
pub type Callback = Box<dyn FnOnce(std::result::Result<Value, RequestError>) + Send>;

/// What [`Channel::send`] did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The request failed its schema; the callback has already been invoked.
    Rejected,
    /// The channel is not open; the request waits in the buffer.
    Buffered,
    /// The request was handed to the transport under `order`.
    Sent { order: u64 },
}

struct BufferedRequest {
    route: String,
    message: Value,
    callback: Callback,
}

struct PendingRequest {
    route: String,
    callback: Callback,
    deadline: Option<Instant>,
}

/// Schema-checked request/response channel over a reconnecting transport.
///
/// The channel is a single-owner state machine. Nothing happens in the
/// background: transport events are fed in through [`handle_event`] (or
/// pulled by [`turn`]) and timers fire from [`poll`]. Callbacks run inline
/// on the caller's thread and cannot re-enter the channel.
///
/// [`handle_event`]: Channel::handle_event
/// [`turn`]: Channel::turn
/// [`poll`]: Channel::poll
pub struct Channel<T: Transport> {
    transport: T,
    routes: Routes,
    references: References,
    validator: Validator,
    config: ChannelConfig,
    state: ConnectionState,
    shutdown: bool,
    buffer: VecDeque<BufferedRequest>,
    pending: BTreeMap<u64, PendingRequest>,
    next_order: u64,
    session_id: Option<String>,
    failures: u32,
    reconnect_at: Option<Instant>,
    rng: StdRng,
}

impl<T: Transport> Channel<T> {
    /// Create a channel and start the first connection attempt.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ChannelConfig::default())
    }

    pub fn with_config(transport: T, config: ChannelConfig) -> Self {
        Self::with_validator(transport, Validator::new(), config)
    }

    /// Create a channel whose checks run through `validator` (custom types,
    /// strict mode).
    pub fn with_validator(transport: T, validator: Validator, config: ChannelConfig) -> Self {
        let rng = match config.jitter_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut channel = Self {
            transport,
            routes: Routes::new(),
            references: References::new(),
            validator,
            config,
            state: ConnectionState::Disconnected,
            shutdown: false,
            buffer: VecDeque::new(),
            pending: BTreeMap::new(),
            next_order: 0,
            session_id: None,
            failures: 0,
            reconnect_at: None,
            rng,
        };
        channel.start_connect(Transition::Dial);
        channel
    }

    /// Register a route. Fails if the name is already registered.
    pub fn create_route(
        &mut self,
        name: impl Into<String>,
        request: Schema,
        response: Schema,
    ) -> Result<()> {
        self.routes.insert(Route::new(name, request, response))
    }

    /// Register every route in `routes`. Nothing is registered if any name is taken.
    pub fn add_routes(&mut self, routes: &Routes) -> Result<()> {
        if let Some(taken) = routes.iter().find(|route| self.routes.contains(route.name())) {
            return Err(ChannelError::DuplicateRoute(taken.name().to_string()));
        }
        for route in routes.iter() {
            self.routes.insert(route.clone())?;
        }
        Ok(())
    }

    /// Add a `$Name` schema to the reference table used for every check.
    pub fn add_reference_schema(&mut self, name: &str, schema: Schema) {
        self.references.add_schema(name, schema);
    }

    pub fn references_mut(&mut self) -> &mut References {
        &mut self.references
    }

    /// Validate `message` against the route's request schema and send it, or
    /// buffer it while the channel is not open.
    ///
    /// A schema violation invokes `callback` with `invalidRequest` before
    /// returning [`SendOutcome::Rejected`]. An `Err` means the callback was
    /// dropped without being invoked.
    pub fn send<F>(&mut self, route: &str, message: Value, callback: F) -> Result<SendOutcome>
    where
        F: FnOnce(std::result::Result<Value, RequestError>) + Send + 'static,
    {
        if self.shutdown {
            return Err(ChannelError::Closed);
        }
        let registered = self
            .routes
            .get(route)
            .ok_or_else(|| ChannelError::UnknownRoute(route.to_string()))?;

        if let Verdict::Invalid(violation) =
            self.validator
                .check(&message, registered.request(), &self.references)?
        {
            debug!(route, %violation, "request rejected by schema");
            callback(Err(RequestError::invalid_request(violation.to_string())));
            return Ok(SendOutcome::Rejected);
        }

        if !self.state.is_open() {
            if self.buffer.len() >= self.config.max_buffered {
                warn!(route, max = self.config.max_buffered, "request buffer full");
                return Err(ChannelError::BufferFull(self.config.max_buffered));
            }
            self.buffer.push_back(BufferedRequest {
                route: route.to_string(),
                message,
                callback: Box::new(callback),
            });
            debug!(route, buffered = self.buffer.len(), state = %self.state, "request buffered");
            return Ok(SendOutcome::Buffered);
        }

        Ok(self.transmit(route.to_string(), message, Box::new(callback)))
    }

    /// React to one transport event.
    ///
    /// Protocol faults in inbound frames are logged and the frame dropped.
    /// `Err` is returned only when a response schema cannot be evaluated
    /// (unresolved reference, unknown type); the affected callback has already
    /// received `invalidMessageStructure`.
    pub fn handle_event(&mut self, event: TransportEvent) -> Result<()> {
        match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Message(text) => return self.on_message(&text),
            TransportEvent::Error(reason) => {
                warn!(transport = self.transport.name(), %reason, "transport error");
                self.connection_lost("transport error");
            }
            TransportEvent::Close => self.connection_lost("connection closed"),
        }
        Ok(())
    }

    /// Fire due timers: request deadlines, then the reconnect timer.
    pub fn poll(&mut self, now: Instant) {
        self.expire_requests(now);

        let Some(at) = self.reconnect_at else {
            return;
        };
        if now < at {
            return;
        }
        self.reconnect_at = None;
        if self.shutdown || self.state != ConnectionState::Disconnected {
            debug!(state = %self.state, "ignoring late reconnect timer");
            return;
        }
        self.start_connect(Transition::Redial);
    }

    /// Earliest instant at which [`poll`](Self::poll) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .filter_map(|request| request.deadline)
            .chain(self.reconnect_at)
            .min()
    }

    /// One iteration of the blocking driver: wait up to `max_wait` (or the
    /// next timer) for a transport event, handle it, then fire due timers.
    pub fn turn(&mut self, max_wait: Duration) -> Result<()> {
        let now = Instant::now();
        let wait = self
            .next_deadline()
            .map_or(max_wait, |deadline| {
                deadline.saturating_duration_since(now).min(max_wait)
            });
        let handled = match self.transport.poll_event(wait) {
            Some(event) => self.handle_event(event),
            None => Ok(()),
        };
        self.poll(Instant::now());
        handled
    }

    /// Drive the channel until `done` returns true or `deadline` passes.
    ///
    /// Returns whether `done` was satisfied.
    pub fn run_until<F>(&mut self, deadline: Instant, mut done: F) -> Result<bool>
    where
        F: FnMut(&Self) -> bool,
    {
        loop {
            if done(self) {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            self.turn(deadline - now)?;
        }
    }

    /// Shut the channel down for good.
    ///
    /// In-flight requests fail with `lostConnection`, buffered requests with
    /// `channelClosed`. No reconnect is attempted afterwards and further sends
    /// return [`ChannelError::Closed`].
    pub fn close(&mut self) {
        if self.shutdown {
            return;
        }
        self.shutdown = true;
        self.reconnect_at = None;
        self.apply(Transition::Shutdown);

        let in_flight = self.fail_pending();
        let buffered = std::mem::take(&mut self.buffer);
        let buffered_count = buffered.len();
        for request in buffered {
            debug!(route = %request.route, "failing buffered request");
            (request.callback)(Err(RequestError::channel_closed()));
        }

        self.transport.close();
        self.apply(Transition::Closed);
        info!(
            transport = self.transport.name(),
            in_flight,
            buffered = buffered_count,
            "channel closed"
        );
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.shutdown
    }

    /// Session established by the first response on the current connection, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Requests sent and awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Requests waiting for the channel to open.
    pub fn buffered_count(&self) -> usize {
        self.buffer.len()
    }

    /// Order the next transmitted request will carry.
    pub fn next_order(&self) -> u64 {
        self.next_order
    }

    /// Connection cycles that failed since the channel was last open.
    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// When the next reconnect attempt is due.
    pub fn reconnect_at(&self) -> Option<Instant> {
        self.reconnect_at
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    pub fn references(&self) -> &References {
        &self.references
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn apply(&mut self, transition: Transition) -> bool {
        match self.state.next(transition) {
            Some(next) => {
                debug!(from = %self.state, to = %next, ?transition, "state transition");
                self.state = next;
                true
            }
            None => false,
        }
    }

    fn start_connect(&mut self, transition: Transition) {
        if !self.apply(transition) {
            debug!(state = %self.state, ?transition, "connect skipped");
            return;
        }
        info!(
            transport = self.transport.name(),
            state = %self.state,
            failures = self.failures,
            "connecting"
        );
        if let Err(err) = self.transport.connect() {
            warn!(transport = self.transport.name(), error = %err, "connect failed");
            self.connection_lost("connect failed");
        }
    }

    fn on_open(&mut self) {
        if !self.apply(Transition::Opened) {
            warn!(state = %self.state, "ignoring open event");
            return;
        }
        self.failures = 0;
        self.reconnect_at = None;
        info!(
            transport = self.transport.name(),
            buffered = self.buffer.len(),
            "channel open"
        );

        while self.state.is_open() {
            let Some(request) = self.buffer.pop_front() else {
                break;
            };
            self.transmit(request.route, request.message, request.callback);
        }
    }

    fn connection_lost(&mut self, reason: &str) {
        let was_open = self.state.is_open();
        if !self.apply(Transition::Lost) {
            return;
        }
        self.transport.close();
        let failed = self.fail_pending();
        // The next connection adopts whatever session its first response carries.
        if let Some(session) = self.session_id.take() {
            debug!(%session, "session released");
        }
        if was_open {
            info!(reason, failed, buffered = self.buffer.len(), "connection lost");
        } else {
            warn!(reason, failures = self.failures + 1, "connection attempt failed");
        }

        if self.shutdown {
            return;
        }
        let delay = self.config.reconnect.jittered(self.failures, &mut self.rng);
        self.failures = self.failures.saturating_add(1);
        self.reconnect_at = Some(Instant::now() + delay);
        info!(
            delay_ms = delay.as_millis() as u64,
            failures = self.failures,
            "reconnect scheduled"
        );
    }

    fn transmit(&mut self, route: String, message: Value, callback: Callback) -> SendOutcome {
        let order = self.next_order;
        self.next_order += 1;

        let frame = RequestFrame {
            routename: route,
            order,
            message,
            sessionid: self.session_id.clone(),
        };
        let text = match frame.to_text() {
            Ok(text) => text,
            Err(err) => {
                callback(Err(RequestError::invalid_request(err.to_string())));
                return SendOutcome::Rejected;
            }
        };

        let deadline = self.config.request_timeout.map(|timeout| Instant::now() + timeout);
        self.pending.insert(
            order,
            PendingRequest {
                route: frame.routename,
                callback,
                deadline,
            },
        );

        match self.transport.send_text(&text) {
            Ok(()) => debug!(order, bytes = text.len(), "request sent"),
            Err(err) => {
                warn!(order, error = %err, "send failed");
                self.connection_lost("send failed");
            }
        }
        SendOutcome::Sent { order }
    }

    fn on_message(&mut self, text: &str) -> Result<()> {
        if !self.state.is_open() {
            warn!(state = %self.state, "dropping message received while not open");
            return Ok(());
        }

        let response = match parse_response(text) {
            Ok(response) => response,
            Err(fault) => {
                warn!(%fault, "dropping inbound frame");
                return Ok(());
            }
        };

        match self.session_id.as_deref() {
            None => {
                info!(session = %response.session_id, "session established");
                self.session_id = Some(response.session_id.clone());
            }
            Some(current) if current != response.session_id => {
                warn!(
                    expected = current,
                    received = %response.session_id,
                    order = response.order,
                    "dropping response from foreign session"
                );
                return Ok(());
            }
            Some(_) => {}
        }

        let Some(request) = self.pending.remove(&response.order) else {
            warn!(order = response.order, "dropping response for unknown order");
            return Ok(());
        };

        let message = match response.body {
            ResponseBody::Error(err) => {
                debug!(order = response.order, code = %err.code, "backend returned error");
                (request.callback)(Err(err));
                return Ok(());
            }
            ResponseBody::Message(message) => message,
        };

        let Some(route) = self.routes.get(&request.route) else {
            (request.callback)(Err(RequestError::invalid_message_structure(format!(
                "route {} is not registered",
                request.route
            ))));
            return Ok(());
        };

        match self
            .validator
            .check(&message, route.response(), &self.references)
        {
            Ok(Verdict::Valid) => {
                debug!(order = response.order, route = %request.route, "response delivered");
                (request.callback)(Ok(message));
                Ok(())
            }
            Ok(Verdict::Invalid(violation)) => {
                warn!(
                    order = response.order,
                    route = %request.route,
                    %violation,
                    "response failed schema"
                );
                (request.callback)(Err(RequestError::invalid_message_structure(
                    violation.to_string(),
                )));
                Ok(())
            }
            Err(err) => {
                error!(route = %request.route, error = %err, "response schema cannot be evaluated");
                (request.callback)(Err(RequestError::invalid_message_structure(err.to_string())));
                Err(err.into())
            }
        }
    }

    fn expire_requests(&mut self, now: Instant) {
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, request)| request.deadline.is_some_and(|deadline| deadline <= now))
            .map(|(order, _)| *order)
            .collect();
        let after = self.config.request_timeout.unwrap_or_default();
        for order in expired {
            if let Some(request) = self.pending.remove(&order) {
                warn!(order, route = %request.route, "request timed out");
                (request.callback)(Err(RequestError::timeout(after)));
            }
        }
    }

    fn fail_pending(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();
        for (order, request) in pending {
            debug!(order, route = %request.route, "failing in-flight request");
            (request.callback)(Err(RequestError::lost_connection()));
        }
        count
    }
}

impl<T: Transport> Drop for Channel<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: Transport> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("transport", &self.transport.name())
            .field("state", &self.state)
            .field("shutdown", &self.shutdown)
            .field("routes", &self.routes.names())
            .field("session_id", &self.session_id)
            .field("buffered", &self.buffer.len())
            .field("pending", &self.pending.len())
            .field("next_order", &self.next_order)
            .field("failures", &self.failures)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;
    use shapewire_transport::ScriptedTransport;

    use super::*;
    use crate::error::{CHANNEL_CLOSED, INVALID_REQUEST, LOST_CONNECTION, TIMEOUT};

    type Outcomes = Arc<Mutex<Vec<std::result::Result<Value, RequestError>>>>;

    fn recorder() -> (Outcomes, impl Fn() -> Callback) {
        let outcomes: Outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&outcomes);
        let make = move || -> Callback {
            let sink = Arc::clone(&sink);
            Box::new(move |outcome| sink.lock().unwrap().push(outcome))
        };
        (outcomes, make)
    }

    fn echo_schema() -> Schema {
        Schema::parse(&json!({ "text": "string" })).unwrap()
    }

    #[test]
    fn construction_dials_and_open_event_opens() {
        let (transport, handle) = ScriptedTransport::new();
        let mut channel = Channel::new(transport);
        assert_eq!(handle.connect_count(), 1);
        assert_eq!(channel.state(), ConnectionState::Connecting { reconnect: false });

        channel.turn(Duration::ZERO).unwrap();
        assert!(channel.is_open());
    }

    #[test]
    fn unknown_route_and_duplicate_route() {
        let (transport, _handle) = ScriptedTransport::new();
        let mut channel = Channel::new(transport);
        channel
            .create_route("echo", echo_schema(), echo_schema())
            .unwrap();
        assert!(matches!(
            channel.create_route("echo", echo_schema(), echo_schema()),
            Err(ChannelError::DuplicateRoute(_))
        ));
        assert!(matches!(
            channel.send("nope", json!({}), |_| {}),
            Err(ChannelError::UnknownRoute(_))
        ));
    }

    #[test]
    fn invalid_request_invokes_callback_inline_and_is_not_sent() {
        let (transport, handle) = ScriptedTransport::new();
        let mut channel = Channel::new(transport);
        channel.create_route("echo", echo_schema(), echo_schema()).unwrap();
        channel.turn(Duration::ZERO).unwrap();

        let (outcomes, callback) = recorder();
        let outcome = channel.send("echo", json!({ "text": 5 }), callback()).unwrap();
        assert_eq!(outcome, SendOutcome::Rejected);

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].as_ref().unwrap_err().is(INVALID_REQUEST));
        assert!(handle.sent().is_empty());
        assert_eq!(channel.next_order(), 0);
    }

    #[test]
    fn buffer_limit_is_enforced() {
        let (transport, handle) = ScriptedTransport::new();
        handle.set_auto_open(false);
        let mut channel = Channel::with_config(
            transport,
            ChannelConfig {
                max_buffered: 2,
                ..ChannelConfig::default()
            },
        );
        channel.create_route("echo", echo_schema(), echo_schema()).unwrap();

        for _ in 0..2 {
            assert_eq!(
                channel.send("echo", json!({ "text": "x" }), |_| {}).unwrap(),
                SendOutcome::Buffered
            );
        }
        assert!(matches!(
            channel.send("echo", json!({ "text": "x" }), |_| {}),
            Err(ChannelError::BufferFull(2))
        ));
    }

    #[test]
    fn request_timeout_fails_pending_request() {
        let (transport, handle) = ScriptedTransport::new();
        let mut channel = Channel::with_config(
            transport,
            ChannelConfig {
                request_timeout: Some(Duration::from_millis(50)),
                ..ChannelConfig::default()
            },
        );
        channel.create_route("echo", echo_schema(), echo_schema()).unwrap();
        channel.turn(Duration::ZERO).unwrap();

        let (outcomes, callback) = recorder();
        let sent = channel.send("echo", json!({ "text": "hi" }), callback()).unwrap();
        assert_eq!(sent, SendOutcome::Sent { order: 0 });
        assert!(channel.next_deadline().is_some());

        channel.poll(Instant::now() + Duration::from_secs(1));
        assert_eq!(channel.pending_count(), 0);
        assert!(outcomes.lock().unwrap()[0].as_ref().unwrap_err().is(TIMEOUT));

        // A late response for the expired order is dropped.
        handle.message(r#"{"order":0,"sessionid":"s","message":{"text":"late"}}"#);
        channel.turn(Duration::ZERO).unwrap();
        assert_eq!(outcomes.lock().unwrap().len(), 1);
    }

    #[test]
    fn close_fails_everything_and_stops_reconnecting() {
        let (transport, handle) = ScriptedTransport::new();
        let mut channel = Channel::new(transport);
        channel.create_route("echo", echo_schema(), echo_schema()).unwrap();
        channel.turn(Duration::ZERO).unwrap();

        let (outcomes, callback) = recorder();
        channel.send("echo", json!({ "text": "a" }), callback()).unwrap();
        handle.disconnect();
        channel.turn(Duration::ZERO).unwrap();
        channel.send("echo", json!({ "text": "b" }), callback()).unwrap();
        assert_eq!(channel.buffered_count(), 1);

        channel.close();
        assert!(channel.is_closed());
        assert_eq!(channel.state(), ConnectionState::Disconnected);
        assert_eq!(channel.reconnect_at(), None);

        let codes: Vec<String> = outcomes
            .lock()
            .unwrap()
            .iter()
            .map(|outcome| outcome.as_ref().unwrap_err().code.clone())
            .collect();
        assert_eq!(codes, vec![LOST_CONNECTION, CHANNEL_CLOSED]);

        channel.poll(Instant::now() + Duration::from_secs(3600));
        assert_eq!(handle.connect_count(), 1);
        assert!(matches!(
            channel.send("echo", json!({ "text": "c" }), |_| {}),
            Err(ChannelError::Closed)
        ));
    }

    #[test]
    fn drop_closes_channel() {
        let (transport, handle) = ScriptedTransport::new();
        let (outcomes, callback) = recorder();
        {
            let mut channel = Channel::new(transport);
            channel.create_route("echo", echo_schema(), echo_schema()).unwrap();
            channel.turn(Duration::ZERO).unwrap();
            channel.send("echo", json!({ "text": "a" }), callback()).unwrap();
        }
        assert_eq!(outcomes.lock().unwrap().len(), 1);
        assert!(handle.close_count() >= 1);
    }
}

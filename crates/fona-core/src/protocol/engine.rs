//! Command/response engine
//!
//! The AT protocol is strictly half duplex: one command is outstanding at a
//! time and every line the modem sends that is not an unsolicited notification
//! belongs to it. The engine serialises commands behind a lock, discards stale
//! input before each write and hands replies to the caller from a FIFO queue
//! filled by the I/O thread.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::fields::{split_fields, unquote};
use super::framer::{Frame, Framer};
use super::{ProtocolError, LINE_TERMINATOR};
use crate::transport::{ByteSink, Transport};

/// One entry of the response queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A framed line
    Line(String),
    /// A captured raw body
    Body(Vec<u8>),
}

impl Reply {
    /// Text view of the reply; bodies are decoded lossily
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            Reply::Line(line) => Cow::Borrowed(line),
            Reply::Body(body) => String::from_utf8_lossy(body),
        }
    }

    /// Owned text, decoding bodies lossily
    pub fn into_text(self) -> String {
        match self {
            Reply::Line(line) => line,
            Reply::Body(body) => String::from_utf8_lossy(&body).into_owned(),
        }
    }

    /// Owned bytes
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Reply::Line(line) => line.into_bytes(),
            Reply::Body(body) => body,
        }
    }
}

/// Where a framed line goes, decided by the caller of [`Link::ingest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// Append to the response queue
    Queue,
    /// Append to the response queue and capture `n` raw bytes next
    QueueAndCapture(usize),
    /// The line was an unsolicited notification and has been dealt with
    Drop,
}

#[derive(Debug, Default)]
struct LinkState {
    framer: Framer,
    queue: VecDeque<Reply>,
}

/// Framer and response queue, shared by the I/O thread and the command caller
#[derive(Debug, Default)]
pub struct Link {
    state: Mutex<LinkState>,
    reply_ready: Condvar,
}

impl Link {
    /// Frame one transport delivery. `route` is called for each line, in order,
    /// while the link lock is held; it must not block.
    pub fn ingest<F>(&self, bytes: &[u8], mut route: F)
    where
        F: FnMut(&str) -> Routing,
    {
        if bytes.is_empty() {
            return;
        }
        tracing::trace!("Received {} bytes: {:?}", bytes.len(), String::from_utf8_lossy(bytes));

        let mut state = self.state.lock();
        let LinkState { framer, queue } = &mut *state;
        let mut queued = false;

        framer.feed(bytes, |frame| match frame {
            Frame::Body(body) => {
                queue.push_back(Reply::Body(body));
                queued = true;
                None
            }
            Frame::Line(line) => {
                tracing::trace!("Received line: {}", line);
                match route(&line) {
                    Routing::Queue => {
                        queue.push_back(Reply::Line(line));
                        queued = true;
                        None
                    }
                    Routing::QueueAndCapture(len) => {
                        queue.push_back(Reply::Line(line));
                        queued = true;
                        Some(len)
                    }
                    Routing::Drop => None,
                }
            }
        });

        if queued {
            self.reply_ready.notify_all();
        }
    }

    /// Pop the oldest reply, waiting up to `timeout` (forever for `None`)
    pub fn next_reply(&self, timeout: Option<Duration>) -> Result<Reply, ProtocolError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        loop {
            if let Some(reply) = state.queue.pop_front() {
                return Ok(reply);
            }
            match deadline {
                None => self.reply_ready.wait(&mut state),
                Some(deadline) => {
                    if self.reply_ready.wait_until(&mut state, deadline).timed_out() {
                        return state.queue.pop_front().ok_or(ProtocolError::Timeout);
                    }
                }
            }
        }
    }

    /// Drop queued replies, any partial line and any active capture
    pub fn discard(&self) {
        let mut state = self.state.lock();
        state.framer.reset();
        state.queue.clear();
    }

    /// Number of replies waiting in the queue
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }
}

/// Serialises commands over a [`Transport`] and correlates their replies
pub struct CommandEngine {
    link: Link,
    /// Held for a whole request/reply exchange
    command_lock: Mutex<()>,
    transport: Mutex<Box<dyn Transport>>,
    default_timeout: Option<Duration>,
    closed: AtomicBool,
}

impl CommandEngine {
    /// Create an engine; call [`CommandEngine::start`] to begin receiving
    pub fn new(transport: Box<dyn Transport>, default_timeout: Option<Duration>) -> Self {
        Self {
            link: Link::default(),
            command_lock: Mutex::new(()),
            transport: Mutex::new(transport),
            default_timeout,
            closed: AtomicBool::new(false),
        }
    }

    /// Start the transport's delivery of received bytes to `sink`
    pub fn start(&self, sink: std::sync::Arc<dyn ByteSink>) -> Result<(), ProtocolError> {
        self.transport.lock().start(sink)
    }

    /// Stop the transport. Later sends fail with [`ProtocolError::Closed`].
    pub fn stop(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.transport.lock().stop();
    }

    /// The framer/queue shared with the I/O thread
    pub fn link(&self) -> &Link {
        &self.link
    }

    /// Timeout used by exchanges unless overridden
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    /// Throw away all buffered input, waiting for any in-flight command first
    pub fn discard_buffered_input(&self) -> Result<(), ProtocolError> {
        let _guard = self.command_lock.lock();
        self.discard_locked()
    }

    fn discard_locked(&self) -> Result<(), ProtocolError> {
        self.transport.lock().discard_input()?;
        self.link.discard();
        Ok(())
    }

    /// Take the command lock, discard stale input and write `command` followed
    /// by the line terminator. The returned [`Exchange`] holds the lock until
    /// dropped, so every reply read through it belongs to this command.
    pub fn send(&self, command: &str) -> Result<Exchange<'_>, ProtocolError> {
        self.send_with(command, || ()).map(|(exchange, ())| exchange)
    }

    /// Like [`send`](Self::send), but runs `on_locked` once the command lock
    /// is held and before anything is written
    pub fn send_with<T>(
        &self,
        command: &str,
        on_locked: impl FnOnce() -> T,
    ) -> Result<(Exchange<'_>, T), ProtocolError> {
        let guard = self.command_lock.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Err(ProtocolError::Closed);
        }
        let prepared = on_locked();
        self.discard_locked()?;

        tracing::trace!("Sent: {}", command);
        let mut bytes = Vec::with_capacity(command.len() + LINE_TERMINATOR.len());
        bytes.extend_from_slice(command.as_bytes());
        bytes.extend_from_slice(LINE_TERMINATOR.as_bytes());
        self.transport.lock().write(&bytes)?;

        let exchange = Exchange {
            engine: self,
            command: command.to_string(),
            timeout: self.default_timeout,
            _guard: guard,
        };
        Ok((exchange, prepared))
    }

    /// Send `command` and require the next meaningful line to equal `expected`
    /// (case-insensitively). Echoes of the command itself and any line in
    /// `acceptable_echoes` are skipped.
    pub fn send_and_expect(
        &self,
        command: &str,
        expected: &str,
        timeout: Option<Duration>,
        acceptable_echoes: &[&str],
    ) -> Result<(), ProtocolError> {
        let mut exchange = self.send(command)?;
        exchange.set_timeout(timeout);
        exchange.expect_after(acceptable_echoes, expected)
    }

    /// Send `command` and return the first line that is not its echo
    pub fn send_and_read_reply(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<String, ProtocolError> {
        let mut exchange = self.send(command)?;
        exchange.set_timeout(timeout);
        exchange.read_reply()
    }
}

/// An in-flight command. Holds the engine's command lock.
pub struct Exchange<'a> {
    engine: &'a CommandEngine,
    command: String,
    timeout: Option<Duration>,
    _guard: MutexGuard<'a, ()>,
}

impl Exchange<'_> {
    /// The command text that was sent
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Change the per-reply timeout for the rest of the exchange
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Pop the next queued reply verbatim
    pub fn next_reply(&mut self) -> Result<Reply, ProtocolError> {
        self.engine.link.next_reply(self.timeout)
    }

    /// Next reply as text
    pub fn next_line(&mut self) -> Result<String, ProtocolError> {
        Ok(self.next_reply()?.into_text())
    }

    /// Next reply as raw bytes. A body that arrived as a line (capture not
    /// armed) is returned as its text bytes.
    pub fn next_body(&mut self) -> Result<Vec<u8>, ProtocolError> {
        Ok(self.next_reply()?.into_bytes())
    }

    fn is_echo(&self, line: &str, acceptable: &[&str]) -> bool {
        line.is_empty()
            || line.eq_ignore_ascii_case(&self.command)
            || acceptable.iter().any(|a| line.eq_ignore_ascii_case(a))
    }

    fn next_meaningful(&mut self, acceptable: &[&str]) -> Result<String, ProtocolError> {
        loop {
            let line = self.next_line()?;
            if !self.is_echo(&line, acceptable) {
                return Ok(line);
            }
            tracing::trace!("Skipping echo: {}", line);
        }
    }

    /// First line that is neither empty nor the command's echo
    pub fn read_reply(&mut self) -> Result<String, ProtocolError> {
        self.next_meaningful(&[])
    }

    /// Require the next meaningful line to equal `expected`
    pub fn expect(&mut self, expected: &str) -> Result<(), ProtocolError> {
        self.expect_after(&[], expected)
    }

    /// Like [`Exchange::expect`], additionally skipping lines in `acceptable`
    pub fn expect_after(&mut self, acceptable: &[&str], expected: &str) -> Result<(), ProtocolError> {
        let line = self.next_meaningful(acceptable)?;
        if line.eq_ignore_ascii_case(expected) {
            Ok(())
        } else {
            Err(self.mismatch(expected, line))
        }
    }

    /// Read a reply that must start with `prefix` and return the rest,
    /// optionally with surrounding quotes removed
    pub fn read_prefixed(&mut self, prefix: &str, quoted: bool) -> Result<String, ProtocolError> {
        let line = self.read_reply()?;
        match line.strip_prefix(prefix) {
            Some(rest) if quoted => Ok(unquote(rest).to_string()),
            Some(rest) => Ok(rest.to_string()),
            None => Err(self.mismatch(prefix, line)),
        }
    }

    /// Read a `prefix`ed reply and split its payload into fields
    pub fn read_fields(&mut self, prefix: &str) -> Result<Vec<String>, ProtocolError> {
        let payload = self.read_prefixed(prefix, false)?;
        Ok(split_fields(&payload).into_iter().map(str::to_string).collect())
    }

    /// Build a `ProtocolMismatch` for this exchange's command
    pub fn mismatch(&self, expected: &str, actual: String) -> ProtocolError {
        ProtocolError::ProtocolMismatch {
            command: self.command.clone(),
            expected: expected.to_string(),
            actual,
        }
    }
}

//! Common test helpers and utilities for oscwire tests
//!
//! This crate provides:
//! - Condition-based waiting (no hardcoded sleeps)
//! - An in-memory transport with packet injection and send capture
//! - A manually driven clock for due-time tests
//! - A call recorder for verifying handler invocation order

use bytes::Bytes;
use oscwire_core::{Clock, Message, Packet, TimeTag};
use oscwire_transport::{Datagram, Transport, TransportError};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(5);

// ============================================================================
// Logging
// ============================================================================

/// Install a test-friendly tracing subscriber once; honours `RUST_LOG`
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Port Allocation
// ============================================================================

/// Find an available UDP port for testing
pub fn find_available_udp_port() -> u16 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap().port()
}

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub fn wait_for<F>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check() {
            return true;
        }
        std::thread::sleep(interval);
    }
    check()
}

/// Wait for an atomic counter to reach a target value
pub fn wait_for_count(counter: &AtomicUsize, target: usize, max_wait: Duration) -> bool {
    wait_for(
        || counter.load(Ordering::SeqCst) >= target,
        DEFAULT_CHECK_INTERVAL,
        max_wait,
    )
}

/// Wait for a boolean flag to become true
pub fn wait_for_flag(flag: &AtomicBool, max_wait: Duration) -> bool {
    wait_for(
        || flag.load(Ordering::SeqCst),
        DEFAULT_CHECK_INTERVAL,
        max_wait,
    )
}

// ============================================================================
// Mock Transport
// ============================================================================

/// In-memory transport: tests inject inbound packets and inspect sends
pub struct MockTransport {
    inbox: Mutex<VecDeque<std::result::Result<Datagram, String>>>,
    arrived: Condvar,
    sent: Mutex<Vec<(Bytes, SocketAddr)>>,
    local: SocketAddr,
    recv_calls: AtomicUsize,
    max_packet_size: usize,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Self::with_max_packet_size(oscwire_core::DEFAULT_MAX_PACKET_SIZE)
    }

    pub fn with_max_packet_size(max_packet_size: usize) -> Arc<Self> {
        Arc::new(Self {
            inbox: Mutex::new(VecDeque::new()),
            arrived: Condvar::new(),
            sent: Mutex::new(Vec::new()),
            local: SocketAddr::from(([127, 0, 0, 1], 57120)),
            recv_calls: AtomicUsize::new(0),
            max_packet_size,
        })
    }

    /// Queue raw bytes as if they arrived from `source`
    pub fn inject_from(&self, data: impl Into<Bytes>, source: SocketAddr) {
        self.push(Ok(Datagram::new(data, Some(source))));
    }

    /// Queue raw bytes with no known source
    pub fn inject(&self, data: impl Into<Bytes>) {
        self.push(Ok(Datagram::new(data, None)));
    }

    /// Encode and queue a packet
    pub fn inject_packet(&self, packet: impl Into<Packet>) {
        let bytes = packet.into().encode().expect("test packet should encode");
        self.inject(bytes);
    }

    /// Make the next receive fail with a transport error
    pub fn inject_error(&self, reason: &str) {
        self.push(Err(reason.to_string()));
    }

    fn push(&self, item: std::result::Result<Datagram, String>) {
        self.inbox.lock().push_back(item);
        self.arrived.notify_all();
    }

    /// Everything sent through this transport, in order
    pub fn sent(&self) -> Vec<(Bytes, SocketAddr)> {
        self.sent.lock().clone()
    }

    /// Packets not yet picked up by a receiver
    pub fn pending(&self) -> usize {
        self.inbox.lock().len()
    }

    /// Number of `recv_timeout` calls so far
    pub fn recv_calls(&self) -> usize {
        self.recv_calls.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn recv_timeout(&self, timeout: Duration) -> oscwire_transport::Result<Option<Datagram>> {
        self.recv_calls.fetch_add(1, Ordering::SeqCst);
        let deadline = Instant::now() + timeout;
        let mut inbox = self.inbox.lock();
        loop {
            if let Some(item) = inbox.pop_front() {
                return item.map(Some).map_err(TransportError::ReceiveFailed);
            }
            if self.arrived.wait_until(&mut inbox, deadline).timed_out() {
                return inbox
                    .pop_front()
                    .transpose()
                    .map_err(TransportError::ReceiveFailed);
            }
        }
    }

    fn send_to(&self, data: &[u8], target: SocketAddr) -> oscwire_transport::Result<()> {
        if data.len() > self.max_packet_size {
            return Err(TransportError::FrameTooLarge {
                size: data.len(),
                max: self.max_packet_size,
            });
        }
        self.sent.lock().push((Bytes::copy_from_slice(data), target));
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local)
    }

    fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }
}

// ============================================================================
// Manual Clock
// ============================================================================

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    ntp: AtomicU64,
}

impl ManualClock {
    pub fn new(start: TimeTag) -> Arc<Self> {
        Arc::new(Self {
            ntp: AtomicU64::new(start.to_ntp()),
        })
    }

    /// A clock starting at a fixed, non-immediate instant
    pub fn at_epoch() -> Arc<Self> {
        Self::new(TimeTag::new(3_900_000_000, 0))
    }

    pub fn set(&self, now: TimeTag) {
        self.ntp.store(now.to_ntp(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let next = TimeTag::from_ntp(self.ntp.load(Ordering::SeqCst)) + by;
        self.set(next);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> TimeTag {
        TimeTag::from_ntp(self.ntp.load(Ordering::SeqCst))
    }
}

// ============================================================================
// Call Recorder - for verifying handler invocations
// ============================================================================

/// Thread-safe log of (label, message) pairs in invocation order
#[derive(Clone, Default)]
pub struct CallRecorder {
    calls: Arc<Mutex<Vec<(String, Message)>>>,
    count: Arc<AtomicUsize>,
}

impl CallRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, label: &str, msg: &Message) {
        self.calls.lock().push((label.to_string(), msg.clone()));
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait for at least n calls
    pub fn wait_for_count(&self, n: usize, max_wait: Duration) -> bool {
        wait_for_count(&self.count, n, max_wait)
    }

    pub fn labels(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(l, _)| l.clone()).collect()
    }

    pub fn paths(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|(_, m)| m.path().to_string())
            .collect()
    }

    pub fn calls(&self) -> Vec<(String, Message)> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
        self.count.store(0, Ordering::SeqCst);
    }
}

//! Background receive loop
//!
//! ```text
//!   transport ──recv_timeout──► decode ──► Dispatcher ──► handlers
//!                                   │
//!                                   └─ future bundle ──► PendingQueue ──(due)──┘
//! ```
//!
//! One worker thread handles packets strictly in arrival order. Each pass
//! first dispatches whatever the pending queue has come due, then waits for
//! the next packet no longer than the read timeout or the next due time,
//! whichever is sooner.

use oscwire_core::{Clock, Packet, SystemClock, TimeTag};
use oscwire_transport::Transport;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::dispatcher::{DispatchFailure, Dispatcher};
use crate::error::{Result, ServerError};
use crate::scheduler::{PendingQueue, Scheduler};
use crate::sender::OscSender;

/// Owns a worker thread that feeds received packets to a dispatcher
pub struct ServerThread {
    transport: Arc<dyn Transport>,
    dispatcher: Arc<Dispatcher>,
    clock: Arc<dyn Clock>,
    config: ServerConfig,
    worker: Mutex<Option<Worker>>,
}

/// One run of the receive loop.
///
/// Every `start()` gets its own flag and queue, so a loop that is still
/// winding down never sees a later start and never hands it a schedule.
struct Worker {
    handle: JoinHandle<()>,
    running: Arc<AtomicBool>,
    pending: Arc<PendingQueue>,
}

impl Worker {
    fn is_current_thread(&self) -> bool {
        self.handle.thread().id() == std::thread::current().id()
    }

    fn join(self) {
        if self.handle.join().is_err() {
            warn!("OSC server thread panicked");
        }
    }
}

impl ServerThread {
    pub fn new(
        transport: Arc<dyn Transport>,
        dispatcher: Arc<Dispatcher>,
        config: ServerConfig,
    ) -> Self {
        Self {
            transport,
            dispatcher,
            clock: Arc::new(SystemClock),
            config,
            worker: Mutex::new(None),
        }
    }

    /// Replace the wall clock used for due-time comparisons
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Spawn the worker. Fails if it is already running.
    pub fn start(&self) -> Result<()> {
        self.config.validate()?;

        loop {
            let mut slot = self.worker.lock();
            match slot.take() {
                Some(current) if current.running.load(Ordering::SeqCst) => {
                    *slot = Some(current);
                    return Err(ServerError::AlreadyRunning);
                }
                // Stopped from inside a handler that is still on the stack
                Some(current) if current.is_current_thread() => {
                    *slot = Some(current);
                    return Err(ServerError::AlreadyRunning);
                }
                Some(finished) => {
                    // Its handlers may still call back into this server
                    drop(slot);
                    finished.join();
                }
                None => {
                    *slot = Some(self.spawn()?);
                    break;
                }
            }
        }

        info!(
            "OSC server started on {}",
            self.local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|| "unbound transport".to_string())
        );
        Ok(())
    }

    fn spawn(&self) -> Result<Worker> {
        let running = Arc::new(AtomicBool::new(true));
        let pending = Arc::new(PendingQueue::new(self.config.max_pending));

        let ctx = LoopContext {
            transport: self.transport.clone(),
            dispatcher: self.dispatcher.clone(),
            clock: self.clock.clone(),
            pending: pending.clone(),
            config: self.config.clone(),
            running: running.clone(),
        };

        let handle = std::thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || ctx.run())
            .map_err(ServerError::Spawn)?;

        Ok(Worker {
            handle,
            running,
            pending,
        })
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// Safe to call from any thread, including from inside a handler, and
    /// any number of times. Scheduled bundles that are not yet due are
    /// dropped without being dispatched.
    pub fn stop(&self) {
        let (was_running, abandoned, stopped) = {
            let mut slot = self.worker.lock();
            let Some(current) = slot.as_ref() else {
                return;
            };
            let was_running = current.running.swap(false, Ordering::SeqCst);
            let abandoned = current.pending.clear();
            if current.is_current_thread() {
                // Called from a handler: the loop exits once it returns
                (was_running, abandoned, None)
            } else {
                (was_running, abandoned, slot.take())
            }
        };

        // Joined outside the lock so the worker's handlers can still reach us
        if let Some(worker) = stopped {
            worker.join();
        }

        if was_running {
            info!("OSC server stopped ({} scheduled bundles abandoned)", abandoned);
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map_or(false, |w| w.running.load(Ordering::SeqCst))
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Number of scheduled bundles waiting for their time tag
    pub fn pending(&self) -> usize {
        self.worker.lock().as_ref().map_or(0, |w| w.pending.len())
    }

    /// A sender that shares this server's transport, e.g. to reply to a
    /// message's source address
    pub fn sender(&self, target: SocketAddr) -> OscSender {
        OscSender::new(self.transport.clone(), target)
    }
}

impl Drop for ServerThread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Admits future bundles into the queue only while the loop is live
struct LiveQueue<'a> {
    pending: &'a PendingQueue,
    running: &'a AtomicBool,
}

impl Scheduler for LiveQueue<'_> {
    fn schedule(&self, packet: Packet, due: TimeTag) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(ServerError::NotRunning);
        }
        self.pending.schedule(packet, due)
    }
}

/// Marks the loop stopped and drops its schedule however `run` exits
struct ExitGuard<'a> {
    running: &'a AtomicBool,
    pending: &'a PendingQueue,
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let dropped = self.pending.clear();
        if dropped > 0 {
            debug!("Dropped {} scheduled bundles on loop exit", dropped);
        }
    }
}

struct LoopContext {
    transport: Arc<dyn Transport>,
    dispatcher: Arc<Dispatcher>,
    clock: Arc<dyn Clock>,
    pending: Arc<PendingQueue>,
    config: ServerConfig,
    running: Arc<AtomicBool>,
}

impl LoopContext {
    fn run(self) {
        let _exit = ExitGuard {
            running: &self.running,
            pending: &self.pending,
        };
        debug!("OSC server loop running");
        while self.running.load(Ordering::SeqCst) {
            self.dispatch_due();
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            match self.transport.recv_timeout(self.next_wait()) {
                Ok(Some(datagram)) => self.handle(&datagram.data, datagram.source),
                Ok(None) => {}
                Err(e) => {
                    warn!("OSC receive error: {}", e);
                    self.dispatcher.report(DispatchFailure::Receive(e));
                    // avoid spinning on a persistently failing transport
                    std::thread::sleep(self.config.read_timeout.min(Duration::from_millis(10)));
                }
            }
        }
        debug!("OSC server loop exited");
    }

    fn scheduler(&self) -> LiveQueue<'_> {
        LiveQueue {
            pending: &self.pending,
            running: &self.running,
        }
    }

    fn dispatch_due(&self) {
        let now = self.clock.now();
        for packet in self.pending.pop_due(now) {
            if !self.running.load(Ordering::SeqCst) {
                return;
            }
            debug!("Dispatching scheduled packet");
            self.dispatcher
                .dispatch_with(&packet, now, None, Some(&self.scheduler()));
        }
    }

    fn next_wait(&self) -> Duration {
        match self.pending.next_due() {
            Some(due) => due
                .duration_since(self.clock.now())
                .unwrap_or(Duration::ZERO)
                .min(self.config.read_timeout),
            None => self.config.read_timeout,
        }
    }

    fn handle(&self, data: &[u8], source: Option<SocketAddr>) {
        let packet = match Packet::decode_with_limits(data, &self.config.limits) {
            Ok(packet) => packet,
            Err(error) => {
                debug!("Dropping {} undecodable bytes from {:?}: {}", data.len(), source, error);
                self.dispatcher
                    .report(DispatchFailure::Decode { from: source, error });
                return;
            }
        };

        let now = self.clock.now();
        let summary = self
            .dispatcher
            .dispatch_with(&packet, now, source, Some(&self.scheduler()));
        debug!(
            "Dispatched packet from {:?}: {} invoked, {} failed, {} scheduled",
            source, summary.invoked, summary.failed, summary.scheduled
        );
    }
}

//! Method registry and packet dispatch
//!
//! Lookup holds the registry's read lock only while matching; handlers run
//! after it is released, so a handler may register or unregister methods.

use oscwire_core::{Bundle, DecodeLimits, Message, Packet, TimeTag};
use oscwire_transport::TransportError;
use parking_lot::RwLock;
use std::any::Any;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, trace, warn};

use crate::method::{BundleHook, Handler, HandlerContext, Method, MethodId};
use crate::scheduler::Scheduler;

/// Reported through the error callback; never propagated to the caller
#[derive(Error, Debug)]
pub enum DispatchFailure {
    #[error("handler for {path} failed: {error:#}")]
    Handler {
        method: Option<MethodId>,
        path: String,
        error: anyhow::Error,
    },

    #[error("handler for {path} panicked: {message}")]
    Panic {
        method: Option<MethodId>,
        path: String,
        message: String,
    },

    /// A bundle hook or the scheduler panicked
    #[error("{stage} for bundle {timetag} panicked: {message}")]
    BundlePanic {
        stage: &'static str,
        timetag: TimeTag,
        message: String,
    },

    #[error("dropped undecodable packet: {error}")]
    Decode {
        from: Option<SocketAddr>,
        error: oscwire_core::Error,
    },

    #[error("receive failed: {0}")]
    Receive(TransportError),

    #[error("bundle for {timetag} not scheduled: {reason}")]
    Unscheduled { timetag: TimeTag, reason: String },
}

pub type ErrorCallback = Arc<dyn Fn(&DispatchFailure) + Send + Sync>;

/// Counts from one dispatch call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Messages examined (scheduled bundles excluded)
    pub messages: usize,
    /// Handler invocations that returned `Ok`
    pub invoked: usize,
    /// Handler invocations that failed or panicked
    pub failed: usize,
    /// Messages no method accepted and no fallback handled
    pub unmatched: usize,
    /// Bundles handed to a scheduler
    pub scheduled: usize,
}

#[derive(Clone, Default)]
struct Hooks {
    fallback: Option<Handler>,
    bundle_start: Option<BundleHook>,
    bundle_end: Option<BundleHook>,
    on_error: Option<ErrorCallback>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

/// Ordered registry of methods
pub struct Dispatcher {
    methods: RwLock<Vec<(MethodId, Arc<Method>)>>,
    hooks: RwLock<Hooks>,
    next_id: AtomicU64,
    limits: DecodeLimits,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_limits(DecodeLimits::default())
    }

    /// Limits used by [`Dispatcher::dispatch`] when decoding raw bytes
    pub fn with_limits(limits: DecodeLimits) -> Self {
        Self {
            methods: RwLock::new(Vec::new()),
            hooks: RwLock::new(Hooks::default()),
            next_id: AtomicU64::new(1),
            limits,
        }
    }

    pub fn limits(&self) -> &DecodeLimits {
        &self.limits
    }

    /// Append a method; it sees every dispatch that starts after this returns
    pub fn register(&self, method: Method) -> MethodId {
        let id = MethodId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!("Registered {} for {:?}", id, method);
        self.methods.write().push((id, Arc::new(method)));
        id
    }

    /// Compile `pattern` and register `handler` for it
    pub fn add_method<F>(
        &self,
        pattern: &str,
        typespec: Option<&str>,
        handler: F,
    ) -> oscwire_core::Result<MethodId>
    where
        F: Fn(&Message, &HandlerContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut method = Method::new(pattern, handler)?;
        if let Some(spec) = typespec {
            method = method.with_typespec(spec);
        }
        Ok(self.register(method))
    }

    /// Remove a method. Returns false if it was already gone.
    pub fn unregister(&self, id: MethodId) -> bool {
        let mut methods = self.methods.write();
        let before = methods.len();
        methods.retain(|(mid, _)| *mid != id);
        let removed = methods.len() != before;
        if removed {
            debug!("Unregistered {}", id);
        }
        removed
    }

    /// Remove every method registered with exactly this pattern string and
    /// typespec. Returns how many were removed.
    pub fn unregister_pattern(&self, pattern: &str, typespec: Option<&str>) -> usize {
        let typespec = typespec.map(|s| s.trim_start_matches(','));
        let mut methods = self.methods.write();
        let before = methods.len();
        methods.retain(|(_, m)| {
            !(m.pattern().as_str() == pattern
                && m.typespec().map(|s| &s[1..]) == typespec)
        });
        before - methods.len()
    }

    pub fn len(&self) -> usize {
        self.methods.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.read().is_empty()
    }

    pub fn clear(&self) {
        self.methods.write().clear();
    }

    /// Handle messages no registered method accepts
    pub fn set_fallback<F>(&self, handler: F)
    where
        F: Fn(&Message, &HandlerContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.write().fallback = Some(Arc::new(handler));
    }

    pub fn clear_fallback(&self) {
        self.hooks.write().fallback = None;
    }

    /// Hooks run around the children of every due bundle, nested bundles
    /// included
    pub fn set_bundle_handlers<S, E>(&self, start: S, end: E)
    where
        S: Fn(&Bundle) + Send + Sync + 'static,
        E: Fn(&Bundle) + Send + Sync + 'static,
    {
        let mut hooks = self.hooks.write();
        hooks.bundle_start = Some(Arc::new(start));
        hooks.bundle_end = Some(Arc::new(end));
    }

    pub fn set_error_handler<F>(&self, callback: F)
    where
        F: Fn(&DispatchFailure) + Send + Sync + 'static,
    {
        self.hooks.write().on_error = Some(Arc::new(callback));
    }

    /// Default destination for future-dated bundles
    pub fn set_scheduler(&self, scheduler: Arc<dyn Scheduler>) {
        self.hooks.write().scheduler = Some(scheduler);
    }

    /// Decode `bytes` and dispatch the packet as of `now`
    pub fn dispatch(
        &self,
        bytes: &[u8],
        now: TimeTag,
        source: Option<SocketAddr>,
    ) -> oscwire_core::Result<DispatchSummary> {
        let packet = Packet::decode_with_limits(bytes, &self.limits)?;
        Ok(self.dispatch_packet(&packet, now, source))
    }

    /// Dispatch an already decoded packet
    pub fn dispatch_packet(
        &self,
        packet: &Packet,
        now: TimeTag,
        source: Option<SocketAddr>,
    ) -> DispatchSummary {
        self.dispatch_with(packet, now, source, None)
    }

    /// Dispatch, sending future-dated bundles to `scheduler` instead of the
    /// dispatcher's default one
    pub fn dispatch_with(
        &self,
        packet: &Packet,
        now: TimeTag,
        source: Option<SocketAddr>,
        scheduler: Option<&dyn Scheduler>,
    ) -> DispatchSummary {
        let hooks = self.hooks.read().clone();
        let scheduler = scheduler.or(hooks.scheduler.as_deref());
        let mut run = Run {
            dispatcher: self,
            hooks: &hooks,
            scheduler,
            now,
            source,
            summary: DispatchSummary::default(),
        };
        match packet {
            Packet::Message(msg) => run.message(msg, None),
            Packet::Bundle(bundle) => run.bundle(bundle),
        }
        run.summary
    }

    /// Send a failure to the error callback, or log it if none is set
    pub fn report(&self, failure: DispatchFailure) {
        let callback = self.hooks.read().on_error.clone();
        report_to(callback.as_ref(), &failure);
    }

    fn matching(&self, msg: &Message) -> Vec<(MethodId, Arc<Method>)> {
        self.methods
            .read()
            .iter()
            .filter(|(_, m)| m.accepts(msg))
            .map(|(id, m)| (*id, m.clone()))
            .collect()
    }
}

/// State for one dispatch call
struct Run<'a> {
    dispatcher: &'a Dispatcher,
    hooks: &'a Hooks,
    scheduler: Option<&'a dyn Scheduler>,
    now: TimeTag,
    source: Option<SocketAddr>,
    summary: DispatchSummary,
}

impl Run<'_> {
    fn bundle(&mut self, bundle: &Bundle) {
        if bundle.timetag.is_future(self.now) {
            self.defer(bundle);
            return;
        }

        trace!("Dispatching bundle {} with {} elements", bundle.timetag, bundle.len());
        let hooks = self.hooks;
        if let Some(start) = &hooks.bundle_start {
            self.guarded("bundle start hook", bundle.timetag, || start(bundle));
        }
        for element in &bundle.content {
            match element {
                Packet::Message(msg) => self.message(msg, Some(bundle.timetag)),
                Packet::Bundle(inner) => self.bundle(inner),
            }
        }
        if let Some(end) = &hooks.bundle_end {
            self.guarded("bundle end hook", bundle.timetag, || end(bundle));
        }
    }

    /// Run bundle-level code, turning a panic into a reported failure
    fn guarded<T>(
        &self,
        stage: &'static str,
        timetag: TimeTag,
        f: impl FnOnce() -> T,
    ) -> Option<T> {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Some(value),
            Err(payload) => {
                self.fail(DispatchFailure::BundlePanic {
                    stage,
                    timetag,
                    message: panic_message(payload.as_ref()),
                });
                None
            }
        }
    }

    fn defer(&mut self, bundle: &Bundle) {
        let Some(scheduler) = self.scheduler else {
            self.fail(DispatchFailure::Unscheduled {
                timetag: bundle.timetag,
                reason: "no scheduler installed".to_string(),
            });
            return;
        };
        let scheduled = self.guarded("scheduler", bundle.timetag, || {
            scheduler.schedule(Packet::Bundle(bundle.clone()), bundle.timetag)
        });
        match scheduled {
            Some(Ok(())) => self.summary.scheduled += 1,
            Some(Err(e)) => self.fail(DispatchFailure::Unscheduled {
                timetag: bundle.timetag,
                reason: e.to_string(),
            }),
            None => {}
        }
    }

    fn message(&mut self, msg: &Message, timetag: Option<TimeTag>) {
        self.summary.messages += 1;
        let matched = self.dispatcher.matching(msg);

        if matched.is_empty() {
            let hooks = self.hooks;
            match &hooks.fallback {
                Some(fallback) => {
                    let ctx = HandlerContext {
                        source: self.source,
                        timetag,
                        method: None,
                        user_data: None,
                    };
                    self.invoke(fallback, msg, &ctx);
                }
                None => {
                    trace!("No method for {}", msg);
                    self.summary.unmatched += 1;
                }
            }
            return;
        }

        for (id, method) in matched {
            let ctx = HandlerContext {
                source: self.source,
                timetag,
                method: Some(id),
                user_data: method.user_data.clone(),
            };
            self.invoke(&method.handler, msg, &ctx);
        }
    }

    fn invoke(&mut self, handler: &Handler, msg: &Message, ctx: &HandlerContext) {
        match panic::catch_unwind(AssertUnwindSafe(|| handler(msg, ctx))) {
            Ok(Ok(())) => self.summary.invoked += 1,
            Ok(Err(error)) => {
                self.summary.failed += 1;
                self.fail(DispatchFailure::Handler {
                    method: ctx.method,
                    path: msg.path().to_string(),
                    error,
                });
            }
            Err(payload) => {
                self.summary.failed += 1;
                self.fail(DispatchFailure::Panic {
                    method: ctx.method,
                    path: msg.path().to_string(),
                    message: panic_message(payload.as_ref()),
                });
            }
        }
    }

    fn fail(&self, failure: DispatchFailure) {
        report_to(self.hooks.on_error.as_ref(), &failure);
    }
}

fn report_to(callback: Option<&ErrorCallback>, failure: &DispatchFailure) {
    match callback {
        Some(cb) => {
            if panic::catch_unwind(AssertUnwindSafe(|| cb(failure))).is_err() {
                error!("Error callback panicked while reporting: {}", failure);
            }
        }
        None => warn!("{}", failure),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

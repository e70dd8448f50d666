//! Dispatcher Tests
//!
//! Tests for method dispatch covering:
//! - Registration order across overlapping patterns
//! - Immediate, nested and future-dated bundles
//! - Handler, hook and scheduler failure isolation
//! - Registry changes from inside handlers
//! - Typespec filtering and user data

use oscwire_core::{Bundle, Message, Packet, TimeTag};
use oscwire_server::{
    DispatchFailure, DispatchSummary, Dispatcher, HandlerContext, Method, PendingQueue, Scheduler,
};
use oscwire_test_utils::CallRecorder;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

fn msg(path: &str) -> Message {
    Message::new(path).unwrap()
}

fn now() -> TimeTag {
    TimeTag::new(3_900_000_000, 0)
}

fn record(
    recorder: &CallRecorder,
    label: &'static str,
) -> impl Fn(&Message, &HandlerContext) -> anyhow::Result<()> + Send + Sync + 'static {
    let recorder = recorder.clone();
    move |m, _| {
        recorder.record(label, m);
        Ok(())
    }
}

fn collect_failures(dispatcher: &Dispatcher) -> Arc<Mutex<Vec<String>>> {
    let failures = Arc::new(Mutex::new(Vec::new()));
    let f = failures.clone();
    dispatcher.set_error_handler(move |failure| f.lock().push(failure.to_string()));
    failures
}

// ============================================================================
// Matching and order
// ============================================================================

#[test]
fn test_overlapping_methods_run_in_registration_order() {
    let dispatcher = Dispatcher::new();
    let recorder = CallRecorder::new();

    dispatcher.add_method("/a/*", None, record(&recorder, "star")).unwrap();
    dispatcher.add_method("/b/1", None, record(&recorder, "other")).unwrap();
    dispatcher.add_method("/a/1", None, record(&recorder, "exact")).unwrap();
    dispatcher.add_method("/a/[0-9]", None, record(&recorder, "class")).unwrap();

    let summary = dispatcher.dispatch_packet(&msg("/a/1").into(), now(), None);

    assert_eq!(recorder.labels(), ["star", "exact", "class"]);
    assert_eq!(summary.invoked, 3);
    assert_eq!(summary.messages, 1);
}

#[test]
fn test_dispatch_raw_bytes() {
    let dispatcher = Dispatcher::new();
    let recorder = CallRecorder::new();
    dispatcher
        .add_method("/synth/{1,2}/freq", None, record(&recorder, "freq"))
        .unwrap();

    let bytes = msg("/synth/2/freq").arg(440.0f32).encode().unwrap();
    let source: SocketAddr = "127.0.0.1:9000".parse().unwrap();
    let summary = dispatcher.dispatch(&bytes, now(), Some(source)).unwrap();

    assert_eq!(summary.invoked, 1);
    let calls = recorder.calls();
    assert_eq!(calls[0].1.args()[0].as_float(), Ok(440.0));
}

#[test]
fn test_handler_context() {
    let dispatcher = Dispatcher::new();
    let seen = Arc::new(Mutex::new(None));
    let s = seen.clone();
    let id = dispatcher
        .add_method("/ctx", None, move |_, ctx| {
            *s.lock() = Some((ctx.source, ctx.timetag, ctx.method));
            Ok(())
        })
        .unwrap();

    let source: SocketAddr = "10.0.0.1:8000".parse().unwrap();
    let bundle = Bundle::new(now()).with(msg("/ctx"));
    dispatcher.dispatch_packet(&bundle.into(), now(), Some(source));

    assert_eq!(*seen.lock(), Some((Some(source), Some(now()), Some(id))));
}

// ============================================================================
// Bundles
// ============================================================================

#[test]
fn test_immediate_bundle_dispatches_children_in_order() {
    let dispatcher = Dispatcher::new();
    let recorder = CallRecorder::new();
    let events = Arc::new(Mutex::new(Vec::new()));

    dispatcher.add_method("/x/*", None, record(&recorder, "x")).unwrap();
    let (start, end) = (events.clone(), events.clone());
    dispatcher.set_bundle_handlers(
        move |b| start.lock().push(format!("start {}", b.len())),
        move |b| end.lock().push(format!("end {}", b.len())),
    );

    let bundle = Bundle::immediate().with(msg("/x/first")).with(msg("/x/second"));
    let summary = dispatcher.dispatch_packet(&bundle.into(), now(), None);

    assert_eq!(recorder.paths(), ["/x/first", "/x/second"]);
    assert_eq!(*events.lock(), ["start 2", "end 2"]);
    assert_eq!(summary.invoked, 2);
    assert_eq!(summary.scheduled, 0);
}

#[test]
fn test_nested_bundles_dispatch_depth_first() {
    let dispatcher = Dispatcher::new();
    let recorder = CallRecorder::new();
    dispatcher.add_method("/n/*", None, record(&recorder, "n")).unwrap();

    let inner = Bundle::immediate().with(msg("/n/2")).with(msg("/n/3"));
    let outer = Bundle::immediate()
        .with(msg("/n/1"))
        .with(inner)
        .with(msg("/n/4"));
    dispatcher.dispatch_packet(&outer.into(), now(), None);

    assert_eq!(recorder.paths(), ["/n/1", "/n/2", "/n/3", "/n/4"]);
}

#[test]
fn test_past_bundle_dispatches_now() {
    let dispatcher = Dispatcher::new();
    let recorder = CallRecorder::new();
    dispatcher.add_method("/late", None, record(&recorder, "late")).unwrap();

    let bundle = Bundle::new(TimeTag::new(3_000_000_000, 0)).with(msg("/late"));
    dispatcher.dispatch_packet(&bundle.into(), now(), None);
    assert_eq!(recorder.count(), 1);
}

#[test]
fn test_future_bundle_goes_to_scheduler() {
    let dispatcher = Dispatcher::new();
    let recorder = CallRecorder::new();
    let queue = Arc::new(PendingQueue::new(16));
    dispatcher.set_scheduler(queue.clone());
    dispatcher.add_method("/later", None, record(&recorder, "later")).unwrap();

    let due = now() + Duration::from_secs(1);
    let bundle = Bundle::new(due).with(msg("/later"));
    let summary = dispatcher.dispatch_packet(&bundle.into(), now(), None);

    assert_eq!(summary.scheduled, 1);
    assert_eq!(recorder.count(), 0);
    assert_eq!(queue.next_due(), Some(due));
    assert!(queue.pop_due(now()).is_empty());

    // Redispatch once due
    for packet in queue.pop_due(due) {
        dispatcher.dispatch_packet(&packet, due, None);
    }
    assert_eq!(recorder.paths(), ["/later"]);
}

#[test]
fn test_future_inner_bundle_scheduled_separately() {
    let dispatcher = Dispatcher::new();
    let recorder = CallRecorder::new();
    let queue = PendingQueue::new(16);
    dispatcher.add_method("/*", None, record(&recorder, "any")).unwrap();

    let inner = Bundle::new(now() + Duration::from_secs(5)).with(msg("/inner"));
    let outer = Bundle::immediate().with(msg("/outer")).with(inner);
    let summary = dispatcher.dispatch_with(&outer.into(), now(), None, Some(&queue));

    assert_eq!(recorder.paths(), ["/outer"]);
    assert_eq!(summary.scheduled, 1);
    assert_eq!(queue.len(), 1);
}

#[test]
fn test_full_queue_reports_unscheduled() {
    let dispatcher = Dispatcher::new();
    let failures = collect_failures(&dispatcher);
    let queue = PendingQueue::new(1);

    for _ in 0..2 {
        let bundle = Bundle::new(now() + Duration::from_secs(1)).with(msg("/q"));
        dispatcher.dispatch_with(&bundle.into(), now(), None, Some(&queue));
    }

    assert_eq!(queue.len(), 1);
    let failures = failures.lock();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("not scheduled"));
}

#[test]
fn test_empty_bundle_runs_hooks_only() {
    let dispatcher = Dispatcher::new();
    let events = Arc::new(Mutex::new(0));
    let (s, e) = (events.clone(), events.clone());
    dispatcher.set_bundle_handlers(move |_| *s.lock() += 1, move |_| *e.lock() += 1);

    let summary = dispatcher.dispatch_packet(&Bundle::immediate().into(), now(), None);
    assert_eq!(summary, DispatchSummary::default());
    assert_eq!(*events.lock(), 2);
}

// ============================================================================
// Failure isolation
// ============================================================================

#[test]
fn test_handler_error_does_not_stop_dispatch() {
    let dispatcher = Dispatcher::new();
    let recorder = CallRecorder::new();
    let failures = collect_failures(&dispatcher);

    dispatcher
        .add_method("/e", None, |_, _| anyhow::bail!("bad value"))
        .unwrap();
    dispatcher.add_method("/e", None, record(&recorder, "after")).unwrap();

    let bundle = Bundle::immediate().with(msg("/e")).with(msg("/e"));
    let summary = dispatcher.dispatch_packet(&bundle.into(), now(), None);

    assert_eq!(summary.failed, 2);
    assert_eq!(summary.invoked, 2);
    assert_eq!(recorder.count(), 2);
    let failures = failures.lock();
    assert_eq!(failures.len(), 2);
    assert!(failures[0].contains("bad value"));
}

#[test]
fn test_panicking_error_callback_is_contained() {
    let dispatcher = Dispatcher::new();
    let recorder = CallRecorder::new();
    dispatcher.set_error_handler(|_| panic!("callback exploded"));
    dispatcher
        .add_method("/p", None, |_, _| anyhow::bail!("first"))
        .unwrap();
    dispatcher.add_method("/p", None, record(&recorder, "second")).unwrap();

    dispatcher.dispatch_packet(&msg("/p").into(), now(), None);
    assert_eq!(recorder.count(), 1);
}

#[test]
fn test_failure_carries_method_id() {
    let dispatcher = Dispatcher::new();
    let ids = Arc::new(Mutex::new(Vec::new()));
    let i = ids.clone();
    dispatcher.set_error_handler(move |failure| {
        if let DispatchFailure::Handler { method, path, .. } = failure {
            i.lock().push((*method, path.clone()));
        }
    });
    let id = dispatcher
        .add_method("/fail", None, |_, _| anyhow::bail!("nope"))
        .unwrap();

    dispatcher.dispatch_packet(&msg("/fail").into(), now(), None);
    assert_eq!(*ids.lock(), [(Some(id), "/fail".to_string())]);
}

#[test]
fn test_panicking_bundle_hooks_are_contained() {
    let dispatcher = Dispatcher::new();
    let recorder = CallRecorder::new();
    let stages = Arc::new(Mutex::new(Vec::new()));
    let s = stages.clone();
    dispatcher.set_error_handler(move |failure| {
        if let DispatchFailure::BundlePanic { stage, message, .. } = failure {
            s.lock().push((*stage, message.clone()));
        }
    });
    dispatcher.set_bundle_handlers(|_| panic!("start exploded"), |_| panic!("end exploded"));
    dispatcher.add_method("/*", None, record(&recorder, "any")).unwrap();

    let bundle = Bundle::immediate().with(msg("/a")).with(msg("/b"));
    let summary = dispatcher.dispatch_packet(&bundle.into(), now(), None);

    assert_eq!(summary.invoked, 2);
    assert_eq!(recorder.paths(), ["/a", "/b"]);
    assert_eq!(
        *stages.lock(),
        [
            ("bundle start hook", "start exploded".to_string()),
            ("bundle end hook", "end exploded".to_string()),
        ]
    );

    // The dispatcher stays usable afterwards
    dispatcher.dispatch_packet(&msg("/c").into(), now(), None);
    assert_eq!(recorder.count(), 3);
}

#[test]
fn test_panicking_scheduler_is_contained() {
    struct Exploding;
    impl Scheduler for Exploding {
        fn schedule(&self, _: Packet, _: TimeTag) -> oscwire_server::Result<()> {
            panic!("scheduler exploded")
        }
    }

    let dispatcher = Dispatcher::new();
    let recorder = CallRecorder::new();
    let failures = collect_failures(&dispatcher);
    dispatcher.set_scheduler(Arc::new(Exploding));
    dispatcher.add_method("/*", None, record(&recorder, "any")).unwrap();

    let later = Bundle::new(now() + Duration::from_secs(1)).with(msg("/later"));
    let bundle = Bundle::immediate().with(later).with(msg("/now"));
    let summary = dispatcher.dispatch_packet(&bundle.into(), now(), None);

    assert_eq!(summary.scheduled, 0);
    assert_eq!(recorder.paths(), ["/now"]);
    let failures = failures.lock();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("scheduler"));
    assert!(failures[0].contains("scheduler exploded"));
}

// ============================================================================
// Re-entrancy
// ============================================================================

#[test]
fn test_handler_can_register_and_unregister() {
    let dispatcher = Arc::new(Dispatcher::new());
    let recorder = CallRecorder::new();
    let weak: Weak<Dispatcher> = Arc::downgrade(&dispatcher);

    let r = recorder.clone();
    let self_id = Arc::new(Mutex::new(None));
    let sid = self_id.clone();
    let id = dispatcher
        .add_method("/install", None, move |m, _| {
            r.record("install", m);
            let Some(dispatcher) = weak.upgrade() else {
                return Ok(());
            };
            let late = r.clone();
            dispatcher.add_method("/installed", None, move |m, _| {
                late.record("installed", m);
                Ok(())
            })?;
            if let Some(id) = *sid.lock() {
                dispatcher.unregister(id);
            }
            Ok(())
        })
        .unwrap();
    *self_id.lock() = Some(id);

    dispatcher.dispatch_packet(&msg("/install").into(), now(), None);
    assert_eq!(dispatcher.len(), 1);

    dispatcher.dispatch_packet(&msg("/install").into(), now(), None);
    dispatcher.dispatch_packet(&msg("/installed").into(), now(), None);
    assert_eq!(recorder.labels(), ["install", "installed"]);
}

#[test]
fn test_method_added_mid_dispatch_sees_next_dispatch_only() {
    let dispatcher = Arc::new(Dispatcher::new());
    let recorder = CallRecorder::new();
    let weak = Arc::downgrade(&dispatcher);
    let r = recorder.clone();

    dispatcher
        .add_method("/same", None, move |m, _| {
            r.record("first", m);
            if let Some(dispatcher) = weak.upgrade() {
                let late = r.clone();
                dispatcher.add_method("/same", None, move |m, _| {
                    late.record("late", m);
                    Ok(())
                })?;
            }
            Ok(())
        })
        .unwrap();

    dispatcher.dispatch_packet(&msg("/same").into(), now(), None);
    assert_eq!(recorder.labels(), ["first"]);

    recorder.clear();
    dispatcher.dispatch_packet(&msg("/same").into(), now(), None);
    assert_eq!(recorder.labels(), ["first", "late"]);
}

// ============================================================================
// Typespecs and user data
// ============================================================================

#[test]
fn test_typespec_filtering() {
    let dispatcher = Dispatcher::new();
    let recorder = CallRecorder::new();
    dispatcher.add_method("/v", Some("f"), record(&recorder, "float")).unwrap();
    dispatcher.add_method("/v", Some(",i"), record(&recorder, "int")).unwrap();
    dispatcher.add_method("/v", None, record(&recorder, "any")).unwrap();

    dispatcher.dispatch_packet(&msg("/v").arg(1.5f32).into(), now(), None);
    dispatcher.dispatch_packet(&msg("/v").arg(3).into(), now(), None);
    dispatcher.dispatch_packet(&msg("/v").arg("s").into(), now(), None);

    assert_eq!(recorder.labels(), ["float", "any", "int", "any", "any"]);
}

#[test]
fn test_user_data_reaches_handler() {
    struct Channel(u8);

    let dispatcher = Dispatcher::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let method = Method::new("/ch", move |_, ctx| {
        if let Some(Channel(n)) = ctx.user_data::<Channel>() {
            s.lock().push(*n);
        }
        Ok(())
    })
    .unwrap()
    .with_user_data(Channel(9));
    dispatcher.register(method);

    dispatcher.dispatch_packet(&msg("/ch").into(), now(), None);
    assert_eq!(*seen.lock(), [9]);
}

#[test]
fn test_unregister_pattern() {
    let dispatcher = Dispatcher::new();
    let recorder = CallRecorder::new();
    dispatcher.add_method("/u/*", None, record(&recorder, "a")).unwrap();
    dispatcher.add_method("/u/*", Some("i"), record(&recorder, "b")).unwrap();
    dispatcher.add_method("/u/*", None, record(&recorder, "c")).unwrap();

    assert_eq!(dispatcher.unregister_pattern("/u/*", None), 2);
    assert_eq!(dispatcher.unregister_pattern("/u/*", None), 0);
    assert_eq!(dispatcher.len(), 1);

    assert_eq!(dispatcher.unregister_pattern("/u/*", Some(",i")), 1);
    assert!(dispatcher.is_empty());
}

#[test]
fn test_invalid_pattern_rejected() {
    let dispatcher = Dispatcher::new();
    let err = dispatcher.add_method("/bad/[a-", None, |_, _| Ok(())).unwrap_err();
    assert_eq!(err.kind(), oscwire_core::ErrorKind::Pattern);
    assert!(dispatcher.is_empty());
}

#[test]
fn test_scheduler_trait_object() {
    struct Rejecting;
    impl Scheduler for Rejecting {
        fn schedule(&self, _: Packet, _: TimeTag) -> oscwire_server::Result<()> {
            Err(oscwire_server::ServerError::Config("closed".to_string()))
        }
    }

    let dispatcher = Dispatcher::new();
    let failures = collect_failures(&dispatcher);
    dispatcher.set_scheduler(Arc::new(Rejecting));

    let bundle = Bundle::new(now() + Duration::from_secs(1)).with(msg("/r"));
    let summary = dispatcher.dispatch_packet(&bundle.into(), now(), None);
    assert_eq!(summary.scheduled, 0);
    assert!(failures.lock()[0].contains("closed"));
}

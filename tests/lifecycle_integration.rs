//! Integration tests for reference counting, observers and abort

mod common;

use common::builders::{add_plugin, counting_chain, CountingSource};
use common::first_output;
use crossbeam_channel::unbounded;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::Ordering;
use vispipe_rs::object::Release;
use vispipe_rs::pipeline::bridge::watch_data;
use vispipe_rs::pipeline::{
    DataId, ExecutionOutcome, ExtentType, NodeId, Pipeline, PipelineError, SkipReason,
};
use vispipe_rs::{EventKind, EventPayload};

#[test]
fn test_delete_event_fires_on_last_release() {
    let mut p = Pipeline::new();
    let data = p.add_data(ExtentType::Pieces);
    p.register_data(data).unwrap();

    let deleted = Rc::new(Cell::new(false));
    let flag = deleted.clone();
    p.data(data)
        .unwrap()
        .base()
        .add_observer(EventKind::Delete, 0.0, move |_| flag.set(true));

    assert_eq!(p.unregister_data(data).unwrap(), Release::Retained(1));
    assert!(!deleted.get());
    assert_eq!(p.unregister_data(data).unwrap(), Release::Destroyed);
    assert!(deleted.get());
    assert_eq!(p.data(data).unwrap_err(), PipelineError::UnknownData(data));
}

#[test]
fn test_input_survives_its_destroyed_producer() {
    let mut p = Pipeline::new();
    let chain = counting_chain(&mut p, CountingSource::new("source"));
    let produced = first_output(&p, chain.source);
    assert_eq!(p.data(produced).unwrap().base().reference_count(), 2);

    assert_eq!(p.unregister_node(chain.source).unwrap(), Release::Destroyed);
    let produced_object = p.data(produced).unwrap();
    assert_eq!(produced_object.source(), None);
    assert_eq!(produced_object.base().reference_count(), 1);
    assert!(produced_object.is_consumer(chain.filter));

    // Without a producer the input is taken as it is.
    p.update(chain.output).unwrap();
    assert!(p.last_outcome(chain.filter).unwrap().is_success());
    assert_eq!(chain.source_runs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_disconnecting_last_consumer_frees_orphaned_data() {
    let mut p = Pipeline::new();
    let chain = counting_chain(&mut p, CountingSource::new("source"));
    let produced = first_output(&p, chain.source);
    p.unregister_node(chain.source).unwrap();

    p.remove_input(chain.filter, produced).unwrap();
    assert!(p.data(produced).is_err());
    assert_eq!(p.node(chain.filter).unwrap().inputs().len(), 0);
}

#[test]
#[should_panic(expected = "double release")]
fn test_double_release_panics() {
    let mut p = Pipeline::new();
    let node = add_plugin(&mut p, CountingSource::new("source"));
    p.unregister_node(node).unwrap();
    let _ = p.unregister_node(node);
}

#[test]
fn test_unknown_ids_are_errors() {
    let mut p = Pipeline::new();
    assert_eq!(
        p.unregister_node(NodeId(42)).unwrap_err(),
        PipelineError::UnknownNode(NodeId(42))
    );
    assert_eq!(
        p.unregister_data(DataId(42)).unwrap_err(),
        PipelineError::UnknownData(DataId(42))
    );
}

#[test]
fn test_observers_run_by_priority() {
    let mut p = Pipeline::new();
    let source = add_plugin(&mut p, CountingSource::new("source"));
    let order = Rc::new(RefCell::new(Vec::new()));

    let base = p.node(source).unwrap().base();
    for (label, priority) in [("low", 1.0), ("high", 5.0), ("high-later", 5.0)] {
        let order = order.clone();
        base.add_observer(EventKind::Start, priority, move |_| {
            order.borrow_mut().push(label)
        });
    }

    p.update_node(source).unwrap();
    assert_eq!(*order.borrow(), vec!["high", "high-later", "low"]);
}

#[test]
fn test_observer_can_stop_dispatch() {
    let mut p = Pipeline::new();
    let source = add_plugin(&mut p, CountingSource::new("source"));
    let reached = Rc::new(Cell::new(false));

    let base = p.node(source).unwrap().base();
    base.add_observer(EventKind::End, 2.0, |event| event.abort());
    let flag = reached.clone();
    base.add_observer(EventKind::End, 1.0, move |_| flag.set(true));

    p.update_node(source).unwrap();
    assert!(!reached.get());
}

#[test]
fn test_abort_from_progress_observer() {
    let mut p = Pipeline::new();
    let source = CountingSource::new("source");
    let runs = source.counter();
    let source = add_plugin(&mut p, source);
    let output = first_output(&p, source);

    let handle = p.abort_handle(source).unwrap();
    let tag = p.node(source).unwrap().base().add_observer(
        EventKind::Progress,
        0.0,
        move |event| {
            if matches!(event.payload(), EventPayload::Progress(v) if *v < 1.0) {
                handle.abort();
            }
        },
    );

    p.update(output).unwrap();
    assert_eq!(
        p.last_outcome(source).unwrap(),
        &ExecutionOutcome::Skipped(SkipReason::Aborted)
    );
    assert!(p.data(output).unwrap().scalars().is_none());
    assert!(p.node(source).unwrap().progress() < 1.0);

    assert!(p.node(source).unwrap().base().remove_observer(tag));
    p.update(output).unwrap();
    assert!(p.last_outcome(source).unwrap().is_success());
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(p.node(source).unwrap().progress(), 1.0);
}

#[test]
fn test_modified_events_reach_other_threads() {
    let mut p = Pipeline::new();
    let source = add_plugin(&mut p, CountingSource::new("source"));
    let output = first_output(&p, source);
    let (tx, rx) = unbounded();
    watch_data(&p, output, EventKind::Modified, tx).unwrap();

    p.update(output).unwrap();
    let handle = std::thread::spawn(move || rx.try_iter().count());
    assert!(handle.join().unwrap() > 0);
}

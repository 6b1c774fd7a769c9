//! End-to-end composition and lifecycle scenarios.
//!
//! 1. Handler mutations are batched: two invokes before a step cost one
//!    recompute observing the final value.
//! 2. A composed child's outputs feed the parent's derivations.
//! 3. `compose_expecting` rejects schema drift at composition time, naming
//!    the fields.
//! 4. Destroying an instance detaches its cells and tears down the whole
//!    composed subtree.
//! 5. Asynchronous completions apply last-write-wins by tick through the
//!    runtime.

#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::rc::Rc;

use weft_charm::Pattern;
use weft_core::{InstanceId, Shape, Source, Value, WeftError};
use weft_graph::Completion;
use weft_harness::{Scenario, counter_pattern, publisher_pattern};

// ── 1. Batched handler mutations ────────────────────────────────────────

#[test]
fn coalesced_invokes_cost_one_recompute() {
    let mut sc = Scenario::new();
    let id = sc.instantiate(&counter_pattern()).unwrap();

    sc.runtime.invoke(id, "increment", &Value::Int(3)).unwrap();
    sc.runtime.invoke(id, "increment", &Value::Int(4)).unwrap();
    let report = sc.step();

    // One flush, one recompute of `doubled`, seeing the final count.
    assert_eq!(report.flushes.len(), 1);
    assert_eq!(report.flushes[0].recomputed, 1);
    assert_eq!(sc.read(id, "count"), Value::Int(7));
    assert_eq!(sc.read(id, "doubled"), Value::Int(14));
}

// ── 2. Child outputs feed parent derivations ────────────────────────────

#[test]
fn parent_derives_from_composed_child() {
    let mut sc = Scenario::new();

    let child_slot: Rc<RefCell<Option<InstanceId>>> = Rc::default();
    let slot = Rc::clone(&child_slot);
    let parent = Pattern::new("parent", ["plus_one"], move |b| {
        let child = b.compose(&counter_pattern())?;
        *slot.borrow_mut() = Some(child.instance);
        let doubled = child.output("doubled")?;
        let plus_one = b.derive("plus_one", vec![doubled], |vals| {
            Ok(Value::Int(vals[0].as_int().unwrap_or(0) + 1))
        })?;
        b.output("plus_one", plus_one);
        Ok(())
    });

    let parent_id = sc.instantiate(&parent).unwrap();
    let child_id = child_slot.borrow().unwrap();

    sc.runtime
        .invoke(child_id, "increment", &Value::Int(5))
        .unwrap();
    sc.settle(16);

    // count=5 -> doubled=10 -> plus_one=11, in one settled pass.
    assert_eq!(sc.read(parent_id, "plus_one"), Value::Int(11));
}

// ── 3. Schema drift at composition time ─────────────────────────────────

#[test]
fn compose_expecting_names_the_drift() {
    let mut sc = Scenario::new();
    let strict = Pattern::new("strict", [] as [&str; 0], |b| {
        b.compose_expecting(&counter_pattern(), &Shape::of(["count", "tripled"]))?;
        Ok(())
    });

    let err = sc.instantiate(&strict).unwrap_err();
    assert_eq!(
        err,
        WeftError::ShapeMismatch {
            missing: vec!["tripled".into()],
            extra: vec!["doubled".into()],
        }
    );
}

// ── 4. Teardown ─────────────────────────────────────────────────────────

#[test]
fn destroy_tears_down_the_composed_subtree() {
    let mut sc = Scenario::new();

    let parent = Pattern::new("parent", ["inner"], |b| {
        let child = b.compose(&publisher_pattern("child", "#svc", 1))?;
        b.output("inner", child.output("out")?);
        Ok(())
    });
    let parent_id = sc.instantiate(&parent).unwrap();
    sc.settle(16);
    assert_eq!(sc.runtime.registry().len(), 1);

    let inner = sc.runtime.output(parent_id, "inner").unwrap();
    sc.runtime.destroy(parent_id).unwrap();

    // The child's publication is retracted and its cell detached.
    assert!(sc.runtime.registry().is_empty());
    assert!(sc.runtime.outcome_of(inner).is_failed());
    let Source::Cell(cell) = inner else {
        panic!("publisher output is a cell");
    };
    assert!(matches!(
        sc.runtime.get(cell),
        Err(WeftError::DetachedCell { .. })
    ));
}

// ── 5. Async completions through the runtime ────────────────────────────

#[test]
fn stale_completion_is_discarded_applied_one_propagates() {
    let mut sc = Scenario::new();

    let fetcher = Pattern::new("fetcher", ["fetch", "echo"], |b| {
        let trigger = b.cell("trigger", Value::Int(0));
        let fetch = b.derive_raw("fetch", vec![trigger.into()], |_| {
            Ok(weft_core::Eval::Pending)
        })?;
        let echo = b.derive("echo", vec![fetch.into()], |vals| Ok(vals[0].clone()))?;
        b.output("fetch", fetch);
        b.output("echo", echo);
        Ok(())
    });
    let id = sc.instantiate(&fetcher).unwrap();
    let Source::Node(fetch) = sc.runtime.output(id, "fetch").unwrap() else {
        panic!("fetch is a node");
    };
    let started = sc.runtime.graph().tick();

    // A completion for a tick the node never pended in is discarded.
    let stale = sc
        .runtime
        .graph_mut()
        .complete(fetch, started.next(), Ok(Value::Int(99)))
        .unwrap();
    assert_eq!(stale, Completion::Stale);
    assert!(sc.runtime.outcome_of(fetch.into()).is_pending());

    // The matching completion applies and wakes the dependent.
    let applied = sc
        .runtime
        .graph_mut()
        .complete(fetch, started, Ok(Value::Int(7)))
        .unwrap();
    assert_eq!(applied, Completion::Applied);
    sc.settle(16);
    assert_eq!(sc.read(id, "echo"), Value::Int(7));
}

#[test]
fn tick_advances_even_when_idle() {
    let mut sc = Scenario::new();
    let before = sc.runtime.graph().tick();
    sc.step();
    sc.step();
    assert_eq!(sc.runtime.graph().tick(), before.next().next());
}

//! Propagation Algorithm Tests
//!
//! One group of tests per propagation rule:
//!
//! 0. A current cell returns its value without recomputing.
//! 1. Setting an input changes its value, advances the global datapulse and
//!    brings the input's own datapulse to it.
//! 2. A changed cell tells every cell that calls it to recalculate, and is
//!    flagged as notifying while it does.
//! 3. A cell asked for its value during a propagation queries the cells it
//!    calls. Cells with nothing out of date are marked current without
//!    running.
//! 4. A queried cell that recalculates and changes brings its querier
//!    current first and queues its other dependents.
//!
//! plus the smaller rules: custom equality and removal.

use std::cell::RefCell;
use std::rc::Rc;

use cells_core::{Cell, CellBuilder, CellResult, Runtime};

type RunLog = Rc<RefCell<Vec<&'static str>>>;

/// A rule that logs its name and adds `from` to its previous value, so it
/// changes every time it runs.
fn logged(
    log: &RunLog,
    name: &'static str,
    from: Cell<i32>,
) -> impl Fn(&mut Runtime, Option<&i32>) -> CellResult<i32> + 'static {
    let log = log.clone();
    move |rt, prev| {
        log.borrow_mut().push(name);
        Ok(rt.get(from)? + prev.copied().unwrap_or(0))
    }
}

// ----------------------------------------------------------------------------
// Rule 0
// ----------------------------------------------------------------------------

/// A current cell does not recalculate when read again.
#[test]
fn rule0_returns_without_recalculation() {
    let mut rt = Runtime::new();
    let runs = Rc::new(RefCell::new(0));
    let runs_clone = runs.clone();
    let x = rt
        .rule("x", move |_, prev: Option<&i32>| {
            *runs_clone.borrow_mut() += 1;
            Ok(prev.copied().unwrap_or(39) + 3)
        })
        .unwrap();

    let first = rt.get(x).unwrap();
    let second = rt.get(x).unwrap();
    assert_eq!(first, second);
    assert_eq!(*runs.borrow(), 1);
}

// ----------------------------------------------------------------------------
// Rule 1
// ----------------------------------------------------------------------------

/// Setting an input advances the global datapulse by exactly one.
#[test]
fn rule1_setting_advances_global_tick() {
    let mut rt = Runtime::new();
    let x = rt.input("x", 21).unwrap();
    let before = rt.tick();

    rt.set(x, 42).unwrap();
    assert_eq!(rt.tick(), before + 1);
}

/// Setting an input changes its value.
#[test]
fn rule1_setting_changes_value() {
    let mut rt = Runtime::new();
    let x = rt.input("x", 21).unwrap();

    rt.set(x, 42).unwrap();
    assert_eq!(rt.get(x).unwrap(), 42);
}

/// Setting an input brings its datapulse to the global one.
#[test]
fn rule1_setting_updates_cell_tick() {
    let mut rt = Runtime::new();
    let x = rt.input("x", 21).unwrap();

    rt.set(x, 42).unwrap();
    assert_eq!(rt.datapulse(x).unwrap(), rt.tick());
}

/// Setting an input to an equal value is not a change.
#[test]
fn rule1_equal_value_is_not_a_change() {
    let mut rt = Runtime::new();
    let x = rt.input("x", 21).unwrap();
    let before = rt.tick();

    rt.set(x, 21).unwrap();
    assert_eq!(rt.tick(), before);
}

// ----------------------------------------------------------------------------
// Rule 2
// ----------------------------------------------------------------------------

/// A changed input makes the cells that call it recalculate.
#[test]
fn rule2_change_notifies_dependents() {
    let mut rt = Runtime::new();
    let x = rt.input("x", 21).unwrap();
    let a = rt.rule("a", move |rt, _| Ok(rt.get(x)? * 2)).unwrap();

    rt.get(a).unwrap();
    rt.set(x, 42).unwrap();
    assert_eq!(rt.get(a).unwrap(), 84);
}

/// The changed cell is flagged as notifying while its dependents run.
#[test]
fn rule2_notifying_flag_is_set_during_propagation() {
    let mut rt = Runtime::new();
    let x = rt.input("x", 21).unwrap();
    let captured = Rc::new(RefCell::new(None));
    let captured_clone = captured.clone();
    let a = rt
        .rule("a", move |rt, _| {
            *captured_clone.borrow_mut() = Some(rt.is_notifying(x)?);
            Ok(rt.get(x)? * 2)
        })
        .unwrap();

    rt.get(a).unwrap();
    assert_eq!(*captured.borrow(), Some(false));

    rt.set(x, 42).unwrap();
    assert_eq!(*captured.borrow(), Some(true));
    assert!(!rt.is_notifying(x).unwrap());
}

/// A rule's dependencies are forgotten when it reruns and recorded again as
/// it reads them.
#[test]
fn rule2_dependencies_rediscovered_on_each_run() {
    let mut rt = Runtime::new();
    let x = rt.input("x", 1).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = seen.clone();
    let a = rt
        .rule("a", move |rt, _| {
            let before = rt.called_by(x)?.len();
            let value = rt.get(x)?;
            let after = rt.called_by(x)?.len();
            seen_clone.borrow_mut().push((before, after));
            Ok(value)
        })
        .unwrap();

    rt.get(a).unwrap();
    rt.set(x, 2).unwrap();
    assert_eq!(*seen.borrow(), [(0, 1), (0, 1)]);
    assert_eq!(rt.calls(a).unwrap(), vec![x.id()]);
}

// ----------------------------------------------------------------------------
// Rule 3
// ----------------------------------------------------------------------------

/// A cell with no out-of-date dependencies is marked current without
/// running.
#[test]
fn rule3_cell_without_stale_dependencies_becomes_current() {
    let mut rt = Runtime::new();
    let x = rt.input("x", 1).unwrap();
    let b = rt
        .rule("b", |_, prev: Option<&i32>| Ok(prev.copied().unwrap_or(40) + 2))
        .unwrap();
    let a = rt
        .rule("a", move |rt, _| Ok(rt.get(b)? * rt.get(x)?))
        .unwrap();
    rt.get(a).unwrap();

    // Advance the clock through an unrelated input.
    let other = rt.input("other", 0).unwrap();
    rt.set(other, 1).unwrap();

    rt.get(a).unwrap();
    assert_eq!(rt.datapulse(a).unwrap(), rt.tick());
}

/// A cell queried during a propagation is brought current without
/// rerunning when nothing it calls changed.
#[test]
fn rule3_called_cell_is_queried_not_rerun() {
    let mut rt = Runtime::new();
    let x = rt.input("x", 1).unwrap();
    let b_runs = Rc::new(RefCell::new(0));
    let b_runs_clone = b_runs.clone();
    let b = rt
        .rule("b", move |_, prev: Option<&i32>| {
            *b_runs_clone.borrow_mut() += 1;
            Ok(prev.copied().unwrap_or(40) + 2)
        })
        .unwrap();
    let a = rt
        .rule("a", move |rt, _| Ok(rt.get(b)? * rt.get(x)?))
        .unwrap();

    rt.get(a).unwrap();
    rt.set(x, 2).unwrap();

    assert_eq!(rt.datapulse(b).unwrap(), rt.tick());
    assert_eq!(rt.peek(b).unwrap(), Some(42));
    assert_eq!(*b_runs.borrow(), 1);
    assert_eq!(rt.peek(a).unwrap(), Some(84));
}

/// A queried cell that calls the changed cell recalculates, once.
#[test]
fn rule3_queried_cell_recalculates() {
    let mut rt = Runtime::new();
    let x = rt.input("x", 1).unwrap();
    let b = rt
        .rule("b", move |rt, prev: Option<&i32>| {
            Ok(prev.copied().unwrap_or(2) * rt.get(x)?)
        })
        .unwrap();
    let a = rt
        .rule("a", move |rt, _| Ok(rt.get(b)? + rt.get(x)?))
        .unwrap();

    rt.get(a).unwrap();
    assert_eq!(rt.peek(b).unwrap(), Some(2));

    rt.set(x, 3).unwrap();
    assert_eq!(rt.peek(b).unwrap(), Some(6));
    assert_eq!(rt.peek(a).unwrap(), Some(9));

    // The change has fully propagated; reading again reruns nothing.
    rt.get(a).unwrap();
    assert_eq!(rt.peek(b).unwrap(), Some(6));
}

// ----------------------------------------------------------------------------
// Rule 4
// ----------------------------------------------------------------------------

//    h     i     j
//    |     |     |
//    v     v     v
//    a --> b --> c
//    |           |
//    \---> x <---/
fn rule4_graph() -> (Runtime, Cell<i32>, RunLog) {
    let mut rt = Runtime::new();
    let log: RunLog = Rc::new(RefCell::new(Vec::new()));

    let x = rt.input("x", 5).unwrap();
    let c = rt.rule("c", logged(&log, "c", x)).unwrap();
    let b = rt.rule("b", logged(&log, "b", c)).unwrap();
    let a_log = log.clone();
    let a = rt
        .rule("a", move |rt, prev: Option<&i32>| {
            a_log.borrow_mut().push("a");
            Ok(rt.get(b)? + rt.get(x)? + prev.copied().unwrap_or(0))
        })
        .unwrap();
    let h = rt.rule("h", logged(&log, "h", a)).unwrap();
    let i = rt.rule("i", logged(&log, "i", b)).unwrap();
    let j = rt.rule("j", logged(&log, "j", c)).unwrap();

    rt.get(h).unwrap();
    rt.get(i).unwrap();
    rt.get(j).unwrap();
    log.borrow_mut().clear();

    rt.set(x, 3).unwrap();
    (rt, x, log)
}

/// The querying chain recalculates first: c, then b, then a.
#[test]
fn rule4_querying_cell_recalculates_first() {
    let (_rt, _x, log) = rule4_graph();
    assert_eq!(log.borrow()[..3], ["c", "b", "a"]);
}

/// The remaining dependents still recalculate.
#[test]
fn rule4_queried_cell_queues_recalculations() {
    let (_rt, _x, log) = rule4_graph();
    assert!(log.borrow().contains(&"j"));
}

/// Queued cells run after every querying cell, in FIFO order.
#[test]
fn rule4_queued_cells_run_after_querying_cells() {
    let (rt, _x, log) = rule4_graph();
    assert_eq!(*log.borrow(), ["c", "b", "a", "j", "i", "h"]);
    assert_eq!(rt.context().pending_updates(), 0);
    assert!(!rt.is_propagating());
}

// ----------------------------------------------------------------------------
// Trivial rules
// ----------------------------------------------------------------------------

/// A custom equality test can suppress a change.
#[test]
fn alternate_equality_tester() {
    let mut rt = Runtime::new();
    let x = CellBuilder::new("x")
        .value(5)
        .unchanged_if(|old: &i32, new: &i32| (old - new).abs() < 5)
        .build(&mut rt)
        .unwrap();
    let a = rt.rule("a", move |rt, _| Ok(rt.get(x)? * 2)).unwrap();

    assert_eq!(rt.get(a).unwrap(), 10);
    rt.set(x, 7).unwrap();
    assert_eq!(rt.get(a).unwrap(), 10);
    assert_eq!(rt.get(x).unwrap(), 5);

    rt.set(x, 11).unwrap();
    assert_eq!(rt.get(a).unwrap(), 22);
}

/// A rule's equality test keeps the old value when a rerun is "the same".
#[test]
fn rule_equality_keeps_old_value() {
    let mut rt = Runtime::new();
    let x = rt.input("x", 1.0f64).unwrap();
    let rounded = CellBuilder::new("rounded")
        .rule(move |rt, _| rt.get(x))
        .unchanged_if(|old: &f64, new: &f64| (old - new).abs() < 0.5)
        .build(&mut rt)
        .unwrap();
    let runs = Rc::new(RefCell::new(0));
    let runs_clone = runs.clone();
    let watcher = rt
        .rule("watcher", move |rt, _| {
            *runs_clone.borrow_mut() += 1;
            rt.get(rounded)
        })
        .unwrap();

    rt.get(watcher).unwrap();
    rt.set(x, 1.2).unwrap();
    assert_eq!(rt.peek(rounded).unwrap(), Some(1.0));
    assert_eq!(*runs.borrow(), 1);

    rt.set(x, 2.0).unwrap();
    assert_eq!(rt.peek(watcher).unwrap(), Some(2.0));
    assert_eq!(*runs.borrow(), 2);
}

/// Removing a cell leaves no edges pointing at it.
#[test]
fn removed_cell_leaves_no_references() {
    let mut rt = Runtime::new();
    let x = rt.input("x", 3).unwrap();
    let a = rt.rule("a", move |rt, _| Ok(rt.get(x)? + 1)).unwrap();
    rt.get(a).unwrap();

    rt.remove(x).unwrap();
    assert!(!rt.contains(x));
    assert!(rt.calls(a).unwrap().is_empty());
    assert_eq!(rt.peek(a).unwrap(), Some(4));
}

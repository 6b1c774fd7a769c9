#![forbid(unsafe_code)]

//! Reference patterns shared by the end-to-end suites.

use std::cell::RefCell;
use std::rc::Rc;

use weft_charm::Pattern;
use weft_core::{Value, WishId};

/// Shared slot a wisher pattern writes its [`WishId`] into, so a test can
/// interrogate the wish after instantiation.
pub type WishHandle = Rc<RefCell<Option<WishId>>>;

/// A counter with a derived double and an `increment` handler.
///
/// Outputs: `count`, `doubled`.
#[must_use]
pub fn counter_pattern() -> Pattern {
    Pattern::new("counter", ["count", "doubled"], |b| {
        let count = b.cell("count", Value::Int(0));
        let doubled = b.derive("doubled", vec![count.into()], |vals| {
            Ok(Value::Int(vals[0].as_int().unwrap_or(0) * 2))
        })?;
        b.output("count", count);
        b.output("doubled", doubled);
        b.handler("increment", move |graph, payload| {
            let by = payload.as_int().unwrap_or(1);
            let current = graph
                .get(count)
                .map_err(|e| weft_core::EvalError::new(e.to_string()))?
                .as_int()
                .unwrap_or(0);
            graph
                .set(count, Value::Int(current + by))
                .map_err(|e| weft_core::EvalError::new(e.to_string()))?;
            Ok(())
        });
        Ok(())
    })
}

/// An instance that publishes a single constant output under `tag`.
///
/// Outputs: `out`.
#[must_use]
pub fn publisher_pattern(name: &str, tag: &str, value: i64) -> Pattern {
    let name = name.to_owned();
    let tag = tag.to_owned();
    Pattern::new(name, ["out"], move |b| {
        let cell = b.cell("out", Value::Int(value));
        b.output("out", cell);
        b.publish("out", &tag)?;
        Ok(())
    })
}

/// An instance that opens a wish for `tag` and exports nothing.
///
/// Returns the pattern and the handle its build writes the [`WishId`] into.
#[must_use]
pub fn wisher_pattern(tag: &str) -> (Pattern, WishHandle) {
    let tag = tag.to_owned();
    let handle: WishHandle = Rc::default();
    let slot = Rc::clone(&handle);
    let pattern = Pattern::new("wisher", [] as [&str; 0], move |b| {
        *slot.borrow_mut() = Some(b.wish(&tag)?);
        Ok(())
    });
    (pattern, handle)
}

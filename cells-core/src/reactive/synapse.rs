//! Change Synapses
//!
//! A synapse is a private filter cell sitting between a rule and one of its
//! inputs. The rule depends on the synapse instead of the input, and the
//! synapse only lets a new value through once it has moved far enough from
//! the last value it let through. Small jitter on the input therefore never
//! reaches the rule.

use std::ops::Sub;

use tracing::debug;

use crate::error::{CellError, CellResult};

use super::cell::CellBuilder;
use super::handle::Cell;
use super::runtime::Runtime;

impl Runtime {
    /// Read `source` through a change filter owned by the running rule.
    ///
    /// The filter is created on the first call for a given `name` and reused
    /// on later runs of the same rule. Its value only follows `source` when
    /// the two differ by more than `delta`.
    ///
    /// Fails with `ConstructionConflict` outside of a rule.
    pub fn change_synapse<T>(&mut self, name: &str, source: Cell<T>, delta: T) -> CellResult<T>
    where
        T: Copy + PartialOrd + PartialEq + Sub<Output = T> + 'static,
    {
        let Some(owner) = self.ctx.current() else {
            return Err(CellError::ConstructionConflict {
                cell: name.to_string(),
                reason: "a change synapse can only be created inside a rule",
            });
        };

        let existing = self.node(owner)?.synapses.get(name).copied();
        let synapse = match existing.filter(|id| self.contains(*id)) {
            Some(id) => {
                self.check_type::<T>(id)?;
                Cell::from_id(id)
            }
            None => {
                let full_name = format!("{}.{}", self.name_of(owner), name);
                debug!(synapse = %full_name, "creating change synapse");
                let synapse = CellBuilder::new(full_name)
                    .rule(move |rt, prev: Option<&T>| {
                        let value = rt.get(source)?;
                        Ok(match prev {
                            Some(&last) if !moved_beyond(value, last, delta) => last,
                            _ => value,
                        })
                    })
                    .build(self)?;
                self.node_mut(owner)?
                    .synapses
                    .insert(name.to_string(), synapse.id());
                synapse
            }
        };

        self.get(synapse)
    }
}

fn moved_beyond<T>(value: T, last: T, delta: T) -> bool
where
    T: Copy + PartialOrd + Sub<Output = T>,
{
    let distance = if value > last {
        value - last
    } else {
        last - value
    };
    distance > delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn distance_is_symmetric() {
        assert!(moved_beyond(10, 3, 5));
        assert!(moved_beyond(3, 10, 5));
        assert!(!moved_beyond(7, 3, 5));
        assert!(!moved_beyond(2.0, 2.5, 1.0));
    }

    #[test]
    fn synapse_filters_small_changes() {
        let mut rt = Runtime::new();
        let runs = Rc::new(RefCell::new(0));
        let runs_clone = runs.clone();
        let x = rt.input("x", 10).unwrap();
        let a = rt
            .rule("a", move |rt, _| {
                *runs_clone.borrow_mut() += 1;
                rt.change_synapse("filter", x, 5)
            })
            .unwrap();

        assert_eq!(rt.get(a).unwrap(), 10);
        rt.set(x, 13).unwrap();
        assert_eq!(rt.get(a).unwrap(), 10);
        assert_eq!(*runs.borrow(), 1);

        rt.set(x, 16).unwrap();
        assert_eq!(rt.get(a).unwrap(), 16);
        assert_eq!(*runs.borrow(), 2);
    }

    #[test]
    fn synapse_is_reused_across_runs() {
        let mut rt = Runtime::new();
        let x = rt.input("x", 0).unwrap();
        let a = rt
            .rule("a", move |rt, _| rt.change_synapse("filter", x, 1))
            .unwrap();
        rt.get(a).unwrap();
        let cells = rt.cell_count();

        rt.set(x, 5).unwrap();
        rt.set(x, 10).unwrap();
        assert_eq!(rt.cell_count(), cells);
        assert_eq!(rt.get(a).unwrap(), 10);
    }

    #[test]
    fn synapse_outside_rule_fails() {
        let mut rt = Runtime::new();
        let x = rt.input("x", 0).unwrap();
        assert!(matches!(
            rt.change_synapse("filter", x, 1),
            Err(CellError::ConstructionConflict { .. })
        ));
    }

    #[test]
    fn removing_owner_removes_synapse() {
        let mut rt = Runtime::new();
        let x = rt.input("x", 0).unwrap();
        let a = rt
            .rule("a", move |rt, _| rt.change_synapse("filter", x, 1))
            .unwrap();
        rt.get(a).unwrap();
        assert_eq!(rt.cell_count(), 3);

        rt.remove(a).unwrap();
        assert_eq!(rt.cell_count(), 1);
        assert!(rt.called_by(x).unwrap().is_empty());
    }
}

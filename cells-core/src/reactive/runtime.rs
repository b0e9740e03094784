//! Reactive Runtime
//!
//! The runtime owns a cell graph and drives change through it. It
//! implements the read path, validation, recompute, propagation and the
//! write path.
//!
//! # How It Works
//!
//! 1. Reading a cell while another cell's rule runs records a dependency
//!    edge, then brings the read cell up to date.
//!
//! 2. A cell is current when its datapulse equals the global tick. Outside a
//!    propagation, a bound cell is simply assumed current. During one, it
//!    asks each cell it calls to update and reruns itself if any of them
//!    changed.
//!
//! 3. Setting an input cell advances the tick and notifies its dependents.
//!    A dependent that changes while being queried by another cell notifies
//!    that querier first and queues its other dependents.
//!
//! 4. Queued updates and writes that arrived mid-propagation are applied in
//!    FIFO order once the outermost propagation unwinds.
//!
//! # Reentrancy
//!
//! Everything is single-threaded and synchronous. Rules receive
//! `&mut Runtime`, so a rule reading a cell can re-enter validation,
//! recompute and propagation. The running and propagating markers are
//! saved and restored around each of those, and restored before an error
//! is returned.

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::config::RuntimeConfig;
use crate::error::{CellError, CellResult, MutationOp};
use crate::graph::{AnyValue, CellArena, CellId, CellKind, CellNode, Tick};

use super::context::{PendingWrite, PropagationContext, Propagator};
use super::handle::Cell;
use super::owner::{CellChange, ObserverDispatch, OwnerId};

/// Edge lists copied out of a node before traversal.
type EdgeList = SmallVec<[CellId; 8]>;

/// How a read should treat until-asked lazy cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadMode {
    /// An ordinary read.
    Normal,
    /// The read a host object performs while initializing.
    Init,
}

/// A cell graph plus the propagation state that drives it.
pub struct Runtime {
    pub(crate) arena: CellArena,
    pub(crate) ctx: PropagationContext,
    owners: HashMap<OwnerId, Rc<dyn ObserverDispatch>>,
    config: RuntimeConfig,
}

impl Runtime {
    /// Create an empty runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create an empty runtime. An `initial_tick` of 0 is raised to 1.
    pub fn with_config(mut config: RuntimeConfig) -> Self {
        if config.initial_tick == 0 {
            warn!("initial_tick 0 is reserved for cells that never ran; starting at 1");
            config.initial_tick = 1;
        }
        Self {
            arena: CellArena::new(),
            ctx: PropagationContext::new(config.initial_tick),
            owners: HashMap::new(),
            config,
        }
    }

    /// The configuration this runtime was created with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The propagation state, for inspection.
    pub fn context(&self) -> &PropagationContext {
        &self.ctx
    }

    /// Reinitialize all propagation state.
    ///
    /// Cells are left as they are. Intended for test isolation.
    pub fn reset(&mut self) {
        debug!(tick = self.config.initial_tick, "resetting propagation state");
        self.ctx.reset(self.config.initial_tick);
    }

    /// The current datapulse.
    pub fn tick(&self) -> Tick {
        self.ctx.tick()
    }

    /// Is a propagation in flight?
    pub fn is_propagating(&self) -> bool {
        self.ctx.is_propagating()
    }

    /// Number of live cells.
    pub fn cell_count(&self) -> usize {
        self.arena.len()
    }

    // ------------------------------------------------------------------
    // Owners
    // ------------------------------------------------------------------

    /// Register an observer dispatch hook for a new owner.
    pub fn register_owner(&mut self, hook: Rc<dyn ObserverDispatch>) -> OwnerId {
        let owner = OwnerId::new();
        self.owners.insert(owner, hook);
        owner
    }

    /// Remove an owner's dispatch hook. Its cells stay in the graph.
    pub fn unregister_owner(&mut self, owner: OwnerId) {
        self.owners.remove(&owner);
    }

    fn dispatch_change(&mut self, cell: CellId, was_bound: bool) -> CellResult<()> {
        let Some(owner) = self.arena.get(cell).and_then(|node| node.owner) else {
            return Ok(());
        };
        let Some(hook) = self.owners.get(&owner).cloned() else {
            return Ok(());
        };
        hook.dispatch(
            self,
            &CellChange {
                owner,
                cell,
                was_bound,
            },
        )
    }

    // ------------------------------------------------------------------
    // Typed access
    // ------------------------------------------------------------------

    /// Read a cell's up-to-date value.
    ///
    /// Inside a rule, this also records the running cell as a dependent.
    pub fn get<T: Clone + 'static>(&mut self, cell: Cell<T>) -> CellResult<T> {
        self.check_type::<T>(cell.id())?;
        self.read(cell.id(), ReadMode::Normal)?;
        self.bound_value(cell)
    }

    /// Like [`get`](Self::get), but an unbound cell reads as `None`.
    pub fn get_opt<T: Clone + 'static>(&mut self, cell: Cell<T>) -> CellResult<Option<T>> {
        self.check_type::<T>(cell.id())?;
        self.read(cell.id(), ReadMode::Normal)?;
        self.value_ref(cell).map(|value| value.cloned())
    }

    /// The read a host object performs while initializing. Identical to
    /// [`get`](Self::get) except that it leaves until-asked lazy cells lazy.
    pub fn get_init<T: Clone + 'static>(&mut self, cell: Cell<T>) -> CellResult<T> {
        self.check_type::<T>(cell.id())?;
        self.read(cell.id(), ReadMode::Init)?;
        self.bound_value(cell)
    }

    /// The stored value, without validation or dependency tracking.
    pub fn peek<T: Clone + 'static>(&self, cell: Cell<T>) -> CellResult<Option<T>> {
        self.value_ref(cell).map(|value| value.cloned())
    }

    /// The value the cell held before its most recent change.
    pub fn last_value<T: Clone + 'static>(&self, cell: Cell<T>) -> CellResult<Option<T>> {
        let node = self.node(cell.id())?;
        match node.last_value.as_deref() {
            None => Ok(None),
            Some(value) => value
                .downcast_ref::<T>()
                .cloned()
                .map(Some)
                .ok_or_else(|| type_mismatch::<T>(node)),
        }
    }

    /// Write a new value into an input cell.
    ///
    /// During a propagation the write is queued and applied once the
    /// outermost propagation has finished.
    pub fn set<T: Clone + 'static>(&mut self, cell: Cell<T>, value: T) -> CellResult<()> {
        self.check_type::<T>(cell.id())?;
        self.write(cell.id(), PendingWrite::Replace(Box::new(value)))
    }

    /// Force a rule cell to recompute. Returns whether its value changed.
    ///
    /// The change is not propagated; dependents catch up on their next
    /// validation.
    pub fn run<T>(&mut self, cell: Cell<T>) -> CellResult<bool> {
        self.run_cell(cell.id())
    }

    /// Remove a cell from the graph, along with every edge touching it and
    /// any synapses its rule created.
    pub fn remove<T>(&mut self, cell: Cell<T>) -> CellResult<()> {
        self.remove_id(cell.id())
    }

    pub(crate) fn remove_id(&mut self, id: CellId) -> CellResult<()> {
        let node = self
            .arena
            .remove(id)
            .ok_or(CellError::StaleHandle { id })?;
        debug!(cell = %node.name, "removed cell");
        for synapse in node.synapses.into_values() {
            self.arena.remove(synapse);
        }
        Ok(())
    }

    /// The initialization read a host object performs on each field. An
    /// unbound cell is not an error here.
    pub(crate) fn read_init(&mut self, id: CellId) -> CellResult<()> {
        self.read(id, ReadMode::Init)
    }

    fn value_ref<T: 'static>(&self, cell: Cell<T>) -> CellResult<Option<&T>> {
        let node = self.node(cell.id())?;
        match node.value.as_deref() {
            None => Ok(None),
            Some(value) => value
                .downcast_ref::<T>()
                .map(Some)
                .ok_or_else(|| type_mismatch::<T>(node)),
        }
    }

    fn bound_value<T: Clone + 'static>(&self, cell: Cell<T>) -> CellResult<T> {
        match self.value_ref(cell)? {
            Some(value) => Ok(value.clone()),
            None => Err(CellError::Unbound {
                cell: self.name_of(cell.id()),
            }),
        }
    }

    pub(crate) fn check_type<T: 'static>(&self, id: CellId) -> CellResult<()> {
        let node = self.node(id)?;
        if node.value_type.id == std::any::TypeId::of::<T>() {
            Ok(())
        } else {
            Err(type_mismatch::<T>(node))
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// The name the cell was created with.
    pub fn name(&self, id: impl Into<CellId>) -> CellResult<&str> {
        self.node(id.into()).map(|node| node.name.as_str())
    }

    /// Which variant the cell currently is.
    pub fn kind(&self, id: impl Into<CellId>) -> CellResult<CellKind> {
        self.node(id.into()).map(|node| node.kind)
    }

    /// Has the cell been given its first value?
    pub fn is_bound(&self, id: impl Into<CellId>) -> CellResult<bool> {
        self.node(id.into()).map(|node| node.bound)
    }

    /// Is the cell computed only when read?
    pub fn is_lazy(&self, id: impl Into<CellId>) -> CellResult<bool> {
        self.node(id.into()).map(|node| node.lazy)
    }

    /// Tick of the cell's last validation or recompute.
    pub fn datapulse(&self, id: impl Into<CellId>) -> CellResult<Tick> {
        self.node(id.into()).map(|node| node.datapulse)
    }

    /// Tick at which the cell's value last changed.
    pub fn changed_datapulse(&self, id: impl Into<CellId>) -> CellResult<Tick> {
        self.node(id.into()).map(|node| node.changed_datapulse)
    }

    /// Is the cell currently broadcasting a change to its dependents?
    pub fn is_notifying(&self, id: impl Into<CellId>) -> CellResult<bool> {
        self.node(id.into()).map(|node| node.notifying)
    }

    /// Cells read during the cell's most recent run.
    pub fn calls(&self, id: impl Into<CellId>) -> CellResult<Vec<CellId>> {
        self.node(id.into())
            .map(|node| node.calls.iter().copied().collect())
    }

    /// Cells whose most recent run read this cell.
    pub fn called_by(&self, id: impl Into<CellId>) -> CellResult<Vec<CellId>> {
        self.node(id.into())
            .map(|node| node.called_by.iter().copied().collect())
    }

    /// Does `id` still refer to a live cell?
    pub fn contains(&self, id: impl Into<CellId>) -> bool {
        self.arena.contains(id.into())
    }

    pub(crate) fn node(&self, id: CellId) -> CellResult<&CellNode> {
        self.arena.get(id).ok_or(CellError::StaleHandle { id })
    }

    pub(crate) fn node_mut(&mut self, id: CellId) -> CellResult<&mut CellNode> {
        self.arena.get_mut(id).ok_or(CellError::StaleHandle { id })
    }

    pub(crate) fn name_of(&self, id: CellId) -> String {
        self.arena
            .get(id)
            .map(|node| node.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    fn read(&mut self, id: CellId, mode: ReadMode) -> CellResult<()> {
        self.node(id)?;

        // Every read inside a rule re-records the edge. This is the only way
        // the graph learns what a rule depends on.
        if let Some(current) = self.ctx.current() {
            if current != id {
                self.arena.link(id, current);
            }
        }

        self.update(id, None)?;

        if mode == ReadMode::Normal {
            let node = self.node_mut(id)?;
            if node.kind == CellKind::UntilAskedLazy && node.lazy {
                debug!(cell = %node.name, "until-asked cell read; now eager");
                node.lazy = false;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Bring a cell up to date. Returns true if the caller must treat it as
    /// changed during this tick.
    pub(crate) fn update(&mut self, id: CellId, queryer: Option<CellId>) -> CellResult<bool> {
        let tick = self.ctx.tick();
        let propagating = self.ctx.is_propagating();

        let (calls, datapulse) = {
            let node = self.node(id)?;

            if node.running {
                trace!(cell = %node.name, "mid-run; treating as current");
                return Ok(false);
            }
            if !node.bound {
                if node.rule.is_none() {
                    // An ephemeral input that has never been set.
                    return Ok(false);
                }
                trace!(cell = %node.name, "unbound; running");
                self.run_cell(id)?;
                return Ok(true);
            }
            if node.changed_at(tick) {
                trace!(cell = %node.name, tick, "changed this tick");
                return Ok(true);
            }
            if node.is_current(tick) {
                trace!(cell = %node.name, tick, "current");
                return Ok(false);
            }
            if !propagating && !node.lazy {
                trace!(cell = %node.name, tick, "no propagation in flight; assumed current");
                self.node_mut(id)?.datapulse = tick;
                return Ok(false);
            }

            let calls: EdgeList = node.calls.iter().copied().collect();
            (calls, node.datapulse)
        };

        for dep in calls {
            if !self.arena.contains(dep) {
                continue;
            }
            let changed = self.update(dep, Some(id))?;
            let missed = self
                .arena
                .get(dep)
                .is_some_and(|node| node.changed_datapulse > datapulse);

            if changed || missed {
                trace!(cell = %self.name_of(id), dep = %self.name_of(dep), "dependency changed");
                if !self.node(id)?.is_current(tick) && self.run_cell(id)? {
                    self.propagate(id, queryer)?;
                }
                // The run replaced the calls set and brought every callee
                // current, so the rest of the old list is moot.
                return Ok(false);
            }
        }

        self.node_mut(id)?.datapulse = tick;
        Ok(false)
    }

    // ------------------------------------------------------------------
    // Recompute
    // ------------------------------------------------------------------

    /// Run the cell's rule. Returns whether its value changed.
    pub(crate) fn run_cell(&mut self, id: CellId) -> CellResult<bool> {
        let tick = self.ctx.tick();
        let (rule, prev, was_bound) = {
            let node = self.node(id)?;
            let Some(rule) = node.rule.clone() else {
                return Err(CellError::InvalidMutation {
                    cell: node.name.clone(),
                    op: MutationOp::Run,
                });
            };
            (rule, node.clone_value(), node.bound)
        };

        // The rule may read a different set of cells this time.
        self.arena.sever_calls(id);
        {
            let node = self.node_mut(id)?;
            node.datapulse = tick;
            node.running = true;
            debug!(cell = %node.name, tick, "running rule");
        }

        let saved = self.ctx.enter_run(id);
        let result = rule(self, prev.as_deref());
        self.ctx.exit_run(saved);
        if let Some(node) = self.arena.get_mut(id) {
            node.running = false;
        }
        let new_value = result?;

        let node = self.node_mut(id)?;
        if !node.differs_from(&*new_value) {
            node.bound = true;
            trace!(cell = %node.name, "unchanged");
            return Ok(false);
        }
        node.replace_value(new_value);
        debug!(cell = %node.name, tick, "changed");

        self.dispatch_change(id, was_bound)?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------

    /// Notify the dependents of a changed cell.
    ///
    /// `first` is the cell that queried `id` into recomputing. It is
    /// brought current before any other dependent, and the others are
    /// queued behind it.
    pub(crate) fn propagate(&mut self, id: CellId, first: Option<CellId>) -> CellResult<()> {
        let tick = self.ctx.tick();
        let nested = self.ctx.is_propagating();
        let saved = self.ctx.enter_propagation(Propagator::Cell(id));
        {
            let node = self.node_mut(id)?;
            node.changed_datapulse = tick;
            node.notifying = true;
            debug!(cell = %node.name, tick, nested, "propagating");
        }

        let result = self.notify_dependents(id, first, nested);

        if let Some(node) = self.arena.get_mut(id) {
            node.notifying = false;
        }
        self.ctx.exit_propagation(saved);

        if self.ctx.is_propagating() {
            return result;
        }
        match result {
            Ok(()) => self.drain_deferred(),
            Err(err) => {
                self.discard_deferred();
                Err(err)
            }
        }
    }

    fn notify_dependents(
        &mut self,
        id: CellId,
        first: Option<CellId>,
        nested: bool,
    ) -> CellResult<()> {
        let dependents: EdgeList = self.node(id)?.called_by.iter().copied().collect();

        match first {
            Some(first) => {
                for dependent in dependents.into_iter().filter(|d| *d != first) {
                    self.ctx.defer_update(dependent);
                }
                trace!(cell = %self.name_of(id), first = %self.name_of(first), "updating querier first");
                self.update(first, None)?;
            }
            None if nested => {
                for dependent in dependents {
                    self.ctx.defer_update(dependent);
                }
            }
            None => {
                for dependent in dependents {
                    match self.arena.get(dependent) {
                        None => continue,
                        Some(node) if node.lazy => {
                            trace!(cell = %node.name, "lazy; not updating");
                            continue;
                        }
                        Some(_) => {}
                    }
                    self.update(dependent, None)?;
                }
            }
        }
        Ok(())
    }

    /// Apply everything queued while the outermost propagation ran.
    fn drain_deferred(&mut self) -> CellResult<()> {
        let result = self.drain_updates().and_then(|()| {
            if self.ctx.is_draining_writes() {
                // An enclosing drain owns the write queue.
                Ok(())
            } else {
                self.drain_writes()
            }
        });
        if result.is_err() {
            self.discard_deferred();
        }
        result
    }

    fn drain_updates(&mut self) -> CellResult<()> {
        if self.ctx.pending_updates() == 0 {
            return Ok(());
        }
        debug!(pending = self.ctx.pending_updates(), "draining deferred updates");

        let saved = self.ctx.enter_propagation(Propagator::Draining);
        let result = self.update_queued();
        self.ctx.exit_propagation(saved);
        result
    }

    fn update_queued(&mut self) -> CellResult<()> {
        while let Some(id) = self.ctx.pop_update() {
            match self.arena.get(id) {
                Some(node) if !node.lazy => {}
                _ => continue,
            }
            self.update(id, None)?;
        }
        Ok(())
    }

    fn drain_writes(&mut self) -> CellResult<()> {
        if self.ctx.pending_writes() == 0 {
            return Ok(());
        }
        debug!(pending = self.ctx.pending_writes(), "applying deferred writes");

        self.ctx.set_draining_writes(true);
        let result = self.apply_queued_writes();
        self.ctx.set_draining_writes(false);
        result
    }

    fn apply_queued_writes(&mut self) -> CellResult<()> {
        let mut applied = 0usize;
        while let Some((id, write)) = self.ctx.pop_write() {
            if let Some(limit) = self.config.max_drain_rounds {
                if applied >= limit {
                    return Err(CellError::DrainLimit { limit });
                }
            }
            applied += 1;

            if !self.arena.contains(id) {
                trace!(cell = %id, "deferred write target removed; skipping");
                continue;
            }
            self.apply_write(id, write)?;
        }
        Ok(())
    }

    fn discard_deferred(&mut self) {
        let dropped = self.ctx.discard_deferred();
        if dropped > 0 {
            warn!(dropped, "propagation failed; discarding deferred work");
        }
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    pub(crate) fn write(&mut self, id: CellId, write: PendingWrite) -> CellResult<()> {
        let node = self.node(id)?;
        if !node.kind.is_settable() {
            return Err(CellError::InvalidMutation {
                cell: node.name.clone(),
                op: MutationOp::Set,
            });
        }
        if node.notifying && self.config.reject_reentrant_writes {
            return Err(CellError::ReentrantWrite {
                cell: node.name.clone(),
            });
        }
        if self.ctx.is_propagating() {
            debug!(cell = %node.name, "propagation in flight; deferring write");
            self.ctx.defer_write(id, write);
            return Ok(());
        }
        self.apply_write(id, write)
    }

    fn apply_write(&mut self, id: CellId, write: PendingWrite) -> CellResult<()> {
        let new_value: AnyValue = match write {
            PendingWrite::Replace(value) => value,
            PendingWrite::Mutate(mutate) => {
                let mut value = self.node(id)?.clone_value().ok_or_else(|| {
                    CellError::Unbound {
                        cell: self.name_of(id),
                    }
                })?;
                mutate(&mut *value);
                value
            }
        };

        let (was_bound, ephemeral) = {
            let node = self.node(id)?;
            if !node.differs_from(&*new_value) {
                trace!(cell = %node.name, "write is unchanged; not propagating");
                return Ok(());
            }
            (node.bound, node.ephemeral)
        };

        let tick = self.ctx.advance();
        {
            let node = self.node_mut(id)?;
            node.replace_value(new_value);
            node.datapulse = tick;
            debug!(cell = %node.name, tick, "set");
        }

        let result = self
            .dispatch_change(id, was_bound)
            .and_then(|()| self.propagate(id, None));

        if ephemeral {
            if let Some(node) = self.arena.get_mut(id) {
                trace!(cell = %node.name, "ephemeral pulse over; unbinding");
                node.value = None;
            }
        }
        result
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("tick", &self.ctx.tick())
            .field("cells", &self.arena.len())
            .field("owners", &self.owners.len())
            .field("propagating", &self.ctx.is_propagating())
            .finish()
    }
}

fn type_mismatch<T: 'static>(node: &CellNode) -> CellError {
    CellError::TypeMismatch {
        cell: node.name.clone(),
        expected: std::any::type_name::<T>(),
        found: node.value_type.name,
    }
}

/// Compare two erased values of the same concrete type.
pub(crate) fn erased_eq<T: PartialEq + 'static>(old: &dyn Any, new: &dyn Any) -> bool {
    match (old.downcast_ref::<T>(), new.downcast_ref::<T>()) {
        (Some(old), Some(new)) => old == new,
        _ => false,
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::CellBuilder;
    use std::cell::RefCell;

    #[test]
    fn input_reads_back() {
        let mut rt = Runtime::new();
        let x = rt.input("x", 21).unwrap();
        assert_eq!(rt.get(x).unwrap(), 21);

        rt.set(x, 42).unwrap();
        assert_eq!(rt.get(x).unwrap(), 42);
    }

    #[test]
    fn rule_tracks_input() {
        let mut rt = Runtime::new();
        let x = rt.input("x", 2).unwrap();
        let a = rt.rule("a", move |rt, _| Ok(rt.get(x)? * 10)).unwrap();

        assert_eq!(rt.get(a).unwrap(), 20);
        assert_eq!(rt.calls(a).unwrap(), vec![x.id()]);
        assert_eq!(rt.called_by(x).unwrap(), vec![a.id()]);

        rt.set(x, 3).unwrap();
        assert_eq!(rt.peek(a).unwrap(), Some(30));
    }

    #[test]
    fn rule_receives_previous_value() {
        let mut rt = Runtime::new();
        let x = rt.input("x", 1).unwrap();
        let total = rt
            .rule("total", move |rt, prev: Option<&i32>| {
                Ok(prev.copied().unwrap_or(0) + rt.get(x)?)
            })
            .unwrap();

        assert_eq!(rt.get(total).unwrap(), 1);
        rt.set(x, 5).unwrap();
        assert_eq!(rt.get(total).unwrap(), 6);
    }

    #[test]
    fn wrong_type_is_rejected() {
        let mut rt = Runtime::new();
        let x = rt.input("x", 1i32).unwrap();
        let alias: Cell<String> = Cell::from_id(x.id());

        assert!(matches!(
            rt.get(alias),
            Err(CellError::TypeMismatch { .. })
        ));
        assert!(matches!(
            rt.set(alias, "one".to_string()),
            Err(CellError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn removed_cell_is_stale() {
        let mut rt = Runtime::new();
        let x = rt.input("x", 1).unwrap();
        let a = rt.rule("a", move |rt, _| Ok(rt.get(x)? + 1)).unwrap();
        rt.get(a).unwrap();

        rt.remove(x).unwrap();
        assert!(matches!(rt.get(x), Err(CellError::StaleHandle { .. })));
        assert!(rt.calls(a).unwrap().is_empty());
        assert!(matches!(rt.remove(x), Err(CellError::StaleHandle { .. })));
    }

    #[test]
    fn failed_rule_restores_state() {
        let mut rt = Runtime::new();
        let x = rt.input("x", 1).unwrap();
        let a = rt
            .rule("a", move |rt, _| {
                let v = rt.get(x)?;
                if v > 1 {
                    Err(CellError::rule("too big"))
                } else {
                    Ok(v)
                }
            })
            .unwrap();
        rt.get(a).unwrap();

        assert!(matches!(rt.set(x, 2), Err(CellError::Rule(_))));
        assert!(rt.context().current().is_none());
        assert!(!rt.is_propagating());
        assert!(!rt.is_notifying(x).unwrap());
        assert_eq!(rt.context().pending_updates(), 0);

        // The graph keeps working afterwards.
        rt.set(x, 0).unwrap();
        assert_eq!(rt.get(a).unwrap(), 0);
    }

    #[test]
    fn owner_hook_sees_changes() {
        let mut rt = Runtime::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let owner = rt.register_owner(Rc::new(move |_: &mut Runtime, change: &CellChange| -> CellResult<()> {
            seen_clone.borrow_mut().push(change.was_bound);
            Ok(())
        }));

        let x = CellBuilder::new("x").value(1).owner(owner).build(&mut rt).unwrap();
        let a = CellBuilder::new("a")
            .rule(move |rt, _| Ok(rt.get(x)? * 2))
            .owner(owner)
            .build(&mut rt)
            .unwrap();

        rt.get(a).unwrap();
        rt.set(x, 2).unwrap();
        // a bound for the first time, x set, a recomputed.
        assert_eq!(*seen.borrow(), vec![false, true, true]);

        rt.unregister_owner(owner);
        rt.set(x, 3).unwrap();
        assert_eq!(seen.borrow().len(), 3);
    }

    #[test]
    fn reset_rewinds_clock() {
        let mut rt = Runtime::new();
        let x = rt.input("x", 1).unwrap();
        rt.set(x, 2).unwrap();
        assert_eq!(rt.tick(), 2);

        rt.reset();
        assert_eq!(rt.tick(), 1);
        assert!(!rt.is_propagating());
    }

    #[test]
    fn drain_limit_stops_runaway_writes() {
        let mut rt = Runtime::with_config(RuntimeConfig {
            max_drain_rounds: Some(3),
            ..RuntimeConfig::default()
        });
        let x = rt.input("x", 0).unwrap();
        let y = rt.input("y", 0).unwrap();
        // x feeds y and y feeds x, through deferred writes.
        let bump = rt
            .rule("bump", move |rt, _| {
                let v = rt.get(x)?;
                rt.set(y, v + 1)?;
                Ok(v)
            })
            .unwrap();
        let echo = rt
            .rule("echo", move |rt, _| {
                let v = rt.get(y)?;
                rt.set(x, v + 1)?;
                Ok(v)
            })
            .unwrap();
        rt.get(bump).unwrap();
        rt.get(echo).unwrap();

        assert!(matches!(
            rt.set(x, 10),
            Err(CellError::DrainLimit { limit: 3 })
        ));
        assert_eq!(rt.context().pending_writes(), 0);
    }

    #[test]
    fn tick_zero_config_starts_at_one() {
        let mut rt = Runtime::with_config(RuntimeConfig {
            initial_tick: 0,
            ..RuntimeConfig::default()
        });
        assert_eq!(rt.tick(), 1);
        assert_eq!(rt.config().initial_tick, 1);

        let x = rt.input("x", 1).unwrap();
        let double = rt.rule("double", move |rt, _| Ok(rt.get(x)? * 2)).unwrap();
        assert_eq!(rt.get(double).unwrap(), 2);
        assert_eq!(rt.datapulse(double).unwrap(), 1);

        rt.set(x, 2).unwrap();
        rt.reset();
        assert_eq!(rt.tick(), 1);
    }
}

use std::collections::BTreeMap;

use crate::backend::ResourceId;
use crate::cmd::CommandList;
use crate::error::{EngineError, EngineResult};

use super::state::ResourceState;

#[derive(Debug)]
struct Record {
    current: ResourceState,
    baseline: ResourceState,
    /// States visited since `begin_frame`, starting with the state at frame start.
    history: Vec<ResourceState>,
}

/// Tracks the declared state of every registered resource.
///
/// The tracker mirrors CPU recording order. Lists built against it must be
/// submitted in the order they were recorded.
#[derive(Debug, Default)]
pub struct StateTracker {
    records: BTreeMap<ResourceId, Record>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `resource` in `baseline`, its required end-of-frame state.
    ///
    /// Re-registering replaces the previous record.
    pub fn register(&mut self, resource: ResourceId, baseline: ResourceState) {
        self.records.insert(
            resource,
            Record {
                current: baseline,
                baseline,
                history: vec![baseline],
            },
        );
    }

    pub fn forget(&mut self, resource: ResourceId) {
        self.records.remove(&resource);
    }

    pub fn is_tracked(&self, resource: ResourceId) -> bool {
        self.records.contains_key(&resource)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn current(&self, resource: ResourceId) -> EngineResult<ResourceState> {
        self.record(resource).map(|r| r.current)
    }

    pub fn baseline(&self, resource: ResourceId) -> EngineResult<ResourceState> {
        self.record(resource).map(|r| r.baseline)
    }

    /// Records `from -> to` after checking `from` against the tracked state.
    pub fn transition(
        &mut self,
        list: &mut CommandList,
        resource: ResourceId,
        from: ResourceState,
        to: ResourceState,
    ) -> EngineResult<()> {
        let record = self.record_mut(resource)?;
        if record.current != from {
            return Err(EngineError::StateMismatch {
                resource,
                declared: from,
                actual: record.current,
            });
        }

        if from != to {
            list.transition(resource, from, to);
            record.current = to;
            record.history.push(to);
        }
        Ok(())
    }

    /// Brings `resource` into `state`, recording a barrier only if it is elsewhere.
    ///
    /// Returns whether a barrier was recorded.
    pub fn ensure(
        &mut self,
        list: &mut CommandList,
        resource: ResourceId,
        state: ResourceState,
    ) -> EngineResult<bool> {
        let from = self.current(resource)?;
        if from == state {
            return Ok(false);
        }
        self.transition(list, resource, from, state)?;
        Ok(true)
    }

    /// Records transitions returning every displaced resource to its baseline.
    pub fn restore_baselines(&mut self, list: &mut CommandList) -> usize {
        let mut restored = 0;
        for (&resource, record) in self.records.iter_mut() {
            if record.current != record.baseline {
                list.transition(resource, record.current, record.baseline);
                record.current = record.baseline;
                record.history.push(record.baseline);
                restored += 1;
            }
        }
        restored
    }

    /// Starts a new frame's history.
    pub fn begin_frame(&mut self) {
        for record in self.records.values_mut() {
            record.history.clear();
            record.history.push(record.current);
        }
    }

    /// States `resource` went through since the last `begin_frame`.
    pub fn history(&self, resource: ResourceId) -> Option<&[ResourceState]> {
        self.records.get(&resource).map(|r| r.history.as_slice())
    }

    /// Checks that every resource is back at its baseline.
    pub fn end_frame(&self) -> EngineResult<()> {
        match self
            .records
            .iter()
            .find(|(_, r)| r.current != r.baseline)
        {
            Some((&resource, r)) => Err(EngineError::UnbalancedTransition {
                resource,
                state: r.current,
                baseline: r.baseline,
            }),
            None => Ok(()),
        }
    }

    /// Rolls the declared states back to the frame start.
    ///
    /// Used when a frame's list is dropped without being submitted.
    pub fn discard_frame(&mut self) {
        for record in self.records.values_mut() {
            if let Some(&start) = record.history.first() {
                record.current = start;
            }
            record.history.truncate(1);
        }
    }

    fn record(&self, resource: ResourceId) -> EngineResult<&Record> {
        self.records
            .get(&resource)
            .ok_or(EngineError::UnknownResource(resource))
    }

    fn record_mut(&mut self, resource: ResourceId) -> EngineResult<&mut Record> {
        self.records
            .get_mut(&resource)
            .ok_or(EngineError::UnknownResource(resource))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ResourceState::*;

    fn rid(i: u32) -> ResourceId {
        ResourceId::from_index(i)
    }

    fn tracker_with(resources: &[(u32, ResourceState)]) -> StateTracker {
        let mut t = StateTracker::new();
        for &(i, s) in resources {
            t.register(rid(i), s);
        }
        t
    }

    // ── ensure ────────────────────────────────────────────────────────────

    #[test]
    fn ensure_skips_redundant_barriers() {
        let mut t = tracker_with(&[(0, Present)]);
        let mut list = CommandList::new("frame");

        assert!(t.ensure(&mut list, rid(0), RenderTarget).unwrap());
        assert!(!t.ensure(&mut list, rid(0), RenderTarget).unwrap());
        assert_eq!(list.barriers().count(), 1);
        assert_eq!(t.current(rid(0)).unwrap(), RenderTarget);
    }

    #[test]
    fn ensure_unknown_resource_fails() {
        let mut t = StateTracker::new();
        let mut list = CommandList::new("frame");
        let err = t.ensure(&mut list, rid(9), CopyDest).unwrap_err();
        assert!(matches!(err, EngineError::UnknownResource(r) if r == rid(9)));
        assert!(list.is_empty());
    }

    // ── explicit transitions ──────────────────────────────────────────────

    #[test]
    fn transition_checks_declared_state() {
        let mut t = tracker_with(&[(0, ShaderResource)]);
        let mut list = CommandList::new("frame");

        let err = t.transition(&mut list, rid(0), RenderTarget, CopySource).unwrap_err();
        assert!(matches!(
            err,
            EngineError::StateMismatch { actual: ShaderResource, declared: RenderTarget, .. }
        ));
        assert!(list.is_empty());

        t.transition(&mut list, rid(0), ShaderResource, CopyDest).unwrap();
        assert_eq!(list.barriers().count(), 1);
    }

    // ── frame audit ───────────────────────────────────────────────────────

    #[test]
    fn unbalanced_frame_is_reported() {
        let mut t = tracker_with(&[(0, Present), (1, ShaderResource)]);
        let mut list = CommandList::new("frame");
        t.begin_frame();
        t.ensure(&mut list, rid(1), CopyDest).unwrap();

        let err = t.end_frame().unwrap_err();
        assert!(matches!(
            err,
            EngineError::UnbalancedTransition { state: CopyDest, baseline: ShaderResource, .. }
        ));
    }

    #[test]
    fn restore_baselines_balances_frame() {
        let mut t = tracker_with(&[(0, Present), (1, ShaderResource)]);
        let mut list = CommandList::new("frame");
        t.begin_frame();
        t.ensure(&mut list, rid(0), RenderTarget).unwrap();
        t.ensure(&mut list, rid(1), CopyDest).unwrap();

        assert_eq!(t.restore_baselines(&mut list), 2);
        t.end_frame().unwrap();
        assert_eq!(list.barriers().count(), 4);
        assert_eq!(t.history(rid(0)).unwrap(), &[Present, RenderTarget, Present]);
    }

    #[test]
    fn history_restarts_each_frame() {
        let mut t = tracker_with(&[(0, Present)]);
        let mut list = CommandList::new("frame");
        t.begin_frame();
        t.ensure(&mut list, rid(0), RenderTarget).unwrap();
        t.ensure(&mut list, rid(0), Present).unwrap();

        t.begin_frame();
        assert_eq!(t.history(rid(0)).unwrap(), &[Present]);
    }

    #[test]
    fn discard_rolls_back_to_frame_start() {
        let mut t = tracker_with(&[(0, Present)]);
        let mut list = CommandList::new("frame");
        t.begin_frame();
        t.ensure(&mut list, rid(0), RenderTarget).unwrap();

        t.discard_frame();
        assert_eq!(t.current(rid(0)).unwrap(), Present);
        t.end_frame().unwrap();
    }
}

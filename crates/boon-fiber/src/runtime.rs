//! Runtime boundary: mounting, scheduling and committing.
//!
//! The runtime owns the committed tree and is the only writer of it.
//! Hooks, effects and hosts request changes through the `UpdateQueue`;
//! `flush` and `work` turn queued updates into render passes, synchronous
//! lane first, and commit each finished pass atomically.

use crate::address::NodeId;
use crate::arena::Arena;
use crate::config::RuntimeConfig;
use crate::effects::{EffectOutcome, EffectScheduler};
use crate::element::Element;
use crate::error::RuntimeError;
use crate::lane::{Lane, LaneBatch, Mutation, SchedulerState, UpdateQueue};
use crate::output::{CommitReport, Host, NoopHost, OutputNode};
use crate::render::{Fiber, Progress, RenderPass, Unit, collect_subtree};
use crate::value::Value;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkStatus {
    /// No queued work is left.
    #[default]
    Idle,
    /// The work budget ran out with transition work remaining.
    Yielded,
}

/// What one `flush` or `work` call did.
#[derive(Debug, Default)]
pub struct FlushReport {
    pub status: WorkStatus,
    pub commits: usize,
    /// Passes aborted by render failures. The last commit stayed intact.
    pub aborted: Vec<RuntimeError>,
    /// Transition passes thrown away because newer work arrived.
    pub interrupted: usize,
}

pub struct Runtime {
    config: RuntimeConfig,
    arena: Arena<Fiber>,
    roots: Vec<NodeId>,
    queue: UpdateQueue,
    effects: EffectScheduler,
    /// Transition pass suspended between `work` slices.
    pass: Option<RenderPass>,
    state: SchedulerState,
    host: Box<dyn Host>,
    commit_seq: u64,
    poisoned: Option<String>,
}

impl Runtime {
    pub fn new(host: impl Host + 'static) -> Self {
        Self::with_config(RuntimeConfig::default(), host)
    }

    pub fn with_config(config: RuntimeConfig, host: impl Host + 'static) -> Self {
        Self {
            config,
            arena: Arena::new(),
            roots: Vec::new(),
            queue: UpdateQueue::new(),
            effects: EffectScheduler::new(),
            pass: None,
            state: SchedulerState::Idle,
            host: Box::new(host),
            commit_seq: 0,
            poisoned: None,
        }
    }

    /// Runtime without a host; inspect output through `output`.
    pub fn headless() -> Self {
        Self::new(NoopHost)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Shared handle to the update queue, for hosts that enqueue from
    /// callbacks.
    pub fn updates(&self) -> UpdateQueue {
        self.queue.clone()
    }

    /// Queue a mutation of hook `slot` of `node`. Takes effect on the next
    /// `flush`/`work`.
    pub fn enqueue_update(&self, node: NodeId, slot: usize, mutation: Mutation, lane: Lane) -> u64 {
        self.queue.enqueue(node, slot, mutation, lane)
    }

    pub fn start_transition<R>(&self, f: impl FnOnce() -> R) -> R {
        self.queue.start_transition(f)
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    pub fn has_pending_work(&self) -> bool {
        !self.queue.is_empty() || self.pass.is_some()
    }

    /// Render and commit a new root synchronously. Queued updates are left
    /// for the next `flush`.
    pub fn mount(&mut self, element: Element) -> Result<NodeId, RuntimeError> {
        self.ensure_healthy()?;
        self.drop_pass();

        let root = self.arena.reserve();
        log::debug!("mounting {} as {}", element.name(), root);
        let mut pass = RenderPass::new(
            Lane::Sync,
            LaneBatch::empty(Lane::Sync),
            &self.arena,
            std::iter::once(Unit::root(root, Some(element), true)),
        );
        self.state = SchedulerState::Rendering(Lane::Sync);
        match pass.advance(&mut self.arena, &self.queue, None) {
            Ok(_) => {
                self.roots.push(root);
                let mut report = FlushReport::default();
                self.commit(pass, &mut report)?;
                Ok(root)
            }
            Err(err) => {
                self.abort(pass, err.clone(), &mut FlushReport::default());
                self.arena.release(root);
                Err(err)
            }
        }
    }

    /// Destroy a root, running every owed cleanup deepest first.
    pub fn unmount(&mut self, root: NodeId) -> Result<(), RuntimeError> {
        self.ensure_healthy()?;
        let Some(position) = self.roots.iter().position(|&id| id == root) else {
            return Err(RuntimeError::UnknownRoot { root });
        };
        self.drop_pass();
        self.state = SchedulerState::Committing;

        let destroyed = collect_subtree(&self.arena, root);
        self.roots.remove(position);
        self.release(&destroyed);
        let outcome = self.effects.commit(&destroyed, Vec::new());
        let destroyed = destroyed.into_iter().map(|(id, _)| id).collect();
        self.publish(Lane::Sync, Vec::new(), Vec::new(), destroyed, outcome);
        self.state = SchedulerState::Idle;
        Ok(())
    }

    /// Run all queued work to quiescence.
    pub fn flush(&mut self) -> Result<FlushReport, RuntimeError> {
        self.run(None)
    }

    /// Run queued work, spending at most `budget` node visits on transition
    /// rendering. Synchronous work always runs to completion.
    pub fn work(&mut self, budget: usize) -> Result<FlushReport, RuntimeError> {
        self.run(Some(budget))
    }

    /// `work` with the configured default budget.
    pub fn work_slice(&mut self) -> Result<FlushReport, RuntimeError> {
        self.run(Some(self.config.default_work_budget))
    }

    fn run(&mut self, budget: Option<usize>) -> Result<FlushReport, RuntimeError> {
        self.ensure_healthy()?;
        let mut report = FlushReport::default();
        let mut remaining = budget;

        loop {
            let sync = self.queue.has_pending(Lane::Sync);
            let transition = self.queue.has_pending(Lane::Transition);
            if !sync && !transition {
                self.drop_pass();
                self.state = SchedulerState::Idle;
                return Ok(report);
            }
            if report.commits >= self.config.max_commits_per_flush {
                return Err(self.update_loop(report.commits));
            }

            if sync {
                if self.drop_pass() {
                    report.interrupted += 1;
                }
                let mut pass = self.new_pass(Lane::Sync);
                self.state = SchedulerState::Rendering(Lane::Sync);
                match pass.advance(&mut self.arena, &self.queue, None) {
                    // synchronous passes neither yield nor get interrupted
                    Ok(_) => self.commit(pass, &mut report)?,
                    Err(err) => self.abort(pass, err, &mut report),
                }
                continue;
            }

            if remaining == Some(0) {
                report.status = WorkStatus::Yielded;
                return Ok(report);
            }
            let mut pass = match self.pass.take() {
                Some(pass) if !pass.batch.is_stale(&self.queue) => pass,
                Some(stale) => {
                    log::debug!("transition pass superseded by newer transition updates");
                    stale.discard(&mut self.arena);
                    report.interrupted += 1;
                    self.new_pass(Lane::Transition)
                }
                None => self.new_pass(Lane::Transition),
            };
            self.state = SchedulerState::Rendering(Lane::Transition);

            let before = pass.visits();
            let progress = pass.advance(&mut self.arena, &self.queue, remaining);
            if let Some(left) = remaining.as_mut() {
                *left = left.saturating_sub(pass.visits() - before);
            }
            match progress {
                Ok(Progress::Complete) => self.commit(pass, &mut report)?,
                Ok(Progress::Yielded) => {
                    self.pass = Some(pass);
                    report.status = WorkStatus::Yielded;
                    return Ok(report);
                }
                Ok(Progress::Interrupted) => {
                    log::debug!("transition pass interrupted by synchronous work");
                    pass.discard(&mut self.arena);
                    report.interrupted += 1;
                }
                Err(err) => self.abort(pass, err, &mut report),
            }
        }
    }

    fn new_pass(&self, lane: Lane) -> RenderPass {
        RenderPass::new(
            lane,
            self.queue.batch(lane),
            &self.arena,
            self.roots.iter().map(|&root| Unit::root(root, None, false)),
        )
    }

    /// Discard the suspended transition pass, if any.
    fn drop_pass(&mut self) -> bool {
        match self.pass.take() {
            Some(pass) => {
                pass.discard(&mut self.arena);
                self.state = SchedulerState::Idle;
                true
            }
            None => false,
        }
    }

    fn commit(&mut self, pass: RenderPass, report: &mut FlushReport) -> Result<(), RuntimeError> {
        self.state = SchedulerState::Committing;
        let lane = pass.lane;
        let (batch, draft) = pass.into_parts();
        if draft.is_empty() {
            log::debug!("{} pass rendered nothing", lane);
            self.queue.retire(&batch);
            self.state = SchedulerState::Idle;
            return Ok(());
        }

        let mut destroyed = Vec::new();
        for &removed in &draft.removed {
            destroyed.extend(collect_subtree(&self.arena, removed));
        }

        for (id, fiber) in draft.fibers {
            let applied = if self.arena.is_reserved(id) {
                self.arena.fill(id, fiber).is_ok()
            } else {
                self.arena.replace(id, fiber).is_ok()
            };
            if !applied {
                return Err(self.poison(id, "node slot no longer matches the rendered tree"));
            }
        }
        self.release(&destroyed);
        self.queue.retire(&batch);

        let outcome = self.effects.commit(&destroyed, draft.effects);
        let destroyed = destroyed.into_iter().map(|(id, _)| id).collect();
        self.publish(lane, draft.created, draft.updated, destroyed, outcome);
        report.commits += 1;
        self.state = SchedulerState::Idle;
        Ok(())
    }

    fn release(&mut self, destroyed: &[(NodeId, u32)]) {
        let gone: FxHashSet<NodeId> = destroyed.iter().map(|&(id, _)| id).collect();
        for &(id, _) in destroyed {
            self.arena.release(id);
        }
        self.queue.drop_targets(&gone);
    }

    fn publish(
        &mut self,
        lane: Lane,
        created: Vec<NodeId>,
        updated: Vec<NodeId>,
        destroyed: Vec<NodeId>,
        outcome: EffectOutcome,
    ) {
        self.commit_seq += 1;
        log::debug!(
            "commit #{} ({} lane): {} created, {} updated, {} destroyed, {} effect events",
            self.commit_seq,
            lane,
            created.len(),
            updated.len(),
            destroyed.len(),
            outcome.events.len()
        );
        let trees = if self.config.deliver_output {
            self.outputs()
        } else {
            Vec::new()
        };
        let report = CommitReport {
            lane,
            seq: self.commit_seq,
            trees,
            created,
            updated,
            destroyed,
            effects: outcome.events,
            errors: outcome.failures,
        };
        self.host.on_commit(&report);
    }

    fn abort(&mut self, pass: RenderPass, err: RuntimeError, report: &mut FlushReport) {
        log::warn!("{} pass aborted: {}", pass.lane, err);
        match pass.failure_target(&self.arena) {
            Some(target) => self.queue.retire_target(&pass.batch, target),
            // no queued update explains the failure; drop the whole batch
            None => self.queue.retire(&pass.batch),
        }
        pass.discard(&mut self.arena);
        self.state = SchedulerState::Idle;
        self.host.on_error(&err);
        report.aborted.push(err);
    }

    fn update_loop(&mut self, commits: usize) -> RuntimeError {
        self.drop_pass();
        self.queue.clear();
        self.state = SchedulerState::Idle;
        let err = RuntimeError::UpdateLoop { commits };
        log::warn!("{}", err);
        self.host.on_error(&err);
        err
    }

    fn poison(&mut self, node: NodeId, reason: &str) -> RuntimeError {
        let err = RuntimeError::CommitFailed {
            node,
            reason: reason.to_string(),
        };
        log::error!("{}", err);
        self.poisoned = Some(err.to_string());
        self.state = SchedulerState::Idle;
        self.host.on_error(&err);
        err
    }

    fn ensure_healthy(&self) -> Result<(), RuntimeError> {
        match &self.poisoned {
            Some(reason) => Err(RuntimeError::Poisoned {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn output(&self, root: NodeId) -> Option<OutputNode> {
        OutputNode::build(&self.arena, root)
    }

    pub fn outputs(&self) -> Vec<OutputNode> {
        self.roots
            .iter()
            .filter_map(|&root| OutputNode::build(&self.arena, root))
            .collect()
    }

    /// Committed value of hook `slot` of `node`.
    pub fn hook_value(&self, node: NodeId, slot: usize) -> Option<Value> {
        self.arena.get(node)?.hooks.get(slot)?.value()
    }

    pub fn is_live(&self, node: NodeId) -> bool {
        self.arena.contains(node)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.arena
            .get(node)
            .map(|fiber| fiber.children.to_vec())
            .unwrap_or_default()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.arena.get(node)?.parent
    }

    pub fn props(&self, node: NodeId) -> Option<Value> {
        self.arena.get(node).map(|fiber| fiber.props.clone())
    }

    /// Number of committed nodes across all roots.
    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    pub fn owed_cleanups(&self) -> usize {
        self.effects.owed_cleanups()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Component, View};
    use crate::error::ErrorKind;

    fn counter() -> std::rc::Rc<Component> {
        Component::new("Counter", |cx, _| {
            let (count, _) = cx.use_state(0)?;
            Ok(View::new(count))
        })
    }

    #[test]
    fn stale_commit_poisons_the_runtime() {
        let mut runtime = Runtime::headless();
        let root = runtime.mount(counter().element(())).unwrap();
        runtime.enqueue_update(root, 0, Mutation::Replace(Value::Int(1)), Lane::Sync);

        let mut pass = runtime.new_pass(Lane::Sync);
        pass.advance(&mut runtime.arena, &runtime.queue, None).unwrap();
        runtime.arena.release(root);

        let mut report = FlushReport::default();
        let err = runtime.commit(pass, &mut report).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CommitFailed);
        assert!(runtime.is_poisoned());

        let err = runtime.flush().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Poisoned);
        assert_eq!(runtime.mount(counter().element(())).unwrap_err().kind(), ErrorKind::Poisoned);
    }

    #[test]
    fn unknown_root_is_rejected() {
        let mut runtime = Runtime::headless();
        let root = runtime.mount(counter().element(())).unwrap();
        runtime.unmount(root).unwrap();
        assert_eq!(runtime.unmount(root).unwrap_err().kind(), ErrorKind::UnknownRoot);
        assert_eq!(runtime.node_count(), 0);
    }

    #[test]
    fn state_is_idle_between_calls() {
        let mut runtime = Runtime::headless();
        runtime.mount(counter().element(())).unwrap();
        assert_eq!(runtime.state(), SchedulerState::Idle);
        let report = runtime.flush().unwrap();
        assert_eq!(report.status, WorkStatus::Idle);
        assert_eq!(report.commits, 0);
    }
}

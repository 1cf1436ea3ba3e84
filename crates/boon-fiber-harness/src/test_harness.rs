//! Test harness for driving the runtime without a real host.
//! Records every commit and failure and reads committed output by path.

use boon_fiber::{
    CommitReport, EffectEvent, Element, FlushReport, Host, NodeId, OutputNode, Runtime,
    RuntimeConfig, RuntimeError, Value,
};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Default)]
struct HostLog {
    commits: Vec<CommitReport>,
    errors: Vec<RuntimeError>,
}

/// Host that keeps every report it receives. Clones share the same log.
#[derive(Clone, Default)]
pub struct RecordingHost {
    log: Rc<RefCell<HostLog>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commits(&self) -> Vec<CommitReport> {
        self.log.borrow().commits.clone()
    }

    pub fn commit_count(&self) -> usize {
        self.log.borrow().commits.len()
    }

    pub fn last_commit(&self) -> Option<CommitReport> {
        self.log.borrow().commits.last().cloned()
    }

    pub fn errors(&self) -> Vec<RuntimeError> {
        self.log.borrow().errors.clone()
    }

    /// Effect events of all recorded commits, in execution order.
    pub fn effect_events(&self) -> Vec<EffectEvent> {
        self.log
            .borrow()
            .commits
            .iter()
            .flat_map(|report| report.effects.iter().copied())
            .collect()
    }

    pub fn clear(&self) {
        let mut log = self.log.borrow_mut();
        log.commits.clear();
        log.errors.clear();
    }
}

impl Host for RecordingHost {
    fn on_commit(&mut self, report: &CommitReport) {
        self.log.borrow_mut().commits.push(report.clone());
    }

    fn on_error(&mut self, error: &RuntimeError) {
        self.log.borrow_mut().errors.push(error.clone());
    }
}

/// Ordered log that render functions and effects write into.
#[derive(Clone, Debug, Default)]
pub struct Probe(Rc<RefCell<Vec<String>>>);

impl Probe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    /// Return and clear the log.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.borrow_mut())
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.borrow().iter().filter(|e| *e == entry).count()
    }
}

/// Runtime wrapper with a recording host and panicking helpers.
pub struct TestRuntime {
    runtime: Runtime,
    host: RecordingHost,
}

impl TestRuntime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let host = RecordingHost::new();
        Self {
            runtime: Runtime::with_config(config, host.clone()),
            host,
        }
    }

    pub fn mount(&mut self, element: Element) -> NodeId {
        let name = element.name();
        self.runtime
            .mount(element)
            .unwrap_or_else(|err| panic!("mounting {} failed: {}", name, err))
    }

    pub fn flush(&mut self) -> FlushReport {
        self.runtime
            .flush()
            .unwrap_or_else(|err| panic!("flush failed: {}", err))
    }

    pub fn work(&mut self, budget: usize) -> FlushReport {
        self.runtime
            .work(budget)
            .unwrap_or_else(|err| panic!("work slice failed: {}", err))
    }

    /// Output node at `path`; the first segment selects a root by component
    /// name, the rest follows `OutputNode::at`.
    pub fn node(&self, path: &str) -> Option<OutputNode> {
        let forest = OutputNode {
            id: NodeId::INVALID,
            component: String::new(),
            key: None,
            value: Value::Null,
            children: self.runtime.outputs(),
        };
        forest.at(path).cloned()
    }

    /// Rendered value at `path`, `Null` when nothing is there.
    pub fn read(&self, path: &str) -> Value {
        self.node(path).map(|node| node.value).unwrap_or(Value::Null)
    }

    pub fn assert_value(&self, path: &str, expected: impl Into<Value>) {
        let expected = expected.into();
        let actual = self.read(path);
        assert_eq!(
            actual, expected,
            "Path '{}' expected {:?} but got {:?}",
            path, expected, actual
        );
    }

    pub fn assert_missing(&self, path: &str) {
        let node = self.node(path);
        assert!(node.is_none(), "Path '{}' expected nothing but got {:?}", path, node);
    }

    pub fn host(&self) -> &RecordingHost {
        &self.host
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut Runtime {
        &mut self.runtime
    }
}

impl Default for TestRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_take_clears() {
        let probe = Probe::new();
        probe.push("a");
        probe.push("a");
        assert_eq!(probe.count("a"), 2);
        assert_eq!(probe.take(), vec!["a", "a"]);
        assert!(probe.entries().is_empty());
    }

    #[test]
    fn recording_host_shares_log_between_clones() {
        let host = RecordingHost::new();
        let mut sink = host.clone();
        sink.on_error(&RuntimeError::UpdateLoop { commits: 3 });
        assert_eq!(host.errors().len(), 1);
        host.clear();
        assert!(host.errors().is_empty());
    }
}

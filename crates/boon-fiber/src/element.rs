//! Component definitions and the element descriptors render functions return.

use crate::address::{ComponentId, ContextId, ElementType, Key};
use crate::error::RuntimeError;
use crate::hooks::RenderCx;
use crate::value::Value;
use std::fmt;
use std::rc::Rc;

pub type RenderFn = dyn Fn(&mut RenderCx<'_>, &Value) -> Result<View, RuntimeError>;

/// Custom props comparator for memoized components. Returns `true` when the
/// props are equal and the render can be skipped.
pub type PropsCompare = dyn Fn(&Value, &Value) -> bool;

#[derive(Clone)]
pub enum MemoPolicy {
    Shallow,
    Custom(Rc<PropsCompare>),
}

/// A component type.
pub struct Component {
    id: ComponentId,
    name: &'static str,
    render: Rc<RenderFn>,
    memo: Option<MemoPolicy>,
}

impl Component {
    pub fn new(
        name: &'static str,
        render: impl Fn(&mut RenderCx<'_>, &Value) -> Result<View, RuntimeError> + 'static,
    ) -> Rc<Self> {
        Rc::new(Self {
            id: ComponentId::next(),
            name,
            render: Rc::new(render),
            memo: None,
        })
    }

    /// Memoized wrapper with shallow props comparison. The wrapper is a
    /// distinct component type sharing this render function.
    pub fn memo(self: &Rc<Self>) -> Rc<Self> {
        self.with_memo(MemoPolicy::Shallow)
    }

    pub fn memo_with(self: &Rc<Self>, compare: impl Fn(&Value, &Value) -> bool + 'static) -> Rc<Self> {
        self.with_memo(MemoPolicy::Custom(Rc::new(compare)))
    }

    fn with_memo(self: &Rc<Self>, policy: MemoPolicy) -> Rc<Self> {
        Rc::new(Self {
            id: ComponentId::next(),
            name: self.name,
            render: self.render.clone(),
            memo: Some(policy),
        })
    }

    pub fn element(self: &Rc<Self>, props: impl Into<Value>) -> Element {
        Element {
            kind: ElementKind::Component(self.clone()),
            key: None,
            props: props.into(),
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn memo_policy(&self) -> Option<&MemoPolicy> {
        self.memo.as_ref()
    }

    pub(crate) fn render(
        &self,
        cx: &mut RenderCx<'_>,
        props: &Value,
    ) -> Result<View, RuntimeError> {
        (self.render)(cx, props)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("memo", &self.memo.is_some())
            .finish()
    }
}

/// Context identity plus the value read when no provider is active.
#[derive(Clone, Debug)]
pub struct Context {
    id: ContextId,
    name: &'static str,
    default: Value,
}

impl Context {
    pub fn new(name: &'static str, default: impl Into<Value>) -> Self {
        Self {
            id: ContextId::next(),
            name,
            default: default.into(),
        }
    }

    /// Provider element making `value` visible to `children` and their descendants.
    pub fn provide(&self, value: impl Into<Value>, children: impl IntoIterator<Item = Element>) -> Element {
        Element {
            kind: ElementKind::Provider(self.clone()),
            key: None,
            props: value.into(),
            children: children.into_iter().collect(),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }
}

#[derive(Clone, Debug)]
pub enum ElementKind {
    Component(Rc<Component>),
    Provider(Context),
}

impl ElementKind {
    pub fn element_type(&self) -> ElementType {
        match self {
            ElementKind::Component(component) => ElementType::Component(component.id()),
            ElementKind::Provider(context) => ElementType::Provider(context.id()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ElementKind::Component(component) => component.name(),
            ElementKind::Provider(context) => context.name(),
        }
    }
}

/// Descriptor of one child: what to instantiate, with which props, under
/// which key. Provider elements also carry their children.
#[derive(Clone, Debug)]
pub struct Element {
    pub(crate) kind: ElementKind,
    pub(crate) key: Option<Key>,
    pub(crate) props: Value,
    pub(crate) children: Vec<Element>,
}

impl Element {
    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub fn props(&self) -> &Value {
        &self.props
    }

    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn element_type(&self) -> ElementType {
        self.kind.element_type()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

/// What a render function returns: the node's own rendered value and the
/// child descriptors to reconcile.
#[derive(Clone, Debug, Default)]
pub struct View {
    pub value: Value,
    pub children: Vec<Element>,
}

impl View {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            children: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }
}

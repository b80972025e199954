// Environment for variable bindings and scope management

use crate::runtime::error::{EvalError, EvalResult};
use crate::runtime::values::{Closure, ExternalResult, Symbol, Value, ValueList};
use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

/// One frame in a chain of lexical scopes.
///
/// Cloning an `Environment` shares the frame: closures capture their
/// defining environment this way, and `set!` through any clone is visible
/// through all of them.
#[derive(Clone)]
pub struct Environment {
    frame: Rc<RefCell<Frame>>,
}

struct Frame {
    bindings: HashMap<Symbol, Value>,
    parent: Option<Environment>,
}

/// Non-owning handle to a frame.
#[derive(Clone)]
pub struct WeakEnvironment {
    frame: Weak<RefCell<Frame>>,
}

impl WeakEnvironment {
    pub fn upgrade(&self) -> Option<Environment> {
        self.frame.upgrade().map(|frame| Environment { frame })
    }
}

impl fmt::Debug for WeakEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakEnvironment(alive: {})", self.frame.strong_count() > 0)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// Create a new root environment
    pub fn new() -> Self {
        Self::with_parent(None)
    }

    fn with_parent(parent: Option<Environment>) -> Self {
        Environment {
            frame: Rc::new(RefCell::new(Frame {
                bindings: HashMap::new(),
                parent,
            })),
        }
    }

    /// Create a new frame parented to this one
    pub fn child(&self) -> Environment {
        Self::with_parent(Some(self.clone()))
    }

    pub fn parent(&self) -> Option<Environment> {
        self.frame.borrow().parent.clone()
    }

    /// Bind `symbol` in this frame, shadowing any outer binding.
    pub fn define(&self, symbol: Symbol, value: Value) {
        self.frame.borrow_mut().bindings.insert(symbol, value);
    }

    /// Look up a symbol in this frame or its ancestors.
    pub fn lookup(&self, symbol: &Symbol) -> EvalResult<Value> {
        self.try_lookup(symbol)
            .ok_or_else(|| EvalError::unbound(symbol))
    }

    pub fn try_lookup(&self, symbol: &Symbol) -> Option<Value> {
        let mut current = self.clone();
        loop {
            let parent = {
                let frame = current.frame.borrow();
                if let Some(value) = frame.bindings.get(symbol) {
                    return Some(value.clone());
                }
                frame.parent.clone()
            };
            current = parent?;
        }
    }

    /// Overwrite the binding in the nearest frame that defines `symbol`.
    pub fn set(&self, symbol: &Symbol, value: Value) -> EvalResult<()> {
        let frame = self
            .defining_frame(symbol)
            .ok_or_else(|| EvalError::unbound(symbol))?;
        frame.define(symbol.clone(), value);
        Ok(())
    }

    /// The nearest frame in the chain that binds `symbol`.
    pub fn defining_frame(&self, symbol: &Symbol) -> Option<Environment> {
        let mut current = self.clone();
        loop {
            let parent = {
                let frame = current.frame.borrow();
                if frame.bindings.contains_key(symbol) {
                    drop(frame);
                    return Some(current);
                }
                frame.parent.clone()
            };
            current = parent?;
        }
    }

    /// Check if a symbol is bound in this frame (not parent frames)
    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.frame.borrow().bindings.contains_key(symbol)
    }

    /// Names bound in this frame, sorted.
    pub fn symbol_names(&self) -> Vec<Symbol> {
        let mut names: Vec<Symbol> = self.frame.borrow().bindings.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.frame, &other.frame)
    }

    pub fn downgrade(&self) -> WeakEnvironment {
        WeakEnvironment {
            frame: Rc::downgrade(&self.frame),
        }
    }

    /// Drop every binding in this frame.
    pub fn clear(&self) {
        // Move the bindings out first: dropping them may drop closures whose
        // environments point back at this frame.
        let bindings = std::mem::take(&mut self.frame.borrow_mut().bindings);
        drop(bindings);
    }

    pub(crate) fn frame_id(&self) -> usize {
        Rc::as_ptr(&self.frame) as *const () as usize
    }

    /// Whether storing `value` in this frame would make the frame reachable
    /// from itself, through closure environments, binding values or parent
    /// links.
    pub fn reachable_from(&self, value: &Value) -> bool {
        let target = self.frame_id();
        let mut visited: HashSet<usize> = HashSet::new();
        let mut values: Vec<Value> = vec![value.clone()];
        let mut frames: Vec<Environment> = Vec::new();

        loop {
            if let Some(value) = values.pop() {
                match value {
                    Value::Closure(closure) => frames.push(closure.env.clone()),
                    Value::List(items) => values.extend(items.iter().cloned()),
                    Value::ExternalResult(result) => values.push(result.payload.clone()),
                    _ => {}
                }
                continue;
            }
            let Some(env) = frames.pop() else {
                return false;
            };
            let id = env.frame_id();
            if id == target {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            let frame = env.frame.borrow();
            values.extend(frame.bindings.values().cloned());
            if let Some(parent) = &frame.parent {
                frames.push(parent.clone());
            }
        }
    }
}

/// A shared allocation the cycle collector walks. The collector holds
/// exactly one handle to each node it has seen.
enum Node {
    Frame(Environment),
    Closure(Rc<Closure>),
    List(Rc<ValueList>),
    Result(Rc<ExternalResult>),
}

impl Node {
    fn of(value: &Value) -> Option<Node> {
        match value {
            Value::Closure(closure) => Some(Node::Closure(closure.clone())),
            Value::List(items) => Some(Node::List(items.clone())),
            Value::ExternalResult(result) => Some(Node::Result(result.clone())),
            _ => None,
        }
    }

    fn id(&self) -> usize {
        match self {
            Node::Frame(env) => env.frame_id(),
            Node::Closure(closure) => Rc::as_ptr(closure) as *const () as usize,
            Node::List(items) => Rc::as_ptr(items) as *const () as usize,
            Node::Result(result) => Rc::as_ptr(result) as *const () as usize,
        }
    }

    fn strong_count(&self) -> usize {
        match self {
            Node::Frame(env) => Rc::strong_count(&env.frame),
            Node::Closure(closure) => Rc::strong_count(closure),
            Node::List(items) => Rc::strong_count(items),
            Node::Result(result) => Rc::strong_count(result),
        }
    }

    /// Outgoing references. Closure bodies are skipped: they are source
    /// forms and never lead back to a frame.
    fn edges(&self) -> Vec<Node> {
        match self {
            Node::Frame(env) => {
                let frame = env.frame.borrow();
                let mut out: Vec<Node> = frame.bindings.values().filter_map(Node::of).collect();
                if let Some(parent) = &frame.parent {
                    out.push(Node::Frame(parent.clone()));
                }
                out
            }
            Node::Closure(closure) => vec![Node::Frame(closure.env.clone())],
            Node::List(items) => items.iter().filter_map(Node::of).collect(),
            Node::Result(result) => Node::of(&result.payload).into_iter().collect(),
        }
    }
}

/// Clear every frame in the graph below `candidates` that nothing outside
/// that graph holds, and return how many were cleared.
///
/// A node whose strong count exceeds the references found inside the graph
/// has an owner elsewhere (a caller's value, a runtime's globals, the Rust
/// stack of an evaluation in progress). Such nodes and everything they
/// reach stay intact. The rest are only kept alive by cycles; clearing
/// their frames' bindings breaks every such cycle, since each one passes
/// through a binding.
pub(crate) fn clear_unreachable_frames(candidates: Vec<Environment>) -> usize {
    let mut nodes: HashMap<usize, Node> = HashMap::new();
    let mut edges: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut internal: HashMap<usize, usize> = HashMap::new();
    let mut pending: Vec<usize> = Vec::new();

    for env in candidates {
        if let Entry::Vacant(slot) = nodes.entry(env.frame_id()) {
            pending.push(*slot.key());
            slot.insert(Node::Frame(env));
        }
    }
    while let Some(id) = pending.pop() {
        let children = match nodes.get(&id) {
            Some(node) => node.edges(),
            None => continue,
        };
        let mut targets = Vec::with_capacity(children.len());
        for child in children {
            let child_id = child.id();
            *internal.entry(child_id).or_default() += 1;
            targets.push(child_id);
            if let Entry::Vacant(slot) = nodes.entry(child_id) {
                pending.push(child_id);
                slot.insert(child);
            }
        }
        edges.insert(id, targets);
    }

    let mut live: HashSet<usize> = HashSet::new();
    let mut pending: Vec<usize> = nodes
        .iter()
        .filter(|(id, node)| node.strong_count() > 1 + internal.get(*id).copied().unwrap_or(0))
        .map(|(id, _)| *id)
        .collect();
    while let Some(id) = pending.pop() {
        if live.insert(id) {
            if let Some(targets) = edges.get(&id) {
                pending.extend(targets.iter().copied());
            }
        }
    }

    let garbage: Vec<Environment> = nodes
        .into_iter()
        .filter_map(|(id, node)| match node {
            Node::Frame(env) if !live.contains(&id) => Some(env),
            _ => None,
        })
        .collect();
    for env in &garbage {
        env.clear();
    }
    garbage.len()
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Bindings may hold closures over this frame; print names only.
        let frame = self.frame.borrow();
        let mut names: Vec<&str> = frame.bindings.keys().map(Symbol::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("has_parent", &frame.parent.is_some())
            .finish()
    }
}

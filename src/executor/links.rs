//! Function ↔ scope association table
//!
//! Keyed by engine-assigned [`FunctionId`]s. Entries hold the closure weakly
//! and the defining scope strongly. Each engine owns its own table.
//!
//! A closure stored in its own defining scope forms a cycle through the
//! table. [`LinkTable::prune`] finds such cycles by trial deletion: every
//! strong reference not accounted for by the graph behind the table marks a
//! root, and whatever the roots cannot reach is unlinked and its scopes
//! cleared.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use super::scope::Scope;
use super::types::{Closure, FunctionId, FunctionRef, NodeId, ObjectRef, Value};

struct Association {
    closure: Weak<Closure>,
    scope: Rc<Scope>,
    record: NodeId,
}

pub struct LinkTable {
    entries: RefCell<HashMap<FunctionId, Association>>,
}

impl LinkTable {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            entries: RefCell::new(HashMap::new()),
        })
    }

    /// Associate `closure` with its defining scope. At most once per closure.
    pub fn associate(&self, closure: &FunctionRef, scope: &Rc<Scope>) -> bool {
        let mut entries = self.entries.borrow_mut();
        if entries.contains_key(&closure.id) {
            return false;
        }
        entries.insert(
            closure.id,
            Association {
                closure: Rc::downgrade(closure),
                scope: scope.clone(),
                record: closure.node.id,
            },
        );
        true
    }

    pub fn scope_of(&self, id: FunctionId) -> Option<Rc<Scope>> {
        self.entries.borrow().get(&id).map(|a| a.scope.clone())
    }

    pub fn record_of(&self, id: FunctionId) -> Option<NodeId> {
        self.entries.borrow().get(&id).map(|a| a.record)
    }

    /// Drop associations whose closure is gone or reachable only through
    /// the table itself. Returns how many were dropped.
    pub fn prune(&self) -> usize {
        let mut graph = Graph::default();
        let mut defining = HashMap::new();
        for association in self.entries.borrow().values() {
            let scope = graph.scope(&association.scope);
            graph.edge(None, scope);
            if let Some(closure) = association.closure.upgrade() {
                defining.insert(graph.closure(&closure), scope);
            }
        }
        graph.expand();
        let reached = graph.reachable(&defining);

        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|_, a| {
            a.closure
                .upgrade()
                .map(|closure| reached.contains(&Node::Closure(Rc::as_ptr(&closure) as usize)))
                .unwrap_or(false)
        });
        let removed = before - entries.len();
        drop(entries);

        for (key, scope) in &graph.scopes {
            if !reached.contains(&Node::Scope(*key)) {
                scope.clear_bindings();
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/* ===================== Reachability ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Node {
    Scope(usize),
    Closure(usize),
    Object(usize),
}

/// The values kept alive behind the table, one handle per node
#[derive(Default)]
struct Graph {
    scopes: HashMap<usize, Rc<Scope>>,
    closures: HashMap<usize, FunctionRef>,
    objects: HashMap<usize, ObjectRef>,
    /// Strong references held by graph nodes or by the table
    internal: HashMap<Node, usize>,
    children: HashMap<Node, Vec<Node>>,
    unexpanded: Vec<Node>,
}

impl Graph {
    fn scope(&mut self, scope: &Rc<Scope>) -> Node {
        let key = Rc::as_ptr(scope) as usize;
        if !self.scopes.contains_key(&key) {
            self.scopes.insert(key, scope.clone());
            self.unexpanded.push(Node::Scope(key));
        }
        Node::Scope(key)
    }

    fn closure(&mut self, closure: &FunctionRef) -> Node {
        let key = Rc::as_ptr(closure) as usize;
        if !self.closures.contains_key(&key) {
            self.closures.insert(key, closure.clone());
            self.unexpanded.push(Node::Closure(key));
        }
        Node::Closure(key)
    }

    fn object(&mut self, object: &ObjectRef) -> Node {
        let key = object.addr();
        if !self.objects.contains_key(&key) {
            self.objects.insert(key, object.clone());
            self.unexpanded.push(Node::Object(key));
        }
        Node::Object(key)
    }

    /// Natives and pending values are not followed; whatever they hold
    /// counts as externally referenced
    fn value(&mut self, value: &Value) -> Option<Node> {
        match value {
            Value::Function(closure) => Some(self.closure(closure)),
            Value::Object(object) => Some(self.object(object)),
            _ => None,
        }
    }

    /// One strong reference to `to`, held by `from` or by the table
    fn edge(&mut self, from: Option<Node>, to: Node) {
        *self.internal.entry(to).or_default() += 1;
        if let Some(from) = from {
            self.children.entry(from).or_default().push(to);
        }
    }

    fn expand(&mut self) {
        while let Some(node) = self.unexpanded.pop() {
            let held = match node {
                Node::Scope(key) => {
                    let Some(scope) = self.scopes.get(&key).cloned() else {
                        continue;
                    };
                    if let Some(parent) = scope.parent() {
                        let to = self.scope(parent);
                        self.edge(Some(node), to);
                    }
                    scope.held_values()
                }
                Node::Closure(key) => {
                    let Some(closure) = self.closures.get(&key).cloned() else {
                        continue;
                    };
                    vec![Value::Object(closure.object.clone())]
                }
                Node::Object(key) => match self.objects.get(&key) {
                    Some(object) => object.held_values(),
                    None => continue,
                },
            };
            for value in &held {
                if let Some(to) = self.value(value) {
                    self.edge(Some(node), to);
                }
            }
        }
    }

    /// Referenced from outside the graph. Must run with no handles alive
    /// besides the graph's own.
    fn is_root(&self, node: Node) -> bool {
        let strong = match node {
            Node::Scope(key) => self.scopes.get(&key).map(Rc::strong_count),
            Node::Closure(key) => self.closures.get(&key).map(Rc::strong_count),
            Node::Object(key) => self.objects.get(&key).map(ObjectRef::strong_count),
        };
        let internal = self.internal.get(&node).copied().unwrap_or(0);
        match strong {
            Some(strong) => strong.checked_sub(1 + internal).map_or(true, |n| n > 0),
            None => true,
        }
    }

    /// Every node reachable from a root. A live closure keeps its defining
    /// scope alive.
    fn reachable(&self, defining: &HashMap<Node, Node>) -> HashSet<Node> {
        let nodes = self
            .scopes
            .keys()
            .map(|&k| Node::Scope(k))
            .chain(self.closures.keys().map(|&k| Node::Closure(k)))
            .chain(self.objects.keys().map(|&k| Node::Object(k)));
        let mut work: Vec<Node> = nodes.filter(|&n| self.is_root(n)).collect();

        let mut reached = HashSet::new();
        while let Some(node) = work.pop() {
            if !reached.insert(node) {
                continue;
            }
            if let Some(children) = self.children.get(&node) {
                work.extend(children.iter().copied());
            }
            if let Some(&scope) = defining.get(&node) {
                work.push(scope);
            }
        }
        reached
    }
}

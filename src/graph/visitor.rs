//! Depth first and breadth first traversal over anything that can report what
//! it depends on.
//!
//! Both nodes and pads are visitable through [`DependencySource`], so the same
//! traversals compute evaluation order for nodes and dependency order for pads.
//! Traversal state lives in a table allocated per [`Traversal`] and is dropped
//! with it; nothing is stored on the graph itself.

use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;

/// Something that can list the direct dependencies of an item.
pub trait DependencySource<V> {
    /// The items `item` depends on, in a stable order. An item that is
    /// connected twice to the same dependency lists it twice.
    fn depends_on(&self, item: V) -> Vec<V>;
}

/// Receives items in traversal order.
pub trait Visitor<V> {
    fn visit(&mut self, item: V);
}

impl<V, F: FnMut(V)> Visitor<V> for F {
    fn visit(&mut self, item: V) {
        self(item);
    }
}

/// Collects every visited item in the order it was visited.
#[derive(Debug, Clone)]
pub struct ListVisitor<V> {
    visits: Vec<V>,
}

impl<V> Default for ListVisitor<V> {
    fn default() -> Self {
        Self { visits: Vec::new() }
    }
}

impl<V> ListVisitor<V> {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn visits(&self) -> &[V] {
        &self.visits
    }
    pub fn into_visits(self) -> Vec<V> {
        self.visits
    }
}

impl<V> Visitor<V> for ListVisitor<V> {
    fn visit(&mut self, item: V) {
        self.visits.push(item);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct VisitInfo {
    visited: bool,
    discovered: bool,
    shared_count: usize,
}

/// Per call traversal state over a [`DependencySource`].
pub struct Traversal<'a, V, G: ?Sized> {
    graph: &'a G,
    info: HashMap<V, VisitInfo>,
}

impl<'a, V, G> Traversal<'a, V, G>
where
    V: Copy + Eq + Hash + Debug,
    G: DependencySource<V> + ?Sized,
{
    pub fn new(graph: &'a G) -> Self {
        Self {
            graph,
            info: HashMap::new(),
        }
    }

    fn insert(&mut self, item: V) {
        if self.info.contains_key(&item) {
            log::warn!("Visitable {item:?} was registered twice in the same traversal");
        } else {
            self.info.insert(item, VisitInfo::default());
        }
    }

    fn info_mut(&mut self, item: V) -> &mut VisitInfo {
        debug_assert!(
            self.info.contains_key(&item),
            "Visitable {item:?} was reached without being registered by init"
        );
        self.info.entry(item).or_default()
    }

    /// Number of distinct items registered so far.
    pub fn num_registered(&self) -> usize {
        self.info.len()
    }

    /// Whether `item` has been visited by this traversal.
    pub fn is_visited(&self, item: V) -> bool {
        self.info.get(&item).map_or(false, |i| i.visited)
    }

    /// Register every item reachable from `root`.
    pub fn init_dfs(&mut self, root: V) {
        self.insert(root);
        let mut stack = vec![root];
        while let Some(item) = stack.pop() {
            for dependency in self.graph.depends_on(item) {
                if !self.info.contains_key(&dependency) {
                    self.insert(dependency);
                    stack.push(dependency);
                }
            }
        }
    }

    /// Visit every item reachable from `root`, each after all of its
    /// dependencies. Items on the current path are marked discovered so a
    /// cycle is cut instead of followed.
    pub fn dfs_traverse(&mut self, root: V, visitor: &mut impl Visitor<V>) {
        if self.info_mut(root).visited {
            return;
        }
        self.info_mut(root).discovered = true;
        let mut stack = vec![(root, self.graph.depends_on(root), 0usize)];
        while let Some((item, dependencies, next)) = stack.last_mut() {
            if let Some(&dependency) = dependencies.get(*next) {
                *next += 1;
                let info = self.info_mut(dependency);
                if !info.visited && !info.discovered {
                    info.discovered = true;
                    let deps = self.graph.depends_on(dependency);
                    stack.push((dependency, deps, 0));
                }
            } else {
                let item = *item;
                stack.pop();
                visitor.visit(item);
                self.info_mut(item).visited = true;
            }
        }
    }

    /// Register every item reachable from `root` and count, for each, the
    /// number of dependency edges pointing at it from reachable items.
    pub fn init_bfs(&mut self, root: V) {
        self.insert(root);
        let mut stack = vec![root];
        while let Some(item) = stack.pop() {
            for dependency in self.graph.depends_on(item) {
                if !self.info.contains_key(&dependency) {
                    self.insert(dependency);
                    stack.push(dependency);
                }
                self.info_mut(dependency).shared_count += 1;
            }
        }
    }

    /// Visit `root` and then everything it depends on, breadth first. An item
    /// is only queued once every item depending on it has been visited, so
    /// dependents always come before their dependencies.
    pub fn bfs_traverse(&mut self, root: V, visitor: &mut impl Visitor<V>) {
        let mut queue = VecDeque::new();
        self.info_mut(root).discovered = true;
        queue.push_back(root);
        while let Some(item) = queue.pop_front() {
            for dependency in self.graph.depends_on(item) {
                let info = self.info_mut(dependency);
                info.shared_count = info.shared_count.saturating_sub(1);
                if info.shared_count == 0 && !info.discovered {
                    info.discovered = true;
                    queue.push_back(dependency);
                }
            }
            visitor.visit(item);
            self.info_mut(item).visited = true;
        }
    }
}

/// Every item reachable from `root`, dependencies first, `root` last.
pub fn dfs_path<V, G>(graph: &G, root: V) -> Vec<V>
where
    V: Copy + Eq + Hash + Debug,
    G: DependencySource<V> + ?Sized,
{
    let mut traversal = Traversal::new(graph);
    let mut visitor = ListVisitor::new();
    traversal.init_dfs(root);
    traversal.dfs_traverse(root, &mut visitor);
    visitor.into_visits()
}

/// Every item reachable from `root`, `root` first, each item before its
/// dependencies.
pub fn bfs_path<V, G>(graph: &G, root: V) -> Vec<V>
where
    V: Copy + Eq + Hash + Debug,
    G: DependencySource<V> + ?Sized,
{
    let mut traversal = Traversal::new(graph);
    let mut visitor = ListVisitor::new();
    traversal.init_bfs(root);
    traversal.bfs_traverse(root, &mut visitor);
    visitor.into_visits()
}

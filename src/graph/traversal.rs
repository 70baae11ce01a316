//! One evaluation pass over the subgraph a node depends on.
//!
//! A pass runs in three steps, each a walk over a precomputed order:
//! 1. [`GraphTraversal::prepare`], producers first: let operations prepare and
//!    compute bounding boxes.
//! 2. [`GraphTraversal::prepare_request`], consumers first: propagate the
//!    requested rectangle to producers, widening it where operations need
//!    margins and narrowing it where caches already hold the answer.
//! 3. [`GraphTraversal::process`], producers first: run each operation on its
//!    result rectangle and hand the output to its consumers.
//!
//! Node contexts exist only during step 3, one at a time.

use std::collections::HashMap;

use super::context::NodeContext;
use super::node::ProxyRole;
use super::visitor::{bfs_path, dfs_path};
use super::{Graph, NodeKey};
use crate::buffer::Buffer;
use crate::operation::ProcessError;
use crate::rect::Rect;

/// Where a node is in the evaluation of the current pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EvalState {
    Unvisited,
    DependenciesResolved,
    ContextCreated,
    Processed,
    ResultReady,
    ContextDestroyed,
}

#[derive(Clone, Debug, Default)]
struct Request {
    need: Rect,
    result: Rect,
    /// The cache level that already holds `need`
    cached: Option<u32>,
    input_requests: HashMap<String, Rect>,
}

pub struct GraphTraversal {
    root: NodeKey,
    dfs_path: Vec<NodeKey>,
    bfs_path: Vec<NodeKey>,
    requests: HashMap<NodeKey, Request>,
    /// Producer outputs waiting for their consumer's context, by pad name
    pending: HashMap<NodeKey, Vec<(String, Buffer)>>,
    states: HashMap<NodeKey, EvalState>,
    /// Handed to operations whose `input` is unconnected
    empty: Buffer,
}

impl GraphTraversal {
    /// Compute evaluation orders for everything `root` depends on.
    pub fn build(graph: &Graph, root: NodeKey) -> Self {
        let dfs_path = dfs_path(graph, root);
        let bfs_path = bfs_path(graph, root);
        let states = dfs_path
            .iter()
            .map(|node| (*node, EvalState::DependenciesResolved))
            .collect();
        Self {
            root,
            dfs_path,
            bfs_path,
            requests: HashMap::new(),
            pending: HashMap::new(),
            states,
            empty: Buffer::empty(),
        }
    }
    pub fn root(&self) -> NodeKey {
        self.root
    }
    /// Producers before consumers, `root` last.
    pub fn dfs_path(&self) -> &[NodeKey] {
        &self.dfs_path
    }
    /// Consumers before producers, `root` first.
    pub fn bfs_path(&self) -> &[NodeKey] {
        &self.bfs_path
    }
    pub fn state(&self, node: NodeKey) -> EvalState {
        self.states
            .get(&node)
            .copied()
            .unwrap_or(EvalState::Unvisited)
    }
    /// The region consumers asked of `node` in the last request.
    pub fn need_rect(&self, node: NodeKey) -> Option<Rect> {
        self.requests.get(&node).map(|r| r.need)
    }
    /// The region `node` will compute for the last request.
    pub fn result_rect(&self, node: NodeKey) -> Option<Rect> {
        self.requests.get(&node).map(|r| r.result)
    }

    fn set_state(&mut self, node: NodeKey, state: EvalState) {
        log::trace!("{node:?}: {state:?}");
        self.states.insert(node, state);
    }

    /// Run `prepare` on every operation and refresh bounding boxes, producers
    /// first.
    pub fn prepare(&mut self, graph: &mut Graph) {
        for &node in &self.dfs_path {
            let Some(n) = graph.nodes.get_mut(node) else {
                continue;
            };
            if let Some(op) = n.operation.as_mut() {
                op.prepare();
            }
            let geometry = graph.geometry_context(node);
            let have = graph.compute_bounding_box(node, &geometry);
            let n = &mut graph.nodes[node];
            n.have_rect = have;
            n.valid_have_rect = true;
            if let Some(cache) = n.cache.as_mut() {
                cache.set_extent(have);
            }
            let container = match n.proxy {
                Some(ProxyRole::Output(_)) => n.parent,
                _ => None,
            };
            if let Some(parent) = container.and_then(|p| graph.nodes.get_mut(p)) {
                parent.have_rect = have;
                parent.valid_have_rect = true;
            }
        }
    }

    /// Work out what every node must compute for `roi` of the root at
    /// `level`.
    pub fn prepare_request(&mut self, graph: &mut Graph, roi: &Rect, level: u32) {
        self.requests.clear();
        self.pending.clear();
        let root_have = graph.nodes[self.root].have_rect;
        self.requests.insert(
            self.root,
            Request {
                need: root_have.intersect(roi),
                ..Request::default()
            },
        );
        for &node in &self.bfs_path {
            let need = self.requests.entry(node).or_default().need;
            if need.is_empty() {
                continue;
            }
            let n = &graph.nodes[node];
            let cached = n.cache.as_ref().and_then(|c| c.valid_level(&need, level));
            let geometry = graph.geometry_context(node);
            let result = match cached {
                Some(_) => need,
                None => need.bounding_box(
                    &graph
                        .cached_region_for(node, &need, &geometry)
                        .intersect(&n.have_rect),
                ),
            };
            let mut input_requests = HashMap::new();
            if cached.is_none() {
                for pad in graph.own_input_pads(node) {
                    let Some(source_pad) = graph.get_connected_to(pad) else {
                        continue;
                    };
                    let name = graph.pads[pad].name.clone();
                    let source = graph.pads[source_pad].node;
                    let rect = graph.required_for_output(node, &name, &result, &geometry);
                    let source_have = graph.nodes[source].have_rect;
                    let s = self.requests.entry(source).or_default();
                    s.need = s.need.bounding_box(&rect).intersect(&source_have);
                    input_requests.insert(name, rect);
                }
            } else {
                log::trace!("{} served from cache for {need}", n.debug_name());
            }
            let request = self.requests.entry(node).or_default();
            request.result = result;
            request.cached = cached;
            request.input_requests = input_requests;
        }
    }

    /// Evaluate every node on its result rectangle and return the root's
    /// output.
    pub fn process(&mut self, graph: &mut Graph, level: u32) -> Result<Buffer, ProcessError> {
        let mut root_output = None;
        let path = self.dfs_path.clone();
        for node in path {
            let request = self.requests.remove(&node).unwrap_or_default();
            let mut context = NodeContext::new(node, graph.tile_size);
            self.set_state(node, EvalState::ContextCreated);
            context.need_rect = request.need;
            context.result_rect = request.result;
            context.level = level;
            context.cached = request.cached.is_some();
            context.input_requests = request.input_requests;
            for (pad, buffer) in self.pending.remove(&node).unwrap_or_default() {
                context.set_object(&pad, buffer);
            }

            let output = if request.need.is_empty() {
                self.empty.clone()
            } else if let Some(valid) = request.cached {
                graph.nodes[node]
                    .cache
                    .as_mut()
                    .map_or_else(Buffer::empty, |c| c.buffer(valid).sub_buffer(&request.need))
            } else {
                match self.run(graph, node, &mut context, level) {
                    Ok(output) => output,
                    Err(e) => {
                        log::error!("{} failed: {e}", graph.nodes[node].debug_name());
                        self.set_state(node, EvalState::ContextDestroyed);
                        return Err(e);
                    }
                }
            };
            if context.output("output").is_none() {
                context.set_object("output", output.clone());
            }
            self.set_state(node, EvalState::Processed);

            for pad in graph.own_output_pads(node) {
                let pad_output = context
                    .output(&graph.pads[pad].name)
                    .unwrap_or_else(|| self.empty.clone());
                for c in &graph.pads[pad].connections {
                    let Some(c) = graph.connections.get(*c) else {
                        continue;
                    };
                    if !self.states.contains_key(&c.sink) {
                        continue;
                    }
                    let sink_pad = graph.pads[c.sink_pad].name.clone();
                    self.pending
                        .entry(c.sink)
                        .or_default()
                        .push((sink_pad, pad_output.clone()));
                }
            }
            self.set_state(node, EvalState::ResultReady);
            if node == self.root {
                root_output = Some(output);
            }
            context.purge();
            self.set_state(node, EvalState::ContextDestroyed);
        }
        Ok(root_output.unwrap_or_else(Buffer::empty))
    }

    fn run(
        &self,
        graph: &mut Graph,
        node: NodeKey,
        context: &mut NodeContext,
        level: u32,
    ) -> Result<Buffer, ProcessError> {
        let n = &graph.nodes[node];
        let caching = !n.dont_cache
            && !n.passthrough
            && n.operation.as_ref().map_or(false, |op| !op.no_cache());
        if caching {
            context.cache = Some(graph.ensure_cache(node).buffer(level));
        }
        let result = context.result_rect;
        let n = &mut graph.nodes[node];
        if n.passthrough {
            let input = context
                .get_source("input")
                .unwrap_or_else(|| self.empty.clone());
            context.set_object("output", input.clone());
            return Ok(input);
        }
        let Some(op) = n.operation.as_mut() else {
            return Ok(Buffer::empty());
        };
        if context.get_object("input").is_none() {
            context.set_object("input", self.empty.clone());
        }
        op.process(context, "output", &result, level)?;
        let output = context.output("output").unwrap_or_else(Buffer::empty);
        if let Some(cache) = context.cache.as_ref() {
            if output.shares_storage(cache) {
                if let Some(c) = graph.nodes[node].cache.as_mut() {
                    c.computed(&result, level);
                }
            }
        }
        Ok(output)
    }
}

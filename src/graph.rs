//! # Graph
//!
//! The [`Graph`] is an arena owning every node, pad and connection. Nodes are
//! referred to by [`NodeKey`], which stays valid until the node is freed.
//! Subgraph containment is expressed with parent and child handles inside the
//! same arena, so a node nested in a container is still just a key.
//!
//! Evaluation is demand driven: [`Graph::blit`] or [`Graph::apply`] asks a
//! node for a rectangle, the request is propagated to producers through
//! [`Operation::get_required_for_output`], and the operations run producers
//! first, leaving their results in node caches for later requests.
//!
//! # Manipulating the [`Graph`]
//! - [`Graph::push`] binds an [`Operation`] to a new node and returns its key.
//! - [`Graph::connect`]/[`Graph::link`] connect an output pad to an input pad.
//!   Connecting an input pad that already has a producer replaces it.
//! - [`Graph::set_property`] changes an operation property and invalidates
//!   every cached result that depended on it.
//!
//! # Example
//! ```
//! use pixgraph::prelude::*;
//! let mut graph = Graph::new(GraphSettings::default());
//! let color = graph.push(ColorSource::new(Color::rgb(1.0, 0.0, 1.0)));
//! let crop = graph.push(Crop::new(Rect::new(0, 0, 4, 4)));
//! graph.link(color, crop)?;
//! let mut pixel = [0u8; 4];
//! graph.blit(crop, 1.0, &Rect::new(0, 0, 1, 1), PixelFormat::RgbaU8, &mut pixel, BlitFlags::DEFAULT)?;
//! assert_eq!(pixel, [255, 0, 255, 255]);
//! # Ok::<(), pixgraph::PixgraphError>(())
//! ```

use std::collections::{HashMap, HashSet};
use std::ops::BitOr;

use slotmap::{new_key_type, SlotMap};

use crate::buffer::{Buffer, PixelFormat};
use crate::inspection::{EdgeInspection, GraphInspection, NodeInspection, PadInspection};
use crate::operation::{Detect, GeometryContext, Operation, OperationKind, ProcessError};
use crate::rect::{Rect, Region};
use crate::resources::{Resources, ResourcesSettings};
use crate::value::{PropertyError, PropertySpec, Value};

pub mod connection;
mod context;
mod node;
pub mod pad;
mod subgraph;
pub mod traversal;
pub mod visitor;
#[cfg(test)]
mod tests;

pub use connection::{Connection, ConnectionError, ConnectionKey};
pub use context::NodeContext;
pub use node::NodeCache;
use node::{Node, ProxyRole};
pub use pad::{Pad, PadKey};
pub use subgraph::SubgraphBuilder;
use traversal::GraphTraversal;
use visitor::DependencySource;

new_key_type! {
    /// Handle to a node in a [`Graph`].
    pub struct NodeKey;
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum FreeError {
    #[error("The node does not exist. The Node may have been freed already.")]
    NodeNotFound,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum GraphError {
    #[error("The node does not exist. The Node may have been freed already.")]
    NodeNotFound,
    #[error("The node is already a child of another node.")]
    AlreadyHasParent,
    #[error("The node is not a child of the given parent.")]
    NotAChild,
    #[error("There is no operation named `{0}` in the registry.")]
    UnknownOperation(String),
    #[error("There was an error connecting nodes: {0}")]
    Connection(#[from] ConnectionError),
    #[error("There was an error setting a property: {0}")]
    Property(#[from] PropertyError),
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize, serde::Deserialize))]
pub struct GraphSettings {
    pub name: String,
    /// Number of nodes to reserve room for.
    pub num_nodes: usize,
    /// Tile edge of new buffers and caches.
    pub tile_size: u32,
    /// Evaluate scaled down blits at a coarser mipmap level instead of at full
    /// resolution.
    pub mipmap_rendering: bool,
    /// The coarsest mipmap level used.
    pub max_level: u32,
    /// When false, nodes start out with `dont_cache` set.
    pub cache_by_default: bool,
    pub resources: ResourcesSettings,
}

impl Default for GraphSettings {
    fn default() -> Self {
        GraphSettings {
            name: String::from(""),
            num_nodes: 256,
            tile_size: crate::buffer::DEFAULT_TILE_SIZE,
            mipmap_rendering: false,
            max_level: 8,
            cache_by_default: true,
            resources: ResourcesSettings::default(),
        }
    }
}

/// How [`Graph::blit`] treats the node cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize, serde::Deserialize))]
pub struct BlitFlags(u8);

impl BlitFlags {
    /// Evaluate the request and copy the result.
    pub const DEFAULT: BlitFlags = BlitFlags(0);
    /// Render into the node cache and read from it.
    pub const CACHE: BlitFlags = BlitFlags(1);
    /// With [`BlitFlags::CACHE`]: read whatever the cache holds without
    /// computing anything.
    pub const DIRTY: BlitFlags = BlitFlags(2);

    pub fn contains(self, other: BlitFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for BlitFlags {
    type Output = BlitFlags;
    fn bitor(self, rhs: Self) -> Self::Output {
        BlitFlags(self.0 | rhs.0)
    }
}

/// The mipmap level whose resolution is closest above `scale`.
pub fn level_from_scale(scale: f64, max_level: u32) -> u32 {
    let mut level = 0;
    let mut scale = scale;
    while scale <= 0.500_001 && level < max_level {
        scale *= 2.0;
        level += 1;
    }
    level
}

/// An arena of image processing nodes and the connections between them.
pub struct Graph {
    name: String,
    nodes: SlotMap<NodeKey, Node>,
    pads: SlotMap<PadKey, Pad>,
    connections: SlotMap<ConnectionKey, Connection>,
    tile_size: u32,
    mipmap_rendering: bool,
    max_level: u32,
    cache_by_default: bool,
    resources: Resources,
}

impl Graph {
    pub fn new(settings: GraphSettings) -> Self {
        let resources = Resources::new(settings.resources);
        Self::with_resources(settings, resources)
    }
    /// A graph using an existing registry of operations and user data.
    pub fn with_resources(settings: GraphSettings, resources: Resources) -> Self {
        let GraphSettings {
            name,
            num_nodes,
            tile_size,
            mipmap_rendering,
            max_level,
            cache_by_default,
            resources: _,
        } = settings;
        Self {
            name,
            nodes: SlotMap::with_capacity_and_key(num_nodes),
            pads: SlotMap::with_capacity_and_key(num_nodes * 2),
            connections: SlotMap::with_capacity_and_key(num_nodes),
            tile_size,
            mipmap_rendering,
            max_level,
            cache_by_default,
            resources,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn resources(&self) -> &Resources {
        &self.resources
    }
    pub fn resources_mut(&mut self) -> &mut Resources {
        &mut self.resources
    }
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }
    pub fn contains(&self, node: NodeKey) -> bool {
        self.nodes.contains_key(node)
    }
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    // ---------------------------------------------------------------------
    // Creating and removing nodes

    /// Bind `operation` to a new top level node.
    ///
    /// If the operation is a meta operation whose construction fails the error
    /// is logged and the node keeps whatever children were built; use
    /// [`Graph::try_push`] to get the error instead.
    pub fn push(&mut self, operation: impl Operation) -> NodeKey {
        self.push_boxed(Box::new(operation))
    }
    pub fn push_boxed(&mut self, operation: Box<dyn Operation>) -> NodeKey {
        let key = self.insert_node(None);
        if let Err(e) = self.attach_operation(key, operation) {
            log::error!("Failed to build the subgraph of a meta operation: {e}");
        }
        key
    }
    /// Like [`Graph::push`], but frees the node and returns the error if the
    /// operation cannot be attached.
    pub fn try_push(&mut self, operation: impl Operation) -> Result<NodeKey, GraphError> {
        let key = self.insert_node(None);
        match self.attach_operation(key, Box::new(operation)) {
            Ok(()) => Ok(key),
            Err(e) => {
                let _ = self.free_node(key);
                Err(e)
            }
        }
    }
    /// Create a node from an operation registered in [`Resources`] under
    /// `operation_name`. Unknown names fall back to `nop` with a warning.
    pub fn push_named(&mut self, operation_name: &str) -> NodeKey {
        let operation = match self.resources.create_operation(operation_name) {
            Some(op) => op,
            None => {
                log::warn!("Unknown operation `{operation_name}`, using nop instead");
                Box::new(crate::ops::Nop)
            }
        };
        self.push_boxed(operation)
    }
    /// Like [`Graph::push_named`], but unknown names are an error.
    pub fn try_push_named(&mut self, operation_name: &str) -> Result<NodeKey, GraphError> {
        let operation = self
            .resources
            .create_operation(operation_name)
            .ok_or_else(|| GraphError::UnknownOperation(operation_name.to_owned()))?;
        let key = self.insert_node(None);
        match self.attach_operation(key, operation) {
            Ok(()) => Ok(key),
            Err(e) => {
                let _ = self.free_node(key);
                Err(e)
            }
        }
    }
    /// A node without an operation, to be filled with children.
    pub fn push_graph_node(&mut self) -> NodeKey {
        self.insert_node(None)
    }

    fn insert_node(&mut self, operation: Option<Box<dyn Operation>>) -> NodeKey {
        self.nodes
            .insert(Node::new(String::new(), operation, !self.cache_by_default))
    }

    /// Create pads for `operation` on `node`, build its children if it is a
    /// meta operation and store it.
    fn attach_operation(
        &mut self,
        node: NodeKey,
        mut operation: Box<dyn Operation>,
    ) -> Result<(), GraphError> {
        let specs: Vec<PropertySpec> = operation
            .kind()
            .standard_pads()
            .iter()
            .chain(operation.properties().iter().filter(|p| p.is_pad()))
            .copied()
            .collect();
        for spec in specs {
            let Some(direction) = spec.pad else {
                continue;
            };
            if self.find_own_pad(node, spec.name).is_some() {
                continue;
            }
            let pad = self.pads.insert(Pad::new(spec.name, direction, spec.kind, node));
            self.nodes[node].pads.push(pad);
        }
        let result = operation.construct(&mut SubgraphBuilder::new(self, node));
        // Push the current outer values through any redirects made while building
        let redirects = self.nodes[node].redirects.clone();
        for redirect in redirects {
            if let Some(value) = operation.get_property(&redirect.property) {
                if let Err(e) = self.set_property(redirect.target, &redirect.target_property, value) {
                    log::warn!("Could not apply redirect of `{}`: {e}", redirect.property);
                }
            }
        }
        self.nodes[node].operation = Some(operation);
        self.nodes[node].valid_have_rect = false;
        result
    }

    /// Remove a node, disconnecting all of its pads and freeing its children.
    pub fn free_node(&mut self, node: NodeKey) -> Result<(), FreeError> {
        if !self.nodes.contains_key(node) {
            return Err(FreeError::NodeNotFound);
        }
        let children = self.nodes[node].children.clone();
        for child in children {
            self.free_node(child)?;
        }
        self.disconnect_all(node);
        let pads = std::mem::take(&mut self.nodes[node].pads);
        for pad in pads {
            self.pads.remove(pad);
        }
        if let Some(parent) = self.nodes[node].parent {
            // Boundary pads carried by this node, if it was a proxy
            let boundary: Vec<PadKey> = self
                .nodes
                .get(parent)
                .map(|p| p.pads.as_slice())
                .unwrap_or_default()
                .iter()
                .copied()
                .filter(|pad| self.pads.get(*pad).map_or(true, |pad| pad.node == node))
                .collect();
            for pad in &boundary {
                self.pads.remove(*pad);
            }
            if let Some(p) = self.nodes.get_mut(parent) {
                p.children.retain(|c| *c != node);
                p.redirects.retain(|r| r.target != node);
                p.pads.retain(|pad| !boundary.contains(pad));
                if p.children.is_empty() {
                    p.is_graph = false;
                }
            }
        }
        log::debug!("Freed node {}", self.nodes[node].debug_name());
        self.nodes.remove(node);
        Ok(())
    }

    /// Drop every connection to and from the pads `node` owns, invalidating
    /// consumers.
    fn disconnect_all(&mut self, node: NodeKey) {
        let own: Vec<PadKey> = self.own_input_pads(node).chain(self.own_output_pads(node)).collect();
        for pad in own {
            let connections = self.pads[pad].connections.clone();
            for key in connections {
                let Some(c) = self.connections.get(key).copied() else {
                    continue;
                };
                if c.source == node {
                    let have = self.get_bounding_box(node);
                    let sink_pad = self.pads[c.sink_pad].name.clone();
                    self.source_invalidated(c.sink, &sink_pad, &have);
                }
                self.pad_disconnect(c.sink_pad, c.source_pad, key);
            }
        }
    }

    /// Replace the operation of `node`. Connections on `input`, `aux` and
    /// `output` are restored when the new operation has those pads.
    pub fn set_operation(&mut self, node: NodeKey, operation: impl Operation) -> Result<(), GraphError> {
        if !self.nodes.contains_key(node) {
            return Err(GraphError::NodeNotFound);
        }
        let input = self.get_producer(node, "input");
        let aux = self.get_producer(node, "aux");
        let consumers = self.get_consumers(node, "output");
        let old_rect = self.get_bounding_box(node);

        self.disconnect_all(node);
        let was_meta = self.nodes[node].operation.as_ref().map(|op| op.kind()) == Some(OperationKind::Meta);
        if was_meta {
            let children = self.nodes[node].children.clone();
            for child in children {
                let _ = self.free_node(child);
            }
            self.nodes[node].redirects.clear();
        }
        let own: Vec<PadKey> = self.own_input_pads(node).chain(self.own_output_pads(node)).collect();
        for pad in &own {
            self.pads.remove(*pad);
        }
        self.nodes[node].pads.retain(|p| !own.contains(p));
        self.nodes[node].operation = None;
        self.attach_operation(node, Box::new(operation))?;

        let mut restored = Vec::new();
        if let Some((source, pad)) = input {
            restored.push(self.connect(node, "input", source, &pad));
        }
        if let Some((source, pad)) = aux {
            restored.push(self.connect(node, "aux", source, &pad));
        }
        for (consumer, pad) in consumers {
            restored.push(self.connect(consumer, &pad, node, "output"));
        }
        for e in restored.into_iter().filter_map(Result::err) {
            log::debug!("Connection not restored after operation change: {e}");
        }
        self.nodes[node].valid_have_rect = false;
        let new_rect = self.get_bounding_box(node);
        self.invalidated(node, Some(old_rect.bounding_box(&new_rect)), false);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Node attributes

    pub fn node_name(&self, node: NodeKey) -> Option<&str> {
        self.nodes.get(node).map(|n| n.name.as_str())
    }
    pub fn set_node_name(&mut self, node: NodeKey, name: impl Into<String>) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.name = name.into();
        }
    }
    /// The registry name of the operation bound to `node`.
    pub fn operation_name(&self, node: NodeKey) -> Option<&'static str> {
        self.nodes.get(node).and_then(Node::operation_name)
    }
    /// The concrete operation bound to `node`.
    pub fn operation<T: Operation>(&self, node: NodeKey) -> Option<&T> {
        self.nodes
            .get(node)?
            .operation
            .as_ref()?
            .downcast_ref::<T>()
    }
    /// Pad names of `node` in declaration order.
    pub fn pad_names(&self, node: NodeKey) -> Vec<String> {
        self.nodes.get(node).map_or_else(Vec::new, |n| {
            n.pads
                .iter()
                .filter_map(|p| self.pads.get(*p))
                .map(|p| p.name.clone())
                .collect()
        })
    }
    /// The pad of `node` named `name`, including boundary pads of a container.
    pub fn pad(&self, node: NodeKey, name: &str) -> Option<PadKey> {
        self.nodes
            .get(node)?
            .pads
            .iter()
            .copied()
            .find(|p| self.pads.get(*p).map_or(false, |p| p.name == name))
    }
    fn find_own_pad(&self, node: NodeKey, name: &str) -> Option<PadKey> {
        self.nodes
            .get(node)?
            .pads
            .iter()
            .copied()
            .find(|p| self.pads.get(*p).map_or(false, |p| p.name == name && p.node == node))
    }

    pub fn passthrough(&self, node: NodeKey) -> bool {
        self.nodes.get(node).map_or(false, |n| n.passthrough)
    }
    /// Bypass the operation of `node`, forwarding its `input` to `output`.
    pub fn set_passthrough(&mut self, node: NodeKey, passthrough: bool) {
        match self.nodes.get(node) {
            Some(n) if n.passthrough != passthrough => {}
            _ => return,
        }
        let old_rect = self.get_bounding_box(node);
        let n = &mut self.nodes[node];
        n.passthrough = passthrough;
        n.valid_have_rect = false;
        let new_rect = self.get_bounding_box(node);
        self.invalidated(node, Some(old_rect.bounding_box(&new_rect)), true);
    }
    pub fn dont_cache(&self, node: NodeKey) -> bool {
        self.nodes.get(node).map_or(false, |n| n.dont_cache)
    }
    pub fn set_dont_cache(&mut self, node: NodeKey, dont_cache: bool) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.dont_cache = dont_cache;
        }
    }
    /// The cache of `node`, if it has computed anything into one.
    pub fn cache(&self, node: NodeKey) -> Option<&NodeCache> {
        self.nodes.get(node)?.cache.as_ref()
    }

    // ---------------------------------------------------------------------
    // Properties

    /// Read a property of the operation bound to `node`.
    pub fn get_property(&self, node: NodeKey, name: &str) -> Option<Value> {
        let value = self
            .nodes
            .get(node)?
            .operation
            .as_ref()?
            .get_property(name);
        if value.is_none() {
            log::warn!("Node has no property named `{name}`");
        }
        value
    }

    /// Set a property, mirror it through any redirects and invalidate the
    /// region the change can affect.
    pub fn set_property(
        &mut self,
        node: NodeKey,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<(), GraphError> {
        let value = value.into();
        let n = self.nodes.get_mut(node).ok_or(GraphError::NodeNotFound)?;
        let op = n
            .operation
            .as_mut()
            .ok_or_else(|| PropertyError::NoSuchProperty(name.to_owned()))?;
        op.set_property(name, value.clone())?;
        let redirects: Vec<_> = n
            .redirects
            .iter()
            .filter(|r| r.property == name)
            .cloned()
            .collect();
        for redirect in redirects {
            self.set_property(redirect.target, &redirect.target_property, value.clone())?;
        }
        let old_rect = self.nodes[node].have_rect;
        self.nodes[node].valid_have_rect = false;
        let new_rect = self.get_bounding_box(node);
        self.invalidated(node, Some(old_rect.bounding_box(&new_rect)), false);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Connections

    /// Connect `source_pad` of `source` to `sink_pad` of `sink`.
    ///
    /// Containers are connected through their proxies. If the sink pad is
    /// already fed by another pad that connection is replaced; reconnecting the
    /// same pads is a no op. Connections that would make a node depend on
    /// itself are rejected.
    pub fn connect(
        &mut self,
        sink: NodeKey,
        sink_pad: &str,
        source: NodeKey,
        source_pad: &str,
    ) -> Result<(), ConnectionError> {
        if !self.nodes.contains_key(sink) || !self.nodes.contains_key(source) {
            return Err(ConnectionError::NodeNotFound);
        }
        let (real_sink, sink_pad) = if self.nodes[sink].is_graph {
            let proxy = self
                .get_input_proxy(sink, sink_pad)
                .map_err(|_| ConnectionError::NodeNotFound)?;
            (proxy, "input")
        } else {
            (sink, sink_pad)
        };
        let (real_source, source_pad) = if self.nodes[source].is_graph {
            let proxy = self
                .get_output_proxy(source, source_pad)
                .map_err(|_| ConnectionError::NodeNotFound)?;
            (proxy, "output")
        } else {
            (source, source_pad)
        };
        if real_sink == real_source {
            return Err(ConnectionError::SameNode);
        }
        let sink_pad_key = self.find_own_pad(real_sink, sink_pad).ok_or_else(|| {
            log::warn!("Can't find sink pad `{sink_pad}`");
            ConnectionError::PadNotFound {
                node: real_sink,
                pad: sink_pad.to_owned(),
            }
        })?;
        let source_pad_key = self.find_own_pad(real_source, source_pad).ok_or_else(|| {
            log::warn!("Can't find source pad `{source_pad}`");
            ConnectionError::PadNotFound {
                node: real_source,
                pad: source_pad.to_owned(),
            }
        })?;
        if !self.pads[sink_pad_key].is_input() {
            return Err(ConnectionError::NotAnInput(sink_pad.to_owned()));
        }
        if !self.pads[source_pad_key].is_output() {
            return Err(ConnectionError::NotAnOutput(source_pad.to_owned()));
        }
        if self.has_source(real_source, real_sink) {
            log::warn!("Construction of a loop requested, refusing the connection");
            return Err(ConnectionError::WouldCreateCycle);
        }
        if self.get_connected_to(sink_pad_key) == Some(source_pad_key) {
            return Ok(());
        }
        self.disconnect(real_sink, sink_pad)?;
        self.pad_connect(sink_pad_key, source_pad_key)?;
        log::debug!(
            "Connected {}.{} -> {}.{}",
            self.nodes[real_source].debug_name(),
            source_pad,
            self.nodes[real_sink].debug_name(),
            sink_pad
        );
        let have = self.get_bounding_box(real_source);
        self.source_invalidated(real_sink, sink_pad, &have);
        Ok(())
    }

    /// Remove the connection feeding `input_pad` of `node`. Returns false if
    /// the pad was not connected.
    pub fn disconnect(&mut self, node: NodeKey, input_pad: &str) -> Result<bool, ConnectionError> {
        let n = self.nodes.get(node).ok_or(ConnectionError::NodeNotFound)?;
        let (real_sink, input_pad) = if n.is_graph {
            match self.pad(node, input_pad).and_then(|p| self.pads.get(p)) {
                Some(pad) if pad.node != node => (pad.node, "input"),
                _ => return Ok(false),
            }
        } else {
            (node, input_pad)
        };
        let pad = self.find_own_pad(real_sink, input_pad).ok_or_else(|| {
            log::warn!("Can't find pad `{input_pad}` to disconnect");
            ConnectionError::PadNotFound {
                node: real_sink,
                pad: input_pad.to_owned(),
            }
        })?;
        let Some(&key) = self.pads[pad].connections.first() else {
            return Ok(false);
        };
        let c = self.connections[key];
        let have = self.get_bounding_box(c.source);
        self.source_invalidated(real_sink, input_pad, &have);
        self.pad_disconnect(c.sink_pad, c.source_pad, key);
        log::debug!(
            "Disconnected {}.{}",
            self.nodes[real_sink].debug_name(),
            input_pad
        );
        Ok(true)
    }

    /// Connect `output` of `source` to `input` of `sink`.
    pub fn link(&mut self, source: NodeKey, sink: NodeKey) -> Result<(), ConnectionError> {
        self.connect(sink, "input", source, "output")
    }
    /// Link each node to the next.
    pub fn link_many(&mut self, nodes: &[NodeKey]) -> Result<(), ConnectionError> {
        for pair in nodes.windows(2) {
            self.link(pair[0], pair[1])?;
        }
        Ok(())
    }

    /// True if `node` is `potential_source` or transitively depends on it.
    pub fn has_source(&self, node: NodeKey, potential_source: NodeKey) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if current == potential_source {
                return true;
            }
            if visited.insert(current) {
                stack.extend(self.depends_on(current));
            }
        }
        false
    }

    /// The node and pad feeding `input_pad` of `node`. Proxies are reported as
    /// the container they belong to.
    pub fn get_producer(&self, node: NodeKey, input_pad: &str) -> Option<(NodeKey, String)> {
        let n = self.nodes.get(node)?;
        let (real, pad_name) = if n.is_graph {
            let pad = self.pads.get(self.pad(node, input_pad)?)?;
            if pad.node == node {
                (node, input_pad)
            } else {
                (pad.node, "input")
            }
        } else {
            (node, input_pad)
        };
        let pad = self.find_own_pad(real, pad_name)?;
        let source_pad = self.pads.get(self.get_connected_to(pad)?)?;
        let producer = source_pad.node;
        match &self.nodes.get(producer)?.proxy {
            Some(ProxyRole::Output(name)) => {
                let parent = self.nodes[producer].parent?;
                Some((parent, name.clone()))
            }
            _ => Some((producer, source_pad.name.clone())),
        }
    }

    /// Every node and pad fed by `output_pad` of `node`. Proxies are reported
    /// as the container they belong to.
    pub fn get_consumers(&self, node: NodeKey, output_pad: &str) -> Vec<(NodeKey, String)> {
        let Some(n) = self.nodes.get(node) else {
            return Vec::new();
        };
        let (real, pad_name) = if n.is_graph {
            match self.pad(node, output_pad).and_then(|p| self.pads.get(p)) {
                Some(pad) if pad.node != node => (pad.node, "output"),
                Some(_) => (node, output_pad),
                None => return Vec::new(),
            }
        } else {
            (node, output_pad)
        };
        let Some(pad) = self.find_own_pad(real, pad_name) else {
            log::warn!("Can't find output pad `{pad_name}`");
            return Vec::new();
        };
        self.pads[pad]
            .connections
            .iter()
            .filter_map(|c| self.connections.get(*c))
            .map(|c| {
                let sink = &self.nodes[c.sink];
                match (&sink.proxy, sink.parent) {
                    (Some(ProxyRole::Input(name)), Some(parent)) => (parent, name.clone()),
                    _ => (c.sink, self.pads[c.sink_pad].name.clone()),
                }
            })
            .collect()
    }

    // ---------------------------------------------------------------------
    // Invalidation

    /// Forget cached results of `node` inside `rect` (its whole bounding box
    /// if `None`) and of everything downstream that depends on them.
    pub fn invalidated(&mut self, node: NodeKey, rect: Option<Rect>, clear_cache: bool) {
        let Some(n) = self.nodes.get(node) else {
            return;
        };
        let rect = rect.unwrap_or(n.have_rect);
        let mut seen: HashMap<NodeKey, Region> = HashMap::new();
        let mut work = vec![(node, rect)];
        while let Some((key, rect)) = work.pop() {
            if let Some(region) = seen.get(&key) {
                if rect.is_empty() || region.contains_rect(&rect) {
                    continue;
                }
            }
            seen.entry(key).or_default().add(&rect);
            let Some(n) = self.nodes.get_mut(key) else {
                continue;
            };
            if let Some(cache) = n.cache.as_mut() {
                cache.invalidate(&rect, clear_cache && key == node);
            }
            n.valid_have_rect = false;
            log::debug!("{} invalidated in {rect}", n.debug_name());
            let container = match n.proxy {
                Some(ProxyRole::Output(_)) => n.parent,
                _ => None,
            };
            if let Some(p) = container.and_then(|p| self.nodes.get_mut(p)) {
                p.valid_have_rect = false;
            }
            let outputs: Vec<PadKey> = self.own_output_pads(key).collect();
            for pad in outputs {
                for c in &self.pads[pad].connections {
                    let Some(c) = self.connections.get(*c) else {
                        continue;
                    };
                    let sink_pad = &self.pads[c.sink_pad].name;
                    let dirty = match self.nodes[c.sink].operation.as_ref() {
                        Some(op) if !self.nodes[c.sink].passthrough => {
                            op.get_invalidated_by_change(sink_pad, &rect)
                        }
                        _ => rect,
                    };
                    work.push((c.sink, dirty));
                }
            }
        }
    }

    fn source_invalidated(&mut self, sink: NodeKey, sink_pad: &str, rect: &Rect) {
        let Some(n) = self.nodes.get(sink) else {
            return;
        };
        let dirty = match n.operation.as_ref() {
            Some(op) if !n.passthrough => op.get_invalidated_by_change(sink_pad, rect),
            _ => *rect,
        };
        self.invalidated(sink, Some(dirty), false);
    }

    // ---------------------------------------------------------------------
    // Geometry

    /// The node data is produced by: the output proxy for containers.
    fn real_node(&mut self, node: NodeKey) -> Option<NodeKey> {
        let n = self.nodes.get(node)?;
        if n.is_graph {
            self.get_output_proxy(node, "output").ok()
        } else {
            Some(node)
        }
    }

    /// Bounding boxes of the producers of `node`, as last computed.
    fn geometry_context(&self, node: NodeKey) -> GeometryContext {
        let mut geometry = GeometryContext::new();
        for pad in self.own_input_pads(node) {
            if let Some(source) = self.get_connected_to(pad).and_then(|p| self.pads.get(p)) {
                geometry = geometry.with_source(&self.pads[pad].name, self.nodes[source.node].have_rect);
            }
        }
        geometry
    }

    fn compute_bounding_box(&self, node: NodeKey, geometry: &GeometryContext) -> Rect {
        let n = &self.nodes[node];
        if n.passthrough {
            return geometry
                .source_bounding_box("input")
                .unwrap_or_else(Rect::empty);
        }
        match n.operation.as_ref() {
            Some(op) => op.get_bounding_box(geometry),
            None => Rect::empty(),
        }
    }

    fn required_for_output(
        &self,
        node: NodeKey,
        input_pad: &str,
        roi: &Rect,
        geometry: &GeometryContext,
    ) -> Rect {
        if roi.is_empty() {
            return *roi;
        }
        let n = &self.nodes[node];
        match n.operation.as_ref() {
            Some(op) if !n.passthrough => op.get_required_for_output(input_pad, roi, geometry),
            _ => *roi,
        }
    }

    fn cached_region_for(&self, node: NodeKey, roi: &Rect, geometry: &GeometryContext) -> Rect {
        let n = &self.nodes[node];
        if n.passthrough {
            let producer = self
                .find_own_pad(node, "input")
                .and_then(|p| self.get_connected_to(p))
                .and_then(|p| self.pads.get(p))
                .map(|p| p.node);
            return match producer {
                Some(p) => self.cached_region_for(p, roi, &self.geometry_context(p)),
                None => *roi,
            };
        }
        match n.operation.as_ref() {
            Some(op) => op.get_cached_region(roi, geometry),
            None => *roi,
        }
    }

    /// The largest region `node` can produce.
    pub fn get_bounding_box(&mut self, node: NodeKey) -> Rect {
        let Some(real) = self.real_node(node) else {
            return Rect::empty();
        };
        if !self.nodes[real].valid_have_rect {
            let mut traversal = GraphTraversal::build(self, real);
            traversal.prepare(self);
        }
        let have = self.nodes[real].have_rect;
        if real != node {
            let n = &mut self.nodes[node];
            n.have_rect = have;
            n.valid_have_rect = true;
        }
        have
    }
    /// The region of `input_pad` that `node` needs to produce `roi`.
    pub fn get_required_for_output(&mut self, node: NodeKey, input_pad: &str, roi: &Rect) -> Rect {
        let Some(real) = self.real_node(node) else {
            return Rect::empty();
        };
        self.get_bounding_box(real);
        let geometry = self.geometry_context(real);
        self.required_for_output(real, input_pad, roi, &geometry)
    }
    /// The region `node` computes and caches when `roi` is requested.
    pub fn get_cached_region(&mut self, node: NodeKey, roi: &Rect) -> Rect {
        let Some(real) = self.real_node(node) else {
            return Rect::empty();
        };
        self.get_bounding_box(real);
        let geometry = self.geometry_context(real);
        self.cached_region_for(real, roi, &geometry)
    }

    /// The node responsible for the pixel at `x`,`y` of `node`'s output,
    /// judged by bounding boxes.
    pub fn detect(&mut self, node: NodeKey, x: i32, y: i32) -> Option<NodeKey> {
        self.get_bounding_box(node);
        self.detect_node(node, x, y)
    }

    fn detect_node(&self, node: NodeKey, x: i32, y: i32) -> Option<NodeKey> {
        let n = self.nodes.get(node)?;
        if !n.have_rect.contains_point(x, y) {
            return None;
        }
        let own_hit = || Some(node);
        if n.passthrough {
            return self
                .get_producer(node, "input")
                .and_then(|(p, _)| self.detect_node(p, x, y))
                .or_else(own_hit);
        }
        let detected = match n.operation.as_ref() {
            _ if n.is_graph => {
                let proxy = self
                    .pad(node, "output")
                    .and_then(|p| self.pads.get(p))
                    .map(|p| p.node)
                    .filter(|p| *p != node)?;
                self.detect_node(proxy, x, y)
            }
            Some(op) => match op.detect(x, y, &n.have_rect) {
                Detect::Hit => Some(node),
                Detect::Miss => None,
                Detect::Sources(pads) => pads
                    .iter()
                    .filter_map(|pad| self.get_producer(node, pad))
                    .find_map(|(p, _)| self.detect_node(p, x, y))
                    .or_else(own_hit),
            },
            None => None,
        };
        // A hit on a proxy belongs to its container
        detected.map(|d| match (&self.nodes[d].proxy, self.nodes[d].parent) {
            (Some(_), Some(parent)) => parent,
            _ => d,
        })
    }

    // ---------------------------------------------------------------------
    // Evaluation

    /// The cache of `node`, created with the node's bounding box as extent.
    fn ensure_cache(&mut self, node: NodeKey) -> &mut NodeCache {
        let tile_size = self.tile_size;
        let n = &mut self.nodes[node];
        let extent = n.have_rect;
        n.cache.get_or_insert_with(|| NodeCache::new(extent, tile_size))
    }

    /// Evaluate `roi` of `node`'s output at mipmap `level` and return the
    /// buffer holding it.
    pub fn apply(&mut self, node: NodeKey, roi: &Rect, level: u32) -> Result<Buffer, ProcessError> {
        let real = self.real_node(node).ok_or(ProcessError::NodeNotFound)?;
        let mut traversal = GraphTraversal::build(self, real);
        traversal.prepare(self);
        traversal.prepare_request(self, roi, level);
        traversal.process(self, level)
    }

    /// Run a sink over the bounding box of its input.
    pub fn process(&mut self, node: NodeKey) -> Result<(), ProcessError> {
        let real = self.real_node(node).ok_or(ProcessError::NodeNotFound)?;
        let mut traversal = GraphTraversal::build(self, real);
        traversal.prepare(self);
        let geometry = self.geometry_context(real);
        let roi = geometry
            .source_bounding_box("input")
            .unwrap_or(self.nodes[real].have_rect);
        traversal.prepare_request(self, &roi, 0);
        traversal.process(self, 0)?;
        Ok(())
    }

    /// Render `roi`, given in coordinates scaled by `scale`, of `node` into
    /// `destination` in `format`.
    ///
    /// With [`BlitFlags::CACHE`] the result is kept in the node cache and read
    /// back from it; adding [`BlitFlags::DIRTY`] skips computation and returns
    /// whatever the cache holds. If evaluation fails the contents of
    /// `destination` are unspecified.
    pub fn blit(
        &mut self,
        node: NodeKey,
        scale: f64,
        roi: &Rect,
        format: PixelFormat,
        destination: &mut [u8],
        flags: BlitFlags,
    ) -> Result<(), ProcessError> {
        let level = if self.mipmap_rendering && scale != 1.0 {
            level_from_scale(scale, self.max_level)
        } else {
            0
        };
        let unscaled_roi = roi.unscaled_outward(scale);
        if !flags.contains(BlitFlags::CACHE) {
            let buffer = self.apply(node, &unscaled_roi, level)?;
            buffer.get(roi, scale, format, destination)?;
            return Ok(());
        }
        let real = self.real_node(node).ok_or(ProcessError::NodeNotFound)?;
        self.get_bounding_box(real);
        if !flags.contains(BlitFlags::DIRTY) {
            let result = self.apply(node, &unscaled_roi, level)?;
            let cache = self.ensure_cache(real);
            cache.buffer(level).copy_from(&result, &unscaled_roi);
            cache.computed(&unscaled_roi, level);
        }
        let cached = self.ensure_cache(real).buffer(level);
        cached.get(roi, scale, format, destination)?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Inspection

    /// A plain data snapshot of every node and connection.
    pub fn inspection(&self) -> GraphInspection {
        let nodes = self
            .nodes
            .iter()
            .map(|(key, n)| NodeInspection {
                key,
                name: n.name.clone(),
                operation: n.operation_name(),
                pads: n
                    .pads
                    .iter()
                    .filter_map(|p| self.pads.get(*p))
                    .map(|p| PadInspection {
                        name: p.name.clone(),
                        direction: p.direction,
                        kind: p.kind,
                        proxied: p.node != key,
                    })
                    .collect(),
                parent: n.parent,
                children: n.children.clone(),
                passthrough: n.passthrough,
                dont_cache: n.dont_cache,
                bounding_box: n.valid_have_rect.then_some(n.have_rect),
            })
            .collect();
        let edges = self
            .connections
            .values()
            .map(|c| EdgeInspection {
                source: c.source,
                source_pad: self.pads[c.source_pad].name.clone(),
                sink: c.sink,
                sink_pad: self.pads[c.sink_pad].name.clone(),
            })
            .collect();
        GraphInspection {
            name: self.name.clone(),
            nodes,
            edges,
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(GraphSettings::default())
    }
}

impl DependencySource<NodeKey> for Graph {
    /// The producers connected to the input pads of `node`, in pad order.
    fn depends_on(&self, node: NodeKey) -> Vec<NodeKey> {
        self.own_input_pads(node)
            .flat_map(|pad| self.pads[pad].connections.iter())
            .filter_map(|c| self.connections.get(*c))
            .map(|c| c.source)
            .collect()
    }
}

//! Subgraph containment: parent/child links, boundary proxies and property
//! redirects.
//!
//! A container exposes a pad by creating a `nop` child that carries the data
//! across the boundary. The container's pad entry points at that proxy, so a
//! connection made to the container lands on the proxy.

use super::node::{Redirect, ProxyRole};
use super::pad::Pad;
use super::{ConnectionError, Graph, GraphError, NodeKey};
use crate::operation::Operation;
use crate::ops::Nop;
use crate::value::{PadDirection, Value, ValueKind};

impl Graph {
    /// Make `child` a child of `parent`. The child inherits the parent's
    /// `dont_cache`.
    pub fn add_child(&mut self, parent: NodeKey, child: NodeKey) -> Result<(), GraphError> {
        if !self.nodes.contains_key(parent) || !self.nodes.contains_key(child) {
            return Err(GraphError::NodeNotFound);
        }
        if self.nodes[child].parent.is_some() {
            return Err(GraphError::AlreadyHasParent);
        }
        let dont_cache = self.nodes[parent].dont_cache;
        let c = &mut self.nodes[child];
        c.parent = Some(parent);
        c.dont_cache = dont_cache;
        let p = &mut self.nodes[parent];
        p.children.push(child);
        p.is_graph = true;
        Ok(())
    }
    /// Detach `child` from `parent` without freeing it.
    pub fn remove_child(&mut self, parent: NodeKey, child: NodeKey) -> Result<(), GraphError> {
        let p = self.nodes.get_mut(parent).ok_or(GraphError::NodeNotFound)?;
        let Some(index) = p.children.iter().position(|c| *c == child) else {
            return Err(GraphError::NotAChild);
        };
        p.children.remove(index);
        if p.children.is_empty() {
            p.is_graph = false;
        }
        if let Some(c) = self.nodes.get_mut(child) {
            c.parent = None;
        }
        Ok(())
    }
    /// Bind `operation` to a new node that is a child of `parent`.
    pub fn new_child(&mut self, parent: NodeKey, operation: impl Operation) -> Result<NodeKey, GraphError> {
        if !self.nodes.contains_key(parent) {
            return Err(GraphError::NodeNotFound);
        }
        let child = self.try_push(operation)?;
        self.add_child(parent, child)?;
        Ok(child)
    }
    pub fn children(&self, node: NodeKey) -> &[NodeKey] {
        self.nodes.get(node).map_or(&[], |n| n.children.as_slice())
    }
    pub fn parent(&self, node: NodeKey) -> Option<NodeKey> {
        self.nodes.get(node)?.parent
    }
    /// True for nodes with children.
    pub fn is_graph(&self, node: NodeKey) -> bool {
        self.nodes.get(node).map_or(false, |n| n.is_graph)
    }

    /// The node carrying `pad` into `node`, created as a `nop` child on first
    /// request.
    pub fn get_input_proxy(&mut self, node: NodeKey, pad: &str) -> Result<NodeKey, GraphError> {
        self.proxy(node, pad, ProxyRole::Input(pad.to_owned()))
    }
    /// The node carrying `pad` out of `node`, created as a `nop` child on first
    /// request.
    pub fn get_output_proxy(&mut self, node: NodeKey, pad: &str) -> Result<NodeKey, GraphError> {
        self.proxy(node, pad, ProxyRole::Output(pad.to_owned()))
    }

    fn proxy(&mut self, node: NodeKey, pad: &str, role: ProxyRole) -> Result<NodeKey, GraphError> {
        if !self.nodes.contains_key(node) {
            return Err(GraphError::NodeNotFound);
        }
        if let Some(existing) = self.pad(node, pad) {
            return Ok(self.pads[existing].node);
        }
        let (name, direction) = match role {
            ProxyRole::Input(_) => ("proxynop-input", PadDirection::INPUT),
            ProxyRole::Output(_) => ("proxynop-output", PadDirection::OUTPUT),
        };
        let nop = self.push(Nop);
        self.set_node_name(nop, name);
        self.nodes[nop].proxy = Some(role);
        self.add_child(node, nop)?;
        let boundary = self.pads.insert(Pad::new(pad, direction, ValueKind::Buffer, nop));
        self.nodes[node].pads.push(boundary);
        log::trace!("Created {name} for pad `{pad}`");
        Ok(nop)
    }

    /// Forward `property` of `node` to `inner_property` of `inner`. Setting
    /// the outer property afterwards also sets the inner one.
    pub fn redirect(
        &mut self,
        node: NodeKey,
        property: &str,
        inner: NodeKey,
        inner_property: &str,
    ) -> Result<(), GraphError> {
        if !self.nodes.contains_key(inner) {
            return Err(GraphError::NodeNotFound);
        }
        let n = self.nodes.get_mut(node).ok_or(GraphError::NodeNotFound)?;
        n.redirects.push(Redirect {
            property: property.to_owned(),
            target: inner,
            target_property: inner_property.to_owned(),
        });
        Ok(())
    }
}

/// Handed to [`Operation::construct`](crate::operation::Operation::construct)
/// so a meta operation can build its children under its own node.
pub struct SubgraphBuilder<'a> {
    graph: &'a mut Graph,
    node: NodeKey,
}

impl<'a> SubgraphBuilder<'a> {
    pub(super) fn new(graph: &'a mut Graph, node: NodeKey) -> Self {
        Self { graph, node }
    }
    /// The node being built.
    pub fn node(&self) -> NodeKey {
        self.node
    }
    /// Add a child running `operation`.
    pub fn new_child(&mut self, operation: impl Operation) -> Result<NodeKey, GraphError> {
        self.graph.new_child(self.node, operation)
    }
    pub fn input_proxy(&mut self, pad: &str) -> Result<NodeKey, GraphError> {
        self.graph.get_input_proxy(self.node, pad)
    }
    pub fn output_proxy(&mut self, pad: &str) -> Result<NodeKey, GraphError> {
        self.graph.get_output_proxy(self.node, pad)
    }
    pub fn connect(
        &mut self,
        sink: NodeKey,
        sink_pad: &str,
        source: NodeKey,
        source_pad: &str,
    ) -> Result<(), ConnectionError> {
        self.graph.connect(sink, sink_pad, source, source_pad)
    }
    pub fn link(&mut self, source: NodeKey, sink: NodeKey) -> Result<(), ConnectionError> {
        self.graph.link(source, sink)
    }
    pub fn link_many(&mut self, nodes: &[NodeKey]) -> Result<(), ConnectionError> {
        self.graph.link_many(nodes)
    }
    /// Redirect `property` of the node being built to `inner_property` of
    /// `inner`.
    pub fn redirect(&mut self, property: &str, inner: NodeKey, inner_property: &str) -> Result<(), GraphError> {
        self.graph.redirect(self.node, property, inner, inner_property)
    }
    pub fn set_property(&mut self, node: NodeKey, name: &str, value: impl Into<Value>) -> Result<(), GraphError> {
        self.graph.set_property(node, name, value)
    }
}

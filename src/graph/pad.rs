//! Pads and the pad level connection protocol.

use slotmap::new_key_type;

use super::connection::{Connection, ConnectionError, ConnectionKey};
use super::visitor::DependencySource;
use super::{Graph, NodeKey};
use crate::value::{PadDirection, ValueKind};

new_key_type! {
    /// Handle to a [`Pad`] in a [`Graph`].
    pub struct PadKey;
}

/// A named connection point. An input pad holds at most one connection, an
/// output pad any number.
#[derive(Clone, Debug)]
pub struct Pad {
    pub(super) name: String,
    pub(super) direction: PadDirection,
    pub(super) kind: ValueKind,
    /// The node data actually flows through. For the boundary pads of a
    /// subgraph container this is the proxy node, not the container.
    pub(super) node: NodeKey,
    pub(super) connections: Vec<ConnectionKey>,
}

impl Pad {
    pub(super) fn new(name: &str, direction: PadDirection, kind: ValueKind, node: NodeKey) -> Self {
        Self {
            name: name.to_owned(),
            direction,
            kind,
            node,
            connections: Vec::new(),
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn direction(&self) -> PadDirection {
        self.direction
    }
    pub fn is_input(&self) -> bool {
        self.direction.input
    }
    pub fn is_output(&self) -> bool {
        self.direction.output
    }
    pub fn kind(&self) -> ValueKind {
        self.kind
    }
    pub fn node(&self) -> NodeKey {
        self.node
    }
    pub fn connections(&self) -> &[ConnectionKey] {
        &self.connections
    }
}

impl Graph {
    /// Look up a pad by handle.
    pub fn pad_info(&self, pad: PadKey) -> Option<&Pad> {
        self.pads.get(pad)
    }

    /// Bind `source_pad` to `sink_pad`. Fails if the sink already has a
    /// connection or the pads cannot carry the same kind of value. This does
    /// not check for cycles or invalidate anything; see [`Graph::connect`].
    pub fn pad_connect(
        &mut self,
        sink_pad: PadKey,
        source_pad: PadKey,
    ) -> Result<ConnectionKey, ConnectionError> {
        let sink = self.pads.get(sink_pad).ok_or(ConnectionError::NodeNotFound)?;
        let source = self
            .pads
            .get(source_pad)
            .ok_or(ConnectionError::NodeNotFound)?;
        if !sink.connections.is_empty() {
            return Err(ConnectionError::AlreadyConnected);
        }
        if sink.kind != source.kind {
            return Err(ConnectionError::IncompatiblePads {
                sink_kind: sink.kind,
                source_kind: source.kind,
            });
        }
        let connection = Connection {
            sink: sink.node,
            sink_pad,
            source: source.node,
            source_pad,
        };
        let key = self.connections.insert(connection);
        self.pads[sink_pad].connections.push(key);
        self.pads[source_pad].connections.push(key);
        Ok(key)
    }

    /// Remove `connection` from both pads' connection lists and drop it.
    pub fn pad_disconnect(&mut self, sink_pad: PadKey, source_pad: PadKey, connection: ConnectionKey) {
        if let Some(c) = self.connections.get(connection) {
            assert_eq!(
                c.sink_pad, sink_pad,
                "Disconnecting a connection from a pad it does not end at"
            );
        }
        for pad in [sink_pad, source_pad] {
            if let Some(pad) = self.pads.get_mut(pad) {
                pad.connections.retain(|c| *c != connection);
            }
        }
        self.connections.remove(connection);
    }

    /// The pad at the other end of `pad`'s only connection.
    pub fn get_connected_to(&self, pad: PadKey) -> Option<PadKey> {
        let p = self.pads.get(pad)?;
        if p.is_input() {
            debug_assert!(
                p.connections.len() <= 1,
                "Input pad `{}` has {} connections",
                p.name,
                p.connections.len()
            );
        }
        if p.connections.len() != 1 {
            return None;
        }
        let connection = self.connections.get(p.connections[0])?;
        if connection.sink_pad == pad {
            Some(connection.source_pad)
        } else {
            Some(connection.sink_pad)
        }
    }

    /// The input pads of `node` in declaration order, excluding boundary pads
    /// owned by proxies.
    pub(super) fn own_input_pads(&self, node: NodeKey) -> impl Iterator<Item = PadKey> + '_ {
        self.nodes
            .get(node)
            .map(|n| n.pads.as_slice())
            .unwrap_or_default()
            .iter()
            .copied()
            .filter(move |p| self.pads.get(*p).map_or(false, |p| p.node == node && p.is_input()))
    }

    /// The output pads of `node` in declaration order, excluding boundary pads
    /// owned by proxies.
    pub(super) fn own_output_pads(&self, node: NodeKey) -> impl Iterator<Item = PadKey> + '_ {
        self.nodes
            .get(node)
            .map(|n| n.pads.as_slice())
            .unwrap_or_default()
            .iter()
            .copied()
            .filter(move |p| self.pads.get(*p).map_or(false, |p| p.node == node && p.is_output()))
    }
}

impl DependencySource<PadKey> for Graph {
    /// An input pad depends on the pad feeding it. An output pad depends on
    /// every input pad of its node.
    fn depends_on(&self, pad: PadKey) -> Vec<PadKey> {
        let Some(p) = self.pads.get(pad) else {
            return Vec::new();
        };
        if p.is_input() {
            self.get_connected_to(pad).into_iter().collect()
        } else if p.is_output() {
            self.own_input_pads(p.node).collect()
        } else {
            Vec::new()
        }
    }
}

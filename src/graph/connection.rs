use slotmap::new_key_type;

use super::pad::PadKey;
use super::NodeKey;
use crate::value::ValueKind;

new_key_type! {
    /// Handle to a [`Connection`] in a [`Graph`](super::Graph).
    pub struct ConnectionKey;
}

/// A directed edge from an output pad of one node to an input pad of another.
///
/// The nodes stored here are the real endpoints: when a subgraph container is
/// connected, the connection is made to its proxy node instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Connection {
    pub sink: NodeKey,
    pub sink_pad: PadKey,
    pub source: NodeKey,
    pub source_pad: PadKey,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("The node does not exist. The Node may have been freed already.")]
    NodeNotFound,
    #[error("The node has no pad named `{pad}`.")]
    PadNotFound { node: NodeKey, pad: String },
    #[error("You are trying to connect a node to itself.")]
    SameNode,
    #[error("The connection would make the node depend on its own output.")]
    WouldCreateCycle,
    #[error("The pad `{0}` cannot receive a connection.")]
    NotAnInput(String),
    #[error("The pad `{0}` cannot produce data for a connection.")]
    NotAnOutput(String),
    #[error("The source pad carries {source_kind:?} values but the sink pad expects {sink_kind:?}.")]
    IncompatiblePads {
        sink_kind: ValueKind,
        source_kind: ValueKind,
    },
    #[error("The input pad is already connected.")]
    AlreadyConnected,
}

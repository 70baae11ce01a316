use crate::graph::NodeKey;
use crate::rect::Rect;
use crate::value::{PadDirection, ValueKind};

/// The metadata of a Graph
#[derive(Clone, Debug)]
pub struct GraphInspection {
    pub name: String,
    /// Every node in the arena, children included
    pub nodes: Vec<NodeInspection>,
    pub edges: Vec<EdgeInspection>,
}

impl GraphInspection {
    pub fn node(&self, key: NodeKey) -> Option<&NodeInspection> {
        self.nodes.iter().find(|n| n.key == key)
    }
    /// Nodes without a parent.
    pub fn top_level(&self) -> impl Iterator<Item = &NodeInspection> {
        self.nodes.iter().filter(|n| n.parent.is_none())
    }
}

#[derive(Clone, Debug)]
pub struct NodeInspection {
    pub key: NodeKey,
    pub name: String,
    /// Registry name of the bound operation, `None` for plain containers
    pub operation: Option<&'static str>,
    pub pads: Vec<PadInspection>,
    pub parent: Option<NodeKey>,
    pub children: Vec<NodeKey>,
    pub passthrough: bool,
    pub dont_cache: bool,
    /// The last computed bounding box, if it is still valid
    pub bounding_box: Option<Rect>,
}

#[derive(Clone, Debug)]
pub struct PadInspection {
    pub name: String,
    pub direction: PadDirection,
    pub kind: ValueKind,
    /// True for container pads carried by a proxy child
    pub proxied: bool,
}

/// Metadata for an edge. Endpoints are the nodes owning the pads, so edges to
/// a container's boundary end at its proxies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdgeInspection {
    pub source: NodeKey,
    pub source_pad: String,
    pub sink: NodeKey,
    pub sink_pad: String,
}

use std::collections::BTreeMap;

use super::pad::PadKey;
use super::NodeKey;
use crate::buffer::Buffer;
use crate::operation::Operation;
use crate::rect::{Rect, Region};

/// A standing binding from a property of a meta operation's node to a property
/// of one of its children.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct Redirect {
    pub(super) property: String,
    pub(super) target: NodeKey,
    pub(super) target_property: String,
}

/// Set on the pass-through nodes that carry a container's boundary pad.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) enum ProxyRole {
    Input(String),
    Output(String),
}

/// A graph vertex. Nodes live in the [`Graph`](super::Graph) arena and refer
/// to their pads, parent and children by handle.
pub(super) struct Node {
    pub(super) name: String,
    pub(super) operation: Option<Box<dyn Operation>>,
    /// Declaration order: the operation's pads, then boundary pads added when
    /// proxies are requested.
    pub(super) pads: Vec<PadKey>,
    pub(super) parent: Option<NodeKey>,
    pub(super) children: Vec<NodeKey>,
    pub(super) is_graph: bool,
    pub(super) cache: Option<NodeCache>,
    pub(super) passthrough: bool,
    pub(super) dont_cache: bool,
    pub(super) have_rect: Rect,
    pub(super) valid_have_rect: bool,
    pub(super) redirects: Vec<Redirect>,
    pub(super) proxy: Option<ProxyRole>,
}

impl Node {
    pub(super) fn new(name: String, operation: Option<Box<dyn Operation>>, dont_cache: bool) -> Self {
        Self {
            name,
            operation,
            pads: Vec::new(),
            parent: None,
            children: Vec::new(),
            is_graph: false,
            cache: None,
            passthrough: false,
            dont_cache,
            have_rect: Rect::empty(),
            valid_have_rect: false,
            redirects: Vec::new(),
            proxy: None,
        }
    }
    pub(super) fn operation_name(&self) -> Option<&'static str> {
        self.operation.as_ref().map(|op| op.name())
    }
    /// Name used in log messages.
    pub(super) fn debug_name(&self) -> String {
        match (self.name.is_empty(), self.operation_name()) {
            (false, _) => self.name.clone(),
            (true, Some(op)) => op.to_owned(),
            (true, None) => String::from("graph"),
        }
    }
}

struct CacheLevel {
    buffer: Buffer,
    valid: Region,
}

/// Results a node has already computed, per mipmap level, together with the
/// region of each level that is known to be up to date.
pub struct NodeCache {
    extent: Rect,
    tile_size: u32,
    levels: BTreeMap<u32, CacheLevel>,
}

impl NodeCache {
    pub(super) fn new(extent: Rect, tile_size: u32) -> Self {
        Self {
            extent,
            tile_size,
            levels: BTreeMap::new(),
        }
    }
    pub fn extent(&self) -> Rect {
        self.extent
    }
    /// Follow the node's bounding box. Valid regions outside the new extent
    /// are dropped.
    pub(super) fn set_extent(&mut self, extent: Rect) {
        if extent == self.extent {
            return;
        }
        self.extent = extent;
        for level in self.levels.values_mut() {
            level.buffer = level.buffer.with_extent(extent);
            let mut kept = Region::new();
            for r in level.valid.rects() {
                kept.add(&r.intersect(&extent));
            }
            level.valid = kept;
        }
    }
    /// The storage for `level`, created on first use.
    pub fn buffer(&mut self, level: u32) -> Buffer {
        let extent = self.extent;
        let tile_size = self.tile_size;
        self.levels
            .entry(level)
            .or_insert_with(|| CacheLevel {
                buffer: Buffer::with_tile_size(extent, tile_size),
                valid: Region::new(),
            })
            .buffer
            .clone()
    }
    /// Mark `rect` at `level` as holding up to date results.
    pub fn computed(&mut self, rect: &Rect, level: u32) {
        let extent = self.extent;
        self.buffer(level);
        if let Some(l) = self.levels.get_mut(&level) {
            l.valid.add(&rect.intersect(&extent));
        }
    }
    /// The nearest level at or below `level` whose valid region covers `rect`.
    pub fn valid_level(&self, rect: &Rect, level: u32) -> Option<u32> {
        self.levels
            .range(..=level)
            .rev()
            .find(|(_, l)| l.valid.contains_rect(rect))
            .map(|(level, _)| *level)
    }
    pub fn is_valid(&self, rect: &Rect, level: u32) -> bool {
        self.valid_level(rect, level).is_some()
    }
    /// Forget `rect` at every level, optionally clearing the pixels too.
    pub(super) fn invalidate(&mut self, rect: &Rect, clear: bool) {
        for level in self.levels.values_mut() {
            level.valid.subtract(rect);
            if clear {
                level.buffer.clear(rect);
            }
        }
    }
}

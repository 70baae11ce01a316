use std::collections::HashMap;

use super::NodeKey;
use crate::buffer::Buffer;
use crate::rect::Rect;
use crate::value::Value;

/// Scratch state for one node during one evaluation pass.
///
/// The evaluator stages producer outputs here under the consuming pad's name,
/// the operation reads them with [`NodeContext::get_source`] and writes its
/// result into a buffer from [`NodeContext::get_target`]. The context is
/// dropped as soon as its result has been handed on.
#[derive(Debug)]
pub struct NodeContext {
    node: NodeKey,
    pub(super) need_rect: Rect,
    pub(super) result_rect: Rect,
    pub(super) level: u32,
    pub(super) cached: bool,
    values: HashMap<String, Value>,
    /// What this node needs from each input, from `get_required_for_output`
    pub(super) input_requests: HashMap<String, Rect>,
    /// The node cache storage at `level`, if results may be kept
    pub(super) cache: Option<Buffer>,
    tile_size: u32,
}

impl NodeContext {
    pub(super) fn new(node: NodeKey, tile_size: u32) -> Self {
        Self {
            node,
            need_rect: Rect::empty(),
            result_rect: Rect::empty(),
            level: 0,
            cached: false,
            values: HashMap::new(),
            input_requests: HashMap::new(),
            cache: None,
            tile_size,
        }
    }
    pub fn node(&self) -> NodeKey {
        self.node
    }
    /// The region the consumers asked for.
    pub fn need_rect(&self) -> Rect {
        self.need_rect
    }
    /// The region being computed, a superset of [`NodeContext::need_rect`].
    pub fn result_rect(&self) -> Rect {
        self.result_rect
    }
    pub fn level(&self) -> u32 {
        self.level
    }
    /// The region this node asked of the producer on `pad`.
    pub fn required_for(&self, pad: &str) -> Option<Rect> {
        self.input_requests.get(pad).copied()
    }

    pub fn set_object(&mut self, name: &str, value: impl Into<Value>) {
        self.values.insert(name.to_owned(), value.into());
    }
    pub fn get_object(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
    /// Release every staged value.
    pub fn purge(&mut self) {
        self.values.clear();
    }

    /// An aliasing view of the buffer staged on `pad`, limited to the region
    /// this node requested from it.
    pub fn get_source(&self, pad: &str) -> Option<Buffer> {
        match self.values.get(pad) {
            Some(Value::Buffer(buffer)) => Some(match self.input_requests.get(pad) {
                Some(required) => buffer.sub_buffer(required),
                None => buffer.clone(),
            }),
            Some(other) => {
                log::warn!("Context property `{pad}` holds a {:?}, not a buffer", other.kind());
                None
            }
            None => None,
        }
    }

    /// The buffer to write `pad`'s result into. It is a view of the node cache
    /// when the node may cache and the cache covers the result, otherwise a
    /// fresh buffer. Either way it is staged as `pad`.
    pub fn get_target(&mut self, pad: &str) -> Buffer {
        let result = self.result_rect;
        let target = if result.is_empty() {
            Buffer::empty()
        } else {
            match &self.cache {
                Some(cache) if cache.extent().contains(&result) => cache.sub_buffer(&result),
                _ => Buffer::with_tile_size(result, self.tile_size),
            }
        };
        self.set_object(pad, target.clone());
        target
    }

    /// The staged output buffer for `pad`, if any.
    pub fn output(&self, pad: &str) -> Option<Buffer> {
        match self.values.get(pad) {
            Some(Value::Buffer(buffer)) => Some(buffer.clone()),
            _ => None,
        }
    }
}

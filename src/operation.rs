//! The contract between the graph evaluator and the operations bound to nodes.
//!
//! Everything the evaluator needs from an operation goes through [`Operation`]:
//! geometry queries ([`Operation::get_bounding_box`],
//! [`Operation::get_required_for_output`], [`Operation::get_cached_region`],
//! [`Operation::get_invalidated_by_change`]), hit testing and
//! [`Operation::process`]. Operations only see their producers through a
//! [`GeometryContext`] and their buffers through a
//! [`NodeContext`](crate::graph::NodeContext); they never hold node handles.

use downcast_rs::{impl_downcast, Downcast};

use crate::buffer::BufferError;
use crate::graph::{GraphError, NodeContext, SubgraphBuilder};
use crate::rect::Rect;
use crate::value::{PropertyError, PropertySpec, Value};

/// The small closed set of operation shapes. The kind decides which standard
/// pads a node gets and the default geometry behaviour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// `output` only
    Source,
    /// `input` and `output`
    Filter,
    /// `input`, `aux` and `output`
    Composer,
    /// `input` only
    Sink,
    /// No pads of its own; builds children and exposes them through proxies
    Meta,
}

const SOURCE_PADS: &[PropertySpec] = &[PropertySpec::output_pad("output")];
const FILTER_PADS: &[PropertySpec] = &[
    PropertySpec::input_pad("input"),
    PropertySpec::output_pad("output"),
];
const COMPOSER_PADS: &[PropertySpec] = &[
    PropertySpec::input_pad("input"),
    PropertySpec::input_pad("aux"),
    PropertySpec::output_pad("output"),
];
const SINK_PADS: &[PropertySpec] = &[PropertySpec::input_pad("input")];

impl OperationKind {
    /// Pads every operation of this kind has, in declaration order.
    pub fn standard_pads(&self) -> &'static [PropertySpec] {
        match self {
            OperationKind::Source => SOURCE_PADS,
            OperationKind::Filter => FILTER_PADS,
            OperationKind::Composer => COMPOSER_PADS,
            OperationKind::Sink => SINK_PADS,
            OperationKind::Meta => &[],
        }
    }
}

/// Bounding boxes of the producers connected to a node, keyed by input pad.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeometryContext {
    sources: Vec<(String, Rect)>,
}

impl GeometryContext {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_source(mut self, pad: &str, bounding_box: Rect) -> Self {
        self.sources.push((pad.to_owned(), bounding_box));
        self
    }
    /// The bounding box of the producer on `pad`, or `None` if nothing is
    /// connected.
    pub fn source_bounding_box(&self, pad: &str) -> Option<Rect> {
        self.sources
            .iter()
            .find(|(name, _)| name == pad)
            .map(|(_, rect)| *rect)
    }
    pub fn has_source(&self, pad: &str) -> bool {
        self.source_bounding_box(pad).is_some()
    }
}

/// Result of hit testing a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Detect {
    /// This node is responsible for the point
    Hit,
    /// Nothing here
    Miss,
    /// Ask the producers on these pads in order, falling back to the node's
    /// own bounding box
    Sources(&'static [&'static str]),
}

#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    #[error("The operation `{operation}` failed: {reason}")]
    Failed {
        operation: &'static str,
        reason: String,
    },
    #[error("Nothing was staged on the input pad `{0}`.")]
    MissingInput(String),
    #[error("The node does not exist. The Node may have been freed already.")]
    NodeNotFound,
    #[error("Reading or writing pixels failed: {0}")]
    Buffer(#[from] BufferError),
}

/// The dispatch contract of an operation bound to a node.
///
/// Only [`Operation::name`], [`Operation::kind`] and [`Operation::process`]
/// are required. The geometry defaults follow the kind: filters and sinks
/// cover their `input`, composers the union of `input` and `aux`, and sources
/// must override [`Operation::get_bounding_box`].
pub trait Operation: Downcast + Send {
    /// Registry name, e.g. `"crop"`.
    fn name(&self) -> &'static str;
    fn kind(&self) -> OperationKind;
    /// Properties beyond the kind's standard pads. Entries with a pad
    /// direction become extra pads.
    fn properties(&self) -> &'static [PropertySpec] {
        &[]
    }
    fn get_property(&self, _name: &str) -> Option<Value> {
        None
    }
    fn set_property(&mut self, name: &str, _value: Value) -> Result<(), PropertyError> {
        Err(PropertyError::NoSuchProperty(name.to_owned()))
    }
    /// Called before every evaluation pass that includes this node.
    fn prepare(&mut self) {}
    /// The largest region this operation can ever produce.
    fn get_bounding_box(&self, sources: &GeometryContext) -> Rect {
        match self.kind() {
            OperationKind::Filter | OperationKind::Sink => sources
                .source_bounding_box("input")
                .unwrap_or_else(Rect::empty),
            OperationKind::Composer => {
                let input = sources.source_bounding_box("input");
                let aux = sources.source_bounding_box("aux");
                match (input, aux) {
                    (Some(i), Some(a)) => i.bounding_box(&a),
                    (Some(r), None) | (None, Some(r)) => r,
                    (None, None) => Rect::empty(),
                }
            }
            OperationKind::Source | OperationKind::Meta => Rect::empty(),
        }
    }
    /// The region of `input_pad` needed to produce `roi` of the output.
    /// Neighbourhood and geometric operations must round outward.
    fn get_required_for_output(
        &self,
        _input_pad: &str,
        roi: &Rect,
        _sources: &GeometryContext,
    ) -> Rect {
        *roi
    }
    /// The region to compute and keep when `roi` is requested.
    fn get_cached_region(&self, roi: &Rect, _sources: &GeometryContext) -> Rect {
        *roi
    }
    /// The part of the output made stale when `region` of `input_pad` changes.
    fn get_invalidated_by_change(&self, _input_pad: &str, region: &Rect) -> Rect {
        *region
    }
    /// Hit testing at a point in level 0 coordinates.
    fn detect(&self, x: i32, y: i32, bounding_box: &Rect) -> Detect {
        match self.kind() {
            OperationKind::Filter => Detect::Sources(&["input"]),
            OperationKind::Composer => Detect::Sources(&["aux", "input"]),
            _ if bounding_box.contains_point(x, y) => Detect::Hit,
            _ => Detect::Miss,
        }
    }
    /// Operations that never keep their results in the node cache.
    fn no_cache(&self) -> bool {
        false
    }
    /// Compute `result` of `output_pad` at mipmap `level`, reading inputs with
    /// [`NodeContext::get_source`] and writing into
    /// [`NodeContext::get_target`].
    fn process(
        &mut self,
        context: &mut NodeContext,
        output_pad: &str,
        result: &Rect,
        level: u32,
    ) -> Result<(), ProcessError>;
    /// Meta operations build their children here when attached to a node.
    fn construct(&mut self, _builder: &mut SubgraphBuilder<'_>) -> Result<(), GraphError> {
        Ok(())
    }
}
impl_downcast!(Operation);

/// Convenience for operations that fail with a message.
pub fn failed(operation: &'static str, reason: impl Into<String>) -> ProcessError {
    ProcessError::Failed {
        operation,
        reason: reason.into(),
    }
}

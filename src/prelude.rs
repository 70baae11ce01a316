pub use crate::buffer::{Buffer, Pixel, PixelFormat};
pub use crate::graph::{BlitFlags, Graph, GraphSettings, NodeContext, NodeKey};
pub use crate::operation::{GeometryContext, Operation, OperationKind, ProcessError};
pub use crate::ops::{
    BoxBlur, BufferSink, BufferSource, Checkerboard, ColorOverlay, ColorSource, Crop, DropShadow,
    Noise, Nop, Opacity, Over, Sampler, Translate,
};
pub use crate::rect::{Rect, Region};
pub use crate::resources::{AnyData, Resources, ResourcesSettings};
pub use crate::value::{Color, Value};
pub use crate::PixgraphError;

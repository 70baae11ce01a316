//! Built in operations.
//!
//! These cover each [`OperationKind`](crate::operation::OperationKind): a few
//! sources, filters with different geometry (identity, crop, outward rounded
//! translation, margin expanding blur), a composer, a sink and a meta
//! operation built from the others. All of them are registered in
//! [`Resources`] under their [`Operation::name`].

use crate::buffer::Pixel;
use crate::graph::NodeContext;
use crate::operation::Operation;
use crate::rect::Rect;
use crate::resources::Resources;

mod composer;
mod filter;
mod meta;
mod source;

pub use composer::Over;
pub use filter::{BoxBlur, BufferSink, ColorOverlay, Crop, Nop, Opacity, Sampler, Translate};
pub use meta::DropShadow;
pub use source::{BufferSource, Checkerboard, ColorSource, Noise};

/// The pixels of `rect` staged on `pad`, transparent where nothing is.
pub(crate) fn read_source(context: &NodeContext, pad: &str, rect: &Rect) -> Vec<Pixel> {
    match context.get_source(pad) {
        Some(buffer) => buffer.read_rect(rect),
        None => vec![[0.0; 4]; rect.area() as usize],
    }
}

pub(crate) fn register_builtin(resources: &mut Resources) {
    fn register<Op: Operation + Default>(resources: &mut Resources) {
        let name = Op::default().name();
        resources.register::<Op>(name);
    }
    register::<Nop>(resources);
    register::<ColorSource>(resources);
    register::<Checkerboard>(resources);
    register::<Noise>(resources);
    register::<BufferSource>(resources);
    register::<BufferSink>(resources);
    register::<Crop>(resources);
    register::<Translate>(resources);
    register::<BoxBlur>(resources);
    register::<Opacity>(resources);
    register::<ColorOverlay>(resources);
    register::<Over>(resources);
    register::<DropShadow>(resources);
}

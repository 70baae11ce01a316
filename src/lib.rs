//! # Pixgraph - demand driven image processing graph
//!
//! Pixgraph evaluates graphs of image operations lazily: asking a node for a
//! rectangle of its output computes only the parts of its producers that the
//! rectangle depends on, and keeps results in per node caches so unchanged
//! regions are never computed twice.
//!
//! ## Architecture
//!
//! The core of Pixgraph is the [`Graph`] struct and the [`Operation`] trait.
//! Nodes in a [`Graph`] are bound to anything that implements [`Operation`],
//! or act as containers for a subgraph of child nodes. Nodes are connected
//! through named pads: an input pad has at most one producer, an output pad
//! may feed any number of consumers, and connections that would create a
//! cycle are refused.
//!
//! Evaluation goes through [`Graph::blit`], [`Graph::apply`] or
//! [`Graph::process`]. A request is walked from the requested node towards its
//! producers, each operation widening or reshaping the region it needs through
//! [`Operation::get_required_for_output`], and then computed producers first.
//! Changing a property or a connection invalidates exactly the cached regions
//! that depended on it.
//!
//! All rectangles are in full resolution pixel coordinates. A mipmap `level`
//! is passed to operations as a hint for how much detail is needed.
//!
//! ## Example
//!
//! ```
//! use pixgraph::prelude::*;
//! let mut graph = Graph::new(GraphSettings::default());
//! let checker = graph.push(Checkerboard::new(2, 2, Color::BLACK, Color::WHITE));
//! let blur = graph.push(BoxBlur::new(1.0));
//! let crop = graph.push(Crop::new(Rect::new(0, 0, 8, 8)));
//! graph.link_many(&[checker, blur, crop])?;
//! assert_eq!(graph.get_bounding_box(crop), Rect::new(0, 0, 8, 8));
//! let mut pixels = vec![0u8; 8 * 8 * 4];
//! graph.blit(crop, 1.0, &Rect::new(0, 0, 8, 8), PixelFormat::RgbaU8, &mut pixels, BlitFlags::CACHE)?;
//! # Ok::<(), pixgraph::PixgraphError>(())
//! ```

#![deny(rustdoc::broken_intra_doc_links)] // error if there are broken intra-doc links

// Import these for docs
#[allow(unused_imports)]
use graph::Graph;
#[allow(unused_imports)]
use operation::Operation;

pub mod buffer;
pub mod graph;
pub mod inspection;
pub mod operation;
pub mod ops;
pub mod prelude;
pub mod rect;
pub mod resources;
pub mod value;

#[derive(thiserror::Error, Debug)]
pub enum PixgraphError {
    #[error("There was an error adding or removing connections between nodes: {0}")]
    ConnectionError(#[from] graph::ConnectionError),
    #[error("There was an error freeing a node: {0}")]
    FreeError(#[from] graph::FreeError),
    #[error("There was an error changing the graph: {0}")]
    GraphError(#[from] graph::GraphError),
    #[error("There was an error with a property: {0}")]
    PropertyError(#[from] value::PropertyError),
    #[error("There was an error evaluating the graph: {0}")]
    ProcessError(#[from] operation::ProcessError),
    #[error("There was an error reading or writing pixels: {0}")]
    BufferError(#[from] buffer::BufferError),
    #[error("Resources error : {0}")]
    ResourcesError(#[from] resources::ResourcesError),
}

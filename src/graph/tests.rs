use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::traversal::{EvalState, GraphTraversal};
use super::visitor::{bfs_path, dfs_path, DependencySource};
use super::{BlitFlags, ConnectionError, GraphError, NodeContext, PadKey};
use crate::operation::failed;
use crate::ops::read_source;
use crate::prelude::*;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Copies its input and counts how often it ran.
#[derive(Default)]
struct Counting {
    runs: Arc<AtomicUsize>,
}

impl Counting {
    fn new() -> (Self, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        (
            Self {
                runs: Arc::clone(&runs),
            },
            runs,
        )
    }
}

impl Operation for Counting {
    fn name(&self) -> &'static str {
        "counting"
    }
    fn kind(&self) -> OperationKind {
        OperationKind::Filter
    }
    fn process(
        &mut self,
        context: &mut NodeContext,
        output_pad: &str,
        result: &Rect,
        _level: u32,
    ) -> Result<(), ProcessError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let pixels = read_source(context, "input", result);
        context.get_target(output_pad).write_rect(result, &pixels);
        Ok(())
    }
}

struct Failing;

impl Operation for Failing {
    fn name(&self) -> &'static str {
        "failing"
    }
    fn kind(&self) -> OperationKind {
        OperationKind::Filter
    }
    fn process(
        &mut self,
        _context: &mut NodeContext,
        _output_pad: &str,
        _result: &Rect,
        _level: u32,
    ) -> Result<(), ProcessError> {
        Err(failed("failing", "always fails"))
    }
}

fn blit_pixel(graph: &mut Graph, node: NodeKey, x: i32, y: i32, flags: BlitFlags) -> [u8; 4] {
    let mut pixel = [0u8; 4];
    graph
        .blit(node, 1.0, &Rect::new(x, y, 1, 1), PixelFormat::RgbaU8, &mut pixel, flags)
        .unwrap();
    pixel
}

fn blit_rgba(graph: &mut Graph, node: NodeKey, scale: f64, roi: Rect) -> Vec<u8> {
    let mut pixels = vec![0u8; roi.area() as usize * 4];
    graph
        .blit(node, scale, &roi, PixelFormat::RgbaU8, &mut pixels, BlitFlags::DEFAULT)
        .unwrap();
    pixels
}

#[test]
fn property_change_invalidates_and_unchanged_graph_reuses_cache() {
    init_logging();
    let mut graph = Graph::new(GraphSettings::default());
    let color = graph.push(ColorSource::new(Color::rgb(1.0, 0.0, 1.0)));
    let (counting, runs) = Counting::new();
    let counting = graph.push(counting);
    let crop = graph.push(Crop::new(Rect::new(0, 0, 4, 4)));
    let sink = graph.push(BufferSink::default());
    graph.link_many(&[color, counting, crop, sink]).unwrap();

    assert_eq!(blit_pixel(&mut graph, crop, 0, 0, BlitFlags::DEFAULT), [255, 0, 255, 255]);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    graph
        .set_property(color, "value", Color::rgb(0.0, 0.0, 1.0))
        .unwrap();
    assert_eq!(blit_pixel(&mut graph, crop, 0, 0, BlitFlags::DEFAULT), [0, 0, 255, 255]);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    assert_eq!(blit_pixel(&mut graph, crop, 0, 0, BlitFlags::DEFAULT), [0, 0, 255, 255]);
    assert_eq!(runs.load(Ordering::SeqCst), 2, "unchanged request was recomputed");

    graph.process(sink).unwrap();
    let written = graph.operation::<BufferSink>(sink).unwrap().buffer().unwrap();
    assert_eq!(written.extent(), Rect::new(0, 0, 4, 4));
    assert_eq!(written.get_pixel(3, 3), [0.0, 0.0, 1.0, 1.0]);
}

#[test]
fn neighbourhood_margin_expands_request() {
    let mut graph = Graph::new(GraphSettings::default());
    let color = graph.push(ColorSource::default());
    let blur = graph.push(BoxBlur::new(2.0));
    graph.link(color, blur).unwrap();
    let roi = Rect::new(10, 10, 5, 5);
    assert_eq!(
        graph.get_required_for_output(blur, "input", &roi),
        Rect::new(8, 8, 9, 9)
    );

    let mut traversal = GraphTraversal::build(&graph, blur);
    traversal.prepare(&mut graph);
    traversal.prepare_request(&mut graph, &roi, 0);
    assert_eq!(traversal.need_rect(blur), Some(roi));
    assert_eq!(traversal.need_rect(color), Some(Rect::new(8, 8, 9, 9)));
}

#[test]
fn blur_of_flat_color_is_flat() {
    let mut graph = Graph::new(GraphSettings::default());
    let color = graph.push(ColorSource::new(Color::rgb(0.0, 1.0, 0.0)));
    let blur = graph.push(BoxBlur::new(3.0));
    graph.link(color, blur).unwrap();
    let pixels = blit_rgba(&mut graph, blur, 1.0, Rect::new(-5, -5, 10, 10));
    assert!(pixels.chunks_exact(4).all(|p| p == [0, 255, 0, 255]));
}

#[test]
fn passthrough_is_transparent() {
    init_logging();
    let mut graph = Graph::new(GraphSettings::default());
    let checker = graph.push(Checkerboard::new(3, 3, Color::BLACK, Color::WHITE));
    let crop = graph.push(Crop::new(Rect::new(0, 0, 20, 20)));
    let blur = graph.push(BoxBlur::new(2.0));
    graph.link_many(&[checker, crop, blur]).unwrap();
    let roi = Rect::new(5, 5, 10, 10);

    let blurred = blit_rgba(&mut graph, blur, 1.0, roi);
    graph.set_passthrough(blur, true);
    assert!(graph.passthrough(blur));
    assert_eq!(graph.get_bounding_box(blur), graph.get_bounding_box(crop));
    assert_eq!(
        graph.get_cached_region(blur, &roi),
        graph.get_cached_region(crop, &roi)
    );
    let through = blit_rgba(&mut graph, blur, 1.0, roi);
    let direct = blit_rgba(&mut graph, crop, 1.0, roi);
    assert_eq!(through, direct);
    assert_ne!(through, blurred);

    graph.set_passthrough(blur, false);
    assert_eq!(blit_rgba(&mut graph, blur, 1.0, roi), blurred);
}

#[test]
fn input_pad_holds_one_connection() {
    let mut graph = Graph::new(GraphSettings::default());
    let a = graph.push(ColorSource::new(Color::WHITE));
    let b = graph.push(ColorSource::new(Color::BLACK));
    let filter = graph.push(Opacity::new(1.0));
    graph.link(a, filter).unwrap();
    graph.link(b, filter).unwrap();
    // Reconnecting the same pads is a no op
    graph.link(b, filter).unwrap();

    let input = graph.pad(filter, "input").unwrap();
    assert_eq!(graph.pad_info(input).unwrap().connections().len(), 1);
    assert_eq!(graph.get_producer(filter, "input"), Some((b, String::from("output"))));
    assert!(graph.get_consumers(a, "output").is_empty());
    assert_eq!(graph.get_consumers(b, "output"), vec![(filter, String::from("input"))]);

    assert!(graph.disconnect(filter, "input").unwrap());
    assert!(!graph.disconnect(filter, "input").unwrap());
    assert_eq!(graph.get_producer(filter, "input"), None);
    assert_eq!(graph.inspection().edges.len(), 0);
}

#[test]
fn connect_reports_bad_pads() {
    let mut graph = Graph::new(GraphSettings::default());
    let a = graph.push(ColorSource::default());
    let b = graph.push(Opacity::default());
    assert!(matches!(
        graph.connect(b, "nonexistent", a, "output"),
        Err(ConnectionError::PadNotFound { .. })
    ));
    assert_eq!(
        graph.connect(a, "output", b, "output"),
        Err(ConnectionError::NotAnInput(String::from("output")))
    );
    assert_eq!(
        graph.connect(b, "input", b, "output"),
        Err(ConnectionError::SameNode)
    );
}

#[test]
fn cycles_are_refused_and_traversal_terminates() {
    let mut graph = Graph::new(GraphSettings::default());
    let a = graph.push(Nop);
    let b = graph.push(Nop);
    let c = graph.push(Nop);
    graph.link_many(&[a, b, c]).unwrap();
    assert_eq!(graph.link(c, a), Err(ConnectionError::WouldCreateCycle));
    assert_eq!(graph.get_producer(a, "input"), None);

    // Force a cycle below the checked API
    let a_input = graph.pad(a, "input").unwrap();
    let c_output = graph.pad(c, "output").unwrap();
    graph.pad_connect(a_input, c_output).unwrap();
    let dfs = dfs_path(&graph, c);
    let bfs = bfs_path(&graph, c);
    assert!(dfs.len() <= 3);
    assert!(bfs.len() <= 3);
}

#[test]
fn diamond_is_evaluated_once() {
    init_logging();
    let mut graph = Graph::new(GraphSettings::default());
    let color = graph.push(ColorSource::new(Color::rgb(1.0, 0.0, 0.0)));
    let (counting, runs) = Counting::new();
    let shared = graph.push(counting);
    let left = graph.push(Opacity::new(0.5));
    let right = graph.push(Translate::new(0.0, 0.0));
    let over = graph.push(Over);
    graph.link(color, shared).unwrap();
    graph.link(shared, left).unwrap();
    graph.link(shared, right).unwrap();
    graph.connect(over, "input", left, "output").unwrap();
    graph.connect(over, "aux", right, "output").unwrap();

    let dfs = dfs_path(&graph, over);
    let bfs = bfs_path(&graph, over);
    assert_eq!(dfs.len(), 5);
    assert_eq!(bfs.len(), 5);
    assert_eq!(dfs.first(), Some(&color));
    assert_eq!(dfs.last(), Some(&over));
    assert_eq!(bfs.first(), Some(&over));
    assert_eq!(bfs.last(), Some(&color));
    let position = |path: &[NodeKey], node| path.iter().position(|n| *n == node).unwrap();
    for (producer, consumer) in [(color, shared), (shared, left), (shared, right), (left, over), (right, over)] {
        assert!(position(&dfs, producer) < position(&dfs, consumer));
        assert!(position(&bfs, producer) > position(&bfs, consumer));
    }

    let pixels = blit_rgba(&mut graph, over, 1.0, Rect::new(0, 0, 3, 3));
    assert!(pixels.chunks_exact(4).all(|p| p == [255, 0, 0, 255]));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn traversal_walks_the_state_machine() {
    let mut graph = Graph::new(GraphSettings::default());
    let color = graph.push(ColorSource::default());
    let crop = graph.push(Crop::new(Rect::new(0, 0, 2, 2)));
    graph.link(color, crop).unwrap();
    let mut traversal = GraphTraversal::build(&graph, crop);
    assert_eq!(traversal.state(color), EvalState::DependenciesResolved);
    traversal.prepare(&mut graph);
    traversal.prepare_request(&mut graph, &Rect::new(0, 0, 2, 2), 0);
    let output = traversal.process(&mut graph, 0).unwrap();
    assert_eq!(output.extent(), Rect::new(0, 0, 2, 2));
    assert_eq!(traversal.state(color), EvalState::ContextDestroyed);
    assert_eq!(traversal.state(crop), EvalState::ContextDestroyed);
}

#[test]
fn processing_errors_reach_the_caller() {
    let mut graph = Graph::new(GraphSettings::default());
    let color = graph.push(ColorSource::default());
    let failing = graph.push(Failing);
    graph.link(color, failing).unwrap();
    let mut pixel = [0u8; 4];
    let result = graph.blit(
        failing,
        1.0,
        &Rect::new(0, 0, 1, 1),
        PixelFormat::RgbaU8,
        &mut pixel,
        BlitFlags::DEFAULT,
    );
    assert!(matches!(result, Err(ProcessError::Failed { operation: "failing", .. })));
}

#[test]
fn meta_operation_redirects_properties() {
    init_logging();
    let mut graph = Graph::new(GraphSettings::default());
    let color = graph.push(ColorSource::new(Color::WHITE));
    let crop = graph.push(Crop::new(Rect::new(0, 0, 4, 4)));
    let shadow = graph.push(DropShadow::default());
    graph.link_many(&[color, crop, shadow]).unwrap();

    let translate = graph
        .children(shadow)
        .iter()
        .copied()
        .find(|c| graph.operation_name(*c) == Some("translate"))
        .unwrap();
    assert_eq!(graph.get_property(translate, "x"), Some(Value::Float(20.0)));
    assert_eq!(graph.get_bounding_box(shadow), Rect::new(0, 0, 34, 34));

    graph.set_property(shadow, "x", 5.0).unwrap();
    graph.set_property(shadow, "y", 5.0).unwrap();
    graph.set_property(shadow, "radius", 1.0).unwrap();
    assert_eq!(graph.get_property(shadow, "x"), Some(Value::Float(5.0)));
    assert_eq!(graph.get_property(translate, "x"), Some(Value::Float(5.0)));
    assert_eq!(graph.get_bounding_box(shadow), Rect::new(0, 0, 10, 10));

    assert_eq!(graph.get_producer(shadow, "input"), Some((crop, String::from("output"))));
    assert_eq!(graph.get_consumers(crop, "output"), vec![(shadow, String::from("input"))]);
    // The input sits on top of its shadow
    assert_eq!(blit_pixel(&mut graph, shadow, 1, 1, BlitFlags::DEFAULT), [255, 255, 255, 255]);
    // Outside the input only the half transparent black shadow is left
    let [_, _, _, alpha] = blit_pixel(&mut graph, shadow, 8, 8, BlitFlags::DEFAULT);
    assert!(alpha > 0 && alpha < 255);
}

#[test]
fn freeing_a_meta_node_frees_its_children() {
    let mut graph = Graph::new(GraphSettings::default());
    let color = graph.push(ColorSource::default());
    let before = graph.num_nodes();
    let shadow = graph.push(DropShadow::default());
    graph.link(color, shadow).unwrap();
    assert!(graph.is_graph(shadow));
    assert!(graph.num_nodes() > before + 1);
    graph.free_node(shadow).unwrap();
    assert_eq!(graph.num_nodes(), before);
    assert!(graph.get_consumers(color, "output").is_empty());
    assert_eq!(graph.free_node(shadow), Err(super::FreeError::NodeNotFound));
}

#[test]
fn detect_follows_bounding_boxes() {
    let mut graph = Graph::new(GraphSettings::default());
    let bottom = graph.push(ColorSource::new(Color::WHITE));
    let bottom_crop = graph.push(Crop::new(Rect::new(0, 0, 4, 4)));
    let top = graph.push(ColorSource::new(Color::BLACK));
    let top_crop = graph.push(Crop::new(Rect::new(10, 10, 4, 4)));
    let over = graph.push(Over);
    graph.link(bottom, bottom_crop).unwrap();
    graph.link(top, top_crop).unwrap();
    graph.connect(over, "input", bottom_crop, "output").unwrap();
    graph.connect(over, "aux", top_crop, "output").unwrap();

    assert_eq!(graph.detect(over, 1, 1), Some(bottom));
    assert_eq!(graph.detect(over, 11, 11), Some(top));
    assert_eq!(graph.detect(over, 7, 7), Some(over));
    assert_eq!(graph.detect(over, 50, 50), None);

    graph.set_passthrough(top_crop, true);
    assert_eq!(graph.detect(over, 1, 1), Some(top));
}

#[test]
fn blit_flags_control_the_cache() {
    let mut graph = Graph::new(GraphSettings::default());
    let color = graph.push(ColorSource::new(Color::rgb(1.0, 0.0, 0.0)));
    let crop = graph.push(Crop::new(Rect::new(0, 0, 4, 4)));
    graph.link(color, crop).unwrap();
    let dirty = BlitFlags::CACHE | BlitFlags::DIRTY;

    // Nothing rendered yet
    assert_eq!(blit_pixel(&mut graph, crop, 0, 0, dirty), [0, 0, 0, 0]);
    assert_eq!(blit_pixel(&mut graph, crop, 0, 0, BlitFlags::CACHE), [255, 0, 0, 255]);
    assert!(graph.cache(crop).unwrap().is_valid(&Rect::new(0, 0, 1, 1), 0));

    graph
        .set_property(color, "value", Color::rgb(0.0, 1.0, 0.0))
        .unwrap();
    assert!(!graph.cache(crop).unwrap().is_valid(&Rect::new(0, 0, 1, 1), 0));
    // Stale, but that is what was asked for
    assert_eq!(blit_pixel(&mut graph, crop, 0, 0, dirty), [255, 0, 0, 255]);
    assert_eq!(blit_pixel(&mut graph, crop, 0, 0, BlitFlags::CACHE), [0, 255, 0, 255]);
    assert_eq!(blit_pixel(&mut graph, crop, 0, 0, dirty), [0, 255, 0, 255]);
}

#[test]
fn scaled_blit_samples_nearest() {
    let mut graph = Graph::new(GraphSettings::default());
    let checker = graph.push(Checkerboard::new(1, 1, Color::BLACK, Color::WHITE));
    let crop = graph.push(Crop::new(Rect::new(0, 0, 8, 8)));
    graph.link(checker, crop).unwrap();
    let pixels = blit_rgba(&mut graph, crop, 2.0, Rect::new(0, 0, 4, 4));
    let at = |x: usize, y: usize| pixels[(y * 4 + x) * 4];
    // Each source pixel covers a 2x2 block
    assert_eq!(at(0, 0), 0);
    assert_eq!(at(1, 1), 0);
    assert_eq!(at(2, 0), 255);
    assert_eq!(at(3, 1), 255);
    assert_eq!(at(2, 2), 0);
}

#[test]
fn mipmap_level_from_scale() {
    assert_eq!(super::level_from_scale(1.0, 8), 0);
    assert_eq!(super::level_from_scale(0.5, 8), 1);
    assert_eq!(super::level_from_scale(0.3, 8), 1);
    assert_eq!(super::level_from_scale(0.25, 8), 2);
    assert_eq!(super::level_from_scale(0.001, 3), 3);

    let mut graph = Graph::new(GraphSettings {
        mipmap_rendering: true,
        ..Default::default()
    });
    let color = graph.push(ColorSource::new(Color::WHITE));
    let crop = graph.push(Crop::new(Rect::new(0, 0, 8, 8)));
    graph.link(color, crop).unwrap();
    let pixels = blit_rgba(&mut graph, crop, 0.5, Rect::new(0, 0, 4, 4));
    assert!(pixels.chunks_exact(4).all(|p| p == [255, 255, 255, 255]));
    // Results computed at level 1 serve a later level 1 request
    assert!(graph.cache(color).unwrap().is_valid(&Rect::new(0, 0, 8, 8), 1));
    assert!(!graph.cache(color).unwrap().is_valid(&Rect::new(0, 0, 8, 8), 0));
}

#[test]
fn dont_cache_keeps_nodes_cacheless() {
    let mut graph = Graph::new(GraphSettings {
        cache_by_default: false,
        ..Default::default()
    });
    let color = graph.push(ColorSource::default());
    let blur = graph.push(BoxBlur::new(1.0));
    graph.link(color, blur).unwrap();
    assert!(graph.dont_cache(color));
    blit_rgba(&mut graph, blur, 1.0, Rect::new(0, 0, 2, 2));
    assert!(graph.cache(color).is_none());
    assert!(graph.cache(blur).is_none());

    graph.set_dont_cache(blur, false);
    blit_rgba(&mut graph, blur, 1.0, Rect::new(0, 0, 2, 2));
    assert!(graph.cache(blur).is_some());
}

#[test]
fn replacing_an_operation_keeps_connections() {
    let mut graph = Graph::new(GraphSettings::default());
    let color = graph.push(ColorSource::new(Color::WHITE));
    let filter = graph.push(Opacity::new(0.0));
    let crop = graph.push(Crop::new(Rect::new(0, 0, 2, 2)));
    graph.link_many(&[color, filter, crop]).unwrap();
    assert_eq!(blit_pixel(&mut graph, crop, 0, 0, BlitFlags::DEFAULT), [0, 0, 0, 0]);

    graph.set_operation(filter, Translate::new(0.0, 0.0)).unwrap();
    assert_eq!(graph.operation_name(filter), Some("translate"));
    assert_eq!(graph.get_producer(filter, "input"), Some((color, String::from("output"))));
    assert_eq!(graph.get_consumers(filter, "output"), vec![(crop, String::from("input"))]);
    assert_eq!(blit_pixel(&mut graph, crop, 0, 0, BlitFlags::DEFAULT), [255, 255, 255, 255]);
}

#[test]
fn named_operations_come_from_the_registry() {
    let mut graph = Graph::new(GraphSettings::default());
    let crop = graph.push_named("crop");
    assert_eq!(graph.operation_name(crop), Some("crop"));
    let unknown = graph.push_named("does-not-exist");
    assert_eq!(graph.operation_name(unknown), Some("nop"));
    assert_eq!(
        graph.try_push_named("does-not-exist"),
        Err(GraphError::UnknownOperation(String::from("does-not-exist")))
    );
    let shadow = graph.try_push_named("dropshadow").unwrap();
    assert!(graph.is_graph(shadow));
    graph.set_node_name(crop, "frame");
    assert_eq!(graph.node_name(crop), Some("frame"));
    assert!(matches!(
        graph.set_property(crop, "radius", 2.0),
        Err(GraphError::Property(_))
    ));
}

#[test]
fn containment_is_exclusive() {
    let mut graph = Graph::new(GraphSettings::default());
    let parent = graph.push_graph_node();
    let other = graph.push_graph_node();
    graph.set_dont_cache(parent, true);
    let child = graph.new_child(parent, Opacity::default()).unwrap();
    assert!(graph.dont_cache(child));
    assert_eq!(graph.parent(child), Some(parent));
    assert_eq!(graph.add_child(other, child), Err(GraphError::AlreadyHasParent));
    assert_eq!(graph.remove_child(other, child), Err(GraphError::NotAChild));
    graph.remove_child(parent, child).unwrap();
    assert!(!graph.is_graph(parent));
    graph.add_child(other, child).unwrap();
    assert_eq!(graph.children(other), &[child]);
}

#[test]
fn containers_route_through_proxies() {
    let mut graph = Graph::new(GraphSettings::default());
    let color = graph.push(ColorSource::new(Color::rgb(0.0, 0.0, 1.0)));
    let container = graph.push_graph_node();
    let inner = graph.new_child(container, Crop::new(Rect::new(0, 0, 3, 3))).unwrap();
    let input = graph.get_input_proxy(container, "input").unwrap();
    let output = graph.get_output_proxy(container, "output").unwrap();
    assert_eq!(graph.get_input_proxy(container, "input").unwrap(), input);
    graph.link_many(&[input, inner, output]).unwrap();
    graph.link(color, container).unwrap();

    assert_eq!(graph.get_bounding_box(container), Rect::new(0, 0, 3, 3));
    assert_eq!(blit_pixel(&mut graph, container, 2, 2, BlitFlags::DEFAULT), [0, 0, 255, 255]);
    assert_eq!(graph.detect(container, 1, 1), Some(color));

    let inspection = graph.inspection();
    let node = inspection.node(container).unwrap();
    assert_eq!(node.operation, None);
    assert!(node.pads.iter().all(|p| p.proxied));
    assert_eq!(inspection.top_level().count(), 2);
}

/// A white 4x4 square through `filter`, composited over black.
fn square_over_black(graph: &mut Graph, filter: impl Operation) -> (NodeKey, NodeKey) {
    let white = graph.push(ColorSource::new(Color::WHITE));
    let crop = graph.push(Crop::new(Rect::new(0, 0, 4, 4)));
    let filter = graph.push(filter);
    let black = graph.push(ColorSource::new(Color::BLACK));
    let over = graph.push(Over);
    graph.link_many(&[white, crop, filter]).unwrap();
    graph.connect(over, "input", black, "output").unwrap();
    graph.connect(over, "aux", filter, "output").unwrap();
    (filter, over)
}

#[test]
fn new_producers_invalidate_cached_consumers() {
    init_logging();
    let mut graph = Graph::new(GraphSettings::default());
    let white = graph.push(ColorSource::new(Color::WHITE));
    let over = graph.push(Over);
    graph.connect(over, "input", white, "output").unwrap();
    assert_eq!(blit_pixel(&mut graph, over, 0, 0, BlitFlags::DEFAULT), [255, 255, 255, 255]);

    let red = graph.push(ColorSource::new(Color::rgb(1.0, 0.0, 0.0)));
    graph.connect(over, "aux", red, "output").unwrap();
    assert_eq!(blit_pixel(&mut graph, over, 0, 0, BlitFlags::DEFAULT), [255, 0, 0, 255]);

    assert!(graph.disconnect(over, "aux").unwrap());
    assert_eq!(blit_pixel(&mut graph, over, 0, 0, BlitFlags::DEFAULT), [255, 255, 255, 255]);

    let blue = graph.push(ColorSource::new(Color::rgb(0.0, 0.0, 1.0)));
    graph.connect(over, "aux", blue, "output").unwrap();
    assert_eq!(blit_pixel(&mut graph, over, 0, 0, BlitFlags::DEFAULT), [0, 0, 255, 255]);
    graph.free_node(blue).unwrap();
    assert_eq!(blit_pixel(&mut graph, over, 0, 0, BlitFlags::DEFAULT), [255, 255, 255, 255]);
}

#[test]
fn passthrough_toggle_invalidates_grown_border() {
    init_logging();
    let mut graph = Graph::new(GraphSettings::default());
    let (blur, over) = square_over_black(&mut graph, BoxBlur::new(2.0));
    // 2x2 of the 5x5 window covers the square
    let border = [41, 41, 41, 255];
    assert_eq!(blit_pixel(&mut graph, over, -1, -1, BlitFlags::DEFAULT), border);

    graph.set_passthrough(blur, true);
    assert_eq!(graph.get_bounding_box(blur), Rect::new(0, 0, 4, 4));
    assert_eq!(blit_pixel(&mut graph, over, -1, -1, BlitFlags::DEFAULT), [0, 0, 0, 255]);

    graph.set_passthrough(blur, false);
    assert_eq!(graph.get_bounding_box(blur), Rect::new(-2, -2, 8, 8));
    assert_eq!(blit_pixel(&mut graph, over, -1, -1, BlitFlags::DEFAULT), border);
}

#[test]
fn replacing_an_operation_invalidates_its_new_extent() {
    init_logging();
    let mut graph = Graph::new(GraphSettings::default());
    let (filter, over) = square_over_black(&mut graph, Opacity::new(1.0));
    assert_eq!(blit_pixel(&mut graph, over, -1, -1, BlitFlags::DEFAULT), [0, 0, 0, 255]);
    assert_eq!(blit_pixel(&mut graph, over, 1, 1, BlitFlags::DEFAULT), [255, 255, 255, 255]);

    graph.set_operation(filter, BoxBlur::new(2.0)).unwrap();
    assert_eq!(blit_pixel(&mut graph, over, -1, -1, BlitFlags::DEFAULT), [41, 41, 41, 255]);

    let mut fresh = Graph::new(GraphSettings::default());
    let (_, fresh_over) = square_over_black(&mut fresh, BoxBlur::new(2.0));
    let roi = Rect::new(-3, -3, 10, 10);
    assert_eq!(blit_rgba(&mut graph, over, 1.0, roi), blit_rgba(&mut fresh, fresh_over, 1.0, roi));
}

#[test]
fn pad_dependencies_follow_connections() {
    let mut graph = Graph::new(GraphSettings::default());
    let color = graph.push(ColorSource::default());
    let left = graph.push(Opacity::new(0.5));
    let right = graph.push(Translate::new(1.0, 0.0));
    let over = graph.push(Over);
    graph.link(color, left).unwrap();
    graph.link(color, right).unwrap();
    graph.connect(over, "input", left, "output").unwrap();
    graph.connect(over, "aux", right, "output").unwrap();

    let pad = |node: NodeKey, name: &str| graph.pad(node, name).unwrap();
    let color_out = pad(color, "output");
    let left_in = pad(left, "input");
    let left_out = pad(left, "output");
    let right_in = pad(right, "input");
    let right_out = pad(right, "output");
    let over_in = pad(over, "input");
    let over_aux = pad(over, "aux");
    let over_out = pad(over, "output");

    let depends_on = |p: PadKey| <Graph as DependencySource<PadKey>>::depends_on(&graph, p);
    assert_eq!(depends_on(over_in), vec![left_out]);
    assert_eq!(depends_on(over_aux), vec![right_out]);
    assert_eq!(depends_on(left_in), vec![color_out]);
    let mut over_inputs = depends_on(over_out);
    over_inputs.sort();
    let mut expected = vec![over_in, over_aux];
    expected.sort();
    assert_eq!(over_inputs, expected);
    assert_eq!(depends_on(left_out), vec![left_in]);
    assert!(depends_on(color_out).is_empty());

    let edges = [
        (color_out, left_in),
        (color_out, right_in),
        (left_in, left_out),
        (right_in, right_out),
        (left_out, over_in),
        (right_out, over_aux),
        (over_in, over_out),
        (over_aux, over_out),
    ];
    let dfs = dfs_path(&graph, over_out);
    let bfs = bfs_path(&graph, over_out);
    assert_eq!(dfs.len(), 8);
    assert_eq!(bfs.len(), 8);
    assert_eq!(dfs.last(), Some(&over_out));
    assert_eq!(bfs.first(), Some(&over_out));
    let position = |path: &[PadKey], p: PadKey| path.iter().position(|q| *q == p).unwrap();
    for (producer, consumer) in edges {
        assert!(position(&dfs, producer) < position(&dfs, consumer));
        assert!(position(&bfs, consumer) < position(&bfs, producer));
    }
}

#[test]
fn translate_sampler_is_an_enum_property() {
    let mut graph = Graph::new(GraphSettings::default());
    let pixels = [[1.0, 1.0, 1.0, 1.0], [0.0, 0.0, 0.0, 1.0]];
    let source = graph.push(BufferSource::new(Buffer::from_pixels(Rect::new(0, 0, 2, 1), &pixels)));
    let translate = graph.push(Translate::new(0.5, 0.0));
    graph.link(source, translate).unwrap();

    let spec = Translate::default()
        .properties()
        .iter()
        .find(|p| p.name == "sampler")
        .copied()
        .unwrap();
    assert_eq!(spec.enum_values, &["nearest", "linear"]);
    assert_eq!(graph.get_property(translate, "sampler"), Some(Value::Enum("linear".into())));

    let [gray, ..] = blit_pixel(&mut graph, translate, 1, 0, BlitFlags::DEFAULT);
    assert!(gray > 0 && gray < 255);

    graph
        .set_property(translate, "sampler", Value::Enum("nearest".into()))
        .unwrap();
    assert_eq!(blit_pixel(&mut graph, translate, 0, 0, BlitFlags::DEFAULT), [255, 255, 255, 255]);
    assert_eq!(blit_pixel(&mut graph, translate, 1, 0, BlitFlags::DEFAULT), [0, 0, 0, 255]);

    assert!(graph.set_property(translate, "sampler", "cubic").is_err());
    assert_eq!(graph.get_property(translate, "sampler"), Some(Value::Enum("nearest".into())));
}

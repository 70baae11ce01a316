//! Single input operations.

use super::read_source;
use crate::buffer::{Buffer, Pixel};
use crate::graph::NodeContext;
use crate::operation::{GeometryContext, Operation, OperationKind, ProcessError};
use crate::rect::Rect;
use crate::value::{Color, PropertyError, PropertySpec, Value, ValueKind};

/// Forwards `input` to `output`. Used for subgraph proxies.
#[derive(Clone, Copy, Debug, Default)]
pub struct Nop;

impl Operation for Nop {
    fn name(&self) -> &'static str {
        "nop"
    }
    fn kind(&self) -> OperationKind {
        OperationKind::Filter
    }
    fn no_cache(&self) -> bool {
        true
    }
    fn process(
        &mut self,
        context: &mut NodeContext,
        output_pad: &str,
        _result: &Rect,
        _level: u32,
    ) -> Result<(), ProcessError> {
        let input = context
            .get_source("input")
            .ok_or_else(|| ProcessError::MissingInput(String::from("input")))?;
        context.set_object(output_pad, input);
        Ok(())
    }
}

/// Limits its input to a rectangle.
#[derive(Clone, Debug)]
pub struct Crop {
    rect: Rect,
}

impl Crop {
    pub fn new(rect: Rect) -> Self {
        Self { rect }
    }
}

impl Default for Crop {
    fn default() -> Self {
        Self::new(Rect::new(0, 0, 10, 10))
    }
}

impl Operation for Crop {
    fn name(&self) -> &'static str {
        "crop"
    }
    fn kind(&self) -> OperationKind {
        OperationKind::Filter
    }
    fn properties(&self) -> &'static [PropertySpec] {
        const PROPERTIES: &[PropertySpec] = &[
            PropertySpec::new("x", ValueKind::Float),
            PropertySpec::new("y", ValueKind::Float),
            PropertySpec::new("width", ValueKind::Float),
            PropertySpec::new("height", ValueKind::Float),
        ];
        PROPERTIES
    }
    fn get_property(&self, name: &str) -> Option<Value> {
        let v = match name {
            "x" => self.rect.x,
            "y" => self.rect.y,
            "width" => self.rect.width,
            "height" => self.rect.height,
            _ => return None,
        };
        Some(Value::Float(f64::from(v)))
    }
    fn set_property(&mut self, name: &str, value: Value) -> Result<(), PropertyError> {
        let field = match name {
            "x" => &mut self.rect.x,
            "y" => &mut self.rect.y,
            "width" => &mut self.rect.width,
            "height" => &mut self.rect.height,
            _ => return Err(PropertyError::NoSuchProperty(name.to_owned())),
        };
        *field = value.into_float(name)?.round() as i32;
        Ok(())
    }
    fn get_bounding_box(&self, sources: &GeometryContext) -> Rect {
        sources
            .source_bounding_box("input")
            .map_or_else(Rect::empty, |input| input.intersect(&self.rect))
    }
    fn get_invalidated_by_change(&self, _input_pad: &str, region: &Rect) -> Rect {
        region.intersect(&self.rect)
    }
    fn no_cache(&self) -> bool {
        true
    }
    fn process(
        &mut self,
        context: &mut NodeContext,
        output_pad: &str,
        result: &Rect,
        _level: u32,
    ) -> Result<(), ProcessError> {
        let output = context
            .get_source("input")
            .map_or_else(Buffer::empty, |input| {
                input.sub_buffer(&result.intersect(&self.rect))
            });
        context.set_object(output_pad, output);
        Ok(())
    }
}

/// How [`Translate`] resamples fractional offsets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Sampler {
    Nearest,
    #[default]
    Linear,
}

impl Sampler {
    const NAMES: &'static [&'static str] = &["nearest", "linear"];

    fn name(self) -> &'static str {
        match self {
            Sampler::Nearest => "nearest",
            Sampler::Linear => "linear",
        }
    }
    fn from_name(name: &str) -> Self {
        match name {
            "nearest" => Sampler::Nearest,
            _ => Sampler::Linear,
        }
    }
}

/// Moves its input by a possibly fractional offset. Fractional offsets are
/// resampled with the `sampler` property, bilinear by default.
#[derive(Clone, Debug, Default)]
pub struct Translate {
    x: f64,
    y: f64,
    sampler: Sampler,
}

impl Translate {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            sampler: Sampler::Linear,
        }
    }
    pub fn with_sampler(self, sampler: Sampler) -> Self {
        Self { sampler, ..self }
    }
    fn is_integral(&self) -> bool {
        self.x.fract() == 0.0 && self.y.fract() == 0.0
    }
    /// Where `region` of the input lands in the output.
    fn forward(&self, region: &Rect) -> Rect {
        if region.is_empty() || region.is_infinite_plane() {
            return *region;
        }
        if self.is_integral() {
            return region.translate(self.x as i32, self.y as i32);
        }
        // A bilinear tap reaches one pixel back
        Rect::from_bounds_outward(
            region.x as f64 + self.x - 1.0,
            region.y as f64 + self.y - 1.0,
            region.x2() as f64 + self.x,
            region.y2() as f64 + self.y,
        )
    }
}

/// The pixel of `pixels`, laid out over `area`, that contains the continuous
/// position `sx`,`sy`.
fn sample_nearest(pixels: &[Pixel], area: &Rect, sx: f64, sy: f64) -> Pixel {
    let (x, y) = (sx.floor() as i64, sy.floor() as i64);
    if x < i64::from(area.x) || y < i64::from(area.y) || x >= area.x2() || y >= area.y2() {
        return [0.0; 4];
    }
    pixels[((y - i64::from(area.y)) * i64::from(area.width) + (x - i64::from(area.x))) as usize]
}

/// Bilinear sample of `pixels`, laid out over `area`, at the continuous
/// position `sx`,`sy` where pixel centres sit at `n + 0.5`.
fn sample_bilinear(pixels: &[Pixel], area: &Rect, sx: f64, sy: f64) -> Pixel {
    let fx = sx - 0.5;
    let fy = sy - 0.5;
    let x0 = fx.floor();
    let y0 = fy.floor();
    let (wx, wy) = ((fx - x0) as f32, (fy - y0) as f32);
    let at = |x: i64, y: i64| -> Pixel {
        if x < i64::from(area.x) || y < i64::from(area.y) || x >= area.x2() || y >= area.y2() {
            return [0.0; 4];
        }
        let index = (y - i64::from(area.y)) * i64::from(area.width) + (x - i64::from(area.x));
        pixels[index as usize]
    };
    let (x0, y0) = (x0 as i64, y0 as i64);
    let p00 = at(x0, y0);
    let p10 = at(x0 + 1, y0);
    let p01 = at(x0, y0 + 1);
    let p11 = at(x0 + 1, y0 + 1);
    let mut out = [0.0; 4];
    for c in 0..4 {
        let top = p00[c] + (p10[c] - p00[c]) * wx;
        let bottom = p01[c] + (p11[c] - p01[c]) * wx;
        out[c] = top + (bottom - top) * wy;
    }
    out
}

impl Operation for Translate {
    fn name(&self) -> &'static str {
        "translate"
    }
    fn kind(&self) -> OperationKind {
        OperationKind::Filter
    }
    fn properties(&self) -> &'static [PropertySpec] {
        const PROPERTIES: &[PropertySpec] = &[
            PropertySpec::new("x", ValueKind::Float).blurb("Horizontal offset"),
            PropertySpec::new("y", ValueKind::Float).blurb("Vertical offset"),
            PropertySpec::new("sampler", ValueKind::Enum)
                .blurb("Resampling of fractional offsets")
                .enum_values(Sampler::NAMES),
        ];
        PROPERTIES
    }
    fn get_property(&self, name: &str) -> Option<Value> {
        match name {
            "x" => Some(Value::Float(self.x)),
            "y" => Some(Value::Float(self.y)),
            "sampler" => Some(Value::Enum(self.sampler.name().to_owned())),
            _ => None,
        }
    }
    fn set_property(&mut self, name: &str, value: Value) -> Result<(), PropertyError> {
        match name {
            "x" => self.x = value.into_float(name)?,
            "y" => self.y = value.into_float(name)?,
            "sampler" => self.sampler = Sampler::from_name(value.into_enum(name, Sampler::NAMES)?),
            _ => return Err(PropertyError::NoSuchProperty(name.to_owned())),
        }
        Ok(())
    }
    fn get_bounding_box(&self, sources: &GeometryContext) -> Rect {
        sources
            .source_bounding_box("input")
            .map_or_else(Rect::empty, |input| self.forward(&input))
    }
    fn get_required_for_output(&self, _input_pad: &str, roi: &Rect, _sources: &GeometryContext) -> Rect {
        if roi.is_empty() || roi.is_infinite_plane() {
            return *roi;
        }
        if self.is_integral() {
            return roi.translate(-(self.x as i32), -(self.y as i32));
        }
        Rect::from_bounds_outward(
            roi.x as f64 - self.x,
            roi.y as f64 - self.y,
            roi.x2() as f64 - self.x + 1.0,
            roi.y2() as f64 - self.y + 1.0,
        )
    }
    fn get_invalidated_by_change(&self, _input_pad: &str, region: &Rect) -> Rect {
        self.forward(region)
    }
    fn process(
        &mut self,
        context: &mut NodeContext,
        output_pad: &str,
        result: &Rect,
        _level: u32,
    ) -> Result<(), ProcessError> {
        let area = self.get_required_for_output("input", result, &GeometryContext::new());
        let source = read_source(context, "input", &area);
        let mut pixels = Vec::with_capacity(result.area() as usize);
        for y in result.y..(result.y2() as i32) {
            for x in result.x..(result.x2() as i32) {
                let sx = f64::from(x) + 0.5 - self.x;
                let sy = f64::from(y) + 0.5 - self.y;
                pixels.push(match self.sampler {
                    Sampler::Nearest => sample_nearest(&source, &area, sx, sy),
                    Sampler::Linear => sample_bilinear(&source, &area, sx, sy),
                });
            }
        }
        context.get_target(output_pad).write_rect(result, &pixels);
        Ok(())
    }
}

/// Separable box blur. The margin is the radius rounded up, so the window is
/// `2 * margin + 1` pixels wide.
#[derive(Clone, Debug)]
pub struct BoxBlur {
    radius: f64,
}

impl BoxBlur {
    pub fn new(radius: f64) -> Self {
        Self {
            radius: radius.max(0.0),
        }
    }
    /// Pixels of context needed on each side.
    pub fn margin(&self) -> i32 {
        self.radius.ceil() as i32
    }
}

impl Default for BoxBlur {
    fn default() -> Self {
        Self::new(4.0)
    }
}

impl Operation for BoxBlur {
    fn name(&self) -> &'static str {
        "box-blur"
    }
    fn kind(&self) -> OperationKind {
        OperationKind::Filter
    }
    fn properties(&self) -> &'static [PropertySpec] {
        const PROPERTIES: &[PropertySpec] =
            &[PropertySpec::new("radius", ValueKind::Float).blurb("Radius of the square window")];
        PROPERTIES
    }
    fn get_property(&self, name: &str) -> Option<Value> {
        (name == "radius").then_some(Value::Float(self.radius))
    }
    fn set_property(&mut self, name: &str, value: Value) -> Result<(), PropertyError> {
        match name {
            "radius" => self.radius = value.into_float(name)?.max(0.0),
            _ => return Err(PropertyError::NoSuchProperty(name.to_owned())),
        }
        Ok(())
    }
    fn get_bounding_box(&self, sources: &GeometryContext) -> Rect {
        sources
            .source_bounding_box("input")
            .map_or_else(Rect::empty, |input| input.expand_uniform(self.margin()))
    }
    fn get_required_for_output(&self, _input_pad: &str, roi: &Rect, _sources: &GeometryContext) -> Rect {
        roi.expand_uniform(self.margin())
    }
    fn get_invalidated_by_change(&self, _input_pad: &str, region: &Rect) -> Rect {
        region.expand_uniform(self.margin())
    }
    fn process(
        &mut self,
        context: &mut NodeContext,
        output_pad: &str,
        result: &Rect,
        _level: u32,
    ) -> Result<(), ProcessError> {
        let m = self.margin();
        let area = result.expand_uniform(m);
        let source = read_source(context, "input", &area);
        let window = (2 * m + 1) as f32;
        let (aw, ah) = (area.width as usize, area.height as usize);
        let (rw, rh) = (result.width as usize, result.height as usize);
        let m = m as usize;

        // Horizontal pass over every row of the context area
        let mut horizontal = vec![[0.0f32; 4]; rw * ah];
        for row in 0..ah {
            let line = &source[row * aw..(row + 1) * aw];
            for x in 0..rw {
                let mut sum = [0.0f32; 4];
                for p in &line[x..x + 2 * m + 1] {
                    for c in 0..4 {
                        sum[c] += p[c];
                    }
                }
                horizontal[row * rw + x] = sum.map(|v| v / window);
            }
        }
        let mut pixels = vec![[0.0f32; 4]; rw * rh];
        for y in 0..rh {
            for x in 0..rw {
                let mut sum = [0.0f32; 4];
                for row in y..y + 2 * m + 1 {
                    let p = horizontal[row * rw + x];
                    for c in 0..4 {
                        sum[c] += p[c];
                    }
                }
                pixels[y * rw + x] = sum.map(|v| v / window);
            }
        }
        context.get_target(output_pad).write_rect(result, &pixels);
        Ok(())
    }
}

/// Scales every channel of its premultiplied input.
#[derive(Clone, Debug)]
pub struct Opacity {
    value: f64,
}

impl Opacity {
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

impl Default for Opacity {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Operation for Opacity {
    fn name(&self) -> &'static str {
        "opacity"
    }
    fn kind(&self) -> OperationKind {
        OperationKind::Filter
    }
    fn properties(&self) -> &'static [PropertySpec] {
        const PROPERTIES: &[PropertySpec] =
            &[PropertySpec::new("value", ValueKind::Float).blurb("Global opacity value")];
        PROPERTIES
    }
    fn get_property(&self, name: &str) -> Option<Value> {
        (name == "value").then_some(Value::Float(self.value))
    }
    fn set_property(&mut self, name: &str, value: Value) -> Result<(), PropertyError> {
        match name {
            "value" => self.value = value.into_float(name)?,
            _ => return Err(PropertyError::NoSuchProperty(name.to_owned())),
        }
        Ok(())
    }
    fn process(
        &mut self,
        context: &mut NodeContext,
        output_pad: &str,
        result: &Rect,
        _level: u32,
    ) -> Result<(), ProcessError> {
        let factor = self.value as f32;
        let pixels: Vec<Pixel> = read_source(context, "input", result)
            .into_iter()
            .map(|p| p.map(|c| c * factor))
            .collect();
        context.get_target(output_pad).write_rect(result, &pixels);
        Ok(())
    }
}

/// Replaces the color of its input, keeping the alpha.
#[derive(Clone, Debug)]
pub struct ColorOverlay {
    color: Color,
}

impl ColorOverlay {
    pub fn new(color: Color) -> Self {
        Self { color }
    }
}

impl Default for ColorOverlay {
    fn default() -> Self {
        Self::new(Color::BLACK)
    }
}

impl Operation for ColorOverlay {
    fn name(&self) -> &'static str {
        "color-overlay"
    }
    fn kind(&self) -> OperationKind {
        OperationKind::Filter
    }
    fn properties(&self) -> &'static [PropertySpec] {
        const PROPERTIES: &[PropertySpec] = &[PropertySpec::new("value", ValueKind::Color)];
        PROPERTIES
    }
    fn get_property(&self, name: &str) -> Option<Value> {
        (name == "value").then_some(Value::Color(self.color))
    }
    fn set_property(&mut self, name: &str, value: Value) -> Result<(), PropertyError> {
        match name {
            "value" => self.color = value.into_color(name)?,
            _ => return Err(PropertyError::NoSuchProperty(name.to_owned())),
        }
        Ok(())
    }
    fn process(
        &mut self,
        context: &mut NodeContext,
        output_pad: &str,
        result: &Rect,
        _level: u32,
    ) -> Result<(), ProcessError> {
        let Color { r, g, b, .. } = self.color;
        let pixels: Vec<Pixel> = read_source(context, "input", result)
            .into_iter()
            .map(|[_, _, _, a]| [r * a, g * a, b * a, a])
            .collect();
        context.get_target(output_pad).write_rect(result, &pixels);
        Ok(())
    }
}

/// Writes its input into a buffer that can be read back after
/// [`Graph::process`](crate::graph::Graph::process).
#[derive(Clone, Debug, Default)]
pub struct BufferSink {
    buffer: Option<Buffer>,
}

impl BufferSink {
    /// A sink writing into `buffer`. Only the part inside the buffer's extent
    /// is written.
    pub fn new(buffer: Buffer) -> Self {
        Self {
            buffer: Some(buffer),
        }
    }
    /// The buffer written by the last evaluation.
    pub fn buffer(&self) -> Option<&Buffer> {
        self.buffer.as_ref()
    }
}

impl Operation for BufferSink {
    fn name(&self) -> &'static str {
        "buffer-sink"
    }
    fn kind(&self) -> OperationKind {
        OperationKind::Sink
    }
    fn properties(&self) -> &'static [PropertySpec] {
        const PROPERTIES: &[PropertySpec] = &[PropertySpec::new("buffer", ValueKind::Buffer)];
        PROPERTIES
    }
    fn get_property(&self, name: &str) -> Option<Value> {
        match name {
            "buffer" => self.buffer.clone().map(Value::Buffer),
            _ => None,
        }
    }
    fn set_property(&mut self, name: &str, value: Value) -> Result<(), PropertyError> {
        match name {
            "buffer" => self.buffer = Some(value.into_buffer(name)?),
            _ => return Err(PropertyError::NoSuchProperty(name.to_owned())),
        }
        Ok(())
    }
    fn no_cache(&self) -> bool {
        true
    }
    fn process(
        &mut self,
        context: &mut NodeContext,
        _output_pad: &str,
        result: &Rect,
        _level: u32,
    ) -> Result<(), ProcessError> {
        let input = context
            .get_source("input")
            .ok_or_else(|| ProcessError::MissingInput(String::from("input")))?;
        let target = self.buffer.get_or_insert_with(|| Buffer::new(*result));
        target.copy_from(&input, result);
        Ok(())
    }
}

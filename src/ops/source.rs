//! Operations producing pixels without inputs.

use crate::buffer::{Buffer, Pixel};
use crate::graph::NodeContext;
use crate::operation::{GeometryContext, Operation, OperationKind, ProcessError};
use crate::rect::Rect;
use crate::value::{Color, PropertyError, PropertySpec, Value, ValueKind};

/// Fills the infinite plane with one color.
#[derive(Clone, Debug)]
pub struct ColorSource {
    color: Color,
}

impl ColorSource {
    pub fn new(color: Color) -> Self {
        Self { color }
    }
}

impl Default for ColorSource {
    fn default() -> Self {
        Self::new(Color::BLACK)
    }
}

impl Operation for ColorSource {
    fn name(&self) -> &'static str {
        "color"
    }
    fn kind(&self) -> OperationKind {
        OperationKind::Source
    }
    fn properties(&self) -> &'static [PropertySpec] {
        const PROPERTIES: &[PropertySpec] =
            &[PropertySpec::new("value", ValueKind::Color).blurb("The color to render")];
        PROPERTIES
    }
    fn get_property(&self, name: &str) -> Option<Value> {
        match name {
            "value" => Some(Value::Color(self.color)),
            _ => None,
        }
    }
    fn set_property(&mut self, name: &str, value: Value) -> Result<(), PropertyError> {
        match name {
            "value" => self.color = value.into_color(name)?,
            _ => return Err(PropertyError::NoSuchProperty(name.to_owned())),
        }
        Ok(())
    }
    fn get_bounding_box(&self, _sources: &GeometryContext) -> Rect {
        Rect::infinite_plane()
    }
    fn process(
        &mut self,
        context: &mut NodeContext,
        output_pad: &str,
        result: &Rect,
        _level: u32,
    ) -> Result<(), ProcessError> {
        context.get_target(output_pad).fill(result, self.color.to_pixel());
        Ok(())
    }
}

/// Alternating cells of two colors covering the infinite plane.
#[derive(Clone, Debug)]
pub struct Checkerboard {
    cell_width: i64,
    cell_height: i64,
    x_offset: i64,
    y_offset: i64,
    color1: Color,
    color2: Color,
}

impl Default for Checkerboard {
    fn default() -> Self {
        Self {
            cell_width: 16,
            cell_height: 16,
            x_offset: 0,
            y_offset: 0,
            color1: Color::BLACK,
            color2: Color::WHITE,
        }
    }
}

impl Checkerboard {
    pub fn new(cell_width: i64, cell_height: i64, color1: Color, color2: Color) -> Self {
        Self {
            cell_width: cell_width.max(1),
            cell_height: cell_height.max(1),
            color1,
            color2,
            ..Self::default()
        }
    }
    fn color_at(&self, x: i32, y: i32) -> Pixel {
        let cx = (i64::from(x) - self.x_offset).div_euclid(self.cell_width);
        let cy = (i64::from(y) - self.y_offset).div_euclid(self.cell_height);
        if (cx + cy).rem_euclid(2) == 0 {
            self.color1.to_pixel()
        } else {
            self.color2.to_pixel()
        }
    }
}

impl Operation for Checkerboard {
    fn name(&self) -> &'static str {
        "checkerboard"
    }
    fn kind(&self) -> OperationKind {
        OperationKind::Source
    }
    fn properties(&self) -> &'static [PropertySpec] {
        const PROPERTIES: &[PropertySpec] = &[
            PropertySpec::new("x", ValueKind::Int).blurb("Cell width"),
            PropertySpec::new("y", ValueKind::Int).blurb("Cell height"),
            PropertySpec::new("x-offset", ValueKind::Int),
            PropertySpec::new("y-offset", ValueKind::Int),
            PropertySpec::new("color1", ValueKind::Color),
            PropertySpec::new("color2", ValueKind::Color),
        ];
        PROPERTIES
    }
    fn get_property(&self, name: &str) -> Option<Value> {
        Some(match name {
            "x" => Value::Int(self.cell_width),
            "y" => Value::Int(self.cell_height),
            "x-offset" => Value::Int(self.x_offset),
            "y-offset" => Value::Int(self.y_offset),
            "color1" => Value::Color(self.color1),
            "color2" => Value::Color(self.color2),
            _ => return None,
        })
    }
    fn set_property(&mut self, name: &str, value: Value) -> Result<(), PropertyError> {
        match name {
            "x" => self.cell_width = value.into_int(name)?.max(1),
            "y" => self.cell_height = value.into_int(name)?.max(1),
            "x-offset" => self.x_offset = value.into_int(name)?,
            "y-offset" => self.y_offset = value.into_int(name)?,
            "color1" => self.color1 = value.into_color(name)?,
            "color2" => self.color2 = value.into_color(name)?,
            _ => return Err(PropertyError::NoSuchProperty(name.to_owned())),
        }
        Ok(())
    }
    fn get_bounding_box(&self, _sources: &GeometryContext) -> Rect {
        Rect::infinite_plane()
    }
    fn process(
        &mut self,
        context: &mut NodeContext,
        output_pad: &str,
        result: &Rect,
        _level: u32,
    ) -> Result<(), ProcessError> {
        let mut pixels = Vec::with_capacity(result.area() as usize);
        for y in result.y..(result.y2() as i32) {
            for x in result.x..(result.x2() as i32) {
                pixels.push(self.color_at(x, y));
            }
        }
        context.get_target(output_pad).write_rect(result, &pixels);
        Ok(())
    }
}

/// Grey value noise. Every pixel is seeded from its coordinates, so any
/// region renders the same no matter how it was requested.
#[derive(Clone, Debug, Default)]
pub struct Noise {
    seed: i64,
}

impl Noise {
    pub fn new(seed: i64) -> Self {
        Self { seed }
    }
    fn value_at(&self, x: i32, y: i32) -> f32 {
        let key = (self.seed as u64)
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (u64::from(x as u32) << 32 | u64::from(y as u32));
        fastrand::Rng::with_seed(key).f32()
    }
}

impl Operation for Noise {
    fn name(&self) -> &'static str {
        "noise"
    }
    fn kind(&self) -> OperationKind {
        OperationKind::Source
    }
    fn properties(&self) -> &'static [PropertySpec] {
        const PROPERTIES: &[PropertySpec] = &[PropertySpec::new("seed", ValueKind::Int)];
        PROPERTIES
    }
    fn get_property(&self, name: &str) -> Option<Value> {
        (name == "seed").then_some(Value::Int(self.seed))
    }
    fn set_property(&mut self, name: &str, value: Value) -> Result<(), PropertyError> {
        match name {
            "seed" => self.seed = value.into_int(name)?,
            _ => return Err(PropertyError::NoSuchProperty(name.to_owned())),
        }
        Ok(())
    }
    fn get_bounding_box(&self, _sources: &GeometryContext) -> Rect {
        Rect::infinite_plane()
    }
    fn process(
        &mut self,
        context: &mut NodeContext,
        output_pad: &str,
        result: &Rect,
        _level: u32,
    ) -> Result<(), ProcessError> {
        let mut pixels = Vec::with_capacity(result.area() as usize);
        for y in result.y..(result.y2() as i32) {
            for x in result.x..(result.x2() as i32) {
                let v = self.value_at(x, y);
                pixels.push([v, v, v, 1.0]);
            }
        }
        context.get_target(output_pad).write_rect(result, &pixels);
        Ok(())
    }
}

/// Exposes an existing buffer. The output is a view of that buffer, so it is
/// never copied into the node cache.
#[derive(Clone, Debug, Default)]
pub struct BufferSource {
    buffer: Option<Buffer>,
}

impl BufferSource {
    pub fn new(buffer: Buffer) -> Self {
        Self {
            buffer: Some(buffer),
        }
    }
}

impl Operation for BufferSource {
    fn name(&self) -> &'static str {
        "buffer-source"
    }
    fn kind(&self) -> OperationKind {
        OperationKind::Source
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
    fn get_bounding_box(&self, _sources: &GeometryContext) -> Rect {
        self.buffer.as_ref().map_or_else(Rect::empty, Buffer::extent)
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
        let output = self
            .buffer
            .as_ref()
            .map_or_else(Buffer::empty, |b| b.sub_buffer(result));
        context.set_object(output_pad, output);
        Ok(())
    }
}

use super::{BoxBlur, ColorOverlay, Opacity, Over, Translate};
use crate::graph::{GraphError, NodeContext, SubgraphBuilder};
use crate::operation::{Operation, OperationKind, ProcessError};
use crate::rect::Rect;
use crate::value::{Color, PropertyError, PropertySpec, Value, ValueKind};

/// A blurred, offset shadow under its input, built from smaller operations:
///
/// ```text
/// input ─┬─ color-overlay ─ translate ─ box-blur ─ opacity ── over.input
///        └──────────────────────────────────────────────────── over.aux
/// ```
///
/// The properties are redirected to the children, so changing them on the
/// outer node updates the shadow.
#[derive(Clone, Debug)]
pub struct DropShadow {
    x: f64,
    y: f64,
    radius: f64,
    opacity: f64,
    color: Color,
}

impl Default for DropShadow {
    fn default() -> Self {
        Self {
            x: 20.0,
            y: 20.0,
            radius: 10.0,
            opacity: 0.5,
            color: Color::BLACK,
        }
    }
}

impl DropShadow {
    pub fn new(x: f64, y: f64, radius: f64, opacity: f64) -> Self {
        Self {
            x,
            y,
            radius,
            opacity,
            ..Self::default()
        }
    }
}

impl Operation for DropShadow {
    fn name(&self) -> &'static str {
        "dropshadow"
    }
    fn kind(&self) -> OperationKind {
        OperationKind::Meta
    }
    fn properties(&self) -> &'static [PropertySpec] {
        const PROPERTIES: &[PropertySpec] = &[
            PropertySpec::new("x", ValueKind::Float).blurb("Horizontal shadow offset"),
            PropertySpec::new("y", ValueKind::Float).blurb("Vertical shadow offset"),
            PropertySpec::new("radius", ValueKind::Float),
            PropertySpec::new("opacity", ValueKind::Float),
            PropertySpec::new("color", ValueKind::Color),
        ];
        PROPERTIES
    }
    fn get_property(&self, name: &str) -> Option<Value> {
        Some(match name {
            "x" => Value::Float(self.x),
            "y" => Value::Float(self.y),
            "radius" => Value::Float(self.radius),
            "opacity" => Value::Float(self.opacity),
            "color" => Value::Color(self.color),
            _ => return None,
        })
    }
    fn set_property(&mut self, name: &str, value: Value) -> Result<(), PropertyError> {
        match name {
            "x" => self.x = value.into_float(name)?,
            "y" => self.y = value.into_float(name)?,
            "radius" => self.radius = value.into_float(name)?,
            "opacity" => self.opacity = value.into_float(name)?,
            "color" => self.color = value.into_color(name)?,
            _ => return Err(PropertyError::NoSuchProperty(name.to_owned())),
        }
        Ok(())
    }
    fn construct(&mut self, builder: &mut SubgraphBuilder<'_>) -> Result<(), GraphError> {
        let input = builder.input_proxy("input")?;
        let output = builder.output_proxy("output")?;
        let darken = builder.new_child(ColorOverlay::default())?;
        let translate = builder.new_child(Translate::default())?;
        let blur = builder.new_child(BoxBlur::default())?;
        let opacity = builder.new_child(Opacity::default())?;
        let over = builder.new_child(Over)?;

        builder.link_many(&[input, darken, translate, blur, opacity, over, output])?;
        builder.connect(over, "aux", input, "output")?;

        builder.redirect("color", darken, "value")?;
        builder.redirect("x", translate, "x")?;
        builder.redirect("y", translate, "y")?;
        builder.redirect("radius", blur, "radius")?;
        builder.redirect("opacity", opacity, "value")?;
        Ok(())
    }
    fn process(
        &mut self,
        _context: &mut NodeContext,
        _output_pad: &str,
        _result: &Rect,
        _level: u32,
    ) -> Result<(), ProcessError> {
        // Evaluation goes through the children
        Ok(())
    }
}

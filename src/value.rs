//! Typed property values and the metadata operations use to declare their
//! properties and pads.

use std::path::PathBuf;

use crate::buffer::{Buffer, Pixel};

/// A straight alpha RGBA color in linear light.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize, serde::Deserialize))]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
    /// Premultiplied pixel, as stored in buffers.
    pub fn to_pixel(&self) -> Pixel {
        [self.r * self.a, self.g * self.a, self.b * self.a, self.a]
    }
}

/// The closed set of kinds a property can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    Float,
    String,
    Enum,
    Color,
    Path,
    Buffer,
}

/// A property value. Generic tooling sets and reads properties by name with
/// these; operations keep their own typed fields and convert at the boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    String(String),
    /// The nickname of one variant of an enum property
    Enum(String),
    Color(Color),
    Path(PathBuf),
    Buffer(Buffer),
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PropertyError {
    #[error("There is no property named `{0}` on this node.")]
    NoSuchProperty(String),
    #[error("The property `{name}` holds {expected:?} values but a {found:?} value was given.")]
    WrongKind {
        name: String,
        expected: ValueKind,
        found: ValueKind,
    },
    #[error("`{value}` is not one of the allowed values of the enum property `{name}`.")]
    InvalidEnumValue { name: String, value: String },
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
            Value::Enum(_) => ValueKind::Enum,
            Value::Color(_) => ValueKind::Color,
            Value::Path(_) => ValueKind::Path,
            Value::Buffer(_) => ValueKind::Buffer,
        }
    }

    fn wrong_kind(&self, name: &str, expected: ValueKind) -> PropertyError {
        PropertyError::WrongKind {
            name: name.to_owned(),
            expected,
            found: self.kind(),
        }
    }

    /// Integers widen to floats.
    pub fn into_float(self, name: &str) -> Result<f64, PropertyError> {
        match self {
            Value::Float(v) => Ok(v),
            Value::Int(v) => Ok(v as f64),
            other => Err(other.wrong_kind(name, ValueKind::Float)),
        }
    }
    pub fn into_int(self, name: &str) -> Result<i64, PropertyError> {
        match self {
            Value::Int(v) => Ok(v),
            other => Err(other.wrong_kind(name, ValueKind::Int)),
        }
    }
    pub fn into_color(self, name: &str) -> Result<Color, PropertyError> {
        match self {
            Value::Color(v) => Ok(v),
            other => Err(other.wrong_kind(name, ValueKind::Color)),
        }
    }
    pub fn into_buffer(self, name: &str) -> Result<Buffer, PropertyError> {
        match self {
            Value::Buffer(v) => Ok(v),
            other => Err(other.wrong_kind(name, ValueKind::Buffer)),
        }
    }
    /// Accepts an enum or string value whose text is one of `allowed`.
    pub fn into_enum(self, name: &str, allowed: &[&'static str]) -> Result<&'static str, PropertyError> {
        let text = match self {
            Value::Enum(v) | Value::String(v) => v,
            other => return Err(other.wrong_kind(name, ValueKind::Enum)),
        };
        allowed
            .iter()
            .find(|a| **a == text)
            .copied()
            .ok_or(PropertyError::InvalidEnumValue {
                name: name.to_owned(),
                value: text,
            })
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}
impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}
impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}
impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(value as f64)
    }
}
impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}
impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}
impl From<Color> for Value {
    fn from(value: Color) -> Self {
        Value::Color(value)
    }
}
impl From<PathBuf> for Value {
    fn from(value: PathBuf) -> Self {
        Value::Path(value)
    }
}
impl From<Buffer> for Value {
    fn from(value: Buffer) -> Self {
        Value::Buffer(value)
    }
}

/// Which way data can flow through a pad.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PadDirection {
    pub input: bool,
    pub output: bool,
}

impl PadDirection {
    pub const INPUT: PadDirection = PadDirection {
        input: true,
        output: false,
    };
    pub const OUTPUT: PadDirection = PadDirection {
        input: false,
        output: true,
    };
}

/// Metadata for one property of an operation. Properties that carry a pad
/// direction become pads on the node the operation is attached to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PropertySpec {
    pub name: &'static str,
    pub kind: ValueKind,
    pub pad: Option<PadDirection>,
    pub blurb: &'static str,
    /// Allowed values of an enum property
    pub enum_values: &'static [&'static str],
}

impl PropertySpec {
    pub const fn new(name: &'static str, kind: ValueKind) -> Self {
        Self {
            name,
            kind,
            pad: None,
            blurb: "",
            enum_values: &[],
        }
    }
    /// A buffer input pad.
    pub const fn input_pad(name: &'static str) -> Self {
        Self {
            pad: Some(PadDirection::INPUT),
            ..Self::new(name, ValueKind::Buffer)
        }
    }
    /// A buffer output pad.
    pub const fn output_pad(name: &'static str) -> Self {
        Self {
            pad: Some(PadDirection::OUTPUT),
            ..Self::new(name, ValueKind::Buffer)
        }
    }
    pub const fn blurb(self, blurb: &'static str) -> Self {
        Self { blurb, ..self }
    }
    pub const fn enum_values(self, enum_values: &'static [&'static str]) -> Self {
        Self {
            enum_values,
            ..self
        }
    }
    pub fn is_pad(&self) -> bool {
        self.pad.is_some()
    }
}

use crossframe_common::InstanceId;
use glam::{Mat3, Mat4, Quat, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Text(String),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Quat(Quat),
    Mat3(Mat3),
    Mat4(Mat4),
    /// `None` when the field points at nothing.
    Reference(Option<InstanceId>),
    Array(Vec<FieldValue>),
}

impl FieldValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::U8(_) => "u8",
            Self::I8(_) => "i8",
            Self::U16(_) => "u16",
            Self::I16(_) => "i16",
            Self::U32(_) => "u32",
            Self::I32(_) => "i32",
            Self::U64(_) => "u64",
            Self::I64(_) => "i64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::Bool(_) => "bool",
            Self::Text(_) => "text",
            Self::Vec2(_) => "vec2",
            Self::Vec3(_) => "vec3",
            Self::Vec4(_) => "vec4",
            Self::Quat(_) => "quat",
            Self::Mat3(_) => "mat3",
            Self::Mat4(_) => "mat4",
            Self::Reference(_) => "reference",
            Self::Array(_) => "array",
        }
    }
}

macro_rules! field_value_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }

            impl TryFrom<FieldValue> for $ty {
                type Error = FieldValue;

                fn try_from(value: FieldValue) -> Result<Self, FieldValue> {
                    match value {
                        FieldValue::$variant(v) => Ok(v),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

field_value_conversions! {
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    bool => Bool,
    String => Text,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    Quat => Quat,
    Mat3 => Mat3,
    Mat4 => Mat4,
    Option<InstanceId> => Reference,
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<InstanceId> for FieldValue {
    fn from(id: InstanceId) -> Self {
        Self::Reference(InstanceId::from_raw(id.0))
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(values: Vec<T>) -> Self {
        Self::Array(values.into_iter().map(Into::into).collect())
    }
}

impl<T: TryFrom<FieldValue, Error = FieldValue>> TryFrom<FieldValue> for Vec<T> {
    type Error = FieldValue;

    fn try_from(value: FieldValue) -> Result<Self, FieldValue> {
        match value {
            FieldValue::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(T::try_from(item)?);
                }
                Ok(out)
            }
            other => Err(other),
        }
    }
}

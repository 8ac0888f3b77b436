use serde::{Deserialize, Serialize};

/// The storage kind of one schema field (or of each element, for arrays).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    /// Stored as one byte, `0` or `1`.
    Bool,
    /// UTF-8 text, zero-padded or truncated to `bytes`.
    Text { bytes: u32 },
    Vec2,
    Vec3,
    Vec4,
    Quat,
    /// Column-major 3x3 float matrix.
    Mat3,
    /// Column-major 4x4 float matrix.
    Mat4,
    /// Another mirrored object, stored as its 4-byte instance id.
    Reference,
}

impl FieldKind {
    /// Bytes taken by a single element of this kind.
    pub fn element_size(self) -> usize {
        match self {
            Self::U8 | Self::I8 | Self::Bool => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 | Self::Reference => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
            Self::Text { bytes } => bytes as usize,
            Self::Vec2 => 8,
            Self::Vec3 => 12,
            Self::Vec4 | Self::Quat => 16,
            Self::Mat3 => 36,
            Self::Mat4 => 64,
        }
    }

    /// Number of `f32` lanes in one element, for float-backed kinds.
    pub fn float_lanes(self) -> Option<usize> {
        match self {
            Self::F32 => Some(1),
            Self::Vec2 => Some(2),
            Self::Vec3 => Some(3),
            Self::Vec4 | Self::Quat => Some(4),
            Self::Mat3 => Some(9),
            Self::Mat4 => Some(16),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::I8 => "i8",
            Self::U16 => "u16",
            Self::I16 => "i16",
            Self::U32 => "u32",
            Self::I32 => "i32",
            Self::U64 => "u64",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Bool => "bool",
            Self::Text { .. } => "text",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
            Self::Quat => "quat",
            Self::Mat3 => "mat3",
            Self::Mat4 => "mat4",
            Self::Reference => "reference",
        }
    }
}

/// A field as declared by a mirrored class, before layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub kind: FieldKind,
    /// Element count for array fields; `None` for a single value.
    pub array_len: Option<u32>,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            array_len: None,
        }
    }

    pub fn array(name: impl Into<String>, kind: FieldKind, len: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            array_len: Some(len),
        }
    }

    pub fn text(name: impl Into<String>, bytes: u32) -> Self {
        Self::new(name, FieldKind::Text { bytes })
    }
}

/// One compiled schema entry.
///
/// Offsets are strictly increasing in `sequence_index` order and fields never
/// overlap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub is_array: bool,
    /// Number of elements (1 for non-array fields).
    pub len: u32,
    pub byte_offset: usize,
    pub byte_size: usize,
    /// Position in declaration order.
    pub sequence_index: usize,
}

impl FieldDescriptor {
    /// Byte range of this field inside a schema buffer.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.byte_offset..self.byte_offset + self.byte_size
    }
}

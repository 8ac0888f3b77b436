//! Encoding and decoding of field values at their schema offsets.
//!
//! Values are stored in native byte order: buffers never leave the process.

use bytemuck::Pod;
use crossframe_common::InstanceId;
use glam::{Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

use crate::error::LayoutError;
use crate::field::{FieldDescriptor, FieldKind};
use crate::value::FieldValue;

fn put<T: Pod>(out: &mut [u8], v: T) {
    out.copy_from_slice(bytemuck::bytes_of(&v));
}

fn take<T: Pod>(bytes: &[u8]) -> T {
    bytemuck::pod_read_unaligned(bytes)
}

fn field_bytes<'a>(desc: &FieldDescriptor, buf: &'a [u8]) -> Result<&'a [u8], LayoutError> {
    buf.get(desc.range()).ok_or_else(|| LayoutError::BufferTooSmall {
        field: desc.name.clone(),
        needed: desc.range().end,
        actual: buf.len(),
    })
}

fn field_bytes_mut<'a>(
    desc: &FieldDescriptor,
    buf: &'a mut [u8],
) -> Result<&'a mut [u8], LayoutError> {
    let actual = buf.len();
    buf.get_mut(desc.range())
        .ok_or_else(|| LayoutError::BufferTooSmall {
            field: desc.name.clone(),
            needed: desc.range().end,
            actual,
        })
}

/// Write `value` into `buf` at the field's offset.
///
/// Array fields accept up to `len` elements; missing trailing elements are
/// zeroed. `f32` and `f64` values are accepted for either float width and
/// rounded to the declared one. Text longer than the field is truncated at the
/// last whole character that fits.
pub fn encode(desc: &FieldDescriptor, value: &FieldValue, buf: &mut [u8]) -> Result<(), LayoutError> {
    let out = field_bytes_mut(desc, buf)?;
    let elem = desc.kind.element_size();

    if desc.is_array {
        let FieldValue::Array(items) = value else {
            return Err(mismatch(desc, "array", value));
        };
        if items.len() > desc.len as usize {
            return Err(LayoutError::ArrayTooLong {
                field: desc.name.clone(),
                len: items.len(),
                capacity: desc.len,
            });
        }
        // Check every element first so a rejected array leaves `buf` untouched.
        if let Some(bad) = items.iter().find(|item| !accepts(desc.kind, item)) {
            return Err(mismatch(desc, desc.kind.name(), bad));
        }
        out.fill(0);
        for (item, slot) in items.iter().zip(out.chunks_exact_mut(elem)) {
            encode_element(desc, item, slot)?;
        }
        Ok(())
    } else {
        encode_element(desc, value, out)
    }
}

fn mismatch(desc: &FieldDescriptor, expected: &'static str, found: &FieldValue) -> LayoutError {
    LayoutError::TypeMismatch {
        field: desc.name.clone(),
        expected,
        found: found.kind_name(),
    }
}

fn accepts(kind: FieldKind, value: &FieldValue) -> bool {
    match (kind, value) {
        (FieldKind::F32 | FieldKind::F64, FieldValue::F32(_) | FieldValue::F64(_)) => true,
        (_, FieldValue::Array(_)) => false,
        (kind, value) => kind.name() == value.kind_name(),
    }
}

fn encode_element(desc: &FieldDescriptor, value: &FieldValue, out: &mut [u8]) -> Result<(), LayoutError> {
    match (desc.kind, value) {
        (FieldKind::U8, FieldValue::U8(v)) => put(out, *v),
        (FieldKind::I8, FieldValue::I8(v)) => put(out, *v),
        (FieldKind::U16, FieldValue::U16(v)) => put(out, *v),
        (FieldKind::I16, FieldValue::I16(v)) => put(out, *v),
        (FieldKind::U32, FieldValue::U32(v)) => put(out, *v),
        (FieldKind::I32, FieldValue::I32(v)) => put(out, *v),
        (FieldKind::U64, FieldValue::U64(v)) => put(out, *v),
        (FieldKind::I64, FieldValue::I64(v)) => put(out, *v),
        (FieldKind::F32, FieldValue::F32(v)) => put(out, *v),
        (FieldKind::F32, FieldValue::F64(v)) => put(out, *v as f32),
        (FieldKind::F64, FieldValue::F64(v)) => put(out, *v),
        (FieldKind::F64, FieldValue::F32(v)) => put(out, f64::from(*v)),
        (FieldKind::Bool, FieldValue::Bool(v)) => out[0] = u8::from(*v),
        (FieldKind::Text { .. }, FieldValue::Text(s)) => encode_text(s, out),
        (FieldKind::Vec2, FieldValue::Vec2(v)) => put(out, v.to_array()),
        (FieldKind::Vec3, FieldValue::Vec3(v)) => put(out, v.to_array()),
        (FieldKind::Vec4, FieldValue::Vec4(v)) => put(out, v.to_array()),
        (FieldKind::Quat, FieldValue::Quat(v)) => put(out, v.to_array()),
        (FieldKind::Mat3, FieldValue::Mat3(v)) => put(out, v.to_cols_array()),
        (FieldKind::Mat4, FieldValue::Mat4(v)) => put(out, v.to_cols_array()),
        (FieldKind::Reference, FieldValue::Reference(id)) => {
            put(out, id.map_or(0u32, |id| id.0));
        }
        (kind, other) => return Err(mismatch(desc, kind.name(), other)),
    }
    Ok(())
}

fn encode_text(s: &str, out: &mut [u8]) {
    let mut end = s.len().min(out.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    out[..end].copy_from_slice(&s.as_bytes()[..end]);
    out[end..].fill(0);
}

/// Read the field's value out of `buf`.
pub fn decode(desc: &FieldDescriptor, buf: &[u8]) -> Result<FieldValue, LayoutError> {
    let bytes = field_bytes(desc, buf)?;
    if desc.is_array {
        let items = bytes
            .chunks_exact(desc.kind.element_size())
            .map(|chunk| decode_element(desc.kind, chunk))
            .collect();
        Ok(FieldValue::Array(items))
    } else {
        Ok(decode_element(desc.kind, bytes))
    }
}

fn decode_element(kind: FieldKind, bytes: &[u8]) -> FieldValue {
    match kind {
        FieldKind::U8 => FieldValue::U8(bytes[0]),
        FieldKind::I8 => FieldValue::I8(take(bytes)),
        FieldKind::U16 => FieldValue::U16(take(bytes)),
        FieldKind::I16 => FieldValue::I16(take(bytes)),
        FieldKind::U32 => FieldValue::U32(take(bytes)),
        FieldKind::I32 => FieldValue::I32(take(bytes)),
        FieldKind::U64 => FieldValue::U64(take(bytes)),
        FieldKind::I64 => FieldValue::I64(take(bytes)),
        FieldKind::F32 => FieldValue::F32(take(bytes)),
        FieldKind::F64 => FieldValue::F64(take(bytes)),
        FieldKind::Bool => FieldValue::Bool(bytes[0] != 0),
        FieldKind::Text { .. } => {
            let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
            FieldValue::Text(String::from_utf8_lossy(&bytes[..end]).into_owned())
        }
        FieldKind::Vec2 => FieldValue::Vec2(Vec2::from_array(take(bytes))),
        FieldKind::Vec3 => FieldValue::Vec3(Vec3::from_array(take(bytes))),
        FieldKind::Vec4 => FieldValue::Vec4(Vec4::from_array(take(bytes))),
        FieldKind::Quat => FieldValue::Quat(Quat::from_array(take(bytes))),
        FieldKind::Mat3 => FieldValue::Mat3(Mat3::from_cols_array(&take(bytes))),
        FieldKind::Mat4 => FieldValue::Mat4(Mat4::from_cols_array(&take(bytes))),
        FieldKind::Reference => FieldValue::Reference(InstanceId::from_raw(take(bytes))),
    }
}

/// Read a reference field's raw ids without building a `FieldValue`.
pub fn decode_reference(desc: &FieldDescriptor, buf: &[u8], index: usize) -> Result<Option<InstanceId>, LayoutError> {
    if desc.kind != FieldKind::Reference {
        return Err(LayoutError::TypeMismatch {
            field: desc.name.clone(),
            expected: "reference",
            found: desc.kind.name(),
        });
    }
    let bytes = field_bytes(desc, buf)?;
    Ok(bytes
        .chunks_exact(4)
        .nth(index)
        .and_then(|chunk| InstanceId::from_raw(take(chunk))))
}

/// Copy the `f32` lanes of a float-backed field into `out`, reusing its
/// allocation.
pub fn decode_floats_into(desc: &FieldDescriptor, buf: &[u8], out: &mut Vec<f32>) -> Result<(), LayoutError> {
    if desc.kind.float_lanes().is_none() {
        return Err(LayoutError::TypeMismatch {
            field: desc.name.clone(),
            expected: "float-backed field",
            found: desc.kind.name(),
        });
    }
    let bytes = field_bytes(desc, buf)?;
    out.clear();
    out.extend(bytes.chunks_exact(4).map(take::<f32>));
    Ok(())
}

/// Errors from schema compilation, registration and field encoding.
///
/// Everything raised by `compile` or `register_schema` is a configuration
/// error and happens before any instance of the class exists.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("field `{field}` declared twice in `{type_name}`")]
    DuplicateField { type_name: String, field: String },
    #[error("array field `{field}` must have at least one element")]
    EmptyArray { field: String },
    #[error("text field `{field}` must have a non-zero byte size")]
    EmptyText { field: String },
    #[error("schema `{type_name}` needs {bytes} bytes, limit is {limit}")]
    SchemaTooLarge {
        type_name: String,
        bytes: usize,
        limit: usize,
    },
    #[error("schema `{0}` is already registered")]
    AlreadyRegistered(String),
    #[error("parent schema `{parent}` of `{type_name}` is not registered")]
    UnknownParent { type_name: String, parent: String },
    #[error("schema `{0}` is not registered")]
    UnknownType(String),
    #[error("`{type_name}` has no field `{field}`")]
    UnknownField { type_name: String, field: String },
    #[error("field `{field}` expects {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("field `{field}` holds {capacity} elements, got {len}")]
    ArrayTooLong {
        field: String,
        len: usize,
        capacity: u32,
    },
    #[error("buffer of {actual} bytes is too small for field `{field}` (needs {needed})")]
    BufferTooSmall {
        field: String,
        needed: usize,
        actual: usize,
    },
}

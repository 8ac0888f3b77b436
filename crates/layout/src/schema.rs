use std::collections::{BTreeMap, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use crossframe_common::config::DEFAULT_MAX_SCHEMA_BYTES;

use crate::error::LayoutError;
use crate::field::{FieldDecl, FieldDescriptor, FieldKind};

/// The compiled, fixed binary layout of one mirrored class.
///
/// Immutable once built; shared between threads behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    type_name: String,
    fields: Vec<FieldDescriptor>,
    by_name: HashMap<String, usize>,
    total_byte_length: usize,
    fingerprint: u64,
}

impl Schema {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Total bytes needed to hold one snapshot of this schema.
    pub fn total_byte_length(&self) -> usize {
        self.total_byte_length
    }

    /// Hash of the field layout (names, kinds, offsets, sizes). Two schemas
    /// with equal fingerprints decode the same bytes the same way. Stable
    /// within one process only.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    /// Look up a field, failing with `UnknownField`.
    pub fn require(&self, name: &str) -> Result<&FieldDescriptor, LayoutError> {
        self.field(name).ok_or_else(|| LayoutError::UnknownField {
            type_name: self.type_name.clone(),
            field: name.to_string(),
        })
    }

    /// Allocate a zeroed buffer sized for this schema.
    pub fn zeroed_buffer(&self) -> Vec<u8> {
        vec![0; self.total_byte_length]
    }
}

/// Compile field declarations into a schema.
///
/// Declaration order becomes `sequence_index`; each field starts where the
/// previous one ends. Fails if a name repeats, an array or text field is empty,
/// or the total exceeds `max_bytes`.
pub fn compile(
    type_name: &str,
    declarations: &[FieldDecl],
    max_bytes: usize,
) -> Result<Schema, LayoutError> {
    let mut fields = Vec::with_capacity(declarations.len());
    let mut by_name = HashMap::with_capacity(declarations.len());
    let mut offset: usize = 0;

    let too_large = |bytes: usize| LayoutError::SchemaTooLarge {
        type_name: type_name.to_string(),
        bytes,
        limit: max_bytes,
    };

    for (sequence_index, decl) in declarations.iter().enumerate() {
        if let FieldKind::Text { bytes: 0 } = decl.kind {
            return Err(LayoutError::EmptyText {
                field: decl.name.clone(),
            });
        }
        if decl.array_len == Some(0) {
            return Err(LayoutError::EmptyArray {
                field: decl.name.clone(),
            });
        }
        if by_name.insert(decl.name.clone(), sequence_index).is_some() {
            return Err(LayoutError::DuplicateField {
                type_name: type_name.to_string(),
                field: decl.name.clone(),
            });
        }

        let len = decl.array_len.unwrap_or(1);
        let byte_size = decl
            .kind
            .element_size()
            .checked_mul(len as usize)
            .ok_or_else(|| too_large(usize::MAX))?;
        let end = offset
            .checked_add(byte_size)
            .ok_or_else(|| too_large(usize::MAX))?;
        if end > max_bytes {
            return Err(too_large(end));
        }

        fields.push(FieldDescriptor {
            name: decl.name.clone(),
            kind: decl.kind,
            is_array: decl.array_len.is_some(),
            len,
            byte_offset: offset,
            byte_size,
            sequence_index,
        });
        offset = end;
    }

    let mut hasher = DefaultHasher::new();
    fields.hash(&mut hasher);

    Ok(Schema {
        type_name: type_name.to_string(),
        fields,
        by_name,
        total_byte_length: offset,
        fingerprint: hasher.finish(),
    })
}

#[derive(Debug)]
struct SchemaEntry {
    parent: Option<String>,
    /// Merged declarations, inherited first.
    declarations: Vec<FieldDecl>,
    schema: Arc<Schema>,
}

/// Keyed table of compiled schemas, built by explicit registration.
///
/// A schema may name a parent; its fields are merged after the parent's, and
/// the layout of the merged set is compiled from scratch. Each schema is
/// compiled exactly once, at registration.
#[derive(Debug)]
pub struct SchemaRegistry {
    max_schema_bytes: usize,
    entries: BTreeMap<String, SchemaEntry>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_SCHEMA_BYTES)
    }

    /// Create a registry that rejects schemas larger than `max_schema_bytes`.
    pub fn with_limit(max_schema_bytes: usize) -> Self {
        Self {
            max_schema_bytes,
            entries: BTreeMap::new(),
        }
    }

    /// Register the schema of `type_name`, optionally extending `parent`.
    ///
    /// A field re-declared by the derived type replaces the inherited
    /// declaration at the inherited position; new fields are appended.
    pub fn register_schema(
        &mut self,
        type_name: &str,
        parent: Option<&str>,
        fields: Vec<FieldDecl>,
    ) -> Result<Arc<Schema>, LayoutError> {
        if self.entries.contains_key(type_name) {
            return Err(LayoutError::AlreadyRegistered(type_name.to_string()));
        }

        let mut merged = match parent {
            Some(parent) => self
                .entries
                .get(parent)
                .map(|entry| entry.declarations.clone())
                .ok_or_else(|| LayoutError::UnknownParent {
                    type_name: type_name.to_string(),
                    parent: parent.to_string(),
                })?,
            None => Vec::new(),
        };
        let inherited = merged.len();

        for (i, decl) in fields.iter().enumerate() {
            if fields[..i].iter().any(|d| d.name == decl.name) {
                return Err(LayoutError::DuplicateField {
                    type_name: type_name.to_string(),
                    field: decl.name.clone(),
                });
            }
        }
        for decl in fields {
            match merged[..inherited].iter_mut().find(|d| d.name == decl.name) {
                Some(slot) => {
                    tracing::debug!(type_name, field = %decl.name, "derived field overrides inherited");
                    *slot = decl;
                }
                None => merged.push(decl),
            }
        }

        let schema = Arc::new(compile(type_name, &merged, self.max_schema_bytes)?);
        tracing::debug!(
            type_name,
            parent,
            fields = schema.len(),
            bytes = schema.total_byte_length(),
            "schema registered"
        );
        self.entries.insert(
            type_name.to_string(),
            SchemaEntry {
                parent: parent.map(str::to_string),
                declarations: merged,
                schema: schema.clone(),
            },
        );
        Ok(schema)
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<Schema>> {
        self.entries.get(type_name).map(|e| e.schema.clone())
    }

    /// Look up a schema, failing with `UnknownType`.
    pub fn schema(&self, type_name: &str) -> Result<Arc<Schema>, LayoutError> {
        self.get(type_name)
            .ok_or_else(|| LayoutError::UnknownType(type_name.to_string()))
    }

    pub fn parent_of(&self, type_name: &str) -> Option<&str> {
        self.entries.get(type_name)?.parent.as_deref()
    }

    /// Whether `type_name` is `ancestor` or derives from it.
    pub fn is_a(&self, type_name: &str, ancestor: &str) -> bool {
        let mut current = Some(type_name);
        while let Some(name) = current {
            if name == ancestor {
                return self.entries.contains_key(name);
            }
            current = self.parent_of(name);
        }
        false
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_schema_bytes(&self) -> usize {
        self.max_schema_bytes
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform_fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl::new("x", FieldKind::F32),
            FieldDecl::new("y", FieldKind::F32),
            FieldDecl::new("visible", FieldKind::Bool),
        ]
    }

    #[test]
    fn offsets_follow_declaration_order() {
        let schema = compile("Point", &transform_fields(), 1024).unwrap();
        let offsets: Vec<usize> = schema.fields().iter().map(|f| f.byte_offset).collect();
        assert_eq!(offsets, vec![0, 4, 8]);
        assert_eq!(schema.total_byte_length(), 9);
        assert_eq!(schema.field("visible").unwrap().sequence_index, 2);
    }

    #[test]
    fn sizes_sum_to_total_and_never_overlap() {
        let decls = vec![
            FieldDecl::new("flag", FieldKind::Bool),
            FieldDecl::array("weights", FieldKind::F64, 3),
            FieldDecl::text("label", 10),
            FieldDecl::new("world", FieldKind::Mat4),
            FieldDecl::new("target", FieldKind::Reference),
        ];
        let schema = compile("Mixed", &decls, 1024).unwrap();
        let sum: usize = schema.fields().iter().map(|f| f.byte_size).sum();
        assert_eq!(sum, schema.total_byte_length());
        for pair in schema.fields().windows(2) {
            assert_eq!(pair[0].byte_offset + pair[0].byte_size, pair[1].byte_offset);
        }
        assert!(schema.field("weights").unwrap().is_array);
        assert_eq!(schema.field("weights").unwrap().byte_size, 24);
    }

    #[test]
    fn fingerprint_tracks_layout_not_size() {
        let point = vec![
            FieldDecl::new("x", FieldKind::F32),
            FieldDecl::new("y", FieldKind::F32),
            FieldDecl::new("visible", FieldKind::Bool),
        ];
        let flags = vec![
            FieldDecl::new("visible", FieldKind::Bool),
            FieldDecl::new("x", FieldKind::F32),
            FieldDecl::new("y", FieldKind::F32),
        ];
        let a = compile("Point", &point, 64).unwrap();
        let b = compile("Flags", &flags, 64).unwrap();
        assert_eq!(a.total_byte_length(), b.total_byte_length());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), compile("Other", &point, 64).unwrap().fingerprint());
    }

    #[test]
    fn empty_schema_is_valid() {
        let schema = compile("Empty", &[], 16).unwrap();
        assert!(schema.is_empty());
        assert_eq!(schema.total_byte_length(), 0);
    }

    #[test]
    fn duplicate_field_rejected() {
        let decls = vec![
            FieldDecl::new("a", FieldKind::U8),
            FieldDecl::new("a", FieldKind::U16),
        ];
        let err = compile("Dup", &decls, 64).unwrap_err();
        assert!(matches!(err, LayoutError::DuplicateField { .. }));
    }

    #[test]
    fn empty_array_and_text_rejected() {
        let err = compile("A", &[FieldDecl::array("a", FieldKind::U8, 0)], 64).unwrap_err();
        assert!(matches!(err, LayoutError::EmptyArray { .. }));
        let err = compile("T", &[FieldDecl::text("t", 0)], 64).unwrap_err();
        assert!(matches!(err, LayoutError::EmptyText { .. }));
    }

    #[test]
    fn size_limit_is_a_registration_error() {
        let decls = vec![FieldDecl::array("big", FieldKind::Mat4, 100)];
        let err = compile("Big", &decls, 1024).unwrap_err();
        match err {
            LayoutError::SchemaTooLarge { bytes, limit, .. } => {
                assert_eq!(bytes, 6400);
                assert_eq!(limit, 1024);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn overflowing_array_rejected() {
        let decls = vec![
            FieldDecl::array("a", FieldKind::Text { bytes: u32::MAX }, u32::MAX),
            FieldDecl::array("b", FieldKind::Text { bytes: u32::MAX }, u32::MAX),
        ];
        assert!(matches!(
            compile("Huge", &decls, usize::MAX),
            Err(LayoutError::SchemaTooLarge { .. })
        ));
    }

    #[test]
    fn registry_merges_parent_fields_first() {
        let mut reg = SchemaRegistry::new();
        reg.register_schema("Actor", None, transform_fields()).unwrap();
        let derived = reg
            .register_schema(
                "Light",
                Some("Actor"),
                vec![FieldDecl::new("intensity", FieldKind::F32)],
            )
            .unwrap();

        let names: Vec<&str> = derived.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["x", "y", "visible", "intensity"]);
        assert_eq!(derived.field("intensity").unwrap().byte_offset, 9);
        assert_eq!(reg.parent_of("Light"), Some("Actor"));
        assert!(reg.is_a("Light", "Actor"));
        assert!(!reg.is_a("Actor", "Light"));
    }

    #[test]
    fn derived_redeclaration_wins_and_layout_is_recomputed() {
        let mut reg = SchemaRegistry::new();
        reg.register_schema("Base", None, transform_fields()).unwrap();
        let derived = reg
            .register_schema(
                "Wide",
                Some("Base"),
                vec![
                    FieldDecl::new("x", FieldKind::F64),
                    FieldDecl::new("z", FieldKind::F32),
                ],
            )
            .unwrap();

        let x = derived.field("x").unwrap();
        assert_eq!(x.kind, FieldKind::F64);
        assert_eq!(x.sequence_index, 0);
        assert_eq!(derived.field("y").unwrap().byte_offset, 8);
        assert_eq!(derived.field("z").unwrap().sequence_index, 3);
        assert_eq!(derived.total_byte_length(), 8 + 4 + 1 + 4);

        // The parent's layout is untouched.
        let base = reg.schema("Base").unwrap();
        assert_eq!(base.field("x").unwrap().kind, FieldKind::F32);
    }

    #[test]
    fn registry_errors() {
        let mut reg = SchemaRegistry::with_limit(8);
        reg.register_schema("A", None, vec![]).unwrap();
        assert!(matches!(
            reg.register_schema("A", None, vec![]),
            Err(LayoutError::AlreadyRegistered(_))
        ));
        assert!(matches!(
            reg.register_schema("B", Some("Missing"), vec![]),
            Err(LayoutError::UnknownParent { .. })
        ));
        assert!(matches!(
            reg.register_schema("C", None, vec![FieldDecl::new("m", FieldKind::Mat3)]),
            Err(LayoutError::SchemaTooLarge { .. })
        ));
        assert!(matches!(reg.schema("C"), Err(LayoutError::UnknownType(_))));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn registry_returns_cached_schema() {
        let mut reg = SchemaRegistry::new();
        let first = reg.register_schema("P", None, transform_fields()).unwrap();
        let again = reg.schema("P").unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }
}

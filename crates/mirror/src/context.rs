use std::collections::HashMap;
use std::sync::Arc;

use crossframe_common::{InstanceIdAllocator, ThreadId};
use crossframe_layout::{LayoutError, SchemaRegistry};

use crate::error::MirrorError;
use crate::origin::{Origin, OriginBuilder};
use crate::record::{MirrorMessage, RecordSender};

/// Where a mirrored type's proxies live, and under which tag they are built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRoute {
    pub target: ThreadId,
    pub tag: String,
}

/// Per-thread mirroring state on the owning side.
///
/// Holds the shared schema registry and id allocator, the table of mirrored
/// types, and one outgoing record channel per target thread. Built once when
/// the thread starts and passed to whatever constructs origins.
#[derive(Debug)]
pub struct MirrorContext {
    thread: ThreadId,
    schemas: Arc<SchemaRegistry>,
    ids: Arc<InstanceIdAllocator>,
    classes: HashMap<String, Vec<MirrorRoute>>,
    outboxes: HashMap<ThreadId, RecordSender>,
}

impl MirrorContext {
    pub fn new(thread: ThreadId, schemas: Arc<SchemaRegistry>, ids: Arc<InstanceIdAllocator>) -> Self {
        Self {
            thread,
            schemas,
            ids,
            classes: HashMap::new(),
            outboxes: HashMap::new(),
        }
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    pub(crate) fn ids(&self) -> &InstanceIdAllocator {
        &self.ids
    }

    /// Mark `type_name` as mirrored: its proxy on `target` is built from the
    /// factory registered under `tag`. Declaring the same target again
    /// replaces the tag.
    pub fn declare_mirror(
        &mut self,
        type_name: &str,
        target: ThreadId,
        tag: impl Into<String>,
    ) -> Result<(), MirrorError> {
        if self.schemas.get(type_name).is_none() {
            return Err(LayoutError::UnknownType(type_name.to_string()).into());
        }
        let tag = tag.into();
        tracing::debug!(type_name, %target, %tag, "mirror declared");
        let routes = self.classes.entry(type_name.to_string()).or_default();
        match routes.iter_mut().find(|r| r.target == target) {
            Some(route) => route.tag = tag,
            None => routes.push(MirrorRoute { target, tag }),
        }
        Ok(())
    }

    pub fn is_mirrored(&self, type_name: &str) -> bool {
        self.classes.contains_key(type_name)
    }

    pub fn routes(&self, type_name: &str) -> &[MirrorRoute] {
        self.classes.get(type_name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Attach the channel that carries records to `target`.
    pub fn connect(&mut self, target: ThreadId, sender: RecordSender) {
        if self.outboxes.insert(target, sender).is_some() {
            tracing::warn!(thread = %self.thread, %target, "replacing record channel");
        }
    }

    pub(crate) fn outbox(&self, target: ThreadId) -> Option<&RecordSender> {
        self.outboxes.get(&target)
    }

    /// Start building an instance of a mirrored type.
    pub fn build(&self, type_name: &str) -> Result<OriginBuilder<'_>, MirrorError> {
        let routes = match self.classes.get(type_name) {
            Some(routes) if !routes.is_empty() => routes.as_slice(),
            _ => return Err(MirrorError::NotMirrored(type_name.to_string())),
        };
        let schema = self.schemas.schema(type_name)?;
        Ok(OriginBuilder::new(self, schema, routes))
    }

    /// Tell every target thread that `origin` is gone. Returns how many
    /// retire messages were delivered.
    pub fn retire(&self, origin: &Origin) -> usize {
        let mut delivered = 0;
        for target in origin.targets() {
            let Some(outbox) = self.outboxes.get(&target) else {
                continue;
            };
            let message = MirrorMessage::Retire {
                instance_id: origin.id(),
                origin_thread: self.thread,
            };
            if outbox.send(message).is_ok() {
                delivered += 1;
            } else {
                tracing::warn!(%target, id = %origin.id(), "retire dropped: receiver disconnected");
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::record_channel;
    use crossframe_layout::{FieldDecl, FieldKind};

    fn context() -> MirrorContext {
        let mut schemas = SchemaRegistry::new();
        schemas
            .register_schema("Light", None, vec![FieldDecl::new("intensity", FieldKind::F32)])
            .unwrap();
        MirrorContext::new(ThreadId::GAME, Arc::new(schemas), Arc::new(InstanceIdAllocator::new()))
    }

    #[test]
    fn declare_requires_schema() {
        let mut ctx = context();
        assert!(ctx.declare_mirror("Light", ThreadId::RENDER, "LightProxy").is_ok());
        assert!(matches!(
            ctx.declare_mirror("Ghost", ThreadId::RENDER, "GhostProxy"),
            Err(MirrorError::Layout(LayoutError::UnknownType(_)))
        ));
        assert!(ctx.is_mirrored("Light"));
        assert!(!ctx.is_mirrored("Ghost"));
    }

    #[test]
    fn redeclaring_a_target_replaces_the_tag() {
        let mut ctx = context();
        ctx.declare_mirror("Light", ThreadId::RENDER, "A").unwrap();
        ctx.declare_mirror("Light", ThreadId::PHYSICS, "B").unwrap();
        ctx.declare_mirror("Light", ThreadId::RENDER, "C").unwrap();
        let routes = ctx.routes("Light");
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].tag, "C");
    }

    #[test]
    fn build_requires_declaration() {
        let ctx = context();
        assert!(matches!(ctx.build("Light"), Err(MirrorError::NotMirrored(_))));
    }

    #[test]
    fn retire_reaches_connected_targets() {
        let mut ctx = context();
        ctx.declare_mirror("Light", ThreadId::RENDER, "LightProxy").unwrap();
        let (tx, rx) = record_channel();
        ctx.connect(ThreadId::RENDER, tx);

        let origin = ctx.build("Light").unwrap().finalize().unwrap();
        assert_eq!(ctx.retire(&origin), 1);

        let messages: Vec<_> = rx.try_iter().collect();
        assert_eq!(messages.len(), 2);
        assert!(matches!(
            messages[1],
            MirrorMessage::Retire { instance_id, .. } if instance_id == origin.id()
        ));
    }
}

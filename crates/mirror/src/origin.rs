use std::sync::Arc;

use crossframe_buffer::{TripleBuffer, TripleBufferWriter};
use crossframe_common::{InstanceId, ThreadId};
use crossframe_layout::{FieldValue, LayoutError, Schema, codec};
use serde::Serialize;

use crate::args::{ConstructorArgs, MirrorSerialize};
use crate::context::{MirrorContext, MirrorRoute};
use crate::error::MirrorError;
use crate::record::{ConstructionRecord, MirrorMessage};

/// Builder for one mirrored instance.
///
/// Collects constructor arguments and initial field values, then
/// `finalize` performs the mirroring setup exactly once: one triple buffer
/// per target thread, a fresh instance id, and one construction record per
/// target.
#[derive(Debug)]
pub struct OriginBuilder<'a> {
    ctx: &'a MirrorContext,
    schema: Arc<Schema>,
    routes: &'a [MirrorRoute],
    args: ConstructorArgs,
    staging: Vec<u8>,
}

impl<'a> OriginBuilder<'a> {
    pub(crate) fn new(ctx: &'a MirrorContext, schema: Arc<Schema>, routes: &'a [MirrorRoute]) -> Self {
        let staging = schema.zeroed_buffer();
        Self {
            ctx,
            schema,
            routes,
            args: ConstructorArgs::new(),
            staging,
        }
    }

    /// Record a constructor argument. Values with no JSON form are dropped.
    pub fn arg<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.args.push(value);
        self
    }

    /// Record a constructor argument, failing if it has no JSON form.
    pub fn try_arg<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, MirrorError> {
        self.args.try_push(value)?;
        Ok(self)
    }

    /// Record a constructor argument through its `MirrorSerialize` hook.
    pub fn arg_custom<T: MirrorSerialize + ?Sized>(mut self, value: &T) -> Self {
        self.args.push_custom(value);
        self
    }

    /// Set an initial field value.
    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Result<Self, MirrorError> {
        let desc = self.schema.require(name)?;
        codec::encode(desc, &value.into(), &mut self.staging)?;
        Ok(self)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Finish construction: allocate buffers and an id, publish the initial
    /// field values, and send a construction record to every target.
    ///
    /// Fails with `NoRoute` before allocating anything if a target thread has
    /// no connected channel, and with `IdsExhausted` once no fresh id is left.
    pub fn finalize(self) -> Result<Origin, MirrorError> {
        let ctx = self.ctx;
        if let Some(route) = self.routes.iter().find(|r| ctx.outbox(r.target).is_none()) {
            return Err(MirrorError::NoRoute {
                type_name: self.schema.type_name().to_string(),
                target: route.target,
            });
        }

        let id = ctx.ids().allocate().ok_or(MirrorError::IdsExhausted)?;
        let byte_length = self.schema.total_byte_length();
        let mut targets = Vec::with_capacity(self.routes.len());
        for route in self.routes {
            let (writer, reader) = TripleBuffer::new(byte_length);
            let record = ConstructionRecord {
                type_tag: route.tag.clone(),
                instance_id: id,
                buffer: reader,
                layout: self.schema.fingerprint(),
                args: self.args.clone(),
                origin_thread: ctx.thread(),
            };
            tracing::debug!(
                %id,
                type_name = self.schema.type_name(),
                tag = %route.tag,
                target = %route.target,
                byte_length,
                "construction record sent"
            );
            let sent = ctx
                .outbox(route.target)
                .map(|outbox| outbox.send(MirrorMessage::Construct(record)).is_ok())
                .unwrap_or(false);
            if !sent {
                tracing::warn!(%id, target = %route.target, "construction record dropped: receiver disconnected");
            }
            targets.push(OriginTarget {
                thread: route.target,
                writer,
            });
        }

        let mut origin = Origin {
            id,
            thread: ctx.thread(),
            schema: self.schema,
            staging: self.staging,
            targets,
            dirty: true,
        };
        origin.publish()?;
        Ok(origin)
    }
}

#[derive(Debug)]
struct OriginTarget {
    thread: ThreadId,
    writer: TripleBufferWriter,
}

/// The authoritative, owning-thread side of a mirrored object.
///
/// Field writes land in a private staging buffer immediately; `publish`
/// copies the staging buffer into every target's triple buffer once per
/// frame.
#[derive(Debug)]
pub struct Origin {
    id: InstanceId,
    thread: ThreadId,
    schema: Arc<Schema>,
    staging: Vec<u8>,
    targets: Vec<OriginTarget>,
    dirty: bool,
}

impl Origin {
    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn type_name(&self) -> &str {
        self.schema.type_name()
    }

    /// Threads this origin is mirrored to.
    pub fn targets(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.targets.iter().map(|t| t.thread)
    }

    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<(), MirrorError> {
        let desc = self.schema.require(name)?;
        codec::encode(desc, &value.into(), &mut self.staging)?;
        self.dirty = true;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<FieldValue, MirrorError> {
        let desc = self.schema.require(name)?;
        Ok(codec::decode(desc, &self.staging)?)
    }

    pub fn get_as<T>(&self, name: &str) -> Result<T, MirrorError>
    where
        T: TryFrom<FieldValue, Error = FieldValue>,
    {
        convert(name, self.get(name)?)
    }

    /// Point a reference field at another mirrored object, or at nothing.
    pub fn set_reference(&mut self, name: &str, target: Option<InstanceId>) -> Result<(), MirrorError> {
        self.set(name, target)
    }

    pub fn reference(&self, name: &str) -> Result<Option<InstanceId>, MirrorError> {
        let desc = self.schema.require(name)?;
        Ok(codec::decode_reference(desc, &self.staging, 0)?)
    }

    /// The staging bytes, laid out by the schema.
    pub fn byte_view(&self) -> &[u8] {
        &self.staging
    }

    /// Mutable staging bytes for bulk updates. Marks the origin dirty.
    pub fn byte_view_mut(&mut self) -> &mut [u8] {
        self.dirty = true;
        &mut self.staging
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Force the next `publish` to go out even if nothing changed.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Copy the staging buffer into every target's write region and swap it
    /// in. Returns `false` without touching the buffers if nothing changed
    /// since the last publish.
    pub fn publish(&mut self) -> Result<bool, MirrorError> {
        if !self.dirty {
            return Ok(false);
        }
        for target in &mut self.targets {
            target.writer.copy_to_write_buffer(&self.staging)?;
            target.writer.swap_write_buffer();
        }
        self.dirty = false;
        Ok(true)
    }

    /// Writer end of the triple buffer feeding `thread`.
    pub fn writer(&mut self, thread: ThreadId) -> Option<&mut TripleBufferWriter> {
        self.targets
            .iter_mut()
            .find(|t| t.thread == thread)
            .map(|t| &mut t.writer)
    }
}

pub(crate) fn convert<T>(name: &str, value: FieldValue) -> Result<T, MirrorError>
where
    T: TryFrom<FieldValue, Error = FieldValue>,
{
    T::try_from(value).map_err(|value| {
        LayoutError::TypeMismatch {
            field: name.to_string(),
            expected: std::any::type_name::<T>(),
            found: value.kind_name(),
        }
        .into()
    })
}

use std::collections::HashMap;
use std::sync::Arc;

use crossframe_buffer::TripleBufferReader;
use crossframe_common::{InstanceId, ThreadId, TickContext};
use crossframe_layout::{FieldValue, Schema, codec};

use crate::args::ConstructorArgs;
use crate::error::MirrorError;
use crate::origin::convert;
use crate::record::ConstructionRecord;

/// Read-only mirror of an origin, living on a target thread.
///
/// Field accessors decode the current read region on every call; nothing
/// decoded is cached across refreshes.
#[derive(Debug)]
pub struct Proxy {
    id: InstanceId,
    origin_thread: ThreadId,
    type_tag: String,
    schema: Arc<Schema>,
    buffer: TripleBufferReader,
    args: ConstructorArgs,
    updates: u64,
}

impl Proxy {
    pub fn from_record(record: ConstructionRecord, schema: Arc<Schema>) -> Self {
        Self {
            id: record.instance_id,
            origin_thread: record.origin_thread,
            type_tag: record.type_tag,
            schema,
            buffer: record.buffer,
            args: record.args,
            updates: 0,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn origin_thread(&self) -> ThreadId {
        self.origin_thread
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn args(&self) -> &ConstructorArgs {
        &self.args
    }

    /// Pull the newest complete snapshot, if one was published since the
    /// last refresh.
    pub fn refresh(&mut self) -> bool {
        let fresh = self.buffer.swap_read_buffer();
        if fresh {
            self.updates += 1;
        }
        fresh
    }

    /// Refreshes that picked up a new snapshot.
    pub fn update_count(&self) -> u64 {
        self.updates
    }

    /// The current read region.
    pub fn bytes(&self) -> &[u8] {
        self.buffer.read_buffer()
    }

    pub fn get(&self, name: &str) -> Result<FieldValue, MirrorError> {
        let desc = self.schema.require(name)?;
        Ok(codec::decode(desc, self.buffer.read_buffer())?)
    }

    pub fn get_as<T>(&self, name: &str) -> Result<T, MirrorError>
    where
        T: TryFrom<FieldValue, Error = FieldValue>,
    {
        convert(name, self.get(name)?)
    }

    /// Id stored in a reference field (first element for arrays).
    pub fn reference_id(&self, name: &str) -> Result<Option<InstanceId>, MirrorError> {
        self.reference_id_at(name, 0)
    }

    pub fn reference_id_at(&self, name: &str, index: usize) -> Result<Option<InstanceId>, MirrorError> {
        let desc = self.schema.require(name)?;
        Ok(codec::decode_reference(desc, self.buffer.read_buffer(), index)?)
    }

    /// Copy a float-backed field's lanes into `out`, reusing its allocation.
    pub fn floats_into(&self, name: &str, out: &mut Vec<f32>) -> Result<(), MirrorError> {
        let desc = self.schema.require(name)?;
        Ok(codec::decode_floats_into(desc, self.buffer.read_buffer(), out)?)
    }
}

/// What a proxy factory gets to build a proxy's domain logic from.
#[derive(Debug, Clone, Copy)]
pub struct ProxyInit<'a> {
    pub instance_id: InstanceId,
    pub origin_thread: ThreadId,
    pub type_tag: &'a str,
    pub schema: &'a Schema,
    pub args: &'a ConstructorArgs,
}

/// Per-frame domain behaviour of a proxy, run after every refresh.
///
/// `W` is the target thread's own state, e.g. a renderer scene the proxy
/// copies its decoded fields into.
pub trait ProxyLogic<W>: Send {
    fn tick(&mut self, view: ProxyView<'_>, world: &mut W, ctx: &TickContext);
}

/// Logic for proxies that are only read, never driven.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLogic;

impl<W> ProxyLogic<W> for NoLogic {
    fn tick(&mut self, _view: ProxyView<'_>, _world: &mut W, _ctx: &TickContext) {}
}

/// Dense storage of one thread's live proxies, keyed by
/// `(instance id, origin thread)`.
#[derive(Debug, Default)]
pub struct ProxyTable {
    proxies: Vec<Proxy>,
    index: HashMap<(InstanceId, ThreadId), usize>,
}

impl ProxyTable {
    pub fn get(&self, id: InstanceId, origin_thread: ThreadId) -> Option<&Proxy> {
        self.index
            .get(&(id, origin_thread))
            .map(|&i| &self.proxies[i])
    }

    pub fn by_index(&self, index: usize) -> Option<&Proxy> {
        self.proxies.get(index)
    }

    pub fn contains(&self, id: InstanceId, origin_thread: ThreadId) -> bool {
        self.index.contains_key(&(id, origin_thread))
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Proxy> {
        self.proxies.iter()
    }

    /// Append a proxy. Returns its index, or `None` if the key is taken.
    pub(crate) fn insert(&mut self, proxy: Proxy) -> Option<usize> {
        let key = (proxy.id, proxy.origin_thread);
        if self.index.contains_key(&key) {
            return None;
        }
        let index = self.proxies.len();
        self.index.insert(key, index);
        self.proxies.push(proxy);
        Some(index)
    }

    /// Remove by key, moving the last proxy into the hole. Returns the old
    /// index so parallel storage can mirror the swap.
    pub(crate) fn swap_remove(&mut self, id: InstanceId, origin_thread: ThreadId) -> Option<(usize, Proxy)> {
        let index = self.index.remove(&(id, origin_thread))?;
        let proxy = self.proxies.swap_remove(index);
        if let Some(moved) = self.proxies.get(index) {
            self.index.insert((moved.id, moved.origin_thread), index);
        }
        Some((index, proxy))
    }

    pub(crate) fn refresh_all(&mut self) -> usize {
        self.proxies
            .iter_mut()
            .map(|p| p.refresh())
            .filter(|&fresh| fresh)
            .count()
    }
}

/// A proxy together with the table it lives in, so reference fields can be
/// followed to other proxies on the same thread.
#[derive(Debug, Clone, Copy)]
pub struct ProxyView<'a> {
    proxy: &'a Proxy,
    table: &'a ProxyTable,
}

impl<'a> ProxyView<'a> {
    pub fn new(proxy: &'a Proxy, table: &'a ProxyTable) -> Self {
        Self { proxy, table }
    }

    pub fn proxy(&self) -> &'a Proxy {
        self.proxy
    }

    /// Follow a reference field. `Ok(None)` when the field is empty or the
    /// referenced proxy has not arrived on this thread (yet).
    pub fn resolve(&self, name: &str) -> Result<Option<&'a Proxy>, MirrorError> {
        self.resolve_at(name, 0)
    }

    pub fn resolve_at(&self, name: &str, index: usize) -> Result<Option<&'a Proxy>, MirrorError> {
        Ok(self
            .proxy
            .reference_id_at(name, index)?
            .and_then(|id| self.table.get(id, self.proxy.origin_thread)))
    }
}

impl std::ops::Deref for ProxyView<'_> {
    type Target = Proxy;

    fn deref(&self) -> &Proxy {
        self.proxy
    }
}

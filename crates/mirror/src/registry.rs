use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::TryRecvError;
use crossframe_common::{InstanceId, MirrorConfig, ThreadId, TickContext};
use crossframe_layout::Schema;

use crate::error::MirrorError;
use crate::proxy::{NoLogic, Proxy, ProxyInit, ProxyLogic, ProxyTable, ProxyView};
use crate::record::{ConstructionRecord, MirrorMessage, RecordReceiver};

type Factory<W> = Box<dyn Fn(&ProxyInit<'_>) -> Box<dyn ProxyLogic<W>> + Send + Sync>;

struct FactoryEntry<W> {
    schema: Arc<Schema>,
    factory: Factory<W>,
}

/// Type tag -> (schema, constructor) table for one receiving thread.
pub struct ProxyFactories<W> {
    entries: HashMap<String, FactoryEntry<W>>,
}

impl<W: 'static> ProxyFactories<W> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register the constructor for proxies tagged `tag`. The schema must be
    /// the one the origin side compiled for the mirrored type.
    pub fn register<F>(&mut self, tag: impl Into<String>, schema: Arc<Schema>, factory: F) -> Result<(), MirrorError>
    where
        F: Fn(&ProxyInit<'_>) -> Box<dyn ProxyLogic<W>> + Send + Sync + 'static,
    {
        let tag = tag.into();
        if self.entries.contains_key(&tag) {
            return Err(MirrorError::DuplicateTag(tag));
        }
        self.entries.insert(
            tag,
            FactoryEntry {
                schema,
                factory: Box::new(factory),
            },
        );
        Ok(())
    }

    /// Register a tag whose proxies carry no per-frame logic.
    pub fn register_data(&mut self, tag: impl Into<String>, schema: Arc<Schema>) -> Result<(), MirrorError> {
        self.register(tag, schema, |_| Box::new(NoLogic))
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<W: 'static> Default for ProxyFactories<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> std::fmt::Debug for ProxyFactories<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

/// Counters kept by a `ProxyRegistry`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Messages taken off the inboxes.
    pub received: u64,
    pub constructed: u64,
    /// Construction records with an unknown tag, a mismatched buffer, or a
    /// mismatched field layout.
    pub dropped: u64,
    pub retired: u64,
    pub ticks: u64,
    /// Proxies that picked up a new snapshot on the last tick.
    pub last_refreshed: usize,
}

/// Owns the live proxies of one receiving thread.
///
/// Drains construction records from the connected inboxes, builds proxies
/// through the registered factories, and every tick refreshes all proxies
/// before running their logic.
pub struct ProxyRegistry<W> {
    thread: ThreadId,
    strict_type_tags: bool,
    factories: ProxyFactories<W>,
    inboxes: Vec<RecordReceiver>,
    table: ProxyTable,
    logics: Vec<Box<dyn ProxyLogic<W>>>,
    stats: RegistryStats,
}

impl<W: 'static> ProxyRegistry<W> {
    pub fn new(thread: ThreadId, factories: ProxyFactories<W>, config: &MirrorConfig) -> Self {
        Self {
            thread,
            strict_type_tags: config.strict_type_tags,
            factories,
            inboxes: Vec::new(),
            table: ProxyTable::default(),
            logics: Vec::new(),
            stats: RegistryStats::default(),
        }
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Receive records from one more origin thread.
    pub fn listen(&mut self, inbox: RecordReceiver) {
        self.inboxes.push(inbox);
    }

    /// Add a live proxy. Returns `false` if a proxy with the same id and
    /// origin thread is already registered.
    pub fn register_proxy(&mut self, proxy: Proxy, logic: Box<dyn ProxyLogic<W>>) -> bool {
        let id = proxy.id();
        let origin = proxy.origin_thread();
        match self.table.insert(proxy) {
            Some(index) => {
                self.logics.push(logic);
                debug_assert_eq!(index + 1, self.logics.len());
                tracing::debug!(thread = %self.thread, %id, %origin, "proxy registered");
                true
            }
            None => {
                tracing::warn!(thread = %self.thread, %id, %origin, "proxy registered twice");
                false
            }
        }
    }

    /// Drop a proxy and its logic. The last proxy moves into its slot.
    pub fn remove_proxy(&mut self, id: InstanceId, origin_thread: ThreadId) -> bool {
        let Some((index, _proxy)) = self.table.swap_remove(id, origin_thread) else {
            return false;
        };
        self.logics.swap_remove(index);
        tracing::debug!(thread = %self.thread, %id, origin = %origin_thread, "proxy removed");
        true
    }

    pub fn proxy_by_index(&self, index: usize) -> Option<&Proxy> {
        self.table.by_index(index)
    }

    pub fn proxy(&self, id: InstanceId, origin_thread: ThreadId) -> Option<&Proxy> {
        self.table.get(id, origin_thread)
    }

    pub fn view(&self, id: InstanceId, origin_thread: ThreadId) -> Option<ProxyView<'_>> {
        self.table
            .get(id, origin_thread)
            .map(|proxy| ProxyView::new(proxy, &self.table))
    }

    /// Follow `proxy`'s reference field `name` to another live proxy.
    pub fn resolve<'a>(&'a self, proxy: &'a Proxy, name: &str) -> Result<Option<&'a Proxy>, MirrorError> {
        ProxyView::new(proxy, &self.table).resolve(name)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Proxy> {
        self.table.iter()
    }

    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }

    /// Drain every inbox without blocking. Returns the number of messages
    /// handled. Inboxes whose senders are all gone are dropped.
    pub fn receive(&mut self) -> usize {
        let mut handled = 0;
        let mut i = 0;
        while i < self.inboxes.len() {
            match self.inboxes[i].try_recv() {
                Ok(message) => {
                    self.accept(message);
                    handled += 1;
                }
                Err(TryRecvError::Empty) => i += 1,
                Err(TryRecvError::Disconnected) => {
                    tracing::debug!(thread = %self.thread, "origin thread disconnected");
                    self.inboxes.swap_remove(i);
                }
            }
        }
        handled
    }

    /// Handle one message as if it had arrived on an inbox.
    pub fn accept(&mut self, message: MirrorMessage) {
        self.stats.received += 1;
        match message {
            MirrorMessage::Construct(record) => self.construct(record),
            MirrorMessage::Retire {
                instance_id,
                origin_thread,
            } => {
                if self.remove_proxy(instance_id, origin_thread) {
                    self.stats.retired += 1;
                }
            }
        }
    }

    fn construct(&mut self, record: ConstructionRecord) {
        tracing::debug!(thread = %self.thread, record = ?record.header(), "construction record received");
        let Some(entry) = self.factories.entries.get(&record.type_tag) else {
            self.reject(&record, "no proxy factory for type tag");
            return;
        };
        if entry.schema.total_byte_length() != record.buffer.byte_length() {
            self.reject(&record, "buffer length does not match proxy schema");
            return;
        }
        if entry.schema.fingerprint() != record.layout {
            self.reject(&record, "field layout does not match proxy schema");
            return;
        }

        let schema = entry.schema.clone();
        let logic = (entry.factory)(&ProxyInit {
            instance_id: record.instance_id,
            origin_thread: record.origin_thread,
            type_tag: &record.type_tag,
            schema: &schema,
            args: &record.args,
        });
        if self.register_proxy(Proxy::from_record(record, schema), logic) {
            self.stats.constructed += 1;
        }
    }

    fn reject(&mut self, record: &ConstructionRecord, reason: &'static str) {
        self.stats.dropped += 1;
        let thread = self.thread;
        let tag = record.type_tag.as_str();
        let id = record.instance_id;
        if self.strict_type_tags {
            tracing::error!(%thread, tag, %id, reason, "construction record dropped");
        } else {
            tracing::warn!(%thread, tag, %id, reason, "construction record dropped");
        }
    }

    /// Pull the newest snapshot into every proxy. Returns how many changed.
    pub fn refresh(&mut self) -> usize {
        self.table.refresh_all()
    }

    /// One frame: drain inboxes, refresh every proxy, then run every proxy's
    /// logic against `world`. Returns how many proxies saw new data.
    pub fn tick(&mut self, world: &mut W, ctx: &TickContext) -> usize {
        let _span = tracing::info_span!("proxy_tick", thread = %self.thread, frame = ctx.id).entered();
        self.receive();
        let fresh = self.table.refresh_all();
        for (proxy, logic) in self.table.iter().zip(self.logics.iter_mut()) {
            logic.tick(ProxyView::new(proxy, &self.table), world, ctx);
        }
        self.stats.ticks += 1;
        self.stats.last_refreshed = fresh;
        tracing::trace!(live = self.table.len(), fresh, "proxies refreshed");
        fresh
    }
}

impl<W> std::fmt::Debug for ProxyRegistry<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyRegistry")
            .field("thread", &self.thread)
            .field("factories", &self.factories)
            .field("inboxes", &self.inboxes.len())
            .field("proxies", &self.table.len())
            .field("stats", &self.stats)
            .finish()
    }
}

use crossframe_common::{InstanceId, ThreadId};
use crossframe_layout::FieldValue;

use crate::registry::ProxyRegistry;

/// Proxy registry inspector for developer tooling.
///
/// Read-only queries against one thread's proxies, for debugging and the CLI.
pub struct RegistryInspector;

impl RegistryInspector {
    /// Produce a summary of the registry state.
    pub fn summary<W: 'static>(registry: &ProxyRegistry<W>) -> RegistrySummary {
        let stats = registry.stats();
        RegistrySummary {
            thread: registry.thread(),
            live: registry.len(),
            received: stats.received,
            dropped: stats.dropped,
            retired: stats.retired,
            ticks: stats.ticks,
            last_refreshed: stats.last_refreshed,
        }
    }

    /// Decode every field of one proxy's current snapshot.
    pub fn inspect_proxy<W: 'static>(
        registry: &ProxyRegistry<W>,
        id: InstanceId,
        origin_thread: ThreadId,
    ) -> Option<ProxyInfo> {
        let proxy = registry.proxy(id, origin_thread)?;
        let fields = proxy
            .schema()
            .fields()
            .iter()
            .filter_map(|desc| {
                proxy
                    .get(&desc.name)
                    .ok()
                    .map(|value| (desc.name.clone(), value))
            })
            .collect();
        Some(ProxyInfo {
            id,
            origin_thread,
            type_tag: proxy.type_tag().to_string(),
            updates: proxy.update_count(),
            fields,
        })
    }

    /// List the keys of all live proxies.
    pub fn list_proxies<W: 'static>(registry: &ProxyRegistry<W>) -> Vec<(InstanceId, ThreadId)> {
        registry
            .iter()
            .map(|p| (p.id(), p.origin_thread()))
            .collect()
    }
}

/// Summary of a registry for the inspector.
#[derive(Debug, Clone)]
pub struct RegistrySummary {
    pub thread: ThreadId,
    pub live: usize,
    pub received: u64,
    pub dropped: u64,
    pub retired: u64,
    pub ticks: u64,
    pub last_refreshed: usize,
}

impl std::fmt::Display for RegistrySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Registry {}: live={} received={} dropped={} retired={} ticks={} last_refreshed={}",
            self.thread,
            self.live,
            self.received,
            self.dropped,
            self.retired,
            self.ticks,
            self.last_refreshed
        )
    }
}

/// Decoded snapshot of a single proxy.
#[derive(Debug, Clone)]
pub struct ProxyInfo {
    pub id: InstanceId,
    pub origin_thread: ThreadId,
    pub type_tag: String,
    pub updates: u64,
    pub fields: Vec<(String, FieldValue)>,
}

impl std::fmt::Display for ProxyInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Proxy {} [{} from {}] updates={}",
            self.id, self.type_tag, self.origin_thread, self.updates
        )?;
        for (name, value) in &self.fields {
            write!(f, " {name}={value:?}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MirrorContext;
    use crate::record::record_channel;
    use crate::registry::ProxyFactories;
    use crossframe_common::{InstanceIdAllocator, MirrorConfig, TickContext};
    use crossframe_layout::{FieldDecl, FieldKind, SchemaRegistry};
    use std::sync::Arc;

    fn pair() -> (MirrorContext, ProxyRegistry<()>) {
        let mut schemas = SchemaRegistry::new();
        let schema = schemas
            .register_schema(
                "Lamp",
                None,
                vec![
                    FieldDecl::new("on", FieldKind::Bool),
                    FieldDecl::new("level", FieldKind::U8),
                ],
            )
            .unwrap();
        let mut ctx = MirrorContext::new(ThreadId::GAME, Arc::new(schemas), Arc::new(InstanceIdAllocator::new()));
        ctx.declare_mirror("Lamp", ThreadId::RENDER, "LampProxy").unwrap();
        let mut factories = ProxyFactories::new();
        factories.register_data("LampProxy", schema).unwrap();
        let mut registry = ProxyRegistry::new(ThreadId::RENDER, factories, &MirrorConfig::default());
        let (tx, rx) = record_channel();
        ctx.connect(ThreadId::RENDER, tx);
        registry.listen(rx);
        (ctx, registry)
    }

    #[test]
    fn summary_empty_registry() {
        let (_ctx, registry) = pair();
        let summary = RegistryInspector::summary(&registry);
        assert_eq!(summary.live, 0);
        assert_eq!(summary.ticks, 0);
        assert!(format!("{summary}").contains("live=0"));
    }

    #[test]
    fn summary_after_tick() {
        let (ctx, mut registry) = pair();
        let _a = ctx.build("Lamp").unwrap().finalize().unwrap();
        let _b = ctx.build("Lamp").unwrap().finalize().unwrap();
        registry.tick(&mut (), &TickContext::default());

        let summary = RegistryInspector::summary(&registry);
        assert_eq!(summary.live, 2);
        assert_eq!(summary.received, 2);
        assert_eq!(summary.last_refreshed, 2);
        assert_eq!(RegistryInspector::list_proxies(&registry).len(), 2);
    }

    #[test]
    fn inspect_proxy_decodes_fields() {
        let (ctx, mut registry) = pair();
        let lamp = ctx
            .build("Lamp")
            .unwrap()
            .with_field("on", true)
            .unwrap()
            .with_field("level", 7u8)
            .unwrap()
            .finalize()
            .unwrap();
        registry.tick(&mut (), &TickContext::default());

        let info = RegistryInspector::inspect_proxy(&registry, lamp.id(), ThreadId::GAME).unwrap();
        assert_eq!(info.type_tag, "LampProxy");
        assert_eq!(info.fields[0], ("on".to_string(), FieldValue::Bool(true)));
        assert_eq!(info.fields[1], ("level".to_string(), FieldValue::U8(7)));
        assert!(info.to_string().contains("level=U8(7)"));
    }

    #[test]
    fn inspect_missing_proxy() {
        let (_ctx, registry) = pair();
        assert!(RegistryInspector::inspect_proxy(&registry, InstanceId(42), ThreadId::GAME).is_none());
    }
}

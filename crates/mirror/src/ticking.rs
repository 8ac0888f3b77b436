//! Tick functions that wire mirroring into a thread's `TickScheduler`.

use crossframe_common::TickContext;
use crossframe_tick::TickFunction;

use crate::origin_set::OriginSet;
use crate::registry::ProxyRegistry;

/// Publishes every dirty origin of a thread once per frame.
pub struct PublishOrigins<S> {
    select: fn(&mut S) -> &mut OriginSet,
}

impl<S> PublishOrigins<S> {
    pub fn new(select: fn(&mut S) -> &mut OriginSet) -> Self {
        Self { select }
    }
}

impl<S> TickFunction<S> for PublishOrigins<S> {
    fn tick(&mut self, state: &mut S, ctx: &TickContext) {
        match (self.select)(state).publish_all() {
            Ok(published) => tracing::trace!(frame = ctx.id, published, "origins published"),
            Err(err) => tracing::error!(frame = ctx.id, %err, "publishing origins failed"),
        }
    }
}

/// Drains records, refreshes proxies and runs proxy logic once per frame.
pub struct RefreshProxies<S, W> {
    select: fn(&mut S) -> (&mut ProxyRegistry<W>, &mut W),
}

impl<S, W> RefreshProxies<S, W> {
    pub fn new(select: fn(&mut S) -> (&mut ProxyRegistry<W>, &mut W)) -> Self {
        Self { select }
    }
}

impl<S, W: 'static> TickFunction<S> for RefreshProxies<S, W> {
    fn tick(&mut self, state: &mut S, ctx: &TickContext) {
        let (registry, world) = (self.select)(state);
        registry.tick(world, ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MirrorContext;
    use crate::record::record_channel;
    use crate::registry::ProxyFactories;
    use crossframe_common::{InstanceIdAllocator, MirrorConfig, ThreadId};
    use crossframe_layout::{FieldDecl, FieldKind, SchemaRegistry};
    use crossframe_tick::{TickGroup, TickScheduler};
    use std::sync::Arc;

    struct Game {
        ctx: MirrorContext,
        origins: OriginSet,
    }

    struct Render {
        registry: ProxyRegistry<Vec<u32>>,
        seen: Vec<u32>,
    }

    #[test]
    fn scheduled_publish_and_refresh() {
        let mut schemas = SchemaRegistry::new();
        let schema = schemas
            .register_schema("Score", None, vec![FieldDecl::new("points", FieldKind::U32)])
            .unwrap();
        let mut ctx = MirrorContext::new(ThreadId::GAME, Arc::new(schemas), Arc::new(InstanceIdAllocator::new()));
        ctx.declare_mirror("Score", ThreadId::RENDER, "ScoreProxy").unwrap();
        let (tx, rx) = record_channel();
        ctx.connect(ThreadId::RENDER, tx);

        let mut factories = ProxyFactories::new();
        factories.register_data("ScoreProxy", schema).unwrap();
        let mut registry = ProxyRegistry::new(ThreadId::RENDER, factories, &MirrorConfig::default());
        registry.listen(rx);

        let mut game = Game {
            ctx,
            origins: OriginSet::new(),
        };
        let id = game
            .origins
            .insert(game.ctx.build("Score").unwrap().finalize().unwrap());

        let mut game_sched = TickScheduler::new();
        let bump = game_sched.add_registered("bump", TickGroup::PrePhysics, move |g: &mut Game, ctx: &TickContext| {
            if let Some(origin) = g.origins.get_mut(id) {
                origin.set("points", ctx.id * 10).unwrap();
            }
        });
        let publish = game_sched.add_registered(
            "publish",
            TickGroup::PostUpdate,
            PublishOrigins::new(|g: &mut Game| &mut g.origins),
        );
        game_sched.add_dependency(publish, bump);

        let mut render = Render {
            registry,
            seen: Vec::new(),
        };
        let mut render_sched = TickScheduler::new();
        render_sched.add_registered(
            "refresh",
            TickGroup::PrePhysics,
            RefreshProxies::new(|r: &mut Render| (&mut r.registry, &mut r.seen)),
        );
        render_sched.add_registered("read", TickGroup::PostPhysics, |r: &mut Render, _: &TickContext| {
            if let Some(points) = r
                .registry
                .proxy_by_index(0)
                .and_then(|p| p.get_as::<u32>("points").ok())
            {
                r.seen.push(points);
            }
        });

        for _ in 0..3 {
            game_sched.run_frame(&mut game, 0.016).unwrap();
            render_sched.run_frame(&mut render, 0.016).unwrap();
        }
        assert_eq!(render.seen, vec![10, 20, 30]);
    }
}

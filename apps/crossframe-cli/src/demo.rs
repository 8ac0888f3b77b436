//! Game thread mirrors a set of sprites to a render thread. Each thread runs
//! its own scheduler at its own cadence; the only link between them is the
//! record channel and the per-sprite triple buffers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::bail;
use crossframe_common::{EngineConfig, InstanceId, InstanceIdAllocator, ThreadId, TickContext};
use crossframe_layout::{FieldDecl, FieldKind, SchemaRegistry};
use crossframe_mirror::{
    MirrorContext, MirrorError, OriginSet, ProxyFactories, ProxyLogic, ProxyRegistry, ProxyView,
    PublishOrigins, RecordReceiver, RecordSender, RefreshProxies, RegistryInspector,
    RegistrySummary, record_channel,
};
use crossframe_tick::{TickGroup, TickScheduler};
use glam::{Quat, Vec3, Vec4};

/// Schemas shared by both threads.
pub fn schemas(config: &EngineConfig) -> anyhow::Result<SchemaRegistry> {
    let mut schemas = SchemaRegistry::with_limit(config.mirror.max_schema_bytes);
    schemas.register_schema(
        "Entity",
        None,
        vec![
            FieldDecl::new("position", FieldKind::Vec3),
            FieldDecl::new("rotation", FieldKind::Quat),
            FieldDecl::new("visible", FieldKind::Bool),
            FieldDecl::text("name", 16),
        ],
    )?;
    schemas.register_schema(
        "Sprite",
        Some("Entity"),
        vec![
            FieldDecl::new("tint", FieldKind::Vec4),
            FieldDecl::new("parent", FieldKind::Reference),
        ],
    )?;
    Ok(schemas)
}

struct GameState {
    origins: OriginSet,
    velocities: Vec<(InstanceId, Vec3)>,
}

fn spawn_sprites(ctx: &MirrorContext, count: usize) -> Result<GameState, MirrorError> {
    let mut origins = OriginSet::new();
    let mut velocities = Vec::with_capacity(count);
    let mut root: Option<InstanceId> = None;
    for i in 0..count {
        let origin = ctx
            .build("Sprite")?
            .arg(&i)
            .arg(&format!("sprite-{i}"))
            .with_field("name", format!("sprite-{i}"))?
            .with_field("visible", true)?
            .with_field("rotation", Quat::IDENTITY)?
            .with_field("tint", Vec4::new(1.0, 0.5, 0.25, 1.0))?
            .with_field("parent", root)?
            .finalize()?;
        let id = origins.insert(origin);
        if root.is_none() {
            root = Some(id);
        }
        velocities.push((id, Vec3::new(1.0 + i as f32, 0.0, -0.5)));
    }
    Ok(GameState { origins, velocities })
}

fn advance_sprites(state: &mut GameState, ctx: &TickContext) {
    for &(id, velocity) in &state.velocities {
        let Some(origin) = state.origins.get_mut(id) else {
            continue;
        };
        let moved = origin
            .get_as::<Vec3>("position")
            .and_then(|p| origin.set("position", p + velocity * ctx.delta));
        if let Err(err) = moved {
            tracing::warn!(%id, %err, "sprite not advanced");
        }
    }
}

fn run_game(
    config: &EngineConfig,
    schemas: &Arc<SchemaRegistry>,
    ids: &Arc<InstanceIdAllocator>,
    outbox: RecordSender,
) -> anyhow::Result<HashMap<InstanceId, Vec3>> {
    let _span = tracing::info_span!("game_thread").entered();
    let mut ctx = MirrorContext::new(ThreadId::GAME, schemas.clone(), ids.clone());
    ctx.declare_mirror("Sprite", ThreadId::RENDER, "SpriteProxy")?;
    ctx.connect(ThreadId::RENDER, outbox);

    let mut state = spawn_sprites(&ctx, config.entities)?;
    let mut sched = TickScheduler::new();
    let mover = sched.add_registered("advance_sprites", TickGroup::PrePhysics, advance_sprites);
    let publish = sched.add_registered(
        "publish_origins",
        TickGroup::PostUpdate,
        PublishOrigins::new(|g: &mut GameState| &mut g.origins),
    );
    sched.add_dependency(publish, mover);

    for _ in 0..config.frames {
        sched.run_frame(&mut state, config.fixed_delta)?;
    }
    tracing::info!(
        frames = config.frames,
        avg_us = sched.timer().average().as_micros() as u64,
        max_us = sched.timer().max().as_micros() as u64,
        "game loop finished"
    );

    let mut positions = HashMap::with_capacity(state.origins.len());
    for origin in state.origins.iter() {
        positions.insert(origin.id(), origin.get_as::<Vec3>("position")?);
    }
    Ok(positions)
}

#[derive(Debug, Default)]
struct SceneSprite {
    position: Vec3,
    tint: Vec4,
    parent: Option<InstanceId>,
}

#[derive(Debug, Default)]
struct Scene {
    sprites: HashMap<InstanceId, SceneSprite>,
}

/// Copies a sprite proxy's decoded fields into the render scene.
struct SpriteLogic;

impl ProxyLogic<Scene> for SpriteLogic {
    fn tick(&mut self, view: ProxyView<'_>, scene: &mut Scene, _ctx: &TickContext) {
        let sprite = scene.sprites.entry(view.id()).or_default();
        if let Ok(position) = view.get_as::<Vec3>("position") {
            sprite.position = position;
        }
        if let Ok(tint) = view.get_as::<Vec4>("tint") {
            sprite.tint = tint;
        }
        sprite.parent = view.resolve("parent").ok().flatten().map(|p| p.id());
    }
}

struct RenderState {
    registry: ProxyRegistry<Scene>,
    scene: Scene,
}

fn run_render(
    config: &EngineConfig,
    factories: ProxyFactories<Scene>,
    inbox: RecordReceiver,
    done: &AtomicBool,
) -> anyhow::Result<(Scene, RegistrySummary)> {
    let _span = tracing::info_span!("render_thread").entered();
    let mut registry = ProxyRegistry::new(ThreadId::RENDER, factories, &config.mirror);
    registry.listen(inbox);
    let mut state = RenderState {
        registry,
        scene: Scene::default(),
    };

    let mut sched = TickScheduler::new();
    sched.add_registered(
        "refresh_proxies",
        TickGroup::PrePhysics,
        RefreshProxies::new(|r: &mut RenderState| (&mut r.registry, &mut r.scene)),
    );

    loop {
        let finished = done.load(Ordering::Acquire);
        sched.run_frame(&mut state, config.fixed_delta)?;
        if finished {
            break;
        }
        std::thread::yield_now();
    }
    tracing::info!(frames = sched.clock().current().id, "render loop finished");

    let summary = RegistryInspector::summary(&state.registry);
    Ok((state.scene, summary))
}

/// Raises the render loop's stop flag when dropped, including while the game
/// loop unwinds from a panic.
struct DoneOnDrop<'a>(&'a AtomicBool);

impl Drop for DoneOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Run both loops and check that the render scene ends up with exactly the
/// game's final sprite positions.
pub fn run(config: &EngineConfig) -> anyhow::Result<()> {
    let schemas = Arc::new(schemas(config)?);
    let ids = Arc::new(InstanceIdAllocator::new());
    let (outbox, inbox) = record_channel();
    let done = AtomicBool::new(false);

    let mut factories = ProxyFactories::new();
    factories.register("SpriteProxy", schemas.schema("Sprite")?, |_| Box::new(SpriteLogic))?;

    println!(
        "Mirroring {} sprites for {} frames (dt={:.4}s)",
        config.entities, config.frames, config.fixed_delta
    );

    let (expected, (scene, summary)) = std::thread::scope(|s| -> anyhow::Result<_> {
        let render = s.spawn(|| run_render(config, factories, inbox, &done));
        let game = {
            let _finished = DoneOnDrop(&done);
            run_game(config, &schemas, &ids, outbox)
        };
        let rendered = render
            .join()
            .map_err(|_| anyhow::anyhow!("render thread panicked"))??;
        Ok((game?, rendered))
    })?;

    println!("{summary}");

    let root = expected.keys().min().copied();
    let mut mismatches = 0;
    for (id, position) in &expected {
        match scene.sprites.get(id) {
            Some(sprite) if sprite.position == *position => {
                let expected_parent = if Some(*id) == root { None } else { root };
                if sprite.parent != expected_parent {
                    mismatches += 1;
                    println!("  {id}: parent {:?}, expected {:?}", sprite.parent, expected_parent);
                }
            }
            Some(sprite) => {
                mismatches += 1;
                println!("  {id}: rendered {} but game has {position}", sprite.position);
            }
            None => {
                mismatches += 1;
                println!("  {id}: no proxy on the render thread");
            }
        }
    }
    if let Some(sprite) = root.and_then(|id| scene.sprites.get(&id)) {
        println!("Root sprite tint: {}", sprite.tint);
    }

    if mismatches > 0 {
        bail!("{mismatches} of {} sprites did not match", expected.len());
    }
    println!("Match: OK");
    Ok(())
}

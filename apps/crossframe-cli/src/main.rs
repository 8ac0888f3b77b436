mod demo;

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use crossframe_buffer::TripleBuffer;
use crossframe_common::{EngineConfig, TickContext};
use crossframe_tick::{TickGroup, TickScheduler};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "crossframe-cli", about = "Cross-thread mirroring and tick scheduling")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// JSON engine configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version, configuration and demo schema layouts
    Info,
    /// Mirror sprites from a game thread to a render thread
    Demo {
        /// Number of game frames (overrides the config file)
        #[arg(short, long)]
        frames: Option<u32>,
        /// Number of sprites (overrides the config file)
        #[arg(short, long)]
        entities: Option<usize>,
    },
    /// Hammer one triple buffer from two threads and check for torn reads
    Stress {
        /// Snapshots the writer publishes
        #[arg(short, long, default_value = "100000")]
        frames: u64,
        /// Number of u64 slots per snapshot
        #[arg(short, long, default_value = "64")]
        slots: usize,
    },
    /// Print the execution order of a sample tick graph
    Schedule {
        /// Add a dependency cycle to the sample graph
        #[arg(long)]
        cycle: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Info => {
            println!("crossframe-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("config: {}", serde_json::to_string_pretty(&config)?);
            let schemas = demo::schemas(&config)?;
            for type_name in ["Entity", "Sprite"] {
                let schema = schemas.schema(type_name)?;
                println!(
                    "schema {}: {} fields, {} bytes",
                    schema.type_name(),
                    schema.len(),
                    schema.total_byte_length()
                );
                for field in schema.fields() {
                    println!(
                        "  {:>2} {:<10} {:<8} offset={:<4} size={}",
                        field.sequence_index,
                        field.name,
                        field.kind.name(),
                        field.byte_offset,
                        field.byte_size
                    );
                }
            }
        }
        Commands::Demo { frames, entities } => {
            if let Some(frames) = frames {
                config.frames = frames;
            }
            if let Some(entities) = entities {
                config.entities = entities;
            }
            demo::run(&config)?;
        }
        Commands::Stress { frames, slots } => stress(frames, slots)?,
        Commands::Schedule { cycle } => schedule(cycle)?,
    }

    Ok(())
}

/// Writer stamps every slot with the frame number; the reader checks that
/// each snapshot it swaps in carries a single frame number.
fn stress(frames: u64, slots: usize) -> anyhow::Result<()> {
    if slots == 0 {
        bail!("need at least one slot");
    }
    println!("Stress: {frames} snapshots of {slots} slots");
    let (mut writer, mut reader) = TripleBuffer::new(slots * 8);

    let (observed, torn, last) = std::thread::scope(|s| -> anyhow::Result<_> {
        let producer = s.spawn(move || {
            for frame in 1..=frames {
                for slot in writer.write_buffer().chunks_exact_mut(8) {
                    slot.copy_from_slice(bytemuck::bytes_of(&frame));
                }
                writer.swap_write_buffer();
            }
        });

        let (mut observed, mut torn, mut last) = (0u64, 0u64, 0u64);
        loop {
            let finished = producer.is_finished();
            if reader.swap_read_buffer() {
                observed += 1;
                let mut values = reader
                    .read_buffer()
                    .chunks_exact(8)
                    .map(bytemuck::pod_read_unaligned::<u64>);
                let first = values.next().unwrap_or_default();
                if values.any(|v| v != first) || first < last {
                    torn += 1;
                }
                last = first;
            } else if finished {
                break;
            }
        }
        producer
            .join()
            .map_err(|_| anyhow::anyhow!("writer thread panicked"))?;
        Ok((observed, torn, last))
    })?;

    println!("Observed {observed} snapshots, last frame {last}, torn {torn}");
    if torn > 0 || last != frames {
        bail!("triple buffer check failed");
    }
    println!("Match: OK");
    Ok(())
}

/// A small frame graph in the shape a game loop usually has.
fn schedule(with_cycle: bool) -> anyhow::Result<()> {
    let noop = |_: &mut (), _: &TickContext| {};
    let mut sched: TickScheduler<()> = TickScheduler::new();

    let input = sched.add_registered("gather_input", TickGroup::PrePhysics, noop);
    let player = sched.add_registered("player_controller", TickGroup::PrePhysics, noop);
    let ai = sched.add_registered("ai_think", TickGroup::PrePhysics, noop);
    let step = sched.add_registered("physics_step", TickGroup::DuringPhysics, noop);
    let sync = sched.add_registered("sync_transforms", TickGroup::PostPhysics, noop);
    let animate = sched.add_registered("animate", TickGroup::PostPhysics, noop);
    let publish = sched.add_registered("publish_origins", TickGroup::PostUpdate, noop);
    let camera = sched.add_registered("camera_follow", TickGroup::PrePhysics, noop);

    sched.add_dependency(player, input);
    sched.add_dependency(ai, input);
    sched.add_dependency(step, player);
    sched.add_dependency(step, ai);
    sched.add_dependency(animate, sync);
    sched.add_dependency(sync, step);
    sched.add_dependency(publish, animate);
    // Later group: not enforced.
    sched.add_dependency(camera, publish);
    if with_cycle {
        sched.add_dependency(sync, animate);
    }

    let plan = sched.plan()?;
    for (group, names) in plan {
        println!("{group}:");
        for name in names {
            println!("  {name}");
        }
    }
    let stats = sched.run_frame(&mut (), 1.0 / 60.0)?;
    println!("Executed {} tick functions", stats.executed);
    Ok(())
}

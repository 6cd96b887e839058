//! # rankmesh Demo
//!
//! A small in-process pool that exercises the engine end to end: every
//! rank registers an echo plugin, the master runs a one-phase program that
//! kicks every rank into a "ping" slave mode, and the pool winds down once
//! every rank has acknowledged.
//!
//! This binary only talks to itself over [`rankmesh::transport::loopback`];
//! it exists to demonstrate the engine, not to connect a real cluster.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use rankmesh::config::{EngineConfig, Topology};
use rankmesh::engine::Engine;
use rankmesh::logging::ColorizedFormatter;
use rankmesh::message::Message;
use rankmesh::rank::{Rank, MASTER_RANK};
use rankmesh::registry::{MasterMode, PluginInfo, SlaveMode};
use rankmesh::tag::Tag;
use rankmesh::transport::loopback::LoopbackFabric;
use rankmesh::utils::spawn_with_affinity;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::Layer;

/// Reserved for slave-mode completion acks, out of band from anything
/// `Registry::allocate_tag` could ever hand out in a demo this small —
/// picked from the top of the application tag range rather than the
/// bottom so it can never collide with a plugin-allocated tag.
const ACK_TAG: Tag = Tag(rankmesh::tag::ROUTING_TAG_BASE - 1);
const PING_MODE: MasterMode = MasterMode(0);
const PONG_MODE: SlaveMode = SlaveMode(0);

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Runs a small rankmesh pool in-process", long_about = None)]
struct Args {
    /// Number of ranks in the pool.
    #[arg(short = 'n', long, default_value_t = 4)]
    ranks: usize,

    /// Overlay topology to route over.
    #[arg(short = 't', long, value_enum, default_value_t = TopologyArg::Ring)]
    topology: TopologyArg,

    /// Pin each rank's engine to its own CPU core, if the platform supports it.
    #[arg(long)]
    affinity: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Also write a plain (non-colorized) daily-rolling log file here, in
    /// addition to the colorized stdout layer.
    #[arg(long)]
    log_dir: Option<String>,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
enum TopologyArg {
    Complete,
    Ring,
}

impl From<TopologyArg> for Topology {
    fn from(value: TopologyArg) -> Self {
        match value {
            TopologyArg::Complete => Topology::Complete,
            TopologyArg::Ring => Topology::Ring,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let stdout_log = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .event_format(ColorizedFormatter)
        .with_filter(log_level);

    // Keeping the file layer optional (only built when --log-dir is given)
    // means the non-blocking writer's guard, which must outlive every log
    // call, only needs to exist on the branch that actually has a file to
    // write to.
    let mut today = None;
    let (file_log, _log_guard) = match args.log_dir.as_deref() {
        Some(dir) => {
            today = Some(chrono::Local::now().format("%Y-%m-%d").to_string());
            let appender = tracing_appender::rolling::daily(dir, "rankmesh.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_filter(log_level),
                ),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry().with(file_log).with(stdout_log).init();

    if let (Some(dir), Some(today)) = (args.log_dir.as_deref(), today.as_deref()) {
        info!(dir, today, "writing detailed logs to a daily-rolling file");
    }
    info!(ranks = args.ranks, topology = ?args.topology, "starting rankmesh demo");

    let config = EngineConfig {
        pool_size: args.ranks,
        topology: args.topology.into(),
        // Nothing is ever mid-relay when this demo's single phase ends, so
        // there is no reason to wait out the default drain window.
        drain_window: std::time::Duration::from_millis(200),
        ..EngineConfig::default()
    };

    let (_fabric, transports) = LoopbackFabric::new(args.ranks, 256);
    let acked = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::with_capacity(args.ranks);
    for (index, transport) in transports.into_iter().enumerate() {
        let rank = Rank(index as u32);
        let config = config.clone();
        let acked = acked.clone();
        let core_id = args.affinity.then_some(index);

        // Each rank's engine loops until the pool stops, so every rank must
        // be polled concurrently: tokio::spawn gives it its own task, and
        // spawn_with_affinity pins that task's execution to a core when
        // requested.
        let handle = tokio::spawn(spawn_with_affinity(
            async move {
                let mut engine = Engine::new(config, rank, Box::new(transport), ACK_TAG)?;
                wire_demo_program(&mut engine, acked)?;
                if rank.is_master() {
                    engine.kickoff()?;
                }
                engine.run().await.map_err(|e| anyhow::anyhow!("rank {rank} exited with an error: {e}"))?;
                Ok(rank)
            },
            core_id,
        ));
        handles.push(handle);
    }

    for handle in handles {
        let rank = handle.await??;
        info!(%rank, "rank finished");
    }

    info!(acked = acked.load(Ordering::SeqCst), "demo pool drained");
    Ok(())
}

/// Registers the echo plugin and the one-phase ping/pong program shared by
/// every rank in the demo.
fn wire_demo_program(engine: &mut Engine, acked: Arc<AtomicUsize>) -> Result<()> {
    let rank = engine.rank();
    let registry = engine.registry_mut();
    let plugin = registry.register_plugin(PluginInfo {
        name: "echo".into(),
        author: "rankmesh demo".into(),
        license: "Apache-2.0".into(),
    });

    // Allocated first so every rank's registry assigns it the same value,
    // keeping it distinct from `echo_tag` below.
    let ping_tag = registry.allocate_tag(plugin)?;

    let echo_tag = registry.allocate_tag(plugin)?;
    registry.bind_tag_handler(
        plugin,
        echo_tag,
        Box::new(move |message| {
            info!(%rank, source = %message.source, "echo handler received a message");
            Vec::new()
        }),
    )?;

    if rank.is_master() {
        let master_mode = registry.allocate_master_mode(plugin)?;
        let acked = acked.clone();
        registry.bind_master_mode_handler(
            plugin,
            master_mode,
            Box::new(move || {
                info!(acked = acked.load(Ordering::SeqCst), "master mode ticking");
                Vec::new()
            }),
        )?;
        debug_assert_eq!(master_mode, PING_MODE);
    }

    let slave_mode = registry.allocate_slave_mode(plugin)?;
    debug_assert_eq!(slave_mode, PONG_MODE);
    registry.bind_slave_mode_handler(
        plugin,
        slave_mode,
        Box::new(move || {
            acked.fetch_add(1, Ordering::SeqCst);
            vec![engine_ack(rank)]
        }),
    )?;

    let switch_man = engine.switch_man_mut();
    switch_man.add_master_switch(PING_MODE, ping_tag);
    switch_man.add_next_master_mode(PING_MODE, rankmesh::switch_man::NO_MASTER_MODE);
    switch_man.add_slave_switch(ping_tag, PONG_MODE);
    if rank.is_master() {
        switch_man.set_first_master_mode(PING_MODE);
    }

    Ok(())
}

fn engine_ack(rank: Rank) -> Message {
    Message::new(rank, MASTER_RANK, ACK_TAG, Vec::new())
}

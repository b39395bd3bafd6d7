// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

mod tree_file;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use dentry_logging::CliLoggingArgs;
use dentry_resolver_core::{
    AddressSpace, CallbackSelector, DentryCallback, DentryId, DentryResolver, DiscardFilter,
    DiscarderType, ErpcReply, FaultInjector, FaultPolicy, InMemoryDentryTree, PathKey, Protection,
    Resolution, ResolveOutcome, ResolverConfig, ResolverInput, SEGMENT_SLOT_SIZE,
};
use dentry_resolver_proto::{join_segments, reaches_root, split_segments, ResolveRequest};
use tracing::{debug, info};

use crate::tree_file::TreeFile;

const COMPONENT: &str = "dentry-ctl";

#[derive(Parser, Debug)]
#[command(author, version, about = "Resolve dentry paths over a described dentry tree")]
struct Cli {
    /// Resolver configuration (TOML); built-in defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    logging: CliLoggingArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Target {
    /// Tree description file (.toml or .json)
    #[arg(long)]
    tree: PathBuf,
    /// Path of the dentry to resolve
    #[arg(long)]
    path: String,
    /// Path generation stamped on the starting identity
    #[arg(long, default_value_t = 0)]
    path_id: u32,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Walk a dentry to the root, then read the path back through an
    /// external request
    Resolve {
        #[command(flatten)]
        target: Target,
        /// Inode numbers to discard when seen as the leaf or its parent
        #[arg(long = "discard-ino")]
        discard_inos: Vec<u64>,
        /// Completion handler to dispatch (open, mkdir, rename, ...)
        #[arg(long)]
        callback: Option<CallbackSelector>,
        /// Fault-injection policy for user buffer writes (JSON)
        #[arg(long)]
        fault_policy: Option<PathBuf>,
    },
    /// Walk a dentry to the root, then fetch only its own segment
    Segment {
        #[command(flatten)]
        target: Target,
    },
    /// Print the effective resolver configuration
    Config,
}

/// Discards fixed inode numbers regardless of class and mount.
struct InodeDiscarder {
    inos: HashSet<u64>,
}

impl DiscardFilter for InodeDiscarder {
    fn is_discarded_by_inode(&self, _: DiscarderType, _: u32, ino: u64, _: bool) -> bool {
        self.inos.contains(&ino)
    }
}

/// Prints the dispatched selector and the resolution it saw.
struct PrintCallback {
    selector: CallbackSelector,
}

impl DentryCallback for PrintCallback {
    fn on_resolved(&self, resolution: &Resolution) {
        println!("CALLBACK={}\tRET={}", self.selector, resolution.ret);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.logging.init(COMPONENT)?;

    let config = match &cli.config {
        Some(path) => ResolverConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ResolverConfig::default(),
    };

    match cli.command {
        Command::Resolve {
            target,
            discard_inos,
            callback,
            fault_policy,
        } => {
            let faults = Arc::new(FaultInjector::new());
            if let Some(path) = &fault_policy {
                faults.set_policy(read_fault_policy(path)?);
                debug!(component = COMPONENT, policy = ?faults.snapshot(), "fault policy loaded");
            }
            run_resolve(config, &target, discard_inos, callback, faults)
        }
        Command::Segment { target } => run_segment(config, &target),
        Command::Config => {
            let rendered = toml::to_string_pretty(&config).context("failed to render config")?;
            print!("{rendered}");
            Ok(())
        }
    }
}

fn read_fault_policy(path: &Path) -> Result<FaultPolicy> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read fault policy {}", path.display()))?;
    FaultPolicy::from_json_bytes(&bytes)
        .with_context(|| format!("invalid fault policy {}", path.display()))
}

fn load_target(target: &Target) -> Result<(InMemoryDentryTree, DentryId, PathKey)> {
    let described = TreeFile::load(&target.tree)?;
    let tree = described.build()?;
    let dentry = tree
        .lookup(&target.path)
        .ok_or_else(|| anyhow!("{} is not in {}", target.path, target.tree.display()))?;
    let mut key = tree.key(dentry, described.mount_id);
    key.path_id = target.path_id;
    Ok((tree, dentry, key))
}

fn run_resolve(
    config: ResolverConfig,
    target: &Target,
    discard_inos: Vec<u64>,
    callback: Option<CallbackSelector>,
    faults: Arc<FaultInjector>,
) -> Result<()> {
    let (tree, dentry, key) = load_target(target)?;
    let discarding = !discard_inos.is_empty();
    let filter = InodeDiscarder {
        inos: discard_inos.into_iter().collect(),
    };
    let resolver = DentryResolver::with_filter(config, Arc::new(filter))?;

    let mut input = ResolverInput::new(key, dentry);
    if discarding {
        input = input.with_discarder(DiscarderType(0));
    }
    if let Some(selector) = callback {
        resolver.register_callback(selector, Arc::new(PrintCallback { selector }));
        input = input.with_callback(selector);
    }

    let resolution = resolver.resolve(&tree, input);
    print_resolution(&resolution);
    if matches!(
        resolution.outcome,
        ResolveOutcome::Invalid | ResolveOutcome::Discarded
    ) {
        return Ok(());
    }

    let walker = &resolver.config().walker;
    let slots = walker.max_iteration_depth * walker.max_tail_calls as usize;
    let space = AddressSpace::with_faults(faults);
    let buffer = space.map(slots * SEGMENT_SLOT_SIZE, Protection::ReadWrite);
    let blob = ResolveRequest::new(key, buffer).to_blob();

    let reply = resolver.resolve_path(&space, &blob)?;
    print_reply(&reply);
    let written = space
        .read(buffer, reply.segments * SEGMENT_SLOT_SIZE)
        .ok_or_else(|| anyhow!("output buffer unmapped"))?;
    let segments = split_segments(&written, reply.segments);
    println!("PATH={}\tCOMPLETE={}", join_segments(&segments), reaches_root(&segments));
    Ok(())
}

fn run_segment(config: ResolverConfig, target: &Target) -> Result<()> {
    let (tree, dentry, key) = load_target(target)?;
    let resolver = DentryResolver::new(config)?;
    let resolution = resolver.resolve(&tree, ResolverInput::new(key, dentry));
    print_resolution(&resolution);

    let space = AddressSpace::new();
    let buffer = space.map(SEGMENT_SLOT_SIZE, Protection::ReadWrite);
    let reply = resolver.resolve_segment(&space, &ResolveRequest::new(key, buffer).to_blob())?;
    print_reply(&reply);
    if reply.segments == 1 {
        let slot = space
            .read(buffer, SEGMENT_SLOT_SIZE)
            .ok_or_else(|| anyhow!("output buffer unmapped"))?;
        let name = split_segments(&slot, 1).pop().unwrap_or_default();
        println!("SEGMENT={}", String::from_utf8_lossy(&name));
    }
    Ok(())
}

fn print_resolution(resolution: &Resolution) {
    info!(
        component = COMPONENT,
        outcome = ?resolution.outcome,
        ret = resolution.ret,
        "hook resolution done"
    );
    println!(
        "OUTCOME={}\tRET={}\tINVOCATIONS={}",
        outcome_label(resolution.outcome),
        resolution.code(),
        resolution.invocations
    );
}

fn print_reply(reply: &ErpcReply) {
    println!(
        "ERPC_STATUS={}\tSEGMENTS={}\tINVOCATIONS={}",
        reply.code(),
        reply.segments,
        reply.invocations
    );
}

fn outcome_label(outcome: ResolveOutcome) -> &'static str {
    match outcome {
        ResolveOutcome::Resolved => "resolved",
        ResolveOutcome::Discarded => "discarded",
        ResolveOutcome::Invalid => "invalid",
        ResolveOutcome::Truncated => "truncated",
    }
}

//! Convert point cloud files into a disk-backed octree.
//!
//! Usage:
//!   cloudtree --output <dir> [options] <input.las|input.pts|input.xyz>...
//!
//! Options:
//!   --max-node-size N    leaf size threshold (default 4096)
//!   --sample-size N      sample kept at internal nodes (default 4096)
//!   --threads N          worker threads (default 16)
//!   --max-depth N        depth cap for pathological inputs (default 24)

use std::path::{Path, PathBuf};
use std::time::Instant;

use cloudtree::build::OctreeBuilder;
use cloudtree::core::{logging, BuilderConfig, Error, Result};
use cloudtree::octree::hierarchy::write_hierarchy;

fn main() {
    logging::init();
    if let Err(err) = run() {
        log::error!("{err}");
        std::process::exit(err.exit_code());
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let output = flag_value(&args, "--output")
        .map(PathBuf::from)
        .ok_or_else(|| {
            eprintln!("Usage: cloudtree --output <dir> [options] <inputs>...");
            Error::MalformedSource("missing --output <dir>".to_string())
        })?;

    let mut config = BuilderConfig::default();
    if let Some(n) = parsed_flag(&args, "--max-node-size")? {
        config.max_node_size = n;
    }
    if let Some(n) = parsed_flag(&args, "--sample-size")? {
        config.sampled_node_size = n;
    }
    if let Some(n) = parsed_flag(&args, "--threads")? {
        config.worker_threads = n;
    }
    if let Some(n) = parsed_flag(&args, "--max-depth")? {
        config.max_depth = n;
    }

    let inputs = positional_args(&args);
    if inputs.is_empty() {
        eprintln!("Usage: cloudtree --output <dir> [options] <inputs>...");
        return Err(Error::MalformedSource("no input files given".to_string()));
    }

    prepare_output_dir(&output)?;

    let started = Instant::now();
    let summary = OctreeBuilder::new(config.clone()).build(&inputs, &output)?;
    write_hierarchy(&summary.root, &output.join("hierarchy.bin"))?;
    let elapsed = started.elapsed().as_secs_f64();

    let mut node_count = 0u64;
    summary.root.visit(&mut |_| node_count += 1);

    let metadata = serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "points": summary.total_points,
        "nodes": node_count,
        "blob_bytes": summary.blob_bytes,
        "record_bytes": cloudtree::octree::point::POINT_RECORD_SIZE,
        "max_node_size": config.max_node_size,
        "sampled_node_size": config.sampled_node_size,
        "bounds": {
            "center": [
                summary.root.bounds.center.x,
                summary.root.bounds.center.y,
                summary.root.bounds.center.z,
            ],
            "half_size": summary.root.bounds.half_size,
        },
        "sources": inputs.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
        "elapsed_secs": elapsed,
    });
    std::fs::write(
        output.join("metadata.json"),
        serde_json::to_string_pretty(&metadata).map_err(|e| Error::Io(e.into()))?,
    )?;

    log::info!(
        "built {} nodes over {} points in {:.2}s ({:.0} points/s)",
        node_count,
        summary.total_points,
        elapsed,
        summary.total_points as f64 / elapsed.max(f64::EPSILON)
    );
    Ok(())
}

/// Create the output directory if needed; refuse to build into one
/// that already holds files.
fn prepare_output_dir(output: &Path) -> Result<()> {
    std::fs::create_dir_all(output)?;
    if std::fs::read_dir(output)?.next().is_some() {
        return Err(Error::OutputDirNotEmpty(output.to_path_buf()));
    }
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a String> {
    args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1))
}

fn parsed_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Result<Option<T>> {
    match flag_value(args, flag) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| {
            Error::MalformedSource(format!("invalid value '{raw}' for {flag}"))
        }),
    }
}

/// Everything that is neither a flag nor a flag's value.
fn positional_args(args: &[String]) -> Vec<PathBuf> {
    let mut inputs = Vec::new();
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg.starts_with("--") {
            skip_next = true;
            continue;
        }
        inputs.push(PathBuf::from(arg));
    }
    inputs
}

//! Out-of-core octree construction
//!
//! The build runs in three phases over the output directory:
//!
//! 1. A distribution pass parses every input file once and routes each
//!    point to one of eight top-level octant files.
//! 2. Each octant is split recursively. Small nodes are loaded and
//!    split entirely in memory under the point budget; large ones are
//!    streamed through child sinks with an interleaved sample taken in
//!    the same pass. The biggest octants become deferred worker-pool
//!    jobs and build their subtrees in parallel.
//! 3. Once the pool drains, the deferred subtrees are grafted back
//!    onto the root, the root's own sample is drawn post-hoc from its
//!    children's files, and the writer assigns every node its byte
//!    range in the blob.
//!
//! Intermediate files are deleted as soon as their contents move down
//! the tree or into the blob; only the depth-1 files outlive their
//! nodes, because the root sample is drawn from them at the very end.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::build::budget::{FileBudget, PointBudget};
use crate::build::pool::WorkerPool;
use crate::build::progress::{Progress, ProgressReporter};
use crate::build::writer::{OctreeWriter, WriteRecord, WriterHandle};
use crate::core::{BuilderConfig, Error, Result};
use crate::io::{measure_inputs, open_source, PointSink, PointStream, SourceLayout};
use crate::octree::node::{point_file, Node};
use crate::octree::partition::octant_of;
use crate::octree::point::{bytes_to_points, Point, POINT_RECORD_SIZE};
use crate::octree::sampler::{persist_sample, sample_from_children, InterleavedSampler};

/// Result of a finished build: the hierarchy and the blob layout are
/// final, all intermediate files are gone.
pub struct BuildSummary {
    pub root: Node,
    /// Points across all leaves; equals the input total.
    pub total_points: u64,
    pub blob_bytes: u64,
}

pub struct OctreeBuilder {
    config: BuilderConfig,
}

struct BuildContext {
    config: BuilderConfig,
    output_dir: PathBuf,
    runtime: tokio::runtime::Handle,
    pool: WorkerPool,
    point_budget: Arc<PointBudget>,
    file_budget: FileBudget,
    writer: WriterHandle,
    progress: Arc<Progress>,
    /// Deferred subtrees, collected here by pool jobs and grafted back
    /// onto the root after the drain barrier.
    completed: Mutex<Vec<Box<Node>>>,
}

impl OctreeBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        Self { config }
    }

    /// Build the octree for `inputs` into `output_dir`, producing
    /// `octree.bin` plus the in-memory hierarchy. The directory must
    /// already exist; intermediate files are created and removed
    /// inside it.
    pub fn build(&self, inputs: &[PathBuf], output_dir: &Path) -> Result<BuildSummary> {
        if inputs.is_empty() {
            return Err(Error::MalformedSource("no input files given".to_string()));
        }

        let (bounds, layouts) = measure_inputs(inputs)?;
        let total_points: u64 = layouts.iter().map(|l| l.point_count).sum();
        let cube = bounds.to_cube();
        log::info!(
            "building octree over {} points from {} file(s), cube half size {:.3}",
            total_points,
            layouts.len(),
            cube.half_size
        );

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("octree-io")
            .enable_all()
            .build()
            .map_err(Error::Io)?;

        let point_budget = Arc::new(PointBudget::new(self.config.in_core_point_budget));
        let (writer, writer_handle) = OctreeWriter::start(
            runtime.handle(),
            output_dir.join("octree.bin"),
            Arc::clone(&point_budget),
        );

        let progress = Arc::new(Progress::new(total_points));
        let reporter = ProgressReporter::start(
            Arc::clone(&progress),
            Duration::from_secs_f64(self.config.progress_interval_secs.max(0.1)),
        );

        let ctx = Arc::new(BuildContext {
            config: self.config.clone(),
            output_dir: output_dir.to_path_buf(),
            runtime: runtime.handle().clone(),
            pool: WorkerPool::new(self.config.worker_threads)?,
            point_budget,
            file_budget: FileBudget::new(self.config.max_open_files),
            writer: writer_handle,
            progress: Arc::clone(&progress),
            completed: Mutex::new(Vec::new()),
        });

        let mut root = Node::new(String::new(), cube, total_points);
        let result = build_tree(&ctx, &mut root, &layouts);
        reporter.stop();

        // All writer handle clones live in the context; the writer
        // drains once it is gone.
        let pool_failed = ctx.pool.has_failed();
        drop(ctx);
        let records = writer.finish();

        result?;
        if pool_failed {
            return Err(Error::WorkerFailed);
        }
        let records = records?;

        // The depth-1 files were kept on disk for the root sample;
        // the writer is done with them now.
        if !root.is_leaf() {
            for child in root.children.iter().flatten() {
                let path = point_file(output_dir, &child.id);
                if path.exists() {
                    std::fs::remove_file(&path)?;
                }
            }
        }

        let blob_bytes = patch_offsets(&mut root, &records);

        let mut leaf_points = 0u64;
        root.visit(&mut |n| {
            if n.is_leaf() {
                leaf_points += n.point_count;
            }
        });
        if leaf_points != total_points {
            log::warn!(
                "leaf total {} differs from input total {}",
                leaf_points,
                total_points
            );
        }

        Ok(BuildSummary {
            root,
            total_points: leaf_points,
            blob_bytes,
        })
    }
}

fn build_tree(
    ctx: &Arc<BuildContext>,
    root: &mut Node,
    layouts: &[SourceLayout],
) -> Result<()> {
    let total = root.point_count;

    // Inputs small enough for one leaf never get partitioned at all.
    if total <= ctx.config.max_node_size as u64 {
        let path = point_file(&ctx.output_dir, &root.id);
        let mut sink = PointSink::create(&path, ctx.config.sink_batch_points)?;
        let mut batch = Vec::new();
        for layout in layouts {
            let mut source = open_source(&layout.path)?;
            loop {
                let n = source.read_batch(&mut batch, ctx.config.stream_batch_points)?;
                if n == 0 {
                    break;
                }
                sink.push_batch(&batch)?;
            }
        }
        let written = sink.finish()?;
        if written != total {
            return Err(Error::MalformedSource(format!(
                "inputs yielded {written} points, headers promised {total}"
            )));
        }
        ctx.progress.add(written);
        ctx.writer.submit_on_disk(&root.id, path, written, false)?;
        return Ok(());
    }

    distribute_root(ctx, root, layouts)?;
    dispatch_children(ctx, root, false)?;

    ctx.pool.wait();
    if ctx.pool.has_failed() {
        return Err(Error::WorkerFailed);
    }
    for subtree in ctx.completed.lock().unwrap().drain(..) {
        root.graft(subtree);
    }

    let sampled = sample_from_children(
        root,
        &ctx.output_dir,
        ctx.config.sampled_node_size,
        ctx.config.sample_seed,
    )?;
    ctx.writer.submit_on_disk(
        &root.id,
        point_file(&ctx.output_dir, &root.id),
        sampled,
        false,
    )?;
    Ok(())
}

/// First pass: parse every input once and route each point to one of
/// the eight top-level octant files. No sampling happens here; the
/// root's sample is drawn post-hoc after its subtrees are final.
fn distribute_root(
    ctx: &Arc<BuildContext>,
    root: &mut Node,
    layouts: &[SourceLayout],
) -> Result<()> {
    // Eight sinks plus the currently open input file.
    let _lease = ctx.file_budget.acquire(9);
    let mut sinks = octant_sinks(ctx, root)?;

    let mut batch = Vec::new();
    for layout in layouts {
        let mut source = open_source(&layout.path)?;
        loop {
            let n = source.read_batch(&mut batch, ctx.config.stream_batch_points)?;
            if n == 0 {
                break;
            }
            for p in &batch {
                sinks[octant_of(&root.bounds, p) as usize].push(*p)?;
            }
        }
    }

    attach_partitioned_children(root, sinks)?;
    let distributed: u64 = root.children.iter().flatten().map(|c| c.point_count).sum();
    if distributed != root.point_count {
        return Err(Error::MalformedSource(format!(
            "inputs yielded {distributed} points, headers promised {}",
            root.point_count
        )));
    }
    Ok(())
}

/// Handle a node whose points sit in its intermediate file: finalize
/// it as a leaf or split it.
fn process_node(ctx: &Arc<BuildContext>, node: &mut Node, is_async: bool) -> Result<()> {
    let count = node.point_count;
    if count <= ctx.config.max_node_size as u64 || node.depth() >= ctx.config.max_depth {
        if count > ctx.config.max_node_size as u64 {
            log::warn!(
                "node {} reached depth {} with {} points, keeping it as a leaf",
                node.id,
                node.depth(),
                count
            );
        }
        let path = point_file(&ctx.output_dir, &node.id);
        ctx.progress.add(count);
        ctx.writer
            .submit_on_disk(&node.id, path, count, node.depth() == 1)?;
        return Ok(());
    }

    if count <= ctx.config.in_core_node_threshold && ctx.point_budget.try_acquire(count) {
        in_core_split(ctx, node)
    } else {
        stream_split(ctx, node, is_async)
    }
}

/// Split a node in memory. The caller has already reserved the node's
/// point count from the budget; the writer returns the reservation as
/// the leaf buffers and samples reach the blob.
fn in_core_split(ctx: &Arc<BuildContext>, node: &mut Node) -> Result<()> {
    let path = point_file(&ctx.output_dir, &node.id);
    let bytes = std::fs::read(&path).map_err(|source| Error::SourceOpen {
        path: path.clone(),
        source,
    })?;
    if bytes.len() as u64 != node.point_count * POINT_RECORD_SIZE {
        return Err(Error::MalformedSource(format!(
            "intermediate file {} holds {} bytes, expected {} points",
            path.display(),
            bytes.len(),
            node.point_count
        )));
    }
    node.points = bytes_to_points(&bytes);
    drop(bytes);
    std::fs::remove_file(&path)?;
    in_memory_split(ctx, node)
}

fn in_memory_split(ctx: &Arc<BuildContext>, node: &mut Node) -> Result<()> {
    let count = node.points.len() as u64;
    if count <= ctx.config.max_node_size as u64 || node.depth() >= ctx.config.max_depth {
        if count > ctx.config.max_node_size as u64 {
            log::warn!(
                "node {} reached depth {} with {} points, keeping it as a leaf",
                node.id,
                node.depth(),
                count
            );
        }
        let points = node.take_points();
        node.point_count = count;
        if node.depth() == 1 {
            persist_sample(&ctx.output_dir, &node.id, &points)?;
        }
        ctx.progress.add(count);
        ctx.writer.submit_in_core(&node.id, points)?;
        return Ok(());
    }

    let points = node.take_points();
    let mut sampler = InterleavedSampler::new(count, ctx.config.sampled_node_size);
    let mut buckets: [Vec<Point>; 8] = Default::default();
    for p in points {
        sampler.offer(&p);
        buckets[octant_of(&node.bounds, &p) as usize].push(p);
    }

    let sample = sampler.finish();
    node.point_count = sample.len() as u64;
    // The sample is an extra copy on top of the subtree's reservation;
    // account for it so the writer's release stays symmetric.
    ctx.point_budget.acquire_untracked(sample.len() as u64);
    if node.depth() == 1 {
        persist_sample(&ctx.output_dir, &node.id, &sample)?;
    }
    ctx.writer.submit_in_core(&node.id, sample)?;

    for (index, bucket) in buckets.into_iter().enumerate() {
        if bucket.is_empty() {
            continue;
        }
        let child = node.attach_child(index as u8, bucket.len() as u64);
        child.points = bucket;
        in_memory_split(ctx, child)?;
    }
    Ok(())
}

/// Split a node by streaming its file through eight child sinks,
/// taking the node's interleaved sample in the same pass. Holds a file
/// lease only for the duration of the pass, not the recursion.
fn stream_split(ctx: &Arc<BuildContext>, node: &mut Node, is_async: bool) -> Result<()> {
    let input = point_file(&ctx.output_dir, &node.id);
    let expected = node.point_count;
    {
        let _lease = ctx.file_budget.acquire(9);
        let mut stream = PointStream::open(
            &ctx.runtime,
            input.clone(),
            ctx.config.stream_batch_points,
        );
        let mut sinks = octant_sinks(ctx, node)?;
        let mut sampler = InterleavedSampler::new(expected, ctx.config.sampled_node_size);

        let mut taken = 0u64;
        while let Some(batch) = stream.next_batch() {
            let batch = batch?;
            for p in &batch {
                sampler.offer(p);
                sinks[octant_of(&node.bounds, p) as usize].push(*p)?;
            }
            taken += batch.len() as u64;
        }
        if taken != expected {
            return Err(Error::MalformedSource(format!(
                "node {} file held {} points, expected {}",
                node.id, taken, expected
            )));
        }

        attach_partitioned_children(node, sinks)?;

        // The input file is consumed; its path now carries the sample.
        std::fs::remove_file(&input)?;
        let sample = sampler.finish();
        node.point_count = sample.len() as u64;
        persist_sample(&ctx.output_dir, &node.id, &sample)?;
        ctx.writer
            .submit_on_disk(&node.id, input, node.point_count, node.depth() == 1)?;
    }

    dispatch_children(ctx, node, is_async)
}

/// Recurse into a node's children. Outside a pool job, children above
/// the deferral threshold are detached and built as parallel jobs;
/// everything else is processed inline.
fn dispatch_children(ctx: &Arc<BuildContext>, node: &mut Node, is_async: bool) -> Result<()> {
    for index in 0..8 {
        let Some(count) = node.children[index].as_ref().map(|c| c.point_count) else {
            continue;
        };
        if !is_async && count >= ctx.config.deferred_split_threshold {
            let subtree = node.children[index].take().unwrap();
            spawn_subtree(ctx, subtree);
        } else {
            let child = node.children[index].as_deref_mut().unwrap();
            process_node(ctx, child, is_async)?;
        }
    }
    Ok(())
}

fn spawn_subtree(ctx: &Arc<BuildContext>, mut subtree: Box<Node>) {
    log::debug!(
        "deferring subtree {} ({} points) to the worker pool",
        subtree.id,
        subtree.point_count
    );
    let job_ctx = Arc::clone(ctx);
    ctx.pool.spawn(move || {
        if let Err(err) = process_node(&job_ctx, &mut subtree, true) {
            log::error!("subtree {} failed: {err}", subtree.id);
            job_ctx.pool.fail();
        }
        job_ctx.completed.lock().unwrap().push(subtree);
    });
}

fn octant_sinks(ctx: &BuildContext, node: &Node) -> Result<Vec<PointSink>> {
    (0..8u8)
        .map(|index| {
            let path = point_file(&ctx.output_dir, &node.child_id(index));
            PointSink::create(&path, ctx.config.sink_batch_points)
        })
        .collect()
}

/// Finish the octant sinks, attach the non-empty children and remove
/// the files of the empty ones.
fn attach_partitioned_children(node: &mut Node, sinks: Vec<PointSink>) -> Result<()> {
    for (index, sink) in sinks.into_iter().enumerate() {
        let path = sink.path().to_path_buf();
        let count = sink.finish()?;
        if count == 0 {
            std::fs::remove_file(&path)?;
            continue;
        }
        node.attach_child(index as u8, count);
    }
    debug_assert!(!node.is_leaf(), "partitioning produced no children");
    Ok(())
}

/// Assign every node its byte range from the writer's records.
/// Returns the blob size in bytes.
fn patch_offsets(root: &mut Node, records: &[WriteRecord]) -> u64 {
    let offsets: HashMap<&str, u64> = records
        .iter()
        .map(|r| (r.id.as_str(), r.byte_offset))
        .collect();
    root.visit_mut(&mut |node| {
        if let Some(&offset) = offsets.get(node.id.as_str()) {
            node.byte_offset = offset;
        }
    });
    records
        .iter()
        .map(|r| r.point_count * POINT_RECORD_SIZE)
        .sum()
}

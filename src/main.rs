use std::env;
use std::fs;

use anyhow::{anyhow, Context, Result};
use glam::{Vec3, Vec4};
use pollster::block_on;

use chunk_batcher::{
    BatchEngine, BatchError, CameraParams, ChunkScene, EmitStats, GpuBackend, RecordingBackend,
    RenderBackend, SceneNode,
};

const TARGET_WIDTH: u32 = 1280;
const TARGET_HEIGHT: u32 = 720;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let xml = fs::read_to_string(&options.path)
        .with_context(|| format!("failed to read chunk file {}", options.path))?;
    let scene = ChunkScene::from_xml(&xml).context("failed to parse chunk XML")?;

    println!(
        "Loaded chunk {} with {} boxes (capacity {} boxes per batch)",
        scene.coord,
        scene.box_count(),
        scene.config.box_capacity()
    );
    print_nodes(&scene.nodes, 1);

    if options.summary_only {
        return Ok(());
    }

    if options.gpu {
        match block_on(GpuBackend::headless(TARGET_WIDTH, TARGET_HEIGHT)) {
            Ok(backend) => return run_gpu(&backend, &scene),
            Err(err @ (BatchError::AdapterUnavailable | BatchError::DeviceRequest(_))) => {
                eprintln!("{err}. Falling back to the in-memory backend.");
            }
            Err(err) => return Err(err.into()),
        }
    }

    let (stats, engine) = batch_scene(&RecordingBackend, &scene)?;
    report(&stats);
    for (index, draw) in engine.mesh().draws().iter().enumerate() {
        println!(
            " - draw {index}: {} vertices (texture {})",
            draw.vertex_count, draw.texture
        );
    }
    Ok(())
}

fn run_gpu(backend: &GpuBackend, scene: &ChunkScene) -> Result<()> {
    backend.clear(Vec4::new(0.03, 0.03, 0.05, 1.0));
    let aspect = TARGET_WIDTH as f32 / TARGET_HEIGHT as f32;
    backend.update_camera(&CameraParams::looking_at(
        Vec3::new(12.0, 10.0, 16.0),
        Vec3::ZERO,
        60.0,
        aspect,
    ));
    let (stats, _engine) = batch_scene(backend, scene)?;
    report(&stats);
    println!("Submitted to GPU target {TARGET_WIDTH}x{TARGET_HEIGHT}");
    Ok(())
}

fn batch_scene<B: RenderBackend>(
    backend: &B,
    scene: &ChunkScene,
) -> Result<(EmitStats, BatchEngine<B>)> {
    let mut engine = BatchEngine::from_config(backend, &scene.config, scene.coord)
        .context("failed to create batch engine")?;
    let stats = scene.emit(&mut engine)?;
    Ok((stats, engine))
}

fn report(stats: &EmitStats) {
    println!(
        "Batched {} boxes in {} flush(es), {} vertices",
        stats.boxes, stats.flushes, stats.vertices
    );
}

fn print_nodes(nodes: &[SceneNode], depth: usize) {
    let indent = "  ".repeat(depth);
    for node in nodes {
        match node {
            SceneNode::Box(shape) => {
                let kind = if shape.probe { "probe" } else { "box" };
                println!(
                    "{indent}- {kind} {} at ({:.2}, {:.2}, {:.2})",
                    shape.name.as_deref().unwrap_or("<unnamed>"),
                    shape.position.x,
                    shape.position.y,
                    shape.position.z
                );
            }
            SceneNode::Group(group) => {
                println!("{indent}- group ({} children)", group.children.len());
                print_nodes(&group.children, depth + 1);
            }
        }
    }
}

struct CliOptions {
    path: String,
    gpu: bool,
    summary_only: bool,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        let mut args = env::args().skip(1);
        let Some(path) = args.next() else {
            return Err(anyhow!(
                "Usage: chunk-batcher <chunk.xml> [--gpu] [--summary-only]"
            ));
        };
        let mut gpu = false;
        let mut summary_only = false;
        for arg in args {
            match arg.as_str() {
                "--gpu" => gpu = true,
                "--summary-only" => summary_only = true,
                other => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Expected --gpu or --summary-only"
                    ));
                }
            }
        }
        Ok(Self {
            path,
            gpu,
            summary_only,
        })
    }
}

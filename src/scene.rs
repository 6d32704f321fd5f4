use std::fmt;

use anyhow::{anyhow, bail, Context, Result};
use glam::{IVec3, Mat4, Vec3, Vec4};
use log::debug;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::batch::BatchEngine;
use crate::config::BatchConfig;
use crate::render::RenderBackend;
use crate::vertex::SLOTS_PER_BOX;

/// Integer coordinates of the chunk a batch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ChunkCoord(pub IVec3);

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.0.x, self.0.y, self.0.z)
    }
}

/// Box geometry of one chunk, as described by the world tools.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChunkScene {
    pub coord: ChunkCoord,
    pub config: BatchConfig,
    pub nodes: Vec<SceneNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SceneNode {
    Box(BoxShape),
    Group(Group),
}

/// An axis-aligned box before its parents' transforms are applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxShape {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub position: Vec3,
    /// Half-extents.
    #[serde(default = "default_size")]
    pub size: Vec3,
    /// Euler angles in degrees, applied Z * Y * X.
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default = "default_color")]
    pub color: Vec4,
    /// Drawn through the diagnostic path.
    #[serde(default)]
    pub probe: bool,
}

impl Default for BoxShape {
    fn default() -> Self {
        Self {
            name: None,
            position: Vec3::ZERO,
            size: default_size(),
            rotation: Vec3::ZERO,
            color: default_color(),
            probe: false,
        }
    }
}

/// Children sharing one model transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
    pub children: Vec<SceneNode>,
}

impl Default for Group {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            children: Vec::new(),
        }
    }
}

impl Group {
    pub fn matrix(&self) -> Mat4 {
        model_matrix(self.position, self.rotation, self.scale)
    }
}

/// Counters reported after a scene has been batched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmitStats {
    pub boxes: usize,
    pub flushes: usize,
    pub vertices: u64,
}

impl ChunkScene {
    /// Parses the chunk XML produced by the world tools.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid chunk XML")?;
        let root = document.root_element();
        if !root.has_tag_name("chunk") {
            bail!("expected <chunk> root element, found <{}>", root.tag_name().name());
        }

        let coord = ChunkCoord(parse_ivec3(optional_text(&root, "coord"), IVec3::ZERO)?);
        let mut config = BatchConfig::default();
        if let Some(batch) = root.children().find(|n| n.has_tag_name("batch")) {
            parse_batch_config(&batch, &mut config)?;
        }
        let nodes = parse_nodes(&root)?;

        Ok(Self {
            coord,
            config,
            nodes,
        })
    }

    /// Total number of boxes, including nested ones.
    pub fn box_count(&self) -> usize {
        count_boxes(&self.nodes)
    }

    /// Feeds every box into `engine`, flushing whenever the next box would
    /// not fit and once more at the end.
    pub fn emit<B: RenderBackend>(&self, engine: &mut BatchEngine<B>) -> Result<EmitStats> {
        if engine.capacity() < SLOTS_PER_BOX {
            bail!(
                "batch capacity of {} slots cannot hold a single box ({SLOTS_PER_BOX} slots)",
                engine.capacity()
            );
        }
        let mut stats = EmitStats::default();
        emit_nodes(&self.nodes, engine, &mut stats);
        if engine.cursor() > 0 {
            stats.vertices += u64::from(engine.flush());
            stats.flushes += 1;
        }
        debug!(
            "chunk {} emitted {} boxes in {} flush(es)",
            self.coord, stats.boxes, stats.flushes
        );
        Ok(stats)
    }
}

fn emit_nodes<B: RenderBackend>(
    nodes: &[SceneNode],
    engine: &mut BatchEngine<B>,
    stats: &mut EmitStats,
) {
    for node in nodes {
        match node {
            SceneNode::Group(group) => {
                engine.push_matrix(group.matrix());
                emit_nodes(&group.children, engine, stats);
                engine.pop_matrix();
            }
            SceneNode::Box(shape) => {
                if engine.remaining_slots() < SLOTS_PER_BOX {
                    stats.vertices += u64::from(engine.flush());
                    stats.flushes += 1;
                }
                emit_box(shape, engine);
                stats.boxes += 1;
            }
        }
    }
}

fn emit_box<B: RenderBackend>(shape: &BoxShape, engine: &mut BatchEngine<B>) {
    let rotated = shape.rotation != Vec3::ZERO;
    let center = if rotated {
        engine.push_matrix(model_matrix(shape.position, shape.rotation, Vec3::ONE));
        Vec3::ZERO
    } else {
        shape.position
    };
    if shape.probe {
        engine.test(center, shape.size);
    } else {
        engine.emit_box_tinted(center, shape.size, shape.color);
    }
    if rotated {
        engine.pop_matrix();
    }
}

fn count_boxes(nodes: &[SceneNode]) -> usize {
    nodes
        .iter()
        .map(|node| match node {
            SceneNode::Box(_) => 1,
            SceneNode::Group(group) => count_boxes(&group.children),
        })
        .sum()
}

fn model_matrix(position: Vec3, rotation: Vec3, scale: Vec3) -> Mat4 {
    let translation = Mat4::from_translation(position);
    let rotation = Mat4::from_rotation_z(rotation.z.to_radians())
        * Mat4::from_rotation_y(rotation.y.to_radians())
        * Mat4::from_rotation_x(rotation.x.to_radians());
    let scale = Mat4::from_scale(scale);
    translation * rotation * scale
}

fn parse_nodes(parent: &Node<'_, '_>) -> Result<Vec<SceneNode>> {
    let mut nodes = Vec::new();
    for node in parent.children().filter(Node::is_element) {
        match node.tag_name().name() {
            "box" | "probe" => {
                let shape = parse_box(&node, node.has_tag_name("probe"))?;
                nodes.push(SceneNode::Box(shape));
            }
            "group" => {
                let group = Group {
                    position: parse_vec3(optional_text(&node, "position"), Vec3::ZERO)?,
                    rotation: parse_vec3(optional_text(&node, "rotation"), Vec3::ZERO)?,
                    scale: parse_vec3(optional_text(&node, "scale"), Vec3::ONE)?,
                    children: parse_nodes(&node)?,
                };
                nodes.push(SceneNode::Group(group));
            }
            _ => {}
        }
    }
    Ok(nodes)
}

fn parse_box(node: &Node<'_, '_>, probe: bool) -> Result<BoxShape> {
    let mut shape = BoxShape {
        probe,
        ..BoxShape::default()
    };
    shape.name = optional_text(node, "name");
    let what = shape.name.as_deref().unwrap_or("unnamed box").to_string();
    shape.position = parse_vec3(optional_text(node, "position"), shape.position)
        .with_context(|| format!("bad <position> on {what}"))?;
    shape.size = parse_vec3(optional_text(node, "size"), shape.size)
        .with_context(|| format!("bad <size> on {what}"))?;
    shape.rotation = parse_vec3(optional_text(node, "rotation"), shape.rotation)
        .with_context(|| format!("bad <rotation> on {what}"))?;
    shape.color = parse_color(optional_text(node, "color"), shape.color)
        .with_context(|| format!("bad <color> on {what}"))?;
    Ok(shape)
}

fn parse_batch_config(node: &Node<'_, '_>, config: &mut BatchConfig) -> Result<()> {
    if let Some(boxes) = optional_text(node, "capacity") {
        let boxes = boxes
            .parse::<usize>()
            .map_err(|err| anyhow!("failed to parse <capacity>: {err}"))?;
        if boxes == 0 {
            bail!("<capacity> must hold at least one box");
        }
        let Some(slots) = boxes.checked_mul(SLOTS_PER_BOX) else {
            bail!("<capacity> of {boxes} boxes is too large");
        };
        config.capacity_slots = slots;
    }
    if let sun @ Some(_) = optional_text(node, "sun") {
        config.sun = Some(parse_vec3(sun, Vec3::Y)?);
    }
    if let Some(label) = optional_text(node, "label") {
        config.label = label;
    }
    Ok(())
}

fn default_size() -> Vec3 {
    Vec3::splat(0.5)
}

fn default_color() -> Vec4 {
    Vec4::ONE
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let numbers = value
        .split_whitespace()
        .map(|component| component.parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| anyhow!("failed to parse vector: {err}"))?;
    match numbers.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(anyhow!("vector needs 3 components, got {}", numbers.len())),
    }
}

fn parse_ivec3(value: Option<String>, default: IVec3) -> Result<IVec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let numbers = value
        .split_whitespace()
        .map(|component| component.parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| anyhow!("failed to parse chunk coordinate: {err}"))?;
    match numbers.as_slice() {
        [x, y, z] => Ok(IVec3::new(*x, *y, *z)),
        _ => Err(anyhow!("chunk coordinate needs 3 components")),
    }
}

/// `r g b [a]` in 0..=255.
fn parse_color(value: Option<String>, default: Vec4) -> Result<Vec4> {
    let Some(value) = value else {
        return Ok(default);
    };
    let numbers = value
        .split_whitespace()
        .map(|component| component.parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| anyhow!("failed to parse color: {err}"))?;
    let rgba = match numbers.as_slice() {
        [r, g, b] => Vec4::new(*r, *g, *b, 255.0),
        [r, g, b, a] => Vec4::new(*r, *g, *b, *a),
        _ => bail!("color is missing components"),
    };
    Ok(rgba / 255.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RecordingBackend;

    const SAMPLE: &str = r#"
    <chunk>
        <coord>2 0 -1</coord>
        <batch>
            <capacity>2</capacity>
            <sun>0 1 0</sun>
            <label>test-chunk</label>
        </batch>
        <box>
            <name>Floor</name>
            <position>0 -1 0</position>
            <size>4 0.5 4</size>
            <color>255 128 0</color>
        </box>
        <group>
            <position>0 2 0</position>
            <rotation>0 45 0</rotation>
            <box><name>Crate</name></box>
            <group>
                <scale>2 2 2</scale>
                <box><name>Big</name></box>
            </group>
        </group>
        <probe><position>5 5 5</position></probe>
    </chunk>
    "#;

    #[test]
    fn parse_chunk_populates_nodes_and_config() {
        let scene = ChunkScene::from_xml(SAMPLE).unwrap();
        assert_eq!(scene.coord, ChunkCoord(IVec3::new(2, 0, -1)));
        assert_eq!(scene.config.box_capacity(), 2);
        assert_eq!(scene.config.sun, Some(Vec3::Y));
        assert_eq!(scene.config.label, "test-chunk");
        assert_eq!(scene.nodes.len(), 3);
        assert_eq!(scene.box_count(), 4);

        let SceneNode::Box(floor) = &scene.nodes[0] else {
            panic!("first node should be a box");
        };
        assert_eq!(floor.name.as_deref(), Some("Floor"));
        assert_eq!(floor.size, Vec3::new(4.0, 0.5, 4.0));
        assert_eq!(floor.color, Vec4::new(1.0, 128.0 / 255.0, 0.0, 1.0));

        let SceneNode::Group(group) = &scene.nodes[1] else {
            panic!("second node should be a group");
        };
        assert_eq!(group.rotation, Vec3::new(0.0, 45.0, 0.0));
        assert_eq!(group.children.len(), 2);

        let SceneNode::Box(probe) = &scene.nodes[2] else {
            panic!("third node should be a probe");
        };
        assert!(probe.probe);
        assert_eq!(probe.size, Vec3::splat(0.5));
    }

    #[test]
    fn emit_flushes_before_overflow() {
        let scene = ChunkScene::from_xml(SAMPLE).unwrap();
        let mut engine =
            BatchEngine::from_config(&RecordingBackend, &scene.config, scene.coord).unwrap();
        let stats = scene.emit(&mut engine).unwrap();
        assert_eq!(stats.boxes, 4);
        assert_eq!(stats.flushes, 2);
        assert_eq!(stats.vertices, 4 * 36);
        assert_eq!(engine.cursor(), 0);
        assert_eq!(engine.depth(), 0);
        let counts: Vec<u32> = engine.mesh().draws().iter().map(|d| d.vertex_count).collect();
        assert_eq!(counts, vec![72, 72]);
    }

    #[test]
    fn nested_groups_compose_transforms() {
        let xml = r#"
        <chunk>
            <group>
                <position>10 0 0</position>
                <group>
                    <scale>2 2 2</scale>
                    <box><size>1 1 1</size></box>
                </group>
            </group>
        </chunk>"#;
        let scene = ChunkScene::from_xml(xml).unwrap();
        let mut engine =
            BatchEngine::from_config(&RecordingBackend, &scene.config, scene.coord).unwrap();
        scene.emit(&mut engine).unwrap();
        for vertex in engine.mesh().uploaded() {
            let p = vertex.position();
            assert!((p.x - 10.0).abs() <= 2.0 + 1e-5);
            assert!(p.y.abs() <= 2.0 + 1e-5);
        }
    }

    #[test]
    fn empty_chunk_emits_nothing() {
        let scene = ChunkScene::from_xml("<chunk/>").unwrap();
        let mut engine =
            BatchEngine::from_config(&RecordingBackend, &scene.config, scene.coord).unwrap();
        let stats = scene.emit(&mut engine).unwrap();
        assert_eq!(stats, EmitStats::default());
        assert!(engine.mesh().draws().is_empty());
    }

    #[test]
    fn tiny_capacity_is_an_error() {
        let scene = ChunkScene::from_xml("<chunk><box/></chunk>").unwrap();
        let mut engine = BatchEngine::new(&RecordingBackend, 6, scene.coord).unwrap();
        assert!(scene.emit(&mut engine).is_err());
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(ChunkScene::from_xml("<scene/>").is_err());
        assert!(ChunkScene::from_xml("<chunk><box><size>1 2</size></box></chunk>").is_err());
        assert!(ChunkScene::from_xml("<chunk><coord>1 x 2</coord></chunk>").is_err());
        assert!(
            ChunkScene::from_xml("<chunk><batch><capacity>0</capacity></batch></chunk>").is_err()
        );
        let huge = format!("<chunk><batch><capacity>{}</capacity></batch></chunk>", usize::MAX);
        let err = ChunkScene::from_xml(&huge).unwrap_err();
        assert!(format!("{err:#}").contains("too large"), "{err:#}");
    }
}

//! Workspace definition and the interaction zone extruded above it.
//!
//! The workspace is four world-space corners picked on the physical surface.
//! The interaction zone is the prism between those corners and the same
//! corners pushed out along their face normals by the zone height.

use bytemuck::{Pod, Zeroable};
use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TouchError};

/// Corners making up a workspace.
pub const WORKSPACE_CORNERS: usize = 4;

/// Bottom face, two triangles over corners 0..4.
pub const BOTTOM_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

/// Top face then the four sides. Top vertex `i + 4` sits above corner `i`.
const UPPER_INDICES: [u32; 30] = [
    4, 5, 6, 4, 6, 7, // top
    0, 4, 5, 0, 5, 1, // side 0-1
    1, 5, 6, 1, 6, 2, // side 1-2
    2, 6, 7, 2, 7, 3, // side 2-3
    3, 7, 4, 3, 4, 0, // side 3-0
];

/// Accumulate per-triangle face normals onto the vertices they touch.
///
/// Each triangle `(a, b, c)` contributes `(v[c] - v[b]) x (v[a] - v[b])` to
/// all three of its vertices, unnormalised, so counter-clockwise triangles
/// seen from above get normals pointing up. Triangles referencing a vertex
/// outside `vertices` are skipped. With `scale_to`, every accumulated normal
/// is then rescaled to that length.
pub fn calc_normals(vertices: &[DVec3], indices: &[u32], scale_to: Option<f64>) -> Vec<DVec3> {
    let mut normals = vec![DVec3::ZERO; vertices.len()];

    for tri in indices.chunks_exact(3) {
        let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        if a.max(b).max(c) >= vertices.len() {
            log::warn!("skipping triangle ({}, {}, {}) past {} vertices", a, b, c, vertices.len());
            continue;
        }
        let e1 = vertices[a] - vertices[b];
        let e2 = vertices[c] - vertices[b];
        let face = e2.cross(e1);
        normals[a] += face;
        normals[b] += face;
        normals[c] += face;
    }

    if let Some(length) = scale_to {
        for n in &mut normals {
            *n = n.normalize_or_zero() * length;
        }
    }
    normals
}

/// Four corners in acquisition order, in world space and in the 2D frame
/// they were picked in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkspaceQuad {
    world: Vec<DVec3>,
    display: Vec<DVec2>,
}

impl WorkspaceQuad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a corner. Returns false once the quad is already complete.
    pub fn push(&mut self, world: DVec3, display: DVec2) -> bool {
        if self.is_complete() {
            return false;
        }
        self.world.push(world);
        self.display.push(display);
        true
    }

    pub fn len(&self) -> usize {
        self.world.len()
    }

    pub fn is_empty(&self) -> bool {
        self.world.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.world.len() == WORKSPACE_CORNERS
    }

    pub fn world(&self) -> &[DVec3] {
        &self.world
    }

    /// The closed 2D polygon used for touch classification.
    pub fn display(&self) -> &[DVec2] {
        &self.display
    }

    pub fn corners(&self) -> Option<[DVec3; WORKSPACE_CORNERS]> {
        self.world.as_slice().try_into().ok()
    }

    pub fn clear(&mut self) {
        self.world.clear();
        self.display.clear();
    }
}

/// Sensor axis the zone's depth offset and depth band are measured along.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthAxis {
    #[default]
    Z,
    Y,
}

impl DepthAxis {
    fn of(self, v: DVec3) -> f64 {
        match self {
            DepthAxis::Z => v.z,
            DepthAxis::Y => v.y,
        }
    }

    fn of_mut(self, v: &mut DVec3) -> &mut f64 {
        match self {
            DepthAxis::Z => &mut v.z,
            DepthAxis::Y => &mut v.y,
        }
    }
}

/// Vertex layout handed to a renderer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ZoneVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

/// Closed hexahedral prism above the workspace.
#[derive(Debug, Clone)]
pub struct InteractionZone {
    vertices: Vec<DVec3>,
    indices: Vec<u32>,
    /// Unit face normals of the bottom corners.
    directions: Vec<DVec3>,
    /// `directions` scaled to the current height.
    normals: Vec<DVec3>,
    zone_height: f64,
    z_offset: f64,
    prev_offset: f64,
    depth_axis: DepthAxis,
    base_centroid: DVec3,
    top_centroid: DVec3,
    btm_centroid: DVec3,
}

impl InteractionZone {
    /// An empty zone. Offsets move it along sensor Z unless another depth
    /// axis is chosen.
    pub fn new(zone_height: f64, z_offset: f64) -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            directions: Vec::new(),
            normals: Vec::new(),
            zone_height,
            z_offset,
            prev_offset: 0.0,
            depth_axis: DepthAxis::Z,
            base_centroid: DVec3::ZERO,
            top_centroid: DVec3::ZERO,
            btm_centroid: DVec3::ZERO,
        }
    }

    pub fn with_depth_axis(mut self, depth_axis: DepthAxis) -> Self {
        self.depth_axis = depth_axis;
        self
    }

    /// Build the prism over `corners`, which must wind counter-clockwise as
    /// seen from the side the zone should extend to. The configured depth
    /// offset is applied afterwards.
    pub fn build(&mut self, corners: [DVec3; WORKSPACE_CORNERS]) -> Result<()> {
        let accumulated = calc_normals(&corners, &BOTTOM_INDICES, None);
        let directions: Vec<DVec3> = accumulated.iter().map(|n| n.normalize_or_zero()).collect();
        if directions.iter().any(|d| *d == DVec3::ZERO) {
            return Err(TouchError::DegenerateGeometry(
                "workspace corners do not span a plane".to_string(),
            ));
        }

        self.vertices = corners.to_vec();
        self.directions = directions;
        self.normals = self.directions.iter().map(|d| *d * self.zone_height).collect();
        for (corner, normal) in corners.iter().zip(&self.normals) {
            self.vertices.push(*corner + *normal);
        }

        self.indices = BOTTOM_INDICES.iter().chain(UPPER_INDICES.iter()).copied().collect();
        self.update_centroids();
        self.base_centroid = self.btm_centroid;

        // The depth sensor sits at the world origin.
        let facing = self.directions[0].dot(-self.base_centroid);
        if facing < 0.0 {
            log::warn!("workspace normals point away from the sensor; corners may be wound clockwise");
        }

        self.prev_offset = 0.0;
        let offset = self.z_offset;
        self.update_z_offset(offset);

        log::info!(
            "interaction zone built: base ({:.1}, {:.1}, {:.1}), height {:.1}",
            self.base_centroid.x,
            self.base_centroid.y,
            self.base_centroid.z,
            self.zone_height
        );
        Ok(())
    }

    /// Resize the zone. Top vertices are recomputed from the bottom ones.
    pub fn update_zone_height(&mut self, height: f64) {
        self.zone_height = height;
        if !self.is_built() {
            return;
        }

        for (normal, direction) in self.normals.iter_mut().zip(&self.directions) {
            *normal = *direction * height;
        }
        for i in 0..WORKSPACE_CORNERS {
            self.vertices[i + WORKSPACE_CORNERS] = self.vertices[i] + self.normals[i];
        }
        self.update_centroids();
    }

    /// Move the whole prism along the depth axis to `offset`, relative to the
    /// offset last applied.
    pub fn update_z_offset(&mut self, offset: f64) {
        self.z_offset = offset;
        if !self.is_built() {
            return;
        }

        let delta = offset - self.prev_offset;
        let axis = self.depth_axis;
        for v in &mut self.vertices {
            *axis.of_mut(v) += delta;
        }
        self.update_centroids();
        self.prev_offset = offset;
    }

    /// Drop all geometry. Height and offset settings are kept.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.directions.clear();
        self.normals.clear();
        self.prev_offset = 0.0;
        self.base_centroid = DVec3::ZERO;
        self.top_centroid = DVec3::ZERO;
        self.btm_centroid = DVec3::ZERO;
    }

    pub fn is_built(&self) -> bool {
        !self.vertices.is_empty()
    }

    fn update_centroids(&mut self) {
        let (bottom, top) = self.vertices.split_at(WORKSPACE_CORNERS);
        self.btm_centroid = bottom.iter().copied().sum::<DVec3>() / WORKSPACE_CORNERS as f64;
        self.top_centroid = top.iter().copied().sum::<DVec3>() / WORKSPACE_CORNERS as f64;
    }

    pub fn vertices(&self) -> &[DVec3] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Bottom-corner normals, each as long as the zone is high.
    pub fn normals(&self) -> &[DVec3] {
        &self.normals
    }

    pub fn depth_axis(&self) -> DepthAxis {
        self.depth_axis
    }

    pub fn zone_height(&self) -> f64 {
        self.zone_height
    }

    pub fn z_offset(&self) -> f64 {
        self.z_offset
    }

    /// Bottom centroid at build time, before any offset.
    pub fn base_centroid(&self) -> DVec3 {
        self.base_centroid
    }

    pub fn top_centroid(&self) -> DVec3 {
        self.top_centroid
    }

    pub fn btm_centroid(&self) -> DVec3 {
        self.btm_centroid
    }

    /// Whether `point` lies strictly between the top and bottom centroids
    /// along the depth axis.
    pub fn in_depth_band(&self, point: DVec3) -> bool {
        if !self.is_built() {
            return false;
        }
        let axis = self.depth_axis;
        let (a, b) = (axis.of(self.top_centroid), axis.of(self.btm_centroid));
        let d = axis.of(point);
        d > a.min(b) && d < a.max(b)
    }

    /// Whether `point` lies inside the prism, boundary included.
    pub fn contains(&self, point: DVec3) -> bool {
        if !self.is_built() {
            return false;
        }
        let center = self.vertices.iter().copied().sum::<DVec3>() / self.vertices.len() as f64;

        self.indices.chunks_exact(3).all(|tri| {
            let v0 = self.vertices[tri[0] as usize];
            let v1 = self.vertices[tri[1] as usize];
            let v2 = self.vertices[tri[2] as usize];
            let n = (v1 - v0).cross(v2 - v0);
            if n.length_squared() < 1e-18 {
                return true;
            }
            let inside = n.dot(center - v0).signum();
            n.dot(point - v0) * inside >= -1e-9 * n.length()
        })
    }

    /// Vertices with per-corner unit normals, ready for upload.
    pub fn mesh_vertices(&self) -> Vec<ZoneVertex> {
        self.vertices
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let n = self.directions[i % WORKSPACE_CORNERS];
                ZoneVertex {
                    position: v.as_vec3().to_array(),
                    normal: n.as_vec3().to_array(),
                }
            })
            .collect()
    }

    pub fn mesh_bytes(vertices: &[ZoneVertex]) -> &[u8] {
        bytemuck::cast_slice(vertices)
    }
}

/// The authored workspace and the zone built from it.
#[derive(Debug, Clone)]
pub struct WorkspaceVolume {
    quad: WorkspaceQuad,
    zone: InteractionZone,
}

impl WorkspaceVolume {
    pub fn new(zone_height: f64, z_offset: f64) -> Self {
        Self {
            quad: WorkspaceQuad::new(),
            zone: InteractionZone::new(zone_height, z_offset),
        }
    }

    pub fn with_depth_axis(mut self, depth_axis: DepthAxis) -> Self {
        self.zone = self.zone.with_depth_axis(depth_axis);
        self
    }

    /// Add a corner. The zone is built when the fourth arrives; further
    /// corners are ignored until `clear`. Returns whether the workspace is defined.
    pub fn add_point(&mut self, world: DVec3, display: DVec2) -> Result<bool> {
        if self.is_defined() {
            log::debug!("workspace already defined, ignoring point");
            return Ok(true);
        }
        self.quad.push(world, display);
        log::info!(
            "workspace corner {}/{} at ({:.1}, {:.1}, {:.1})",
            self.quad.len(),
            WORKSPACE_CORNERS,
            world.x,
            world.y,
            world.z
        );

        if let Some(corners) = self.quad.corners() {
            if let Err(err) = self.zone.build(corners) {
                self.quad.clear();
                return Err(err);
            }
        }
        Ok(self.is_defined())
    }

    pub fn is_defined(&self) -> bool {
        self.quad.is_complete() && self.zone.is_built()
    }

    pub fn clear(&mut self) {
        self.quad.clear();
        self.zone.clear();
        log::info!("workspace cleared");
    }

    pub fn set_zone_height(&mut self, height: f64) {
        self.zone.update_zone_height(height);
    }

    pub fn set_z_offset(&mut self, offset: f64) {
        self.zone.update_z_offset(offset);
    }

    pub fn quad(&self) -> &WorkspaceQuad {
        &self.quad
    }

    pub fn zone(&self) -> &InteractionZone {
        &self.zone
    }
}

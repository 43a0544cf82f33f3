use super::backend::{BackendStatus, FrameClock, VisualBackend};
use super::palette::{backdrop, hsv_to_rgb, mood_hue};
use crate::features::{AnalysisSnapshot, AnimationFeatures, FeaturePipeline};
use crate::gpu::GpuProvider;
use crate::quality::QualityProfile;
use crate::surface::Surface;
use std::f32::consts::PI;
use std::fmt;

/// Camera distance from the mesh centre, in mesh units.
const CAMERA_Z: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SceneShape {
    #[default]
    Icosahedron,
    Cube,
    Octahedron,
    Torus,
}

impl SceneShape {
    pub const ALL: [Self; 4] = [Self::Icosahedron, Self::Cube, Self::Octahedron, Self::Torus];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cube" | "box" => Some(Self::Cube),
            "octahedron" | "octa" => Some(Self::Octahedron),
            "icosahedron" | "ico" | "sphere" => Some(Self::Icosahedron),
            "torus" | "donut" => Some(Self::Torus),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Cube => "cube",
            Self::Octahedron => "octahedron",
            Self::Icosahedron => "icosahedron",
            Self::Torus => "torus",
        }
    }
}

impl fmt::Display for SceneShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<[f32; 3]>,
    pub edges: Vec<(usize, usize)>,
}

impl Mesh {
    /// Unit-radius wireframe. `detail` only affects the torus.
    pub fn build(shape: SceneShape, detail: bool) -> Self {
        match shape {
            SceneShape::Cube => {
                let s = 1.0 / 3f32.sqrt();
                let mut vertices = Vec::with_capacity(8);
                for i in 0..8 {
                    let sx = if i & 1 == 0 { -s } else { s };
                    let sy = if i & 2 == 0 { -s } else { s };
                    let sz = if i & 4 == 0 { -s } else { s };
                    vertices.push([sx, sy, sz]);
                }
                Self::from_nearest(vertices)
            }
            SceneShape::Octahedron => Self::from_nearest(vec![
                [1.0, 0.0, 0.0],
                [-1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, -1.0, 0.0],
                [0.0, 0.0, 1.0],
                [0.0, 0.0, -1.0],
            ]),
            SceneShape::Icosahedron => {
                let phi = (1.0 + 5f32.sqrt()) * 0.5;
                let n = (1.0 + phi * phi).sqrt();
                let (a, b) = (1.0 / n, phi / n);
                Self::from_nearest(vec![
                    [-a, b, 0.0],
                    [a, b, 0.0],
                    [-a, -b, 0.0],
                    [a, -b, 0.0],
                    [0.0, -a, b],
                    [0.0, a, b],
                    [0.0, -a, -b],
                    [0.0, a, -b],
                    [b, 0.0, -a],
                    [b, 0.0, a],
                    [-b, 0.0, -a],
                    [-b, 0.0, a],
                ])
            }
            SceneShape::Torus => {
                let (major, minor) = if detail { (24, 10) } else { (12, 5) };
                let (rr, r) = (0.72, 0.28);
                let mut vertices = Vec::with_capacity(major * minor);
                let mut edges = Vec::with_capacity(major * minor * 2);
                for i in 0..major {
                    let u = i as f32 / major as f32 * 2.0 * PI;
                    for j in 0..minor {
                        let v = j as f32 / minor as f32 * 2.0 * PI;
                        let ring = rr + r * v.cos();
                        vertices.push([ring * u.cos(), r * v.sin(), ring * u.sin()]);
                        let idx = i * minor + j;
                        edges.push((idx, i * minor + (j + 1) % minor));
                        edges.push((idx, ((i + 1) % major) * minor + j));
                    }
                }
                Self { vertices, edges }
            }
        }
    }

    /// Connects every vertex pair at the minimum pairwise distance (the polyhedron's edges).
    fn from_nearest(vertices: Vec<[f32; 3]>) -> Self {
        let dist = |a: [f32; 3], b: [f32; 3]| {
            ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
        };
        let mut min = f32::MAX;
        for i in 0..vertices.len() {
            for j in i + 1..vertices.len() {
                min = min.min(dist(vertices[i], vertices[j]));
            }
        }
        let mut edges = Vec::new();
        for i in 0..vertices.len() {
            for j in i + 1..vertices.len() {
                if dist(vertices[i], vertices[j]) <= min * 1.01 {
                    edges.push((i, j));
                }
            }
        }
        Self { vertices, edges }
    }
}

pub struct SceneRenderer {
    shape: SceneShape,
    pipeline: FeaturePipeline,
    profile: Option<QualityProfile>,
    mesh: Mesh,
    mesh_detail: bool,
    yaw: f32,
    pitch: f32,
    projected: Vec<(f32, f32, f32)>,
}

impl SceneRenderer {
    pub fn new(pipeline: FeaturePipeline) -> Self {
        let shape = SceneShape::default();
        Self {
            shape,
            pipeline,
            profile: None,
            mesh: Mesh::build(shape, true),
            mesh_detail: true,
            yaw: 0.0,
            pitch: 0.0,
            projected: Vec::new(),
        }
    }

    pub fn shape(&self) -> SceneShape {
        self.shape
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn set_shape(&mut self, shape: SceneShape) {
        if shape != self.shape {
            tracing::debug!(from = %self.shape, to = %shape, "scene shape");
            self.shape = shape;
            self.mesh = Mesh::build(shape, self.mesh_detail);
        }
    }

    fn use_3d(&self) -> bool {
        self.profile.is_some_and(|p| p.use_3d)
    }

    fn draw(&mut self, dt: f32, out: &mut Surface) {
        let f = self.pipeline.features();
        let (bass, mid, energy, beat) = (f.bass, f.mid, f.energy, f.beat_pulse);
        let hue = mood_hue(f);
        let bg = backdrop(f);
        let t = f.t;

        self.yaw = (self.yaw + dt * (0.35 + 1.2 * mid)) % (2.0 * PI);
        self.pitch = (self.pitch + dt * (0.2 + 0.8 * energy)) % (2.0 * PI);

        out.clear(bg);
        let (w, h) = (out.width() as f32, out.height() as f32);
        let (cx, cy) = (w * 0.5, h * 0.5);
        let min_dim = w.min(h);
        let scale = min_dim * 0.28 * (1.0 + 0.35 * bass + 0.25 * beat);
        let thickness = (min_dim / 240.0).max(1.0);
        let use_3d = self.use_3d();

        let (sy, cyaw) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        let roll = 0.15 * (t * 0.3).sin();
        let (sr, cr) = roll.sin_cos();

        self.projected.clear();
        for v in &self.mesh.vertices {
            if use_3d {
                // yaw about Y, pitch about X, a gentle roll about Z
                let x1 = v[0] * cyaw + v[2] * sy;
                let z1 = -v[0] * sy + v[2] * cyaw;
                let y2 = v[1] * cp - z1 * sp;
                let z2 = v[1] * sp + z1 * cp;
                let x3 = x1 * cr - y2 * sr;
                let y3 = x1 * sr + y2 * cr;
                let persp = 2.2 / (z2 + CAMERA_Z);
                self.projected
                    .push((cx + x3 * scale * persp, cy + y3 * scale * persp, z2));
            } else {
                // Flat silhouette: spin in the screen plane only.
                let x = v[0] * cyaw - v[1] * sy;
                let y = v[0] * sy + v[1] * cyaw;
                self.projected.push((cx + x * scale, cy + y * scale, 0.0));
            }
        }

        for &(a, b) in &self.mesh.edges {
            let (x0, y0, z0) = self.projected[a];
            let (x1, y1, z1) = self.projected[b];
            let (value, k) = if use_3d {
                let depth = ((z0 + z1) * 0.5 + 1.0) * 0.5;
                ((1.0 - 0.6 * depth.clamp(0.0, 1.0)).max(0.25), 0.85)
            } else {
                (0.85, 0.8)
            };
            let rgb = hsv_to_rgb(hue + 0.15 * value, 0.8, (value + 0.2 * beat).min(1.0));
            out.draw_line(x0, y0, x1, y1, thickness, rgb, k);
        }

        if use_3d && beat > 0.2 {
            let rgb = hsv_to_rgb(hue + 0.5, 0.4, 1.0);
            for &(x, y, _) in &self.projected {
                out.splat(x, y, thickness * (1.0 + 2.0 * beat), rgb, beat);
            }
        }

        if self.profile.is_some_and(|p| p.post_processing_enabled) {
            out.glow(0.5);
        }
    }
}

impl VisualBackend for SceneRenderer {
    fn name(&self) -> &'static str {
        "scene"
    }

    fn update_features(&mut self, t: f32, snapshot: Option<&AnalysisSnapshot>) {
        self.pipeline.update(t, snapshot);
    }

    fn features(&self) -> &AnimationFeatures {
        self.pipeline.features()
    }

    fn resize(&mut self, _w: usize, _h: usize, profile: &QualityProfile, _gpu: &dyn GpuProvider) {
        self.profile = Some(*profile);
        if self.mesh_detail != profile.use_3d {
            self.mesh_detail = profile.use_3d;
            self.mesh = Mesh::build(self.shape, self.mesh_detail);
        }
    }

    fn render(&mut self, clock: FrameClock, out: &mut Surface) {
        if out.is_empty() {
            return;
        }
        self.draw(clock.dt, out);
    }

    fn status(&self) -> BackendStatus {
        BackendStatus {
            name: self.name(),
            gpu: None,
            detail: format!(
                "{} {} edges={}",
                self.shape,
                if self.use_3d() { "3d" } else { "flat" },
                self.mesh.edges.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polyhedra_have_expected_edge_counts() {
        assert_eq!(Mesh::build(SceneShape::Cube, true).edges.len(), 12);
        assert_eq!(Mesh::build(SceneShape::Octahedron, true).edges.len(), 12);
        assert_eq!(Mesh::build(SceneShape::Icosahedron, true).edges.len(), 30);
    }

    #[test]
    fn flat_torus_is_coarser() {
        let full = Mesh::build(SceneShape::Torus, true);
        let flat = Mesh::build(SceneShape::Torus, false);
        assert!(flat.edges.len() < full.edges.len());
        assert!(full.edges.iter().all(|&(a, b)| a < full.vertices.len() && b < full.vertices.len()));
    }
}

//! Offscreen software viewer.
//!
//! Rasterizes the backend's scene primitives over a checkerboard ground into
//! an RGB frame. Z is up.

pub mod sink;

use image::{Rgb, RgbImage};
use nalgebra as na;

use a1_physics::{PrimitiveShape, ScenePrimitive};

use crate::config::RenderConfig;

pub use sink::{DisplaySink, PngSequenceSink};

const SKY: [u8; 3] = [51, 51, 51];
const GROUND_DARK: [u8; 3] = [70, 70, 76];
const GROUND_LIGHT: [u8; 3] = [104, 104, 112];
const TILE_SIZE: f32 = 0.25;
/// Ground is drawn out to this distance from the camera.
const GROUND_EXTENT: f32 = 40.0;
const NEAR: f32 = 0.05;
const MIN_CAMERA_HEIGHT: f32 = 0.05;
const AMBIENT: f32 = 0.4;
const SPHERE_RINGS: usize = 8;
const SPHERE_SEGMENTS: usize = 12;

pub struct CameraController {
    pub target: na::Point3<f32>,
    pub distance: f32,
    /// Radians, about +Z from +X.
    pub yaw: f32,
    /// Radians above the horizon.
    pub pitch: f32,
    /// Vertical field of view, radians.
    pub fov: f32,
    pub following: bool,
}

impl CameraController {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            target: na::Point3::new(0.0, 0.0, 0.3),
            distance: config.camera_distance,
            yaw: config.camera_yaw.to_radians(),
            pitch: config.camera_pitch.to_radians(),
            fov: config.fov.to_radians(),
            following: config.follow,
        }
    }

    pub fn eye(&self) -> na::Point3<f32> {
        let mut eye = self.target
            + na::Vector3::new(
                self.distance * self.yaw.cos() * self.pitch.cos(),
                self.distance * self.yaw.sin() * self.pitch.cos(),
                self.distance * self.pitch.sin(),
            );
        // Keep the camera above the ground
        eye.z = eye.z.max(MIN_CAMERA_HEIGHT);
        eye
    }
}

/// Camera frame for one render pass.
struct View {
    eye: na::Point3<f32>,
    forward: na::Vector3<f32>,
    right: na::Vector3<f32>,
    up: na::Vector3<f32>,
    tan_half_fov: f32,
    aspect: f32,
    width: f32,
    height: f32,
}

impl View {
    fn new(camera: &CameraController, width: u32, height: u32) -> Self {
        let eye = camera.eye();
        let forward = (camera.target - eye)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(|| -na::Vector3::z());
        let right = forward
            .cross(&na::Vector3::z())
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(na::Vector3::x);
        let up = right.cross(&forward);
        Self {
            eye,
            forward,
            right,
            up,
            tan_half_fov: (camera.fov / 2.0).tan(),
            aspect: width as f32 / height as f32,
            width: width as f32,
            height: height as f32,
        }
    }

    /// Screen position and view depth of a world point, if in front of the camera.
    fn project(&self, p: &na::Point3<f32>) -> Option<(f32, f32, f32)> {
        let d = p - self.eye;
        let depth = d.dot(&self.forward);
        if depth < NEAR {
            return None;
        }
        let x = d.dot(&self.right) / (depth * self.tan_half_fov * self.aspect);
        let y = d.dot(&self.up) / (depth * self.tan_half_fov);
        Some((
            (x + 1.0) * 0.5 * self.width,
            (1.0 - y) * 0.5 * self.height,
            depth,
        ))
    }

    /// World-space ray through the centre of pixel `(px, py)`.
    fn ray(&self, px: u32, py: u32) -> na::Vector3<f32> {
        let x = ((px as f32 + 0.5) / self.width) * 2.0 - 1.0;
        let y = 1.0 - ((py as f32 + 0.5) / self.height) * 2.0;
        self.forward
            + self.right * (x * self.tan_half_fov * self.aspect)
            + self.up * (y * self.tan_half_fov)
    }
}

struct Triangle {
    vertices: [na::Point3<f32>; 3],
    color: [u8; 3],
}

/// Lazily created by the environment on the first render call.
pub struct Viewer {
    pub camera: CameraController,
    width: u32,
    height: u32,
    /// Inverse view depth per pixel; 0 is infinitely far.
    depth: Vec<f32>,
    /// Unit direction towards the light.
    light: na::Vector3<f32>,
}

impl Viewer {
    pub fn new(config: &RenderConfig) -> Self {
        log::debug!("creating {}x{} viewer", config.width, config.height);
        Self {
            camera: CameraController::new(config),
            width: config.width,
            height: config.height,
            depth: vec![0.0; pixel_index(config.width, 0, config.height)],
            light: na::Vector3::new(0.3, 0.2, 1.0).normalize(),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Renders one frame. `focus` is the point a following camera tracks.
    pub fn render(&mut self, scene: &[ScenePrimitive], focus: Option<[f32; 3]>) -> RgbImage {
        if self.camera.following {
            if let Some([x, y, z]) = focus {
                self.camera.target = na::Point3::new(x, y, z);
            }
        }

        let view = View::new(&self.camera, self.width, self.height);
        let mut frame = RgbImage::from_pixel(self.width, self.height, Rgb(SKY));
        self.depth.iter_mut().for_each(|d| *d = 0.0);

        self.draw_ground(&view, &mut frame);
        for primitive in scene {
            for triangle in tessellate(primitive) {
                self.draw_triangle(&view, &triangle, &mut frame);
            }
        }
        frame
    }

    fn draw_ground(&mut self, view: &View, frame: &mut RgbImage) {
        if view.eye.z <= 0.0 {
            return;
        }
        for py in 0..self.height {
            for px in 0..self.width {
                let dir = view.ray(px, py);
                if dir.z >= 0.0 {
                    continue;
                }
                // Depth along the view axis; `dir` has unit forward component
                let t = -view.eye.z / dir.z;
                if t > GROUND_EXTENT {
                    continue;
                }
                let hit = view.eye + dir * t;
                let tile = (hit.x / TILE_SIZE).floor() as i64 + (hit.y / TILE_SIZE).floor() as i64;
                let color = if tile.rem_euclid(2) == 0 {
                    GROUND_DARK
                } else {
                    GROUND_LIGHT
                };
                self.depth[pixel_index(self.width, px, py)] = 1.0 / t;
                frame.put_pixel(px, py, Rgb(color));
            }
        }
    }

    fn draw_triangle(&mut self, view: &View, triangle: &Triangle, frame: &mut RgbImage) {
        let [a, b, c] = &triangle.vertices;
        let (Some(pa), Some(pb), Some(pc)) = (view.project(a), view.project(b), view.project(c))
        else {
            return;
        };

        // Flat shading, two-sided
        let normal = (b - a).cross(&(c - a));
        let Some(normal) = normal.try_normalize(f32::EPSILON) else {
            return;
        };
        let intensity = AMBIENT + (1.0 - AMBIENT) * normal.dot(&self.light).abs();
        let shade = |channel: u8| (channel as f32 * intensity).min(255.0) as u8;
        let color = Rgb(triangle.color.map(shade));

        let area = edge(pa, pb, pc.0, pc.1);
        if area.abs() < f32::EPSILON {
            return;
        }

        let min_x = pa.0.min(pb.0).min(pc.0).floor().max(0.0) as u32;
        let max_x = pa.0.max(pb.0).max(pc.0).ceil().min(self.width as f32 - 1.0);
        let min_y = pa.1.min(pb.1).min(pc.1).floor().max(0.0) as u32;
        let max_y = pa.1.max(pb.1).max(pc.1).ceil().min(self.height as f32 - 1.0);
        if max_x < 0.0 || max_y < 0.0 {
            return;
        }
        let (max_x, max_y) = (max_x as u32, max_y as u32);

        for py in min_y..=max_y {
            for px in min_x..=max_x {
                let (x, y) = (px as f32 + 0.5, py as f32 + 0.5);
                let w0 = edge(pb, pc, x, y) / area;
                let w1 = edge(pc, pa, x, y) / area;
                let w2 = edge(pa, pb, x, y) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                // 1/depth is affine in screen space
                let inv_depth = w0 / pa.2 + w1 / pb.2 + w2 / pc.2;
                let index = pixel_index(self.width, px, py);
                if inv_depth > self.depth[index] {
                    self.depth[index] = inv_depth;
                    frame.put_pixel(px, py, color);
                }
            }
        }
    }
}

/// Row-major buffer offset, computed in `usize` so large frames cannot wrap.
fn pixel_index(width: u32, px: u32, py: u32) -> usize {
    py as usize * width as usize + px as usize
}

fn edge(a: (f32, f32, f32), b: (f32, f32, f32), x: f32, y: f32) -> f32 {
    (b.0 - a.0) * (y - a.1) - (b.1 - a.1) * (x - a.0)
}

fn tessellate(primitive: &ScenePrimitive) -> Vec<Triangle> {
    let local = match primitive.shape {
        PrimitiveShape::Cuboid { half_extents } => cuboid_triangles(half_extents),
        PrimitiveShape::Sphere { radius } => sphere_triangles(radius),
    };
    local
        .into_iter()
        .map(|vertices| Triangle {
            vertices: vertices.map(|v| primitive.pose * v),
            color: primitive.color,
        })
        .collect()
}

fn cuboid_triangles([hx, hy, hz]: [f32; 3]) -> Vec<[na::Point3<f32>; 3]> {
    let corner = |i: usize| {
        na::Point3::new(
            if i & 1 == 0 { -hx } else { hx },
            if i & 2 == 0 { -hy } else { hy },
            if i & 4 == 0 { -hz } else { hz },
        )
    };
    // Corner indices of each face, as quads
    const FACES: [[usize; 4]; 6] = [
        [0, 1, 3, 2],
        [4, 6, 7, 5],
        [0, 4, 5, 1],
        [2, 3, 7, 6],
        [0, 2, 6, 4],
        [1, 5, 7, 3],
    ];
    FACES
        .iter()
        .flat_map(|&[a, b, c, d]| {
            [
                [corner(a), corner(b), corner(c)],
                [corner(a), corner(c), corner(d)],
            ]
        })
        .collect()
}

fn sphere_triangles(radius: f32) -> Vec<[na::Point3<f32>; 3]> {
    use std::f32::consts::{PI, TAU};

    let point = |ring: usize, segment: usize| {
        let theta = PI * ring as f32 / SPHERE_RINGS as f32;
        let phi = TAU * segment as f32 / SPHERE_SEGMENTS as f32;
        na::Point3::new(
            radius * theta.sin() * phi.cos(),
            radius * theta.sin() * phi.sin(),
            radius * theta.cos(),
        )
    };

    let mut triangles = Vec::with_capacity(2 * SPHERE_RINGS * SPHERE_SEGMENTS);
    for ring in 0..SPHERE_RINGS {
        for segment in 0..SPHERE_SEGMENTS {
            let next = (segment + 1) % SPHERE_SEGMENTS;
            let (a, b) = (point(ring, segment), point(ring, next));
            let (c, d) = (point(ring + 1, segment), point(ring + 1, next));
            if ring != 0 {
                triangles.push([a, b, d]);
            }
            if ring + 1 != SPHERE_RINGS {
                triangles.push([a, d, c]);
            }
        }
    }
    triangles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> RenderConfig {
        RenderConfig {
            width: 64,
            height: 48,
            ..RenderConfig::default()
        }
    }

    fn red_box_at(z: f32) -> ScenePrimitive {
        ScenePrimitive {
            shape: PrimitiveShape::Cuboid {
                half_extents: [0.15, 0.1, 0.06],
            },
            pose: na::Isometry3::translation(0.0, 0.0, z),
            color: [255, 0, 0],
        }
    }

    #[test]
    fn frame_has_configured_size() {
        let mut viewer = Viewer::new(&RenderConfig::default());
        let frame = viewer.render(&[], None);
        assert_eq!(frame.dimensions(), (720, 480));
    }

    #[test]
    fn pixel_index_does_not_wrap_for_large_frames() {
        assert_eq!(pixel_index(70_000, 0, 70_000), 4_900_000_000);
        assert_eq!(pixel_index(720, 719, 479), 720 * 480 - 1);
    }

    #[test]
    fn empty_scene_shows_sky_and_ground() {
        let mut viewer = Viewer::new(&RenderConfig {
            camera_pitch: 10.0,
            ..small_config()
        });
        let frame = viewer.render(&[], None);
        // Horizon inside the frame: top row is sky, bottom row is ground
        assert_eq!(frame.get_pixel(32, 0).0, SKY);
        let bottom = frame.get_pixel(32, 47).0;
        assert!(bottom == GROUND_DARK || bottom == GROUND_LIGHT);
    }

    #[test]
    fn target_primitive_covers_image_centre() {
        let mut viewer = Viewer::new(&small_config());
        let frame = viewer.render(&[red_box_at(0.3)], Some([0.0, 0.0, 0.3]));
        let centre = frame.get_pixel(32, 24).0;
        assert!(centre[0] > 0 && centre[1] == 0 && centre[2] == 0, "{centre:?}");
    }

    #[test]
    fn nearer_geometry_wins_depth_test() {
        let mut viewer = Viewer::new(&small_config());
        let eye = viewer.camera.eye();
        let toward_eye = (eye - na::Point3::new(0.0, 0.0, 0.3)).normalize() * 0.5;
        let near = ScenePrimitive {
            shape: PrimitiveShape::Sphere { radius: 0.05 },
            pose: na::Isometry3::translation(toward_eye.x, toward_eye.y, 0.3 + toward_eye.z),
            color: [0, 0, 255],
        };
        // Draw order must not matter
        let frame = viewer.render(&[near, red_box_at(0.3)], Some([0.0, 0.0, 0.3]));
        let centre = frame.get_pixel(32, 24).0;
        assert!(centre[2] > 0 && centre[0] == 0, "{centre:?}");
    }

    #[test]
    fn camera_follows_focus() {
        let mut viewer = Viewer::new(&small_config());
        viewer.render(&[], Some([1.0, 2.0, 0.3]));
        assert_eq!(viewer.camera.target, na::Point3::new(1.0, 2.0, 0.3));

        let mut fixed = Viewer::new(&RenderConfig {
            follow: false,
            ..small_config()
        });
        fixed.render(&[], Some([1.0, 2.0, 0.3]));
        assert_eq!(fixed.camera.target, na::Point3::new(0.0, 0.0, 0.3));
    }

    #[test]
    fn tessellation_counts() {
        assert_eq!(cuboid_triangles([1.0; 3]).len(), 12);
        assert_eq!(
            sphere_triangles(1.0).len(),
            2 * SPHERE_RINGS * SPHERE_SEGMENTS - 2 * SPHERE_SEGMENTS
        );
    }
}

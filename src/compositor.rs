// src/compositor.rs - Trailing-fade skeleton overlay
use egui::{Color32, ColorImage, Pos2, Rect, Vec2};
use resvg::tiny_skia::{Paint, PathBuilder, Pixmap, Stroke, Transform};
use tracing::debug;

use crate::identity::PeerIdentity;
use crate::peers::PeerSnapshot;
use crate::pose::{Finger, PosePayload, Skeleton};

/// A drawing target in video pixel space.
pub trait Surface {
    fn size(&self) -> Vec2;

    /// Flips the x axis for every later draw call. Set once, at setup.
    fn set_mirrored(&mut self, mirrored: bool);

    fn fill_rect(&mut self, rect: Rect, color: Color32);

    fn stroke_polyline(&mut self, points: &[Pos2], color: Color32, width: f32);

    /// Current pixels for display, if this surface has any.
    fn to_color_image(&self) -> Option<ColorImage> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    /// Alpha of the white wash painted over the previous frame.
    pub fade_alpha: u8,
    pub stroke_width: f32,
    pub stroke_alpha: u8,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            fade_alpha: 0x99,
            stroke_width: 16.0,
            stroke_alpha: 0xda,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub polylines: usize,
    pub skeletons: usize,
    /// Peers with a skeleton but no drawable color.
    pub skipped_peers: usize,
}

pub struct Compositor {
    style: OverlayStyle,
}

impl Compositor {
    pub fn new(style: OverlayStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// One-time surface preparation: selfie-view mirroring.
    pub fn setup<S: Surface>(&self, surface: &mut S) {
        surface.set_mirrored(true);
    }

    /// Fades the previous frame, then draws the local skeleton followed by
    /// each peer in snapshot order. Only the first skeleton of a payload is drawn.
    pub fn render<S: Surface>(
        &self,
        surface: &mut S,
        local: &PosePayload,
        peers: &PeerSnapshot,
    ) -> RenderStats {
        let mut stats = RenderStats::default();

        let full = Rect::from_min_size(Pos2::ZERO, surface.size());
        let wash = Color32::from_rgba_unmultiplied(255, 255, 255, self.style.fade_alpha);
        surface.fill_rect(full, wash);

        if let Some(skeleton) = local.primary() {
            if !self.draw_skeleton(surface, &local.identity, skeleton, &mut stats) {
                debug!(identity = %local.identity, "local identity has no drawable color");
            }
        }

        for (identity, payload) in peers {
            let Some(skeleton) = payload.primary() else {
                continue;
            };
            if !self.draw_skeleton(surface, identity, skeleton, &mut stats) {
                debug!(peer = %identity, "peer identity has no drawable color; skipped");
                stats.skipped_peers += 1;
            }
        }

        stats
    }

    fn draw_skeleton<S: Surface>(
        &self,
        surface: &mut S,
        identity: &PeerIdentity,
        skeleton: &Skeleton,
        stats: &mut RenderStats,
    ) -> bool {
        let Some(color) = identity.color_with_alpha(self.style.stroke_alpha) else {
            return false;
        };

        for finger in Finger::ALL {
            let points = skeleton
                .finger(finger)
                .map(|p| Pos2::new(p.x as f32, p.y as f32));
            surface.stroke_polyline(&points, color, self.style.stroke_width);
            stats.polylines += 1;
        }
        stats.skeletons += 1;
        true
    }
}

/// Persistent raster surface; nothing is cleared between frames.
pub struct PixmapSurface {
    pixmap: Pixmap,
    transform: Transform,
}

impl PixmapSurface {
    /// Starts fully white. `None` for a zero-sized surface.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        let mut pixmap = Pixmap::new(width, height)?;
        pixmap.fill(resvg::tiny_skia::Color::WHITE);
        Some(Self {
            pixmap,
            transform: Transform::identity(),
        })
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color32> {
        let p = self.pixmap.pixel(x, y)?;
        Some(Color32::from_rgba_premultiplied(
            p.red(),
            p.green(),
            p.blue(),
            p.alpha(),
        ))
    }

    fn paint(color: Color32) -> Paint<'static> {
        let mut paint = Paint::default();
        let [r, g, b, a] = color.to_srgba_unmultiplied();
        paint.set_color_rgba8(r, g, b, a);
        paint.anti_alias = true;
        paint
    }
}

impl Surface for PixmapSurface {
    fn size(&self) -> Vec2 {
        Vec2::new(self.pixmap.width() as f32, self.pixmap.height() as f32)
    }

    fn set_mirrored(&mut self, mirrored: bool) {
        self.transform = if mirrored {
            Transform::from_row(-1.0, 0.0, 0.0, 1.0, self.pixmap.width() as f32, 0.0)
        } else {
            Transform::identity()
        };
    }

    fn fill_rect(&mut self, rect: Rect, color: Color32) {
        let Some(area) =
            resvg::tiny_skia::Rect::from_xywh(rect.min.x, rect.min.y, rect.width(), rect.height())
        else {
            return;
        };
        self.pixmap
            .fill_rect(area, &Self::paint(color), self.transform, None);
    }

    fn stroke_polyline(&mut self, points: &[Pos2], color: Color32, width: f32) {
        let Some((first, rest)) = points.split_first() else {
            return;
        };

        let mut builder = PathBuilder::new();
        builder.move_to(first.x, first.y);
        for point in rest {
            builder.line_to(point.x, point.y);
        }
        // Degenerate paths (all points equal) have no bounds and draw nothing.
        let Some(path) = builder.finish() else {
            return;
        };

        let stroke = Stroke {
            width,
            ..Stroke::default()
        };
        self.pixmap
            .stroke_path(&path, &Self::paint(color), &stroke, self.transform, None);
    }

    fn to_color_image(&self) -> Option<ColorImage> {
        let size = [self.pixmap.width() as usize, self.pixmap.height() as usize];
        Some(ColorImage::from_rgba_premultiplied(size, self.pixmap.data()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    FillRect { rect: Rect, color: Color32 },
    Polyline { points: Vec<Pos2>, color: Color32, width: f32 },
}

/// Headless surface that records draw calls instead of rasterizing them.
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    size: Vec2,
    pub mirrored: bool,
    pub ops: Vec<DrawOp>,
}

impl RecordingSurface {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            size: Vec2::new(width, height),
            mirrored: false,
            ops: Vec::new(),
        }
    }

    pub fn polylines(&self) -> impl Iterator<Item = (&[Pos2], Color32)> + '_ {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Polyline { points, color, .. } => Some((points.as_slice(), *color)),
            DrawOp::FillRect { .. } => None,
        })
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> Vec2 {
        self.size
    }

    fn set_mirrored(&mut self, mirrored: bool) {
        self.mirrored = mirrored;
    }

    fn fill_rect(&mut self, rect: Rect, color: Color32) {
        self.ops.push(DrawOp::FillRect { rect, color });
    }

    fn stroke_polyline(&mut self, points: &[Pos2], color: Color32, width: f32) {
        self.ops.push(DrawOp::Polyline {
            points: points.to_vec(),
            color,
            width,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn skeleton() -> Skeleton {
        Skeleton::new(std::array::from_fn(|i| {
            Vector3::new(10.0 + i as f64 * 10.0, 20.0 + i as f64 * 5.0, 0.0)
        }))
    }

    fn payload(id: &str, hands: usize) -> PosePayload {
        PosePayload::new(PeerIdentity::new(id), vec![skeleton(); hands])
    }

    #[test]
    fn setup_mirrors_the_surface() {
        let mut surface = RecordingSurface::new(640.0, 500.0);
        Compositor::new(OverlayStyle::default()).setup(&mut surface);
        assert!(surface.mirrored);
    }

    #[test]
    fn render_starts_with_translucent_white_wash() {
        let mut surface = RecordingSurface::new(640.0, 500.0);
        let compositor = Compositor::new(OverlayStyle::default());
        compositor.render(&mut surface, &payload("#112233", 0), &Vec::new());

        assert_eq!(
            surface.ops,
            vec![DrawOp::FillRect {
                rect: Rect::from_min_size(Pos2::ZERO, Vec2::new(640.0, 500.0)),
                color: Color32::from_rgba_unmultiplied(255, 255, 255, 0x99),
            }]
        );
    }

    #[test]
    fn skeleton_draws_five_finger_polylines_of_five_points() {
        let mut surface = RecordingSurface::new(640.0, 500.0);
        let compositor = Compositor::new(OverlayStyle::default());
        let local = payload("#112233", 1);
        let stats = compositor.render(&mut surface, &local, &Vec::new());

        assert_eq!(stats.polylines, 5);
        let polylines: Vec<_> = surface.polylines().collect();
        assert_eq!(polylines.len(), 5);

        let points = skeleton();
        for ((drawn, color), finger) in polylines.iter().zip(Finger::ALL) {
            assert_eq!(drawn.len(), 5);
            let expected: Vec<Pos2> = finger
                .indices()
                .iter()
                .map(|&i| Pos2::new(points.points()[i].x as f32, points.points()[i].y as f32))
                .collect();
            assert_eq!(drawn.to_vec(), expected);
            assert_eq!(*color, Color32::from_rgba_unmultiplied(0x11, 0x22, 0x33, 0xda));
        }

        for op in &surface.ops {
            if let DrawOp::Polyline { width, .. } = op {
                assert_eq!(*width, 16.0);
            }
        }
    }

    #[test]
    fn only_first_skeleton_is_drawn() {
        let mut surface = RecordingSurface::new(64.0, 64.0);
        let compositor = Compositor::new(OverlayStyle::default());
        let stats = compositor.render(&mut surface, &payload("#112233", 2), &Vec::new());
        assert_eq!(stats.polylines, 5);
    }

    #[test]
    fn peers_draw_in_snapshot_order_after_local() {
        let mut surface = RecordingSurface::new(64.0, 64.0);
        let compositor = Compositor::new(OverlayStyle::default());
        let peers = vec![
            (PeerIdentity::new("#00ff00"), payload("#00ff00", 1)),
            (PeerIdentity::new("#0000ff"), payload("#0000ff", 0)),
            (PeerIdentity::new("#ff0000"), payload("#ff0000", 1)),
        ];
        let stats = compositor.render(&mut surface, &payload("#111111", 1), &peers);

        assert_eq!(stats.polylines, 15);
        assert_eq!(stats.skeletons, 3);
        let colors: Vec<Color32> = surface.polylines().map(|(_, c)| c).step_by(5).collect();
        assert_eq!(
            colors,
            vec![
                Color32::from_rgba_unmultiplied(0x11, 0x11, 0x11, 0xda),
                Color32::from_rgba_unmultiplied(0, 0xff, 0, 0xda),
                Color32::from_rgba_unmultiplied(0xff, 0, 0, 0xda),
            ]
        );
    }

    #[test]
    fn peer_without_color_is_skipped() {
        let mut surface = RecordingSurface::new(64.0, 64.0);
        let compositor = Compositor::new(OverlayStyle::default());
        let peers = vec![(PeerIdentity::new("bob"), payload("bob", 1))];
        let stats = compositor.render(&mut surface, &payload("#111111", 0), &peers);

        assert_eq!(stats.polylines, 0);
        assert_eq!(stats.skipped_peers, 1);
    }

    #[test]
    fn pixmap_surface_mirrors_and_fades() {
        let mut surface = PixmapSurface::new(100, 100).unwrap();
        let compositor = Compositor::new(OverlayStyle::default());
        compositor.setup(&mut surface);

        // A vertical stroke near the left edge in video space lands near the right edge.
        surface.stroke_polyline(
            &[Pos2::new(10.0, 10.0), Pos2::new(10.0, 90.0)],
            Color32::from_rgb(0, 0, 0),
            6.0,
        );
        let drawn = surface.pixel(90, 50).unwrap();
        assert!(drawn.r() < 10, "expected dark stroke, got {drawn:?}");
        assert_eq!(surface.pixel(10, 50).unwrap(), Color32::WHITE);

        // Each wash moves the stroke toward white without erasing it in one go.
        compositor.render(&mut surface, &payload("#000000", 0), &Vec::new());
        let once = surface.pixel(90, 50).unwrap();
        assert!(once.r() > drawn.r() && once.r() < 255);

        for _ in 0..20 {
            compositor.render(&mut surface, &payload("#000000", 0), &Vec::new());
        }
        assert!(surface.pixel(90, 50).unwrap().r() > 250);
    }

    #[test]
    fn pixmap_surface_exports_color_image() {
        let surface = PixmapSurface::new(8, 4).unwrap();
        let image = surface.to_color_image().unwrap();
        assert_eq!(image.size, [8, 4]);
        assert!(image.pixels.iter().all(|p| *p == Color32::WHITE));
        assert!(PixmapSurface::new(0, 4).is_none());
    }
}

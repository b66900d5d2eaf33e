// src/ui.rs
use eframe::egui::{self, Color32, Pos2, Rect, Vec2};

use crate::identity::PeerIdentity;

#[derive(Debug, Clone)]
pub struct Theme {
    pub surface: Color32,
    pub warning: Color32,
    pub text_primary: Color32,
    pub text_secondary: Color32,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            surface: Color32::from_rgb(30, 30, 35),
            warning: Color32::from_rgb(255, 152, 0),
            text_primary: Color32::WHITE,
            text_secondary: Color32::from_rgb(200, 200, 200),
        }
    }
}

/// A filled square in the identity's color followed by its label.
pub fn identity_swatch(ui: &mut egui::Ui, theme: &Theme, identity: &PeerIdentity, label: &str) {
    ui.horizontal(|ui| {
        let (rect, _) = ui.allocate_exact_size(Vec2::splat(14.0), egui::Sense::hover());
        match identity.color() {
            Some(color) => {
                ui.painter()
                    .rect_filled(rect, egui::Rounding::same(3.0), color);
            }
            None => {
                ui.painter().rect_stroke(
                    rect,
                    egui::Rounding::same(3.0),
                    egui::Stroke::new(1.0, theme.text_secondary),
                );
            }
        }
        ui.label(egui::RichText::new(label).color(theme.text_primary));
    });
}

pub fn peer_legend(ui: &mut egui::Ui, theme: &Theme, peers: &[PeerIdentity]) {
    if peers.is_empty() {
        ui.colored_label(theme.text_secondary, "No peers yet");
        return;
    }
    for peer in peers {
        identity_swatch(ui, theme, peer, peer.as_str());
    }
}

/// Shows the composited overlay texture, letterboxed to its aspect ratio.
pub struct OverlayView {
    texture: Option<egui::TextureHandle>,
    aspect_ratio: f32,
}

impl OverlayView {
    pub fn new() -> Self {
        Self {
            texture: None,
            aspect_ratio: 640.0 / 500.0,
        }
    }

    pub fn update_frame(&mut self, ctx: &egui::Context, image: &egui::ColorImage) {
        if image.size[1] > 0 {
            self.aspect_ratio = image.size[0] as f32 / image.size[1] as f32;
        }
        match &mut self.texture {
            Some(texture) => texture.set(image.clone(), Default::default()),
            None => {
                self.texture = Some(ctx.load_texture("overlay", image.clone(), Default::default()));
            }
        }
    }

    pub fn show(&self, ui: &mut egui::Ui, theme: &Theme) {
        let available = ui.available_size();
        let width = available.x.min(available.y * self.aspect_ratio);
        let size = Vec2::new(width, width / self.aspect_ratio);
        let (rect, _response) = ui.allocate_exact_size(size, egui::Sense::hover());

        match &self.texture {
            Some(texture) => {
                ui.painter().image(
                    texture.id(),
                    rect,
                    Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                    Color32::WHITE,
                );
            }
            None => {
                ui.painter()
                    .rect_filled(rect, egui::Rounding::same(4.0), theme.surface);
                ui.painter().text(
                    rect.center(),
                    egui::Align2::CENTER_CENTER,
                    "Waiting for first frame",
                    egui::FontId::proportional(16.0),
                    theme.text_secondary,
                );
            }
        }
    }
}

impl Default for OverlayView {
    fn default() -> Self {
        Self::new()
    }
}

// src/app.rs
use eframe::egui;
use tokio::sync::watch;

use crate::identity::PeerIdentity;
use crate::scheduler::FrameSnapshot;
use crate::ui::{self, OverlayView, Theme};

/// Window host for one overlay session. Reads frames, never the peer table.
pub struct OverlayApp {
    identity: PeerIdentity,
    frames: watch::Receiver<FrameSnapshot>,
    view: OverlayView,
    theme: Theme,
    last_tick: u64,
    peers: Vec<PeerIdentity>,
    local_detected: bool,
    notice: Option<String>,
    show_legend: bool,
}

impl OverlayApp {
    pub fn new(identity: PeerIdentity, frames: watch::Receiver<FrameSnapshot>) -> Self {
        Self {
            identity,
            frames,
            view: OverlayView::new(),
            theme: Theme::default(),
            last_tick: 0,
            peers: Vec::new(),
            local_detected: false,
            notice: None,
            show_legend: true,
        }
    }

    fn pull_frame(&mut self, ctx: &egui::Context) {
        let frame = self.frames.borrow_and_update().clone();
        if frame.tick == self.last_tick {
            return;
        }
        self.last_tick = frame.tick;
        self.peers = frame.peers;
        self.local_detected = frame.local_detected;
        self.notice = frame.notice;
        if let Some(image) = frame.image {
            self.view.update_frame(ctx, &image);
        }
    }

    fn render_header(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.add_space(6.0);
            ui.horizontal(|ui| {
                ui.heading("Hand Overlay");
                ui.separator();
                ui::identity_swatch(ui, &self.theme, &self.identity, "You");
                ui.label(self.identity.as_str());
                ui.separator();
                let status = if self.local_detected {
                    "Hand detected"
                } else {
                    "Show a hand to the webcam"
                };
                ui.colored_label(self.theme.text_secondary, status);

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.toggle_value(&mut self.show_legend, "Peers");
                });
            });
            if let Some(notice) = &self.notice {
                ui.colored_label(self.theme.warning, notice);
            }
            ui.add_space(6.0);
        });
    }

    fn render_legend(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("peers")
            .resizable(false)
            .default_width(160.0)
            .show(ctx, |ui| {
                ui.heading(format!("Peers ({})", self.peers.len()));
                ui.separator();
                ui::peer_legend(ui, &self.theme, &self.peers);
            });
    }
}

impl eframe::App for OverlayApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.pull_frame(ctx);

        self.render_header(ctx);
        if self.show_legend {
            self.render_legend(ctx);
        }
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.centered_and_justified(|ui| self.view.show(ui, &self.theme));
        });

        // Frames arrive from the session thread; keep polling.
        ctx.request_repaint();
    }
}

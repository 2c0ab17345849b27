use std::time::Duration;

use eframe::egui;

use edge_dock::settings::{default_settings_path, SettingsFile, SettingsSource};
use edge_dock::surface::{EguiSurface, OpacityHandle};
use edge_dock::{logging, Controller, VisibilityState, WindowSettings};

struct DockApp {
    settings_file: SettingsFile,
    settings: WindowSettings,
    controller: Option<Controller>,
    opacity: Option<OpacityHandle>,
    last_outer: Option<egui::Pos2>,
}

impl DockApp {
    fn new(settings_file: SettingsFile, settings: WindowSettings) -> Self {
        Self {
            settings_file,
            settings,
            controller: None,
            opacity: None,
            last_outer: None,
        }
    }

    fn ensure_started(&mut self, ctx: &egui::Context, _frame: &eframe::Frame) {
        if self.controller.is_some() {
            return;
        }
        let surface = EguiSurface::new(ctx.clone());
        #[cfg(windows)]
        let surface = surface.with_hwnd(edge_dock::surface::hwnd_of(_frame));
        self.opacity = Some(surface.opacity_handle());

        let mut controller = Controller::builder(self.settings.clone())
            .surface(surface)
            .listener(|from: VisibilityState, to: VisibilityState| {
                tracing::info!(?from, ?to, "window visibility changed");
            })
            .build();
        if let Err(err) = controller.start() {
            tracing::error!(%err, "failed to start edge dock controller");
        }
        self.controller = Some(controller);
    }

    fn track_pinned_drag(&mut self, ctx: &egui::Context) {
        let Some(controller) = self.controller.as_mut() else {
            return;
        };
        let outer = ctx.input(|i| i.viewport().outer_rect).map(|r| r.min);
        if !controller.is_pinned() {
            self.last_outer = None;
            return;
        }
        let Some(outer) = outer else {
            return;
        };
        // Only user drags count; executor moves happen with the button up.
        if !ctx.input(|i| i.pointer.primary_down()) {
            self.last_outer = Some(outer);
            return;
        }
        let moved = self
            .last_outer
            .map_or(false, |prev| (prev - outer).length() > 1.0);
        self.last_outer = Some(outer);
        if !moved {
            return;
        }
        let ppp = ctx.pixels_per_point();
        let position = ((outer.x * ppp).round() as i32, (outer.y * ppp).round() as i32);
        if controller.bounds().map(|b| (b.x, b.y)) == Some(position) {
            return;
        }
        controller.set_pinned_position(position.0, position.1);
        if let Err(err) = self.settings_file.store_pinned_position(position) {
            tracing::warn!(%err, "failed to persist pinned position");
        }
    }
}

impl eframe::App for DockApp {
    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        self.ensure_started(ctx, frame);
        self.track_pinned_drag(ctx);

        let alpha = self.opacity.as_ref().map_or(1.0, |o| o.get());
        let fill = ctx.style().visuals.panel_fill.gamma_multiply(alpha);

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(fill).inner_margin(8.0))
            .show(ctx, |ui| {
                let Some(controller) = self.controller.as_mut() else {
                    return;
                };
                let drag = ui.interact(
                    ui.max_rect(),
                    egui::Id::new("edge_dock_drag"),
                    egui::Sense::drag(),
                );
                if drag.drag_started() && controller.is_pinned() {
                    ctx.send_viewport_cmd(egui::ViewportCommand::StartDrag);
                }
                ui.heading("Edge dock");
                ui.label(format!("state: {:?}", controller.state()));
                ui.label(format!("mode: {:?}", controller.mode()));
                if let Some(strategy) = controller.strategy() {
                    ui.label(format!("pointer: {strategy:?}"));
                }
                ui.horizontal(|ui| {
                    if controller.is_pinned() {
                        if ui.button("Unpin").clicked() {
                            controller.unpin();
                        }
                    } else if ui.button("Pin").clicked() {
                        controller.pin();
                    }
                    if ui.button("Hide").clicked() {
                        controller.hide();
                    }
                });
            });

        ctx.request_repaint_after(Duration::from_millis(100));
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        let Some(mut controller) = self.controller.take() else {
            return;
        };
        let pinned = controller.is_pinned();
        match controller.request_shutdown() {
            Ok(report) => tracing::info!(elapsed = ?report.elapsed, "shutdown complete"),
            Err(err) => tracing::error!(%err, "shutdown incomplete"),
        }
        if pinned != self.settings.start_pinned {
            let mut settings = self
                .settings_file
                .window_settings()
                .unwrap_or_else(|_| self.settings.clone());
            settings.start_pinned = pinned;
            if let Err(err) = settings.save(self.settings_file.path()) {
                tracing::warn!(%err, "failed to persist pinned state");
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    let path = std::env::args_os()
        .nth(1)
        .map(Into::into)
        .unwrap_or_else(default_settings_path);
    let settings_file = SettingsFile::new(path);
    let settings = settings_file.window_settings()?;
    logging::init(settings.debug_logging, None);
    tracing::info!(path = %settings_file.path().display(), "settings loaded");

    let (w, h) = settings.visible_size;
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([w as f32, h as f32])
            .with_decorations(false)
            .with_taskbar(false),
        ..Default::default()
    };

    eframe::run_native(
        "Edge Dock",
        native_options,
        Box::new(move |_cc| Box::new(DockApp::new(settings_file, settings))),
    )
    .map_err(|e| anyhow::anyhow!(e.to_string()))
}

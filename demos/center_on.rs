#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release
#![allow(rustdoc::missing_crate_level_docs)] // it's an example

use eframe::egui;
use egui_marker_map::{Map, MapEvent, config::OpenStreetMapConfig};

fn main() -> eframe::Result {
    env_logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([900.0, 600.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Center on a coordinate",
        options,
        Box::new(|_cc| Ok(Box::<MyApp>::default())),
    )
}

struct MyApp {
    map: Map,
    event_log: Vec<String>,
}

impl Default for MyApp {
    fn default() -> Self {
        Self {
            map: Map::new(OpenStreetMapConfig::default()),
            event_log: Vec::new(),
        }
    }
}

impl eframe::App for MyApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::SidePanel::right("controls")
            .resizable(false)
            .default_width(280.0)
            .show(ctx, |ui| {
                ui.heading("Center on");
                if ui.button("London (51.5074, -0.1278)").clicked() {
                    self.map.center_on(51.5074, -0.1278);
                }
                if ui.button("Helsinki (60.1695, 24.9354)").clicked() {
                    self.map.center_on(60.16952, 24.93545);
                }

                ui.separator();
                ui.label(format!(
                    "center: {:.4}, {:.4}",
                    self.map.center.lat, self.map.center.lon
                ));
                ui.label(format!("zoom: {}", self.map.zoom));
                if let Some(pos) = self.map.mouse_pos {
                    ui.label(format!("mouse: {:.4}, {:.4}", pos.lat, pos.lon));
                }

                ui.separator();
                ui.heading("Events");
                egui::ScrollArea::vertical().show(ui, |ui| {
                    for line in self.event_log.iter().rev() {
                        ui.label(line);
                    }
                });
            });

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                ui.add(&mut self.map);
            });

        for event in self.map.take_events() {
            let line = match event {
                MapEvent::MoveEnd { center, .. } => {
                    format!("move end: {:.4}, {:.4}", center.lat, center.lon)
                }
                MapEvent::ZoomChanged { zoom, .. } => format!("zoom changed: {}", zoom),
            };
            self.event_log.push(line);
        }
    }
}

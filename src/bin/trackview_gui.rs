//! trackview-gui - desktop front-end
//!
//! The render loop runs on the main thread. Sessions run on the controller's worker and
//! hand frames and status back through a `ChannelPresenter`.

use egui_macroquad::egui;
use macroquad::prelude::*;
use std::path::PathBuf;

use trackview::present::{ChannelPresenter, FrameUpdate, PresentationEvent, PresentationReceiver};
use trackview::{Accelerator, AppConfig, Controller, ModelProfile};

const WINDOW_WIDTH: i32 = 1000;
const WINDOW_HEIGHT: i32 = 800;
const PANEL_WIDTH: f32 = 260.0;

fn window_conf() -> Conf {
    Conf {
        window_title: "YOLOv8 Object Tracker".to_string(),
        window_width: WINDOW_WIDTH,
        window_height: WINDOW_HEIGHT,
        high_dpi: true,
        ..Default::default()
    }
}

struct App {
    controller: Controller,
    capacity: usize,
    receiver: Option<PresentationReceiver>,
    texture: Option<Texture2D>,
    frame_status: String,
    status: String,
    hardware: &'static str,
    file_input: String,
    export_video: bool,
    export_log: bool,
    fullscreen: bool,
}

impl App {
    fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let controller = Controller::from_config(config)?;
        let exports = controller.exports();
        Ok(Self {
            controller,
            capacity: config.channel_capacity,
            receiver: None,
            texture: None,
            frame_status: String::new(),
            status: "Status: Waiting...".to_string(),
            hardware: Accelerator::detect().message(),
            file_input: String::new(),
            export_video: exports.video,
            export_log: exports.log,
            fullscreen: false,
        })
    }

    fn sync_status(&mut self) {
        self.status = self.controller.status();
    }

    fn use_webcam(&mut self) {
        self.controller.select_webcam();
        self.sync_status();
    }

    fn open_file(&mut self) {
        let path = PathBuf::from(self.file_input.trim());
        if self.controller.select_file(&path).is_err() {
            log::warn!("GUI: rejected video file {}", path.display());
        }
        self.sync_status();
    }

    fn load_model(&mut self, profile: ModelProfile) {
        if self.controller.load_profile(profile).is_err() {
            self.sync_status();
            return;
        }
        if profile == ModelProfile::HighEnd {
            self.set_fullscreen(true);
            self.status = "Loaded High-End model: Fullscreen mode enabled.".to_string();
        } else {
            self.set_fullscreen(false);
            self.sync_status();
        }
    }

    fn set_fullscreen(&mut self, enabled: bool) {
        if self.fullscreen != enabled {
            self.fullscreen = enabled;
            set_fullscreen(enabled);
        }
    }

    fn start(&mut self) {
        self.controller.set_export_video(self.export_video);
        self.controller.set_export_log(self.export_log);
        let (presenter, receiver) = ChannelPresenter::channel(self.capacity);
        match self.controller.start(Box::new(presenter)) {
            Ok(()) => self.receiver = Some(receiver),
            Err(err) => log::warn!("GUI: {}", err),
        }
        self.sync_status();
    }

    /// Raise the stop flag and return at once. `update` collects the session when the
    /// worker finishes its current frame.
    fn stop(&mut self) {
        self.controller.request_stop();
    }

    /// Pick up the newest frame and every pending event from the worker.
    fn update(&mut self) {
        if let Some(update) = self.receiver.as_ref().and_then(|rx| rx.latest_frame()) {
            self.show_frame(update);
        }
        self.drain_events();
        if self.controller.poll().is_some() {
            self.sync_status();
        }
    }

    fn drain_events(&mut self) {
        let Some(receiver) = &self.receiver else {
            return;
        };
        let mut finished = false;
        for event in receiver.pending_events() {
            match event {
                PresentationEvent::Status(message) => self.status = message,
                PresentationEvent::Finished(report) => {
                    self.status = report.status_text();
                    finished = true;
                }
            }
        }
        if finished {
            self.receiver = None;
        }
    }

    fn show_frame(&mut self, update: FrameUpdate) {
        let (width, height) = update.image.dimensions();
        let (Ok(w), Ok(h)) = (u16::try_from(width), u16::try_from(height)) else {
            log::warn!("GUI: frame {}x{} too large to display", width, height);
            return;
        };
        let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
        for pixel in update.image.pixels() {
            rgba.extend_from_slice(&[pixel[0], pixel[1], pixel[2], 255]);
        }

        let reuse = self
            .texture
            .as_ref()
            .is_some_and(|tex| tex.width() == width as f32 && tex.height() == height as f32);
        if reuse {
            if let Some(texture) = &self.texture {
                texture.update(&Image {
                    bytes: rgba,
                    width: w,
                    height: h,
                });
            }
        } else {
            let texture = Texture2D::from_rgba8(w, h, &rgba);
            texture.set_filter(FilterMode::Linear);
            self.texture = Some(texture);
        }
        self.frame_status = update.status;
    }

    fn draw_canvas(&self) {
        let Some(texture) = &self.texture else {
            return;
        };
        let area_w = screen_width() - PANEL_WIDTH;
        let area_h = screen_height();
        let scale = (area_w / texture.width()).min(area_h / texture.height());
        let dest = vec2(texture.width() * scale, texture.height() * scale);
        let x = PANEL_WIDTH + (area_w - dest.x) / 2.0;
        let y = (area_h - dest.y) / 2.0;
        draw_texture_ex(
            texture,
            x,
            y,
            WHITE,
            DrawTextureParams {
                dest_size: Some(dest),
                ..Default::default()
            },
        );
    }

    fn draw_panel(&mut self) {
        let mut action = None;
        egui_macroquad::ui(|ctx| {
            egui::SidePanel::left("controls")
                .exact_width(PANEL_WIDTH)
                .resizable(false)
                .show(ctx, |ui| {
                    ui.heading("Object Tracker");
                    ui.label(self.hardware);
                    ui.separator();

                    if ui.button("Use Webcam").clicked() {
                        action = Some(Action::Webcam);
                    }
                    ui.text_edit_singleline(&mut self.file_input);
                    if ui.button("Open Video File").clicked() {
                        action = Some(Action::OpenFile);
                    }
                    ui.separator();

                    if ui.button("Start Detection").clicked() {
                        action = Some(Action::Start);
                    }
                    if ui.button("Stop").clicked() {
                        action = Some(Action::Stop);
                    }
                    ui.separator();

                    ui.label("Choose Model:");
                    for (profile, label) in [
                        (ModelProfile::LowEnd, "Low-End (Pi 3/Pico W)"),
                        (ModelProfile::MediumEnd, "Medium-End (CPU)"),
                        (ModelProfile::HighEnd, "High-End (GPU)"),
                    ] {
                        if ui.button(label).clicked() {
                            action = Some(Action::Load(profile));
                        }
                    }
                    ui.separator();

                    ui.checkbox(&mut self.export_video, "Export Video");
                    ui.checkbox(&mut self.export_log, "Export Log File");
                    ui.separator();

                    ui.label(&self.status);
                    if !self.frame_status.is_empty() {
                        ui.label(&self.frame_status);
                    }
                });
        });
        egui_macroquad::draw();

        match action {
            Some(Action::Webcam) => self.use_webcam(),
            Some(Action::OpenFile) => self.open_file(),
            Some(Action::Start) => self.start(),
            Some(Action::Stop) => self.stop(),
            Some(Action::Load(profile)) => self.load_model(profile),
            None => {}
        }
    }
}

enum Action {
    Webcam,
    OpenFile,
    Start,
    Stop,
    Load(ModelProfile),
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            log::error!("trackview-gui: {:#}", err);
            return;
        }
    };
    let mut app = match App::new(&config) {
        Ok(app) => app,
        Err(err) => {
            log::error!("trackview-gui: {:#}", err);
            return;
        }
    };

    loop {
        if is_key_pressed(KeyCode::Escape) {
            app.set_fullscreen(false);
        }
        app.update();

        clear_background(BLACK);
        app.draw_canvas();
        app.draw_panel();

        next_frame().await;
    }
}

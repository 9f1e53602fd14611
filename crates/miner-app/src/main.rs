// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod config;
mod scene;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use miner_core::init_tracing;
use miner_math::{Camera, Movement, Mvp, Projection};
use miner_platform::InputState;
use miner_render::{RenderSize, Renderer};
use miner_render_vk::Context;
use tracing::{error, info};

use miner_platform::winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::KeyCode,
    window::{Window, WindowId},
};

use config::AppCfg;
use scene::Scene;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = "miner.toml")]
    config: PathBuf,
    /// Override validation layers from the config file
    #[arg(long)]
    validation: Option<bool>,
}

struct App {
    cfg: AppCfg,
    // Declared before `window` so it drops first.
    renderer: Option<Context>,
    window: Option<Window>,
    render_size: RenderSize,

    scene: Scene,
    camera: Camera,
    input: InputState,
    fatal: Option<anyhow::Error>,

    last_update: Instant,
    frames: u32,
    last_fps_instant: Instant,
}

impl App {
    fn new(cfg: AppCfg) -> Self {
        let scene = Scene::generate();
        info!(
            vertices = scene.vertices.len(),
            indices = scene.indices.len(),
            "scene generated"
        );
        let now = Instant::now();
        App {
            render_size: RenderSize {
                width: cfg.window.width,
                height: cfg.window.height,
            },
            cfg,
            renderer: None,
            window: None,
            scene,
            camera: Camera::default(),
            input: InputState::default(),
            fatal: None,
            last_update: now,
            frames: 0,
            last_fps_instant: now,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.fatal = Some(err);
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }

    fn init_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.cfg.window.title.clone())
            .with_inner_size(PhysicalSize::new(self.cfg.window.width, self.cfg.window.height))
            .with_resizable(false);
        let window = event_loop.create_window(attrs)?;

        let size = window.inner_size();
        self.render_size = RenderSize {
            width: size.width.max(1),
            height: size.height.max(1),
        };

        let mut renderer = Context::new(
            &window,
            &window,
            self.render_size,
            self.cfg.render.context_config(),
        )?;
        renderer.set_clear_color(self.cfg.render.clear_color);
        renderer.upload_mesh(&self.scene.vertices, &self.scene.indices)?;
        info!("renderer on {}", renderer.adapter_name());

        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn movement(&self) -> Movement {
        let mut movement = Movement::empty();
        for (key, dir) in [
            (KeyCode::KeyW, Movement::FORWARD),
            (KeyCode::KeyS, Movement::BACKWARD),
            (KeyCode::KeyA, Movement::LEFT),
            (KeyCode::KeyD, Movement::RIGHT),
        ] {
            if self.input.key_down(key) {
                movement |= dir;
            }
        }
        movement
    }

    /// Input -> camera -> mapped buffers -> one frame.
    fn frame(&mut self) -> Result<()> {
        let now = Instant::now();
        let dt = now.duration_since(self.last_update).as_secs_f32();
        self.last_update = now;

        let (dx, dy) = self.input.take_cursor_delta();
        self.camera.rotate(dx, dy, self.cfg.camera.sensitivity);
        self.camera
            .translate(self.movement(), self.cfg.camera.speed * dt);

        let cam = &self.cfg.camera;
        let proj = Projection::new(
            cam.fov_deg,
            self.render_size.width,
            self.render_size.height,
            cam.near,
            cam.far,
        );
        let mvp = Mvp::new(
            miner_math::glam::Mat4::IDENTITY,
            self.camera.view(),
            proj.matrix(),
        );

        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };
        renderer.upload_mesh(&self.scene.vertices, &self.scene.indices)?;
        renderer.set_transform(&mvp)?;
        renderer.render()?;
        self.frames = self.frames.saturating_add(1);
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init_window(event_loop) {
                self.fail(event_loop, e.context("startup failed"));
                return;
            }
        }
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }
        self.input.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.renderer = None;
                self.window = None;
                event_loop.exit();
            }

            WindowEvent::KeyboardInput { .. } if self.input.key_down(KeyCode::Escape) => {
                info!("Escape pressed, closing");
                self.renderer = None;
                self.window = None;
                event_loop.exit();
            }

            WindowEvent::RedrawRequested => {
                if self.renderer.is_none() {
                    return;
                }
                if let Err(e) = self.frame() {
                    self.fail(event_loop, e.context("frame failed"));
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant) >= Duration::from_secs(1) {
            if self.frames > 0 {
                info!("fps ~ {}", self.frames);
            }
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let mut cfg = config::load(&args.config);
    if let Some(validation) = args.validation {
        cfg.render.validation = validation;
    }
    info!(
        "window {}x{}, validation = {}",
        cfg.window.width, cfg.window.height, cfg.render.validation
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(cfg);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn main() -> ExitCode {
    init_tracing();
    miner_core::exit::report(run())
}

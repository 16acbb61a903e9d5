// =============================================================================
// VULKAN ENGINE - window, event loop and the engine's lifetime
// =============================================================================
//
// FRAME FLOW:
// 1. about_to_wait requests a redraw
// 2. RedrawRequested runs one Engine::draw tick
//    (wait slot fence -> acquire -> record -> submit -> present)
// 3. Escape / close tears the engine down before the window goes away
//
// Any error out of a tick is fatal: it is logged and the process exits with
// a failure status.
//
// =============================================================================

use anyhow::{Context, Result};
use vk_engine::config::Config;
use vk_engine::engine::Engine;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    init_logging();

    // Load configuration from config.toml
    let config = Config::load();
    log::info!("Starting Vulkan engine");
    log::info!(
        "Window: {}x{}, present mode: {}",
        config.window.width,
        config.window.height,
        config.graphics.present_mode
    );

    run(config)
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    // RUST_LOG still wins over the default level
    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
}

/// Run the event loop until the window closes or Escape is pressed
fn run(config: Config) -> Result<()> {
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(e) => Err(e),
        None => {
            log::info!("Exited cleanly");
            Ok(())
        }
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// IMPORTANT: the engine field comes before the window so the surface is
/// destroyed while the window still exists.
struct App {
    config: Config,
    engine: Option<Engine>,
    window: Option<Window>,
    /// First fatal error; turned into the process exit status
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            engine: None,
            window: None,
            failure: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        if self.failure.is_none() {
            self.failure = Some(error);
        }
        self.shutdown(event_loop);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(engine) = self.engine.as_mut() {
            engine.cleanup();
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        // No swapchain recreation, so the window keeps its size
        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => w,
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to create window"));
                return;
            }
        };

        match Engine::init(&window, &self.config) {
            Ok(engine) => self.engine = Some(engine),
            Err(e) => self.fail(event_loop, e.context("Failed to initialize engine")),
        }
        self.window = Some(window);
    }

    /// Handle window events.
    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shutdown(event_loop);
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, exiting...");
                    self.shutdown(event_loop);
                }
            }

            WindowEvent::RedrawRequested => {
                let Some(engine) = self.engine.as_mut() else {
                    return;
                };
                if let Err(e) = engine.draw() {
                    self.fail(event_loop, anyhow::Error::new(e).context("Frame failed"));
                }
            }

            _ => {}
        }
    }

    /// Called when the event loop is about to block waiting for events.
    /// Redraw continuously; presentation paces the loop.
    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if event_loop.exiting() {
            return;
        }
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // No-op if Escape or close already cleaned up
        if let Some(mut engine) = self.engine.take() {
            engine.cleanup();
        }
    }
}

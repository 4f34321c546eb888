// Platform window - winit driven by event pumping
//
// The renderer owns the loop: each iteration polls pending events, then
// renders. While the window is minimized the frame engine blocks in
// `wait_events`, which pumps without a timeout until something happens.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use ash::vk;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Fullscreen, Window, WindowAttributes, WindowId};

use crate::config::WindowConfig;
use crate::frame::{ResizeFlag, WindowSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Close,
    ToggleFullscreen,
}

fn key_action(code: KeyCode) -> Option<KeyAction> {
    match code {
        KeyCode::Escape => Some(KeyAction::Close),
        KeyCode::F11 => Some(KeyAction::ToggleFullscreen),
        _ => None,
    }
}

/// Event handler state, separate from the loop so both can be borrowed
struct WindowState {
    attributes: WindowAttributes,
    window: Option<Window>,
    create_error: Option<winit::error::OsError>,
    resize: ResizeFlag,
    fullscreen: bool,
    close_requested: bool,
}

impl WindowState {
    fn toggle_fullscreen(&mut self) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        self.fullscreen = !self.fullscreen;

        if self.fullscreen {
            window.set_fullscreen(Some(Fullscreen::Borderless(None)));
            log::info!("Entered fullscreen mode");
        } else {
            window.set_fullscreen(None);
            log::info!("Exited fullscreen mode");
        }
        // The size change arrives as a Resized event, which raises the flag
    }
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => self.window = Some(window),
            Err(e) => self.create_error = Some(e),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.resize.notify();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match key_action(code) {
                Some(KeyAction::Close) => {
                    log::info!("ESC pressed, exiting...");
                    self.close_requested = true;
                }
                Some(KeyAction::ToggleFullscreen) => self.toggle_fullscreen(),
                None => {}
            },
            _ => {}
        }
    }
}

pub struct PlatformWindow {
    event_loop: EventLoop<()>,
    state: WindowState,
}

impl PlatformWindow {
    /// Open the window described by `config`. Resize events raise `resize`.
    pub fn new(config: &WindowConfig, resize: ResizeFlag) -> Result<Self> {
        let event_loop = EventLoop::new().context("Failed to create event loop")?;

        let mut attributes = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(true);
        if config.fullscreen {
            attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let mut platform = Self {
            event_loop,
            state: WindowState {
                attributes,
                window: None,
                create_error: None,
                resize,
                fullscreen: config.fullscreen,
                close_requested: false,
            },
        };

        // Windows can only be created once the loop has resumed
        while platform.state.window.is_none() {
            if !platform.pump(Some(Duration::ZERO)) {
                bail!("Event loop exited before the window was created");
            }
            if let Some(e) = platform.state.create_error.take() {
                return Err(e).context("Failed to create window");
            }
        }

        log::info!(
            "Window: {}x{} ({})",
            config.width,
            config.height,
            if config.fullscreen { "fullscreen" } else { "windowed" }
        );
        Ok(platform)
    }

    /// Returns false once the event loop has exited
    fn pump(&mut self, timeout: Option<Duration>) -> bool {
        match self.event_loop.pump_app_events(timeout, &mut self.state) {
            PumpStatus::Continue => true,
            PumpStatus::Exit(code) => {
                log::debug!("Event loop exited with code {}", code);
                self.state.close_requested = true;
                false
            }
        }
    }

    /// Handle whatever events are pending without blocking
    pub fn poll_events(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    pub fn window(&self) -> Result<&Window> {
        self.state.window.as_ref().context("Window is gone")
    }

    pub fn set_title(&self, title: &str) {
        if let Some(window) = self.state.window.as_ref() {
            window.set_title(title);
        }
    }

    pub fn is_fullscreen(&self) -> bool {
        self.state.fullscreen
    }
}

impl WindowSource for PlatformWindow {
    fn pixel_size(&self) -> vk::Extent2D {
        let size = self
            .state
            .window
            .as_ref()
            .map(|window| window.inner_size())
            .unwrap_or_default();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }

    fn wait_events(&mut self) {
        self.pump(None);
    }

    fn should_close(&self) -> bool {
        self.state.close_requested
    }
}

// =============================================================================
// RESIZABLE VULKAN TRIANGLE
// =============================================================================
//
// One colored triangle, double-buffered, that survives resizing, minimizing
// and fullscreen toggles without tearing down the device or pipeline.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  PlatformWindow (winit, pumped on this thread)                  │
// │    └── FrameDriver (wait → acquire → record → submit → present) │
// │          ├── FrameSlotPool (semaphores, fence, command buffer)  │
// │          ├── SwapchainManager (images, views, framebuffers)     │
// │          └── VulkanContext (device, render pass, pipeline)      │
// └─────────────────────────────────────────────────────────────────┘
//
// MAIN LOOP:
// 1. Poll window events (resizes raise the shared ResizeFlag)
// 2. Run one frame; stale swapchains are rebuilt inside the driver
// 3. Update the FPS counter in the title
//
// =============================================================================

mod backend;
mod config;
mod frame;
mod platform;
mod scene;
mod stats;

use std::fs::File;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use log::LevelFilter;

use backend::{VulkanContext, VulkanDevice};
use config::{Config, CONFIG_PATH};
use frame::{FrameDriver, FrameStatus, ResizeFlag, WindowSource};
use platform::PlatformWindow;
use stats::{format_title, FrameStats};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> ExitCode {
    // Load configuration from config.toml
    let (config, config_error) = match Config::load_from_path(CONFIG_PATH) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    if let Err(e) = init_logging(&config) {
        eprintln!("Failed to initialize logging: {:?}", e);
        return ExitCode::FAILURE;
    }
    if let Some(e) = config_error {
        log::warn!("{:?}. Using defaults.", e);
    }

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Fatal: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

/// Info by default, `RUST_LOG` wins; optionally everything goes to a file
fn init_logging(config: &Config) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(LevelFilter::Info);
    builder.parse_default_env();

    if config.debug.log_to_file {
        let file = File::create(&config.debug.log_file)
            .with_context(|| format!("Failed to create log file {:?}", config.debug.log_file))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init()?;
    Ok(())
}

fn run(config: &Config) -> Result<()> {
    log::info!("Starting Vulkan triangle renderer");
    log::info!("Present mode: {}", config.graphics.present_mode);

    // ─────────────────────────────────────────────────────────────────────────
    // SETUP (one-time, no recovery)
    // ─────────────────────────────────────────────────────────────────────────
    let resize = ResizeFlag::new();
    let mut window = PlatformWindow::new(&config.window, resize.clone())?;

    let device = VulkanDevice::new(
        &config.window.title,
        window.window()?,
        config.validation_enabled(),
    )?;

    let preferences = config.swapchain_preferences();
    let gpu = VulkanContext::new(
        device,
        &preferences,
        &config.graphics.shader_dir,
        config.graphics.clear_color,
    )?;

    let mut driver = FrameDriver::new(
        gpu,
        preferences,
        config.frames_in_flight(),
        resize,
        &mut window,
    )?;

    // ─────────────────────────────────────────────────────────────────────────
    // MAIN LOOP
    // ─────────────────────────────────────────────────────────────────────────
    let mut stats = FrameStats::new(Instant::now());

    loop {
        window.poll_events();
        if window.should_close() {
            break;
        }

        let status = driver.run_frame(&mut window).with_context(|| {
            format!(
                "Frame {} failed while {:?}",
                driver.frames_presented(),
                driver.stage()
            )
        })?;

        if let FrameStatus::Presented { .. } = status {
            if config.debug.show_fps {
                if let Some(rate) = stats.tick(Instant::now()) {
                    window.set_title(&format_title(
                        &config.window.title,
                        rate,
                        window.is_fullscreen(),
                    ));
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // CLEANUP
    // ─────────────────────────────────────────────────────────────────────────
    // Frame resources first; the context, device and surface follow as
    // `driver` drops, and the window outlives them all.
    driver.shutdown()?;

    log::info!("Cleanup complete");
    Ok(())
}

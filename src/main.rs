// =============================================================================
// FRAME PACER - windowed demo of the frame synchronization engine
// =============================================================================
//
// Draws a rotating quad with N frames in flight and survives resizes,
// minimize/restore, fullscreen toggles and present-mode changes from a
// hot-reloaded config.toml without ever stalling on a fence.
//
// =============================================================================

mod app;
mod hot_reload;

use anyhow::Result;
use frame_pacer::config::Config;
use std::fs::OpenOptions;
use std::io::Write;
use winit::event_loop::EventLoop;

use app::App;

fn main() -> Result<()> {
    // Load configuration from config.toml; the outcome is logged once the
    // logger it configures is up.
    let (config, report) = Config::load();

    init_logging(&config);
    report.log();
    log::info!("Starting frame pacer");
    log::info!(
        "Window: {}x{} ({}), present mode: {}, {} frames in flight",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" },
        config.graphics.present_mode,
        config.graphics.max_frames_in_flight
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    // A fatal frame error ends the loop; report it through the exit code.
    match app.take_error() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Initialize logging with optional file output
///
/// `RUST_LOG` overrides the default `info` level.
fn init_logging(config: &Config) {
    use env_logger::{Builder, Env};

    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));

    if config.debug.log_to_file {
        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
        {
            Ok(mut file) => {
                let _ = writeln!(file, "=== Frame Pacer Log ===");
                let _ = writeln!(file, "Started: {:?}", std::time::SystemTime::now());
                let _ = writeln!(file);
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("Cannot open log file {}: {}", config.debug.log_file, e),
        }
    }

    builder.init();
}

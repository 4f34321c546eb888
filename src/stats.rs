// Frame statistics for the window title

use std::time::{Duration, Instant};

const UPDATE_INTERVAL: Duration = Duration::from_secs(1);

/// Average over the last interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRate {
    pub fps: f32,
    pub frame_time_ms: f32,
}

pub struct FrameStats {
    frame_count: u32,
    last_update: Instant,
}

impl FrameStats {
    pub fn new(now: Instant) -> Self {
        Self {
            frame_count: 0,
            last_update: now,
        }
    }

    /// Count one presented frame. Yields a new rate at most once per second.
    pub fn tick(&mut self, now: Instant) -> Option<FrameRate> {
        self.frame_count += 1;

        let elapsed = now.duration_since(self.last_update);
        if elapsed < UPDATE_INTERVAL {
            return None;
        }

        let seconds = elapsed.as_secs_f32();
        let rate = FrameRate {
            fps: self.frame_count as f32 / seconds,
            frame_time_ms: seconds * 1000.0 / self.frame_count as f32,
        };
        self.frame_count = 0;
        self.last_update = now;
        Some(rate)
    }
}

pub fn format_title(title: &str, rate: FrameRate, fullscreen: bool) -> String {
    let mode = if fullscreen { "fullscreen" } else { "windowed" };
    format!(
        "{} - {:.0} FPS ({:.2}ms) [{}]",
        title, rate.fps, rate.frame_time_ms, mode
    )
}

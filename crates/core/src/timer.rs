//! Frame clock used for animation time and frame statistics.

use std::time::{Duration, Instant};

/// Measures time since start and between frames, and counts frames.
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    last_frame: Instant,
    frames: u64,
}

impl FrameTimer {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_frame: now,
            frames: 0,
        }
    }

    /// Total time since the timer started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Marks the end of a frame and returns the time since the previous one.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_frame;
        self.last_frame = now;
        self.frames += 1;
        delta
    }

    /// Frames counted by [`FrameTimer::tick`].
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Mean frame rate since start, or 0 before any time has passed.
    pub fn average_fps(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_counts_frames() {
        let mut timer = FrameTimer::new();
        assert_eq!(timer.frame_count(), 0);

        timer.tick();
        timer.tick();
        timer.tick();
        assert_eq!(timer.frame_count(), 3);
    }

    #[test]
    fn test_elapsed_is_monotonic() {
        let mut timer = FrameTimer::new();
        let first = timer.elapsed();
        std::thread::sleep(Duration::from_millis(2));
        let delta = timer.tick();

        assert!(timer.elapsed() >= first);
        assert!(delta >= Duration::from_millis(2));
        assert!(timer.average_fps() > 0.0);
    }
}

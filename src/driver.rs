use crate::host::ScriptHost;
use crate::time::Time;
use std::time::{Duration, Instant};

/// Thin tick loop: once per iteration it lets the embedder advance the
/// native engine, pumps the host's reload schedule, and updates every live
/// script instance, then sleeps out the remainder of the frame budget.
pub struct FrameDriver {
    time: Time,
    frame_budget: Duration,
}

impl FrameDriver {
    pub fn new(target_fps: u32) -> Self {
        let fps = target_fps.max(1);
        Self { time: Time::new(), frame_budget: Duration::from_secs(1) / fps }
    }

    /// Runs one frame and returns its delta time.
    pub fn run_frame(&mut self, host: &mut ScriptHost, tick_engine: &mut dyn FnMut(f32)) -> f32 {
        self.time.tick();
        let dt = self.time.delta_seconds();
        tick_engine(dt);
        host.pump(Instant::now());
        host.update(dt);
        dt
    }

    /// Sleeps whatever is left of the frame budget.
    pub fn idle(&self, frame_started: Instant) {
        let elapsed = frame_started.elapsed();
        if elapsed < self.frame_budget {
            std::thread::sleep(self.frame_budget - elapsed);
        }
    }

    pub fn elapsed_seconds(&self) -> f32 {
        self.time.elapsed_seconds()
    }
}

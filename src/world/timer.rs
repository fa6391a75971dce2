use crate::scene::ActorKey;

/// Timer owned by an actor; fires through the actor script's `on_timer`
/// hook. Destroying the owner cancels pending fires.
#[derive(Debug, Clone)]
pub struct Timer {
    pub owner: ActorKey,
    /// Firing interval in seconds.
    pub interval: f32,
    /// Repeating timers re-arm after each fire.
    pub repeat: bool,
    pub(crate) remaining: f32,
    pub(crate) finished: bool,
}

impl Timer {
    #[must_use]
    pub fn new(owner: ActorKey, interval: f32, repeat: bool) -> Self {
        Self {
            owner,
            interval,
            repeat,
            remaining: interval,
            finished: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn remaining(&self) -> f32 {
        self.remaining
    }

    /// Advances the timer; returns how many times it fired this frame.
    /// A repeating timer with an interval shorter than the frame fires
    /// multiple times.
    pub(crate) fn advance(&mut self, time_step: f32) -> u32 {
        if self.finished {
            return 0;
        }
        self.remaining -= time_step;
        let mut fires = 0;
        while self.remaining <= 0.0 {
            fires += 1;
            if self.repeat {
                if self.interval <= 0.0 {
                    // Zero-interval repeat fires once per frame
                    self.remaining = 0.0;
                    break;
                }
                self.remaining += self.interval;
            } else {
                self.finished = true;
                break;
            }
        }
        fires
    }

    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

//! The consensus metronome: a tick counter advanced by elapsed wall time and
//! hauled forward whenever a peer reports a tick further along than ours.
//!
//! There is deliberately no negotiation or voting here — "most advanced tick
//! wins" is the entire consensus rule, which is what makes tick numbers safe
//! to use as the high-order component of state write ordering.

use syncjams_common::{LocalDuration, LocalTime};

#[derive(Debug, Clone)]
pub struct Metronome {
    pub current_tick: u64,
    pub tick_start_time: LocalTime,
}

impl Metronome {
    pub fn new(now: LocalTime) -> Self {
        Self {
            current_tick: 0,
            tick_start_time: now,
        }
    }

    fn tick_period(bpm: f64) -> LocalDuration {
        LocalDuration::from_secs_f64(60.0 / bpm.max(1.0))
    }

    /// Roll the tick counter forward to match elapsed time at `bpm`,
    /// returning every tick number reached this call. Usually empty or a
    /// single tick; more than one only if polling fell behind.
    pub fn advance(&mut self, now: LocalTime, bpm: f64) -> Vec<u64> {
        let period = Self::tick_period(bpm);
        let mut reached = Vec::new();
        while self.tick_start_time + period <= now {
            self.tick_start_time = self.tick_start_time + period;
            self.current_tick += 1;
            reached.push(self.current_tick);
        }
        reached
    }

    /// Seconds elapsed since the current tick began.
    pub fn offset(&self, now: LocalTime) -> f64 {
        (now - self.tick_start_time).as_secs_f64()
    }

    /// Jump forward to a peer's tick if it is further along than ours.
    /// Returns whether a jump happened.
    pub fn jump(&mut self, their_tick: u64, now: LocalTime) -> bool {
        if their_tick > self.current_tick {
            self.current_tick = their_tick;
            self.tick_start_time = now;
            true
        } else {
            false
        }
    }
}

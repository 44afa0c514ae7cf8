use std::time::Instant;

/// High-precision playback clock.
///
/// Time derives from a wallclock epoch: `position = start_position +
/// (now - epoch) * rate`, clamped to `[0, duration]` while playing. Pausing
/// freezes the sampled position. All methods take `now` explicitly so ticks
/// and tests share one code path; the `Instant::now` wrappers are sugar.
pub struct PlaybackClock {
    epoch: Option<Instant>,
    start_position: f64,
    rate: f64,
    duration: f64,
    on_ended: Option<Box<dyn FnMut()>>,
    ended_fired: bool,
}

impl PlaybackClock {
    pub fn new(duration: f64) -> Self {
        Self {
            epoch: None,
            start_position: 0.0,
            rate: 1.0,
            duration: duration.max(0.0),
            on_ended: None,
            ended_fired: false,
        }
    }

    pub fn on_ended(&mut self, f: impl FnMut() + 'static) {
        self.on_ended = Some(Box::new(f));
    }

    pub fn is_playing(&self) -> bool {
        self.epoch.is_some()
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn set_duration(&mut self, duration: f64) {
        self.duration = duration.max(0.0);
    }

    pub fn current_time_at(&self, now: Instant) -> f64 {
        match self.epoch {
            Some(epoch) => {
                let elapsed = now.saturating_duration_since(epoch).as_secs_f64();
                let t = (self.start_position + elapsed * self.rate).max(0.0);
                if self.duration > 0.0 {
                    t.min(self.duration)
                } else {
                    t
                }
            }
            None => self.start_position,
        }
    }

    pub fn current_time(&self) -> f64 {
        self.current_time_at(Instant::now())
    }

    pub fn play_at(&mut self, now: Instant) {
        if self.epoch.is_none() {
            // Restarting from the end behaves like play-from-start.
            if self.duration > 0.0 && self.start_position >= self.duration {
                self.start_position = 0.0;
            }
            self.epoch = Some(now);
            self.ended_fired = false;
        }
    }

    pub fn play(&mut self) {
        self.play_at(Instant::now());
    }

    pub fn pause_at(&mut self, now: Instant) {
        if self.epoch.is_some() {
            self.start_position = self.current_time_at(now);
            self.epoch = None;
        }
    }

    pub fn pause(&mut self) {
        self.pause_at(Instant::now());
    }

    /// Jump to `t`. While playing the epoch is re-anchored so the clock keeps
    /// running from the new position. A zero duration means "not yet known"
    /// and only clamps the lower bound.
    pub fn seek_at(&mut self, t: f64, now: Instant) {
        self.start_position = if self.duration > 0.0 {
            t.clamp(0.0, self.duration)
        } else {
            t.max(0.0)
        };
        if self.epoch.is_some() {
            self.epoch = Some(now);
        }
        self.ended_fired = false;
    }

    pub fn seek(&mut self, t: f64) {
        self.seek_at(t, Instant::now());
    }

    /// Change rate without jumping position.
    pub fn set_rate_at(&mut self, rate: f64, now: Instant) {
        let rate = if rate.is_finite() && rate > 0.0 { rate } else { 1.0 };
        if self.epoch.is_some() {
            self.start_position = self.current_time_at(now);
            self.epoch = Some(now);
        }
        self.rate = rate;
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.set_rate_at(rate, Instant::now());
    }

    /// True exactly once when playback reaches the end; the clock rewinds to 0
    /// and stops, then fires the ended callback.
    pub fn check_ended_at(&mut self, now: Instant) -> bool {
        if self.epoch.is_none() || self.duration <= 0.0 || self.ended_fired {
            return false;
        }
        if self.current_time_at(now) < self.duration {
            return false;
        }
        self.epoch = None;
        self.start_position = 0.0;
        self.ended_fired = true;
        if let Some(f) = &mut self.on_ended {
            f();
        }
        true
    }

    pub fn check_ended(&mut self) -> bool {
        self.check_ended_at(Instant::now())
    }
}

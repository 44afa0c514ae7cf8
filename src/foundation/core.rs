use crate::foundation::error::{CutlineError, CutlineResult};

/// Rational frames-per-second, e.g. 30/1 or 30000/1001 (NTSC).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    pub num: u32,
    pub den: u32,
}

impl Fps {
    pub fn new(num: u32, den: u32) -> CutlineResult<Self> {
        if num == 0 || den == 0 {
            return Err(CutlineError::validation(format!(
                "frame rate {num}/{den} is not a positive rational"
            )));
        }
        Ok(Self { num, den })
    }

    /// Whole-number rate, the common case for project settings.
    pub fn whole(rate: u32) -> CutlineResult<Self> {
        Self::new(rate, 1)
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Seconds covered by one frame.
    pub fn frame_duration(self) -> f64 {
        1.0 / self.as_f64()
    }

    /// Timeline time of frame `index` (its left edge).
    pub fn frame_start(self, index: u64) -> f64 {
        (index as f64) * self.frame_duration()
    }

    /// Index of the frame containing `secs`. Negative times land on frame 0.
    pub fn frame_at(self, secs: f64) -> u64 {
        if secs <= 0.0 {
            return 0;
        }
        (secs * self.as_f64()) as u64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn aspect(self) -> f64 {
        if self.height == 0 {
            return 1.0;
        }
        f64::from(self.width) / f64::from(self.height)
    }
}

/// Half-open time interval in timeline seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64, // exclusive
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> CutlineResult<Self> {
        if !start.is_finite() || !end.is_finite() {
            return Err(CutlineError::validation("TimeRange bounds must be finite"));
        }
        if start > end {
            return Err(CutlineError::validation("TimeRange start must be <= end"));
        }
        Ok(Self { start, end })
    }

    pub fn contains(self, t: f64) -> bool {
        self.start <= t && t < self.end
    }

    pub fn duration(self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    pub fn intersects(self, other: TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

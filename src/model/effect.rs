use crate::foundation::error::{CutlineError, CutlineResult};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct EffectId(pub u64);

/// Per-effect parameters, strongly typed. The string-keyed param map only
/// exists at the serialization boundary ([`EffectKind::from_params`]).
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum EffectKind {
    Flash,
    Shake {
        /// Peak displacement as a fraction of the frame size.
        amplitude: f64,
        /// Oscillations per second.
        frequency: f64,
    },
    Glitch {
        /// Band height as a fraction of the frame height.
        block_size: f64,
        /// Horizontal displacement as a fraction of the frame width.
        strength: f64,
    },
    RadialBlur {
        samples: u32,
        strength: f64,
    },
    Chromatic {
        /// Channel separation as a fraction of the frame width.
        offset: f64,
    },
    Pixelate {
        /// Cell size as a fraction of the frame width.
        size: f64,
    },
    Invert,
    FilmGrain {
        amount: f64,
    },
    Vignette {
        radius: f64,
        softness: f64,
    },
    SplitScreen {
        splits: u32,
    },
}

impl EffectKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Flash => "flash",
            Self::Shake { .. } => "shake",
            Self::Glitch { .. } => "glitch",
            Self::RadialBlur { .. } => "radial_blur",
            Self::Chromatic { .. } => "chromatic",
            Self::Pixelate { .. } => "pixelate",
            Self::Invert => "invert",
            Self::FilmGrain { .. } => "film_grain",
            Self::Vignette { .. } => "vignette",
            Self::SplitScreen { .. } => "split_screen",
        }
    }

    /// Construct from the boundary representation: a kind string plus an
    /// optional JSON param object. Missing params take the documented defaults.
    pub fn from_params(kind: &str, params: &serde_json::Value) -> CutlineResult<Self> {
        let kind = kind.trim().to_ascii_lowercase();
        if kind.is_empty() {
            return Err(CutlineError::validation("effect kind must be non-empty"));
        }

        let f = |key: &str, default: f64| -> CutlineResult<f64> {
            match params.get(key) {
                None => Ok(default),
                Some(v) => {
                    let n = v.as_f64().ok_or_else(|| {
                        CutlineError::validation(format!("effect param '{key}' must be a number"))
                    })?;
                    if !n.is_finite() {
                        return Err(CutlineError::validation(format!(
                            "effect param '{key}' must be finite"
                        )));
                    }
                    Ok(n)
                }
            }
        };
        let u = |key: &str, default: u32| -> CutlineResult<u32> {
            match params.get(key) {
                None => Ok(default),
                Some(v) => {
                    let n = v.as_u64().ok_or_else(|| {
                        CutlineError::validation(format!("effect param '{key}' must be an integer"))
                    })?;
                    u32::try_from(n).map_err(|_| {
                        CutlineError::validation(format!("effect param '{key}' is out of range"))
                    })
                }
            }
        };

        match kind.as_str() {
            "flash" => Ok(Self::Flash),
            "shake" => Ok(Self::Shake {
                amplitude: f("amplitude", 0.05)?,
                frequency: f("frequency", 8.0)?,
            }),
            "glitch" => Ok(Self::Glitch {
                block_size: f("block_size", 0.05)?,
                strength: f("strength", 0.3)?,
            }),
            "radial_blur" | "radialblur" => Ok(Self::RadialBlur {
                samples: u("samples", 8)?,
                strength: f("strength", 0.5)?,
            }),
            "chromatic" => Ok(Self::Chromatic {
                offset: f("offset", 0.005)?,
            }),
            "pixelate" => Ok(Self::Pixelate {
                size: f("size", 0.02)?,
            }),
            "invert" => Ok(Self::Invert),
            "film_grain" | "filmgrain" => Ok(Self::FilmGrain {
                amount: f("amount", 0.2)?,
            }),
            "vignette" => Ok(Self::Vignette {
                radius: f("radius", 0.75)?,
                softness: f("softness", 0.45)?,
            }),
            "split_screen" | "splitscreen" => Ok(Self::SplitScreen {
                splits: u("splits", 2)?,
            }),
            other => Err(CutlineError::validation(format!(
                "unknown effect kind '{other}'"
            ))),
        }
    }
}

/// Intensity ramp shapes for effect enter/exit transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EnvelopeKind {
    None,
    Fade,
    EaseIn,
    EaseOut,
    EaseInOut,
    Bounce,
}

impl EnvelopeKind {
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::None => 1.0,
            Self::Fade => t,
            Self::EaseIn => t * t,
            Self::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Self::EaseInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - ((-2.0 * t + 2.0).powi(3) / 2.0)
                }
            }
            Self::Bounce => {
                const N1: f64 = 7.5625;
                const D1: f64 = 2.75;
                if t < 1.0 / D1 {
                    N1 * t * t
                } else if t < 2.0 / D1 {
                    let t = t - 1.5 / D1;
                    N1 * t * t + 0.75
                } else if t < 2.5 / D1 {
                    let t = t - 2.25 / D1;
                    N1 * t * t + 0.9375
                } else {
                    let t = t - 2.625 / D1;
                    N1 * t * t + 0.984375
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EffectEnvelope {
    pub kind: EnvelopeKind,
    pub duration: f64,
}

/// One effect attached to a clip, active on a sub-range of the clip.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EffectInstance {
    pub id: EffectId,
    pub kind: EffectKind,
    /// Seconds relative to the clip start.
    pub start_time: f64,
    pub duration: f64,
    pub intensity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enter: Option<EffectEnvelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit: Option<EffectEnvelope>,
    pub enabled: bool,
    /// Chain position, unique within the clip, ascending.
    pub order: u32,
}

impl EffectInstance {
    /// Active window test. The end bound is inclusive so an effect spanning the
    /// whole clip still applies on the final frame.
    pub fn active_at(&self, time_in_clip: f64) -> bool {
        self.enabled
            && time_in_clip >= self.start_time
            && time_in_clip <= self.start_time + self.duration
    }

    /// Effective intensity at `time_in_clip`: user intensity scaled by the
    /// enter and exit envelopes.
    pub fn intensity_at(&self, time_in_clip: f64) -> f64 {
        let mut intensity = self.intensity;
        if let Some(enter) = self.enter
            && enter.duration > 0.0
        {
            let p = ((time_in_clip - self.start_time) / enter.duration).min(1.0);
            intensity *= enter.kind.apply(p);
        }
        if let Some(exit) = self.exit
            && exit.duration > 0.0
        {
            let p = ((self.start_time + self.duration - time_in_clip) / exit.duration).min(1.0);
            intensity *= exit.kind.apply(p);
        }
        intensity.max(0.0)
    }
}

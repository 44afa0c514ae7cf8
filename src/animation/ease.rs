/// Easing applied to the normalized progress between two keyframes.
///
/// Presets are closed-form maps of `[0,1] -> [0,1]`; `CubicBezier` is a CSS-style
/// timing curve with `x1`/`x2` restricted to `[0,1]` so x(s) stays monotone.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Easing {
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
    EaseInQuad,
    EaseOutQuad,
    EaseInOutQuad,
    EaseInCubic,
    EaseOutCubic,
    EaseInOutCubic,
    EaseInBack,
    EaseOutBack,
    EaseOutElastic,
    CubicBezier { x1: f64, y1: f64, x2: f64, y2: f64 },
}

impl Default for Easing {
    fn default() -> Self {
        Self::Linear
    }
}

impl Easing {
    /// Apply the curve to `p`. Input is clamped to `[0,1]`, output likewise.
    pub fn apply(self, p: f64) -> f64 {
        if p <= 0.0 {
            return 0.0;
        }
        if p >= 1.0 {
            return 1.0;
        }
        let t = p;
        let v = match self {
            Self::Linear => t,
            Self::EaseIn => 1.0 - (t * std::f64::consts::FRAC_PI_2).cos(),
            Self::EaseOut => (t * std::f64::consts::FRAC_PI_2).sin(),
            Self::EaseInOut => -((std::f64::consts::PI * t).cos() - 1.0) / 2.0,
            Self::EaseInQuad => t * t,
            Self::EaseOutQuad => 1.0 - (1.0 - t) * (1.0 - t),
            Self::EaseInOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - ((-2.0 * t + 2.0).powi(2) / 2.0)
                }
            }
            Self::EaseInCubic => t * t * t,
            Self::EaseOutCubic => 1.0 - (1.0 - t).powi(3),
            Self::EaseInOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - ((-2.0 * t + 2.0).powi(3) / 2.0)
                }
            }
            Self::EaseInBack => {
                const C1: f64 = 1.70158;
                const C3: f64 = C1 + 1.0;
                C3 * t * t * t - C1 * t * t
            }
            Self::EaseOutBack => {
                const C1: f64 = 1.70158;
                const C3: f64 = C1 + 1.0;
                1.0 + C3 * (t - 1.0).powi(3) + C1 * (t - 1.0).powi(2)
            }
            Self::EaseOutElastic => {
                const C4: f64 = std::f64::consts::TAU / 3.0;
                (2.0f64).powf(-10.0 * t) * ((t * 10.0 - 0.75) * C4).sin() + 1.0
            }
            Self::CubicBezier { x1, y1, x2, y2 } => bezier_apply(x1, y1, x2, y2, t),
        };
        v.clamp(0.0, 1.0)
    }
}

/// Solve x(s) = p by bisection to 1e-6, then evaluate y(s).
///
/// Handles outside the unit x-range make x(s) non-monotone; those degrade to the
/// clamped-linear fallback rather than producing a curve that doubles back.
fn bezier_apply(x1: f64, y1: f64, x2: f64, y2: f64, p: f64) -> f64 {
    if !(0.0..=1.0).contains(&x1) || !(0.0..=1.0).contains(&x2) {
        return p;
    }
    if !y1.is_finite() || !y2.is_finite() {
        return p;
    }

    let mut lo = 0.0f64;
    let mut hi = 1.0f64;
    let mut s = p;
    for _ in 0..64 {
        let x = cubic(x1, x2, s);
        let err = x - p;
        if err.abs() < 1e-6 {
            break;
        }
        if err > 0.0 {
            hi = s;
        } else {
            lo = s;
        }
        s = (lo + hi) / 2.0;
    }
    cubic(y1, y2, s)
}

/// De Casteljau for a 1D cubic bezier with endpoints 0 and 1.
fn cubic(c1: f64, c2: f64, s: f64) -> f64 {
    let u = 1.0 - s;
    3.0 * u * u * s * c1 + 3.0 * u * s * s * c2 + s * s * s
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Easing; 13] = [
        Easing::Linear,
        Easing::EaseIn,
        Easing::EaseOut,
        Easing::EaseInOut,
        Easing::EaseInQuad,
        Easing::EaseOutQuad,
        Easing::EaseInOutQuad,
        Easing::EaseInCubic,
        Easing::EaseOutCubic,
        Easing::EaseInOutCubic,
        Easing::EaseInBack,
        Easing::EaseOutBack,
        Easing::EaseOutElastic,
    ];

    #[test]
    fn endpoints_are_stable() {
        for ease in ALL {
            assert_eq!(ease.apply(0.0), 0.0, "{ease:?}");
            assert_eq!(ease.apply(1.0), 1.0, "{ease:?}");
            assert_eq!(ease.apply(-0.5), 0.0, "{ease:?}");
            assert_eq!(ease.apply(1.5), 1.0, "{ease:?}");
        }
    }

    #[test]
    fn output_stays_in_unit_range_on_dense_grid() {
        for ease in ALL {
            for i in 0..=1000 {
                let v = ease.apply(i as f64 / 1000.0);
                assert!((0.0..=1.0).contains(&v), "{ease:?} at {i}");
            }
        }
    }

    #[test]
    fn monotone_presets_are_non_decreasing_on_dense_grid() {
        // Elastic oscillates around 1 after its first peak and is excluded by design.
        let monotone = [
            Easing::Linear,
            Easing::EaseIn,
            Easing::EaseOut,
            Easing::EaseInOut,
            Easing::EaseInQuad,
            Easing::EaseOutQuad,
            Easing::EaseInOutQuad,
            Easing::EaseInCubic,
            Easing::EaseOutCubic,
            Easing::EaseInOutCubic,
            Easing::EaseInBack,
            Easing::EaseOutBack,
        ];
        for ease in monotone {
            let mut prev = 0.0;
            for i in 0..=1000 {
                let v = ease.apply(i as f64 / 1000.0);
                assert!(v + 1e-12 >= prev, "{ease:?} decreases at {i}");
                prev = v;
            }
        }
    }

    #[test]
    fn ease_in_out_cubic_midpoint_is_half() {
        assert!((Easing::EaseInOutCubic.apply(0.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn bezier_linear_handles_are_identity() {
        let e = Easing::CubicBezier {
            x1: 1.0 / 3.0,
            y1: 1.0 / 3.0,
            x2: 2.0 / 3.0,
            y2: 2.0 / 3.0,
        };
        for i in 0..=100 {
            let p = i as f64 / 100.0;
            assert!((e.apply(p) - p).abs() < 1e-4);
        }
    }

    #[test]
    fn bezier_css_ease_matches_reference_points() {
        // CSS `ease` = cubic-bezier(0.25, 0.1, 0.25, 1.0)
        let e = Easing::CubicBezier {
            x1: 0.25,
            y1: 0.1,
            x2: 0.25,
            y2: 1.0,
        };
        let mid = e.apply(0.5);
        assert!((mid - 0.8024).abs() < 1e-3, "got {mid}");
    }

    #[test]
    fn bezier_out_of_range_handles_fall_back_to_linear() {
        let e = Easing::CubicBezier {
            x1: -2.0,
            y1: 0.0,
            x2: 3.0,
            y2: 1.0,
        };
        assert_eq!(e.apply(0.25), 0.25);
        assert_eq!(e.apply(0.75), 0.75);
    }
}

use std::collections::HashMap;

use rayon::prelude::*;

use crate::foundation::math::hash_noise;
use crate::model::effect::{EffectInstance, EffectKind};
use crate::render::context::{CompiledProgram, EFFECT_UNIFORMS, ProgramId, RenderContext};
use crate::render::surface::Surface;

/// Input binding for the chain. `SceneTarget` means the caller rendered the
/// clip into the chain's first framebuffer, so the first hop must write to the
/// second one to avoid read-write aliasing.
pub enum EffectInput<'a> {
    Texture(&'a Surface),
    SceneTarget,
}

/// Runs ordered effect programs through a pair of ping-pong framebuffers,
/// landing the final pass in the context backbuffer.
///
/// The chain owns its own geometry and framebuffers so it never collides with
/// the main pipeline's buffers.
pub struct EffectChain {
    width: u32,
    height: u32,
    fbos: [Surface; 2],
    programs: HashMap<&'static str, CompiledProgram>,
    last_run_draws: usize,
}

impl EffectChain {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fbos: [Surface::new(width, height), Surface::new(width, height)],
            programs: HashMap::new(),
            last_run_draws: 0,
        }
    }

    /// The scene framebuffer the compositor pre-renders into (pre-cleared).
    pub fn scene_target(&mut self) -> &mut Surface {
        self.fbos[0].clear();
        &mut self.fbos[0]
    }

    pub fn scene_texture(&self) -> &Surface {
        &self.fbos[0]
    }

    pub(crate) fn scene_texture_mut(&mut self) -> &mut Surface {
        &mut self.fbos[0]
    }

    pub fn last_run_draws(&self) -> usize {
        self.last_run_draws
    }

    /// Drop and re-create both framebuffers at the new output size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.fbos = [Surface::new(width, height), Surface::new(width, height)];
    }

    fn program_for(&mut self, kind: EffectKind) -> Option<&CompiledProgram> {
        let name = kind.name();
        Some(self.programs.entry(name).or_insert(CompiledProgram {
            id: ProgramId::Effect(name),
            uniforms: EFFECT_UNIFORMS,
        }))
    }

    /// Apply the active subset of `effects` at `time_in_clip`. Returns whether
    /// anything was drawn; when false the caller must present the input itself.
    pub fn apply(
        &mut self,
        ctx: &mut RenderContext,
        input: EffectInput<'_>,
        effects: &[EffectInstance],
        time_in_clip: f64,
        global_time: f64,
    ) -> bool {
        self.last_run_draws = 0;

        let mut active: Vec<&EffectInstance> = effects
            .iter()
            .filter(|e| e.active_at(time_in_clip))
            .collect();
        active.sort_by_key(|e| e.order);
        if active.is_empty() {
            return false;
        }

        // dst index 1 first when the input aliases fbo[0].
        let (input_surface, mut dst_index, mut source_is_input) = match input {
            EffectInput::Texture(s) => (Some(s), 0usize, true),
            EffectInput::SceneTarget => (None, 1usize, false),
        };
        // For SceneTarget the "input" is fbo[0] itself.
        let mut current_fbo = 0usize;

        let count = active.len();
        for (i, effect) in active.into_iter().enumerate() {
            if self.program_for(effect.kind).is_none() {
                tracing::warn!(kind = effect.kind.name(), "skipping uncompilable effect");
                continue;
            }
            ctx.use_program(ProgramId::Effect(effect.kind.name()));
            let intensity = effect.intensity_at(time_in_clip) as f32;
            let last = i + 1 == count;

            if last {
                // Final hop lands in the backbuffer, composited over whatever
                // background the frame was cleared to.
                ctx.bind_framebuffer(None);
                let mut out = ctx.pool.borrow(self.width, self.height);
                {
                    let src: &Surface = if source_is_input {
                        input_surface.expect("texture input present")
                    } else {
                        &self.fbos[current_fbo]
                    };
                    run_effect_kernel(src, &mut out, effect.kind, intensity, global_time);
                }
                let bb = ctx.backbuffer_mut();
                for (d, s) in bb.data.chunks_exact_mut(4).zip(out.data.chunks_exact(4)) {
                    let px = crate::render::surface::over(
                        [d[0], d[1], d[2], d[3]],
                        [s[0], s[1], s[2], s[3]],
                        1.0,
                    );
                    d.copy_from_slice(&px);
                }
                ctx.pool.release(out);
            } else {
                ctx.bind_framebuffer(Some(dst_index as u32));
                if source_is_input {
                    let src = input_surface.expect("texture input present");
                    run_effect_kernel(src, &mut self.fbos[dst_index], effect.kind, intensity, global_time);
                } else {
                    let (a, b) = self.fbos.split_at_mut(1);
                    let (src, dst) = if current_fbo == 0 {
                        (&a[0], &mut b[0])
                    } else {
                        (&b[0], &mut a[0])
                    };
                    debug_assert_ne!(current_fbo, dst_index, "ping-pong aliasing");
                    run_effect_kernel(src, dst, effect.kind, intensity, global_time);
                }
                current_fbo = dst_index;
                dst_index = 1 - dst_index;
                source_is_input = false;
            }
            self.last_run_draws += 1;
        }

        // Leave the sandbox clean: no bound framebuffer, program, or blend.
        ctx.reset_state();
        self.last_run_draws > 0
    }
}

/// Dispatch one effect "fragment shader" over the full destination.
fn run_effect_kernel(
    src: &Surface,
    dst: &mut Surface,
    kind: EffectKind,
    intensity: f32,
    time: f64,
) {
    let w = dst.width;
    let h = dst.height;
    let wf = f64::from(w);
    let hf = f64::from(h);
    let intensity = intensity.clamp(0.0, 1.0);
    // Time-derived seed keeps noise deterministic per frame.
    let seed = (time * 1000.0).round() as u64;

    let kernel: Box<dyn Fn(u32, u32) -> [u8; 4] + Sync + '_> = match kind {
        EffectKind::Flash => Box::new(move |x, y| {
            let px = src.pixel(x, y);
            let a = px[3];
            let mut out = px;
            for c in 0..3 {
                let toward_white = f32::from(a) - f32::from(px[c]);
                out[c] = (f32::from(px[c]) + toward_white * intensity).round() as u8;
            }
            out
        }),
        EffectKind::Shake {
            amplitude,
            frequency,
        } => {
            let phase = std::f64::consts::TAU * frequency * time;
            let dx = amplitude * wf * phase.sin() * f64::from(intensity);
            let dy = amplitude * hf * (phase * 1.3).cos() * f64::from(intensity);
            Box::new(move |x, y| {
                let sx = f64::from(x) - dx;
                let sy = f64::from(y) - dy;
                if sx < 0.0 || sy < 0.0 || sx >= wf || sy >= hf {
                    return [0, 0, 0, 0];
                }
                src.sample_bilinear(sx, sy)
            })
        }
        EffectKind::Glitch {
            block_size,
            strength,
        } => {
            let band_px = (block_size * hf).max(1.0);
            Box::new(move |x, y| {
                let band = (f64::from(y) / band_px) as u32;
                let gate = hash_noise(seed, band, 0, 1);
                if gate < 0.3 * intensity {
                    let amount = (hash_noise(seed, band, 1, 2) - 0.5) * 2.0;
                    let shift = f64::from(amount) * strength * wf;
                    let sx = f64::from(x) + shift;
                    if sx < 0.0 || sx >= wf {
                        return [0, 0, 0, 0];
                    }
                    let mut out = src.sample_nearest(sx, f64::from(y));
                    // Displaced bands get a slight channel tear.
                    let r = src.sample_nearest((sx + 2.0).min(wf - 1.0), f64::from(y));
                    out[0] = r[0];
                    out
                } else {
                    src.pixel(x, y)
                }
            })
        }
        EffectKind::RadialBlur { samples, strength } => {
            let samples = samples.clamp(1, 64);
            let cx = wf / 2.0;
            let cy = hf / 2.0;
            Box::new(move |x, y| {
                let dx = (cx - f64::from(x)) * strength * f64::from(intensity);
                let dy = (cy - f64::from(y)) * strength * f64::from(intensity);
                let mut acc = [0u32; 4];
                for s in 0..samples {
                    let t = f64::from(s) / f64::from(samples);
                    let px = src.sample_bilinear(f64::from(x) + dx * t, f64::from(y) + dy * t);
                    for c in 0..4 {
                        acc[c] += u32::from(px[c]);
                    }
                }
                let mut out = [0u8; 4];
                for c in 0..4 {
                    out[c] = (acc[c] / samples) as u8;
                }
                out
            })
        }
        EffectKind::Chromatic { offset } => {
            let shift = offset * wf * f64::from(intensity);
            Box::new(move |x, y| {
                let g = src.pixel(x, y);
                let r = src.sample_bilinear(f64::from(x) + shift, f64::from(y));
                let b = src.sample_bilinear(f64::from(x) - shift, f64::from(y));
                [r[0], g[1], b[2], g[3]]
            })
        }
        EffectKind::Pixelate { size } => {
            let cell = (size * wf * f64::from(intensity)).max(1.0);
            Box::new(move |x, y| {
                let sx = (f64::from(x) / cell).floor() * cell + cell / 2.0;
                let sy = (f64::from(y) / cell).floor() * cell + cell / 2.0;
                src.sample_nearest(sx.min(wf - 1.0), sy.min(hf - 1.0))
            })
        }
        EffectKind::Invert => Box::new(move |x, y| {
            let px = src.pixel(x, y);
            let a = px[3];
            if a == 0 {
                return px;
            }
            let mut out = px;
            for c in 0..3 {
                // Premultiplied inversion: a - c, then mix by intensity.
                let inv = a.saturating_sub(px[c]);
                out[c] = (f32::from(px[c])
                    + (f32::from(inv) - f32::from(px[c])) * intensity)
                    .round() as u8;
            }
            out
        }),
        EffectKind::FilmGrain { amount } => Box::new(move |x, y| {
            let px = src.pixel(x, y);
            let a = px[3];
            if a == 0 {
                return px;
            }
            let n = (hash_noise(seed, x, y, 3) - 0.5) * 2.0 * (amount as f32) * intensity;
            let mut out = px;
            for c in 0..3 {
                let v = f32::from(px[c]) + n * f32::from(a);
                out[c] = v.clamp(0.0, f32::from(a)).round() as u8;
            }
            out
        }),
        EffectKind::Vignette { radius, softness } => {
            let cx = wf / 2.0;
            let cy = hf / 2.0;
            let max_dist = (cx * cx + cy * cy).sqrt();
            Box::new(move |x, y| {
                let dx = f64::from(x) - cx;
                let dy = f64::from(y) - cy;
                let d = (dx * dx + dy * dy).sqrt() / max_dist;
                let fall = crate::foundation::math::smoothstep(
                    radius as f32,
                    (radius + softness) as f32,
                    d as f32,
                );
                let keep = 1.0 - fall * intensity;
                let px = src.pixel(x, y);
                let mut out = px;
                for c in 0..3 {
                    out[c] = (f32::from(px[c]) * keep).round() as u8;
                }
                out
            })
        }
        EffectKind::SplitScreen { splits } => {
            let splits = splits.max(1);
            Box::new(move |x, y| {
                let u = f64::from(x) / wf;
                let u2 = (u * f64::from(splits)).fract();
                let split_px = src.sample_bilinear(u2 * (wf - 1.0), f64::from(y));
                let orig = src.pixel(x, y);
                crate::render::surface::crossfade(orig, split_px, intensity)
            })
        }
    };

    let row_bytes = (w as usize) * 4;
    dst.data
        .par_chunks_exact_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..w {
                let px = kernel(x, y as u32);
                let i = (x as usize) * 4;
                row[i..i + 4].copy_from_slice(&px);
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::effect::{EffectId, EnvelopeKind};
    use crate::render::context::RenderOptions;

    fn effect(id: u64, kind: EffectKind, order: u32) -> EffectInstance {
        EffectInstance {
            id: EffectId(id),
            kind,
            start_time: 0.0,
            duration: 10.0,
            intensity: 1.0,
            enter: None,
            exit: None,
            enabled: true,
            order,
        }
    }

    fn ctx(w: u32, h: u32) -> RenderContext {
        RenderContext::new(w, h, RenderOptions::default()).unwrap()
    }

    #[test]
    fn empty_effect_list_draws_nothing() {
        let mut chain = EffectChain::new(8, 8);
        let mut c = ctx(8, 8);
        let input = Surface::solid(8, 8, [100, 100, 100, 255]);
        let before = c.backbuffer().data.clone();
        let drew = chain.apply(&mut c, EffectInput::Texture(&input), &[], 0.0, 0.0);
        assert!(!drew);
        assert_eq!(chain.last_run_draws(), 0);
        assert_eq!(c.backbuffer().data, before);
    }

    #[test]
    fn n_effects_issue_n_draws_ending_in_backbuffer() {
        let mut chain = EffectChain::new(8, 8);
        let mut c = ctx(8, 8);
        let input = Surface::solid(8, 8, [100, 100, 100, 255]);
        let effects = vec![
            effect(1, EffectKind::Invert, 0),
            effect(2, EffectKind::Flash, 1),
            effect(3, EffectKind::Vignette {
                radius: 0.5,
                softness: 0.3,
            }, 2),
        ];
        let drew = chain.apply(&mut c, EffectInput::Texture(&input), &effects, 1.0, 1.0);
        assert!(drew);
        assert_eq!(chain.last_run_draws(), 3);
        // Something landed in the backbuffer.
        assert_ne!(c.backbuffer().pixel(4, 4), [0, 0, 0, 0]);
    }

    #[test]
    fn inactive_and_disabled_effects_are_filtered() {
        let mut chain = EffectChain::new(4, 4);
        let mut c = ctx(4, 4);
        let input = Surface::solid(4, 4, [50, 50, 50, 255]);
        let mut off = effect(1, EffectKind::Invert, 0);
        off.enabled = false;
        let mut late = effect(2, EffectKind::Flash, 1);
        late.start_time = 5.0;
        late.duration = 1.0;
        let drew = chain.apply(
            &mut c,
            EffectInput::Texture(&input),
            &[off, late],
            0.0,
            0.0,
        );
        assert!(!drew);
    }

    #[test]
    fn scene_target_input_starts_on_second_fbo() {
        let mut chain = EffectChain::new(4, 4);
        let mut c = ctx(4, 4);
        {
            let scene = chain.scene_target();
            for px in scene.data.chunks_exact_mut(4) {
                px.copy_from_slice(&[200, 0, 0, 255]);
            }
        }
        let effects = vec![
            effect(1, EffectKind::Invert, 0),
            effect(2, EffectKind::Invert, 1),
        ];
        let drew = chain.apply(&mut c, EffectInput::SceneTarget, &effects, 0.0, 0.0);
        assert!(drew);
        assert_eq!(chain.last_run_draws(), 2);
        // Double inversion lands back near the original red.
        let px = c.backbuffer().pixel(2, 2);
        assert!(px[0] > 150, "got {px:?}");
        assert!(px[1] < 60);
    }

    #[test]
    fn invert_respects_alpha_mask() {
        let mut chain = EffectChain::new(4, 4);
        let mut c = ctx(4, 4);
        // Fully transparent input must stay transparent after inversion.
        let input = Surface::new(4, 4);
        let effects = vec![effect(1, EffectKind::Invert, 0)];
        chain.apply(&mut c, EffectInput::Texture(&input), &effects, 0.0, 0.0);
        assert_eq!(c.backbuffer().pixel(1, 1), [0, 0, 0, 0]);
    }

    #[test]
    fn envelope_scales_flash_strength() {
        let mut chain = EffectChain::new(2, 2);
        let mut c1 = ctx(2, 2);
        let mut c2 = ctx(2, 2);
        let input = Surface::solid(2, 2, [10, 10, 10, 255]);

        let mut ramped = effect(1, EffectKind::Flash, 0);
        ramped.start_time = 1.0;
        ramped.duration = 1.0;
        ramped.enter = Some(crate::model::effect::EffectEnvelope {
            kind: EnvelopeKind::EaseIn,
            duration: 0.2,
        });

        chain.apply(
            &mut c1,
            EffectInput::Texture(&input),
            std::slice::from_ref(&ramped),
            1.1,
            1.1,
        );
        chain.apply(
            &mut c2,
            EffectInput::Texture(&input),
            &[ramped],
            1.5,
            1.5,
        );
        // Mid-effect flash is brighter than the early ramp-in.
        assert!(c2.backbuffer().pixel(0, 0)[0] > c1.backbuffer().pixel(0, 0)[0]);
    }
}

use std::sync::Arc;

use crate::animation::evaluator::{self, AnimatedTransform};
use crate::foundation::error::CutlineResult;
use crate::model::clip::Clip;
use crate::model::material::MaterialId;
use crate::model::timeline::Timeline;
use crate::model::transition::TransitionKind;
use crate::render::context::{ProgramId, RenderContext, RenderOptions};
use crate::render::effects::{EffectChain, EffectInput};
use crate::render::programs::{
    DrawTarget, draw_animated, draw_basic, draw_overlay, draw_transition, transition_ease,
    OverlayParams,
};
use crate::render::surface::Surface;
use crate::subtitle::SubtitleRenderer;

/// Supplies decoded frames for materials. The playback scheduler implements
/// this over its media pool; export uses a strict seek-synced variant.
pub trait FrameSource {
    fn frame(&mut self, material: MaterialId, source_time: f64) -> Option<Arc<Surface>>;
}

/// What the pipeline did for one frame; integration points assert against
/// this instead of poking at device internals.
#[derive(Clone, Debug, Default)]
pub struct FrameReport {
    pub time: f64,
    /// Program used for the main video path, when one ran.
    pub program: Option<ProgramId>,
    pub transition: Option<(TransitionKind, f64)>,
    pub effect_draws: usize,
    pub overlays: usize,
    pub subtitles: usize,
    /// A required media frame was unavailable and rendered black.
    pub media_missing: bool,
}

/// Per-frame composition: resolves what is visible at `t`, dispatches the
/// right programs, runs the effect chain, overlays, and the subtitle layer.
pub struct Pipeline {
    ctx: RenderContext,
    chain: EffectChain,
    subtitles: SubtitleRenderer,
}

impl Pipeline {
    pub fn new(width: u32, height: u32, options: RenderOptions) -> CutlineResult<Self> {
        Ok(Self {
            ctx: RenderContext::new(width, height, options)?,
            chain: EffectChain::new(width, height),
            subtitles: SubtitleRenderer::new(),
        })
    }

    pub fn backbuffer(&self) -> &Surface {
        self.ctx.backbuffer()
    }

    pub fn context(&self) -> &RenderContext {
        &self.ctx
    }

    pub fn subtitles_mut(&mut self) -> &mut SubtitleRenderer {
        &mut self.subtitles
    }

    /// Resize the output surface; the effect chain re-creates its
    /// framebuffers at the new dimensions.
    pub fn resize(&mut self, width: u32, height: u32) -> CutlineResult<()> {
        self.ctx.resize(width, height)?;
        self.chain.resize(width, height);
        Ok(())
    }

    #[tracing::instrument(skip(self, timeline, media))]
    pub fn render_frame(
        &mut self,
        timeline: &Timeline,
        t: f64,
        media: &mut dyn FrameSource,
    ) -> CutlineResult<FrameReport> {
        let mut report = FrameReport {
            time: t,
            ..Default::default()
        };

        // Known-clean device state before any dispatch.
        self.ctx.reset_state();
        if !self.ctx.preserve_backbuffer() {
            self.ctx.clear_backbuffer();
        }

        if let Some((tid, progress)) = timeline.transition_at(t) {
            self.render_transition(timeline, t, tid, progress, media, &mut report);
        } else {
            self.render_main_video(timeline, t, media, &mut report);
        }

        self.render_overlays(timeline, t, media, &mut report);
        self.render_subtitles(timeline, t, &mut report);

        self.ctx.reset_state();
        Ok(report)
    }

    fn clip_frame(
        &mut self,
        timeline: &Timeline,
        clip: &Clip,
        t: f64,
        media: &mut dyn FrameSource,
    ) -> Option<Arc<Surface>> {
        let material = clip.material?;
        timeline.material(material)?;
        media.frame(material, clip.source_time_at(t))
    }

    fn render_transition(
        &mut self,
        timeline: &Timeline,
        t: f64,
        tid: crate::model::transition::TransitionId,
        progress: f64,
        media: &mut dyn FrameSource,
        report: &mut FrameReport,
    ) {
        let Some(tr) = timeline.transition(tid) else {
            return;
        };
        let kind = tr.kind;
        let frames = (
            timeline
                .clip(tr.from)
                .and_then(|c| self.clip_frame(timeline, c, t, media)),
            timeline
                .clip(tr.to)
                .and_then(|c| self.clip_frame(timeline, c, t, media)),
        );
        let eased = transition_ease(progress);

        match frames {
            (Some(fa), Some(fb)) => {
                draw_transition(&mut self.ctx, &fa, &fb, kind, eased);
                report.program = Some(ProgramId::Transition);
                report.transition = Some((kind, eased));
            }
            (Some(f), None) | (None, Some(f)) => {
                // One side failed to decode; degrade to a plain draw rather
                // than stalling the transition.
                tracing::warn!(?kind, "transition missing one frame; drawing single side");
                draw_basic(
                    &mut self.ctx,
                    DrawTarget::Backbuffer,
                    &f,
                    Default::default(),
                    &Default::default(),
                    1.0,
                    None,
                );
                report.program = Some(ProgramId::Basic);
                report.media_missing = true;
            }
            (None, None) => {
                tracing::warn!("transition with no decodable frames; rendering black");
                report.media_missing = true;
            }
        }
    }

    fn render_main_video(
        &mut self,
        timeline: &Timeline,
        t: f64,
        media: &mut dyn FrameSource,
        report: &mut FrameReport,
    ) {
        let Some(clip_id) = timeline.video_clip_at(t) else {
            return;
        };
        let Some(clip) = timeline.clip(clip_id) else {
            return;
        };
        let Some(frame) = self.clip_frame(timeline, clip, t, media) else {
            tracing::debug!(?clip_id, "main video frame unavailable; rendering black");
            report.media_missing = true;
            return;
        };

        let time_in_clip = clip.time_in_clip(t);
        let has_animation = clip.has_active_animation();
        let has_effects = !clip.active_effects_at(time_in_clip).is_empty();

        let animated_transform = if has_animation {
            let mut tr = evaluator::evaluate(&clip.animation, time_in_clip);
            // Static opacity composes with animated opacity.
            tr.opacity = (tr.opacity * clip.transform.opacity).clamp(0.0, 1.0);
            Some(tr)
        } else {
            None
        };
        let static_affine = (!clip.transform.is_identity()).then(|| {
            let cx = f64::from(self.ctx.width()) / 2.0;
            let cy = f64::from(self.ctx.height()) / 2.0;
            kurbo::Affine::translate((cx, cy))
                * evaluator::make_affine(&clip.transform.to_animated())
                * kurbo::Affine::translate((-cx, -cy))
        });

        if has_effects {
            // Base pass lands in the chain's scene framebuffer (pre-cleared to
            // transparent), then the chain runs over it.
            let mut scene = std::mem::replace(self.chain.scene_target(), Surface::new(1, 1));
            match &animated_transform {
                Some(tr) => {
                    draw_animated(
                        &mut self.ctx,
                        DrawTarget::Surface(&mut scene),
                        &frame,
                        tr,
                        clip.crop,
                        &clip.filters,
                    );
                    report.program = Some(ProgramId::Animated);
                }
                None => {
                    draw_basic(
                        &mut self.ctx,
                        DrawTarget::Surface(&mut scene),
                        &frame,
                        clip.crop,
                        &clip.filters,
                        clip.transform.opacity.clamp(0.0, 1.0) as f32,
                        static_affine,
                    );
                    report.program = Some(ProgramId::Basic);
                }
            }
            *self.chain.scene_texture_mut() = scene;

            let drew = self.chain.apply(
                &mut self.ctx,
                EffectInput::SceneTarget,
                &clip.effects,
                time_in_clip,
                t,
            );
            report.effect_draws = self.chain.last_run_draws();
            if !drew {
                // Nothing in the chain actually ran; the scene must still be
                // presented explicitly.
                self.ctx.use_program(ProgramId::Basic);
                let scene = self.chain.scene_texture().clone();
                self.ctx.enable_blend();
                self.ctx.draw_quad_to_backbuffer(
                    &scene,
                    kurbo::Rect::new(
                        0.0,
                        0.0,
                        f64::from(self.ctx.width()),
                        f64::from(self.ctx.height()),
                    ),
                    None,
                    1.0,
                );
                self.ctx.disable_blend();
            }
        } else {
            match &animated_transform {
                Some(tr) => {
                    draw_animated(
                        &mut self.ctx,
                        DrawTarget::Backbuffer,
                        &frame,
                        tr,
                        clip.crop,
                        &clip.filters,
                    );
                    report.program = Some(ProgramId::Animated);
                }
                None => {
                    draw_basic(
                        &mut self.ctx,
                        DrawTarget::Backbuffer,
                        &frame,
                        clip.crop,
                        &clip.filters,
                        clip.transform.opacity.clamp(0.0, 1.0) as f32,
                        static_affine,
                    );
                    report.program = Some(ProgramId::Basic);
                }
            }
        }
    }

    fn render_overlays(
        &mut self,
        timeline: &Timeline,
        t: f64,
        media: &mut dyn FrameSource,
        report: &mut FrameReport,
    ) {
        for clip_id in timeline.sticker_clips_at(t) {
            let Some(clip) = timeline.clip(clip_id) else {
                continue;
            };
            let Some(frame) = self.clip_frame(timeline, clip, t, media) else {
                report.media_missing = true;
                continue;
            };
            let tr: AnimatedTransform = if clip.has_active_animation() {
                evaluator::evaluate(&clip.animation, clip.time_in_clip(t))
            } else {
                clip.transform.to_animated()
            };
            // Overlay translation is an offset from screen center in 0..1
            // screen space; the transform's x/y carry that fraction.
            draw_overlay(
                &mut self.ctx,
                &frame,
                &OverlayParams {
                    translation: (0.5 + tr.x, 0.5 + tr.y),
                    scale_x: tr.scale_x,
                    scale_y: tr.scale_y,
                    rotation_rad: tr.rotation_rad,
                    opacity: (tr.opacity * clip.transform.opacity).clamp(0.0, 1.0) as f32,
                },
            );
            report.overlays += 1;
        }
    }

    fn render_subtitles(&mut self, timeline: &Timeline, t: f64, report: &mut FrameReport) {
        for clip_id in timeline.text_clips_at(t) {
            let Some(clip) = timeline.clip(clip_id) else {
                continue;
            };
            let Some(text) = &clip.text else {
                continue;
            };
            let opacity_gate = clip.transform.opacity > 0.0;
            if !opacity_gate {
                continue;
            }
            match self
                .subtitles
                .rasterize(text, self.ctx.width(), self.ctx.height())
            {
                Ok(layer) => {
                    SubtitleRenderer::composite_layer(self.ctx.backbuffer_mut(), &layer);
                    report.subtitles += 1;
                }
                Err(err) => {
                    tracing::warn!(%err, "subtitle rasterization failed");
                }
            }
        }
    }
}

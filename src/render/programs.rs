use rayon::prelude::*;

use crate::animation::evaluator::{AnimatedTransform, make_affine};
use crate::model::clip::{ColorFilters, CropMode};
use crate::model::transition::TransitionKind;
use crate::render::context::{ProgramId, RenderContext};
use crate::render::filters::{apply_color_filters, blur_rgba8_premul};
use crate::render::surface::{Surface, crossfade};

/// Where a program writes.
pub enum DrawTarget<'a> {
    Backbuffer,
    Surface(&'a mut Surface),
}

/// Destination rect for a texture under the given crop mode.
///
/// `Contain` letterboxes, `Cover` crops overflow, `Fill` stretches.
pub fn fit_rect(canvas_w: u32, canvas_h: u32, tex_aspect: f64, crop: CropMode) -> kurbo::Rect {
    let cw = f64::from(canvas_w);
    let ch = f64::from(canvas_h);
    match crop {
        CropMode::Fill => kurbo::Rect::new(0.0, 0.0, cw, ch),
        CropMode::Contain | CropMode::Cover => {
            let canvas_aspect = cw / ch;
            let fit_width = match crop {
                CropMode::Contain => tex_aspect >= canvas_aspect,
                _ => tex_aspect < canvas_aspect,
            };
            let (w, h) = if fit_width {
                (cw, cw / tex_aspect)
            } else {
                (ch * tex_aspect, ch)
            };
            let x = (cw - w) / 2.0;
            let y = (ch - h) / 2.0;
            kurbo::Rect::new(x, y, x + w, y + h)
        }
    }
}

fn filtered<'a>(tex: &'a Surface, filters: &ColorFilters) -> std::borrow::Cow<'a, Surface> {
    if filters.is_neutral() {
        std::borrow::Cow::Borrowed(tex)
    } else {
        let mut owned = tex.clone();
        apply_color_filters(&mut owned, filters);
        std::borrow::Cow::Owned(owned)
    }
}

/// BASIC: crop-mode quad with the shared color filters.
///
/// `transform` carries a clip's static transform as a vertex-level warp; the
/// program itself stays transform-free, unlike ANIMATED.
pub fn draw_basic(
    ctx: &mut RenderContext,
    target: DrawTarget<'_>,
    tex: &Surface,
    crop: CropMode,
    filters: &ColorFilters,
    opacity: f32,
    transform: Option<kurbo::Affine>,
) {
    ctx.use_program(ProgramId::Basic);
    ctx.enable_blend();
    let rect = fit_rect(ctx.width(), ctx.height(), tex.aspect(), crop);
    let tex = filtered(tex, filters);
    match target {
        DrawTarget::Backbuffer => ctx.draw_quad_to_backbuffer(&tex, rect, transform, opacity),
        DrawTarget::Surface(dst) => ctx.draw_textured_quad(dst, &tex, rect, transform, opacity),
    }
    ctx.disable_blend();
}

/// ANIMATED: BASIC plus a keyframed transform about the canvas center.
///
/// Positions and anchors are in canvas pixels; the matrix synthesized by the
/// evaluator is applied around the center of the fitted quad.
pub fn draw_animated(
    ctx: &mut RenderContext,
    target: DrawTarget<'_>,
    tex: &Surface,
    transform: &AnimatedTransform,
    crop: CropMode,
    filters: &ColorFilters,
) {
    ctx.use_program(ProgramId::Animated);
    ctx.enable_blend();
    let rect = fit_rect(ctx.width(), ctx.height(), tex.aspect(), crop);
    let cx = f64::from(ctx.width()) / 2.0;
    let cy = f64::from(ctx.height()) / 2.0;
    let canvas_transform = kurbo::Affine::translate((cx, cy))
        * make_affine(transform)
        * kurbo::Affine::translate((-cx, -cy));
    let opacity = transform.opacity.clamp(0.0, 1.0) as f32;
    let tex = filtered(tex, filters);
    match target {
        DrawTarget::Backbuffer => {
            ctx.draw_quad_to_backbuffer(&tex, rect, Some(canvas_transform), opacity);
        }
        DrawTarget::Surface(dst) => {
            ctx.draw_textured_quad(dst, &tex, rect, Some(canvas_transform), opacity);
        }
    }
    ctx.disable_blend();
}

/// OVERLAY: sticker quad with screen-space placement.
///
/// `translation` is the sticker center in 0..1 screen space.
pub struct OverlayParams {
    pub translation: (f64, f64),
    pub scale_x: f64,
    pub scale_y: f64,
    pub rotation_rad: f64,
    pub opacity: f32,
}

pub fn draw_overlay(ctx: &mut RenderContext, tex: &Surface, params: &OverlayParams) {
    ctx.use_program(ProgramId::Overlay);
    ctx.enable_blend();
    let w = f64::from(tex.width) * params.scale_x.max(0.0);
    let h = f64::from(tex.height) * params.scale_y.max(0.0);
    let cx = params.translation.0 * f64::from(ctx.width());
    let cy = params.translation.1 * f64::from(ctx.height());
    let rect = kurbo::Rect::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0);
    let rotate = kurbo::Affine::translate((cx, cy))
        * kurbo::Affine::rotate(params.rotation_rad)
        * kurbo::Affine::translate((-cx, -cy));
    ctx.draw_quad_to_backbuffer(tex, rect, Some(rotate), params.opacity);
    ctx.disable_blend();
}

/// Progress curve shared by every transition type.
pub fn transition_ease(p: f64) -> f64 {
    let t = p.clamp(0.0, 1.0);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - ((-2.0 * t + 2.0).powi(3) / 2.0)
    }
}

/// TRANSITION: blend two clip frames into the backbuffer.
///
/// Both frames render into the same aspect-preserving rect derived from the
/// smaller source aspect, so neither is cropped mid-transition.
pub fn draw_transition(
    ctx: &mut RenderContext,
    tex_a: &Surface,
    tex_b: &Surface,
    kind: TransitionKind,
    eased_progress: f64,
) {
    ctx.use_program(ProgramId::Transition);
    let w = ctx.width();
    let h = ctx.height();
    let aspect = tex_a.aspect().min(tex_b.aspect());
    let rect = fit_rect(w, h, aspect, CropMode::Contain);

    let mut frame_a = ctx.pool.borrow(w, h);
    let mut frame_b = ctx.pool.borrow(w, h);
    ctx.disable_blend();
    ctx.draw_textured_quad(&mut frame_a, tex_a, rect, None, 1.0);
    ctx.draw_textured_quad(&mut frame_b, tex_b, rect, None, 1.0);

    let p = eased_progress.clamp(0.0, 1.0) as f32;
    let mixed = mix_transition(&frame_a, &frame_b, kind, p);
    ctx.pool.release(frame_a);
    ctx.pool.release(frame_b);

    let mut bb = std::mem::replace(ctx.backbuffer_mut(), Surface::new(1, 1));
    composite_over_background(&mut bb, &mixed);
    *ctx.backbuffer_mut() = bb;
    ctx.pool.release(mixed);
}

fn composite_over_background(bb: &mut Surface, src: &Surface) {
    for (d, s) in bb
        .data
        .chunks_exact_mut(4)
        .zip(src.data.chunks_exact(4))
    {
        let out = crate::render::surface::over(
            [d[0], d[1], d[2], d[3]],
            [s[0], s[1], s[2], s[3]],
            1.0,
        );
        d.copy_from_slice(&out);
    }
}

fn mix_transition(a: &Surface, b: &Surface, kind: TransitionKind, p: f32) -> Surface {
    let w = a.width;
    let h = a.height;
    let wf = f64::from(w);
    let hf = f64::from(h);
    let pf = f64::from(p);

    // The blur type runs a real gaussian on both sides, strongest mid-swap.
    let (blur_a, blur_b);
    let (a, b) = if kind == TransitionKind::Blur {
        let radius = ((pf * std::f64::consts::PI).sin() * 12.0).round() as u32;
        blur_a = blurred(a, radius);
        blur_b = blurred(b, radius);
        (&blur_a, &blur_b)
    } else {
        (a, b)
    };

    let mut out = Surface::new(w, h);
    let row_bytes = (w as usize) * 4;
    out.data
        .par_chunks_exact_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            let yy = y as u32;
            for x in 0..w {
                let px = match kind {
                    TransitionKind::Fade => {
                        // Through black: A fades out, then B fades in.
                        if p < 0.5 {
                            dim(a.pixel(x, yy), 1.0 - p * 2.0)
                        } else {
                            dim(b.pixel(x, yy), p * 2.0 - 1.0)
                        }
                    }
                    TransitionKind::Dissolve | TransitionKind::Blur => {
                        crossfade(a.pixel(x, yy), b.pixel(x, yy), p)
                    }
                    TransitionKind::SlideLeft => {
                        let sx = f64::from(x) + pf * wf;
                        if sx < wf {
                            a.sample_bilinear(sx, f64::from(yy))
                        } else {
                            b.sample_bilinear(sx - wf, f64::from(yy))
                        }
                    }
                    TransitionKind::SlideRight => {
                        let sx = f64::from(x) - pf * wf;
                        if sx >= 0.0 {
                            a.sample_bilinear(sx, f64::from(yy))
                        } else {
                            b.sample_bilinear(sx + wf, f64::from(yy))
                        }
                    }
                    TransitionKind::SlideUp => {
                        let sy = f64::from(yy) + pf * hf;
                        if sy < hf {
                            a.sample_bilinear(f64::from(x), sy)
                        } else {
                            b.sample_bilinear(f64::from(x), sy - hf)
                        }
                    }
                    TransitionKind::SlideDown => {
                        let sy = f64::from(yy) - pf * hf;
                        if sy >= 0.0 {
                            a.sample_bilinear(f64::from(x), sy)
                        } else {
                            b.sample_bilinear(f64::from(x), sy + hf)
                        }
                    }
                    TransitionKind::Wipe => {
                        if f64::from(x) / wf < pf {
                            b.pixel(x, yy)
                        } else {
                            a.pixel(x, yy)
                        }
                    }
                    TransitionKind::Zoom => {
                        let scale = 1.0 + 0.5 * pf;
                        let cx = wf / 2.0;
                        let cy = hf / 2.0;
                        let sx = cx + (f64::from(x) - cx) / scale;
                        let sy = cy + (f64::from(yy) - cy) / scale;
                        crossfade(a.sample_bilinear(sx, sy), b.pixel(x, yy), p)
                    }
                };
                let i = (x as usize) * 4;
                row[i..i + 4].copy_from_slice(&px);
            }
        });
    out
}

fn blurred(s: &Surface, radius: u32) -> Surface {
    if radius == 0 {
        return s.clone();
    }
    match blur_rgba8_premul(&s.data, s.width, s.height, radius, radius as f32 / 2.0) {
        Ok(data) => Surface {
            width: s.width,
            height: s.height,
            data,
        },
        Err(err) => {
            tracing::warn!(%err, "transition blur failed; falling back to sharp frames");
            s.clone()
        }
    }
}

#[inline]
fn dim(px: [u8; 4], keep: f32) -> [u8; 4] {
    let keep = keep.clamp(0.0, 1.0);
    let mut out = px;
    for c in 0..3 {
        out[c] = (f32::from(px[c]) * keep).round() as u8;
    }
    out
}

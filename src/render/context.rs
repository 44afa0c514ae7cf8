use std::collections::HashMap;

use crate::foundation::error::{CutlineError, CutlineResult};
use crate::render::surface::{Surface, SurfacePool, SurfacePoolOpts, over};

/// Program identities for the core pipeline passes plus per-effect programs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProgramId {
    Basic,
    Transition,
    Overlay,
    Animated,
    Effect(&'static str),
}

/// A "compiled" program bundle: the software analog of a linked shader with
/// resolved uniform locations.
#[derive(Clone, Debug)]
pub struct CompiledProgram {
    pub id: ProgramId,
    pub uniforms: &'static [&'static str],
}

/// Device state owned by the context. Every public pipeline entry point resets
/// this before issuing draws, and every pass leaves it reset on exit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceState {
    pub blend: bool,
    pub program: Option<ProgramId>,
    /// `None` is the backbuffer.
    pub framebuffer: Option<u32>,
    pub color_mask: [bool; 4],
    pub scissor: Option<[u32; 4]>,
    pub active_texture: u32,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            blend: false,
            program: None,
            framebuffer: None,
            color_mask: [true; 4],
            scissor: None,
            active_texture: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerPreference {
    Default,
    HighPerformance,
    LowPower,
}

#[derive(Clone, Debug)]
pub struct RenderOptions {
    /// Keep the previous frame in the backbuffer instead of clearing.
    pub preserve_backbuffer: bool,
    /// Bilinear sampling when true, nearest otherwise.
    pub antialias: bool,
    pub power_preference: PowerPreference,
    pub pool: SurfacePoolOpts,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            preserve_backbuffer: false,
            antialias: true,
            power_preference: PowerPreference::Default,
            pool: SurfacePoolOpts::default(),
        }
    }
}

/// Anything that can be uploaded as a texture.
pub enum TextureSource<'a> {
    /// Decoded video frame bytes, straight alpha.
    VideoFrame {
        width: u32,
        height: u32,
        data: &'a [u8],
    },
    /// Decoded image, straight alpha.
    Image(&'a image::RgbaImage),
    /// An already-premultiplied surface (e.g. the subtitle layer).
    Canvas(&'a Surface),
    Raw {
        width: u32,
        height: u32,
        premultiplied: bool,
        data: &'a [u8],
    },
}

/// Owns the software device: the backbuffer, the program cache, static quad
/// geometry, scratch vertex arrays, and the scratch-surface pool.
///
/// Exactly one pipeline owns a context; the export path constructs its own.
pub struct RenderContext {
    width: u32,
    height: u32,
    backbuffer: Surface,
    programs: HashMap<ProgramId, CompiledProgram>,
    pub(crate) pool: SurfacePool,
    pub(crate) state: DeviceState,
    options: RenderOptions,
    /// Static unit-quad geometry, uploaded once.
    #[allow(dead_code)]
    quad_positions: [f32; 8],
    #[allow(dead_code)]
    quad_uvs: [f32; 8],
    /// Reused per-draw to avoid allocating vertex data each frame.
    scratch_positions: Vec<f32>,
    scratch_uvs: Vec<f32>,
    draw_calls: u64,
}

const BASIC_UNIFORMS: &[&str] = &[
    "u_texture",
    "u_brightness",
    "u_contrast",
    "u_saturation",
    "u_hue",
    "u_blur",
];
const ANIMATED_UNIFORMS: &[&str] = &[
    "u_texture",
    "u_transform",
    "u_resolution",
    "u_opacity",
    "u_brightness",
    "u_contrast",
    "u_saturation",
    "u_hue",
    "u_blur",
];
const TRANSITION_UNIFORMS: &[&str] =
    &["u_textureA", "u_textureB", "u_progress", "u_transitionType"];
const OVERLAY_UNIFORMS: &[&str] = &[
    "u_texture",
    "u_resolution",
    "u_imgSize",
    "u_translation",
    "u_scale",
    "u_rotation",
    "u_opacity",
];
pub(crate) const EFFECT_UNIFORMS: &[&str] =
    &["u_texture", "u_time", "u_resolution", "u_intensity"];

impl RenderContext {
    pub fn new(width: u32, height: u32, options: RenderOptions) -> CutlineResult<Self> {
        if width == 0 || height == 0 {
            return Err(CutlineError::render("render surface must be non-empty"));
        }
        let mut ctx = Self {
            width,
            height,
            backbuffer: Surface::new(width, height),
            programs: HashMap::new(),
            pool: SurfacePool::new(options.pool),
            state: DeviceState::default(),
            options,
            quad_positions: [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0],
            quad_uvs: [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0],
            scratch_positions: vec![0.0; 8],
            scratch_uvs: vec![0.0; 8],
            draw_calls: 0,
        };
        // Pre-compile the core programs so first-frame latency stays flat.
        for (id, uniforms) in [
            (ProgramId::Basic, BASIC_UNIFORMS),
            (ProgramId::Transition, TRANSITION_UNIFORMS),
            (ProgramId::Overlay, OVERLAY_UNIFORMS),
            (ProgramId::Animated, ANIMATED_UNIFORMS),
        ] {
            ctx.programs.insert(id, CompiledProgram { id, uniforms });
        }
        Ok(ctx)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn backbuffer(&self) -> &Surface {
        &self.backbuffer
    }

    pub fn backbuffer_mut(&mut self) -> &mut Surface {
        &mut self.backbuffer
    }

    pub fn draw_calls(&self) -> u64 {
        self.draw_calls
    }

    pub fn antialias(&self) -> bool {
        self.options.antialias
    }

    pub fn preserve_backbuffer(&self) -> bool {
        self.options.preserve_backbuffer
    }

    /// Fetch a program, registering it on first use. Returns `None` (and logs)
    /// for ids the device cannot build; callers must tolerate that.
    pub fn get_or_create_program(
        &mut self,
        id: ProgramId,
        uniforms: &'static [&'static str],
    ) -> Option<&CompiledProgram> {
        if let ProgramId::Effect(name) = id
            && name.is_empty()
        {
            tracing::warn!("effect program compile failed: empty kind");
            return None;
        }
        Some(
            self.programs
                .entry(id)
                .or_insert(CompiledProgram { id, uniforms }),
        )
    }

    pub fn use_program(&mut self, id: ProgramId) {
        self.state.program = Some(id);
    }

    pub fn enable_blend(&mut self) {
        self.state.blend = true;
    }

    pub fn disable_blend(&mut self) {
        self.state.blend = false;
    }

    pub fn bind_framebuffer(&mut self, fbo: Option<u32>) {
        self.state.framebuffer = fbo;
    }

    /// The state sandbox: return the device to the known-clean baseline.
    pub fn reset_state(&mut self) {
        self.state = DeviceState::default();
    }

    /// Enter a draw pass. State is reset on entry and again when the scope
    /// drops, on every exit path.
    pub fn scoped(&mut self) -> StateScope<'_> {
        self.reset_state();
        StateScope { ctx: self }
    }

    /// Upload a texture source into a device surface. Clamp-to-edge and linear
    /// filtering are properties of the samplers, applied at draw time.
    pub fn upload_texture(&mut self, source: TextureSource<'_>) -> CutlineResult<Surface> {
        match source {
            TextureSource::VideoFrame {
                width,
                height,
                data,
            } => Surface::from_rgba8_straight(width, height, data.to_vec()),
            TextureSource::Image(img) => {
                Surface::from_rgba8_straight(img.width(), img.height(), img.as_raw().clone())
            }
            TextureSource::Canvas(surface) => Ok(surface.clone()),
            TextureSource::Raw {
                width,
                height,
                premultiplied,
                data,
            } => {
                if premultiplied {
                    Surface::from_rgba8_premul(width, height, data.to_vec())
                } else {
                    Surface::from_rgba8_straight(width, height, data.to_vec())
                }
            }
        }
    }

    pub fn create_texture(&mut self, width: u32, height: u32) -> Surface {
        self.pool.borrow(width, height)
    }

    pub fn release_texture(&mut self, texture: Surface) {
        self.pool.release(texture);
    }

    pub fn resize(&mut self, width: u32, height: u32) -> CutlineResult<()> {
        if width == 0 || height == 0 {
            return Err(CutlineError::render("render surface must be non-empty"));
        }
        self.width = width;
        self.height = height;
        self.backbuffer = Surface::new(width, height);
        Ok(())
    }

    /// Clear the backbuffer to opaque black (the presented background).
    pub fn clear_backbuffer(&mut self) {
        for px in self.backbuffer.data.chunks_exact_mut(4) {
            px.copy_from_slice(&[0, 0, 0, 255]);
        }
    }

    /// Rasterize `tex` into `dst` across `dst_rect`, optionally warped by a
    /// canvas-space transform. This is the quad path shared by every program.
    ///
    /// The dynamic vertex data goes through the preallocated scratch arrays,
    /// mirroring how the static quad buffers stay immutable.
    pub fn draw_textured_quad(
        &mut self,
        dst: &mut Surface,
        tex: &Surface,
        dst_rect: kurbo::Rect,
        transform: Option<kurbo::Affine>,
        opacity: f32,
    ) {
        self.draw_calls += 1;
        let blend = self.state.blend;
        let bilinear = self.options.antialias;

        self.scratch_positions.clear();
        self.scratch_uvs.clear();
        for &(u, v) in &[(0.0f64, 0.0f64), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)] {
            let p = kurbo::Point::new(
                dst_rect.x0 + u * dst_rect.width(),
                dst_rect.y0 + v * dst_rect.height(),
            );
            let p = transform.map_or(p, |m| m * p);
            self.scratch_positions.push(p.x as f32);
            self.scratch_positions.push(p.y as f32);
            self.scratch_uvs.push(u as f32);
            self.scratch_uvs.push(v as f32);
        }

        // Inverse-map each destination pixel back into texture space.
        let rect_to_canvas = kurbo::Affine::translate((dst_rect.x0, dst_rect.y0))
            * kurbo::Affine::scale_non_uniform(dst_rect.width(), dst_rect.height());
        let forward = transform.map_or(rect_to_canvas, |m| m * rect_to_canvas);
        if forward.determinant().abs() < 1e-12 {
            return;
        }
        let inverse = forward.inverse();

        let (x0, y0, x1, y1) = quad_bounds(&self.scratch_positions, dst.width, dst.height);
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let tw = f64::from(tex.width);
        let th = f64::from(tex.height);
        for y in y0..y1 {
            for x in x0..x1 {
                let p = inverse * kurbo::Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                if !(0.0..=1.0).contains(&p.x) || !(0.0..=1.0).contains(&p.y) {
                    continue;
                }
                let sx = p.x * (tw - 1.0).max(0.0);
                let sy = p.y * (th - 1.0).max(0.0);
                let src = if bilinear {
                    tex.sample_bilinear(sx, sy)
                } else {
                    tex.sample_nearest(sx, sy)
                };
                let out = if blend {
                    over(dst.pixel(x, y), src, opacity)
                } else {
                    let mut s = src;
                    if opacity < 1.0 {
                        for c in &mut s {
                            *c = (f32::from(*c) * opacity.clamp(0.0, 1.0)).round() as u8;
                        }
                    }
                    s
                };
                dst.set_pixel(x, y, out);
            }
        }
    }

    /// Draw a textured quad straight into the backbuffer.
    pub fn draw_quad_to_backbuffer(
        &mut self,
        tex: &Surface,
        dst_rect: kurbo::Rect,
        transform: Option<kurbo::Affine>,
        opacity: f32,
    ) {
        let mut bb = std::mem::replace(&mut self.backbuffer, Surface::new(1, 1));
        self.draw_textured_quad(&mut bb, tex, dst_rect, transform, opacity);
        self.backbuffer = bb;
    }

    /// Copy a surface into the backbuffer without blending.
    pub fn blit_to_backbuffer(&mut self, src: &Surface) {
        if src.width == self.backbuffer.width && src.height == self.backbuffer.height {
            self.draw_calls += 1;
            self.backbuffer.data.copy_from_slice(&src.data);
        } else {
            let rect = kurbo::Rect::new(
                0.0,
                0.0,
                f64::from(self.width),
                f64::from(self.height),
            );
            let saved_blend = self.state.blend;
            self.state.blend = false;
            let mut dst = std::mem::replace(&mut self.backbuffer, Surface::new(1, 1));
            self.draw_textured_quad(&mut dst, src, rect, None, 1.0);
            self.backbuffer = dst;
            self.state.blend = saved_blend;
        }
    }
}

fn quad_bounds(positions: &[f32], width: u32, height: u32) -> (u32, u32, u32, u32) {
    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for xy in positions.chunks_exact(2) {
        min_x = min_x.min(xy[0]);
        max_x = max_x.max(xy[0]);
        min_y = min_y.min(xy[1]);
        max_y = max_y.max(xy[1]);
    }
    let x0 = min_x.floor().max(0.0) as u32;
    let y0 = min_y.floor().max(0.0) as u32;
    let x1 = (max_x.ceil().max(0.0) as u32).min(width);
    let y1 = (max_y.ceil().max(0.0) as u32).min(height);
    (x0, y0, x1, y1)
}

/// Scoped state sandbox. Dereferences to the context; restores clean device
/// state when dropped, including on panic unwinds.
pub struct StateScope<'a> {
    ctx: &'a mut RenderContext,
}

impl std::ops::Deref for StateScope<'_> {
    type Target = RenderContext;

    fn deref(&self) -> &RenderContext {
        self.ctx
    }
}

impl std::ops::DerefMut for StateScope<'_> {
    fn deref_mut(&mut self) -> &mut RenderContext {
        self.ctx
    }
}

impl Drop for StateScope<'_> {
    fn drop(&mut self) {
        self.ctx.reset_state();
    }
}

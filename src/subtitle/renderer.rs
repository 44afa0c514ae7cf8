use crate::foundation::error::{CutlineError, CutlineResult};
use crate::model::clip::TextContent;
use crate::render::surface::Surface;

/// RGBA8 brush color carried through Parley layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct TextBrushRgba8 {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
    pub(crate) a: u8,
}

/// Rasterizes subtitle text onto its own transparent layer.
///
/// Subtitles are a 2D raster concern: the layer is drawn with `vello_cpu` and
/// composited over the device output by the pipeline, never through the
/// texture programs.
pub struct SubtitleRenderer {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrushRgba8>,
    /// Registered fallback font, when the host supplies one.
    font_bytes: Option<Vec<u8>>,
    registered_family: Option<String>,
    ctx: Option<vello_cpu::RenderContext>,
}

impl Default for SubtitleRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl SubtitleRenderer {
    pub fn new() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
            font_bytes: None,
            registered_family: None,
            ctx: None,
        }
    }

    /// Register explicit font bytes; used when system font discovery is not
    /// acceptable (deterministic export environments).
    pub fn set_font_bytes(&mut self, bytes: Vec<u8>) -> CutlineResult<()> {
        let families = self
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(bytes.clone()), None);
        let family_id = families
            .first()
            .map(|(id, _)| *id)
            .ok_or_else(|| CutlineError::validation("no font families registered from font bytes"))?;
        let family_name = self
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| CutlineError::validation("registered font family has no name"))?
            .to_string();
        self.font_bytes = Some(bytes);
        self.registered_family = Some(family_name);
        Ok(())
    }

    fn layout_plain(
        &mut self,
        text: &str,
        family: &str,
        size_px: f32,
        brush: TextBrushRgba8,
        max_width_px: Option<f32>,
    ) -> CutlineResult<parley::Layout<TextBrushRgba8>> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(CutlineError::validation(
                "subtitle font size must be finite and > 0",
            ));
        }

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(family.to_string())),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<TextBrushRgba8> = builder.build(text);
        if let Some(w) = max_width_px {
            layout.break_all_lines(Some(w));
            layout.align(
                Some(w),
                parley::Alignment::Start,
                parley::AlignmentOptions::default(),
            );
        } else {
            layout.break_all_lines(None);
        }
        Ok(layout)
    }

    /// Lay out and rasterize one subtitle onto a transparent canvas-sized layer.
    pub fn rasterize(
        &mut self,
        text: &TextContent,
        canvas_w: u32,
        canvas_h: u32,
    ) -> CutlineResult<Surface> {
        if text.content.trim().is_empty() {
            return Ok(Surface::new(canvas_w, canvas_h));
        }
        // Glyph rasterization needs the raw bytes of a registered font; system
        // font handles cannot cross the layout/raster boundary.
        let Some(font_bytes) = self.font_bytes.clone() else {
            tracing::warn!("subtitle skipped: no font registered (call set_font_bytes)");
            return Ok(Surface::new(canvas_w, canvas_h));
        };
        let w: u16 = canvas_w
            .try_into()
            .map_err(|_| CutlineError::render("subtitle layer width exceeds u16"))?;
        let h: u16 = canvas_h
            .try_into()
            .map_err(|_| CutlineError::render("subtitle layer height exceeds u16"))?;

        let family = if !text.font_family.is_empty() {
            text.font_family.clone()
        } else {
            self.registered_family
                .clone()
                .unwrap_or_else(|| "system-ui".to_string())
        };

        let [r, g, b, a] = text.color_rgba8;
        let layout = self.layout_plain(
            &text.content,
            &family,
            text.font_size,
            TextBrushRgba8 { r, g, b, a },
            Some(canvas_w as f32 * 0.9),
        )?;

        let font_data = vello_cpu::peniko::FontData::new(
            vello_cpu::peniko::Blob::from(font_bytes),
            0,
        );

        let x = (f64::from(canvas_w) - f64::from(layout.full_width())) / 2.0;
        let y = f64::from(text.position_y.clamp(0.0, 1.0)) * f64::from(canvas_h)
            - f64::from(layout.height());

        let mut ctx = match self.ctx.take() {
            Some(ctx) if ctx.width() == w && ctx.height() == h => ctx,
            _ => vello_cpu::RenderContext::new(w, h),
        };
        ctx.reset();
        ctx.set_transform(vello_cpu::kurbo::Affine::translate((x, y.max(0.0))));

        for line in layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                let brush = run.style().brush;
                ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                    brush.r, brush.g, brush.b, brush.a,
                ));
                let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                });
                ctx.glyph_run(&font_data)
                    .font_size(run.run().font_size())
                    .fill_glyphs(glyphs);
            }
        }

        ctx.flush();
        let mut pixmap = vello_cpu::Pixmap::new(w, h);
        ctx.render_to_pixmap(&mut pixmap);
        let data = pixmap.data_as_u8_slice().to_vec();
        self.ctx = Some(ctx);

        Surface::from_rgba8_premul(canvas_w, canvas_h, data)
    }

    /// Composite a rasterized subtitle layer over the target surface.
    pub fn composite_layer(target: &mut Surface, layer: &Surface) {
        if target.width != layer.width || target.height != layer.height {
            return;
        }
        for (d, s) in target
            .data
            .chunks_exact_mut(4)
            .zip(layer.data.chunks_exact(4))
        {
            let out = crate::render::surface::over(
                [d[0], d[1], d[2], d[3]],
                [s[0], s[1], s[2], s[3]],
                1.0,
            );
            d.copy_from_slice(&out);
        }
    }
}

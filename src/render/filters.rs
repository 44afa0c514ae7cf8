use rayon::prelude::*;

use crate::foundation::error::{CutlineError, CutlineResult};
use crate::model::clip::ColorFilters;
use crate::render::surface::Surface;

/// Apply the shared color-filter set in place. Transparent pixels are left
/// untouched so filters never bleed color into letterbox regions.
pub fn apply_color_filters(surface: &mut Surface, filters: &ColorFilters) {
    if filters.is_neutral() {
        return;
    }

    let brightness = filters.brightness.clamp(-1.0, 1.0) as f32;
    let contrast = filters.contrast.clamp(0.0, 2.0) as f32;
    let saturation = (filters.saturation.max(0.0)) as f32;
    let hue = (filters.hue.rem_euclid(1.0)) as f32;
    let adjust_hsl = saturation != 1.0 || hue != 0.0;

    let width = surface.width as usize;
    surface
        .data
        .par_chunks_exact_mut(width * 4)
        .for_each(|row| {
            for px in row.chunks_exact_mut(4) {
                let a = px[3];
                if a == 0 {
                    continue;
                }
                let af = f32::from(a) / 255.0;
                // Work in straight alpha so the math matches the shader form.
                let mut r = f32::from(px[0]) / 255.0 / af;
                let mut g = f32::from(px[1]) / 255.0 / af;
                let mut b = f32::from(px[2]) / 255.0 / af;

                r += brightness;
                g += brightness;
                b += brightness;

                r = (r - 0.5) * contrast + 0.5;
                g = (g - 0.5) * contrast + 0.5;
                b = (b - 0.5) * contrast + 0.5;

                if adjust_hsl {
                    let (mut h, mut s, l) = rgb_to_hsl(
                        r.clamp(0.0, 1.0),
                        g.clamp(0.0, 1.0),
                        b.clamp(0.0, 1.0),
                    );
                    h = (h + hue).rem_euclid(1.0);
                    s = (s * saturation).clamp(0.0, 1.0);
                    (r, g, b) = hsl_to_rgb(h, s, l);
                }

                px[0] = (r.clamp(0.0, 1.0) * af * 255.0).round() as u8;
                px[1] = (g.clamp(0.0, 1.0) * af * 255.0).round() as u8;
                px[2] = (b.clamp(0.0, 1.0) * af * 255.0).round() as u8;
            }
        });

    if filters.blur > 0.0 {
        let radius = filters.blur.ceil().min(256.0) as u32;
        let sigma = (filters.blur as f32 / 2.0).max(0.1);
        if let Ok(blurred) =
            blur_rgba8_premul(&surface.data, surface.width, surface.height, radius, sigma)
        {
            surface.data = blurred;
        }
    }
}

/// All components in [0,1]; hue is a fractional turn.
pub fn rgb_to_hsl(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    if max == min {
        return (0.0, 0.0, l);
    }
    let d = max - min;
    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };
    let h = if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    (h / 6.0, s, l)
}

pub fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s == 0.0 {
        return (l, l, l);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f32, q: f32, t: f32) -> f32 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 1.0 / 2.0 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

/// Separable gaussian blur over premultiplied RGBA8, fixed-point Q16 kernel.
pub fn blur_rgba8_premul(
    src: &[u8],
    width: u32,
    height: u32,
    radius: u32,
    sigma: f32,
) -> CutlineResult<Vec<u8>> {
    let expected_len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| CutlineError::render("blur buffer size overflow"))?;
    if src.len() != expected_len {
        return Err(CutlineError::render(
            "blur expects src matching width*height*4",
        ));
    }
    if radius == 0 {
        return Ok(src.to_vec());
    }

    let kernel = gaussian_kernel_q16(radius, sigma)?;
    let mut tmp = vec![0u8; expected_len];
    let mut out = vec![0u8; expected_len];

    horizontal_pass(src, &mut tmp, width, height, &kernel);
    vertical_pass(&tmp, &mut out, width, height, &kernel);
    Ok(out)
}

fn gaussian_kernel_q16(radius: u32, sigma: f32) -> CutlineResult<Vec<u32>> {
    if radius == 0 {
        return Ok(vec![1 << 16]);
    }
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(CutlineError::render("blur sigma must be > 0"));
    }

    let r = radius as i32;
    let mut weights_f = Vec::<f64>::with_capacity((2 * r + 1) as usize);
    let mut sum = 0.0f64;
    let sigma = f64::from(sigma);
    let denom = 2.0 * sigma * sigma;
    for i in -r..=r {
        let x = f64::from(i);
        let w = (-x * x / denom).exp();
        weights_f.push(w);
        sum += w;
    }
    if sum <= 0.0 {
        return Err(CutlineError::render("gaussian kernel sum is zero"));
    }

    let mut weights = Vec::<u32>::with_capacity(weights_f.len());
    let mut acc: i64 = 0;
    for &wf in &weights_f {
        let q = ((wf / sum) * 65536.0).round() as i64;
        let q = q.clamp(0, 65536);
        weights.push(q as u32);
        acc += q;
    }
    // Force an exact Q16 sum so flat regions stay flat.
    let delta = 65536i64 - acc;
    if delta != 0 {
        let mid = weights.len() / 2;
        let mid_val = i64::from(weights[mid]);
        weights[mid] = (mid_val + delta).clamp(0, 65536) as u32;
    }

    Ok(weights)
}

fn horizontal_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, k: &[u32]) {
    let radius = (k.len() / 2) as i32;
    let w = width as i32;
    let row_bytes = (width as usize) * 4;
    dst.par_chunks_exact_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            let src_row = &src[y * row_bytes..(y + 1) * row_bytes];
            for x in 0..w {
                let mut acc = [0u64; 4];
                for (ki, &kw) in k.iter().enumerate() {
                    let sx = (x + ki as i32 - radius).clamp(0, w - 1) as usize;
                    let idx = sx * 4;
                    for c in 0..4 {
                        acc[c] += u64::from(kw) * u64::from(src_row[idx + c]);
                    }
                }
                let idx = (x as usize) * 4;
                for c in 0..4 {
                    row[idx + c] = ((acc[c] + (1 << 15)) >> 16).min(255) as u8;
                }
            }
        });
}

fn vertical_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, k: &[u32]) {
    let radius = (k.len() / 2) as i32;
    let h = height as i32;
    let row_bytes = (width as usize) * 4;
    dst.par_chunks_exact_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width as usize {
                let mut acc = [0u64; 4];
                for (ki, &kw) in k.iter().enumerate() {
                    let sy = (y as i32 + ki as i32 - radius).clamp(0, h - 1) as usize;
                    let idx = sy * row_bytes + x * 4;
                    for c in 0..4 {
                        acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                    }
                }
                let idx = x * 4;
                for c in 0..4 {
                    row[idx + c] = ((acc[c] + (1 << 15)) >> 16).min(255) as u8;
                }
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsl_roundtrip_is_close() {
        for &(r, g, b) in &[(1.0, 0.0, 0.0), (0.2, 0.7, 0.3), (0.5, 0.5, 0.5)] {
            let (h, s, l) = rgb_to_hsl(r, g, b);
            let (r2, g2, b2) = hsl_to_rgb(h, s, l);
            assert!((r - r2).abs() < 1e-4);
            assert!((g - g2).abs() < 1e-4);
            assert!((b - b2).abs() < 1e-4);
        }
    }

    #[test]
    fn neutral_filters_are_a_noop() {
        let mut s = Surface::solid(4, 4, [10, 20, 30, 255]);
        let before = s.data.clone();
        apply_color_filters(&mut s, &ColorFilters::default());
        assert_eq!(s.data, before);
    }

    #[test]
    fn brightness_raises_channels() {
        let mut s = Surface::solid(2, 2, [100, 100, 100, 255]);
        apply_color_filters(
            &mut s,
            &ColorFilters {
                brightness: 0.2,
                ..Default::default()
            },
        );
        let px = s.pixel(0, 0);
        assert!(px[0] > 100);
    }

    #[test]
    fn zero_saturation_produces_gray() {
        let mut s = Surface::solid(2, 2, [200, 40, 40, 255]);
        apply_color_filters(
            &mut s,
            &ColorFilters {
                saturation: 0.0,
                ..Default::default()
            },
        );
        let px = s.pixel(0, 0);
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }

    #[test]
    fn filters_skip_transparent_pixels() {
        let mut s = Surface::new(2, 1);
        s.set_pixel(1, 0, [255, 255, 255, 255]);
        apply_color_filters(
            &mut s,
            &ColorFilters {
                brightness: 1.0,
                ..Default::default()
            },
        );
        assert_eq!(s.pixel(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn blur_preserves_flat_regions() {
        let data = vec![128u8; 8 * 8 * 4];
        let out = blur_rgba8_premul(&data, 8, 8, 2, 1.0).unwrap();
        for &b in &out {
            assert!((i32::from(b) - 128).abs() <= 1);
        }
    }

    #[test]
    fn blur_radius_zero_is_identity() {
        let data: Vec<u8> = (0..4 * 4 * 4).map(|i| (i % 251) as u8).collect();
        assert_eq!(blur_rgba8_premul(&data, 4, 4, 0, 1.0).unwrap(), data);
    }
}

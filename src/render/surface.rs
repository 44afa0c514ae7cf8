use std::collections::HashMap;

use crate::foundation::error::{CutlineError, CutlineResult};
use crate::foundation::math::{add_sat_u8, mul_div255};

/// Premultiplied RGBA8 pixel buffer. Every surface in the pipeline, including
/// the backbuffer and uploaded textures, uses this layout.
#[derive(Clone, Debug, PartialEq)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; (width as usize) * (height as usize) * 4],
        }
    }

    pub fn from_rgba8_premul(width: u32, height: u32, data: Vec<u8>) -> CutlineResult<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| CutlineError::render("surface size overflow"))?;
        if data.len() != expected {
            return Err(CutlineError::render(format!(
                "surface buffer has {} bytes, expected {expected}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Straight-alpha input (e.g. decoded video frames) premultiplied on upload.
    pub fn from_rgba8_straight(width: u32, height: u32, mut data: Vec<u8>) -> CutlineResult<Self> {
        for px in data.chunks_exact_mut(4) {
            let a = u16::from(px[3]);
            if a < 255 {
                px[0] = mul_div255(u16::from(px[0]), a);
                px[1] = mul_div255(u16::from(px[1]), a);
                px[2] = mul_div255(u16::from(px[2]), a);
            }
        }
        Self::from_rgba8_premul(width, height, data)
    }

    pub fn solid(width: u32, height: u32, rgba_premul: [u8; 4]) -> Self {
        let mut s = Self::new(width, height);
        for px in s.data.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba_premul);
        }
        s
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    pub fn aspect(&self) -> f64 {
        if self.height == 0 {
            return 1.0;
        }
        f64::from(self.width) / f64::from(self.height)
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, px: [u8; 4]) {
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        self.data[i..i + 4].copy_from_slice(&px);
    }

    /// Nearest sample with clamp-to-edge addressing.
    #[inline]
    pub fn sample_nearest(&self, x: f64, y: f64) -> [u8; 4] {
        if self.width == 0 || self.height == 0 {
            return [0; 4];
        }
        let xi = (x.round() as i64).clamp(0, i64::from(self.width) - 1) as u32;
        let yi = (y.round() as i64).clamp(0, i64::from(self.height) - 1) as u32;
        self.pixel(xi, yi)
    }

    /// Bilinear sample with clamp-to-edge addressing, on premultiplied data.
    pub fn sample_bilinear(&self, x: f64, y: f64) -> [u8; 4] {
        if self.width == 0 || self.height == 0 {
            return [0; 4];
        }
        let max_x = i64::from(self.width) - 1;
        let max_y = i64::from(self.height) - 1;
        let x0f = x.floor();
        let y0f = y.floor();
        let fx = x - x0f;
        let fy = y - y0f;
        let x0 = (x0f as i64).clamp(0, max_x) as u32;
        let y0 = (y0f as i64).clamp(0, max_y) as u32;
        let x1 = ((x0f as i64) + 1).clamp(0, max_x) as u32;
        let y1 = ((y0f as i64) + 1).clamp(0, max_y) as u32;

        let p00 = self.pixel(x0, y0);
        let p10 = self.pixel(x1, y0);
        let p01 = self.pixel(x0, y1);
        let p11 = self.pixel(x1, y1);

        let mut out = [0u8; 4];
        for c in 0..4 {
            let top = f64::from(p00[c]) + (f64::from(p10[c]) - f64::from(p00[c])) * fx;
            let bot = f64::from(p01[c]) + (f64::from(p11[c]) - f64::from(p01[c])) * fx;
            out[c] = (top + (bot - top) * fy).round().clamp(0.0, 255.0) as u8;
        }
        out
    }
}

/// Premultiplied source-over. `opacity` scales the source.
#[inline]
pub fn over(dst: [u8; 4], src: [u8; 4], opacity: f32) -> [u8; 4] {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);
    let mut out = [0u8; 4];
    out[3] = add_sat_u8(sa, mul_div255(u16::from(dst[3]), inv));
    for i in 0..3 {
        let sc = mul_div255(u16::from(src[i]), op);
        let dc = mul_div255(u16::from(dst[i]), inv);
        out[i] = add_sat_u8(sc, dc);
    }
    out
}

/// Linear mix of two premultiplied pixels.
#[inline]
pub fn crossfade(a: [u8; 4], b: [u8; 4], t: f32) -> [u8; 4] {
    let t = t.clamp(0.0, 1.0);
    let tt = ((t * 255.0).round() as i32).clamp(0, 255) as u16;
    let it = 255u16 - tt;
    let mut out = [0u8; 4];
    for i in 0..4 {
        let av = mul_div255(u16::from(a[i]), it);
        let bv = mul_div255(u16::from(b[i]), tt);
        out[i] = add_sat_u8(av, bv);
    }
    out
}

#[derive(Debug, Clone, Copy)]
pub struct SurfacePoolOpts {
    pub max_pool_bytes: usize,
    pub max_surfaces_per_bucket: usize,
}

impl Default for SurfacePoolOpts {
    fn default() -> Self {
        Self {
            max_pool_bytes: 256 * 1024 * 1024,
            max_surfaces_per_bucket: 8,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct SurfacePoolStats {
    pub retained_surfaces: usize,
    pub retained_bytes: usize,
    pub alloc_surfaces: u64,
    pub dropped_on_release: u64,
}

/// Bounded allocator for scratch surfaces, bucketed by dimensions. Borrow and
/// release happen at pass granularity, never per pixel.
pub struct SurfacePool {
    opts: SurfacePoolOpts,
    stats: SurfacePoolStats,
    buckets: HashMap<(u32, u32), Vec<Surface>>,
}

impl SurfacePool {
    pub fn new(opts: SurfacePoolOpts) -> Self {
        Self {
            opts,
            stats: SurfacePoolStats::default(),
            buckets: HashMap::new(),
        }
    }

    pub fn stats(&self) -> SurfacePoolStats {
        self.stats.clone()
    }

    pub fn borrow(&mut self, width: u32, height: u32) -> Surface {
        if let Some(bucket) = self.buckets.get_mut(&(width, height))
            && let Some(mut s) = bucket.pop()
        {
            self.stats.retained_surfaces = self.stats.retained_surfaces.saturating_sub(1);
            self.stats.retained_bytes = self
                .stats
                .retained_bytes
                .saturating_sub(s.data.len());
            s.clear();
            return s;
        }
        self.stats.alloc_surfaces += 1;
        Surface::new(width, height)
    }

    pub fn release(&mut self, surface: Surface) {
        let bytes = surface.data.len();
        if self.opts.max_pool_bytes == 0
            || self.opts.max_surfaces_per_bucket == 0
            || self.stats.retained_bytes.saturating_add(bytes) > self.opts.max_pool_bytes
        {
            self.stats.dropped_on_release += 1;
            return;
        }
        let bucket = self
            .buckets
            .entry((surface.width, surface.height))
            .or_default();
        if bucket.len() >= self.opts.max_surfaces_per_bucket {
            self.stats.dropped_on_release += 1;
            return;
        }
        bucket.push(surface);
        self.stats.retained_surfaces += 1;
        self.stats.retained_bytes += bytes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn over_opacity_0_is_noop() {
        let dst = [1, 2, 3, 4];
        assert_eq!(over(dst, [200, 200, 200, 200], 0.0), dst);
    }

    #[test]
    fn over_src_opaque_replaces_dst() {
        assert_eq!(over([0, 0, 0, 255], [255, 0, 0, 255], 1.0), [255, 0, 0, 255]);
    }

    #[test]
    fn crossfade_endpoints_match_inputs() {
        let a = [10, 20, 30, 40];
        let b = [200, 210, 220, 230];
        assert_eq!(crossfade(a, b, 0.0), a);
        assert_eq!(crossfade(a, b, 1.0), b);
    }

    #[test]
    fn straight_upload_premultiplies() {
        let s = Surface::from_rgba8_straight(1, 1, vec![255, 255, 255, 128]).unwrap();
        let px = s.pixel(0, 0);
        assert_eq!(px[3], 128);
        assert!((i32::from(px[0]) - 128).abs() <= 1);
    }

    #[test]
    fn bilinear_clamps_to_edge() {
        let mut s = Surface::new(2, 1);
        s.set_pixel(0, 0, [0, 0, 0, 255]);
        s.set_pixel(1, 0, [255, 255, 255, 255]);
        assert_eq!(s.sample_bilinear(-10.0, 0.0), [0, 0, 0, 255]);
        assert_eq!(s.sample_bilinear(10.0, 0.0), [255, 255, 255, 255]);
        let mid = s.sample_bilinear(0.5, 0.0);
        assert!(mid[0] > 100 && mid[0] < 155);
    }

    #[test]
    fn pool_reuses_released_surfaces() {
        let mut pool = SurfacePool::new(SurfacePoolOpts::default());
        let a = pool.borrow(8, 8);
        pool.release(a);
        let _b = pool.borrow(8, 8);
        let stats = pool.stats();
        assert_eq!(stats.alloc_surfaces, 1);
        assert_eq!(stats.retained_surfaces, 0);
    }

    #[test]
    fn pool_respects_bucket_cap() {
        let mut pool = SurfacePool::new(SurfacePoolOpts {
            max_pool_bytes: usize::MAX,
            max_surfaces_per_bucket: 1,
        });
        pool.release(Surface::new(4, 4));
        pool.release(Surface::new(4, 4));
        assert_eq!(pool.stats().dropped_on_release, 1);
    }
}

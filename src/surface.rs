/// Tightly packed RGBA8 drawing target in device pixels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Surface {
    w: usize,
    h: usize,
    px: Vec<u8>,
}

impl Surface {
    pub fn new(w: usize, h: usize) -> Self {
        Self {
            w,
            h,
            px: vec![0; w.saturating_mul(h).saturating_mul(4)],
        }
    }

    pub fn width(&self) -> usize {
        self.w
    }

    pub fn height(&self) -> usize {
        self.h
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    pub fn pixels(&self) -> &[u8] {
        &self.px
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.px
    }

    /// Reallocates only when the size actually changes. Returns whether it did.
    pub fn resize(&mut self, w: usize, h: usize) -> bool {
        if self.w == w && self.h == h {
            return false;
        }
        self.w = w;
        self.h = h;
        self.px.resize(w.saturating_mul(h).saturating_mul(4), 0);
        self.px.fill(0);
        true
    }

    pub fn clear(&mut self, rgb: [u8; 3]) {
        for p in self.px.chunks_exact_mut(4) {
            p[0] = rgb[0];
            p[1] = rgb[1];
            p[2] = rgb[2];
            p[3] = 255;
        }
    }

    pub fn get(&self, x: usize, y: usize) -> Option<[u8; 4]> {
        if x >= self.w || y >= self.h {
            return None;
        }
        let i = (y * self.w + x) * 4;
        Some([self.px[i], self.px[i + 1], self.px[i + 2], self.px[i + 3]])
    }

    pub fn put(&mut self, x: usize, y: usize, rgb: [u8; 3]) {
        if x >= self.w || y >= self.h {
            return;
        }
        let i = (y * self.w + x) * 4;
        self.px[i] = rgb[0];
        self.px[i + 1] = rgb[1];
        self.px[i + 2] = rgb[2];
        self.px[i + 3] = 255;
    }

    /// Saturating add, scaled by `k`. Used for particles and glowing lines.
    pub fn add(&mut self, x: isize, y: isize, rgb: [u8; 3], k: f32) {
        if x < 0 || y < 0 || x as usize >= self.w || y as usize >= self.h {
            return;
        }
        let i = (y as usize * self.w + x as usize) * 4;
        for c in 0..3 {
            let v = self.px[i + c] as f32 + rgb[c] as f32 * k;
            self.px[i + c] = v.min(255.0) as u8;
        }
        self.px[i + 3] = 255;
    }

    pub fn copy_from(&mut self, other: &Surface) {
        self.resize(other.w, other.h);
        self.px.copy_from_slice(&other.px);
    }

    /// Constant-alpha "over": `self = self * (1 - alpha) + top * alpha`.
    pub fn blend_over(&mut self, top: &Surface, alpha: f32) {
        if top.w != self.w || top.h != self.h {
            return;
        }
        let t = alpha.clamp(0.0, 1.0);
        let it = 1.0 - t;
        for (d, s) in self.px.chunks_exact_mut(4).zip(top.px.chunks_exact(4)) {
            d[0] = (d[0] as f32 * it + s[0] as f32 * t) as u8;
            d[1] = (d[1] as f32 * it + s[1] as f32 * t) as u8;
            d[2] = (d[2] as f32 * it + s[2] as f32 * t) as u8;
            d[3] = 255;
        }
    }

    /// Nearest-neighbour scale of `src` onto the whole of `self`.
    pub fn upscale_from(&mut self, src: &Surface) {
        if self.is_empty() || src.is_empty() {
            return;
        }
        if src.w == self.w && src.h == self.h {
            self.px.copy_from_slice(&src.px);
            return;
        }
        let src_row_bytes = src.w * 4;
        let dst_row_bytes = self.w * 4;
        for y in 0..self.h {
            let sy = (y * src.h / self.h).min(src.h - 1);
            let src_row = &src.px[sy * src_row_bytes..(sy + 1) * src_row_bytes];
            let dst_row = &mut self.px[y * dst_row_bytes..(y + 1) * dst_row_bytes];
            for x in 0..self.w {
                let sx = (x * src.w / self.w).min(src.w - 1);
                dst_row[x * 4..x * 4 + 4].copy_from_slice(&src_row[sx * 4..sx * 4 + 4]);
            }
        }
    }

    pub fn fill_rect(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, rgb: [u8; 3]) {
        let xa = x0.min(x1).floor().max(0.0) as usize;
        let ya = y0.min(y1).floor().max(0.0) as usize;
        let xb = (x0.max(x1).ceil().max(0.0) as usize).min(self.w);
        let yb = (y0.max(y1).ceil().max(0.0) as usize).min(self.h);
        for y in ya..yb {
            for x in xa..xb {
                self.put(x, y, rgb);
            }
        }
    }

    /// Anti-aliasing-free thick line; additive so crossings brighten.
    pub fn draw_line(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, thickness: f32, rgb: [u8; 3], k: f32) {
        let dx = x1 - x0;
        let dy = y1 - y0;
        let len = (dx * dx + dy * dy).sqrt();
        if !len.is_finite() {
            return;
        }
        let steps = (len.ceil() as usize).clamp(1, 8192);
        let r = (thickness * 0.5).max(0.5);
        let ri = r.ceil() as isize;
        let mut last: Option<(isize, isize)> = None;
        for s in 0..=steps {
            let f = s as f32 / steps as f32;
            let cx = (x0 + dx * f).round() as isize;
            let cy = (y0 + dy * f).round() as isize;
            if last == Some((cx, cy)) {
                continue;
            }
            last = Some((cx, cy));
            if ri <= 1 {
                self.add(cx, cy, rgb, k);
                continue;
            }
            for oy in -ri + 1..ri {
                for ox in -ri + 1..ri {
                    if ((ox * ox + oy * oy) as f32) <= r * r {
                        self.add(cx + ox, cy + oy, rgb, k);
                    }
                }
            }
        }
    }

    pub fn draw_circle(&mut self, cx: f32, cy: f32, radius: f32, thickness: f32, rgb: [u8; 3]) {
        if radius <= 0.0 || !radius.is_finite() {
            return;
        }
        let half = (thickness * 0.5).max(0.5);
        let r_out = radius + half;
        let r_in = (radius - half).max(0.0);
        let x0 = (cx - r_out).floor().max(0.0) as usize;
        let y0 = (cy - r_out).floor().max(0.0) as usize;
        let x1 = ((cx + r_out).ceil().max(0.0) as usize).min(self.w);
        let y1 = ((cy + r_out).ceil().max(0.0) as usize).min(self.h);
        for y in y0..y1 {
            for x in x0..x1 {
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                let d = (dx * dx + dy * dy).sqrt();
                if d >= r_in && d <= r_out {
                    self.put(x, y, rgb);
                }
            }
        }
    }

    /// Round sprite with a soft falloff, added on top of the existing content.
    pub fn splat(&mut self, cx: f32, cy: f32, radius: f32, rgb: [u8; 3], k: f32) {
        let r = radius.max(0.5);
        let ri = r.ceil() as isize;
        let px = cx.round() as isize;
        let py = cy.round() as isize;
        for oy in -ri..=ri {
            for ox in -ri..=ri {
                let d2 = (ox * ox + oy * oy) as f32;
                if d2 > r * r {
                    continue;
                }
                let fall = 1.0 - (d2.sqrt() / (r + 0.5));
                self.add(px + ox, py + oy, rgb, k * fall.max(0.15));
            }
        }
    }

    /// Cheap bloom: a half-resolution box blur of bright pixels added back on top.
    pub fn glow(&mut self, strength: f32) {
        if self.is_empty() || strength <= 0.0 {
            return;
        }
        let (w, h) = (self.w, self.h);
        let hw = w.div_ceil(2);
        let hh = h.div_ceil(2);
        let mut small = vec![[0f32; 3]; hw * hh];
        for y in 0..h {
            for x in 0..w {
                let i = (y * w + x) * 4;
                let s = &mut small[(y / 2) * hw + x / 2];
                for c in 0..3 {
                    let v = self.px[i + c] as f32;
                    if v > 96.0 {
                        s[c] += (v - 96.0) * 0.25;
                    }
                }
            }
        }
        let mut blurred = vec![[0f32; 3]; hw * hh];
        for y in 0..hh {
            for x in 0..hw {
                let mut acc = [0f32; 3];
                let mut n = 0f32;
                for oy in y.saturating_sub(1)..(y + 2).min(hh) {
                    for ox in x.saturating_sub(1)..(x + 2).min(hw) {
                        let s = small[oy * hw + ox];
                        acc[0] += s[0];
                        acc[1] += s[1];
                        acc[2] += s[2];
                        n += 1.0;
                    }
                }
                blurred[y * hw + x] = [acc[0] / n, acc[1] / n, acc[2] / n];
            }
        }
        for y in 0..h {
            for x in 0..w {
                let b = blurred[(y / 2) * hw + x / 2];
                let i = (y * w + x) * 4;
                for c in 0..3 {
                    let v = self.px[i + c] as f32 + b[c] * strength;
                    self.px[i + c] = v.min(255.0) as u8;
                }
            }
        }
    }

    /// True if any pixel is brighter than `threshold` on any channel.
    pub fn has_content(&self, threshold: u8) -> bool {
        self.px
            .chunks_exact(4)
            .any(|p| p[0] > threshold || p[1] > threshold || p[2] > threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_weights_sum_to_one() {
        let mut a = Surface::new(2, 1);
        a.clear([200, 0, 0]);
        let mut b = Surface::new(2, 1);
        b.clear([0, 100, 0]);
        a.blend_over(&b, 0.25);
        assert_eq!(a.get(0, 0), Some([150, 25, 0, 255]));
    }

    #[test]
    fn upscale_covers_destination() {
        let mut src = Surface::new(2, 2);
        src.put(1, 1, [255, 255, 255]);
        let mut dst = Surface::new(4, 4);
        dst.upscale_from(&src);
        assert_eq!(dst.get(3, 3), Some([255, 255, 255, 255]));
        assert_eq!(dst.get(2, 2), Some([255, 255, 255, 255]));
        assert_eq!(dst.get(1, 1), Some([0, 0, 0, 0]));
    }

    #[test]
    fn drawing_outside_bounds_is_ignored() {
        let mut s = Surface::new(4, 4);
        s.draw_line(-10.0, -10.0, 20.0, 20.0, 3.0, [255, 0, 0], 1.0);
        s.splat(100.0, 100.0, 4.0, [255, 255, 255], 1.0);
        s.fill_rect(-5.0, -5.0, 2.0, 2.0, [0, 0, 255]);
        assert!(s.has_content(0));
    }
}

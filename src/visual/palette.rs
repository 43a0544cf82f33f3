use crate::features::{AnimationFeatures, SectionType};
use std::f32::consts::PI;

pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
    let h = fract01(h) * 6.0;
    let i = h.floor() as i32;
    let f = h - i as f32;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);
    let (r, g, b) = match i.rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    [to_u8(r), to_u8(g), to_u8(b)]
}

pub fn fract01(x: f32) -> f32 {
    let f = x - x.floor();
    if f < 0.0 { f + 1.0 } else { f }
}

/// Integer hash in `[0, 1]`. Shared with the particle kernels so the GPU and CPU paths
/// draw jitter from the same family of values.
pub fn hash_u32(a: u32, b: u32, seed: u32) -> f32 {
    let mut n = a.wrapping_mul(374_761_393) ^ b.wrapping_mul(668_265_263) ^ seed.wrapping_mul(0x9E37_79B9);
    n = (n ^ (n >> 13)).wrapping_mul(1_274_126_177);
    n ^= n >> 16;
    ((n & 0x00FF_FFFF) as f32) / 16_777_215.0
}

pub fn kaleido(x: f32, y: f32, symmetry: u32) -> (f32, f32) {
    let s = symmetry.max(2) as f32;
    let r = (x * x + y * y).sqrt();
    let seg = 2.0 * PI / s;
    let mut a = y.atan2(x).rem_euclid(2.0 * PI) % seg;
    if a > seg * 0.5 {
        a = seg - a;
    }
    (a.cos() * r, a.sin() * r)
}

/// Hue offset for the current mood. Positive lyric sentiment drifts warm, negative drifts
/// cool; a known emotion label nudges it further.
pub fn mood_shift(f: &AnimationFeatures) -> f32 {
    let mut shift = -0.1375 * f.lyric_sentiment.clamp(-1.0, 1.0);
    if let Some(emotion) = f.emotion.as_deref() {
        shift += match emotion.trim().to_ascii_lowercase().as_str() {
            "happy" | "joy" | "excited" => -0.04,
            "angry" | "aggressive" => -0.08,
            "sad" | "melancholy" => 0.08,
            "chill" | "calm" | "relaxed" => 0.04,
            _ => 0.0,
        };
    }
    if f.section == SectionType::Drop {
        shift -= 0.03;
    }
    shift
}

pub fn mood_hue(f: &AnimationFeatures) -> f32 {
    fract01(0.4425 + mood_shift(f))
}

/// Background tint used to clear layers; slightly lifted on beats.
pub fn backdrop(f: &AnimationFeatures) -> [u8; 3] {
    let lift = (f.beat_pulse * 10.0) as u8;
    [5u8.saturating_add(lift / 2), 6u8.saturating_add(lift / 2), 10u8.saturating_add(lift)]
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0) as u8
}

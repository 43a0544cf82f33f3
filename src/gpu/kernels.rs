//! Program registry: Metal source per entry point plus the Rust reference kernels the software
//! device runs. Both implement the same math; the MSL text is what a real device compiles.

use super::PatternUniforms;
use crate::surface::Surface;
use crate::visual::palette::{fract01, hsv_to_rgb, kaleido};
use crate::visual::shader::ShaderVariant;

pub const PARTICLE_ENTRY: &str = "particles_step";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelKind {
    Pattern,
    Particles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderSource {
    pub entry: &'static str,
    pub kind: KernelKind,
    body: &'static str,
}

impl ShaderSource {
    /// Complete translation unit: shared prelude followed by the kernel body.
    pub fn full_source(&self) -> String {
        let mut s = String::with_capacity(PRELUDE.len() + self.body.len() + 1);
        s.push_str(PRELUDE);
        s.push('\n');
        s.push_str(self.body);
        s
    }
}

pub fn pattern_source(variant: ShaderVariant) -> ShaderSource {
    let (entry, body) = match variant {
        ShaderVariant::Mandelbrot => ("pattern_mandelbrot", MANDELBROT_MSL),
        ShaderVariant::Julia => ("pattern_julia", JULIA_MSL),
        ShaderVariant::Plasma => ("pattern_plasma", PLASMA_MSL),
        ShaderVariant::Kaleidoscope => ("pattern_kaleidoscope", KALEIDOSCOPE_MSL),
        ShaderVariant::Tunnel => ("pattern_tunnel", TUNNEL_MSL),
    };
    ShaderSource {
        entry,
        kind: KernelKind::Pattern,
        body,
    }
}

pub fn particle_source() -> ShaderSource {
    ShaderSource {
        entry: PARTICLE_ENTRY,
        kind: KernelKind::Particles,
        body: PARTICLES_MSL,
    }
}

/// Per-pixel colour function in centred, aspect-corrected coordinates (`y ∈ [-1, 1]`).
pub type PatternFn = fn(&PatternUniforms, f32, f32) -> [u8; 3];

pub fn pattern_kernel(entry: &str) -> Option<PatternFn> {
    match entry {
        "pattern_mandelbrot" => Some(mandelbrot),
        "pattern_julia" => Some(julia),
        "pattern_plasma" => Some(plasma),
        "pattern_kaleidoscope" => Some(kaleidoscope),
        "pattern_tunnel" => Some(tunnel),
        _ => None,
    }
}

pub fn run_pattern(kernel: PatternFn, u: &PatternUniforms, out: &mut Surface) {
    let w = out.width();
    let h = out.height();
    if w == 0 || h == 0 {
        return;
    }
    let inv_h = 2.0 / h as f32;
    let aspect = w as f32 / h as f32;
    for y in 0..h {
        let ny = y as f32 * inv_h - 1.0;
        for x in 0..w {
            let nx = (x as f32 / w as f32 * 2.0 - 1.0) * aspect;
            out.put(x, y, kernel(u, nx, ny));
        }
    }
}

fn uniform_hue(u: &PatternUniforms) -> f32 {
    let s = u.lyric_sentiment.clamp(-1.0, 1.0) * 0.5 + 0.5;
    fract01(0.58 - 0.275 * s + u.section as f32 * 0.07)
}

fn iterations(u: &PatternUniforms, lo: f32, span: f32) -> u32 {
    (lo + span * u.quality.clamp(0.0, 1.0)) as u32
}

fn escape_color(u: &PatternUniforms, i: u32, max_iter: u32, gamma: f32) -> [u8; 3] {
    if i >= max_iter {
        return hsv_to_rgb(uniform_hue(u), 0.8, 0.04 + 0.08 * u.beat_pulse);
    }
    let v = (i as f32 / max_iter as f32).powf(gamma);
    let h = uniform_hue(u) + v * 0.9 + u.time * 0.03;
    hsv_to_rgb(h, 0.9, (0.35 + 0.65 * v + 0.2 * u.beat_pulse).min(1.0))
}

fn mandelbrot(u: &PatternUniforms, x: f32, y: f32) -> [u8; 3] {
    let max_iter = iterations(u, 24.0, 96.0);
    let zoom = 1.0 + 0.35 * u.bass + 0.25 * u.beat_pulse;
    let scale = 1.25 / zoom;
    let cr = -0.65 + x * scale + 0.02 * (u.time * 0.15).sin();
    let ci = y * scale + 0.02 * (u.time * 0.12).cos();
    let (mut zr, mut zi) = (0.0f32, 0.0f32);
    let mut i = 0u32;
    while i < max_iter {
        let zr2 = zr * zr - zi * zi + cr;
        zi = 2.0 * zr * zi + ci;
        zr = zr2;
        if zr * zr + zi * zi > 4.0 {
            break;
        }
        i += 1;
    }
    escape_color(u, i, max_iter, 0.5)
}

fn julia(u: &PatternUniforms, x: f32, y: f32) -> [u8; 3] {
    let max_iter = iterations(u, 20.0, 88.0);
    let cr = -0.8 + 0.08 * (u.time * 0.2).sin() + 0.05 * u.mid;
    let ci = 0.156 + 0.1 * u.treble;
    let scale = 1.4 / (1.0 + 0.2 * u.beat_pulse);
    let (mut zr, mut zi) = (x * scale, y * scale);
    let mut i = 0u32;
    while i < max_iter {
        let zr2 = zr * zr - zi * zi + cr;
        zi = 2.0 * zr * zi + ci;
        zr = zr2;
        if zr * zr + zi * zi > 4.0 {
            break;
        }
        i += 1;
    }
    escape_color(u, i, max_iter, 0.65)
}

fn plasma_value(x: f32, y: f32, t: f32, freq: f32, bass: f32, treb: f32) -> f32 {
    let a = (x * freq + t * (0.9 + bass * 1.3)).sin();
    let b = (y * (freq * 1.13) - t * (1.1 + treb * 1.6)).sin();
    let c = ((x + y) * (freq * 0.77) + t * 0.7).sin();
    ((a + b + c) / 3.0 * 0.5 + 0.5).clamp(0.0, 1.0)
}

fn plasma(u: &PatternUniforms, x: f32, y: f32) -> [u8; 3] {
    let octaves = 1 + (u.quality * 2.0) as u32;
    let mut v = 0.0;
    let mut amp = 1.0;
    let mut norm = 0.0;
    let mut freq = 2.4 + u.bass;
    for _ in 0..octaves {
        v += plasma_value(x, y, u.time, freq, u.bass, u.treble) * amp;
        norm += amp;
        amp *= 0.5;
        freq *= 2.03;
    }
    let v = v / norm;
    let h = uniform_hue(u) + v * 0.6 + u.time * 0.04;
    hsv_to_rgb(h, 0.9, (0.4 + 0.5 * v + 0.25 * u.beat_pulse).min(1.0))
}

fn kaleidoscope(u: &PatternUniforms, x: f32, y: f32) -> [u8; 3] {
    let symmetry = 4 + (u.quality * 4.0) as u32;
    let rot = u.time * (0.1 + 0.3 * u.mid);
    let (s, c) = rot.sin_cos();
    let (kx, ky) = kaleido(x * c - y * s, x * s + y * c, symmetry);
    let v = plasma_value(kx * 1.3, ky * 1.3, u.time, 2.7 + u.energy, u.bass, u.treble);
    let r = (kx * kx + ky * ky).sqrt();
    let rings = ((r * 9.0 - u.time * 2.0) * (1.0 + u.bass)).sin() * 0.5 + 0.5;
    let m = v * 0.7 + rings * 0.3;
    let h = uniform_hue(u) + m * 0.8 + 0.1 * u.lyric_intensity;
    hsv_to_rgb(h, 0.95, (0.35 + 0.6 * m + 0.2 * u.beat_pulse).min(1.0))
}

fn tunnel(u: &PatternUniforms, x: f32, y: f32) -> [u8; 3] {
    let r = (x * x + y * y).sqrt().max(1e-4);
    let a = y.atan2(x);
    let depth = 1.0 / r;
    let speed = 1.0 + 1.8 * u.beat_pulse + 0.6 * u.energy;
    let stripes = (depth * (0.9 + 0.75 * u.bass) - u.time * speed).sin() * 0.5 + 0.5;
    let spokes = (a * 6.0 + u.time * (0.3 + u.mid)).sin() * 0.5 + 0.5;
    let detail = if u.quality > 0.5 {
        (depth * 3.0 + a * 12.0 - u.time * 2.0).sin() * 0.15
    } else {
        0.0
    };
    let v = (stripes * 0.65 + spokes * 0.35 + detail).clamp(0.0, 1.0);
    let fog = (r * 1.4).min(1.0);
    let h = uniform_hue(u) + depth * 0.05 + u.treble * 0.1;
    hsv_to_rgb(h, 0.85, (v * fog * (0.8 + 0.3 * u.beat_pulse)).min(1.0))
}

const PRELUDE: &str = r#"
#include <metal_stdlib>
using namespace metal;

struct PatternUniforms {
    uint width;
    uint height;
    float time;
    float bass;
    float mid;
    float treble;
    float energy;
    float beat_pulse;
    float lyric_intensity;
    float lyric_sentiment;
    uint section;
    float quality;
};

struct ParticleUniforms {
    uint variant;
    uint count;
    uint seed;
    uint section;
    float time;
    float bass;
    float mid;
    float treble;
    float energy;
    float beat_pulse;
    float burst;
    float gravity;
    float life_step;
    float hue_base;
};

struct Particle {
    float x;
    float y;
    float vx;
    float vy;
    float life;
    float size;
    float hue;
    float sat;
    float bright;
};

static float3 hsv2rgb(float h, float s, float v) {
    float3 k = float3(1.0, 2.0 / 3.0, 1.0 / 3.0);
    float3 p = abs(fract(float3(h) + k) * 6.0 - 3.0);
    return v * mix(float3(1.0), clamp(p - 1.0, 0.0, 1.0), s);
}

static float hash3(uint a, uint b, uint seed) {
    uint n = (a * 374761393u) ^ (b * 668265263u) ^ (seed * 0x9E3779B9u);
    n = (n ^ (n >> 13)) * 1274126177u;
    n = n ^ (n >> 16);
    return float(n & 0x00FFFFFFu) / 16777215.0;
}

static float uniform_hue(constant PatternUniforms& u) {
    float s = clamp(u.lyric_sentiment, -1.0, 1.0) * 0.5 + 0.5;
    return fract(0.58 - 0.275 * s + float(u.section) * 0.07);
}

static float2 centered(uint2 gid, constant PatternUniforms& u) {
    float aspect = float(u.width) / float(u.height);
    return float2((float(gid.x) / float(u.width) * 2.0 - 1.0) * aspect,
                  float(gid.y) * 2.0 / float(u.height) - 1.0);
}

static float3 escape_color(constant PatternUniforms& u, uint i, uint max_iter, float gamma) {
    if (i >= max_iter) {
        return hsv2rgb(uniform_hue(u), 0.8, 0.04 + 0.08 * u.beat_pulse);
    }
    float v = pow(float(i) / float(max_iter), gamma);
    return hsv2rgb(fract(uniform_hue(u) + v * 0.9 + u.time * 0.03), 0.9,
                   min(0.35 + 0.65 * v + 0.2 * u.beat_pulse, 1.0));
}

static float plasma_value(float2 p, float t, float freq, float bass, float treb) {
    float a = sin(p.x * freq + t * (0.9 + bass * 1.3));
    float b = sin(p.y * (freq * 1.13) - t * (1.1 + treb * 1.6));
    float c = sin((p.x + p.y) * (freq * 0.77) + t * 0.7);
    return clamp((a + b + c) / 3.0 * 0.5 + 0.5, 0.0, 1.0);
}
"#;

const MANDELBROT_MSL: &str = r#"
kernel void pattern_mandelbrot(texture2d<float, access::write> out [[texture(0)]],
                               constant PatternUniforms& u [[buffer(0)]],
                               uint2 gid [[thread_position_in_grid]]) {
    if (gid.x >= u.width || gid.y >= u.height) return;
    float2 p = centered(gid, u);
    uint max_iter = uint(24.0 + 96.0 * clamp(u.quality, 0.0, 1.0));
    float scale = 1.25 / (1.0 + 0.35 * u.bass + 0.25 * u.beat_pulse);
    float2 c = float2(-0.65 + p.x * scale + 0.02 * sin(u.time * 0.15),
                      p.y * scale + 0.02 * cos(u.time * 0.12));
    float2 z = float2(0.0);
    uint i = 0;
    for (; i < max_iter; i++) {
        z = float2(z.x * z.x - z.y * z.y + c.x, 2.0 * z.x * z.y + c.y);
        if (dot(z, z) > 4.0) break;
    }
    out.write(float4(escape_color(u, i, max_iter, 0.5), 1.0), gid);
}
"#;

const JULIA_MSL: &str = r#"
kernel void pattern_julia(texture2d<float, access::write> out [[texture(0)]],
                          constant PatternUniforms& u [[buffer(0)]],
                          uint2 gid [[thread_position_in_grid]]) {
    if (gid.x >= u.width || gid.y >= u.height) return;
    float2 p = centered(gid, u);
    uint max_iter = uint(20.0 + 88.0 * clamp(u.quality, 0.0, 1.0));
    float2 c = float2(-0.8 + 0.08 * sin(u.time * 0.2) + 0.05 * u.mid, 0.156 + 0.1 * u.treble);
    float2 z = p * (1.4 / (1.0 + 0.2 * u.beat_pulse));
    uint i = 0;
    for (; i < max_iter; i++) {
        z = float2(z.x * z.x - z.y * z.y + c.x, 2.0 * z.x * z.y + c.y);
        if (dot(z, z) > 4.0) break;
    }
    out.write(float4(escape_color(u, i, max_iter, 0.65), 1.0), gid);
}
"#;

const PLASMA_MSL: &str = r#"
kernel void pattern_plasma(texture2d<float, access::write> out [[texture(0)]],
                           constant PatternUniforms& u [[buffer(0)]],
                           uint2 gid [[thread_position_in_grid]]) {
    if (gid.x >= u.width || gid.y >= u.height) return;
    float2 p = centered(gid, u);
    uint octaves = 1 + uint(u.quality * 2.0);
    float v = 0.0, amp = 1.0, norm = 0.0, freq = 2.4 + u.bass;
    for (uint o = 0; o < octaves; o++) {
        v += plasma_value(p, u.time, freq, u.bass, u.treble) * amp;
        norm += amp;
        amp *= 0.5;
        freq *= 2.03;
    }
    v /= norm;
    float3 rgb = hsv2rgb(fract(uniform_hue(u) + v * 0.6 + u.time * 0.04), 0.9,
                         min(0.4 + 0.5 * v + 0.25 * u.beat_pulse, 1.0));
    out.write(float4(rgb, 1.0), gid);
}
"#;

const KALEIDOSCOPE_MSL: &str = r#"
kernel void pattern_kaleidoscope(texture2d<float, access::write> out [[texture(0)]],
                                 constant PatternUniforms& u [[buffer(0)]],
                                 uint2 gid [[thread_position_in_grid]]) {
    if (gid.x >= u.width || gid.y >= u.height) return;
    float2 p = centered(gid, u);
    float rot = u.time * (0.1 + 0.3 * u.mid);
    float s = sin(rot), c = cos(rot);
    p = float2(p.x * c - p.y * s, p.x * s + p.y * c);
    float seg = 2.0 * M_PI_F / float(4 + uint(u.quality * 4.0));
    float r = length(p);
    float a = fmod(atan2(p.y, p.x) + 2.0 * M_PI_F, 2.0 * M_PI_F);
    a = fmod(a, seg);
    if (a > seg * 0.5) a = seg - a;
    float2 k = float2(cos(a), sin(a)) * r;
    float v = plasma_value(k * 1.3, u.time, 2.7 + u.energy, u.bass, u.treble);
    float rings = sin((length(k) * 9.0 - u.time * 2.0) * (1.0 + u.bass)) * 0.5 + 0.5;
    float m = v * 0.7 + rings * 0.3;
    float3 rgb = hsv2rgb(fract(uniform_hue(u) + m * 0.8 + 0.1 * u.lyric_intensity), 0.95,
                         min(0.35 + 0.6 * m + 0.2 * u.beat_pulse, 1.0));
    out.write(float4(rgb, 1.0), gid);
}
"#;

const TUNNEL_MSL: &str = r#"
kernel void pattern_tunnel(texture2d<float, access::write> out [[texture(0)]],
                           constant PatternUniforms& u [[buffer(0)]],
                           uint2 gid [[thread_position_in_grid]]) {
    if (gid.x >= u.width || gid.y >= u.height) return;
    float2 p = centered(gid, u);
    float r = max(length(p), 1e-4);
    float a = atan2(p.y, p.x);
    float depth = 1.0 / r;
    float speed = 1.0 + 1.8 * u.beat_pulse + 0.6 * u.energy;
    float stripes = sin(depth * (0.9 + 0.75 * u.bass) - u.time * speed) * 0.5 + 0.5;
    float spokes = sin(a * 6.0 + u.time * (0.3 + u.mid)) * 0.5 + 0.5;
    float detail = u.quality > 0.5 ? sin(depth * 3.0 + a * 12.0 - u.time * 2.0) * 0.15 : 0.0;
    float v = clamp(stripes * 0.65 + spokes * 0.35 + detail, 0.0, 1.0);
    float fog = min(r * 1.4, 1.0);
    float3 rgb = hsv2rgb(fract(uniform_hue(u) + depth * 0.05 + u.treble * 0.1), 0.85,
                         min(v * fog * (0.8 + 0.3 * u.beat_pulse), 1.0));
    out.write(float4(rgb, 1.0), gid);
}
"#;

const PARTICLES_MSL: &str = r#"
kernel void particles_step(device Particle* ps [[buffer(0)]],
                           constant ParticleUniforms& u [[buffer(1)]],
                           uint id [[thread_position_in_grid]]) {
    if (id >= u.count) return;
    Particle p = ps[id];
    float dx = p.x - 0.5;
    float dy = p.y - 0.5;
    float r = max(sqrt(dx * dx + dy * dy), 1e-3);
    float2 radial = float2(dx, dy) / r;
    float2 tangent = float2(-radial.y, radial.x);
    float damping = 0.98;
    float2 f = float2(0.0);

    if (u.variant == 0) {
        float curl = sin(p.y * 6.0 + u.time) * cos(p.x * 6.0 - u.time * 0.7);
        f += radial * (u.bass * 0.0004);
        f += tangent * (u.mid * 0.0003) + float2(curl, -curl) * (u.mid * 0.0002);
    } else if (u.variant == 1) {
        f += tangent * (u.mid * 0.0006);
        f += u.section == 3 ? radial * (u.energy * 0.0008) : -radial * (0.00015 * (0.5 + u.bass));
        damping = 0.97;
    } else if (u.variant == 2) {
        f.y += u.gravity;
        f += radial * u.burst;
        damping = 0.985;
    } else {
        float ang = sin(p.x * 3.0 + u.time * 0.4) * cos(p.y * 3.0 - u.time * 0.3) * M_PI_F;
        f += float2(cos(ang), sin(ang)) * (0.0002 + 0.0003 * u.mid + 0.0002 * u.bass);
        f.y += sin(p.x * 4.0 * M_PI_F + u.time * 3.0) * u.bass * 0.0004;
        damping = 0.95;
    }

    float jx = hash3(id, u.seed, 11u) - 0.5;
    float jy = hash3(id, u.seed, 23u) - 0.5;
    f += float2(jx, jy) * (u.treble * 0.0006);

    p.vx = (p.vx + f.x) * damping;
    p.vy = (p.vy + f.y) * damping;
    p.x = fract(p.x + p.vx);
    p.y = fract(p.y + p.vy);
    p.life -= u.life_step;

    if (p.life <= 0.0) {
        float ra = hash3(id, u.seed, 41u);
        float rb = hash3(id, u.seed, 59u);
        float rc = hash3(id, u.seed, 71u);
        if (u.variant == 2) {
            float ang = ra * 2.0 * M_PI_F;
            float rad = rb * 0.08;
            p.x = 0.5 + cos(ang) * rad;
            p.y = 0.5 + sin(ang) * rad;
        } else {
            p.x = ra;
            p.y = rb;
        }
        float va = rc * 2.0 * M_PI_F;
        p.vx = cos(va) * 0.001;
        p.vy = sin(va) * 0.001;
        p.life = 0.6 + 0.4 * hash3(id, u.seed, 83u);
        p.hue = fract(u.hue_base + (hash3(id, u.seed, 97u) - 0.5) * 0.25);
    }
    ps[id] = p;
}
"#;

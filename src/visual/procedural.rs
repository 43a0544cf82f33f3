use super::backend::{BackendStatus, FrameClock, VisualBackend};
use super::palette::{backdrop, hsv_to_rgb, mood_shift};
use crate::features::{AnalysisSnapshot, AnimationFeatures, FeaturePipeline};
use crate::gpu::GpuProvider;
use crate::quality::QualityProfile;
use crate::surface::Surface;

const RING_COUNT: usize = 3;

/// Rings, a bar cluster and a HUD crosshair. Always drawn on the CPU.
pub struct ProceduralRenderer {
    pipeline: FeaturePipeline,
    profile: Option<QualityProfile>,
    bar_count: usize,
    glow_strength: f32,
}

impl ProceduralRenderer {
    pub fn new(pipeline: FeaturePipeline, glow_strength: f32) -> Self {
        Self {
            pipeline,
            profile: None,
            bar_count: 24,
            glow_strength,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.bar_count
    }

    pub fn set_bar_count(&mut self, n: usize) {
        self.bar_count = n.clamp(4, 96);
    }

    fn draw(&self, out: &mut Surface) {
        let f = self.pipeline.features();
        out.clear(backdrop(f));
        let (w, h) = (out.width() as f32, out.height() as f32);
        let (cx, cy) = (w * 0.5, h * 0.5);
        let min_dim = w.min(h);
        let line = (min_dim / 240.0).max(1.0);
        let shift = mood_shift(f);
        let pulse_mult = 1.0 + 0.15 * f.beat_pulse;

        let outer = min_dim * (0.30 + 0.10 * f.bass) * pulse_mult;
        let inner = 0.6 * outer;
        let ring_rgb = hsv_to_rgb(0.08 + shift, 0.7, (200.0 + 55.0 * f.bass) / 255.0);
        let ring_thickness = line * (1.0 + f.energy * 0.5);
        for i in 0..RING_COUNT {
            let r = inner + (outer - inner) * (i as f32 / (RING_COUNT - 1) as f32);
            out.draw_circle(cx, cy, r, ring_thickness, ring_rgb);
        }

        let n = self.bar_count;
        let h_max = min_dim * 0.35 * pulse_mult;
        let bar_w = min_dim * 0.015;
        let spacing = min_dim * 0.02;
        let half = n as f32 / 2.0;
        let tip = 0.7 + 0.3 * f.treble;
        let body = 0.5 + 0.5 * f.mid;
        let lift = 0.15 * f.lyric_intensity;
        let bar_rgb = hsv_to_rgb(0.06 + shift, 0.75, (tip * body + lift).min(1.0));
        for i in 0..n {
            let x = cx + (i as f32 - half + 0.5) * (bar_w + spacing);
            let base = h_max * (0.3 + 0.7 * f.mid);
            let jitter = (i as f32 * 0.5 + f.t * 2.0).sin() * f.treble * 0.1;
            let edge = 1.0 - (i as f32 - half).abs() / half * 0.3;
            let bar_h = base * (1.0 + jitter) * edge;
            out.fill_rect(
                x - bar_w * 0.5,
                cy - bar_h * 0.5,
                x + bar_w * 0.5,
                cy + bar_h * 0.5,
                bar_rgb,
            );
        }

        let hud_rgb = hsv_to_rgb(0.53 + shift * 0.5, 1.0, 1.0);
        let angle = 0.4 * f.t + f.treble * 0.2;
        let len = min_dim * 0.4;
        let (s, c) = angle.sin_cos();
        out.draw_line(cx - len * c, cy - len * s, cx + len * c, cy + len * s, line, hud_rgb, 0.9);
        out.draw_line(cx + len * s, cy - len * c, cx - len * s, cy + len * c, line, hud_rgb, 0.9);

        if self.profile.is_some_and(|p| p.post_processing_enabled) {
            out.glow(self.glow_strength);
        }
    }
}

impl VisualBackend for ProceduralRenderer {
    fn name(&self) -> &'static str {
        "procedural"
    }

    fn update_features(&mut self, t: f32, snapshot: Option<&AnalysisSnapshot>) {
        self.pipeline.update(t, snapshot);
    }

    fn features(&self) -> &AnimationFeatures {
        self.pipeline.features()
    }

    fn resize(&mut self, _w: usize, _h: usize, profile: &QualityProfile, _gpu: &dyn GpuProvider) {
        self.profile = Some(*profile);
    }

    fn render(&mut self, _clock: FrameClock, out: &mut Surface) {
        if out.is_empty() {
            return;
        }
        self.draw(out);
    }

    fn status(&self) -> BackendStatus {
        BackendStatus {
            name: self.name(),
            gpu: None,
            detail: format!("bars={}", self.bar_count),
        }
    }
}

use super::backend::{BackendStatus, FrameClock, GpuLink, VisualBackend};
use super::palette::{hsv_to_rgb, mood_hue};
use crate::features::{AnalysisSnapshot, AnimationFeatures, FeaturePipeline};
use crate::gpu::{kernels, GpuConsumer, GpuProvider, PatternUniforms, ProgramHandle};
use crate::quality::QualityProfile;
use crate::surface::Surface;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShaderVariant {
    #[default]
    Mandelbrot,
    Julia,
    Plasma,
    Kaleidoscope,
    Tunnel,
}

impl ShaderVariant {
    pub const ALL: [Self; 5] = [
        Self::Mandelbrot,
        Self::Julia,
        Self::Plasma,
        Self::Kaleidoscope,
        Self::Tunnel,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mandelbrot" | "mandel" => Some(Self::Mandelbrot),
            "julia" => Some(Self::Julia),
            "plasma" => Some(Self::Plasma),
            "kaleidoscope" | "kaleido" => Some(Self::Kaleidoscope),
            "tunnel" => Some(Self::Tunnel),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Mandelbrot => "mandelbrot",
            Self::Julia => "julia",
            Self::Plasma => "plasma",
            Self::Kaleidoscope => "kaleidoscope",
            Self::Tunnel => "tunnel",
        }
    }

    pub fn next(self) -> Self {
        let i = Self::ALL.iter().position(|v| *v == self).unwrap_or(0);
        Self::ALL[(i + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for ShaderVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Compile outcome per variant. Failures are remembered so they are reported once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramSlot {
    Compiled(ProgramHandle),
    Failed(String),
}

#[derive(Debug, Clone, Copy)]
struct VariantFade {
    prev: ShaderVariant,
    /// Set on the first frame rendered after the switch.
    started: Option<Instant>,
}

pub struct ShaderRenderer {
    variant: ShaderVariant,
    fade: Option<VariantFade>,
    fade_duration: Duration,
    programs: HashMap<ShaderVariant, ProgramSlot>,
    gpu: GpuLink,
    pipeline: FeaturePipeline,
    profile: Option<QualityProfile>,
    scratch: Surface,
    compiles: u32,
    dispatch_failures: u64,
}

impl ShaderRenderer {
    pub fn new(pipeline: FeaturePipeline, fade_duration: Duration) -> Self {
        Self {
            variant: ShaderVariant::default(),
            fade: None,
            fade_duration,
            programs: HashMap::new(),
            gpu: GpuLink::Pending,
            pipeline,
            profile: None,
            scratch: Surface::default(),
            compiles: 0,
            dispatch_failures: 0,
        }
    }

    pub fn variant(&self) -> ShaderVariant {
        self.variant
    }

    /// Starts a short crossfade from the current program to `variant`.
    pub fn set_variant(&mut self, variant: ShaderVariant) {
        if variant == self.variant {
            return;
        }
        tracing::debug!(from = %self.variant, to = %variant, "shader variant");
        self.fade = Some(VariantFade {
            prev: self.variant,
            started: None,
        });
        self.variant = variant;
    }

    pub fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    /// Number of successful program compiles so far.
    pub fn compile_count(&self) -> u32 {
        self.compiles
    }

    pub fn slot(&self, variant: ShaderVariant) -> Option<&ProgramSlot> {
        self.programs.get(&variant)
    }

    fn use_gpu(&self) -> bool {
        self.profile.is_some_and(|p| p.allow_gpu_path) && matches!(self.gpu, GpuLink::Ready(_))
    }

    fn quality(&self) -> f32 {
        self.profile.map(|p| p.shader_quality()).unwrap_or(0.35)
    }

    fn program_for(&mut self, variant: ShaderVariant) -> Option<ProgramHandle> {
        match self.programs.get(&variant) {
            Some(ProgramSlot::Compiled(h)) => return Some(*h),
            Some(ProgramSlot::Failed(_)) => return None,
            None => {}
        }
        let ctx = self.gpu.context()?;
        let slot = match ctx.compile(&kernels::pattern_source(variant)) {
            Ok(h) => {
                self.compiles += 1;
                tracing::debug!(%variant, "shader program compiled");
                ProgramSlot::Compiled(h)
            }
            Err(err) => {
                tracing::warn!(%variant, %err, "shader program failed; drawing fallback pattern");
                ProgramSlot::Failed(err.to_string())
            }
        };
        let handle = match &slot {
            ProgramSlot::Compiled(h) => Some(*h),
            ProgramSlot::Failed(_) => None,
        };
        self.programs.insert(variant, slot);
        handle
    }

    fn draw_variant(&mut self, variant: ShaderVariant, u: &PatternUniforms, out: &mut Surface) {
        if self.use_gpu() {
            if let Some(program) = self.program_for(variant) {
                if let Some(ctx) = self.gpu.context() {
                    match ctx.draw_pattern(program, u, out) {
                        Ok(()) => return,
                        Err(err) => {
                            self.dispatch_failures += 1;
                            if self.dispatch_failures == 1 {
                                tracing::warn!(%variant, %err, "pattern dispatch failed; drawing fallback");
                            }
                        }
                    }
                }
            }
        }
        draw_fallback(self.pipeline.features(), u, out);
    }
}

/// Time-based pattern drawn on the CPU when no program is usable.
fn draw_fallback(f: &AnimationFeatures, u: &PatternUniforms, out: &mut Surface) {
    let w = out.width();
    let h = out.height();
    if w == 0 || h == 0 {
        return;
    }
    let hue = mood_hue(f);
    let aspect = w as f32 / h as f32;
    let t = u.time;
    for y in 0..h {
        let ny = y as f32 / h as f32 * 2.0 - 1.0;
        for x in 0..w {
            let nx = (x as f32 / w as f32 * 2.0 - 1.0) * aspect;
            let r = (nx * nx + ny * ny).sqrt();
            let rings = (r * 10.0 - t * 2.0 * (1.0 + u.bass)).sin() * 0.5 + 0.5;
            let wave = (nx * 3.0 + t).sin() * (ny * 2.5 - t * 0.8).cos() * 0.5 + 0.5;
            let v = rings * 0.6 + wave * 0.4;
            let rgb = hsv_to_rgb(
                hue + v * 0.3 + t * 0.02,
                0.8,
                (0.3 + 0.55 * v + 0.2 * u.beat_pulse).min(1.0),
            );
            out.put(x, y, rgb);
        }
    }
}

impl VisualBackend for ShaderRenderer {
    fn name(&self) -> &'static str {
        "shader"
    }

    fn update_features(&mut self, t: f32, snapshot: Option<&AnalysisSnapshot>) {
        self.pipeline.update(t, snapshot);
    }

    fn features(&self) -> &AnimationFeatures {
        self.pipeline.features()
    }

    fn resize(&mut self, w: usize, h: usize, profile: &QualityProfile, gpu: &dyn GpuProvider) {
        self.profile = Some(*profile);
        if w == 0 || h == 0 {
            return;
        }
        if profile.allow_gpu_path {
            self.gpu.ensure(gpu, GpuConsumer::ShaderPattern);
        }
        self.scratch.resize(w, h);
    }

    fn render(&mut self, clock: FrameClock, out: &mut Surface) {
        if out.is_empty() {
            return;
        }
        let u = PatternUniforms::from_features(
            self.pipeline.features(),
            out.width(),
            out.height(),
            self.quality(),
        );

        let mut fade_from = None;
        if let Some(fade) = self.fade.as_mut() {
            let started = *fade.started.get_or_insert(clock.now);
            let d = self.fade_duration.as_secs_f32();
            let p = if d <= 0.0 {
                1.0
            } else {
                (clock.now.saturating_duration_since(started).as_secs_f32() / d).clamp(0.0, 1.0)
            };
            if p >= 1.0 {
                self.fade = None;
            } else {
                fade_from = Some((fade.prev, p));
            }
        }

        let variant = self.variant;
        self.draw_variant(variant, &u, out);
        if let Some((prev, p)) = fade_from {
            let mut scratch = std::mem::take(&mut self.scratch);
            scratch.resize(out.width(), out.height());
            self.draw_variant(prev, &u, &mut scratch);
            // `out` holds the incoming program; mix the outgoing one back in at 1 - p.
            out.blend_over(&scratch, 1.0 - p);
            self.scratch = scratch;
        }

        if self.profile.is_some_and(|p| p.post_processing_enabled) {
            out.glow(0.35);
        }
    }

    fn status(&self) -> BackendStatus {
        let failed = self
            .programs
            .values()
            .filter(|s| matches!(s, ProgramSlot::Failed(_)))
            .count();
        BackendStatus {
            name: self.name(),
            gpu: if self.use_gpu() { self.gpu.label() } else { None },
            detail: format!(
                "{} {} compiled={} failed={}",
                self.variant,
                if self.use_gpu() { self.gpu.describe() } else { "cpu fallback".to_string() },
                self.compiles,
                failed
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_cycle_visits_every_variant() {
        let mut v = ShaderVariant::Mandelbrot;
        let mut seen = Vec::new();
        for _ in 0..ShaderVariant::ALL.len() {
            seen.push(v);
            v = v.next();
        }
        assert_eq!(v, ShaderVariant::Mandelbrot);
        for s in ShaderVariant::ALL {
            assert!(seen.contains(&s));
            assert_eq!(ShaderVariant::parse(s.label()), Some(s));
        }
    }

    #[test]
    fn setting_same_variant_does_not_fade() {
        let mut r = ShaderRenderer::new(FeaturePipeline::new(), Duration::from_millis(600));
        r.set_variant(ShaderVariant::Mandelbrot);
        assert!(!r.is_fading());
        r.set_variant(ShaderVariant::Tunnel);
        assert!(r.is_fading());
    }
}

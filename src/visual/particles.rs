use super::backend::{BackendStatus, FrameClock, GpuLink, VisualBackend};
use super::palette::{backdrop, fract01, hsv_to_rgb, mood_hue};
use crate::features::{AnalysisSnapshot, AnimationFeatures, FeaturePipeline, SectionType};
use crate::gpu::{kernels, GpuConsumer, GpuProvider, ParticleUniforms, ProgramHandle};
use crate::quality::QualityProfile;
use crate::surface::Surface;
use std::f32::consts::PI;
use std::fmt;

/// One simulated point. Positions are normalised to the canvas (`0..1` on both axes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub life: f32,
    pub size: f32,
    pub hue: f32,
    pub sat: f32,
    pub bright: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParticleVariant {
    #[default]
    Nebula,
    VortexSwarm,
    BeatFireworks,
    LiquidFlow,
}

impl ParticleVariant {
    pub const ALL: [Self; 4] = [
        Self::Nebula,
        Self::VortexSwarm,
        Self::BeatFireworks,
        Self::LiquidFlow,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "nebula" => Some(Self::Nebula),
            "vortex_swarm" | "vortex" => Some(Self::VortexSwarm),
            "beat_fireworks" | "fireworks" => Some(Self::BeatFireworks),
            "liquid_flow" | "liquid" => Some(Self::LiquidFlow),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Nebula => "nebula",
            Self::VortexSwarm => "vortex_swarm",
            Self::BeatFireworks => "beat_fireworks",
            Self::LiquidFlow => "liquid_flow",
        }
    }

    pub const fn index(self) -> u32 {
        match self {
            Self::Nebula => 0,
            Self::VortexSwarm => 1,
            Self::BeatFireworks => 2,
            Self::LiquidFlow => 3,
        }
    }

    fn hue_offset(self) -> f32 {
        match self {
            Self::Nebula => 0.12,
            Self::VortexSwarm => 0.0,
            Self::BeatFireworks => -0.35,
            Self::LiquidFlow => 0.05,
        }
    }
}

impl fmt::Display for ParticleVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleTuning {
    /// Smoothed beat pulse at or above which a firework burst fires.
    pub beat_trigger: f32,
    /// Minimum playback seconds between two bursts.
    pub retrigger_gate: f32,
    /// Outward impulse per unit of beat pulse.
    pub burst_strength: f32,
    pub gravity: f32,
    pub life_step: f32,
    /// Pool size ceiling when no GPU path is in use.
    pub cpu_cap: usize,
    /// Consecutive dispatch failures after which the GPU path is abandoned for good.
    pub gpu_failure_limit: u32,
}

impl Default for ParticleTuning {
    fn default() -> Self {
        Self {
            beat_trigger: 0.5,
            retrigger_gate: 0.1,
            burst_strength: 0.002,
            gravity: 0.000_12,
            life_step: 0.005,
            cpu_cap: 300,
            gpu_failure_limit: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub len: usize,
    pub gpu: bool,
    pub bursts: u64,
    pub gpu_failures: u64,
}

/// Variant force, jitter, damping, integration, wrap and ageing for one particle.
///
/// `jx`/`jy` are centred random values in `[-0.5, 0.5]`; the caller supplies them so the CPU
/// path (seeded RNG) and the device kernels (integer hash) share this exact model.
pub fn advance(p: &mut Particle, u: &ParticleUniforms, jx: f32, jy: f32) {
    let dx = p.x - 0.5;
    let dy = p.y - 0.5;
    let r = (dx * dx + dy * dy).sqrt().max(1e-3);
    let (rx, ry) = (dx / r, dy / r);
    let (tx, ty) = (-ry, rx);
    let mut fx = 0.0;
    let mut fy = 0.0;
    let damping;

    match u.variant {
        0 => {
            let curl = (p.y * 6.0 + u.time).sin() * (p.x * 6.0 - u.time * 0.7).cos();
            fx += rx * u.bass * 0.0004 + tx * u.mid * 0.0003 + curl * u.mid * 0.0002;
            fy += ry * u.bass * 0.0004 + ty * u.mid * 0.0003 - curl * u.mid * 0.0002;
            damping = 0.98;
        }
        1 => {
            fx += tx * u.mid * 0.0006;
            fy += ty * u.mid * 0.0006;
            let radial = if u.section == SectionType::Drop.index() {
                u.energy * 0.0008
            } else {
                -0.000_15 * (0.5 + u.bass)
            };
            fx += rx * radial;
            fy += ry * radial;
            damping = 0.97;
        }
        2 => {
            fy += u.gravity;
            fx += rx * u.burst;
            fy += ry * u.burst;
            damping = 0.985;
        }
        _ => {
            let ang = (p.x * 3.0 + u.time * 0.4).sin() * (p.y * 3.0 - u.time * 0.3).cos() * PI;
            let speed = 0.0002 + 0.0003 * u.mid + 0.0002 * u.bass;
            fx += ang.cos() * speed;
            fy += ang.sin() * speed;
            fy += (p.x * 4.0 * PI + u.time * 3.0).sin() * u.bass * 0.0004;
            damping = 0.95;
        }
    }

    fx += jx * u.treble * 0.0006;
    fy += jy * u.treble * 0.0006;

    p.vx = (p.vx + fx) * damping;
    p.vy = (p.vy + fy) * damping;
    p.x = fract01(p.x + p.vx);
    p.y = fract01(p.y + p.vy);
    p.life -= u.life_step;
}

/// Puts a dead particle back into play in the same slot. `r` holds five uniform values in `[0, 1]`.
pub fn respawn(p: &mut Particle, variant: u32, hue_base: f32, r: [f32; 5]) {
    if variant == ParticleVariant::BeatFireworks.index() {
        let ang = r[0] * 2.0 * PI;
        let rad = r[1] * 0.08;
        p.x = 0.5 + ang.cos() * rad;
        p.y = 0.5 + ang.sin() * rad;
    } else {
        p.x = r[0];
        p.y = r[1];
    }
    let va = r[2] * 2.0 * PI;
    p.vx = va.cos() * 0.001;
    p.vy = va.sin() * 0.001;
    p.life = 0.6 + 0.4 * r[3];
    p.hue = fract01(hue_base + (r[4] - 0.5) * 0.25);
}

pub struct ParticleRenderer {
    variant: ParticleVariant,
    tuning: ParticleTuning,
    pipeline: FeaturePipeline,
    rng: fastrand::Rng,
    pool: Vec<Particle>,
    w: usize,
    h: usize,
    profile: Option<QualityProfile>,
    gpu: GpuLink,
    program: Option<ProgramHandle>,
    program_error: Option<String>,
    last_burst: Option<f32>,
    bursts: u64,
    gpu_failures: u64,
    failure_streak: u32,
}

impl ParticleRenderer {
    pub fn new(pipeline: FeaturePipeline, tuning: ParticleTuning) -> Self {
        Self {
            variant: ParticleVariant::default(),
            tuning,
            pipeline,
            rng: fastrand::Rng::new(),
            pool: Vec::new(),
            w: 0,
            h: 0,
            profile: None,
            gpu: GpuLink::Pending,
            program: None,
            program_error: None,
            last_burst: None,
            bursts: 0,
            gpu_failures: 0,
            failure_streak: 0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = fastrand::Rng::with_seed(seed);
        self
    }

    pub fn variant(&self) -> ParticleVariant {
        self.variant
    }

    /// Switching variants keeps the pool; the next tick simply applies the new force field.
    pub fn set_variant(&mut self, variant: ParticleVariant) {
        if self.variant != variant {
            tracing::debug!(from = %self.variant, to = %variant, "particle variant");
            self.variant = variant;
            self.last_burst = None;
        }
    }

    pub fn particles(&self) -> &[Particle] {
        &self.pool
    }

    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            len: self.pool.len(),
            gpu: self.uses_gpu(),
            bursts: self.bursts,
            gpu_failures: self.gpu_failures,
        }
    }

    fn uses_gpu(&self) -> bool {
        self.profile.is_some_and(|p| p.allow_gpu_path)
            && self.program.is_some()
            && matches!(self.gpu, GpuLink::Ready(_))
    }

    /// Pool size the current profile and GPU state call for.
    pub fn target_pool_size(&self) -> usize {
        let Some(profile) = self.profile else {
            return 0;
        };
        if self.w == 0 || self.h == 0 {
            return 0;
        }
        if self.uses_gpu() {
            profile.max_particles
        } else {
            profile.max_particles.min(self.tuning.cpu_cap)
        }
    }

    fn prepare_gpu(&mut self, provider: &dyn GpuProvider) {
        self.gpu.ensure(provider, GpuConsumer::Particles);
        if self.program.is_some() || self.program_error.is_some() {
            return;
        }
        let Some(ctx) = self.gpu.context() else {
            return;
        };
        match ctx.compile(&kernels::particle_source()) {
            Ok(handle) => self.program = Some(handle),
            Err(err) => {
                tracing::warn!(%err, "particle program failed to compile; using cpu path");
                self.program_error = Some(err.to_string());
            }
        }
    }

    fn reseed_pool(&mut self, n: usize) {
        let hue_base = self.hue_base();
        let variant = self.variant.index();
        self.pool.clear();
        self.pool.reserve_exact(n);
        for _ in 0..n {
            let mut p = Particle {
                size: 0.6 + 0.8 * self.rng.f32(),
                sat: 0.7 + 0.25 * self.rng.f32(),
                bright: 0.75 + 0.25 * self.rng.f32(),
                ..Particle::default()
            };
            respawn(&mut p, variant, hue_base, self.randoms());
            self.pool.push(p);
        }
    }

    fn randoms(&mut self) -> [f32; 5] {
        [
            self.rng.f32(),
            self.rng.f32(),
            self.rng.f32(),
            self.rng.f32(),
            self.rng.f32(),
        ]
    }

    fn hue_base(&self) -> f32 {
        fract01(mood_hue(self.pipeline.features()) + self.variant.hue_offset())
    }

    /// Drops the device path after repeated dispatch failures and shrinks the pool to the CPU cap.
    fn abandon_gpu(&mut self) {
        let reason = format!("dispatch failed {} times in a row", self.failure_streak);
        tracing::warn!(failures = self.failure_streak, "giving up on gpu particles");
        self.program = None;
        self.program_error = Some(reason.clone());
        self.gpu = GpuLink::Unavailable(reason);
        let target = self.target_pool_size();
        self.reseed_pool(target);
        tracing::debug!(pool = target, "particle pool sized for cpu");
    }

    /// Advances the simulation by one tick using the current smoothed features.
    pub fn step(&mut self) {
        if self.pool.is_empty() {
            return;
        }
        let f = self.pipeline.features();
        let t = f.t;
        let mut burst = 0.0;
        if self.variant == ParticleVariant::BeatFireworks && f.beat_pulse >= self.tuning.beat_trigger {
            let gate_open = match self.last_burst {
                None => true,
                Some(last) => t < last || t - last >= self.tuning.retrigger_gate,
            };
            if gate_open {
                burst = f.beat_pulse * self.tuning.burst_strength;
                self.last_burst = Some(t);
                self.bursts += 1;
            }
        }
        let u = ParticleUniforms {
            variant: self.variant.index(),
            count: self.pool.len() as u32,
            seed: self.rng.u32(..),
            section: f.section.index(),
            time: t,
            bass: f.bass,
            mid: f.mid,
            treble: f.treble,
            energy: f.energy,
            beat_pulse: f.beat_pulse,
            burst,
            gravity: self.tuning.gravity,
            life_step: self.tuning.life_step,
            hue_base: self.hue_base(),
        };

        if self.uses_gpu() {
            if let (Some(ctx), Some(program)) = (self.gpu.context(), self.program) {
                match ctx.step_particles(program, &u, &mut self.pool) {
                    Ok(()) => {
                        self.failure_streak = 0;
                        return;
                    }
                    Err(err) => {
                        self.gpu_failures += 1;
                        self.failure_streak += 1;
                        if self.gpu_failures == 1 {
                            tracing::warn!(%err, "particle dispatch failed; stepping on cpu this frame");
                        } else {
                            tracing::debug!(%err, failures = self.gpu_failures, "particle dispatch failed");
                        }
                    }
                }
            }
            if self.failure_streak >= self.tuning.gpu_failure_limit.max(1) {
                self.abandon_gpu();
                return;
            }
        }

        for i in 0..self.pool.len() {
            let jx = self.rng.f32() - 0.5;
            let jy = self.rng.f32() - 0.5;
            advance(&mut self.pool[i], &u, jx, jy);
            if self.pool[i].life <= 0.0 {
                let r = self.randoms();
                respawn(&mut self.pool[i], u.variant, u.hue_base, r);
            }
        }
    }

    fn draw(&self, out: &mut Surface) {
        let f = self.pipeline.features();
        out.clear(backdrop(f));
        let (w, h) = (out.width() as f32, out.height() as f32);
        let base = (w.min(h) / 160.0).max(0.5);
        let gpu = self.uses_gpu();
        // The CPU pool is small; bigger, brighter sprites keep the frame from looking empty.
        let (radius_mul, gain) = if gpu { (0.8, 0.55) } else { (2.6, 0.95) };
        let pump = 0.7 + 0.5 * f.beat_pulse;
        for p in &self.pool {
            let v = (p.bright * (0.35 + 0.65 * p.life.clamp(0.0, 1.0)) * pump).min(1.0);
            let rgb = hsv_to_rgb(p.hue, p.sat, v);
            let radius = base * p.size * radius_mul + if gpu { 0.0 } else { 0.5 };
            out.splat(p.x * w, p.y * h, radius, rgb, gain);
        }
        if self.profile.is_some_and(|p| p.post_processing_enabled) {
            out.glow(0.5);
        }
    }
}

impl VisualBackend for ParticleRenderer {
    fn name(&self) -> &'static str {
        "particles"
    }

    fn update_features(&mut self, t: f32, snapshot: Option<&AnalysisSnapshot>) {
        self.pipeline.update(t, snapshot);
    }

    fn features(&self) -> &AnimationFeatures {
        self.pipeline.features()
    }

    fn resize(&mut self, w: usize, h: usize, profile: &QualityProfile, gpu: &dyn GpuProvider) {
        let same = self.w == w && self.h == h && self.profile.as_ref() == Some(profile);
        self.w = w;
        self.h = h;
        self.profile = Some(*profile);
        if w == 0 || h == 0 {
            self.pool.clear();
            return;
        }
        if profile.allow_gpu_path {
            self.prepare_gpu(gpu);
        }
        let target = self.target_pool_size();
        if same && self.pool.len() == target {
            return;
        }
        self.reseed_pool(target);
        tracing::debug!(w, h, pool = target, gpu = self.uses_gpu(), "particle pool sized");
    }

    fn render(&mut self, _clock: FrameClock, out: &mut Surface) {
        if out.is_empty() || self.pool.is_empty() {
            return;
        }
        self.step();
        self.draw(out);
    }

    fn status(&self) -> BackendStatus {
        let gpu = if self.uses_gpu() { self.gpu.label() } else { None };
        BackendStatus {
            name: self.name(),
            gpu,
            detail: format!(
                "{} pool={} {}",
                self.variant,
                self.pool.len(),
                if self.uses_gpu() { self.gpu.describe() } else { "cpu".to_string() }
            ),
        }
    }
}

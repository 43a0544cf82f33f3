//! GPU seam shared by the shader-pattern and particle backends.
//!
//! Backends never talk to a graphics API directly. They ask a [`GpuProvider`] for a context once
//! (on their first non-zero resize), compile the programs they need, and then dispatch with a
//! fixed uniform block. Anything that goes wrong surfaces as a [`GpuError`] and the backend
//! switches to its CPU path.

pub mod kernels;
#[cfg(target_os = "macos")]
mod metal;
mod software;

use crate::error::GpuError;
use crate::features::AnimationFeatures;
use crate::surface::Surface;
use crate::visual::particles::Particle;

pub use kernels::{KernelKind, ShaderSource};
#[cfg(target_os = "macos")]
pub use metal::MetalProvider;
pub use software::{SoftwareGpu, SoftwareGpuProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuTier {
    Baseline,
    Enhanced,
}

impl GpuTier {
    pub fn label(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Enhanced => "enhanced",
        }
    }
}

/// Which backend is asking for a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuConsumer {
    ShaderPattern,
    Particles,
}

impl GpuConsumer {
    pub fn label(self) -> &'static str {
        match self {
            Self::ShaderPattern => "shader",
            Self::Particles => "particles",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

/// Uniform block every pattern program receives.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PatternUniforms {
    pub width: u32,
    pub height: u32,
    pub time: f32,
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub energy: f32,
    pub beat_pulse: f32,
    pub lyric_intensity: f32,
    pub lyric_sentiment: f32,
    pub section: u32,
    pub quality: f32,
}

impl PatternUniforms {
    pub fn from_features(f: &AnimationFeatures, width: usize, height: usize, quality: f32) -> Self {
        Self {
            width: width as u32,
            height: height as u32,
            time: f.t,
            bass: f.bass,
            mid: f.mid,
            treble: f.treble,
            energy: f.energy,
            beat_pulse: f.beat_pulse,
            lyric_intensity: f.lyric_intensity,
            lyric_sentiment: f.lyric_sentiment,
            section: f.section.index(),
            quality: quality.clamp(0.1, 1.0),
        }
    }
}

/// Uniform block for one particle simulation tick.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParticleUniforms {
    pub variant: u32,
    pub count: u32,
    pub seed: u32,
    pub section: u32,
    pub time: f32,
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub energy: f32,
    pub beat_pulse: f32,
    /// Outward impulse applied this tick (0 when no burst fired).
    pub burst: f32,
    pub gravity: f32,
    pub life_step: f32,
    pub hue_base: f32,
}

pub trait GpuContext {
    fn tier(&self) -> GpuTier;
    fn label(&self) -> &'static str;
    fn compile(&mut self, source: &ShaderSource) -> Result<ProgramHandle, GpuError>;
    fn draw_pattern(
        &mut self,
        program: ProgramHandle,
        uniforms: &PatternUniforms,
        out: &mut Surface,
    ) -> Result<(), GpuError>;
    fn step_particles(
        &mut self,
        program: ProgramHandle,
        uniforms: &ParticleUniforms,
        particles: &mut [Particle],
    ) -> Result<(), GpuError>;
}

pub trait GpuProvider {
    fn name(&self) -> &'static str;
    /// Tier a context from this provider would report, if one can be created at all.
    fn detected_tier(&self) -> Option<GpuTier>;
    fn acquire(&self, consumer: GpuConsumer) -> Result<Box<dyn GpuContext>, GpuError>;
}

/// Provider for machines (or runs) without a usable GPU.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGpu;

impl GpuProvider for NoGpu {
    fn name(&self) -> &'static str {
        "none"
    }

    fn detected_tier(&self) -> Option<GpuTier> {
        None
    }

    fn acquire(&self, consumer: GpuConsumer) -> Result<Box<dyn GpuContext>, GpuError> {
        Err(GpuError::Unavailable(format!(
            "no GPU provider configured for {}",
            consumer.label()
        )))
    }
}

/// Best provider for this platform: Metal where a device exists, otherwise none.
pub fn platform_provider() -> Box<dyn GpuProvider> {
    #[cfg(target_os = "macos")]
    {
        let metal = MetalProvider::new();
        if metal.detected_tier().is_some() {
            return Box::new(metal);
        }
    }
    Box::new(NoGpu)
}

use super::particles::ParticleRenderer;
use super::procedural::ProceduralRenderer;
use super::scene::SceneRenderer;
use super::shader::ShaderRenderer;
use crate::features::{AnalysisSnapshot, AnimationFeatures};
use crate::gpu::{GpuConsumer, GpuContext, GpuProvider};
use crate::quality::QualityProfile;
use crate::surface::Surface;
use std::time::Instant;

/// Per-frame timing handed to a backend's `render`.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    pub now: Instant,
    pub dt: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendStatus {
    pub name: &'static str,
    pub gpu: Option<&'static str>,
    pub detail: String,
}

pub trait VisualBackend {
    fn name(&self) -> &'static str;
    fn update_features(&mut self, t: f32, snapshot: Option<&AnalysisSnapshot>);
    fn features(&self) -> &AnimationFeatures;
    /// Re-derives size-dependent state. Idempotent for an unchanged size and profile.
    fn resize(&mut self, w: usize, h: usize, profile: &QualityProfile, gpu: &dyn GpuProvider);
    /// Draws one frame into `out`, which has the size last passed to `resize`.
    fn render(&mut self, clock: FrameClock, out: &mut Surface);
    fn status(&self) -> BackendStatus;
}

/// A GPU context as seen by one backend: not yet asked for, live, or refused.
pub(crate) enum GpuLink {
    Pending,
    Ready(Box<dyn GpuContext>),
    Unavailable(String),
}

impl GpuLink {
    /// Asks the provider once. Later calls are no-ops whatever the outcome was.
    pub(crate) fn ensure(&mut self, provider: &dyn GpuProvider, consumer: GpuConsumer) {
        if !matches!(self, Self::Pending) {
            return;
        }
        *self = match provider.acquire(consumer) {
            Ok(ctx) => {
                tracing::info!(
                    consumer = consumer.label(),
                    device = ctx.label(),
                    tier = ctx.tier().label(),
                    "gpu context ready"
                );
                Self::Ready(ctx)
            }
            Err(err) => {
                tracing::warn!(consumer = consumer.label(), %err, "gpu unavailable; using cpu path");
                Self::Unavailable(err.to_string())
            }
        };
    }

    pub(crate) fn context(&mut self) -> Option<&mut (dyn GpuContext + 'static)> {
        match self {
            Self::Ready(ctx) => Some(ctx.as_mut()),
            _ => None,
        }
    }

    pub(crate) fn label(&self) -> Option<&'static str> {
        match self {
            Self::Ready(ctx) => Some(ctx.label()),
            _ => None,
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Pending => "gpu pending".to_string(),
            Self::Ready(ctx) => format!("gpu {} {}", ctx.label(), ctx.tier().label()),
            Self::Unavailable(why) => format!("cpu ({why})"),
        }
    }
}

pub enum Backend {
    Procedural(ProceduralRenderer),
    Shader(ShaderRenderer),
    Particles(ParticleRenderer),
    Scene(SceneRenderer),
}

impl VisualBackend for Backend {
    fn name(&self) -> &'static str {
        match self {
            Self::Procedural(b) => b.name(),
            Self::Shader(b) => b.name(),
            Self::Particles(b) => b.name(),
            Self::Scene(b) => b.name(),
        }
    }

    fn update_features(&mut self, t: f32, snapshot: Option<&AnalysisSnapshot>) {
        match self {
            Self::Procedural(b) => b.update_features(t, snapshot),
            Self::Shader(b) => b.update_features(t, snapshot),
            Self::Particles(b) => b.update_features(t, snapshot),
            Self::Scene(b) => b.update_features(t, snapshot),
        }
    }

    fn features(&self) -> &AnimationFeatures {
        match self {
            Self::Procedural(b) => b.features(),
            Self::Shader(b) => b.features(),
            Self::Particles(b) => b.features(),
            Self::Scene(b) => b.features(),
        }
    }

    fn resize(&mut self, w: usize, h: usize, profile: &QualityProfile, gpu: &dyn GpuProvider) {
        match self {
            Self::Procedural(b) => b.resize(w, h, profile, gpu),
            Self::Shader(b) => b.resize(w, h, profile, gpu),
            Self::Particles(b) => b.resize(w, h, profile, gpu),
            Self::Scene(b) => b.resize(w, h, profile, gpu),
        }
    }

    fn render(&mut self, clock: FrameClock, out: &mut Surface) {
        match self {
            Self::Procedural(b) => b.render(clock, out),
            Self::Shader(b) => b.render(clock, out),
            Self::Particles(b) => b.render(clock, out),
            Self::Scene(b) => b.render(clock, out),
        }
    }

    fn status(&self) -> BackendStatus {
        match self {
            Self::Procedural(b) => b.status(),
            Self::Shader(b) => b.status(),
            Self::Particles(b) => b.status(),
            Self::Scene(b) => b.status(),
        }
    }
}

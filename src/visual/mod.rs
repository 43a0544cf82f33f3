pub mod backend;
pub mod palette;
pub mod particles;
pub mod procedural;
pub mod scene;
pub mod shader;

use crate::capability::DeviceCapabilities;
use crate::features::{AnalysisSnapshot, AnimationFeatures, FeaturePipeline};
use crate::gpu::GpuProvider;
use crate::quality::{ListenerId, QualityLevel, QualityManager, QualityProfile};
use crate::surface::Surface;
use crate::timeline::SnapshotSource;
use crate::tuning::EngineTuning;
use std::fmt;
use std::time::{Duration, Instant};

pub use backend::{Backend, BackendStatus, FrameClock, VisualBackend};
use particles::{ParticleRenderer, ParticleVariant};
use procedural::ProceduralRenderer;
use scene::{SceneRenderer, SceneShape};
use shader::{ShaderRenderer, ShaderVariant};

/// Upper bound on the per-frame delta handed to backends, so a stall doesn't fling particles.
const MAX_FRAME_DT: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VisualMode {
    #[default]
    Procedural2D,
    ShaderPattern,
    Particles,
    Scene3D,
}

impl VisualMode {
    pub const ALL: [Self; 4] = [
        Self::Procedural2D,
        Self::ShaderPattern,
        Self::Particles,
        Self::Scene3D,
    ];

    pub fn index(self) -> usize {
        match self {
            Self::Procedural2D => 0,
            Self::ShaderPattern => 1,
            Self::Particles => 2,
            Self::Scene3D => 3,
        }
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "procedural" | "procedural2d" | "2d" | "geometric" => Some(Self::Procedural2D),
            "shader" | "shaderpattern" | "pattern" => Some(Self::ShaderPattern),
            "particles" | "particle" => Some(Self::Particles),
            "scene" | "scene3d" | "3d" => Some(Self::Scene3D),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Procedural2D => "procedural",
            Self::ShaderPattern => "shader",
            Self::Particles => "particles",
            Self::Scene3D => "scene",
        }
    }
}

impl fmt::Display for VisualMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy)]
struct ModeTransition {
    target: VisualMode,
    started: Instant,
    /// A partly faded-in layer abandoned by a retarget, with the weight it had at that moment.
    outgoing: Option<(VisualMode, f32)>,
}

/// Owns one backend per [`VisualMode`], the mode state machine, and the layers used to
/// crossfade between modes.
pub struct VisualizerEngine {
    backends: [Backend; 4],
    current: VisualMode,
    transition: Option<ModeTransition>,
    transition_duration: Duration,
    pipeline: FeaturePipeline,
    source: Option<Box<dyn SnapshotSource>>,
    features_fresh: bool,
    quality: QualityManager,
    applied: Option<QualityProfile>,
    gpu: Box<dyn GpuProvider>,
    size: (usize, usize),
    layer_a: Surface,
    layer_b: Surface,
    surface: Surface,
    last_frame: Option<Instant>,
    frames: u64,
}

impl VisualizerEngine {
    pub fn new(caps: &DeviceCapabilities, gpu: Box<dyn GpuProvider>, tuning: EngineTuning) -> Self {
        let pipeline = || FeaturePipeline::with_alphas(tuning.beat_alpha, tuning.band_alpha);
        let quality = QualityManager::new(caps, tuning.quality);
        tracing::info!(
            level = %quality.level(),
            gpu = gpu.name(),
            device = %caps.status_label(),
            "visualizer engine created"
        );
        Self {
            backends: [
                Backend::Procedural(ProceduralRenderer::new(pipeline(), tuning.glow_strength)),
                Backend::Shader(ShaderRenderer::new(pipeline(), tuning.shader_fade)),
                Backend::Particles(ParticleRenderer::new(pipeline(), tuning.particles)),
                Backend::Scene(SceneRenderer::new(pipeline())),
            ],
            current: VisualMode::default(),
            transition: None,
            transition_duration: tuning.transition,
            pipeline: pipeline(),
            source: None,
            features_fresh: false,
            quality,
            applied: None,
            gpu,
            size: (0, 0),
            layer_a: Surface::default(),
            layer_b: Surface::default(),
            surface: Surface::default(),
            last_frame: None,
            frames: 0,
        }
    }

    pub fn mode(&self) -> VisualMode {
        self.current
    }

    pub fn transition_target(&self) -> Option<VisualMode> {
        self.transition.map(|tr| tr.target)
    }

    /// Crossfade progress at `now`, or 0.0 when no transition is pending.
    pub fn transition_progress(&self, now: Instant) -> f32 {
        match self.transition {
            Some(tr) => self.progress_of(tr, now),
            None => 0.0,
        }
    }

    fn progress_of(&self, tr: ModeTransition, now: Instant) -> f32 {
        let d = self.transition_duration.as_secs_f32();
        if d <= 0.0 {
            return 1.0;
        }
        (now.saturating_duration_since(tr.started).as_secs_f32() / d).clamp(0.0, 1.0)
    }

    /// Requests a crossfade to `next`. A second request mid-transition retargets and restarts it;
    /// whatever was already faded in keeps its weight and fades out over the new transition.
    pub fn set_mode(&mut self, next: VisualMode, now: Instant) {
        let outgoing = match self.transition {
            Some(tr) if tr.target == next => return,
            Some(tr) => {
                let shown = self.progress_of(tr, now);
                if tr.target != self.current {
                    Some((tr.target, shown))
                } else {
                    tr.outgoing.map(|(mode, w)| (mode, w * (1.0 - shown)))
                }
            }
            None if next == self.current => return,
            None => None,
        };
        let outgoing = outgoing.filter(|&(mode, w)| mode != next && w > 0.0);
        tracing::debug!(from = %self.current, to = %next, "mode transition");
        self.transition = Some(ModeTransition {
            target: next,
            started: now,
            outgoing,
        });
    }

    /// The layer left over from a retarget and its weight at `now`, while it is still visible.
    pub fn fading_out(&self, now: Instant) -> Option<(VisualMode, f32)> {
        let tr = self.transition?;
        let p = self.progress_of(tr, now);
        tr.outgoing
            .map(|(mode, w)| (mode, w * (1.0 - p)))
            .filter(|&(_, w)| w > 0.0)
    }

    /// Switches without a crossfade, dropping any pending transition. Used at startup.
    pub fn jump_to_mode(&mut self, mode: VisualMode) {
        self.current = mode;
        self.transition = None;
    }

    pub fn features(&self) -> &AnimationFeatures {
        self.pipeline.features()
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn size(&self) -> (usize, usize) {
        self.size
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Attaches (or detaches) the source `render` samples when no features were pushed.
    pub fn update_analysis(&mut self, source: Option<Box<dyn SnapshotSource>>) {
        match &source {
            Some(s) => tracing::info!(source = s.label(), "analysis source attached"),
            None => tracing::debug!("analysis source detached"),
        }
        self.source = source;
    }

    pub fn has_analysis(&self) -> bool {
        self.source.is_some()
    }

    /// Feeds one frame of raw analysis to the engine and every backend.
    pub fn update_features(&mut self, t: f32, snapshot: Option<&AnalysisSnapshot>) {
        self.pipeline.update(t, snapshot);
        for b in &mut self.backends {
            b.update_features(t, snapshot);
        }
        self.features_fresh = true;
    }

    /// Pulls a snapshot for `t` from the attached source; holds features when there is none.
    pub fn sample_features(&mut self, t: f32) {
        let snapshot = self.source.as_mut().and_then(|s| s.sample(t));
        self.update_features(t, snapshot.as_ref());
    }

    pub fn quality_profile(&self) -> &QualityProfile {
        self.quality.profile()
    }

    pub fn quality(&self) -> &QualityManager {
        &self.quality
    }

    pub fn on_quality_change(&mut self, listener: impl FnMut(&QualityProfile) + 'static) -> ListenerId {
        self.quality.on_change(listener)
    }

    pub fn remove_quality_listener(&mut self, id: ListenerId) -> bool {
        self.quality.remove_listener(id)
    }

    pub fn set_manual_quality_override(&mut self, level: Option<QualityLevel>) {
        let now = self.last_frame.unwrap_or_else(Instant::now);
        self.quality.set_manual_override(level, now);
    }

    /// Sets the output size in device pixels. Zero in either dimension defers backend setup.
    pub fn resize(&mut self, w: usize, h: usize) {
        let profile = *self.quality.profile();
        if self.size == (w, h) && self.applied == Some(profile) {
            return;
        }
        self.size = (w, h);
        self.surface.resize(w, h);
        self.apply_profile(profile);
    }

    fn apply_profile(&mut self, profile: QualityProfile) {
        let (iw, ih) = profile.internal_size(self.size.0, self.size.1);
        self.layer_a.resize(iw, ih);
        self.layer_b.resize(iw, ih);
        for b in &mut self.backends {
            b.resize(iw, ih, &profile, self.gpu.as_ref());
        }
        if self.applied.is_some_and(|p| p.level != profile.level) {
            tracing::info!(level = %profile.level, width = iw, height = ih, "quality profile applied");
        } else {
            tracing::debug!(level = %profile.level, width = iw, height = ih, "backends resized");
        }
        self.applied = Some(profile);
    }

    pub fn set_particle_variant(&mut self, variant: ParticleVariant) {
        if let Some(p) = self.particle_renderer_mut() {
            p.set_variant(variant);
        }
    }

    pub fn set_shader_variant(&mut self, variant: ShaderVariant) {
        if let Some(s) = self.shader_renderer_mut() {
            s.set_variant(variant);
        }
    }

    pub fn set_scene_shape(&mut self, shape: SceneShape) {
        if let Some(s) = self.scene_renderer_mut() {
            s.set_shape(shape);
        }
    }

    pub fn backend(&self, mode: VisualMode) -> &Backend {
        &self.backends[mode.index()]
    }

    pub fn procedural_renderer(&self) -> Option<&ProceduralRenderer> {
        match self.backend(VisualMode::Procedural2D) {
            Backend::Procedural(r) => Some(r),
            _ => None,
        }
    }

    pub fn shader_renderer(&self) -> Option<&ShaderRenderer> {
        match self.backend(VisualMode::ShaderPattern) {
            Backend::Shader(r) => Some(r),
            _ => None,
        }
    }

    pub fn particle_renderer(&self) -> Option<&ParticleRenderer> {
        match self.backend(VisualMode::Particles) {
            Backend::Particles(r) => Some(r),
            _ => None,
        }
    }

    pub fn scene_renderer(&self) -> Option<&SceneRenderer> {
        match self.backend(VisualMode::Scene3D) {
            Backend::Scene(r) => Some(r),
            _ => None,
        }
    }

    fn shader_renderer_mut(&mut self) -> Option<&mut ShaderRenderer> {
        match &mut self.backends[VisualMode::ShaderPattern.index()] {
            Backend::Shader(r) => Some(r),
            _ => None,
        }
    }

    fn particle_renderer_mut(&mut self) -> Option<&mut ParticleRenderer> {
        match &mut self.backends[VisualMode::Particles.index()] {
            Backend::Particles(r) => Some(r),
            _ => None,
        }
    }

    fn scene_renderer_mut(&mut self) -> Option<&mut SceneRenderer> {
        match &mut self.backends[VisualMode::Scene3D.index()] {
            Backend::Scene(r) => Some(r),
            _ => None,
        }
    }

    /// Status of every backend, in [`VisualMode::ALL`] order.
    pub fn backend_status(&self) -> Vec<BackendStatus> {
        self.backends.iter().map(|b| b.status()).collect()
    }

    /// Renders one frame at wall-clock `now` and playback time `t`.
    pub fn render(&mut self, now: Instant, t: f32) -> &Surface {
        self.quality.register_frame(now);
        let profile = *self.quality.profile();
        if self.applied != Some(profile) {
            self.apply_profile(profile);
        }

        if !self.features_fresh {
            self.sample_features(t);
        }
        self.features_fresh = false;

        let dt = self
            .last_frame
            .map(|prev| now.saturating_duration_since(prev).as_secs_f32())
            .unwrap_or(0.0)
            .min(MAX_FRAME_DT);
        self.last_frame = Some(now);
        self.frames += 1;

        let mut blend = None;
        let mut fade_out = None;
        if let Some(tr) = self.transition {
            let p = self.progress_of(tr, now);
            if p >= 1.0 {
                tracing::debug!(mode = %tr.target, "mode transition complete");
                self.current = tr.target;
                self.transition = None;
            } else {
                fade_out = tr.outgoing.map(|(mode, w)| (mode, w * (1.0 - p)));
                if tr.target != self.current {
                    blend = Some((tr.target, p));
                }
            }
        }

        if self.surface.is_empty() || self.layer_a.is_empty() {
            return &self.surface;
        }

        let clock = FrameClock { now, dt };
        self.backends[self.current.index()].render(clock, &mut self.layer_a);
        for (mode, weight) in fade_out.into_iter().chain(blend) {
            self.backends[mode.index()].render(clock, &mut self.layer_b);
            self.layer_a.blend_over(&self.layer_b, weight);
        }
        self.surface.upscale_from(&self.layer_a);
        &self.surface
    }
}

impl fmt::Debug for VisualizerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisualizerEngine")
            .field("current", &self.current)
            .field("transition", &self.transition)
            .field("size", &self.size)
            .field("quality", &self.quality)
            .field("gpu", &self.gpu.name())
            .field("frames", &self.frames)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::NoGpu;

    fn engine() -> VisualizerEngine {
        VisualizerEngine::new(
            &DeviceCapabilities::headless(),
            Box::new(NoGpu),
            EngineTuning::default(),
        )
    }

    #[test]
    fn mode_labels_round_trip() {
        for m in VisualMode::ALL {
            assert_eq!(VisualMode::parse(m.label()), Some(m));
            assert_eq!(VisualMode::ALL[m.index()], m);
        }
        assert_eq!(VisualMode::Scene3D.next(), VisualMode::Procedural2D);
    }

    #[test]
    fn set_mode_to_current_is_noop() {
        let mut e = engine();
        e.set_mode(VisualMode::Procedural2D, Instant::now());
        assert_eq!(e.transition_target(), None);
    }

    #[test]
    fn retarget_restarts_transition() {
        let mut e = engine();
        let t0 = Instant::now();
        e.set_mode(VisualMode::Particles, t0);
        let t1 = t0 + Duration::from_millis(500);
        e.set_mode(VisualMode::Scene3D, t1);
        assert_eq!(e.transition_target(), Some(VisualMode::Scene3D));
        assert_eq!(e.transition_progress(t1), 0.0);
        // Same target again keeps the original start.
        e.set_mode(VisualMode::Scene3D, t1 + Duration::from_millis(300));
        assert!(e.transition_progress(t1 + Duration::from_millis(300)) > 0.3);
    }
}

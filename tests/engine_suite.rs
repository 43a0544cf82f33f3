use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use beatscape::capability::DeviceCapabilities;
use beatscape::features::{AnalysisSnapshot, SectionType};
use beatscape::gpu::{GpuProvider, NoGpu, SoftwareGpuProvider};
use beatscape::quality::QualityLevel;
use beatscape::timeline::{AnalysisTimeline, LiveSource};
use beatscape::tuning::EngineTuning;
use beatscape::visual::particles::ParticleVariant;
use beatscape::visual::scene::SceneShape;
use beatscape::visual::shader::ShaderVariant;
use beatscape::visual::{VisualMode, VisualizerEngine};

fn engine_with(caps: DeviceCapabilities, gpu: Box<dyn GpuProvider>) -> VisualizerEngine {
    VisualizerEngine::new(&caps, gpu, EngineTuning::default())
}

fn cpu_engine() -> VisualizerEngine {
    engine_with(DeviceCapabilities::headless(), Box::new(NoGpu))
}

fn loud() -> AnalysisSnapshot {
    AnalysisSnapshot {
        bass: 0.8,
        mid: 0.6,
        treble: 0.4,
        energy: 0.7,
        beat_pulse: 0.9,
        lyric_intensity: 0.5,
        lyric_sentiment: 0.3,
        lyric_energy: 0.5,
        section: SectionType::Chorus,
        emotion: None,
    }
}

/// Drives `frames` frames at ~60 Hz starting at `start`; returns the time after the last one.
fn drive(engine: &mut VisualizerEngine, start: Instant, frames: usize) -> Instant {
    let mut now = start;
    let snap = loud();
    for i in 0..frames {
        now += Duration::from_millis(16);
        engine.update_features(i as f32 / 60.0, Some(&snap));
        engine.render(now, i as f32 / 60.0);
    }
    now
}

#[test]
fn transition_progress_runs_from_zero_to_one_then_completes() {
    let mut e = cpu_engine();
    e.resize(64, 48);
    let t0 = Instant::now();
    e.set_mode(VisualMode::Particles, t0);
    assert_eq!(e.mode(), VisualMode::Procedural2D);
    assert_eq!(e.transition_target(), Some(VisualMode::Particles));
    assert_eq!(e.transition_progress(t0), 0.0);

    let d = EngineTuning::default().transition;
    let mut last = 0.0;
    for step in 1..=10 {
        let p = e.transition_progress(t0 + d * step / 10);
        assert!(p >= last, "progress went backwards at step {step}");
        last = p;
    }
    assert_eq!(e.transition_progress(t0 + d), 1.0);

    e.render(t0 + d / 2, 0.5);
    assert_eq!(e.mode(), VisualMode::Procedural2D, "still blending halfway through");

    e.render(t0 + d, 1.0);
    assert_eq!(e.mode(), VisualMode::Particles);
    assert_eq!(e.transition_target(), None);
    assert_eq!(e.transition_progress(t0 + d * 2), 0.0);
}

#[test]
fn set_mode_mid_transition_overwrites_target() {
    let mut e = cpu_engine();
    e.resize(32, 32);
    let t0 = Instant::now();
    e.set_mode(VisualMode::ShaderPattern, t0);
    let t1 = t0 + Duration::from_millis(400);
    e.render(t1, 0.4);
    e.set_mode(VisualMode::Scene3D, t1);
    assert_eq!(e.transition_target(), Some(VisualMode::Scene3D));
    assert_eq!(e.transition_progress(t1), 0.0);

    // Going back to the current mode mid-transition is itself a transition.
    e.set_mode(VisualMode::Procedural2D, t1);
    assert_eq!(e.transition_target(), Some(VisualMode::Procedural2D));
}

#[test]
fn every_mode_renders_non_black_without_gpu() {
    for mode in VisualMode::ALL {
        let mut e = cpu_engine();
        e.jump_to_mode(mode);
        e.resize(80, 48);
        drive(&mut e, Instant::now(), 12);
        assert_eq!(e.surface().width(), 80);
        assert_eq!(e.surface().height(), 48);
        assert!(e.surface().has_content(20), "{mode} rendered a black frame");
    }
}

#[test]
fn every_mode_renders_non_black_on_software_gpu() {
    for mode in VisualMode::ALL {
        let mut e = engine_with(
            DeviceCapabilities::new(Some(beatscape::gpu::GpuTier::Baseline), 8, (1920, 1080), false),
            Box::new(SoftwareGpuProvider::default()),
        );
        assert_eq!(e.quality_profile().level, QualityLevel::Medium);
        e.jump_to_mode(mode);
        e.resize(48, 32);
        drive(&mut e, Instant::now(), 6);
        assert!(e.surface().has_content(20), "{mode} rendered a black frame");
    }
}

#[test]
fn crossfade_frames_are_drawn() {
    let mut e = cpu_engine();
    e.resize(64, 40);
    let t0 = Instant::now();
    e.set_mode(VisualMode::ShaderPattern, t0);
    let end = drive(&mut e, t0, 20);
    assert!(e.transition_target().is_some());
    assert!(e.surface().has_content(20));
    drive(&mut e, end, 60);
    assert_eq!(e.mode(), VisualMode::ShaderPattern);
}

#[test]
fn zero_sized_surface_renders_nothing_and_does_not_panic() {
    let mut e = cpu_engine();
    e.resize(0, 0);
    let now = drive(&mut e, Instant::now(), 3);
    assert!(e.surface().is_empty());
    assert_eq!(e.particle_renderer().map(|p| p.pool_len()), Some(0));

    e.resize(0, 24);
    e.render(now + Duration::from_millis(16), 1.0);
    assert!(e.surface().is_empty());

    e.resize(40, 24);
    drive(&mut e, now + Duration::from_millis(32), 2);
    assert!(e.surface().has_content(0));
}

#[test]
fn resize_is_idempotent() {
    let mut e = cpu_engine();
    e.jump_to_mode(VisualMode::Particles);
    e.resize(120, 80);
    let first = e.particle_renderer().map(|p| p.pool_len());
    e.resize(120, 80);
    let second = e.particle_renderer().map(|p| p.pool_len());
    assert_eq!(first, second);
    assert_eq!(first, Some(300));
}

#[test]
fn quality_change_reaches_backends_on_next_render() {
    let mut tuning = EngineTuning::default();
    tuning.particles.cpu_cap = 5_000;
    let mut e = VisualizerEngine::new(&DeviceCapabilities::headless(), Box::new(NoGpu), tuning);
    e.resize(64, 48);
    let pool = |e: &VisualizerEngine| e.particle_renderer().map(|p| p.pool_len());
    assert_eq!(pool(&e), Some(1_500));

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    e.on_quality_change(move |p| sink.borrow_mut().push(p.level));

    e.set_manual_quality_override(Some(QualityLevel::High));
    assert_eq!(e.quality_profile().level, QualityLevel::High);
    assert_eq!(*seen.borrow(), vec![QualityLevel::High]);
    assert_eq!(pool(&e), Some(1_500), "backends only change at the next render");

    e.render(Instant::now(), 0.0);
    assert_eq!(pool(&e), Some(5_000));
    let scene = &e.backend_status()[VisualMode::Scene3D.index()];
    assert!(scene.detail.contains("3d"), "{}", scene.detail);
}

#[test]
fn attached_source_feeds_features_when_caller_does_not() {
    let mut e = cpu_engine();
    e.resize(32, 24);
    let mut live = LiveSource::new();
    live.push(1.0, 0.5, 0.2, 0.8, 1.0);
    e.update_analysis(Some(Box::new(live)));
    assert!(e.has_analysis());

    let mut now = Instant::now();
    for i in 0..30 {
        now += Duration::from_millis(16);
        e.render(now, i as f32 / 60.0);
    }
    let f = e.features();
    assert!(f.bass > 0.9, "bass {}", f.bass);
    assert_eq!(f.section, SectionType::Live);
    assert_eq!(f.lyric_intensity, 0.0);

    e.update_analysis(None);
    let held = e.features().bass;
    e.render(now + Duration::from_millis(16), 1.0);
    assert_eq!(e.features().bass, held);
}

#[test]
fn variant_setters_reach_idle_backends() {
    let mut e = cpu_engine();
    e.set_shader_variant(ShaderVariant::Tunnel);
    e.set_particle_variant(ParticleVariant::LiquidFlow);
    e.set_scene_shape(SceneShape::Torus);
    assert_eq!(e.mode(), VisualMode::Procedural2D);
    assert_eq!(e.shader_renderer().map(|s| s.variant()), Some(ShaderVariant::Tunnel));
    assert_eq!(
        e.particle_renderer().map(|p| p.variant()),
        Some(ParticleVariant::LiquidFlow)
    );
    assert_eq!(e.scene_renderer().map(|s| s.shape()), Some(SceneShape::Torus));
    assert_eq!(e.backend_status().len(), 4);
}

#[test]
fn non_finite_playback_time_holds_features() {
    let timeline = AnalysisTimeline::from_json(
        r#"{"frames": [
            {"time": 0.0, "bass": 0.2, "mid": 0.1, "treble": 0.1, "energy": 0.3},
            {"time": 1.0, "bass": 0.8, "mid": 0.4, "treble": 0.2, "energy": 0.6}
        ]}"#,
    )
    .expect("timeline parses");
    let mut e = cpu_engine();
    e.jump_to_mode(VisualMode::Particles);
    e.resize(32, 24);
    e.update_analysis(Some(Box::new(timeline)));

    let mut now = Instant::now();
    e.render(now, 0.5);
    let held = (e.features().t, e.features().bass);
    assert!(held.1 > 0.0);
    for t in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
        now += Duration::from_millis(16);
        e.render(now, t);
        assert_eq!((e.features().t, e.features().bass), held, "features moved at t={t}");
    }
    assert!(e.surface().has_content(0));
}

#[test]
fn retargeting_back_fades_the_partial_layer_out() {
    let mut e = cpu_engine();
    e.resize(32, 32);
    let d = EngineTuning::default().transition;
    let t0 = Instant::now();
    e.set_mode(VisualMode::Particles, t0);
    let t1 = t0 + d / 2;
    e.render(t1, 0.5);
    assert_eq!(e.fading_out(t1), None);

    e.set_mode(VisualMode::Procedural2D, t1);
    assert_eq!(e.transition_target(), Some(VisualMode::Procedural2D));
    let (mode, start) = e.fading_out(t1).expect("partial layer kept");
    assert_eq!(mode, VisualMode::Particles);
    assert!((start - 0.5).abs() < 1e-3, "weight at retarget {start}");

    let (_, later) = e.fading_out(t1 + d / 2).expect("still fading");
    assert!(later > 0.0 && later < start, "weight {start} -> {later}");
    e.render(t1 + d / 2, 1.0);
    assert!(e.surface().has_content(0));

    e.render(t1 + d, 1.5);
    assert_eq!(e.mode(), VisualMode::Procedural2D);
    assert_eq!(e.transition_target(), None);
    assert_eq!(e.fading_out(t1 + d), None);
}

#[test]
fn retargeting_elsewhere_carries_the_partial_layer() {
    let mut e = cpu_engine();
    e.resize(32, 32);
    let d = EngineTuning::default().transition;
    let t0 = Instant::now();
    e.set_mode(VisualMode::ShaderPattern, t0);
    let t1 = t0 + d / 4;
    e.set_mode(VisualMode::Scene3D, t1);
    let (mode, w) = e.fading_out(t1).expect("shader layer kept");
    assert_eq!(mode, VisualMode::ShaderPattern);
    assert!((w - 0.25).abs() < 1e-3, "weight {w}");

    // Retargeting to the layer that is fading out starts it from scratch instead.
    e.set_mode(VisualMode::ShaderPattern, t1);
    assert_eq!(e.fading_out(t1), None);
}

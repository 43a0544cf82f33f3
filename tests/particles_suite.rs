use beatscape::features::{AnalysisSnapshot, FeaturePipeline, SectionType};
use beatscape::gpu::kernels::PARTICLE_ENTRY;
use beatscape::gpu::{GpuConsumer, NoGpu, SoftwareGpuProvider};
use beatscape::quality::{QualityLevel, QualityProfile};
use beatscape::visual::particles::{ParticleRenderer, ParticleTuning, ParticleVariant};
use beatscape::visual::{FrameClock, VisualBackend};
use beatscape::Surface;
use std::time::Instant;

fn renderer(tuning: ParticleTuning) -> ParticleRenderer {
    ParticleRenderer::new(FeaturePipeline::new(), tuning).with_seed(7)
}

fn drop_hit() -> AnalysisSnapshot {
    AnalysisSnapshot {
        bass: 0.9,
        mid: 0.5,
        treble: 0.0,
        energy: 0.9,
        beat_pulse: 1.0,
        section: SectionType::Drop,
        ..Default::default()
    }
}

fn mean_radius(r: &ParticleRenderer) -> f32 {
    let ps = r.particles();
    ps.iter()
        .map(|p| ((p.x - 0.5).powi(2) + (p.y - 0.5).powi(2)).sqrt())
        .sum::<f32>()
        / ps.len() as f32
}

#[test]
fn pool_never_exceeds_profile_limit() {
    for level in [QualityLevel::Low, QualityLevel::Medium, QualityLevel::High] {
        let profile = QualityProfile::preset(level);
        let mut cpu = renderer(ParticleTuning::default());
        cpu.resize(100, 60, &profile, &NoGpu);
        assert!(cpu.pool_len() <= profile.max_particles);
        assert_eq!(cpu.pool_len(), cpu.target_pool_size());

        let mut gpu = renderer(ParticleTuning::default());
        gpu.resize(100, 60, &profile, &SoftwareGpuProvider::default());
        assert!(gpu.pool_len() <= profile.max_particles);
        if profile.allow_gpu_path {
            assert_eq!(gpu.pool_len(), profile.max_particles);
            assert!(gpu.stats().gpu);
            let detail = gpu.status().detail;
            assert!(detail.contains("gpu software enhanced"), "{detail}");
        } else {
            assert!(!gpu.stats().gpu);
        }
    }
}

#[test]
fn resizing_twice_keeps_the_same_pool() {
    let profile = QualityProfile::preset(QualityLevel::Medium);
    let mut r = renderer(ParticleTuning::default());
    r.resize(120, 70, &profile, &NoGpu);
    let first = r.pool_len();
    let snapshot: Vec<_> = r.particles().to_vec();
    r.resize(120, 70, &profile, &NoGpu);
    assert_eq!(r.pool_len(), first);
    assert_eq!(r.particles(), snapshot.as_slice(), "identical resize must not reseed");
}

#[test]
fn fireworks_drop_spreads_out_and_falls() {
    let drop_section = AnalysisSnapshot {
        bass: 0.9,
        mid: 0.1,
        treble: 0.1,
        beat_pulse: 0.8,
        section: SectionType::Drop,
        ..Default::default()
    };
    let tuning = ParticleTuning {
        cpu_cap: 2_000,
        ..ParticleTuning::default()
    };
    let mut r = renderer(tuning);
    r.set_variant(ParticleVariant::BeatFireworks);
    r.resize(160, 90, &QualityProfile::preset(QualityLevel::Low), &NoGpu);
    assert_eq!(r.pool_len(), 1_500);

    for i in 0..5 {
        r.update_features(i as f32 / 60.0, Some(&drop_section));
    }
    let start = mean_radius(&r);
    for i in 5..65 {
        r.update_features(i as f32 / 60.0, Some(&drop_section));
        r.step();
    }
    let end = mean_radius(&r);
    assert!(end > start, "mean radius {start} -> {end}");

    let mean_vy = r.particles().iter().map(|p| p.vy).sum::<f32>() / r.pool_len() as f32;
    assert!(mean_vy > 0.0, "mean vy {mean_vy} should point down the screen");
    assert!(r.stats().bursts >= 5, "bursts {}", r.stats().bursts);
}

#[test]
fn retrigger_gate_limits_bursts() {
    let mut r = renderer(ParticleTuning::default());
    r.set_variant(ParticleVariant::BeatFireworks);
    r.resize(64, 64, &QualityProfile::preset(QualityLevel::Low), &NoGpu);
    let snap = drop_hit();
    // One second of playback at 60 Hz with the pulse pinned high: at most one burst per 0.1 s.
    for i in 0..60 {
        r.update_features(i as f32 / 60.0, Some(&snap));
        r.step();
    }
    let bursts = r.stats().bursts;
    assert!((8..=11).contains(&bursts), "bursts {bursts}");
}

#[test]
fn particles_stay_normalized_and_alive() {
    let mut r = renderer(ParticleTuning::default());
    let profile = QualityProfile::preset(QualityLevel::Low);
    r.resize(64, 64, &profile, &NoGpu);
    for variant in ParticleVariant::ALL {
        r.set_variant(variant);
        for i in 0..400 {
            r.update_features(i as f32 / 60.0, Some(&drop_hit()));
            r.step();
        }
        for p in r.particles() {
            assert!((0.0..=1.0).contains(&p.x) && (0.0..=1.0).contains(&p.y), "{variant}: {p:?}");
            assert!(p.life > -0.01 && p.life <= 1.0, "{variant}: {p:?}");
        }
    }
}

#[test]
fn failed_dispatch_falls_back_to_cpu_step() {
    let profile = QualityProfile::preset(QualityLevel::Medium);
    let mut r = renderer(ParticleTuning::default());
    r.resize(64, 48, &profile, &SoftwareGpuProvider::default().failing_dispatch());
    assert!(r.stats().gpu);
    let before: Vec<_> = r.particles().iter().map(|p| p.life).collect();
    r.update_features(0.0, Some(&drop_hit()));
    r.step();
    r.step();
    assert_eq!(r.stats().gpu_failures, 2);
    let moved = r
        .particles()
        .iter()
        .zip(&before)
        .filter(|(p, life)| p.life != **life)
        .count();
    assert!(moved > r.pool_len() / 2, "cpu fallback should still age the pool");
    assert_eq!(r.pool_len(), 6_000, "a short failure streak keeps the device pool");

    r.step();
    let stats = r.stats();
    assert_eq!(stats.gpu_failures, 3);
    assert!(!stats.gpu, "third failure in a row gives up the device");
    assert_eq!(r.pool_len(), 300);
    assert!(r.status().detail.contains("cpu"), "{}", r.status().detail);
}

#[test]
fn persistent_dispatch_failure_shrinks_to_cpu_cap() {
    let profile = QualityProfile::preset(QualityLevel::High);
    let provider = SoftwareGpuProvider::default().failing_dispatch();
    let mut r = renderer(ParticleTuning::default());
    r.resize(80, 60, &profile, &provider);
    assert_eq!(r.pool_len(), 20_000);
    r.update_features(0.0, Some(&drop_hit()));
    for _ in 0..100 {
        r.step();
    }
    let stats = r.stats();
    assert!(!stats.gpu);
    assert!(r.pool_len() <= ParticleTuning::default().cpu_cap);
    assert_eq!(stats.gpu_failures, 3, "no dispatch is attempted once the device is dropped");

    // A later resize with the same provider does not bring the device path back.
    r.resize(80, 60, &profile, &provider);
    assert_eq!(r.pool_len(), 300);
    assert!(!r.stats().gpu);
}

#[test]
fn failure_limit_is_configurable() {
    let tuning = ParticleTuning {
        gpu_failure_limit: 1,
        ..ParticleTuning::default()
    };
    let mut r = renderer(tuning);
    let provider = SoftwareGpuProvider::default().failing_dispatch();
    r.resize(64, 48, &QualityProfile::preset(QualityLevel::Medium), &provider);
    r.step();
    assert!(!r.stats().gpu);
    assert_eq!(r.pool_len(), 300);
}

#[test]
fn compile_failure_or_refusal_uses_cpu_pool() {
    let profile = QualityProfile::preset(QualityLevel::High);
    let providers = [
        SoftwareGpuProvider::default().failing_entry(PARTICLE_ENTRY),
        SoftwareGpuProvider::default().refusing(GpuConsumer::Particles),
    ];
    for provider in providers {
        let mut r = renderer(ParticleTuning::default());
        r.resize(64, 48, &profile, &provider);
        assert!(!r.stats().gpu);
        assert_eq!(r.pool_len(), 300);

        let mut out = Surface::new(64, 48);
        r.update_features(0.0, Some(&drop_hit()));
        r.render(
            FrameClock {
                now: Instant::now(),
                dt: 1.0 / 60.0,
            },
            &mut out,
        );
        assert!(out.has_content(20));
    }
}

#[test]
fn zero_size_empties_the_pool() {
    let profile = QualityProfile::preset(QualityLevel::Low);
    let mut r = renderer(ParticleTuning::default());
    r.resize(64, 48, &profile, &NoGpu);
    assert_eq!(r.pool_len(), 300);
    r.resize(0, 48, &profile, &NoGpu);
    assert_eq!(r.pool_len(), 0);
    r.step();
    assert_eq!(r.target_pool_size(), 0);
}

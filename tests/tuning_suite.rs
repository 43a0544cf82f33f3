use std::time::Duration;

use beatscape::tuning::EngineTuning;
use beatscape::TuningError;

#[test]
fn keys_override_defaults() {
    let t = EngineTuning::parse(
        "# engine overrides\n\
         transition_secs = 0.95\n\
         shader_fade_secs=0.4\n\
         \n\
         beat_alpha=0.3\n\
         cpu_particle_cap = 800\n\
         downgrade_fps=24\n\
         upgrade_fps=50\n\
         retrigger_gate_secs=0.2\n",
    )
    .expect("valid tuning");
    assert_eq!(t.transition, Duration::from_secs_f32(0.95));
    assert_eq!(t.shader_fade, Duration::from_secs_f32(0.4));
    assert_eq!(t.beat_alpha, 0.3);
    assert_eq!(t.particles.cpu_cap, 800);
    assert_eq!(t.quality.downgrade_fps, 24.0);
    assert_eq!(t.quality.upgrade_fps, 50.0);
    assert_eq!(t.particles.retrigger_gate, 0.2);
    assert_eq!(t.band_alpha, EngineTuning::default().band_alpha);
}

#[test]
fn out_of_range_values_are_clamped() {
    let t = EngineTuning::parse(
        "transition_secs=5\nbeat_alpha=0.9\nband_alpha=0.01\nparticle_life_step=0.2\nquality_min_samples=0\n",
    )
    .expect("valid tuning");
    assert_eq!(t.transition, Duration::from_secs_f32(1.0));
    assert_eq!(t.beat_alpha, 0.4);
    assert_eq!(t.band_alpha, 0.12);
    assert_eq!(t.quality.min_samples, 2);
    // A particle must live at least 120 ticks from a fresh spawn.
    assert!(0.6 / t.particles.life_step >= 119.9);
}

#[test]
fn bad_lines_report_their_line_number() {
    match EngineTuning::parse("beat_alpha=0.3\n\nno equals sign here\n") {
        Err(TuningError::Parse { line, .. }) => assert_eq!(line, 3),
        other => panic!("unexpected {other:?}"),
    }
    match EngineTuning::parse("glow_strength=-1\n") {
        Err(TuningError::Parse { line, message }) => {
            assert_eq!(line, 1);
            assert!(message.contains("glow_strength"), "{message}");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(EngineTuning::parse("upgrade_fps=nan\n").is_err());
}

#[test]
fn durations_too_large_to_represent_are_rejected() {
    for key in ["shader_fade_secs", "quality_window_secs", "upgrade_cooldown_secs"] {
        match EngineTuning::parse(&format!("beat_alpha=0.3\n{key}=1e30\n")) {
            Err(TuningError::Parse { line, message }) => {
                assert_eq!(line, 2);
                assert!(message.contains(key), "{message}");
            }
            other => panic!("{key}: unexpected {other:?}"),
        }
    }
    let t = EngineTuning::parse("shader_fade_secs=3600\ngpu_failure_limit=0\n").expect("valid tuning");
    assert_eq!(t.shader_fade, Duration::from_secs(3600));
    assert_eq!(t.particles.gpu_failure_limit, 1);
}

#[test]
fn unknown_keys_are_ignored() {
    let t = EngineTuning::parse("palette=neon\nglow_strength=1.5\n").expect("valid tuning");
    assert_eq!(t.glow_strength, 1.5);
}

#[test]
fn thresholds_must_leave_a_hysteresis_gap() {
    let err = EngineTuning::parse("downgrade_fps=40\nupgrade_fps=40\n").expect_err("no gap");
    assert!(err.to_string().contains("upgrade_fps"), "{err}");
}

#[test]
fn missing_file_means_defaults() {
    let path = std::env::temp_dir().join("beatscape-no-such-tuning.txt");
    assert_eq!(EngineTuning::load(Some(&path)).expect("defaults"), EngineTuning::default());
    assert_eq!(EngineTuning::load(None).expect("defaults"), EngineTuning::default());

    let path = std::env::temp_dir().join(format!("beatscape-{}-tuning.txt", std::process::id()));
    std::fs::write(&path, "cpu_particle_cap=42\n").expect("write fixture");
    let t = EngineTuning::load(Some(&path)).expect("file parses");
    assert_eq!(t.particles.cpu_cap, 42);
    let _ = std::fs::remove_file(path);
}

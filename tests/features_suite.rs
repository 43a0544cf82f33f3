use beatscape::features::{AnalysisSnapshot, FeaturePipeline, SectionType};

fn in_unit(v: f32) -> bool {
    (0.0..=1.0).contains(&v)
}

fn wild(rng: &mut fastrand::Rng) -> f32 {
    match rng.u8(..8) {
        0 => f32::NAN,
        1 => f32::INFINITY,
        2 => -f32::INFINITY,
        _ => rng.f32() * 6.0 - 3.0,
    }
}

#[test]
fn features_stay_in_range_for_arbitrary_input() {
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    let mut p = FeaturePipeline::new();
    for i in 0..2_000 {
        let snap = AnalysisSnapshot {
            bass: wild(&mut rng),
            mid: wild(&mut rng),
            treble: wild(&mut rng),
            energy: wild(&mut rng),
            beat_pulse: wild(&mut rng),
            lyric_intensity: wild(&mut rng),
            lyric_sentiment: wild(&mut rng),
            lyric_energy: wild(&mut rng),
            section: SectionType::Chorus,
            emotion: None,
        };
        let input = if i % 7 == 0 { None } else { Some(&snap) };
        let f = p.update(i as f32 / 60.0, input);
        assert!(in_unit(f.bass) && in_unit(f.mid) && in_unit(f.treble) && in_unit(f.energy));
        assert!(in_unit(f.beat_pulse), "beat pulse {}", f.beat_pulse);
        assert!(in_unit(f.lyric_intensity) && in_unit(f.lyric_energy));
        assert!((-1.0..=1.0).contains(&f.lyric_sentiment));
    }
}

#[test]
fn beat_pulse_converges_faster_than_bands() {
    let mut p = FeaturePipeline::new();
    let step = AnalysisSnapshot {
        bass: 1.0,
        beat_pulse: 1.0,
        ..Default::default()
    };
    let mut beat_ticks = None;
    let mut band_ticks = None;
    for tick in 1..=200 {
        let f = p.update(tick as f32 / 60.0, Some(&step));
        if beat_ticks.is_none() && f.beat_pulse >= 0.95 {
            beat_ticks = Some(tick);
        }
        if band_ticks.is_none() && f.bass >= 0.95 {
            band_ticks = Some(tick);
        }
    }
    let beat = beat_ticks.expect("beat pulse never reached 95%");
    let band = band_ticks.expect("bass never reached 95%");
    assert!(beat < band, "beat took {beat} ticks, bass took {band}");
}

#[test]
fn missing_snapshot_holds_last_state() {
    let mut p = FeaturePipeline::new();
    let snap = AnalysisSnapshot {
        bass: 0.8,
        mid: 0.6,
        energy: 0.7,
        beat_pulse: 1.0,
        section: SectionType::Drop,
        emotion: Some("excited".to_string()),
        ..Default::default()
    };
    for i in 0..30 {
        p.update(i as f32 * 0.1, Some(&snap));
    }
    let before = p.features().clone();
    for i in 30..90 {
        p.update(i as f32 * 0.1, None);
    }
    let after = p.features();
    assert_eq!(after.bass, before.bass);
    assert_eq!(after.beat_pulse, before.beat_pulse);
    assert_eq!(after.section, SectionType::Drop);
    assert_eq!(after.emotion.as_deref(), Some("excited"));
    assert!((after.t - 8.9).abs() < 1e-4);
}

#[test]
fn custom_alphas_are_clamped_and_reset_clears_state() {
    let mut p = FeaturePipeline::with_alphas(5.0, -1.0);
    let (beat, band) = p.alphas();
    assert!(beat <= 1.0 && band > 0.0);
    p.update(0.0, Some(&AnalysisSnapshot::live(1.0, 1.0, 1.0, 1.0, 1.0)));
    assert_eq!(p.frames(), 1);
    p.reset();
    assert_eq!(p.frames(), 0);
    assert_eq!(p.features().bass, 0.0);
}

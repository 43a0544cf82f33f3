use std::fmt;

pub const DEFAULT_BEAT_ALPHA: f32 = 0.32;
pub const DEFAULT_BAND_ALPHA: f32 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SectionType {
    #[default]
    Intro,
    Verse,
    Chorus,
    Drop,
    Bridge,
    Outro,
    /// Sentinel used for microphone/live input where no song structure exists.
    Live,
}

impl SectionType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "intro" => Some(Self::Intro),
            "verse" => Some(Self::Verse),
            "chorus" => Some(Self::Chorus),
            "drop" => Some(Self::Drop),
            "bridge" => Some(Self::Bridge),
            "outro" => Some(Self::Outro),
            "live" => Some(Self::Live),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::Verse => "verse",
            Self::Chorus => "chorus",
            Self::Drop => "drop",
            Self::Bridge => "bridge",
            Self::Outro => "outro",
            Self::Live => "live",
        }
    }

    /// Small integer passed to shader programs.
    pub const fn index(self) -> u32 {
        match self {
            Self::Intro => 0,
            Self::Verse => 1,
            Self::Chorus => 2,
            Self::Drop => 3,
            Self::Bridge => 4,
            Self::Outro => 5,
            Self::Live => 6,
        }
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Raw per-frame analysis values as produced by the external audio timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSnapshot {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub energy: f32,
    pub beat_pulse: f32,
    pub lyric_intensity: f32,
    pub lyric_sentiment: f32,
    pub lyric_energy: f32,
    pub section: SectionType,
    pub emotion: Option<String>,
}

impl Default for AnalysisSnapshot {
    fn default() -> Self {
        Self {
            bass: 0.0,
            mid: 0.0,
            treble: 0.0,
            energy: 0.0,
            beat_pulse: 0.0,
            lyric_intensity: 0.0,
            lyric_sentiment: 0.0,
            lyric_energy: 0.0,
            section: SectionType::Intro,
            emotion: None,
        }
    }
}

impl AnalysisSnapshot {
    /// Snapshot shape used for live-analyser input: no lyrics, `Live` section.
    pub fn live(bass: f32, mid: f32, treble: f32, energy: f32, beat_pulse: f32) -> Self {
        Self {
            bass,
            mid,
            treble,
            energy,
            beat_pulse,
            lyric_intensity: 0.0,
            lyric_sentiment: 0.0,
            lyric_energy: 0.0,
            section: SectionType::Live,
            emotion: None,
        }
    }
}

/// Smoothed, engine-owned counterpart of [`AnalysisSnapshot`].
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationFeatures {
    pub t: f32,
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub energy: f32,
    pub beat_pulse: f32,
    pub lyric_intensity: f32,
    pub lyric_sentiment: f32,
    pub lyric_energy: f32,
    pub section: SectionType,
    pub emotion: Option<String>,
}

impl Default for AnimationFeatures {
    fn default() -> Self {
        Self {
            t: 0.0,
            bass: 0.0,
            mid: 0.0,
            treble: 0.0,
            energy: 0.0,
            beat_pulse: 0.0,
            lyric_intensity: 0.0,
            lyric_sentiment: 0.0,
            lyric_energy: 0.0,
            section: SectionType::Intro,
            emotion: None,
        }
    }
}

/// Exponential smoother turning raw snapshots into [`AnimationFeatures`].
#[derive(Debug, Clone)]
pub struct FeaturePipeline {
    beat_alpha: f32,
    band_alpha: f32,
    features: AnimationFeatures,
    frames: u64,
}

impl Default for FeaturePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl FeaturePipeline {
    pub fn new() -> Self {
        Self::with_alphas(DEFAULT_BEAT_ALPHA, DEFAULT_BAND_ALPHA)
    }

    pub fn with_alphas(beat_alpha: f32, band_alpha: f32) -> Self {
        Self {
            beat_alpha: beat_alpha.clamp(0.01, 1.0),
            band_alpha: band_alpha.clamp(0.01, 1.0),
            features: AnimationFeatures::default(),
            frames: 0,
        }
    }

    pub fn features(&self) -> &AnimationFeatures {
        &self.features
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn alphas(&self) -> (f32, f32) {
        (self.beat_alpha, self.band_alpha)
    }

    pub fn reset(&mut self) {
        self.features = AnimationFeatures::default();
        self.frames = 0;
    }

    /// Folds one frame of input into the smoothed state.
    ///
    /// `None` (no audio loaded yet) keeps every field at its last smoothed value. A non-finite
    /// raw field is treated the same way for that field only.
    pub fn update(&mut self, t: f32, snapshot: Option<&AnalysisSnapshot>) -> &AnimationFeatures {
        self.frames = self.frames.saturating_add(1);
        if t.is_finite() {
            self.features.t = t;
        }
        let Some(raw) = snapshot else {
            return &self.features;
        };

        let a = self.band_alpha;
        let f = &mut self.features;
        smooth_unit(&mut f.bass, raw.bass, a);
        smooth_unit(&mut f.mid, raw.mid, a);
        smooth_unit(&mut f.treble, raw.treble, a);
        smooth_unit(&mut f.energy, raw.energy, a);
        smooth_unit(&mut f.beat_pulse, raw.beat_pulse, self.beat_alpha);
        smooth_unit(&mut f.lyric_intensity, raw.lyric_intensity, a);
        smooth_unit(&mut f.lyric_energy, raw.lyric_energy, a);
        smooth_signed(&mut f.lyric_sentiment, raw.lyric_sentiment, a);

        f.section = raw.section;
        if raw.section == SectionType::Live {
            f.lyric_intensity = 0.0;
        }
        if raw.emotion.is_some() {
            f.emotion = raw.emotion.clone();
        }

        &self.features
    }
}

fn smooth_unit(value: &mut f32, raw: f32, alpha: f32) {
    if !raw.is_finite() {
        return;
    }
    let target = raw.clamp(0.0, 1.0);
    *value = (*value + (target - *value) * alpha).clamp(0.0, 1.0);
}

fn smooth_signed(value: &mut f32, raw: f32, alpha: f32) {
    if !raw.is_finite() {
        return;
    }
    let target = raw.clamp(-1.0, 1.0);
    *value = (*value + (target - *value) * alpha).clamp(-1.0, 1.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_round_trips_through_labels() {
        for s in [
            SectionType::Intro,
            SectionType::Verse,
            SectionType::Chorus,
            SectionType::Drop,
            SectionType::Bridge,
            SectionType::Outro,
            SectionType::Live,
        ] {
            assert_eq!(SectionType::parse(s.label()), Some(s));
        }
        assert_eq!(SectionType::parse(" Chorus "), Some(SectionType::Chorus));
        assert_eq!(SectionType::parse("breakdown"), None);
    }

    #[test]
    fn non_finite_fields_are_held() {
        let mut p = FeaturePipeline::new();
        let snap = AnalysisSnapshot {
            bass: 1.0,
            ..Default::default()
        };
        for i in 0..10 {
            p.update(i as f32, Some(&snap));
        }
        let before = p.features().bass;
        let bad = AnalysisSnapshot {
            bass: f32::NAN,
            mid: 1.0,
            ..Default::default()
        };
        p.update(10.0, Some(&bad));
        assert_eq!(p.features().bass, before);
        assert!(p.features().mid > 0.0);
    }

    #[test]
    fn live_input_forces_zero_lyric_intensity() {
        let mut p = FeaturePipeline::new();
        let mut snap = AnalysisSnapshot::live(0.5, 0.5, 0.5, 0.5, 0.0);
        snap.lyric_intensity = 1.0;
        p.update(0.0, Some(&snap));
        assert_eq!(p.features().lyric_intensity, 0.0);
        assert_eq!(p.features().section, SectionType::Live);
    }
}

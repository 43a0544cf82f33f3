use crate::error::TimelineError;
use crate::features::{AnalysisSnapshot, SectionType};
use serde::Deserialize;
use std::path::Path;

/// Seconds either side of a beat during which it contributes to the pulse.
pub const BEAT_WINDOW: f32 = 0.06;

/// Anything that can produce the raw analysis values for playback time `t`.
pub trait SnapshotSource {
    fn sample(&mut self, t: f32) -> Option<AnalysisSnapshot>;
    fn label(&self) -> &str {
        "source"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Beat {
    pub time: f32,
    #[serde(default = "one")]
    pub strength: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct FrameFeature {
    pub time: f32,
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub energy: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LyricSegment {
    pub start: f32,
    pub end: f32,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub sentiment: f32,
    #[serde(default)]
    pub intensity: f32,
    #[serde(default)]
    pub energy: Option<f32>,
    #[serde(default)]
    pub emotion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SectionInfo {
    pub start: f32,
    pub end: f32,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub energy: Option<f32>,
    #[serde(default)]
    pub emotion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmotionSummary {
    #[serde(default)]
    pub overall_sentiment: f32,
    #[serde(default)]
    pub overall_emotion: String,
    #[serde(default)]
    pub arousal: f32,
    #[serde(default)]
    pub valence: f32,
}

/// Recorded analysis of one track, as returned by the analysis service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalysisTimeline {
    #[serde(default)]
    pub audio_id: Option<String>,
    #[serde(default)]
    pub duration: f32,
    #[serde(default)]
    pub bpm: f32,
    #[serde(default)]
    pub beats: Vec<Beat>,
    #[serde(default)]
    pub frames: Vec<FrameFeature>,
    #[serde(default)]
    pub lyrics: Option<Vec<LyricSegment>>,
    #[serde(default)]
    pub sections: Option<Vec<SectionInfo>>,
    #[serde(default)]
    pub emotion_summary: Option<EmotionSummary>,
}

fn one() -> f32 {
    1.0
}

impl AnalysisTimeline {
    pub fn from_json(text: &str) -> Result<Self, TimelineError> {
        let mut tl: Self = serde_json::from_str(text)?;
        tl.normalize();
        Ok(tl)
    }

    pub fn load(path: &Path) -> Result<Self, TimelineError> {
        let text = std::fs::read_to_string(path)?;
        let tl = Self::from_json(&text)?;
        if tl.frames.is_empty() {
            return Err(TimelineError::Empty);
        }
        tracing::debug!(
            path = %path.display(),
            frames = tl.frames.len(),
            beats = tl.beats.len(),
            "analysis timeline loaded"
        );
        Ok(tl)
    }

    fn normalize(&mut self) {
        let by_time = |a: f32, b: f32| a.total_cmp(&b);
        self.frames.retain(|f| f.time.is_finite());
        self.frames.sort_by(|a, b| by_time(a.time, b.time));
        self.beats.retain(|b| b.time.is_finite());
        self.beats.sort_by(|a, b| by_time(a.time, b.time));
        if self.duration <= 0.0 {
            self.duration = self.frames.last().map(|f| f.time).unwrap_or(0.0);
        }
    }

    /// Linear interpolation of the band values, clamped to the first/last frame.
    pub fn bands_at(&self, t: f32) -> Option<FrameFeature> {
        if !t.is_finite() {
            return None;
        }
        let first = self.frames.first()?;
        let last = self.frames.last()?;
        if t <= first.time {
            return Some(*first);
        }
        if t >= last.time {
            return Some(*last);
        }
        let i = self.frames.partition_point(|f| f.time <= t);
        let f0 = self.frames[i - 1];
        let f1 = self.frames[i];
        let span = f1.time - f0.time;
        let a = if span > 0.0 { (t - f0.time) / span } else { 0.0 };
        let lerp = |x: f32, y: f32| x + a * (y - x);
        Some(FrameFeature {
            time: t,
            bass: lerp(f0.bass, f1.bass),
            mid: lerp(f0.mid, f1.mid),
            treble: lerp(f0.treble, f1.treble),
            energy: lerp(f0.energy, f1.energy),
        })
    }

    /// Strongest decayed beat within [`BEAT_WINDOW`] of `t`.
    pub fn beat_pulse(&self, t: f32) -> f32 {
        let lo = self.beats.partition_point(|b| b.time <= t - BEAT_WINDOW);
        self.beats[lo..]
            .iter()
            .take_while(|b| b.time < t + BEAT_WINDOW)
            .map(|b| {
                let dt = (t - b.time).abs();
                if dt < BEAT_WINDOW {
                    b.strength.clamp(0.0, 1.0) * (1.0 - dt / BEAT_WINDOW)
                } else {
                    0.0
                }
            })
            .fold(0.0, f32::max)
    }

    pub fn lyric_at(&self, t: f32) -> Option<&LyricSegment> {
        self.lyrics
            .as_deref()?
            .iter()
            .find(|l| t >= l.start && t < l.end)
    }

    pub fn section_at(&self, t: f32) -> Option<&SectionInfo> {
        self.sections
            .as_deref()?
            .iter()
            .find(|s| t >= s.start && t < s.end)
    }

    /// Track-wide emotion label, used when neither a lyric nor a section names one.
    pub fn overall_emotion(&self) -> Option<&str> {
        self.emotion_summary
            .as_ref()
            .map(|s| s.overall_emotion.trim())
            .filter(|e| !e.is_empty())
    }

    pub fn snapshot_at(&self, t: f32) -> Option<AnalysisSnapshot> {
        let bands = self.bands_at(t)?;
        let lyric = self.lyric_at(t);
        let section = self.section_at(t);
        let emotion = lyric
            .and_then(|l| l.emotion.clone())
            .or_else(|| section.and_then(|s| s.emotion.clone()))
            .or_else(|| self.overall_emotion().map(str::to_string));
        Some(AnalysisSnapshot {
            bass: bands.bass,
            mid: bands.mid,
            treble: bands.treble,
            energy: bands.energy,
            beat_pulse: self.beat_pulse(t),
            lyric_intensity: lyric.map(|l| l.intensity).unwrap_or(0.0),
            lyric_sentiment: lyric.map(|l| l.sentiment).unwrap_or(0.0),
            lyric_energy: lyric
                .map(|l| l.energy.unwrap_or(l.intensity))
                .unwrap_or(0.0),
            section: section
                .and_then(|s| SectionType::parse(&s.kind))
                .unwrap_or_default(),
            emotion,
        })
    }
}

impl SnapshotSource for AnalysisTimeline {
    fn sample(&mut self, t: f32) -> Option<AnalysisSnapshot> {
        self.snapshot_at(t)
    }

    fn label(&self) -> &str {
        self.audio_id.as_deref().unwrap_or("timeline")
    }
}

/// Adapter for a real-time analyser: the analyser pushes its latest values, the engine samples.
#[derive(Debug, Clone, Default)]
pub struct LiveSource {
    latest: Option<AnalysisSnapshot>,
}

impl LiveSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bass: f32, mid: f32, treble: f32, energy: f32, beat_pulse: f32) {
        self.latest = Some(AnalysisSnapshot::live(bass, mid, treble, energy, beat_pulse));
    }

    pub fn clear(&mut self) {
        self.latest = None;
    }
}

impl SnapshotSource for LiveSource {
    fn sample(&mut self, _t: f32) -> Option<AnalysisSnapshot> {
        self.latest.clone()
    }

    fn label(&self) -> &str {
        "live"
    }
}

/// Deterministic stand-in for a live analyser: a 120 BPM kick with slowly drifting bands.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    pub bpm: f32,
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self { bpm: 120.0 }
    }
}

impl SnapshotSource for SyntheticSource {
    fn sample(&mut self, t: f32) -> Option<AnalysisSnapshot> {
        let period = 60.0 / self.bpm.max(1.0);
        let phase = (t / period).fract();
        let kick = (1.0 - phase * 4.0).max(0.0);
        let bass = (0.35 + 0.55 * kick + 0.1 * (t * 0.31).sin()).clamp(0.0, 1.0);
        let mid = (0.45 + 0.3 * (t * 0.7).sin()).clamp(0.0, 1.0);
        let treble = (0.3 + 0.25 * (t * 2.3).sin() * (t * 0.5).cos()).clamp(0.0, 1.0);
        let energy = (0.4 * bass + 0.35 * mid + 0.25 * treble).clamp(0.0, 1.0);
        let beat = if phase * period < BEAT_WINDOW {
            1.0 - phase * period / BEAT_WINDOW
        } else {
            0.0
        };
        Some(AnalysisSnapshot::live(bass, mid, treble, energy, beat))
    }

    fn label(&self) -> &str {
        "synthetic"
    }
}

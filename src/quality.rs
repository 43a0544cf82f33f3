use crate::capability::DeviceCapabilities;
use crate::gpu::GpuTier;
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QualityLevel {
    Low,
    Medium,
    High,
}

impl QualityLevel {
    pub fn lower(self) -> Self {
        match self {
            Self::High => Self::Medium,
            Self::Medium => Self::Low,
            Self::Low => Self::Low,
        }
    }

    pub fn higher(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High => Self::High,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "fast" => Some(Self::Low),
            "medium" | "balanced" => Some(Self::Medium),
            "high" | "ultra" => Some(Self::High),
            _ => None,
        }
    }

    /// Level chosen from a one-time capability probe.
    pub fn initial_for(caps: &DeviceCapabilities) -> Self {
        match caps.gpu_tier() {
            None => Self::Low,
            Some(GpuTier::Enhanced) if !caps.is_low_power() => Self::High,
            Some(_) => Self::Medium,
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Every renderer-affecting setting, always derived together from `level`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityProfile {
    pub level: QualityLevel,
    pub max_particles: usize,
    pub use_3d: bool,
    pub use_heavy_shaders: bool,
    pub internal_resolution_scale: f32,
    pub post_processing_enabled: bool,
    pub allow_gpu_path: bool,
}

impl QualityProfile {
    pub const fn preset(level: QualityLevel) -> Self {
        match level {
            QualityLevel::Low => Self {
                level,
                max_particles: 1_500,
                use_3d: false,
                use_heavy_shaders: false,
                internal_resolution_scale: 0.5,
                post_processing_enabled: false,
                allow_gpu_path: false,
            },
            QualityLevel::Medium => Self {
                level,
                max_particles: 6_000,
                use_3d: true,
                use_heavy_shaders: false,
                internal_resolution_scale: 0.75,
                post_processing_enabled: false,
                allow_gpu_path: true,
            },
            QualityLevel::High => Self {
                level,
                max_particles: 20_000,
                use_3d: true,
                use_heavy_shaders: true,
                internal_resolution_scale: 1.0,
                post_processing_enabled: true,
                allow_gpu_path: true,
            },
        }
    }

    /// Scalar handed to shader programs to cut iteration counts and noise octaves.
    pub fn shader_quality(&self) -> f32 {
        let q: f32 = match self.level {
            QualityLevel::Low => 0.35,
            QualityLevel::Medium => 0.65,
            QualityLevel::High => 1.0,
        };
        if self.use_heavy_shaders { q } else { q.min(0.65) }
    }

    /// Internal render size for an output surface of `w`×`h` device pixels.
    pub fn internal_size(&self, w: usize, h: usize) -> (usize, usize) {
        if w == 0 || h == 0 {
            return (0, 0);
        }
        let s = self.internal_resolution_scale.clamp(0.1, 1.0);
        (
            ((w as f32 * s).round() as usize).max(1),
            ((h as f32 * s).round() as usize).max(1),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityTuning {
    pub window: Duration,
    pub min_samples: usize,
    pub downgrade_fps: f32,
    pub upgrade_fps: f32,
    pub downgrade_cooldown: Duration,
    pub upgrade_cooldown: Duration,
}

impl Default for QualityTuning {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(2),
            min_samples: 5,
            downgrade_fps: 28.0,
            upgrade_fps: 55.0,
            downgrade_cooldown: Duration::from_secs(4),
            upgrade_cooldown: Duration::from_secs(6),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&QualityProfile)>;

/// Watches achieved frame rate and steps the quality level with asymmetric hysteresis.
pub struct QualityManager {
    tuning: QualityTuning,
    profile: QualityProfile,
    manual: Option<QualityLevel>,
    frames: VecDeque<Instant>,
    last_change: Option<Instant>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
    changes: u64,
}

impl QualityManager {
    pub fn new(caps: &DeviceCapabilities, tuning: QualityTuning) -> Self {
        Self::with_level(QualityLevel::initial_for(caps), tuning)
    }

    pub fn with_level(level: QualityLevel, tuning: QualityTuning) -> Self {
        Self {
            tuning,
            profile: QualityProfile::preset(level),
            manual: None,
            frames: VecDeque::with_capacity(256),
            last_change: None,
            listeners: Vec::new(),
            next_listener: 0,
            changes: 0,
        }
    }

    pub fn profile(&self) -> &QualityProfile {
        &self.profile
    }

    pub fn level(&self) -> QualityLevel {
        self.profile.level
    }

    pub fn manual_override(&self) -> Option<QualityLevel> {
        self.manual
    }

    /// Number of level changes since construction.
    pub fn change_count(&self) -> u64 {
        self.changes
    }

    pub fn on_change(&mut self, listener: impl FnMut(&QualityProfile) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Frames per second over the rolling window, once enough samples exist.
    pub fn measured_fps(&self) -> Option<f32> {
        if self.frames.len() < self.tuning.min_samples {
            return None;
        }
        let first = *self.frames.front()?;
        let last = *self.frames.back()?;
        let span = last.saturating_duration_since(first).as_secs_f32();
        if span <= f32::EPSILON {
            return None;
        }
        Some(self.frames.len() as f32 / span)
    }

    pub fn register_frame(&mut self, now: Instant) {
        if self.manual.is_some() {
            return;
        }

        if let Some(&last) = self.frames.back() {
            if now < last {
                // Clock went backwards; start the window over rather than mixing epochs.
                self.frames.clear();
            }
        }
        self.frames.push_back(now);
        while let Some(&front) = self.frames.front() {
            if now.saturating_duration_since(front) > self.tuning.window {
                self.frames.pop_front();
            } else {
                break;
            }
        }

        let Some(fps) = self.measured_fps() else {
            return;
        };
        let since_change = self
            .last_change
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or(Duration::MAX);

        let level = self.profile.level;
        if fps < self.tuning.downgrade_fps
            && level != QualityLevel::Low
            && since_change >= self.tuning.downgrade_cooldown
        {
            tracing::info!(fps, from = %level, to = %level.lower(), "quality step down");
            self.apply_level(level.lower(), now);
        } else if fps > self.tuning.upgrade_fps
            && level != QualityLevel::High
            && since_change >= self.tuning.upgrade_cooldown
        {
            tracing::info!(fps, from = %level, to = %level.higher(), "quality step up");
            self.apply_level(level.higher(), now);
        }
    }

    /// Pins the level (`Some`) or returns to automatic stepping (`None`).
    pub fn set_manual_override(&mut self, level: Option<QualityLevel>, now: Instant) {
        self.manual = level;
        self.frames.clear();
        match level {
            Some(l) => {
                tracing::info!(level = %l, "quality pinned by manual override");
                if l != self.profile.level {
                    self.apply_level(l, now);
                }
            }
            None => {
                tracing::info!(level = %self.profile.level, "quality override cleared");
                self.last_change = Some(now);
            }
        }
    }

    fn apply_level(&mut self, level: QualityLevel, now: Instant) {
        self.profile = QualityProfile::preset(level);
        self.last_change = Some(now);
        self.frames.clear();
        self.changes += 1;
        let profile = self.profile;
        for (_, listener) in &mut self.listeners {
            listener(&profile);
        }
    }
}

impl fmt::Debug for QualityManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualityManager")
            .field("profile", &self.profile)
            .field("manual", &self.manual)
            .field("frames", &self.frames.len())
            .field("listeners", &self.listeners.len())
            .field("changes", &self.changes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_consistent_with_level() {
        for level in [QualityLevel::Low, QualityLevel::Medium, QualityLevel::High] {
            let p = QualityProfile::preset(level);
            assert_eq!(p.level, level);
            assert!(p.internal_resolution_scale <= 1.0);
        }
        assert!(!QualityProfile::preset(QualityLevel::Low).use_3d);
        assert!(QualityProfile::preset(QualityLevel::Low).max_particles
            < QualityProfile::preset(QualityLevel::High).max_particles);
    }

    #[test]
    fn initial_level_follows_capabilities() {
        assert_eq!(QualityLevel::initial_for(&DeviceCapabilities::headless()), QualityLevel::Low);
        assert_eq!(QualityLevel::initial_for(&DeviceCapabilities::desktop()), QualityLevel::High);
        let laptop = DeviceCapabilities::new(Some(GpuTier::Baseline), 8, (1920, 1080), false);
        assert_eq!(QualityLevel::initial_for(&laptop), QualityLevel::Medium);
        let phone = DeviceCapabilities::new(Some(GpuTier::Enhanced), 8, (390, 844), true);
        assert_eq!(QualityLevel::initial_for(&phone), QualityLevel::Medium);
    }

    #[test]
    fn internal_size_never_collapses_to_zero() {
        let p = QualityProfile::preset(QualityLevel::Low);
        assert_eq!(p.internal_size(1, 1), (1, 1));
        assert_eq!(p.internal_size(0, 10), (0, 0));
        assert_eq!(p.internal_size(200, 100), (100, 50));
    }
}

use crate::error::TuningError;
use crate::features::{DEFAULT_BAND_ALPHA, DEFAULT_BEAT_ALPHA};
use crate::quality::QualityTuning;
use crate::visual::particles::ParticleTuning;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TRANSITION: Duration = Duration::from_millis(900);
pub const DEFAULT_SHADER_FADE: Duration = Duration::from_millis(600);

/// Every empirically tuned constant of the engine in one place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineTuning {
    pub transition: Duration,
    pub shader_fade: Duration,
    pub beat_alpha: f32,
    pub band_alpha: f32,
    pub glow_strength: f32,
    pub quality: QualityTuning,
    pub particles: ParticleTuning,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            transition: DEFAULT_TRANSITION,
            shader_fade: DEFAULT_SHADER_FADE,
            beat_alpha: DEFAULT_BEAT_ALPHA,
            band_alpha: DEFAULT_BAND_ALPHA,
            glow_strength: 0.6,
            quality: QualityTuning::default(),
            particles: ParticleTuning::default(),
        }
    }
}

impl EngineTuning {
    /// Reads a `key=value` tuning file. A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, TuningError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = match std::fs::read_to_string(path) {
            Ok(v) => v,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(TuningError::Io(err.to_string())),
        };
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, TuningError> {
        let mut tuning = Self::default();
        for (line_idx, raw) in text.lines().enumerate() {
            let line_no = line_idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key_raw, value_raw)) = line.split_once('=') else {
                return Err(TuningError::Parse {
                    line: line_no,
                    message: "expected <key>=<value>".to_string(),
                });
            };
            let key = key_raw.trim();
            let value = value_raw.trim();
            let num = || -> Result<f32, TuningError> {
                value
                    .parse::<f32>()
                    .ok()
                    .filter(|v| v.is_finite() && *v >= 0.0)
                    .ok_or_else(|| TuningError::Parse {
                        line: line_no,
                        message: format!("{key} must be a non-negative number"),
                    })
            };
            let secs = || -> Result<Duration, TuningError> {
                Duration::try_from_secs_f32(num()?).map_err(|err| TuningError::Parse {
                    line: line_no,
                    message: format!("{key}: {err}"),
                })
            };
            match key {
                "transition_secs" => {
                    tuning.transition = Duration::from_secs_f32(num()?.clamp(0.8, 1.0));
                }
                "shader_fade_secs" => tuning.shader_fade = secs()?,
                "beat_alpha" => tuning.beat_alpha = num()?.clamp(0.25, 0.4),
                "band_alpha" => tuning.band_alpha = num()?.clamp(0.12, 0.2),
                "glow_strength" => tuning.glow_strength = num()?.min(4.0),
                "quality_window_secs" => tuning.quality.window = secs()?,
                "quality_min_samples" => tuning.quality.min_samples = (num()? as usize).max(2),
                "downgrade_fps" => tuning.quality.downgrade_fps = num()?,
                "upgrade_fps" => tuning.quality.upgrade_fps = num()?,
                "downgrade_cooldown_secs" => tuning.quality.downgrade_cooldown = secs()?,
                "upgrade_cooldown_secs" => tuning.quality.upgrade_cooldown = secs()?,
                "beat_trigger" => tuning.particles.beat_trigger = num()?.min(1.0),
                "retrigger_gate_secs" => tuning.particles.retrigger_gate = num()?,
                "particle_life_step" => tuning.particles.life_step = num()?.clamp(0.0001, 0.005),
                "cpu_particle_cap" => tuning.particles.cpu_cap = (num()? as usize).max(1),
                "gpu_failure_limit" => tuning.particles.gpu_failure_limit = (num()? as u32).max(1),
                _ => tracing::debug!(line = line_no, key, "ignoring unknown tuning key"),
            }
        }
        if tuning.quality.upgrade_fps <= tuning.quality.downgrade_fps {
            return Err(TuningError::Parse {
                line: 0,
                message: "upgrade_fps must be greater than downgrade_fps".to_string(),
            });
        }
        Ok(tuning)
    }
}

pub fn tuning_storage_path() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.trim().is_empty() {
            return Some(PathBuf::from(xdg).join("beatscape").join("tuning.txt"));
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".config").join("beatscape").join("tuning.txt"))
}

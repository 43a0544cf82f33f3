use crate::gpu::GpuTier;

/// Device facts gathered once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCapabilities {
    pub baseline_gpu: bool,
    pub enhanced_gpu: bool,
    pub cpu_cores: usize,
    pub screen: (u32, u32),
    pub mobile_hint: bool,
    notes: Vec<String>,
}

impl DeviceCapabilities {
    pub fn new(tier: Option<GpuTier>, cpu_cores: usize, screen: (u32, u32), mobile_hint: bool) -> Self {
        Self {
            baseline_gpu: tier.is_some(),
            enhanced_gpu: tier == Some(GpuTier::Enhanced),
            cpu_cores: cpu_cores.max(1),
            screen,
            mobile_hint,
            notes: Vec::new(),
        }
    }

    /// Capable desktop: enhanced GPU, plenty of cores, large screen.
    pub fn desktop() -> Self {
        Self::new(Some(GpuTier::Enhanced), 8, (1920, 1080), false)
    }

    /// Nothing but a CPU.
    pub fn headless() -> Self {
        Self::new(None, 4, (1280, 720), false)
    }

    pub fn gpu_tier(&self) -> Option<GpuTier> {
        if self.enhanced_gpu {
            Some(GpuTier::Enhanced)
        } else if self.baseline_gpu {
            Some(GpuTier::Baseline)
        } else {
            None
        }
    }

    pub fn is_low_power(&self) -> bool {
        let min_dim = self.screen.0.min(self.screen.1);
        self.mobile_hint || self.cpu_cores <= 4 || (min_dim > 0 && min_dim < 800)
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn push_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn status_label(&self) -> String {
        let gpu = match self.gpu_tier() {
            Some(GpuTier::Enhanced) => "enhanced",
            Some(GpuTier::Baseline) => "baseline",
            None => "none",
        };
        format!(
            "gpu={gpu} cores={} screen={}x{}{}",
            self.cpu_cores,
            self.screen.0,
            self.screen.1,
            if self.is_low_power() { " low-power" } else { "" }
        )
    }
}

/// Probes the running process. `detected` is what the GPU provider reported; environment
/// variables may override it (`BEATSCAPE_GPU`, `BEATSCAPE_LOW_POWER`).
pub fn probe_device(detected: Option<GpuTier>, screen: (u32, u32)) -> DeviceCapabilities {
    probe_with_env(detected, screen, |k| std::env::var(k).ok())
}

pub fn probe_with_env(
    detected: Option<GpuTier>,
    screen: (u32, u32),
    env: impl Fn(&str) -> Option<String>,
) -> DeviceCapabilities {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let mobile = cfg!(any(target_os = "ios", target_os = "android"));

    let mut tier = detected;
    let mut forced_note = None;
    if let Some(v) = env("BEATSCAPE_GPU") {
        match v.trim().to_ascii_lowercase().as_str() {
            "off" | "none" | "0" => {
                tier = None;
                forced_note = Some("gpu disabled by BEATSCAPE_GPU");
            }
            "baseline" | "basic" => {
                tier = Some(GpuTier::Baseline);
                forced_note = Some("gpu tier forced to baseline by BEATSCAPE_GPU");
            }
            "enhanced" | "full" => {
                tier = Some(GpuTier::Enhanced);
                forced_note = Some("gpu tier forced to enhanced by BEATSCAPE_GPU");
            }
            _ => {}
        }
    }

    let mut caps = DeviceCapabilities::new(tier, cores, screen, mobile);
    if let Some(v) = env("BEATSCAPE_LOW_POWER") {
        match parse_bool(&v) {
            Some(true) => {
                caps.mobile_hint = true;
                caps.push_note("low-power mode forced by BEATSCAPE_LOW_POWER");
            }
            Some(false) => {
                caps.mobile_hint = false;
                caps.cpu_cores = caps.cpu_cores.max(8);
                caps.screen = (caps.screen.0.max(800), caps.screen.1.max(800));
                caps.push_note("low-power heuristic disabled by BEATSCAPE_LOW_POWER");
            }
            None => {}
        }
    }
    if let Some(note) = forced_note {
        caps.push_note(note);
    }
    if detected.is_none() && caps.baseline_gpu {
        caps.push_note("gpu tier forced without a detected device; backends will fall back on acquire");
    }
    if caps.notes.is_empty() {
        caps.push_note("probe used detected capabilities with no overrides");
    }
    caps
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_can_disable_gpu() {
        let caps = probe_with_env(Some(GpuTier::Enhanced), (1920, 1080), |k| {
            (k == "BEATSCAPE_GPU").then(|| "off".to_string())
        });
        assert_eq!(caps.gpu_tier(), None);
        assert!(caps.notes().iter().any(|n| n.contains("BEATSCAPE_GPU")));
    }

    #[test]
    fn small_screen_is_low_power() {
        let caps = DeviceCapabilities::new(Some(GpuTier::Enhanced), 12, (390, 844), false);
        assert!(caps.is_low_power());
        let caps = DeviceCapabilities::new(Some(GpuTier::Enhanced), 12, (2560, 1440), false);
        assert!(!caps.is_low_power());
    }
}

use crate::gpu::{platform_provider, GpuProvider, NoGpu, SoftwareGpuProvider};
use crate::quality::QualityLevel;
use crate::visual::particles::ParticleVariant;
use crate::visual::scene::SceneShape;
use crate::visual::shader::ShaderVariant;
use crate::visual::VisualMode;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "beatscape", version, about = "Audio-reactive visualizer driven by recorded or live music analysis")]
pub struct Config {
    #[arg(long, value_parser = parse_mode, default_value = "procedural")]
    pub mode: VisualMode,

    /// Analysis timeline JSON; without it a synthetic 120 BPM source drives the visuals.
    #[arg(long)]
    pub analysis: Option<PathBuf>,

    #[arg(long, default_value_t = 120.0)]
    pub bpm: f32,

    #[arg(long, value_parser = parse_shader_variant, default_value = "mandelbrot")]
    pub shader_variant: ShaderVariant,

    #[arg(long, value_parser = parse_particle_variant, default_value = "nebula")]
    pub particle_variant: ParticleVariant,

    #[arg(long, value_parser = parse_scene_shape, default_value = "icosahedron")]
    pub scene_shape: SceneShape,

    /// Pins the quality level instead of adapting to the measured frame rate.
    #[arg(long, value_parser = parse_quality)]
    pub quality: Option<QualityLevel>,

    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    #[arg(long, value_enum, default_value_t = GpuMode::Auto)]
    pub gpu: GpuMode,

    /// `key=value` tuning file; defaults to the per-user config location.
    #[arg(long)]
    pub tuning: Option<PathBuf>,

    /// tracing filter directive, e.g. `beatscape=debug`.
    #[arg(long, default_value = "warn")]
    pub log: String,

    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub sync_updates: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GpuMode {
    /// Metal where available, otherwise CPU only.
    Auto,
    /// Portable reference device that runs the kernels on the CPU.
    #[value(alias = "soft", alias = "reference")]
    Software,
    #[value(alias = "none", alias = "cpu")]
    Off,
}

impl GpuMode {
    pub fn provider(self) -> Box<dyn GpuProvider> {
        match self {
            Self::Auto => platform_provider(),
            Self::Software => Box::new(SoftwareGpuProvider::default()),
            Self::Off => Box::new(NoGpu),
        }
    }
}

fn parse_mode(s: &str) -> Result<VisualMode, String> {
    VisualMode::parse(s).ok_or_else(|| unknown("mode", s, VisualMode::ALL.map(|m| m.label())))
}

fn parse_shader_variant(s: &str) -> Result<ShaderVariant, String> {
    ShaderVariant::parse(s)
        .ok_or_else(|| unknown("shader variant", s, ShaderVariant::ALL.map(|v| v.label())))
}

fn parse_particle_variant(s: &str) -> Result<ParticleVariant, String> {
    ParticleVariant::parse(s)
        .ok_or_else(|| unknown("particle variant", s, ParticleVariant::ALL.map(|v| v.label())))
}

fn parse_scene_shape(s: &str) -> Result<SceneShape, String> {
    SceneShape::parse(s).ok_or_else(|| unknown("scene shape", s, SceneShape::ALL.map(|v| v.label())))
}

fn parse_quality(s: &str) -> Result<QualityLevel, String> {
    QualityLevel::parse(s).ok_or_else(|| unknown("quality", s, ["low", "medium", "high"]))
}

fn unknown<const N: usize>(what: &str, got: &str, valid: [&str; N]) -> String {
    format!("unknown {what} `{got}` (expected one of: {})", valid.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let cfg = Config::try_parse_from(["beatscape"]).unwrap();
        assert_eq!(cfg.mode, VisualMode::Procedural2D);
        assert_eq!(cfg.gpu, GpuMode::Auto);
        assert_eq!(cfg.quality, None);
        assert_eq!(cfg.fps, 60);
    }

    #[test]
    fn aliases_and_errors() {
        let cfg = Config::try_parse_from([
            "beatscape",
            "--mode",
            "3d",
            "--quality",
            "ultra",
            "--particle-variant",
            "fireworks",
            "--gpu",
            "none",
        ])
        .unwrap();
        assert_eq!(cfg.mode, VisualMode::Scene3D);
        assert_eq!(cfg.quality, Some(QualityLevel::High));
        assert_eq!(cfg.particle_variant, ParticleVariant::BeatFireworks);
        assert_eq!(cfg.gpu, GpuMode::Off);
        assert!(Config::try_parse_from(["beatscape", "--mode", "holograms"]).is_err());
    }
}

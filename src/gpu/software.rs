use super::kernels::{self, KernelKind, PatternFn};
use super::{
    GpuConsumer, GpuContext, GpuProvider, GpuTier, ParticleUniforms, PatternUniforms,
    ProgramHandle, ShaderSource,
};
use crate::error::GpuError;
use crate::surface::Surface;
use crate::visual::palette::hash_u32;
use crate::visual::particles::{self, Particle};

/// Reference device that runs the Rust kernels on the calling thread.
///
/// Useful wherever no hardware backend exists (CI, Linux terminals) and for exercising the
/// failure paths: entry points listed with [`SoftwareGpuProvider::failing_entry`] refuse to
/// compile, and [`SoftwareGpuProvider::failing_dispatch`] makes every dispatch error out.
#[derive(Debug, Clone)]
pub struct SoftwareGpuProvider {
    tier: GpuTier,
    failing_entries: Vec<String>,
    fail_dispatch: bool,
    refuse: Vec<GpuConsumer>,
}

impl Default for SoftwareGpuProvider {
    fn default() -> Self {
        Self::new(GpuTier::Enhanced)
    }
}

impl SoftwareGpuProvider {
    pub fn new(tier: GpuTier) -> Self {
        Self {
            tier,
            failing_entries: Vec::new(),
            fail_dispatch: false,
            refuse: Vec::new(),
        }
    }

    pub fn failing_entry(mut self, entry: &str) -> Self {
        self.failing_entries.push(entry.to_string());
        self
    }

    pub fn failing_dispatch(mut self) -> Self {
        self.fail_dispatch = true;
        self
    }

    pub fn refusing(mut self, consumer: GpuConsumer) -> Self {
        self.refuse.push(consumer);
        self
    }
}

impl GpuProvider for SoftwareGpuProvider {
    fn name(&self) -> &'static str {
        "software"
    }

    fn detected_tier(&self) -> Option<GpuTier> {
        Some(self.tier)
    }

    fn acquire(&self, consumer: GpuConsumer) -> Result<Box<dyn GpuContext>, GpuError> {
        if self.refuse.contains(&consumer) {
            return Err(GpuError::Unavailable(format!(
                "software device refused {} context",
                consumer.label()
            )));
        }
        Ok(Box::new(SoftwareGpu {
            tier: self.tier,
            failing_entries: self.failing_entries.clone(),
            fail_dispatch: self.fail_dispatch,
            programs: Vec::new(),
        }))
    }
}

enum Program {
    Pattern(PatternFn),
    Particles,
}

pub struct SoftwareGpu {
    tier: GpuTier,
    failing_entries: Vec<String>,
    fail_dispatch: bool,
    programs: Vec<Program>,
}

impl SoftwareGpu {
    fn program(&self, handle: ProgramHandle) -> Result<&Program, GpuError> {
        self.programs
            .get(handle.0 as usize)
            .ok_or(GpuError::UnknownProgram(handle.0))
    }

    fn check_dispatch(&self) -> Result<(), GpuError> {
        if self.fail_dispatch {
            Err(GpuError::Dispatch("software device configured to fail".to_string()))
        } else {
            Ok(())
        }
    }
}

impl GpuContext for SoftwareGpu {
    fn tier(&self) -> GpuTier {
        self.tier
    }

    fn label(&self) -> &'static str {
        "software"
    }

    fn compile(&mut self, source: &ShaderSource) -> Result<ProgramHandle, GpuError> {
        if self.failing_entries.iter().any(|e| e == source.entry) {
            return Err(GpuError::Compile {
                entry: source.entry,
                message: "entry point rejected by device".to_string(),
            });
        }
        let program = match source.kind {
            KernelKind::Pattern => {
                let f = kernels::pattern_kernel(source.entry).ok_or_else(|| GpuError::Compile {
                    entry: source.entry,
                    message: "no kernel with that entry point".to_string(),
                })?;
                Program::Pattern(f)
            }
            KernelKind::Particles => Program::Particles,
        };
        self.programs.push(program);
        Ok(ProgramHandle((self.programs.len() - 1) as u32))
    }

    fn draw_pattern(
        &mut self,
        program: ProgramHandle,
        uniforms: &PatternUniforms,
        out: &mut Surface,
    ) -> Result<(), GpuError> {
        self.check_dispatch()?;
        match self.program(program)? {
            Program::Pattern(f) => {
                kernels::run_pattern(*f, uniforms, out);
                Ok(())
            }
            Program::Particles => Err(GpuError::Dispatch(
                "particle program used as a pattern".to_string(),
            )),
        }
    }

    fn step_particles(
        &mut self,
        program: ProgramHandle,
        uniforms: &ParticleUniforms,
        ps: &mut [Particle],
    ) -> Result<(), GpuError> {
        self.check_dispatch()?;
        if !matches!(self.program(program)?, Program::Particles) {
            return Err(GpuError::Dispatch(
                "pattern program used for particles".to_string(),
            ));
        }
        let seed = uniforms.seed;
        for (i, p) in ps.iter_mut().enumerate().take(uniforms.count as usize) {
            let id = i as u32;
            let jx = hash_u32(id, seed, 11) - 0.5;
            let jy = hash_u32(id, seed, 23) - 0.5;
            particles::advance(p, uniforms, jx, jy);
            if p.life <= 0.0 {
                let r = [
                    hash_u32(id, seed, 41),
                    hash_u32(id, seed, 59),
                    hash_u32(id, seed, 71),
                    hash_u32(id, seed, 83),
                    hash_u32(id, seed, 97),
                ];
                particles::respawn(p, uniforms.variant, uniforms.hue_base, r);
            }
        }
        Ok(())
    }
}

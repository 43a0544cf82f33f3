use super::kernels::KernelKind;
use super::{
    GpuConsumer, GpuContext, GpuProvider, GpuTier, ParticleUniforms, PatternUniforms,
    ProgramHandle, ShaderSource,
};
use crate::error::GpuError;
use crate::surface::Surface;
use crate::visual::particles::Particle;
use metal::*;
use objc::rc::autoreleasepool;
use std::ffi::c_void;

pub struct MetalProvider {
    device: Option<Device>,
}

impl Default for MetalProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MetalProvider {
    pub fn new() -> Self {
        Self {
            device: Device::system_default(),
        }
    }
}

fn tier_of(device: &Device) -> GpuTier {
    if device.is_low_power() {
        GpuTier::Baseline
    } else {
        GpuTier::Enhanced
    }
}

impl GpuProvider for MetalProvider {
    fn name(&self) -> &'static str {
        "metal"
    }

    fn detected_tier(&self) -> Option<GpuTier> {
        self.device.as_ref().map(tier_of)
    }

    fn acquire(&self, consumer: GpuConsumer) -> Result<Box<dyn GpuContext>, GpuError> {
        let device = self
            .device
            .clone()
            .ok_or_else(|| GpuError::Unavailable("no Metal device found".to_string()))?;
        let queue = device.new_command_queue();
        tracing::debug!(consumer = consumer.label(), device = device.name(), "metal context acquired");
        Ok(Box::new(MetalGpu {
            tier: tier_of(&device),
            device,
            queue,
            pipelines: Vec::new(),
            target: None,
            particles: None,
        }))
    }
}

struct PatternTarget {
    tex: Texture,
    readback: Buffer,
    bpr: usize,
    w: usize,
    h: usize,
}

struct ParticleBuffer {
    buf: Buffer,
    capacity: usize,
}

pub struct MetalGpu {
    tier: GpuTier,
    device: Device,
    queue: CommandQueue,
    pipelines: Vec<(KernelKind, ComputePipelineState)>,
    target: Option<PatternTarget>,
    particles: Option<ParticleBuffer>,
}

impl MetalGpu {
    fn pipeline(&self, handle: ProgramHandle, kind: KernelKind) -> Result<&ComputePipelineState, GpuError> {
        match self.pipelines.get(handle.0 as usize) {
            Some((k, p)) if *k == kind => Ok(p),
            Some(_) => Err(GpuError::Dispatch("program kind mismatch".to_string())),
            None => Err(GpuError::UnknownProgram(handle.0)),
        }
    }

    fn ensure_target(&mut self, w: usize, h: usize) {
        if matches!(&self.target, Some(t) if t.w == w && t.h == h) {
            return;
        }
        let desc = TextureDescriptor::new();
        desc.set_texture_type(MTLTextureType::D2);
        desc.set_pixel_format(MTLPixelFormat::RGBA8Unorm);
        desc.set_width(w as u64);
        desc.set_height(h as u64);
        desc.set_storage_mode(MTLStorageMode::Private);
        desc.set_usage(MTLTextureUsage::ShaderRead | MTLTextureUsage::ShaderWrite);
        let tex = self.device.new_texture(&desc);

        let align = (self
            .device
            .minimum_linear_texture_alignment_for_pixel_format(MTLPixelFormat::RGBA8Unorm)
            as usize)
            .max(16);
        let bpr = (w * 4).div_ceil(align) * align;
        let readback = self
            .device
            .new_buffer((bpr * h) as u64, MTLResourceOptions::StorageModeShared);
        self.target = Some(PatternTarget {
            tex,
            readback,
            bpr,
            w,
            h,
        });
    }

    fn ensure_particles(&mut self, count: usize) {
        if matches!(&self.particles, Some(b) if b.capacity >= count) {
            return;
        }
        let capacity = count.next_power_of_two().max(256);
        let buf = self.device.new_buffer(
            (capacity * std::mem::size_of::<Particle>()) as u64,
            MTLResourceOptions::StorageModeShared,
        );
        self.particles = Some(ParticleBuffer { buf, capacity });
    }
}

fn check_status(cmd: &CommandBufferRef) -> Result<(), GpuError> {
    if cmd.status() == MTLCommandBufferStatus::Error {
        Err(GpuError::Dispatch("command buffer finished with an error".to_string()))
    } else {
        Ok(())
    }
}

impl GpuContext for MetalGpu {
    fn tier(&self) -> GpuTier {
        self.tier
    }

    fn label(&self) -> &'static str {
        "metal"
    }

    fn compile(&mut self, source: &ShaderSource) -> Result<ProgramHandle, GpuError> {
        let options = CompileOptions::new();
        options.set_fast_math_enabled(true);
        let library = self
            .device
            .new_library_with_source(&source.full_source(), &options)
            .map_err(|message| GpuError::Compile {
                entry: source.entry,
                message,
            })?;
        let func = library
            .get_function(source.entry, None)
            .map_err(|message| GpuError::Compile {
                entry: source.entry,
                message,
            })?;
        let pipeline = self
            .device
            .new_compute_pipeline_state_with_function(&func)
            .map_err(|message| GpuError::Compile {
                entry: source.entry,
                message,
            })?;
        self.pipelines.push((source.kind, pipeline));
        Ok(ProgramHandle((self.pipelines.len() - 1) as u32))
    }

    fn draw_pattern(
        &mut self,
        program: ProgramHandle,
        uniforms: &PatternUniforms,
        out: &mut Surface,
    ) -> Result<(), GpuError> {
        let (w, h) = (out.width(), out.height());
        if w == 0 || h == 0 {
            return Ok(());
        }
        self.ensure_target(w, h);
        let pipeline = self.pipeline(program, KernelKind::Pattern)?;
        let Some(target) = self.target.as_ref() else {
            return Err(GpuError::Dispatch("pattern target missing".to_string()));
        };
        let mut u = *uniforms;
        u.width = w as u32;
        u.height = h as u32;

        let cmd = autoreleasepool(|| {
            let cmd = self.queue.new_command_buffer();
            let encoder = cmd.new_compute_command_encoder();
            encoder.set_compute_pipeline_state(pipeline);
            encoder.set_texture(0, Some(&target.tex));
            encoder.set_bytes(
                0,
                std::mem::size_of::<PatternUniforms>() as u64,
                (&u as *const PatternUniforms).cast::<c_void>(),
            );
            encoder.dispatch_threads(MTLSize::new(w as u64, h as u64, 1), MTLSize::new(16, 16, 1));
            encoder.end_encoding();

            let blit = cmd.new_blit_command_encoder();
            blit.copy_from_texture_to_buffer(
                &target.tex,
                0,
                0,
                MTLOrigin { x: 0, y: 0, z: 0 },
                MTLSize::new(w as u64, h as u64, 1),
                &target.readback,
                0,
                target.bpr as u64,
                (target.bpr * h) as u64,
                MTLBlitOption::None,
            );
            blit.end_encoding();

            let owned = cmd.to_owned();
            owned.commit();
            owned
        });
        cmd.wait_until_completed();
        check_status(&cmd)?;

        let row_bytes = w * 4;
        let dst = out.pixels_mut();
        unsafe {
            let src = std::slice::from_raw_parts(
                target.readback.contents().cast::<u8>(),
                target.bpr * h,
            );
            for y in 0..h {
                dst[y * row_bytes..(y + 1) * row_bytes]
                    .copy_from_slice(&src[y * target.bpr..y * target.bpr + row_bytes]);
            }
        }
        Ok(())
    }

    fn step_particles(
        &mut self,
        program: ProgramHandle,
        uniforms: &ParticleUniforms,
        ps: &mut [Particle],
    ) -> Result<(), GpuError> {
        let count = (uniforms.count as usize).min(ps.len());
        if count == 0 {
            return Ok(());
        }
        self.ensure_particles(count);
        let pipeline = self.pipeline(program, KernelKind::Particles)?;
        let Some(pb) = self.particles.as_ref() else {
            return Err(GpuError::Dispatch("particle buffer missing".to_string()));
        };
        let bytes = count * std::mem::size_of::<Particle>();
        unsafe {
            std::ptr::copy_nonoverlapping(
                ps.as_ptr().cast::<u8>(),
                pb.buf.contents().cast::<u8>(),
                bytes,
            );
        }
        let mut u = *uniforms;
        u.count = count as u32;

        let cmd = autoreleasepool(|| {
            let cmd = self.queue.new_command_buffer();
            let encoder = cmd.new_compute_command_encoder();
            encoder.set_compute_pipeline_state(pipeline);
            encoder.set_buffer(0, Some(&pb.buf), 0);
            encoder.set_bytes(
                1,
                std::mem::size_of::<ParticleUniforms>() as u64,
                (&u as *const ParticleUniforms).cast::<c_void>(),
            );
            encoder.dispatch_threads(MTLSize::new(count as u64, 1, 1), MTLSize::new(64, 1, 1));
            encoder.end_encoding();
            let owned = cmd.to_owned();
            owned.commit();
            owned
        });
        cmd.wait_until_completed();
        check_status(&cmd)?;

        unsafe {
            std::ptr::copy_nonoverlapping(
                pb.buf.contents().cast::<u8>(),
                ps.as_mut_ptr().cast::<u8>(),
                bytes,
            );
        }
        Ok(())
    }
}

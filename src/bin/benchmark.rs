use std::time::{Duration, Instant};

use anyhow::Result;
use beatscape::capability::DeviceCapabilities;
use beatscape::features::{AnalysisSnapshot, SectionType};
use beatscape::gpu::{GpuProvider, NoGpu, SoftwareGpuProvider};
use beatscape::quality::QualityLevel;
use beatscape::timeline::{SnapshotSource, SyntheticSource};
use beatscape::tuning::EngineTuning;
use beatscape::visual::particles::ParticleVariant;
use beatscape::visual::{VisualMode, VisualizerEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Device {
    Cpu,
    Software,
    Metal,
    All,
}

struct Args {
    device: Device,
    frames: usize,
    w: usize,
    h: usize,
    quality: QualityLevel,
    ci_smoke: bool,
    quick: bool,
    max_ms: f64,
}

fn parse_args() -> Args {
    let mut args = Args {
        device: Device::Cpu,
        frames: 180,
        w: 160,
        h: 88,
        quality: QualityLevel::Medium,
        ci_smoke: false,
        quick: false,
        max_ms: 20.0,
    };

    let argv = std::env::args().skip(1).collect::<Vec<_>>();
    let mut i = 0usize;
    while i < argv.len() {
        let k = argv[i].as_str();
        let v = argv.get(i + 1).map(|s| s.as_str());
        match (k, v) {
            ("--gpu", Some(x)) => {
                args.device = match x {
                    "software" | "soft" => Device::Software,
                    "metal" => Device::Metal,
                    "all" | "both" => Device::All,
                    _ => Device::Cpu,
                };
                i += 2;
            }
            ("--frames", Some(x)) => {
                if let Ok(n) = x.parse::<usize>() {
                    args.frames = n.max(1);
                }
                i += 2;
            }
            ("--w", Some(x)) => {
                if let Ok(n) = x.parse::<usize>() {
                    args.w = n.max(1);
                }
                i += 2;
            }
            ("--h", Some(x)) => {
                if let Ok(n) = x.parse::<usize>() {
                    args.h = n.max(1);
                }
                i += 2;
            }
            ("--quality", Some(x)) => {
                if let Some(q) = QualityLevel::parse(x) {
                    args.quality = q;
                }
                i += 2;
            }
            ("--max-ms", Some(x)) => {
                if let Ok(v) = x.parse::<f64>() {
                    args.max_ms = v.max(0.1);
                }
                i += 2;
            }
            ("--ci-smoke", _) => {
                args.ci_smoke = true;
                i += 1;
            }
            ("--quick", _) => {
                args.quick = true;
                i += 1;
            }
            _ => {
                i += 1;
            }
        }
    }

    if args.quick {
        args.frames = args.frames.min(60);
    }
    args
}

/// Synthetic source with a drop section in the back half so burst paths get exercised.
fn snapshot(source: &mut SyntheticSource, step: usize, total: usize) -> Option<AnalysisSnapshot> {
    let t = step as f32 / 60.0;
    let mut snap = source.sample(t)?;
    snap.section = if step * 2 >= total {
        SectionType::Drop
    } else {
        SectionType::Verse
    };
    snap.lyric_intensity = ((t * 0.9).sin() * 0.5 + 0.5).clamp(0.0, 1.0);
    snap.lyric_sentiment = (t * 0.23).sin();
    Some(snap)
}

fn make_engine(args: &Args, gpu: Box<dyn GpuProvider>, mode: VisualMode) -> VisualizerEngine {
    let mut engine = VisualizerEngine::new(&DeviceCapabilities::desktop(), gpu, EngineTuning::default());
    engine.jump_to_mode(mode);
    engine.set_manual_quality_override(Some(args.quality));
    engine.resize(args.w, args.h);
    engine
}

struct Row {
    label: String,
    ms: f64,
    lit: usize,
}

fn run_mode(args: &Args, engine: &mut VisualizerEngine) -> (f64, usize) {
    let mut source = SyntheticSource::default();
    let mut now = Instant::now();
    let mut lit = 0usize;
    let start = Instant::now();
    for f in 0..args.frames {
        now += Duration::from_millis(16);
        engine.update_features(f as f32 / 60.0, snapshot(&mut source, f, args.frames).as_ref());
        if engine.render(now, f as f32 / 60.0).has_content(12) {
            lit += 1;
        }
    }
    (start.elapsed().as_secs_f64() * 1000.0 / args.frames as f64, lit)
}

fn bench_device(args: &Args, label: &str, provider: impl Fn() -> Box<dyn GpuProvider>) -> Vec<Row> {
    println!(
        "{label} benchmark: modes={} frames/mode={} size={}x{} quality={}",
        VisualMode::ALL.len(),
        args.frames,
        args.w,
        args.h,
        args.quality
    );
    let mut rows = Vec::new();
    for mode in VisualMode::ALL {
        let mut engine = make_engine(args, provider(), mode);
        let (ms, lit) = run_mode(args, &mut engine);
        let detail = engine.backend_status()[mode.index()].detail.clone();
        println!("  {:<12} {:>8.3} ms/frame  lit={:>3}/{}  {}", mode, ms, lit, args.frames, detail);
        rows.push(Row {
            label: format!("{label}/{mode}"),
            ms,
            lit,
        });
    }

    for variant in ParticleVariant::ALL {
        let mut engine = make_engine(args, provider(), VisualMode::Particles);
        engine.set_particle_variant(variant);
        let (ms, lit) = run_mode(args, &mut engine);
        println!("  particles/{:<16} {:>8.3} ms/frame  lit={:>3}/{}", variant, ms, lit, args.frames);
    }

    // Every mode crossfading into the next one, back to back.
    let mut engine = make_engine(args, provider(), VisualMode::Procedural2D);
    let mut source = SyntheticSource::default();
    let mut now = Instant::now();
    let start = Instant::now();
    let mut transitions = 0usize;
    for f in 0..args.frames {
        now += Duration::from_millis(16);
        if engine.transition_target().is_none() {
            engine.set_mode(engine.mode().next(), now);
            transitions += 1;
        }
        engine.update_features(f as f32 / 60.0, snapshot(&mut source, f, args.frames).as_ref());
        engine.render(now, f as f32 / 60.0);
    }
    let ms = start.elapsed().as_secs_f64() * 1000.0 / args.frames as f64;
    println!("  {:<12} {:>8.3} ms/frame  transitions={}", "crossfade", ms, transitions);
    rows
}

#[cfg(target_os = "macos")]
fn metal_rows(args: &Args) -> Result<Vec<Row>> {
    let probe = beatscape::gpu::MetalProvider::new();
    if probe.detected_tier().is_none() {
        anyhow::bail!("no Metal device found");
    }
    Ok(bench_device(args, "Metal", || Box::new(beatscape::gpu::MetalProvider::new())))
}

#[cfg(not(target_os = "macos"))]
fn metal_rows(_args: &Args) -> Result<Vec<Row>> {
    anyhow::bail!("Metal benchmark is only supported on macOS")
}

fn main() -> Result<()> {
    let args = parse_args();
    let mut rows = Vec::new();
    if matches!(args.device, Device::Cpu | Device::All) {
        rows.extend(bench_device(&args, "CPU", || Box::new(NoGpu)));
    }
    if matches!(args.device, Device::Software | Device::All) {
        rows.extend(bench_device(&args, "Software", || Box::new(SoftwareGpuProvider::default())));
    }
    if matches!(args.device, Device::Metal | Device::All) {
        rows.extend(metal_rows(&args)?);
    }

    let avg_ms = rows.iter().map(|r| r.ms).sum::<f64>() / rows.len().max(1) as f64;
    let fps = if avg_ms > 0.0 { 1000.0 / avg_ms } else { 0.0 };
    println!("Summary: {:>8.3} ms/frame avg  {:>7.2} FPS", avg_ms, fps);

    if args.ci_smoke {
        let black: Vec<_> = rows.iter().filter(|r| r.lit == 0).map(|r| r.label.as_str()).collect();
        let slow: Vec<_> = rows.iter().filter(|r| r.ms > args.max_ms).collect();
        if !black.is_empty() || !slow.is_empty() {
            eprintln!("CI smoke: FAIL");
            if !black.is_empty() {
                eprintln!("  black modes: {}", black.join(", "));
            }
            for r in slow {
                eprintln!("  slow mode: {} ({:.3} ms/frame > {:.3})", r.label, r.ms, args.max_ms);
            }
            anyhow::bail!("ci smoke failed");
        }
        println!("CI smoke: PASS (max_ms={:.3})", args.max_ms);
    }
    Ok(())
}

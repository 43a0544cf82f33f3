use crate::capability::probe_device;
use crate::config::Config;
use crate::quality::QualityLevel;
use crate::render::{wrap_chars, Frame, HalfBlockPresenter, Presenter};
use crate::terminal::TerminalGuard;
use crate::timeline::{AnalysisTimeline, SnapshotSource, SyntheticSource};
use crate::tuning::{tuning_storage_path, EngineTuning};
use crate::visual::particles::ParticleVariant;
use crate::visual::scene::SceneShape;
use crate::visual::{VisualMode, VisualizerEngine};
use anyhow::Context;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use std::cell::Cell;
use std::io::BufWriter;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// How long a quality change notice stays in the HUD.
const NOTICE_TTL: Duration = Duration::from_secs(3);

struct UiState {
    show_hud: bool,
    show_help: bool,
    paused: bool,
    playback: f32,
    loop_len: Option<f32>,
    notice: Option<(String, Instant)>,
}

pub fn run(cfg: Config) -> anyhow::Result<()> {
    let tuning_path = cfg.tuning.clone().or_else(tuning_storage_path);
    let tuning = EngineTuning::load(tuning_path.as_deref()).with_context(|| {
        format!(
            "load tuning file {}",
            tuning_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<none>".to_string())
        )
    })?;

    let gpu = cfg.gpu.provider();
    let screen = crossterm::terminal::window_size()
        .map(|ws| (ws.width as u32, ws.height as u32))
        .unwrap_or((0, 0));
    let caps = probe_device(gpu.detected_tier(), screen);
    for note in caps.notes() {
        tracing::info!(note = %note, "device probe");
    }

    let mut engine = VisualizerEngine::new(&caps, gpu, tuning);
    engine.set_shader_variant(cfg.shader_variant);
    engine.set_particle_variant(cfg.particle_variant);
    engine.set_scene_shape(cfg.scene_shape);
    engine.jump_to_mode(cfg.mode);
    if cfg.quality.is_some() {
        engine.set_manual_quality_override(cfg.quality);
    }

    let (source, loop_len): (Box<dyn SnapshotSource>, Option<f32>) = match &cfg.analysis {
        Some(path) => {
            let timeline = AnalysisTimeline::load(path)
                .with_context(|| format!("load analysis {}", path.display()))?;
            let len = (timeline.duration > 0.0).then_some(timeline.duration);
            (Box::new(timeline), len)
        }
        None => (Box::new(SyntheticSource { bpm: cfg.bpm }), None),
    };
    let source_label = source.label().to_string();
    engine.update_analysis(Some(source));

    let quality_changed = Rc::new(Cell::new(None::<QualityLevel>));
    let sink = Rc::clone(&quality_changed);
    engine.on_quality_change(move |p| sink.set(Some(p.level)));

    let _term = TerminalGuard::new()?;
    let mut out = BufWriter::new(TerminalGuard::stdout());
    let mut presenter = HalfBlockPresenter::new();
    let cell_px = presenter.cell_pixels();

    let mut ui = UiState {
        show_hud: true,
        show_help: false,
        paused: false,
        playback: 0.0,
        loop_len,
        notice: None,
    };
    let mut last_size = TerminalGuard::size()?;
    let mut hud_rows = hud_rows_for(last_size.1, ui.show_hud, 3);
    resize_engine(&mut engine, last_size, cell_px, hud_rows);

    let mut last_frame = Instant::now();
    let mut fps = FpsCounter::new();
    let mut last_engine_ms = 0.0f32;
    let mut last_present_ms = 0.0f32;

    loop {
        let now = Instant::now();

        while event::poll(Duration::from_millis(0))? {
            match event::read()? {
                Event::Key(k) if k.kind != KeyEventKind::Release => {
                    let old_hud = ui.show_hud;
                    if handle_key(k.code, k.modifiers, &mut engine, &mut ui, now) {
                        return Ok(());
                    }
                    if ui.show_hud != old_hud {
                        hud_rows = hud_rows_for(last_size.1, ui.show_hud, 3);
                        resize_engine(&mut engine, last_size, cell_px, hud_rows);
                    }
                }
                Event::Resize(c, r) => {
                    last_size = (c, r);
                    hud_rows = hud_rows_for(last_size.1, ui.show_hud, 3);
                    resize_engine(&mut engine, last_size, cell_px, hud_rows);
                }
                _ => {}
            }
        }

        // Resize events are not delivered reliably by every terminal.
        let sz = crossterm::terminal::size().context("get terminal size")?;
        if sz != last_size {
            last_size = sz;
            hud_rows = hud_rows_for(last_size.1, ui.show_hud, 3);
            resize_engine(&mut engine, last_size, cell_px, hud_rows);
        }

        let dt = now.duration_since(last_frame).as_secs_f32();
        last_frame = now;
        if !ui.paused {
            ui.playback += dt;
            if let Some(len) = ui.loop_len {
                if ui.playback >= len {
                    ui.playback %= len;
                }
            }
        }

        let engine_start = Instant::now();
        engine.render(now, ui.playback);
        last_engine_ms = 0.8 * last_engine_ms + 0.2 * engine_start.elapsed().as_secs_f32() * 1000.0;

        if let Some(level) = quality_changed.take() {
            ui.notice = Some((format!("quality -> {level}"), now));
        }
        if ui.notice.as_ref().is_some_and(|(_, at)| now.duration_since(*at) > NOTICE_TTL) {
            ui.notice = None;
        }

        let (term_cols, term_rows) = last_size;
        let hud = if ui.show_hud {
            build_hud(
                term_cols as usize,
                &engine,
                &ui,
                now,
                &source_label,
                fps.fps(),
                last_engine_ms,
                last_present_ms,
            )
        } else {
            String::new()
        };
        let wanted = hud_rows_for(term_rows, ui.show_hud, hud.lines().count() as u16);
        if wanted != hud_rows {
            hud_rows = wanted;
            resize_engine(&mut engine, last_size, cell_px, hud_rows);
            continue;
        }

        let frame = Frame {
            term_cols,
            term_rows,
            visual_rows: term_rows.saturating_sub(hud_rows).max(1),
            surface: engine.surface(),
            hud: &hud,
            hud_rows,
            overlay: ui.show_help.then_some(HELP_TEXT),
            sync_updates: cfg.sync_updates,
        };
        let present_start = Instant::now();
        presenter.present(&frame, &mut out)?;
        last_present_ms = present_start.elapsed().as_secs_f32() * 1000.0;
        fps.tick();

        let target = Duration::from_secs_f32(1.0 / cfg.fps.max(1) as f32);
        let elapsed = now.elapsed();
        if elapsed < target {
            std::thread::sleep(target - elapsed);
        }
    }
}

fn resize_engine(engine: &mut VisualizerEngine, size: (u16, u16), cell_px: (usize, usize), hud_rows: u16) {
    let (cols, rows) = size;
    let visual_rows = rows.saturating_sub(hud_rows).max(1);
    engine.resize(
        (cols as usize).saturating_mul(cell_px.0),
        (visual_rows as usize).saturating_mul(cell_px.1),
    );
}

fn hud_rows_for(term_rows: u16, show_hud: bool, wanted: u16) -> u16 {
    if !show_hud || term_rows <= 1 {
        return 0;
    }
    wanted.min(term_rows - 1)
}

/// Returns `true` when the user asked to quit.
fn handle_key(
    code: KeyCode,
    mods: KeyModifiers,
    engine: &mut VisualizerEngine,
    ui: &mut UiState,
    now: Instant,
) -> bool {
    if mods.contains(KeyModifiers::CONTROL) && matches!(code, KeyCode::Char('c')) {
        return true;
    }
    match code {
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => return true,
        KeyCode::Char(c @ '1'..='4') => {
            let idx = (c as u8 - b'1') as usize;
            engine.set_mode(VisualMode::ALL[idx], now);
        }
        KeyCode::Tab | KeyCode::Right => {
            let from = engine.transition_target().unwrap_or(engine.mode());
            engine.set_mode(from.next(), now);
        }
        KeyCode::Char('v') | KeyCode::Char('V') => cycle_variant(engine),
        KeyCode::Char('g') | KeyCode::Char('G') => {
            let next = match engine.quality().manual_override() {
                None => Some(QualityLevel::Low),
                Some(QualityLevel::Low) => Some(QualityLevel::Medium),
                Some(QualityLevel::Medium) => Some(QualityLevel::High),
                Some(QualityLevel::High) => None,
            };
            engine.set_manual_quality_override(next);
            let label = next.map(|l| l.label()).unwrap_or("auto");
            ui.notice = Some((format!("quality pinned: {label}"), now));
        }
        KeyCode::Char(' ') => ui.paused = !ui.paused,
        KeyCode::Char('i') | KeyCode::Char('I') => ui.show_hud = !ui.show_hud,
        KeyCode::Char('?') | KeyCode::Char('h') | KeyCode::F(1) => ui.show_help = !ui.show_help,
        _ => {}
    }
    false
}

/// Steps the variant of whichever backend is (or is about to be) on screen.
fn cycle_variant(engine: &mut VisualizerEngine) {
    match engine.transition_target().unwrap_or(engine.mode()) {
        VisualMode::Procedural2D => {}
        VisualMode::ShaderPattern => {
            if let Some(v) = engine.shader_renderer().map(|s| s.variant().next()) {
                engine.set_shader_variant(v);
            }
        }
        VisualMode::Particles => {
            if let Some(v) = engine.particle_renderer().map(|p| p.variant()) {
                engine.set_particle_variant(next_of(ParticleVariant::ALL, v));
            }
        }
        VisualMode::Scene3D => {
            if let Some(s) = engine.scene_renderer().map(|s| s.shape()) {
                engine.set_scene_shape(next_of(SceneShape::ALL, s));
            }
        }
    }
}

fn next_of<T: Copy + PartialEq, const N: usize>(all: [T; N], cur: T) -> T {
    let i = all.iter().position(|v| *v == cur).unwrap_or(0);
    all[(i + 1) % N]
}

#[allow(clippy::too_many_arguments)]
fn build_hud(
    cols: usize,
    engine: &VisualizerEngine,
    ui: &UiState,
    now: Instant,
    source_label: &str,
    fps: f32,
    engine_ms: f32,
    present_ms: f32,
) -> String {
    let mode = match engine.transition_target() {
        Some(target) => format!(
            "{} -> {} ({:>3.0}%)",
            engine.mode(),
            target,
            engine.transition_progress(now) * 100.0
        ),
        None => engine.mode().to_string(),
    };
    let quality = engine.quality();
    let f = engine.features();
    let status = &engine.backend_status()[engine.mode().index()];
    let mut lines = vec![
        format!(
            "Mode: {mode} | Quality: {}{} | FPS: {:>4.1} | ms(E/P): {:>4.1}/{:>4.1} | t={:>6.1}s{}",
            quality.level(),
            if quality.manual_override().is_some() { " (pinned)" } else { "" },
            fps,
            engine_ms,
            present_ms,
            ui.playback,
            if ui.paused { " paused" } else { "" }
        ),
        format!(
            "Source: {source_label} [{}] | bass {:.2} mid {:.2} treble {:.2} beat {:.2} | {}: {}",
            f.section,
            f.bass,
            f.mid,
            f.treble,
            f.beat_pulse,
            status.name,
            status.detail
        ),
    ];
    if let Some((text, _)) = &ui.notice {
        lines.push(format!("** {text} **"));
    } else {
        lines.push("Keys: 1-4/tab mode | v variant | g quality | space pause | i HUD | ? help | q quit".to_string());
    }
    lines
        .iter()
        .flat_map(|l| wrap_chars(l, cols))
        .collect::<Vec<_>>()
        .join("\n")
}

const HELP_TEXT: &str = "beatscape hotkeys\n\
1/2/3/4  procedural / shader / particles / scene\n\
tab or right  next mode (crossfade)\n\
v  next variant of the visible mode\n\
g  cycle quality pin: low/medium/high/auto\n\
space  pause playback time\n\
i  show/hide HUD\n\
? or h or F1  toggle this help\n\
q or esc  quit";

struct FpsCounter {
    last: Instant,
    frames: u32,
    fps: f32,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            last: Instant::now(),
            frames: 0,
            fps: 0.0,
        }
    }

    fn tick(&mut self) {
        self.frames += 1;
        let now = Instant::now();
        let dt = now.duration_since(self.last).as_secs_f32();
        if dt >= 0.5 {
            self.fps = self.frames as f32 / dt;
            self.frames = 0;
            self.last = now;
        }
    }

    fn fps(&self) -> f32 {
        self.fps
    }
}

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use beatscape::quality::{QualityLevel, QualityManager, QualityTuning};

/// Feeds frames at a fixed rate from `*at` for `secs`, advancing `*at`.
fn feed(q: &mut QualityManager, at: &mut Instant, fps: u32, secs: f32) {
    let step = Duration::from_secs_f64(1.0 / fps as f64);
    let frames = (secs * fps as f32).round() as u32;
    for _ in 0..frames {
        *at += step;
        q.register_frame(*at);
    }
}

#[test]
fn sustained_low_fps_steps_down_once_per_cooldown() {
    let mut q = QualityManager::with_level(QualityLevel::High, QualityTuning::default());
    let mut at = Instant::now();

    feed(&mut q, &mut at, 20, 3.9);
    assert_eq!(q.level(), QualityLevel::Medium);
    assert_eq!(q.change_count(), 1);

    feed(&mut q, &mut at, 20, 4.0);
    assert_eq!(q.level(), QualityLevel::Low);
    assert_eq!(q.change_count(), 2);

    // Already at the floor.
    feed(&mut q, &mut at, 20, 10.0);
    assert_eq!(q.level(), QualityLevel::Low);
    assert_eq!(q.change_count(), 2);
}

#[test]
fn high_fps_steps_up_after_longer_cooldown() {
    let mut q = QualityManager::with_level(QualityLevel::Low, QualityTuning::default());
    let mut at = Instant::now();
    feed(&mut q, &mut at, 60, 1.0);
    assert_eq!(q.level(), QualityLevel::Medium);

    feed(&mut q, &mut at, 60, 5.0);
    assert_eq!(q.level(), QualityLevel::Medium, "upgrade cooldown not respected");

    feed(&mut q, &mut at, 60, 2.0);
    assert_eq!(q.level(), QualityLevel::High);
}

#[test]
fn mid_range_fps_holds_level() {
    let mut q = QualityManager::with_level(QualityLevel::Medium, QualityTuning::default());
    let mut at = Instant::now();
    feed(&mut q, &mut at, 40, 20.0);
    assert_eq!(q.level(), QualityLevel::Medium);
    assert_eq!(q.change_count(), 0);
    let fps = q.measured_fps().expect("window has samples");
    assert!((fps - 40.0).abs() < 2.0, "measured {fps}");
}

#[test]
fn manual_override_blocks_stepping_until_cleared() {
    let mut q = QualityManager::with_level(QualityLevel::High, QualityTuning::default());
    let mut at = Instant::now();
    q.set_manual_override(Some(QualityLevel::High), at);
    feed(&mut q, &mut at, 10, 12.0);
    assert_eq!(q.level(), QualityLevel::High);
    assert_eq!(q.manual_override(), Some(QualityLevel::High));

    q.set_manual_override(None, at);
    feed(&mut q, &mut at, 10, 3.9);
    assert_eq!(q.level(), QualityLevel::High, "clearing counts as a change for cooldown");
    feed(&mut q, &mut at, 10, 1.0);
    assert_eq!(q.level(), QualityLevel::Medium);
}

#[test]
fn listeners_see_every_change_and_can_unsubscribe() {
    let mut q = QualityManager::with_level(QualityLevel::Medium, QualityTuning::default());
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let id = q.on_change(move |p| sink.borrow_mut().push((p.level, p.max_particles)));

    let at = Instant::now();
    q.set_manual_override(Some(QualityLevel::Low), at);
    q.set_manual_override(Some(QualityLevel::High), at);
    assert_eq!(
        *seen.borrow(),
        vec![(QualityLevel::Low, 1_500), (QualityLevel::High, 20_000)]
    );

    assert!(q.remove_listener(id));
    assert!(!q.remove_listener(id));
    q.set_manual_override(Some(QualityLevel::Medium), at);
    assert_eq!(seen.borrow().len(), 2);
}

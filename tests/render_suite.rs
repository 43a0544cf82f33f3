use beatscape::render::{wrap_chars, Frame, HalfBlockPresenter, Presenter};
use beatscape::Surface;

/// Build a solid-color surface.
fn solid(w: usize, h: usize, rgb: [u8; 3]) -> Surface {
    let mut s = Surface::new(w, h);
    s.clear(rgb);
    s
}

/// Build a gradient surface (varies across x).
fn gradient(w: usize, h: usize) -> Surface {
    let mut s = Surface::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let t = (x as f32 / w.max(1) as f32 * 255.0) as u8;
            s.put(x, y, [t, 128, 255 - t]);
        }
    }
    s
}

fn make_frame(cols: u16, visual_rows: u16, surface: &Surface, sync: bool) -> Frame<'_> {
    Frame {
        term_cols: cols,
        term_rows: visual_rows + 2,
        visual_rows,
        surface,
        hud: "procedural | 60 fps | medium",
        hud_rows: 1,
        overlay: None,
        sync_updates: sync,
    }
}

fn present(frame: &Frame<'_>) -> String {
    let mut out = Vec::new();
    HalfBlockPresenter::new()
        .present(frame, &mut out)
        .expect("present should succeed");
    String::from_utf8(out).expect("valid utf8")
}

#[test]
fn halfblock_renders_one_cell_per_column() {
    let s = solid(10, 10, [255, 0, 0]);
    let out = present(&make_frame(10, 5, &s, false));
    assert_eq!(out.matches('\u{2580}').count(), 50);
    assert!(out.contains("\x1b[38;2;255;0;0m"), "expected truecolor fg escape");
    assert!(out.contains("\x1b[48;2;255;0;0m"), "expected truecolor bg escape");
    assert!(out.contains("procedural | 60 fps"));
}

#[test]
fn halfblock_only_emits_color_changes() {
    let s = solid(8, 4, [10, 20, 30]);
    let out = present(&make_frame(8, 2, &s, false));
    assert_eq!(out.matches("\x1b[38;2;").count(), 1);
    assert_eq!(out.matches("\x1b[48;2;10;20;30m").count(), 1);

    let g = gradient(16, 4);
    let out = present(&make_frame(16, 2, &g, false));
    assert!(out.matches("\x1b[38;2;").count() > 8);
}

#[test]
fn halfblock_splits_upper_and_lower_pixels() {
    let mut s = solid(1, 2, [0, 0, 255]);
    s.put(0, 0, [200, 100, 50]);
    let out = present(&make_frame(1, 1, &s, false));
    assert!(out.contains("\x1b[38;2;200;100;50m"));
    assert!(out.contains("\x1b[48;2;0;0;255m"));
}

#[test]
fn halfblock_sync_updates_wrap_the_frame() {
    let s = gradient(20, 10);
    let synced = present(&make_frame(20, 5, &s, true));
    assert!(synced.starts_with("\x1b[?2026h"));
    assert!(synced.ends_with("\x1b[?2026l"));

    let plain = present(&make_frame(20, 5, &s, false));
    assert!(!plain.contains("\x1b[?2026h"));
    assert!(plain.contains("\x1b[?7l") && plain.ends_with("\x1b[?7h"));
}

#[test]
fn halfblock_skips_mismatched_surface() {
    let s = solid(12, 12, [255, 255, 255]);
    let out = present(&make_frame(10, 5, &s, false));
    assert!(out.is_empty());

    let empty = Surface::new(0, 0);
    assert!(present(&make_frame(10, 5, &empty, false)).is_empty());
}

#[test]
fn hud_lines_are_clipped_to_terminal_width() {
    let s = solid(6, 2, [0, 0, 0]);
    let mut frame = make_frame(6, 1, &s, false);
    frame.hud = "abcdefghijkl\nsecond";
    frame.hud_rows = 2;
    let out = present(&frame);
    assert!(out.contains("abcdef"));
    assert!(!out.contains("abcdefg"));
    assert!(out.contains("\x1b[3;1H\x1b[0m\x1b[2Ksecond"));
}

#[test]
fn overlay_draws_a_titled_box() {
    let s = solid(40, 20, [0, 0, 0]);
    let mut frame = make_frame(40, 10, &s, false);
    frame.overlay = Some("Help\n1-4 select mode\nq quit");
    let out = present(&frame);
    assert!(out.contains("Help"));
    assert!(out.contains("1-4 select mode"));
    assert!(out.contains("+--"));
}

#[test]
fn wrap_chars_splits_on_char_boundaries() {
    assert_eq!(wrap_chars("", 4), vec![String::new()]);
    assert_eq!(wrap_chars("abcdefg", 3), vec!["abc", "def", "g"]);
    assert_eq!(wrap_chars("ééé", 2), vec!["éé", "é"]);
    assert_eq!(wrap_chars("ab", 0), vec!["a", "b"]);
}

#[test]
fn presenter_reports_cell_geometry() {
    let p = HalfBlockPresenter::default();
    assert_eq!(p.name(), "halfblock");
    assert_eq!(p.cell_pixels(), (1, 2));
}

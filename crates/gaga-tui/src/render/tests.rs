use super::*;
use gaga_proto::nowplaying::{resolve, TrackInfo};
use gaga_proto::protocol::PlaybackSnapshot;
use gaga_proto::state::{Toast, ToastSeverity, TOAST_LIFETIME};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Draw(u16, String),
    Clear(u16),
    ClearAll,
    Flush,
}

#[derive(Default)]
struct Recording {
    calls: Vec<Call>,
}

impl Recording {
    fn draws(&self) -> Vec<u16> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Draw(row, _) => Some(*row),
                _ => None,
            })
            .collect()
    }
}

impl RowSurface for Recording {
    fn draw_row(&mut self, row: u16, content: &RenderedRow) -> io::Result<()> {
        self.calls.push(Call::Draw(row, content.text.clone()));
        Ok(())
    }

    fn clear_row(&mut self, row: u16) -> io::Result<()> {
        self.calls.push(Call::Clear(row));
        Ok(())
    }

    fn clear_all(&mut self) -> io::Result<()> {
        self.calls.push(Call::ClearAll);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.calls.push(Call::Flush);
        Ok(())
    }
}

fn streams() -> Vec<Stream> {
    ["NTS1", "NTS2"]
        .iter()
        .enumerate()
        .map(|(id, name)| Stream {
            id,
            name: name.to_string(),
            url: String::new(),
            metadata_url: None,
            metadata_channel: None,
        })
        .collect()
}

fn ctx<'a>(streams: &'a [Stream], now: Instant) -> FrameContext<'a> {
    FrameContext {
        streams,
        selected: 0,
        now,
        clock: "12:00:00".to_string(),
        width: 80,
        height: 24,
    }
}

fn renderer() -> Renderer<Recording> {
    Renderer::new(Recording::default())
}

fn take_calls(r: &mut Renderer<Recording>) -> Vec<Call> {
    std::mem::take(&mut r.surface.calls)
}

#[test]
fn test_fit_width_truncates_with_ellipsis() {
    assert_eq!(fit_width("short", 10), "short");
    assert_eq!(fit_width("abcdefghij", 5), "abcd…");
    // wide glyphs count as two columns
    assert_eq!(fit_width("日本語テキスト", 6), "日本…");
    assert_eq!(fit_width("abc", 0), "");
}

#[test]
fn test_frame_layout() {
    let streams = streams();
    let mut state = UiState::default();
    state.playback = PlaybackSnapshot {
        is_playing: true,
        active_stream_id: Some(1),
        process_alive: true,
    };
    let info = TrackInfo::new(Some("A".into()), Some("B".into()), None);
    state.display_lines.insert(1, resolve(Some(&info)));

    let frame = compose_frame(&state, &ctx(&streams, Instant::now()));
    assert_eq!(frame.len(), 6);
    assert!(frame[&2].text.starts_with(GLYPH_STOPPED));
    assert!(frame[&2].text.ends_with("Live Stream"));
    assert!(frame[&3].text.starts_with(GLYPH_PLAYING));
    assert!(frame[&3].text.ends_with("A - B"));
    assert!(frame[&5].text.starts_with("● Playing NTS2"));
    assert!(frame[&5].text.ends_with("12:00:00"));
    assert!(frame.values().all(|r| r.text.width() <= 80));
}

#[test]
fn test_identical_frame_draws_nothing() {
    let streams = streams();
    let state = UiState::default();
    let now = Instant::now();
    let mut r = renderer();

    let first = r.render(compose_frame(&state, &ctx(&streams, now))).unwrap();
    assert_eq!(first.drawn, 6);
    assert_eq!(r.surface().draws(), vec![0, 1, 2, 3, 4, 5]);
    take_calls(&mut r);

    let second = r.render(compose_frame(&state, &ctx(&streams, now))).unwrap();
    assert!(second.is_empty());
    assert!(take_calls(&mut r).is_empty());
}

#[test]
fn test_one_row_change_draws_one_row() {
    let streams = streams();
    let mut state = UiState::default();
    let now = Instant::now();
    let mut r = renderer();
    r.render(compose_frame(&state, &ctx(&streams, now))).unwrap();
    take_calls(&mut r);

    let info = TrackInfo::new(None, None, Some("Morning Show".into()));
    state.display_lines.insert(0, resolve(Some(&info)));
    let diff = r.render(compose_frame(&state, &ctx(&streams, now))).unwrap();

    assert_eq!(diff, FrameDiff { drawn: 1, cleared: 0 });
    let calls = take_calls(&mut r);
    assert_eq!(calls.len(), 2);
    assert!(matches!(&calls[0], Call::Draw(2, text) if text.ends_with("Morning Show")));
    assert_eq!(calls[1], Call::Flush);
}

#[test]
fn test_toast_visible_until_expiry_then_cleared_once() {
    let streams = streams();
    let t0 = Instant::now();
    let mut state = UiState::default();
    state.toast = Some(Toast::new("Failed to start NTS1", ToastSeverity::Error, t0));
    let toast_row = 6u16;
    let mut r = renderer();

    let frame = compose_frame(&state, &ctx(&streams, t0));
    assert_eq!(frame[&toast_row].text, "Failed to start NTS1");
    r.render(frame).unwrap();

    let almost = t0 + TOAST_LIFETIME - Duration::from_millis(1);
    let frame = compose_frame(&state, &ctx(&streams, almost));
    assert!(frame.contains_key(&toast_row));
    assert!(r.render(frame).unwrap().is_empty());
    take_calls(&mut r);

    let expired = t0 + TOAST_LIFETIME;
    let frame = compose_frame(&state, &ctx(&streams, expired));
    assert!(!frame.contains_key(&toast_row));
    let diff = r.render(frame).unwrap();
    assert_eq!(diff, FrameDiff { drawn: 0, cleared: 1 });
    assert_eq!(take_calls(&mut r), vec![Call::Clear(toast_row), Call::Flush]);

    let later = compose_frame(&state, &ctx(&streams, expired + Duration::from_secs(1)));
    assert!(r.render(later).unwrap().is_empty());
}

#[test]
fn test_invalidate_redraws_everything() {
    let streams = streams();
    let state = UiState::default();
    let now = Instant::now();
    let mut r = renderer();
    r.render(compose_frame(&state, &ctx(&streams, now))).unwrap();
    take_calls(&mut r);

    r.invalidate();
    let diff = r.render(compose_frame(&state, &ctx(&streams, now))).unwrap();
    assert_eq!(diff.drawn, 6);
    let calls = take_calls(&mut r);
    assert_eq!(calls.first(), Some(&Call::ClearAll));
    assert_eq!(calls.last(), Some(&Call::Flush));
}

#[test]
fn test_short_terminal_drops_rows() {
    let streams = streams();
    let state = UiState::default();
    let mut c = ctx(&streams, Instant::now());
    c.height = 3;
    let frame = compose_frame(&state, &c);
    assert_eq!(frame.len(), 3);
    assert!(!frame.contains_key(&3));
}

#[test]
fn test_cadence_backs_off_and_resets() {
    let mut cadence = Cadence::default();
    let idle = FrameDiff::default();
    let busy = FrameDiff { drawn: 1, cleared: 0 };

    assert_eq!(cadence.after_frame(idle, false), Duration::from_millis(400));
    assert_eq!(cadence.after_frame(idle, false), Duration::from_millis(800));
    assert_eq!(cadence.after_frame(idle, false), Duration::from_secs(1));
    assert_eq!(cadence.after_frame(idle, false), Duration::from_secs(1));
    assert_eq!(cadence.after_frame(busy, false), Duration::from_millis(200));

    cadence.after_frame(idle, false);
    assert_eq!(cadence.after_frame(idle, true), Duration::from_millis(200));

    cadence.after_frame(idle, false);
    cadence.reset();
    assert_eq!(cadence.current(), Duration::from_millis(200));
}

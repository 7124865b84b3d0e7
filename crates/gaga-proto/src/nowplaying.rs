//! Now-playing model and resolution.
//!
//! Two providers feed a [`TrackInfo`] per stream (a JSON metadata endpoint
//! and the stream's own ICY tags).  [`merge`] picks the better of the two and
//! [`resolve`] turns the result into a [`DisplayLine`]: a normalized string
//! that is never empty and never one of the placeholder strings
//! (`"Unknown"`, `"No info"`, `"N/A"`).
//!
//! Resolution is an ordered rule list evaluated top-to-bottom:
//!
//! ```text
//!   artist-title   "{artist} - {title}"   both meaningful
//!   show           "{show}"               show meaningful
//!   single-field   "{artist}" | "{title}" exactly one meaningful
//!   (fallback)     "Live Stream"
//! ```

use chrono::{DateTime, Local};
use serde_json::Value;

/// Composition-only stand-in for an absent artist/title.  Never displayed.
pub const UNKNOWN: &str = "Unknown";

/// Shown when no provider has anything usable.
pub const LIVE_STREAM: &str = "Live Stream";

/// Placeholder strings providers emit in place of real data.  Treated as
/// absent and never produced by the resolver.
const PLACEHOLDERS: &[&str] = &["unknown", "no info", "n/a", "-"];

// ── TrackInfo ─────────────────────────────────────────────────────────────────

/// Raw, possibly partial track fields from one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub show: Option<String>,
    pub fetched_at: DateTime<Local>,
}

impl TrackInfo {
    pub fn new(artist: Option<String>, title: Option<String>, show: Option<String>) -> Self {
        Self {
            artist,
            title,
            show,
            fetched_at: Local::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(None, None, None)
    }

    /// Both artist and title carry real values.
    pub fn has_track(&self) -> bool {
        meaningful(self.artist.as_deref()).is_some() && meaningful(self.title.as_deref()).is_some()
    }

    /// At least one field carries a real value.
    pub fn has_anything(&self) -> bool {
        meaningful(self.artist.as_deref()).is_some()
            || meaningful(self.title.as_deref()).is_some()
            || meaningful(self.show.as_deref()).is_some()
    }
}

/// Combine the API provider's result with the tag provider's.
///
/// A complete artist+title pair from the API wins, then a complete pair from
/// the tags (borrowing the API's show name if the tags have none), then a
/// field-by-field fallback preferring the API.
pub fn merge(api: Option<TrackInfo>, tag: Option<TrackInfo>) -> Option<TrackInfo> {
    match (api, tag) {
        (None, None) => None,
        (Some(a), None) => Some(a),
        (None, Some(t)) => Some(t),
        (Some(a), Some(_)) if a.has_track() => Some(a),
        (Some(a), Some(mut t)) if t.has_track() => {
            if meaningful(t.show.as_deref()).is_none() {
                t.show = a.show;
            }
            Some(t)
        }
        (Some(a), Some(t)) => {
            let pick = |x: Option<String>, y: Option<String>| {
                if meaningful(x.as_deref()).is_some() {
                    x
                } else {
                    y
                }
            };
            Some(TrackInfo {
                artist: pick(a.artist, t.artist),
                title: pick(a.title, t.title),
                show: pick(a.show, t.show),
                fetched_at: a.fetched_at.max(t.fetched_at),
            })
        }
    }
}

// ── DisplayLine ───────────────────────────────────────────────────────────────

/// Final per-stream display string.  Only [`resolve`] constructs one, so it is
/// always non-empty and never a placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DisplayLine(String);

impl DisplayLine {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn live_stream() -> Self {
        Self(LIVE_STREAM.to_string())
    }
}

impl Default for DisplayLine {
    fn default() -> Self {
        Self::live_stream()
    }
}

impl std::fmt::Display for DisplayLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DisplayLine {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ── Normalization ─────────────────────────────────────────────────────────────

fn is_blank_char(c: char) -> bool {
    c.is_whitespace() || c.is_control() || matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}')
}

/// Trim blank characters from both ends.  Inner spacing is kept as given;
/// inner control characters become spaces so a value stays on one row.
fn clean(raw: &str) -> String {
    raw.trim_matches(is_blank_char)
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// `Some(cleaned)` when `raw` holds a real value; `None` for absent, blank or
/// placeholder input.
pub fn meaningful(raw: Option<&str>) -> Option<String> {
    let cleaned = clean(raw?);
    if cleaned.is_empty() {
        return None;
    }
    let key = cleaned.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
    if PLACEHOLDERS.contains(&key.as_str()) {
        return None;
    }
    Some(cleaned)
}

/// Artist/title after normalization: absent values become [`UNKNOWN`].
struct Fields {
    artist: String,
    title: String,
    show: Option<String>,
}

impl Fields {
    fn from_info(info: Option<&TrackInfo>) -> Self {
        let artist = info.and_then(|i| meaningful(i.artist.as_deref()));
        let title = info.and_then(|i| meaningful(i.title.as_deref()));
        Self {
            artist: artist.unwrap_or_else(|| UNKNOWN.to_string()),
            title: title.unwrap_or_else(|| UNKNOWN.to_string()),
            show: info.and_then(|i| meaningful(i.show.as_deref())),
        }
    }

    fn known(value: &str) -> Option<&str> {
        (value != UNKNOWN).then_some(value)
    }
}

// ── Rules ─────────────────────────────────────────────────────────────────────

type Rule = fn(&Fields) -> Option<String>;

fn rule_artist_title(f: &Fields) -> Option<String> {
    let artist = Fields::known(&f.artist)?;
    let title = Fields::known(&f.title)?;
    Some(format!("{} - {}", artist, title))
}

fn rule_show(f: &Fields) -> Option<String> {
    f.show.clone()
}

fn rule_single_field(f: &Fields) -> Option<String> {
    match (Fields::known(&f.artist), Fields::known(&f.title)) {
        (Some(one), None) | (None, Some(one)) => Some(one.to_string()),
        _ => None,
    }
}

/// Ordered rule list.  Evaluation stops at the first rule that yields.
const RULES: &[(&str, Rule)] = &[
    ("artist-title", rule_artist_title),
    ("show", rule_show),
    ("single-field", rule_single_field),
];

/// Resolve a stream's (merged) track info to its display line.  `None` means
/// the stream has never been polled successfully.
pub fn resolve(info: Option<&TrackInfo>) -> DisplayLine {
    let fields = Fields::from_info(info);
    RULES
        .iter()
        .find_map(|(_, rule)| rule(&fields))
        .map(DisplayLine)
        .unwrap_or_default()
}

// ── ICY parsing ───────────────────────────────────────────────────────────────

/// Split an ICY `StreamTitle` into `(artist, title)`.
///
/// `"Artist - Title"` splits on the first `" - "`; anything else is a bare
/// title.
pub fn parse_icy(icy: &str) -> (Option<String>, Option<String>) {
    let s = icy.trim();
    if let Some(pos) = s.find(" - ") {
        let artist = s[..pos].trim().to_string();
        let title = s[pos + 3..].trim().to_string();
        (
            Some(artist).filter(|a| !a.is_empty()),
            Some(title).filter(|t| !t.is_empty()),
        )
    } else {
        (None, Some(s.to_string()).filter(|t| !t.is_empty()))
    }
}

/// Pull `StreamTitle` out of a raw ICY metadata block
/// (`StreamTitle='...';StreamUrl='...';`, NUL padded).
pub fn parse_stream_title(meta: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(meta)
        .trim_matches(char::from(0))
        .trim()
        .to_string();
    if text.is_empty() {
        return None;
    }

    for (open, close) in [("StreamTitle='", "';"), ("StreamTitle=\"", "\";")] {
        if let Some(start) = text.find(open) {
            let rest = &text[start + open.len()..];
            let end = rest.find(close).unwrap_or(rest.len());
            let title = rest[..end].trim_end_matches(['\'', '"', ';']).trim();
            return (!title.is_empty()).then(|| title.to_string());
        }
    }
    None
}

// ── Metadata endpoint JSON ────────────────────────────────────────────────────

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key)?.as_str().map(|s| s.to_string())
}

/// Normalize an NTS channel label: `"NTS 1"`, `"nts1"` and `"1"` all → `"1"`.
fn channel_key(label: &str) -> String {
    let lower = label.trim().to_lowercase();
    let stripped = lower.strip_prefix("nts").unwrap_or(&lower);
    stripped.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Parse a metadata endpoint payload into [`TrackInfo`].
///
/// Accepts the NTS live shape (`{"results":[{"channel_name", "now":{...}}]}`,
/// the entry chosen by `channel`) and a flat `{"artist","title","show"}`
/// object.  Returns `None` when the payload has neither shape or the channel
/// is absent.
pub fn parse_metadata_json(json: &Value, channel: Option<&str>) -> Option<TrackInfo> {
    if let Some(results) = json.get("results").and_then(|r| r.as_array()) {
        let entry = match channel {
            Some(ch) => {
                let wanted = channel_key(ch);
                results.iter().find(|r| {
                    r.get("channel_name")
                        .and_then(|n| n.as_str())
                        .map(|n| channel_key(n) == wanted)
                        .unwrap_or(false)
                })?
            }
            None => results.first()?,
        };
        let now = entry.get("now")?;
        let show = str_field(now, "broadcast_title");
        let track = now
            .get("current_track")
            .or_else(|| now.pointer("/embeds/details/current_track"));
        let (artist, title) = match track {
            Some(t) => (str_field(t, "artist"), str_field(t, "title")),
            None => (None, None),
        };
        return Some(TrackInfo::new(artist, title, show));
    }

    if json.is_object() {
        let artist = str_field(json, "artist");
        let title = str_field(json, "title");
        let show = str_field(json, "show");
        return Some(TrackInfo::new(artist, title, show));
    }

    None
}

// ── tests ─────────────────────────────────────────────────────────────────────

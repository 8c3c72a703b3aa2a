use std::borrow::Cow;

use chrono::{DateTime, Utc};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Terminal columns occupied by `s` (CJK and emoji count double).
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Byte index of the longest prefix of `s` that fits in `width` columns.
fn fit_prefix(s: &str, width: usize) -> usize {
    let mut used = 0;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > width {
            return idx;
        }
        used += w;
    }
    s.len()
}

/// Shorten `s` to at most `max_width` columns, marking the cut with "...".
///
/// Widths too small to hold one character plus the ellipsis get a bare
/// prefix instead. Strings that already fit are returned borrowed.
///
/// ```
/// use lanefeed::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("Short", 10), "Short");
/// assert_eq!(truncate_to_width("Hello World", 8), "Hello...");
/// assert_eq!(truncate_to_width("Test", 2), "Te");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if display_width(s) <= max_width {
        return Cow::Borrowed(s);
    }
    if max_width <= ELLIPSIS_WIDTH {
        return Cow::Owned(s[..fit_prefix(s, max_width)].to_string());
    }
    let cut = fit_prefix(s, max_width - ELLIPSIS_WIDTH);
    Cow::Owned(format!("{}{}", &s[..cut], ELLIPSIS))
}

fn is_stripped_control(c: char) -> bool {
    c == '\u{7f}' || (c.is_ascii_control() && !matches!(c, '\t' | '\n' | '\r'))
}

/// Remove terminal control characters and ANSI escape sequences.
///
/// Remote titles and bodies are untrusted; printing them raw would let a
/// post move the cursor or rewrite the window title. Tab, newline and CR
/// survive. CSI (`ESC [`) runs to its final byte, OSC (`ESC ]`) runs to BEL
/// or `ESC \`, and any other ESC is dropped alone.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped_control) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\u{1b}' {
            if !is_stripped_control(c) {
                out.push(c);
            }
            continue;
        }
        match chars.peek() {
            Some('[') => {
                chars.next();
                for c in chars.by_ref() {
                    if ('\u{40}'..='\u{7e}').contains(&c) {
                        break;
                    }
                }
            }
            Some(']') => {
                chars.next();
                while let Some(c) = chars.next() {
                    if c == '\u{07}' {
                        break;
                    }
                    if c == '\u{1b}' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }
    Cow::Owned(out)
}

/// Collapse a multi-line string onto one line for list rows.
pub fn single_line(s: &str) -> Cow<'_, str> {
    if !s.contains(['\n', '\r', '\t']) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Compact count: `999`, `1.2k`, `15k`, `3.4M`.
pub fn format_count(n: u64) -> String {
    fn scaled(n: u64, unit: u64, suffix: &str) -> String {
        let value = n as f64 / unit as f64;
        if value < 10.0 {
            let s = format!("{:.1}", (value * 10.0).floor() / 10.0);
            format!("{}{}", s.trim_end_matches(".0"), suffix)
        } else {
            format!("{}{}", value.floor() as u64, suffix)
        }
    }

    match n {
        0..=999 => n.to_string(),
        1_000..=999_999 => scaled(n, 1_000, "k"),
        _ => scaled(n, 1_000_000, "M"),
    }
}

/// Signed variant of [`format_count`] for scores, which can go negative.
pub fn format_score(score: i64) -> String {
    if score < 0 {
        format!("-{}", format_count(score.unsigned_abs()))
    } else {
        format_count(score as u64)
    }
}

/// Human-friendly age of a unix timestamp relative to `now`: `5m`, `3h`, `2d`.
pub fn time_ago(created_at: i64, now: DateTime<Utc>) -> String {
    let secs = (now.timestamp() - created_at).max(0);
    match secs {
        0..=59 => "now".to_string(),
        60..=3_599 => format!("{}m", secs / 60),
        3_600..=86_399 => format!("{}h", secs / 3_600),
        86_400..=2_591_999 => format!("{}d", secs / 86_400),
        2_592_000..=31_535_999 => format!("{}mo", secs / 2_592_000),
        _ => format!("{}y", secs / 31_536_000),
    }
}

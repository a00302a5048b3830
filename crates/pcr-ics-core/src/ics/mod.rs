//! iCalendar (RFC 5545) subset used to persist calendar artifacts.
//!
//! Only what a published calendar needs: one `VCALENDAR` with calendar-level
//! properties and `VEVENT`s carrying `UID`, `SUMMARY`, `DTSTART`, `DTEND`,
//! `DTSTAMP`, `CREATED`, `LAST-MODIFIED` and `SEQUENCE`.
//!
//! # Line format
//!
//! ```text
//! NAME[;PARAM=VALUE...]:VALUE\r\n
//! ```
//!
//! Physical lines are folded at [`FOLD_WIDTH`] octets; a continuation line
//! starts with a single space. TEXT values escape `\`, `;`, `,` and newline.

pub mod parser;
pub mod writer;

pub use parser::{CalendarParseError, parse_calendar};
pub use writer::write_calendar;

/// Maximum octets per physical line, excluding the CRLF.
pub const FOLD_WIDTH: usize = 75;

/// UTC date-time form written for every timestamp.
pub const UTC_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Date-time form without zone designator (floating or `TZID=` local).
pub const LOCAL_FORMAT: &str = "%Y%m%dT%H%M%S";

/// One logical (unfolded) content line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ContentLine {
    pub name: String,
    pub params: Vec<(String, String)>,
    pub value: String,
}

impl ContentLine {
    /// Split `NAME;K=V:VALUE`. Returns `None` when there is no `:` outside
    /// a quoted parameter value or the name is empty.
    pub fn parse(line: &str) -> Option<Self> {
        let mut in_quotes = false;
        let split = line.char_indices().find_map(|(idx, ch)| match ch {
            '"' => {
                in_quotes = !in_quotes;
                None
            }
            ':' if !in_quotes => Some(idx),
            _ => None,
        })?;

        let (head, value) = (&line[..split], &line[split + 1..]);
        let mut parts = head.split(';');
        let name = parts.next()?.trim().to_ascii_uppercase();
        if name.is_empty() {
            return None;
        }

        let params = parts
            .filter_map(|param| {
                let (key, val) = param.split_once('=')?;
                Some((key.trim().to_ascii_uppercase(), val.trim_matches('"').to_string()))
            })
            .collect();

        Some(Self {
            name,
            params,
            value: value.to_string(),
        })
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

/// Escape a TEXT value.
#[must_use]
pub fn escape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(ch),
        }
    }
    out
}

/// Reverse [`escape_text`]. Unknown escapes yield the escaped character.
#[must_use]
pub fn unescape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Fold one logical line into CRLF-separated physical lines of at most
/// [`FOLD_WIDTH`] octets, never splitting a UTF-8 sequence.
#[must_use]
pub fn fold_line(line: &str) -> String {
    if line.len() <= FOLD_WIDTH {
        return line.to_string();
    }

    let mut out = String::with_capacity(line.len() + 3 * (line.len() / FOLD_WIDTH + 1));
    let mut width = 0;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if width + len > FOLD_WIDTH {
            out.push_str("\r\n ");
            width = 1;
        }
        out.push(ch);
        width += len;
    }
    out
}

/// Join continuation lines. Yields `(first physical line number, logical
/// line)`; accepts CRLF or bare LF.
#[must_use]
pub fn unfold(text: &str) -> Vec<(usize, String)> {
    let mut lines: Vec<(usize, String)> = Vec::new();
    for (idx, physical) in text.split('\n').enumerate() {
        let physical = physical.strip_suffix('\r').unwrap_or(physical);
        if let Some(rest) = physical
            .strip_prefix(' ')
            .or_else(|| physical.strip_prefix('\t'))
        {
            if let Some((_, last)) = lines.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        if physical.is_empty() {
            continue;
        }
        lines.push((idx + 1, physical.to_string()));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_line_with_params() {
        let line = ContentLine::parse("DTSTART;TZID=\"Asia/Shanghai\":20200417T110000")
            .expect("parse line");
        assert_eq!(line.name, "DTSTART");
        assert_eq!(line.param("TZID"), Some("Asia/Shanghai"));
        assert_eq!(line.value, "20200417T110000");
    }

    #[test]
    fn content_line_value_may_contain_colons() {
        let line = ContentLine::parse("x-wr-caldesc:see https://git.io/JLhLb").expect("parse");
        assert_eq!(line.name, "X-WR-CALDESC");
        assert_eq!(line.value, "see https://git.io/JLhLb");
    }

    #[test]
    fn content_line_without_colon_is_rejected() {
        assert!(ContentLine::parse("garbage").is_none());
        assert!(ContentLine::parse(":value").is_none());
    }

    #[test]
    fn text_escaping_reverses() {
        let raw = "a,b;c\\d\ne";
        assert_eq!(escape_text(raw), "a\\,b\\;c\\\\d\\ne");
        assert_eq!(unescape_text(&escape_text(raw)), raw);
    }

    #[test]
    fn fold_respects_octet_limit_and_char_boundaries() {
        let line = format!("SUMMARY:{}", "剧情活动：".repeat(20));
        let folded = fold_line(&line);
        for physical in folded.split("\r\n") {
            assert!(physical.len() <= FOLD_WIDTH, "line too long: {}", physical.len());
        }
        let unfolded = unfold(&folded);
        assert_eq!(unfolded.len(), 1);
        assert_eq!(unfolded[0].1, line);
    }

    #[test]
    fn short_lines_are_not_folded() {
        assert_eq!(fold_line("SEQUENCE:3"), "SEQUENCE:3");
    }

    #[test]
    fn unfold_tracks_line_numbers_and_skips_blanks() {
        let text = "BEGIN:VCALENDAR\n\nSUMMARY:ab\n c\nEND:VCALENDAR\n";
        let lines = unfold(text);
        assert_eq!(
            lines,
            vec![
                (1, "BEGIN:VCALENDAR".to_string()),
                (3, "SUMMARY:abc".to_string()),
                (5, "END:VCALENDAR".to_string()),
            ]
        );
    }
}

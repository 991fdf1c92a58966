use chrono::{DateTime, Local};
use mailparse::{MailHeaderMap, ParsedMail};

use crate::domain::email::EmailRecord;

/// Decode RFC 2047 encoded-words in a raw header value.
///
/// Raw 8-bit bytes are read as UTF-8 first, with invalid sequences dropped,
/// so mailparse never falls back to Latin-1 on them.
pub fn decode_mime_words(raw: &[u8]) -> String {
    let clean = utf8_dropping_invalid(raw);
    // mailparse expects a full "Key: value" header line
    let mut line = b"X: ".to_vec();
    line.extend_from_slice(clean.as_bytes());
    line.extend_from_slice(b"\r\n");

    match mailparse::parse_header(&line) {
        Ok((h, _idx)) => h.get_value(),
        Err(_) => clean,
    }
}

/// UTF-8 decode that drops invalid sequences instead of substituting them.
pub fn utf8_dropping_invalid(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .chars()
        .filter(|&c| c != char::REPLACEMENT_CHARACTER)
        .collect()
}

fn header_text(parsed: &ParsedMail, name: &str) -> String {
    parsed
        .headers
        .get_first_header(name)
        .map(|h| decode_mime_words(h.get_value_raw()))
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Date header to local time, or "now" when missing or unparseable.
pub fn received_date(parsed: &ParsedMail) -> DateTime<Local> {
    parsed
        .headers
        .get_first_value("Date")
        .and_then(|d| parse_rfc2822_local(&d))
        .unwrap_or_else(Local::now)
}

/// Strict RFC 2822 parse. mailparse's `dateparse` is too forgiving here:
/// it yields 0 for garbage and rolls out-of-range fields over.
fn parse_rfc2822_local(raw: &str) -> Option<DateTime<Local>> {
    let d = raw.trim();
    // trailing zone comment, e.g. "+0000 (UTC)"
    let d = match d.rfind(" (") {
        Some(i) if d.ends_with(')') => d[..i].trim_end(),
        _ => d,
    };
    DateTime::parse_from_rfc2822(d)
        .ok()
        .map(|dt| dt.with_timezone(&Local))
}

fn is_multipart(p: &ParsedMail) -> bool {
    p.ctype.mimetype.to_ascii_lowercase().starts_with("multipart/") || !p.subparts.is_empty()
}

fn part_text(p: &ParsedMail) -> String {
    let charset = p.ctype.charset.to_ascii_lowercase();
    if matches!(charset.as_str(), "utf-8" | "utf8" | "us-ascii" | "ascii") {
        // mailparse maps us-ascii to windows-1252; read these as UTF-8 instead
        return p
            .get_body_raw()
            .map(|raw| utf8_dropping_invalid(&raw))
            .unwrap_or_default();
    }
    match p.get_body() {
        Ok(s) => s.chars().filter(|&c| c != char::REPLACEMENT_CHARACTER).collect(),
        Err(_) => p
            .get_body_raw()
            .map(|raw| utf8_dropping_invalid(&raw))
            .unwrap_or_default(),
    }
}

/// First inline text/plain part, pre-order over the whole tree.
fn first_plain_part<'a>(p: &'a ParsedMail<'a>) -> Option<&'a ParsedMail<'a>> {
    let mime = p.ctype.mimetype.to_ascii_lowercase();
    if mime == "text/plain" && p.headers.get_first_header("Content-Disposition").is_none() {
        return Some(p);
    }
    p.subparts.iter().find_map(first_plain_part)
}

pub fn extract_body(parsed: &ParsedMail) -> String {
    if is_multipart(parsed) {
        first_plain_part(parsed).map(part_text).unwrap_or_default()
    } else {
        part_text(parsed)
    }
}

/// Turn one raw RFC 822 message into an `EmailRecord`.
///
/// Never fails: every field has a fallback, so one bad message can't sink a batch.
pub fn parse_message(raw_rfc822: &[u8]) -> EmailRecord {
    match mailparse::parse_mail(raw_rfc822) {
        Ok(parsed) => EmailRecord::new(
            header_text(&parsed, "Subject"),
            header_text(&parsed, "From"),
            extract_body(&parsed),
            received_date(&parsed),
        ),
        Err(e) => {
            log::warn!("unparseable message, keeping raw text: {e}");
            EmailRecord::new(
                String::new(),
                String::new(),
                utf8_dropping_invalid(raw_rfc822),
                Local::now(),
            )
        }
    }
}

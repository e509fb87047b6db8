//! Content sanitizer
//!
//! Strips active constructs from bundle Markdown while leaving prose, fenced
//! code and inline code spans untouched. The sanitizer runs passes until one
//! removes nothing, so its output is always a fixed point: sanitizing twice
//! is the same as sanitizing once. Input it cannot handle safely is rejected.

use capload_types::RemovalKind;
use regex::{Captures, Regex};
use std::ops::Range;
use thiserror::Error;

/// Passes allowed before giving up on adversarially nested input
const DEFAULT_MAX_PASSES: usize = 8;
/// Characters of removed text kept for the audit trail
const EXCERPT_CHARS: usize = 80;

/// Executable schemes and media types, matched against a normalized URL
const EXECUTABLE_URL: &str = r"^(?:javascript:|vbscript:|data:(?:text/html|text/javascript|application/(?:x-)?javascript|application/xhtml\+xml|image/svg\+xml))";

/// Sanitization failures; the content is never passed through raw
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizeError {
    /// Content contains NUL bytes
    #[error("content contains NUL bytes")]
    NulByte,

    /// An active element is opened but never closed
    #[error("unterminated <{element}> element")]
    Unterminated {
        /// Element name
        element: &'static str,
    },

    /// Removals kept exposing new constructs
    #[error("content did not stabilize after {0} passes")]
    DidNotConverge(usize),
}

/// One removed construct
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    /// What was removed
    pub kind: RemovalKind,
    /// Byte offset in the text being cleaned when it was removed
    pub offset: usize,
    /// Leading characters of the removed text
    pub excerpt: String,
}

/// Sanitized content plus its audit trail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    /// Clean content
    pub content: String,
    /// Every removal, in the order performed
    pub removals: Vec<Removal>,
}

/// Element removed together with its body
#[derive(Debug, Clone)]
struct BlockRule {
    name: &'static str,
    kind: RemovalKind,
    paired: Regex,
    opening: Regex,
}

/// How a raw HTML block started on a line ends
#[derive(Debug, Clone, Copy)]
enum HtmlBlockEnd {
    BlankLine,
    Marker(&'static str),
}

/// Markdown/HTML sanitizer
#[derive(Debug, Clone)]
pub struct Sanitizer {
    blocks: Vec<BlockRule>,
    embed: Regex,
    tag: Regex,
    autolink: Regex,
    attribute: Regex,
    link_target: Regex,
    link_definition: Regex,
    char_ref: Regex,
    executable: Regex,
    max_passes: usize,
}

impl Sanitizer {
    /// Compile the sanitizer's patterns
    pub fn new() -> Result<Self, regex::Error> {
        let block = |name: &'static str, kind: RemovalKind| -> Result<BlockRule, regex::Error> {
            Ok(BlockRule {
                name,
                kind,
                paired: Regex::new(&format!(
                    r"(?is)<{name}\b[^>]*/>|<{name}\b[^>]*>.*?</{name}\s*>"
                ))?,
                opening: Regex::new(&format!(r"(?i)<{name}\b"))?,
            })
        };

        Ok(Self {
            blocks: vec![
                block("script", RemovalKind::ScriptBlock)?,
                block("iframe", RemovalKind::EmbeddedElement)?,
                block("object", RemovalKind::EmbeddedElement)?,
            ],
            embed: Regex::new(r"(?i)<embed\b[^>]*>")?,
            // Quoted values may hold `>` but not a blank line; a stray quote is a
            // plain character
            tag: Regex::new(
                r#"<[a-zA-Z](?:"(?:[^"\n]|\n[ \t]*[^\s"])*(?:\n[ \t]*)?"|'(?:[^'\n]|\n[ \t]*[^\s'])*(?:\n[ \t]*)?'|[^<>"']|["'])*>"#,
            )?,
            autolink: Regex::new(r"^<(?P<dest>[a-zA-Z][a-zA-Z0-9+.-]{1,31}:[^<>\s]*)>$")?,
            attribute: Regex::new(
                r#"(?P<name>[^\s/>"'=]+)(?:\s*=\s*(?P<value>"[^"]*"|'[^']*'|[^\s>]+))?"#,
            )?,
            link_target: Regex::new(
                r#"\]\(\s*(?P<dest><[^<>\n]*>|(?:[^()\s<]|\([^()\s]*\))+)(?:\s+(?:"[^"]*"|'[^']*'|\([^()]*\)))?\s*\)"#,
            )?,
            link_definition: Regex::new(
                r"(?m)^(?P<label> {0,3}\[[^\]\n]+\]:[ \t]*\n?[ \t]*)(?P<dest><[^<>\n]*>|\S+)",
            )?,
            char_ref: Regex::new(
                r"(?i)&#x(?P<hex>[0-9a-f]+);?|&#(?P<dec>[0-9]+);?|&(?P<named>colon|tab|newline|sol|plus|amp);?",
            )?,
            executable: Regex::new(EXECUTABLE_URL)?,
            max_passes: DEFAULT_MAX_PASSES,
        })
    }

    /// Sanitize `input`, failing closed on anything unsafe to process
    pub fn sanitize(&self, input: &str) -> Result<Sanitized, SanitizeError> {
        if input.contains('\0') {
            return Err(SanitizeError::NulByte);
        }

        let mut current = input.to_string();
        let mut removals = Vec::new();

        for _ in 0..self.max_passes {
            let mut pass_removals = Vec::new();
            let next = self.pass(&current, &mut pass_removals)?;
            // A pass only ever removes, so no removals means `next == current`
            if pass_removals.is_empty() {
                return Ok(Sanitized {
                    content: current,
                    removals,
                });
            }
            removals.extend(pass_removals);
            current = next;
        }

        Err(SanitizeError::DidNotConverge(self.max_passes))
    }

    fn pass(&self, text: &str, removals: &mut Vec<Removal>) -> Result<String, SanitizeError> {
        let mut out = String::with_capacity(text.len());
        for (range, is_code) in self.segments(text) {
            let segment = &text[range.clone()];
            if is_code {
                out.push_str(segment);
            } else {
                out.push_str(&self.clean_prose(segment, range.start, removals)?);
            }
        }
        Ok(out)
    }

    /// Split text into `(range, is_code)` segments: fenced blocks and inline code spans
    fn segments(&self, text: &str) -> Vec<(Range<usize>, bool)> {
        let mut segments = Vec::new();
        for (range, is_code) in split_fences(text) {
            if is_code {
                segments.push((range, true));
                continue;
            }
            let mut prose_start = range.start;
            for span in self.code_spans(&text[range.clone()]) {
                let span = range.start + span.start..range.start + span.end;
                if span.start > prose_start {
                    segments.push((prose_start..span.start, false));
                }
                prose_start = span.end;
                segments.push((span, true));
            }
            if prose_start < range.end {
                segments.push((prose_start..range.end, false));
            }
        }
        segments
    }

    /// Single-line code spans a Markdown renderer would emit as literal text
    ///
    /// A tag opened before a backtick wins over it, and lines inside raw HTML
    /// blocks never hold code spans.
    fn code_spans(&self, prose: &str) -> Vec<Range<usize>> {
        let raw = raw_html_lines(prose);
        let mut spans = Vec::new();
        let mut pos = 0;

        while let Some(open) = next_backtick_run(prose, pos) {
            if let Some(tag) = self.tag.find_at(prose, pos) {
                if tag.start() < open.start {
                    pos = tag.end();
                    continue;
                }
            }
            if raw.iter().any(|lines| lines.contains(&open.start)) {
                pos = open.end;
                continue;
            }
            let line_end = prose[open.end..]
                .find('\n')
                .map_or(prose.len(), |i| open.end + i);
            match closing_run(&prose[..line_end], open.end, open.len()) {
                Some(close) => {
                    spans.push(open.start..close.end);
                    pos = close.end;
                }
                None => pos = open.end,
            }
        }
        spans
    }

    fn clean_prose(
        &self,
        prose: &str,
        base: usize,
        removals: &mut Vec<Removal>,
    ) -> Result<String, SanitizeError> {
        let mut text = prose.to_string();

        for rule in &self.blocks {
            text = strip(&text, &rule.paired, base, rule.kind, removals);
            if rule.opening.is_match(&text) && !rule.paired.is_match(&text) {
                return Err(SanitizeError::Unterminated { element: rule.name });
            }
        }

        text = strip(
            &text,
            &self.embed,
            base,
            RemovalKind::EmbeddedElement,
            removals,
        );

        let mut cleaned = String::with_capacity(text.len());
        let mut last = 0;
        for tag in self.tag.find_iter(&text) {
            cleaned.push_str(&text[last..tag.start()]);
            cleaned.push_str(&self.clean_tag(tag.as_str(), base + tag.start(), removals));
            last = tag.end();
        }
        cleaned.push_str(&text[last..]);

        let linked = strip_with(&cleaned, &self.link_target, base, removals, |caps| {
            self.executable_kind(&caps["dest"])
                .map(|kind| (kind, "]()".to_string()))
        });
        Ok(strip_with(
            &linked,
            &self.link_definition,
            base,
            removals,
            |caps| {
                self.executable_kind(&caps["dest"])
                    .map(|kind| (kind, format!("{}<>", &caps["label"])))
            },
        ))
    }

    /// Drop event handlers and executable URLs from one start tag
    fn clean_tag(&self, tag: &str, offset: usize, removals: &mut Vec<Removal>) -> String {
        if let Some(caps) = self.autolink.captures(tag) {
            if let Some(kind) = self.executable_kind(&caps["dest"]) {
                removals.push(removal(kind, offset, tag));
                return String::new();
            }
            return tag.to_string();
        }

        let inner_end = tag.len() - 1;
        let name_end = tag[1..inner_end]
            .find(|c: char| c.is_whitespace() || c == '/')
            .map_or(inner_end, |i| i + 1);

        let mut out = String::with_capacity(tag.len());
        out.push_str(&tag[..name_end]);
        let mut last = name_end;

        for attr in self.attribute.captures_iter(&tag[name_end..inner_end]) {
            let (Some(whole), Some(name)) = (attr.get(0), attr.name("name")) else {
                continue;
            };
            let start = name_end + whole.start();
            let end = name_end + whole.end();
            let kind = if is_event_handler(name.as_str()) {
                Some(RemovalKind::EventHandler)
            } else {
                attr.name("value")
                    .and_then(|value| self.executable_kind(value.as_str()))
            };

            match kind {
                Some(kind) => {
                    // Keep the following attribute separated from the previous one
                    let next_is_attribute = tag[end..]
                        .starts_with(|c: char| !c.is_whitespace() && c != '/' && c != '>');
                    if start > last && next_is_attribute {
                        out.push(' ');
                    }
                    removals.push(removal(kind, offset + start, whole.as_str()));
                }
                None => out.push_str(&tag[last..end]),
            }
            last = end;
        }
        out.push_str(&tag[last..]);
        out
    }

    /// Removal kind for a URL a browser would execute
    fn executable_kind(&self, raw: &str) -> Option<RemovalKind> {
        let url = self.normalize_url(raw);
        if !self.executable.is_match(&url) {
            return None;
        }
        Some(if url.starts_with("data") {
            RemovalKind::ExecutableDataUri
        } else {
            RemovalKind::ScriptUrl
        })
    }

    /// URL as a browser reads its scheme: references decoded, whitespace and controls dropped
    fn normalize_url(&self, raw: &str) -> String {
        let unquoted = raw.trim_matches(|c| matches!(c, '"' | '\'' | '<' | '>'));
        self.char_ref
            .replace_all(unquoted, |caps: &Captures| decode_char_ref(caps).to_string())
            .chars()
            .filter(|c| !c.is_ascii_whitespace() && !c.is_control())
            .flat_map(char::to_lowercase)
            .collect()
    }
}

fn decode_char_ref(caps: &Captures) -> char {
    let decoded = if let Some(hex) = caps.name("hex") {
        u32::from_str_radix(hex.as_str(), 16)
            .ok()
            .and_then(char::from_u32)
    } else if let Some(dec) = caps.name("dec") {
        dec.as_str().parse::<u32>().ok().and_then(char::from_u32)
    } else {
        caps.name("named")
            .and_then(|named| match named.as_str().to_ascii_lowercase().as_str() {
                "colon" => Some(':'),
                "tab" => Some('\t'),
                "newline" => Some('\n'),
                "sol" => Some('/'),
                "plus" => Some('+'),
                "amp" => Some('&'),
                _ => None,
            })
    };
    decoded.unwrap_or(char::REPLACEMENT_CHARACTER)
}

fn is_event_handler(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    lowered.len() > 2
        && lowered.starts_with("on")
        && lowered[2..].chars().all(|c| c.is_ascii_alphabetic())
}

fn removal(kind: RemovalKind, offset: usize, text: &str) -> Removal {
    Removal {
        kind,
        offset,
        excerpt: text.chars().take(EXCERPT_CHARS).collect(),
    }
}

/// Remove every match of `re`, recording each as a removal
fn strip(
    text: &str,
    re: &Regex,
    base: usize,
    kind: RemovalKind,
    removals: &mut Vec<Removal>,
) -> String {
    strip_with(text, re, base, removals, |_| Some((kind, String::new())))
}

/// Replace the matches of `re` that `judge` flags, recording each as a removal
fn strip_with(
    text: &str,
    re: &Regex,
    base: usize,
    removals: &mut Vec<Removal>,
    judge: impl Fn(&Captures) -> Option<(RemovalKind, String)>,
) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in re.captures_iter(text) {
        let Some(m) = caps.get(0) else { continue };
        let Some((kind, replacement)) = judge(&caps) else {
            continue;
        };
        out.push_str(&text[last..m.start()]);
        out.push_str(&replacement);
        removals.push(removal(kind, base + m.start(), m.as_str()));
        last = m.end();
    }
    out.push_str(&text[last..]);
    out
}

/// Next backtick run at or after `from` that can open a code span
fn next_backtick_run(text: &str, from: usize) -> Option<Range<usize>> {
    let mut search = from;
    loop {
        let start = search + text[search..].find('`')?;
        let end = start + text[start..].bytes().take_while(|b| *b == b'`').count();
        let slashes = text[..start].bytes().rev().take_while(|b| *b == b'\\').count();
        // A backslash escapes only the first backtick of the run
        let start = if slashes % 2 == 1 { start + 1 } else { start };
        if start < end {
            return Some(start..end);
        }
        search = end;
    }
}

/// First run of exactly `len` backticks at or after `from`
fn closing_run(text: &str, from: usize, len: usize) -> Option<Range<usize>> {
    let mut search = from;
    while let Some(i) = text[search..].find('`') {
        let start = search + i;
        let end = start + text[start..].bytes().take_while(|b| *b == b'`').count();
        if end - start == len {
            return Some(start..end);
        }
        search = end;
    }
    None
}

/// Line content after blockquote and list markers
fn block_content(line: &str) -> &str {
    line.trim_start_matches(|c: char| {
        c.is_whitespace() || c.is_ascii_digit() || matches!(c, '>' | '-' | '*' | '+' | '.' | ')')
    })
}

fn html_block_start(content: &str) -> Option<HtmlBlockEnd> {
    let lowered = content.to_ascii_lowercase();
    if !lowered.starts_with('<') {
        return None;
    }
    let raw_text = [
        ("<script", "</script>"),
        ("<pre", "</pre>"),
        ("<style", "</style>"),
        ("<textarea", "</textarea>"),
        ("<!--", "-->"),
        ("<?", "?>"),
        ("<![cdata[", "]]>"),
        ("<!", ">"),
    ];
    Some(
        raw_text
            .iter()
            .find(|(open, _)| lowered.starts_with(*open))
            .map_or(HtmlBlockEnd::BlankLine, |(_, close)| {
                HtmlBlockEnd::Marker(*close)
            }),
    )
}

/// Byte ranges of lines a Markdown renderer passes through as raw HTML
fn raw_html_lines(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut open: Option<HtmlBlockEnd> = None;
    let mut pos = 0;

    for line in text.split_inclusive('\n') {
        let start = pos;
        pos += line.len();
        let content = block_content(line);
        if open.is_none() {
            open = html_block_start(content);
        }
        match open {
            None => {}
            Some(HtmlBlockEnd::BlankLine) => {
                if content.trim().is_empty() {
                    open = None;
                } else {
                    ranges.push(start..pos);
                }
            }
            Some(HtmlBlockEnd::Marker(close)) => {
                ranges.push(start..pos);
                if content.to_ascii_lowercase().contains(close) {
                    open = None;
                }
            }
        }
    }
    ranges
}

/// Opening fence: up to three spaces, then at least three backticks or tildes
fn fence_open(line: &str) -> Option<(char, usize)> {
    let rest = line.trim_start_matches(' ');
    if line.len() - rest.len() > 3 {
        return None;
    }
    let ch = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let count = rest.chars().take_while(|c| *c == ch).count();
    if count < 3 || (ch == '`' && rest[count..].contains('`')) {
        return None;
    }
    Some((ch, count))
}

fn fence_closes(line: &str, ch: char, count: usize) -> bool {
    let rest = line.trim_start_matches(' ');
    if line.len() - rest.len() > 3 {
        return false;
    }
    let run = rest.chars().take_while(|c| *c == ch).count();
    run >= count && rest[run..].trim().is_empty()
}

/// Split text into `(range, is_code)` segments; an unclosed fence runs to the end
fn split_fences(text: &str) -> Vec<(Range<usize>, bool)> {
    let mut segments = Vec::new();
    let mut segment_start = 0;
    let mut pos = 0;
    let mut fence: Option<(char, usize)> = None;

    for line in text.split_inclusive('\n') {
        let line_start = pos;
        pos += line.len();

        match fence {
            None => {
                if let Some(open) = fence_open(line) {
                    if line_start > segment_start {
                        segments.push((segment_start..line_start, false));
                    }
                    segment_start = line_start;
                    fence = Some(open);
                }
            }
            Some((ch, count)) => {
                if fence_closes(line, ch, count) {
                    segments.push((segment_start..pos, true));
                    segment_start = pos;
                    fence = None;
                }
            }
        }
    }

    if segment_start < text.len() {
        segments.push((segment_start..text.len(), fence.is_some()));
    }
    segments
}

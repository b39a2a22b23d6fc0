use crate::error::StripError;
use html_escape::decode_html_entities;
use memchr::memmem;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

/// Extension tags whose contents never render as prose.
const INVISIBLE_TAGS: &[&str] = &[
    "ref",
    "references",
    "gallery",
    "math",
    "chem",
    "ce",
    "score",
    "timeline",
    "graph",
    "imagemap",
    "inputbox",
    "categorytree",
    "templatedata",
    "syntaxhighlight",
    "source",
    "hiero",
    "section",
];

/// Link namespaces that carry no prose (lowercased).
const HIDDEN_NAMESPACES: &[&str] = &["file", "image", "category", "media"];

static INVISIBLE_TAG_REGEXES: Lazy<Vec<Regex>> = Lazy::new(|| {
    INVISIBLE_TAGS
        .iter()
        .map(|tag| {
            Regex::new(&format!(
                r"(?is)<{tag}(?:\s[^<>]*)?/>|<{tag}(?:\s[^<>]*)?>.*?</{tag}\s*>"
            ))
            .unwrap()
        })
        .collect()
});

static FORMATTING_TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)</?(?:b|i|u|s|small|big|sub|sup|span|div|center|br|p|blockquote|code|tt|em|strong|abbr|cite|poem|nowiki|pre|includeonly|noinclude|onlyinclude|del|ins|mark|var|kbd|samp|q|font)(?:\s[^<>]*)?/?>",
    )
    .unwrap()
});

static EXTERNAL_LINK_LABELED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(?:(?:https?|ftp):)?//[^\s\]]+\s+([^\]]*)\]").unwrap());

static EXTERNAL_LINK_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(?:(?:https?|ftp):)?//[^\s\]]+\]").unwrap());

static HEADING_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mR)^[ \t]*={1,6}[ \t]*(.+?)[ \t]*={1,6}[ \t]*$").unwrap());

static EMPHASIS_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"'{2,5}").unwrap());

static MAGIC_WORD_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"__[A-Z]+__").unwrap());

static INTERLANGUAGE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]{2,3}(?:-[a-z]+)?$").unwrap());

static BLANK_RUN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n(?:[ \t]*\n){2,}").unwrap());

/// Upper bound on structural passes per call.
const MAX_PASSES: usize = 8;

/// Turns wikitext into plain prose.
///
/// Never fails: constructs that are not closed are left in the output as written.
/// Stripping the output again returns it unchanged, except that a double-escaped
/// entity such as `&amp;amp;` loses one level of escaping per call.
pub fn strip_markup(raw: &str) -> String {
    let stripped = strip_structure(raw);
    let decoded = match decode_entities(&stripped) {
        Cow::Owned(decoded) => Some(decoded),
        Cow::Borrowed(_) => None,
    };
    let text = match decoded {
        Some(decoded) => strip_structure(&decoded),
        None => stripped,
    };
    let text = BLANK_RUN_REGEX.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Repeats [`strip_pass`] until the text stops changing.
fn strip_structure(raw: &str) -> String {
    let mut text = strip_pass(raw);
    for _ in 1..MAX_PASSES {
        let next = strip_pass(&text);
        if next == text {
            break;
        }
        text = next;
    }
    text
}

fn strip_pass(raw: &str) -> String {
    let text = strip_comments(raw);
    let text = strip_invisible_tags(&text);
    let text = strip_nested(&text, b"{{", b"}}");
    let text = strip_nested(&text, b"{|", b"|}");
    let text = render_internal_links(&text);
    let text = EXTERNAL_LINK_LABELED.replace_all(&text, "$1");
    let text = EXTERNAL_LINK_BARE.replace_all(&text, "");
    let text = HEADING_REGEX.replace_all(&text, "$1");
    let text = EMPHASIS_REGEX.replace_all(&text, "");
    let text = FORMATTING_TAG_REGEX.replace_all(&text, "");
    MAGIC_WORD_REGEX.replace_all(&text, "").into_owned()
}

/// Seam between the pipeline and the markup cleaner.
pub trait Stripper: Send + Sync {
    fn strip(&self, raw: &str) -> Result<String, StripError>;
}

/// Default [`Stripper`] backed by [`strip_markup`].
#[derive(Debug, Default, Clone, Copy)]
pub struct WikitextStripper;

impl Stripper for WikitextStripper {
    fn strip(&self, raw: &str) -> Result<String, StripError> {
        Ok(strip_markup(raw))
    }
}

fn strip_comments(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = memmem::find(rest.as_bytes(), b"<!--") {
        let Some(len) = memmem::find(&rest.as_bytes()[start + 4..], b"-->") else {
            break;
        };
        result.push_str(&rest[..start]);
        rest = &rest[start + 4 + len + 3..];
    }

    result.push_str(rest);
    result
}

fn strip_invisible_tags(text: &str) -> String {
    let mut result = text.to_string();
    if !text.contains('<') {
        return result;
    }
    for re in INVISIBLE_TAG_REGEXES.iter() {
        if re.is_match(&result) {
            result = re.replace_all(&result, "").into_owned();
        }
    }
    result
}

/// Removes balanced `open ... close` spans, counting nested openers.
/// An opener without a matching close is kept as text.
fn strip_nested(text: &str, open: &[u8], close: &[u8]) -> String {
    let mut result = String::with_capacity(text.len());
    let mut run_start = 0;

    for (start, end) in outermost_spans(text.as_bytes(), open, close) {
        result.push_str(&text[run_start..start]);
        run_start = end;
    }

    result.push_str(&text[run_start..]);
    result
}

/// `(start, end)` byte ranges of the outermost balanced `open ... close` pairs,
/// in order. Unmatched openers and closers are skipped.
fn outermost_spans(bytes: &[u8], open: &[u8], close: &[u8]) -> Vec<(usize, usize)> {
    let mut openers = Vec::new();
    let mut pairs = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i..].starts_with(open) {
            openers.push(i);
            i += open.len();
        } else if bytes[i..].starts_with(close) {
            if let Some(start) = openers.pop() {
                pairs.push((start, i + close.len()));
            }
            i += close.len();
        } else {
            i += 1;
        }
    }

    // Pairs nest properly, so after sorting by start each span either
    // contains the next ones or ends before them.
    pairs.sort_unstable();
    let mut spans: Vec<(usize, usize)> = Vec::new();
    for (start, end) in pairs {
        match spans.last() {
            Some(&(_, outer_end)) if start < outer_end => {}
            _ => spans.push((start, end)),
        }
    }
    spans
}

fn render_internal_links(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut run_start = 0;

    for (start, end) in outermost_spans(text.as_bytes(), b"[[", b"]]") {
        result.push_str(&text[run_start..start]);
        result.push_str(&render_link(&text[start + 2..end - 2]));
        run_start = end;
    }

    result.push_str(&text[run_start..]);
    result
}

fn render_link(inner: &str) -> String {
    let (target, label) = match inner.find('|') {
        Some(pos) => (&inner[..pos], Some(&inner[pos + 1..])),
        None => (inner, None),
    };
    let target = target.trim();

    if let Some(visible) = target.strip_prefix(':') {
        return render_internal_links(label.filter(|l| !l.is_empty()).unwrap_or(visible));
    }
    if is_hidden_link(target) {
        return String::new();
    }

    match label {
        Some(label) if !label.is_empty() => render_internal_links(label),
        _ => target.to_string(),
    }
}

fn is_hidden_link(target: &str) -> bool {
    let Some((prefix, _)) = target.split_once(':') else {
        return false;
    };
    let prefix = prefix.trim().to_lowercase();
    HIDDEN_NAMESPACES.contains(&prefix.as_str()) || INTERLANGUAGE_PREFIX.is_match(&prefix)
}

fn decode_entities(text: &str) -> Cow<'_, str> {
    if text.contains('&') {
        decode_html_entities(text)
    } else {
        Cow::Borrowed(text)
    }
}

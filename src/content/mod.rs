//! Content transformation: frontmatter + markdown into renderable items.
//!
//! Malformed frontmatter is never fatal. Fields fall back to derived
//! defaults (slug-as-title, current date) and a warning is recorded on the
//! result instead of aborting the file.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use pulldown_cmark::{html, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

use crate::error::{PressroomError, Result};
use crate::types::{parse_content_path, Transformed};

/// Words per minute used for read-time estimates
const WORDS_PER_MINUTE: usize = 200;

/// Target excerpt length in characters
const EXCERPT_CHARS: usize = 160;

/// Transform one source file into its rendered form.
///
/// `path` must be a content path (`content/{type}/{slug}.md`); the type and
/// slug are derived from it, never from the frontmatter.
pub fn transform(path: &str, raw: &str) -> Result<Transformed> {
    let (content_type, slug) = parse_content_path(path).ok_or_else(|| {
        PressroomError::InvalidInput(format!("not a content path: {}", path))
    })?;

    let mut warnings = Vec::new();
    let (frontmatter, body) = split_frontmatter(raw);
    let fields = match frontmatter {
        Some(block) => match parse_frontmatter(block) {
            Ok(map) => map,
            Err(e) => {
                warnings.push(format!("malformed frontmatter: {}", e));
                HashMap::new()
            }
        },
        None => HashMap::new(),
    };

    let rendered = render_markdown(body);

    let title = fields
        .get("title")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or_else(|| rendered.first_heading.clone())
        .unwrap_or_else(|| humanize_slug(&slug));

    let date = match fields.get("date") {
        Some(value) => parse_date(value).unwrap_or_else(|| {
            warnings.push(format!("unparseable date: {}", value));
            Utc::now()
        }),
        None => Utc::now(),
    };

    // Re-render with the duplicate leading heading stripped now that the
    // title is known.
    let html = render_body(body, &title);

    let read_time = fields
        .get("readTime")
        .and_then(read_time_override)
        .unwrap_or_else(|| format_read_time(rendered.word_count));

    let excerpt = fields
        .get("description")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| derive_excerpt(&rendered.plain_text));

    Ok(Transformed {
        content_type,
        slug,
        title,
        date,
        read_time,
        excerpt,
        html,
        raw_body: body.to_string(),
        frontmatter: fields,
        warnings,
    })
}

/// Split a `---`-delimited frontmatter block from the body.
/// Returns `(frontmatter, body)`; no block yields `(None, input)`.
fn split_frontmatter(raw: &str) -> (Option<&str>, &str) {
    let rest = match raw.strip_prefix("---") {
        Some(r) => r,
        None => return (None, raw),
    };
    let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'));
    let rest = match rest {
        Some(r) => r,
        None => return (None, raw),
    };

    // CRLF terminators first so the block never keeps a trailing \r
    for terminator in ["\r\n---\r\n", "\r\n---\n", "\n---\r\n", "\n---\n"] {
        if let Some(idx) = rest.find(terminator) {
            let block = &rest[..idx];
            let body = &rest[idx + terminator.len()..];
            return (Some(block), body);
        }
    }
    // Closing delimiter at EOF without trailing newline
    if let Some(block) = rest.strip_suffix("\n---").or_else(|| rest.strip_suffix("\r\n---")) {
        return (Some(block), "");
    }
    (None, raw)
}

/// Parse a frontmatter block into a string-keyed map
fn parse_frontmatter(block: &str) -> Result<HashMap<String, serde_json::Value>> {
    let value: serde_yaml::Value = serde_yaml::from_str(block)
        .map_err(|e| PressroomError::Validation(e.to_string()))?;

    let mapping = match value {
        serde_yaml::Value::Mapping(m) => m,
        serde_yaml::Value::Null => return Ok(HashMap::new()),
        _ => {
            return Err(PressroomError::Validation(
                "frontmatter is not a mapping".to_string(),
            ))
        }
    };

    let mut fields = HashMap::new();
    for (key, val) in mapping {
        let key = match key {
            serde_yaml::Value::String(s) => s,
            other => serde_json::to_value(&other)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| format!("{:?}", other)),
        };
        let json = serde_json::to_value(&val)
            .map_err(|e| PressroomError::Validation(e.to_string()))?;
        fields.insert(key, json);
    }
    Ok(fields)
}

struct RenderedBody {
    plain_text: String,
    word_count: usize,
    first_heading: Option<String>,
}

/// Single pass over the body for plain text, word count and the first H1
fn render_markdown(body: &str) -> RenderedBody {
    let parser = Parser::new_ext(body, Options::all());

    let mut plain_text = String::new();
    let mut first_heading: Option<String> = None;
    let mut heading_buf: Option<String> = None;

    for event in parser {
        match event {
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            }) if first_heading.is_none() => {
                heading_buf = Some(String::new());
            }
            Event::End(TagEnd::Heading(HeadingLevel::H1)) => {
                if let Some(buf) = heading_buf.take() {
                    if first_heading.is_none() && !buf.trim().is_empty() {
                        first_heading = Some(buf.trim().to_string());
                    }
                }
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(buf) = heading_buf.as_mut() {
                    buf.push_str(&text);
                } else {
                    plain_text.push_str(&text);
                    plain_text.push(' ');
                }
            }
            Event::SoftBreak | Event::HardBreak => plain_text.push(' '),
            _ => {}
        }
    }

    let word_count = plain_text.split_whitespace().count()
        + first_heading
            .as_deref()
            .map(|h| h.split_whitespace().count())
            .unwrap_or(0);

    RenderedBody {
        plain_text,
        word_count,
        first_heading,
    }
}

/// Render the body to HTML, dropping the first H1 when it duplicates the title
fn render_body(body: &str, title: &str) -> String {
    let events: Vec<Event> = Parser::new_ext(body, Options::all()).collect();

    let mut skip_range: Option<(usize, usize)> = None;
    if let Some(start) = events.iter().position(|e| {
        matches!(
            e,
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            })
        )
    }) {
        if let Some(offset) = events[start..]
            .iter()
            .position(|e| matches!(e, Event::End(TagEnd::Heading(HeadingLevel::H1))))
        {
            let end = start + offset;
            let heading_text: String = events[start..=end]
                .iter()
                .filter_map(|e| match e {
                    Event::Text(t) | Event::Code(t) => Some(t.as_ref()),
                    _ => None,
                })
                .collect();
            if heading_text.trim().eq_ignore_ascii_case(title.trim()) {
                skip_range = Some((start, end));
            }
        }
    }

    let filtered = events.into_iter().enumerate().filter_map(|(i, e)| {
        if let Some((start, end)) = skip_range {
            if i >= start && i <= end {
                return None;
            }
        }
        Some(e)
    });

    let mut out = String::new();
    html::push_html(&mut out, filtered);
    out
}

/// `ceil(words / 200)` minutes, minimum one
fn format_read_time(word_count: usize) -> String {
    let minutes = (word_count + WORDS_PER_MINUTE - 1) / WORDS_PER_MINUTE;
    format!("{} min read", minutes.max(1))
}

fn read_time_override(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(format!("{} min read", n)),
        _ => None,
    }
}

fn derive_excerpt(plain_text: &str) -> String {
    let collapsed: String = plain_text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= EXCERPT_CHARS {
        return collapsed;
    }
    let truncated: String = collapsed.chars().take(EXCERPT_CHARS).collect();
    format!("{}...", truncated.trim_end())
}

/// `my-first-note` -> `My First Note`
fn humanize_slug(slug: &str) -> String {
    slug.split('-')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_date(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// Caption rendering for uploaded videos
//
// Captions are rendered from `{field}` templates. `{{` and `}}` produce
// literal braces. Every known field has an empty default, so missing
// metadata never fails a render; unknown fields do.
//
// Templates are plain text plus `[text](url)` links and render to Telegram
// HTML. Field values are escaped and never produce markup.

use std::collections::HashMap;
use std::ops::Range;

use thiserror::Error;
use time::{Date, Month, OffsetDateTime};

use crate::downloader::models::Metadata;
use crate::platform::{ContentType, Platform, PlatformInfo};

pub const DEFAULT_TEMPLATE: &str =
    "[{title}]({url})\n📅 {date}{stats}\n👤 [{channel}]({channel_url})";

/// Placeholders understood by [`build`]
pub const FIELDS: &[&str] = &[
    "title",
    "url",
    "date",
    "views",
    "likes",
    "stats",
    "channel",
    "channel_url",
    "author",
    "duration",
    "description",
    "platform",
    "content_type",
    "id",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unknown field '{{{field}}}'")]
    UnknownField { field: String },

    #[error("unclosed '{{' at byte {position}")]
    Unclosed { position: usize },
}

/// Caption templates, one default plus optional per-platform overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionConfig {
    pub default_template: String,
    pub per_platform: HashMap<Platform, String>,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            default_template: DEFAULT_TEMPLATE.to_string(),
            per_platform: HashMap::new(),
        }
    }
}

impl CaptionConfig {
    pub fn with_template(mut self, platform: Platform, template: impl Into<String>) -> Self {
        self.per_platform.insert(platform, template.into());
        self
    }

    pub fn template_for(&self, platform: Platform) -> &str {
        self.per_platform
            .get(&platform)
            .map(String::as_str)
            .unwrap_or(&self.default_template)
    }
}

/// Render the caption for one video.
pub fn build(
    info: &PlatformInfo,
    metadata: &Metadata,
    config: &CaptionConfig,
) -> Result<String, TemplateError> {
    let fields = CaptionFields::extract(info, metadata);
    let glyphs = expand(config.template_for(info.platform), |name| fields.lookup(name))?;
    Ok(to_html(&glyphs))
}

/// Field values resolved for one video
#[derive(Debug, Default)]
struct CaptionFields {
    title: String,
    url: String,
    date: String,
    views: Option<String>,
    likes: Option<String>,
    channel: String,
    channel_url: String,
    author: String,
    duration: String,
    description: String,
    platform: &'static str,
    content_type: &'static str,
    id: String,
}

impl CaptionFields {
    fn extract(info: &PlatformInfo, m: &Metadata) -> Self {
        let owned = |v: Option<&str>| v.unwrap_or_default().to_string();

        let (title, url, channel, channel_url) = match info.platform {
            Platform::YouTube => {
                let url = if info.content_type == ContentType::Short {
                    m.str_of(&["original_url", "webpage_url"])
                } else {
                    m.str_of(&["webpage_url", "original_url"])
                };
                (
                    m.str_of(&["fulltitle", "title"]),
                    url,
                    m.str_of(&["channel", "uploader"]),
                    m.str_of(&["uploader_url", "channel_url"]),
                )
            }
            Platform::Vk => (
                m.str_of(&["title"]),
                m.str_of(&["webpage_url", "original_url"]),
                m.str_of(&["uploader", "channel"]),
                None,
            ),
            Platform::TikTok | Platform::Rutube => (
                m.str_of(&["title", "fulltitle"]),
                m.str_of(&["webpage_url", "original_url"]),
                m.str_of(&["channel", "uploader"]),
                m.str_of(&["uploader_url", "channel_url"]),
            ),
        };

        let channel_url = match info.platform {
            Platform::Vk => vk_channel_url(m).unwrap_or_default(),
            _ => owned(channel_url),
        };

        Self {
            title: owned(title),
            url: owned(url),
            date: publish_date(m).unwrap_or_default(),
            views: m.int("view_count").map(format_count),
            likes: m.int("like_count").map(format_count),
            channel: owned(channel),
            channel_url,
            author: owned(m.author()),
            duration: m.duration().map(format_duration).unwrap_or_default(),
            description: owned(m.description()),
            platform: info.platform.display_name(),
            content_type: info.content_type.as_str(),
            id: owned(m.id()),
        }
    }

    fn lookup(&self, name: &str) -> Option<String> {
        let value = match name {
            "title" => self.title.clone(),
            "url" => self.url.clone(),
            "date" => self.date.clone(),
            "views" => self.views.clone().unwrap_or_default(),
            "likes" => self.likes.clone().unwrap_or_default(),
            "stats" => {
                let mut stats = String::new();
                if let Some(views) = &self.views {
                    stats.push_str(&format!(" | 👁️ {}", views));
                }
                if let Some(likes) = &self.likes {
                    stats.push_str(&format!(" | ❤️ {}", likes));
                }
                stats
            }
            "channel" => self.channel.clone(),
            "channel_url" => self.channel_url.clone(),
            "author" => self.author.clone(),
            "duration" => self.duration.clone(),
            "description" => self.description.clone(),
            "platform" => self.platform.to_string(),
            "content_type" => self.content_type.to_string(),
            "id" => self.id.clone(),
            _ => return None,
        };
        Some(value)
    }
}

/// One character of an expanded template. Only characters written in the
/// template itself can form link markup; field values are always text.
#[derive(Debug, Clone, Copy)]
struct Glyph {
    ch: char,
    markup: bool,
}

/// Expand `{field}` placeholders using `lookup`.
fn expand<F>(template: &str, lookup: F) -> Result<Vec<Glyph>, TemplateError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = Vec::with_capacity(template.len() * 2);
    let mut rest = template;
    let mut offset = 0;

    let markup = |s: &str| s.chars().map(|ch| Glyph { ch, markup: true }).collect::<Vec<_>>();

    while let Some(pos) = rest.find(['{', '}']) {
        out.extend(markup(&rest[..pos]));
        let tail = &rest[pos..];

        let consumed = if tail.starts_with("{{") {
            out.push(Glyph { ch: '{', markup: false });
            2
        } else if tail.starts_with("}}") {
            out.push(Glyph { ch: '}', markup: false });
            2
        } else if tail.starts_with('}') {
            out.push(Glyph { ch: '}', markup: false });
            1
        } else {
            let close = tail.find('}').ok_or(TemplateError::Unclosed {
                position: offset + pos,
            })?;
            let name = tail[1..close].trim();
            let value = lookup(name).ok_or_else(|| TemplateError::UnknownField {
                field: name.to_string(),
            })?;
            out.extend(value.chars().map(|ch| Glyph { ch, markup: false }));
            close + 1
        };

        offset += pos + consumed;
        rest = &rest[pos + consumed..];
    }

    out.extend(markup(rest));
    Ok(out)
}

/// Render expanded glyphs as Telegram HTML.
///
/// `[text](url)` written in the template becomes a link; with an empty url
/// only the text is kept, with empty text the url is shown. Everything else
/// is escaped.
fn to_html(glyphs: &[Glyph]) -> String {
    let mut out = String::with_capacity(glyphs.len() * 2);
    let mut i = 0;

    while i < glyphs.len() {
        let Some((text, url, next)) = link_at(glyphs, i) else {
            push_escaped(&mut out, glyphs[i].ch);
            i += 1;
            continue;
        };

        let text: String = glyphs[text].iter().map(|g| g.ch).collect();
        let url: String = glyphs[url].iter().map(|g| g.ch).collect();
        let url = url.trim();

        if url.is_empty() {
            escape_into(&mut out, &text);
        } else {
            out.push_str("<a href=\"");
            escape_into(&mut out, url);
            out.push_str("\">");
            escape_into(&mut out, if text.is_empty() { url } else { text.as_str() });
            out.push_str("</a>");
        }
        i = next;
    }

    out
}

/// Template link starting at `start`: text range, url range, index after it
fn link_at(glyphs: &[Glyph], start: usize) -> Option<(Range<usize>, Range<usize>, usize)> {
    let is = |i: usize, c: char| glyphs.get(i).is_some_and(|g| g.markup && g.ch == c);

    if !is(start, '[') {
        return None;
    }
    let close = (start + 1..glyphs.len()).find(|&i| is(i, ']'))?;
    if !is(close + 1, '(') {
        return None;
    }
    let end = (close + 2..glyphs.len()).find(|&i| is(i, ')'))?;
    Some((start + 1..close, close + 2..end, end + 1))
}

fn escape_into(out: &mut String, s: &str) {
    s.chars().for_each(|c| push_escaped(out, c));
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        _ => out.push(c),
    }
}

/// Check a template without rendering it
pub fn validate(template: &str) -> Result<(), TemplateError> {
    expand(template, |name| FIELDS.contains(&name).then(String::new)).map(|_| ())
}

/// Compact count notation: 525, 16.4K, 150K, 1.5M, 1.5B.
pub fn format_count(n: i64) -> String {
    if n < 1000 {
        return n.to_string();
    }

    let (value, suffix) = if n < 1_000_000 {
        (n as f64 / 1e3, "K")
    } else if n < 1_000_000_000 {
        (n as f64 / 1e6, "M")
    } else {
        (n as f64 / 1e9, "B")
    };

    if value >= 100.0 || value.fract() == 0.0 {
        format!("{}{}", value.trunc() as i64, suffix)
    } else {
        let s = format!("{:.1}", value);
        let s = s.strip_suffix(".0").unwrap_or(&s);
        format!("{}{}", s, suffix)
    }
}

/// `DD.MM.YYYY H:MM`, hour without leading zero
fn format_date(dt: OffsetDateTime) -> String {
    format!(
        "{:02}.{:02}.{} {}:{:02}",
        dt.day(),
        u8::from(dt.month()),
        dt.year(),
        dt.hour(),
        dt.minute()
    )
}

fn format_duration(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

/// Publication date as shown in captions (`DD.MM.YYYY H:MM`, UTC)
pub fn publish_date(m: &Metadata) -> Option<String> {
    creation_date(m).map(format_date)
}

/// Publication time: `timestamp` first, then `upload_date` / `release_date`.
fn creation_date(m: &Metadata) -> Option<OffsetDateTime> {
    if let Some(dt) = m
        .int("timestamp")
        .filter(|ts| *ts > 0)
        .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
    {
        return Some(dt);
    }

    ["upload_date", "release_date"]
        .iter()
        .filter_map(|k| m.str_of(&[*k]))
        .find_map(parse_yyyymmdd)
        .map(|d| d.midnight().assume_utc())
}

fn parse_yyyymmdd(s: &str) -> Option<Date> {
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = s[0..4].parse().ok()?;
    let month: u8 = s[4..6].parse().ok()?;
    let day: u8 = s[6..8].parse().ok()?;
    Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()
}

/// VK owner link: negative ids are communities, positive ids are users.
/// Falls back to the owner part of a `<owner>_<video>` id.
fn vk_channel_url(m: &Metadata) -> Option<String> {
    let owner = m
        .str_of(&["uploader_id"])
        .map(str::to_string)
        .or_else(|| m.int("uploader_id").map(|i| i.to_string()))
        .or_else(|| {
            m.str_of(&["id", "display_id"])
                .and_then(|id| id.split_once('_'))
                .map(|(owner, _)| owner.to_string())
        })?;

    match owner.strip_prefix('-') {
        Some(club) if !club.is_empty() => Some(format!("https://vk.com/club{}", club)),
        None if !owner.is_empty() => Some(format!("https://vk.com/id{}", owner)),
        _ => None,
    }
}

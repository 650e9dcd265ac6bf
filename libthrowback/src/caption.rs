//! Caption rendering
//!
//! Captions are Handlebars templates rendered in strict mode, so a typo in a
//! placeholder name fails the run instead of posting a caption with a hole
//! in it. Output longer than the platform budget is cut back to the last
//! whole word that fits and a marker is appended. Cuts only ever happen at
//! whitespace, so a link is either kept whole or dropped.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use handlebars::{handlebars_helper, no_escape, Handlebars};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::{Result, TemplateError};
use crate::types::{Platform, ThrowbackSet};

pub const TWITTER_TEMPLATE: &str = "twitter_template.hbs";
pub const LEGACY_TWITTER_TEMPLATES: &[&str] = &["post_template.hbs", "tweet_template.hbs"];
pub const BLUESKY_TEMPLATE: &str = "bluesky_template.hbs";
pub const DEFAULT_ELLIPSIS: &str = "\u{2026}";

/// Values exposed to caption templates
#[derive(Debug, Clone, Serialize)]
pub struct RenderContext {
    pub set_name: String,
    pub set_url: String,
    pub description: String,
    pub tags: String,
    pub date_published_iso: String,
    pub published: String,
    pub images: Vec<String>,
    pub image_count: usize,
    pub platform: String,
    pub max_len: usize,
}

impl RenderContext {
    pub fn new(set: &ThrowbackSet, platform: Platform, max_len: usize) -> Self {
        let date_published_iso = set.date_published.clone().unwrap_or_default();
        Self {
            set_name: set.name.clone(),
            set_url: set.set_url.clone().unwrap_or_default(),
            description: set.description.clone().unwrap_or_default(),
            tags: set
                .tags
                .as_deref()
                .map(|t| t.replace('-', ""))
                .unwrap_or_default(),
            published: format_publish_date(&date_published_iso),
            date_published_iso,
            images: set.images.clone(),
            image_count: set.images.len(),
            platform: platform.to_string(),
            max_len,
        }
    }
}

/// Format an ISO-8601 date or datetime as e.g. `Mar 04, 2019`
///
/// Unparsable input is returned unchanged.
pub fn format_publish_date(iso: &str) -> String {
    let iso = iso.trim();
    if iso.is_empty() {
        return String::new();
    }
    let date = DateTime::parse_from_rfc3339(iso)
        .map(|dt| dt.date_naive())
        .or_else(|_| NaiveDateTime::parse_from_str(iso, "%Y-%m-%dT%H:%M:%S").map(|dt| dt.date()))
        .or_else(|_| NaiveDate::parse_from_str(iso, "%Y-%m-%d"));
    match date {
        Ok(date) => date.format("%b %d, %Y").to_string(),
        Err(_) => iso.to_string(),
    }
}

/// Template paths for each platform
#[derive(Debug, Clone, PartialEq)]
pub struct TemplatePaths {
    pub twitter: PathBuf,
    pub bluesky: PathBuf,
}

impl TemplatePaths {
    /// Resolve templates, honoring explicit paths verbatim
    ///
    /// Without an explicit Twitter path, `twitter_template.hbs` is tried
    /// first, then each legacy name in order. Without an explicit Bluesky
    /// path, `bluesky_template.hbs` is tried, then the resolved Twitter
    /// template. When nothing exists the preferred name is kept so the
    /// render step reports it as missing.
    pub fn resolve(twitter: Option<PathBuf>, bluesky: Option<PathBuf>, base_dir: &Path) -> Self {
        let twitter = twitter.unwrap_or_else(|| {
            let legacy: Vec<PathBuf> = LEGACY_TWITTER_TEMPLATES
                .iter()
                .map(|name| base_dir.join(name))
                .collect();
            first_existing(&base_dir.join(TWITTER_TEMPLATE), &legacy)
        });
        let bluesky = bluesky.unwrap_or_else(|| {
            first_existing(&base_dir.join(BLUESKY_TEMPLATE), std::slice::from_ref(&twitter))
        });
        Self { twitter, bluesky }
    }

    pub fn for_platform(&self, platform: Platform) -> &Path {
        match platform {
            Platform::Twitter => &self.twitter,
            Platform::Bluesky => &self.bluesky,
        }
    }
}

/// First path in `preferred, fallbacks...` that exists, else `preferred`
pub fn first_existing(preferred: &Path, fallbacks: &[PathBuf]) -> PathBuf {
    std::iter::once(preferred)
        .chain(fallbacks.iter().map(PathBuf::as_path))
        .find(|p| p.exists())
        .unwrap_or(preferred)
        .to_path_buf()
}

handlebars_helper!(fit_tags_helper: |base: str, tags: str, max_len: u64| {
    fit_tags(base, tags, usize::try_from(max_len).unwrap_or(usize::MAX))
});

/// Keep as many leading hashtags as fit after `base` within `max_len`
pub fn fit_tags(base: &str, tags: &str, max_len: usize) -> String {
    let tags = tags.trim();
    if tags.is_empty() {
        return String::new();
    }
    let joined_len = |t: &str| base.chars().count() + 2 + t.chars().count();
    if joined_len(tags) <= max_len {
        return tags.to_string();
    }

    let mut kept: Vec<&str> = Vec::new();
    for tag in tags.split_whitespace().filter(|t| t.starts_with('#')) {
        kept.push(tag);
        if joined_len(&kept.join(" ")) > max_len {
            kept.pop();
            break;
        }
    }
    kept.join(" ")
}

pub struct CaptionRenderer {
    ellipsis: String,
}

impl Default for CaptionRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_ELLIPSIS)
    }
}

impl CaptionRenderer {
    pub fn new(ellipsis: impl Into<String>) -> Self {
        Self {
            ellipsis: ellipsis.into(),
        }
    }

    /// Render the template at `template_path` and fit it to `context.max_len`
    ///
    /// # Errors
    ///
    /// Returns `TemplateError` if the template is missing, fails to compile,
    /// or references a placeholder the context does not define.
    pub fn render(&self, template_path: &Path, context: &RenderContext) -> Result<String> {
        if !template_path.exists() {
            return Err(TemplateError::NotFound(template_path.to_path_buf()).into());
        }
        let source = std::fs::read_to_string(template_path).map_err(|source| TemplateError::Read {
            path: template_path.to_path_buf(),
            source,
        })?;

        let rendered = self.render_str(&source, context).map_err(|e| match e {
            RenderFailure::Compile(reason) => TemplateError::Compile {
                path: template_path.to_path_buf(),
                reason,
            },
            RenderFailure::Render(reason) => TemplateError::Render {
                path: template_path.to_path_buf(),
                reason,
            },
        })?;

        let caption = truncate_caption(&rendered, context.max_len, &self.ellipsis);
        if caption.len() != rendered.len() {
            tracing::info!(
                "Caption for {} truncated from {} to {} characters",
                context.platform,
                rendered.chars().count(),
                caption.chars().count()
            );
        }
        Ok(caption)
    }

    fn render_str(&self, source: &str, context: &RenderContext) -> std::result::Result<String, RenderFailure> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(no_escape);
        registry.register_helper("fit_tags", Box::new(fit_tags_helper));
        registry
            .register_template_string("caption", source)
            .map_err(|e| RenderFailure::Compile(e.to_string()))?;
        let rendered = registry
            .render("caption", context)
            .map_err(|e| RenderFailure::Render(e.to_string()))?;
        Ok(rendered.trim().to_string())
    }
}

enum RenderFailure {
    Compile(String),
    Render(String),
}

/// Shorten `text` to at most `limit` characters, ending on a word boundary
///
/// Text within the limit is returned unchanged. Otherwise the longest
/// prefix of whole whitespace-separated words that leaves room for `marker`
/// is kept. When the last kept word holds a link, a space separates it from
/// the marker so the link still ends where it did. A single leading word
/// longer than the budget is hard-cut unless it holds a link, in which case
/// only the marker remains.
pub fn truncate_caption(text: &str, limit: usize, marker: &str) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }

    let marker_len = marker.chars().count();
    if marker_len >= limit {
        return marker.chars().take(limit).collect();
    }
    let marker_is_spaced = marker.starts_with(char::is_whitespace);

    // (end byte of the kept prefix, whether the marker needs a leading space)
    let mut kept: Option<(usize, bool)> = None;
    let mut word_start: Option<usize> = None;
    let mut chars_seen = 0;
    let mut iter = text.char_indices().peekable();
    while let Some((idx, c)) = iter.next() {
        chars_seen += 1;
        if chars_seen + marker_len > limit {
            break;
        }
        if c.is_whitespace() {
            continue;
        }
        let start = *word_start.get_or_insert(idx);
        if iter.peek().is_some_and(|&(_, next)| !next.is_whitespace()) {
            continue;
        }
        word_start = None;

        let end = idx + c.len_utf8();
        let spaced = !marker_is_spaced && is_link(&text[start..end]);
        if chars_seen + usize::from(spaced) + marker_len <= limit {
            kept = Some((end, spaced));
        }
    }

    match kept {
        Some((end, true)) => format!("{} {}", &text[..end], marker),
        Some((end, false)) => format!("{}{}", &text[..end], marker),
        None => {
            let first_word = text.split_whitespace().next().unwrap_or_default();
            if is_link(first_word) {
                marker.to_string()
            } else {
                let head: String = first_word.chars().take(limit - marker_len).collect();
                format!("{}{}", head, marker)
            }
        }
    }
}

/// A word the link facet scanner would pick up, punctuation-wrapped or not
fn is_link(token: &str) -> bool {
    token.contains("http://") || token.contains("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ThrowbackError;
    use tempfile::TempDir;

    fn sample_set() -> ThrowbackSet {
        ThrowbackSet {
            name: "Autumn Lake".into(),
            images: vec!["lake1.jpg".into(), "lake2.jpg".into()],
            description: Some("Misty morning".into()),
            set_url: Some("https://example.com/sets/autumn-lake".into()),
            date_published: Some("2019-10-04T08:00:00+00:00".into()),
            tags: Some("#throwback #lake-life #autumn".into()),
        }
    }

    fn write_template(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_render_substitutes_fields() {
        let dir = TempDir::new().unwrap();
        let path = write_template(
            &dir,
            "t.hbs",
            "Throwback: {{set_name}} ({{published}})\n{{set_url}}\n\n{{tags}}\n",
        );
        let context = RenderContext::new(&sample_set(), Platform::Twitter, 280);

        let caption = CaptionRenderer::default().render(&path, &context).unwrap();
        assert_eq!(
            caption,
            "Throwback: Autumn Lake (Oct 04, 2019)\nhttps://example.com/sets/autumn-lake\n\n#throwback #lakelife #autumn"
        );
    }

    #[test]
    fn test_render_does_not_html_escape() {
        let dir = TempDir::new().unwrap();
        let path = write_template(&dir, "t.hbs", "{{set_name}}");
        let mut set = sample_set();
        set.name = "Fish & Chips <3".into();
        let context = RenderContext::new(&set, Platform::Bluesky, 300);

        let caption = CaptionRenderer::default().render(&path, &context).unwrap();
        assert_eq!(caption, "Fish & Chips <3");
    }

    #[test]
    fn test_render_conditionals_and_loops() {
        let dir = TempDir::new().unwrap();
        let path = write_template(
            &dir,
            "t.hbs",
            "{{#if description}}{{description}}. {{/if}}{{image_count}} photos:{{#each images}} {{this}}{{/each}}",
        );
        let context = RenderContext::new(&sample_set(), Platform::Twitter, 280);

        let caption = CaptionRenderer::default().render(&path, &context).unwrap();
        assert_eq!(caption, "Misty morning. 2 photos: lake1.jpg lake2.jpg");
    }

    #[test]
    fn test_undefined_placeholder_is_error() {
        let dir = TempDir::new().unwrap();
        let path = write_template(&dir, "t.hbs", "Hello {{no_such_field}}");
        let context = RenderContext::new(&sample_set(), Platform::Twitter, 280);

        let err = CaptionRenderer::default().render(&path, &context).unwrap_err();
        assert!(matches!(err, ThrowbackError::Template(TemplateError::Render { .. })));
    }

    #[test]
    fn test_missing_template_is_error() {
        let dir = TempDir::new().unwrap();
        let context = RenderContext::new(&sample_set(), Platform::Twitter, 280);
        let err = CaptionRenderer::default()
            .render(&dir.path().join("absent.hbs"), &context)
            .unwrap_err();
        assert!(matches!(err, ThrowbackError::Template(TemplateError::NotFound(_))));
    }

    #[test]
    fn test_fit_tags_helper() {
        let dir = TempDir::new().unwrap();
        let path = write_template(
            &dir,
            "t.hbs",
            "{{set_name}}\n\n{{fit_tags set_name tags 24}}",
        );
        let context = RenderContext::new(&sample_set(), Platform::Twitter, 280);

        let caption = CaptionRenderer::default().render(&path, &context).unwrap();
        // "Autumn Lake" (11) + 2 + "#throwback" (10) = 23
        assert_eq!(caption, "Autumn Lake\n\n#throwback");
    }

    #[test]
    fn test_fit_tags_keeps_all_when_they_fit() {
        assert_eq!(fit_tags("base", "#a #b", 100), "#a #b");
        assert_eq!(fit_tags("base", "   ", 100), "");
        assert_eq!(fit_tags("base", "#aaaa #b", 8), "");
    }

    #[test]
    fn test_truncate_within_limit_unchanged() {
        assert_eq!(truncate_caption("short text", 280, "…"), "short text");
    }

    #[test]
    fn test_truncate_at_word_boundary() {
        let text = "one two three four five";
        let out = truncate_caption(text, 12, "…");
        assert_eq!(out, "one two…");
        assert!(out.chars().count() <= 12);
    }

    #[test]
    fn test_truncate_never_splits_url() {
        let text = "Look back at this set https://example.com/a/very/long/path/to/the/gallery today";
        for limit in 20..text.chars().count() {
            let out = truncate_caption(text, limit, "…");
            assert!(out.chars().count() <= limit, "limit {}: {}", limit, out);
            if out.contains("https://") {
                assert!(out.contains("https://example.com/a/very/long/path/to/the/gallery"));
            }
            let body = out.trim_end_matches('…').trim_end();
            assert!(text.starts_with(body));
            let next = text[body.len()..].chars().next();
            assert!(next.map_or(true, char::is_whitespace), "cut mid-word at {}: {}", limit, out);
        }
    }

    #[test]
    fn test_truncate_counts_characters_not_bytes() {
        let text = "café café café café";
        let out = truncate_caption(text, 10, "…");
        assert_eq!(out, "café café…");
    }

    #[test]
    fn test_truncate_custom_marker() {
        assert_eq!(truncate_caption("alpha beta gamma", 14, " [...]"), "alpha [...]");
    }

    #[test]
    fn test_truncate_leading_link_dropped() {
        assert_eq!(truncate_caption("https://example.com/abcdefghij", 10, "…"), "…");
        assert_eq!(truncate_caption("abcdefghijklmnop", 6, "…"), "abcde…");
    }

    #[test]
    fn test_truncate_wrapped_leading_link_dropped() {
        let text = "(https://example.com/a/very/long/path/to/the/gallery) more words";
        assert_eq!(truncate_caption(text, 20, "…"), "…");
        assert_eq!(truncate_caption("link:https://example.com/abcdefghij", 12, "…"), "…");
    }

    #[test]
    fn test_truncate_spaces_marker_after_link() {
        let text = "Throwback to Autumn Lake https://example.com/sets/autumn-lake #throwback #lake";

        let out = truncate_caption(text, 63, "…");
        assert_eq!(out, "Throwback to Autumn Lake https://example.com/sets/autumn-lake …");
        assert_eq!(out.chars().count(), 63);

        // One character short of room for the separator: the link goes
        let out = truncate_caption(text, 62, "…");
        assert_eq!(out, "Throwback to Autumn Lake…");

        // A marker that already starts with a space needs no extra separator
        let out = truncate_caption(text, 67, " [...]");
        assert_eq!(out, "Throwback to Autumn Lake https://example.com/sets/autumn-lake [...]");
    }

    #[test]
    fn test_render_truncates_to_platform_limit() {
        let dir = TempDir::new().unwrap();
        let path = write_template(&dir, "t.hbs", "{{description}} {{set_url}}");
        let mut set = sample_set();
        set.description = Some("word ".repeat(80));
        let context = RenderContext::new(&set, Platform::Twitter, 280);

        let caption = CaptionRenderer::default().render(&path, &context).unwrap();
        assert!(caption.chars().count() <= 280);
        assert!(caption.ends_with("word…"));
        assert!(!caption.contains("https://"));
    }

    #[test]
    fn test_format_publish_date_variants() {
        assert_eq!(format_publish_date("2019-03-04T10:00:00+00:00"), "Mar 04, 2019");
        assert_eq!(format_publish_date("2019-03-04T10:00:00"), "Mar 04, 2019");
        assert_eq!(format_publish_date("2019-03-04"), "Mar 04, 2019");
        assert_eq!(format_publish_date("sometime"), "sometime");
        assert_eq!(format_publish_date(""), "");
    }

    #[test]
    fn test_template_resolution_prefers_new_name() {
        let dir = TempDir::new().unwrap();
        write_template(&dir, "twitter_template.hbs", "x");
        write_template(&dir, "tweet_template.hbs", "x");

        let paths = TemplatePaths::resolve(None, None, dir.path());
        assert_eq!(paths.twitter, dir.path().join("twitter_template.hbs"));
        assert_eq!(paths.bluesky, dir.path().join("twitter_template.hbs"));
    }

    #[test]
    fn test_template_resolution_legacy_order() {
        let dir = TempDir::new().unwrap();
        write_template(&dir, "tweet_template.hbs", "x");
        write_template(&dir, "post_template.hbs", "x");
        write_template(&dir, "bluesky_template.hbs", "x");

        let paths = TemplatePaths::resolve(None, None, dir.path());
        assert_eq!(paths.twitter, dir.path().join("post_template.hbs"));
        assert_eq!(paths.bluesky, dir.path().join("bluesky_template.hbs"));
    }

    #[test]
    fn test_template_resolution_explicit_wins() {
        let dir = TempDir::new().unwrap();
        write_template(&dir, "twitter_template.hbs", "x");
        let explicit = dir.path().join("custom.hbs");

        let paths = TemplatePaths::resolve(Some(explicit.clone()), None, dir.path());
        assert_eq!(paths.twitter, explicit);
        assert_eq!(paths.for_platform(Platform::Twitter), explicit.as_path());
    }
}

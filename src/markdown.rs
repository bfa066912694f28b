//! Markdown to HTML conversion, the first stage of rendering. Besides the
//! plain conversion this stage rewrites in-site links: a document that
//! links to `other-post.md` gets a link to that document's rendered page
//! instead, wherever its output path happens to live.

use crate::site::Site;
use pulldown_cmark::{html, CowStr, Event, LinkType, Options, Parser, Tag};
use std::collections::BTreeMap;
use std::path::Path;
use url::Url;

/// Converts a Markdown body into HTML, appending onto `out`.
pub fn to_html(out: &mut String, markdown: &str, links: &LinkConverter) {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);

    html::push_html(
        out,
        Parser::new_ext(markdown, options).map(|event| convert_event(event, links)),
    );
}

fn convert_event<'e>(event: Event<'e>, links: &LinkConverter) -> Event<'e> {
    match event {
        Event::Start(tag) => Event::Start(convert_tag(tag, links)),
        _ => event,
    }
}

fn convert_tag<'e>(tag: Tag<'e>, links: &LinkConverter) -> Tag<'e> {
    match tag {
        // The headings in the body need to be demoted twice to be
        // subordinate to both the site title (h1) and the page title (h2),
        // so `#` becomes h3 instead of h1.
        Tag::Heading(level) => Tag::Heading(level + 2),

        Tag::Link(kind, target, title) if kind != LinkType::Email => Tag::Link(
            kind,
            CowStr::Boxed(links.convert(&target).into_boxed_str()),
            title,
        ),
        other => other,
    }
}

/// Rewrites links between source documents into links between their
/// rendered pages. Built from the site graph, so it knows every document's
/// page URL keyed by source path.
pub struct LinkConverter<'a> {
    targets: &'a BTreeMap<String, Url>,

    /// The source directory of the document being converted, relative to
    /// the source root; relative links resolve against it.
    base: String,
}

impl<'a> LinkConverter<'a> {
    pub fn new(targets: &'a BTreeMap<String, Url>, source_path: &Path) -> LinkConverter<'a> {
        LinkConverter {
            targets,
            base: source_path
                .parent()
                .map(|parent| parent.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default(),
        }
    }

    /// Converts one link target. Absolute URLs, fragments, and links that
    /// don't point at a Markdown source pass through untouched; a relative
    /// link to a known source document becomes that document's page URL,
    /// fragment included.
    pub fn convert(&self, target: &str) -> String {
        if Url::parse(target).is_ok() || target.starts_with('/') || target.starts_with('#') {
            return target.to_owned();
        }
        let (path, fragment) = match target.split_once('#') {
            Some((path, fragment)) => (path, Some(fragment)),
            None => (target, None),
        };
        if !path.ends_with(".md") {
            return target.to_owned();
        }
        match self
            .resolve(path)
            .and_then(|resolved| self.targets.get(&resolved))
        {
            Some(url) => match fragment {
                Some(fragment) => format!("{}#{}", url, fragment),
                None => url.to_string(),
            },
            None => target.to_owned(),
        }
    }

    // Resolves a relative link against the document's source directory,
    // collapsing `.` and `..` segments. A link that escapes the source
    // root resolves to nothing.
    fn resolve(&self, target: &str) -> Option<String> {
        let mut segments: Vec<&str> = self
            .base
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();
        for segment in target.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop()?;
                }
                segment => segments.push(segment),
            }
        }
        Some(segments.join("/"))
    }
}

/// Builds the link-conversion table for a site: source path to page URL.
pub fn link_targets(site: &Site) -> BTreeMap<String, Url> {
    site.documents
        .iter()
        .map(|document| {
            (
                document.source_path.to_string_lossy().replace('\\', "/"),
                document.url.clone(),
            )
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn targets() -> BTreeMap<String, Url> {
        let mut targets = BTreeMap::new();
        targets.insert(
            "relative.md".to_owned(),
            Url::parse("https://example.org/posts/2021-01-01/relative.html").unwrap(),
        );
        targets.insert(
            "nested/inner.md".to_owned(),
            Url::parse("https://example.org/nested/inner.html").unwrap(),
        );
        targets
    }

    fn fixture(source: &str, target: &str, wanted: &str) {
        let targets = targets();
        let converter = LinkConverter::new(&targets, Path::new(source));
        assert_eq!(converter.convert(target), wanted);
    }

    #[test]
    fn test_convert_relative_link() {
        fixture(
            "index.md",
            "relative.md",
            "https://example.org/posts/2021-01-01/relative.html",
        );
    }

    #[test]
    fn test_convert_relative_link_leading_dotslash() {
        fixture(
            "index.md",
            "./relative.md",
            "https://example.org/posts/2021-01-01/relative.html",
        );
    }

    #[test]
    fn test_convert_sibling_link() {
        fixture(
            "nested/other.md",
            "inner.md",
            "https://example.org/nested/inner.html",
        );
    }

    #[test]
    fn test_convert_parent_link() {
        fixture(
            "nested/other.md",
            "../relative.md",
            "https://example.org/posts/2021-01-01/relative.html",
        );
    }

    #[test]
    fn test_fragment_preserved() {
        fixture(
            "index.md",
            "relative.md#section",
            "https://example.org/posts/2021-01-01/relative.html#section",
        );
    }

    #[test]
    fn test_unknown_markdown_target_untouched() {
        fixture("index.md", "missing.md", "missing.md");
    }

    #[test]
    fn test_absolute_url_untouched() {
        fixture(
            "index.md",
            "https://remote.org/absolute.md",
            "https://remote.org/absolute.md",
        );
    }

    #[test]
    fn test_asset_link_untouched() {
        fixture("index.md", "image.jpg", "image.jpg");
    }

    #[test]
    fn test_escaping_the_source_root_untouched() {
        fixture("index.md", "../outside.md", "../outside.md");
    }

    #[test]
    fn test_headings_demoted() {
        let targets = BTreeMap::new();
        let converter = LinkConverter::new(&targets, Path::new("a.md"));
        let mut out = String::new();
        to_html(&mut out, "# Title", &converter);
        assert_eq!(out.trim(), "<h3>Title</h3>");
    }

    #[test]
    fn test_markdown_link_rewritten_in_body() {
        let targets = targets();
        let converter = LinkConverter::new(&targets, Path::new("index.md"));
        let mut out = String::new();
        to_html(&mut out, "[link](relative.md)", &converter);
        assert!(out.contains(
            r#"<a href="https://example.org/posts/2021-01-01/relative.html">"#
        ));
    }
}

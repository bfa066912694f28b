//! The rendering phase: turns the read-only site graph into finished pages.
//! Rendering is a two-stage transform. Stage one converts every document's
//! Markdown body to HTML ([`render_bodies`], data-parallel across
//! documents). Stage two applies the templates: each document renders
//! through the post template with its metadata fields, rendered body, and
//! cross-references as the template context, and the default collection and
//! every tag render through the index template as paginated listings.
//!
//! Template placeholders resolve against the document's metadata fields
//! plus the fields the renderer itself provides (`body`, `url`, `tags`,
//! `prev`, `next`, `site`). A template that references a placeholder
//! defined by neither is a contract violation: the run fails with
//! [`Error::UndefinedPlaceholder`] instead of publishing a page with a
//! silently empty slot. Templates are checked against the context before
//! execution, and any residual engine failure is reported the same way.

use crate::config::Config;
use crate::document::Document;
use crate::markdown::{self, LinkConverter};
use crate::site::Site;
use gtmpl::Value;
use rayon::prelude::*;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use url::Url;

/// The marker separating a post's above-the-fold summary from the rest of
/// its body.
const FOLD_TAG: &str = "<!-- more -->";

/// Fields the renderer guarantees on the objects it nests into a context
/// (tag entries, `prev`/`next` references, index items), so placeholder
/// checking accepts them even when the current page happens to nest no
/// such object.
const NESTED_FIELDS: &[&str] = &["name", "url", "title", "date", "summary", "summarized", "tags"];

/// A finished page: output bytes keyed by the destination-relative path.
#[derive(Debug)]
pub struct RenderedPage {
    pub output_path: PathBuf,
    pub contents: Vec<u8>,
}

/// A parsed template plus its source text, kept for placeholder checking.
pub struct Template {
    name: String,
    source: String,
    inner: gtmpl::Template,
}

impl Template {
    /// Loads and parses a template file.
    pub fn load(path: &Path) -> Result<Template> {
        let source = fs::read_to_string(path).map_err(|err| Error::OpenTemplate {
            path: path.to_owned(),
            err,
        })?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Template::parse(&name, source)
    }

    pub fn parse(name: &str, source: String) -> Result<Template> {
        let mut inner = gtmpl::Template::default();
        inner.parse(source.as_str()).map_err(|err| Error::ParseTemplate {
            template: name.to_owned(),
            err,
        })?;
        Ok(Template {
            name: name.to_owned(),
            source,
            inner,
        })
    }

    /// Checks that every field referenced by the template's actions is in
    /// the given vocabulary.
    fn check_placeholders(&self, names: &BTreeSet<String>) -> Result<()> {
        // The patterns are literals, so compiling them can't fail.
        static ACTIONS: OnceLock<Regex> = OnceLock::new();
        static FIELDS: OnceLock<Regex> = OnceLock::new();
        let actions = ACTIONS.get_or_init(|| Regex::new(r"(?s)\{\{.*?\}\}").unwrap());
        let fields = FIELDS.get_or_init(|| {
            Regex::new(r"\.([A-Za-z_][A-Za-z0-9_]*)").unwrap()
        });

        for action in actions.find_iter(&self.source) {
            for capture in fields.captures_iter(action.as_str()) {
                let placeholder = &capture[1];
                if !names.contains(placeholder) {
                    return Err(Error::UndefinedPlaceholder {
                        template: self.name.clone(),
                        placeholder: placeholder.to_owned(),
                    });
                }
            }
        }
        Ok(())
    }

    fn execute(&self, context: Value) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.inner
            .execute(
                &mut out,
                // from() only fails for values with no template
                // representation; `context` is already a template value
                &gtmpl::Context::from(context).unwrap(),
            )
            .map_err(|err| Error::Execute {
                template: self.name.clone(),
                err,
            })?;
        Ok(out)
    }
}

/// Converts every document's Markdown body to HTML, in document order.
/// This is the expensive half of rendering and parallelizes across
/// documents; the site graph is read-only throughout.
pub fn render_bodies(site: &Site) -> Vec<String> {
    let targets = markdown::link_targets(site);
    site.documents
        .par_iter()
        .map(|document| {
            let links = LinkConverter::new(&targets, &document.source_path);
            let mut body = String::new();
            markdown::to_html(&mut body, &document.body, &links);
            body
        })
        .collect()
}

/// Splits a rendered body into its above-the-fold summary and whether
/// anything was folded away.
pub fn summary(body: &str) -> (&str, bool) {
    match body.find(FOLD_TAG) {
        Some(index) => (&body[..index], true),
        None => (body, false),
    }
}

/// Renders every page of the site: one page per document plus the
/// paginated collection and tag listings.
pub struct Renderer<'a> {
    pub site: &'a Site,
    pub config: &'a Config,

    /// Rendered HTML bodies, indexed like [`Site::documents`].
    pub bodies: &'a [String],

    pub post_template: &'a Template,
    pub index_template: &'a Template,
}

impl Renderer<'_> {
    pub fn render_site(&self) -> Result<Vec<RenderedPage>> {
        let mut pages = self.post_pages()?;
        pages.extend(self.collection_pages(None, &self.site.posts.entries)?);
        for (tag, entries) in &self.site.tags {
            pages.extend(self.collection_pages(Some(tag), entries)?);
        }
        Ok(pages)
    }

    fn post_pages(&self) -> Result<Vec<RenderedPage>> {
        self.site
            .posts
            .entries
            .iter()
            .enumerate()
            .map(|(position, &index)| {
                let document = self.site.document(index);
                let contents =
                    self.render_page(self.post_template, self.post_context(position, index))?;
                Ok(RenderedPage {
                    output_path: document.output_path.clone(),
                    contents,
                })
            })
            .collect()
    }

    fn render_page(&self, template: &Template, context: Value) -> Result<Vec<u8>> {
        let mut names: BTreeSet<String> =
            NESTED_FIELDS.iter().map(|name| (*name).to_owned()).collect();
        collect_names(&context, &mut names);
        template.check_placeholders(&names)?;
        template.execute(context)
    }

    // The post context is flat: metadata fields at the top level, with the
    // renderer's own fields written over them. `prev` and `next` are the
    // neighbors in the default collection, looked up by position.
    fn post_context(&self, position: usize, index: usize) -> Value {
        let document = self.site.document(index);
        let mut context: HashMap<String, Value> = document
            .metadata
            .iter()
            .map(|(key, value)| (key.to_owned(), yaml_value(value)))
            .collect();
        context.insert("title".to_owned(), Value::String(document.title().to_owned()));
        context.insert(
            "body".to_owned(),
            Value::String(self.bodies[index].clone()),
        );
        context.insert("url".to_owned(), Value::String(document.url.to_string()));
        context.insert("tags".to_owned(), self.tags_value(document));
        context.insert("prev".to_owned(), self.neighbor(position.checked_sub(1)));
        context.insert(
            "next".to_owned(),
            self.neighbor(match position + 1 < self.site.posts.entries.len() {
                true => Some(position + 1),
                false => None,
            }),
        );
        context.insert("site".to_owned(), self.site_value());
        Value::Object(context)
    }

    fn neighbor(&self, position: Option<usize>) -> Value {
        match position.map(|position| self.site.posts.entries[position]) {
            None => Value::Nil,
            Some(index) => {
                let document = self.site.document(index);
                let mut object: HashMap<String, Value> = HashMap::new();
                object.insert(
                    "title".to_owned(),
                    Value::String(document.title().to_owned()),
                );
                object.insert("url".to_owned(), Value::String(document.url.to_string()));
                Value::Object(object)
            }
        }
    }

    fn site_value(&self) -> Value {
        let mut object: HashMap<String, Value> = HashMap::new();
        object.insert("title".to_owned(), Value::String(self.config.title.clone()));
        object.insert(
            "url".to_owned(),
            Value::String(self.config.site_root.to_string()),
        );
        object.insert(
            "feed".to_owned(),
            Value::String(self.page_url("feed.atom").to_string()),
        );
        Value::Object(object)
    }

    fn tags_value(&self, document: &Document) -> Value {
        Value::Array(
            document
                .metadata
                .tags()
                .into_iter()
                .map(|tag| {
                    let tag = slug::slugify(tag);
                    let mut object: HashMap<String, Value> = HashMap::new();
                    object.insert(
                        "url".to_owned(),
                        Value::String(
                            self.page_url(&format!("tags/{}/index.html", tag)).to_string(),
                        ),
                    );
                    object.insert("name".to_owned(), Value::String(tag));
                    Value::Object(object)
                })
                .collect(),
        )
    }

    fn summary_value(&self, index: usize) -> Value {
        let document = self.site.document(index);
        let (summary, summarized) = summary(&self.bodies[index]);
        let mut object: HashMap<String, Value> = HashMap::new();
        object.insert(
            "title".to_owned(),
            Value::String(document.title().to_owned()),
        );
        object.insert(
            "date".to_owned(),
            match document.date() {
                Some(date) => Value::String(date.to_owned()),
                None => Value::Nil,
            },
        );
        object.insert("url".to_owned(), Value::String(document.url.to_string()));
        object.insert("summary".to_owned(), Value::String(summary.to_owned()));
        object.insert("summarized".to_owned(), Value::Bool(summarized));
        object.insert("tags".to_owned(), self.tags_value(document));
        Value::Object(object)
    }

    // Index pages for one listing: the default collection (`tag` is None)
    // or a single tag. Pagination follows the `index.html`, `1.html`,
    // `2.html`, ... naming, with the numbered pages of the default
    // collection kept under `page/` so the destination root stays tidy.
    fn collection_pages(
        &self,
        tag: Option<&str>,
        entries: &[usize],
    ) -> Result<Vec<RenderedPage>> {
        let chunks: Vec<&[usize]> = match entries.is_empty() {
            // an empty site still gets its (empty) front page
            true => vec![&[]],
            false => entries.chunks(self.config.index_page_size).collect(),
        };
        let total = chunks.len();

        chunks
            .iter()
            .enumerate()
            .map(|(number, chunk)| {
                let mut context: HashMap<String, Value> = HashMap::new();
                context.insert(
                    "item".to_owned(),
                    Value::Array(
                        chunk
                            .iter()
                            .map(|&index| self.summary_value(index))
                            .collect(),
                    ),
                );
                context.insert(
                    "tag".to_owned(),
                    match tag {
                        Some(tag) => Value::String(tag.to_owned()),
                        None => Value::Nil,
                    },
                );
                context.insert(
                    "prev".to_owned(),
                    match number {
                        0 => Value::Nil,
                        number => Value::String(
                            self.index_url(tag, number - 1).to_string(),
                        ),
                    },
                );
                context.insert(
                    "next".to_owned(),
                    match number + 1 < total {
                        true => Value::String(
                            self.index_url(tag, number + 1).to_string(),
                        ),
                        false => Value::Nil,
                    },
                );
                context.insert("site".to_owned(), self.site_value());

                let contents =
                    self.render_page(self.index_template, Value::Object(context))?;
                Ok(RenderedPage {
                    output_path: index_path(tag, number),
                    contents,
                })
            })
            .collect()
    }

    fn index_url(&self, tag: Option<&str>, number: usize) -> Url {
        self.page_url(&url_path(&index_path(tag, number)))
    }

    fn page_url(&self, relative: &str) -> Url {
        // can't fail: the site root is absolute and `relative` is a
        // well-formed relative path
        self.config.site_root.join(relative).unwrap()
    }
}

fn index_path(tag: Option<&str>, number: usize) -> PathBuf {
    match (tag, number) {
        (None, 0) => PathBuf::from("index.html"),
        (None, number) => PathBuf::from("page").join(format!("{}.html", number)),
        (Some(tag), 0) => PathBuf::from("tags").join(tag).join("index.html"),
        (Some(tag), number) => {
            PathBuf::from("tags").join(tag).join(format!("{}.html", number))
        }
    }
}

fn url_path(path: &Path) -> String {
    path.iter()
        .map(|component| component.to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

// Converts a front-matter value into a template value. Scalars map to
// their template counterparts; nested mappings keep only string keys,
// which is all a template can address anyway.
fn yaml_value(value: &serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Nil,
        serde_yaml::Value::Bool(value) => Value::Bool(*value),
        serde_yaml::Value::Number(number) => match number.as_i64() {
            Some(number) => Value::from(number),
            None => match number.as_f64() {
                Some(number) => Value::from(number),
                None => Value::Nil,
            },
        },
        serde_yaml::Value::String(value) => Value::String(value.clone()),
        serde_yaml::Value::Sequence(values) => {
            Value::Array(values.iter().map(yaml_value).collect())
        }
        serde_yaml::Value::Mapping(mapping) => Value::Object(
            mapping
                .iter()
                .filter_map(|(key, value)| {
                    key.as_str().map(|key| (key.to_owned(), yaml_value(value)))
                })
                .collect(),
        ),
    }
}

fn collect_names(value: &Value, names: &mut BTreeSet<String>) {
    match value {
        Value::Object(object) => {
            for (key, value) in object {
                names.insert(key.clone());
                collect_names(value, names);
            }
        }
        Value::Array(values) => {
            for value in values {
                collect_names(value, names);
            }
        }
        _ => {}
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Represents a rendering error. Every variant is fatal for the run:
/// publishing a page with a broken template contract is worse than
/// failing loudly.
#[derive(Debug)]
pub enum Error {
    /// Returned for I/O problems while opening a template file.
    OpenTemplate { path: PathBuf, err: io::Error },

    /// Returned for errors parsing a template file.
    ParseTemplate { template: String, err: String },

    /// Returned when a template references a placeholder that the page
    /// context doesn't define.
    UndefinedPlaceholder { template: String, placeholder: String },

    /// Returned when template execution fails.
    Execute { template: String, err: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::OpenTemplate { path, err } => {
                write!(f, "opening template file `{}`: {}", path.display(), err)
            }
            Error::ParseTemplate { template, err } => {
                write!(f, "parsing template `{}`: {}", template, err)
            }
            Error::UndefinedPlaceholder {
                template,
                placeholder,
            } => write!(
                f,
                "template `{}` references undefined placeholder `.{}`",
                template, placeholder
            ),
            Error::Execute { template, err } => {
                write!(f, "executing template `{}`: {}", template, err)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::OpenTemplate { path: _, err } => Some(err),
            Error::ParseTemplate { .. } => None,
            Error::UndefinedPlaceholder { .. } => None,
            Error::Execute { .. } => None,
        }
    }
}

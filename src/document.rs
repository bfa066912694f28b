//! Defines the [`Document`] and [`Metadata`] types and the front-matter
//! splitting logic. A document is one content unit: its identity is the
//! source path relative to the source root, and everything else (metadata,
//! raw body, output path, page URL) is derived from the file's contents at
//! load time. Documents are immutable once constructed.
//!
//! Each source file must be structured as follows:
//!
//! 1. Initial front-matter fence (`---`)
//! 2. YAML front-matter, e.g. `title`, `date`, `tags`
//! 3. Terminal front-matter fence (`---`)
//! 4. Markdown body
//!
//! For example:
//!
//! ```md
//! ---
//! title: Hello, world!
//! date: 2021-04-16
//! tags: [greeting]
//! ---
//! # Hello
//!
//! World
//! ```

use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

const FENCE: &str = "---";

/// A document's front-matter: an ordered mapping from string keys to the
/// YAML values exactly as they were parsed. Values are never coerced, so
/// whatever the author wrote is recoverable from the mapping.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metadata(BTreeMap<String, Value>);

impl Metadata {
    /// Parses a YAML front-matter block. An empty block is an empty
    /// mapping, not an error.
    pub fn from_yaml(input: &str) -> Result<Metadata> {
        if input.trim().is_empty() {
            return Ok(Metadata::default());
        }
        Ok(Metadata(serde_yaml::from_str(input)?))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The value for `key` if and only if it is a string.
    pub fn string(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.string("title")
    }

    pub fn date(&self) -> Option<&str> {
        self.string("date")
    }

    /// The document's tags. A scalar `tags` value is treated as a single
    /// tag; a missing field is an empty list.
    pub fn tags(&self) -> Vec<&str> {
        match self.get("tags") {
            Some(Value::Sequence(values)) => {
                values.iter().filter_map(Value::as_str).collect()
            }
            Some(Value::String(value)) => vec![value.as_str()],
            _ => Vec::new(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// One content unit of the site.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    /// The source file path relative to the source root. This is the
    /// document's identity.
    pub source_path: PathBuf,

    /// The parsed front-matter.
    pub metadata: Metadata,

    /// The raw Markdown body (everything after the terminal fence).
    pub body: String,

    /// The output file path relative to the destination root. Unique
    /// across the site; computed from the date and slug when the document
    /// is dated, and from the source path otherwise.
    pub output_path: PathBuf,

    /// The page URL: the site root joined with the output path.
    pub url: Url,
}

impl Document {
    /// Parses a document from the contents of a source file.
    pub fn parse(source_path: &Path, contents: &str, site_root: &Url) -> Result<Document> {
        let (header, body) = split_front_matter(contents)?;
        let metadata = Metadata::from_yaml(header)?;
        let output_path = output_path(source_path, &metadata)?;
        let url = site_root.join(&url_path(&output_path))?;
        Ok(Document {
            source_path: source_path.to_owned(),
            metadata,
            body: body.to_owned(),
            output_path,
            url,
        })
    }

    /// The document title, falling back to the source file stem when the
    /// front-matter has none.
    pub fn title(&self) -> &str {
        match self.metadata.title() {
            Some(title) => title,
            None => file_stem(&self.source_path).unwrap_or(""),
        }
    }

    pub fn date(&self) -> Option<&str> {
        self.metadata.date()
    }
}

/// Splits `input` into its front-matter block and body.
pub fn split_front_matter(input: &str) -> Result<(&str, &str)> {
    if !input.starts_with(FENCE) {
        return Err(Error::MissingStartFence);
    }
    match input[FENCE.len()..].find(FENCE) {
        None => Err(Error::MissingEndFence),
        Some(offset) => Ok((
            &input[FENCE.len()..FENCE.len() + offset],
            &input[FENCE.len() + offset + FENCE.len()..],
        )),
    }
}

// Slug precedence: an explicit `slug` field, then the title, then the
// source file stem.
fn output_path(source_path: &Path, metadata: &Metadata) -> Result<PathBuf> {
    let stem = file_stem(source_path)
        .ok_or_else(|| Error::InvalidFileName(source_path.to_owned()))?;
    let slug = match metadata.string("slug") {
        Some(slug) => slug::slugify(slug),
        None => match metadata.title() {
            Some(title) => slug::slugify(title),
            None => slug::slugify(stem),
        },
    };

    Ok(match metadata.date() {
        Some(date) => PathBuf::from("posts")
            .join(date)
            .join(format!("{}.html", slug)),
        None => source_path.with_extension("html"),
    })
}

fn file_stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|stem| stem.to_str())
}

// Output paths are built from normal components only, so joining them with
// `/` yields the path portion of the page URL on every platform.
fn url_path(path: &Path) -> String {
    path.iter()
        .map(|component| component.to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error parsing a [`Document`].
#[derive(Debug)]
pub enum Error {
    /// Returned when a source file is missing its starting front-matter
    /// fence (`---`).
    MissingStartFence,

    /// Returned when a source file is missing its terminal front-matter
    /// fence (the starting fence was found but the ending one was not).
    MissingEndFence,

    /// Returned when there was an error parsing the front-matter as YAML.
    Yaml(serde_yaml::Error),

    /// Returned when there is a problem building the page URL.
    Url(url::ParseError),

    /// Returned when a source file name isn't valid UTF-8.
    InvalidFileName(PathBuf),

    /// Returned when the source file can't be read.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MissingStartFence => {
                write!(f, "document must begin with `{}`", FENCE)
            }
            Error::MissingEndFence => write!(f, "missing closing `{}`", FENCE),
            Error::Yaml(err) => err.fmt(f),
            Error::Url(err) => err.fmt(f),
            Error::InvalidFileName(path) => {
                write!(f, "invalid file name: `{}`", path.display())
            }
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::MissingStartFence => None,
            Error::MissingEndFence => None,
            Error::Yaml(err) => Some(err),
            Error::Url(err) => Some(err),
            Error::InvalidFileName(_) => None,
            Error::Io(err) => Some(err),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    /// Converts a [`serde_yaml::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator for front-matter deserialization.
    fn from(err: serde_yaml::Error) -> Error {
        Error::Yaml(err)
    }
}

impl From<url::ParseError> for Error {
    /// Converts a [`url::ParseError`] into an [`Error`]. It allows us to
    /// use the `?` operator for URL joining.
    fn from(err: url::ParseError) -> Error {
        Error::Url(err)
    }
}

impl From<std::io::Error> for Error {
    /// Converts a [`std::io::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for fallible I/O functions.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

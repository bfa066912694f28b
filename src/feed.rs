//! Support for creating an Atom feed from the site's default collection.
//! The feed lists dated documents in collection order; documents without a
//! date (standalone pages) are left out. The feed's `updated` element is
//! the newest entry date rather than the wall clock, so re-running the
//! generator over unchanged input reproduces the feed byte for byte.

use crate::config::{Author, Config};
use crate::render::{self, RenderedPage};
use crate::site::Site;
use atom_syndication::{Entry, Error as AtomError, Feed, Link, Person};
use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, ParseError, TimeZone,
};
use std::fmt;
use std::path::PathBuf;

/// The feed's file name under the destination root.
pub const FEED_PATH: &str = "feed.atom";

/// Renders the feed as a page, ready for the writer.
pub fn page(config: &Config, site: &Site, bodies: &[String]) -> Result<RenderedPage> {
    let feed = feed(config, site, bodies)?;
    let mut contents = Vec::new();
    feed.write_to(&mut contents)?;
    Ok(RenderedPage {
        output_path: PathBuf::from(FEED_PATH),
        contents,
    })
}

fn feed(config: &Config, site: &Site, bodies: &[String]) -> Result<Feed> {
    use std::collections::BTreeMap;
    let entries = entries(config, site, bodies)?;
    let updated = entries
        .iter()
        .map(|entry| entry.updated)
        .max()
        .unwrap_or_else(epoch);
    Ok(Feed {
        entries,
        title: config.title.clone().into(),
        id: config.site_root.to_string(),
        updated,
        authors: author_to_people(config.author.clone()),
        categories: Vec::new(),
        contributors: Vec::new(),
        generator: None,
        icon: None,
        logo: None,
        rights: None,
        subtitle: None,
        extensions: BTreeMap::new(),
        namespaces: BTreeMap::new(),
        base: None,
        lang: None,
        links: vec![Link {
            href: config.site_root.to_string(),
            rel: "alternate".to_owned(),
            title: None,
            hreflang: None,
            mime_type: None,
            length: None,
        }],
    })
}

fn entries(config: &Config, site: &Site, bodies: &[String]) -> Result<Vec<Entry>> {
    use std::collections::BTreeMap;
    let mut entries = Vec::new();

    for &index in &site.posts.entries {
        let document = site.document(index);
        let date = match document.date() {
            Some(date) => parse_date(date)?,
            None => continue,
        };
        let (summary, _) = render::summary(&bodies[index]);

        entries.push(Entry {
            id: document.url.to_string(),
            title: document.title().to_owned().into(),
            updated: date,
            authors: author_to_people(config.author.clone()),
            links: vec![Link {
                href: document.url.to_string(),
                rel: "alternate".to_owned(),
                title: None,
                mime_type: None,
                hreflang: None,
                length: None,
            }],
            rights: None,
            summary: Some(summary.to_owned().into()),
            categories: Vec::new(),
            contributors: Vec::new(),
            published: Some(date),
            source: None,
            content: None,
            extensions: BTreeMap::new(),
        })
    }
    Ok(entries)
}

// Dates in front-matter carry no time or zone, so entries are stamped at
// midnight UTC.
fn parse_date(date: &str) -> std::result::Result<DateTime<FixedOffset>, ParseError> {
    let naive_date = NaiveDate::parse_from_str(date, "%Y-%m-%d")?;
    let naive_date_time = NaiveDateTime::new(naive_date, NaiveTime::from_hms(0, 0, 0));
    Ok(FixedOffset::east(0).from_utc_datetime(&naive_date_time))
}

fn epoch() -> DateTime<FixedOffset> {
    FixedOffset::east(0).from_utc_datetime(&NaiveDateTime::new(
        NaiveDate::from_ymd(1970, 1, 1),
        NaiveTime::from_hms(0, 0, 0),
    ))
}

fn author_to_people(author: Option<Author>) -> Vec<Person> {
    match author {
        Some(author) => vec![Person {
            name: author.name,
            email: author.email,
            uri: None,
        }],
        None => Vec::new(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem creating the feed.
#[derive(Debug)]
pub enum Error {
    /// Returned when there is an Atom-related error.
    Atom(AtomError),

    /// Returned when a document's date doesn't parse as `YYYY-MM-DD`.
    DateTimeParse(ParseError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Atom(err) => err.fmt(f),
            Error::DateTimeParse(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Atom(err) => Some(err),
            Error::DateTimeParse(err) => Some(err),
        }
    }
}

impl From<AtomError> for Error {
    /// Converts [`AtomError`]s into [`Error`]. This allows us to use the
    /// `?` operator in fallible feed operations.
    fn from(err: AtomError) -> Error {
        Error::Atom(err)
    }
}

impl From<ParseError> for Error {
    /// Converts [`ParseError`]s into [`Error`]. This allows us to use the
    /// `?` operator in fallible feed operations.
    fn from(err: ParseError) -> Error {
        Error::DateTimeParse(err)
    }
}

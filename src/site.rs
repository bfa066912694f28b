//! The site graph: the aggregate that owns all loaded documents and the
//! structures derived from them. A [`Site`] is built once per generation
//! run, after loading completes, and is read-only afterwards; the renderer
//! and writer borrow it. Collections and the tag index are never mutated in
//! place; they are recomputed from the documents on every run.

use crate::config::SortKey;
use crate::document::Document;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// A named, ordered sequence of document references (indices into
/// [`Site::documents`]).
#[derive(Debug)]
pub struct Collection {
    pub name: String,
    pub entries: Vec<usize>,
}

/// The aggregate root for one generation run.
pub struct Site {
    pub documents: Vec<Document>,

    /// The default collection over all documents, ordered by the
    /// configured sort key.
    pub posts: Collection,

    /// Tag slug to the documents carrying that tag, in collection order.
    pub tags: BTreeMap<String, Vec<usize>>,
}

impl Site {
    /// Builds the site graph from the complete set of loaded documents.
    pub fn build(documents: Vec<Document>, sort: SortKey) -> Site {
        let mut entries: Vec<usize> = (0..documents.len()).collect();
        entries.sort_by(|&a, &b| order(&documents[a], &documents[b], sort));
        let tags = tag_index(&documents, &entries);
        Site {
            documents,
            posts: Collection {
                name: "posts".to_owned(),
                entries,
            },
            tags,
        }
    }

    pub fn document(&self, index: usize) -> &Document {
        &self.documents[index]
    }

    /// The position of a document within the default collection.
    pub fn position(&self, index: usize) -> Option<usize> {
        self.posts.entries.iter().position(|&entry| entry == index)
    }
}

// The ordering is total: the date comparison is refined by the source path
// so that documents sharing a date (or missing one) still sort
// reproducibly. A missing date compares as the empty string, which puts
// undated documents after dated ones under `DateDesc` and before them
// under `DateAsc`.
fn order(a: &Document, b: &Document, sort: SortKey) -> Ordering {
    let primary = match sort {
        SortKey::DateDesc => b.date().unwrap_or("").cmp(a.date().unwrap_or("")),
        SortKey::DateAsc => a.date().unwrap_or("").cmp(b.date().unwrap_or("")),
        SortKey::Path => Ordering::Equal,
    };
    primary.then_with(|| a.source_path.cmp(&b.source_path))
}

// Tags are slugified so that casing variants (`macOS`, `MacOS`) collapse
// into one index entry, and deduplicated per document so a repeated tag
// doesn't list its document twice.
fn tag_index(documents: &[Document], entries: &[usize]) -> BTreeMap<String, Vec<usize>> {
    let mut tags: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for &index in entries {
        let mut seen = BTreeSet::new();
        for tag in documents[index].metadata.tags() {
            let tag = slug::slugify(tag);
            if seen.insert(tag.clone()) {
                tags.entry(tag).or_default().push(index);
            }
        }
    }
    tags
}

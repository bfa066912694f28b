//! Discovers and parses documents from the source tree. Parsing is
//! data-parallel across files; a document that fails to parse is skipped
//! and reported as a [`Warning`] rather than failing the run. An
//! output-path collision, on the other hand, means the mapping from source
//! to destination is ambiguous and aborts the run before anything is
//! rendered or written.

use crate::document::{self, Document};
use log::warn;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;
use walkdir::WalkDir;

const MARKDOWN_EXTENSION: &str = "md";

/// Loads [`Document`]s from a source tree.
pub struct Loader<'a> {
    source_root: &'a Path,
    site_root: &'a Url,
}

/// A skipped document: the source path and the reason it was skipped.
#[derive(Debug)]
pub struct Warning {
    pub source_path: PathBuf,
    pub error: document::Error,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "skipping `{}`: {}",
            self.source_path.display(),
            self.error
        )
    }
}

impl<'a> Loader<'a> {
    pub fn new(source_root: &'a Path, site_root: &'a Url) -> Loader<'a> {
        Loader {
            source_root,
            site_root,
        }
    }

    /// Walks the source root and parses every Markdown file found. Returns
    /// the documents sorted by source path together with the warnings for
    /// any skipped files.
    pub fn load(&self) -> Result<(Vec<Document>, Vec<Warning>)> {
        let files = self.source_files()?;
        let results: Vec<_> = files
            .par_iter()
            .map(|path| self.load_document(path))
            .collect();

        let mut documents = Vec::with_capacity(results.len());
        let mut warnings = Vec::new();
        for result in results {
            match result {
                Ok(document) => documents.push(document),
                Err(warning) => {
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }

        check_collisions(&documents)?;
        Ok((documents, warnings))
    }

    // Directory iteration order is OS-dependent, so the file list is
    // sorted to keep every later stage deterministic.
    fn source_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for result in WalkDir::new(self.source_root) {
            let entry = result?;
            if entry.file_type().is_file()
                && entry.path().extension().map_or(false, |extension| {
                    extension == MARKDOWN_EXTENSION
                })
            {
                // strip_prefix can't fail: every entry is under the root
                files.push(
                    entry
                        .path()
                        .strip_prefix(self.source_root)
                        .unwrap()
                        .to_owned(),
                );
            }
        }
        files.sort();
        Ok(files)
    }

    fn load_document(
        &self,
        source_path: &Path,
    ) -> std::result::Result<Document, Warning> {
        let warning = |error| Warning {
            source_path: source_path.to_owned(),
            error,
        };
        let contents = fs::read_to_string(self.source_root.join(source_path))
            .map_err(|err| warning(document::Error::Io(err)))?;
        Document::parse(source_path, &contents, self.site_root).map_err(warning)
    }
}

fn check_collisions(documents: &[Document]) -> Result<()> {
    let mut seen: BTreeMap<&Path, &Path> = BTreeMap::new();
    for document in documents {
        if let Some(first) =
            seen.insert(&document.output_path, &document.source_path)
        {
            return Err(Error::PathCollision {
                output_path: document.output_path.clone(),
                first: first.to_owned(),
                second: document.source_path.clone(),
            });
        }
    }
    Ok(())
}

pub type Result<T> = std::result::Result<T, Error>;

/// Represents a fatal loading error. Per-document parse failures are
/// [`Warning`]s, not errors.
#[derive(Debug)]
pub enum Error {
    /// Returned when the source tree itself can't be walked.
    Walk(walkdir::Error),

    /// Returned when two documents map to the same output path, making the
    /// source-to-destination mapping ambiguous.
    PathCollision {
        output_path: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Walk(err) => err.fmt(f),
            Error::PathCollision {
                output_path,
                first,
                second,
            } => write!(
                f,
                "`{}` and `{}` both map to output path `{}`",
                first.display(),
                second.display(),
                output_path.display()
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Walk(err) => Some(err),
            Error::PathCollision { .. } => None,
        }
    }
}

impl From<walkdir::Error> for Error {
    /// Converts a [`walkdir::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator while walking the source tree.
    fn from(err: walkdir::Error) -> Error {
        Error::Walk(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn site_root() -> Url {
        Url::parse("https://example.org/").unwrap()
    }

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut f = File::create(path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn test_load_sorted_by_source_path() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "b.md",
            "---\ntitle: B\ndate: 2021-01-02\n---\nbody",
        );
        write_file(
            dir.path(),
            "a.md",
            "---\ntitle: A\ndate: 2021-01-01\n---\nbody",
        );

        let root = site_root();
        let (documents, warnings) =
            Loader::new(dir.path(), &root).load().unwrap();
        assert!(warnings.is_empty());
        assert_eq!(
            documents
                .iter()
                .map(|d| d.source_path.as_path())
                .collect::<Vec<_>>(),
            vec![Path::new("a.md"), Path::new("b.md")]
        );
    }

    #[test]
    fn test_malformed_document_skipped_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "good.md", "---\ntitle: Good\n---\nbody");
        write_file(dir.path(), "bad.md", "no front matter here");

        let root = site_root();
        let (documents, warnings) =
            Loader::new(dir.path(), &root).load().unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].source_path, Path::new("good.md"));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].source_path, Path::new("bad.md"));
        assert!(matches!(
            warnings[0].error,
            document::Error::MissingStartFence
        ));
    }

    #[test]
    fn test_identical_date_and_slug_collide() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "one.md",
            "---\ntitle: Same Title\ndate: 2021-01-01\n---\n",
        );
        write_file(
            dir.path(),
            "two.md",
            "---\ntitle: Same Title\ndate: 2021-01-01\n---\n",
        );

        let root = site_root();
        let err = Loader::new(dir.path(), &root).load().unwrap_err();
        match err {
            Error::PathCollision {
                output_path,
                first,
                second,
            } => {
                assert_eq!(
                    output_path,
                    Path::new("posts/2021-01-01/same-title.html")
                );
                assert_eq!(first, Path::new("one.md"));
                assert_eq!(second, Path::new("two.md"));
            }
            other => panic!("expected path collision, got {:?}", other),
        }
    }

    #[test]
    fn test_non_markdown_files_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "note.md", "---\ntitle: Note\n---\nbody");
        write_file(dir.path(), "image.png", "not markdown");

        let root = site_root();
        let (documents, warnings) =
            Loader::new(dir.path(), &root).load().unwrap();
        assert_eq!(documents.len(), 1);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_nested_directories_walked() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "2021/april/post.md",
            "---\ntitle: Nested\n---\nbody",
        );

        let root = site_root();
        let (documents, _) = Loader::new(dir.path(), &root).load().unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(
            documents[0].source_path,
            Path::new("2021/april/post.md")
        );
    }
}

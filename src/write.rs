//! The output phase: writes rendered pages into the destination tree and
//! copies static assets alongside them. Writes are parallel per file and a
//! failed write never stops the others: each failure is recorded with its
//! path and surfaced in the end-of-run summary. Given unchanged input the
//! writer produces a byte-identical destination tree.

use crate::render::RenderedPage;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A failed write: the destination path and the error.
#[derive(Debug)]
pub struct Failure {
    pub path: PathBuf,
    pub err: io::Error,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "writing `{}`: {}", self.path.display(), self.err)
    }
}

/// Writes pages and static files under a destination root.
pub struct Writer<'a> {
    pub destination_root: &'a Path,
}

impl Writer<'_> {
    /// Writes every page, returning the failures (empty on full success).
    pub fn write_pages(&self, pages: &[RenderedPage]) -> Vec<Failure> {
        let mut failures = self.create_directories(pages);

        let write_failures: Vec<Failure> = pages
            .par_iter()
            .filter_map(|page| {
                let path = self.destination_root.join(&page.output_path);
                match fs::write(&path, &page.contents) {
                    Ok(()) => None,
                    Err(err) => Some(Failure { path, err }),
                }
            })
            .collect();
        failures.extend(write_failures);
        failures
    }

    // The parent directories are created up front, once per distinct
    // directory, so the parallel writers don't contend on them.
    fn create_directories(&self, pages: &[RenderedPage]) -> Vec<Failure> {
        let mut failures = Vec::new();
        let mut seen_dirs: BTreeSet<&Path> = BTreeSet::new();
        for page in pages {
            if let Some(dir) = page.output_path.parent() {
                if seen_dirs.insert(dir) {
                    let path = self.destination_root.join(dir);
                    if let Err(err) = fs::create_dir_all(&path) {
                        failures.push(Failure { path, err });
                    }
                }
            }
        }
        failures
    }

    /// Copies a directory tree verbatim to `target` under the destination
    /// root. A missing source directory is not an error; the site simply
    /// has no static assets.
    pub fn copy_tree(&self, source: &Path, target: &str) -> Vec<Failure> {
        if !source.is_dir() {
            return Vec::new();
        }

        let destination = self.destination_root.join(target);
        let mut failures = Vec::new();
        for result in WalkDir::new(source) {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    failures.push(Failure {
                        path: err
                            .path()
                            .map(Path::to_owned)
                            .unwrap_or_else(|| source.to_owned()),
                        err: err.into(),
                    });
                    continue;
                }
            };
            // strip_prefix can't fail: every entry is under `source`
            let relative = entry.path().strip_prefix(source).unwrap();
            let path = destination.join(relative);
            let result = if entry.file_type().is_dir() {
                fs::create_dir_all(&path)
            } else {
                fs::copy(entry.path(), &path).map(|_| ())
            };
            if let Err(err) = result {
                failures.push(Failure { path, err });
            }
        }
        failures
    }
}

/// Removes a directory tree, treating a missing tree as already removed.
pub fn remove_tree(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(err) => match err.kind() {
            io::ErrorKind::NotFound => Ok(()),
            _ => Err(err),
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn page(path: &str, contents: &str) -> RenderedPage {
        RenderedPage {
            output_path: PathBuf::from(path),
            contents: contents.as_bytes().to_owned(),
        }
    }

    #[test]
    fn test_write_pages_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let writer = Writer {
            destination_root: dir.path(),
        };
        let failures = writer.write_pages(&[
            page("index.html", "front"),
            page("posts/2021-01-01/hello.html", "hello"),
        ]);
        assert!(failures.is_empty());
        assert_eq!(
            fs::read_to_string(dir.path().join("posts/2021-01-01/hello.html")).unwrap(),
            "hello"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("index.html")).unwrap(),
            "front"
        );
    }

    #[test]
    fn test_rewrites_are_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let writer = Writer {
            destination_root: dir.path(),
        };
        let pages = vec![page("a/b.html", "contents")];

        assert!(writer.write_pages(&pages).is_empty());
        let first = fs::read(dir.path().join("a/b.html")).unwrap();
        assert!(writer.write_pages(&pages).is_empty());
        let second = fs::read(dir.path().join("a/b.html")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_copy_tree() {
        let source = tempfile::tempdir().unwrap();
        fs::create_dir_all(source.path().join("css")).unwrap();
        fs::write(source.path().join("css/site.css"), "body {}").unwrap();
        fs::write(source.path().join("favicon.ico"), "icon").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let writer = Writer {
            destination_root: dir.path(),
        };
        let failures = writer.copy_tree(source.path(), "static");
        assert!(failures.is_empty());
        assert_eq!(
            fs::read_to_string(dir.path().join("static/css/site.css")).unwrap(),
            "body {}"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("static/favicon.ico")).unwrap(),
            "icon"
        );
    }

    #[test]
    fn test_copy_tree_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let writer = Writer {
            destination_root: dir.path(),
        };
        assert!(writer
            .copy_tree(Path::new("/nonexistent/static"), "static")
            .is_empty());
    }

    #[test]
    fn test_remove_tree_missing_is_ok() {
        assert!(remove_tree(Path::new("/nonexistent/output")).is_ok());
    }
}

//! Exports the [`build_site`] function which stitches together the phases
//! of a generation run: loading documents ([`crate::load`]), building the
//! site graph ([`crate::site`]), rendering pages ([`crate::render`]),
//! generating the Atom feed ([`crate::feed`]), and writing everything to
//! the destination tree ([`crate::write`]).
//!
//! The destination tree is only touched after every page has rendered
//! successfully, so a fatal load or render error leaves no partial output
//! behind. Write failures, by contrast, are collected per file and
//! reported in the returned [`RunReport`].

use crate::config::Config;
use crate::feed;
use crate::load::{self, Loader, Warning};
use crate::render::{self, Renderer, Template};
use crate::site::Site;
use crate::write::{remove_tree, Failure, Writer};
use log::info;
use std::fmt;
use std::fs;
use std::path::PathBuf;

/// The outcome of a completed run: what was skipped and what failed to
/// write. A report with no failures is a fully successful run; warnings
/// alone don't fail it.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Documents skipped over malformed front-matter.
    pub warnings: Vec<Warning>,

    /// Per-file write failures.
    pub failures: Vec<Failure>,

    /// Pages the run attempted to write, the feed included.
    pub pages: usize,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

// Output subtrees owned by the generator. They are rebuilt from scratch on
// every run so pages removed from the source don't linger; root-level
// files (`index.html`, `feed.atom`) are simply overwritten.
const GENERATED_SUBTREES: &[&str] = &["posts", "tags", "page", "static"];

/// Runs one complete generation pass.
pub fn build_site(config: &Config) -> Result<RunReport> {
    let loader = Loader::new(&config.source_directory, &config.site_root);
    let (documents, warnings) = loader.load()?;
    info!(
        "loaded {} documents from `{}`",
        documents.len(),
        config.source_directory.display()
    );

    let site = Site::build(documents, config.sort);

    let post_template = Template::load(&config.template_directory.join("post.html"))?;
    let index_template = Template::load(&config.template_directory.join("index.html"))?;

    let bodies = render::render_bodies(&site);
    let renderer = Renderer {
        site: &site,
        config,
        bodies: &bodies,
        post_template: &post_template,
        index_template: &index_template,
    };
    let mut pages = renderer.render_site()?;
    pages.push(feed::page(config, &site, &bodies)?);

    // every page rendered; only now touch the destination
    for subtree in GENERATED_SUBTREES {
        let path = config.output_directory.join(subtree);
        remove_tree(&path).map_err(|err| Error::Clean { path, err })?;
    }
    fs::create_dir_all(&config.output_directory)?;

    let writer = Writer {
        destination_root: &config.output_directory,
    };
    let mut failures = writer.write_pages(&pages);
    failures.extend(writer.copy_tree(&config.static_directory, "static"));
    info!(
        "wrote {} pages to `{}`",
        pages.len().saturating_sub(failures.len()),
        config.output_directory.display()
    );

    Ok(RunReport {
        warnings,
        failures,
        pages: pages.len(),
    })
}

pub type Result<T> = std::result::Result<T, Error>;

/// The error type for a generation run. Every variant aborts the run;
/// per-document and per-file problems are carried in the [`RunReport`]
/// instead.
#[derive(Debug)]
pub enum Error {
    /// Returned for fatal loading errors (an unwalkable source tree or an
    /// output-path collision).
    Load(load::Error),

    /// Returned for rendering errors (template problems, undefined
    /// placeholders).
    Render(render::Error),

    /// Returned for errors building the feed.
    Feed(feed::Error),

    /// Returned for I/O problems while cleaning output directories.
    Clean { path: PathBuf, err: std::io::Error },

    /// Returned for other I/O errors.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Load(err) => err.fmt(f),
            Error::Render(err) => err.fmt(f),
            Error::Feed(err) => err.fmt(f),
            Error::Clean { path, err } => {
                write!(f, "cleaning directory `{}`: {}", path.display(), err)
            }
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Load(err) => Some(err),
            Error::Render(err) => Some(err),
            Error::Feed(err) => Some(err),
            Error::Clean { path: _, err } => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}

impl From<load::Error> for Error {
    /// Converts [`load::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: load::Error) -> Error {
        Error::Load(err)
    }
}

impl From<render::Error> for Error {
    /// Converts [`render::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator.
    fn from(err: render::Error) -> Error {
        Error::Render(err)
    }
}

impl From<feed::Error> for Error {
    /// Converts [`feed::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: feed::Error) -> Error {
        Error::Feed(err)
    }
}

impl From<std::io::Error> for Error {
    /// Converts [`std::io::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{Author, SortKey};
    use std::path::Path;
    use url::Url;

    const POST_TEMPLATE: &str =
        "<h1>{{.title}}</h1>\n{{.body}}{{if .next}}<a href=\"{{.next.url}}\">older</a>{{end}}\n";
    const INDEX_TEMPLATE: &str =
        "{{range .item}}<a href=\"{{.url}}\">{{.title}}</a>\n{{end}}";

    fn write_file(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn project(root: &Path) -> Config {
        write_file(&root.join("templates/post.html"), POST_TEMPLATE);
        write_file(&root.join("templates/index.html"), INDEX_TEMPLATE);
        write_file(
            &root.join("posts/first.md"),
            "---\ntitle: First Post\ndate: 2021-01-01\ntags: [intro]\n---\nFirst body\n",
        );
        write_file(
            &root.join("posts/second.md"),
            "---\ntitle: Second Post\ndate: 2021-02-01\n---\nSecond body\n",
        );
        write_file(&root.join("static/site.css"), "body {}\n");

        Config {
            project_root: root.to_owned(),
            title: "Example Site".to_owned(),
            author: Some(Author {
                name: "A. Writer".to_owned(),
                email: None,
            }),
            site_root: Url::parse("https://example.org/").unwrap(),
            source_directory: root.join("posts"),
            static_directory: root.join("static"),
            template_directory: root.join("templates"),
            output_directory: root.join("public"),
            sort: SortKey::DateDesc,
            index_page_size: 10,
        }
    }

    fn tree(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(root) {
            let entry = entry.unwrap();
            if entry.file_type().is_file() {
                files.push((
                    entry.path().strip_prefix(root).unwrap().to_owned(),
                    fs::read(entry.path()).unwrap(),
                ));
            }
        }
        files.sort();
        files
    }

    #[test]
    fn test_build_site_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = project(dir.path());

        let report = build_site(&config).unwrap();
        assert!(report.is_success());
        assert!(report.warnings.is_empty());

        let out = config.output_directory;
        let second =
            fs::read_to_string(out.join("posts/2021-02-01/second-post.html")).unwrap();
        assert!(second.contains("<h1>Second Post</h1>"));
        // the newer post links to the older one
        assert!(second
            .contains("https://example.org/posts/2021-01-01/first-post.html"));

        let index = fs::read_to_string(out.join("index.html")).unwrap();
        assert!(index.contains("Second Post"));
        assert!(index.contains("First Post"));

        assert!(out.join("tags/intro/index.html").is_file());
        assert!(out.join("feed.atom").is_file());
        assert_eq!(
            fs::read_to_string(out.join("static/site.css")).unwrap(),
            "body {}\n"
        );
    }

    #[test]
    fn test_two_runs_are_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let config = project(dir.path());

        build_site(&config).unwrap();
        let first = tree(&config.output_directory);
        build_site(&config).unwrap();
        let second = tree(&config.output_directory);
        assert_eq!(first, second);
    }

    #[test]
    fn test_collision_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = project(dir.path());
        write_file(
            &dir.path().join("posts/duplicate.md"),
            "---\ntitle: Second Post\ndate: 2021-02-01\n---\nclone\n",
        );

        let err = build_site(&config).unwrap_err();
        assert!(matches!(
            err,
            Error::Load(load::Error::PathCollision { .. })
        ));
        assert!(!config.output_directory.exists());
    }

    #[test]
    fn test_undefined_placeholder_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = project(dir.path());
        write_file(
            &dir.path().join("templates/post.html"),
            "{{.title}} {{.nonexistent}}",
        );

        let err = build_site(&config).unwrap_err();
        assert!(matches!(
            err,
            Error::Render(render::Error::UndefinedPlaceholder { .. })
        ));
        assert!(!config.output_directory.exists());
    }

    #[test]
    fn test_malformed_document_warns_but_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let config = project(dir.path());
        write_file(&dir.path().join("posts/broken.md"), "no front matter");

        let report = build_site(&config).unwrap();
        assert!(report.is_success());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].source_path, Path::new("broken.md"));
        // the healthy documents still made it out
        assert!(config
            .output_directory
            .join("posts/2021-01-01/first-post.html")
            .is_file());
    }

    #[test]
    fn test_stale_pages_removed_on_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let config = project(dir.path());

        build_site(&config).unwrap();
        assert!(config
            .output_directory
            .join("posts/2021-01-01/first-post.html")
            .is_file());

        fs::remove_file(dir.path().join("posts/first.md")).unwrap();
        build_site(&config).unwrap();
        assert!(!config
            .output_directory
            .join("posts/2021-01-01/first-post.html")
            .exists());
    }
}

//! Project configuration. A site is described by a `stela.yaml` file at the
//! project root; [`Config::from_directory`] searches upward from a starting
//! directory so the generator can be invoked from anywhere inside the
//! project tree.

use anyhow::{anyhow, Context as _, Result};
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use url::Url;

/// The project file name searched for by [`Config::from_directory`].
pub const PROJECT_FILE: &str = "stela.yaml";

/// The ordering applied to the site's default collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    /// Newest first (the default for a blog).
    DateDesc,

    /// Oldest first.
    DateAsc,

    /// Source path, ascending.
    Path,
}

impl Default for SortKey {
    fn default() -> Self {
        SortKey::DateDesc
    }
}

/// The site author, used for the Atom feed.
#[derive(Clone, Debug, Deserialize)]
pub struct Author {
    pub name: String,

    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Deserialize)]
struct PageSize(usize);
impl Default for PageSize {
    fn default() -> Self {
        PageSize(10)
    }
}

/// The raw shape of `stela.yaml`. Directory fields are relative to the
/// project root and get resolved into [`Config`]'s absolute paths.
#[derive(Deserialize)]
struct ProjectFile {
    title: String,
    site_root: Url,

    #[serde(default)]
    author: Option<Author>,

    #[serde(default = "default_source_directory")]
    source_directory: PathBuf,

    #[serde(default = "default_static_directory")]
    static_directory: PathBuf,

    #[serde(default = "default_template_directory")]
    template_directory: PathBuf,

    #[serde(default = "default_output_directory")]
    output_directory: PathBuf,

    #[serde(default)]
    sort: SortKey,

    #[serde(default)]
    index_page_size: PageSize,
}

fn default_source_directory() -> PathBuf {
    PathBuf::from("posts")
}

fn default_static_directory() -> PathBuf {
    PathBuf::from("static")
}

fn default_template_directory() -> PathBuf {
    PathBuf::from("templates")
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("public")
}

/// Command-line overrides applied on top of the project file.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub output_directory: Option<PathBuf>,
    pub sort: Option<SortKey>,
}

/// Fully-resolved configuration for one generation run.
pub struct Config {
    pub project_root: PathBuf,
    pub title: String,
    pub author: Option<Author>,

    /// Base URL for generated links. Always carries a trailing slash so
    /// that [`Url::join`] appends rather than replaces the final path
    /// segment.
    pub site_root: Url,

    pub source_directory: PathBuf,
    pub static_directory: PathBuf,
    pub template_directory: PathBuf,
    pub output_directory: PathBuf,
    pub sort: SortKey,
    pub index_page_size: usize,
}

impl Config {
    /// Searches `dir` and its parents for [`PROJECT_FILE`] and loads the
    /// first one found.
    pub fn from_directory(dir: &Path, overrides: Overrides) -> Result<Config> {
        let path = dir.join(PROJECT_FILE);
        if path.is_file() {
            Config::from_project_file(&path, overrides)
        } else {
            match dir.parent() {
                Some(parent) => Config::from_directory(parent, overrides),
                None => Err(anyhow!(
                    "could not find `{}` in any parent directory",
                    PROJECT_FILE
                )),
            }
        }
    }

    /// Loads configuration from a specific project file, resolving relative
    /// directories against the file's parent directory.
    pub fn from_project_file(path: &Path, overrides: Overrides) -> Result<Config> {
        let file = File::open(path)
            .with_context(|| format!("opening project file `{}`", path.display()))?;
        let project: ProjectFile = serde_yaml::from_reader(file)
            .with_context(|| format!("parsing project file `{}`", path.display()))?;
        let project_root = path
            .parent()
            .ok_or_else(|| {
                anyhow!(
                    "can't get parent directory for project file path `{}`",
                    path.display()
                )
            })?
            .to_owned();

        let output_directory = overrides
            .output_directory
            .unwrap_or(project.output_directory);

        Ok(Config {
            title: project.title,
            author: project.author,
            site_root: with_trailing_slash(project.site_root),
            source_directory: project_root.join(&project.source_directory),
            static_directory: project_root.join(&project.static_directory),
            template_directory: project_root.join(&project.template_directory),
            output_directory: project_root.join(&output_directory),
            sort: overrides.sort.unwrap_or(project.sort),
            index_page_size: project.index_page_size.0.max(1),
            project_root,
        })
    }
}

// `Url::join` treats a base without a trailing slash as a "file" whose last
// segment is replaced, so `https://example.org/blog` joined with
// `posts/x.html` would lose the `blog` segment.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

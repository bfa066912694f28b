//! The library code for the `stela` static site generator. A generation run
//! is a one-way pipeline of four phases:
//!
//! 1. Loading documents from source files on disk ([`crate::load`])
//! 2. Aggregating the documents into the site graph ([`crate::site`])
//! 3. Rendering pages from the site graph ([`crate::render`])
//! 4. Writing the rendered pages into the output tree ([`crate::write`])
//!
//! No phase depends on a later one: the loader knows nothing about
//! rendering, and the writer only ever sees finished bytes keyed by output
//! path. The site graph ([`crate::site::Site`]) is built once per run, after
//! all documents are loaded, and is read-only from then on; the renderer
//! resolves cross-document references ("previous post", tag listings) by
//! index into the site's collection rather than by pointers between
//! documents.
//!
//! Loading and Markdown conversion are data-parallel across documents, as
//! is the final write phase. The aggregation step between them needs the
//! complete document set and therefore runs at a barrier.
//!
//! Error policy: a document with malformed front-matter is skipped with a
//! warning; an output-path collision or a template referencing an unknown
//! placeholder aborts the run before anything is written; a failed write
//! is recorded and reported at the end without stopping the remaining
//! writes. [`crate::build::build_site`] stitches the phases together and
//! returns the run's report.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod build;
pub mod config;
pub mod document;
pub mod feed;
pub mod load;
pub mod markdown;
pub mod render;
pub mod site;
pub mod write;

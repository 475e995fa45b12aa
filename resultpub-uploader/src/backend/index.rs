//! Synthetic directory listing for flat-key stores.

use anyhow::Context as _;
use serde::Serialize;
use tera::{Context, Tera};

use resultpub_common::UploadError;

use crate::store::encode_key;

/// Name of the generated listing under the destination path.
pub const INDEX_FILE_NAME: &str = "index.html";

const TEMPLATE_NAME: &str = "index.html";
const TEMPLATE: &str = include_str!("../../templates/index.html");

#[derive(Serialize)]
struct Entry<'a> {
    name: &'a str,
    /// Percent-encoded, relative to the index itself.
    href: String,
}

pub struct IndexPage {
    tera: Tera,
}

impl IndexPage {
    pub fn new() -> anyhow::Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, TEMPLATE)
            .context("Failed to parse index template")?;
        Ok(Self { tera })
    }

    /// Render the listing of `filenames` (in order) under `path`.
    pub fn render(
        &self,
        path: &str,
        filenames: &[String],
        bucket: &str,
    ) -> Result<String, UploadError> {
        let title = path.trim_end_matches('/').rsplit('/').next().unwrap_or(path);
        let files: Vec<Entry> = filenames
            .iter()
            .map(|name| Entry {
                name,
                href: encode_key(name),
            })
            .collect();

        let mut context = Context::new();
        context.insert("title", title);
        context.insert("path", path);
        context.insert("files", &files);
        context.insert("bucket", bucket);

        self.tera
            .render(TEMPLATE_NAME, &context)
            .map_err(|e| UploadError::Template(e.to_string()))
    }
}

/// Pull the link targets back out of a rendered index, decoded.
#[cfg(test)]
pub(crate) fn linked_files(html: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut remaining = html;
    while let Some(start) = remaining.find("<a href=\"") {
        remaining = &remaining[start + 9..];
        if let Some(end) = remaining.find('"') {
            let href = &remaining[..end];
            names.push(urlencoding::decode(href).unwrap().into_owned());
            remaining = &remaining[end..];
        }
    }
    names
}

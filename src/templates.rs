//! Page templates, compiled once at startup.
//!
//! Layout on disk, relative to the html root:
//!
//! - `base.tmpl`: the shared layout every page extends
//! - `partials/*.tmpl`: fragments included by the layout or pages
//! - `pages/*.tmpl`: one file per page, looked up by file name
//!
//! Every template is compiled while the cache is built, so a syntax error
//! aborts startup instead of surfacing on the first request.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use minijinja::{AutoEscape, Environment, ErrorKind, Value};
use serde::Serialize;
use thiserror::Error;

use crate::models::snippet::Snippet;

const BASE_TEMPLATE: &str = "base.tmpl";
const TEMPLATE_EXTENSION: &str = "tmpl";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read templates from {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template {name} failed to compile")]
    Syntax {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("the template {0} does not exist")]
    MissingPage(String),

    #[error("failed to render template")]
    Render(#[from] minijinja::Error),
}

/// Values exposed to every page.
#[derive(Debug, Default, Serialize)]
pub struct TemplateData {
    pub current_year: i32,
    pub flash: Option<String>,
    pub is_authenticated: bool,
    pub snippet: Option<Snippet>,
    pub snippets: Vec<Snippet>,
    pub form: Option<Value>,
}

impl TemplateData {
    pub fn new(flash: Option<String>, is_authenticated: bool) -> Self {
        Self {
            current_year: Utc::now().year(),
            flash,
            is_authenticated,
            ..Self::default()
        }
    }

    pub fn with_form<T: Serialize>(mut self, form: &T) -> Self {
        self.form = Some(Value::from_serialize(form));
        self
    }
}

pub struct TemplateCache {
    env: Environment<'static>,
    pages: BTreeSet<String>,
}

impl TemplateCache {
    #[tracing::instrument(name = "template_cache_setup", skip_all, fields(root = %root.display()))]
    pub fn load(root: &Path) -> Result<Self, TemplateError> {
        let mut env = new_environment();

        add_template(&mut env, BASE_TEMPLATE.to_string(), &root.join(BASE_TEMPLATE))?;

        for path in template_files(&root.join("partials"))? {
            let name = format!("partials/{}", file_name(&path));
            add_template(&mut env, name, &path)?;
        }

        let mut pages = BTreeSet::new();
        for path in template_files(&root.join("pages"))? {
            let name = file_name(&path);
            add_template(&mut env, name.clone(), &path)?;
            pages.insert(name);
        }

        tracing::info!(pages = pages.len(), "Template cache built");

        Ok(Self { env, pages })
    }

    pub fn has_page(&self, page: &str) -> bool {
        self.pages.contains(page)
    }

    /// Renders a page into a string; nothing is written on failure.
    pub fn render(&self, page: &str, data: &TemplateData) -> Result<String, TemplateError> {
        if !self.has_page(page) {
            return Err(TemplateError::MissingPage(page.to_string()));
        }

        let template = self.env.get_template(page)?;
        Ok(template.render(data)?)
    }
}

fn new_environment() -> Environment<'static> {
    let mut env = Environment::new();
    // `.tmpl` is not a known HTML extension, so escaping has to be forced.
    env.set_auto_escape_callback(|_name: &str| AutoEscape::Html);
    env.add_filter("human_date", human_date);
    env
}

fn add_template(
    env: &mut Environment<'static>,
    name: String,
    path: &Path,
) -> Result<(), TemplateError> {
    let source = fs::read_to_string(path).map_err(|source| TemplateError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(template = %name, "Compiling template");

    env.add_template_owned(name.clone(), source)
        .map_err(|source| TemplateError::Syntax { name, source })
}

fn template_files(dir: &Path) -> Result<Vec<PathBuf>, TemplateError> {
    let io_error = |source| TemplateError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path.extension().is_some_and(|ext| ext == TEMPLATE_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Formats an RFC 3339 timestamp as `02 Jan 2006 at 15:04` in UTC.
fn human_date(value: &str) -> Result<String, minijinja::Error> {
    if value.is_empty() {
        return Ok(String::new());
    }

    let parsed = DateTime::parse_from_rfc3339(value).map_err(|err| {
        minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("human_date expects an RFC 3339 timestamp: {err}"),
        )
    })?;

    Ok(parsed
        .with_timezone(&Utc)
        .format("%d %b %Y at %H:%M")
        .to_string())
}

#[cfg(test)]
pub(crate) fn ui_html_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("ui").join("html")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_human_date() {
        assert_eq!(
            human_date("2023-12-17T10:15:00Z").unwrap(),
            "17 Dec 2023 at 10:15"
        );
        assert_eq!(
            human_date("2023-12-17T10:15:00+02:00").unwrap(),
            "17 Dec 2023 at 08:15"
        );
        assert_eq!(human_date("").unwrap(), "");
        assert!(human_date("yesterday").is_err());
    }

    #[test]
    fn test_loads_every_page() {
        let cache = TemplateCache::load(&ui_html_dir()).unwrap();

        for page in ["home.tmpl", "view.tmpl", "create.tmpl", "signup.tmpl", "login.tmpl"] {
            assert!(cache.has_page(page), "missing page {page}");
        }
        assert!(!cache.has_page(BASE_TEMPLATE));
    }

    #[test]
    fn test_missing_page() {
        let cache = TemplateCache::load(&ui_html_dir()).unwrap();
        let result = cache.render("nope.tmpl", &TemplateData::default());

        assert!(matches!(result, Err(TemplateError::MissingPage(name)) if name == "nope.tmpl"));
    }

    #[test]
    fn test_renders_escaped_snippet() {
        let cache = TemplateCache::load(&ui_html_dir()).unwrap();
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let data = TemplateData {
            snippet: Some(Snippet {
                id: 1,
                title: "<script>alert(1)</script>".to_string(),
                content: "An old silent pond".to_string(),
                created,
                expires: created + chrono::Duration::days(7),
            }),
            ..TemplateData::new(Some("Saved".to_string()), false)
        };

        let html = cache.render("view.tmpl", &data).unwrap();

        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("01 Mar 2024 at 09:30"));
        assert!(html.contains("Saved"));
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let result = TemplateCache::load(Path::new("/nonexistent/templates"));
        assert!(matches!(result, Err(TemplateError::Io { .. })));
    }
}

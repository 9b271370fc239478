//! Page rendering.
//!
//! The [`Renderer`] trait is the seam between the scheduling engine and
//! whatever produces HTML. The engine only needs two things from it: the
//! markup for a route, and optionally the markup of a not-found page. While
//! rendering, a renderer may hand newly discovered routes to the
//! [`RouteQueue`] it receives; they are deduplicated and scheduled like seeds.
//!
//! ## Template renderer
//!
//! [`TemplateRenderer`] is the stock implementation. It fills an HTML shell
//! with per-route bootstrap data:
//!
//! ```text
//! {data_dir}/about/index.json          html/index.html (template)
//! {                                     <title>$title</title>
//!   "content": "About us",              <script>window.bootstrap = "$bootstrap"</script>
//!   "title": "About",                   <div id="root"></div>
//!   "links": ["/team"]
//! }
//! ```
//!
//! - `$title` becomes the bootstrap `title` (or `Page`)
//! - `"$bootstrap"` becomes the bootstrap object as compact JSON, so the
//!   client can hydrate from the same data
//! - `<div id="root"></div>` receives the server-rendered content
//! - every entry of `links` is queued for prerendering
//!
//! Each placeholder is replaced once, at its first occurrence.

use maud::html;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::prerender::RouteQueue;
use crate::route::{Route, RouteError};

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("IO error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid bootstrap data in {path}: {source}")]
    Bootstrap {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("discovered an invalid route: {0}")]
    Route(#[from] RouteError),
    #[error("{0}")]
    Failed(String),
}

/// Produces the HTML of one page.
pub trait Renderer: Send + Sync {
    /// Render `route` to a complete HTML document. Routes found along the way
    /// can be passed to `queue`.
    fn render(&self, route: &Route, queue: &RouteQueue) -> Result<String, RenderError>;

    /// Markup of the not-found page, or `None` when the site has none.
    fn render_not_found(&self) -> Result<Option<String>, RenderError> {
        Ok(None)
    }
}

const TITLE_PLACEHOLDER: &str = "$title";
const BOOTSTRAP_PLACEHOLDER: &str = "\"$bootstrap\"";
const ROOT_PLACEHOLDER: &str = r#"<div id="root"></div>"#;
const DEFAULT_TITLE: &str = "Page";

/// Per-route data that drives the template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bootstrap {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Routes this page links to; each is queued for prerendering.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
}

/// Fills an HTML template from `{data_dir}/{route}/index.json`.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    template: String,
    data_dir: PathBuf,
    not_found_message: Option<String>,
}

impl TemplateRenderer {
    /// Read the template from disk.
    pub fn load(template_path: &Path, data_dir: impl Into<PathBuf>) -> Result<Self, RenderError> {
        let template = fs::read_to_string(template_path).map_err(|source| RenderError::Io {
            path: template_path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_template(template, data_dir))
    }

    pub fn from_template(template: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
            data_dir: data_dir.into(),
            not_found_message: None,
        }
    }

    /// Render a not-found page carrying `message` as its content.
    pub fn with_not_found(mut self, message: Option<String>) -> Self {
        self.not_found_message = message;
        self
    }

    pub fn bootstrap_path(&self, route: &Route) -> PathBuf {
        self.data_dir.join(route.to_relative_path()).join("index.json")
    }

    /// Load the bootstrap document of `route`, keeping unknown fields for the client.
    pub fn load_bootstrap(
        &self,
        route: &Route,
    ) -> Result<(Bootstrap, serde_json::Value), RenderError> {
        let path = self.bootstrap_path(route);
        let raw = fs::read_to_string(&path).map_err(|source| RenderError::Io {
            path: path.clone(),
            source,
        })?;
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|source| RenderError::Bootstrap {
                path: path.clone(),
                source,
            })?;
        let bootstrap = Bootstrap::deserialize(&value)
            .map_err(|source| RenderError::Bootstrap { path, source })?;
        Ok((bootstrap, value))
    }

    /// Substitute the placeholders of the template.
    pub fn fill(&self, bootstrap: &Bootstrap, data: &serde_json::Value) -> String {
        let title = bootstrap.title.as_deref().unwrap_or(DEFAULT_TITLE);
        let content = html! { h1 { (bootstrap.content) } }.into_string();

        self.template
            .replacen(TITLE_PLACEHOLDER, &escape_text(title), 1)
            .replacen(BOOTSTRAP_PLACEHOLDER, &script_safe_json(data), 1)
            .replacen(
                ROOT_PLACEHOLDER,
                &format!(r#"<div id="root">{content}</div>"#),
                1,
            )
    }
}

impl Renderer for TemplateRenderer {
    fn render(&self, route: &Route, queue: &RouteQueue) -> Result<String, RenderError> {
        let (bootstrap, data) = self.load_bootstrap(route)?;
        for link in &bootstrap.links {
            queue.enqueue(link)?;
        }
        Ok(self.fill(&bootstrap, &data))
    }

    fn render_not_found(&self) -> Result<Option<String>, RenderError> {
        let Some(message) = &self.not_found_message else {
            return Ok(None);
        };
        let bootstrap = Bootstrap {
            content: message.clone(),
            ..Default::default()
        };
        let data = serde_json::to_value(&bootstrap).map_err(|source| RenderError::Bootstrap {
            path: PathBuf::from("<not-found>"),
            source,
        })?;
        Ok(Some(self.fill(&bootstrap, &data)))
    }
}

/// Compact JSON that cannot terminate the `<script>` element it is embedded in.
fn script_safe_json(value: &serde_json::Value) -> String {
    value.to_string().replace("</", "<\\/")
}

fn escape_text(text: &str) -> String {
    html! { (text) }.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prerender::{PrerenderOptions, Prerenderer};
    use crate::test_helpers::write_tree;
    use serde_json::json;
    use tempfile::TempDir;

    const TEMPLATE: &str = concat!(
        "<!DOCTYPE html><html><head><title>$title</title>",
        "<script>window.bootstrap = \"$bootstrap\";</script></head>",
        "<body><div id=\"root\"></div></body></html>"
    );

    fn renderer(data_dir: &Path) -> TemplateRenderer {
        TemplateRenderer::from_template(TEMPLATE, data_dir)
    }

    #[test]
    fn bootstrap_path_for_root_and_nested() {
        let r = renderer(Path::new("data"));
        assert_eq!(
            r.bootstrap_path(&Route::root()),
            Path::new("data/index.json")
        );
        assert_eq!(
            r.bootstrap_path(&Route::parse("/blog/hello").unwrap()),
            Path::new("data/blog/hello/index.json")
        );
    }

    #[test]
    fn fill_substitutes_every_placeholder() {
        let bootstrap = Bootstrap {
            content: "Hello".into(),
            title: Some("Home".into()),
            links: vec![],
        };
        let data = json!({"content": "Hello", "title": "Home"});

        let html = renderer(Path::new("data")).fill(&bootstrap, &data);

        assert!(html.contains("<title>Home</title>"));
        assert!(html.contains(r#"window.bootstrap = {"content":"Hello","title":"Home"};"#));
        assert!(html.contains(r#"<div id="root"><h1>Hello</h1></div>"#));
        assert!(!html.contains('$'));
    }

    #[test]
    fn fill_defaults_title_to_page() {
        let bootstrap = Bootstrap {
            content: "x".into(),
            ..Default::default()
        };
        let html = renderer(Path::new("data")).fill(&bootstrap, &json!({"content": "x"}));
        assert!(html.contains("<title>Page</title>"));
    }

    #[test]
    fn fill_escapes_content_and_title() {
        let bootstrap = Bootstrap {
            content: "<script>alert(1)</script>".into(),
            title: Some("a & b".into()),
            links: vec![],
        };
        let data = json!({"content": "</script><script>alert(1)</script>"});

        let html = renderer(Path::new("data")).fill(&bootstrap, &data);

        assert!(html.contains("<h1>&lt;script&gt;alert(1)&lt;/script&gt;</h1>"));
        assert!(html.contains("<title>a &amp; b</title>"));
        assert!(html.contains(r#"<\/script><script>alert(1)<\/script>"#));
    }

    #[test]
    fn fill_keeps_unknown_bootstrap_fields() {
        let bootstrap = Bootstrap {
            content: "x".into(),
            ..Default::default()
        };
        let data = json!({"content": "x", "theme": "dark"});
        let html = renderer(Path::new("data")).fill(&bootstrap, &data);
        assert!(html.contains(r#""theme":"dark""#));
    }

    #[test]
    fn load_bootstrap_missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let result = renderer(tmp.path()).load_bootstrap(&Route::parse("/missing").unwrap());
        assert!(matches!(result, Err(RenderError::Io { .. })));
    }

    #[test]
    fn load_bootstrap_without_content_is_rejected() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &[("index.json", r#"{"title": "no content"}"#)]);

        let result = renderer(tmp.path()).load_bootstrap(&Route::root());
        assert!(matches!(result, Err(RenderError::Bootstrap { .. })));
    }

    #[test]
    fn not_found_page_only_when_configured() {
        let r = renderer(Path::new("data"));
        assert!(r.render_not_found().unwrap().is_none());

        let html = r
            .with_not_found(Some("not found".into()))
            .render_not_found()
            .unwrap()
            .unwrap();
        assert!(html.contains("<h1>not found</h1>"));
        assert!(html.contains(r#"window.bootstrap = {"content":"not found"};"#));
    }

    #[test]
    fn template_renderer_follows_links() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        let out = tmp.path().join("html");
        write_tree(
            &data,
            &[
                ("index.json", r#"{"content": "Home", "links": ["/about", "/blog/"]}"#),
                ("about/index.json", r#"{"content": "About", "links": ["/"]}"#),
                ("blog/index.json", r#"{"content": "Blog", "title": "Blog"}"#),
            ],
        );

        let options = PrerenderOptions {
            output_root: out.clone(),
            ..Default::default()
        };
        let summary = Prerenderer::new(renderer(&data), options)
            .unwrap()
            .run(["/"])
            .unwrap();

        assert_eq!(
            summary.routes.iter().map(Route::as_str).collect::<Vec<_>>(),
            vec!["/", "/about", "/blog"]
        );
        let about = fs::read_to_string(out.join("about/index.html")).unwrap();
        assert!(about.contains("<h1>About</h1>"));
        let blog = fs::read_to_string(out.join("blog/index.html")).unwrap();
        assert!(blog.contains("<title>Blog</title>"));
    }

    #[test]
    fn template_renderer_invalid_link_fails_page() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        write_tree(&data, &[("index.json", r#"{"content": "x", "links": ["/../etc"]}"#)]);

        let options = PrerenderOptions {
            output_root: tmp.path().join("html"),
            ..Default::default()
        };
        let result = Prerenderer::new(renderer(&data), options)
            .unwrap()
            .run(["/"]);

        assert!(matches!(
            result,
            Err(crate::prerender::PrerenderError::Render {
                source: RenderError::Route(_),
                ..
            })
        ));
    }
}

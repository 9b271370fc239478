//! Shared test utilities for the prerender test suite.
//!
//! Provides file-tree fixtures (write a tree from a list, read one back into a
//! comparable map) and [`ScriptedRenderer`], a render collaborator whose pages,
//! discovered links and failures are declared up front and whose calls are
//! recorded for assertions.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let renderer = ScriptedRenderer::new()
//!     .page("/", "HTML-A", &["/about"])
//!     .page("/about", "HTML-B", &[]);
//!
//! // ... run a Prerenderer with it ...
//!
//! assert_eq!(renderer.calls(), vec!["/", "/about"]);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use walkdir::WalkDir;

use crate::prerender::RouteQueue;
use crate::render::{RenderError, Renderer};
use crate::route::Route;

// =========================================================================
// File trees
// =========================================================================

/// Create `files` (relative path, content) under `root`, making parents as needed.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    fs::create_dir_all(root).unwrap();
    for (relative, content) in files {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

/// Every file under `root` keyed by its `/`-separated relative path.
pub fn read_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| (relative_key(root, e.path()), fs::read(e.path()).unwrap()))
        .collect()
}

/// Every directory under `root` as a sorted list of relative paths.
pub fn list_dirs(root: &Path) -> Vec<String> {
    let mut dirs: Vec<String> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_dir())
        .map(|e| relative_key(root, e.path()))
        .collect();
    dirs.sort();
    dirs
}

fn relative_key(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap()
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

// =========================================================================
// Scripted renderer
// =========================================================================

#[derive(Debug, Clone)]
struct ScriptedPage {
    html: Result<String, String>,
    links: Vec<String>,
}

/// Render collaborator driven by a fixed script of pages.
///
/// Links are enqueued before the page's result is returned, the way a real
/// renderer discovers routes mid-render. Unknown routes fail.
#[derive(Default)]
pub struct ScriptedRenderer {
    pages: HashMap<String, ScriptedPage>,
    not_found: Option<Result<String, String>>,
    delay: Duration,
    panic_on: Option<String>,
    calls: Mutex<Vec<String>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, route: &str, html: &str, links: &[&str]) -> Self {
        self.pages.insert(
            route.to_string(),
            ScriptedPage {
                html: Ok(html.to_string()),
                links: links.iter().map(|l| l.to_string()).collect(),
            },
        );
        self
    }

    pub fn failing(mut self, route: &str, message: &str, links: &[&str]) -> Self {
        self.pages.insert(
            route.to_string(),
            ScriptedPage {
                html: Err(message.to_string()),
                links: links.iter().map(|l| l.to_string()).collect(),
            },
        );
        self
    }

    pub fn panicking(mut self, route: &str) -> Self {
        self.panic_on = Some(route.to_string());
        self
    }

    pub fn with_not_found(mut self, html: &str) -> Self {
        self.not_found = Some(Ok(html.to_string()));
        self
    }

    pub fn with_failing_not_found(mut self, message: &str) -> Self {
        self.not_found = Some(Err(message.to_string()));
        self
    }

    /// Time each render holds its slot.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Routes in the order `render` was entered.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of renders observed running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Renderer for ScriptedRenderer {
    fn render(&self, route: &Route, queue: &RouteQueue) -> Result<String, RenderError> {
        self.calls.lock().unwrap().push(route.to_string());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let result = (|| {
            if self.panic_on.as_deref() == Some(route.as_str()) {
                panic!("scripted panic for {route}");
            }
            let page = self
                .pages
                .get(route.as_str())
                .ok_or_else(|| RenderError::Failed(format!("no page scripted for {route}")))?;
            for link in &page.links {
                queue.enqueue(link)?;
            }
            thread::sleep(self.delay);
            page.html.clone().map_err(RenderError::Failed)
        })();

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn render_not_found(&self) -> Result<Option<String>, RenderError> {
        match &self.not_found {
            None => Ok(None),
            Some(Ok(html)) => Ok(Some(html.clone())),
            Some(Err(message)) => Err(RenderError::Failed(message.clone())),
        }
    }
}

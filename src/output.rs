//! CLI output formatting for prerender runs.
//!
//! # Output Format
//!
//! ## Build
//!
//! Progress lines are printed as events arrive, so their order follows the
//! run, not the route tree:
//!
//! ```text
//! collecting media files...
//! Copying files from static/data to html/data
//! Rendering /
//! Rendering /about
//!     → html/index.html
//!     → html/about/index.html
//! Not found → html/404.html
//! All 2 routes rendered
//! --------------------------------
//! Prerender finished in 0.42s.
//! ```
//!
//! ## Summary
//!
//! ```text
//! Pages
//! 001 / → index.html
//! 002 /about → about/index.html
//! Not found → 404.html
//!
//! Copies
//! 001 static/media → html/media (12 files)
//! 002 static/data → html/data (3 files, 3 transformed)
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::prerender::{PrerenderEvent, PrerenderSummary};
use crate::replicate::CopyReport;
use std::path::Path;

const SEPARATOR: &str = "--------------------------------";

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Path relative to `root` when it lies under it, as given otherwise.
fn display_under(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn copy_line(index: usize, report: &CopyReport) -> String {
    let detail = match report.files_overridden {
        0 => format!("{} files", report.files_copied),
        n => format!("{} files, {} transformed", report.files_copied, n),
    };
    format!(
        "{} {} \u{2192} {} ({})",
        format_index(index),
        report.from.display(),
        report.to.display(),
        detail
    )
}

// ============================================================================
// Build progress
// ============================================================================

/// Format a single prerender progress event as display lines.
pub fn format_event(event: &PrerenderEvent) -> Vec<String> {
    match event {
        PrerenderEvent::CopyStarted { from, to, message } => match message {
            Some(message) => vec![message.clone()],
            None => vec![format!(
                "Copying files from {} to {}",
                from.display(),
                to.display()
            )],
        },
        // Copy results are listed in the summary.
        PrerenderEvent::CopyFinished(_) => Vec::new(),
        PrerenderEvent::RenderStarted(route) => vec![format!("Rendering {}", route)],
        PrerenderEvent::PageWritten { path, .. } => {
            vec![format!("{}\u{2192} {}", indent(1), path.display())]
        }
        PrerenderEvent::NotFoundWritten(path) => {
            vec![format!("Not found \u{2192} {}", path.display())]
        }
        PrerenderEvent::Quiescent { routes: 1 } => vec!["All 1 route rendered".to_string()],
        PrerenderEvent::Quiescent { routes } => vec![format!("All {} routes rendered", routes)],
        PrerenderEvent::Finished { elapsed, .. } => vec![
            SEPARATOR.to_string(),
            format!("Prerender finished in {:.2}s.", elapsed.as_secs_f64()),
        ],
    }
}

/// Print a progress event to stdout.
pub fn print_event(event: &PrerenderEvent) {
    for line in format_event(event) {
        println!("{}", line);
    }
}

// ============================================================================
// Run summary
// ============================================================================

/// Format the result of a finished run: written pages, then copied trees.
///
/// Page paths are shown relative to the output root.
pub fn format_summary(summary: &PrerenderSummary) -> Vec<String> {
    let mut lines = Vec::new();

    lines.push("Pages".to_string());
    for (i, route) in summary.routes.iter().enumerate() {
        let path = route.to_relative_path().join(&summary.page_filename);
        lines.push(format!(
            "{} {} \u{2192} {}",
            format_index(i + 1),
            route,
            path.display()
        ));
    }
    if let Some(path) = &summary.not_found {
        lines.push(format!(
            "Not found \u{2192} {}",
            display_under(&summary.output_root, path)
        ));
    }

    if !summary.copies.is_empty() {
        lines.push(String::new());
        lines.push("Copies".to_string());
        for (i, report) in summary.copies.iter().enumerate() {
            lines.push(copy_line(i + 1, report));
        }
    }

    lines
}

/// Print the run summary to stdout.
pub fn print_summary(summary: &PrerenderSummary) {
    for line in format_summary(summary) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

/// Format the result of `check`: one line per problem, or an all-clear.
pub fn format_check_output(config_path: &Path, problems: &[String]) -> Vec<String> {
    if problems.is_empty() {
        return vec![format!("{} OK", config_path.display())];
    }
    let mut lines = vec![format!("{} has {} problem(s)", config_path.display(), problems.len())];
    lines.extend(problems.iter().map(|p| format!("{}{}", indent(1), p)));
    lines
}

/// Print check output to stdout.
pub fn print_check_output(config_path: &Path, problems: &[String]) {
    for line in format_check_output(config_path, problems) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::Route;
    use std::path::PathBuf;
    use std::time::Duration;

    fn route(raw: &str) -> Route {
        Route::parse(raw).unwrap()
    }

    // =========================================================================
    // Helper tests
    // =========================================================================

    #[test]
    fn format_index_single_digit() {
        assert_eq!(format_index(1), "001");
    }

    #[test]
    fn format_index_triple_digit() {
        assert_eq!(format_index(100), "100");
    }

    #[test]
    fn display_under_strips_root() {
        assert_eq!(
            display_under(Path::new("html"), Path::new("html/404.html")),
            "404.html"
        );
        assert_eq!(
            display_under(Path::new("html"), Path::new("dist/404.html")),
            "dist/404.html"
        );
    }

    // =========================================================================
    // Event tests
    // =========================================================================

    #[test]
    fn copy_started_uses_message() {
        let event = PrerenderEvent::CopyStarted {
            from: "static/media".into(),
            to: "html/media".into(),
            message: Some("collecting media files...".into()),
        };
        assert_eq!(format_event(&event), vec!["collecting media files..."]);
    }

    #[test]
    fn copy_started_without_message() {
        let event = PrerenderEvent::CopyStarted {
            from: "static/data".into(),
            to: "html/data".into(),
            message: None,
        };
        assert_eq!(
            format_event(&event),
            vec!["Copying files from static/data to html/data"]
        );
    }

    #[test]
    fn copy_finished_prints_nothing() {
        let event = PrerenderEvent::CopyFinished(CopyReport::default());
        assert!(format_event(&event).is_empty());
    }

    #[test]
    fn render_and_write_lines() {
        assert_eq!(
            format_event(&PrerenderEvent::RenderStarted(route("/about"))),
            vec!["Rendering /about"]
        );
        assert_eq!(
            format_event(&PrerenderEvent::PageWritten {
                route: route("/about"),
                path: "html/about/index.html".into(),
            }),
            vec!["    \u{2192} html/about/index.html"]
        );
    }

    #[test]
    fn quiescent_pluralizes() {
        assert_eq!(
            format_event(&PrerenderEvent::Quiescent { routes: 1 }),
            vec!["All 1 route rendered"]
        );
        assert_eq!(
            format_event(&PrerenderEvent::Quiescent { routes: 3 }),
            vec!["All 3 routes rendered"]
        );
    }

    #[test]
    fn finished_prints_separator_and_timing() {
        let event = PrerenderEvent::Finished {
            pages: 2,
            elapsed: Duration::from_millis(1250),
        };
        assert_eq!(
            format_event(&event),
            vec![
                "--------------------------------",
                "Prerender finished in 1.25s."
            ]
        );
    }

    // =========================================================================
    // Summary tests
    // =========================================================================

    fn summary() -> PrerenderSummary {
        PrerenderSummary {
            routes: vec![route("/"), route("/blog/post")],
            output_root: PathBuf::from("html"),
            page_filename: "index.html".into(),
            not_found: Some(PathBuf::from("html/404.html")),
            copies: vec![
                CopyReport {
                    from: "static/media".into(),
                    to: "html/media".into(),
                    files_copied: 12,
                    ..Default::default()
                },
                CopyReport {
                    from: "static/data".into(),
                    to: "html/data".into(),
                    files_copied: 3,
                    files_overridden: 3,
                    dirs_created: 1,
                },
            ],
            elapsed: Duration::from_secs(1),
        }
    }

    #[test]
    fn summary_lists_pages_then_copies() {
        let lines = format_summary(&summary());
        assert_eq!(
            lines,
            vec![
                "Pages",
                "001 / \u{2192} index.html",
                "002 /blog/post \u{2192} blog/post/index.html",
                "Not found \u{2192} 404.html",
                "",
                "Copies",
                "001 static/media \u{2192} html/media (12 files)",
                "002 static/data \u{2192} html/data (3 files, 3 transformed)",
            ]
        );
    }

    #[test]
    fn summary_without_copies_or_not_found() {
        let summary = PrerenderSummary {
            not_found: None,
            copies: Vec::new(),
            ..summary()
        };
        let lines = format_summary(&summary);
        assert_eq!(lines.len(), 3);
        assert!(!lines.iter().any(|l| l.starts_with("Not found")));
    }

    // =========================================================================
    // Check tests
    // =========================================================================

    #[test]
    fn check_output_all_clear() {
        assert_eq!(
            format_check_output(Path::new("prerender.toml"), &[]),
            vec!["prerender.toml OK"]
        );
    }

    #[test]
    fn check_output_lists_problems() {
        let problems = vec!["template not found: html/index.html".to_string()];
        assert_eq!(
            format_check_output(Path::new("prerender.toml"), &problems),
            vec![
                "prerender.toml has 1 problem(s)",
                "    template not found: html/index.html"
            ]
        );
    }
}

//! # Prerender
//!
//! Prerenders a single-page app into static HTML. Starting from a few seed
//! routes, each page is rendered and written to `{output}/{route}/index.html`.
//! Rendering a page may reveal links to further routes, and those are rendered
//! in the same run. Auxiliary directory trees (media, data) are copied into the
//! output while rendering is underway, and an optional not-found page is
//! written next to the pages.
//!
//! # Architecture
//!
//! ```text
//!                     ┌──────────────┐
//!  seeds ──enqueue──▶ │  RouteQueue  │ ──admit──▶ Scheduler ──▶ Renderer ──▶ page file
//!                     │ visited set  │                             │
//!                     │ known/done   │ ◀──────── enqueue ──────────┘
//!                     └──────────────┘
//!  copy specs ──▶ replicate (parallel)
//!  not-found  ──▶ Scheduler ──▶ Renderer::render_not_found ──▶ 404.html
//! ```
//!
//! A run ends when every route ever queued has settled, every copy spec has
//! finished and the not-found page is written. The first failure of any of
//! those fails the run, but only after everything else has settled.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`route`] | Route normalization: leading slash, no empty or relative segments |
//! | [`scheduler`] | Admission control: unbounded threads or a fixed FIFO worker pool |
//! | [`prerender`] | The run: visited set, quiescence detection, page writing, events |
//! | [`render`] | The `Renderer` seam and the stock template renderer |
//! | [`replicate`] | Recursive directory copy with a per-file override hook |
//! | [`config`] | `prerender.toml` loading, validation, merging onto stock defaults |
//! | [`output`] | CLI output formatting for progress events and run summaries |
//!
//! # Design Decisions
//!
//! ## Threads, Not Async
//!
//! Rendering is CPU and filesystem work. A bounded run starts exactly `N`
//! worker threads that share one FIFO wait list; a worker that finishes a
//! task pops the next one, so a slot is handed over, never released and
//! re-acquired. Routes discovered mid-render join the back of the same list.
//! An unbounded run gives each route its own thread.
//!
//! ## Counted Quiescence
//!
//! The run cannot know up front how many routes exist. Instead it counts:
//! a route is *known* when enqueued and *completed* when its render and write
//! settle. Enqueueing happens inside the render that discovers the link, so
//! a new route is always counted before its parent completes, and
//! `completed == known` can only hold once discovery has stopped.
//!
//! ## Events Over Printing
//!
//! The library never prints. Progress is sent over an `mpsc` channel as
//! [`prerender::PrerenderEvent`]s, formatted by [`output`] on a printer thread
//! in the binary. Diagnostics go through `tracing`.

pub mod config;
pub mod output;
pub mod prerender;
pub mod render;
pub mod replicate;
pub mod route;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod test_helpers;

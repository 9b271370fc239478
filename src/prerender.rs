//! Prerender orchestration.
//!
//! Turns a set of seed routes into static files while the set itself keeps
//! growing: a page being rendered can discover more routes and hand them to
//! the [`RouteQueue`]. The run ends at quiescence, when every route ever
//! queued has been rendered and written (or has failed).
//!
//! ## Route lifecycle
//!
//! ```text
//! Unknown ──enqueue──▶ Queued ──slot──▶ Rendering ──write──▶ Completed
//!    │                   ▲
//!    └── already seen ───┘ (no-op)
//! ```
//!
//! ## Quiescence
//!
//! The queue keeps a visited set and two counters, `known` and `completed`,
//! under one mutex:
//!
//! - `enqueue` inserts into the visited set and bumps `known` *before* the
//!   task is admitted, so a route discovered mid-render is counted before the
//!   discovering task can settle.
//! - Settling a task bumps `completed`; if it now equals `known`, the one-shot
//!   completion signal fires and the waiting caller wakes up.
//! - Seeds are counted together, in one critical section, so the first seed
//!   cannot reach quiescence before the last seed is known.
//!
//! Failed renders and writes still settle; the failure is recorded and
//! reported once the run has joined everything. A task that panics, or that
//! is dropped because its thread could not be started, settles from a drop
//! guard.
//!
//! ## Run shape
//!
//! ```text
//! run(seeds)
//!   ├── copy specs        (parallel, rayon global pool)
//!   ├── not-found page    (one scheduler task, outside the counters)
//!   └── seed routes ──▶ scheduler ──▶ render ──▶ write ──▶ settle
//!                            ▲            │
//!                            └─ enqueue ◀─┘
//! ```
//!
//! All three branches are joined before the run reports; the first failure
//! wins and later ones are logged.

use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::render::{RenderError, Renderer};
use crate::replicate::{CopyReport, CopySpec, ReplicateError, replicate};
use crate::route::{Route, RouteError};
use crate::scheduler::{Concurrency, Scheduler, SchedulerError, TaskAbandoned, TaskHandle};

#[derive(Error, Debug)]
pub enum PrerenderError {
    #[error("invalid route: {0}")]
    Route(#[from] RouteError),
    #[error("failed to render {route}: {source}")]
    Render { route: Route, source: RenderError },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: ReplicateError,
    },
    #[error("failed to render the not-found page: {0}")]
    NotFound(#[source] RenderError),
    #[error("{0} exited without reporting a result")]
    Abandoned(String),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Progress reported while a run is underway.
#[derive(Debug, Clone, PartialEq)]
pub enum PrerenderEvent {
    CopyStarted {
        from: PathBuf,
        to: PathBuf,
        message: Option<String>,
    },
    CopyFinished(CopyReport),
    RenderStarted(Route),
    PageWritten { route: Route, path: PathBuf },
    NotFoundWritten(PathBuf),
    /// Every known route has settled. Sent exactly once per run with seeds.
    Quiescent { routes: usize },
    Finished { pages: usize, elapsed: Duration },
}

#[derive(Debug, Clone, Default)]
struct EventSink(Option<Sender<PrerenderEvent>>);

impl EventSink {
    fn emit(&self, event: PrerenderEvent) {
        if let Some(tx) = &self.0 {
            // A closed receiver only means nobody is listening.
            let _ = tx.send(event);
        }
    }
}

/// Knobs of one prerender run.
#[derive(Debug, Clone)]
pub struct PrerenderOptions {
    /// Root under which `{route}/{page_filename}` files are written.
    pub output_root: PathBuf,
    pub concurrency: Concurrency,
    pub page_filename: String,
    /// Written directly under `output_root`.
    pub not_found_filename: String,
    pub copy: Vec<CopySpec>,
}

impl Default for PrerenderOptions {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("html"),
            concurrency: Concurrency::Unbounded,
            page_filename: "index.html".to_string(),
            not_found_filename: "404.html".to_string(),
            copy: Vec::new(),
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct PrerenderSummary {
    /// Every written route, sorted.
    pub routes: Vec<Route>,
    pub output_root: PathBuf,
    pub page_filename: String,
    pub not_found: Option<PathBuf>,
    /// One report per copy spec, in spec order.
    pub copies: Vec<CopyReport>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
struct PageWriter {
    root: PathBuf,
    page_filename: String,
    not_found_filename: String,
}

impl PageWriter {
    fn page_path(&self, route: &Route) -> PathBuf {
        self.root
            .join(route.to_relative_path())
            .join(&self.page_filename)
    }

    fn not_found_path(&self) -> PathBuf {
        self.root.join(&self.not_found_filename)
    }

    fn write(path: &Path, html: &str) -> Result<(), PrerenderError> {
        let write_err = |source| PrerenderError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(path, html).map_err(write_err)
    }
}

#[derive(Debug, Default)]
struct QueueState {
    visited: HashSet<Route>,
    known: usize,
    completed: usize,
    written: Vec<Route>,
    failures: Vec<PrerenderError>,
    quiescent: bool,
}

struct QueueShared {
    state: Mutex<QueueState>,
    settled: Condvar,
    scheduler: Arc<Scheduler>,
    renderer: Arc<dyn Renderer>,
    writer: PageWriter,
    events: EventSink,
}

impl QueueShared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle through which routes enter a run.
///
/// Cloned into every render task and passed to [`Renderer::render`], so pages
/// can queue the routes they link to.
#[derive(Clone)]
pub struct RouteQueue {
    shared: Arc<QueueShared>,
}

impl std::fmt::Debug for RouteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("RouteQueue")
            .field("known", &state.known)
            .field("completed", &state.completed)
            .finish()
    }
}

impl RouteQueue {
    fn new(shared: QueueShared) -> Self {
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Queue a raw route for rendering. Returns `false` if it was already queued.
    pub fn enqueue(&self, route: &str) -> Result<bool, RouteError> {
        Ok(self.enqueue_route(Route::parse(route)?))
    }

    /// Queue a route for rendering. Returns `false` if it was already queued.
    pub fn enqueue_route(&self, route: Route) -> bool {
        self.enqueue_all(std::iter::once(route)) == 1
    }

    /// Count every new route in one critical section, then admit them in order.
    fn enqueue_all(&self, routes: impl IntoIterator<Item = Route>) -> usize {
        let fresh: Vec<Route> = {
            let mut state = self.shared.lock();
            let fresh: Vec<Route> = routes
                .into_iter()
                .filter(|route| {
                    let inserted = state.visited.insert(route.clone());
                    if !inserted {
                        debug!(%route, "route already queued");
                    }
                    inserted
                })
                .collect();
            state.known += fresh.len();
            fresh
        };

        let admitted = fresh.len();
        for route in fresh {
            let guard = SettleGuard {
                queue: self.clone(),
                route: Some(route),
            };
            // Completion is tracked by the counters, not the handle. A task
            // that never starts drops its guard, which settles the route.
            drop(self.shared.scheduler.admit(move || guard.run()));
        }
        admitted
    }

    /// Routes queued so far.
    pub fn known(&self) -> usize {
        self.shared.lock().known
    }

    /// Routes settled so far.
    pub fn completed(&self) -> usize {
        self.shared.lock().completed
    }

    fn render_and_write(&self, route: &Route) -> Result<PathBuf, PrerenderError> {
        info!(%route, "rendering");
        self.shared
            .events
            .emit(PrerenderEvent::RenderStarted(route.clone()));

        let html = self
            .shared
            .renderer
            .render(route, self)
            .map_err(|source| PrerenderError::Render {
                route: route.clone(),
                source,
            })?;
        let path = self.shared.writer.page_path(route);
        PageWriter::write(&path, &html)?;
        Ok(path)
    }

    fn settle(&self, route: Route, outcome: Result<PathBuf, PrerenderError>) {
        let mut state = self.shared.lock();
        state.completed += 1;
        debug_assert!(state.completed <= state.known);

        match outcome {
            Ok(path) => {
                self.shared.events.emit(PrerenderEvent::PageWritten {
                    route: route.clone(),
                    path,
                });
                state.written.push(route);
            }
            Err(e) => {
                warn!(%route, error = %e, "route failed");
                state.failures.push(e);
            }
        }

        if state.completed == state.known && !state.quiescent {
            state.quiescent = true;
            debug!(routes = state.known, "all known routes settled");
            self.shared
                .events
                .emit(PrerenderEvent::Quiescent { routes: state.known });
            self.shared.settled.notify_all();
        }
    }

    fn wait_for_quiescence(&self) {
        let mut state = self.shared.lock();
        while !state.quiescent {
            state = self
                .shared
                .settled
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn take_results(&self) -> (Vec<Route>, Vec<PrerenderError>) {
        let mut state = self.shared.lock();
        (
            std::mem::take(&mut state.written),
            std::mem::take(&mut state.failures),
        )
    }
}

/// Settles its route exactly once: with the task's outcome when it runs to
/// the end, as abandoned when it unwinds or is dropped without running.
struct SettleGuard {
    queue: RouteQueue,
    route: Option<Route>,
}

impl SettleGuard {
    fn run(mut self) {
        // Stays armed until the outcome is known.
        if let Some(route) = self.route.clone() {
            let outcome = self.queue.render_and_write(&route);
            self.route = None;
            self.queue.settle(route, outcome);
        }
    }
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        if let Some(route) = self.route.take() {
            let abandoned = PrerenderError::Abandoned(format!("render task for {route}"));
            self.queue.settle(route, Err(abandoned));
        }
    }
}

/// Drives a prerender run: copies auxiliary trees, renders the not-found
/// page and every reachable route.
pub struct Prerenderer {
    renderer: Arc<dyn Renderer>,
    scheduler: Arc<Scheduler>,
    options: PrerenderOptions,
    events: EventSink,
}

impl std::fmt::Debug for Prerenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prerenderer")
            .field("scheduler", &self.scheduler)
            .field("options", &self.options)
            .finish()
    }
}

impl Prerenderer {
    pub fn new(
        renderer: impl Renderer + 'static,
        options: PrerenderOptions,
    ) -> Result<Self, PrerenderError> {
        let scheduler = Scheduler::new(options.concurrency)?;
        Ok(Self {
            renderer: Arc::new(renderer),
            scheduler: Arc::new(scheduler),
            options,
            events: EventSink::default(),
        })
    }

    /// Report progress on `tx` during runs.
    pub fn with_events(mut self, tx: Sender<PrerenderEvent>) -> Self {
        self.events = EventSink(Some(tx));
        self
    }

    /// Render `seeds` and everything they lead to.
    ///
    /// Returns only after every queued route, every copy spec and the
    /// not-found page have settled.
    pub fn run<I, S>(&self, seeds: I) -> Result<PrerenderSummary, PrerenderError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let start = Instant::now();
        let seeds = seeds
            .into_iter()
            .map(|s| Route::parse(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let writer = PageWriter {
            root: self.options.output_root.clone(),
            page_filename: self.options.page_filename.clone(),
            not_found_filename: self.options.not_found_filename.clone(),
        };
        let queue = RouteQueue::new(QueueShared {
            state: Mutex::new(QueueState::default()),
            settled: Condvar::new(),
            scheduler: Arc::clone(&self.scheduler),
            renderer: Arc::clone(&self.renderer),
            writer: writer.clone(),
            events: self.events.clone(),
        });

        info!(
            seeds = seeds.len(),
            copies = self.options.copy.len(),
            concurrency = ?self.options.concurrency.limit(),
            "starting prerender"
        );

        let (copies, not_found) = thread::scope(|scope| {
            let copies = scope.spawn(|| self.copy_all());
            let not_found = self.submit_not_found(writer);

            if queue.enqueue_all(seeds) > 0 {
                queue.wait_for_quiescence();
            } else {
                warn!("no seed routes; nothing to render");
            }

            let not_found = not_found.join().unwrap_or_else(|TaskAbandoned| {
                Err(PrerenderError::Abandoned("not-found task".to_string()))
            });
            let copies = copies
                .join()
                .unwrap_or_else(|_| Err(PrerenderError::Abandoned("copy task".to_string())));
            (copies, not_found)
        });

        let (mut routes, route_failures) = queue.take_results();
        let mut failures = Vec::new();
        let copies = copies.unwrap_or_else(|e| {
            failures.push(e);
            Vec::new()
        });
        failures.extend(route_failures);
        let not_found = not_found.unwrap_or_else(|e| {
            failures.push(e);
            None
        });

        let mut failures = failures.into_iter();
        if let Some(first) = failures.next() {
            for other in failures {
                error!(error = %other, "additional prerender failure");
            }
            return Err(first);
        }

        routes.sort();
        let elapsed = start.elapsed();
        info!(pages = routes.len(), ?elapsed, "prerender finished");
        self.events.emit(PrerenderEvent::Finished {
            pages: routes.len(),
            elapsed,
        });

        Ok(PrerenderSummary {
            routes,
            output_root: self.options.output_root.clone(),
            page_filename: self.options.page_filename.clone(),
            not_found,
            copies,
            elapsed,
        })
    }

    fn copy_all(&self) -> Result<Vec<CopyReport>, PrerenderError> {
        self.options
            .copy
            .par_iter()
            .map(|spec| {
                self.events.emit(PrerenderEvent::CopyStarted {
                    from: spec.from.clone(),
                    to: spec.to.clone(),
                    message: spec.message.clone(),
                });
                let report = replicate(spec).map_err(|source| PrerenderError::Copy {
                    from: spec.from.clone(),
                    to: spec.to.clone(),
                    source,
                })?;
                self.events
                    .emit(PrerenderEvent::CopyFinished(report.clone()));
                Ok(report)
            })
            .collect()
    }

    fn submit_not_found(
        &self,
        writer: PageWriter,
    ) -> TaskHandle<Result<Option<PathBuf>, PrerenderError>> {
        let renderer = Arc::clone(&self.renderer);
        let events = self.events.clone();
        self.scheduler.admit(move || {
            let Some(html) = renderer
                .render_not_found()
                .map_err(PrerenderError::NotFound)?
            else {
                return Ok(None);
            };
            let path = writer.not_found_path();
            PageWriter::write(&path, &html)?;
            info!(path = %path.display(), "not-found page written");
            events.emit(PrerenderEvent::NotFoundWritten(path.clone()));
            Ok(Some(path))
        })
    }
}

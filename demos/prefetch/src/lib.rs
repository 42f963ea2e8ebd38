//! # Prefetch Example
//!
//! Server-side-render style prefetching with a settle tracker.
//!
//! A page is assembled by dispatching a handful of actions. Some of them
//! start data loads that finish later (and one of them fails). The page is
//! rendered exactly once, when everything dispatched for it has settled.
//!
//! ## Example
//!
//! ```no_run
//! use prefetch::{PageAction, PageState, PageStore, render};
//! use quiescence_runtime::{Dispatch, PendingTracker};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), quiescence_runtime::TrackerError> {
//! let store = PageStore::new(Duration::from_millis(20));
//! let tracker = PendingTracker::new(|state: PageState| println!("{}", render(&state)))
//!     .attach(store.clone())?;
//! let pipeline = tracker.wrap(store);
//!
//! pipeline.dispatch(PageAction::LoadUsers);
//! tracker.subscribe().wait().await?;
//! # Ok(())
//! # }
//! ```

use quiescence_core::{Dispatch, MaybeAwaitable, Promise, StateReader};
use quiescence_runtime::TrackerConfig;
use std::fmt::Write as _;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;

/// Everything the page needs to render
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageState {
    /// Page heading
    pub title: String,
    /// Loaded user names
    pub users: Vec<String>,
    /// Loaded post titles
    pub posts: Vec<String>,
    /// Loads that failed, as shown to the reader
    pub errors: Vec<String>,
}

/// Actions dispatched while assembling the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageAction {
    /// Set the heading (synchronous)
    SetTitle(String),
    /// Load the user list
    LoadUsers,
    /// Load the latest posts
    LoadPosts,
    /// Load comments; the comments backend is always down
    LoadComments,
}

/// Why a data load failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The backend did not answer
    #[error("{0} backend unavailable")]
    Unavailable(&'static str),

    /// The load task was cancelled or panicked
    #[error("load aborted: {0}")]
    Aborted(String),
}

/// How long the page must stay idle before it counts as settled
///
/// The binary runs on a multi-thread runtime, where a non-zero debounce is
/// what keeps the whole dispatch burst inside one settle cycle.
pub const SETTLE_DEBOUNCE: Duration = Duration::from_millis(10);

/// Tracker configuration for the home page
#[must_use]
pub fn tracker_config() -> TrackerConfig {
    TrackerConfig::default()
        .with_name("home-page")
        .with_debounce(SETTLE_DEBOUNCE)
}

/// The actions dispatched to assemble the home page, in order
#[must_use]
pub fn page_actions() -> [PageAction; 4] {
    [
        PageAction::SetTitle("Home".to_string()),
        PageAction::LoadUsers,
        PageAction::LoadPosts,
        PageAction::LoadComments,
    ]
}

/// What the page store's handler returns for each action
pub type Dispatched = MaybeAwaitable<(), Promise<(), LoadError>>;

/// In-memory page store with simulated backend latency
///
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct PageStore {
    state: Arc<RwLock<PageState>>,
    latency: Duration,
}

impl PageStore {
    /// Create an empty store whose loads take `latency`
    #[must_use]
    pub fn new(latency: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(PageState::default())),
            latency,
        }
    }

    /// Clone the current state
    #[must_use]
    pub fn snapshot(&self) -> PageState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, f: impl FnOnce(&mut PageState)) {
        f(&mut self.state.write().unwrap_or_else(PoisonError::into_inner));
    }

    /// Start a load in the background and hand back its promise
    fn load<F>(&self, source: &'static str, apply: F) -> Dispatched
    where
        F: FnOnce(&mut PageState) -> Result<(), LoadError> + Send + 'static,
    {
        let store = self.clone();
        let latency = self.latency;

        let task = tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            let mut outcome = Ok(());
            store.update(|state| outcome = apply(state));
            match &outcome {
                Ok(()) => tracing::debug!(source, "Load finished"),
                Err(error) => tracing::warn!(source, %error, "Load failed"),
            }
            outcome
        });

        MaybeAwaitable::Awaitable(Promise::new(async move {
            task.await
                .map_err(|e| LoadError::Aborted(e.to_string()))?
        }))
    }
}

impl Dispatch<PageAction> for PageStore {
    type Output = Dispatched;

    fn dispatch(&self, action: PageAction) -> Dispatched {
        tracing::debug!(?action, "Handling page action");
        match action {
            PageAction::SetTitle(title) => {
                self.update(|state| state.title = title);
                MaybeAwaitable::Plain(())
            }
            PageAction::LoadUsers => self.load("users", |state| {
                state.users = vec!["ada".to_string(), "grace".to_string()];
                Ok(())
            }),
            PageAction::LoadPosts => self.load("posts", |state| {
                state.posts = vec!["Settling, explained".to_string()];
                Ok(())
            }),
            PageAction::LoadComments => self.load("comments", |state| {
                let error = LoadError::Unavailable("comments");
                state.errors.push(error.to_string());
                Err(error)
            }),
        }
    }
}

impl StateReader for PageStore {
    type State = PageState;

    fn get_state(&self) -> PageState {
        self.snapshot()
    }
}

/// Render the page as HTML
#[must_use]
pub fn render(state: &PageState) -> String {
    let mut html = format!("<h1>{}</h1>\n", state.title);

    for (heading, items) in [("Users", &state.users), ("Posts", &state.posts)] {
        let _ = writeln!(html, "<h2>{heading}</h2>\n<ul>");
        for item in items {
            let _ = writeln!(html, "  <li>{item}</li>");
        }
        html.push_str("</ul>\n");
    }

    for error in &state.errors {
        let _ = writeln!(html, "<p class=\"error\">{error}</p>");
    }

    html
}

//! Tinyissue tracker: HTTP server, storage and pages.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Browser │ ───────> │  server.rs  (axum Router, ServerConfig)          │
//! │          │ <─────── │    └─ auth.rs  (caller from proxy header)        │
//! └──────────┘          │         │                                        │
//!                       │         v                                        │
//!                       │  api.rs  (route handlers, AppState)              │
//!                       │         │                                        │
//!                       │         │ RequestContext::load() → RouteParams   │
//!                       │         v                                        │
//!                       │  context.rs ──> crate::form (definitions,        │
//!                       │         │        renderer, FormRequest)          │
//!                       │         v                                        │
//!                       │  db/  (TrackerDb via DbHandle)   storage.rs      │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module    | Responsibility                                            |
//! |-----------|-----------------------------------------------------------|
//! | `models`  | Records and their inputs: `User`, `Project`, `Issue`, ... |
//! | `views`   | Page shell, issue list and issue page HTML                |
//! | `storage` | Attachment files under `{root}/uploads/`                  |
//!
//! ## Typical Request Flow (edit an issue)
//!
//! 1. `POST /project/{id}/issue/{issue}/edit` → `auth::authenticate` resolves
//!    the caller and locale.
//! 2. `api::update_issue` loads the project binding, issue and tag groups
//!    through `context::RequestContext`, then resolves the issue form.
//! 3. Input is validated against the form's rules. Failures re-render the
//!    form with status 422.
//! 4. `IssueForm::issue_update` keeps only values the caller's form offers;
//!    `TrackerDb::update_issue` applies them and logs activity.
//! 5. The handler answers `303 See Other` to the issue page.

pub mod api;
pub mod auth;
pub mod context;
pub mod db;
pub mod models;
pub mod server;
pub mod storage;
pub mod views;

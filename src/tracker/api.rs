use std::collections::BTreeMap;
use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
    Extension, Form, Json, Router,
    extract::{Multipart, Path, Query, State},
    http::{HeaderName, StatusCode, header},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde_json::json;
use tracing::{error, info, warn};

use super::auth::{self, CurrentUser, Locale};
use super::context::{RequestContext, RouteIds, db_error, project_for};
use super::db::DbHandle;
use super::models::{NewUser, Permission, Role, User, UserUpdate};
use super::storage::AttachmentStore;
use super::views;
use crate::errors::TrackerError;
use crate::form::issue::IssueForm;
use crate::form::project::ProjectForm;
use crate::form::render::FormRenderer;
use crate::form::request::FormRequest;
use crate::form::rules::{self, ValidationErrors};
use crate::form::tag::TagForm;
use crate::form::{FormInput, FormKind, Rules};
use crate::lang;

// ── Shared application state ──────────────────────────────────────────

/// Request-independent settings taken from the configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Header carrying the authenticated user id.
    pub user_header: HeaderName,
    /// Language for new users and for callers whose language has no table.
    pub language: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_header: HeaderName::from_static("x-tinyissue-user"),
            language: lang::DEFAULT_LOCALE.to_string(),
        }
    }
}

pub struct AppState {
    pub db: DbHandle,
    pub store: AttachmentStore,
    pub settings: Settings,
}

pub type SharedState = Arc<AppState>;

/// Posted by the delete buttons of the edit forms.
const DELETE_ISSUE: &str = "delete-issue";
const DELETE_PROJECT: &str = "delete-project";

const ACTIVITY_LIMIT: i64 = 50;

// ── Error handling ────────────────────────────────────────────────────

impl IntoResponse for TrackerError {
    fn into_response(self) -> Response {
        let status = match &self {
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            TrackerError::Unauthenticated => StatusCode::UNAUTHORIZED,
            TrackerError::Forbidden { .. } => StatusCode::FORBIDDEN,
            TrackerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TrackerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            TrackerError::Rule(_)
            | TrackerError::Storage { .. }
            | TrackerError::Database(_)
            | TrackerError::Other(_) => {
                error!(error = ?self, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = match &self {
            TrackerError::Validation(errors) => json!({
                "error": self.to_string(),
                "errors": errors.fields().map(|f| (f.to_string(), errors.get(f).to_vec())).collect::<BTreeMap<_, _>>(),
            }),
            _ => json!({"error": self.to_string()}),
        };
        (status, Json(body)).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

/// All routes. Everything but the landing page and health check goes
/// through [`auth::authenticate`].
pub fn api_router(state: SharedState) -> Router<SharedState> {
    let protected = Router::new()
        .route("/projects/new", get(new_project_form).post(create_project))
        .route("/project/{id}", get(project_page))
        .route("/project/{id}/edit", get(edit_project_form).post(update_project))
        .route("/project/{id}/activity", get(project_activity))
        .route("/project/{id}/issue/new", get(new_issue_form).post(create_issue))
        .route("/project/{id}/issue/{issue}", get(issue_page))
        .route(
            "/project/{id}/issue/{issue}/edit",
            get(edit_issue_form).post(update_issue),
        )
        .route("/project/{id}/issue/{issue}/comment", post(add_comment))
        .route("/project/{id}/upload_attachment", post(upload_attachment))
        .route("/project/{id}/remove_attachment", post(remove_attachment))
        .route(
            "/project/{id}/issue/{issue}/download/{attachment}",
            get(download_attachment),
        )
        .route(
            "/project/{id}/issue/{issue}/display/{attachment}",
            get(display_attachment),
        )
        .route("/administration/tags/new", get(new_tag_form).post(create_tag))
        .route("/administration/tag/{id}/edit", get(edit_tag_form).post(update_tag))
        .route("/administration/users/new", post(create_user))
        .route("/administration/user/{id}/delete", post(delete_user))
        .route("/user/settings", post(update_settings))
        .route("/user/settings/messages", post(update_messages_settings))
        .route_layer(middleware::from_fn_with_state(state, auth::authenticate));

    Router::new()
        .route("/", get(landing))
        .route("/health", get(health_check))
        .merge(protected)
}

// ── Helpers ───────────────────────────────────────────────────────────

fn see_other(path: &str) -> Response {
    Redirect::to(&format!("/{}", path)).into_response()
}

/// Render the resolved form as a page.
fn form_page(
    title: &str,
    request: &FormRequest,
    locale: &str,
    input: Option<&FormInput>,
    errors: Option<&ValidationErrors>,
) -> Result<Html<String>, TrackerError> {
    let form = request
        .form()
        .ok_or_else(|| anyhow::anyhow!("No form resolved for '{}'", title))?;
    let mut renderer = FormRenderer::new(locale);
    if let Some(input) = input {
        renderer = renderer.with_input(input);
    }
    if let Some(errors) = errors {
        renderer = renderer.with_errors(errors);
    }
    Ok(views::page(title, &renderer.render(form, &[])))
}

/// Query-string values for an unbound form; `None` when there are none.
fn query_input(query: Vec<(String, String)>) -> Option<FormInput> {
    (!query.is_empty()).then(|| FormInput::from_pairs(query))
}

/// Validate `input`; on failure, the form page re-rendered with the errors
/// and status 422.
fn invalid_form(
    title: &str,
    request: &FormRequest,
    locale: &str,
    input: &FormInput,
) -> Result<Option<Response>, TrackerError> {
    match request.validate(input) {
        Ok(()) => Ok(None),
        Err(TrackerError::Validation(errors)) => {
            let page = form_page(title, request, locale, Some(input), Some(&errors))?;
            Ok(Some((StatusCode::UNPROCESSABLE_ENTITY, page).into_response()))
        }
        Err(e) => Err(e),
    }
}

fn downcast<'a, F: crate::form::FormDefinition>(
    request: &'a FormRequest,
) -> Result<&'a F, TrackerError> {
    request
        .downcast::<F>()
        .ok_or_else(|| anyhow::anyhow!("Resolved form has an unexpected type").into())
}

fn title(locale: &str, key: &str) -> String {
    lang::trans(locale, key)
}

// ── Public pages ──────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn landing(State(state): State<SharedState>) -> Result<Html<String>, TrackerError> {
    let projects = state
        .db
        .call(|db| db.list_projects())
        .await
        .map_err(db_error)?
        .into_iter()
        .filter(|p| !p.private)
        .collect::<Vec<_>>();
    Ok(views::landing(&state.settings.language, &projects))
}

// ── Projects ──────────────────────────────────────────────────────────

async fn new_project_form(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(Locale(locale)): Extension<Locale>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Html<String>, TrackerError> {
    auth::require(&user, Permission::ProjectCreate)?;
    let ctx = RequestContext::load(&state, RouteIds::default(), &user, &locale).await?;
    let request = ctx.form_request(FormKind::Project)?;
    let input = query_input(query);
    form_page(&title(&locale, "new_project"), &request, &locale, input.as_ref(), None)
}

async fn create_project(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(Locale(locale)): Extension<Locale>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, TrackerError> {
    auth::require(&user, Permission::ProjectCreate)?;
    let ctx = RequestContext::load(&state, RouteIds::default(), &user, &locale).await?;
    let request = ctx.form_request(FormKind::Project)?;
    let input = FormInput::from_pairs(pairs);
    if let Some(page) = invalid_form(&title(&locale, "new_project"), &request, &locale, &input)? {
        return Ok(page);
    }

    let info = downcast::<ProjectForm>(&request)?.new_project(&input);
    let project = state
        .db
        .call(move |db| db.create_project(&info))
        .await
        .map_err(db_error)?;
    info!(project_id = project.id, name = %project.name, "Created project");
    Ok(see_other(&project.to("")))
}

async fn project_page(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(Locale(locale)): Extension<Locale>,
    Path(id): Path<i64>,
) -> Result<Html<String>, TrackerError> {
    auth::require(&user, Permission::IssueView)?;
    let project = project_for(&state, id, &user).await?;
    let issues = state
        .db
        .call(move |db| db.list_issue_summaries(id))
        .await
        .map_err(db_error)?;
    Ok(views::project_page(&locale, &project, &issues, views::now()))
}

async fn edit_project_form(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(Locale(locale)): Extension<Locale>,
    Path(id): Path<i64>,
) -> Result<Html<String>, TrackerError> {
    auth::require(&user, Permission::ProjectModify)?;
    let ctx = RequestContext::load(&state, RouteIds::project(id), &user, &locale).await?;
    let request = ctx.form_request(FormKind::Project)?;
    form_page(&title(&locale, "edit_project"), &request, &locale, None, None)
}

async fn update_project(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(Locale(locale)): Extension<Locale>,
    Path(id): Path<i64>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, TrackerError> {
    auth::require(&user, Permission::ProjectModify)?;
    let ctx = RequestContext::load(&state, RouteIds::project(id), &user, &locale).await?;
    let input = FormInput::from_pairs(pairs);

    if input.has(DELETE_PROJECT) {
        state
            .db
            .call(move |db| db.delete_project(id))
            .await
            .map_err(db_error)?;
        info!(project_id = id, user_id = user.id, "Deleted project");
        return Ok(see_other(""));
    }

    let request = ctx.form_request(FormKind::Project)?;
    if let Some(page) = invalid_form(&title(&locale, "edit_project"), &request, &locale, &input)? {
        return Ok(page);
    }
    let update = downcast::<ProjectForm>(&request)?.project_update(&input);
    let project = state
        .db
        .call(move |db| db.update_project(id, &update))
        .await
        .map_err(db_error)?;
    info!(project_id = id, "Updated project");
    Ok(see_other(&project.to("")))
}

async fn project_activity(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, TrackerError> {
    auth::require(&user, Permission::IssueView)?;
    project_for(&state, id, &user).await?;
    let activity = state
        .db
        .call(move |db| db.project_activity(id, ACTIVITY_LIMIT))
        .await
        .map_err(db_error)?;
    Ok(Json(activity))
}

// ── Issues ────────────────────────────────────────────────────────────

async fn new_issue_form(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(Locale(locale)): Extension<Locale>,
    Path(id): Path<i64>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Html<String>, TrackerError> {
    auth::require(&user, Permission::IssueCreate)?;
    let ctx = RequestContext::load(&state, RouteIds::project(id), &user, &locale).await?;
    let request = ctx.form_request(FormKind::Issue)?;
    let input = query_input(query);
    form_page(&title(&locale, "new_issue"), &request, &locale, input.as_ref(), None)
}

async fn create_issue(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(Locale(locale)): Extension<Locale>,
    Path(id): Path<i64>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, TrackerError> {
    auth::require(&user, Permission::IssueCreate)?;
    let ctx = RequestContext::load(&state, RouteIds::project(id), &user, &locale).await?;
    let request = ctx.form_request(FormKind::Issue)?;
    let input = FormInput::from_pairs(pairs);
    if let Some(page) = invalid_form(&title(&locale, "new_issue"), &request, &locale, &input)? {
        return Ok(page);
    }

    let info = downcast::<IssueForm>(&request)?.new_issue(&input);
    let token = input.filled("upload_token").map(str::to_string);
    let user_id = user.id;
    let issue = state
        .db
        .call(move |db| {
            let issue = db.create_issue(id, user_id, &info)?;
            if let Some(token) = token {
                db.claim_attachments(&token, user_id, issue.id, None)?;
            }
            Ok(issue)
        })
        .await
        .map_err(db_error)?;
    info!(project_id = id, issue_id = issue.id, "Created issue");
    Ok(see_other(&issue.to("")))
}

async fn issue_page(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(Locale(locale)): Extension<Locale>,
    Path((id, issue_id)): Path<(i64, i64)>,
) -> Result<Html<String>, TrackerError> {
    auth::require(&user, Permission::IssueView)?;
    let ctx = RequestContext::load(&state, RouteIds::issue(id, issue_id), &user, &locale).await?;
    let issue = ctx
        .params
        .issue
        .ok_or(TrackerError::IssueNotFound { id: issue_id })?;
    let (comments, attachments) = state
        .db
        .call(move |db| {
            Ok((
                db.comments_for_issue(issue_id)?,
                db.attachments_for_issue(issue_id)?,
            ))
        })
        .await
        .map_err(db_error)?;

    let upload_token = uuid::Uuid::new_v4().to_string();
    Ok(views::issue_page(
        &locale,
        &issue,
        &comments,
        &attachments,
        views::CommentForm {
            upload_token: &upload_token,
            can_comment: user.permission(Permission::IssueComment),
        },
        views::now(),
    ))
}

/// Issues can be edited with `issue-modify` or by their creator.
fn require_issue_edit(user: &User, ctx: &RequestContext) -> Result<(), TrackerError> {
    let creator = ctx
        .params
        .issue
        .as_ref()
        .is_some_and(|issue| issue.created_by == user.id);
    if creator {
        return Ok(());
    }
    auth::require(user, Permission::IssueModify)
}

async fn edit_issue_form(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(Locale(locale)): Extension<Locale>,
    Path((id, issue_id)): Path<(i64, i64)>,
) -> Result<Html<String>, TrackerError> {
    let ctx = RequestContext::load(&state, RouteIds::issue(id, issue_id), &user, &locale).await?;
    require_issue_edit(&user, &ctx)?;
    let request = ctx.form_request(FormKind::Issue)?;
    form_page(&title(&locale, "edit_issue"), &request, &locale, None, None)
}

async fn update_issue(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(Locale(locale)): Extension<Locale>,
    Path((id, issue_id)): Path<(i64, i64)>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, TrackerError> {
    let ctx = RequestContext::load(&state, RouteIds::issue(id, issue_id), &user, &locale).await?;
    require_issue_edit(&user, &ctx)?;
    let input = FormInput::from_pairs(pairs);

    if input.has(DELETE_ISSUE) {
        auth::require(&user, Permission::IssueModify)?;
        state
            .db
            .call(move |db| db.delete_issue(issue_id))
            .await
            .map_err(db_error)?;
        info!(project_id = id, issue_id, user_id = user.id, "Deleted issue");
        return Ok(see_other(&format!("project/{}", id)));
    }

    let request = ctx.form_request(FormKind::Issue)?;
    if let Some(page) = invalid_form(&title(&locale, "edit_issue"), &request, &locale, &input)? {
        return Ok(page);
    }
    let update = downcast::<IssueForm>(&request)?.issue_update(&input);
    let user_id = user.id;
    let issue = state
        .db
        .call(move |db| db.update_issue(issue_id, user_id, &update))
        .await
        .map_err(db_error)?;
    info!(project_id = id, issue_id, "Updated issue");
    Ok(see_other(&issue.to("")))
}

async fn add_comment(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(Locale(locale)): Extension<Locale>,
    Path((id, issue_id)): Path<(i64, i64)>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, TrackerError> {
    auth::require(&user, Permission::IssueComment)?;
    let ctx = RequestContext::load(&state, RouteIds::issue(id, issue_id), &user, &locale).await?;
    let issue = ctx
        .params
        .issue
        .ok_or(TrackerError::IssueNotFound { id: issue_id })?;

    let input = FormInput::from_pairs(pairs);
    let mut rules = Rules::new();
    rules.insert("comment".into(), "required".into());
    let errors = rules::validate(&rules, &input)?;
    if !errors.is_empty() {
        return Err(TrackerError::Validation(errors));
    }

    let text = input.get("comment").unwrap_or_default().to_string();
    let token = input.filled("upload_token").map(str::to_string);
    let user_id = user.id;
    let comment = state
        .db
        .call(move |db| {
            let comment = db.add_comment(&issue, user_id, &text)?;
            if let Some(token) = token {
                db.claim_attachments(&token, user_id, issue.id, Some(comment.id))?;
            }
            Ok(comment)
        })
        .await
        .map_err(db_error)?;
    info!(issue_id, comment_id = comment.id, "Added comment");
    Ok(see_other(&format!("project/{}/issue/{}#comment{}", id, issue_id, comment.id)))
}

// ── Attachments ───────────────────────────────────────────────────────

async fn upload_attachment(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, TrackerError> {
    auth::require(&user, Permission::IssueCreate)?;
    project_for(&state, id, &user).await?;

    let mut token = None;
    let mut filename = None;
    let mut data = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| TrackerError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "upload_token" => {
                token = Some(field.text().await.map_err(|e| TrackerError::BadRequest(e.to_string()))?);
            }
            "Filename" => {
                filename = Some(field.text().await.map_err(|e| TrackerError::BadRequest(e.to_string()))?);
            }
            "Filedata" => {
                if filename.is_none() {
                    filename = field.file_name().map(str::to_string);
                }
                data = Some(field.bytes().await.map_err(|e| TrackerError::BadRequest(e.to_string()))?);
            }
            _ => {}
        }
    }

    let token = token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| TrackerError::BadRequest("Missing upload_token".into()))?;
    let data = data.ok_or_else(|| TrackerError::BadRequest("Missing Filedata".into()))?;
    let filename = filename
        .map(|f| file_basename(&f))
        .filter(|f| !f.is_empty())
        .ok_or_else(|| TrackerError::BadRequest("Missing Filename".into()))?;

    let attachment = state
        .store
        .upload_attachment(&state.db, id, user.id, &token, &filename, &data)
        .await?;
    info!(project_id = id, attachment_id = attachment.id, size = attachment.filesize, "Uploaded attachment");
    Ok(Json(attachment))
}

/// Last path component of a client-supplied file name.
fn file_basename(name: &str) -> String {
    FsPath::new(&name.replace('\\', "/"))
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn remove_attachment(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<impl IntoResponse, TrackerError> {
    auth::require(&user, Permission::IssueCreate)?;
    project_for(&state, id, &user).await?;
    let input = FormInput::from_pairs(pairs);
    let (Some(token), Some(filename)) = (input.filled("upload_token"), input.filled("filename")) else {
        return Err(TrackerError::BadRequest("Missing upload_token or filename".into()));
    };
    let removed = state
        .store
        .remove_attachment(&state.db, id, user.id, token, filename)
        .await?;
    Ok(Json(json!({"status": true, "removed": removed})))
}

/// Attachment bytes, checked against the project and issue in the URL.
async fn load_attachment(
    state: &SharedState,
    user: &User,
    (id, issue_id, attachment_id): (i64, i64, i64),
) -> Result<(super::models::Attachment, Vec<u8>), TrackerError> {
    auth::require(user, Permission::IssueView)?;
    project_for(state, id, user).await?;
    let attachment = state
        .db
        .call(move |db| {
            let issue = db
                .get_issue(issue_id)?
                .filter(|issue| issue.project_id == id)
                .ok_or(TrackerError::IssueNotFound { id: issue_id })?;
            let attachment = db
                .get_attachment(attachment_id)?
                .filter(|a| a.issue_id == Some(issue.id))
                .ok_or(TrackerError::AttachmentNotFound { id: attachment_id })?;
            Ok(attachment)
        })
        .await
        .map_err(db_error)?;
    let bytes = state.store.read(id, &attachment).await?;
    Ok((attachment, bytes))
}

fn file_response(filename: &str, bytes: Vec<u8>, disposition: &str) -> Response {
    let mime = mime_guess::from_path(filename).first_or_octet_stream();
    let disposition = format!(
        "{}; filename=\"{}\"",
        disposition,
        filename.replace(['"', '\r', '\n'], "")
    );
    (
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response()
}

async fn download_attachment(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(ids): Path<(i64, i64, i64)>,
) -> Result<Response, TrackerError> {
    let (attachment, bytes) = load_attachment(&state, &user, ids).await?;
    Ok(file_response(&attachment.filename, bytes, "attachment"))
}

async fn display_attachment(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(ids): Path<(i64, i64, i64)>,
) -> Result<Response, TrackerError> {
    let (attachment, bytes) = load_attachment(&state, &user, ids).await?;
    if !attachment.is_image() {
        return Err(TrackerError::AttachmentNotFound { id: attachment.id });
    }
    Ok(file_response(&attachment.filename, bytes, "inline"))
}

// ── Tags ──────────────────────────────────────────────────────────────

async fn new_tag_form(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(Locale(locale)): Extension<Locale>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Html<String>, TrackerError> {
    auth::require(&user, Permission::Administration)?;
    let ctx = RequestContext::load(&state, RouteIds::default(), &user, &locale).await?;
    let request = ctx.form_request(FormKind::Tag)?;
    let input = query_input(query);
    form_page(&title(&locale, "new_tag"), &request, &locale, input.as_ref(), None)
}

async fn create_tag(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(Locale(locale)): Extension<Locale>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, TrackerError> {
    auth::require(&user, Permission::Administration)?;
    let ctx = RequestContext::load(&state, RouteIds::default(), &user, &locale).await?;
    let request = ctx.form_request(FormKind::Tag)?;
    let input = FormInput::from_pairs(pairs);
    if let Some(page) = invalid_form(&title(&locale, "new_tag"), &request, &locale, &input)? {
        return Ok(page);
    }
    let info = downcast::<TagForm>(&request)?.new_tag(&input)?;
    let tag = state
        .db
        .call(move |db| db.create_tag(&info))
        .await
        .map_err(db_error)?;
    info!(tag_id = tag.id, name = %tag.name, "Created tag");
    Ok(see_other(&format!("administration/tag/{}/edit", tag.id)))
}

async fn edit_tag_form(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(Locale(locale)): Extension<Locale>,
    Path(id): Path<i64>,
) -> Result<Html<String>, TrackerError> {
    auth::require(&user, Permission::Administration)?;
    let ctx = RequestContext::load(&state, RouteIds::tag(id), &user, &locale).await?;
    let request = ctx.form_request(FormKind::Tag)?;
    form_page(&title(&locale, "edit_tag"), &request, &locale, None, None)
}

async fn update_tag(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(Locale(locale)): Extension<Locale>,
    Path(id): Path<i64>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, TrackerError> {
    auth::require(&user, Permission::Administration)?;
    let ctx = RequestContext::load(&state, RouteIds::tag(id), &user, &locale).await?;
    let request = ctx.form_request(FormKind::Tag)?;
    let input = FormInput::from_pairs(pairs);
    if let Some(page) = invalid_form(&title(&locale, "edit_tag"), &request, &locale, &input)? {
        return Ok(page);
    }
    let info = downcast::<TagForm>(&request)?.new_tag(&input)?;
    state
        .db
        .call(move |db| db.update_tag(id, &info))
        .await
        .map_err(db_error)?;
    info!(tag_id = id, "Updated tag");
    Ok(see_other(&format!("administration/tag/{}/edit", id)))
}

// ── Users ─────────────────────────────────────────────────────────────

fn user_rules() -> Rules {
    let mut rules = Rules::new();
    rules.insert("firstname".into(), "required|max:50".into());
    rules.insert("lastname".into(), "required|max:50".into());
    rules.insert("email".into(), "required|email".into());
    rules.insert("role_id".into(), "required|numeric".into());
    rules
}

async fn create_user(
    State(state): State<SharedState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, TrackerError> {
    auth::require(&admin, Permission::Administration)?;
    let input = FormInput::from_pairs(pairs);
    let errors = rules::validate(&user_rules(), &input)?;
    if !errors.is_empty() {
        return Err(TrackerError::Validation(errors));
    }

    let role = input
        .get_i64("role_id")
        .and_then(Role::from_id)
        .ok_or_else(|| TrackerError::BadRequest("Unknown role".into()))?;
    let password = input
        .filled("password")
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    let info = NewUser {
        email: input.get("email").unwrap_or_default().trim().to_string(),
        firstname: input.get("firstname").unwrap_or_default().trim().to_string(),
        lastname: input.get("lastname").unwrap_or_default().trim().to_string(),
        role,
        private: input.get_i64("private") == Some(1),
        password,
        status: 1,
    };
    let language = state.settings.language.clone();
    let user = state
        .db
        .call(move |db| db.create_user(&info, &language))
        .await
        .map_err(db_error)?;
    info!(user_id = user.id, role = user.role.as_str(), "Created user");
    Ok((StatusCode::CREATED, Json(user)).into_response())
}

async fn delete_user(
    State(state): State<SharedState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, TrackerError> {
    auth::require(&admin, Permission::Administration)?;
    if id == admin.id {
        return Err(TrackerError::BadRequest("Cannot delete your own account".into()));
    }
    let deleted = state
        .db
        .call(move |db| db.delete_user(id))
        .await
        .map_err(db_error)?;
    if !deleted {
        return Err(TrackerError::UserNotFound { id });
    }
    warn!(user_id = id, by = admin.id, "Deleted user");
    Ok(Json(json!({"status": true})))
}

/// Settings a user may change on their own account.
fn settings_update(input: &FormInput) -> Result<UserUpdate, TrackerError> {
    let language = input.filled("language").map(str::to_string);
    if let Some(language) = &language
        && !lang::is_supported(language)
    {
        return Err(TrackerError::BadRequest(format!("Unsupported language: {}", language)));
    }
    Ok(UserUpdate {
        email: input.filled("email").map(str::to_string),
        firstname: input.filled("firstname").map(str::to_string),
        lastname: input.filled("lastname").map(str::to_string),
        language,
        password: input.get("password").map(str::to_string),
        private: input.get_i64("private").map(|v| v == 1),
        status: input.get_i64("status"),
        role: None,
    })
}

async fn update_settings(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<impl IntoResponse, TrackerError> {
    let input = FormInput::from_pairs(pairs);
    let mut rules = Rules::new();
    if input.has("email") {
        rules.insert("email".into(), "required|email".into());
    }
    let errors = rules::validate(&rules, &input)?;
    if !errors.is_empty() {
        return Err(TrackerError::Validation(errors));
    }

    let update = settings_update(&input)?;
    let id = user.id;
    let user = state
        .db
        .call(move |db| db.update_setting(id, update))
        .await
        .map_err(db_error)?;
    info!(user_id = id, "Updated settings");
    Ok(Json(user))
}

/// `projects[{project_id}]={message_id}` pairs.
fn message_settings(pairs: &[(String, String)]) -> Result<BTreeMap<i64, i64>, TrackerError> {
    let mut settings = BTreeMap::new();
    for (key, value) in pairs {
        let Some(project) = key
            .strip_prefix("projects[")
            .and_then(|rest| rest.strip_suffix(']'))
        else {
            continue;
        };
        let project = project
            .parse::<i64>()
            .map_err(|_| TrackerError::BadRequest(format!("Invalid project id: {}", project)))?;
        let message = value
            .parse::<i64>()
            .map_err(|_| TrackerError::BadRequest(format!("Invalid message id: {}", value)))?;
        settings.insert(project, message);
    }
    Ok(settings)
}

async fn update_messages_settings(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<impl IntoResponse, TrackerError> {
    let settings = message_settings(&pairs)?;
    let id = user.id;
    let updated = state
        .db
        .call(move |db| db.update_messages_settings(id, &settings))
        .await
        .map_err(db_error)?;
    Ok(Json(json!({"status": true, "updated": updated})))
}

#[cfg(test)]
pub(crate) fn test_state(db: DbHandle, root: &FsPath) -> SharedState {
    Arc::new(AppState {
        db,
        store: AttachmentStore::new(root),
        settings: Settings::default(),
    })
}

//! Resolve route ids into the records a request works on.

use super::api::SharedState;
use super::db::TrackerDb;
use super::models::{Permission, Project, User};
use crate::errors::TrackerError;
use crate::form::request::FormRequest;
use crate::form::{FormEnv, FormKind, ProjectBinding, RouteParams};

/// Map a storage error onto the handler error type. Closures passed to
/// `DbHandle::call` may return a `TrackerError` through `anyhow`; it is
/// recovered here instead of being reported as a database failure.
pub fn db_error(e: anyhow::Error) -> TrackerError {
    match e.downcast::<TrackerError>() {
        Ok(err) => err,
        Err(e) => TrackerError::Database(e),
    }
}

/// Record ids taken from the URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteIds {
    pub project: Option<i64>,
    pub issue: Option<i64>,
    pub tag: Option<i64>,
}

impl RouteIds {
    pub fn project(id: i64) -> Self {
        Self {
            project: Some(id),
            ..Default::default()
        }
    }

    pub fn issue(project_id: i64, issue_id: i64) -> Self {
        Self {
            project: Some(project_id),
            issue: Some(issue_id),
            tag: None,
        }
    }

    pub fn tag(id: i64) -> Self {
        Self {
            tag: Some(id),
            ..Default::default()
        }
    }
}

/// A project the caller may see. Private projects are visible to members
/// and to callers holding `project-all`; to everyone else they do not exist.
fn visible_project(db: &TrackerDb, id: i64, caller: &User) -> anyhow::Result<Project> {
    let project = db
        .get_project(id)?
        .ok_or(TrackerError::ProjectNotFound { id })?;
    if project.private && !caller.permission(Permission::ProjectAll) {
        let member = db
            .project_memberships(caller.id)?
            .iter()
            .any(|m| m.project_id == id);
        if !member {
            return Err(TrackerError::ProjectNotFound { id }.into());
        }
    }
    Ok(project)
}

pub async fn project_for(
    state: &SharedState,
    id: i64,
    caller: &User,
) -> Result<Project, TrackerError> {
    let caller = caller.clone();
    state
        .db
        .call(move |db| visible_project(db, id, &caller))
        .await
        .map_err(db_error)
}

/// Everything a form-backed handler needs: the route's records and the
/// environment forms are built with.
pub struct RequestContext {
    pub params: RouteParams,
    pub env: FormEnv,
}

impl RequestContext {
    pub async fn load(
        state: &SharedState,
        ids: RouteIds,
        caller: &User,
        locale: &str,
    ) -> Result<Self, TrackerError> {
        let who = caller.clone();
        let (params, tags) = state
            .db
            .call(move |db| {
                let project = match ids.project {
                    Some(id) => Some(ProjectBinding {
                        project: visible_project(db, id, &who)?,
                        assignees: db.users_can_fix_issue(id)?,
                        kanban_tag_ids: db.kanban_tag_ids(id)?,
                    }),
                    None => None,
                };
                let issue = match ids.issue {
                    Some(id) => Some(
                        db.get_issue(id)?
                            .filter(|issue| Some(issue.project_id) == ids.project)
                            .ok_or(TrackerError::IssueNotFound { id })?,
                    ),
                    None => None,
                };
                let tag = match ids.tag {
                    Some(id) => Some(
                        db.get_tag(id)?
                            .filter(|tag| !tag.group)
                            .ok_or(TrackerError::TagNotFound { id })?,
                    ),
                    None => None,
                };
                Ok((RouteParams { project, issue, tag }, db.tag_groups()?))
            })
            .await
            .map_err(db_error)?;

        Ok(Self {
            params,
            env: FormEnv::new(Some(caller.clone()), locale, tags),
        })
    }

    /// Resolve the route's declared form against the loaded records.
    pub fn form_request(&self, kind: FormKind) -> Result<FormRequest, TrackerError> {
        FormRequest::for_kind(kind, self.params.clone(), self.env.clone()).map_err(TrackerError::Other)
    }

    pub fn project(&self) -> Option<&Project> {
        self.params.project.as_ref().map(|b| &b.project)
    }
}

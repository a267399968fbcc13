use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── Roles & permissions ──────────────────────────────────────────────

/// User roles, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Developer,
    Manager,
    Administrator,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::User,
        Role::Developer,
        Role::Manager,
        Role::Administrator,
    ];

    pub fn id(&self) -> i64 {
        match self {
            Self::User => 1,
            Self::Developer => 2,
            Self::Manager => 3,
            Self::Administrator => 4,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.id() == id)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Developer => "developer",
            Self::Manager => "manager",
            Self::Administrator => "administrator",
        }
    }

    /// Permissions granted to the role. Each role inherits the one below it.
    pub fn permissions(&self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Self::User => &[IssueView, IssueCreate, IssueComment],
            Self::Developer => &[IssueView, IssueCreate, IssueComment, IssueModify],
            Self::Manager => &[
                IssueView,
                IssueCreate,
                IssueComment,
                IssueModify,
                IssueLockQuote,
                ProjectCreate,
                ProjectModify,
                ProjectAll,
            ],
            Self::Administrator => &[
                IssueView,
                IssueCreate,
                IssueComment,
                IssueModify,
                IssueLockQuote,
                ProjectCreate,
                ProjectModify,
                ProjectAll,
                Administration,
            ],
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "developer" => Ok(Self::Developer),
            "manager" => Ok(Self::Manager),
            "administrator" => Ok(Self::Administrator),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    IssueView,
    IssueCreate,
    IssueComment,
    IssueModify,
    IssueLockQuote,
    ProjectCreate,
    ProjectModify,
    ProjectAll,
    Administration,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IssueView => "issue-view",
            Self::IssueCreate => "issue-create",
            Self::IssueComment => "issue-comment",
            Self::IssueModify => "issue-modify",
            Self::IssueLockQuote => "issue-lock-quote",
            Self::ProjectCreate => "project-create",
            Self::ProjectModify => "project-modify",
            Self::ProjectAll => "project-all",
            Self::Administration => "administration",
        }
    }
}

// ── Users ────────────────────────────────────────────────────────────

/// Value stored in `users.deleted` for soft-deleted accounts.
pub const DELETED_USERS: i64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub firstname: String,
    pub lastname: String,
    pub role: Role,
    pub private: bool,
    pub status: i64,
    pub language: String,
    pub deleted: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn fullname(&self) -> String {
        format!("{} {}", self.firstname, self.lastname)
    }

    pub fn permission(&self, permission: Permission) -> bool {
        !self.deleted && self.role.permissions().contains(&permission)
    }
}

/// Input for creating a user. The password is plain text and hashed on insert.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub firstname: String,
    pub lastname: String,
    pub role: Role,
    pub private: bool,
    pub password: String,
    pub status: i64,
}

/// Partial user update. `None` leaves the column untouched; an empty
/// password is treated the same as `None`.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub language: Option<String>,
    pub password: Option<String>,
    pub private: Option<bool>,
    pub status: Option<i64>,
    pub role: Option<Role>,
}

impl UserUpdate {
    /// Restrict the update to the columns a user may change on their own
    /// settings page.
    pub fn settings_only(self) -> Self {
        Self { role: None, ..self }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectUser {
    pub id: i64,
    pub user_id: i64,
    pub project_id: i64,
    pub message_id: i64,
}

// ── Projects ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Open,
    Archived,
}

impl ProjectStatus {
    pub fn id(&self) -> i64 {
        match self {
            Self::Open => 1,
            Self::Archived => 0,
        }
    }

    pub fn from_id(id: i64) -> Self {
        if id == 0 { Self::Archived } else { Self::Open }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub private: bool,
    pub status: ProjectStatus,
    pub default_assignee: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl Project {
    pub const PRIVATE_YES: i64 = 1;
    pub const PRIVATE_NO: i64 = 0;

    /// Relative URL of the project, optionally with a trailing segment.
    pub fn to(&self, suffix: &str) -> String {
        if suffix.is_empty() {
            format!("project/{}", self.id)
        } else {
            format!("project/{}/{}", self.id, suffix)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub name: String,
    pub private: bool,
    pub default_assignee: Option<i64>,
    pub user_ids: Vec<i64>,
    pub kanban_tag_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub private: Option<bool>,
    pub status: Option<ProjectStatus>,
    pub default_assignee: Option<Option<i64>>,
    pub kanban_tag_ids: Option<Vec<i64>>,
}

// ── Tags ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    /// Id of the owning group; 0 for group rows.
    pub parent_id: i64,
    pub name: String,
    pub bgcolor: String,
    pub group: bool,
    pub role_limit: Option<Role>,
}

impl Tag {
    pub const STATUS_OPEN: &'static str = "open";
    pub const STATUS_CLOSED: &'static str = "closed";
    pub const GROUP_STATUS: &'static str = "status";
    pub const GROUP_TYPE: &'static str = "type";
    pub const GROUP_RESOLUTION: &'static str = "resolution";

    /// Whether a caller with `role` may see and pick this tag. Guests only
    /// see unrestricted tags.
    pub fn can_view(&self, role: Option<Role>) -> bool {
        match (self.role_limit, role) {
            (None, _) => true,
            (Some(limit), Some(role)) => role >= limit,
            (Some(_), None) => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagGroup {
    pub group: Tag,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone)]
pub struct NewTag {
    pub parent_id: i64,
    pub name: String,
    pub bgcolor: String,
    pub role_limit: Option<Role>,
}

// ── Issues ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    Closed,
}

impl IssueStatus {
    pub fn id(&self) -> i64 {
        match self {
            Self::Open => 1,
            Self::Closed => 0,
        }
    }

    pub fn from_id(id: i64) -> Self {
        if id == 0 { Self::Closed } else { Self::Open }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: i64,
    pub project_id: i64,
    pub title: String,
    pub body: String,
    pub created_by: i64,
    pub updated_by: Option<i64>,
    pub assigned_to: Option<i64>,
    /// Quoted effort in seconds.
    pub time_quote: i64,
    pub lock_quote: bool,
    pub status: IssueStatus,
    pub tags: Vec<Tag>,
    pub created_at: String,
    pub updated_at: String,
}

impl Issue {
    pub fn is_quote_locked(&self) -> bool {
        self.lock_quote
    }

    /// Relative URL of the issue, optionally with a trailing segment.
    pub fn to(&self, suffix: &str) -> String {
        if suffix.is_empty() {
            format!("project/{}/issue/{}", self.project_id, self.id)
        } else {
            format!("project/{}/issue/{}/{}", self.project_id, self.id, suffix)
        }
    }
}

/// Fields of a new issue. `tag_ids` holds at most one tag per group.
#[derive(Debug, Clone, Default)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    pub assigned_to: Option<i64>,
    pub time_quote: i64,
    pub lock_quote: bool,
    pub tag_ids: Vec<i64>,
}

/// Partial issue update. Tags replace the issue's tag in the same group.
#[derive(Debug, Clone, Default)]
pub struct IssueUpdate {
    pub title: Option<String>,
    pub body: Option<String>,
    pub assigned_to: Option<Option<i64>>,
    pub time_quote: Option<i64>,
    pub lock_quote: Option<bool>,
    pub tag_ids: Vec<i64>,
    /// Groups whose tag should be removed without replacement.
    pub cleared_groups: Vec<i64>,
}

/// Row of the project issue list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueSummary {
    pub issue: Issue,
    pub count_comments: i64,
    pub created_by_name: String,
    pub updated_by_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub project_id: i64,
    pub issue_id: i64,
    pub created_by: i64,
    pub comment: String,
    pub created_at: String,
}

// ── Attachments ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub issue_id: Option<i64>,
    pub comment_id: Option<i64>,
    pub uploaded_by: i64,
    pub filename: String,
    pub fileextension: String,
    pub filesize: i64,
    pub upload_token: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Attachment {
    const IMAGE_EXTENSIONS: [&'static str; 8] =
        ["jpg", "jpeg", "JPG", "JPEG", "png", "PNG", "gif", "GIF"];

    /// Whether the file extension is a supported image type.
    pub fn is_image(&self) -> bool {
        Self::IMAGE_EXTENSIONS.contains(&self.fileextension.as_str())
    }

    /// Download URL; `None` while the attachment is not yet linked to an issue.
    pub fn download(&self, project_id: i64) -> Option<String> {
        self.url(project_id, "download")
    }

    /// Inline display URL; `None` while the attachment is not yet linked.
    pub fn display(&self, project_id: i64) -> Option<String> {
        self.url(project_id, "display")
    }

    fn url(&self, project_id: i64, action: &str) -> Option<String> {
        self.issue_id.map(|issue_id| {
            format!(
                "project/{}/issue/{}/{}/{}",
                project_id, issue_id, action, self.id
            )
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewAttachment {
    /// Project whose upload directory holds the file.
    pub project_id: i64,
    pub uploaded_by: i64,
    pub filename: String,
    pub fileextension: String,
    pub filesize: i64,
    pub upload_token: String,
}

// ── Activity ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    CreateIssue,
    Comment,
    CloseIssue,
    ReopenIssue,
    ReassignIssue,
    IssueTag,
    Note,
    IssueMove,
}

impl ActivityType {
    pub fn id(&self) -> i64 {
        match self {
            Self::CreateIssue => 1,
            Self::Comment => 2,
            Self::CloseIssue => 3,
            Self::ReopenIssue => 4,
            Self::ReassignIssue => 5,
            Self::IssueTag => 6,
            Self::Note => 7,
            Self::IssueMove => 8,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        [
            Self::CreateIssue,
            Self::Comment,
            Self::CloseIssue,
            Self::ReopenIssue,
            Self::ReassignIssue,
            Self::IssueTag,
            Self::Note,
            Self::IssueMove,
        ]
        .into_iter()
        .find(|t| t.id() == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    pub type_id: ActivityType,
    /// Owning project.
    pub parent_id: i64,
    pub user_id: i64,
    /// Issue the activity is about.
    pub item_id: i64,
    /// Secondary record (comment id, assignee id, ...).
    pub action_id: Option<i64>,
    pub data: Option<serde_json::Value>,
    pub created_at: String,
    pub updated_at: String,
}

impl Activity {
    /// Look up a value in `data` using "dot" notation, e.g. `tags.added`.
    pub fn data_value(&self, name: &str) -> Option<&serde_json::Value> {
        let mut current = self.data.as_ref()?;
        for segment in name.split('.') {
            current = match current {
                serde_json::Value::Object(map) => map.get(segment)?,
                serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Like [`Activity::data_value`] but always yields a list: arrays are
    /// returned element-wise, scalars as a single item, missing as empty.
    pub fn data_collection(&self, name: &str) -> Vec<serde_json::Value> {
        match self.data_value(name) {
            Some(serde_json::Value::Array(items)) => items.clone(),
            Some(serde_json::Value::Null) | None => Vec::new(),
            Some(other) => vec![other.clone()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub type_id: ActivityType,
    pub parent_id: i64,
    pub user_id: i64,
    pub item_id: i64,
    pub action_id: Option<i64>,
    pub data: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn activity(data: serde_json::Value) -> Activity {
        Activity {
            id: 1,
            type_id: ActivityType::IssueTag,
            parent_id: 1,
            user_id: 1,
            item_id: 1,
            action_id: None,
            data: Some(data),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn attachment(ext: &str, issue_id: Option<i64>) -> Attachment {
        Attachment {
            id: 9,
            issue_id,
            comment_id: None,
            uploaded_by: 1,
            filename: format!("file.{}", ext),
            fileextension: ext.to_string(),
            filesize: 10,
            upload_token: "tok".to_string(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_role_roundtrip() {
        for role in Role::ALL {
            assert_eq!(Role::from_id(role.id()), Some(role));
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!(Role::from_id(99).is_none());
        assert!("invalid".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_permissions_are_cumulative() {
        for pair in Role::ALL.windows(2) {
            for permission in pair[0].permissions() {
                assert!(pair[1].permissions().contains(permission));
            }
        }
        assert!(!Role::User.permissions().contains(&Permission::IssueModify));
        assert!(Role::Developer.permissions().contains(&Permission::IssueModify));
        assert!(!Role::Developer.permissions().contains(&Permission::IssueLockQuote));
        assert!(Role::Manager.permissions().contains(&Permission::IssueLockQuote));
    }

    #[test]
    fn test_deleted_user_has_no_permissions() {
        let user = User {
            id: 1,
            email: "a@b.c".into(),
            firstname: "A".into(),
            lastname: "B".into(),
            role: Role::Administrator,
            private: false,
            status: 1,
            language: "en".into(),
            deleted: true,
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert!(!user.permission(Permission::IssueView));
        assert_eq!(user.fullname(), "A B");
    }

    #[test]
    fn test_tag_visibility() {
        let mut tag = Tag {
            id: 1,
            parent_id: 2,
            name: "testing".into(),
            bgcolor: "#fff".into(),
            group: false,
            role_limit: None,
        };
        assert!(tag.can_view(None));
        tag.role_limit = Some(Role::Manager);
        assert!(!tag.can_view(None));
        assert!(!tag.can_view(Some(Role::Developer)));
        assert!(tag.can_view(Some(Role::Manager)));
        assert!(tag.can_view(Some(Role::Administrator)));
    }

    #[test]
    fn test_attachment_is_image() {
        assert!(attachment("png", None).is_image());
        assert!(attachment("JPEG", None).is_image());
        assert!(!attachment("pdf", None).is_image());
        assert!(!attachment("Png", None).is_image());
    }

    #[test]
    fn test_attachment_urls() {
        let linked = attachment("png", Some(4));
        assert_eq!(linked.download(3).as_deref(), Some("project/3/issue/4/download/9"));
        assert_eq!(linked.display(3).as_deref(), Some("project/3/issue/4/display/9"));
        assert!(attachment("png", None).download(3).is_none());
    }

    #[test]
    fn test_activity_data_value_dot_notation() {
        let a = activity(json!({"tags": {"added": [{"id": 3}], "removed": []}, "to": 5}));
        assert_eq!(a.data_value("to"), Some(&json!(5)));
        assert_eq!(a.data_value("tags.added.0.id"), Some(&json!(3)));
        assert!(a.data_value("tags.missing").is_none());
        assert!(a.data_value("to.deeper").is_none());
    }

    #[test]
    fn test_activity_data_collection() {
        let a = activity(json!({"tags": {"added": [1, 2]}, "to": 5}));
        assert_eq!(a.data_collection("tags.added"), vec![json!(1), json!(2)]);
        assert_eq!(a.data_collection("to"), vec![json!(5)]);
        assert!(a.data_collection("nope").is_empty());
    }

    #[test]
    fn test_activity_type_ids() {
        assert_eq!(ActivityType::from_id(1), Some(ActivityType::CreateIssue));
        assert_eq!(ActivityType::from_id(8), Some(ActivityType::IssueMove));
        assert!(ActivityType::from_id(0).is_none());
    }

    #[test]
    fn test_urls() {
        let project = Project {
            id: 3,
            name: "p".into(),
            private: false,
            status: ProjectStatus::Open,
            default_assignee: None,
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert_eq!(project.to(""), "project/3");
        assert_eq!(project.to("edit"), "project/3/edit");
        assert_eq!(ProjectStatus::from_id(0), ProjectStatus::Archived);
        assert_eq!(IssueStatus::from_id(1), IssueStatus::Open);
    }
}

//! Schema-driven forms.
//!
//! A [`FormDefinition`] describes one entity's editable fields, action
//! buttons and validation rules as data. [`render::FormRenderer`] turns a
//! definition into HTML; [`request::FormRequest`] resolves the definition
//! for a route and validates submitted input against its rules.
//!
//! Definitions are built per request: construct with a [`FormEnv`], bind
//! the route's records with [`FormDefinition::setup`], then query.

pub mod field;
pub mod input;
pub mod issue;
pub mod project;
pub mod render;
pub mod request;
pub mod rules;
pub mod tag;

use std::any::Any;

use indexmap::IndexMap;

use crate::tracker::models::{Issue, Permission, Project, Role, Tag, TagGroup, User};

pub use field::{Action, ActionButton, ButtonStyle, Choice, Field, FieldKind, Fields};
pub use field::{Actions, Rules, SelectOption};
pub use input::FormInput;
pub use rules::{RuleError, ValidationErrors};

/// Entity kinds that have a form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormKind {
    Issue,
    Project,
    Tag,
}

impl FormKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::Project => "project",
            Self::Tag => "tag",
        }
    }

    /// A fresh, unbound definition of this kind.
    pub fn build(&self, env: FormEnv) -> Box<dyn FormDefinition> {
        match self {
            Self::Issue => Box::new(issue::IssueForm::new(env)),
            Self::Project => Box::new(project::ProjectForm::new(env)),
            Self::Tag => Box::new(tag::TagForm::new(env)),
        }
    }
}

/// How the `<form>` element is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenType {
    #[default]
    Horizontal,
    Vertical,
    Inline,
}

impl OpenType {
    pub fn css_class(&self) -> &'static str {
        match self {
            Self::Horizontal => "form-horizontal",
            Self::Vertical => "form-vertical",
            Self::Inline => "form-inline",
        }
    }
}

/// A project as seen by its forms: the record plus the lookups the forms
/// need from it.
#[derive(Debug, Clone)]
pub struct ProjectBinding {
    pub project: Project,
    /// Members allowed to fix issues, for assignee selects.
    pub assignees: Vec<User>,
    pub kanban_tag_ids: Vec<i64>,
}

/// Records resolved from the current route.
#[derive(Debug, Clone, Default)]
pub struct RouteParams {
    pub project: Option<ProjectBinding>,
    pub issue: Option<Issue>,
    pub tag: Option<Tag>,
}

/// Request-scoped context a definition reads from.
#[derive(Debug, Clone)]
pub struct FormEnv {
    pub caller: Option<User>,
    pub locale: String,
    pub tags: Vec<TagGroup>,
}

impl FormEnv {
    pub fn new(caller: Option<User>, locale: impl Into<String>, tags: Vec<TagGroup>) -> Self {
        Self {
            caller,
            locale: locale.into(),
            tags,
        }
    }

    /// Guests hold no permissions.
    pub fn can(&self, permission: Permission) -> bool {
        self.caller
            .as_ref()
            .is_some_and(|user| user.permission(permission))
    }

    pub fn role(&self) -> Option<Role> {
        self.caller.as_ref().map(|user| user.role)
    }

    pub fn tag_group(&self, name: &str) -> Option<&TagGroup> {
        self.tags.iter().find(|g| g.group.name == name)
    }

    pub fn trans(&self, key: &str) -> String {
        crate::lang::trans(&self.locale, key)
    }
}

/// Declarative description of an entity form.
pub trait FormDefinition: Any + Send + Sync {
    fn kind(&self) -> FormKind;

    fn as_any(&self) -> &dyn Any;

    /// Bind route records. Called once, before any other query.
    fn setup(&mut self, params: RouteParams) -> anyhow::Result<()>;

    /// True when a record was bound by [`FormDefinition::setup`].
    fn is_editing(&self) -> bool;

    fn fields(&self) -> Fields;

    fn actions(&self) -> Actions;

    fn rules(&self) -> Rules;

    /// URL of the form page, relative to the site root.
    fn redirect_url(&self) -> String;

    fn open_type(&self) -> OpenType {
        OpenType::default()
    }

    /// Values of the bound record keyed by field name; empty when creating.
    fn model_values(&self) -> IndexMap<String, String> {
        IndexMap::new()
    }
}

/// `group[sub]` names a sub-field of a group field.
fn group_member(field_set: &Fields, name: &str) -> bool {
    name.strip_suffix(']')
        .and_then(|rest| rest.split_once('['))
        .and_then(|(group, sub)| field_set.get(group)?.sub_field(sub))
        .is_some()
}

/// Action keys that fields may not use.
pub const RESERVED_ACTION_NAMES: [&str; 2] = ["submit", "delete"];

/// Structural problems of a definition: fields that collide with action
/// names, and rules that name no field of `field_set`.
pub fn definition_problems(
    field_set: &Fields,
    actions: &Actions,
    rules: &Rules,
) -> Vec<String> {
    let mut problems = Vec::new();
    for name in field_set.keys() {
        let bare = name.trim_end_matches("[]");
        if RESERVED_ACTION_NAMES.contains(&bare)
            || actions.keys().any(|k| k == bare)
            || actions.values().any(|a| a.posted_name() == Some(bare))
        {
            problems.push(format!("field '{}' collides with an action name", name));
        }
    }
    for name in rules.keys() {
        let bare = name.trim_end_matches("[]");
        let known = field_set
            .keys()
            .any(|f| f == name || f.trim_end_matches("[]") == bare)
            || group_member(field_set, bare);
        if !known {
            problems.push(format!("rule for unknown field '{}'", name));
        }
    }
    for (name, field) in field_set {
        let empty = match &field.kind {
            FieldKind::Select { options } => options.is_empty(),
            FieldKind::RadioGroup { choices, .. } | FieldKind::CheckboxGroup { choices } => {
                choices.is_empty()
            }
            _ => false,
        };
        if empty {
            problems.push(format!("field '{}' has no options", name));
        }
    }
    problems
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::tracker::models::{IssueStatus, ProjectStatus};

    pub fn user(id: i64, role: Role) -> User {
        User {
            id,
            email: format!("user{}@example.com", id),
            firstname: format!("User{}", id),
            lastname: "Test".into(),
            role,
            private: false,
            status: 1,
            language: "en".into(),
            deleted: false,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn tag(id: i64, parent_id: i64, name: &str, role_limit: Option<Role>) -> Tag {
        Tag {
            id,
            parent_id,
            name: name.into(),
            bgcolor: "#cccccc".into(),
            group: parent_id == 0,
            role_limit,
        }
    }

    /// Groups: status=1 (open 11, closed 12, testing 13, in progress 14),
    /// type=2 (bug 21, feature 22), resolution=3 (fixed 31, secret 32 for
    /// managers).
    pub fn tag_groups() -> Vec<TagGroup> {
        vec![
            TagGroup {
                group: tag(3, 0, "resolution", None),
                tags: vec![
                    tag(31, 3, "fixed", None),
                    tag(32, 3, "secret", Some(Role::Manager)),
                ],
            },
            TagGroup {
                group: tag(1, 0, "status", None),
                tags: vec![
                    tag(11, 1, "open", None),
                    tag(12, 1, "closed", None),
                    tag(13, 1, "testing", None),
                    tag(14, 1, "in progress", None),
                ],
            },
            TagGroup {
                group: tag(2, 0, "type", None),
                tags: vec![tag(21, 2, "bug", None), tag(22, 2, "feature", None)],
            },
        ]
    }

    pub fn find_tag(id: i64) -> Tag {
        tag_groups()
            .into_iter()
            .flat_map(|g| g.tags)
            .find(|t| t.id == id)
            .unwrap()
    }

    pub fn env(role: Option<Role>) -> FormEnv {
        FormEnv::new(role.map(|r| user(1, r)), "en", tag_groups())
    }

    pub fn binding() -> ProjectBinding {
        ProjectBinding {
            project: Project {
                id: 5,
                name: "Tinyissue".into(),
                private: false,
                status: ProjectStatus::Open,
                default_assignee: Some(8),
                created_at: String::new(),
                updated_at: String::new(),
            },
            assignees: vec![user(8, Role::Developer), user(9, Role::Manager)],
            kanban_tag_ids: vec![13],
        }
    }

    pub fn issue(time_quote: i64, lock_quote: bool, tag_ids: &[i64]) -> Issue {
        Issue {
            id: 42,
            project_id: 5,
            title: "Broken <b>".into(),
            body: "Steps".into(),
            created_by: 1,
            updated_by: None,
            assigned_to: Some(9),
            time_quote,
            lock_quote,
            status: IssueStatus::Open,
            tags: tag_ids.iter().map(|id| find_tag(*id)).collect(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }
}

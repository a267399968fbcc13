//! Add/edit project form.

use indexmap::IndexMap;

use super::field::title_case;
use super::*;
use crate::lang;
use crate::tracker::models::{NewProject, ProjectStatus, ProjectUpdate, Tag};

pub struct ProjectForm {
    env: FormEnv,
    binding: Option<ProjectBinding>,
}

impl ProjectForm {
    pub fn new(env: FormEnv) -> Self {
        Self { env, binding: None }
    }

    fn project(&self) -> Option<&Project> {
        self.binding.as_ref().map(|b| &b.project)
    }

    /// Status tags other than open/closed, offered as kanban columns.
    fn kanban_columns_field(&self) -> Option<Field> {
        let group = self.env.tag_group(Tag::GROUP_STATUS)?;
        let selected = self
            .binding
            .as_ref()
            .map(|b| b.kanban_tag_ids.as_slice())
            .unwrap_or_default();
        let choices: Vec<Choice> = group
            .tags
            .iter()
            .filter(|t| t.name != Tag::STATUS_OPEN && t.name != Tag::STATUS_CLOSED)
            .map(|t| {
                Choice::new(title_case(&t.name), t.id, t.bgcolor.clone())
                    .checked(selected.contains(&t.id))
            })
            .collect();
        if choices.is_empty() {
            return None;
        }
        Some(
            Field::checkboxes(choices)
                .label("columns")
                .help(self.env.trans("columns_help")),
        )
    }

    fn submitted_columns(fields: &Fields, input: &FormInput) -> Option<Vec<i64>> {
        let field = fields.get("columns[]")?;
        Some(
            input
                .get_all("columns")
                .iter()
                .filter(|v| field.accepts(v))
                .filter_map(|v| v.parse().ok())
                .collect(),
        )
    }

    fn submitted_private(input: &FormInput) -> Option<bool> {
        input
            .get_i64("private")
            .map(|v| v == Project::PRIVATE_YES)
    }

    pub fn new_project(&self, input: &FormInput) -> NewProject {
        let fields = self.fields();
        NewProject {
            name: input.get("name").unwrap_or_default().trim().to_string(),
            private: Self::submitted_private(input).unwrap_or(false),
            default_assignee: input.get_i64("default_assignee").filter(|id| *id > 0),
            user_ids: input.get_all_i64("user"),
            kanban_tag_ids: Self::submitted_columns(&fields, input).unwrap_or_default(),
        }
    }

    pub fn project_update(&self, input: &FormInput) -> ProjectUpdate {
        let fields = self.fields();
        let default_assignee = match (fields.get("default_assignee"), input.filled("default_assignee")) {
            (Some(field), Some(value)) if field.accepts(value) => {
                Some(value.parse::<i64>().ok().filter(|id| *id > 0))
            }
            _ => None,
        };
        ProjectUpdate {
            name: input.filled("name").map(str::to_string),
            private: Self::submitted_private(input),
            status: input.get_i64("status").map(ProjectStatus::from_id),
            default_assignee,
            kanban_tag_ids: Self::submitted_columns(&fields, input),
        }
    }
}

impl FormDefinition for ProjectForm {
    fn kind(&self) -> FormKind {
        FormKind::Project
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn setup(&mut self, params: RouteParams) -> anyhow::Result<()> {
        self.binding = params.project;
        Ok(())
    }

    fn is_editing(&self) -> bool {
        self.binding.is_some()
    }

    fn fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("name".into(), Field::text().label("name"));
        fields.insert(
            "private".into(),
            Field::select(vec![
                SelectOption::new(Project::PRIVATE_YES, self.env.trans("private")),
                SelectOption::new(Project::PRIVATE_NO, self.env.trans("public")),
            ])
            .label("visibility"),
        );
        fields.insert(
            "default_assignee".into(),
            Field::hidden().id("default_assignee-id"),
        );

        match &self.binding {
            None => {
                fields.insert(
                    "user".into(),
                    Field::select_user()
                        .label("assign_users")
                        .id("add-user-project")
                        .placeholder(self.env.trans("assign_a_user")),
                );
            }
            Some(binding) => {
                fields.insert(
                    "status".into(),
                    Field::select(vec![
                        SelectOption::new(ProjectStatus::Open.id(), self.env.trans("open")),
                        SelectOption::new(ProjectStatus::Archived.id(), self.env.trans("archived")),
                    ])
                    .label("status"),
                );
                let mut options = vec![SelectOption::new(0, "")];
                options.extend(
                    binding
                        .assignees
                        .iter()
                        .map(|u| SelectOption::new(u.id, u.fullname())),
                );
                // Replaces the hidden field in place.
                fields.insert(
                    "default_assignee".into(),
                    Field::select(options).label("default_assignee"),
                );
            }
        }

        fields.insert("kanban_board".into(), Field::legend());
        if let Some(field) = self.kanban_columns_field() {
            fields.insert("columns[]".into(), field);
        }
        fields
    }

    fn actions(&self) -> Actions {
        let mut actions = Actions::new();
        match self.project() {
            Some(project) => {
                actions.insert("submit".into(), Action::Submit("update"));
                actions.insert(
                    "delete".into(),
                    Action::Button(ActionButton {
                        style: ButtonStyle::DangerSubmit,
                        label: lang::trans_with(
                            &self.env.locale,
                            "delete_something",
                            &[("name", project.name.as_str())],
                        ),
                        class: Some("delete-project".into()),
                        name: Some("delete-project".into()),
                        confirm: Some(self.env.trans("delete_project_confirm")),
                    }),
                );
            }
            None => {
                actions.insert("submit".into(), Action::Submit("create_project"));
            }
        }
        actions
    }

    fn rules(&self) -> Rules {
        let mut rules = Rules::new();
        rules.insert("name".into(), "required|max:250".into());
        rules.insert("user".into(), "array|min:1".into());
        rules
    }

    fn redirect_url(&self) -> String {
        match self.project() {
            Some(project) => project.to("edit"),
            None => "projects/new".to_string(),
        }
    }

    fn model_values(&self) -> IndexMap<String, String> {
        let mut values = IndexMap::new();
        if let Some(project) = self.project() {
            values.insert("name".into(), project.name.clone());
            let private = if project.private {
                Project::PRIVATE_YES
            } else {
                Project::PRIVATE_NO
            };
            values.insert("private".into(), private.to_string());
            values.insert("status".into(), project.status.id().to_string());
            values.insert(
                "default_assignee".into(),
                project.default_assignee.unwrap_or(0).to_string(),
            );
        }
        values
    }
}

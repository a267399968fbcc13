//! Add/edit issue form.

use anyhow::Context;
use indexmap::IndexMap;

use super::field::title_case;
use super::*;
use crate::lang;
use crate::tracker::models::{IssueUpdate, NewIssue, Permission, Tag};

const QUOTE_GROUP_CLASS: &str = "col-sm-5 col-md-5 col-lg-4";
const NO_RESOLUTION_COLOR: &str = "#62CFFC";

/// Largest hour count a quote may carry.
pub const MAX_QUOTE_HOURS: i64 = 99_999;
const MAX_QUOTE_MINUTES: i64 = 59;

pub struct IssueForm {
    env: FormEnv,
    project: Option<ProjectBinding>,
    issue: Option<Issue>,
}

/// Split a quote in seconds into whole hours and remaining minutes.
pub fn split_quote(seconds: i64) -> (i64, i64) {
    (seconds / 3600, (seconds / 60) % 60)
}

impl IssueForm {
    pub fn new(env: FormEnv) -> Self {
        Self {
            env,
            project: None,
            issue: None,
        }
    }

    fn binding(&self) -> Option<&ProjectBinding> {
        self.project.as_ref()
    }

    fn project_id(&self) -> i64 {
        self.binding().map(|b| b.project.id).unwrap_or_default()
    }

    /// The bound issue's tag in `group_id`; the last one wins.
    fn current_tag(&self, group_id: i64) -> Option<&Tag> {
        self.issue
            .as_ref()?
            .tags
            .iter()
            .filter(|t| t.parent_id == group_id)
            .last()
    }

    /// Radio group over one tag group. A current tag the caller cannot see
    /// becomes the only option.
    fn tag_field(&self, group_name: &str, label: &str, with_none: bool) -> Option<Field> {
        let group = self.env.tag_group(group_name)?;
        let role = self.env.role();
        let current = self.current_tag(group.group.id);

        let tags: Vec<&Tag> = match current {
            Some(tag) if !tag.can_view(role) => vec![tag],
            _ => group.tags.iter().filter(|t| t.can_view(role)).collect(),
        };

        let mut choices = Vec::new();
        if with_none {
            choices.push(Choice::new(self.env.trans("none"), 0, NO_RESOLUTION_COLOR));
        }
        choices.extend(
            tags.into_iter()
                .map(|t| Choice::new(title_case(&t.name), t.id, t.bgcolor.clone())),
        );
        if choices.is_empty() {
            return None;
        }

        Some(Field::radio(choices, current.map(|t| t.id.to_string())).label(label))
    }

    fn upload_fields(&self, fields: &mut Fields) {
        let url = format!("project/{}/upload_attachment", self.project_id());
        fields.insert("upload".into(), Field::upload(url).label("attachments"));
        fields.insert(
            "upload_token".into(),
            Field::hidden().value(uuid::Uuid::new_v4()),
        );
    }

    fn assigned_to_field(&self) -> Field {
        let mut options = vec![SelectOption::new(0, "")];
        let mut default_assignee = 0;
        if let Some(binding) = self.binding() {
            options.extend(
                binding
                    .assignees
                    .iter()
                    .map(|u| SelectOption::new(u.id, u.fullname())),
            );
            default_assignee = binding.project.default_assignee.unwrap_or(0);
        }
        Field::select(options)
            .label("assigned_to")
            .value(default_assignee)
    }

    fn time_quote_field(&self) -> Option<Field> {
        let can_lock = self.env.can(Permission::IssueLockQuote);
        let locked = self.issue.as_ref().is_some_and(Issue::is_quote_locked);
        if !can_lock && locked {
            return None;
        }

        let (hours, minutes) = split_quote(self.issue.as_ref().map_or(0, |i| i.time_quote));
        let mut sub = Fields::new();
        sub.insert(
            "h".into(),
            Field::number()
                .value(hours)
                .append(self.env.trans("hours"))
                .group_class(QUOTE_GROUP_CLASS),
        );
        sub.insert(
            "m".into(),
            Field::number()
                .value(minutes)
                .append(self.env.trans("minutes"))
                .group_class(QUOTE_GROUP_CLASS),
        );
        if can_lock {
            sub.insert(
                "lock".into(),
                Field::checkboxes(vec![Choice::new("Lock Quote", 1, "red").checked(locked)])
                    .no_label()
                    .group_class("col-sm-12 col-md-12 col-lg-4"),
            );
        }
        Some(
            Field::group(sub)
                .label("quote")
                .class("row issue-quote"),
        )
    }

    fn issue_modify_fields(&self, fields: &mut Fields) {
        fields.insert("internal_status".into(), Field::legend());
        if let Some(field) = self.tag_field(Tag::GROUP_STATUS, "status", false) {
            fields.insert("tag_status".into(), field);
        }
        fields.insert("assigned_to".into(), self.assigned_to_field());
        if let Some(field) = self.time_quote_field() {
            fields.insert("time_quote".into(), field);
        }
        if let Some(field) = self.tag_field(Tag::GROUP_RESOLUTION, "resolution", true) {
            fields.insert("tag_resolution".into(), field);
        }
    }

    /// Tag ids picked in the radio groups present on the form. A resolution
    /// of `0` clears that group instead.
    fn submitted_tags(&self, fields: &Fields, input: &FormInput) -> (Vec<i64>, Vec<i64>) {
        let mut picked = Vec::new();
        let mut cleared = Vec::new();
        for (name, group_name) in [
            ("tag_type", Tag::GROUP_TYPE),
            ("tag_status", Tag::GROUP_STATUS),
            ("tag_resolution", Tag::GROUP_RESOLUTION),
        ] {
            let (Some(field), Some(value)) = (fields.get(name), input.filled(name)) else {
                continue;
            };
            if !field.accepts(value) {
                continue;
            }
            match value.parse::<i64>() {
                Ok(0) => {
                    if let Some(group) = self.env.tag_group(group_name) {
                        cleared.push(group.group.id);
                    }
                }
                Ok(id) => picked.push(id),
                Err(_) => {}
            }
        }
        (picked, cleared)
    }

    /// Seconds from the `time_quote[h]`/`time_quote[m]` inputs, when the quote
    /// group is on the form.
    fn submitted_quote(fields: &Fields, input: &FormInput) -> Option<(i64, Option<bool>)> {
        let group = fields.get("time_quote")?;
        let hours = input
            .get_i64("time_quote[h]")
            .unwrap_or(0)
            .clamp(0, MAX_QUOTE_HOURS);
        let minutes = input
            .get_i64("time_quote[m]")
            .unwrap_or(0)
            .clamp(0, MAX_QUOTE_MINUTES);
        let lock = group
            .sub_field("lock")
            .map(|_| input.get("time_quote[lock]").is_some());
        Some((hours * 3600 + minutes * 60, lock))
    }

    fn submitted_assignee(fields: &Fields, input: &FormInput) -> Option<Option<i64>> {
        let field = fields.get("assigned_to")?;
        let value = input.filled("assigned_to")?;
        if !field.accepts(value) {
            return None;
        }
        Some(value.parse::<i64>().ok().filter(|id| *id > 0))
    }

    /// Turn submitted input into a new issue. Only fields present on the
    /// form for this caller are read.
    pub fn new_issue(&self, input: &FormInput) -> NewIssue {
        let fields = self.fields();
        let (tag_ids, _) = self.submitted_tags(&fields, input);
        let (time_quote, lock_quote) = Self::submitted_quote(&fields, input).unwrap_or((0, None));
        let assigned_to = Self::submitted_assignee(&fields, input)
            .unwrap_or_else(|| self.binding().and_then(|b| b.project.default_assignee));
        NewIssue {
            title: input.get("title").unwrap_or_default().trim().to_string(),
            body: input.get("body").unwrap_or_default().to_string(),
            assigned_to,
            time_quote,
            lock_quote: lock_quote.unwrap_or(false),
            tag_ids,
        }
    }

    /// Turn submitted input into an update of the bound issue.
    pub fn issue_update(&self, input: &FormInput) -> IssueUpdate {
        let fields = self.fields();
        let (tag_ids, cleared_groups) = self.submitted_tags(&fields, input);
        let quote = Self::submitted_quote(&fields, input);
        IssueUpdate {
            title: input.filled("title").map(str::to_string),
            body: input.get("body").map(str::to_string),
            assigned_to: Self::submitted_assignee(&fields, input),
            time_quote: quote.map(|(seconds, _)| seconds),
            lock_quote: quote.and_then(|(_, lock)| lock),
            tag_ids,
            cleared_groups,
        }
    }
}

impl FormDefinition for IssueForm {
    fn kind(&self) -> FormKind {
        FormKind::Issue
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn setup(&mut self, params: RouteParams) -> anyhow::Result<()> {
        self.project = Some(params.project.context("Issue form requires a project")?);
        self.issue = params.issue;
        Ok(())
    }

    fn is_editing(&self) -> bool {
        self.issue.is_some()
    }

    fn fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("title".into(), Field::text().label("title"));
        fields.insert("body".into(), Field::textarea().label("issue"));
        if let Some(field) = self.tag_field(Tag::GROUP_TYPE, "type", false) {
            fields.insert("tag_type".into(), field);
        }

        if !self.is_editing() {
            self.upload_fields(&mut fields);
        }

        if self.env.can(Permission::IssueModify) {
            self.issue_modify_fields(&mut fields);
        }

        fields
    }

    fn actions(&self) -> Actions {
        let mut actions = Actions::new();
        let label = if self.is_editing() {
            "update_issue"
        } else {
            "create_issue"
        };
        actions.insert("submit".into(), Action::Submit(label));

        if let Some(issue) = &self.issue
            && self.env.can(Permission::IssueModify)
        {
            let name = format!("#{}", issue.id);
            actions.insert(
                "delete".into(),
                Action::Button(ActionButton {
                    style: ButtonStyle::DangerSubmit,
                    label: lang::trans_with(&self.env.locale, "delete_something", &[("name", name.as_str())]),
                    class: Some("close-issue".into()),
                    name: Some("delete-issue".into()),
                    confirm: Some(self.env.trans("delete_issue_confirm")),
                }),
            );
        }
        actions
    }

    fn rules(&self) -> Rules {
        let mut rules = Rules::new();
        rules.insert("title".into(), "required|max:200".into());
        rules.insert("body".into(), "required".into());
        rules.insert(
            "time_quote[h]".into(),
            format!("numeric|min:0|max:{}", MAX_QUOTE_HOURS),
        );
        rules.insert(
            "time_quote[m]".into(),
            format!("numeric|min:0|max:{}", MAX_QUOTE_MINUTES),
        );
        rules
    }

    fn redirect_url(&self) -> String {
        match &self.issue {
            Some(issue) => issue.to("edit"),
            None => format!("project/{}/issue/new", self.project_id()),
        }
    }

    fn model_values(&self) -> IndexMap<String, String> {
        let mut values = IndexMap::new();
        if let Some(issue) = &self.issue {
            values.insert("title".into(), issue.title.clone());
            values.insert("body".into(), issue.body.clone());
            values.insert(
                "assigned_to".into(),
                issue.assigned_to.unwrap_or(0).to_string(),
            );
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::fixtures;
    use crate::tracker::models::Role;

    fn form(role: Option<Role>, issue: Option<Issue>) -> IssueForm {
        let mut form = IssueForm::new(fixtures::env(role));
        form.setup(RouteParams {
            project: Some(fixtures::binding()),
            issue,
            tag: None,
        })
        .unwrap();
        form
    }

    const MODIFY_FIELDS: [&str; 5] = [
        "internal_status",
        "tag_status",
        "assigned_to",
        "time_quote",
        "tag_resolution",
    ];

    #[test]
    fn test_setup_requires_project() {
        let mut form = IssueForm::new(fixtures::env(Some(Role::User)));
        assert!(form.setup(RouteParams::default()).is_err());
    }

    #[test]
    fn test_quote_split_into_hours_and_minutes() {
        let form = form(Some(Role::Manager), Some(fixtures::issue(5400, false, &[])));
        let fields = form.fields();
        let quote = fields.get("time_quote").unwrap();
        assert_eq!(quote.sub_field("h").unwrap().value.as_deref(), Some("1"));
        assert_eq!(quote.sub_field("m").unwrap().value.as_deref(), Some("30"));
        assert_eq!(split_quote(3 * 3600 + 59 * 60 + 59), (3, 59));
    }

    #[test]
    fn test_no_modify_fields_without_permission() {
        for issue in [None, Some(fixtures::issue(60, false, &[21]))] {
            let fields = form(Some(Role::User), issue).fields();
            for name in MODIFY_FIELDS {
                assert!(!fields.contains_key(name), "{} should be hidden", name);
            }
            assert!(fields.contains_key("tag_type"));
        }
    }

    #[test]
    fn test_modify_fields_in_order_for_developers() {
        let fields = form(Some(Role::Developer), Some(fixtures::issue(0, false, &[]))).fields();
        let names: Vec<&str> = fields.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![
                "title",
                "body",
                "tag_type",
                "internal_status",
                "tag_status",
                "assigned_to",
                "time_quote",
                "tag_resolution"
            ]
        );
    }

    #[test]
    fn test_upload_only_when_creating() {
        let creating = form(Some(Role::User), None).fields();
        assert!(matches!(
            creating.get("upload").unwrap().kind,
            FieldKind::FileUpload { ref url, .. } if url == "project/5/upload_attachment"
        ));
        assert!(creating.get("upload_token").unwrap().value.is_some());

        let editing = form(Some(Role::User), Some(fixtures::issue(0, false, &[]))).fields();
        assert!(!editing.contains_key("upload"));
        assert!(!editing.contains_key("upload_token"));
    }

    #[test]
    fn test_delete_action_only_when_editing_with_modify() {
        let creating = form(Some(Role::Administrator), None).actions();
        assert_eq!(creating.get("submit"), Some(&Action::Submit("create_issue")));
        assert!(!creating.contains_key("delete"));

        let no_modify = form(Some(Role::User), Some(fixtures::issue(0, false, &[]))).actions();
        assert_eq!(no_modify.get("submit"), Some(&Action::Submit("update_issue")));
        assert!(!no_modify.contains_key("delete"));

        let editing = form(Some(Role::Developer), Some(fixtures::issue(0, false, &[]))).actions();
        match editing.get("delete").unwrap() {
            Action::Button(button) => {
                assert_eq!(button.style, ButtonStyle::DangerSubmit);
                assert_eq!(button.label, "Delete #42");
                assert_eq!(button.name.as_deref(), Some("delete-issue"));
                assert_eq!(button.class.as_deref(), Some("close-issue"));
                assert!(button.confirm.is_some());
            }
            other => panic!("expected button, got {:?}", other),
        }
    }

    #[test]
    fn test_locked_quote_hidden_without_lock_permission() {
        let dev = form(Some(Role::Developer), Some(fixtures::issue(3600, true, &[]))).fields();
        assert!(!dev.contains_key("time_quote"));

        let unlocked = form(Some(Role::Developer), Some(fixtures::issue(3600, false, &[]))).fields();
        assert!(unlocked.get("time_quote").unwrap().sub_field("lock").is_none());

        let manager = form(Some(Role::Manager), Some(fixtures::issue(3600, true, &[]))).fields();
        let lock = manager.get("time_quote").unwrap().sub_field("lock").unwrap();
        assert!(lock.choices()[0].checked);
    }

    #[test]
    fn test_tag_defaults_to_current_tag() {
        let fields = form(Some(Role::Developer), Some(fixtures::issue(0, false, &[22, 13]))).fields();
        match &fields.get("tag_type").unwrap().kind {
            FieldKind::RadioGroup { choices, checked } => {
                assert_eq!(checked.as_deref(), Some("22"));
                assert_eq!(choices.len(), 2);
                assert_eq!(choices[0].label, "Bug");
            }
            other => panic!("unexpected kind {:?}", other),
        }
        match &fields.get("tag_status").unwrap().kind {
            FieldKind::RadioGroup { choices, checked } => {
                assert_eq!(checked.as_deref(), Some("13"));
                assert_eq!(choices[3].label, "In Progress");
            }
            other => panic!("unexpected kind {:?}", other),
        }

        let creating = form(Some(Role::Developer), None).fields();
        match &creating.get("tag_type").unwrap().kind {
            FieldKind::RadioGroup { checked, .. } => assert!(checked.is_none()),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_hidden_current_tag_collapses_options() {
        // Developers cannot see the manager-only "secret" resolution.
        let fields = form(Some(Role::Developer), Some(fixtures::issue(0, false, &[32]))).fields();
        let resolution = fields.get("tag_resolution").unwrap();
        let values: Vec<&str> = resolution.choices().iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, vec!["0", "32"]);

        let creating = form(Some(Role::Developer), None).fields();
        let values: Vec<&str> = creating
            .get("tag_resolution")
            .unwrap()
            .choices()
            .iter()
            .map(|c| c.value.as_str())
            .collect();
        assert_eq!(values, vec!["0", "31"]);

        let manager = form(Some(Role::Manager), None).fields();
        assert_eq!(manager.get("tag_resolution").unwrap().choices().len(), 3);
    }

    #[test]
    fn test_assignee_select_defaults_to_project_assignee() {
        let fields = form(Some(Role::Developer), None).fields();
        let assigned = fields.get("assigned_to").unwrap();
        assert_eq!(assigned.value.as_deref(), Some("8"));
        assert_eq!(assigned.options()[0], SelectOption::new(0, ""));
        assert_eq!(assigned.options()[1].label, "User8 Test");
    }

    #[test]
    fn test_redirect_urls() {
        assert_eq!(form(Some(Role::User), None).redirect_url(), "project/5/issue/new");
        assert_eq!(
            form(Some(Role::User), Some(fixtures::issue(0, false, &[]))).redirect_url(),
            "project/5/issue/42/edit"
        );
    }

    #[test]
    fn test_rules_are_static() {
        let creating = form(Some(Role::User), None).rules();
        let editing = form(Some(Role::User), Some(fixtures::issue(0, false, &[]))).rules();
        assert_eq!(creating, editing);
        assert_eq!(creating.get("title").map(String::as_str), Some("required|max:200"));
    }

    #[test]
    fn test_new_issue_from_input() {
        let form = form(Some(Role::Manager), None);
        let input = FormInput::from_pairs([
            ("title", " Crash "),
            ("body", "Details"),
            ("tag_type", "21"),
            ("tag_status", "13"),
            ("tag_resolution", "0"),
            ("assigned_to", "9"),
            ("time_quote[h]", "2"),
            ("time_quote[m]", "15"),
            ("time_quote[lock]", "1"),
        ]);
        let issue = form.new_issue(&input);
        assert_eq!(issue.title, "Crash");
        assert_eq!(issue.tag_ids, vec![21, 13]);
        assert_eq!(issue.assigned_to, Some(9));
        assert_eq!(issue.time_quote, 2 * 3600 + 15 * 60);
        assert!(issue.lock_quote);
    }

    #[test]
    fn test_oversized_quote_is_clamped() {
        let creating = form(Some(Role::Manager), None);
        let input = FormInput::from_pairs([
            ("title", "t"),
            ("body", "b"),
            ("time_quote[h]", "9223372036854775807"),
            ("time_quote[m]", "-5"),
        ]);
        let issue = creating.new_issue(&input);
        assert_eq!(issue.time_quote, MAX_QUOTE_HOURS * 3600);

        let editing = form(Some(Role::Manager), Some(fixtures::issue(0, false, &[])));
        let update = editing.issue_update(&FormInput::from_pairs([("time_quote[m]", "600")]));
        assert_eq!(update.time_quote, Some(59 * 60));
    }

    #[test]
    fn test_oversized_quote_fails_validation() {
        let rules = form(Some(Role::Manager), None).rules();
        let input = FormInput::from_pairs([
            ("title", "t"),
            ("body", "b"),
            ("time_quote[h]", "9223372036854775807"),
            ("time_quote[m]", "30"),
        ]);
        let errors = crate::form::rules::validate(&rules, &input).unwrap();
        assert!(errors.has("time_quote[h]"));
        assert!(!errors.has("time_quote[m]"));

        let input = FormInput::from_pairs([("title", "t"), ("body", "b"), ("time_quote[h]", "12")]);
        assert!(crate::form::rules::validate(&rules, &input).unwrap().is_empty());
    }

    #[test]
    fn test_input_outside_form_is_ignored() {
        // Plain users have no status or quote fields, and unknown tag ids are
        // not offered as choices.
        let form = form(Some(Role::User), None);
        let input = FormInput::from_pairs([
            ("title", "t"),
            ("body", "b"),
            ("tag_type", "999"),
            ("tag_status", "12"),
            ("time_quote[h]", "4"),
        ]);
        let issue = form.new_issue(&input);
        assert!(issue.tag_ids.is_empty());
        assert_eq!(issue.time_quote, 0);
        assert_eq!(issue.assigned_to, Some(8));
    }

    #[test]
    fn test_issue_update_clears_resolution() {
        let form = form(Some(Role::Developer), Some(fixtures::issue(0, true, &[31])));
        let input = FormInput::from_pairs([
            ("title", "t"),
            ("body", "b"),
            ("tag_resolution", "0"),
            ("assigned_to", "0"),
            ("time_quote[h]", "9"),
        ]);
        let update = form.issue_update(&input);
        assert_eq!(update.cleared_groups, vec![3]);
        assert_eq!(update.assigned_to, Some(None));
        // Locked quote is not editable by developers.
        assert!(update.time_quote.is_none());
        assert!(update.lock_quote.is_none());
    }
}

//! Add/edit tag form.

use indexmap::IndexMap;

use super::field::title_case;
use super::*;
use crate::errors::TrackerError;
use crate::tracker::models::NewTag;

pub struct TagForm {
    env: FormEnv,
    tag: Option<Tag>,
}

impl TagForm {
    pub fn new(env: FormEnv) -> Self {
        Self { env, tag: None }
    }

    /// Turn submitted input into tag values. The group and role limit must
    /// be among the offered options.
    pub fn new_tag(&self, input: &FormInput) -> Result<NewTag, TrackerError> {
        let fields = self.fields();
        let parent = input.filled("parent_id").unwrap_or_default();
        let parent_ok = fields.get("parent_id").is_some_and(|f| f.accepts(parent));
        let parent_id = parent
            .parse::<i64>()
            .ok()
            .filter(|_| parent_ok)
            .ok_or_else(|| TrackerError::BadRequest(format!("Unknown tag group: {:?}", parent)))?;

        let role_limit = match input.filled("role_limit") {
            None | Some("0") => None,
            Some(value) => Some(
                value
                    .parse::<i64>()
                    .ok()
                    .and_then(Role::from_id)
                    .ok_or_else(|| TrackerError::BadRequest(format!("Unknown role: {:?}", value)))?,
            ),
        };

        Ok(NewTag {
            parent_id,
            name: input.get("name").unwrap_or_default().trim().to_string(),
            bgcolor: input.get("bgcolor").unwrap_or_default().trim().to_string(),
            role_limit,
        })
    }
}

impl FormDefinition for TagForm {
    fn kind(&self) -> FormKind {
        FormKind::Tag
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn setup(&mut self, params: RouteParams) -> anyhow::Result<()> {
        self.tag = params.tag;
        Ok(())
    }

    fn is_editing(&self) -> bool {
        self.tag.is_some()
    }

    fn fields(&self) -> Fields {
        let groups = self
            .env
            .tags
            .iter()
            .map(|g| SelectOption::new(g.group.id, title_case(&g.group.name)))
            .collect();
        let mut roles = vec![SelectOption::new(0, "")];
        roles.extend(
            Role::ALL
                .iter()
                .map(|r| SelectOption::new(r.id(), title_case(r.as_str()))),
        );

        let mut fields = Fields::new();
        fields.insert("name".into(), Field::text().label("name"));
        fields.insert("parent_id".into(), Field::select(groups).label("group"));
        fields.insert("bgcolor".into(), Field::text().label("bgcolor"));
        fields.insert("role_limit".into(), Field::select(roles).label("role_limit"));
        fields
    }

    fn actions(&self) -> Actions {
        let label = if self.is_editing() {
            "update_tag"
        } else {
            "create_tag"
        };
        let mut actions = Actions::new();
        actions.insert("submit".into(), Action::Submit(label));
        actions
    }

    fn rules(&self) -> Rules {
        let mut rules = Rules::new();
        rules.insert("name".into(), "required|max:200".into());
        rules.insert("parent_id".into(), "required".into());
        rules.insert("bgcolor".into(), "required".into());
        rules
    }

    fn redirect_url(&self) -> String {
        match &self.tag {
            Some(tag) => format!("administration/tag/{}/edit", tag.id),
            None => "administration/tags/new".to_string(),
        }
    }

    fn model_values(&self) -> IndexMap<String, String> {
        let mut values = IndexMap::new();
        if let Some(tag) = &self.tag {
            values.insert("name".into(), tag.name.clone());
            values.insert("parent_id".into(), tag.parent_id.to_string());
            values.insert("bgcolor".into(), tag.bgcolor.clone());
            values.insert(
                "role_limit".into(),
                tag.role_limit.map_or(0, |r| r.id()).to_string(),
            );
        }
        values
    }
}

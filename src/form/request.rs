use tracing::debug;

use super::rules::{self, ValidationErrors};
use super::{FormDefinition, FormEnv, FormInput, FormKind, RouteParams, Rules};
use crate::errors::TrackerError;

/// A request's resolved form definition.
///
/// Resolution order: a form bound explicitly by the handler, else the form
/// kind the route declares, else none. Without a form the request carries no
/// rules and validation always passes.
pub struct FormRequest {
    form: Option<Box<dyn FormDefinition>>,
}

impl FormRequest {
    pub fn resolve(
        bound: Option<Box<dyn FormDefinition>>,
        declared: Option<FormKind>,
        params: RouteParams,
        env: FormEnv,
    ) -> anyhow::Result<Self> {
        let form = match (bound, declared) {
            (Some(form), _) => Some(form),
            (None, Some(kind)) => Some(kind.build(env)),
            (None, None) => None,
        };
        let form = match form {
            Some(mut form) => {
                form.setup(params)?;
                debug!(
                    form = form.kind().as_str(),
                    editing = form.is_editing(),
                    "Resolved form"
                );
                Some(form)
            }
            None => {
                debug!("No form for request");
                None
            }
        };
        Ok(Self { form })
    }

    /// Resolve the form a route declares.
    pub fn for_kind(kind: FormKind, params: RouteParams, env: FormEnv) -> anyhow::Result<Self> {
        Self::resolve(None, Some(kind), params, env)
    }

    pub fn none() -> Self {
        Self { form: None }
    }

    pub fn form(&self) -> Option<&dyn FormDefinition> {
        self.form.as_deref()
    }

    /// The resolved form as its concrete type.
    pub fn downcast<F: FormDefinition>(&self) -> Option<&F> {
        self.form()?.as_any().downcast_ref::<F>()
    }

    pub fn rules(&self) -> Rules {
        self.form.as_ref().map(|f| f.rules()).unwrap_or_default()
    }

    /// Validate `input` against the form's rules.
    pub fn validate(&self, input: &FormInput) -> Result<(), TrackerError> {
        let errors: ValidationErrors = rules::validate(&self.rules(), input)?;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(TrackerError::Validation(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::fixtures;
    use crate::form::tag::TagForm;
    use crate::tracker::models::Role;

    #[test]
    fn test_declared_kind_is_built_and_bound() {
        let request = FormRequest::for_kind(
            FormKind::Issue,
            RouteParams {
                project: Some(fixtures::binding()),
                issue: Some(fixtures::issue(0, false, &[])),
                tag: None,
            },
            fixtures::env(Some(Role::Developer)),
        )
        .unwrap();
        let form = request.form().unwrap();
        assert_eq!(form.kind(), FormKind::Issue);
        assert!(form.is_editing());
        assert!(request.rules().contains_key("title"));
        assert!(request.downcast::<crate::form::issue::IssueForm>().is_some());
        assert!(request.downcast::<TagForm>().is_none());
    }

    #[test]
    fn test_bound_form_wins_over_declared_kind() {
        let bound: Box<dyn FormDefinition> = Box::new(TagForm::new(fixtures::env(Some(Role::Administrator))));
        let request = FormRequest::resolve(
            Some(bound),
            Some(FormKind::Project),
            RouteParams::default(),
            fixtures::env(Some(Role::Administrator)),
        )
        .unwrap();
        assert_eq!(request.form().unwrap().kind(), FormKind::Tag);
    }

    #[test]
    fn test_no_form_means_no_rules() {
        let request = FormRequest::resolve(None, None, RouteParams::default(), fixtures::env(None)).unwrap();
        assert!(request.form().is_none());
        assert!(request.rules().is_empty());
        assert!(request.validate(&FormInput::new()).is_ok());
        assert!(FormRequest::none().validate(&FormInput::new()).is_ok());
    }

    #[test]
    fn test_validate_reports_errors() {
        let request = FormRequest::for_kind(
            FormKind::Project,
            RouteParams::default(),
            fixtures::env(Some(Role::Manager)),
        )
        .unwrap();
        match request.validate(&FormInput::from_pairs([("name", "")])) {
            Err(TrackerError::Validation(errors)) => {
                assert_eq!(errors.first("name"), Some("The name field is required."));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(request.validate(&FormInput::from_pairs([("name", "ok")])).is_ok());
    }

    #[test]
    fn test_setup_failure_propagates() {
        let result = FormRequest::for_kind(FormKind::Issue, RouteParams::default(), fixtures::env(None));
        assert!(result.is_err());
    }
}

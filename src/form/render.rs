//! HTML output for form definitions.
//!
//! [`FormRenderer::render`] opens the form, renders every field through the
//! control renderer registered for its [`FieldKind`], appends the action
//! buttons and closes the form. Values come from the submitted input first,
//! then the bound record, then the field's declared value.

use indexmap::IndexMap;

use super::field::{Action, Field, FieldKind};
use super::input::FormInput;
use super::rules::ValidationErrors;
use super::FormDefinition;
use crate::lang;

const LABEL_CLASS: &str = "control-label col-lg-2 col-sm-4";
const CONTROLS_CLASS: &str = "col-lg-10 col-sm-8";
const CONTROLS_OFFSET_CLASS: &str = "col-lg-offset-2 col-sm-offset-4";

/// Escape text for HTML content and double-quoted attribute values.
pub fn html_escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    html_escape_into(&mut out, s);
    out
}

fn push_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    html_escape_into(out, value);
    out.push('"');
}

/// Element id derived from a posted name: `time_quote[h]` → `time_quote-h`.
fn id_for(name: &str) -> String {
    name.trim_end_matches("[]")
        .replace('[', "-")
        .replace(']', "")
}

/// Everything a control renderer needs for one field.
struct Control<'a> {
    /// Name the control posts under.
    name: String,
    id: String,
    field: &'a Field,
    model: &'a IndexMap<String, String>,
}

type ControlRenderer = fn(&FormRenderer<'_>, &Control<'_>, &mut String);

/// Dispatch table from field kind to control renderer.
fn control_renderer(kind: &FieldKind) -> ControlRenderer {
    match kind {
        FieldKind::Text => render_text,
        FieldKind::Textarea => render_textarea,
        FieldKind::Number => render_number,
        FieldKind::Hidden => render_hidden,
        FieldKind::Select { .. } => render_select,
        FieldKind::SelectUser => render_select_user,
        FieldKind::RadioGroup { .. } => render_radio_group,
        FieldKind::CheckboxGroup { .. } => render_checkbox_group,
        FieldKind::Group { .. } => render_group,
        FieldKind::FileUpload { .. } => render_file_upload,
        FieldKind::Legend => render_legend,
    }
}

pub struct FormRenderer<'a> {
    locale: &'a str,
    input: Option<&'a FormInput>,
    errors: Option<&'a ValidationErrors>,
}

impl<'a> FormRenderer<'a> {
    pub fn new(locale: &'a str) -> Self {
        Self {
            locale,
            input: None,
            errors: None,
        }
    }

    /// Redisplay submitted values.
    pub fn with_input(mut self, input: &'a FormInput) -> Self {
        self.input = Some(input).filter(|i| !i.is_empty());
        self
    }

    pub fn with_errors(mut self, errors: &'a ValidationErrors) -> Self {
        self.errors = Some(errors);
        self
    }

    fn trans(&self, key: &str) -> String {
        lang::trans(self.locale, key)
    }

    /// Render `form` as a complete `<form>` element. `attrs` are added to the
    /// opening tag; a `None` value renders a bare attribute.
    pub fn render(&self, form: &dyn FormDefinition, attrs: &[(&str, Option<&str>)]) -> String {
        let mut out = String::new();
        self.open(form, attrs, &mut out);

        let model = form.model_values();
        for (name, field) in &form.fields() {
            self.render_field(name, field, &model, &mut out);
        }

        self.render_actions(form, &mut out);
        out.push_str("</form>");
        out
    }

    fn open(&self, form: &dyn FormDefinition, attrs: &[(&str, Option<&str>)], out: &mut String) {
        out.push_str("<form method=\"POST\"");
        if !attrs.iter().any(|(name, _)| *name == "action") {
            push_attr(out, "action", &format!("/{}", form.redirect_url()));
        }
        let mut class = form.open_type().css_class().to_string();
        if let Some((_, Some(extra))) = attrs.iter().find(|(name, _)| *name == "class") {
            class.push(' ');
            class.push_str(extra);
        }
        push_attr(out, "class", &class);
        for (name, value) in attrs.iter().filter(|(name, _)| *name != "class") {
            match value {
                Some(value) => push_attr(out, name, value),
                None => {
                    out.push(' ');
                    out.push_str(name);
                }
            }
        }
        out.push('>');
    }

    fn render_field(
        &self,
        name: &str,
        field: &Field,
        model: &IndexMap<String, String>,
        out: &mut String,
    ) {
        let control = Control {
            name: name.to_string(),
            id: field.id.clone().unwrap_or_else(|| id_for(name)),
            field,
            model,
        };
        let renderer = control_renderer(&field.kind);

        if matches!(field.kind, FieldKind::Hidden | FieldKind::Legend) {
            renderer(self, &control, out);
            return;
        }

        let error = self.errors.and_then(|e| e.first(name));
        let mut group_class = String::from("form-group");
        if error.is_some() {
            group_class.push_str(" has-error");
        }
        if let Some(extra) = &field.group_class {
            group_class.push(' ');
            group_class.push_str(extra);
        }
        if let Some(extra) = &field.class {
            group_class.push(' ');
            group_class.push_str(extra);
        }
        out.push_str("<div");
        push_attr(out, "class", &group_class);
        out.push('>');

        let mut controls_class = CONTROLS_CLASS.to_string();
        if field.no_label {
            controls_class.push(' ');
            controls_class.push_str(CONTROLS_OFFSET_CLASS);
        } else {
            out.push_str("<label");
            push_attr(out, "for", &control.id);
            push_attr(out, "class", LABEL_CLASS);
            out.push('>');
            html_escape_into(out, &self.trans(field.label.as_deref().unwrap_or(name)));
            out.push_str("</label>");
        }

        out.push_str("<div");
        push_attr(out, "class", &controls_class);
        out.push('>');
        renderer(self, &control, out);
        if let Some(message) = error {
            out.push_str("<span class=\"help-block\">");
            html_escape_into(out, message);
            out.push_str("</span>");
        }
        if let Some(help) = &field.help {
            out.push_str("<span class=\"help-block\">");
            html_escape_into(out, help);
            out.push_str("</span>");
        }
        out.push_str("</div></div>");
    }

    fn render_actions(&self, form: &dyn FormDefinition, out: &mut String) {
        out.push_str("<div class=\"form-actions\">");
        for (index, action) in form.actions().values().enumerate() {
            if index > 0 {
                out.push(' ');
            }
            match action {
                Action::Submit(label) => {
                    out.push_str("<button class=\"btn btn-primary\" type=\"submit\">");
                    html_escape_into(out, &self.trans(label));
                    out.push_str("</button>");
                }
                Action::Button(button) => {
                    let mut class = button.style.css_class().to_string();
                    if let Some(extra) = &button.class {
                        class.push(' ');
                        class.push_str(extra);
                    }
                    out.push_str("<button");
                    push_attr(out, "class", &class);
                    push_attr(out, "type", "submit");
                    if let Some(name) = &button.name {
                        push_attr(out, "name", name);
                        push_attr(out, "value", "1");
                    }
                    if let Some(message) = &button.confirm {
                        push_attr(out, "data-message", message);
                    }
                    out.push('>');
                    html_escape_into(out, &button.label);
                    out.push_str("</button>");
                }
            }
        }
        out.push_str("</div>");
    }

    /// Submitted value, else bound record value, else declared value.
    fn value_of(&self, control: &Control<'_>) -> Option<String> {
        if let Some(input) = self.input
            && input.has(&control.name)
        {
            return input.get(&control.name).map(str::to_string);
        }
        control
            .model
            .get(control.name.trim_end_matches("[]"))
            .cloned()
            .or_else(|| control.field.value.clone())
    }

    /// Whether a checkbox/radio with `value` is on. Submitted input wins over
    /// `default`.
    fn is_checked(&self, control: &Control<'_>, value: &str, default: bool) -> bool {
        match self.input {
            Some(input) => input.get_all(&control.name).iter().any(|v| v == value),
            None => default,
        }
    }
}

fn push_input(out: &mut String, input_type: &str, control: &Control<'_>, value: Option<&str>) {
    out.push_str("<input class=\"form-control\"");
    push_attr(out, "id", &control.id);
    push_attr(out, "type", input_type);
    push_attr(out, "name", &control.name);
    if let Some(value) = value {
        push_attr(out, "value", value);
    }
    if let Some(placeholder) = &control.field.placeholder {
        push_attr(out, "placeholder", placeholder);
    }
    out.push('>');
}

fn with_addon(out: &mut String, append: Option<&str>, body: impl FnOnce(&mut String)) {
    match append {
        Some(text) => {
            out.push_str("<div class=\"input-group\">");
            body(out);
            out.push_str("<span class=\"input-group-addon\">");
            html_escape_into(out, text);
            out.push_str("</span></div>");
        }
        None => body(out),
    }
}

fn render_text(renderer: &FormRenderer<'_>, control: &Control<'_>, out: &mut String) {
    let value = renderer.value_of(control);
    with_addon(out, control.field.append.as_deref(), |out| {
        push_input(out, "text", control, value.as_deref())
    });
}

fn render_number(renderer: &FormRenderer<'_>, control: &Control<'_>, out: &mut String) {
    let value = renderer.value_of(control);
    with_addon(out, control.field.append.as_deref(), |out| {
        push_input(out, "number", control, value.as_deref())
    });
}

fn render_textarea(renderer: &FormRenderer<'_>, control: &Control<'_>, out: &mut String) {
    out.push_str("<textarea class=\"form-control\" rows=\"6\"");
    push_attr(out, "id", &control.id);
    push_attr(out, "name", &control.name);
    out.push('>');
    html_escape_into(out, &renderer.value_of(control).unwrap_or_default());
    out.push_str("</textarea>");
}

fn render_hidden(renderer: &FormRenderer<'_>, control: &Control<'_>, out: &mut String) {
    out.push_str("<input type=\"hidden\"");
    if control.field.id.is_some() {
        push_attr(out, "id", &control.id);
    }
    push_attr(out, "name", &control.name);
    push_attr(out, "value", &renderer.value_of(control).unwrap_or_default());
    out.push('>');
}

fn render_select(renderer: &FormRenderer<'_>, control: &Control<'_>, out: &mut String) {
    let selected = renderer.value_of(control);
    out.push_str("<select class=\"form-control\"");
    push_attr(out, "id", &control.id);
    push_attr(out, "name", &control.name);
    out.push('>');
    for option in control.field.options() {
        out.push_str("<option");
        push_attr(out, "value", &option.value);
        if selected.as_deref() == Some(option.value.as_str()) {
            out.push_str(" selected");
        }
        out.push('>');
        html_escape_into(out, &option.label);
        out.push_str("</option>");
    }
    out.push_str("</select>");
}

/// Autocomplete box; picked users post as `name[]` hidden inputs.
fn render_select_user(renderer: &FormRenderer<'_>, control: &Control<'_>, out: &mut String) {
    let posted_name = format!("{}[]", control.name.trim_end_matches("[]"));
    out.push_str("<input class=\"form-control user-select\" type=\"text\"");
    push_attr(out, "id", &control.id);
    push_attr(out, "data-name", &posted_name);
    if let Some(placeholder) = &control.field.placeholder {
        push_attr(out, "placeholder", placeholder);
    }
    out.push('>');
    if let Some(input) = renderer.input {
        for value in input.get_all(&control.name) {
            out.push_str("<input type=\"hidden\"");
            push_attr(out, "name", &posted_name);
            push_attr(out, "value", value);
            out.push('>');
        }
    }
}

fn push_button_choice(
    out: &mut String,
    input_type: &str,
    name: &str,
    choice: &super::field::Choice,
    checked: bool,
) {
    out.push_str("<label");
    push_attr(
        out,
        "class",
        if checked { "btn btn-default active" } else { "btn btn-default" },
    );
    push_attr(out, "style", &format!("border-color: {}", choice.color));
    out.push_str("><input");
    push_attr(out, "type", input_type);
    push_attr(out, "name", name);
    push_attr(out, "value", &choice.value);
    push_attr(out, "data-tags", &choice.value);
    if checked {
        out.push_str(" checked");
    }
    out.push('>');
    out.push(' ');
    html_escape_into(out, &choice.label);
    out.push_str("</label>");
}

fn render_radio_group(renderer: &FormRenderer<'_>, control: &Control<'_>, out: &mut String) {
    let FieldKind::RadioGroup { choices, checked } = &control.field.kind else {
        return;
    };
    let current = match renderer.input {
        Some(input) => input.get(&control.name).map(str::to_string),
        None => control
            .model
            .get(&control.name)
            .cloned()
            .or_else(|| checked.clone()),
    };
    out.push_str("<div class=\"btn-group\" data-toggle=\"buttons\">");
    for choice in choices {
        let on = current.as_deref() == Some(choice.value.as_str());
        push_button_choice(out, "radio", &control.name, choice, on);
    }
    out.push_str("</div>");
}

fn render_checkbox_group(renderer: &FormRenderer<'_>, control: &Control<'_>, out: &mut String) {
    out.push_str("<div class=\"btn-group\" data-toggle=\"buttons\">");
    for choice in control.field.choices() {
        let on = renderer.is_checked(control, &choice.value, choice.checked);
        push_button_choice(out, "checkbox", &control.name, choice, on);
    }
    out.push_str("</div>");
}

/// Sub-fields side by side, posted as `group[sub]`.
fn render_group(renderer: &FormRenderer<'_>, control: &Control<'_>, out: &mut String) {
    let FieldKind::Group { fields } = &control.field.kind else {
        return;
    };
    for (sub_name, sub_field) in fields {
        let name = format!("{}[{}]", control.name, sub_name);
        let sub = Control {
            id: sub_field.id.clone().unwrap_or_else(|| id_for(&name)),
            name,
            field: sub_field,
            model: control.model,
        };
        out.push_str("<div");
        push_attr(out, "class", sub_field.group_class.as_deref().unwrap_or_default());
        out.push('>');
        control_renderer(&sub_field.kind)(renderer, &sub, out);
        out.push_str("</div>");
    }
}

fn render_file_upload(_renderer: &FormRenderer<'_>, control: &Control<'_>, out: &mut String) {
    let FieldKind::FileUpload { url, multiple } = &control.field.kind else {
        return;
    };
    out.push_str("<input type=\"file\" name=\"Filedata\"");
    push_attr(out, "id", &control.id);
    push_attr(out, "data-url", &format!("/{}", url));
    if *multiple {
        out.push_str(" multiple");
    }
    out.push('>');
}

fn render_legend(renderer: &FormRenderer<'_>, control: &Control<'_>, out: &mut String) {
    out.push_str("<legend>");
    let key = control.field.label.as_deref().unwrap_or(&control.name);
    html_escape_into(out, &renderer.trans(key));
    out.push_str("</legend>");
}

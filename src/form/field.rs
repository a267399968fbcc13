//! Field and action descriptors.
//!
//! A form is described as data: an ordered map of [`Field`]s, an ordered
//! map of [`Action`]s and a map of rule strings. The renderer dispatches on
//! [`FieldKind`].

use indexmap::IndexMap;

/// Ordered field name → descriptor.
pub type Fields = IndexMap<String, Field>;
/// Ordered action name → descriptor.
pub type Actions = IndexMap<String, Action>;
/// Field name → `|`-separated rule string.
pub type Rules = IndexMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl ToString, label: impl Into<String>) -> Self {
        Self {
            value: value.to_string(),
            label: label.into(),
        }
    }
}

/// One button of a radio or checkbox group.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub label: String,
    pub value: String,
    pub color: String,
    pub checked: bool,
}

impl Choice {
    pub fn new(label: impl Into<String>, value: impl ToString, color: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.to_string(),
            color: color.into(),
            checked: false,
        }
    }

    pub fn checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    Textarea,
    Number,
    Hidden,
    Select {
        options: Vec<SelectOption>,
    },
    /// Autocomplete user picker; posts `name[]` values.
    SelectUser,
    RadioGroup {
        choices: Vec<Choice>,
        checked: Option<String>,
    },
    CheckboxGroup {
        choices: Vec<Choice>,
    },
    /// Sub-fields posted as `name[sub]`.
    Group {
        fields: Fields,
    },
    FileUpload {
        url: String,
        multiple: bool,
    },
    /// Section heading; carries no value.
    Legend,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Textarea => "textarea",
            Self::Number => "number",
            Self::Hidden => "hidden",
            Self::Select { .. } => "select",
            Self::SelectUser => "select_user",
            Self::RadioGroup { .. } => "radio_group",
            Self::CheckboxGroup { .. } => "checkbox_group",
            Self::Group { .. } => "group",
            Self::FileUpload { .. } => "file_upload",
            Self::Legend => "legend",
        }
    }

    /// Whether the kind posts a value of its own.
    pub fn has_value(&self) -> bool {
        !matches!(self, Self::Legend | Self::Group { .. })
    }
}

/// A field descriptor: its kind plus presentation attributes.
///
/// `label` is a translation key; option and choice labels are already
/// display text.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub kind: FieldKind,
    pub label: Option<String>,
    pub id: Option<String>,
    pub value: Option<String>,
    pub placeholder: Option<String>,
    pub help: Option<String>,
    pub append: Option<String>,
    pub class: Option<String>,
    pub group_class: Option<String>,
    pub no_label: bool,
}

impl Field {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            label: None,
            id: None,
            value: None,
            placeholder: None,
            help: None,
            append: None,
            class: None,
            group_class: None,
            no_label: false,
        }
    }

    pub fn text() -> Self {
        Self::new(FieldKind::Text)
    }

    pub fn textarea() -> Self {
        Self::new(FieldKind::Textarea)
    }

    pub fn number() -> Self {
        Self::new(FieldKind::Number)
    }

    pub fn hidden() -> Self {
        Self::new(FieldKind::Hidden)
    }

    pub fn select(options: Vec<SelectOption>) -> Self {
        Self::new(FieldKind::Select { options })
    }

    pub fn select_user() -> Self {
        Self::new(FieldKind::SelectUser)
    }

    pub fn radio(choices: Vec<Choice>, checked: Option<String>) -> Self {
        Self::new(FieldKind::RadioGroup { choices, checked })
    }

    pub fn checkboxes(choices: Vec<Choice>) -> Self {
        Self::new(FieldKind::CheckboxGroup { choices })
    }

    pub fn group(fields: Fields) -> Self {
        Self::new(FieldKind::Group { fields })
    }

    pub fn upload(url: impl Into<String>) -> Self {
        Self::new(FieldKind::FileUpload {
            url: url.into(),
            multiple: true,
        })
    }

    pub fn legend() -> Self {
        Self::new(FieldKind::Legend)
    }

    pub fn label(mut self, key: impl Into<String>) -> Self {
        self.label = Some(key.into());
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn value(mut self, value: impl ToString) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn placeholder(mut self, text: impl Into<String>) -> Self {
        self.placeholder = Some(text.into());
        self
    }

    pub fn help(mut self, text: impl Into<String>) -> Self {
        self.help = Some(text.into());
        self
    }

    pub fn append(mut self, text: impl Into<String>) -> Self {
        self.append = Some(text.into());
        self
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn group_class(mut self, class: impl Into<String>) -> Self {
        self.group_class = Some(class.into());
        self
    }

    pub fn no_label(mut self) -> Self {
        self.no_label = true;
        self
    }

    /// Choices of a radio or checkbox group; empty for other kinds.
    pub fn choices(&self) -> &[Choice] {
        match &self.kind {
            FieldKind::RadioGroup { choices, .. } | FieldKind::CheckboxGroup { choices } => {
                choices
            }
            _ => &[],
        }
    }

    /// Option list of a select; empty for other kinds.
    pub fn options(&self) -> &[SelectOption] {
        match &self.kind {
            FieldKind::Select { options } => options,
            _ => &[],
        }
    }

    /// Whether `value` is one of the field's declared choices or options.
    pub fn accepts(&self, value: &str) -> bool {
        self.choices().iter().any(|c| c.value == value)
            || self.options().iter().any(|o| o.value == value)
    }

    /// Sub-field of a group.
    pub fn sub_field(&self, name: &str) -> Option<&Field> {
        match &self.kind {
            FieldKind::Group { fields } => fields.get(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStyle {
    PrimarySubmit,
    DangerSubmit,
}

impl ButtonStyle {
    pub fn css_class(&self) -> &'static str {
        match self {
            Self::PrimarySubmit => "btn btn-primary",
            Self::DangerSubmit => "btn btn-danger",
        }
    }
}

/// Explicit button with confirmation metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionButton {
    pub style: ButtonStyle,
    pub label: String,
    pub class: Option<String>,
    pub name: Option<String>,
    /// Confirmation prompt, rendered as `data-message`.
    pub confirm: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Conventional primary submit; the label is a translation key.
    Submit(&'static str),
    Button(ActionButton),
}

impl Action {
    /// Name the button posts, if any.
    pub fn posted_name(&self) -> Option<&str> {
        match self {
            Self::Submit(_) => None,
            Self::Button(button) => button.name.as_deref(),
        }
    }
}

/// Capitalise the first letter of every word, e.g. `in progress` → `In Progress`.
pub fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

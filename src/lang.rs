//! UI strings keyed the way form definitions name their labels.
//!
//! Lookups fall back to English, then to the key itself, so literal labels
//! such as tag names pass through untouched.

use std::collections::HashMap;
use std::sync::LazyLock;

pub const DEFAULT_LOCALE: &str = "en";

static EN: &[(&str, &str)] = &[
    ("activity", "Activity"),
    ("age_day", ":count day ago"),
    ("age_days", ":count days ago"),
    ("age_hour", ":count hour ago"),
    ("age_hours", ":count hours ago"),
    ("age_just_now", "just now"),
    ("age_minute", ":count minute ago"),
    ("age_minutes", ":count minutes ago"),
    ("archived", "Archived"),
    ("assign_a_user", "Assign a user"),
    ("assign_users", "Assign users"),
    ("assigned_to", "Assigned to"),
    ("attachments", "Attachments"),
    ("bgcolor", "Background color"),
    ("columns", "Columns"),
    ("columns_help", "Status tags shown as columns on the project's kanban board."),
    ("comment", "Comment"),
    ("comments", "Comments"),
    ("create_issue", "Create Issue"),
    ("create_project", "Create Project"),
    ("create_tag", "Create Tag"),
    ("created_by", "Created by"),
    ("default_assignee", "Default assignee"),
    ("delete_issue_confirm", "Are you sure you want to delete this issue?"),
    ("delete_project_confirm", "Are you sure you want to delete this project and all of its issues?"),
    ("delete_something", "Delete :name"),
    ("edit_issue", "Edit Issue"),
    ("edit_project", "Edit Project"),
    ("edit_tag", "Edit Tag"),
    ("group", "Group"),
    ("hours", "Hours"),
    ("internal_status", "Internal status"),
    ("issue", "Issue"),
    ("kanban_board", "Kanban board"),
    ("minutes", "Minutes"),
    ("name", "Name"),
    ("new_issue", "New Issue"),
    ("new_project", "New Project"),
    ("new_tag", "New Tag"),
    ("no_issues", "No issues found."),
    ("none", "None"),
    ("open", "Open"),
    ("private", "Private"),
    ("projects", "Projects"),
    ("public", "Public"),
    ("quote", "Quote"),
    ("resolution", "Resolution"),
    ("role_limit", "Limit to role"),
    ("status", "Status"),
    ("title", "Title"),
    ("type", "Type"),
    ("update", "Update"),
    ("update_issue", "Update Issue"),
    ("update_tag", "Update Tag"),
    ("updated_by", "Updated by"),
    ("visibility", "Visibility"),
];

static FR: &[(&str, &str)] = &[
    ("age_days", "il y a :count jours"),
    ("age_hours", "il y a :count heures"),
    ("age_just_now", "à l'instant"),
    ("age_minutes", "il y a :count minutes"),
    ("archived", "Archivé"),
    ("assigned_to", "Assigné à"),
    ("attachments", "Pièces jointes"),
    ("create_issue", "Créer le ticket"),
    ("create_project", "Créer le projet"),
    ("created_by", "Créé par"),
    ("delete_something", "Supprimer :name"),
    ("hours", "Heures"),
    ("issue", "Ticket"),
    ("minutes", "Minutes"),
    ("name", "Nom"),
    ("no_issues", "Aucun ticket."),
    ("none", "Aucun"),
    ("open", "Ouvert"),
    ("private", "Privé"),
    ("projects", "Projets"),
    ("public", "Public"),
    ("quote", "Devis"),
    ("status", "Statut"),
    ("title", "Titre"),
    ("update", "Mettre à jour"),
    ("update_issue", "Mettre à jour le ticket"),
    ("updated_by", "Mis à jour par"),
];

static TABLES: LazyLock<HashMap<&'static str, HashMap<&'static str, &'static str>>> =
    LazyLock::new(|| {
        HashMap::from([
            ("en", EN.iter().copied().collect()),
            ("fr", FR.iter().copied().collect()),
        ])
    });

/// Whether a translation table exists for `locale`.
pub fn is_supported(locale: &str) -> bool {
    TABLES.contains_key(locale)
}

/// Translate `key` for `locale`.
pub fn trans(locale: &str, key: &str) -> String {
    TABLES
        .get(locale)
        .and_then(|table| table.get(key))
        .or_else(|| TABLES.get(DEFAULT_LOCALE).and_then(|table| table.get(key)))
        .map(|s| s.to_string())
        .unwrap_or_else(|| key.to_string())
}

/// Translate `key` and substitute `:placeholder` values.
pub fn trans_with(locale: &str, key: &str, replacements: &[(&str, &str)]) -> String {
    let mut out = trans(locale, key);
    for (name, value) in replacements {
        out = out.replace(&format!(":{}", name), value);
    }
    out
}

//! Server-rendered pages.
//!
//! Pages are plain strings assembled with the same escaping helpers the
//! form renderer uses. Layout is intentionally bare; styling is left to the
//! stylesheet the front proxy serves.

use axum::response::Html;
use chrono::NaiveDateTime;

use super::models::{Attachment, Comment, Issue, IssueSummary, Project};
use crate::form::render::{html_escape, html_escape_into};
use crate::lang;

const SQLITE_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";

/// Wrap `body` in the page shell.
pub fn page(title: &str, body: &str) -> Html<String> {
    let mut out = String::from("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>");
    html_escape_into(&mut out, title);
    out.push_str(" - Tinyissue</title></head><body><div class=\"page\"><h1>");
    html_escape_into(&mut out, title);
    out.push_str("</h1>");
    out.push_str(body);
    out.push_str("</div></body></html>");
    Html(out)
}

/// Relative age of a stored timestamp, e.g. "3 hours ago". Timestamps that
/// do not parse are shown as stored.
pub fn age(locale: &str, timestamp: &str, now: NaiveDateTime) -> String {
    let Ok(then) = NaiveDateTime::parse_from_str(timestamp, SQLITE_TIMESTAMP) else {
        return timestamp.to_string();
    };
    let seconds = (now - then).num_seconds().max(0);
    let (unit, count) = match seconds {
        0..60 => return lang::trans(locale, "age_just_now"),
        60..3_600 => ("minute", seconds / 60),
        3_600..86_400 => ("hour", seconds / 3_600),
        86_400..2_592_000 => ("day", seconds / 86_400),
        _ => return then.format("%Y-%m-%d").to_string(),
    };
    let key = if count == 1 {
        format!("age_{}", unit)
    } else {
        format!("age_{}s", unit)
    };
    let count = count.to_string();
    lang::trans_with(locale, &key, &[("count", count.as_str())])
}

pub fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

/// Public landing page.
pub fn landing(locale: &str, projects: &[Project]) -> Html<String> {
    let mut body = String::from("<ul class=\"projects\">");
    for project in projects {
        body.push_str("<li><a href=\"/");
        html_escape_into(&mut body, &project.to(""));
        body.push_str("\">");
        html_escape_into(&mut body, &project.name);
        body.push_str("</a></li>");
    }
    body.push_str("</ul>");
    page(&lang::trans(locale, "projects"), &body)
}

/// Open issues of a project with comment counts and authorship lines.
pub fn issues_list(locale: &str, issues: &[IssueSummary], now: NaiveDateTime) -> String {
    if issues.is_empty() {
        return format!("<p>{}</p>", html_escape(&lang::trans(locale, "no_issues")));
    }

    let mut out = String::from("<ul class=\"issues\">");
    for summary in issues {
        let issue = &summary.issue;
        let href = format!("/{}", issue.to(""));
        out.push_str(&format!(
            "<li><a href=\"{href}\" class=\"comments\">{}</a><a href=\"{href}\" class=\"id\">#{}</a>",
            summary.count_comments, issue.id
        ));
        out.push_str("<div class=\"data\"><a href=\"");
        html_escape_into(&mut out, &href);
        out.push_str("\">");
        html_escape_into(&mut out, &issue.title);
        out.push_str("</a><div class=\"info\">");
        html_escape_into(&mut out, &lang::trans(locale, "created_by"));
        out.push_str(" <strong>");
        html_escape_into(&mut out, &summary.created_by_name);
        out.push_str("</strong> ");
        html_escape_into(&mut out, &age(locale, &issue.created_at, now));
        if let Some(name) = &summary.updated_by_name {
            out.push_str(" - ");
            html_escape_into(&mut out, &lang::trans(locale, "updated_by"));
            out.push_str(" <strong>");
            html_escape_into(&mut out, name);
            out.push_str("</strong> ");
            html_escape_into(&mut out, &age(locale, &issue.updated_at, now));
        }
        out.push_str("</div></div></li>");
    }
    out.push_str("</ul>");
    out
}

pub fn project_page(
    locale: &str,
    project: &Project,
    issues: &[IssueSummary],
    now: NaiveDateTime,
) -> Html<String> {
    let mut body = format!(
        "<nav><a href=\"/{}\">{}</a> <a href=\"/{}\">{}</a></nav>",
        project.to("issue/new"),
        html_escape(&lang::trans(locale, "new_issue")),
        project.to("edit"),
        html_escape(&lang::trans(locale, "edit_project")),
    );
    body.push_str(&issues_list(locale, issues, now));
    page(&project.name, &body)
}

fn attachment_item(out: &mut String, project_id: i64, attachment: &Attachment) {
    let Some(download) = attachment.download(project_id) else {
        return;
    };
    out.push_str("<li><a href=\"/");
    html_escape_into(out, &download);
    out.push_str("\">");
    html_escape_into(out, &attachment.filename);
    out.push_str("</a>");
    if attachment.is_image()
        && let Some(display) = attachment.display(project_id)
    {
        out.push_str("<img src=\"/");
        html_escape_into(out, &display);
        out.push_str("\" alt=\"");
        html_escape_into(out, &attachment.filename);
        out.push_str("\">");
    }
    out.push_str("</li>");
}

/// Inputs of the comment form beyond the issue itself.
pub struct CommentForm<'a> {
    pub upload_token: &'a str,
    pub can_comment: bool,
}

pub fn issue_page(
    locale: &str,
    issue: &Issue,
    comments: &[Comment],
    attachments: &[Attachment],
    comment_form: CommentForm<'_>,
    now: NaiveDateTime,
) -> Html<String> {
    let mut body = String::from("<div class=\"issue\"><ul class=\"tags\">");
    for tag in &issue.tags {
        body.push_str("<li style=\"background-color: ");
        html_escape_into(&mut body, &tag.bgcolor);
        body.push_str("\">");
        html_escape_into(&mut body, &tag.name);
        body.push_str("</li>");
    }
    body.push_str("</ul><div class=\"body\">");
    html_escape_into(&mut body, &issue.body);
    body.push_str("</div>");

    let (on_issue, on_comments): (Vec<&Attachment>, Vec<&Attachment>) =
        attachments.iter().partition(|a| a.comment_id.is_none());
    if !on_issue.is_empty() {
        body.push_str("<h3>");
        html_escape_into(&mut body, &lang::trans(locale, "attachments"));
        body.push_str("</h3><ul class=\"attachments\">");
        for attachment in on_issue {
            attachment_item(&mut body, issue.project_id, attachment);
        }
        body.push_str("</ul>");
    }
    body.push_str(&format!(
        "<a href=\"/{}\" class=\"edit-issue\">{}</a></div>",
        issue.to("edit"),
        html_escape(&lang::trans(locale, "edit_issue"))
    ));

    body.push_str("<ul class=\"comments\">");
    for comment in comments {
        body.push_str(&format!("<li id=\"comment{}\"><div class=\"info\">", comment.id));
        html_escape_into(&mut body, &age(locale, &comment.created_at, now));
        body.push_str("</div><div class=\"content\">");
        html_escape_into(&mut body, &comment.comment);
        body.push_str("</div>");
        let own: Vec<&&Attachment> = on_comments
            .iter()
            .filter(|a| a.comment_id == Some(comment.id))
            .collect();
        if !own.is_empty() {
            body.push_str("<ul class=\"attachments\">");
            for attachment in own {
                attachment_item(&mut body, issue.project_id, attachment);
            }
            body.push_str("</ul>");
        }
        body.push_str("</li>");
    }
    body.push_str("</ul>");

    if comment_form.can_comment {
        body.push_str(&format!(
            "<form method=\"POST\" action=\"/{}\" class=\"form-vertical comment-form\">",
            issue.to("comment")
        ));
        body.push_str("<textarea name=\"comment\" class=\"form-control\"></textarea>");
        body.push_str("<input type=\"hidden\" name=\"upload_token\" value=\"");
        html_escape_into(&mut body, comment_form.upload_token);
        body.push_str(&format!(
            "\"><div class=\"upload\" data-url=\"/project/{}/upload_attachment\"></div>",
            issue.project_id
        ));
        body.push_str("<button type=\"submit\" class=\"btn btn-primary\">");
        html_escape_into(&mut body, &lang::trans(locale, "comment"));
        body.push_str("</button></form>");
    }

    page(&format!("#{} {}", issue.id, issue.title), &body)
}

//! Server-rendered pages.
//!
//! Templates live under `templates/` and are filled by `{{PLACEHOLDER}}`
//! substitution. Element ids in the templates (`authForm`, `statusMessage`,
//! `usersTableBody`, `analyticsContainer`, `authStatus`, `adminContent`, ...)
//! are a contract with the hosting page's scripts and styles. Everything
//! interpolated goes through [`escape_html`].

use std::fmt::Write;

use crate::backend::{Identity, Profile};
use crate::services::dashboard::{Analytics, DashboardError, DashboardView, Notice};

const LOGIN_TEMPLATE: &str = include_str!("../templates/login.html");
const PENDING_TEMPLATE: &str = include_str!("../templates/pending.html");
const APP_TEMPLATE: &str = include_str!("../templates/app.html");
const ADMIN_TEMPLATE: &str = include_str!("../templates/admin.html");

const MISSING_COUNT: &str = "\u{2014}";

/// Escape text for HTML bodies and attribute values. Braces are escaped too
/// so interpolated text can never be mistaken for a template placeholder.
#[must_use]
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '{' => out.push_str("&#123;"),
            '}' => out.push_str("&#125;"),
            other => out.push(other),
        }
    }
    out
}

#[must_use]
pub fn render_login(status: Option<&str>, email: &str) -> String {
    LOGIN_TEMPLATE
        .replace("{{STATUS}}", &escape_html(status.unwrap_or_default()))
        .replace("{{EMAIL}}", &escape_html(email))
}

/// Blocking panel for identities that are signed in but not approved. The
/// only action offered is sign-out.
#[must_use]
pub fn render_pending(user: &Identity) -> String {
    PENDING_TEMPLATE.replace("{{NAME}}", &escape_html(&user.display_name()))
}

#[must_use]
pub fn render_app(user: &Identity, is_admin: bool) -> String {
    let admin_link = if is_admin { r#"<a id="adminLink" href="/admin">Admin</a>"# } else { "" };
    APP_TEMPLATE
        .replace("{{ADMIN_LINK}}", admin_link)
        .replace("{{NAME}}", &escape_html(&user.display_name()))
        .replace("{{EMAIL}}", &escape_html(user.email.as_deref().unwrap_or_default()))
}

#[must_use]
pub fn render_admin(view: &DashboardView) -> String {
    ADMIN_TEMPLATE
        .replace("{{AUTH_STATUS}}", "")
        .replace("{{CONTENT_CLASS}}", "")
        .replace("{{NOTICE}}", &render_notice(view.notice.as_ref()))
        .replace("{{ANALYTICS}}", &render_analytics(&view.analytics))
        .replace("{{USER_ROWS}}", &render_user_rows(&view.users))
}

/// Admin page with the content panel hidden and nothing loaded.
#[must_use]
pub fn render_access_denied(err: &DashboardError) -> String {
    ADMIN_TEMPLATE
        .replace("{{AUTH_STATUS}}", &escape_html(&err.to_string()))
        .replace("{{CONTENT_CLASS}}", "hidden")
        .replace("{{NOTICE}}", "")
        .replace("{{ANALYTICS}}", "")
        .replace("{{USER_ROWS}}", "")
}

/// One `<tr>` per profile; the Approve action only for unapproved rows.
#[must_use]
pub fn render_user_rows(users: &[Profile]) -> String {
    let mut rows = String::new();
    for user in users {
        let name = user.full_name.as_deref().unwrap_or("(no name)");
        let status = if user.is_approved { "Approved" } else { "Pending" };
        let action = if user.is_approved {
            String::new()
        } else {
            format!(
                r#"<form method="post" action="/admin/users/{}/approve"><button type="submit" class="text-indigo-400 hover:text-indigo-600">Approve</button></form>"#,
                escape_html(&user.id)
            )
        };
        let _ = write!(
            rows,
            r#"        <tr data-user-id="{id}">
          <td class="px-6 py-4 whitespace-nowrap text-sm text-gray-300">{name}</td>
          <td class="px-6 py-4 whitespace-nowrap text-sm text-gray-300">{status}</td>
          <td class="px-6 py-4 whitespace-nowrap text-right text-sm font-medium">{action}</td>
        </tr>
"#,
            id = escape_html(&user.id),
            name = escape_html(name),
        );
    }
    rows
}

#[must_use]
pub fn render_analytics(analytics: &Analytics) -> String {
    let card = |title: &str, value: Option<u64>| {
        let value = value.map_or_else(|| MISSING_COUNT.to_owned(), |v| v.to_string());
        format!(
            r#"      <div class="bg-slate-800 p-6 rounded-xl shadow-lg">
        <h3 class="text-gray-400 uppercase text-sm font-bold">{title}</h3>
        <p class="text-white text-3xl font-bold mt-2">{value}</p>
      </div>
"#
        )
    };
    let mut out = card("Daily Active Users (DAU)", analytics.dau);
    out.push_str(&card("Monthly Active Users (MAU)", analytics.mau));
    out
}

#[must_use]
pub fn render_notice(notice: Option<&Notice>) -> String {
    let Some(notice) = notice else {
        return String::new();
    };
    let kind = match notice {
        Notice::Success(_) => "success",
        Notice::Failure(_) => "error",
    };
    format!(
        r#"<div id="notice" role="alert" class="notice notice-{kind}">{}</div>"#,
        escape_html(notice.message())
    )
}

#[cfg(test)]
#[path = "views_test.rs"]
mod tests;

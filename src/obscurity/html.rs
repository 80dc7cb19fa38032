//! Server-rendered pages.

use super::handlers::FieldErrors;
use super::users::User;

const APP_TITLE: &str = "obscurity";

const STYLE: &str = "body{background:#000;color:#fff;font-family:sans-serif;display:flex;\
justify-content:center;padding-top:4rem}main{max-width:28rem;width:100%}\
h1{text-align:center;letter-spacing:.1em}input{width:100%;padding:.4rem;margin:.3rem 0;\
background:#000;color:#fff;border:1px solid #a855f7}button{width:100%;padding:.5rem;\
background:#000;color:#fff;border:1px solid #a855f7}.error{color:#b91c1c;padding-top:.25rem}\
a{color:#3b82f6}";

/// Escape text for use in element content and quoted attribute values.
#[must_use]
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
<meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">\n\
<title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n<main>\n\
<h1>OBSCURITY</h1>\n{body}\n</main>\n</body>\n</html>\n",
        title = escape(title),
    )
}

fn query_suffix(query: Option<&str>) -> String {
    match query {
        Some(query) if !query.is_empty() => format!("?{query}"),
        _ => String::new(),
    }
}

/// Text input plus its inline error, wired up with `aria-*` attributes.
fn field(
    id: &str,
    input_type: &str,
    placeholder: &str,
    autocomplete: &str,
    error: Option<&str>,
) -> String {
    let (invalid, message, autofocus) = match error {
        Some(message) => (
            " aria-invalid=\"true\"",
            format!(
                "\n<div class=\"error\" id=\"{id}-error\">{}</div>",
                escape(message)
            ),
            " autofocus",
        ),
        None => ("", String::new(), ""),
    };
    format!(
        "<div>\n<input id=\"{id}\" name=\"{id}\" type=\"{input_type}\" placeholder=\"{placeholder}\" \
autocomplete=\"{autocomplete}\" aria-describedby=\"{id}-error\"{invalid}{autofocus}>{message}\n</div>"
    )
}

#[must_use]
pub fn index_page(user: Option<&User>) -> String {
    let body = match user {
        Some(user) => format!(
            "<p><a href=\"/notes\">View Notes for {}</a></p>",
            escape(&user.email)
        ),
        None => "<p id=\"footer\"><a href=\"/login\">login</a> / <a href=\"/join\">register</a></p>"
            .to_string(),
    };
    layout(APP_TITLE, &body)
}

#[must_use]
pub fn join_page(redirect_to: Option<&str>, query: Option<&str>, errors: &FieldErrors) -> String {
    let body = format!(
        "<form method=\"post\" action=\"/join\">\n{email}\n{password}\n{invite}\n\
<input type=\"hidden\" name=\"redirectTo\" value=\"{redirect_to}\">\n\
<button type=\"submit\">submit</button>\n</form>\n\
<p>already have an account? <a href=\"/login{query}\">log in</a></p>",
        email = field("email", "email", "email address", "email", errors.email.as_deref()),
        password = field(
            "password",
            "password",
            "password",
            "new-password",
            errors.password.as_deref()
        ),
        invite = field("invCode", "text", "invite code", "off", None),
        redirect_to = escape(redirect_to.unwrap_or_default()),
        query = escape(&query_suffix(query)),
    );
    layout(&format!("register - {APP_TITLE}"), &body)
}

#[must_use]
pub fn login_page(redirect_to: &str, query: Option<&str>, errors: &FieldErrors) -> String {
    let body = format!(
        "<form method=\"post\" action=\"/login\">\n{email}\n{password}\n\
<input type=\"hidden\" name=\"redirectTo\" value=\"{redirect_to}\">\n\
<label><input type=\"checkbox\" name=\"remember\" id=\"remember\"> remember me</label>\n\
<button type=\"submit\">submit</button>\n</form>\n\
<p>don't have an account? <a href=\"/join{query}\">join</a></p>\n\
<p id=\"footer\"><a href=\"/\">home</a></p>",
        email = field("email", "email", "email address", "email", errors.email.as_deref()),
        password = field(
            "password",
            "password",
            "password",
            "current-password",
            errors.password.as_deref()
        ),
        redirect_to = escape(redirect_to),
        query = escape(&query_suffix(query)),
    );
    layout(&format!("login - {APP_TITLE}"), &body)
}

#[must_use]
pub fn notes_page(user: &User) -> String {
    let body = format!(
        "<p>Notes for {}</p>\n<form method=\"post\" action=\"/logout\">\n\
<button type=\"submit\">logout</button>\n</form>\n<p id=\"footer\"><a href=\"/\">home</a></p>",
        escape(&user.email)
    );
    layout(&format!("notes - {APP_TITLE}"), &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn escape_handles_markup() {
        assert_eq!(
            escape(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#x27;&amp;&#x27;&lt;/a&gt;"
        );
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn index_page_links_depend_on_user() {
        let anonymous = index_page(None);
        assert!(anonymous.contains("href=\"/login\""));
        assert!(anonymous.contains("href=\"/join\""));

        let user = User {
            id: Uuid::new_v4(),
            email: "a@b.com".to_string(),
        };
        let personal = index_page(Some(&user));
        assert!(personal.contains("View Notes for a@b.com"));
        assert!(!personal.contains("href=\"/join\""));
    }

    #[test]
    fn join_page_renders_inline_errors() {
        let errors = FieldErrors {
            email: None,
            password: Some("Password is too short".to_string()),
        };
        let page = join_page(Some("/notes"), Some("redirectTo=%2Fnotes"), &errors);
        assert!(page.contains("<div class=\"error\" id=\"password-error\">Password is too short</div>"));
        assert!(!page.contains("id=\"email-error\">"));
        assert!(page.contains("name=\"invCode\""));
        assert!(page.contains("name=\"redirectTo\" value=\"/notes\""));
        assert!(page.contains("href=\"/login?redirectTo=%2Fnotes\""));
    }

    #[test]
    fn login_page_escapes_redirect_value() {
        let page = login_page("/\"><script>", None, &FieldErrors::default());
        assert!(!page.contains("<script>"));
        assert!(page.contains("name=\"remember\""));
        assert!(page.contains("href=\"/join\""));
    }

    #[test]
    fn notes_page_offers_logout() {
        let user = User {
            id: Uuid::new_v4(),
            email: "<b>@b.com".to_string(),
        };
        let page = notes_page(&user);
        assert!(page.contains("action=\"/logout\""));
        assert!(page.contains("&lt;b&gt;@b.com"));
    }
}

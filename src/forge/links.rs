use regex::Regex;
use std::sync::OnceLock;

use super::PageCursor;

/// Extracts the `rel="next"` target from an RFC 8288 `Link` header, e.g.
/// `<https://api.github.com/x?page=2>; rel="next", <...>; rel="last"`.
pub fn next_page(link_header: &str) -> Option<PageCursor> {
    link_header.split(',').find_map(|part| {
        let mut segments = part.split(';');
        let target = segments.next()?.trim();
        let is_next = segments.any(|param| {
            let param = param.trim();
            param == r#"rel="next""# || param == "rel=next"
        });
        if !is_next {
            return None;
        }

        let url = target.strip_prefix('<')?.strip_suffix('>')?;
        if url.is_empty() {
            None
        } else {
            Some(PageCursor(url.to_string()))
        }
    })
}

fn noreply_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(?:\d+\+)?([a-z0-9](?:[a-z0-9-]*[a-z0-9])?)@users\.noreply\.github\.com$")
            .unwrap_or_else(|e| panic!("invalid noreply pattern: {e}"))
    })
}

/// GitHub's private commit emails embed the account login:
/// `1000+bla@users.noreply.github.com` or the older `bla@users.noreply.github.com`.
pub fn login_from_noreply_email(email: &str) -> Option<String> {
    noreply_pattern()
        .captures(email.trim())
        .and_then(|captures| captures.get(1))
        .map(|login| login.as_str().to_string())
}

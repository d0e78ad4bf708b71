use crate::config::parse_bool_env;
use axum::http::{header, HeaderMap};
use std::{env, sync::OnceLock};

/// HttpOnly cookie carrying the session token for browser clients.
pub const SESSION_COOKIE: &str = "wt_session";

#[derive(Debug, Clone, PartialEq, Eq)]
struct CookiePolicy {
    secure: bool,
    same_site: &'static str,
    domain: Option<String>,
}

impl CookiePolicy {
    fn from_env() -> Self {
        let same_site = parse_same_site(
            &env::var("AUTH_COOKIE_SAMESITE").unwrap_or_else(|_| "Lax".to_string()),
        );
        let domain = env::var("AUTH_COOKIE_DOMAIN")
            .ok()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        Self {
            // SameSite=None is rejected by browsers unless Secure is set too.
            secure: same_site == "None" || parse_bool_env("AUTH_COOKIE_SECURE", false),
            same_site,
            domain,
        }
    }

    fn render(&self, pair: &str, max_age: &str) -> String {
        let mut cookie = format!(
            "{pair}; Path=/; {max_age}; HttpOnly; SameSite={}",
            self.same_site
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        if let Some(domain) = &self.domain {
            cookie.push_str("; Domain=");
            cookie.push_str(domain);
        }
        cookie
    }
}

fn policy() -> &'static CookiePolicy {
    static POLICY: OnceLock<CookiePolicy> = OnceLock::new();
    POLICY.get_or_init(CookiePolicy::from_env)
}

fn parse_same_site(value: &str) -> &'static str {
    match value.trim().to_ascii_lowercase().as_str() {
        "strict" => "Strict",
        "none" => "None",
        _ => "Lax",
    }
}

/// `Set-Cookie` value that stores the session token.
pub fn session_cookie(token: &str, max_age_seconds: u64) -> String {
    policy().render(
        &format!("{SESSION_COOKIE}={token}"),
        &format!("Max-Age={max_age_seconds}"),
    )
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_session_cookie() -> String {
    policy().render(
        &format!("{SESSION_COOKIE}="),
        "Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
    )
}

pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|line| line.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key.trim() == name && !value.trim().is_empty()).then(|| value.trim().to_string())
        })
}

//! Cookie header parsing and `Set-Cookie` serialisation.

use http::HeaderMap;
use http::header::COOKIE;
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Parse every `Cookie` header on a request into a name/value map.
///
/// Values are percent-decoded and stripped of surrounding quotes. Pairs
/// without `=` are ignored, and the first occurrence of a name wins.
pub fn request_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for value in headers.get_all(COOKIE) {
        if let Ok(raw) = value.to_str() {
            for (name, value) in parse_cookie_header(raw) {
                cookies.entry(name).or_insert(value);
            }
        }
    }
    cookies
}

/// Parse a single `Cookie` header value.
pub fn parse_cookie_header(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            let decoded = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());
            Some((name.to_string(), decoded))
        })
        .collect()
}

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Builder for a `Set-Cookie` header value.
///
/// ```
/// use psylab_core::cookie::{SameSite, SetCookie};
/// use std::time::Duration;
///
/// let cookie = SetCookie::new("user.sess", "s:abc")
///     .max_age(Duration::from_secs(60))
///     .http_only(true)
///     .same_site(SameSite::Strict);
/// assert!(cookie.to_header_value().starts_with("user.sess=s%3Aabc; Max-Age=60"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub max_age: Option<Duration>,
    pub expires: Option<SystemTime>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<SameSite>,
}

impl SetCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: "/".to_string(),
            max_age: None,
            expires: None,
            http_only: false,
            secure: false,
            same_site: None,
        }
    }

    /// A cookie that instructs the client to drop `name` immediately.
    pub fn clear(name: impl Into<String>) -> Self {
        let mut cookie = Self::new(name, "");
        cookie.expires = Some(UNIX_EPOCH);
        cookie
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Relative lifetime; also emitted as an absolute `Expires` date.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn http_only(mut self, enabled: bool) -> Self {
        self.http_only = enabled;
        self
    }

    pub fn secure(mut self, enabled: bool) -> Self {
        self.secure = enabled;
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    pub fn to_header_value(&self) -> String {
        self.render_at(SystemTime::now())
    }

    /// Serialise with `now` as the reference point for `Expires`.
    pub fn render_at(&self, now: SystemTime) -> String {
        let mut out = format!("{}={}", self.name, urlencoding::encode(&self.value));

        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={}", max_age.as_secs()));
        }
        out.push_str(&format!("; Path={}", self.path));

        let expires = self.expires.or_else(|| self.max_age.map(|age| now + age));
        if let Some(expires) = expires {
            out.push_str(&format!("; Expires={}", httpdate::fmt_http_date(expires)));
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if let Some(same_site) = self.same_site {
            out.push_str(&format!("; SameSite={}", same_site.as_str()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_parse_cookie_header() {
        let cookies = parse_cookie_header(r#"a=1; b="two"; junk; c=s%3Ax.y; =nameless"#);
        assert_eq!(
            cookies,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "two".to_string()),
                ("c".to_string(), "s:x.y".to_string()),
            ]
        );
    }

    #[test]
    fn test_first_cookie_wins_across_headers() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("sid=first"));
        headers.append(COOKIE, HeaderValue::from_static("sid=second; other=x"));
        let cookies = request_cookies(&headers);
        assert_eq!(cookies["sid"], "first");
        assert_eq!(cookies["other"], "x");
    }

    #[test]
    fn test_set_cookie_attributes() {
        let now = UNIX_EPOCH + Duration::from_secs(784_111_777);
        let value = SetCookie::new("user.sess", "s:{\"a\":1}.sig")
            .max_age(Duration::from_millis(86_400_000))
            .http_only(true)
            .secure(true)
            .same_site(SameSite::Strict)
            .render_at(now);

        assert_eq!(
            value,
            "user.sess=s%3A%7B%22a%22%3A1%7D.sig; Max-Age=86400; Path=/; \
             Expires=Mon, 07 Nov 1994 08:49:37 GMT; HttpOnly; Secure; SameSite=Strict"
        );
    }

    #[test]
    fn test_clear_cookie() {
        let value = SetCookie::clear("user.sess").to_header_value();
        assert_eq!(
            value,
            "user.sess=; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT"
        );
    }
}

/*
 * Copyright 2025, the University of Queensland
 * Author: Alex Wilson <alex@uq.edu.au>
 *
 * Permission to use, copy, modify, and distribute this software for any
 * purpose with or without fee is hereby granted, provided that the above
 * copyright notice and this permission notice appear in all copies.
 *
 * THE SOFTWARE IS PROVIDED "AS IS" AND THE AUTHOR DISCLAIMS ALL WARRANTIES
 * WITH REGARD TO THIS SOFTWARE INCLUDING ALL IMPLIED WARRANTIES OF
 * MERCHANTABILITY AND FITNESS. IN NO EVENT SHALL THE AUTHOR BE LIABLE FOR
 * ANY SPECIAL, DIRECT, INDIRECT, OR CONSEQUENTIAL DAMAGES OR ANY DAMAGES
 * WHATSOEVER RESULTING FROM LOSS OF USE, DATA OR PROFITS, WHETHER IN AN
 * ACTION OF CONTRACT, NEGLIGENCE OR OTHER TORTIOUS ACTION, ARISING OUT OF
 * OR IN CONNECTION WITH THE USE OR PERFORMANCE OF THIS SOFTWARE.
 */

//! Per-request context, filled in once from the incoming HTTP request.

use serde_json::{Map, Value};

use crate::userinfo::AuthenticatedUser;

/// Headers a proxy may use to tell us which URI the user actually asked
/// for, most specific first. If none are present we fall back to the URL
/// of the request itself.
const PATH_HEADERS: [&str; 2] = ["x-original-uri", "x-forwarded-uri"];

#[derive(Debug, Default, Clone)]
pub struct RequestContext {
    /// Path component only, without query string or fragment.
    pub request_path: Option<String>,
    pub user: Option<AuthenticatedUser>,
    pub request_id: Option<String>,
    /// Request-scoped values handed back to the proxy on `Allow`.
    pub context: Map<String, Value>,
}

/// Drops the query string and fragment from a request URI.
pub(crate) fn path_only(uri: &str) -> &str {
    match uri.find(|c| c == '?' || c == '#') {
        Some(i) => &uri[..i],
        None => uri
    }
}

impl RequestContext {
    /// The request path, or `""` if we never found one.
    pub fn path(&self) -> &str {
        self.request_path.as_deref().unwrap_or("")
    }

    /// Builds a context from the request URL and its headers. Header names
    /// are compared case-insensitively.
    pub fn from_parts<'a, I>(url: &str, headers: I, email_header: &str) -> Self
    where I: IntoIterator<Item = (&'a str, &'a str)> + Clone
    {
        let find = |name: &str| headers.clone().into_iter()
            .find(|(f, _)| f.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.to_string());

        let request_path = PATH_HEADERS.iter()
            .filter_map(|&h| find(h))
            .chain(std::iter::once(url.to_string()))
            .map(|uri| path_only(&uri).to_string())
            .find(|p| !p.is_empty());

        let user = find(email_header).map(|e| AuthenticatedUser::new(&e));

        RequestContext {
            request_path,
            user,
            request_id: find("x-request-id"),
            context: Map::new(),
        }
    }

    pub fn from_request(req: &tiny_http::Request, email_header: &str) -> Self {
        let headers: Vec<(&str, &str)> = req.headers().iter()
            .map(|h| (h.field.as_str().as_str(), h.value.as_str()))
            .collect();
        Self::from_parts(req.url(), headers.iter().copied(), email_header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMAIL: &str = "x-authentik-email";
    const NONE: [(&str, &str); 0] = [];

    #[test]
    fn original_uri_wins() {
        let hdrs = [
            ("X-Forwarded-Uri", "/forwarded"),
            ("X-Original-URI", "/application/o/userinfo/emails"),
        ];
        let ctx = RequestContext::from_parts("/auth", hdrs, EMAIL);
        assert_eq!(ctx.path(), "/application/o/userinfo/emails");
    }

    #[test]
    fn forwarded_uri_beats_url() {
        let hdrs = [("x-forwarded-uri", "/application/o/userinfo")];
        let ctx = RequestContext::from_parts("/auth", hdrs, EMAIL);
        assert_eq!(ctx.path(), "/application/o/userinfo");
    }

    #[test]
    fn falls_back_to_url() {
        let ctx = RequestContext::from_parts("/userinfo/emails", NONE, EMAIL);
        assert_eq!(ctx.request_path.as_deref(), Some("/userinfo/emails"));
    }

    #[test]
    fn empty_header_is_skipped() {
        let hdrs = [("x-original-uri", "")];
        let ctx = RequestContext::from_parts("/userinfo", hdrs, EMAIL);
        assert_eq!(ctx.path(), "/userinfo");
    }

    #[test]
    fn no_path_anywhere() {
        let ctx = RequestContext::from_parts("", NONE, EMAIL);
        assert_eq!(ctx.request_path, None);
        assert_eq!(ctx.path(), "");
    }

    #[test]
    fn query_and_fragment_stripped() {
        let hdrs = [("x-original-uri", "/userinfo/emails?per_page=100")];
        let ctx = RequestContext::from_parts("/", hdrs, EMAIL);
        assert_eq!(ctx.path(), "/userinfo/emails");

        let ctx = RequestContext::from_parts("/userinfo/emails#top", NONE, EMAIL);
        assert_eq!(ctx.path(), "/userinfo/emails");

        // only a query string: nothing left, fall through to the URL
        let hdrs = [("x-original-uri", "?a=b")];
        let ctx = RequestContext::from_parts("/userinfo", hdrs, EMAIL);
        assert_eq!(ctx.path(), "/userinfo");
    }

    #[test]
    fn user_from_header() {
        let hdrs = [("X-Authentik-Email", "alice@example.com"), ("X-Request-Id", "abc123")];
        let ctx = RequestContext::from_parts("/", hdrs, EMAIL);
        assert_eq!(ctx.user, Some(AuthenticatedUser::new("alice@example.com")));
        assert_eq!(ctx.request_id.as_deref(), Some("abc123"));
        assert!(ctx.context.is_empty());
    }

    #[test]
    fn custom_email_header() {
        let hdrs = [("x-auth-request-email", "bob@example.com")];
        let ctx = RequestContext::from_parts("/", hdrs, "X-Auth-Request-Email");
        assert_eq!(ctx.user.map(|u| u.email), Some("bob@example.com".to_string()));
    }

    #[test]
    fn missing_email_means_no_user() {
        let ctx = RequestContext::from_parts("/userinfo/emails", NONE, EMAIL);
        assert_eq!(ctx.user, None);
    }

    #[test]
    fn empty_email_is_kept() {
        let hdrs = [(EMAIL, "")];
        let ctx = RequestContext::from_parts("/", hdrs, EMAIL);
        assert_eq!(ctx.user, Some(AuthenticatedUser::new("")));
    }
}

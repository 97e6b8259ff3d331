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

//! Detection of the `/emails` lookup and shaping of the answer.
//!
//! Grafana appends `/emails` to the configured userinfo URL and wants a
//! list of email records back. Anything we don't recognise as that lookup
//! gets the default behaviour of the integration mode in use.

use clap::ValueEnum;
use serde_json::json;

use crate::context::RequestContext;
use crate::userinfo::{AuthenticatedUser, EmailRecord, Response};

/// Literal suffix identifying the lookup. Matched case-sensitively, with no
/// trailing-slash normalisation, so `/foo/emails` matches too.
pub const EMAILS_SUFFIX: &str = "/emails";

/// Key under which the policy mode leaves the email list in the request
/// context.
pub const CONTEXT_KEY: &str = "oauth_email_response";

pub fn is_emails_path(path: &str) -> bool {
    path.ends_with(EMAILS_SUFFIX)
}

/// Picks the answer for `path` on behalf of `user`. Never fails: anything
/// that isn't the lookup gets the scalar email.
pub fn respond(path: &str, user: &AuthenticatedUser) -> Response {
    if is_emails_path(path) {
        Response::EmailList(vec![EmailRecord::primary_for(user)])
    } else {
        Response::ScalarEmail(user.email.clone())
    }
}

#[derive(Debug, PartialEq)]
pub enum Decision {
    /// Let the request carry on, with whatever was left in the context.
    Allow,
    /// Answer the request with this body.
    Respond(Response),
}

/// Which host convention we answer in.
#[derive(ValueEnum, Debug, PartialEq, Clone, Copy)]
pub enum Mode {
    /// Scope-mapping style: always answer, list or scalar.
    Mapping,
    /// Expression-policy style: always allow, stashing the list in the
    /// context when the lookup is seen.
    Policy,
}

impl Mode {
    /// Evaluates this mode for one request. `None` means the mode can't
    /// answer without knowing who the user is.
    pub fn evaluate(&self, ctx: &mut RequestContext, user: Option<&AuthenticatedUser>)
        -> Option<Decision>
    {
        match self {
            Mode::Mapping => user.map(|u| mapping(ctx, u)),
            Mode::Policy => Some(policy(ctx, user)),
        }
    }
}

pub fn mapping(ctx: &RequestContext, user: &AuthenticatedUser) -> Decision {
    Decision::Respond(respond(ctx.path(), user))
}

/// Always allows. Without a user there is nothing to put in the list, so
/// the context is left alone.
pub fn policy(ctx: &mut RequestContext, user: Option<&AuthenticatedUser>) -> Decision {
    if let Some(user) = user {
        if is_emails_path(ctx.path()) {
            let list = json!([EmailRecord::primary_for(user).to_value()]);
            ctx.context.insert(CONTEXT_KEY.into(), list);
        }
    }
    Decision::Allow
}

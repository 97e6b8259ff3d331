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

//! User and email payload types, in the shape Grafana expects back from the
//! `/emails` lookup.

use serde::Serialize;
use serde_json::{json, Value};

/// The caller, as authenticated by the identity provider in front of us.
#[derive(Debug, PartialEq, Clone)]
pub struct AuthenticatedUser {
    pub email: String,
    /// We never look up verification state, so this is always `true` for
    /// users built by the request adapter.
    pub is_verified: bool,
}

impl AuthenticatedUser {
    pub fn new(email: &str) -> Self {
        AuthenticatedUser { email: email.into(), is_verified: true }
    }
}

#[derive(Serialize, Debug, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

/// One element of the GitHub-style email list.
#[derive(Serialize, Debug, PartialEq, Clone)]
pub struct EmailRecord {
    pub email: String,
    pub primary: bool,
    pub verified: bool,
    pub visibility: Visibility,
}

impl EmailRecord {
    /// The only record we ever hand out: the user's address, marked primary,
    /// verified and public.
    pub fn primary_for(user: &AuthenticatedUser) -> Self {
        EmailRecord {
            email: user.email.clone(),
            primary: true,
            verified: true,
            visibility: Visibility::Public,
        }
    }

    /// Same shape as the serde output, built without going through a
    /// serializer.
    pub fn to_value(&self) -> Value {
        json!({
            "email": self.email,
            "primary": self.primary,
            "verified": self.verified,
            "visibility": self.visibility.as_str(),
        })
    }
}

/// Body of a mapping-style answer: either the bare email string or the
/// email list.
#[derive(Serialize, Debug, PartialEq, Clone)]
#[serde(untagged)]
pub enum Response {
    ScalarEmail(String),
    EmailList(Vec<EmailRecord>),
}

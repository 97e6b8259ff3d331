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

use threadpool::ThreadPool;
use tiny_http::{Request, Response, Header, StatusCode};
use std::io::{self, Cursor};
use ascii::AsciiString;
use std::path::Path;
use serde::Serialize;
use serde_json::ser::Formatter;

use crate::context::{path_only, RequestContext};
use crate::responder::{Decision, Mode};

/// Local `Error` type for request processing.
#[derive(Debug)]
pub enum Error {
    /// Could not set up the listening socket
    Listen(String),
    /// A header name or value we can't put on the wire
    Header(String),
    Json(String),
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Error {
        Error::Json(value.to_string())
    }
}

impl From<Error> for String {
    fn from(err: Error) -> String {
        err.to_string()
    }
}

use std::fmt;
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Where to accept connections from
#[derive(Debug, Clone, PartialEq)]
pub enum Listen {
    Unix(String),
    Tcp(String),
}

impl fmt::Display for Listen {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Listen::Unix(path) => write!(f, "unix:{}", path),
            Listen::Tcp(addr) => write!(f, "tcp:{}", addr),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log: slog::Logger,
    pub listen: Listen,
    pub workers: usize,
    pub mode: Mode,
    pub email_header: String,
}

impl Config {
    pub fn with_log(mut self, log: slog::Logger) -> Self {
        self.log = log;
        self
    }
}

/// What we send back for one request, before it's turned into a
/// `tiny_http::Response`.
#[derive(Debug)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub headers: Vec<Header>,
    pub body: String,
}

impl Reply {
    fn text(status: u16, body: &str) -> Self {
        Reply { status, content_type: "text/plain", headers: Vec::new(), body: body.into() }
    }

    fn into_response(self) -> Result<Response<Cursor<Vec<u8>>>> {
        let mut resp = Response::from_string(self.body)
            .with_status_code(StatusCode(self.status))
            .with_header(make_header("content-type", self.content_type)?);
        for h in self.headers {
            resp.add_header(h);
        }
        Ok(resp)
    }
}

fn make_header(field: &str, value: &str) -> Result<Header> {
    let value = AsciiString::from_ascii(value)
        .map_err(|_| Error::Header(format!("non-ASCII value for {:?}", field)))?;
    let field = field.parse()
        .map_err(|_| Error::Header(format!("invalid header name {:?}", field)))?;
    Ok(Header { field, value })
}

/// JSON formatter that writes anything outside ASCII as `\uXXXX` escapes,
/// so the output can always go in a header value.
struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where W: ?Sized + io::Write
    {
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(&[c as u8])?;
            } else {
                let mut buf = [0u16; 2];
                for unit in c.encode_utf16(&mut buf) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Compact JSON, ASCII only.
fn to_ascii_json<T: Serialize>(value: &T) -> Result<String> {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, AsciiFormatter);
    value.serialize(&mut ser)?;
    String::from_utf8(out).map_err(|why| Error::Json(why.to_string()))
}

/// Turns a context key like `oauth_email_response` into the header name
/// `X-Oauth-Email-Response`.
fn context_header_name(key: &str) -> String {
    let words: Vec<String> = key.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut cs = w.chars();
            match cs.next() {
                Some(c) => c.to_ascii_uppercase().to_string() + cs.as_str(),
                None => String::new()
            }
        })
        .collect();
    format!("X-{}", words.join("-"))
}

pub struct Server {
    config: Config,
    server: tiny_http::Server,
    pool: ThreadPool,
}

impl Server {
    pub fn new(config: Config) -> Result<Self> {
        let pool = ThreadPool::new(config.workers);
        let server = match &config.listen {
            Listen::Unix(path) => tiny_http::Server::http_unix(Path::new(path)),
            Listen::Tcp(addr) => tiny_http::Server::http(addr.as_str()),
        };
        let server = server.map_err(|why| Error::Listen(why.to_string()))?;
        Ok(Server { config, server, pool })
    }

    pub fn run(&self) {
        let log = &self.config.log;
        info!(log, "listening for requests on {}", &self.config.listen;
            "mode" => format!("{:?}", self.config.mode));
        for request in self.server.incoming_requests() {
            let rlog = log.new(o!());
            let config = self.config.clone().with_log(rlog);
            self.pool.execute(move || Self::handle(&config, request));
        }
    }

    fn handle(config: &Config, request: Request) {
        let reply = if Self::is_health(request.url()) {
            Ok(Self::health())
        } else {
            let ctx = RequestContext::from_request(&request, &config.email_header);
            Self::process(config, ctx)
        };
        let resp = match reply.and_then(Reply::into_response) {
            Ok(resp) => resp,
            Err(why) => {
                error!(config.log, "failed to process request: {}", why);
                let mut resp = Response::from_string(String::from(why))
                    .with_status_code(StatusCode(500));
                if let Ok(h) = make_header("content-type", "text/plain") {
                    resp.add_header(h);
                }
                resp
            }
        };
        if let Err(why) = request.respond(resp) {
            error!(config.log, "failed to send response: {}", why);
        }
    }

    fn is_health(url: &str) -> bool {
        path_only(url) == "/health"
    }

    fn health() -> Reply {
        Reply::text(200, "ok")
    }

    /// Evaluates the configured mode against one request context and
    /// shapes the reply for the proxy.
    pub fn process(config: &Config, mut ctx: RequestContext) -> Result<Reply> {
        let mut log = config.log.new(o!("uri" => ctx.path().to_string()));
        if let Some(req_id) = &ctx.request_id {
            log = log.new(o!("request-id" => req_id.clone()));
        }

        let user = ctx.user.take();
        if let Some(u) = &user {
            log = log.new(o!("user" => u.email.clone(), "verified" => u.is_verified));
        }

        match config.mode.evaluate(&mut ctx, user.as_ref()) {
            None => {
                info!(log, "no authenticated user on request");
                Ok(Reply::text(401, "No authenticated user"))
            },
            Some(Decision::Respond(body)) => {
                debug!(log, "responding"; "body" => format!("{:?}", body));
                Ok(Reply {
                    status: 200,
                    content_type: "application/json",
                    headers: Vec::new(),
                    body: serde_json::to_string(&body)?,
                })
            },
            Some(Decision::Allow) => {
                let mut reply = Reply::text(200, "Allowed");
                for (key, value) in ctx.context.iter() {
                    let json = to_ascii_json(value)?;
                    reply.headers.push(make_header(&context_header_name(key), &json)?);
                }
                info!(log, "allowed access"; "context" => reply.headers.len());
                Ok(reply)
            },
        }
    }
}

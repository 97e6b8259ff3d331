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

//! `emailsd` is a side-car daemon to run alongside the reverse proxy in
//! front of an authentik instance, to answer Grafana's `/emails` lookup.
//!
//! Grafana's generic OAuth support appends `/emails` to the configured
//! userinfo URL and expects a GitHub-style list of email records back,
//! which authentik does not provide.
//!
//! The daemon listens for HTTP on a UNIX domain socket (or a TCP address)
//! and expects the proxy to add:
//!  * `X-Original-URI` (or `X-Forwarded-Uri`), containing the original
//!    request URI, if the request was not forwarded to us as-is
//!  * a header carrying the authenticated user's email address
//!    (`X-authentik-email` by default, as set by the authentik outpost)
//!
//! In `mapping` mode every request is answered with a JSON body: the email
//! list for paths ending in `/emails`, and the bare email string otherwise.
//! Requests without the email header get a 401.
//! In `policy` mode every request is allowed, and for the `/emails` lookup
//! the list is returned in the `X-Oauth-Email-Response` header for the
//! proxy to pick up (as JSON with non-ASCII characters `\u` escaped).

extern crate tiny_http;
extern crate serde;
extern crate serde_json;
extern crate threadpool;
extern crate ascii;
extern crate clap;

#[macro_use]
extern crate slog;
extern crate slog_term;
extern crate slog_async;

mod context;
mod responder;
mod userinfo;
mod server;

use server::{Server, Config, Listen};
use responder::Mode;
use clap::Parser;
use crate::slog::Drain;

/// Command-line arguments for `emailsd`
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to the UNIX domain listening socket
    #[arg(short, long, default_value = "/tmp/emailsd.sock")]
    listen_path: String,

    /// Listen on this TCP address instead of the UNIX socket
    #[arg(short = 'a', long)]
    listen_addr: Option<String>,

    /// Number of threads in the request worker threadpool
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// How to answer requests
    #[arg(short, long, value_enum, default_value_t = Mode::Mapping)]
    mode: Mode,

    /// Name of the HTTP header carrying the authenticated user's email
    #[arg(short, long, default_value = "X-authentik-email")]
    email_header: String,
}

fn main() {
    let Args { listen_path, listen_addr, workers, mode, email_header } = Args::parse();

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    let log = slog::Logger::root(drain, o!());

    let listen = match listen_addr {
        Some(addr) => Listen::Tcp(addr),
        None => {
            info!(log, "deleting old socket: {}", &listen_path);
            let _ = std::fs::remove_file(&listen_path);
            Listen::Unix(listen_path)
        }
    };

    let config = Config { log: log.clone(), listen, workers, mode, email_header };
    match Server::new(config) {
        Ok(server) => server.run(),
        Err(why) => {
            crit!(log, "failed to start: {}", why);
            // let the async drain flush before we go
            drop(log);
            std::process::exit(1);
        }
    }
}

pub use crate::error::Result;

pub use conf_parser::{Config, LocationConfig, ServerConfig};
pub use origin_log::{debug, error, info, trace, warn};

pub use mio::{
    Events, Interest, Poll, Token,
    event::Event,
    net::{TcpListener, TcpStream, UnixStream},
};

pub use std::collections::HashMap;
pub use std::fs::{self, File};
pub use std::io::{ErrorKind, Read, Write};
pub use std::net::SocketAddr;
pub use std::path::{Path, PathBuf};
pub use std::process::{Child, Command, Stdio};
pub use std::time::{Duration, Instant, SystemTime};

pub use crate::cgi::CgiProcess;
pub use crate::http::connection::{Connection, ConnectionState};
pub use crate::http::request::{HttpRequest, Method, ParseOutcome};
pub use crate::http::response::HttpResponse;
pub use crate::http::find_subsequence;
pub use crate::router::RouteResult;
pub use crate::server::Server;
pub use crate::vhost::HostMap;

pub const READ_BUF_SIZE: usize = 4096;
pub const MAX_HEADER_BYTES: usize = 64 * 1024;

pub const POLL_TIMEOUT_MS: u64 = 1000;
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(120);
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(30);
pub const CGI_TIMEOUT: Duration = Duration::from_secs(30);

/// FDs held back from accepting: stdio, the scratch fd, CGI pipes.
pub const FD_SAFETY_MARGIN: usize = 32;

// 3xx
pub const HTTP_MOVED_PERMANENTLY: u16 = 301;
pub const HTTP_FOUND: u16 = 302;

// 2xx
pub const HTTP_OK: u16 = 200;
pub const HTTP_CREATED: u16 = 201;
pub const HTTP_NO_CONTENT: u16 = 204;

// 4xx
pub const HTTP_BAD_REQUEST: u16 = 400;
pub const HTTP_FORBIDDEN: u16 = 403;
pub const HTTP_NOT_FOUND: u16 = 404;
pub const HTTP_METHOD_NOT_ALLOWED: u16 = 405;
pub const HTTP_PAYLOAD_TOO_LARGE: u16 = 413;
pub const HTTP_HEADERS_TOO_LARGE: u16 = 431;

// 5xx
pub const HTTP_INTERNAL_SERVER_ERROR: u16 = 500;
pub const HTTP_BAD_GATEWAY: u16 = 502;

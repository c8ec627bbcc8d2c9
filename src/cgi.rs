use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream as StdUnixStream;

use crate::http::response::error_response;
use crate::prelude::*;

/// One running CGI child. The record exclusively owns its three pipe
/// streams; the server's `cgi_fd_to_pid` map is only a lookup relation.
/// The record is destroyed once the child has exited and all three
/// streams are closed.
#[derive(Debug)]
pub struct CgiProcess {
    pub child: Child,
    pub client_token: Token,
    pub stdin: Option<UnixStream>,
    pub stdout: Option<UnixStream>,
    pub stderr: Option<UnixStream>,
    pub stdin_token: Token,
    pub stdout_token: Token,
    pub stderr_token: Token,
    pub stdin_buffer: Vec<u8>,
    pub stdin_offset: usize,
    pub stdout_data: Vec<u8>,
    pub stderr_data: Vec<u8>,
    pub method: Method,
    pub version: String,
    pub exited: bool,
    pub timed_out: bool,
    pub started_at: Instant,
}

impl CgiProcess {
    pub fn done(&self) -> bool {
        self.exited && self.stdin.is_none() && self.stdout.is_none() && self.stderr.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgiStreamKind {
    Stdin,
    Stdout,
    Stderr,
}

/// Builds the CGI/1.1 environment. Header values are whitespace-stripped;
/// every header other than Content-Type/Content-Length is forwarded as
/// `HTTP_*`.
pub fn build_cgi_env(req: &HttpRequest, script_path: &Path) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = Vec::with_capacity(req.headers.len() + 8);

    env.push(("GATEWAY_INTERFACE".to_string(), "CGI/1.1".to_string()));
    env.push(("SERVER_PROTOCOL".to_string(), req.version.clone()));
    env.push(("REQUEST_METHOD".to_string(), req.method.to_string()));
    env.push((
        "SCRIPT_FILENAME".to_string(),
        script_path.to_string_lossy().into_owned(),
    ));
    env.push(("SCRIPT_NAME".to_string(), req.path.clone()));
    env.push(("QUERY_STRING".to_string(), req.query.clone()));

    if let Some(ct) = req.headers.get("content-type") {
        env.push(("CONTENT_TYPE".to_string(), ct.trim().to_string()));
    }
    let content_length = if req.method == Method::POST {
        req.body.len()
    } else {
        0
    };
    env.push(("CONTENT_LENGTH".to_string(), content_length.to_string()));

    for (k, v) in &req.headers {
        if k == "content-type" || k == "content-length" {
            continue;
        }
        let key: String = "HTTP_"
            .chars()
            .chain(k.chars().map(|c| {
                if c == '-' { '_' } else { c.to_ascii_uppercase() }
            }))
            .collect();
        env.push((key, v.trim().to_string()));
    }

    env
}

/// Spawns `interpreter script_path` with the request body on stdin. The
/// three parent-side pipe ends are made non-blocking and registered: stdin
/// for write readiness, stdout and stderr for read readiness.
#[allow(clippy::too_many_arguments)]
pub fn spawn(
    poll: &Poll,
    next_token: &mut usize,
    cgi: &mut HashMap<u32, CgiProcess>,
    cgi_fd_to_pid: &mut HashMap<Token, u32>,
    client_token: Token,
    req: &HttpRequest,
    interpreter: &str,
    script_path: &Path,
) -> std::io::Result<()> {
    let (stdin_parent, stdin_child) = StdUnixStream::pair()?;
    let (stdout_parent, stdout_child) = StdUnixStream::pair()?;
    let (stderr_parent, stderr_child) = StdUnixStream::pair()?;

    stdin_parent.set_nonblocking(true)?;
    stdout_parent.set_nonblocking(true)?;
    stderr_parent.set_nonblocking(true)?;

    let mut cmd = Command::new(interpreter);
    cmd.arg(script_path)
        .env_clear()
        .envs(build_cgi_env(req, script_path))
        .stdin(Stdio::from(OwnedFd::from(stdin_child)))
        .stdout(Stdio::from(OwnedFd::from(stdout_child)))
        .stderr(Stdio::from(OwnedFd::from(stderr_child)));

    let mut child = cmd.spawn()?;
    let pid = child.id();

    let mut stdin_stream = UnixStream::from_std(stdin_parent);
    let mut stdout_stream = UnixStream::from_std(stdout_parent);
    let mut stderr_stream = UnixStream::from_std(stderr_parent);

    let stdin_token = Token(*next_token);
    let stdout_token = Token(*next_token + 1);
    let stderr_token = Token(*next_token + 2);
    *next_token += 3;

    let registered = poll
        .registry()
        .register(&mut stdin_stream, stdin_token, Interest::WRITABLE)
        .and_then(|_| {
            poll.registry()
                .register(&mut stdout_stream, stdout_token, Interest::READABLE)
        })
        .and_then(|_| {
            poll.registry()
                .register(&mut stderr_stream, stderr_token, Interest::READABLE)
        });
    if let Err(e) = registered {
        let _ = child.kill();
        let _ = child.wait();
        return Err(e);
    }

    cgi_fd_to_pid.insert(stdin_token, pid);
    cgi_fd_to_pid.insert(stdout_token, pid);
    cgi_fd_to_pid.insert(stderr_token, pid);

    cgi.insert(
        pid,
        CgiProcess {
            child,
            client_token,
            stdin: Some(stdin_stream),
            stdout: Some(stdout_stream),
            stderr: Some(stderr_stream),
            stdin_token,
            stdout_token,
            stderr_token,
            stdin_buffer: req.body.clone(),
            stdin_offset: 0,
            stdout_data: Vec::new(),
            stderr_data: Vec::new(),
            method: req.method,
            version: req.version.clone(),
            exited: false,
            timed_out: false,
            started_at: Instant::now(),
        },
    );

    info!("spawned cgi pid {} for client token {}", pid, client_token.0);
    Ok(())
}

/// Write readiness on the child's stdin: flush the request body, then close
/// the pipe so the script sees EOF. A write error here means the script
/// stopped reading; the pipe is closed the same way.
pub fn pump_stdin(poll: &Poll, p: &mut CgiProcess, cgi_fd_to_pid: &mut HashMap<Token, u32>) {
    let mut close = false;
    if let Some(stream) = p.stdin.as_mut() {
        while p.stdin_offset < p.stdin_buffer.len() {
            match stream.write(&p.stdin_buffer[p.stdin_offset..]) {
                Ok(0) => break,
                Ok(n) => p.stdin_offset += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(_) => {
                    close = true;
                    break;
                }
            }
        }
        if p.stdin_offset >= p.stdin_buffer.len() {
            close = true;
        }
    }
    if close {
        close_cgi_stream(poll, p, cgi_fd_to_pid, CgiStreamKind::Stdin);
        p.stdin_buffer.clear();
        p.stdin_offset = 0;
    }
}

/// Read readiness (or error/hangup) on stdout or stderr: drain into the
/// matching accumulator; EOF or a fatal error closes that pipe.
pub fn pump_output(
    poll: &Poll,
    p: &mut CgiProcess,
    cgi_fd_to_pid: &mut HashMap<Token, u32>,
    token: Token,
) {
    let kind = if token == p.stdout_token {
        CgiStreamKind::Stdout
    } else {
        CgiStreamKind::Stderr
    };

    let mut buf = [0u8; READ_BUF_SIZE];
    let mut close = false;
    {
        let (stream, data) = match kind {
            CgiStreamKind::Stdout => (p.stdout.as_mut(), &mut p.stdout_data),
            CgiStreamKind::Stderr => (p.stderr.as_mut(), &mut p.stderr_data),
            CgiStreamKind::Stdin => return,
        };
        let Some(stream) = stream else { return };
        loop {
            match stream.read(&mut buf) {
                Ok(0) => {
                    close = true;
                    break;
                }
                Ok(n) => data.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(_) => {
                    close = true;
                    break;
                }
            }
        }
    }
    if close {
        close_cgi_stream(poll, p, cgi_fd_to_pid, kind);
    }
}

/// Removal from the registry and the reverse map precedes the close (the
/// drop) so a recycled fd number cannot resurrect the old entry.
fn close_cgi_stream(
    poll: &Poll,
    p: &mut CgiProcess,
    cgi_fd_to_pid: &mut HashMap<Token, u32>,
    kind: CgiStreamKind,
) {
    let (slot, token) = match kind {
        CgiStreamKind::Stdin => (&mut p.stdin, p.stdin_token),
        CgiStreamKind::Stdout => (&mut p.stdout, p.stdout_token),
        CgiStreamKind::Stderr => (&mut p.stderr, p.stderr_token),
    };
    if let Some(mut stream) = slot.take() {
        let _ = poll.registry().deregister(&mut stream);
        cgi_fd_to_pid.remove(&token);
    }
}

/// Closes whatever is still open, removes the record, and harvests the
/// child's exit status if it is already dead. Returns the record so kill
/// paths can block-wait on the child.
pub fn cleanup(
    poll: &Poll,
    cgi: &mut HashMap<u32, CgiProcess>,
    cgi_fd_to_pid: &mut HashMap<Token, u32>,
    pid: u32,
) -> Option<CgiProcess> {
    let mut p = cgi.remove(&pid)?;
    close_cgi_stream(poll, &mut p, cgi_fd_to_pid, CgiStreamKind::Stdin);
    close_cgi_stream(poll, &mut p, cgi_fd_to_pid, CgiStreamKind::Stdout);
    close_cgi_stream(poll, &mut p, cgi_fd_to_pid, CgiStreamKind::Stderr);
    let _ = p.child.try_wait();
    Some(p)
}

/// Runs once `exited` and all three closed flags first hold together: turn
/// the accumulated stdout into an HTTP response, wake the owning client for
/// writing, and destroy the record.
pub fn finalize_if_done(
    poll: &Poll,
    connections: &mut HashMap<Token, Connection>,
    config: &Config,
    cgi: &mut HashMap<u32, CgiProcess>,
    cgi_fd_to_pid: &mut HashMap<Token, u32>,
    pid: u32,
) {
    if !cgi.get(&pid).is_some_and(|p| p.done()) {
        return;
    }
    let Some(p) = cleanup(poll, cgi, cgi_fd_to_pid, pid) else {
        return;
    };

    if !p.stderr_data.is_empty() {
        warn!(
            "cgi pid {} stderr: {}",
            pid,
            String::from_utf8_lossy(&p.stderr_data).trim_end()
        );
    }

    let Some(conn) = connections.get_mut(&p.client_token) else {
        return;
    };

    let idx = conn
        .server_index
        .min(config.servers.len().saturating_sub(1));
    let res = build_cgi_response(&p, &config.servers[idx]);

    conn.install_response(&res);
    // the client was deregistered while CGI_PENDING, so this is a fresh add
    if let Err(e) = poll
        .registry()
        .register(&mut conn.stream, conn.token, Interest::WRITABLE)
    {
        error!(
            "cannot re-register client token {} after cgi: {}",
            conn.token.0, e
        );
    }
}

fn build_cgi_response(p: &CgiProcess, cfg: &ServerConfig) -> HttpResponse {
    let mut res = if p.timed_out || p.stdout_data.is_empty() {
        error_response(cfg, HTTP_BAD_GATEWAY)
    } else {
        match parse_cgi_output(&p.stdout_data) {
            Some((status, reason, headers, body)) => {
                let mut res = HttpResponse::new(status);
                res.reason = reason;
                for (k, v) in headers {
                    res.set_header(&k, &v);
                }
                if !res.has_header("Content-Length") {
                    res.set_header("Content-Length", &body.len().to_string());
                }
                if !res.has_header("Content-Type") {
                    res.set_header("Content-Type", "text/plain");
                }
                res.body = body;
                res
            }
            None => error_response(cfg, HTTP_BAD_GATEWAY),
        }
    };

    res.version = p.version.clone();
    res.force_header("Connection", "close");
    if p.method == Method::HEAD {
        res.body.clear();
    }
    res
}

/// Splits CGI stdout at the first `\r\n\r\n` or `\n\n`. A `Status:` line
/// overrides the default 200 OK; every other header is forwarded verbatim.
pub fn parse_cgi_output(raw: &[u8]) -> Option<(u16, String, Vec<(String, String)>, Vec<u8>)> {
    let crlf = find_subsequence(raw, b"\r\n\r\n", 0);
    let lf = find_subsequence(raw, b"\n\n", 0);
    let (sep, sep_len) = match (crlf, lf) {
        (Some(a), Some(b)) => {
            if a < b {
                (a, 4)
            } else {
                (b, 2)
            }
        }
        (Some(a), None) => (a, 4),
        (None, Some(b)) => (b, 2),
        (None, None) => return None,
    };

    let head = String::from_utf8_lossy(&raw[..sep]).into_owned();
    let body = raw[sep + sep_len..].to_vec();

    let mut status: u16 = HTTP_OK;
    let mut reason = "OK".to_string();
    let mut headers = Vec::new();

    for line in head.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key.eq_ignore_ascii_case("status") {
            let mut parts = value.splitn(2, ' ');
            if let Some(code) = parts.next().and_then(|c| c.parse::<u16>().ok()) {
                status = code;
                reason = match parts.next().map(str::trim) {
                    Some(r) if !r.is_empty() => r.to_string(),
                    _ => HttpResponse::status_text(code).to_string(),
                };
            }
        } else {
            headers.push((key.to_string(), value.to_string()));
        }
    }

    Some((status, reason, headers, body))
}

use crate::http::request::{header_value, parse_content_length};
use crate::http::response::error_response;
use crate::prelude::*;
use crate::{cgi, http, router, signal, timeouts};

pub struct Listener {
    pub socket: TcpListener,
    pub port: u16,
    pub default_server: usize,
}

/// The single-threaded engine: listeners, the connection table, the CGI
/// table with its reverse fd map, and the token allocator. Tokens are
/// monotonic and never reused; the low range belongs to the listeners.
pub struct Server {
    pub config: Config,
    pub listeners: Vec<Listener>,
    pub connections: HashMap<Token, Connection>,
    pub cgi: HashMap<u32, CgiProcess>,
    pub cgi_fd_to_pid: HashMap<Token, u32>,
    pub host_map: HostMap,
    pub next_token: usize,
    pub max_clients: usize,
    pub reserve_fd: Option<File>,
    pub idle_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub cgi_timeout: Duration,
}

impl Server {
    pub fn new(config: Config, poll: &Poll) -> Result<Server> {
        let mut listeners: Vec<Listener> = Vec::new();
        for (i, srv) in config.servers.iter().enumerate() {
            if listeners.iter().any(|l| l.port == srv.listen_port) {
                continue;
            }
            let addr: SocketAddr = format!("0.0.0.0:{}", srv.listen_port).parse()?;
            let mut socket = TcpListener::bind(addr)?;
            let token = Token(listeners.len());
            poll.registry()
                .register(&mut socket, token, Interest::READABLE)?;
            info!("listening on 0.0.0.0:{}", srv.listen_port);
            listeners.push(Listener {
                socket,
                port: srv.listen_port,
                default_server: i,
            });
        }

        let host_map = HostMap::build(&config.servers);
        let max_clients = compute_max_clients(listeners.len());
        let next_token = listeners.len();

        Ok(Server {
            config,
            listeners,
            connections: HashMap::new(),
            cgi: HashMap::new(),
            cgi_fd_to_pid: HashMap::new(),
            host_map,
            next_token,
            max_clients,
            reserve_fd: File::open("/dev/null").ok(),
            idle_timeout: IDLE_TIMEOUT,
            read_timeout: READ_TIMEOUT,
            write_timeout: WRITE_TIMEOUT,
            cgi_timeout: CGI_TIMEOUT,
        })
    }

    pub fn run(&mut self, mut poll: Poll) -> Result<()> {
        let mut events = Events::with_capacity(1024);
        info!("event loop started ({} max clients)", self.max_clients);

        while !signal::stop_requested() {
            if let Err(e) = poll.poll(&mut events, Some(Duration::from_millis(POLL_TIMEOUT_MS))) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                self.shutdown(&poll);
                return Err(e.into());
            }

            for event in events.iter() {
                let token = event.token();
                if token.0 < self.listeners.len() {
                    self.accept_connections(&poll, token.0);
                    continue;
                }
                if self.cgi_fd_to_pid.contains_key(&token) {
                    self.handle_cgi_event(&poll, token);
                    continue;
                }
                if !self.connections.contains_key(&token) {
                    continue;
                }
                if event.is_error() {
                    self.close_client(&poll, token);
                    continue;
                }
                if event.is_readable() || event.is_read_closed() {
                    self.handle_client_read(&poll, token);
                }
                // the read handler may have closed this client
                if event.is_writable() && self.connections.contains_key(&token) {
                    self.handle_client_write(&poll, token);
                }
            }

            timeouts::process(self, &poll);
            self.reap_children(&poll);
        }

        self.shutdown(&poll);
        Ok(())
    }

    fn accept_connections(&mut self, poll: &Poll, listener_index: usize) {
        let port = self.listeners[listener_index].port;
        let default_server = self.listeners[listener_index].default_server;

        loop {
            match self.listeners[listener_index].socket.accept() {
                Ok((mut stream, addr)) => {
                    if self.connections.len() >= self.max_clients {
                        warn!("client cap {} reached, refusing {}", self.max_clients, addr);
                        continue;
                    }
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    if let Err(e) =
                        poll.registry()
                            .register(&mut stream, token, Interest::READABLE)
                    {
                        error!("register failed for {}: {}", addr, e);
                        continue;
                    }
                    let mut conn = Connection::new(stream, token, port, default_server);
                    conn.state = ConnectionState::Reading;
                    self.connections.insert(token, conn);
                    trace!("accepted {} as token {}", addr, token.0);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if is_fd_exhaustion(&e) => {
                    error!("out of file descriptors accepting on port {}", port);
                    // Free the scratch fd, accept the pending connection just
                    // to close it, then take the scratch fd back.
                    self.reserve_fd = None;
                    if let Ok((stream, _)) = self.listeners[listener_index].socket.accept() {
                        drop(stream);
                    }
                    self.reserve_fd = File::open("/dev/null").ok();
                    break;
                }
                Err(e) => {
                    error!("accept failed on port {}: {}", port, e);
                    break;
                }
            }
        }
    }

    fn handle_client_read(&mut self, poll: &Poll, token: Token) {
        let read_failed = match self.connections.get_mut(&token) {
            Some(conn) => conn.read_into_buffer().is_err(),
            None => return,
        };
        if read_failed {
            self.close_client(poll, token);
            return;
        }
        self.process_in_buffer(poll, token);
    }

    fn process_in_buffer(&mut self, poll: &Poll, token: Token) {
        let close_now = {
            let Self {
                connections,
                config,
                host_map,
                cgi,
                cgi_fd_to_pid,
                next_token,
                ..
            } = self;
            let Some(conn) = connections.get_mut(&token) else {
                return;
            };
            process_buffered(poll, conn, config, host_map, cgi, cgi_fd_to_pid, next_token)
        };
        if close_now {
            self.close_client(poll, token);
        }
    }

    fn handle_client_write(&mut self, poll: &Poll, token: Token) {
        let mut close_now = false;
        {
            let Some(conn) = self.connections.get_mut(&token) else {
                return;
            };
            if conn.write_from_buffer().is_err() {
                close_now = true;
            } else if conn.state == ConnectionState::Writing && conn.drained() {
                if conn.close_after_write || conn.peer_closed {
                    close_now = true;
                } else {
                    conn.out_buffer.clear();
                    conn.out_offset = 0;
                    conn.state = ConnectionState::Reading;
                    let _ = poll
                        .registry()
                        .reregister(&mut conn.stream, token, Interest::READABLE);
                }
            }
        }
        if close_now {
            self.close_client(poll, token);
        }
    }

    /// Closing a client first kills and reaps any CGI it owns, so no child
    /// is left blocked on a dead peer.
    pub fn close_client(&mut self, poll: &Poll, token: Token) {
        let pids: Vec<u32> = self
            .cgi
            .iter()
            .filter(|(_, p)| p.client_token == token)
            .map(|(pid, _)| *pid)
            .collect();
        for pid in pids {
            if let Some(p) = self.cgi.get_mut(&pid) {
                let _ = p.child.kill();
            }
            if let Some(mut rec) = cgi::cleanup(poll, &mut self.cgi, &mut self.cgi_fd_to_pid, pid)
            {
                let _ = rec.child.wait();
            }
        }

        if let Some(mut conn) = self.connections.remove(&token) {
            conn.state = ConnectionState::Closing;
            let _ = poll.registry().deregister(&mut conn.stream);
            trace!("closed client token {}", token.0);
        }
    }

    fn handle_cgi_event(&mut self, poll: &Poll, token: Token) {
        let Some(&pid) = self.cgi_fd_to_pid.get(&token) else {
            return;
        };
        match self.cgi.get_mut(&pid) {
            Some(p) => {
                if token == p.stdin_token {
                    cgi::pump_stdin(poll, p, &mut self.cgi_fd_to_pid);
                } else {
                    cgi::pump_output(poll, p, &mut self.cgi_fd_to_pid, token);
                }
            }
            None => {
                self.cgi_fd_to_pid.remove(&token);
                return;
            }
        }
        cgi::finalize_if_done(
            poll,
            &mut self.connections,
            &self.config,
            &mut self.cgi,
            &mut self.cgi_fd_to_pid,
            pid,
        );
    }

    /// WNOHANG-style reap pass, run on every loop tick.
    pub fn reap_children(&mut self, poll: &Poll) {
        let pids: Vec<u32> = self.cgi.keys().copied().collect();
        for pid in pids {
            let newly_exited = match self.cgi.get_mut(&pid) {
                Some(p) if !p.exited => match p.child.try_wait() {
                    Ok(Some(status)) => {
                        p.exited = true;
                        if !status.success() {
                            trace!("cgi pid {} exited with {}", pid, status);
                        }
                        true
                    }
                    Ok(None) => false,
                    Err(_) => {
                        p.exited = true;
                        true
                    }
                },
                _ => false,
            };
            if newly_exited {
                cgi::finalize_if_done(
                    poll,
                    &mut self.connections,
                    &self.config,
                    &mut self.cgi,
                    &mut self.cgi_fd_to_pid,
                    pid,
                );
            }
        }
    }

    fn shutdown(&mut self, poll: &Poll) {
        info!("shutting down");
        self.reserve_fd = None;

        let pids: Vec<u32> = self.cgi.keys().copied().collect();
        for pid in pids {
            if let Some(p) = self.cgi.get_mut(&pid) {
                let _ = p.child.kill();
            }
            if let Some(mut rec) = cgi::cleanup(poll, &mut self.cgi, &mut self.cgi_fd_to_pid, pid)
            {
                let _ = rec.child.wait();
            }
        }

        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            self.close_client(poll, token);
        }

        for listener in self.listeners.iter_mut() {
            let _ = poll.registry().deregister(&mut listener.socket);
        }
        self.listeners.clear();
        self.cgi_fd_to_pid.clear();
        info!("shutdown complete");
    }
}

/// Runs the engine-side request checks and, once a full request is parsed,
/// routes it. Returns true when the caller must close the client.
fn process_buffered(
    poll: &Poll,
    conn: &mut Connection,
    config: &Config,
    host_map: &HostMap,
    cgi: &mut HashMap<u32, CgiProcess>,
    cgi_fd_to_pid: &mut HashMap<Token, u32>,
    next_token: &mut usize,
) -> bool {
    if conn.state == ConnectionState::Writing || conn.state == ConnectionState::CgiPending {
        // one response at a time; anything extra stays buffered
        return false;
    }

    if conn.in_buffer.is_empty() {
        return conn.peer_closed && conn.out_buffer.is_empty();
    }

    let Some(headers_end) = find_subsequence(&conn.in_buffer, b"\r\n\r\n", 0) else {
        if conn.in_buffer.len() > MAX_HEADER_BYTES {
            fail_close(
                poll,
                conn,
                server_for(config, conn.server_index),
                HTTP_HEADERS_TOO_LARGE,
            );
            return false;
        }
        // headers still incomplete; a peer that already shut down its write
        // side can never finish the request
        return conn.peer_closed;
    };

    let header_bytes = headers_end + 4;
    if header_bytes > MAX_HEADER_BYTES {
        fail_close(
            poll,
            conn,
            server_for(config, conn.server_index),
            HTTP_HEADERS_TOO_LARGE,
        );
        return false;
    }

    if let Some(host) = header_value(&conn.in_buffer[..headers_end], "host") {
        conn.server_index = host_map.select(conn.listen_port, &host, conn.server_index);
    }
    let cfg = server_for(config, conn.server_index);
    let max_body = cfg.client_max_body_size;

    if let Some(v) = header_value(&conn.in_buffer[..headers_end], "content-length") {
        match parse_content_length(&v) {
            None => {
                fail_close(poll, conn, cfg, HTTP_BAD_REQUEST);
                return false;
            }
            Some(cl) if cl > max_body => {
                fail_close(poll, conn, cfg, HTTP_PAYLOAD_TOO_LARGE);
                return false;
            }
            Some(_) => {}
        }
    }

    let is_chunked = header_value(&conn.in_buffer[..headers_end], "transfer-encoding")
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("chunked"));
    if !is_chunked && conn.in_buffer.len() - header_bytes > max_body {
        fail_close(poll, conn, cfg, HTTP_PAYLOAD_TOO_LARGE);
        return false;
    }

    match http::request::parse(&conn.in_buffer, max_body) {
        Err(status) => {
            fail_close(poll, conn, cfg, status);
            false
        }
        Ok(ParseOutcome::NeedMore) => conn.peer_closed,
        Ok(ParseOutcome::Complete { request, consumed }) => {
            conn.in_buffer.drain(..consumed);
            conn.state = ConnectionState::Parsed;
            conn.touch();

            match router::route(&request, cfg) {
                RouteResult::Response(res) => {
                    conn.install_response(&res);
                    let _ = poll
                        .registry()
                        .reregister(&mut conn.stream, conn.token, Interest::WRITABLE);
                }
                RouteResult::Cgi {
                    interpreter,
                    script_path,
                } => {
                    match cgi::spawn(
                        poll,
                        next_token,
                        cgi,
                        cgi_fd_to_pid,
                        conn.token,
                        &request,
                        &interpreter,
                        &script_path,
                    ) {
                        Ok(()) => {
                            let _ = poll.registry().deregister(&mut conn.stream);
                            conn.state = ConnectionState::CgiPending;
                            conn.in_buffer.clear();
                            conn.touch();
                        }
                        Err(e) => {
                            error!("cgi spawn failed for {}: {}", script_path.display(), e);
                            fail_close(poll, conn, cfg, HTTP_BAD_GATEWAY);
                        }
                    }
                }
            }
            false
        }
    }
}

/// Synthesized engine errors (400/413/431/502) always close the connection.
fn fail_close(poll: &Poll, conn: &mut Connection, cfg: &ServerConfig, status: u16) {
    let mut res = error_response(cfg, status);
    if status == HTTP_METHOD_NOT_ALLOWED {
        res.set_header("Allow", "GET, HEAD, POST, DELETE");
    }
    res.force_header("Connection", "close");
    conn.in_buffer.clear();
    conn.install_response(&res);
    let _ = poll
        .registry()
        .reregister(&mut conn.stream, conn.token, Interest::WRITABLE);
}

fn server_for<'a>(config: &'a Config, index: usize) -> &'a ServerConfig {
    config.servers.get(index).unwrap_or(&config.servers[0])
}

fn is_fd_exhaustion(e: &std::io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::EMFILE) | Some(libc::ENFILE)
    )
}

fn compute_max_clients(listener_count: usize) -> usize {
    let mut lim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    let soft = if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut lim) } == 0 {
        lim.rlim_cur as usize
    } else {
        1024
    };
    soft.saturating_sub(FD_SAFETY_MARGIN + listener_count)
        .max(1)
}

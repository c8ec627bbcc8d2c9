use std::fmt;

use crate::lexer::{Tok, TokKind};
use crate::types::{LocationConfig, ServerConfig};

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub line: usize,
}

impl ConfigError {
    fn at(line: usize, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line > 0 {
            write!(f, "line {}: {}", self.line, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

pub type ParseResult<T> = Result<T, ConfigError>;

pub struct Parser {
    tokens: Vec<Tok>,
    cursor: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Tok>) -> Self {
        Self { tokens, cursor: 0 }
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.cursor)
    }

    fn next_tok(&mut self) -> Option<Tok> {
        let t = self.tokens.get(self.cursor).cloned();
        if t.is_some() {
            self.cursor += 1;
        }
        t
    }

    fn last_line(&self) -> usize {
        self.tokens.last().map(|t| t.line).unwrap_or(0)
    }

    pub fn parse(mut self) -> ParseResult<Vec<ServerConfig>> {
        let mut servers = Vec::new();

        while let Some(tok) = self.next_tok() {
            match &tok.kind {
                TokKind::Word(w) if w == "server" => {
                    servers.push(self.parse_server()?);
                }
                _ => {
                    return Err(ConfigError::at(
                        tok.line,
                        format!("unexpected token '{}'", tok.text()),
                    ));
                }
            }
        }

        Ok(servers)
    }

    fn expect_lbrace(&mut self, what: &str) -> ParseResult<()> {
        match self.next_tok() {
            Some(t) if t.kind == TokKind::LBrace => Ok(()),
            Some(t) => Err(ConfigError::at(
                t.line,
                format!("expected '{{' after {}, found '{}'", what, t.text()),
            )),
            None => Err(ConfigError::at(
                self.last_line(),
                format!("unexpected end of file after {}", what),
            )),
        }
    }

    fn parse_server(&mut self) -> ParseResult<ServerConfig> {
        self.expect_lbrace("server")?;

        let mut srv = ServerConfig::default();

        loop {
            match self.peek() {
                None => {
                    return Err(ConfigError::at(
                        self.last_line(),
                        "unexpected end of file in server block",
                    ));
                }
                Some(t) if t.kind == TokKind::RBrace => {
                    self.cursor += 1;
                    return Ok(srv);
                }
                Some(t) if matches!(&t.kind, TokKind::Word(w) if w == "location") => {
                    self.parse_location(&mut srv)?;
                }
                Some(_) => {
                    self.parse_directive(&mut srv, None)?;
                }
            }
        }
    }

    fn parse_location(&mut self, srv: &mut ServerConfig) -> ParseResult<()> {
        // consume 'location'
        let kw = self.next_tok().unwrap();

        let (prefix, prefix_line) = match self.next_tok() {
            Some(t) => match t.kind {
                TokKind::Word(w) => (w, t.line),
                _ => {
                    return Err(ConfigError::at(
                        t.line,
                        format!("expected location prefix, found '{}'", t.text()),
                    ));
                }
            },
            None => {
                return Err(ConfigError::at(kw.line, "unexpected end of file after location"));
            }
        };

        let prefix = validate_prefix(&prefix, prefix_line)?;

        self.expect_lbrace(&format!("location {}", prefix))?;

        let mut loc = take_or_create_location(srv, &prefix);

        loop {
            match self.peek() {
                None => {
                    return Err(ConfigError::at(
                        self.last_line(),
                        format!("unexpected end of file in location {}", prefix),
                    ));
                }
                Some(t) if t.kind == TokKind::RBrace => {
                    self.cursor += 1;
                    srv.locations.push(loc);
                    return Ok(());
                }
                Some(_) => {
                    self.parse_directive(srv, Some(&mut loc))?;
                }
            }
        }
    }

    fn parse_directive(
        &mut self,
        srv: &mut ServerConfig,
        loc: Option<&mut LocationConfig>,
    ) -> ParseResult<()> {
        let key_tok = self.next_tok().unwrap();
        let key = match key_tok.kind {
            TokKind::Word(w) => w,
            _ => {
                return Err(ConfigError::at(
                    key_tok.line,
                    format!("expected directive name, found '{}'", key_tok.text()),
                ));
            }
        };

        let mut args = Vec::new();
        loop {
            match self.peek() {
                Some(t) if matches!(t.kind, TokKind::Word(_)) => {
                    args.push(self.next_tok().unwrap().text());
                }
                _ => break,
            }
        }

        match self.next_tok() {
            Some(t) if t.kind == TokKind::Semicolon => {}
            Some(t) => {
                return Err(ConfigError::at(
                    t.line,
                    format!("expected ';' after directive {}", key),
                ));
            }
            None => {
                return Err(ConfigError::at(
                    key_tok.line,
                    format!("unexpected end of file after directive {}", key),
                ));
            }
        }

        let applied = match loc {
            Some(loc) => apply_location_directive(loc, &key, &args),
            None => apply_server_directive(srv, &key, &args),
        };

        applied.map_err(|msg| ConfigError::at(key_tok.line, msg))
    }
}

fn validate_prefix(prefix: &str, line: usize) -> ParseResult<String> {
    if !prefix.starts_with('/') {
        return Err(ConfigError::at(
            line,
            format!("invalid location prefix '{}'", prefix),
        ));
    }
    let mut p = prefix.to_string();
    while p.len() > 1 && p.ends_with('/') {
        p.pop();
    }
    Ok(p)
}

/// Re-opening an already-declared prefix edits the existing block rather
/// than shadowing it.
fn take_or_create_location(srv: &mut ServerConfig, prefix: &str) -> LocationConfig {
    if let Some(pos) = srv.locations.iter().position(|l| l.prefix == prefix) {
        return srv.locations.remove(pos);
    }
    LocationConfig {
        prefix: prefix.to_string(),
        ..LocationConfig::default()
    }
}

fn parse_positive(arg: &str) -> Result<u64, String> {
    if arg.is_empty() || !arg.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("expected a positive integer, got '{}'", arg));
    }
    let n: u64 = arg
        .parse()
        .map_err(|_| format!("integer out of range: '{}'", arg))?;
    if n == 0 {
        return Err("expected a positive integer, got 0".to_string());
    }
    Ok(n)
}

/// Accepts `PORT` or `host:PORT`; the port must be in 1..=65535.
fn parse_port(arg: &str) -> Result<u16, String> {
    let port_part = match arg.rfind(':') {
        Some(pos) => &arg[pos + 1..],
        None => arg,
    };
    if port_part.is_empty() || !port_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("invalid listen port '{}'", arg));
    }
    match port_part.parse::<u32>() {
        Ok(n) if (1..=65535).contains(&n) => Ok(n as u16),
        _ => Err(format!("listen port out of range '{}'", arg)),
    }
}

fn expect_arity(key: &str, args: &[String], n: usize) -> Result<(), String> {
    if args.len() != n {
        return Err(format!(
            "directive '{}' expects {} argument(s), got {}",
            key,
            n,
            args.len()
        ));
    }
    Ok(())
}

fn apply_server_directive(
    srv: &mut ServerConfig,
    key: &str,
    args: &[String],
) -> Result<(), String> {
    match key {
        "listen" => {
            expect_arity(key, args, 1)?;
            srv.listen_port = parse_port(&args[0])?;
            Ok(())
        }
        "server_name" => {
            if args.is_empty() {
                return Err("directive 'server_name' expects at least one name".to_string());
            }
            srv.server_names.extend(args.iter().cloned());
            Ok(())
        }
        "root" => {
            expect_arity(key, args, 1)?;
            srv.root = args[0].clone();
            Ok(())
        }
        "index" => {
            expect_arity(key, args, 1)?;
            srv.index = args[0].clone();
            Ok(())
        }
        "upload_dir" => {
            expect_arity(key, args, 1)?;
            srv.upload_dir = args[0].clone();
            Ok(())
        }
        "client_max_body_size" => {
            expect_arity(key, args, 1)?;
            srv.client_max_body_size = parse_positive(&args[0])? as usize;
            Ok(())
        }
        "error_page" => {
            if args.len() < 2 {
                return Err("directive 'error_page' expects CODE... PATH".to_string());
            }
            let path = args[args.len() - 1].clone();
            for code in &args[..args.len() - 1] {
                let n: u16 = code
                    .parse()
                    .map_err(|_| format!("invalid error_page code '{}'", code))?;
                srv.error_pages.insert(n, path.clone());
            }
            Ok(())
        }
        "cgi" => {
            expect_arity(key, args, 2)?;
            let ext = args[0].trim_start_matches('.');
            if ext.is_empty() {
                return Err(format!("invalid cgi extension '{}'", args[0]));
            }
            srv.cgi.insert(ext.to_string(), args[1].clone());
            Ok(())
        }
        "session" => {
            expect_arity(key, args, 1)?;
            match args[0].as_str() {
                "on" => srv.session_enabled = true,
                "off" => srv.session_enabled = false,
                other => return Err(format!("session expects on|off, got '{}'", other)),
            }
            Ok(())
        }
        "session_timeout" => {
            expect_arity(key, args, 1)?;
            srv.session_timeout = parse_positive(&args[0])?;
            Ok(())
        }
        "session_store_path" => {
            expect_arity(key, args, 1)?;
            srv.session_store_path = args[0].clone();
            Ok(())
        }
        other => Err(format!("unknown directive '{}'", other)),
    }
}

fn apply_location_directive(
    loc: &mut LocationConfig,
    key: &str,
    args: &[String],
) -> Result<(), String> {
    match key {
        "root" => {
            expect_arity(key, args, 1)?;
            loc.root = args[0].clone();
            Ok(())
        }
        "index" => {
            expect_arity(key, args, 1)?;
            loc.index = args[0].clone();
            Ok(())
        }
        "autoindex" => {
            expect_arity(key, args, 1)?;
            match args[0].as_str() {
                "on" => loc.autoindex = true,
                "off" => loc.autoindex = false,
                other => return Err(format!("autoindex expects on|off, got '{}'", other)),
            }
            Ok(())
        }
        "allowed_methods" => {
            if args.is_empty() {
                return Err("directive 'allowed_methods' expects at least one method".to_string());
            }
            loc.allow_get = false;
            loc.allow_head = false;
            loc.allow_post = false;
            loc.allow_delete = false;
            for m in args {
                match m.as_str() {
                    "ALL" => {
                        loc.allow_get = true;
                        loc.allow_head = true;
                        loc.allow_post = true;
                        loc.allow_delete = true;
                    }
                    "GET" => loc.allow_get = true,
                    "HEAD" => loc.allow_head = true,
                    "POST" => loc.allow_post = true,
                    "DELETE" => loc.allow_delete = true,
                    other => return Err(format!("unknown method '{}'", other)),
                }
            }
            Ok(())
        }
        "return" | "redirect" => {
            match args {
                [code, url] => {
                    let n: u16 = code
                        .parse()
                        .map_err(|_| format!("invalid return code '{}'", code))?;
                    loc.return_code = Some(n);
                    loc.return_url = Some(url.clone());
                    Ok(())
                }
                [url] => {
                    loc.return_code = Some(302);
                    loc.return_url = Some(url.clone());
                    Ok(())
                }
                _ => Err("directive 'return' expects [CODE] URL".to_string()),
            }
        }
        other => Err(format!("unknown directive '{}' in location", other)),
    }
}

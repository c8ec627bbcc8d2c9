use crate::handlers::{handle_delete, handle_get, handle_post};
use crate::http::response::{connection_value, error_response};
use crate::prelude::*;

/// Outcome of routing one parsed request: either a finished response, or an
/// order to hand the request to the CGI coordinator.
#[derive(Debug)]
pub enum RouteResult {
    Response(HttpResponse),
    Cgi {
        interpreter: String,
        script_path: PathBuf,
    },
}

pub fn route(req: &HttpRequest, cfg: &ServerConfig) -> RouteResult {
    let Some(loc) = match_location(cfg, &req.path) else {
        // normalization always installs a "/" location
        return finish(req, error_response(cfg, HTTP_INTERNAL_SERVER_ERROR));
    };

    let allowed = match req.method {
        Method::GET => loc.allow_get,
        Method::HEAD => loc.allow_head,
        Method::POST => loc.allow_post,
        Method::DELETE => loc.allow_delete,
    };
    if !allowed {
        let mut res = error_response(cfg, HTTP_METHOD_NOT_ALLOWED);
        res.set_header("Allow", &loc.allowed_methods().join(", "));
        return finish(req, res);
    }

    if let Some(url) = &loc.return_url {
        let code = loc.return_code.unwrap_or(HTTP_FOUND);
        return finish(req, HttpResponse::redirect(code, url));
    }

    let fs_path = resolve_fs_path(&req.path, loc, cfg);

    if let Some(ext) = fs_path.extension().and_then(|e| e.to_str()) {
        if let Some(interpreter) = cfg.cgi.get(ext) {
            if fs_path.is_file() {
                return RouteResult::Cgi {
                    interpreter: interpreter.clone(),
                    script_path: fs_path,
                };
            }
        }
    }

    let res = match req.method {
        Method::POST => handle_post(req, cfg),
        Method::DELETE => handle_delete(cfg, &fs_path),
        Method::GET | Method::HEAD => handle_get(req, loc, cfg, &fs_path),
    };
    finish(req, res)
}

fn finish(req: &HttpRequest, mut res: HttpResponse) -> RouteResult {
    res.version = req.version.clone();
    let value = connection_value(&req.version, req.headers.get("connection").map(String::as_str));
    res.force_header("Connection", value);
    RouteResult::Response(res)
}

/// Longest-prefix location match on segment boundaries: `/img` matches
/// `/img` and `/img/x` but not `/images`. Locations are pre-sorted longest
/// first, so the first hit wins.
pub fn match_location<'a>(cfg: &'a ServerConfig, path: &str) -> Option<&'a LocationConfig> {
    for loc in &cfg.locations {
        let pre = loc.prefix.as_str();
        if pre == "/" {
            return Some(loc);
        }
        if path.starts_with(pre)
            && (path.len() == pre.len() || path.as_bytes()[pre.len()] == b'/')
        {
            return Some(loc);
        }
    }
    None
}

/// Maps a request path to the filesystem. A location root replaces the
/// server root and drops the prefix; without one, the prefix folder is kept
/// under the server root.
pub fn resolve_fs_path(req_path: &str, loc: &LocationConfig, cfg: &ServerConfig) -> PathBuf {
    let base_root = if loc.root.is_empty() {
        cfg.root.as_str()
    } else {
        loc.root.as_str()
    };

    let rel = if loc.prefix == "/" {
        req_path.trim_start_matches('/').to_string()
    } else {
        let stripped = req_path[loc.prefix.len()..].trim_start_matches('/');
        if loc.root.is_empty() {
            let folder = &loc.prefix[1..];
            if stripped.is_empty() {
                folder.to_string()
            } else {
                format!("{}/{}", folder, stripped)
            }
        } else {
            stripped.to_string()
        }
    };

    join_path(base_root, &rel)
}

pub fn join_path(a: &str, b: &str) -> PathBuf {
    if b.is_empty() {
        return PathBuf::from(a);
    }
    if a.is_empty() {
        return PathBuf::from(b);
    }
    PathBuf::from(format!("{}/{}", a.trim_end_matches('/'), b))
}

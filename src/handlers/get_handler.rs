use crate::http::response::{error_response, generate_autoindex, mime_type};
use crate::prelude::*;

pub fn handle_get(
    req: &HttpRequest,
    loc: &LocationConfig,
    cfg: &ServerConfig,
    fs_path: &Path,
) -> HttpResponse {
    if fs_path.is_dir() {
        if !req.had_trailing_slash {
            return HttpResponse::redirect(HTTP_MOVED_PERMANENTLY, &format!("{}/", req.path));
        }

        let index_path = fs_path.join(&loc.index);
        if index_path.is_file() {
            return serve_file(req, cfg, &index_path);
        }

        if loc.autoindex {
            return match generate_autoindex(&req.path, fs_path) {
                Ok(html) => {
                    let mut res = HttpResponse::new(HTTP_OK);
                    res.set_body(html.into_bytes(), "text/html");
                    if req.method == Method::HEAD {
                        res.body.clear();
                    }
                    res
                }
                Err(_) => error_response(cfg, HTTP_INTERNAL_SERVER_ERROR),
            };
        }

        return error_response(cfg, HTTP_NOT_FOUND);
    }

    serve_file(req, cfg, fs_path)
}

/// HEAD keeps the Content-Length of the entity but sends no body.
fn serve_file(req: &HttpRequest, cfg: &ServerConfig, path: &Path) -> HttpResponse {
    match fs::read(path) {
        Ok(body) => {
            let mut res = HttpResponse::new(HTTP_OK);
            let mime = mime_type(path.extension().and_then(|e| e.to_str()));
            res.set_body(body, mime);
            if req.method == Method::HEAD {
                res.body.clear();
            }
            res
        }
        Err(e) => match e.kind() {
            ErrorKind::NotFound => error_response(cfg, HTTP_NOT_FOUND),
            ErrorKind::PermissionDenied => error_response(cfg, HTTP_FORBIDDEN),
            _ => error_response(cfg, HTTP_INTERNAL_SERVER_ERROR),
        },
    }
}

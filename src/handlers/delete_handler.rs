use crate::http::response::error_response;
use crate::prelude::*;

pub fn handle_delete(cfg: &ServerConfig, fs_path: &Path) -> HttpResponse {
    if fs_path.is_dir() {
        return error_response(cfg, HTTP_FORBIDDEN);
    }

    match fs::remove_file(fs_path) {
        Ok(()) => {
            let mut res = HttpResponse::new(HTTP_NO_CONTENT);
            res.set_header("Content-Length", "0");
            res
        }
        Err(e) => match e.kind() {
            ErrorKind::NotFound => error_response(cfg, HTTP_NOT_FOUND),
            ErrorKind::PermissionDenied => error_response(cfg, HTTP_FORBIDDEN),
            _ => error_response(cfg, HTTP_INTERNAL_SERVER_ERROR),
        },
    }
}

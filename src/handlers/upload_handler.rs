use std::sync::atomic::{AtomicU64, Ordering};
use std::time::UNIX_EPOCH;

use crate::http::response::error_response;
use crate::prelude::*;

static UPLOAD_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Stores the request body under `upload_dir` as
/// `upload_<unix-seconds>_<pid>_<counter>.bin` and answers 201 with the
/// generated filename.
pub fn handle_post(req: &HttpRequest, cfg: &ServerConfig) -> HttpResponse {
    if fs::create_dir_all(&cfg.upload_dir).is_err() {
        return error_response(cfg, HTTP_INTERNAL_SERVER_ERROR);
    }

    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let name = format!(
        "upload_{}_{}_{}.bin",
        secs,
        std::process::id(),
        UPLOAD_COUNTER.fetch_add(1, Ordering::Relaxed)
    );

    let path = Path::new(&cfg.upload_dir).join(&name);
    match fs::write(&path, &req.body) {
        Ok(()) => {
            let mut res = HttpResponse::new(HTTP_CREATED);
            res.set_body(name.into_bytes(), "text/plain");
            res
        }
        Err(e) => match e.kind() {
            ErrorKind::PermissionDenied => error_response(cfg, HTTP_FORBIDDEN),
            _ => error_response(cfg, HTTP_INTERNAL_SERVER_ERROR),
        },
    }
}

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use conf_parser::ServerConfig;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub version: String,
    pub status: u16,
    pub reason: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            version: "HTTP/1.1".to_string(),
            status,
            reason: Self::status_text(status).to_string(),
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    pub fn set_header(&mut self, key: &str, value: &str) -> &mut Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.keys().any(|k| k.eq_ignore_ascii_case(name))
    }

    /// Replaces a header regardless of the letter case it was stored with.
    pub fn force_header(&mut self, key: &str, value: &str) -> &mut Self {
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(key));
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    pub fn set_body(&mut self, body: Vec<u8>, content_type: &str) -> &mut Self {
        self.headers
            .insert("Content-Length".to_string(), body.len().to_string());
        self.headers
            .insert("Content-Type".to_string(), content_type.to_string());
        self.body = body;
        self
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = format!("{} {} {}\r\n", self.version, self.status, self.reason).into_bytes();
        for (key, value) in &self.headers {
            out.extend_from_slice(format!("{}: {}\r\n", key, value).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        let mut res = HttpResponse::new(status);
        res.set_header("Location", location)
            .set_header("Content-Length", "0");
        res
    }

    pub fn status_text(status: u16) -> &'static str {
        match status {
            200 => "OK",
            201 => "Created",
            204 => "No Content",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            408 => "Request Timeout",
            409 => "Conflict",
            411 => "Length Required",
            413 => "Payload Too Large",
            414 => "URI Too Long",
            431 => "Request Header Fields Too Large",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            _ => "OK",
        }
    }
}

pub fn mime_type(extension: Option<&str>) -> &'static str {
    match extension {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

pub fn default_error_html(status: u16, reason: &str) -> String {
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"></head><body><h1>{} {}</h1></body></html>",
        status, reason
    )
}

/// Builds an error response, preferring the server's configured error page.
pub fn error_response(cfg: &ServerConfig, status: u16) -> HttpResponse {
    let mut res = HttpResponse::new(status);
    if let Some(page) = cfg.error_pages.get(&status) {
        if let Ok(body) = fs::read(page) {
            let ext = Path::new(page).extension().and_then(|e| e.to_str());
            res.set_body(body, mime_type(ext));
            return res;
        }
    }
    let body = default_error_html(status, HttpResponse::status_text(status));
    res.set_body(body.into_bytes(), "text/html");
    res
}

/// HTTP/1.0 defaults to close and honors keep-alive; HTTP/1.1 defaults to
/// keep-alive and honors close. The engine closes the socket after the
/// response either way.
pub fn connection_value(version: &str, requested: Option<&str>) -> &'static str {
    let requested = requested.map(str::trim);
    if version == "HTTP/1.0" {
        if requested.is_some_and(|v| v.eq_ignore_ascii_case("keep-alive")) {
            "keep-alive"
        } else {
            "close"
        }
    } else if requested.is_some_and(|v| v.eq_ignore_ascii_case("close")) {
        "close"
    } else {
        "keep-alive"
    }
}

pub fn generate_autoindex(url: &str, dir: &Path) -> std::io::Result<String> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort();

    let base = url.trim_end_matches('/');
    let mut html = format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"></head><body><h1>Index of {}</h1><ul>",
        url
    );
    for name in &names {
        html.push_str(&format!("<li><a href=\"{}/{}\">{}</a></li>", base, name, name));
    }
    html.push_str("</ul></body></html>");
    Ok(html)
}

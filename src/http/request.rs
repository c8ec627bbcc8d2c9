use std::collections::HashMap;

use crate::http::find_subsequence;
use crate::prelude::{
    HTTP_BAD_REQUEST, HTTP_METHOD_NOT_ALLOWED, HTTP_PAYLOAD_TOO_LARGE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    GET,
    HEAD,
    POST,
    DELETE,
}

impl Method {
    pub fn parse(s: &str) -> Option<Method> {
        match s {
            "GET" => Some(Method::GET),
            "HEAD" => Some(Method::HEAD),
            "POST" => Some(Method::POST),
            "DELETE" => Some(Method::DELETE),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
            Method::DELETE => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    /// Raw request target as sent by the client.
    pub target: String,
    /// Normalized, percent-decoded path. Always starts with `/`, never ends
    /// with one; `had_trailing_slash` remembers what the client sent.
    pub path: String,
    pub query: String,
    pub version: String,
    pub had_trailing_slash: bool,
    /// Keys lowercased; duplicate headers joined with `,`.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Debug)]
pub enum ParseOutcome {
    /// Headers or body not complete yet; keep reading.
    NeedMore,
    /// A full request was parsed; `consumed` bytes can be dropped from the
    /// input buffer.
    Complete {
        request: HttpRequest,
        consumed: usize,
    },
}

/// Parses one request out of `buffer`. Errors carry the HTTP status code the
/// connection should fail with.
pub fn parse(buffer: &[u8], max_body: usize) -> Result<ParseOutcome, u16> {
    let Some(headers_end) = find_subsequence(buffer, b"\r\n\r\n", 0) else {
        return Ok(ParseOutcome::NeedMore);
    };
    let body_start = headers_end + 4;

    let head = std::str::from_utf8(&buffer[..headers_end]).map_err(|_| HTTP_BAD_REQUEST)?;
    let mut lines = head.split("\r\n");

    let request_line = lines.next().ok_or(HTTP_BAD_REQUEST)?;
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(HTTP_BAD_REQUEST);
    }
    let method = Method::parse(parts[0]).ok_or(HTTP_METHOD_NOT_ALLOWED)?;
    let target = parts[1].to_string();
    let version = parts[2].to_string();
    if version != "HTTP/1.0" && version != "HTTP/1.1" {
        return Err(HTTP_BAD_REQUEST);
    }

    let origin = origin_form(&target).ok_or(HTTP_BAD_REQUEST)?;
    let (raw_path, query) = match origin.find('?') {
        Some(pos) => (&origin[..pos], &origin[pos + 1..]),
        None => (origin, ""),
    };
    let had_trailing_slash = raw_path.ends_with('/');
    let decoded = decode_percent(raw_path).ok_or(HTTP_BAD_REQUEST)?;
    let path = normalize_path(&decoded).ok_or(HTTP_BAD_REQUEST)?;

    let mut headers: HashMap<String, String> = HashMap::new();
    for line in lines {
        let colon = line.find(':').ok_or(HTTP_BAD_REQUEST)?;
        let key = line[..colon].trim().to_ascii_lowercase();
        let value = line[colon + 1..].trim().to_string();
        if key.is_empty() {
            return Err(HTTP_BAD_REQUEST);
        }
        headers
            .entry(key)
            .and_modify(|v| {
                v.push(',');
                v.push_str(&value);
            })
            .or_insert(value.clone());
    }

    let query = query.to_string();

    let rest = &buffer[body_start..];
    let (body, consumed) = if let Some(te) = headers.get("transfer-encoding") {
        if !te.trim().eq_ignore_ascii_case("chunked") {
            return Err(HTTP_BAD_REQUEST);
        }
        match decode_chunked(rest, max_body)? {
            None => return Ok(ParseOutcome::NeedMore),
            Some((body, used)) => (body, body_start + used),
        }
    } else {
        let content_length = match headers.get("content-length") {
            Some(v) => parse_content_length(v).ok_or(HTTP_BAD_REQUEST)?,
            None => 0,
        };
        if content_length > max_body {
            return Err(HTTP_PAYLOAD_TOO_LARGE);
        }
        if rest.len() < content_length {
            return Ok(ParseOutcome::NeedMore);
        }
        (rest[..content_length].to_vec(), body_start + content_length)
    };

    Ok(ParseOutcome::Complete {
        request: HttpRequest {
            method,
            target,
            path,
            query,
            version,
            had_trailing_slash,
            headers,
            body,
        },
        consumed,
    })
}

/// Reduces an absolute-form target (`http://host/a/b`) to its origin form.
fn origin_form(target: &str) -> Option<&str> {
    let lower = target.to_ascii_lowercase();
    for scheme in ["http://", "https://"] {
        if lower.starts_with(scheme) {
            let after = &target[scheme.len()..];
            return Some(match after.find('/') {
                Some(pos) => &after[pos..],
                None => "/",
            });
        }
    }
    if target.starts_with('/') { Some(target) } else { None }
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Strict percent-decoding: malformed escapes and `%00` are rejected.
pub fn decode_percent(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 3 > bytes.len() {
                return None;
            }
            let b = hex_val(bytes[i + 1])? * 16 + hex_val(bytes[i + 2])?;
            if b == 0 {
                return None;
            }
            out.push(b);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Resolves `.` and `..` segments; `..` above the root is rejected.
pub fn normalize_path(decoded: &str) -> Option<String> {
    if !decoded.starts_with('/') {
        return None;
    }
    let mut stack: Vec<&str> = Vec::new();
    for seg in decoded.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                stack.pop()?;
            }
            s => stack.push(s),
        }
    }
    if stack.is_empty() {
        return Some("/".to_string());
    }
    Some(format!("/{}", stack.join("/")))
}

/// Strict Content-Length: digits only, no sign, no whitespace inside.
pub fn parse_content_length(v: &str) -> Option<usize> {
    let v = v.trim();
    if v.is_empty() || !v.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    v.parse().ok()
}

/// Scans a raw header block for one header, before full parsing is possible.
/// Used by the engine for the early Host and Content-Length checks.
pub fn header_value(head: &[u8], name: &str) -> Option<String> {
    let text = String::from_utf8_lossy(head);
    for line in text.split("\r\n").skip(1) {
        if let Some((k, v)) = line.split_once(':') {
            if k.trim().eq_ignore_ascii_case(name) {
                return Some(v.trim().to_string());
            }
        }
    }
    None
}

fn decode_chunked(rest: &[u8], max_body: usize) -> Result<Option<(Vec<u8>, usize)>, u16> {
    let mut body = Vec::new();
    let mut pos = 0;
    loop {
        let Some(line_end) = find_subsequence(rest, b"\r\n", pos) else {
            return Ok(None);
        };
        let line = std::str::from_utf8(&rest[pos..line_end]).map_err(|_| HTTP_BAD_REQUEST)?;
        let size_str = line.split(';').next().unwrap_or("").trim();
        if size_str.is_empty() || !size_str.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(HTTP_BAD_REQUEST);
        }
        let size = usize::from_str_radix(size_str, 16).map_err(|_| HTTP_BAD_REQUEST)?;
        pos = line_end + 2;

        if size == 0 {
            // Optional trailers, then the final empty line.
            loop {
                let Some(eol) = find_subsequence(rest, b"\r\n", pos) else {
                    return Ok(None);
                };
                if eol == pos {
                    return Ok(Some((body, pos + 2)));
                }
                pos = eol + 2;
            }
        }

        if body
            .len()
            .checked_add(size)
            .is_none_or(|total| total > max_body)
        {
            return Err(HTTP_PAYLOAD_TOO_LARGE);
        }
        if rest.len() < pos + size + 2 {
            return Ok(None);
        }
        body.extend_from_slice(&rest[pos..pos + size]);
        if &rest[pos + size..pos + size + 2] != b"\r\n" {
            return Err(HTTP_BAD_REQUEST);
        }
        pos += size + 2;
    }
}

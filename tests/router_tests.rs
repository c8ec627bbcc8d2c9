use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use origin_server::config::Config;
use origin_server::http::request::{HttpRequest, Method};
use origin_server::http::response::HttpResponse;
use origin_server::router::{self, RouteResult, match_location, resolve_fs_path};

fn make_req(method: Method, path: &str) -> HttpRequest {
    let had_trailing_slash = path.ends_with('/');
    let normalized = if path.len() > 1 {
        path.trim_end_matches('/').to_string()
    } else {
        "/".to_string()
    };
    HttpRequest {
        method,
        target: path.to_string(),
        path: normalized,
        query: String::new(),
        version: "HTTP/1.1".to_string(),
        had_trailing_slash,
        headers: HashMap::new(),
        body: Vec::new(),
    }
}

fn response(result: RouteResult) -> HttpResponse {
    match result {
        RouteResult::Response(res) => res,
        other => panic!("expected an immediate response, got {:?}", other),
    }
}

fn tmp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("origin_router_{}_{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn location_match_is_segment_bounded() {
    let config = Config::parse_str("server { listen 8080; location /img { } }").unwrap();
    let cfg = &config.servers[0];

    assert_eq!(match_location(cfg, "/img").unwrap().prefix, "/img");
    assert_eq!(match_location(cfg, "/img/x").unwrap().prefix, "/img");
    // /images must fall through to the root location
    assert_eq!(match_location(cfg, "/images").unwrap().prefix, "/");
}

#[test]
fn longest_prefix_wins() {
    let config =
        Config::parse_str("server { listen 8080; location /a { } location /a/b { } }").unwrap();
    let cfg = &config.servers[0];
    assert_eq!(match_location(cfg, "/a/b/c").unwrap().prefix, "/a/b");
    assert_eq!(match_location(cfg, "/a/c").unwrap().prefix, "/a");
}

#[test]
fn fs_path_keeps_prefix_folder_without_location_root() {
    let config = Config::parse_str("server { listen 8080; root www; location /img { } }").unwrap();
    let cfg = &config.servers[0];
    let loc = match_location(cfg, "/img/x.png").unwrap();

    assert_eq!(
        resolve_fs_path("/img/x.png", loc, cfg),
        PathBuf::from("www/img/x.png")
    );
    assert_eq!(resolve_fs_path("/img", loc, cfg), PathBuf::from("www/img"));
}

#[test]
fn fs_path_uses_location_root_and_drops_prefix() {
    let config =
        Config::parse_str("server { listen 8080; root www; location /img { root static; } }")
            .unwrap();
    let cfg = &config.servers[0];
    let loc = match_location(cfg, "/img/x.png").unwrap();

    assert_eq!(
        resolve_fs_path("/img/x.png", loc, cfg),
        PathBuf::from("static/x.png")
    );
    assert_eq!(resolve_fs_path("/img", loc, cfg), PathBuf::from("static"));
}

#[test]
fn disallowed_method_gets_405_with_allow_header() {
    let config = Config::parse_str("server { listen 8080; }").unwrap();
    let cfg = &config.servers[0];

    let res = response(router::route(&make_req(Method::POST, "/"), cfg));
    assert_eq!(res.status, 405);
    assert_eq!(res.headers.get("Allow").unwrap(), "GET, HEAD");
}

#[test]
fn return_directive_redirects() {
    let config =
        Config::parse_str("server { listen 8080; location /old { return 301 /new; } }").unwrap();
    let cfg = &config.servers[0];

    let res = response(router::route(&make_req(Method::GET, "/old"), cfg));
    assert_eq!(res.status, 301);
    assert_eq!(res.headers.get("Location").unwrap(), "/new");
}

#[test]
fn get_serves_index_file() {
    let dir = tmp_dir("index");
    fs::write(dir.join("index.html"), b"hello").unwrap();

    let mut config = Config::parse_str("server { listen 8080; }").unwrap();
    config.servers[0].root = dir.to_string_lossy().into_owned();
    let cfg = &config.servers[0];

    let res = response(router::route(&make_req(Method::GET, "/"), cfg));
    assert_eq!(res.status, 200);
    assert_eq!(res.headers.get("Content-Type").unwrap(), "text/html");
    assert_eq!(res.headers.get("Content-Length").unwrap(), "5");
    assert_eq!(res.body, b"hello");
}

#[test]
fn directory_without_trailing_slash_redirects() {
    let dir = tmp_dir("redirect");
    fs::create_dir_all(dir.join("images")).unwrap();

    let mut config = Config::parse_str("server { listen 8080; }").unwrap();
    config.servers[0].root = dir.to_string_lossy().into_owned();
    let cfg = &config.servers[0];

    let res = response(router::route(&make_req(Method::GET, "/images"), cfg));
    assert_eq!(res.status, 301);
    assert_eq!(res.headers.get("Location").unwrap(), "/images/");
}

#[test]
fn head_matches_get_content_length_with_empty_body() {
    let dir = tmp_dir("head");
    fs::write(dir.join("data.txt"), b"hello world").unwrap();

    let mut config = Config::parse_str("server { listen 8080; }").unwrap();
    config.servers[0].root = dir.to_string_lossy().into_owned();
    let cfg = &config.servers[0];

    let get = response(router::route(&make_req(Method::GET, "/data.txt"), cfg));
    let head = response(router::route(&make_req(Method::HEAD, "/data.txt"), cfg));

    assert_eq!(get.status, 200);
    assert_eq!(head.status, 200);
    assert_eq!(
        get.headers.get("Content-Length"),
        head.headers.get("Content-Length")
    );
    assert_eq!(get.body, b"hello world");
    assert!(head.body.is_empty());
}

#[test]
fn missing_file_is_404_with_default_html() {
    let dir = tmp_dir("missing");
    let mut config = Config::parse_str("server { listen 8080; }").unwrap();
    config.servers[0].root = dir.to_string_lossy().into_owned();
    let cfg = &config.servers[0];

    let res = response(router::route(&make_req(Method::GET, "/nope.txt"), cfg));
    assert_eq!(res.status, 404);
    assert!(String::from_utf8_lossy(&res.body).contains("404"));
}

#[test]
fn configured_error_page_is_served() {
    let dir = tmp_dir("errpage");
    fs::write(dir.join("404.html"), b"<h1>custom not found</h1>").unwrap();

    let mut config = Config::parse_str("server { listen 8080; }").unwrap();
    config.servers[0].root = dir.to_string_lossy().into_owned();
    config.servers[0]
        .error_pages
        .insert(404, dir.join("404.html").to_string_lossy().into_owned());
    let cfg = &config.servers[0];

    let res = response(router::route(&make_req(Method::GET, "/nope.txt"), cfg));
    assert_eq!(res.status, 404);
    assert_eq!(res.body, b"<h1>custom not found</h1>");
    assert_eq!(res.headers.get("Content-Type").unwrap(), "text/html");
}

#[test]
fn delete_removes_file_then_reports_404() {
    let dir = tmp_dir("delete");
    fs::write(dir.join("victim.bin"), b"x").unwrap();

    let mut config =
        Config::parse_str("server { listen 8080; location / { allowed_methods ALL; } }").unwrap();
    config.servers[0].root = dir.to_string_lossy().into_owned();
    let cfg = &config.servers[0];

    let first = response(router::route(&make_req(Method::DELETE, "/victim.bin"), cfg));
    assert_eq!(first.status, 204);
    assert!(!dir.join("victim.bin").exists());

    let second = response(router::route(&make_req(Method::DELETE, "/victim.bin"), cfg));
    assert_eq!(second.status, 404);
}

#[test]
fn delete_on_a_directory_is_403() {
    let dir = tmp_dir("deldir");
    fs::create_dir_all(dir.join("keep")).unwrap();

    let mut config =
        Config::parse_str("server { listen 8080; location / { allowed_methods ALL; } }").unwrap();
    config.servers[0].root = dir.to_string_lossy().into_owned();
    let cfg = &config.servers[0];

    let res = response(router::route(&make_req(Method::DELETE, "/keep"), cfg));
    assert_eq!(res.status, 403);
    assert!(dir.join("keep").exists());
}

#[test]
fn post_stores_the_body_and_answers_201() {
    let dir = tmp_dir("upload");
    let upload_dir = dir.join("uploads");

    let mut config =
        Config::parse_str("server { listen 8080; location / { allowed_methods ALL; } }").unwrap();
    config.servers[0].root = dir.to_string_lossy().into_owned();
    config.servers[0].upload_dir = upload_dir.to_string_lossy().into_owned();
    let cfg = &config.servers[0];

    let mut req = make_req(Method::POST, "/anything");
    req.body = b"payload bytes".to_vec();

    let res = response(router::route(&req, cfg));
    assert_eq!(res.status, 201);

    let name = String::from_utf8(res.body.clone()).unwrap();
    assert!(name.starts_with("upload_"), "got filename {}", name);
    assert!(name.ends_with(".bin"));
    assert_eq!(fs::read(upload_dir.join(&name)).unwrap(), b"payload bytes");
}

#[test]
fn empty_post_creates_a_zero_byte_upload() {
    let dir = tmp_dir("upload0");
    let upload_dir = dir.join("uploads");

    let mut config =
        Config::parse_str("server { listen 8080; location / { allowed_methods ALL; } }").unwrap();
    config.servers[0].root = dir.to_string_lossy().into_owned();
    config.servers[0].upload_dir = upload_dir.to_string_lossy().into_owned();
    let cfg = &config.servers[0];

    let res = response(router::route(&make_req(Method::POST, "/"), cfg));
    assert_eq!(res.status, 201);

    let name = String::from_utf8(res.body.clone()).unwrap();
    assert_eq!(fs::read(upload_dir.join(&name)).unwrap().len(), 0);
}

#[test]
fn autoindex_lists_directory_entries() {
    let dir = tmp_dir("autoindex");
    fs::write(dir.join("a.txt"), b"a").unwrap();
    fs::write(dir.join("b.txt"), b"b").unwrap();

    let mut config =
        Config::parse_str("server { listen 8080; location / { autoindex on; } }").unwrap();
    config.servers[0].root = dir.to_string_lossy().into_owned();
    let cfg = &config.servers[0];

    let res = response(router::route(&make_req(Method::GET, "/"), cfg));
    assert_eq!(res.status, 200);
    let html = String::from_utf8_lossy(&res.body);
    assert!(html.contains("a.txt"));
    assert!(html.contains("b.txt"));
    assert!(html.contains("Index of /"));
}

#[test]
fn directory_without_index_or_autoindex_is_404() {
    let dir = tmp_dir("noindex");

    let mut config = Config::parse_str("server { listen 8080; }").unwrap();
    config.servers[0].root = dir.to_string_lossy().into_owned();
    let cfg = &config.servers[0];

    let res = response(router::route(&make_req(Method::GET, "/"), cfg));
    assert_eq!(res.status, 404);
}

#[test]
fn known_extension_with_existing_script_dispatches_to_cgi() {
    let dir = tmp_dir("cgi");
    fs::write(dir.join("hello.py"), b"print('hi')").unwrap();

    let mut config =
        Config::parse_str("server { listen 8080; cgi .py /usr/bin/python3; }").unwrap();
    config.servers[0].root = dir.to_string_lossy().into_owned();
    let cfg = &config.servers[0];

    match router::route(&make_req(Method::GET, "/hello.py"), cfg) {
        RouteResult::Cgi {
            interpreter,
            script_path,
        } => {
            assert_eq!(interpreter, "/usr/bin/python3");
            assert_eq!(script_path, dir.join("hello.py"));
        }
        other => panic!("expected a cgi dispatch, got {:?}", other),
    }
}

#[test]
fn missing_script_falls_back_to_static_handling() {
    let dir = tmp_dir("cgimiss");

    let mut config =
        Config::parse_str("server { listen 8080; cgi .py /usr/bin/python3; }").unwrap();
    config.servers[0].root = dir.to_string_lossy().into_owned();
    let cfg = &config.servers[0];

    let res = response(router::route(&make_req(Method::GET, "/gone.py"), cfg));
    assert_eq!(res.status, 404);
}

#[test]
fn connection_header_follows_the_version_policy() {
    let dir = tmp_dir("connpolicy");
    fs::write(dir.join("index.html"), b"x").unwrap();

    let mut config = Config::parse_str("server { listen 8080; }").unwrap();
    config.servers[0].root = dir.to_string_lossy().into_owned();
    let cfg = &config.servers[0];

    let mut req10 = make_req(Method::GET, "/");
    req10.version = "HTTP/1.0".to_string();
    let res = response(router::route(&req10, cfg));
    assert_eq!(res.headers.get("Connection").unwrap(), "close");
    assert_eq!(res.version, "HTTP/1.0");

    let req11 = make_req(Method::GET, "/");
    let res = response(router::route(&req11, cfg));
    assert_eq!(res.headers.get("Connection").unwrap(), "keep-alive");

    let mut req_close = make_req(Method::GET, "/");
    req_close
        .headers
        .insert("connection".to_string(), "close".to_string());
    let res = response(router::route(&req_close, cfg));
    assert_eq!(res.headers.get("Connection").unwrap(), "close");
}

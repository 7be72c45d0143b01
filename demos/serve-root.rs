#![allow(missing_docs, unused_crate_dependencies)]

use std::path::{Component, Path, PathBuf};

use tiny_httpd::{HandlerError, Method, Request, Response, Server};

fn get_content_type(path: &Path) -> &'static str {
    let extension = match path.extension() {
        None => return "text/plain",
        Some(e) => e,
    };

    match extension.to_str().unwrap_or_default() {
        "gif" => "image/gif",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "pdf" => "application/pdf",
        "htm" | "html" => "text/html; charset=utf8",
        "json" => "application/json",
        _ => "text/plain; charset=utf8",
    }
}

/// Relative path below the working directory, `None` if the request leaves it
fn local_path(url_path: &str) -> Option<PathBuf> {
    let path = Path::new(url_path.trim_start_matches('/'));
    path.components()
        .all(|c| matches!(c, Component::Normal(_)))
        .then(|| path.to_path_buf())
}

fn serve(rq: &mut Request<'_>) -> Result<Response, HandlerError> {
    println!("{rq}");

    if !matches!(rq.method(), Method::Get | Method::Head) {
        return Err(Response::empty(405).into());
    }
    match local_path(rq.path()) {
        Some(path) if path.is_file() => {
            let content_type = get_content_type(&path);
            Ok(Response::file(path).with_content_type(content_type))
        }
        _ => Err(Response::empty(404).with_text("Not Found").into()),
    }
}

fn main() {
    let server = Server::http("0.0.0.0:8000", serve).unwrap();
    let port = server.local_addr().unwrap().to_ip().unwrap().port();
    println!("Now listening on port {port}");

    server.await_termination();
}

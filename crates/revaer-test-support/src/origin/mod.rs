//! Origin HTTP double.
//!
//! A one-connection-at-a-time HTTP/1.0 responder used as a web seed and
//! redirect target. [`OriginServer::start`] returns once the socket is
//! listening; [`OriginServer::stop`] signals the accept loop and waits for it.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::OriginConfig;
use crate::error::{HarnessError, HarnessResult};

pub mod request;
pub mod response;

use request::{MAX_REQUEST_SIZE, ParseStatus, RangeRequest, Request, parse_request, parse_range};
use response::{Response, Status};

const LISTEN_BACKLOG: u32 = 10;

/// Path answered with a redirect to `/test_file`.
pub const REDIRECT_PATH: &str = "/redirect";
/// Path answered with a redirect to itself.
pub const INFINITE_REDIRECT_PATH: &str = "/infinite_redirect";
/// Path answered with a relative redirect to `../test_file`.
pub const RELATIVE_REDIRECT_PATH: &str = "/relative/redirect";

/// Running origin double.
pub struct OriginServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl OriginServer {
    /// Bind `127.0.0.1:<port>` (0 picks a free port) and start serving files
    /// under `config.root`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Bind`] when the socket cannot be created,
    /// bound or put into listening state.
    pub async fn start(config: &OriginConfig, port: u16) -> HarnessResult<Self> {
        let requested = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let listener = bind(requested)?;
        let addr = listener.local_addr().map_err(|source| HarnessError::Bind {
            operation: "local_addr",
            addr: requested,
            source,
        })?;

        let (shutdown, signal) = oneshot::channel();
        let config = Arc::new(config.clone());
        let task = tokio::spawn(serve(listener, config, signal));
        info!(port = addr.port(), "origin double listening");
        Ok(Self {
            addr,
            shutdown: Some(shutdown),
            task: Some(task),
        })
    }

    /// Address the double listens on.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting and wait for the serving task to exit.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            warn!(error = %err, "origin task ended abnormally");
        }
        info!(port = self.addr.port(), "origin double stopped");
    }
}

impl Drop for OriginServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

fn bind(addr: SocketAddr) -> HarnessResult<TcpListener> {
    let fail = |operation: &'static str| move |source: io::Error| HarnessError::Bind {
        operation,
        addr,
        source,
    };
    let socket = TcpSocket::new_v4().map_err(fail("socket"))?;
    socket.set_reuseaddr(true).map_err(fail("set_reuseaddr"))?;
    socket.bind(addr).map_err(fail("bind"))?;
    socket.listen(LISTEN_BACKLOG).map_err(fail("listen"))
}

async fn serve(
    listener: TcpListener,
    config: Arc<OriginConfig>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::select! {
                        _ = &mut shutdown => break,
                        () = handle_connection(stream, peer, &config) => {}
                    }
                }
                Err(err) => {
                    warn!(error = %err, "origin accept failed");
                    break;
                }
            },
        }
    }
}

async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, config: &OriginConfig) {
    let request = match read_request(&mut stream).await {
        Ok(Some(request)) => request,
        Ok(None) => return,
        Err(err) => {
            warn!(peer = %peer, error = %err, "failed to read request");
            return;
        }
    };
    debug!(peer = %peer, method = %request.method, target = %request.target, "request");

    if !request.is_supported_method() {
        warn!(peer = %peer, method = %request.method, "unsupported method; dropping connection");
        return;
    }

    let response = respond(&request, config).await;
    let head = response.head();
    debug!(status = response.status.code(), head = %head.trim_end(), "response");
    let written = async {
        stream.write_all(&response.to_bytes()).await?;
        stream.shutdown().await
    };
    if let Err(err) = written.await {
        warn!(peer = %peer, error = %err, "failed to write response");
    }
}

/// Read until a full request is buffered. `None` means the peer went away or
/// sent something unparsable.
async fn read_request(stream: &mut TcpStream) -> io::Result<Option<Request>> {
    let mut buffer = vec![0_u8; MAX_REQUEST_SIZE];
    let mut filled = 0;
    loop {
        let read = stream.read(&mut buffer[filled..]).await?;
        if read == 0 {
            return Ok(None);
        }
        filled += read;
        match parse_request(&buffer[..filled]) {
            Ok(ParseStatus::Complete(request)) => return Ok(Some(request)),
            Ok(ParseStatus::Incomplete) if filled < buffer.len() => {}
            Ok(ParseStatus::Incomplete) => return Ok(None),
            Err(err) => {
                warn!(error = %err, "rejecting request");
                return Ok(None);
            }
        }
    }
}

/// Build the reply for `request` against the files under `config.root`.
pub async fn respond(request: &Request, config: &OriginConfig) -> Response {
    let path = request.path();
    match path {
        REDIRECT_PATH => return Response::redirect("/test_file"),
        INFINITE_REDIRECT_PATH => return Response::redirect(INFINITE_REDIRECT_PATH),
        RELATIVE_REDIRECT_PATH => return Response::redirect("../test_file"),
        _ => {}
    }

    let Some(file) = resolve(&config.root, path) else {
        return Response::new(Status::NotFound);
    };
    let metadata = match tokio::fs::metadata(&file).await {
        Ok(metadata) if metadata.is_file() => metadata,
        Ok(_) => return Response::new(Status::NotFound),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Response::new(Status::NotFound);
        }
        Err(err) => {
            warn!(path = %file.display(), error = %err, "failed to stat file");
            return Response::new(Status::InternalError);
        }
    };
    if metadata.len() > config.max_file_size {
        warn!(path = %file.display(), size = metadata.len(), "file too large to serve");
        return Response::new(Status::InternalError);
    }
    let contents = match tokio::fs::read(&file).await {
        Ok(contents) => contents,
        Err(err) => {
            warn!(path = %file.display(), error = %err, "failed to read file");
            return Response::new(Status::InternalError);
        }
    };

    let len = contents.len() as u64;
    let range = request
        .header("range")
        .map_or(RangeRequest::Ignored, |value| parse_range(value, len));
    let response = match range {
        RangeRequest::Ignored => Response::new(Status::Ok).with_body(contents),
        RangeRequest::Span(span) => {
            let body = usize::try_from(span.start)
                .ok()
                .zip(usize::try_from(span.byte_count()).ok())
                .and_then(|(start, count)| contents.get(start..start.checked_add(count)?));
            let Some(body) = body else {
                return Response::new(Status::InternalError);
            };
            Response::new(Status::Partial)
                .with_header(
                    "Content-Range",
                    format!("bytes {}-{}/{len}", span.start, span.end),
                )
                .with_body(body.to_vec())
        }
        RangeRequest::Unsatisfiable => {
            return Response::new(Status::RangeNotSatisfiable)
                .with_header("Content-Range", format!("bytes */{len}"));
        }
    };

    if file.extension().is_some_and(|ext| ext == "gz") {
        response.with_header("Content-Encoding", "gzip")
    } else {
        response
    }
}

/// Map a request path onto `root`, refusing anything that climbs above it.
fn resolve(root: &Path, path: &str) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    let mut depth = 0_usize;
    for component in Path::new(path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(segment) => {
                resolved.push(segment);
                depth += 1;
            }
            Component::ParentDir => {
                depth = depth.checked_sub(1)?;
                resolved.pop();
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (depth > 0).then_some(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn get(target: &str, range: Option<&str>) -> Request {
        Request {
            method: "GET".to_string(),
            target: target.to_string(),
            headers: range
                .map(|value| vec![("Range".to_string(), value.to_string())])
                .unwrap_or_default(),
            body: Vec::new(),
        }
    }

    fn serving(root: &Path) -> OriginConfig {
        OriginConfig {
            root: root.to_path_buf(),
            max_file_size: 64,
        }
    }

    #[test]
    fn resolve_stays_under_root() {
        let root = Path::new("/srv");
        assert_eq!(resolve(root, "/a/./b"), Some(PathBuf::from("/srv/a/b")));
        assert_eq!(resolve(root, "/a/../b"), Some(PathBuf::from("/srv/b")));
        assert_eq!(resolve(root, "/../etc/passwd"), None);
        assert_eq!(resolve(root, "/a/../../b"), None);
        assert_eq!(resolve(root, "/"), None);
    }

    #[tokio::test]
    async fn redirects_are_fixed() {
        let config = OriginConfig::default();
        let cases = [
            (REDIRECT_PATH, "/test_file"),
            (INFINITE_REDIRECT_PATH, INFINITE_REDIRECT_PATH),
            (RELATIVE_REDIRECT_PATH, "../test_file"),
        ];
        for (target, location) in cases {
            let response = respond(&get(target, None), &config).await;
            assert_eq!(response.status, Status::MovedPermanently);
            assert_eq!(response.header("Location"), Some(location));
        }
    }

    #[tokio::test]
    async fn files_are_served_whole_or_by_range() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        std::fs::write(temp.path().join("test_file"), b"0123456789")?;
        let config = serving(temp.path());

        let whole = respond(&get("/test_file?cache=no", None), &config).await;
        assert_eq!(whole.status, Status::Ok);
        assert_eq!(whole.body, b"0123456789");

        let span = respond(&get("/test_file", Some("bytes=2-4")), &config).await;
        assert_eq!(span.status, Status::Partial);
        assert_eq!(span.body, b"234");
        assert_eq!(span.header("Content-Range"), Some("bytes 2-4/10"));

        let beyond = respond(&get("/test_file", Some("bytes=10-")), &config).await;
        assert_eq!(beyond.status, Status::RangeNotSatisfiable);
        assert_eq!(beyond.header("Content-Range"), Some("bytes */10"));
        assert!(beyond.body.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn missing_oversize_and_compressed_files() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        std::fs::write(temp.path().join("big"), [0_u8; 65])?;
        std::fs::write(temp.path().join("archive.gz"), b"gz")?;
        let config = serving(temp.path());

        let missing = respond(&get("/nope", None), &config).await;
        assert_eq!(missing.status, Status::NotFound);
        assert!(missing.body.is_empty());

        let big = respond(&get("/big", None), &config).await;
        assert_eq!(big.status, Status::InternalError);

        let gz = respond(&get("/archive.gz", None), &config).await;
        assert_eq!(gz.status, Status::Ok);
        assert_eq!(gz.header("Content-Encoding"), Some("gzip"));
        Ok(())
    }
}

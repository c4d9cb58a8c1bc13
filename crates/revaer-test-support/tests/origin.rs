use std::net::SocketAddr;

use revaer_test_support::OriginConfig;
use revaer_test_support::origin::OriginServer;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

struct Reply {
    status: u16,
    head: String,
    body: Vec<u8>,
}

impl Reply {
    fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (field, value) = line.split_once(':')?;
            field
                .eq_ignore_ascii_case(name)
                .then(|| value.trim())
        })
    }
}

async fn exchange(addr: SocketAddr, request: &str) -> anyhow::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(request.as_bytes()).await?;
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;
    Ok(raw)
}

async fn fetch(addr: SocketAddr, method: &str, path: &str, extra: &str) -> anyhow::Result<Reply> {
    let raw = exchange(addr, &format!("{method} {path} HTTP/1.0\r\n{extra}\r\n")).await?;
    let split = raw
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .ok_or_else(|| anyhow::anyhow!("reply has no header terminator"))?;
    let head = String::from_utf8(raw[..split].to_vec())?;
    let status = head
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("reply has no status"))?
        .parse()?;
    Ok(Reply {
        status,
        head,
        body: raw[split + 4..].to_vec(),
    })
}

async fn serve(root: &TempDir) -> anyhow::Result<OriginServer> {
    revaer_telemetry::init_test_logging();
    let config = OriginConfig {
        root: root.path().to_path_buf(),
        ..OriginConfig::default()
    };
    Ok(OriginServer::start(&config, 0).await?)
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| u8::try_from(i % 251).unwrap_or(0)).collect()
}

#[tokio::test]
async fn redirects_point_where_expected() -> anyhow::Result<()> {
    let root = TempDir::new()?;
    let server = serve(&root).await?;
    let addr = server.local_addr();

    let cases = [
        ("/redirect", "/test_file"),
        ("/infinite_redirect", "/infinite_redirect"),
        ("/relative/redirect", "../test_file"),
    ];
    for (path, location) in cases {
        let reply = fetch(addr, "GET", path, "").await?;
        assert_eq!(reply.status, 301, "{path}");
        assert_eq!(reply.header("location"), Some(location), "{path}");
        assert_eq!(reply.header("connection"), Some("close"));
    }

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn range_matches_prefix_of_full_body() -> anyhow::Result<()> {
    let root = TempDir::new()?;
    std::fs::write(root.path().join("test_file"), payload(1000))?;
    let server = serve(&root).await?;
    let addr = server.local_addr();

    let full = fetch(addr, "GET", "/test_file", "").await?;
    assert_eq!(full.status, 200);
    assert_eq!(full.header("content-length"), Some("1000"));
    assert_eq!(full.body.len(), 1000);

    let partial = fetch(addr, "GET", "/test_file", "Range: bytes=0-99\r\n").await?;
    assert_eq!(partial.status, 206);
    assert_eq!(partial.header("content-length"), Some("100"));
    assert_eq!(partial.header("content-range"), Some("bytes 0-99/1000"));
    assert_eq!(partial.body, full.body[..100]);

    let tail = fetch(addr, "POST", "/test_file", "Range: bytes=900-4000\r\n").await?;
    assert_eq!(tail.status, 206);
    assert_eq!(tail.body, full.body[900..]);

    let beyond = fetch(addr, "GET", "/test_file", "Range: bytes=1000-1099\r\n").await?;
    assert_eq!(beyond.status, 416);
    assert_eq!(beyond.header("content-range"), Some("bytes */1000"));
    assert!(beyond.body.is_empty());

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn missing_files_and_escapes_are_not_found() -> anyhow::Result<()> {
    let root = TempDir::new()?;
    let server = serve(&root).await?;
    let addr = server.local_addr();

    for path in ["/test_file", "/../secret", "/a/../../secret"] {
        let reply = fetch(addr, "GET", path, "").await?;
        assert_eq!(reply.status, 404, "{path}");
        assert_eq!(reply.header("content-length"), Some("0"));
        assert!(reply.body.is_empty());
    }

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn gzip_files_are_labelled() -> anyhow::Result<()> {
    let root = TempDir::new()?;
    std::fs::write(root.path().join("test_file.gz"), payload(64))?;
    let server = serve(&root).await?;
    let addr = server.local_addr();

    let whole = fetch(addr, "GET", "/test_file.gz", "").await?;
    assert_eq!(whole.status, 200);
    assert_eq!(whole.header("content-encoding"), Some("gzip"));

    let partial = fetch(addr, "GET", "/test_file.gz", "Range: bytes=0-9\r\n").await?;
    assert_eq!(partial.status, 206);
    assert_eq!(partial.header("content-encoding"), Some("gzip"));

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn unsupported_method_is_dropped_unanswered() -> anyhow::Result<()> {
    let root = TempDir::new()?;
    let server = serve(&root).await?;
    let addr = server.local_addr();

    let raw = exchange(addr, "DELETE /test_file HTTP/1.0\r\n\r\n").await?;
    assert!(raw.is_empty());

    let next = fetch(addr, "GET", "/redirect", "").await?;
    assert_eq!(next.status, 301);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn huge_content_length_is_rejected_and_serving_continues() -> anyhow::Result<()> {
    let root = TempDir::new()?;
    let server = serve(&root).await?;
    let addr = server.local_addr();

    let rejected = exchange(
        addr,
        "POST /test_file HTTP/1.0\r\nContent-Length: 18446744073709551615\r\n\r\n",
    )
    .await;
    if let Ok(raw) = rejected {
        assert!(raw.is_empty());
    }

    let next = fetch(addr, "GET", "/redirect", "").await?;
    assert_eq!(next.status, 301);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn stop_releases_the_port() -> anyhow::Result<()> {
    let root = TempDir::new()?;
    let server = serve(&root).await?;
    let addr = server.local_addr();
    server.stop().await;

    assert!(TcpStream::connect(addr).await.is_err());
    let config = OriginConfig {
        root: root.path().to_path_buf(),
        ..OriginConfig::default()
    };
    let restarted = OriginServer::start(&config, addr.port()).await?;
    assert_eq!(restarted.local_addr().port(), addr.port());
    restarted.stop().await;
    Ok(())
}

use super::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve `response` verbatim to every connection until the test ends.
/// Returns the base URL.
pub(crate) async fn serve(response: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                break;
            };
            let response = response.clone();
            tokio::spawn(async move {
                let mut req = Vec::new();
                let mut chunk = [0u8; 1024];
                while !req.windows(4).any(|w| w == b"\r\n\r\n") {
                    match sock.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => req.extend_from_slice(&chunk[..n]),
                    }
                }
                let _ = sock.write_all(&response).await;
                let _ = sock.shutdown().await;
            });
        }
    });
    format!("http://{}", addr)
}

/// Accept connections and never answer.  Returns the base URL.
async fn hang() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((sock, _)) = listener.accept().await {
            held.push(sock);
        }
    });
    format!("http://{}", addr)
}

pub(crate) fn json_response(body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
    .into_bytes()
}

fn icy_response(metaint: usize, blocks: &[&str]) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.0 200 OK\r\nContent-Type: audio/mpeg\r\nicy-metaint: {}\r\n\r\n",
        metaint
    )
    .into_bytes();
    for meta in blocks {
        out.extend(std::iter::repeat(0xAAu8).take(metaint));
        let padded = meta.len().div_ceil(16) * 16;
        out.push((padded / 16) as u8);
        let mut block = meta.as_bytes().to_vec();
        block.resize(padded, 0);
        out.extend(block);
    }
    out
}

pub(crate) fn stream(url: &str, metadata_url: Option<String>) -> Stream {
    Stream {
        id: 0,
        name: "NTS1".to_string(),
        url: url.to_string(),
        metadata_url,
        metadata_channel: None,
    }
}

pub(crate) fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .connect_timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}

#[test]
fn test_throttle_one_per_window() {
    let mut t = ErrorThrottle::new(Duration::from_secs(30));
    let t0 = Instant::now();
    assert!(t.should_notify(t0));
    assert!(!t.should_notify(t0 + Duration::from_secs(1)));
    assert!(!t.should_notify(t0 + Duration::from_secs(29)));
    assert!(t.should_notify(t0 + Duration::from_secs(30)));
    assert!(!t.should_notify(t0 + Duration::from_secs(45)));
}

#[tokio::test]
async fn test_api_without_endpoint_is_empty() {
    let api = ApiSource::new(client(), Duration::from_secs(2));
    let s = stream("http://127.0.0.1:9/stream", None);
    assert!(api.fetch(&s).await.unwrap().is_none());
}

#[tokio::test]
async fn test_api_parses_flat_payload() {
    let base = serve(json_response(r#"{"artist":"Sade","title":"Cherish the Day"}"#)).await;
    let api = ApiSource::new(client(), Duration::from_secs(2));
    let info = api
        .fetch(&stream("http://127.0.0.1:9/stream", Some(base)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(info.artist.as_deref(), Some("Sade"));
    assert_eq!(info.title.as_deref(), Some("Cherish the Day"));
}

#[tokio::test]
async fn test_api_http_error() {
    let base = serve(
        b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
    )
    .await;
    let api = ApiSource::new(client(), Duration::from_secs(2));
    let err = api
        .fetch(&stream("http://127.0.0.1:9/stream", Some(base)))
        .await
        .unwrap_err();
    assert!(matches!(err, MetadataError::Http(_)));
}

#[tokio::test]
async fn test_api_unreachable_is_error() {
    let api = ApiSource::new(client(), Duration::from_secs(2));
    let s = stream(
        "http://127.0.0.1:9/stream",
        Some("http://127.0.0.1:9/api".to_string()),
    );
    assert!(api.fetch(&s).await.is_err());
}

#[tokio::test]
async fn test_icy_reads_second_block_title() {
    let body = icy_response(32, &["", "StreamTitle='Floating Points - Silhouettes';"]);
    let base = serve(body).await;
    let icy = IcySource::new(client(), Duration::from_secs(2));
    let info = icy.fetch(&stream(&base, None)).await.unwrap().unwrap();
    assert_eq!(info.artist.as_deref(), Some("Floating Points"));
    assert_eq!(info.title.as_deref(), Some("Silhouettes"));
}

#[tokio::test]
async fn test_icy_without_metaint_is_empty() {
    let base = serve(b"HTTP/1.0 200 OK\r\nContent-Type: audio/mpeg\r\n\r\nxxxx".to_vec()).await;
    let icy = IcySource::new(client(), Duration::from_secs(2));
    assert!(icy.fetch(&stream(&base, None)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_api_hung_endpoint_times_out() {
    let base = hang().await;
    let api = ApiSource::new(client(), Duration::from_millis(300));
    let started = Instant::now();
    let err = api
        .fetch(&stream("http://127.0.0.1:9/stream", Some(base)))
        .await
        .unwrap_err();
    assert!(matches!(err, MetadataError::Timeout));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_icy_hung_stream_times_out() {
    let base = hang().await;
    let icy = IcySource::new(client(), Duration::from_millis(300));
    let started = Instant::now();
    let err = icy.fetch(&stream(&base, None)).await.unwrap_err();
    assert!(matches!(err, MetadataError::Timeout));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#![allow(dead_code)]

use std::io::Write as _;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

pub const JPEG_P1: &[u8] = b"\xff\xd8\xff\xe0p1-jpeg";
pub const JPEG_P2: &[u8] = b"\xff\xd8\xff\xe0p2-jpeg";
pub const MP4_V1: &[u8] = b"\x00\x00\x00\x18ftypmp42v1";

/// Local stand-in for the activity feed, story API and media CDN.
///
/// Feed walk from `until=1000` with `from=100`:
/// page 1 has stories 300 (two media) and 200 (no media), page 2 has 150
/// (untitled, one photo) and 90 (past the boundary).
pub struct FeedStub {
    pub addr: String,
    requests: Arc<Mutex<Vec<String>>>,
    headers: Arc<Mutex<Vec<Vec<(String, String)>>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FeedStub {
    pub fn spawn() -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start feed stub server");
        let addr = server.server_addr().to_string();
        let base_url = format!("http://{addr}");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        let headers = Arc::new(Mutex::new(Vec::new()));
        let seen_headers = Arc::clone(&headers);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let url = request.url().to_string();
                seen.lock().expect("requests lock").push(url.clone());
                let received = request
                    .headers()
                    .iter()
                    .map(|header| (header.field.to_string(), header.value.to_string()))
                    .collect::<Vec<_>>();
                seen_headers.lock().expect("headers lock").push(received);

                let (status, gzipped, body) = route(&base_url, &url);
                let mut response = tiny_http::Response::from_data(if gzipped {
                    gzip(&body)
                } else {
                    body
                })
                .with_status_code(status);
                if gzipped {
                    let header =
                        tiny_http::Header::from_bytes(&b"Content-Encoding"[..], &b"gzip"[..])
                            .expect("build header");
                    response = response.with_header(header);
                }
                let _ = request.respond(response);
            }
        });

        Self {
            addr,
            requests,
            headers,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// Header lines of each request, in arrival order.
    pub fn request_headers(&self) -> Vec<Vec<(String, String)>> {
        self.headers.lock().expect("headers lock").clone()
    }

    /// Pseudo-header templates pointing at this server.
    pub fn config_yaml(&self, feed_path: &str) -> String {
        format!(
            "feed_request: |\n  \
             :method: GET\n  \
             :scheme: http\n  \
             :authority: {addr}\n  \
             :path: {feed_path}?until=0\n  \
             accept-encoding: gzip\n\
             detail_request: |\n  \
             :method: GET\n  \
             :scheme: http\n  \
             :authority: {addr}\n  \
             :path: /api/v3/stories/0\n  \
             accept: application/json\n  \
             accept-encoding: gzip\n",
            addr = self.addr,
        )
    }
}

impl Drop for FeedStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

fn route(base_url: &str, url: &str) -> (u16, bool, Vec<u8>) {
    match url {
        "/activity?until=1000" => (
            200,
            true,
            br#"<!doctype html><html><body>
<article data-post-id="300" data-updated-at="300" data-type="story"><h1>Beach day</h1></article>
<article data-post-id="" data-updated-at="250"><h1>Broken</h1></article>
<article data-post-id="200" data-updated-at="200" data-type="story"><h1>Quiet day</h1></article>
</body></html>"#
                .to_vec(),
        ),
        "/activity?until=200" => (
            200,
            true,
            br#"<!doctype html><html><body>
<article data-post-id="150" data-updated-at="150"></article>
<article data-post-id="90" data-updated-at="90"><h1>Too old</h1></article>
</body></html>"#
                .to_vec(),
        ),
        "/activity-bad?until=1000" => (
            200,
            true,
            br#"<html><body><article data-post-id="666" data-updated-at="600"><h1>Song</h1></article></body></html>"#
                .to_vec(),
        ),
        "/api/v3/stories/300" => (
            200,
            true,
            serde_json::json!({
                "story": {
                    "id": "300",
                    "title": "Beach day",
                    "media": [
                        {
                            "id": "p1",
                            "type": "image",
                            "content_type": "image/jpeg",
                            "original_url": format!("{base_url}/media/p1.jpg"),
                            "resized_url": format!("{base_url}/media/p1-small.jpg"),
                        },
                        {
                            "id": "v1",
                            "type": "video",
                            "content_type": "video/mp4",
                            "original_url": format!("{base_url}/media/v1.mov"),
                            "resized_url": format!("{base_url}/media/v1-small.mp4"),
                        },
                    ],
                }
            })
            .to_string()
            .into_bytes(),
        ),
        "/api/v3/stories/200" => (
            200,
            true,
            br#"{"story": {"id": "200", "title": "Quiet day", "media": []}}"#.to_vec(),
        ),
        "/api/v3/stories/150" => (
            200,
            true,
            serde_json::json!({
                "story": {
                    "id": "150",
                    "title": "",
                    "media": [{
                        "id": "p2",
                        "type": "image",
                        "content_type": "image/jpeg",
                        "original_url": format!("{base_url}/media/p2.jpg"),
                        "resized_url": "",
                    }],
                }
            })
            .to_string()
            .into_bytes(),
        ),
        "/api/v3/stories/666" => (
            200,
            true,
            serde_json::json!({
                "story": {
                    "id": "666",
                    "title": "Song",
                    "media": [{
                        "id": "a1",
                        "type": "audio",
                        "content_type": "audio/mpeg",
                        "original_url": format!("{base_url}/media/a1.mp3"),
                        "resized_url": "",
                    }],
                }
            })
            .to_string()
            .into_bytes(),
        ),
        "/media/p1.jpg" => (200, false, JPEG_P1.to_vec()),
        "/media/p2.jpg" => (200, false, JPEG_P2.to_vec()),
        "/media/v1-small.mp4" => (200, false, MP4_V1.to_vec()),
        _ => (404, false, b"not found".to_vec()),
    }
}

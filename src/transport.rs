use std::future::Future;
use std::io::Read as _;

use async_trait::async_trait;
use bytes::Bytes;
use flate2::read::GzDecoder;
use http::header::CONTENT_ENCODING;
use http::{HeaderMap, StatusCode};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::TransportError;
use crate::request::CanonicalRequest;

/// Performs requests on behalf of the fetchers.
///
/// Implementations must fail with [`TransportError::Cancelled`] once the
/// ambient cancellation token fires, both while waiting for headers and while
/// the body is being read.
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn execute(&self, request: CanonicalRequest) -> Result<HttpResponse, TransportError>;

    /// Plain GET of a pre-resolved absolute URL.
    async fn get(&self, url: &Url) -> Result<HttpResponse, TransportError>;
}

#[derive(Debug)]
enum ResponseBody {
    Streaming(reqwest::Response),
    Buffered(Option<Bytes>),
}

#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
    cancel: CancellationToken,
}

impl HttpResponse {
    pub fn streaming(response: reqwest::Response, cancel: CancellationToken) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            body: ResponseBody::Streaming(response),
            cancel,
        }
    }

    pub fn from_bytes(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: ResponseBody::Buffered(Some(body.into())),
            cancel: CancellationToken::new(),
        }
    }

    /// Ties body reads to `cancel` instead of a token that never fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Next piece of the body, `None` once exhausted.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        match &mut self.body {
            ResponseBody::Streaming(response) => {
                cancellable(&self.cancel, async {
                    response.chunk().await.map_err(TransportError::from)
                })
                .await
            }
            ResponseBody::Buffered(_) if self.cancel.is_cancelled() => {
                Err(TransportError::Cancelled)
            }
            ResponseBody::Buffered(bytes) => Ok(bytes.take()),
        }
    }

    pub async fn bytes(self) -> Result<Bytes, TransportError> {
        match self.body {
            ResponseBody::Streaming(response) => {
                cancellable(&self.cancel, async {
                    response.bytes().await.map_err(TransportError::from)
                })
                .await
            }
            ResponseBody::Buffered(_) if self.cancel.is_cancelled() => {
                Err(TransportError::Cancelled)
            }
            ResponseBody::Buffered(bytes) => Ok(bytes.unwrap_or_default()),
        }
    }
}

/// Races `fut` against `cancel`; a fired token wins even if both are ready.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransportError::Cancelled),
        result = fut => result,
    }
}

#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    client: reqwest::Client,
    cancel: CancellationToken,
}

impl ReqwestExecutor {
    pub fn new(client: reqwest::Client, cancel: CancellationToken) -> Self {
        Self { client, cancel }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<HttpResponse, TransportError> {
        let response = cancellable(&self.cancel, async {
            builder.send().await.map_err(TransportError::from)
        })
        .await?;
        Ok(HttpResponse::streaming(response, self.cancel.clone()))
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(&self, request: CanonicalRequest) -> Result<HttpResponse, TransportError> {
        let version = request.version();
        let (method, uri, headers, body) = request.into_parts();
        let uri = uri.to_string();
        let url = Url::parse(&uri).map_err(|source| TransportError::InvalidUrl {
            url: uri.clone(),
            source,
        })?;
        tracing::debug!(%method, %url, ?version, headers = headers.len(), "send templated request");

        // Protocol version is left to ALPN negotiation; forcing it breaks
        // HTTP/1-only connections for pseudo-header templates.
        let mut builder = self.client.request(method, url);
        for header in &headers {
            builder = builder.header(header.name.as_str(), header.value.as_str());
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }
        self.send(builder).await
    }

    async fn get(&self, url: &Url) -> Result<HttpResponse, TransportError> {
        tracing::debug!(%url, "send plain GET");
        self.send(self.client.get(url.clone())).await
    }
}

pub fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(CONTENT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|coding| coding.trim().eq_ignore_ascii_case("gzip"))
}

pub fn gunzip(data: &[u8]) -> Result<Vec<u8>, TransportError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(TransportError::Decompress)?;
    Ok(out)
}

/// Reads a whole 2xx body, gunzipping it when the response declares gzip.
pub async fn read_decoded_body(response: HttpResponse) -> Result<Vec<u8>, TransportError> {
    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Status(status));
    }
    let gzip = is_gzip(response.headers());
    let body = response.bytes().await?;
    if gzip { gunzip(&body) } else { Ok(body.to_vec()) }
}

use crate::context::StreamContext;
use crate::manifest::{OFFSET_PARAM, PLAYLIST_EXT, SEGMENT_PREFIX};
use bytes::Bytes;
use chrono::Utc;
use futures_util::Stream;
use http_body_util::combinators::BoxBody;
use http_body_util::StreamBody;
use hyper::body::{Frame, Incoming};
use hyper::http::response::Builder;
use hyper::service::Service;
use hyper::{header, Request, Response, StatusCode, Uri};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};

pub const SERVER_VERSION: &str = concat!("simulive/", env!("CARGO_PKG_VERSION"));

const COMMON_HEADERS: [(&str, &str); 2] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Server", SERVER_VERSION),
];
const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const MEDIA_CONTENT_TYPE: &str = "video/mp4";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Manifest,
    Segment { sequence: u64, index: usize },
}

impl Route {
    /// Expected forms: `/<name>.m3u8` or `/segment<sequence>.<ext>?offset=<index>`
    pub fn from_uri(uri: &Uri) -> Result<Self, String> {
        let path = uri.path();
        if path.ends_with(PLAYLIST_EXT) {
            return Ok(Route::Manifest);
        }

        let offset = uri
            .query()
            .unwrap_or("")
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == OFFSET_PARAM)
            .map(|(_, value)| value);
        let offset = match offset {
            Some(offset) if !offset.is_empty() => offset,
            _ => return Err(format!("Cannot handle request: {}", uri)),
        };

        let index = offset
            .parse::<usize>()
            .map_err(|e| format!("Invalid segment offset: {}", e))?;

        let file_name = path.rsplit('/').next().unwrap_or("");
        let stem = file_name.split('.').next().unwrap_or("");
        let sequence = stem
            .strip_prefix(SEGMENT_PREFIX)
            .ok_or_else(|| format!("Invalid segment name: {}", file_name))?
            .parse::<u64>()
            .map_err(|e| format!("Invalid sequence number: {}", e))?;

        Ok(Route::Segment { sequence, index })
    }
}

/// Values reported in the access log for every request.
struct AccessLog {
    start: Instant,
    started_at: chrono::DateTime<Utc>,
    protocol: hyper::Version,
    method: hyper::Method,
    uri: Uri,
    blocked: Duration,
    size: usize,
}

impl AccessLog {
    fn new<B>(req: &Request<B>) -> Self {
        AccessLog {
            start: Instant::now(),
            started_at: Utc::now(),
            protocol: req.version(),
            method: req.method().clone(),
            uri: req.uri().clone(),
            blocked: Duration::ZERO,
            size: 0,
        }
    }

    fn finish(&self, status: StatusCode) {
        info!(
            "{} {:?} {} {} {:?} {:?} {} {} {}",
            self.started_at.format("%H:%M:%S%.3f%:z"),
            self.protocol,
            self.method,
            self.uri,
            self.blocked,
            self.start.elapsed(),
            self.size,
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        );
    }
}

#[derive(Clone)]
pub struct StreamService {
    context: Arc<StreamContext>,
    cache_max_age: u64,
}

impl StreamService {
    /// Segments may be cached for `cache_segments` target durations.
    pub fn new(context: Arc<StreamContext>, cache_segments: u64) -> Self {
        let cache_max_age = context.timeline.target_duration() * cache_segments;
        StreamService {
            context,
            cache_max_age,
        }
    }

    pub async fn handle<B>(
        &self,
        req: Request<B>,
    ) -> Result<Response<BoxBody<Bytes, Infallible>>, Infallible> {
        let mut log = AccessLog::new(&req);

        let route = match Route::from_uri(req.uri()) {
            Ok(route) => route,
            Err(e) => {
                error!("request: {}", e);
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                log.finish(status);
                return Ok(empty_response(status));
            }
        };

        let response = match route {
            Route::Manifest => self.manifest(&mut log).await,
            Route::Segment { sequence, index } => self.segment(&mut log, sequence, index),
        };

        log.finish(response.status());
        Ok(response)
    }

    async fn manifest(&self, log: &mut AccessLog) -> Response<BoxBody<Bytes, Infallible>> {
        let blocked = Instant::now();
        let document = self.context.store.read().await;
        log.blocked = blocked.elapsed();

        let document = match document {
            Ok(document) => document,
            Err(e) => {
                error!("manifest store: {}", e);
                return empty_response(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        log.size = document.len();
        let response = common_headers(Response::builder().status(StatusCode::OK))
            .header(header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE)
            .header(header::CONTENT_LENGTH, document.len());
        build(response, payload_body(document))
    }

    fn segment(
        &self,
        log: &mut AccessLog,
        sequence: u64,
        index: usize,
    ) -> Response<BoxBody<Bytes, Infallible>> {
        let Some(fragment) = self.context.fragment(sequence, index) else {
            error!(
                "segment offset {} is outside the pool of {}",
                index,
                self.context.pool.len()
            );
            return empty_response(StatusCode::NOT_FOUND);
        };

        log.size = fragment.len();
        let response = common_headers(Response::builder().status(StatusCode::OK))
            .header(header::CONTENT_TYPE, MEDIA_CONTENT_TYPE)
            .header(
                header::CACHE_CONTROL,
                format!("max-age={}", self.cache_max_age),
            )
            .header(header::CONTENT_LENGTH, fragment.len());
        build(response, payload_body(fragment))
    }
}

impl Service<Request<Incoming>> for StreamService {
    type Response = Response<BoxBody<Bytes, Infallible>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let this = self.clone();
        Box::pin(async move { this.handle(req).await })
    }
}

/// Sends a whole payload as a single data frame.
struct PayloadDownstream {
    data: Option<Bytes>,
}

impl Stream for PayloadDownstream {
    type Item = Result<Frame<Bytes>, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.data.take().map(|data| Ok(Frame::data(data))))
    }
}

fn payload_body(data: Bytes) -> BoxBody<Bytes, Infallible> {
    BoxBody::new(StreamBody::new(PayloadDownstream { data: Some(data) }))
}

fn common_headers(mut response: Builder) -> Builder {
    for (name, value) in COMMON_HEADERS {
        response = response.header(name, value);
    }
    response
}

fn build(
    response: Builder,
    body: BoxBody<Bytes, Infallible>,
) -> Response<BoxBody<Bytes, Infallible>> {
    match response.body(body) {
        Ok(response) => response,
        Err(e) => {
            error!("build response: {}", e);
            let mut response = Response::new(BoxBody::default());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

fn empty_response(status: StatusCode) -> Response<BoxBody<Bytes, Infallible>> {
    build(
        common_headers(Response::builder().status(status)),
        BoxBody::default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamSettings;
    use crate::fragment::{base_decode_time, TFDT_MARKER};
    use crate::pool::SegmentPool;
    use crate::store::{ManifestStore, MemoryStore};
    use http_body_util::BodyExt;
    use std::path::PathBuf;

    fn payload(decode_time: u64) -> Bytes {
        let mut data = b"\x00\x00\x00\x14".to_vec();
        data.extend_from_slice(&TFDT_MARKER);
        data.extend_from_slice(&decode_time.to_be_bytes());
        data.extend_from_slice(b"\x00\x00\x00\x08mdat");
        Bytes::from(data)
    }

    async fn service() -> StreamService {
        let settings = StreamSettings {
            time_scale: 1000,
            segment_duration: 2000,
            window_duration: 6000,
            segments: vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")],
        };
        let pool = SegmentPool::from_payloads(vec![payload(0), payload(2000)]).unwrap();
        let store = Arc::new(MemoryStore::new());
        store.write("#EXTM3U\n".to_string()).await.unwrap();

        let context = StreamContext::new(Utc::now(), &settings, pool, store).unwrap();
        StreamService::new(Arc::new(context), 3)
    }

    fn request(uri: &str) -> Request<()> {
        Request::builder().uri(uri).body(()).unwrap()
    }

    async fn body(response: Response<BoxBody<Bytes, Infallible>>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[test]
    fn route_manifest() {
        let uri: Uri = "/media.m3u8".parse().unwrap();
        assert_eq!(Route::from_uri(&uri), Ok(Route::Manifest));
    }

    #[test]
    fn route_segment() {
        let uri: Uri = "/segment42.mp4?offset=1".parse().unwrap();
        assert_eq!(
            Route::from_uri(&uri),
            Ok(Route::Segment {
                sequence: 42,
                index: 1
            })
        );

        let uri: Uri = "/live/segment7.mp4?foo=bar&offset=0".parse().unwrap();
        assert_eq!(
            Route::from_uri(&uri),
            Ok(Route::Segment {
                sequence: 7,
                index: 0
            })
        );
    }

    #[test]
    fn route_rejects_unknown_requests() {
        for uri in [
            "/",
            "/segment3.mp4",
            "/segment3.mp4?offset=",
            "/segment3.mp4?offset=x",
            "/segmentX.mp4?offset=1",
            "/chunk3.mp4?offset=1",
        ] {
            let uri: Uri = uri.parse().unwrap();
            assert!(Route::from_uri(&uri).is_err(), "{}", uri);
        }
    }

    #[tokio::test]
    async fn handle_manifest_returns_published_document() {
        let service = service().await;

        let response = service.handle(request("/media.m3u8")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            PLAYLIST_CONTENT_TYPE
        );
        assert_eq!(response.headers()[header::SERVER], SERVER_VERSION);
        assert_eq!(&body(response).await[..], b"#EXTM3U\n");
    }

    #[tokio::test]
    async fn handle_segment_returns_patched_fragment() {
        let service = service().await;

        let response = service
            .handle(request("/segment7.mp4?offset=1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], MEDIA_CONTENT_TYPE);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "max-age=6");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "28");

        let fragment = body(response).await;
        assert_eq!(base_decode_time(&fragment), Some(2000 + 7 * 2000));
        assert_eq!(&fragment[20..], b"\x00\x00\x00\x08mdat");
    }

    #[tokio::test]
    async fn handle_segment_outside_pool() {
        let service = service().await;

        let response = service
            .handle(request("/segment7.mp4?offset=2"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn handle_unknown_request_is_server_error() {
        let service = service().await;

        let response = service.handle(request("/favicon.ico")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()["Access-Control-Allow-Origin"], "*");
    }
}

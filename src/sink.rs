//! The time-series sink: the [`Sink`] seam and the InfluxDB v2 HTTP writer.

use crate::{Batch, point::encode_lines};
use std::{future::Future, time::Duration};
use tracing::{debug, instrument};
use url::Url;

/// Errors surfaced by a [`Sink`]. None of these are fatal to the poll loop.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// No live sink handle.
    #[error("sink is not connected")]
    Disconnected,

    /// Nothing to write, or no point in the batch had a writable field.
    #[error("batch has no writable points")]
    EmptyBatch,

    /// A sink endpoint could not be derived from the base URL.
    #[error("invalid sink url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The request never produced a response (DNS, connect, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("sink rejected request with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, for the log.
        body: String,
    },
}

/// Destination for batches.
///
/// The poll loop owns its sink exclusively and calls these one at a time.
pub trait Sink {
    /// Establish (or re-establish) the sink handle.
    fn connect(&mut self) -> impl Future<Output = Result<(), SinkError>>;

    /// Submit a whole batch. Either every point is handed over or none is.
    fn write(&mut self, batch: &Batch) -> impl Future<Output = Result<(), SinkError>>;

    /// Release the sink handle.
    fn close(&mut self) -> impl Future<Output = ()>;
}

/// Where and how to write.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Base URL of the store, e.g. `http://localhost:8086`.
    pub url: Url,
    /// API token, sent as `Authorization: Token <token>`.
    pub token: String,
    /// Organization name.
    pub org: String,
    /// Bucket name.
    pub bucket: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl SinkConfig {
    fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        let mut base = self.url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path)
    }

    /// The health-check endpoint.
    pub fn health_url(&self) -> Result<Url, url::ParseError> {
        self.endpoint("health")
    }

    /// The write endpoint, with org, bucket and nanosecond precision.
    pub fn write_url(&self) -> Result<Url, url::ParseError> {
        let mut url = self.endpoint("api/v2/write")?;
        url.query_pairs_mut()
            .append_pair("org", &self.org)
            .append_pair("bucket", &self.bucket)
            .append_pair("precision", "ns");
        Ok(url)
    }
}

/// Writes batches to an InfluxDB v2 compatible `/api/v2/write` endpoint as
/// line protocol.
#[derive(Debug)]
pub struct InfluxSink {
    config: SinkConfig,
    client: reqwest::Client,
    connected: bool,
}

impl InfluxSink {
    /// Create a sink. No request is made until [`Sink::connect`].
    pub fn new(config: SinkConfig) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            config,
            client,
            connected: false,
        })
    }

    /// The sink's configuration.
    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    /// Whether the last connect succeeded and the sink has not been closed.
    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

async fn check_status(response: reqwest::Response) -> Result<(), SinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(SinkError::Rejected {
        status: status.as_u16(),
        body,
    })
}

impl Sink for InfluxSink {
    #[instrument(skip(self), fields(url = %self.config.url))]
    async fn connect(&mut self) -> Result<(), SinkError> {
        self.connected = false;
        let response = self.client.get(self.config.health_url()?).send().await?;
        check_status(response).await?;
        self.connected = true;
        debug!("Sink health check passed");
        Ok(())
    }

    async fn write(&mut self, batch: &Batch) -> Result<(), SinkError> {
        if !self.connected {
            return Err(SinkError::Disconnected);
        }
        if batch.is_empty() {
            return Err(SinkError::EmptyBatch);
        }

        let body = batch.in_scope(encode_lines);
        if body.is_empty() {
            return Err(SinkError::EmptyBatch);
        }
        let url = self.config.write_url()?;

        let response = self
            .client
            .post(url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Token {}", self.config.token),
            )
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;
        check_status(response).await
    }

    async fn close(&mut self) {
        self.connected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Point;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
        task::JoinHandle,
    };

    /// One request as seen on the wire.
    #[derive(Debug, Default)]
    struct Captured {
        request_line: String,
        headers: Vec<(String, String)>,
        body: String,
    }

    impl Captured {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }
    }

    async fn read_request(stream: &mut TcpStream) -> Captured {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let head_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed mid-request");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos;
            }
        };

        let head = String::from_utf8(buf[..head_end].to_vec()).unwrap();
        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap().to_owned();
        let headers: Vec<(String, String)> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
            .collect();

        let mut captured = Captured {
            request_line,
            headers,
            body: String::new(),
        };
        let len: usize = captured
            .header("content-length")
            .map_or(0, |v| v.parse().unwrap());
        let mut body = buf[head_end + 4..].to_vec();
        while body.len() < len {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed mid-body");
            body.extend_from_slice(&chunk[..n]);
        }
        captured.body = String::from_utf8(body).unwrap();
        captured
    }

    /// Serve one scripted `(status, body)` response per connection and
    /// record the requests.
    async fn serve(
        responses: Vec<(u16, &'static str)>,
    ) -> (Url, Arc<Mutex<Vec<Captured>>>, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = seen.clone();
        let server = tokio::spawn(async move {
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                let request = read_request(&mut stream).await;
                log.lock().unwrap().push(request);
                let response = format!(
                    "HTTP/1.1 {status} Scripted\r\ncontent-length: {}\r\n\
                     connection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.unwrap();
            }
        });
        (url, seen, server)
    }

    fn batch_of(points: Vec<Point>) -> Batch {
        let now = points[0].timestamp;
        Batch::new(points, now, tracing::Span::none())
    }

    fn config(url: &str) -> SinkConfig {
        SinkConfig {
            url: Url::parse(url).unwrap(),
            token: "t0ken".into(),
            org: "water treatment".into(),
            bucket: "water_metrics".into(),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn builds_write_url() {
        let url = config("http://influx:8086").write_url().unwrap();
        assert_eq!(
            url.as_str(),
            "http://influx:8086/api/v2/write?org=water+treatment&bucket=water_metrics&precision=ns"
        );
    }

    #[test]
    fn keeps_base_path_prefix() {
        let cfg = config("https://metrics.example.com/influx");
        assert_eq!(
            cfg.health_url().unwrap().as_str(),
            "https://metrics.example.com/influx/health"
        );
        assert!(
            cfg.write_url()
                .unwrap()
                .as_str()
                .starts_with("https://metrics.example.com/influx/api/v2/write?")
        );
    }

    #[tokio::test]
    async fn refuses_to_write_before_connect() {
        let mut sink = InfluxSink::new(config("http://127.0.0.1:9")).unwrap();
        let now = Utc::now();
        let batch = Batch::new(
            vec![Point::new("m", now).field("value", 1.0)],
            now,
            tracing::Span::none(),
        );
        assert!(matches!(
            sink.write(&batch).await,
            Err(SinkError::Disconnected)
        ));
        assert!(!sink.is_connected());
    }

    #[tokio::test]
    async fn writes_line_protocol_with_token_and_maps_rejections() {
        let (url, seen, server) = serve(vec![(200, ""), (204, ""), (401, "nope")]).await;
        let mut sink = InfluxSink::new(SinkConfig {
            token: "tok".into(),
            org: "o".into(),
            bucket: "b".into(),
            ..config(url.as_str())
        })
        .unwrap();
        assert_eq!(sink.config().url, url);

        sink.connect().await.unwrap();
        assert!(sink.is_connected());

        let now = Utc::now();
        let batch = batch_of(vec![Point::new("m", now).tag("t", "v").field("value", 1.5)]);
        sink.write(&batch).await.unwrap();

        match sink.write(&batch).await {
            Err(SinkError::Rejected { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "nope");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        // A rejected write does not drop the connection.
        assert!(sink.is_connected());
        server.await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].request_line, "GET /health HTTP/1.1");

        let write = &seen[1];
        assert_eq!(
            write.request_line,
            "POST /api/v2/write?org=o&bucket=b&precision=ns HTTP/1.1"
        );
        assert_eq!(write.header("authorization"), Some("Token tok"));
        assert_eq!(
            write.body,
            format!("m,t=v value=1.5 {}", now.timestamp_nanos_opt().unwrap())
        );
        assert_eq!(seen[2].body, write.body);
    }

    #[tokio::test]
    async fn failed_health_check_leaves_sink_disconnected() {
        let (url, seen, server) = serve(vec![(503, "starting")]).await;
        let mut sink = InfluxSink::new(config(url.as_str())).unwrap();

        assert!(matches!(
            sink.connect().await,
            Err(SinkError::Rejected { status: 503, .. })
        ));
        assert!(!sink.is_connected());
        server.await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn batch_without_writable_points_is_not_sent() {
        let (url, seen, server) = serve(vec![(200, "")]).await;
        let mut sink = InfluxSink::new(config(url.as_str())).unwrap();
        sink.connect().await.unwrap();
        server.await.unwrap();

        let batch = batch_of(vec![Point::new("m", Utc::now()).field("value", f64::NAN)]);
        assert!(matches!(
            sink.write(&batch).await,
            Err(SinkError::EmptyBatch)
        ));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}

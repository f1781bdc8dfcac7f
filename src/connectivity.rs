//! Reachability checks against the sink host: ICMP ping, TCP connect and an
//! HTTP GET. Each check fails independently and never errors out.

use crate::Metrics;
use std::time::Duration;
use tokio::{net::TcpStream, process::Command, time::timeout};
use tracing::{debug, error, instrument};
use url::Url;

/// How long `ping` waits for its single reply.
pub const PING_WAIT: Duration = Duration::from_secs(5);

/// Upper bound on the whole `ping` invocation.
pub const PING_DEADLINE: Duration = Duration::from_secs(10);

/// Timeout for the TCP connect and the HTTP request.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of one round of checks.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConnectivityReport {
    /// `ping` exited successfully.
    pub ping_success: bool,
    /// Round-trip time reported by `ping`, when it printed one.
    pub ping_time_ms: Option<f64>,
    /// A TCP connection to the target port was established.
    pub tcp_connect: bool,
    /// The target URL answered with a status below 400.
    pub http_connect: bool,
}

impl ConnectivityReport {
    /// Every check failed.
    pub fn unreachable() -> Self {
        Self::default()
    }

    /// Flatten into metric values. Booleans become 1.0 / 0.0.
    pub fn to_metrics(&self) -> Metrics {
        let flag = |ok: bool| if ok { 1.0 } else { 0.0 };

        let mut metrics = Metrics::new();
        metrics.insert("ping_success".into(), flag(self.ping_success));
        if let Some(ms) = self.ping_time_ms {
            metrics.insert("ping_time_ms".into(), ms);
        }
        metrics.insert("tcp_connect".into(), flag(self.tcp_connect));
        metrics.insert("http_connect".into(), flag(self.http_connect));
        metrics
    }
}

/// Pull the `time=<ms>` value out of `ping` output.
pub fn parse_ping_time(stdout: &str) -> Option<f64> {
    stdout.lines().find_map(|line| {
        let (_, rest) = line.split_once("time=")?;
        rest.split_whitespace().next()?.trim_end_matches("ms").parse().ok()
    })
}

/// Runs the three checks against a target URL.
#[derive(Debug, Clone)]
pub struct ConnectivityProbe {
    client: reqwest::Client,
}

impl ConnectivityProbe {
    /// Create a new probe.
    pub fn new() -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    /// Check reachability of `target`'s host. A target without a host is
    /// reported as unreachable.
    #[instrument(skip_all, fields(target = %target), name = "Probing connectivity")]
    pub async fn probe(&self, target: &Url) -> ConnectivityReport {
        let Some(host) = target.host_str() else {
            error!("Target has no host, reporting unreachable");
            return ConnectivityReport::unreachable();
        };
        let port = target.port_or_known_default().unwrap_or(80);

        let (ping_success, ping_time_ms) = ping(host).await;
        let tcp_connect = tcp_connect(host, port).await;
        let http_connect = self.http_get(target).await;

        let report = ConnectivityReport {
            ping_success,
            ping_time_ms,
            tcp_connect,
            http_connect,
        };
        debug!(?report, "Connectivity checked");
        report
    }

    async fn http_get(&self, target: &Url) -> bool {
        match self.client.get(target.clone()).send().await {
            Ok(response) => response.status().as_u16() < 400,
            Err(err) => {
                debug!(%err, "HTTP check failed");
                false
            }
        }
    }
}

async fn ping(host: &str) -> (bool, Option<f64>) {
    let mut command = Command::new("ping");
    command
        .args(["-c", "1", "-W"])
        .arg(PING_WAIT.as_secs().to_string())
        .arg(host)
        .kill_on_drop(true);

    match timeout(PING_DEADLINE, command.output()).await {
        Ok(Ok(output)) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            (true, parse_ping_time(&stdout))
        }
        Ok(Ok(_)) => (false, None),
        Ok(Err(err)) => {
            debug!(%err, "Unable to run ping");
            (false, None)
        }
        Err(_) => {
            debug!("Ping timed out");
            (false, None)
        }
    }
}

async fn tcp_connect(host: &str, port: u16) -> bool {
    match timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => true,
        Ok(Err(err)) => {
            debug!(%err, port, "TCP check failed");
            false
        }
        Err(_) => {
            debug!(port, "TCP check timed out");
            false
        }
    }
}

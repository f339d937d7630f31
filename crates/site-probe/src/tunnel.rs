// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! VPN tunnel check through the site router.
//!
//! The probe logs into the router over SSH, pings the rendezvous address
//! from there and looks for an echo reply in the command output. Host keys
//! are accepted unconditionally; the fingerprint is only logged.

use std::io::Read;
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use log::{debug, warn};
use sha2::{Digest, Sha256};
use ssh2::{ExtendedData, Session};
use thiserror::Error;

use crate::outcome::{has_ttl_marker, Diagnosis, ProbeOutcome};
use crate::site::SiteRecord;

/// Router family whose firmware needs an explicit packet count.
pub const COUNT_FLAG_ROUTER_MARKER: &str = "Four Faith";

/// Errors raised while talking to a router. They end up as the detail of
/// [`ProbeOutcome::AuthOrConnectError`].
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("failed to resolve {0}")]
    Resolve(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("SSH handshake failed: {0}")]
    Handshake(String),

    #[error("SSH authentication failed: {0}")]
    Auth(String),

    #[error("SSH channel error: {0}")]
    Channel(String),

    #[error("SSH worker aborted: {0}")]
    Worker(String),
}

/// Where and as whom to log in.
#[derive(Clone)]
pub struct RouterLogin {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for RouterLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterLogin")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Bounds for one remote session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    /// Single deadline covering name resolution, TCP connect, handshake and
    /// authentication together.
    pub connect: Duration,
    /// Reading the command's output, measured from when it starts.
    pub command: Duration,
}

/// Runs one command on a router and returns its combined output.
///
/// The session must be closed before `execute` returns, whatever the
/// result.
#[async_trait]
pub trait ShellTransport: Send + Sync {
    async fn execute(
        &self,
        login: &RouterLogin,
        command: &str,
        timeouts: SessionTimeouts,
    ) -> Result<String, TunnelError>;
}

/// [`ShellTransport`] built on libssh2. Each call opens a fresh session on
/// the blocking thread pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ssh2Transport;

#[async_trait]
impl ShellTransport for Ssh2Transport {
    async fn execute(
        &self,
        login: &RouterLogin,
        command: &str,
        timeouts: SessionTimeouts,
    ) -> Result<String, TunnelError> {
        let deadline = Instant::now() + timeouts.connect;
        let addr = resolve(login, timeouts.connect).await?;
        let login = login.clone();
        let command = command.to_string();
        tokio::task::spawn_blocking(move || {
            execute_blocking(&login, addr, &command, deadline, timeouts.command)
        })
        .await
        .map_err(|e| TunnelError::Worker(e.to_string()))?
    }
}

async fn resolve(login: &RouterLogin, limit: Duration) -> Result<SocketAddr, TunnelError> {
    let target = format!("{}:{}", login.host, login.port);
    let lookup = tokio::net::lookup_host((login.host.as_str(), login.port));
    match tokio::time::timeout(limit, lookup).await {
        Ok(Ok(mut addrs)) => addrs.next().ok_or(TunnelError::Resolve(target)),
        Ok(Err(e)) => Err(TunnelError::Resolve(format!("{target}: {e}"))),
        Err(_) => Err(TunnelError::Resolve(format!("{target}: timed out"))),
    }
}

/// Disconnects the session on every exit path.
struct RouterSession {
    session: Session,
}

impl Drop for RouterSession {
    fn drop(&mut self) {
        if let Err(e) = self.session.disconnect(None, "probe finished", None) {
            debug!("SSH disconnect failed: {}", e);
        }
    }
}

fn timeout_millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX).max(1)
}

/// Time left before `deadline`, or `None` once it has passed.
fn time_left(deadline: Instant) -> Option<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    (!left.is_zero()).then_some(left)
}

fn execute_blocking(
    login: &RouterLogin,
    addr: SocketAddr,
    command: &str,
    deadline: Instant,
    command_timeout: Duration,
) -> Result<String, TunnelError> {
    let target = format!("{}:{}", login.host, login.port);
    let expired = |stage: fn(String) -> TunnelError| stage(format!("{target}: timed out"));

    let left = time_left(deadline).ok_or_else(|| expired(TunnelError::Connect))?;
    let stream = TcpStream::connect_timeout(&addr, left)
        .map_err(|e| TunnelError::Connect(format!("{target}: {e}")))?;

    let left = time_left(deadline).ok_or_else(|| expired(TunnelError::Handshake))?;
    let mut session = Session::new().map_err(|e| TunnelError::Handshake(e.to_string()))?;
    session.set_timeout(timeout_millis(left));
    session.set_tcp_stream(stream);
    session
        .handshake()
        .map_err(|e| TunnelError::Handshake(format!("{target}: {e}")))?;
    let router = RouterSession { session };

    if let Some((host_key, _)) = router.session.host_key() {
        let fingerprint = STANDARD_NO_PAD.encode(Sha256::digest(host_key));
        debug!("Accepting host key SHA256:{} for {}", fingerprint, target);
    }

    let left = time_left(deadline).ok_or_else(|| expired(TunnelError::Auth))?;
    router.session.set_timeout(timeout_millis(left));
    router
        .session
        .userauth_password(&login.user, &login.password)
        .map_err(|e| TunnelError::Auth(e.to_string()))?;
    if !router.session.authenticated() {
        return Err(TunnelError::Auth("rejected by router".to_string()));
    }

    router.session.set_timeout(timeout_millis(command_timeout));
    let mut channel = router
        .session
        .channel_session()
        .map_err(|e| TunnelError::Channel(e.to_string()))?;
    channel
        .handle_extended_data(ExtendedData::Merge)
        .map_err(|e| TunnelError::Channel(e.to_string()))?;
    channel
        .exec(command)
        .map_err(|e| TunnelError::Channel(e.to_string()))?;

    let session = &router.session;
    let output = read_output(&mut channel, command_timeout, |left| {
        session.set_timeout(timeout_millis(left));
    });
    if let Err(e) = channel.close() {
        debug!("Closing channel on {} failed: {}", target, e);
    }
    Ok(output)
}

/// Read until the command exits, an echo reply shows up or `limit`
/// elapses. `set_timeout` receives the time left before every read. A read
/// error ends the transcript; whatever arrived before it is still
/// classified.
fn read_output<R: Read>(
    reader: &mut R,
    limit: Duration,
    mut set_timeout: impl FnMut(Duration),
) -> String {
    let deadline = Instant::now() + limit;
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        let Some(left) = time_left(deadline) else {
            debug!("Remote command still running after {:?}, giving up", limit);
            break;
        };
        set_timeout(left);

        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                raw.extend_from_slice(&buf[..n]);
                // The bare form of ping never exits; one reply settles it.
                if has_ttl_marker(&String::from_utf8_lossy(&raw)) {
                    break;
                }
            }
            Err(e) => {
                debug!("Stopped reading remote output: {}", e);
                break;
            }
        }
    }

    String::from_utf8_lossy(&raw).into_owned()
}

/// SSH-and-ping probe against a fixed rendezvous address.
#[derive(Clone)]
pub struct TunnelProbe {
    transport: Arc<dyn ShellTransport>,
    count_flag_marker: String,
    command_timeout: Duration,
}

impl std::fmt::Debug for TunnelProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelProbe")
            .field("count_flag_marker", &self.count_flag_marker)
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

impl TunnelProbe {
    /// Probe over libssh2.
    #[must_use]
    pub fn new(count_flag_marker: impl Into<String>, command_timeout: Duration) -> Self {
        Self::with_transport(Arc::new(Ssh2Transport), count_flag_marker, command_timeout)
    }

    #[must_use]
    pub fn with_transport(
        transport: Arc<dyn ShellTransport>,
        count_flag_marker: impl Into<String>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            count_flag_marker: count_flag_marker.into(),
            command_timeout,
        }
    }

    /// The ping command to run on a router of the given kind.
    #[must_use]
    pub fn ping_command(&self, router_kind: &str, rendezvous_ip: IpAddr) -> String {
        let marker = self.count_flag_marker.as_str();
        if !marker.is_empty() && router_kind.contains(marker) {
            format!("ping -c5 {rendezvous_ip}")
        } else {
            format!("ping {rendezvous_ip}")
        }
    }

    /// Check the tunnel behind `record`. `timeout` bounds session setup.
    pub async fn probe(
        &self,
        record: &SiteRecord,
        rendezvous_ip: IpAddr,
        timeout: Duration,
    ) -> ProbeOutcome {
        self.diagnose(record, rendezvous_ip, timeout).await.outcome
    }

    /// Like [`probe`](Self::probe), keeping the remote output.
    pub async fn diagnose(
        &self,
        record: &SiteRecord,
        rendezvous_ip: IpAddr,
        timeout: Duration,
    ) -> Diagnosis {
        let port = match record.parse_ssh_port() {
            Ok(port) => port,
            Err(e) => {
                debug!("Skipping '{}': {}", record.name, e);
                return Diagnosis::bare(ProbeOutcome::InvalidPort);
            }
        };

        if !record.has_address() {
            return Diagnosis::bare(ProbeOutcome::NoAddress);
        }

        if record.router_user.is_empty() || record.router_password.is_empty() {
            return Diagnosis::bare(ProbeOutcome::AuthOrConnectError(
                "router credentials are missing".to_string(),
            ));
        }

        let login = RouterLogin {
            host: record.static_ip.trim().to_string(),
            port,
            user: record.router_user.clone(),
            password: record.router_password.clone(),
        };
        let command = self.ping_command(&record.router_kind, rendezvous_ip);
        let timeouts = SessionTimeouts {
            connect: timeout,
            command: self.command_timeout,
        };

        debug!("Running '{}' on '{}' ({}:{})", command, record.name, login.host, port);
        match self.transport.execute(&login, &command, timeouts).await {
            Ok(output) => {
                let output = output.trim().to_string();
                let outcome = if has_ttl_marker(&output) {
                    ProbeOutcome::Success
                } else {
                    ProbeOutcome::NoResponse
                };
                Diagnosis {
                    outcome,
                    transcript: Some(output),
                }
            }
            Err(e) => {
                warn!("Tunnel check on '{}' failed: {}", record.name, e);
                Diagnosis::bare(ProbeOutcome::AuthOrConnectError(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::net::Ipv4Addr;
    use std::sync::Mutex;

    /// Records issued commands and answers with a canned result.
    struct StubShell {
        reply: Result<String, String>,
        commands: Mutex<Vec<String>>,
        logins: Mutex<Vec<RouterLogin>>,
    }

    impl StubShell {
        fn answering(output: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(output.to_string()),
                commands: Mutex::new(Vec::new()),
                logins: Mutex::new(Vec::new()),
            })
        }

        fn refusing(reason: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(reason.to_string()),
                commands: Mutex::new(Vec::new()),
                logins: Mutex::new(Vec::new()),
            })
        }

        fn commands(&self) -> Vec<String> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ShellTransport for StubShell {
        async fn execute(
            &self,
            login: &RouterLogin,
            command: &str,
            _timeouts: SessionTimeouts,
        ) -> Result<String, TunnelError> {
            self.commands.lock().unwrap().push(command.to_string());
            self.logins.lock().unwrap().push(login.clone());
            self.reply.clone().map_err(TunnelError::Auth)
        }
    }

    const RENDEZVOUS: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 34, 255, 18));
    const TIMEOUT: Duration = Duration::from_secs(5);

    fn probe_with(stub: Arc<StubShell>) -> TunnelProbe {
        TunnelProbe::with_transport(stub, COUNT_FLAG_ROUTER_MARKER, Duration::from_secs(15))
    }

    fn site(kind: &str) -> SiteRecord {
        SiteRecord::new("Site-A")
            .with_static_ip("10.0.0.1")
            .with_ssh_port("22")
            .with_credentials("u", "p")
            .with_router_kind(kind)
    }

    #[tokio::test]
    async fn test_ttl_in_output_is_success() {
        let stub = StubShell::answering("  64 bytes from 10.34.255.18: seq=0 ttl=55 time=40 ms\n");
        let probe = probe_with(stub.clone());
        let diagnosis = probe.diagnose(&site("Generic"), RENDEZVOUS, TIMEOUT).await;
        assert_eq!(diagnosis.outcome, ProbeOutcome::Success);
        assert_eq!(
            diagnosis.transcript.as_deref(),
            Some("64 bytes from 10.34.255.18: seq=0 ttl=55 time=40 ms")
        );

        let logins = stub.logins.lock().unwrap();
        assert_eq!(logins[0].host, "10.0.0.1");
        assert_eq!(logins[0].port, 22);
        assert_eq!(logins[0].user, "u");
    }

    #[tokio::test]
    async fn test_output_without_ttl_is_no_response() {
        let stub = StubShell::answering("5 packets transmitted, 0 received, 100% packet loss");
        let probe = probe_with(stub);
        assert_eq!(
            probe.probe(&site("Generic"), RENDEZVOUS, TIMEOUT).await,
            ProbeOutcome::NoResponse
        );
    }

    #[tokio::test]
    async fn test_count_flag_dialect() {
        let stub = StubShell::answering("ttl=64");
        let probe = probe_with(stub.clone());
        probe.probe(&site("Four Faith F3x36"), RENDEZVOUS, TIMEOUT).await;
        probe.probe(&site("Teltonika RUT955"), RENDEZVOUS, TIMEOUT).await;
        probe.probe(&site("four faith"), RENDEZVOUS, TIMEOUT).await;
        assert_eq!(
            stub.commands(),
            vec![
                "ping -c5 10.34.255.18".to_string(),
                "ping 10.34.255.18".to_string(),
                "ping 10.34.255.18".to_string(),
            ]
        );
    }

    #[test]
    fn test_empty_marker_never_matches() {
        let probe = TunnelProbe::with_transport(StubShell::answering(""), "", TIMEOUT);
        assert_eq!(probe.ping_command("Four Faith", RENDEZVOUS), "ping 10.34.255.18");
    }

    #[tokio::test]
    async fn test_invalid_port_never_connects() {
        let stub = StubShell::answering("ttl=64");
        let probe = probe_with(stub.clone());
        for port in ["abc", "", "0", "65536"] {
            let record = site("Generic").with_ssh_port(port);
            assert_eq!(
                probe.probe(&record, RENDEZVOUS, TIMEOUT).await,
                ProbeOutcome::InvalidPort
            );
        }
        assert!(stub.commands().is_empty());
    }

    #[tokio::test]
    async fn test_port_checked_before_address() {
        let stub = StubShell::answering("ttl=64");
        let probe = probe_with(stub.clone());
        let record = site("Generic").with_static_ip("").with_ssh_port("abc");
        assert_eq!(probe.probe(&record, RENDEZVOUS, TIMEOUT).await, ProbeOutcome::InvalidPort);

        let record = site("Generic").with_static_ip("");
        assert_eq!(probe.probe(&record, RENDEZVOUS, TIMEOUT).await, ProbeOutcome::NoAddress);
        assert!(stub.commands().is_empty());
    }

    #[tokio::test]
    async fn test_missing_credentials_skip_session() {
        let stub = StubShell::answering("ttl=64");
        let probe = probe_with(stub.clone());
        let record = site("Generic").with_credentials("", "p");
        let outcome = probe.probe(&record, RENDEZVOUS, TIMEOUT).await;
        assert!(matches!(outcome, ProbeOutcome::AuthOrConnectError(_)));
        assert!(stub.commands().is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_carries_detail() {
        let stub = StubShell::refusing("bad password");
        let probe = probe_with(stub);
        let outcome = probe.probe(&site("Generic"), RENDEZVOUS, TIMEOUT).await;
        assert_eq!(
            outcome,
            ProbeOutcome::AuthOrConnectError("SSH authentication failed: bad password".to_string())
        );
    }

    #[test]
    fn test_login_debug_hides_password() {
        let login = RouterLogin {
            host: "10.0.0.1".to_string(),
            port: 22,
            user: "admin".to_string(),
            password: "hunter2".to_string(),
        };
        assert!(!format!("{login:?}").contains("hunter2"));
    }

    #[test]
    fn test_command_renders_typed_address() {
        let probe = probe_with(StubShell::answering(""));
        let v6: IpAddr = "fd00::12".parse().unwrap();
        assert_eq!(probe.ping_command("Generic", v6), "ping fd00::12");
        assert!("10.34.255.18; reboot".parse::<IpAddr>().is_err());
    }

    /// Serves scripted chunks; reading past the script is an error.
    struct ScriptedOutput {
        chunks: VecDeque<&'static str>,
        reads: usize,
    }

    impl ScriptedOutput {
        fn new(chunks: &[&'static str]) -> Self {
            Self {
                chunks: chunks.iter().copied().collect(),
                reads: 0,
            }
        }
    }

    impl Read for ScriptedOutput {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads += 1;
            match self.chunks.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(chunk.as_bytes());
                    Ok(chunk.len())
                }
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "no more output")),
            }
        }
    }

    #[test]
    fn test_read_stops_at_first_reply() {
        let mut output = ScriptedOutput::new(&[
            "PING 10.34.255.18 (10.34.255.18): 56 data bytes\n64 bytes from 10.34.255.18: se",
            "q=0 ttl=55 time=40 ms\n",
            "64 bytes from 10.34.255.18: seq=1 ttl=55 time=41 ms\n",
        ]);
        let mut limits = Vec::new();
        let text = read_output(&mut output, Duration::from_secs(15), |left| limits.push(left));
        assert_eq!(output.reads, 2);
        assert!(text.ends_with("seq=0 ttl=55 time=40 ms\n"));
        assert!(limits.iter().all(|left| *left <= Duration::from_secs(15)));
    }

    #[test]
    fn test_read_keeps_output_until_error_or_eof() {
        let mut output = ScriptedOutput::new(&["5 packets transmitted, ", "0 received"]);
        let text = read_output(&mut output, Duration::from_secs(15), |_| {});
        assert_eq!(text, "5 packets transmitted, 0 received");
        assert_eq!(output.reads, 3);

        let mut finished = io::Cursor::new(b"no reply".to_vec());
        assert_eq!(read_output(&mut finished, Duration::from_secs(15), |_| {}), "no reply");
    }

    #[test]
    fn test_time_left_after_deadline() {
        assert_eq!(time_left(Instant::now()), None);
        let left = time_left(Instant::now() + Duration::from_secs(5)).unwrap();
        assert!(left <= Duration::from_secs(5) && left > Duration::from_secs(4));
    }

    fn local_site(port: u16) -> SiteRecord {
        SiteRecord::new("Local")
            .with_static_ip("127.0.0.1")
            .with_ssh_port(port.to_string())
            .with_credentials("u", "p")
            .with_router_kind("Generic")
    }

    #[tokio::test]
    async fn test_refused_port_is_connect_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let probe = TunnelProbe::new(COUNT_FLAG_ROUTER_MARKER, Duration::from_secs(15));

        let started = Instant::now();
        let outcome = probe.probe(&local_site(port), RENDEZVOUS, Duration::from_secs(1)).await;
        assert!(started.elapsed() < Duration::from_secs(3));
        match outcome {
            ProbeOutcome::AuthOrConnectError(detail) => {
                assert!(detail.starts_with("connection failed"), "{detail}");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_silent_server_times_out_in_handshake() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });
        let probe = TunnelProbe::new(COUNT_FLAG_ROUTER_MARKER, Duration::from_secs(15));

        let started = Instant::now();
        let outcome = probe.probe(&local_site(port), RENDEZVOUS, Duration::from_secs(1)).await;
        let elapsed = started.elapsed();
        server.abort();

        assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");
        match outcome {
            ProbeOutcome::AuthOrConnectError(detail) => {
                assert!(detail.starts_with("SSH handshake failed"), "{detail}");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_timeout_millis_bounds() {
        assert_eq!(timeout_millis(Duration::ZERO), 1);
        assert_eq!(timeout_millis(Duration::from_secs(5)), 5000);
        assert_eq!(timeout_millis(Duration::from_secs(u64::MAX)), u32::MAX);
    }
}

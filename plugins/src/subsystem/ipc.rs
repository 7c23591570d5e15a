use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use diagkit_core::config::IpcSubsystemConfig;
use diagkit_core::listener::{OpenedSession, SessionConfig, TracingSubsystem};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::protocol::{encode_line, IpcCommand, IpcResponse};

const MAX_RESPONSE_LINE: u64 = 64 * 1024;

type EventStream = Box<dyn AsyncRead + Unpin + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(String),
    #[cfg(unix)]
    Unix(std::path::PathBuf),
}

impl Endpoint {
    /// `unix:PATH` or anything that looks like a path is a Unix socket; the
    /// rest is `host:port`.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(anyhow!("empty diagnostics endpoint"));
        }
        let path = raw
            .strip_prefix("unix:")
            .or_else(|| raw.starts_with(['/', '.', '~']).then_some(raw));
        match path {
            #[cfg(unix)]
            Some(p) => Ok(Endpoint::Unix(shellexpand::tilde(p).into_owned().into())),
            #[cfg(not(unix))]
            Some(p) => Err(anyhow!("unix socket endpoints are not supported here: {p}")),
            None => Ok(Endpoint::Tcp(raw.to_string())),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
            #[cfg(unix)]
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Tracing subsystem reached over a diagnostics socket.
///
/// Each session is its own connection: one command line, one response
/// line, then the event stream until either side closes.
pub struct IpcTracingSubsystem {
    endpoint: Endpoint,
    connect_timeout: Duration,
}

impl IpcTracingSubsystem {
    pub fn new(cfg: &IpcSubsystemConfig) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::parse(&cfg.endpoint)?,
            connect_timeout: Duration::from_millis(cfg.connect_timeout_ms),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn request(&self, cmd: &IpcCommand) -> Result<(IpcResponse, EventStream)> {
        let fut = async {
            match &self.endpoint {
                Endpoint::Tcp(addr) => {
                    let stream = TcpStream::connect(addr.as_str())
                        .await
                        .with_context(|| format!("connect {}", self.endpoint))?;
                    let _ = stream.set_nodelay(true);
                    exchange(stream, cmd).await
                }
                #[cfg(unix)]
                Endpoint::Unix(path) => {
                    let stream = tokio::net::UnixStream::connect(path)
                        .await
                        .with_context(|| format!("connect {}", self.endpoint))?;
                    exchange(stream, cmd).await
                }
            }
        };
        tokio::time::timeout(self.connect_timeout, fut)
            .await
            .map_err(|_| {
                anyhow!(
                    "diagnostics endpoint {} did not answer within {}ms",
                    self.endpoint,
                    self.connect_timeout.as_millis()
                )
            })?
    }
}

/// Sends `cmd` and reads the response line. The returned reader keeps any
/// bytes buffered past that line.
async fn exchange<S>(
    mut stream: S,
    cmd: &IpcCommand,
) -> Result<(IpcResponse, EventStream)>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    stream.write_all(&encode_line(cmd)?).await?;
    stream.flush().await?;

    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    let n = (&mut reader)
        .take(MAX_RESPONSE_LINE)
        .read_until(b'\n', &mut line)
        .await?;
    if n == 0 {
        return Err(anyhow!("endpoint closed the connection before responding"));
    }
    if line.last() != Some(&b'\n') {
        return Err(anyhow!("response line missing or too long"));
    }
    let resp: IpcResponse =
        serde_json::from_slice(&line).context("malformed endpoint response")?;
    Ok((resp, Box::new(reader)))
}

#[async_trait]
impl TracingSubsystem for IpcTracingSubsystem {
    fn name(&self) -> &str {
        "ipc"
    }

    async fn open_session(&self, pid: u32, config: &SessionConfig) -> Result<OpenedSession> {
        let cmd = IpcCommand::CollectTracing {
            pid,
            config: config.clone(),
        };
        let (resp, stream) = self.request(&cmd).await?;
        let session_id = resp
            .into_result()?
            .ok_or_else(|| anyhow!("endpoint accepted the session without an id"))?;
        tracing::info!(
            endpoint = %self.endpoint,
            pid,
            session_id,
            providers = config.providers.len(),
            "tracing session opened"
        );
        Ok(OpenedSession { session_id, stream })
    }

    async fn stop_session(&self, session_id: u64) -> Result<()> {
        let (resp, _stream) = self.request(&IpcCommand::StopTracing { session_id }).await?;
        resp.into_result()?;
        tracing::debug!(endpoint = %self.endpoint, session_id, "tracing session stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diagkit_core::listener::{
        encode_event_line, EnableOptions, EventCommand, ProviderRegistry, TraceEvent,
    };
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    #[test]
    fn endpoint_parsing() {
        assert_eq!(
            Endpoint::parse("127.0.0.1:9330").unwrap(),
            Endpoint::Tcp("127.0.0.1:9330".into())
        );
        assert!(Endpoint::parse("  ").is_err());
        #[cfg(unix)]
        {
            assert_eq!(
                Endpoint::parse("unix:/tmp/diag.sock").unwrap(),
                Endpoint::Unix("/tmp/diag.sock".into())
            );
            assert_eq!(
                Endpoint::parse("/run/diag.sock").unwrap(),
                Endpoint::Unix("/run/diag.sock".into())
            );
        }
    }

    /// Loopback endpoint: answers `collect_tracing` with session 7 and the
    /// given events (in the same write as the response), and records every
    /// command line it receives.
    async fn spawn_endpoint(
        events: Vec<TraceEvent>,
    ) -> (String, Arc<Mutex<Vec<serde_json::Value>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        tokio::spawn(async move {
            loop {
                let Ok((sock, _)) = listener.accept().await else {
                    return;
                };
                let events = events.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let mut sock = BufReader::new(sock);
                    let mut line = String::new();
                    sock.read_line(&mut line).await.unwrap();
                    let cmd: serde_json::Value = serde_json::from_str(&line).unwrap();
                    log.lock().unwrap().push(cmd.clone());
                    let mut out = Vec::new();
                    match cmd["command"].as_str() {
                        Some("collect_tracing") if cmd["pid"] == 4242 => {
                            out.extend(encode_line(&IpcResponse::ok(Some(7))).unwrap());
                            for ev in &events {
                                out.extend(encode_event_line(ev).into_bytes());
                            }
                        }
                        Some("collect_tracing") => {
                            let resp = IpcResponse::err("no such process");
                            out.extend(encode_line(&resp).unwrap());
                        }
                        _ => out.extend(encode_line(&IpcResponse::ok(None)).unwrap()),
                    }
                    sock.get_mut().write_all(&out).await.unwrap();
                    sock.get_mut().shutdown().await.unwrap();
                });
            }
        });
        (addr, seen)
    }

    fn subsystem(addr: &str) -> IpcTracingSubsystem {
        IpcTracingSubsystem::new(&IpcSubsystemConfig {
            endpoint: addr.to_string(),
            connect_timeout_ms: 2_000,
        })
        .unwrap()
    }

    fn config() -> SessionConfig {
        let mut reg = ProviderRegistry::new();
        reg.apply("App", EventCommand::Enable, Some(EnableOptions::default()));
        reg.session_config(16, true)
    }

    #[tokio::test]
    async fn handshake_keeps_bytes_after_response() {
        let events = vec![TraceEvent::new("App", "One"), TraceEvent::new("App", "Two")];
        let (addr, seen) = spawn_endpoint(events).await;
        let sub = subsystem(&addr);

        let mut opened = sub.open_session(4242, &config()).await.unwrap();
        assert_eq!(opened.session_id, 7);

        let mut rest = String::new();
        opened.stream.read_to_string(&mut rest).await.unwrap();
        let names: Vec<String> = rest
            .lines()
            .map(|l| serde_json::from_str::<TraceEvent>(l).unwrap().event_name)
            .collect();
        assert_eq!(names, vec!["One", "Two"]);

        sub.stop_session(7).await.unwrap();
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0]["config"]["request_rundown"], true);
        assert_eq!(seen[0]["config"]["providers"][0]["name"], "App");
        assert_eq!(seen[1], serde_json::json!({"command": "stop_tracing", "session_id": 7}));
    }

    #[tokio::test]
    async fn refused_session_is_an_error() {
        let (addr, _seen) = spawn_endpoint(Vec::new()).await;
        let err = subsystem(&addr)
            .open_session(1, &config())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no such process"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_fast() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        let err = subsystem(&format!("127.0.0.1:{port}"))
            .open_session(4242, &config())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connect"));
    }
}

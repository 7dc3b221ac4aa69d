//! Local server management
//!
//! Probes the configured compute-backend endpoint, launches the local
//! server process when nothing is listening, and waits (cancellably) for
//! it to become reachable. A process spawned here is never torn down on a
//! failed bootstrap; the shutdown path owns that via [`LocalServer::stop`].

use crate::config::ServerSection;
use crate::tasks::{wait_for_connection, CancelToken, TaskEvent, WaitOutcome};
use crate::{Error, Result};
use log::{info, warn};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::process::{Child, Command};
use std::sync::mpsc::Sender;
use std::time::Duration;

/// Attempt a TCP connection to `host:port`, trying every resolved address.
///
/// The last connect error is preserved so callers can dispatch on its kind.
pub fn try_connect(host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
    let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses resolved")
    }))
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match path.metadata() {
            Ok(metadata) => metadata.permissions().mode() & 0o111 != 0,
            Err(_) => false,
        }
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

/// Handle on the local compute-backend server endpoint.
///
/// Tracks connection state and owns the child process when this shell
/// launched the server itself.
#[derive(Debug)]
pub struct LocalServer {
    host: String,
    port: u16,
    connect_timeout: Duration,
    connected: bool,
    process: Option<Child>,
}

impl LocalServer {
    pub fn new(settings: &ServerSection) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
            connected: false,
            process: None,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    /// Whether this shell spawned a server process that is still attached
    pub fn has_process(&self) -> bool {
        self.process.is_some()
    }

    /// Probe the endpoint with a plain TCP connect
    pub fn connect(&mut self) -> io::Result<()> {
        try_connect(&self.host, self.port, self.connect_timeout)?;
        self.connected = true;
        Ok(())
    }

    /// Drop the connected state and probe again
    pub fn reconnect(&mut self) -> io::Result<()> {
        self.connected = false;
        self.connect()
    }

    /// Launch the server process detached, at most once per handle
    pub fn start(&mut self, path: &Path) -> Result<()> {
        if self.process.is_some() {
            return Ok(());
        }
        info!(
            "starting local server {} on {}:{}",
            path.display(),
            self.host,
            self.port
        );
        let child = Command::new(path)
            .arg("--host")
            .arg(&self.host)
            .arg("--port")
            .arg(self.port.to_string())
            .spawn()
            .map_err(|e| Error::SpawnFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
        self.process = Some(child);
        Ok(())
    }

    /// Stop a server process this shell spawned. No-op otherwise.
    pub fn stop(&mut self, wait: bool) {
        if let Some(mut child) = self.process.take() {
            info!("stopping local server process (pid {})", child.id());
            if let Err(e) = child.kill() {
                warn!("could not kill local server process: {}", e);
            }
            if wait {
                let _ = child.wait();
            }
        }
        self.connected = false;
    }
}

/// Phase of a bootstrap run, for progress display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootstrapPhase {
    #[default]
    CheckBindable,
    AlreadyRunning,
    Starting,
    WaitingForConnect,
    Connected,
    Failed,
}

/// State of one bootstrap run
#[derive(Debug, Clone, Default)]
pub struct BootstrapAttempt {
    pub host: String,
    pub port: u16,
    pub phase: BootstrapPhase,
    pub last_error: Option<String>,
}

/// How a bootstrap run ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// The endpoint was already connected; nothing to do
    AlreadyConnected,
    /// An external server process is already serving this endpoint
    AlreadyRunning,
    /// We spawned a server and connected to it
    Started,
    /// Nothing is listening and auto-start is disabled
    Skipped,
}

/// Startup sequence that makes the local server reachable, spawning one if
/// configuration allows it.
#[derive(Debug)]
pub struct LocalServerBootstrap {
    settings: ServerSection,
    attempt: BootstrapAttempt,
}

impl LocalServerBootstrap {
    pub fn new(settings: ServerSection) -> Self {
        let attempt = BootstrapAttempt {
            host: settings.host.clone(),
            port: settings.port,
            ..Default::default()
        };
        Self { settings, attempt }
    }

    pub fn attempt(&self) -> &BootstrapAttempt {
        &self.attempt
    }

    fn fail(&mut self, error: Error) -> Error {
        self.attempt.phase = BootstrapPhase::Failed;
        self.attempt.last_error = Some(error.to_string());
        error
    }

    /// Run the bootstrap sequence once.
    ///
    /// Spawns at most one child process through `server` and never kills
    /// it, even when a later step fails. Cancellation applies to the
    /// wait-for-connect step only.
    pub fn run(
        &mut self,
        server: &mut LocalServer,
        token: &CancelToken,
        events: Option<&Sender<TaskEvent>>,
    ) -> Result<BootstrapOutcome> {
        let host = self.settings.host.clone();
        let port = self.settings.port;

        if server.connected() {
            self.attempt.phase = BootstrapPhase::AlreadyRunning;
            return Ok(BootstrapOutcome::AlreadyConnected);
        }

        // check the local address still exists on this machine
        self.attempt.phase = BootstrapPhase::CheckBindable;
        if let Err(e) = TcpListener::bind((host.as_str(), 0)) {
            return Err(self.fail(Error::HostUnreachable { host, source: e }));
        }

        match server.connect() {
            Ok(()) => {
                info!("using an already started local server on {}:{}", host, port);
                self.attempt.phase = BootstrapPhase::AlreadyRunning;
                return Ok(BootstrapOutcome::AlreadyRunning);
            }
            Err(e) if e.kind() != io::ErrorKind::ConnectionRefused => {
                // a foreign process answers (or the endpoint misbehaves);
                // do not start a server on top of it
                return Err(self.fail(Error::PortConflict { host, port }));
            }
            Err(_) => {
                // nothing listening, we may start our own server
            }
        }

        if !self.settings.auto_start {
            warn!(
                "no local server is running on {}:{} and auto-start is disabled",
                host, port
            );
            return Ok(BootstrapOutcome::Skipped);
        }

        let path = match self.settings.path.clone() {
            Some(path) => path,
            None => {
                info!("no local server is configured");
                return Err(self.fail(Error::NoServerConfigured));
            }
        };
        if !path.is_file() {
            return Err(self.fail(Error::ServerBinaryMissing(path)));
        }
        if !is_executable(&path) {
            return Err(self.fail(Error::ServerBinaryNotExecutable(path)));
        }

        self.attempt.phase = BootstrapPhase::Starting;
        if let Err(e) = server.start(&path) {
            return Err(self.fail(e));
        }

        self.attempt.phase = BootstrapPhase::WaitingForConnect;
        let wait = wait_for_connection(
            &host,
            port,
            Duration::from_secs(self.settings.connect_timeout_secs),
            Duration::from_secs(self.settings.wait_timeout_secs),
            token,
            events,
        );
        if wait == WaitOutcome::Cancelled {
            return Err(self.fail(Error::Cancelled));
        }

        // final explicit reconnect; a timeout above surfaces here too
        if let Err(e) = server.reconnect() {
            return Err(self.fail(Error::HandshakeFailed {
                host,
                port,
                source: e,
            }));
        }

        self.attempt.phase = BootstrapPhase::Connected;
        Ok(BootstrapOutcome::Started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn test_settings(port: u16) -> ServerSection {
        ServerSection {
            host: "127.0.0.1".to_string(),
            port,
            path: None,
            auto_start: true,
            connect_timeout_secs: 1,
            wait_timeout_secs: 1,
        }
    }

    fn free_port() -> u16 {
        // bind then drop; the port stays free long enough for a test
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_try_connect_refused() {
        let port = free_port();
        let err = try_connect("127.0.0.1", port, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }

    #[test]
    fn test_bootstrap_already_running_spawns_nothing() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let settings = test_settings(port);
        let mut server = LocalServer::new(&settings);
        let mut bootstrap = LocalServerBootstrap::new(settings);

        let outcome = bootstrap
            .run(&mut server, &CancelToken::new(), None)
            .unwrap();
        assert_eq!(outcome, BootstrapOutcome::AlreadyRunning);
        assert_eq!(bootstrap.attempt().phase, BootstrapPhase::AlreadyRunning);
        assert!(server.connected());
        assert!(!server.has_process());
    }

    #[test]
    fn test_bootstrap_already_connected_is_a_noop() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let settings = test_settings(port);
        let mut server = LocalServer::new(&settings);
        server.connect().unwrap();
        let mut bootstrap = LocalServerBootstrap::new(settings);

        let outcome = bootstrap
            .run(&mut server, &CancelToken::new(), None)
            .unwrap();
        assert_eq!(outcome, BootstrapOutcome::AlreadyConnected);
    }

    #[test]
    fn test_bootstrap_skipped_when_auto_start_disabled() {
        let mut settings = test_settings(free_port());
        settings.auto_start = false;

        let mut server = LocalServer::new(&settings);
        let mut bootstrap = LocalServerBootstrap::new(settings);

        let outcome = bootstrap
            .run(&mut server, &CancelToken::new(), None)
            .unwrap();
        assert_eq!(outcome, BootstrapOutcome::Skipped);
        assert!(!server.has_process());
    }

    #[test]
    fn test_bootstrap_no_server_configured() {
        let settings = test_settings(free_port());
        let mut server = LocalServer::new(&settings);
        let mut bootstrap = LocalServerBootstrap::new(settings);

        let err = bootstrap
            .run(&mut server, &CancelToken::new(), None)
            .unwrap_err();
        assert!(matches!(err, Error::NoServerConfigured));
        assert_eq!(bootstrap.attempt().phase, BootstrapPhase::Failed);
        assert!(!server.has_process());
    }

    #[test]
    fn test_bootstrap_binary_missing() {
        let mut settings = test_settings(free_port());
        settings.path = Some("/nonexistent/netlab-server".into());

        let mut server = LocalServer::new(&settings);
        let mut bootstrap = LocalServerBootstrap::new(settings);

        let err = bootstrap
            .run(&mut server, &CancelToken::new(), None)
            .unwrap_err();
        assert!(matches!(err, Error::ServerBinaryMissing(_)));
    }

    #[test]
    fn test_bootstrap_host_unreachable() {
        // TEST-NET-3 address, not bindable on this machine
        let mut settings = test_settings(free_port());
        settings.host = "203.0.113.1".to_string();

        let mut server = LocalServer::new(&settings);
        let mut bootstrap = LocalServerBootstrap::new(settings);

        let err = bootstrap
            .run(&mut server, &CancelToken::new(), None)
            .unwrap_err();
        assert!(matches!(err, Error::HostUnreachable { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_bootstrap_binary_not_executable() {
        use tempfile::tempdir;

        let dir = tempdir().unwrap();
        let binary = dir.path().join("netlab-server");
        std::fs::write(&binary, "#!/bin/sh\n").unwrap();

        let mut settings = test_settings(free_port());
        settings.path = Some(binary);

        let mut server = LocalServer::new(&settings);
        let mut bootstrap = LocalServerBootstrap::new(settings);

        let err = bootstrap
            .run(&mut server, &CancelToken::new(), None)
            .unwrap_err();
        assert!(matches!(err, Error::ServerBinaryNotExecutable(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_bootstrap_spawns_then_reports_handshake_failure() {
        use std::os::unix::fs::PermissionsExt;
        use tempfile::tempdir;

        let dir = tempdir().unwrap();
        let binary = dir.path().join("netlab-server");
        // a "server" that never listens
        std::fs::write(&binary, "#!/bin/sh\nsleep 5\n").unwrap();
        let mut permissions = std::fs::metadata(&binary).unwrap().permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(&binary, permissions).unwrap();

        let mut settings = test_settings(free_port());
        settings.path = Some(binary);
        settings.wait_timeout_secs = 1;

        let mut server = LocalServer::new(&settings);
        let mut bootstrap = LocalServerBootstrap::new(settings);

        let err = bootstrap
            .run(&mut server, &CancelToken::new(), None)
            .unwrap_err();
        assert!(matches!(err, Error::HandshakeFailed { .. }));
        // the spawned process is left to the shutdown path
        assert!(server.has_process());
        server.stop(true);
        assert!(!server.has_process());
    }
}

//! In-process SSH servers for transport tests
//!
//! Each server accepts password logins for one user, answers `exec`
//! requests from a small command table and, when started as a relay,
//! forwards `direct-tcpip` channels. Everything it sees is appended to a
//! shared log so tests can assert on what reached which host.

use russh::keys::{Algorithm, PrivateKey};
use russh::server::{Auth, Config, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// Exit status of the `fail` command
pub const FAIL_STATUS: u32 = 3;

/// Shared record of what one server saw
#[derive(Debug, Clone, Default)]
pub struct ServerLog(Arc<Mutex<Vec<String>>>);

impl ServerLog {
    fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.lock().unwrap().iter().any(|e| e == entry)
    }

    /// Wait up to `grace` for `entry` to be logged
    pub async fn wait_for(&self, entry: &str, grace: Duration) -> bool {
        let seen = async {
            while !self.contains(entry) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(grace, seen).await.is_ok()
    }
}

/// A running test server
#[derive(Debug, Clone)]
pub struct TestServer {
    pub addr: String,
    pub user: &'static str,
    pub password: &'static str,
    pub log: ServerLog,
    accepts: Arc<AtomicUsize>,
}

impl TestServer {
    /// Server that only runs commands
    pub async fn start(name: &'static str, user: &'static str, password: &'static str) -> Self {
        Self::spawn(name, user, password, false).await
    }

    /// Server that also forwards `direct-tcpip` channels
    pub async fn start_relay(
        name: &'static str,
        user: &'static str,
        password: &'static str,
    ) -> Self {
        Self::spawn(name, user, password, true).await
    }

    /// TCP connections accepted so far
    pub fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    async fn spawn(
        name: &'static str,
        user: &'static str,
        password: &'static str,
        relay: bool,
    ) -> Self {
        let key = PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519).unwrap();
        let config = Arc::new(Config {
            keys: vec![key],
            auth_rejection_time: Duration::from_millis(10),
            auth_rejection_time_initial: Some(Duration::ZERO),
            ..Default::default()
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Self {
            addr: listener.local_addr().unwrap().to_string(),
            user,
            password,
            log: ServerLog::default(),
            accepts: Arc::new(AtomicUsize::new(0)),
        };

        let accepting = server.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accepting.accepts.fetch_add(1, Ordering::SeqCst);
                let handler = TestHandler {
                    name,
                    user,
                    password,
                    relay,
                    log: accepting.log.clone(),
                };
                let config = config.clone();
                let log = accepting.log.clone();
                tokio::spawn(async move {
                    let ended = match russh::server::run_stream(config, socket, handler).await {
                        Ok(session) => session.await,
                        Err(e) => Err(e),
                    };
                    match ended {
                        Ok(()) | Err(russh::Error::Disconnect) => {
                            log.push(format!("{} ended clean", name))
                        }
                        Err(e) => log.push(format!("{} ended {}", name, e)),
                    }
                });
            }
        });

        server
    }
}

struct TestHandler {
    name: &'static str,
    user: &'static str,
    password: &'static str,
    relay: bool,
    log: ServerLog,
}

impl TestHandler {
    /// Answer one command line the way a shell would
    fn exec(&self, channel_id: ChannelId, command: &str, session: &mut Session) {
        let _ = session.channel_success(channel_id);
        match command {
            "fail" => {
                let _ = session.extended_data(channel_id, 1, CryptoVec::from_slice(b"boom"));
                let _ = session.exit_status_request(channel_id, FAIL_STATUS);
            }
            // ends without reporting how
            "vanish" => {}
            other => {
                let _ = session.data(channel_id, CryptoVec::from_slice(other.as_bytes()));
                let _ = session.exit_status_request(channel_id, 0);
            }
        }
        let _ = session.eof(channel_id);
        let _ = session.close(channel_id);
    }
}

impl russh::server::Handler for TestHandler {
    type Error = russh::Error;

    fn auth_password(
        &mut self,
        user: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<Auth, Self::Error>> + Send {
        self.log
            .push(format!("{} auth {} {}", self.name, user, password));
        let auth = if user == self.user && password == self.password {
            Auth::Accept
        } else {
            Auth::Reject {
                proceed_with_methods: None,
                partial_success: false,
            }
        };
        async move { Ok(auth) }
    }

    fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> impl std::future::Future<Output = Result<bool, Self::Error>> + Send {
        async { Ok(true) }
    }

    fn exec_request(
        &mut self,
        channel_id: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send {
        let command = String::from_utf8_lossy(data).into_owned();
        self.log.push(format!("{} exec {}", self.name, command));
        self.exec(channel_id, &command, session);
        async { Ok(()) }
    }

    fn channel_open_direct_tcpip(
        &mut self,
        channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> impl std::future::Future<Output = Result<bool, Self::Error>> + Send {
        let target = format!("{}:{}", host_to_connect, port_to_connect);
        self.log.push(format!("{} tunnel {}", self.name, target));
        let relay = self.relay;
        if relay {
            tokio::spawn(async move {
                let Ok(mut upstream) = TcpStream::connect(&target).await else {
                    return;
                };
                let mut stream = channel.into_stream();
                let _ = tokio::io::copy_bidirectional(&mut stream, &mut upstream).await;
            });
        }
        async move { Ok(relay) }
    }
}

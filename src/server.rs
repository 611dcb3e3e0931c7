//! TCP acceptor for file-sharing sessions.
//!
//! Each accepted connection gets its own task and its own `Session`. The
//! user directory and file catalog are shared read-only.

use crate::config::Config;
use crate::protocol::{handle_connection, Session};
use crate::storage::{FileCatalog, UserDirectory};
use std::future::Future;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Server instance
pub struct Server {
    config: Config,
    users: Arc<UserDirectory>,
    catalog: Arc<FileCatalog>,
    session_limit: Arc<Semaphore>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config, users: Arc<UserDirectory>, catalog: Arc<FileCatalog>) -> Self {
        let session_limit = Arc::new(Semaphore::new(config.max_sessions));
        Server {
            config,
            users,
            catalog,
            session_limit,
        }
    }

    /// Bind, then serve until an interrupt signal arrives.
    pub async fn run(&self) -> io::Result<()> {
        let listener = bind(&self.config.listen, self.config.backlog)?;
        info!(address = %listener.local_addr()?, "Server listening");

        self.serve(listener, shutdown_signal()).await
    }

    /// Accept sessions on `listener` until `shutdown` resolves.
    ///
    /// A session slot is taken before accepting, so with `max_sessions = 1`
    /// the next client waits in the listen backlog until the current session
    /// has fully finished.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut sessions = JoinSet::new();

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = self.session_limit.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
            };

            while sessions.try_join_next().is_some() {}

            let session = Session::new(Arc::clone(&self.users), Arc::clone(&self.catalog));
            let span = info_span!("session", peer = %peer);

            sessions.spawn(
                async move {
                    debug!("New connection");
                    if let Err(e) = handle_connection(stream, session).await {
                        debug!(error = %e, "Connection error");
                    }
                    drop(permit);
                }
                .instrument(span),
            );
        }

        info!("Shutting down server");
        drop(listener);
        self.drain(sessions).await;
        Ok(())
    }

    /// Let in-flight sessions finish, up to the configured timeout.
    async fn drain(&self, mut sessions: JoinSet<()>) {
        if sessions.is_empty() {
            return;
        }

        let timeout = Duration::from_secs(self.config.shutdown_timeout);
        info!(
            in_flight = sessions.len(),
            timeout_secs = self.config.shutdown_timeout,
            "Waiting for sessions to finish"
        );

        let drained =
            tokio::time::timeout(timeout, async { while sessions.join_next().await.is_some() {} })
                .await;

        if drained.is_err() {
            warn!(remaining = sessions.len(), "Aborting unfinished sessions");
            sessions.shutdown().await;
        }
    }
}

/// Create the listening socket with an explicit backlog.
fn bind(listen: &str, backlog: i32) -> io::Result<TcpListener> {
    let addr: SocketAddr = listen.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no address for '{listen}'"),
        )
    })?;

    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    TcpListener::from_std(socket.into())
}

/// Resolves on Ctrl-C / SIGINT.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for interrupt signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    struct TestServer {
        addr: SocketAddr,
        stop: Option<oneshot::Sender<()>>,
        handle: JoinHandle<io::Result<()>>,
        shutdown_timeout: u64,
        _dir: TempDir,
    }

    impl TestServer {
        async fn start(max_sessions: usize, shutdown_timeout: u64) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let files_dir = dir.path().join("files");
            fs::create_dir(&files_dir).unwrap();
            fs::write(files_dir.join("a.txt"), "hello").unwrap();
            let users_file = dir.path().join("users.txt");
            fs::write(&users_file, "alice\ncarol\n").unwrap();

            let config = Config {
                listen: "127.0.0.1:0".to_string(),
                users_file: users_file.clone(),
                files_dir: files_dir.clone(),
                backlog: 8,
                max_sessions,
                workers: None,
                shutdown_timeout,
                log_level: "info".to_string(),
            };

            let listener = bind(&config.listen, config.backlog).unwrap();
            let addr = listener.local_addr().unwrap();
            let users = UserDirectory::load(&users_file).unwrap();
            let server = Server::new(config, users, FileCatalog::new(&files_dir));

            let (stop, stopped) = oneshot::channel::<()>();
            let handle = tokio::spawn(async move {
                server
                    .serve(listener, async {
                        let _ = stopped.await;
                    })
                    .await
            });

            TestServer {
                addr,
                stop: Some(stop),
                handle,
                shutdown_timeout,
                _dir: dir,
            }
        }

        async fn stop(mut self) {
            if let Some(stop) = self.stop.take() {
                let _ = stop.send(());
            }
            // The drain may take the whole shutdown timeout.
            let limit = Duration::from_secs(self.shutdown_timeout + 5);
            tokio::time::timeout(limit, &mut self.handle)
                .await
                .expect("server did not stop")
                .unwrap()
                .unwrap();
        }
    }

    struct Client {
        reader: BufReader<TcpStream>,
    }

    impl Client {
        async fn connect(addr: SocketAddr) -> Self {
            let stream = TcpStream::connect(addr).await.unwrap();
            Client {
                reader: BufReader::new(stream),
            }
        }

        async fn send(&mut self, line: &str) {
            self.reader
                .get_mut()
                .write_all(format!("{line}\n").as_bytes())
                .await
                .unwrap();
        }

        async fn recv(&mut self) -> String {
            let mut line = String::new();
            self.reader.read_line(&mut line).await.unwrap();
            line
        }

        async fn request(&mut self, line: &str) -> String {
            self.send(line).await;
            self.recv().await
        }

        async fn is_closed(&mut self) -> bool {
            let mut rest = Vec::new();
            matches!(
                tokio::time::timeout(Duration::from_secs(5), self.reader.read_to_end(&mut rest)).await,
                Ok(Ok(0))
            )
        }
    }

    #[tokio::test]
    async fn test_end_to_end_session() {
        let server = TestServer::start(4, 5).await;
        let mut client = Client::connect(server.addr).await;

        assert_eq!(client.request("1 CUMP alice").await, "1 OK\n");
        assert_eq!(client.request("2 LIST").await, "2 ARQS 1 a.txt\n");
        assert_eq!(client.request("3 PEGA a.txt").await, "3 ARQ 5 hello\n");
        assert_eq!(client.request("4 PEGA b.txt").await, "4 NOK\n");
        assert_eq!(client.request("5 TERM").await, "5 OK\n");
        assert!(client.is_closed().await);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_unknown_user_is_disconnected() {
        let server = TestServer::start(4, 5).await;
        let mut client = Client::connect(server.addr).await;

        assert_eq!(client.request("1 CUMP bob").await, "1 NOK\n");
        assert!(client.is_closed().await);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_unterminated_request_before_half_close() {
        let server = TestServer::start(4, 5).await;
        let mut client = Client::connect(server.addr).await;

        assert_eq!(client.request("1 CUMP alice").await, "1 OK\n");
        client.reader.get_mut().write_all(b"2 TERM").await.unwrap();
        client.reader.get_mut().shutdown().await.unwrap();
        assert_eq!(client.recv().await, "2 OK\n");

        server.stop().await;
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let server = TestServer::start(4, 5).await;
        let mut first = Client::connect(server.addr).await;
        let mut second = Client::connect(server.addr).await;

        assert_eq!(first.request("10 CUMP alice").await, "10 OK\n");
        assert_eq!(second.request("20 LIST").await, "20 NOK\n");
        assert!(second.is_closed().await);
        assert_eq!(first.request("11 LIST").await, "11 ARQS 1 a.txt\n");
        assert_eq!(first.request("12 TERM").await, "12 OK\n");

        server.stop().await;
    }

    #[tokio::test]
    async fn test_single_session_limit_is_sequential() {
        let server = TestServer::start(1, 5).await;
        let mut first = Client::connect(server.addr).await;
        assert_eq!(first.request("1 CUMP alice").await, "1 OK\n");

        let mut second = Client::connect(server.addr).await;
        second.send("1 CUMP carol").await;
        let waited = tokio::time::timeout(Duration::from_millis(200), second.recv()).await;
        assert!(waited.is_err(), "second session served while first active");

        assert_eq!(first.request("2 TERM").await, "2 OK\n");
        assert_eq!(second.recv().await, "1 OK\n");
        assert_eq!(second.request("2 TERM").await, "2 OK\n");
        assert!(second.is_closed().await);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_shutdown_aborts_in_flight_sessions() {
        let server = TestServer::start(4, 0).await;
        let mut client = Client::connect(server.addr).await;
        assert_eq!(client.request("1 CUMP alice").await, "1 OK\n");

        server.stop().await;
        assert!(client.is_closed().await);
    }

    #[tokio::test]
    async fn test_shutdown_drains_in_flight_sessions() {
        let server = TestServer::start(4, 5).await;
        let mut client = Client::connect(server.addr).await;
        assert_eq!(client.request("1 CUMP alice").await, "1 OK\n");

        let addr = server.addr;
        let stopping = tokio::spawn(server.stop());
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Still served while draining, but no new connections are accepted.
        assert_eq!(client.request("2 PEGA a.txt").await, "2 ARQ 5 hello\n");
        assert_eq!(client.request("3 TERM").await, "3 OK\n");
        stopping.await.unwrap();
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_stop_waits_out_drain_of_idle_session() {
        let server = TestServer::start(4, 1).await;
        let mut client = Client::connect(server.addr).await;
        assert_eq!(client.request("1 CUMP alice").await, "1 OK\n");

        // Client stays logged in; stop returns once the drain gives up.
        server.stop().await;
        assert!(client.is_closed().await);
    }
}

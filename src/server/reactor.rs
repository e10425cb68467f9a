use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, error, info, trace, warn};

use crate::config::Config;
use crate::handler::Handler;
use crate::http::connection::{Connection, Step};
use crate::server::closed::ClosedSet;
use crate::server::listener;
use crate::server::poller::{Event, Interest, Poller};

/// Longest the loop waits before re-checking the shutdown flag.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(1);

struct Listener {
    socket: TcpListener,
    /// Index into `Config::servers`
    server: usize,
}

struct Client {
    conn: Connection<TcpStream>,
    /// Interest currently registered with the poller
    interest: Interest,
}

/// Single-threaded event loop owning every socket.
///
/// Listening sockets and client connections are keyed by descriptor. The
/// loop waits on the poller, accepts on ready listeners, and drives client
/// connections through read, dispatch and write without ever blocking on
/// one of them (script execution excepted).
pub struct Server {
    config: Arc<Config>,
    handler: Box<dyn Handler>,
    poller: Poller,
    listeners: HashMap<RawFd, Listener>,
    clients: HashMap<RawFd, Client>,
    closed: ClosedSet,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    /// Binds every configured server and registers the listeners.
    pub fn bind(config: Arc<Config>, handler: Box<dyn Handler>) -> Result<Self> {
        let mut poller = Poller::new().context("failed to create poller")?;
        let mut listeners = HashMap::new();

        for (index, server) in config.servers.iter().enumerate() {
            let socket = listener::bind(server)?;
            let fd = socket.as_raw_fd();
            poller
                .register(fd, Interest::READABLE)
                .with_context(|| format!("failed to register listener {}", server.addr()))?;
            listeners.insert(fd, Listener { socket, server: index });
        }

        Ok(Self {
            config,
            handler,
            poller,
            listeners,
            clients: HashMap::new(),
            closed: ClosedSet::default(),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that stops [`Server::run`] once set. Signal handlers write to it.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Addresses actually bound, in configuration order.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        let mut bound: Vec<_> = self
            .listeners
            .values()
            .filter_map(|l| l.socket.local_addr().ok().map(|addr| (l.server, addr)))
            .collect();
        bound.sort_by_key(|(server, _)| *server);
        bound.into_iter().map(|(_, addr)| addr).collect()
    }

    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }

    /// Serves until the shutdown flag is set.
    pub fn run(&mut self) -> Result<()> {
        info!(listeners = self.listeners.len(), "server started");

        while !self.shutdown.load(Ordering::Relaxed) {
            self.poll_once(Some(POLL_TIMEOUT));
        }

        info!(open_connections = self.clients.len(), "shutting down");
        Ok(())
    }

    /// One wait plus the handling of whatever it returned. Poller failures
    /// are logged and the iteration is skipped.
    pub fn poll_once(&mut self, timeout: Option<Duration>) {
        match self.poller.wait(timeout) {
            Ok(events) => self.process_events(&events),
            Err(e) => error!(error = %e, "poll failed"),
        }
    }

    pub fn process_events(&mut self, events: &[Event]) {
        self.closed.evict_expired(Instant::now());

        for event in events {
            if self.closed.contains(event.fd) {
                trace!(fd = event.fd, "skipping event for closed descriptor");
                continue;
            }

            if self.listeners.contains_key(&event.fd) {
                self.accept_all(event.fd);
            } else if self.clients.contains_key(&event.fd) {
                self.drive_client(event);
            } else {
                trace!(fd = event.fd, "event for unknown descriptor");
            }
        }
    }

    fn accept_all(&mut self, listener_fd: RawFd) {
        loop {
            let (accepted, server) = match self.listeners.get(&listener_fd) {
                Some(l) => (l.socket.accept(), l.server),
                None => return,
            };

            match accepted {
                Ok((stream, peer)) => self.add_client(stream, peer, server),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(fd = listener_fd, error = %e, "accept failed");
                    return;
                }
            }
        }
    }

    fn add_client(&mut self, stream: TcpStream, peer: SocketAddr, server: usize) {
        if let Err(e) = stream.set_nonblocking(true) {
            warn!(%peer, error = %e, "failed to make connection non-blocking");
            return;
        }

        let fd = stream.as_raw_fd();
        if let Err(e) = self.poller.register(fd, Interest::READABLE) {
            warn!(%peer, fd, error = %e, "failed to register connection");
            return;
        }

        self.closed.forget(fd);
        debug!(%peer, fd, "accepted connection");
        self.clients.insert(
            fd,
            Client {
                conn: Connection::new(stream, server, Some(peer)),
                interest: Interest::READABLE,
            },
        );
    }

    fn drive_client(&mut self, event: &Event) {
        let Some(client) = self.clients.get_mut(&event.fd) else {
            return;
        };
        let server = &self.config.servers[client.conn.server()];

        let handler = self.handler.as_ref();
        let step = if event.is_readable() {
            client.conn.on_readable(server, handler)
        } else if event.is_writable() {
            client.conn.on_writable(server, handler)
        } else {
            Step::KeepOpen
        };

        match step {
            Step::Close => self.close_connection(event.fd),
            Step::KeepOpen => self.update_interest(event.fd),
        }
    }

    /// A connection with output pending only waits for write readiness, so
    /// a peer that stops reading also stops being read from.
    fn update_interest(&mut self, fd: RawFd) {
        let Some(client) = self.clients.get_mut(&fd) else {
            return;
        };

        let wanted = if client.conn.wants_write() {
            Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        if wanted == client.interest {
            return;
        }

        match self.poller.modify(fd, wanted) {
            Ok(()) => {
                trace!(fd, interest = ?wanted, "interest changed");
                client.interest = wanted;
            }
            Err(e) => {
                warn!(fd, error = %e, "failed to change interest");
                self.close_connection(fd);
            }
        }
    }

    /// Closing an fd that is already closed does nothing.
    pub fn close_connection(&mut self, fd: RawFd) {
        let Some(client) = self.clients.remove(&fd) else {
            return;
        };

        if let Err(e) = self.poller.unregister(fd) {
            debug!(fd, error = %e, "failed to unregister connection");
        }
        self.closed.mark(fd);
        debug!(
            fd,
            peer = ?client.conn.peer(),
            unsent = client.conn.pending_output(),
            unparsed = client.conn.buffered_input(),
            "connection closed"
        );
        drop(client);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RouteConfig, ServerConfig};
    use crate::handler::DefaultHandler;
    use std::collections::BTreeMap;
    use std::thread;

    fn test_server() -> Server {
        server_with_root(ServerConfig::default().root)
    }

    fn server_with_root(root: std::path::PathBuf) -> Server {
        let config = Arc::new(Config {
            servers: vec![ServerConfig {
                port: 0,
                root,
                routes: vec![RouteConfig::new("/")],
                ..ServerConfig::default()
            }],
            cgi: BTreeMap::new(),
        });
        let handler = DefaultHandler::new(&config);
        Server::bind(config, Box::new(handler)).unwrap()
    }

    fn accept_one(server: &mut Server) -> RawFd {
        for _ in 0..100 {
            server.poll_once(Some(Duration::from_millis(20)));
            if let Some(fd) = server.clients.keys().next() {
                return *fd;
            }
        }
        panic!("connection was never accepted");
    }

    #[test]
    fn duplicate_events_after_close_are_ignored() {
        let mut server = test_server();
        let addr = server.local_addrs()[0];

        let client = TcpStream::connect(addr).unwrap();
        let fd = accept_one(&mut server);
        drop(client);
        thread::sleep(Duration::from_millis(50));

        let batch = [
            Event::new(fd, Interest::READABLE),
            Event::new(fd, Interest::READABLE | Interest::WRITABLE),
        ];
        server.process_events(&batch);

        assert_eq!(server.connection_count(), 0);
        assert!(server.closed.contains(fd));

        server.close_connection(fd);
        assert_eq!(server.connection_count(), 0);
    }

    #[test]
    fn reused_descriptor_is_forgotten_on_accept() {
        let mut server = test_server();
        let addr = server.local_addrs()[0];

        let first = TcpStream::connect(addr).unwrap();
        let fd = accept_one(&mut server);
        server.close_connection(fd);
        drop(first);
        assert!(server.closed.contains(fd));

        let _second = TcpStream::connect(addr).unwrap();
        let reused = accept_one(&mut server);
        if reused == fd {
            assert!(!server.closed.contains(fd));
        }
    }

    #[test]
    fn pending_output_switches_interest_to_writable_and_back() {
        use std::io::{Read, Write};

        let root = tempfile::tempdir().unwrap();
        let size = 32 * 1024 * 1024;
        std::fs::write(root.path().join("big.bin"), vec![7u8; size]).unwrap();
        let mut server = server_with_root(root.path().to_path_buf());
        let addr = server.local_addrs()[0];

        let mut client = TcpStream::connect(addr).unwrap();
        let fd = accept_one(&mut server);
        client.write_all(b"GET /big.bin HTTP/1.1\r\n\r\n").unwrap();

        for _ in 0..50 {
            server.poll_once(Some(Duration::from_millis(20)));
            if server.clients[&fd].interest == Interest::WRITABLE {
                break;
            }
        }
        assert_eq!(server.clients[&fd].interest, Interest::WRITABLE);

        let reader = thread::spawn(move || {
            let mut received = 0;
            let mut buf = [0u8; 64 * 1024];
            while received < size {
                let n = client.read(&mut buf).unwrap();
                assert!(n > 0);
                received += n;
            }
            client
        });

        for _ in 0..500 {
            server.poll_once(Some(Duration::from_millis(20)));
            if server.clients[&fd].interest == Interest::READABLE {
                break;
            }
        }
        assert_eq!(server.clients[&fd].interest, Interest::READABLE);
        assert_eq!(server.clients[&fd].conn.pending_output(), 0);
        drop(reader.join().unwrap());
    }
}

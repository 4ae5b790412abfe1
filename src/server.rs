//! TCP server for handling client connections.
//!
//! Owns the listening socket and the accept loop. Every accepted connection
//! runs in its own task; `stop()` closes the listener and waits until all
//! connection tasks have finished.

use crate::config::Config;
use crate::protocols::resp::handler::{handle_connection, server_stopping};
use crate::storage::Storage;
use socket2::{Domain, SockAddr, Socket, Type};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Listener lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Listening,
    /// Listener closed, waiting for connections to finish
    Draining,
}

/// Server startup errors
#[derive(Debug)]
pub enum ServerError {
    AlreadyRunning,
    Bind { addr: String, source: io::Error },
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::AlreadyRunning => write!(f, "Server is already running"),
            ServerError::Bind { addr, source } => {
                write!(f, "Failed to listen on '{}': {}", addr, source)
            }
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::AlreadyRunning => None,
            ServerError::Bind { source, .. } => Some(source),
        }
    }
}

/// Server instance
pub struct Server {
    config: Config,
    storage: Arc<Storage>,
    state: watch::Sender<ServerState>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config, storage: Arc<Storage>) -> Self {
        let (state, _) = watch::channel(ServerState::Stopped);
        Server {
            config,
            storage,
            state,
            local_addr: Mutex::new(None),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions
    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Address of the listening socket, if one has been bound
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind the listener and accept connections until `stop()` is called.
    ///
    /// Returns once the listener is closed and every connection task has
    /// exited.
    pub async fn start(&self) -> Result<(), ServerError> {
        if self.state() != ServerState::Stopped {
            warn!("Server already running");
            return Err(ServerError::AlreadyRunning);
        }

        let addr = self.config.listen_addr();
        let listener = match bind_listener(&addr, self.config.backlog) {
            Ok(listener) => listener,
            Err(e) => {
                error!(address = %addr, error = %e, "Failed to start listener");
                return Err(ServerError::Bind { addr, source: e });
            }
        };
        let local_addr = listener.local_addr().ok();
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner) = local_addr;

        let started = self.state.send_if_modified(|state| {
            if *state == ServerState::Stopped {
                *state = ServerState::Listening;
                true
            } else {
                false
            }
        });
        if !started {
            warn!("Server already running");
            return Err(ServerError::AlreadyRunning);
        }

        info!(address = ?local_addr, backlog = self.config.backlog, "Server listening");

        let mut state = self.state.subscribe();
        let mut workers = JoinSet::new();

        loop {
            tokio::select! {
                _ = server_stopping(&mut state) => break,

                res = listener.accept() => match res {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "New connection");

                        let storage = Arc::clone(&self.storage);
                        let state = self.state.subscribe();

                        workers.spawn(async move {
                            if let Err(e) = handle_connection(stream, storage, state).await {
                                debug!(peer = %peer, error = %e, "Connection error");
                            }
                            debug!(peer = %peer, "Connection closed");
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                },

                // Reap finished connections so the set only holds live ones
                Some(res) = workers.join_next(), if !workers.is_empty() => {
                    log_join_result(res);
                }
            }
        }

        drop(listener);
        info!(connections = workers.len(), "Listener closed, draining connections");

        while let Some(res) = workers.join_next().await {
            log_join_result(res);
        }

        self.state.send_replace(ServerState::Stopped);
        info!(keys = self.storage.len(), "Server stopped");
        Ok(())
    }

    /// Close the listener and wait for every connection task to exit.
    ///
    /// Does nothing if the server is not running. Requires the `start()`
    /// future to still be driven so the drain can complete.
    pub async fn stop(&self) {
        let initiated = self.state.send_if_modified(|state| {
            if *state == ServerState::Listening {
                *state = ServerState::Draining;
                true
            } else {
                false
            }
        });

        if initiated {
            info!("Stopping server");
        } else if self.state() == ServerState::Stopped {
            debug!("Server not running");
            return;
        }

        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| *s == ServerState::Stopped).await;
    }
}

fn log_join_result(res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        warn!(error = %e, "Connection task failed");
    }
}

/// Create the listening socket with address reuse and the given backlog
fn bind_listener(addr: &str, backlog: u32) -> io::Result<TcpListener> {
    let socket_addr = addr.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
    })?;

    let socket = Socket::new(Domain::for_address(socket_addr), Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;

    debug!(address = %socket_addr, "Binding listener");
    socket.bind(&SockAddr::from(socket_addr))?;
    socket.listen(backlog.min(i32::MAX as u32) as i32)?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}

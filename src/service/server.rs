//! # Engine Server
//!
//! The facade embedders talk to. It owns the session registry, the fixed set
//! of namespaces and the metrics of one engine instance, and accepts work from
//! two directions:
//!
//! - [`Server::handle_request`] serves polling GET/POST requests translated
//!   from any HTTP framework.
//! - [`Server::handle_socket`] drives one persistent connection, either as a
//!   new session or as the upgrade of an existing polling session.
//!
//! ## Example
//! ```rust,no_run
//! use realtime_protocol::config::EngineConfig;
//! use realtime_protocol::service::{EngineRequest, Server};
//!
//! # async fn run() -> realtime_protocol::error::Result<()> {
//! let server = Server::new(EngineConfig::default())?;
//! if let Some(nsp) = server.of("/") {
//!     nsp.on("message", |socket, args, _| {
//!         let _ = socket.emit("message-back", args);
//!     });
//! }
//!
//! let res = server.handle_request(EngineRequest::get("EIO=4&transport=polling")).await;
//! assert_eq!(res.status, 200);
//! # Ok(())
//! # }
//! ```

use crate::config::EngineConfig;
use crate::core::codec::Frame;
use crate::core::payload;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::client::Client;
use crate::protocol::handshake::{self, HandshakeQuery};
use crate::protocol::namespace::{Namespace, NamespaceManager};
use crate::service::request::{EngineRequest, EngineResponse, Method};
use crate::session::{CloseReason, Session, SessionRegistry};
use crate::transport::{PollingTransport, SocketTransport, Transport, TransportKind};
use crate::utils::id::generate_id;
use crate::utils::metrics::{Metrics, Timer};
use futures::{Sink, Stream};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

struct Inner {
    config: EngineConfig,
    registry: SessionRegistry,
    namespaces: Arc<NamespaceManager>,
    metrics: Arc<Metrics>,
}

/// One engine instance. Cheap to clone; clones share every session.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("sessions", &self.inner.registry.len())
            .field("namespaces", &self.inner.namespaces)
            .finish()
    }
}

impl Server {
    /// Validate `config` and build the server with its configured namespaces
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate_strict()?;

        let namespaces = Arc::new(NamespaceManager::new(
            config.server.namespaces.iter().cloned(),
        ));
        let registry = SessionRegistry::new(config.server.max_sessions);
        info!(
            namespaces = ?namespaces.paths().collect::<Vec<_>>(),
            ping_interval_ms = config.server.ping_interval.as_millis() as u64,
            ping_timeout_ms = config.server.ping_timeout.as_millis() as u64,
            "Engine server created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                registry,
                namespaces,
                metrics: Arc::new(Metrics::new()),
            }),
        })
    }

    /// The configured namespace at `path`
    pub fn of(&self, path: &str) -> Option<Arc<Namespace>> {
        self.inner.namespaces.get(path)
    }

    /// The main namespace `/`
    pub fn main_namespace(&self) -> Arc<Namespace> {
        self.inner.namespaces.main()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }

    pub fn session_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn session(&self, sid: &str) -> Option<Arc<Session>> {
        self.inner.registry.get(sid)
    }

    /// Close every live session, sending `close` where a transport can carry it
    pub fn close(&self) {
        let sessions = self.inner.registry.sessions();
        info!(sessions = sessions.len(), "Closing all sessions");
        for session in sessions {
            session.close(CloseReason::ServerShutdown);
        }
    }

    /// Serve one polling request.
    ///
    /// Never fails: rejections are turned into 4xx responses.
    #[instrument(skip(self, request), fields(method = ?request.method))]
    pub async fn handle_request(&self, request: EngineRequest) -> EngineResponse {
        let _timer = Timer::start("polling_request");
        match self.serve_polling(request).await {
            Ok(response) => response,
            Err(e) => {
                self.inner.metrics.request_rejected();
                debug!(error = %e, status = e.status_code(), "Polling request rejected");
                EngineResponse::error(&e)
            }
        }
    }

    async fn serve_polling(&self, request: EngineRequest) -> Result<EngineResponse> {
        let query = handshake::parse_query(&request.query)?;
        if query.transport != TransportKind::Polling {
            return Err(ProtocolError::InvalidRequest(
                constants::ERR_WRONG_ENDPOINT.into(),
            ));
        }

        let Some(sid) = query.sid else {
            return match request.method {
                Method::Get => self.open_polling().await,
                _ => Err(ProtocolError::InvalidRequest(
                    constants::ERR_HANDSHAKE_METHOD.into(),
                )),
            };
        };

        let session = self
            .inner
            .registry
            .get(&sid)
            .ok_or(ProtocolError::UnknownSession)?;

        match request.method {
            Method::Get => {
                let batch = session.pull().await?;
                Ok(EngineResponse::ok(payload::encode_batch(&batch)))
            }
            Method::Post => {
                session.push(&request.body)?;
                Ok(EngineResponse::empty())
            }
            Method::Other(_) => Err(ProtocolError::InvalidRequest(
                constants::ERR_BAD_METHOD.into(),
            )),
        }
    }

    async fn open_polling(&self) -> Result<EngineResponse> {
        handshake::ensure_enabled(TransportKind::Polling, &self.inner.config)?;
        let session = self.create_session(Transport::Polling(PollingTransport::new()))?;
        let batch = session.pull().await?;
        Ok(EngineResponse::ok(payload::encode_batch(&batch)))
    }

    /// Drive one persistent connection until it ends.
    ///
    /// Without `sid` in `query` the connection opens a new session. With one,
    /// it becomes the upgrade candidate of that polling session. A rejected
    /// connection is closed and the rejection returned.
    #[instrument(skip(self, conn))]
    pub async fn handle_socket<S>(&self, query: &str, conn: S) -> Result<()>
    where
        S: Stream<Item = Result<Frame>> + Sink<Frame, Error = ProtocolError> + Send + 'static,
    {
        let (transport, reader) = SocketTransport::spawn(conn);
        let id = transport.id();

        let session = match self.attach_socket(query, &transport) {
            Ok(session) => session,
            Err(e) => {
                self.inner.metrics.request_rejected();
                warn!(error = %e, "Socket connection rejected");
                transport.close();
                return Err(e);
            }
        };

        session.read_socket(id, reader).await;
        Ok(())
    }

    fn attach_socket(&self, query: &str, transport: &SocketTransport) -> Result<Arc<Session>> {
        let HandshakeQuery { transport: kind, sid } = handshake::parse_query(query)?;
        if kind != TransportKind::Websocket {
            return Err(ProtocolError::InvalidRequest(
                constants::ERR_WRONG_ENDPOINT.into(),
            ));
        }

        match sid {
            None => {
                handshake::ensure_enabled(TransportKind::Websocket, &self.inner.config)?;
                self.create_session(Transport::Socket(transport.clone()))
            }
            Some(sid) => {
                let session = self
                    .inner
                    .registry
                    .get(&sid)
                    .ok_or(ProtocolError::UnknownSession)?;
                session.attach_upgrade(transport.clone())?;
                Ok(session)
            }
        }
    }

    fn create_session(&self, transport: Transport) -> Result<Arc<Session>> {
        let inner = &self.inner;
        let kind = transport.kind();
        let namespaces = Arc::clone(&inner.namespaces);
        let client_config = handshake::client_config(&inner.config);
        let metrics = Arc::clone(&inner.metrics);

        let session = Session::new(
            generate_id(),
            transport,
            handshake::session_config(kind, &inner.config),
            &inner.registry,
            Arc::clone(&inner.metrics),
            move |weak| Client::new(weak, namespaces, client_config, metrics),
        );

        inner.registry.insert(Arc::clone(&session))?;
        if let Err(e) = session.open() {
            inner.registry.remove(session.id());
            return Err(e);
        }
        Ok(session)
    }
}

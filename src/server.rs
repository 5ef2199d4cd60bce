use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::message::{BOOTREQUEST, DhcpMessage};
use crate::options::{MessageType, OptionCode};

const DHCP_SERVER_PORT: u16 = 67;
const DHCP_CLIENT_PORT: u16 = 68;
const RECV_BUFFER_SIZE: usize = 1500;

/// Handles decoded client messages on behalf of a [`DhcpServer`].
///
/// DISCOVER and REQUEST may produce a reply; returning `None` drops the
/// message without a response. The remaining methods are notifications
/// with no-op defaults.
pub trait DhcpHandler: Send + Sync + 'static {
    /// A DISCOVER arrived; return the OFFER to send, if any.
    fn on_discover(&self, message: &DhcpMessage) -> Option<Reply>;

    /// A REQUEST addressed to this server arrived; return the ACK or
    /// NAK to send, if any.
    fn on_request(&self, message: &DhcpMessage) -> Option<Reply>;

    /// A client gave up its address.
    fn on_release(&self, _message: &DhcpMessage) {}

    /// A client found its assigned address already in use.
    fn on_decline(&self, _message: &DhcpMessage) {}

    /// A client with an external address asked for configuration.
    fn on_inform(&self, _message: &DhcpMessage) {}

    /// A reply left the socket.
    fn on_response_sent(&self, _message: &DhcpMessage, _destination: SocketAddr) {}

    /// The socket failed. Receive failures stop the server; send
    /// failures do not.
    fn on_socket_error(&self, _error: &std::io::Error) {}

    /// A datagram could not be decoded or dispatched.
    fn on_message_error(&self, _error: &Error) {}
}

/// A reply produced by a [`DhcpHandler`], together with the subnet
/// parameters of the pool it was drawn from.
///
/// The server stamps `subnet_mask` and `gateway` into the outgoing
/// options of OFFER and ACK messages, plus its own server identifier.
#[derive(Debug, Clone)]
pub struct Reply {
    pub message: DhcpMessage,
    pub subnet_mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

impl Reply {
    pub fn new(message: DhcpMessage, subnet_mask: Ipv4Addr, gateway: Ipv4Addr) -> Self {
        Self {
            message,
            subnet_mask,
            gateway,
        }
    }
}

/// UDP front end that decodes datagrams and dispatches them to a
/// [`DhcpHandler`].
///
/// Messages are processed one at a time in arrival order; replies are
/// sent from spawned tasks so a slow destination never stalls receive.
pub struct DhcpServer<H> {
    handler: Arc<H>,
    server_ip: Ipv4Addr,
    port: u16,
    running: Arc<AtomicBool>,
    state: Mutex<Option<Running>>,
}

struct Running {
    socket: Arc<UdpSocket>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl<H: DhcpHandler> DhcpServer<H> {
    /// Creates a stopped server that will answer as `server_ip`.
    ///
    /// `server_ip` is the address stamped into the server-identifier
    /// option; the socket itself binds the wildcard address so that
    /// broadcasts are received.
    pub fn new(server_ip: Ipv4Addr, handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            server_ip,
            port: DHCP_SERVER_PORT,
            running: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(None),
        }
    }

    /// Overrides the standard DHCP server port. Port 0 picks an
    /// ephemeral port, which unprivileged tests rely on.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn server_ip(&self) -> Ipv4Addr {
        self.server_ip
    }

    /// Returns true while the receive loop is alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The bound socket address, once started.
    pub async fn local_addr(&self) -> Result<SocketAddr> {
        let state = self.state.lock().await;
        let running = state
            .as_ref()
            .ok_or_else(|| Error::Socket("Server is not running".to_string()))?;
        Ok(running.socket.local_addr()?)
    }

    /// Binds the socket and spawns the receive loop.
    ///
    /// Calling `start` on a running server is a no-op.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            if self.running.load(Ordering::SeqCst) {
                return Ok(());
            }
            // The receive loop already exited on a socket error.
            *state = None;
        }

        let socket = Arc::new(create_socket(self.port)?);
        let local_addr = socket.local_addr()?;
        let (shutdown, shutdown_rx) = watch::channel(false);

        self.running.store(true, Ordering::SeqCst);

        let dispatcher = Dispatcher {
            handler: Arc::clone(&self.handler),
            server_ip: self.server_ip,
            socket: Arc::clone(&socket),
            running: Arc::clone(&self.running),
        };
        let task = tokio::spawn(dispatcher.run(shutdown_rx));

        info!("DHCP server listening on {} as {}", local_addr, self.server_ip);

        *state = Some(Running {
            socket,
            shutdown,
            task,
        });
        Ok(())
    }

    /// Stops the receive loop and closes the socket.
    ///
    /// In-flight reply sends are left to finish on their own tasks.
    pub async fn stop(&self) {
        let state = self.state.lock().await.take();
        let Some(running) = state else {
            return;
        };

        let _ = running.shutdown.send(true);
        if let Err(error) = running.task.await {
            error!("Receive loop task failed: {}", error);
        }

        info!("DHCP server stopped");
    }
}

fn create_socket(port: u16) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|error| Error::Socket(format!("Failed to create socket: {}", error)))?;

    socket
        .set_reuse_address(true)
        .map_err(|error| Error::Socket(format!("Failed to set SO_REUSEADDR: {}", error)))?;

    socket
        .set_broadcast(true)
        .map_err(|error| Error::Socket(format!("Failed to set SO_BROADCAST: {}", error)))?;

    socket
        .set_nonblocking(true)
        .map_err(|error| Error::Socket(format!("Failed to set non-blocking: {}", error)))?;

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    socket
        .bind(&bind_addr.into())
        .map_err(|error| Error::Socket(format!("Failed to bind to {}: {}", bind_addr, error)))?;

    let std_socket: std::net::UdpSocket = socket.into();
    let tokio_socket = UdpSocket::from_std(std_socket)
        .map_err(|error| Error::Socket(format!("Failed to convert to tokio socket: {}", error)))?;

    Ok(tokio_socket)
}

struct Dispatcher<H> {
    handler: Arc<H>,
    server_ip: Ipv4Addr,
    socket: Arc<UdpSocket>,
    running: Arc<AtomicBool>,
}

impl<H: DhcpHandler> Dispatcher<H> {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut buffer = [0u8; RECV_BUFFER_SIZE];

        info!("DHCP server ready and listening");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                result = self.socket.recv_from(&mut buffer) => match result {
                    Ok((size, source)) => {
                        if let Some((reply, destination)) =
                            self.process(&buffer[..size], source)
                        {
                            self.send(reply, destination);
                        }
                    }
                    Err(error) => {
                        error!("Error receiving datagram: {}", error);
                        self.handler.on_socket_error(&error);
                        break;
                    }
                },
            }
        }

        self.running.store(false, Ordering::SeqCst);
    }

    /// Decodes one datagram and runs it through the handler, returning
    /// the finished reply and its destination.
    fn process(&self, data: &[u8], source: SocketAddr) -> Option<(DhcpMessage, SocketAddr)> {
        let message = match DhcpMessage::decode(data) {
            Ok(message) => message,
            Err(error) => {
                self.handler.on_message_error(&error);
                return None;
            }
        };

        if message.op != BOOTREQUEST {
            self.handler.on_message_error(&Error::UnsupportedMessage(format!(
                "op {} is not BOOTREQUEST",
                message.op
            )));
            return None;
        }

        let reply = match message.options.message_type() {
            Some(message_type) => {
                info!("{} from {} ({})", message_type, message.chaddr, source);

                match message_type {
                    MessageType::Discover => self.handler.on_discover(&message),
                    MessageType::Request => {
                        if let Some(server_id) = message.options.server_identifier()
                            && server_id != self.server_ip
                        {
                            info!(
                                "REQUEST from {} is for different server {}",
                                message.chaddr, server_id
                            );
                            return None;
                        }
                        self.handler.on_request(&message)
                    }
                    MessageType::Release => {
                        self.handler.on_release(&message);
                        None
                    }
                    MessageType::Decline => {
                        self.handler.on_decline(&message);
                        None
                    }
                    MessageType::Inform => {
                        self.handler.on_inform(&message);
                        None
                    }
                    other => {
                        self.handler.on_message_error(&Error::UnsupportedMessage(format!(
                            "{} is not a client message",
                            other
                        )));
                        None
                    }
                }
            }
            None => {
                self.handler.on_message_error(&Error::UnsupportedMessage(
                    "Missing or unrecognized message-type option".to_string(),
                ));
                None
            }
        }?;

        let reply = match self.finish_reply(reply) {
            Ok(reply) => reply,
            Err(error) => {
                self.handler.on_message_error(&error);
                return None;
            }
        };

        let destination = reply_destination(&reply, source);
        Some((reply, destination))
    }

    /// Stamps the pool's subnet options and the server identifier onto
    /// an outgoing reply.
    fn finish_reply(&self, reply: Reply) -> Result<DhcpMessage> {
        let Reply {
            mut message,
            subnet_mask,
            gateway,
        } = reply;

        match message.options.message_type() {
            Some(MessageType::Offer | MessageType::Ack) => {
                message.options.set_addr(OptionCode::SubnetMask, subnet_mask);
                message.options.set_addr(OptionCode::Router, gateway);
            }
            Some(MessageType::Nak) => {}
            Some(other) => {
                return Err(Error::UnsupportedMessage(format!(
                    "{} is not a server reply",
                    other
                )));
            }
            None => {
                return Err(Error::UnsupportedMessage(
                    "Reply has no message-type option".to_string(),
                ));
            }
        }

        message
            .options
            .set_addr(OptionCode::ServerIdentifier, self.server_ip);

        Ok(message)
    }

    fn send(&self, reply: DhcpMessage, destination: SocketAddr) {
        let encoded = match reply.encode() {
            Ok(encoded) => encoded,
            Err(error) => {
                self.handler.on_message_error(&error);
                return;
            }
        };

        let socket = Arc::clone(&self.socket);
        let handler = Arc::clone(&self.handler);

        tokio::spawn(async move {
            match socket.send_to(&encoded, destination).await {
                Ok(_) => handler.on_response_sent(&reply, destination),
                Err(error) => {
                    warn!("Error sending reply to {}: {}", destination, error);
                    handler.on_socket_error(&error);
                }
            }
        });
    }
}

/// Picks where a reply goes: back through the relay when `giaddr` is
/// set, unicast to a client that has an address, broadcast otherwise.
fn reply_destination(reply: &DhcpMessage, source: SocketAddr) -> SocketAddr {
    if !reply.giaddr.is_unspecified() {
        source
    } else if !reply.ciaddr.is_unspecified() {
        SocketAddr::new(IpAddr::V4(reply.ciaddr), DHCP_CLIENT_PORT)
    } else {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), DHCP_CLIENT_PORT)
    }
}

//! UDP socket multiplexer: the external collaborator that dispatches
//! datagrams to per-address RakNet sessions and answers unconnected pings
//! directly, without ever creating a session for them (§4.2, §4.7).

use amethyst_binary::{BinaryReader, BinaryWriter};
use bytes::Bytes;
use dashmap::DashMap;
use log::{debug, info, trace, warn};
use raknet::consts::{ID_UNCONNECTED_PING, ID_UNCONNECTED_PONG, TICK_INTERVAL};
use raknet::wire::offline::{UnconnectedPing, UnconnectedPong};
use raknet::{RakNetServerConfig, Session};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::time::Instant;

/// Large enough to take a full burst of MTU-negotiation datagrams in one
/// read; matches the receive buffer size used by the reference RakNet
/// responder this design is modeled on.
const RECV_BUFFER_SIZE: usize = 1024 * 1024 * 8;

pub struct RakNetListener {
    socket: Arc<UdpSocket>,
    server_config: Arc<RakNetServerConfig>,
    sessions: Arc<DashMap<SocketAddr, Session>>,
}

impl RakNetListener {
    pub async fn bind(addr: SocketAddr, server_config: RakNetServerConfig) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!("raknet listener bound to {}", addr);
        Ok(Self {
            socket: Arc::new(socket),
            server_config: Arc::new(server_config),
            sessions: Arc::new(DashMap::new()),
        })
    }

    /// Runs the receive loop and the session tick timer. Never returns under
    /// normal operation; propagates a fatal socket error if the read side dies.
    pub async fn run(&self) -> std::io::Result<()> {
        tokio::spawn(Self::tick_loop(Arc::clone(&self.socket), Arc::clone(&self.sessions)));

        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        loop {
            let (len, src) = self.socket.recv_from(&mut buf).await?;
            if len == 0 {
                continue;
            }
            self.handle_datagram(Bytes::copy_from_slice(&buf[..len]), src).await;
        }
    }

    async fn handle_datagram(&self, data: Bytes, src: SocketAddr) {
        let Some(&head) = data.first() else {
            return;
        };

        if head == ID_UNCONNECTED_PING {
            self.respond_to_ping(data, src).await;
            return;
        }
        if head == ID_UNCONNECTED_PONG {
            return; // never legitimately inbound; drop rather than create a session for it
        }

        let now = Instant::now();
        if !self.sessions.contains_key(&src) && self.sessions.len() >= self.server_config.max_connections {
            debug!("rejecting {}: at max_connections ({})", src, self.server_config.max_connections);
            return;
        }
        let mut session = self
            .sessions
            .entry(src)
            .or_insert_with(|| {
                debug!("new raknet session from {}", src);
                Session::new(src, &self.server_config, now)
            });

        let output = match session.handle_datagram(data, now) {
            Ok(output) => output,
            Err(err) if err.is_protocol_violation() => {
                warn!("session {} closed: {}", src, err);
                session.disconnect(now)
            }
            Err(err) => {
                debug!("[{}] malformed datagram: {}", src, err);
                return;
            }
        };
        drop(session);

        for message in output.messages {
            trace!("[{}] application message ({} bytes)", src, message.len());
            // Out of scope: handed to the MCPE game-packet handler (§1).
        }
        for reply in output.replies {
            if let Err(err) = self.socket.send_to(&reply, src).await {
                warn!("[{}] failed to send reply: {}", src, err);
            }
        }
        if output.closed {
            self.sessions.remove(&src);
        }
    }

    async fn respond_to_ping(&self, data: Bytes, src: SocketAddr) {
        let mut reader = BinaryReader::new(data.slice(1..));
        let ping = match UnconnectedPing::decode(&mut reader) {
            Ok(ping) => ping,
            Err(err) => {
                debug!("malformed unconnected ping from {}: {}", src, err);
                return;
            }
        };

        let pong = UnconnectedPong {
            time: ping.time,
            server_guid: self.server_config.server_guid,
            motd: String::from_utf8_lossy(&self.server_config.advertisement).into_owned(),
        };

        let mut writer = BinaryWriter::new();
        if writer.write_u8(ID_UNCONNECTED_PONG).is_err() || pong.encode(&mut writer).is_err() {
            warn!("[{}] failed to encode unconnected pong", src);
            return;
        }
        if let Err(err) = self.socket.send_to(&writer.freeze(), src).await {
            warn!("[{}] failed to send unconnected pong: {}", src, err);
        }
    }

    async fn tick_loop(socket: Arc<UdpSocket>, sessions: Arc<DashMap<SocketAddr, Session>>) {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            interval.tick().await;
            let now = Instant::now();
            let mut timed_out = Vec::new();

            for mut entry in sessions.iter_mut() {
                let addr = *entry.key();
                let output = entry.value_mut().tick(now);
                for reply in output.replies {
                    if let Err(err) = socket.send_to(&reply, addr).await {
                        warn!("[{}] failed to send tick reply: {}", addr, err);
                    }
                }
                if output.closed {
                    timed_out.push(addr);
                }
            }

            for addr in timed_out {
                sessions.remove(&addr);
                debug!("[{}] session closed", addr);
            }
        }
    }
}

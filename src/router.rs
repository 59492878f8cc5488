use anyhow::Context;
use log::{debug, error, info, warn};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;

use crate::config::EmulatorConfig;
use crate::protocol::{Outbound, ProtocolEngine};
use crate::types::{AdjacencyMap, NodeAddress};

/// Backoff after a failed receive so a persistent socket error cannot spin the loop.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// One emulated router: a protocol engine bound to its UDP socket.
pub struct Router {
    engine: ProtocolEngine,
    socket: UdpSocket,
    buffer: Vec<u8>,
    reported_generation: Option<u64>,
}

impl Router {
    pub async fn bind(
        local: NodeAddress,
        original: AdjacencyMap,
        config: EmulatorConfig,
    ) -> anyhow::Result<Self> {
        let engine = ProtocolEngine::new(local, original, config, Instant::now())?;
        let socket = UdpSocket::bind(local.socket_addr())
            .await
            .with_context(|| format!("failed to bind UDP socket on {}", local))?;

        Ok(Self::from_parts(engine, socket))
    }

    /// Wraps an already bound socket. The socket must be reachable at `engine.local()`.
    pub fn from_parts(engine: ProtocolEngine, socket: UdpSocket) -> Self {
        let buffer = vec![0u8; engine.config().recv_buffer_size];
        Self {
            engine,
            socket,
            buffer,
            reported_generation: None,
        }
    }

    pub fn engine(&self) -> &ProtocolEngine {
        &self.engine
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Runs the event loop until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let local = self.engine.local();
        tokio::select! {
            _ = self.run() => {}
            _ = shutdown => {
                info!("Router {} shutting down", local);
            }
        }
    }

    pub async fn run(mut self) {
        info!(
            "Router {} running with {} neighbors",
            self.engine.local(),
            self.engine.neighbor_manager().addresses().count()
        );

        loop {
            self.step().await;
        }
    }

    /// One loop iteration: wait for a datagram or the next deadline, whichever
    /// comes first, then run due timers.
    async fn step(&mut self) {
        let deadline = tokio::time::Instant::from_std(self.engine.next_deadline());

        match tokio::time::timeout_at(deadline, self.socket.recv_from(&mut self.buffer)).await {
            Ok(Ok((len, peer))) => self.on_datagram(len, peer).await,
            Ok(Err(e)) => {
                error!("Failed to receive packet: {}", e);
                tokio::time::sleep(RECV_ERROR_BACKOFF).await;
            }
            Err(_) => {}
        }

        let outbound = self.engine.poll(Instant::now());
        self.send_all(outbound).await;
        self.report_changes();
    }

    async fn on_datagram(&mut self, len: usize, peer: SocketAddr) {
        let from = match NodeAddress::try_from(peer) {
            Ok(from) => from,
            Err(e) => {
                warn!("Dropping datagram from {}: {}", peer, e);
                return;
            }
        };

        match self
            .engine
            .handle_datagram(&self.buffer[..len], from, Instant::now())
        {
            Ok(outbound) => self.send_all(outbound).await,
            Err(e) => warn!("Dropping datagram from {}: {}", from, e),
        }
    }

    async fn send_all(&self, outbound: Vec<Outbound>) {
        for out in outbound {
            let data = out.packet.encode();
            match self.socket.send_to(&data, out.to.socket_addr()).await {
                Ok(_) => debug!("→ {:?} to {}", out.packet.packet_type, out.to),
                Err(e) => warn!("Failed to send {:?} to {}: {}", out.packet.packet_type, out.to, e),
            }
        }
    }

    fn report_changes(&mut self) {
        let generation = self.engine.generation();
        if self.reported_generation == Some(generation) {
            return;
        }
        self.reported_generation = Some(generation);

        match serde_json::to_string(&self.engine.snapshot()) {
            Ok(status) => info!("Routing state: {}", status),
            Err(e) => warn!("Failed to serialize routing state: {}", e),
        }
    }
}

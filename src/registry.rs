use std::{fmt, sync::Arc};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::{
    conn::FrameSink,
    error::{CloseReason, RegistryGone},
};

type Result<T> = std::result::Result<T, RegistryGone>;

/// Identity of a registered transport, unique for the life of the registry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ConnId(pub u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// What a connection learns when it joins the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: ConnId,
    /// Display name prefixed to everything this member broadcasts.
    pub name: String,
}

/// A broadcast target handed out by the registry.
#[derive(Clone)]
pub struct Peer {
    pub id: ConnId,
    pub sink: Arc<dyn FrameSink>,
}

enum Command {
    Register {
        sink: Arc<dyn FrameSink>,
        reply: oneshot::Sender<Member>,
    },
    Unregister {
        id: ConnId,
        reply: oneshot::Sender<bool>,
    },
    Peers {
        except: ConnId,
        reply: oneshot::Sender<Vec<Peer>>,
    },
}

/// Handle to the task owning the set of live connections.
///
/// Membership is only ever touched by that task; handles just send it
/// commands, so cloning a handle is cheap.
#[derive(Clone)]
pub struct Registry {
    tx: mpsc::Sender<Command>,
}

impl Registry {
    /// Spawns the registry task. It runs until every handle is dropped.
    #[must_use]
    pub fn spawn(backlog: usize) -> Self {
        let (tx, rx) = mpsc::channel(backlog.max(1));
        tokio::spawn(RegistryTask::default().run(rx));
        Self { tx }
    }

    /// Appends a connection, assigning it the next id and display name.
    pub async fn register(&self, sink: Arc<dyn FrameSink>) -> Result<Member> {
        self.request(|reply| Command::Register { sink, reply }).await
    }

    /// Removes a connection. Returns whether it was still registered.
    pub async fn unregister(&self, id: ConnId) -> Result<bool> {
        self.request(|reply| Command::Unregister { id, reply }).await
    }

    /// Every member except `except`, in join order.
    pub async fn peers(&self, except: ConnId) -> Result<Vec<Peer>> {
        self.request(|reply| Command::Peers { except, reply }).await
    }

    /// Writes `frame` to every member but the sender, in join order.
    ///
    /// Peers are written one after another from the calling task, so a slow
    /// peer holds up this broadcast only. A peer whose write fails is dropped
    /// from the room and closed. Returns the number of successful deliveries.
    pub async fn broadcast(&self, from: ConnId, frame: &Bytes) -> Result<usize> {
        let peers = self.peers(from).await?;
        let mut delivered = 0;
        for peer in peers {
            match peer.sink.send(frame).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(peer = %peer.id, error = ?e, "dropping unreachable peer");
                    self.unregister(peer.id).await?;
                    let _ = peer.sink.close(CloseReason::GoingAway).await;
                }
            }
        }
        tracing::trace!(from = %from, delivered, len = frame.len(), "broadcast");
        Ok(delivered)
    }

    async fn request<T>(&self, cmd: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(cmd(reply)).await.map_err(|_| RegistryGone)?;
        rx.await.map_err(|_| RegistryGone)
    }
}

#[derive(Default)]
struct RegistryTask {
    // insertion ordered, ids never repeat
    members: Vec<(ConnId, Arc<dyn FrameSink>)>,
    joined: u64,
}

impl RegistryTask {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::Register { sink, reply } => {
                    let _ = reply.send(self.register(sink));
                }
                Command::Unregister { id, reply } => {
                    let _ = reply.send(self.unregister(id));
                }
                Command::Peers { except, reply } => {
                    let peers = self
                        .members
                        .iter()
                        .filter(|(id, _)| *id != except)
                        .map(|(id, sink)| Peer {
                            id: *id,
                            sink: sink.clone(),
                        })
                        .collect();
                    let _ = reply.send(peers);
                }
            }
        }
        tracing::debug!(members = self.members.len(), "registry stopped");
    }

    fn register(&mut self, sink: Arc<dyn FrameSink>) -> Member {
        self.joined += 1;
        let id = ConnId(self.joined);
        self.members.push((id, sink));
        tracing::info!(id = %id, members = self.members.len(), "joined");
        Member {
            id,
            name: format!("Socket {id}: "),
        }
    }

    fn unregister(&mut self, id: ConnId) -> bool {
        let before = self.members.len();
        self.members.retain(|(m, _)| *m != id);
        let removed = self.members.len() != before;
        if removed {
            tracing::info!(id = %id, members = self.members.len(), "left");
        }
        removed
    }
}

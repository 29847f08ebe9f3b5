//! Stream transport connecting the chat server to world servers and the master
//!
//! Units travel over TCP framed with a u32 little-endian length prefix. The
//! transport runs entirely in background tasks and talks to the tick loop
//! through channels:
//! - [`NetworkEvent`]s flow to the loop: received units, plus connections
//!   opening and closing as their own variants so peer data can never be
//!   mistaken for them
//! - [`OutboundCommand`]s flow from the loop to a sender task that looks up
//!   per-connection writer queues
//!
//! A separate task keeps the link to the master server up, announcing this
//! server with a server-info message every time it connects.

use crate::roster::ConnectionId;
use chat_shared::ids::notice;
use chat_shared::{FRAME_PREFIX_LEN, MAX_FRAME_LEN};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

// Kept well under the default master grace period.
const MASTER_RETRY: Duration = Duration::from_millis(250);

/// Messages sent from network tasks to the tick loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    Connected {
        connection: ConnectionId,
    },
    /// `lost` is set when the stream failed rather than closing cleanly.
    Closed {
        connection: ConnectionId,
        lost: bool,
    },
    Unit {
        connection: ConnectionId,
        data: Vec<u8>,
    },
    MasterUnit {
        data: Vec<u8>,
    },
}

/// Messages sent from the tick loop to network tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    SendPacket {
        connection: ConnectionId,
        data: Vec<u8>,
    },
    BroadcastPacket {
        data: Vec<u8>,
        exclude: Option<ConnectionId>,
    },
    SendToMaster {
        data: Vec<u8>,
    },
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub bind_addr: String,
    pub max_clients: usize,
    /// `ip:port` of the master server, if known
    pub master_addr: Option<String>,
    /// Unit sent to the master right after connecting
    pub announcement: Vec<u8>,
}

type Peers = Arc<RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Vec<u8>>>>>;

/// Reads one length-prefixed unit. `Ok(None)` means the peer closed the
/// stream cleanly.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut prefix = [0u8; FRAME_PREFIX_LEN];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_le_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds the {} byte limit", len, MAX_FRAME_LEN),
        ));
    }
    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).await?;
    Ok(Some(data))
}

/// Writes one length-prefixed unit
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    if data.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unit of {} bytes is too large to send", data.len()),
        ));
    }
    writer.write_all(&(data.len() as u32).to_le_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await
}

/// Running transport owned by the tick loop
pub struct Transport {
    local_addr: SocketAddr,
    events: mpsc::UnboundedReceiver<NetworkEvent>,
    commands: mpsc::UnboundedSender<OutboundCommand>,
    master_connected: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Transport {
    /// Binds the listener and spawns the network tasks
    pub async fn bind(config: TransportConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Chat server listening on {}", local_addr);

        let (event_tx, events) = mpsc::unbounded_channel();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (master_tx, master_rx) = mpsc::unbounded_channel();
        let peers: Peers = Arc::new(RwLock::new(HashMap::new()));
        let master_connected = Arc::new(AtomicBool::new(false));

        let mut tasks = vec![
            tokio::spawn(accept_loop(
                listener,
                Arc::clone(&peers),
                event_tx.clone(),
                config.max_clients,
            )),
            tokio::spawn(sender_loop(command_rx, Arc::clone(&peers), master_tx)),
        ];

        match config.master_addr {
            Some(addr) => tasks.push(tokio::spawn(master_link(
                addr,
                config.announcement,
                event_tx,
                master_rx,
                Arc::clone(&master_connected),
            ))),
            None => warn!("No master address known, running without a master link"),
        }

        Ok(Self {
            local_addr,
            events,
            commands,
            master_connected,
            tasks,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Next queued event, if any
    pub fn try_recv(&mut self) -> Option<NetworkEvent> {
        self.events.try_recv().ok()
    }

    pub fn is_connected_to_master(&self) -> bool {
        self.master_connected.load(Ordering::SeqCst)
    }

    pub fn send(&self, command: OutboundCommand) {
        if let Err(e) = self.commands.send(command) {
            error!("Failed to queue outbound unit: {}", e);
        }
    }

    /// Stops every network task
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        info!("Transport stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    peers: Peers,
    events: mpsc::UnboundedSender<NetworkEvent>,
    max_clients: usize,
) {
    let mut next_id: ConnectionId = 1;
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Error accepting connection: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
        };

        if peers.read().await.len() >= max_clients {
            warn!("Refusing connection from {}: server full", addr);
            let (_, mut writer) = stream.into_split();
            if let Err(e) =
                write_frame(&mut writer, &[notice::NO_FREE_INCOMING_CONNECTIONS]).await
            {
                debug!("Failed to notify refused peer {}: {}", addr, e);
            }
            continue;
        }

        let connection = next_id;
        next_id = next_id.wrapping_add(1).max(1);
        let (reader, writer) = stream.into_split();
        let (unit_tx, unit_rx) = mpsc::unbounded_channel();
        peers.write().await.insert(connection, unit_tx);
        info!("Connection {} opened from {}", connection, addr);

        if events.send(NetworkEvent::Connected { connection }).is_err() {
            break;
        }
        tokio::spawn(peer_writer(connection, writer, unit_rx));
        tokio::spawn(peer_reader(
            connection,
            reader,
            Arc::clone(&peers),
            events.clone(),
        ));
    }
}

async fn peer_reader(
    connection: ConnectionId,
    mut reader: OwnedReadHalf,
    peers: Peers,
    events: mpsc::UnboundedSender<NetworkEvent>,
) {
    let lost = loop {
        match read_frame(&mut reader).await {
            Ok(Some(data)) => {
                if events.send(NetworkEvent::Unit { connection, data }).is_err() {
                    return;
                }
            }
            Ok(None) => break false,
            Err(e) => {
                warn!("Connection {} lost: {}", connection, e);
                break true;
            }
        }
    };

    // Dropping the queue sender stops the writer task.
    peers.write().await.remove(&connection);
    let _ = events.send(NetworkEvent::Closed { connection, lost });
}

async fn peer_writer<W: AsyncWrite + Unpin>(
    connection: ConnectionId,
    mut writer: W,
    mut units: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(data) = units.recv().await {
        if let Err(e) = write_frame(&mut writer, &data).await {
            warn!("Failed to write to connection {}: {}", connection, e);
            break;
        }
    }
}

async fn sender_loop(
    mut commands: mpsc::UnboundedReceiver<OutboundCommand>,
    peers: Peers,
    master: mpsc::UnboundedSender<Vec<u8>>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            OutboundCommand::SendPacket { connection, data } => {
                let peers = peers.read().await;
                match peers.get(&connection) {
                    Some(queue) => {
                        let _ = queue.send(data);
                    }
                    None => debug!("Connection {} is gone, dropping unit", connection),
                }
            }
            OutboundCommand::BroadcastPacket { data, exclude } => {
                let peers = peers.read().await;
                for (connection, queue) in peers.iter() {
                    if Some(*connection) == exclude {
                        continue;
                    }
                    let _ = queue.send(data.clone());
                }
            }
            OutboundCommand::SendToMaster { data } => {
                if master.send(data).is_err() {
                    debug!("No master link, dropping unit");
                }
            }
        }
    }
}

async fn master_link(
    addr: String,
    announcement: Vec<u8>,
    events: mpsc::UnboundedSender<NetworkEvent>,
    mut outgoing: mpsc::UnboundedReceiver<Vec<u8>>,
    connected: Arc<AtomicBool>,
) {
    loop {
        match TcpStream::connect(addr.as_str()).await {
            Ok(stream) => {
                let (mut reader, mut writer) = stream.into_split();
                match write_frame(&mut writer, &announcement).await {
                    Ok(()) => {
                        info!("Connected to master at {}", addr);
                        connected.store(true, Ordering::SeqCst);
                        let session_events = events.clone();
                        let mut read_task = tokio::spawn(async move {
                            loop {
                                match read_frame(&mut reader).await {
                                    Ok(Some(data)) => {
                                        if session_events
                                            .send(NetworkEvent::MasterUnit { data })
                                            .is_err()
                                        {
                                            break;
                                        }
                                    }
                                    Ok(None) => break,
                                    Err(e) => {
                                        warn!("Master link read failed: {}", e);
                                        break;
                                    }
                                }
                            }
                        });

                        loop {
                            tokio::select! {
                                _ = &mut read_task => break,
                                data = outgoing.recv() => match data {
                                    Some(data) => {
                                        if let Err(e) = write_frame(&mut writer, &data).await {
                                            warn!("Master link write failed: {}", e);
                                            break;
                                        }
                                    }
                                    None => {
                                        read_task.abort();
                                        connected.store(false, Ordering::SeqCst);
                                        return;
                                    }
                                },
                            }
                        }

                        read_task.abort();
                        connected.store(false, Ordering::SeqCst);
                        warn!("Lost connection to master at {}", addr);
                    }
                    Err(e) => warn!("Failed to announce to master at {}: {}", addr, e),
                }
            }
            Err(e) => debug!("Master at {} unreachable: {}", addr, e),
        }
        tokio::time::sleep(MASTER_RETRY).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    async fn next_event(transport: &mut Transport) -> NetworkEvent {
        timeout(Duration::from_secs(5), async {
            loop {
                if let Some(event) = transport.try_recv() {
                    return event;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for a network event")
    }

    fn config(max_clients: usize) -> TransportConfig {
        TransportConfig {
            bind_addr: "127.0.0.1:0".into(),
            max_clients,
            master_addr: None,
            announcement: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let (mut client, mut server) = tokio::io::duplex(64);
        write_frame(&mut client, &[0x53, 2, 0, 1]).await.unwrap();
        write_frame(&mut client, &[]).await.unwrap();
        drop(client);

        assert_eq!(
            read_frame(&mut server).await.unwrap(),
            Some(vec![0x53, 2, 0, 1])
        );
        assert_eq!(read_frame(&mut server).await.unwrap(), Some(vec![]));
        assert_eq!(read_frame(&mut server).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_frame_prefix_is_little_endian() {
        let (mut client, mut server) = tokio::io::duplex(64);
        write_frame(&mut client, &[9, 9, 9]).await.unwrap();
        let mut raw = [0u8; 7];
        server.read_exact(&mut raw).await.unwrap();
        assert_eq!(raw, [3, 0, 0, 0, 9, 9, 9]);
    }

    #[test]
    fn test_frames_split_across_reads() {
        let mut stream = tokio_test::io::Builder::new()
            .read(&[2, 0])
            .read(&[0, 0, 0x53])
            .read(&[1])
            .build();
        let frame = tokio_test::block_on(read_frame(&mut stream)).unwrap();
        assert_eq!(frame, Some(vec![0x53, 1]));
    }

    #[test]
    fn test_write_frame_layout() {
        let mut stream = tokio_test::io::Builder::new()
            .write(&[1, 0, 0, 0])
            .write(&[9])
            .build();
        tokio_test::block_on(write_frame(&mut stream, &[9])).unwrap();
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client
            .write_all(&((MAX_FRAME_LEN as u32) + 1).to_le_bytes())
            .await
            .unwrap();
        let err = read_frame(&mut server).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_truncated_frame_is_an_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[10, 0, 0, 0, 1, 2]).await.unwrap();
        drop(client);
        assert!(read_frame(&mut server).await.is_err());
    }

    #[tokio::test]
    async fn test_connection_lifecycle_and_delivery() {
        let mut transport = Transport::bind(config(4)).await.unwrap();
        let mut peer = TcpStream::connect(transport.local_addr()).await.unwrap();

        let connection = match next_event(&mut transport).await {
            NetworkEvent::Connected { connection } => connection,
            other => panic!("unexpected event {:?}", other),
        };

        write_frame(&mut peer, &[0x53, 3, 0, 10]).await.unwrap();
        assert_eq!(
            next_event(&mut transport).await,
            NetworkEvent::Unit {
                connection,
                data: vec![0x53, 3, 0, 10]
            }
        );

        transport.send(OutboundCommand::SendPacket {
            connection,
            data: vec![1, 2, 3],
        });
        assert_eq!(read_frame(&mut peer).await.unwrap(), Some(vec![1, 2, 3]));

        transport.send(OutboundCommand::BroadcastPacket {
            data: vec![4],
            exclude: None,
        });
        assert_eq!(read_frame(&mut peer).await.unwrap(), Some(vec![4]));

        drop(peer);
        assert_eq!(
            next_event(&mut transport).await,
            NetworkEvent::Closed {
                connection,
                lost: false
            }
        );
        assert!(!transport.is_connected_to_master());
        transport.shutdown();
    }

    #[tokio::test]
    async fn test_full_server_refuses_connection() {
        let mut transport = Transport::bind(config(1)).await.unwrap();
        let _first = TcpStream::connect(transport.local_addr()).await.unwrap();
        next_event(&mut transport).await;

        let mut second = TcpStream::connect(transport.local_addr()).await.unwrap();
        assert_eq!(
            read_frame(&mut second).await.unwrap(),
            Some(vec![notice::NO_FREE_INCOMING_CONNECTIONS])
        );
        transport.shutdown();
    }

    #[tokio::test]
    async fn test_master_link_announces() {
        let master = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut transport = Transport::bind(TransportConfig {
            master_addr: Some(master.local_addr().unwrap().to_string()),
            announcement: vec![0x53, 6, 0, 5],
            ..config(4)
        })
        .await
        .unwrap();

        let (mut link, _) = master.accept().await.unwrap();
        assert_eq!(
            read_frame(&mut link).await.unwrap(),
            Some(vec![0x53, 6, 0, 5])
        );

        write_frame(&mut link, &[0x53, 6, 0, 15]).await.unwrap();
        assert_eq!(
            next_event(&mut transport).await,
            NetworkEvent::MasterUnit {
                data: vec![0x53, 6, 0, 15]
            }
        );
        assert!(transport.is_connected_to_master());

        transport.send(OutboundCommand::SendToMaster {
            data: vec![0x53, 6, 0, 16],
        });
        assert_eq!(
            read_frame(&mut link).await.unwrap(),
            Some(vec![0x53, 6, 0, 16])
        );
        transport.shutdown();
    }
}

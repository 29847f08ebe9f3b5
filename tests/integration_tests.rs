//! Integration tests for the chat server components
//!
//! These tests drive the dispatcher, the relay bridge and the transport
//! together the way the tick loop does.

use chat_server::dispatcher::{ChatState, ConnectionEvent, MessageDispatcher, Outbound};
use chat_server::roster::{ConnectionId, Player};
use chat_shared::ids::PrivateChatResponse;
use chat_shared::messages::{
    decode_route, player_request, ChatMessage, FriendsList, MuteUpdate, NamedTarget, PlayerAdded,
    PrivateChatMessage, RelayMessage, TeamInviteNotice, TeamInviteResponse, TeamState,
};
use chat_shared::wire::{from_units, to_units};
use chat_shared::{ChatId, ObjectId, WireMessage, ZoneId};
use std::time::Duration;

fn added(id: ObjectId, name: &str, zone: ZoneId) -> Vec<u8> {
    PlayerAdded {
        player_id: id,
        name: name.into(),
        zone,
        mute_expiry: 0,
    }
    .encode()
    .unwrap()
}

/// Routed replies as (connection, target player, inner unit)
fn routed(out: &[Outbound]) -> Vec<(ConnectionId, ObjectId, Vec<u8>)> {
    out.iter()
        .filter_map(|effect| match effect {
            Outbound::Send { connection, data } => {
                let (target, inner) = decode_route(data).unwrap();
                Some((*connection, target, inner.to_vec()))
            }
            _ => None,
        })
        .collect()
}

/// PRESENCE TESTS
mod presence_tests {
    use super::*;

    /// Mute expiry is stored and unknown players are left alone
    #[test]
    fn mute_update_scenario() {
        let dispatcher = MessageDispatcher::new();
        let mut state = ChatState::default();
        dispatcher.handle_unit(&mut state, 1, &added(100, "Alice", ZoneId::new(1100, 0, 0)), 0);

        let expiry = 4_000_000_000;
        let mute = MuteUpdate {
            player_id: 100,
            expiry,
        }
        .encode()
        .unwrap();
        let out = dispatcher.handle_unit(&mut state, 1, &mute, 0);
        assert_eq!(state.roster.lookup(100).unwrap().muted_until, Some(expiry));
        assert!(state.roster.is_muted(100, 1_700_000_000));
        assert_eq!(
            out,
            vec![Outbound::Broadcast {
                data: mute,
                exclude: Some(1)
            }]
        );

        let unknown = MuteUpdate {
            player_id: 999,
            expiry,
        }
        .encode()
        .unwrap();
        assert!(dispatcher.handle_unit(&mut state, 1, &unknown, 0).is_empty());
        assert!(state.roster.lookup(999).is_err());
        assert_eq!(state.roster.len(), 1);
    }

    /// Replies follow a player to the world server that added them last
    #[test]
    fn route_to_latest_connection() {
        let dispatcher = MessageDispatcher::new();
        let mut state = ChatState::default();
        dispatcher.handle_unit(&mut state, 1, &added(7, "Gus", ZoneId::new(1000, 0, 0)), 0);
        dispatcher.handle_unit(&mut state, 2, &added(7, "Gus", ZoneId::new(1100, 0, 0)), 0);

        let request = player_request(ChatId::GetFriendsList, 7).unwrap();
        let out = dispatcher.handle_unit(&mut state, 2, &request, 0);
        let replies = routed(&out);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0, 2);
        assert_eq!(replies[0].1, 7);
        assert!(FriendsList::decode(&replies[0].2).unwrap().friends.is_empty());

        // The old connection going away must not take the player with it.
        dispatcher.handle_lifecycle(&mut state, 1, ConnectionEvent::Closed, 0);
        assert_eq!(state.roster.connection_of(7).unwrap(), 2);
    }

    /// Whispers reach the receiver's connection and echo to the sender
    #[test]
    fn private_chat_across_connections() {
        let dispatcher = MessageDispatcher::new();
        let mut state = ChatState::default();
        state.roster.insert_or_replace(Player::new(1, "Ann", 10, ZoneId::default()));
        state.roster.insert_or_replace(Player::new(2, "Ben", 20, ZoneId::default()));

        let whisper = PrivateChatMessage {
            routing_id: 1,
            channel: 7,
            sender_name: String::new(),
            sender_id: 0,
            receiver_name: "ben".into(),
            response: 0,
            text: to_units("psst"),
        }
        .encode()
        .unwrap();
        let replies = routed(&dispatcher.handle_unit(&mut state, 10, &whisper, 0));
        assert_eq!(replies.len(), 2);

        let echo = PrivateChatMessage::decode(&replies[0].2).unwrap();
        assert_eq!(replies[0].0, 10);
        assert_eq!(echo.response, PrivateChatResponse::Sent as u8);

        let delivered = PrivateChatMessage::decode(&replies[1].2).unwrap();
        assert_eq!(replies[1].0, 20);
        assert_eq!(delivered.sender_name, "Ann");
        assert_eq!(delivered.receiver_name, "Ben");
        assert_eq!(from_units(&delivered.text), "psst");
    }
}

/// TEAM TESTS
mod team_tests {
    use super::*;
    use chat_server::team::TeamError;

    /// Invite, accept, a refused kick and a successful kick
    #[test]
    fn team_lifecycle_scenario() {
        let dispatcher = MessageDispatcher::new();
        let mut state = ChatState::default();
        dispatcher.handle_unit(&mut state, 1, &added(1, "Ann", ZoneId::new(1100, 0, 0)), 0);
        dispatcher.handle_unit(&mut state, 1, &added(2, "Ben", ZoneId::new(1100, 0, 0)), 0);

        let invite = NamedTarget {
            player_id: 1,
            target_name: "Ben".into(),
        }
        .encode_as(ChatId::TeamInvite)
        .unwrap();
        let replies = routed(&dispatcher.handle_unit(&mut state, 1, &invite, 0));
        let notice = replies
            .iter()
            .find(|(_, target, _)| *target == 2)
            .map(|(_, _, inner)| TeamInviteNotice::decode(inner).unwrap())
            .unwrap();
        assert_eq!(notice.inviter_name, "Ann");
        assert_eq!(notice.inviter_id, 1);

        let accept = TeamInviteResponse {
            player_id: 2,
            declined: false,
            leader_id: 1,
        }
        .encode()
        .unwrap();
        let replies = routed(&dispatcher.handle_unit(&mut state, 1, &accept, 0));
        assert_eq!(replies.len(), 2);
        let team = TeamState::decode(&replies[0].2).unwrap();
        assert_eq!(team.leader_id, 1);
        assert_eq!(
            team.members.iter().map(|m| m.player_id).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(state.teams.team_of(1).unwrap().members, vec![1, 2]);

        assert!(matches!(state.teams.kick(2, 1), Err(TeamError::NotLeader)));
        let refused = NamedTarget {
            player_id: 2,
            target_name: "Ann".into(),
        }
        .encode_as(ChatId::TeamKick)
        .unwrap();
        assert!(dispatcher.handle_unit(&mut state, 1, &refused, 0).is_empty());
        assert_eq!(state.teams.team_of(1).unwrap().members, vec![1, 2]);

        let kick = NamedTarget {
            player_id: 1,
            target_name: "Ben".into(),
        }
        .encode_as(ChatId::TeamKick)
        .unwrap();
        let replies = routed(&dispatcher.handle_unit(&mut state, 1, &kick, 0));
        assert_eq!(state.teams.team_of(1).unwrap().members, vec![1]);
        assert!(state.teams.team_of(2).is_none());

        let left = replies
            .iter()
            .find(|(_, target, _)| *target == 2)
            .map(|(_, _, inner)| TeamState::decode(inner).unwrap())
            .unwrap();
        assert!(left.members.is_empty());
    }

    /// Team chat reaches every member and nobody else
    #[test]
    fn team_chat_reaches_members() {
        let dispatcher = MessageDispatcher::new();
        let mut state = ChatState::default();
        for (id, name) in [(1, "Ann"), (2, "Ben"), (3, "Cat")] {
            let unit = added(id, name, ZoneId::default());
            dispatcher.handle_unit(&mut state, id as ConnectionId, &unit, 0);
        }
        state.teams.create(1, ZoneId::default()).unwrap();
        state.teams.invite(1, 2, ZoneId::default()).unwrap();
        state.teams.invite_response(2, true).unwrap();

        let chat = ChatMessage {
            routing_id: 2,
            channel: chat_shared::ChatChannel::Team as u8,
            sender_name: String::new(),
            sender_id: 0,
            text: to_units("go left"),
        }
        .encode()
        .unwrap();
        let replies = routed(&dispatcher.handle_unit(&mut state, 2, &chat, 0));
        let targets: Vec<ObjectId> = replies.iter().map(|(_, target, _)| *target).collect();
        assert_eq!(targets, vec![1, 2]);
        let copy = ChatMessage::decode(&replies[0].2).unwrap();
        assert_eq!(copy.sender_name, "Ben");
        assert_eq!(copy.sender_id, 2);
        assert_eq!(from_units(&copy.text), "go left");
    }
}

/// WIRE FORMAT TESTS
mod wire_tests {
    use super::*;

    /// General chat text is written as a unit count followed by UCS-2 units
    #[test]
    fn chat_text_encoding_scenario() {
        let message = ChatMessage {
            routing_id: 5,
            channel: 4,
            sender_name: "Bob".into(),
            sender_id: 5,
            text: to_units("Hello"),
        };
        let unit = message.encode().unwrap();

        // header, routing id, channel
        let count_at = 8 + 8 + 1;
        assert_eq!(&unit[count_at..count_at + 4], &5u32.to_le_bytes());
        // count, sender name, sender id, padding
        let text_at = count_at + 4 + 33 * 2 + 8 + 3;
        let expected: Vec<u8> = "Hello"
            .encode_utf16()
            .flat_map(|unit| unit.to_le_bytes())
            .collect();
        assert_eq!(&unit[text_at..text_at + 10], expected.as_slice());

        let decoded = ChatMessage::decode(&unit).unwrap();
        assert_eq!(from_units(&decoded.text), "Hello");
        assert_eq!(decoded.sender_name, "Bob");
        assert_eq!(decoded, message);
    }
}

/// RELAY TESTS
mod relay_tests {
    use super::*;
    use chat_server::relay::{RelayBridge, RelayEvent, RELAY_EVENT_QUEUE};
    use tokio::sync::mpsc;

    /// Bridge channel messages fan out and peer relay messages reach the channel
    #[test]
    fn relay_scenario() {
        let (event_tx, event_rx) = mpsc::channel(RELAY_EVENT_QUEUE);
        let (line_tx, mut line_rx) = mpsc::unbounded_channel();
        let mut bridge = RelayBridge::new("#lobby", event_rx, line_tx);

        event_tx
            .try_send(RelayEvent::Message {
                sender: "X".into(),
                target: "#lobby".into(),
                text: "hi".into(),
            })
            .unwrap();
        let out = bridge.poll();
        let [Outbound::Broadcast { data, exclude }] = out.as_slice() else {
            panic!("expected a single broadcast, got {:?}", out);
        };
        assert_eq!(*exclude, None);
        assert_eq!(RelayMessage::decode(data).unwrap().sender, "X (IRC)");

        let dispatcher = MessageDispatcher::new();
        let mut state = ChatState::default();
        let forwarded = RelayMessage {
            sender: "Y".into(),
            text: "hi".into(),
        }
        .encode()
        .unwrap();
        let out = dispatcher.handle_unit(&mut state, 3, &forwarded, 0);
        assert!(out.contains(&Outbound::Broadcast {
            data: forwarded.clone(),
            exclude: Some(3)
        }));

        for effect in out {
            if let Outbound::Relay { line } = effect {
                bridge.send_line(line);
            }
        }
        let line = line_rx.try_recv().unwrap();
        assert_eq!(line.target, "#lobby");
        assert_eq!(line.text, "<Y> hi");
    }
}

/// NETWORK TESTS
mod network_tests {
    use super::*;
    use chat_server::network::{
        read_frame, write_frame, NetworkEvent, OutboundCommand, Transport, TransportConfig,
    };
    use tokio::net::TcpStream;
    use tokio::time::{sleep, timeout};

    /// Runs one tick worth of dispatching against the real transport
    fn pump(
        transport: &mut Transport,
        dispatcher: &MessageDispatcher,
        state: &mut ChatState,
    ) -> usize {
        let mut handled = 0;
        while let Some(event) = transport.try_recv() {
            handled += 1;
            let outbound = match event {
                NetworkEvent::Connected { connection } => {
                    dispatcher.handle_lifecycle(state, connection, ConnectionEvent::Opened, 0)
                }
                NetworkEvent::Closed { connection, lost } => {
                    let event = if lost {
                        ConnectionEvent::Lost
                    } else {
                        ConnectionEvent::Closed
                    };
                    dispatcher.handle_lifecycle(state, connection, event, 0)
                }
                NetworkEvent::Unit { connection, data } => {
                    dispatcher.handle_unit(state, connection, &data, 0)
                }
                NetworkEvent::MasterUnit { .. } => continue,
            };
            for effect in outbound {
                match effect {
                    Outbound::Send { connection, data } => {
                        transport.send(OutboundCommand::SendPacket { connection, data })
                    }
                    Outbound::Broadcast { data, exclude } => {
                        transport.send(OutboundCommand::BroadcastPacket { data, exclude })
                    }
                    Outbound::Relay { .. } => {}
                }
            }
        }
        handled
    }

    async fn pump_until(
        transport: &mut Transport,
        dispatcher: &MessageDispatcher,
        state: &mut ChatState,
        done: impl Fn(&ChatState) -> bool,
    ) {
        timeout(Duration::from_secs(5), async {
            loop {
                pump(transport, dispatcher, state);
                if done(state) {
                    return;
                }
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out pumping the transport");
    }

    /// Two world servers exchange a whisper through the chat server
    #[tokio::test]
    async fn whisper_between_world_servers() {
        let mut transport = Transport::bind(TransportConfig {
            bind_addr: "127.0.0.1:0".into(),
            max_clients: 8,
            master_addr: None,
            announcement: Vec::new(),
        })
        .await
        .unwrap();
        let dispatcher = MessageDispatcher::new();
        let mut state = ChatState::default();

        let mut world_a = TcpStream::connect(transport.local_addr()).await.unwrap();
        write_frame(&mut world_a, &added(1, "Ann", ZoneId::new(1000, 0, 0)))
            .await
            .unwrap();
        pump_until(&mut transport, &dispatcher, &mut state, |s| s.roster.contains(1)).await;

        let mut world_b = TcpStream::connect(transport.local_addr()).await.unwrap();
        write_frame(&mut world_b, &added(2, "Ben", ZoneId::new(1100, 0, 0)))
            .await
            .unwrap();
        pump_until(&mut transport, &dispatcher, &mut state, |s| s.roster.contains(2)).await;
        assert_ne!(
            state.roster.connection_of(1).unwrap(),
            state.roster.connection_of(2).unwrap()
        );

        let whisper = PrivateChatMessage {
            routing_id: 1,
            channel: 7,
            sender_name: "Ann".into(),
            sender_id: 1,
            receiver_name: "Ben".into(),
            response: 0,
            text: to_units("hello"),
        }
        .encode()
        .unwrap();
        write_frame(&mut world_a, &whisper).await.unwrap();

        timeout(Duration::from_secs(5), async {
            while pump(&mut transport, &dispatcher, &mut state) == 0 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("whisper was never dispatched");
        let received = timeout(Duration::from_secs(5), read_frame(&mut world_b))
            .await
            .expect("whisper never arrived")
            .unwrap()
            .unwrap();

        let (target, inner) = decode_route(&received).unwrap();
        assert_eq!(target, 2);
        let delivered = PrivateChatMessage::decode(inner).unwrap();
        assert_eq!(delivered.sender_name, "Ann");
        assert_eq!(
            delivered.response,
            PrivateChatResponse::ReceivedNewWhisper as u8
        );
        assert_eq!(from_units(&delivered.text), "hello");

        drop(world_a);
        pump_until(&mut transport, &dispatcher, &mut state, |s| !s.roster.contains(1)).await;
        assert!(state.roster.contains(2));
        transport.shutdown();
    }

    /// A one-byte frame from an open world server is just data
    #[tokio::test]
    async fn notice_byte_does_not_disconnect() {
        let mut transport = Transport::bind(TransportConfig {
            bind_addr: "127.0.0.1:0".into(),
            max_clients: 8,
            master_addr: None,
            announcement: Vec::new(),
        })
        .await
        .unwrap();
        let dispatcher = MessageDispatcher::new();
        let mut state = ChatState::default();

        let mut world = TcpStream::connect(transport.local_addr()).await.unwrap();
        write_frame(&mut world, &added(1, "Ann", ZoneId::new(1000, 0, 0)))
            .await
            .unwrap();
        pump_until(&mut transport, &dispatcher, &mut state, |s| s.roster.contains(1)).await;

        // Followed by a real unit so the pump can tell the byte was handled
        write_frame(&mut world, &[19]).await.unwrap();
        write_frame(&mut world, &added(2, "Ben", ZoneId::new(1000, 0, 0)))
            .await
            .unwrap();
        pump_until(&mut transport, &dispatcher, &mut state, |s| s.roster.contains(2)).await;
        assert!(state.roster.contains(1));

        drop(world);
        pump_until(&mut transport, &dispatcher, &mut state, |s| s.roster.is_empty()).await;
        transport.shutdown();
    }
}

//! Transcript Replayer
//!
//! Turns a stored transcript into the events pushed to a reconnecting client,
//! and into the ordered context that primes every generation call.

use super::protocol::ServerMessage;
use crate::models::{Message, MessageRole};
use phishshield_core::{Mode, generation::ChatTurn};

/// Events replayed to a client right after it binds to a resumed session.
/// `system` markers are not replayed.
pub fn client_replay(transcript: &[Message], mode: Mode) -> Vec<ServerMessage> {
    ordered(transcript)
        .into_iter()
        .filter_map(|m| match m.role {
            MessageRole::User => Some(ServerMessage::UserEcho {
                content: m.content.clone(),
                timestamp: m.created_at,
            }),
            MessageRole::Bot => Some(ServerMessage::bot_response(m, mode)),
            MessageRole::System => None,
        })
        .collect()
}

/// Context for one generation call: every earlier `user`/`bot` message in
/// ascending order, followed by the just-arrived user turn.
///
/// `pending` is that user turn as persisted; its stored copy is skipped so it
/// appears exactly once, last.
pub fn generation_context(transcript: &[Message], pending: &Message) -> Vec<ChatTurn> {
    let mut context: Vec<ChatTurn> = ordered(transcript)
        .into_iter()
        .filter(|m| m.id != pending.id && m.session_id == pending.session_id)
        .filter_map(|m| match m.role {
            MessageRole::User => Some(ChatTurn::requester(m.content.clone())),
            MessageRole::Bot => Some(ChatTurn::responder(m.content.clone())),
            MessageRole::System => None,
        })
        .collect();
    context.push(ChatTurn::requester(pending.content.clone()));
    context
}

fn ordered(transcript: &[Message]) -> Vec<&Message> {
    let mut messages: Vec<&Message> = transcript.iter().collect();
    messages.sort_by_key(|m| (m.created_at, m.id));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};
    use phishshield_core::generation::Speaker;
    use uuid::Uuid;

    fn transcript(session_id: Uuid) -> Vec<Message> {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        [
            (MessageRole::System, "New session started"),
            (MessageRole::User, "hello"),
            (MessageRole::Bot, "Hi, I'm PhishShield."),
            (MessageRole::User, "what is spoofing?"),
            (MessageRole::Bot, "A forged sender."),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, (role, content))| Message {
            id: i as i64 + 1,
            session_id,
            role,
            content: content.to_string(),
            created_at: start + TimeDelta::seconds(i as i64),
        })
        .collect()
    }

    #[test]
    fn client_replay_skips_markers_and_keeps_order() {
        let id = Uuid::new_v4();
        let mut messages = transcript(id);
        messages.reverse();

        let events = client_replay(&messages, Mode::Chat);

        assert_eq!(events.len(), 4);
        assert!(matches!(&events[0], ServerMessage::UserEcho { content, .. } if content == "hello"));
        assert!(matches!(
            &events[1],
            ServerMessage::BotResponse { content, session_id, mode: Mode::Chat, .. }
                if content == "Hi, I'm PhishShield." && *session_id == id
        ));
        assert!(matches!(&events[2], ServerMessage::UserEcho { content, .. } if content == "what is spoofing?"));
        assert!(matches!(&events[3], ServerMessage::BotResponse { content, .. } if content == "A forged sender."));
    }

    #[test]
    fn client_replay_of_fresh_session_is_empty() {
        let id = Uuid::new_v4();
        let messages = transcript(id)[..1].to_vec();
        assert!(client_replay(&messages, Mode::Quiz).is_empty());
    }

    #[test]
    fn generation_context_appends_pending_turn_once() {
        let id = Uuid::new_v4();
        let mut messages = transcript(id);
        let pending = Message {
            id: 99,
            session_id: id,
            role: MessageRole::User,
            content: "how do I report it?".to_string(),
            created_at: messages.last().unwrap().created_at + TimeDelta::seconds(1),
        };
        messages.push(pending.clone());

        let context = generation_context(&messages, &pending);

        let speakers: Vec<Speaker> = context.iter().map(|t| t.speaker).collect();
        assert_eq!(
            speakers,
            [
                Speaker::Requester,
                Speaker::Responder,
                Speaker::Requester,
                Speaker::Responder,
                Speaker::Requester
            ]
        );
        assert_eq!(context.first().unwrap().content, "hello");
        assert_eq!(context.last().unwrap().content, "how do I report it?");
        assert_eq!(
            context
                .iter()
                .filter(|t| t.content == "how do I report it?")
                .count(),
            1
        );
    }

    #[test]
    fn generation_context_ignores_other_sessions() {
        let id = Uuid::new_v4();
        let mut messages = transcript(id);
        let mut foreign = transcript(Uuid::new_v4());
        for m in &mut foreign {
            m.id += 100;
            m.content = format!("foreign {}", m.content);
        }
        messages.extend(foreign);
        let pending = Message {
            id: 500,
            session_id: id,
            role: MessageRole::User,
            content: "next".to_string(),
            created_at: Utc::now(),
        };

        let context = generation_context(&messages, &pending);
        assert_eq!(context.len(), 5);
        assert!(context.iter().all(|t| !t.content.starts_with("foreign")));
    }
}

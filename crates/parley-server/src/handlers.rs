//! Inbound frame processing — parse, validate, persist, relay.
//!
//! Every failure mode is operator-facing only: the sending client never
//! receives an error, the connection stays open, and nothing is retried.

use tracing::{error, warn};

use parley_core::{parse_chat, ChatAddr, FrameError, ServerEvent};
use parley_store::MessageRepo;

use crate::client::ClientRegistry;

/// What one inbound text frame produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Message accepted: persistence attempted, broadcast sent.
    Relayed,
    /// Well-formed frame of a kind the relay does not handle.
    Ignored,
    /// Frame dropped (malformed JSON or missing body); logged only.
    Dropped,
}

/// Process one inbound text frame from `addr`.
pub fn process_frame(
    registry: &ClientRegistry,
    repo: &MessageRepo,
    addr: &ChatAddr,
    text: &str,
) -> FrameOutcome {
    let chat = match parse_chat(text) {
        Ok(Some(chat)) => chat,
        Ok(None) => return FrameOutcome::Ignored,
        Err(err @ FrameError::MissingBody) => {
            error!(addr = %addr, "{err}");
            return FrameOutcome::Dropped;
        }
        Err(err) => {
            warn!(addr = %addr, error = %err, "failed to parse frame");
            return FrameOutcome::Dropped;
        }
    };

    // Fire-and-forget write: a failed insert is logged and the broadcast
    // still goes out.
    if let Err(err) = repo.append(addr, &chat.body, chat.sender.as_deref()) {
        error!(addr = %addr, error = %err, "failed to persist message");
    }

    registry.broadcast(&ServerEvent::relayed(addr, chat.body));
    FrameOutcome::Relayed
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_store::Database;

    fn setup() -> (ClientRegistry, MessageRepo) {
        let registry = ClientRegistry::new(32);
        let repo = MessageRepo::new(Database::in_memory().unwrap());
        (registry, repo)
    }

    fn addr(s: &str) -> ChatAddr {
        ChatAddr::from_raw(s)
    }

    #[test]
    fn valid_message_is_persisted_and_broadcast() {
        let (registry, repo) = setup();
        let (_sender, mut sender_rx) = registry.register(addr("1.2.3.4"), false);
        let (_other, mut other_rx) = registry.register(addr("5.6.7.8"), true);

        let outcome = process_frame(
            &registry,
            &repo,
            &addr("1.2.3.4"),
            r#"{"type":"message","message":"hi","sender":"alice"}"#,
        );
        assert_eq!(outcome, FrameOutcome::Relayed);

        // Stored under the sender's address with the declared label
        let history = repo.history(&addr("1.2.3.4")).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "hi");
        assert_eq!(history[0].sender.as_deref(), Some("alice"));

        // Broadcast to everyone, originator included, with the fixed tag
        for rx in [&mut sender_rx, &mut other_rx] {
            let json: serde_json::Value =
                serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
            assert_eq!(json["type"], "message");
            assert_eq!(json["message"], "hi");
            assert_eq!(json["ip"], "1.2.3.4");
            assert_eq!(json["sender"], "customer");
        }
    }

    #[test]
    fn declared_label_is_persisted_but_not_relayed() {
        let (registry, repo) = setup();
        let (_c, mut rx) = registry.register(addr("1.2.3.4"), false);

        process_frame(
            &registry,
            &repo,
            &addr("1.2.3.4"),
            r#"{"type":"message","message":"hi","sender":"spoofed-agent"}"#,
        );

        let history = repo.history(&addr("1.2.3.4")).unwrap();
        assert_eq!(history[0].sender.as_deref(), Some("spoofed-agent"));

        let json: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(json["sender"], "customer");
    }

    #[test]
    fn malformed_json_writes_and_sends_nothing() {
        let (registry, repo) = setup();
        let (_c, mut rx) = registry.register(addr("1.2.3.4"), false);

        let outcome = process_frame(&registry, &repo, &addr("1.2.3.4"), "{not json");
        assert_eq!(outcome, FrameOutcome::Dropped);
        assert_eq!(repo.count().unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unknown_kind_writes_and_sends_nothing() {
        let (registry, repo) = setup();
        let (_c, mut rx) = registry.register(addr("1.2.3.4"), false);

        let outcome = process_frame(
            &registry,
            &repo,
            &addr("1.2.3.4"),
            r#"{"type":"typing","message":"hi"}"#,
        );
        assert_eq!(outcome, FrameOutcome::Ignored);
        assert_eq!(repo.count().unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn missing_body_writes_and_sends_nothing() {
        let (registry, repo) = setup();
        let (_c, mut rx) = registry.register(addr("1.2.3.4"), false);

        let outcome = process_frame(
            &registry,
            &repo,
            &addr("1.2.3.4"),
            r#"{"type":"message","sender":"alice"}"#,
        );
        assert_eq!(outcome, FrameOutcome::Dropped);
        assert_eq!(repo.count().unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn empty_body_writes_and_sends_nothing() {
        let (registry, repo) = setup();
        let (_c, mut rx) = registry.register(addr("1.2.3.4"), false);

        let outcome = process_frame(
            &registry,
            &repo,
            &addr("1.2.3.4"),
            r#"{"type":"message","message":""}"#,
        );
        assert_eq!(outcome, FrameOutcome::Dropped);
        assert_eq!(repo.count().unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn message_without_label_relays_and_stores_null() {
        let (registry, repo) = setup();
        let (_c, mut rx) = registry.register(addr("1.2.3.4"), false);

        let outcome = process_frame(
            &registry,
            &repo,
            &addr("1.2.3.4"),
            r#"{"type":"message","message":"hi"}"#,
        );
        assert_eq!(outcome, FrameOutcome::Relayed);
        assert_eq!(repo.history(&addr("1.2.3.4")).unwrap()[0].sender, None);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn storage_failure_does_not_suppress_broadcast() {
        let registry = ClientRegistry::new(32);
        let db = Database::in_memory().unwrap();
        // Sabotage the store so every insert fails
        db.with_conn(|conn| {
            conn.execute("DROP TABLE messages", [])
                .map_err(parley_store::StoreError::from)?;
            Ok(())
        })
        .unwrap();
        let repo = MessageRepo::new(db);
        let (_c, mut rx) = registry.register(addr("1.2.3.4"), false);

        let outcome = process_frame(
            &registry,
            &repo,
            &addr("1.2.3.4"),
            r#"{"type":"message","message":"hi","sender":"alice"}"#,
        );
        assert_eq!(outcome, FrameOutcome::Relayed);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn broadcast_with_empty_registry_is_fine() {
        let (registry, repo) = setup();
        let outcome = process_frame(
            &registry,
            &repo,
            &addr("1.2.3.4"),
            r#"{"type":"message","message":"hi"}"#,
        );
        assert_eq!(outcome, FrameOutcome::Relayed);
        assert_eq!(repo.count().unwrap(), 1);
    }
}

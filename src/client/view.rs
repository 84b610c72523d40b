use std::collections::{BTreeMap, HashSet};

use time::OffsetDateTime;

use crate::db::{Message, MessageId, UserId};

/// A message shown optimistically before the server has stored it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    pub token: String,
    pub user_id: UserId,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// First sighting of a message sent by someone else (or history).
    Inserted,
    /// The stored copy of one of our pending messages.
    Confirmed,
    /// Already in the view; nothing changed.
    Duplicate,
}

#[derive(Debug, Clone, Copy)]
pub enum ViewItem<'a> {
    Confirmed(&'a Message),
    Pending(&'a Pending),
}

/// The client's ordered view of a room.
///
/// Stored messages are keyed by id, so history, broadcasts and ingress
/// responses can be merged in any order without duplicates. Pending entries
/// render after every stored message until their token is confirmed.
#[derive(Debug, Default)]
pub struct MessageView {
    confirmed: BTreeMap<(OffsetDateTime, MessageId), Message>,
    ids: HashSet<MessageId>,
    pending: Vec<Pending>,
}

impl MessageView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, message: Message, client_token: Option<&str>) -> Applied {
        let confirmed = client_token.is_some_and(|token| self.discard_pending(token));

        if !self.ids.insert(message.id.clone()) {
            return Applied::Duplicate;
        }
        self.confirmed.insert((message.created_at, message.id.clone()), message);

        if confirmed { Applied::Confirmed } else { Applied::Inserted }
    }

    /// Merges fetched history; returns how many messages were new.
    pub fn merge_history(&mut self, history: impl IntoIterator<Item = Message>) -> usize {
        let mut added = 0;
        for message in history {
            if self.apply(message, None) != Applied::Duplicate {
                added += 1;
            }
        }
        added
    }

    pub fn push_pending(&mut self, pending: Pending) {
        self.pending.push(pending);
    }

    pub fn discard_pending(&mut self, token: &str) -> bool {
        let Some(index) = self.pending.iter().position(|pending| pending.token == token) else {
            return false;
        };
        self.pending.remove(index);
        true
    }

    /// Stored messages in timeline order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.confirmed.values()
    }

    pub fn pending(&self) -> &[Pending] {
        &self.pending
    }

    pub fn items(&self) -> impl Iterator<Item = ViewItem<'_>> {
        self.messages()
            .map(ViewItem::Confirmed)
            .chain(self.pending.iter().map(ViewItem::Pending))
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.confirmed.len() + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;

    fn message(content: &str, offset_ms: i64) -> Message {
        let at = OffsetDateTime::UNIX_EPOCH + Duration::milliseconds(offset_ms);
        Message {
            id: MessageId::generate(),
            content: content.to_owned(),
            room_id: "r1".into(),
            user_id: "1".into(),
            created_at: at,
            updated_at: at,
        }
    }

    fn pending(token: &str, content: &str) -> Pending {
        Pending {
            token: token.to_owned(),
            user_id: "1".into(),
            content: content.to_owned(),
        }
    }

    fn contents(view: &MessageView) -> Vec<&str> {
        view.messages().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn orders_by_creation_time() {
        let mut view = MessageView::new();
        let late = message("late", 20);
        let early = message("early", 10);

        view.apply(late, None);
        view.apply(early, None);
        assert_eq!(contents(&view), ["early", "late"]);
    }

    #[test]
    fn echo_of_own_message_is_not_duplicated() {
        let mut view = MessageView::new();
        view.push_pending(pending("tok", "hi"));
        assert_eq!(view.len(), 1);

        let stored = message("hi", 5);
        assert_eq!(view.apply(stored.clone(), Some("tok")), Applied::Confirmed);
        assert_eq!(view.apply(stored, Some("tok")), Applied::Duplicate);

        assert!(view.pending().is_empty());
        assert_eq!(contents(&view), ["hi"]);
    }

    #[test]
    fn history_overlapping_live_messages_is_merged() {
        let mut view = MessageView::new();
        let a = message("a", 1);
        let b = message("b", 2);
        let c = message("c", 3);

        view.apply(c.clone(), None);
        assert_eq!(view.merge_history([a, b, c]), 2);
        assert_eq!(contents(&view), ["a", "b", "c"]);
    }

    #[test]
    fn pending_items_render_last() {
        let mut view = MessageView::new();
        view.push_pending(pending("tok", "draft"));
        view.apply(message("stored", 1), None);

        let rendered: Vec<_> = view
            .items()
            .map(|item| match item {
                ViewItem::Confirmed(m) => m.content.as_str(),
                ViewItem::Pending(p) => p.content.as_str(),
            })
            .collect();
        assert_eq!(rendered, ["stored", "draft"]);
    }

    #[test]
    fn discarding_unknown_token_is_a_no_op() {
        let mut view = MessageView::new();
        view.push_pending(pending("tok", "x"));
        assert!(!view.discard_pending("other"));
        assert!(view.discard_pending("tok"));
        assert!(view.is_empty());
    }
}

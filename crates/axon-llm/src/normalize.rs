//! Conversation repair for providers that demand strict turn alternation

use crate::types::{Message, Role};

/// Rewrite a history into `user, assistant, user, ...` order ending on `user`
///
/// Messages with empty content are dropped. When `supports_system_role` is
/// set, a leading system message is kept in front. An even number of
/// remaining turns cannot alternate while ending on the newest message as
/// `user`, so the oldest turn is discarded. Roles are then assigned by
/// distance from the end. The input is left untouched.
pub fn normalize_messages(messages: &[Message], supports_system_role: bool) -> Vec<Message> {
    let mut turns: Vec<Message> = messages.iter().filter(|m| !m.content.is_empty()).cloned().collect();

    if turns.is_empty() {
        return turns;
    }

    let system = if supports_system_role && turns[0].role == Role::System {
        Some(turns.remove(0))
    } else {
        None
    };

    if !turns.is_empty() && turns.len() % 2 == 0 {
        turns.remove(0);
    }

    let last = turns.len().saturating_sub(1);
    for (i, message) in turns.iter_mut().enumerate() {
        message.role = if (last - i) % 2 == 0 { Role::User } else { Role::Assistant };
    }

    system.into_iter().chain(turns).collect()
}

//! Deterministic room identity for an unordered pair of users.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Compute the canonical room id for a pair of users.
///
/// The lexicographically larger id goes first, each id is base64-encoded
/// independently, and the two encodings are joined with `-`. The standard
/// base64 alphabet never produces `-`, so an id containing the separator
/// cannot collide with a different pair.
///
/// This scheme is shared with the chat service itself: the room-existence
/// check, the create-room request, and the server-side room id must all
/// agree on it, so it has to stay stable across processes and releases.
pub fn one_to_one_room_id(user_a: &str, user_b: &str) -> String {
    let (first, second) = if user_b > user_a {
        (user_b, user_a)
    } else {
        (user_a, user_b)
    };
    format!("{}-{}", BASE64.encode(first), BASE64.encode(second))
}

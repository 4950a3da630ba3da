use rand::Rng;

use crate::json_crdt_patch::enums::session;

/// Session ids below this are left for reserved and hand-picked sessions.
pub const RESERVED_SESSIONS: u64 = 0xFFFF;

/// Draws a random session id in `[0xFFFF, 2^53 - 1]`.
pub fn random_session_id() -> u64 {
    rand::thread_rng().gen_range(RESERVED_SESSIONS..=session::MAX)
}

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Lower-case base-36 form of `n`, used for map keys that name a session or
/// a time.
pub fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_owned();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    out.into_iter().map(char::from).collect()
}

pub fn from_base36(s: &str) -> Option<u64> {
    if s.is_empty() {
        return None;
    }
    u64::from_str_radix(s, 36).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base36_matches_radix_parsing() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(123456789), "21i3v9");
        assert_eq!(from_base36("21i3v9"), Some(123456789));
        assert_eq!(from_base36(&to_base36(session::MAX)), Some(session::MAX));
        assert_eq!(from_base36(""), None);
        assert_eq!(from_base36("a_b"), None);
    }

    #[test]
    fn stays_in_range() {
        for _ in 0..100 {
            let sid = random_session_id();
            assert!(sid >= RESERVED_SESSIONS);
            assert!(sid <= session::MAX);
        }
    }

    #[test]
    fn draws_differ() {
        let a = random_session_id();
        let differs = (0..8).any(|_| random_session_id() != a);
        assert!(differs);
    }
}

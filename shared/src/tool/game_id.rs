//! 방 ID 생성
//!
//! 방은 고정 알파벳에서 뽑은 5자 ID로 식별됩니다.

use rand::Rng;

/// 방 ID에 쓰이는 문자 집합
const GAME_ID_CHARS: &[u8] = b"QWERTYUIOPASDFGHJKLZXCVBNMqwertyuiopasdfgjkzxcvbnm1234567890";

/// 방 ID 길이
pub const GAME_ID_LEN: usize = 5;

/// 5자 방 ID를 생성합니다.
pub fn generate_game_id() -> String {
    let mut rng = rand::thread_rng();
    (0..GAME_ID_LEN)
        .map(|_| GAME_ID_CHARS[rng.gen_range(0..GAME_ID_CHARS.len())] as char)
        .collect()
}

//! 도메인 메시지 정의
//!
//! 패킷에서 변환된 요청 메시지와 핸들러가 돌려주는 응답 메시지를
//! 하나의 열거형으로 표현합니다. 메시지 종류는 정적 열거형
//! [`MessageKind`]로 식별합니다.

use shared::protocol::ROOM_ID_LEN;

/// 메시지 종류 태그
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// 로그인 요청
    Login,
    /// 계정 생성 요청
    SignIn,
    /// 방 탐색 요청
    FindRoom,
    /// 방 ID 입장 요청
    JoinRoom,
    /// 비공개 방 생성 요청
    CreateRoom,
    /// 인증 응답
    Auth,
    /// 방 탐색 응답
    SearchRoom,
}

/// 도메인 메시지
#[derive(Debug, Clone)]
pub enum Message {
    Login {
        username: String,
        password: String,
    },
    SignIn {
        username: String,
        password: String,
    },
    FindRoom {
        room_type: u8,
    },
    JoinRoom {
        room_id: String,
    },
    CreateRoom {
        room_type: u8,
    },
    /// 인증 결과 (1 = 성공)
    Auth {
        success: u8,
    },
    /// 방 탐색 결과. `room_addr`는 방 서버 포트 문자열입니다.
    SearchRoom {
        success: u8,
        room_id: String,
        room_addr: String,
    },
}

impl Message {
    /// 메시지 종류를 반환합니다.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Login { .. } => MessageKind::Login,
            Message::SignIn { .. } => MessageKind::SignIn,
            Message::FindRoom { .. } => MessageKind::FindRoom,
            Message::JoinRoom { .. } => MessageKind::JoinRoom,
            Message::CreateRoom { .. } => MessageKind::CreateRoom,
            Message::Auth { .. } => MessageKind::Auth,
            Message::SearchRoom { .. } => MessageKind::SearchRoom,
        }
    }

    /// 요청 메시지의 유효성을 검사합니다.
    pub fn validate(&self) -> Result<(), &'static str> {
        match self {
            Message::Login { username, password } | Message::SignIn { username, password } => {
                if username.is_empty() || password.is_empty() {
                    return Err("아이디와 비밀번호는 필수입니다");
                }
                Ok(())
            }
            Message::FindRoom { room_type } | Message::CreateRoom { room_type } => {
                if *room_type >= 3 {
                    return Err("유효하지 않은 방 종류");
                }
                Ok(())
            }
            Message::JoinRoom { room_id } => {
                if room_id.len() != ROOM_ID_LEN {
                    return Err("유효하지 않은 방 ID");
                }
                Ok(())
            }
            Message::Auth { .. } | Message::SearchRoom { .. } => Ok(()),
        }
    }
}

//! 게임 바이너리 프로토콜
//!
//! 클라이언트와 서버 간 통신을 위한 패킷 프로토콜을 정의합니다.
//! 모든 패킷은 `[1바이트 버전][1바이트 코드][코드별 본문]` 형태이며
//! 멀티바이트 정수는 빅엔디안으로 기록됩니다.
//!
//! # 패킷 코드
//!
//! | 코드 | 이름 | 방향 |
//! |-----|------|------|
//! | 0  | Login          | 클라이언트 → 로비 |
//! | 1  | SignIn         | 클라이언트 → 로비 |
//! | 2  | Resp           | 로비 → 클라이언트 |
//! | 3  | RoomRequest    | 클라이언트 → 로비 |
//! | 4  | RoomCreate     | 클라이언트 → 로비 |
//! | 5  | RoomJoin       | 클라이언트 → 로비 |
//! | 6  | LookRoom       | 로비 → 클라이언트 |
//! | 7  | GameStart      | 방 → 클라이언트 |
//! | 8  | Action         | 클라이언트 → 방 |
//! | 9  | Board          | 방 → 클라이언트 (RLE 전체 보드) |
//! | 10 | Delta          | 방 → 클라이언트 (셀 단위 변경분) |
//! | 11 | GameClose      | 방 → 클라이언트 |
//! | 12 | EndGame        | 방 → 클라이언트 |
//! | 13 | SpellSelection | 클라이언트 → 방 |
//! | 14 | ShopRequest    | 클라이언트 → 방 |
//! | 15 | ShopResponse   | 방 → 클라이언트 |
//! | 16 | PurchaseItem   | 클라이언트 → 방 |
//!
//! TCP는 패킷 경계를 보존하지 않으므로 수신측은 연결별 수신 버퍼를
//! 유지하고 [`FrameBuffer`]로 디코드 루프를 돌려야 합니다.
//! 버퍼에 완전한 패킷이 없으면 [`ProtocolError::Incomplete`]가
//! 반환되며 이때 바이트는 소비되지 않습니다.

mod codec;
mod error;

pub use codec::FrameBuffer;
pub use error::ProtocolError;

use bytes::{BufMut, BytesMut};

/// 프로토콜 버전. 버전이 다른 패킷은 치명적 오류로 처리됩니다.
pub const PROTOCOL_VERSION: u8 = 1;

/// 방 ID 길이 (고정 5 ASCII 문자)
pub const ROOM_ID_LEN: usize = 5;

/// 보드 셀 하나의 변경분. 와이어에서는 3바이트로 직렬화됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delta {
    pub x: u8,
    pub y: u8,
    pub value: u8,
}

impl Delta {
    pub fn new(x: u8, y: u8, value: u8) -> Self {
        Self { x, y, value }
    }
}

/// 게임 패킷
///
/// 와이어 상의 모든 패킷 종류를 하나의 열거형으로 표현합니다.
/// `serialize`는 항상 완전한 프레임을 생성하고, `decode`는 바이트
/// 슬라이스 선두에서 패킷 하나를 읽어 `(패킷, 소비한 길이)`를
/// 돌려줍니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// 로그인 요청
    Login { username: String, password: String },
    /// 계정 생성 요청
    SignIn { username: String, password: String },
    /// 인증 응답 (1 = 성공)
    Resp { success: u8 },
    /// 방 탐색 요청 (room_type: 0=SOLO, 1=CLASSIC, 2=RANKED)
    RoomRequest { room_type: u8 },
    /// 비공개 방 생성 요청
    RoomCreate { room_type: u8 },
    /// 방 ID로 입장 요청
    RoomJoin { room_id: String },
    /// 방 탐색 응답. `room_addr`는 방 서버의 포트/주소 문자열이며
    /// 프레임 끝까지 이어집니다.
    LookRoom {
        success: u8,
        room_id: String,
        room_addr: String,
    },
    /// 게임 시작 통지 (0 = 정상)
    GameStart { success: u8 },
    /// 플레이어 행동 (0=없음 1=상 2=하 3=좌 4=우 5=대시 6=빙결 7=공격 전환)
    Action { action: u8 },
    /// RLE 인코딩된 전체 보드 + HUD 스탯
    Board {
        points: [u8; 2],
        health: u16,
        max_health: u16,
        mana: u16,
        max_mana: u16,
        level: u8,
        xp: u32,
        xp_needed: u32,
        encoded: Vec<u8>,
    },
    /// 틱 단위 변경분 방송
    Delta {
        tick: u32,
        points: [u8; 2],
        deltas: Vec<Delta>,
    },
    /// 게임 종료 통지 (0=승리 1=패배 2=서버 오류)
    GameClose { code: u8 },
    /// 게임 결과 (win: 1 = 승리)
    EndGame { win: u8 },
    /// 스펠 선택
    SpellSelection { spell1: u8, spell2: u8 },
    /// 상점 조회 요청
    ShopRequest,
    /// 상점/스탯 응답
    ShopResponse {
        health: u16,
        mana: u16,
        attack: u16,
        armor: u16,
        gold: u16,
        inventory: [u16; 6],
    },
    /// 아이템 구매 요청
    PurchaseItem { item_id: u16 },
}

impl Packet {
    /// 패킷 코드를 반환합니다.
    pub fn code(&self) -> u8 {
        match self {
            Packet::Login { .. } => 0,
            Packet::SignIn { .. } => 1,
            Packet::Resp { .. } => 2,
            Packet::RoomRequest { .. } => 3,
            Packet::RoomCreate { .. } => 4,
            Packet::RoomJoin { .. } => 5,
            Packet::LookRoom { .. } => 6,
            Packet::GameStart { .. } => 7,
            Packet::Action { .. } => 8,
            Packet::Board { .. } => 9,
            Packet::Delta { .. } => 10,
            Packet::GameClose { .. } => 11,
            Packet::EndGame { .. } => 12,
            Packet::SpellSelection { .. } => 13,
            Packet::ShopRequest => 14,
            Packet::ShopResponse { .. } => 15,
            Packet::PurchaseItem { .. } => 16,
        }
    }

    /// 패킷을 완전한 프레임으로 직렬화합니다.
    ///
    /// 부분 쓰기는 발생하지 않습니다. 호출자는 반환된 버퍼를 그대로
    /// 스트림에 기록하면 됩니다.
    pub fn serialize(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(16);
        buf.put_u8(PROTOCOL_VERSION);
        buf.put_u8(self.code());

        match self {
            Packet::Login { username, password } | Packet::SignIn { username, password } => {
                buf.put_u16(username.len() as u16);
                buf.put_slice(username.as_bytes());
                buf.put_u16(password.len() as u16);
                buf.put_slice(password.as_bytes());
            }
            Packet::Resp { success } => buf.put_u8(*success),
            Packet::RoomRequest { room_type } | Packet::RoomCreate { room_type } => {
                buf.put_u8(*room_type);
            }
            Packet::RoomJoin { room_id } => {
                buf.put_slice(pad_room_id(room_id).as_bytes());
            }
            Packet::LookRoom {
                success,
                room_id,
                room_addr,
            } => {
                buf.put_u8(*success);
                buf.put_slice(pad_room_id(room_id).as_bytes());
                buf.put_slice(room_addr.as_bytes());
            }
            Packet::GameStart { success } => buf.put_u8(*success),
            Packet::Action { action } => buf.put_u8(*action),
            Packet::Board {
                points,
                health,
                max_health,
                mana,
                max_mana,
                level,
                xp,
                xp_needed,
                encoded,
            } => {
                buf.put_u8(points[0]);
                buf.put_u8(points[1]);
                buf.put_u16(*health);
                buf.put_u16(*max_health);
                buf.put_u16(*mana);
                buf.put_u16(*max_mana);
                buf.put_u8(*level);
                buf.put_u32(*xp);
                buf.put_u32(*xp_needed);
                buf.put_u16(encoded.len() as u16);
                buf.put_slice(encoded);
            }
            Packet::Delta {
                tick,
                points,
                deltas,
            } => {
                buf.put_u32(*tick);
                buf.put_u8(points[0]);
                buf.put_u8(points[1]);
                buf.put_u16(deltas.len() as u16);
                for delta in deltas {
                    buf.put_u8(delta.x);
                    buf.put_u8(delta.y);
                    buf.put_u8(delta.value);
                }
            }
            Packet::GameClose { code } => buf.put_u8(*code),
            Packet::EndGame { win } => buf.put_u8(*win),
            Packet::SpellSelection { spell1, spell2 } => {
                buf.put_u8(*spell1);
                buf.put_u8(*spell2);
            }
            Packet::ShopRequest => {}
            Packet::ShopResponse {
                health,
                mana,
                attack,
                armor,
                gold,
                inventory,
            } => {
                buf.put_u16(*health);
                buf.put_u16(*mana);
                buf.put_u16(*attack);
                buf.put_u16(*armor);
                buf.put_u16(*gold);
                for slot in inventory {
                    buf.put_u16(*slot);
                }
            }
            Packet::PurchaseItem { item_id } => buf.put_u16(*item_id),
        }
        buf
    }

    /// 바이트 슬라이스 선두에서 패킷 하나를 디코드합니다.
    ///
    /// 성공 시 `(패킷, 소비한 바이트 수)`를 반환합니다. 버퍼가 아직
    /// 완전한 패킷을 담고 있지 않으면 [`ProtocolError::Incomplete`]를
    /// 반환하며, 이 경우 어떤 바이트도 소비된 것으로 간주하면 안
    /// 됩니다. 버전 불일치나 알 수 없는 코드는 치명적 오류입니다.
    pub fn decode(data: &[u8]) -> Result<(Packet, usize), ProtocolError> {
        if data.len() < 2 {
            return Err(ProtocolError::Incomplete);
        }
        if data[0] != PROTOCOL_VERSION {
            return Err(ProtocolError::BadVersion(data[0]));
        }

        match data[1] {
            code @ (0 | 1) => {
                let (username, after_user) = read_string16(data, 2)?;
                let (password, end) = read_string16(data, after_user)?;
                let packet = if code == 0 {
                    Packet::Login { username, password }
                } else {
                    Packet::SignIn { username, password }
                };
                Ok((packet, end))
            }
            2 => {
                let success = read_u8(data, 2)?;
                Ok((Packet::Resp { success }, 3))
            }
            3 => {
                let room_type = read_u8(data, 2)?;
                Ok((Packet::RoomRequest { room_type }, 3))
            }
            4 => {
                let room_type = read_u8(data, 2)?;
                Ok((Packet::RoomCreate { room_type }, 3))
            }
            5 => {
                let end = 2 + ROOM_ID_LEN;
                if data.len() < end {
                    return Err(ProtocolError::Incomplete);
                }
                let room_id = read_utf8(&data[2..end])?;
                Ok((Packet::RoomJoin { room_id }, end))
            }
            6 => {
                // LookRoom은 주소 문자열이 프레임 끝까지 이어지는 유일한
                // 패킷이라 버퍼 잔여분을 전부 소비한다.
                let id_end = 3 + ROOM_ID_LEN;
                if data.len() < id_end {
                    return Err(ProtocolError::Incomplete);
                }
                let success = data[2];
                let room_id = read_utf8(&data[3..id_end])?;
                let room_addr = read_utf8(&data[id_end..])?;
                Ok((
                    Packet::LookRoom {
                        success,
                        room_id,
                        room_addr,
                    },
                    data.len(),
                ))
            }
            7 => {
                let success = read_u8(data, 2)?;
                Ok((Packet::GameStart { success }, 3))
            }
            8 => {
                let action = read_u8(data, 2)?;
                Ok((Packet::Action { action }, 3))
            }
            9 => {
                if data.len() < 23 {
                    return Err(ProtocolError::Incomplete);
                }
                let length = read_u16(data, 21)? as usize;
                let end = 23 + length;
                if data.len() < end {
                    return Err(ProtocolError::Incomplete);
                }
                Ok((
                    Packet::Board {
                        points: [data[2], data[3]],
                        health: read_u16(data, 4)?,
                        max_health: read_u16(data, 6)?,
                        mana: read_u16(data, 8)?,
                        max_mana: read_u16(data, 10)?,
                        level: data[12],
                        xp: read_u32(data, 13)?,
                        xp_needed: read_u32(data, 17)?,
                        encoded: data[23..end].to_vec(),
                    },
                    end,
                ))
            }
            10 => {
                if data.len() < 10 {
                    return Err(ProtocolError::Incomplete);
                }
                let tick = read_u32(data, 2)?;
                let points = [data[6], data[7]];
                let count = read_u16(data, 8)? as usize;
                let end = 10 + count * 3;
                if data.len() < end {
                    return Err(ProtocolError::Incomplete);
                }
                let deltas = data[10..end]
                    .chunks_exact(3)
                    .map(|c| Delta::new(c[0], c[1], c[2]))
                    .collect();
                Ok((
                    Packet::Delta {
                        tick,
                        points,
                        deltas,
                    },
                    end,
                ))
            }
            11 => {
                let code = read_u8(data, 2)?;
                Ok((Packet::GameClose { code }, 3))
            }
            12 => {
                let win = read_u8(data, 2)?;
                Ok((Packet::EndGame { win }, 3))
            }
            13 => {
                if data.len() < 4 {
                    return Err(ProtocolError::Incomplete);
                }
                Ok((
                    Packet::SpellSelection {
                        spell1: data[2],
                        spell2: data[3],
                    },
                    4,
                ))
            }
            14 => Ok((Packet::ShopRequest, 2)),
            15 => {
                if data.len() < 24 {
                    return Err(ProtocolError::Incomplete);
                }
                let mut inventory = [0u16; 6];
                for (i, slot) in inventory.iter_mut().enumerate() {
                    *slot = read_u16(data, 12 + i * 2)?;
                }
                Ok((
                    Packet::ShopResponse {
                        health: read_u16(data, 2)?,
                        mana: read_u16(data, 4)?,
                        attack: read_u16(data, 6)?,
                        armor: read_u16(data, 8)?,
                        gold: read_u16(data, 10)?,
                        inventory,
                    },
                    24,
                ))
            }
            16 => {
                let item_id = read_u16(data, 2)?;
                Ok((Packet::PurchaseItem { item_id }, 4))
            }
            code => Err(ProtocolError::UnknownCode(code)),
        }
    }
}

/// 방 ID를 5자로 맞춥니다. 빈 ID는 공백 5자가 됩니다.
fn pad_room_id(room_id: &str) -> String {
    format!("{:<width$}", room_id, width = ROOM_ID_LEN)
        .chars()
        .take(ROOM_ID_LEN)
        .collect()
}

fn read_u8(data: &[u8], at: usize) -> Result<u8, ProtocolError> {
    data.get(at).copied().ok_or(ProtocolError::Incomplete)
}

fn read_u16(data: &[u8], at: usize) -> Result<u16, ProtocolError> {
    let bytes = data.get(at..at + 2).ok_or(ProtocolError::Incomplete)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], at: usize) -> Result<u32, ProtocolError> {
    let bytes = data.get(at..at + 4).ok_or(ProtocolError::Incomplete)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// `u16 길이 + 본문` 형태의 문자열을 읽어 `(문자열, 다음 오프셋)`을 반환합니다.
fn read_string16(data: &[u8], at: usize) -> Result<(String, usize), ProtocolError> {
    let len = read_u16(data, at)? as usize;
    let start = at + 2;
    let end = start + len;
    if data.len() < end {
        return Err(ProtocolError::Incomplete);
    }
    Ok((read_utf8(&data[start..end])?, end))
}

fn read_utf8(bytes: &[u8]) -> Result<String, ProtocolError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| ProtocolError::Malformed("utf-8이 아닌 문자열 필드"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(packet: Packet) {
        let bytes = packet.serialize();
        let (decoded, consumed) = Packet::decode(&bytes).expect("디코드 실패");
        assert_eq!(decoded, packet);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_login_roundtrip() {
        roundtrip(Packet::Login {
            username: "user".into(),
            password: "pass".into(),
        });
        roundtrip(Packet::SignIn {
            username: "신규유저".into(),
            password: "비밀번호".into(),
        });
    }

    #[test]
    fn test_resp_wire_bytes() {
        // 인증 성공 응답은 정확히 01 02 01 이어야 한다.
        let bytes = Packet::Resp { success: 1 }.serialize();
        assert_eq!(&bytes[..], &[0x01, 0x02, 0x01]);
    }

    #[test]
    fn test_fixed_size_roundtrips() {
        roundtrip(Packet::Resp { success: 0 });
        roundtrip(Packet::RoomRequest { room_type: 1 });
        roundtrip(Packet::RoomCreate { room_type: 2 });
        roundtrip(Packet::GameStart { success: 0 });
        roundtrip(Packet::Action { action: 5 });
        roundtrip(Packet::GameClose { code: 2 });
        roundtrip(Packet::EndGame { win: 1 });
        roundtrip(Packet::SpellSelection { spell1: 1, spell2: 2 });
        roundtrip(Packet::ShopRequest);
        roundtrip(Packet::PurchaseItem { item_id: 42 });
    }

    #[test]
    fn test_room_join_roundtrip() {
        roundtrip(Packet::RoomJoin {
            room_id: "Ab3Xz".into(),
        });
    }

    #[test]
    fn test_room_id_padding() {
        let bytes = Packet::LookRoom {
            success: 0,
            room_id: String::new(),
            room_addr: "50053".into(),
        }
        .serialize();
        // 빈 방 ID는 공백 5자로 채워진다.
        assert_eq!(&bytes[3..8], b"     ");
        let (decoded, _) = Packet::decode(&bytes).unwrap();
        match decoded {
            Packet::LookRoom {
                success,
                room_id,
                room_addr,
            } => {
                assert_eq!(success, 0);
                assert_eq!(room_id, "     ");
                assert_eq!(room_addr, "50053");
            }
            other => panic!("잘못된 패킷 종류: {other:?}"),
        }
    }

    #[test]
    fn test_board_roundtrip() {
        roundtrip(Packet::Board {
            points: [1, 2],
            health: 100,
            max_health: 120,
            mana: 40,
            max_mana: 50,
            level: 3,
            xp: 250,
            xp_needed: 400,
            encoded: b"0:50|0:50".to_vec(),
        });
    }

    #[test]
    fn test_delta_roundtrip() {
        roundtrip(Packet::Delta {
            tick: 777,
            points: [0, 1],
            deltas: vec![Delta::new(3, 4, 2), Delta::new(3, 5, 0)],
        });
    }

    #[test]
    fn test_shop_response_roundtrip() {
        roundtrip(Packet::ShopResponse {
            health: 120,
            mana: 60,
            attack: 15,
            armor: 8,
            gold: 210,
            inventory: [1, 3, 0, 0, 0, 0],
        });
    }

    #[test]
    fn test_incomplete_does_not_consume() {
        let full = Packet::Login {
            username: "user".into(),
            password: "pass".into(),
        }
        .serialize();
        for cut in 0..full.len() {
            let err = Packet::decode(&full[..cut]).unwrap_err();
            assert!(matches!(err, ProtocolError::Incomplete), "cut={cut}");
        }
    }

    #[test]
    fn test_bad_version_is_fatal() {
        let err = Packet::decode(&[2, 0, 0]).unwrap_err();
        assert!(matches!(err, ProtocolError::BadVersion(2)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unknown_code_is_fatal() {
        let err = Packet::decode(&[1, 99, 0]).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCode(99)));
        assert!(err.is_fatal());
    }
}

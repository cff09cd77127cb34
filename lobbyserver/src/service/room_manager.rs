//! 방 관리자
//!
//! 방 입장 요청의 수용 제어를 담당합니다. 방 종류별로 열린 방을
//! 추적하고, 자리가 없으면 새 방 프로세스를 띄우고 포트를 배정합니다.
//!
//! # 포트 풀
//!
//! 포트는 50053부터 단조 증가하며 50153을 넘으면 50053으로 되돌아
//! 갑니다. 순환이 아직 살아있는 방과 충돌할 수 있다는 한계가 있으며
//! (포트별 리스 테이블이 알려진 해법), 현 구현은 원 설계를 따릅니다.

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{info, warn};

use shared::tool::generate_game_id;

use crate::event::Message;
use crate::service::RoomSpawner;

/// 방 종류: 솔로 (1인)
pub const ROOM_SOLO: u8 = 0;
/// 방 종류: 클래식 (8인)
pub const ROOM_CLASSIC: u8 = 1;
/// 방 종류: 랭크 (4인)
pub const ROOM_RANKED: u8 = 2;

/// 포트 풀 시작
const PORT_POOL_START: u16 = 50053;
/// 포트 풀 끝 (포함)
const PORT_POOL_END: u16 = 50153;

/// 기본 맵 ID
const DEFAULT_MAP_ID: u8 = 1;

/// 방 종류별 최대 인원을 반환합니다.
fn max_players(room_type: u8) -> Option<u32> {
    match room_type {
        ROOM_SOLO => Some(1),
        ROOM_CLASSIC => Some(8),
        ROOM_RANKED => Some(4),
        _ => None,
    }
}

/// 아직 인원이 차지 않은 열린 방
#[derive(Debug, Clone)]
struct OpenRoom {
    port: u16,
    players_in: u32,
    max_players: u32,
}

/// 방 관리자
pub struct RoomManager {
    /// 방 종류별 열린 공개 방 목록
    open_rooms: DashMap<u8, Vec<OpenRoom>>,
    /// 방 ID로 찾는 비공개 방
    private_rooms: DashMap<String, OpenRoom>,
    /// 포트 카운터. 관리자 수명에 묶인 프로세스 범위 상태입니다.
    port_counter: Mutex<u16>,
    spawner: RoomSpawner,
}

impl RoomManager {
    pub fn new(spawner: RoomSpawner) -> Self {
        Self {
            open_rooms: DashMap::new(),
            private_rooms: DashMap::new(),
            port_counter: Mutex::new(PORT_POOL_START),
            spawner,
        }
    }

    /// 다음 포트를 배정합니다. 범위를 넘으면 처음으로 되돌아갑니다.
    fn allocate_port(&self) -> u16 {
        let mut counter = self.port_counter.lock();
        let port = *counter;
        *counter = if port >= PORT_POOL_END {
            PORT_POOL_START
        } else {
            port + 1
        };
        port
    }

    /// 방 탐색 요청을 처리합니다. 항상 `Message::SearchRoom`을 반환합니다.
    pub async fn handle_find_room(&self, msg: Message) -> Option<Message> {
        let room_type = match &msg {
            Message::FindRoom { room_type } => *room_type,
            _ => {
                warn!("방 관리자에 잘못된 메시지 종류: {:?}", msg.kind());
                return None;
            }
        };

        if let Err(reason) = msg.validate() {
            warn!("방 탐색 요청 거부: {}", reason);
            return Some(search_failure());
        }
        let capacity = max_players(room_type)?;

        info!("방 탐색: type={} capacity={}", room_type, capacity);

        // 솔로 방은 즉시 새 프로세스를 띄운다.
        if room_type == ROOM_SOLO {
            return Some(self.open_new_room(capacity).await);
        }

        // 자리가 남은 기존 방을 먼저 찾는다.
        if let Some(mut rooms) = self.open_rooms.get_mut(&room_type) {
            if let Some(idx) = rooms.iter().position(|r| r.players_in < r.max_players) {
                rooms[idx].players_in += 1;
                let room = rooms[idx].clone();
                info!(
                    "기존 방 배정: port={} players={}/{}",
                    room.port, room.players_in, room.max_players
                );

                if room.players_in == room.max_players {
                    info!("방 인원 충족, 대기열에서 제거: port={}", room.port);
                    rooms.remove(idx);
                }

                return Some(Message::SearchRoom {
                    success: 0,
                    room_id: String::new(),
                    room_addr: room.port.to_string(),
                });
            }
        }

        // 빈 방이 없으면 새로 연다.
        let reply = self.open_new_room(capacity).await;
        if let Message::SearchRoom {
            success: 0,
            ref room_addr,
            ..
        } = reply
        {
            if let Ok(port) = room_addr.parse::<u16>() {
                self.open_rooms.entry(room_type).or_default().push(OpenRoom {
                    port,
                    players_in: 1,
                    max_players: capacity,
                });
                info!("새 공개 방 등록: type={} port={}", room_type, port);
            }
        }
        Some(reply)
    }

    /// 방 ID로 비공개 방에 입장합니다.
    pub async fn handle_join_room(&self, msg: Message) -> Option<Message> {
        let room_id = match &msg {
            Message::JoinRoom { room_id } => room_id.clone(),
            _ => {
                warn!("방 관리자에 잘못된 메시지 종류: {:?}", msg.kind());
                return None;
            }
        };

        if let Err(reason) = msg.validate() {
            warn!("방 입장 요청 거부: {}", reason);
            return Some(search_failure());
        }

        let mut full = false;
        let reply = match self.private_rooms.get_mut(&room_id) {
            Some(mut room) if room.players_in < room.max_players => {
                room.players_in += 1;
                full = room.players_in == room.max_players;
                info!(
                    "비공개 방 입장: id={} port={} players={}/{}",
                    room_id, room.port, room.players_in, room.max_players
                );
                Message::SearchRoom {
                    success: 0,
                    room_id: room_id.clone(),
                    room_addr: room.port.to_string(),
                }
            }
            Some(_) => {
                warn!("비공개 방 인원 초과: id={}", room_id);
                search_failure()
            }
            None => {
                warn!("존재하지 않는 방 ID: {}", room_id);
                search_failure()
            }
        };

        if full {
            self.private_rooms.remove(&room_id);
        }
        Some(reply)
    }

    /// 비공개 방을 생성합니다. 생성된 5자 방 ID를 돌려줍니다.
    pub async fn handle_create_room(&self, msg: Message) -> Option<Message> {
        let room_type = match &msg {
            Message::CreateRoom { room_type } => *room_type,
            _ => {
                warn!("방 관리자에 잘못된 메시지 종류: {:?}", msg.kind());
                return None;
            }
        };

        if let Err(reason) = msg.validate() {
            warn!("방 생성 요청 거부: {}", reason);
            return Some(search_failure());
        }
        let capacity = max_players(room_type)?;

        let port = self.allocate_port();
        if let Err(e) = self.spawner.spawn(port, DEFAULT_MAP_ID, capacity).await {
            warn!("방 프로세스 실행 실패: port={} error={}", port, e);
            return Some(search_failure());
        }

        let room_id = generate_game_id();
        self.private_rooms.insert(
            room_id.clone(),
            OpenRoom {
                port,
                players_in: 1,
                max_players: capacity,
            },
        );
        info!("비공개 방 생성: id={} port={}", room_id, port);

        Some(Message::SearchRoom {
            success: 0,
            room_id,
            room_addr: port.to_string(),
        })
    }

    /// 새 방 프로세스를 띄우고 포트를 응답으로 돌려줍니다.
    async fn open_new_room(&self, capacity: u32) -> Message {
        let port = self.allocate_port();
        match self.spawner.spawn(port, DEFAULT_MAP_ID, capacity).await {
            Ok(()) => Message::SearchRoom {
                success: 0,
                room_id: String::new(),
                room_addr: port.to_string(),
            },
            Err(e) => {
                warn!("방 프로세스 실행 실패: port={} error={}", port, e);
                search_failure()
            }
        }
    }
}

/// 수용 실패 응답
fn search_failure() -> Message {
    Message::SearchRoom {
        success: 1,
        room_id: String::new(),
        room_addr: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> RoomManager {
        // 존재하지 않는 바이너리: spawn은 실패하지만 포트 배정 로직은
        // 독립적으로 검증할 수 있다.
        RoomManager::new(RoomSpawner::new("/nonexistent/roomserver".into()))
    }

    #[test]
    fn test_port_pool_wraps() {
        let mgr = manager();
        let first = mgr.allocate_port();
        assert_eq!(first, PORT_POOL_START);

        for _ in 0..(PORT_POOL_END - PORT_POOL_START) {
            mgr.allocate_port();
        }
        // 풀 전체를 소진하면 처음으로 되돌아간다.
        assert_eq!(mgr.allocate_port(), PORT_POOL_START);
    }

    #[test]
    fn test_max_players_table() {
        assert_eq!(max_players(ROOM_SOLO), Some(1));
        assert_eq!(max_players(ROOM_CLASSIC), Some(8));
        assert_eq!(max_players(ROOM_RANKED), Some(4));
        assert_eq!(max_players(9), None);
    }

    #[tokio::test]
    async fn test_spawn_failure_reports_capacity_error() {
        let mgr = manager();
        let reply = mgr
            .handle_find_room(Message::FindRoom {
                room_type: ROOM_SOLO,
            })
            .await;
        match reply {
            Some(Message::SearchRoom { success, .. }) => assert_eq!(success, 1),
            other => panic!("예상하지 못한 응답: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_join_unknown_room() {
        let mgr = manager();
        let reply = mgr
            .handle_join_room(Message::JoinRoom {
                room_id: "Ab3Xz".into(),
            })
            .await;
        match reply {
            Some(Message::SearchRoom { success, .. }) => assert_eq!(success, 1),
            other => panic!("예상하지 못한 응답: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_join_fills_and_removes_room() {
        let mgr = manager();
        mgr.private_rooms.insert(
            "Ab3Xz".to_string(),
            OpenRoom {
                port: 50060,
                players_in: 1,
                max_players: 2,
            },
        );

        let reply = mgr
            .handle_join_room(Message::JoinRoom {
                room_id: "Ab3Xz".into(),
            })
            .await;
        match reply {
            Some(Message::SearchRoom {
                success, room_addr, ..
            }) => {
                assert_eq!(success, 0);
                assert_eq!(room_addr, "50060");
            }
            other => panic!("예상하지 못한 응답: {other:?}"),
        }

        // 인원이 차면 목록에서 제거되어 재입장이 거부된다.
        let reply = mgr
            .handle_join_room(Message::JoinRoom {
                room_id: "Ab3Xz".into(),
            })
            .await;
        match reply {
            Some(Message::SearchRoom { success, .. }) => assert_eq!(success, 1),
            other => panic!("예상하지 못한 응답: {other:?}"),
        }
    }
}

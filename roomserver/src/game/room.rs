//! 게임 방
//!
//! 연결 수용, 행동 수신, 50ms 틱 루프, 상태 방송, 종료 조건을
//! 담당하는 방 하나의 런타임입니다.
//!
//! # 태스크 구성
//!
//! - 연결마다 리더 태스크 하나: 패킷을 디코드해 행동은 공용 행동
//!   채널로 넘기고, 상점/스펠 패킷은 즉시 처리합니다.
//! - 행동 디스패치 태스크 하나: 방 뮤텍스 아래에서 해당 플레이어의
//!   대기 행동을 덮어씁니다 (틱이 소비할 때까지 최신 행동이 이김).
//! - 틱 태스크 하나: 50ms마다 시뮬레이션을 진행하고 방송합니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use shared::protocol::{FrameBuffer, Packet};

use super::board::{run_length_encode, Board, COLS, ROWS};
use super::player::PlayerStats;
use super::shop;

/// 틱 주기
const TICK_INTERVAL: std::time::Duration = std::time::Duration::from_millis(50);

/// 경기를 끝내는 점수
const WINNING_SCORE: u8 = 3;

/// 시작 방송 후 틱 루프 전 대기
const START_GRACE: std::time::Duration = std::time::Duration::from_secs(1);

/// 리더 태스크가 방으로 넘기는 행동 메시지
#[derive(Debug)]
pub struct ActionMsg {
    pub addr: String,
    pub action: u8,
}

type SharedWriter = Arc<Mutex<BufWriter<OwnedWriteHalf>>>;

/// 방이 공유하는 가변 게임 상태
pub struct RoomState {
    pub board: Board,
    pub points: [u8; 2],
    /// 원격 주소 → 플레이어 슬롯 인덱스
    pub player_by_addr: HashMap<String, usize>,
}

/// 연결 하나의 쓰기 핸들
struct PlayerConnection {
    addr: String,
    writer: SharedWriter,
}

/// 게임 방
pub struct GameRoom {
    game_id: String,
    room_size: usize,
    state: Arc<Mutex<RoomState>>,
    connections: Vec<PlayerConnection>,
    tick: Arc<AtomicU32>,
    action_tx: mpsc::UnboundedSender<ActionMsg>,
    action_rx: Option<mpsc::UnboundedReceiver<ActionMsg>>,
}

impl GameRoom {
    /// 보드가 준비된 방을 만듭니다. `room_size`는 수용할 연결 수입니다.
    pub fn new(game_id: String, room_size: usize, board: Board) -> Self {
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        Self {
            game_id,
            room_size,
            state: Arc::new(Mutex::new(RoomState {
                board,
                points: [0, 0],
                player_by_addr: HashMap::new(),
            })),
            connections: Vec::new(),
            tick: Arc::new(AtomicU32::new(0)),
            action_tx,
            action_rx: Some(action_rx),
        }
    }

    /// 현재 수용된 연결 수
    pub fn players_in(&self) -> usize {
        self.connections.len()
    }

    /// 방이 가득 찼는지 여부
    pub fn is_full(&self) -> bool {
        self.connections.len() >= self.room_size
    }

    /// 연결을 다음 빈 플레이어 슬롯에 배정하고 리더 태스크를 띄웁니다.
    pub async fn add_player(&mut self, stream: TcpStream, addr: String) -> Result<()> {
        if self.is_full() {
            return Err(anyhow!("방이 가득 참: {}", self.game_id));
        }
        let idx = self.connections.len();

        let (read_half, write_half) = stream.into_split();
        let writer: SharedWriter = Arc::new(Mutex::new(BufWriter::new(write_half)));

        self.state.lock().await.player_by_addr.insert(addr.clone(), idx);
        self.connections.push(PlayerConnection {
            addr: addr.clone(),
            writer: writer.clone(),
        });

        let state = self.state.clone();
        let action_tx = self.action_tx.clone();
        let game_id = self.game_id.clone();
        tokio::spawn(async move {
            reader_loop(read_half, writer, state, action_tx, addr, idx, game_id).await;
        });

        info!("플레이어 입장: room={} slot={}", self.game_id, idx);
        Ok(())
    }

    /// 게임을 시작합니다. 정원이 찰 때까지 호출하면 안 됩니다.
    ///
    /// 시작 방송 → 초기 전체 보드 전송 → 1초 대기 → 틱 루프.
    /// 정상 종료(3점) 또는 방송 실패까지 블록합니다.
    pub async fn start_game(&mut self) -> Result<()> {
        if !self.is_full() {
            return Err(anyhow!("정원 미달로 시작할 수 없음: {}", self.game_id));
        }
        info!("게임 시작: room={} players={}", self.game_id, self.room_size);

        self.broadcast_same(&Packet::GameStart { success: 0 }).await?;
        self.send_full_board().await?;
        tokio::time::sleep(START_GRACE).await;

        // 행동 디스패치 태스크
        let mut action_rx = self
            .action_rx
            .take()
            .ok_or_else(|| anyhow!("행동 채널이 이미 소비됨"))?;
        let dispatch_state = self.state.clone();
        let dispatch_id = self.game_id.clone();
        tokio::spawn(async move {
            while let Some(msg) = action_rx.recv().await {
                let mut state = dispatch_state.lock().await;
                let slot = state.player_by_addr.get(&msg.addr).copied();
                match slot.and_then(|idx| state.board.players.get_mut(idx)) {
                    Some(player) => player.action = msg.action.into(),
                    None => {
                        warn!("연결에 대응하는 플레이어 없음: room={} addr={}", dispatch_id, msg.addr);
                    }
                }
            }
            debug!("행동 디스패치 종료: room={}", dispatch_id);
        });

        // 틱 루프
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let tick = self.tick.fetch_add(1, Ordering::Relaxed) + 1;

            let finished = {
                let mut state = self.state.lock().await;

                state.board.replace_hidden_flag();
                state.board.update_sprites();

                for idx in 0..state.board.players.len() {
                    if state.board.take_player_action(idx) {
                        let team = state.board.players[idx].team;
                        award_point(&mut state.points, team);
                    }
                }
                for idx in 0..state.board.bots.len() {
                    if state.board.take_bot_action(idx, tick) {
                        let team = state.board.bots[idx].player.team;
                        award_point(&mut state.points, team);
                    }
                }

                state.board.update();
                state.points[0] >= WINNING_SCORE || state.points[1] >= WINNING_SCORE
            };

            if let Err(e) = self.broadcast_state(tick).await {
                error!("상태 방송 실패, 게임 종료: room={} error={:#}", self.game_id, e);
                self.close_game(2).await;
                return Err(e);
            }

            if finished {
                info!("경기 종료: room={}", self.game_id);
                self.finish_match().await;
                return Ok(());
            }
        }
    }

    /// 틱 하나의 변경분 또는 전체 보드를 방송하고 추적기를 비웁니다.
    ///
    /// 변경분이 보드 절반을 넘으면 전체 프레임을 보냅니다.
    async fn broadcast_state(&self, tick: u32) -> Result<()> {
        let (deltas, points, full) = {
            let state = self.state.lock().await;
            let deltas = state.board.tracker.to_vec();
            let full = needs_full_frame(deltas.len());
            (deltas, state.points, full)
        };

        let result = if full {
            info!("전체 보드 재전송: room={} deltas={}", self.game_id, deltas.len());
            self.send_full_board().await
        } else {
            self.broadcast_same(&Packet::Delta {
                tick,
                points: [points[0], points[1]],
                deltas,
            })
            .await
        };

        self.state.lock().await.board.tracker.reset();
        result
    }

    /// 전체 보드를 플레이어별 HUD 스탯과 함께 전송합니다.
    async fn send_full_board(&self) -> Result<()> {
        let (encoded, points, stats) = {
            let state = self.state.lock().await;
            let encoded = run_length_encode(&state.board.current_grid());
            let stats: Vec<PlayerStats> = state
                .board
                .players
                .iter()
                .map(|p| p.stats.clone())
                .collect();
            (encoded, state.points, stats)
        };

        for (idx, conn) in self.connections.iter().enumerate() {
            let default_stats = PlayerStats::default();
            let player_stats = stats.get(idx).unwrap_or(&default_stats);
            let packet = Packet::Board {
                points: [points[0], points[1]],
                health: player_stats.health,
                max_health: player_stats.max_health,
                mana: player_stats.mana,
                max_mana: player_stats.max_mana,
                level: player_stats.level,
                xp: player_stats.xp,
                xp_needed: player_stats.xp_needed,
                encoded: encoded.clone(),
            };
            write_packet(&conn.writer, &packet)
                .await
                .with_context(|| format!("보드 전송 실패: {}", conn.addr))?;
        }
        Ok(())
    }

    /// 모든 연결에 같은 패킷을 전송합니다.
    async fn broadcast_same(&self, packet: &Packet) -> Result<()> {
        for conn in &self.connections {
            write_packet(&conn.writer, packet)
                .await
                .with_context(|| format!("방송 실패: {}", conn.addr))?;
        }
        Ok(())
    }

    /// 정상 종료: 플레이어별 승패 통지 후 연결을 닫습니다.
    async fn finish_match(&self) {
        let (points, teams) = {
            let state = self.state.lock().await;
            let teams: Vec<u8> = state.board.players.iter().map(|p| p.team).collect();
            (state.points, teams)
        };
        let winning_team: u8 = if points[0] >= WINNING_SCORE { 6 } else { 7 };

        for (idx, conn) in self.connections.iter().enumerate() {
            let win = teams.get(idx).map(|t| *t == winning_team).unwrap_or(false);
            let packet = Packet::EndGame { win: win as u8 };
            if let Err(e) = write_packet(&conn.writer, &packet).await {
                warn!("승패 통지 실패: addr={} error={}", conn.addr, e);
            }
        }
        self.close_game(1).await;
    }

    /// `GameClose`를 방송하고 모든 연결을 닫습니다.
    pub async fn close_game(&self, code: u8) {
        info!("방 닫기: room={} code={}", self.game_id, code);
        let packet = Packet::GameClose { code };
        for conn in &self.connections {
            if let Err(e) = write_packet(&conn.writer, &packet).await {
                warn!("종료 통지 실패: addr={} error={}", conn.addr, e);
            }
            let mut writer = conn.writer.lock().await;
            if let Err(e) = writer.shutdown().await {
                debug!("연결 종료 실패: addr={} error={}", conn.addr, e);
            }
        }
    }
}

/// 변경분이 보드 절반을 넘으면 전체 프레임을 보낸다.
pub fn needs_full_frame(delta_count: usize) -> bool {
    delta_count > (ROWS * COLS) / 2
}

/// 팀 득점을 반영합니다. 팀 6 → 첫 슬롯, 팀 7 → 둘째 슬롯.
fn award_point(points: &mut [u8; 2], team: u8) {
    match team {
        6 => points[0] += 1,
        7 => points[1] += 1,
        other => warn!("알 수 없는 팀 득점: {}", other),
    }
}

/// 패킷 하나를 쓰고 플러시합니다.
async fn write_packet(writer: &SharedWriter, packet: &Packet) -> Result<()> {
    let data = packet.serialize();
    let mut writer = writer.lock().await;
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

/// 연결 하나의 수신 루프.
///
/// 행동 패킷은 행동 채널로 넘기고, 스펠 선택과 상점 요청은 방 상태를
/// 잠가 즉시 처리합니다. 전송 오류나 EOF면 조용히 종료합니다 (방은
/// 다음 방송 실패에서 경기를 끝냅니다).
async fn reader_loop(
    read_half: OwnedReadHalf,
    writer: SharedWriter,
    state: Arc<Mutex<RoomState>>,
    action_tx: mpsc::UnboundedSender<ActionMsg>,
    addr: String,
    idx: usize,
    game_id: String,
) {
    let mut reader = BufReader::new(read_half);
    let mut buffer = FrameBuffer::new();
    let mut read_buf = [0u8; 1024];

    loop {
        let n = match reader.read(&mut read_buf).await {
            Ok(0) => {
                info!("클라이언트 연결 종료: room={} addr={}", game_id, addr);
                return;
            }
            Ok(n) => n,
            Err(e) => {
                warn!("연결 읽기 오류: room={} addr={} error={}", game_id, addr, e);
                return;
            }
        };
        buffer.extend(&read_buf[..n]);

        loop {
            match buffer.next_packet() {
                Ok(Some(Packet::Action { action })) => {
                    if action_tx
                        .send(ActionMsg {
                            addr: addr.clone(),
                            action,
                        })
                        .is_err()
                    {
                        debug!("행동 채널 닫힘: room={}", game_id);
                        return;
                    }
                }
                Ok(Some(Packet::SpellSelection { spell1, spell2 })) => {
                    let mut state = state.lock().await;
                    if let Some(player) = state.board.players.get_mut(idx) {
                        player.loadout = (spell1, spell2);
                        debug!(
                            "스펠 선택: room={} slot={} spells=({}, {})",
                            game_id, idx, spell1, spell2
                        );
                    }
                }
                Ok(Some(Packet::ShopRequest)) => {
                    let reply = {
                        let state = state.lock().await;
                        state.board.players.get(idx).map(|p| shop_response(&p.stats))
                    };
                    if let Some(reply) = reply {
                        if let Err(e) = write_packet(&writer, &reply).await {
                            warn!("상점 응답 실패: addr={} error={}", addr, e);
                            return;
                        }
                    }
                }
                Ok(Some(Packet::PurchaseItem { item_id })) => {
                    let reply = {
                        let mut state = state.lock().await;
                        state.board.players.get_mut(idx).map(|p| {
                            if !shop::purchase(&mut p.stats, item_id) {
                                debug!("구매 거부: slot={} item={}", idx, item_id);
                            }
                            shop_response(&p.stats)
                        })
                    };
                    if let Some(reply) = reply {
                        if let Err(e) = write_packet(&writer, &reply).await {
                            warn!("상점 응답 실패: addr={} error={}", addr, e);
                            return;
                        }
                    }
                }
                Ok(Some(other)) => {
                    debug!(
                        "방이 처리하지 않는 패킷: room={} addr={} code={}",
                        game_id,
                        addr,
                        other.code()
                    );
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(
                        "프로토콜 오류, 버퍼 폐기: room={} addr={} error={}",
                        game_id, addr, e
                    );
                    buffer.clear();
                    break;
                }
            }
        }
    }
}

/// 스탯에서 상점 응답 패킷을 만듭니다.
fn shop_response(stats: &PlayerStats) -> Packet {
    Packet::ShopResponse {
        health: stats.health,
        mana: stats.mana,
        attack: stats.attack,
        armor: stats.armor,
        gold: stats.gold,
        inventory: stats.inventory,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::cell::Cell;
    use crate::game::player::Player;

    fn room_with_players(count: usize) -> GameRoom {
        let players: Vec<Player> = (0..count)
            .map(|i| Player {
                number: Cell(2 + i as u8),
                team: if i % 2 == 0 { 6 } else { 7 },
                x: 1 + i as i32,
                y: 1,
                ..Default::default()
            })
            .collect();
        let board = Board::init(&[], Vec::new(), players, Vec::new());
        GameRoom::new("TesT1".into(), count, board)
    }

    #[test]
    fn test_award_point_by_team() {
        let mut points = [0u8; 2];
        award_point(&mut points, 6);
        award_point(&mut points, 7);
        award_point(&mut points, 6);
        assert_eq!(points, [2, 1]);
    }

    #[test]
    fn test_room_capacity_tracking() {
        let room = room_with_players(2);
        assert_eq!(room.players_in(), 0);
        assert!(!room.is_full());
    }

    #[tokio::test]
    async fn test_add_player_binds_slots_in_order() {
        let mut room = room_with_players(2);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        for i in 0..2 {
            let client = tokio::net::TcpStream::connect(("127.0.0.1", port))
                .await
                .unwrap();
            let (server_side, _) = listener.accept().await.unwrap();
            let addr = format!("127.0.0.1:{}", 40000 + i);
            room.add_player(server_side, addr.clone()).await.unwrap();

            let state = room.state.lock().await;
            assert_eq!(state.player_by_addr.get(&addr).copied(), Some(i));
            drop(state);
            drop(client);
        }

        assert!(room.is_full());
        let extra = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .unwrap();
        let (server_side, _) = listener.accept().await.unwrap();
        assert!(room
            .add_player(server_side, "127.0.0.1:49999".into())
            .await
            .is_err());
        drop(extra);
    }
}

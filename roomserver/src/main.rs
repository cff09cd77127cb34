//! 방 서버 진입점
//!
//! 로비가 `--port <p> --map <id> --players <n>` 플래그로 띄우는 방
//! 하나짜리 프로세스입니다. 정원만큼 TCP 연결을 받은 뒤 게임을
//! 시작하고, 경기가 끝나면 종료합니다.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use roomserver::config::{CliArgs, MapConfig};
use roomserver::game::board::Board;
use roomserver::game::room::GameRoom;

#[tokio::main]
async fn main() -> Result<()> {
    let env = std::env::var("ENV").unwrap_or_else(|_| "PROD".to_string());
    shared::logging::init(&env);

    let args = CliArgs::parse();
    info!(
        "방 서버 시작: port={} map={} players={}",
        args.port, args.map_id, args.players
    );

    let mut config = MapConfig::load(args.map_id)?;

    // 맵이 제공하는 슬롯보다 많은 인원은 받지 않는다.
    let room_size = (args.players as usize).min(config.players.len()).max(1);
    if room_size < args.players as usize {
        info!(
            "맵 슬롯 제한으로 정원 축소: 요청 {} → {}",
            args.players, room_size
        );
    }
    config.players.truncate(room_size);

    let board = Board::init(&config.walls, config.flags, config.players, config.bots);
    let game_id = shared::tool::generate_game_id();
    let mut room = GameRoom::new(game_id.clone(), room_size, board);

    let bind_addr = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("방 리스너 바인드 실패: {}", bind_addr))?;
    info!("✅ 방 {}이 {}에서 대기 중입니다", game_id, bind_addr);

    // 정원이 찰 때까지 연결을 받는다.
    while !room.is_full() {
        match listener.accept().await {
            Ok((stream, addr)) => {
                if let Err(e) = room.add_player(stream, addr.to_string()).await {
                    error!("플레이어 수용 실패: {:#}", e);
                }
            }
            Err(e) => {
                error!("연결 수락 실패: {}", e);
            }
        }
    }

    match room.start_game().await {
        Ok(()) => info!("경기 정상 종료: room={}", game_id),
        Err(e) => error!("경기 비정상 종료: room={} error={:#}", game_id, e),
    }
    Ok(())
}

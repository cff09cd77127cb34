//! 방 서버 설정 모듈
//!
//! CLI 플래그와 맵 설정 JSON 로드를 담당합니다. 맵 파일은 방 시작 시
//! 한 번만 읽으며 틱 루프 안에서는 디스크 I/O가 없습니다.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::info;

use crate::game::bot::Bot;
use crate::game::items::{Flag, WallPosition};
use crate::game::player::Player;

/// 방 서버 CLI 인자
///
/// 로비의 방 관리자가 방 프로세스를 띄울 때 전달합니다.
#[derive(Parser, Debug)]
#[command(author, version, about = "CTF 게임 방 서버")]
pub struct CliArgs {
    /// 리슨할 TCP 포트
    #[arg(long = "port", value_name = "PORT")]
    pub port: u16,

    /// 사용할 맵 ID
    #[arg(long = "map", value_name = "MAP_ID", default_value_t = 1)]
    pub map_id: u8,

    /// 수용할 플레이어 수
    #[arg(long = "players", value_name = "N", default_value_t = 1)]
    pub players: u32,
}

/// 맵 설정
///
/// ```json
/// {
///   "walls":   [{"StartPos":[y,x],"EndPos":[y,x]}],
///   "flags":   [{"teamID":6,"posx":..,"posy":..}],
///   "players": [{"number":2,"teamID":6,"X":..,"Y":..,
///                "dash":{"range":4,"cooldown":5},
///                "freeze":{"range":1,"cooldown":10}}],
///   "bot":     [players와 동일]
/// }
/// ```
///
/// `teamID`는 해당 팀 깃발의 셀 값(6 또는 7)입니다. 깃발은 로드 시
/// 현재 위치를 기지로 기억합니다.
#[derive(Debug, Deserialize)]
pub struct MapConfig {
    #[serde(default)]
    pub walls: Vec<WallPosition>,
    #[serde(default)]
    pub flags: Vec<Flag>,
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default, rename = "bot")]
    pub bots: Vec<Bot>,
}

impl MapConfig {
    /// 맵 ID에 해당하는 설정 파일을 로드합니다.
    ///
    /// 맵 디렉토리는 `ROOM_MAP_DIR` 환경변수로 바꿀 수 있으며 기본값은
    /// `maps`입니다.
    pub fn load(map_id: u8) -> Result<Self> {
        let dir = std::env::var("ROOM_MAP_DIR").unwrap_or_else(|_| "maps".to_string());
        let path: PathBuf = [dir, format!("map_{}.json", map_id)].iter().collect();

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("맵 설정 읽기 실패: {}", path.display()))?;
        let config: MapConfig = serde_json::from_str(&raw)
            .with_context(|| format!("맵 설정 파싱 실패: {}", path.display()))?;

        info!(
            "맵 로드 완료: id={} walls={} flags={} players={} bots={}",
            map_id,
            config.walls.len(),
            config.flags.len(),
            config.players.len(),
            config.bots.len()
        );
        Ok(config)
    }
}

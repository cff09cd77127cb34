//! 방 서버 프로세스 실행기
//!
//! 방 하나당 자식 프로세스 하나를 `--port`, `--map`, `--players`
//! 플래그로 실행합니다. 자식의 표준 출력/오류는 방별 로그 파일
//! `rust_game_<rand>.log`로 리다이렉트됩니다 (호환성을 위해 기존
//! 파일명 유지). 실행 후 리스너가 준비될 시간을 잠시 기다린 뒤
//! 반환합니다.

use std::process::Stdio;

use anyhow::{Context, Result};
use rand::Rng;
use tokio::process::Command;
use tracing::{info, warn};

/// 방 서버 리스너 준비 대기 시간
const SPAWN_WAIT: std::time::Duration = std::time::Duration::from_secs(1);

/// 방 서버 프로세스 실행기
pub struct RoomSpawner {
    binary: String,
}

impl RoomSpawner {
    /// `binary`는 방 서버 실행 파일 경로입니다.
    pub fn new(binary: String) -> Self {
        Self { binary }
    }

    /// 방 서버 프로세스를 실행합니다.
    ///
    /// 반환 시점에는 방이 리슨 중일 것으로 기대할 수 있습니다.
    pub async fn spawn(&self, port: u16, map_id: u8, max_players: u32) -> Result<()> {
        let file_id = rand::thread_rng().gen_range(1..=9999);
        let log_name = format!("rust_game_{}.log", file_id);
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_name)
            .with_context(|| format!("방 로그 파일 열기 실패: {}", log_name))?;
        let err_file = log_file
            .try_clone()
            .context("방 로그 파일 핸들 복제 실패")?;

        let mut child = Command::new(&self.binary)
            .args([
                "--port",
                &port.to_string(),
                "--map",
                &map_id.to_string(),
                "--players",
                &max_players.to_string(),
            ])
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(err_file))
            .spawn()
            .with_context(|| format!("방 서버 실행 실패: {}", self.binary))?;

        match child.id() {
            Some(pid) => info!(
                "방 서버 프로세스 시작: pid={} port={} map={} players={} log={}",
                pid, port, map_id, max_players, log_name
            ),
            None => warn!("방 서버 프로세스 pid를 확인할 수 없습니다: port={}", port),
        }

        // 좀비 프로세스 방지용 회수 태스크
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => info!("방 서버 프로세스 종료: port={} status={}", port, status),
                Err(e) => warn!("방 서버 프로세스 대기 실패: port={} error={}", port, e),
            }
        });

        // 방 리스너가 열릴 때까지 잠시 대기한 후 클라이언트에 응답한다.
        tokio::time::sleep(SPAWN_WAIT).await;
        Ok(())
    }
}

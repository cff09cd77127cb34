//! 부하 테스트 클라이언트
//!
//! 전체 경로(로그인 → 방 탐색 → 방 접속 → 게임)를 합성 트래픽으로
//! 구동하는 기준 트래픽 생성기입니다. 클라이언트 N개를 동시에 띄우고
//! 각각:
//!
//! 1. 로비에 접속해 `Login`과 `RoomRequest`를 보낸다
//! 2. `LookRoom` 응답에서 방 포트를 파싱한다
//! 3. 방 포트로 접속해 `SpellSelection`을 보내고 `GameStart`를 기다린다
//! 4. 약 1초마다 무작위 행동을 보내며 수신 패킷을 센다
//!
//! 종료 시 클라이언트별/전체 수신 통계를 출력합니다.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{info, warn};

use shared::protocol::{FrameBuffer, Packet};

/// 부하 테스트 CLI 인자
#[derive(Parser, Debug)]
#[command(author, version, about = "CTF 서버 부하 테스트 클라이언트")]
struct CliArgs {
    /// 동시 클라이언트 수
    #[arg(value_name = "CLIENT_COUNT", default_value_t = 100)]
    client_count: u32,

    /// 로비 서버 포트
    #[arg(value_name = "SERVER_PORT", default_value_t = 8082)]
    server_port: u16,

    /// 로비 서버 IP (SERVER_IP 환경변수가 우선)
    #[arg(value_name = "SERVER_IP", default_value = "127.0.0.1")]
    server_ip: String,

    /// 클라이언트당 행동 전송 시간 (초)
    #[arg(long = "duration", default_value_t = 60)]
    duration_secs: u64,
}

/// 클라이언트 하나의 실행 결과
#[derive(Debug, Default)]
struct ClientReport {
    packets_received: u64,
    actions_sent: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = std::env::var("ENV").unwrap_or_else(|_| "DEV".to_string());
    shared::logging::init(&env);

    let args = CliArgs::parse();
    let server_ip = std::env::var("SERVER_IP").unwrap_or_else(|_| args.server_ip.clone());
    let lobby_addr = format!("{}:{}", server_ip, args.server_port);
    let duration = Duration::from_secs(args.duration_secs);

    info!(
        "부하 테스트 시작: clients={} lobby={} duration={:?}",
        args.client_count, lobby_addr, duration
    );

    let mut handles = Vec::new();
    for client_id in 0..args.client_count {
        let lobby_addr = lobby_addr.clone();
        let server_ip = server_ip.clone();
        handles.push(tokio::spawn(async move {
            match run_client(client_id, &lobby_addr, &server_ip, duration).await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!("클라이언트 {} 실패: {:#}", client_id, e);
                    None
                }
            }
        }));
    }

    let mut finished = 0u32;
    let mut total_packets = 0u64;
    let mut total_actions = 0u64;
    for handle in handles {
        if let Ok(Some(report)) = handle.await {
            finished += 1;
            total_packets += report.packets_received;
            total_actions += report.actions_sent;
        }
    }

    info!("=== 부하 테스트 결과 ===");
    info!("완료 클라이언트: {}/{}", finished, args.client_count);
    info!("전송 행동: {}", total_actions);
    info!("수신 패킷: {}", total_packets);
    info!("========================");
    Ok(())
}

/// 클라이언트 하나의 전체 경로 실행
async fn run_client(
    client_id: u32,
    lobby_addr: &str,
    server_ip: &str,
    duration: Duration,
) -> Result<ClientReport> {
    // 1. 로비 접속 + 로그인
    let mut lobby = TcpStream::connect(lobby_addr)
        .await
        .with_context(|| format!("로비 접속 실패: {}", lobby_addr))?;

    let login = Packet::Login {
        username: "testuser".into(),
        password: "testpass".into(),
    };
    lobby.write_all(&login.serialize()).await?;

    let mut buffer = FrameBuffer::new();
    match read_packet(&mut lobby, &mut buffer).await? {
        Packet::Resp { .. } => {}
        other => bail!("로그인 응답이 아님: code={}", other.code()),
    }

    // 2. 방 탐색 (솔로 방)
    let request = Packet::RoomRequest { room_type: 0 };
    lobby.write_all(&request.serialize()).await?;

    let room_port = match read_packet(&mut lobby, &mut buffer).await? {
        Packet::LookRoom {
            success: 0,
            room_addr,
            ..
        } => room_addr
            .trim()
            .parse::<u16>()
            .with_context(|| format!("방 포트 파싱 실패: {room_addr:?}"))?,
        Packet::LookRoom { success, .. } => bail!("방 배정 실패: success={}", success),
        other => bail!("방 탐색 응답이 아님: code={}", other.code()),
    };
    info!("클라이언트 {}: 방 배정됨 port={}", client_id, room_port);

    // 3. 방 접속 + 스펠 선택 + 게임 시작 대기
    let room_addr = format!("{}:{}", server_ip, room_port);
    let mut room = TcpStream::connect(&room_addr)
        .await
        .with_context(|| format!("방 접속 실패: {}", room_addr))?;

    let selection = Packet::SpellSelection {
        spell1: 1,
        spell2: 2,
    };
    room.write_all(&selection.serialize()).await?;

    let mut room_buffer = FrameBuffer::new();
    let mut report = ClientReport::default();
    loop {
        let packet = read_packet(&mut room, &mut room_buffer).await?;
        report.packets_received += 1;
        match packet {
            Packet::GameStart { success: 0 } => break,
            Packet::GameStart { success } => bail!("게임 시작 실패: success={}", success),
            // 시작 전에도 보드 프레임이 올 수 있다.
            _ => {}
        }
    }
    info!("클라이언트 {}: 게임 시작", client_id);

    // 4. 행동 루프: 약 1초마다 무작위 이동, 수신 패킷 집계
    let (mut room_reader, mut room_writer) = room.into_split();
    let mut action_timer = tokio::time::interval(Duration::from_secs(1));
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);
    let mut read_buf = [0u8; 4096];

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = action_timer.tick() => {
                let action = rand::thread_rng().gen_range(1..=4);
                let packet = Packet::Action { action };
                room_writer.write_all(&packet.serialize()).await?;
                report.actions_sent += 1;
            }
            read = room_reader.read(&mut read_buf) => {
                let n = read.context("방 연결 읽기 실패")?;
                if n == 0 {
                    info!("클라이언트 {}: 방이 연결을 닫음", client_id);
                    break;
                }
                room_buffer.extend(&read_buf[..n]);
                loop {
                    match room_buffer.next_packet() {
                        Ok(Some(packet)) => {
                            report.packets_received += 1;
                            if let Packet::GameClose { code } = packet {
                                info!("클라이언트 {}: 게임 종료 code={}", client_id, code);
                                return Ok(report);
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!("클라이언트 {}: 프로토콜 오류 {}", client_id, e);
                            room_buffer.clear();
                            break;
                        }
                    }
                }
            }
        }
    }

    info!(
        "클라이언트 {}: 종료 (수신 {} / 전송 {})",
        client_id, report.packets_received, report.actions_sent
    );
    Ok(report)
}

/// 완전한 패킷 하나를 읽을 때까지 스트림을 읽습니다.
async fn read_packet(stream: &mut TcpStream, buffer: &mut FrameBuffer) -> Result<Packet> {
    let mut read_buf = [0u8; 4096];
    loop {
        if let Some(packet) = buffer.next_packet().map_err(|e| anyhow!("{e}"))? {
            return Ok(packet);
        }
        let n = stream.read(&mut read_buf).await?;
        if n == 0 {
            bail!("패킷 수신 전에 연결이 닫힘");
        }
        buffer.extend(&read_buf[..n]);
    }
}

//! 연결 핸들러
//!
//! 로비에 접속한 클라이언트 연결 하나의 요청/응답 루프를 담당합니다.
//!
//! # 처리 규약
//!
//! 1. 연결별 수신 버퍼에 읽은 바이트를 누적한다.
//! 2. 스트림 디코더를 돌려 완전한 패킷마다 도메인 메시지를 만들어
//!    브로커에 발행한다.
//! 3. 해당 메시지 종류의 응답 채널에서 응답 하나를 기다린다.
//! 4. 응답을 패킷으로 직렬화해 기록한다
//!    (`Auth` → `Resp`, `SearchRoom` → `LookRoom`).
//!
//! `LookRoom` 성공 이후에도 연결은 유지됩니다. 클라이언트는 방 포트로
//! 별도 연결을 맺으며, 로비는 이 소켓으로 방 트래픽을 읽지 않습니다.

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use shared::protocol::{FrameBuffer, Packet};

use crate::event::{EventBroker, Message, MessageKind};
use crate::tool::error::{ErrorHandler, ErrorSeverity, LobbyError};

/// 브로커 응답 대기 제한 시간 (인증 1초 + 방 프로세스 기동 1초 여유 포함)
const RESPONSE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// 연결 핸들러
pub struct ConnectionHandler {
    broker: EventBroker,
}

impl ConnectionHandler {
    pub fn new(broker: EventBroker) -> Self {
        Self { broker }
    }

    /// 연결 하나의 요청/응답 루프를 실행합니다.
    ///
    /// 클라이언트가 정상 종료하면 `Ok`, 전송 오류면 `Err`를 반환합니다.
    pub async fn handle_connection(&self, mut stream: TcpStream, addr: String) -> Result<()> {
        info!("연결 처리 시작: {}", addr);

        let mut buffer = FrameBuffer::new();
        let mut read_buf = [0u8; 1024];

        loop {
            let n = match stream.read(&mut read_buf).await {
                Ok(0) => {
                    info!("클라이언트 정상 종료: {}", addr);
                    return Ok(());
                }
                Ok(n) => n,
                Err(e) => {
                    ErrorHandler::handle(
                        LobbyError::Transport {
                            addr: addr.clone(),
                            message: e.to_string(),
                        },
                        ErrorSeverity::Warning,
                    );
                    return Err(e).context("연결 읽기 실패");
                }
            };
            buffer.extend(&read_buf[..n]);

            loop {
                match buffer.next_packet() {
                    Ok(Some(packet)) => {
                        self.dispatch(packet, &mut stream, &addr).await?;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        // 프로토콜 오류: 버퍼를 폐기하고 연결은 유지한다.
                        ErrorHandler::handle(
                            LobbyError::Protocol {
                                addr: addr.clone(),
                                message: e.to_string(),
                            },
                            ErrorSeverity::Warning,
                        );
                        buffer.clear();
                        break;
                    }
                }
            }
        }
    }

    /// 패킷 하나를 도메인 메시지로 바꿔 발행하고 응답 하나를 기록합니다.
    async fn dispatch(&self, packet: Packet, stream: &mut TcpStream, addr: &str) -> Result<()> {
        debug!("패킷 수신: addr={} code={}", addr, packet.code());

        let (kind, msg) = match packet {
            Packet::Login { username, password } => {
                (MessageKind::Login, Message::Login { username, password })
            }
            Packet::SignIn { username, password } => {
                (MessageKind::SignIn, Message::SignIn { username, password })
            }
            Packet::RoomRequest { room_type } => {
                (MessageKind::FindRoom, Message::FindRoom { room_type })
            }
            Packet::RoomCreate { room_type } => {
                (MessageKind::CreateRoom, Message::CreateRoom { room_type })
            }
            Packet::RoomJoin { room_id } => (MessageKind::JoinRoom, Message::JoinRoom { room_id }),
            other => {
                warn!("로비가 처리하지 않는 패킷: addr={} code={}", addr, other.code());
                return Ok(());
            }
        };

        // 발행 전에 응답 채널을 만들어 두어야 응답을 놓치지 않는다.
        let mut response_rx = self.broker.response_channel(kind);
        if !self.broker.publish(msg) {
            warn!("브로커 종료됨, 요청 폐기: addr={}", addr);
            self.write_packet(stream, &failure_packet(kind), addr).await?;
            return Ok(());
        }

        let reply = match tokio::time::timeout(RESPONSE_TIMEOUT, response_rx.recv()).await {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                debug!("응답 채널 종료(취소): addr={}", addr);
                failure_message(kind)
            }
            Err(_) => {
                warn!("응답 대기 타임아웃: addr={} kind={:?}", addr, kind);
                failure_message(kind)
            }
        };

        let response = match reply {
            Message::Auth { success } => {
                if success == 0 {
                    ErrorHandler::handle(
                        LobbyError::Auth {
                            message: format!("인증 거부: {}", addr),
                        },
                        ErrorSeverity::Info,
                    );
                }
                Packet::Resp { success }
            }
            Message::SearchRoom {
                success,
                room_id,
                room_addr,
            } => {
                if success != 0 {
                    ErrorHandler::handle(
                        LobbyError::Capacity {
                            message: format!("방 배정 실패: {}", addr),
                        },
                        ErrorSeverity::Info,
                    );
                }
                Packet::LookRoom {
                    success,
                    room_id,
                    room_addr,
                }
            }
            other => {
                warn!("응답으로 변환할 수 없는 메시지: {:?}", other.kind());
                return Ok(());
            }
        };

        self.write_packet(stream, &response, addr).await
    }

    async fn write_packet(&self, stream: &mut TcpStream, packet: &Packet, addr: &str) -> Result<()> {
        let data = packet.serialize();
        stream
            .write_all(&data)
            .await
            .with_context(|| format!("응답 쓰기 실패: {}", addr))?;
        debug!("응답 전송: addr={} code={}", addr, packet.code());
        Ok(())
    }
}

/// 요청 종류별 실패 응답 메시지
fn failure_message(kind: MessageKind) -> Message {
    match kind {
        MessageKind::Login | MessageKind::SignIn => Message::Auth { success: 0 },
        _ => Message::SearchRoom {
            success: 1,
            room_id: String::new(),
            room_addr: String::new(),
        },
    }
}

/// 요청 종류별 실패 응답 패킷
fn failure_packet(kind: MessageKind) -> Packet {
    match failure_message(kind) {
        Message::Auth { success } => Packet::Resp { success },
        Message::SearchRoom {
            success,
            room_id,
            room_addr,
        } => Packet::LookRoom {
            success,
            room_id,
            room_addr,
        },
        _ => Packet::Resp { success: 0 },
    }
}

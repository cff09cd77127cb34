//! 로비 에러 분류 체계
//!
//! 로비에서 발생하는 에러를 종류별로 분류하고 심각도에 맞는 로그
//! 레벨로 기록합니다.
//!
//! 종류별 전파 정책:
//! - `Protocol`: 연결 버퍼 폐기 후 연결 유지
//! - `Transport`: 해당 연결 종료
//! - `Auth` / `Capacity`: 구조화된 응답 패킷으로 변환, 연결 유지
//! - `Internal`: 상황에 따라 치명적일 수 있음

use std::fmt;
use tracing::{error, info, warn};

/// 로비 에러 타입
#[derive(Debug, Clone)]
pub enum LobbyError {
    /// 프로토콜 에러 (잘못된 버전, 알 수 없는 코드 등)
    Protocol { addr: String, message: String },

    /// 전송 계층 에러 (TCP 읽기/쓰기 실패)
    Transport { addr: String, message: String },

    /// 인증 에러 (자격 증명 거부, 백엔드 접근 불가)
    Auth { message: String },

    /// 수용 에러 (배정 가능한 방 없음, 방 프로세스 실행 실패)
    Capacity { message: String },

    /// 내부 에러
    Internal { component: String, message: String },
}

impl fmt::Display for LobbyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LobbyError::Protocol { addr, message } => {
                write!(f, "프로토콜 에러 [{}]: {}", addr, message)
            }
            LobbyError::Transport { addr, message } => {
                write!(f, "전송 에러 [{}]: {}", addr, message)
            }
            LobbyError::Auth { message } => write!(f, "인증 에러: {}", message),
            LobbyError::Capacity { message } => write!(f, "수용 에러: {}", message),
            LobbyError::Internal { component, message } => {
                write!(f, "내부 에러 [{}]: {}", component, message)
            }
        }
    }
}

impl std::error::Error for LobbyError {}

/// 에러 심각도 레벨
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// 정상 동작 중 발생하는 예상 가능한 상황
    Info,
    /// 주의가 필요하지만 서비스는 계속 가능
    Warning,
    /// 기능에 영향을 주는 실패
    Error,
}

/// 에러를 심각도에 맞는 로그 레벨로 기록하는 핸들러
pub struct ErrorHandler;

impl ErrorHandler {
    pub fn handle(err: LobbyError, severity: ErrorSeverity) {
        match severity {
            ErrorSeverity::Info => info!("{}", err),
            ErrorSeverity::Warning => warn!("{}", err),
            ErrorSeverity::Error => error!("{}", err),
        }
    }
}

//! 게임 서버 공통 라이브러리
//!
//! 로비 서버, 게임 방 서버, 부하 테스트 클라이언트가 함께 사용하는
//! 공통 모듈을 제공합니다.
//!
//! - `protocol`: 길이 자기기술(self-delimiting) 바이너리 패킷 코덱
//! - `logging`: tracing 기반 공통 로깅 초기화
//! - `tool`: 방 ID 생성 등 공용 유틸리티

pub mod logging;
pub mod protocol;
pub mod tool;

pub use protocol::{Delta, FrameBuffer, Packet, ProtocolError};

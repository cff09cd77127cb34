//! 로비 서버 환경 설정 모듈
//!
//! .env 파일과 환경변수에서 설정을 로드합니다.

use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};

/// 로비 서버 설정 구조체
#[derive(Debug, Clone)]
pub struct LobbyConfig {
    /// 실행 환경 (DEV / PROD)
    pub env: String,
    /// TCP 리슨 주소 문자열 (예: ":8082")
    pub server: String,
    /// 인증 gRPC 서버 호스트
    pub grpc_host: String,
    /// 인증 gRPC 서버 포트
    pub grpc_port: u16,
    /// 방 서버 바이너리 경로
    pub room_server_bin: String,
}

impl LobbyConfig {
    /// 환경변수에서 설정을 로드합니다.
    ///
    /// 로드 순서:
    /// 1. 프로젝트 루트의 .env 파일
    /// 2. 시스템 환경변수
    /// 3. 기본값
    ///
    /// 환경변수:
    /// - `ENV`: 실행 환경, `DEV`면 개발용 로그 포맷 (기본값: "PROD")
    /// - `SERVER`: 리슨 주소 (기본값: ":8082")
    /// - `grpc_host` / `grpc_port`: 인증 백엔드 (기본값: 127.0.0.1:50051)
    /// - `ROOM_SERVER_BIN`: 방 서버 바이너리 경로
    pub fn from_env() -> Result<Self> {
        Self::load_env_file();

        let config = Self {
            env: std::env::var("ENV").unwrap_or_else(|_| "PROD".to_string()),
            server: std::env::var("SERVER").unwrap_or_else(|_| ":8082".to_string()),
            grpc_host: std::env::var("grpc_host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            grpc_port: std::env::var("grpc_port")
                .unwrap_or_else(|_| "50051".to_string())
                .parse()
                .unwrap_or(50051),
            room_server_bin: std::env::var("ROOM_SERVER_BIN")
                .unwrap_or_else(|_| "./target/debug/roomserver".to_string()),
        };

        info!("로비 서버 설정 로드 완료: {:?}", config);
        Ok(config)
    }

    /// TCP 바인딩 주소를 반환합니다. ":8082" 형식은 전체 인터페이스로 확장됩니다.
    pub fn bind_address(&self) -> String {
        if self.server.starts_with(':') {
            format!("0.0.0.0{}", self.server)
        } else {
            self.server.clone()
        }
    }

    /// 인증 gRPC 연결 주소를 반환합니다.
    pub fn grpc_address(&self) -> String {
        format!("http://{}:{}", self.grpc_host, self.grpc_port)
    }

    /// .env 파일을 로드합니다.
    fn load_env_file() {
        let env_paths = [".env", "../.env"];

        let mut loaded = false;
        for path in env_paths {
            if Path::new(path).exists() && dotenv::from_filename(path).is_ok() {
                info!(".env 파일 로드 성공: {}", path);
                loaded = true;
                break;
            }
        }

        if !loaded {
            warn!(".env 파일을 찾을 수 없습니다. 시스템 환경변수를 사용합니다.");
        }
    }
}

/// 설정 검증 유틸리티
pub fn validate_config(config: &LobbyConfig) -> Result<()> {
    if config.server.is_empty() {
        anyhow::bail!("SERVER 리슨 주소가 비어있습니다");
    }

    if config.grpc_port == 0 {
        anyhow::bail!("유효하지 않은 gRPC 포트 번호: {}", config.grpc_port);
    }

    if config.room_server_bin.is_empty() {
        anyhow::bail!("방 서버 바이너리 경로가 비어있습니다");
    }

    Ok(())
}

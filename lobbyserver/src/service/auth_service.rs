//! 인증 서비스
//!
//! 외부 인증 백엔드(gRPC, 기본 localhost:50051)를 호출하여 로그인과
//! 계정 생성을 처리합니다. 호출은 최선 노력(best-effort)입니다:
//! 연결 실패, 타임아웃, 오류 응답은 모두 인증 실패로 변환되며
//! 클라이언트 연결은 유지됩니다.

use std::time::Duration;

use tracing::{debug, warn};

use crate::event::Message;

/// tonic이 생성한 인증 프로토콜 타입들
pub mod proto {
    tonic::include_proto!("auth");
}

use proto::create_service_client::CreateServiceClient;
use proto::login_service_client::LoginServiceClient;
use proto::{AuthentificationRequest, SigninRequest};

/// gRPC 호출 제한 시간
const AUTH_TIMEOUT: Duration = Duration::from_secs(1);

/// 인증 서비스
pub struct AuthService {
    endpoint: String,
}

impl AuthService {
    /// 새로운 인증 서비스를 생성합니다. `endpoint`는 `http://host:port` 형식.
    pub fn new(endpoint: String) -> Self {
        Self { endpoint }
    }

    /// 로그인 요청을 처리합니다. 항상 `Message::Auth`를 반환합니다.
    pub async fn handle_login(&self, msg: Message) -> Option<Message> {
        let (username, password) = match &msg {
            Message::Login { username, password } => (username.clone(), password.clone()),
            _ => {
                warn!("인증 핸들러에 잘못된 메시지 종류: {:?}", msg.kind());
                return None;
            }
        };

        if let Err(reason) = msg.validate() {
            debug!("로그인 요청 거부: {}", reason);
            return Some(Message::Auth { success: 0 });
        }

        let success = self.authentificate(username, password).await;
        Some(Message::Auth { success })
    }

    /// 계정 생성 요청을 처리합니다. 항상 `Message::Auth`를 반환합니다.
    pub async fn handle_signin(&self, msg: Message) -> Option<Message> {
        let (username, password) = match &msg {
            Message::SignIn { username, password } => (username.clone(), password.clone()),
            _ => {
                warn!("인증 핸들러에 잘못된 메시지 종류: {:?}", msg.kind());
                return None;
            }
        };

        if let Err(reason) = msg.validate() {
            debug!("계정 생성 요청 거부: {}", reason);
            return Some(Message::Auth { success: 0 });
        }

        let success = self.signin(username, password).await;
        Some(Message::Auth { success })
    }

    /// 인증 백엔드의 `Authentificate`를 호출합니다. 실패 시 0.
    async fn authentificate(&self, username: String, password: String) -> u8 {
        let connect = LoginServiceClient::connect(self.endpoint.clone());
        let mut client = match tokio::time::timeout(AUTH_TIMEOUT, connect).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                warn!("인증 백엔드 연결 실패: {}", e);
                return 0;
            }
            Err(_) => {
                warn!("인증 백엔드 연결 타임아웃");
                return 0;
            }
        };

        let request = AuthentificationRequest { username, password };
        match tokio::time::timeout(AUTH_TIMEOUT, client.authentificate(request)).await {
            Ok(Ok(response)) => {
                if response.into_inner().success {
                    1
                } else {
                    0
                }
            }
            Ok(Err(status)) => {
                warn!("인증 호출 실패: {}", status);
                0
            }
            Err(_) => {
                warn!("인증 호출 타임아웃");
                0
            }
        }
    }

    /// 인증 백엔드의 `Signin`을 호출합니다. 실패 시 0.
    async fn signin(&self, username: String, password: String) -> u8 {
        let connect = CreateServiceClient::connect(self.endpoint.clone());
        let mut client = match tokio::time::timeout(AUTH_TIMEOUT, connect).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                warn!("인증 백엔드 연결 실패: {}", e);
                return 0;
            }
            Err(_) => {
                warn!("인증 백엔드 연결 타임아웃");
                return 0;
            }
        };

        let request = SigninRequest { username, password };
        match tokio::time::timeout(AUTH_TIMEOUT, client.signin(request)).await {
            Ok(Ok(response)) => {
                if response.into_inner().success {
                    1
                } else {
                    0
                }
            }
            Ok(Err(status)) => {
                warn!("계정 생성 호출 실패: {}", status);
                0
            }
            Err(_) => {
                warn!("계정 생성 호출 타임아웃");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_backend_maps_to_failure() {
        // 아무도 리슨하지 않는 포트: 연결 실패는 인증 실패로 변환된다.
        let service = AuthService::new("http://127.0.0.1:1".to_string());
        let reply = service
            .handle_login(Message::Login {
                username: "user".into(),
                password: "pass".into(),
            })
            .await;
        match reply {
            Some(Message::Auth { success }) => assert_eq!(success, 0),
            other => panic!("예상하지 못한 응답: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_credentials_rejected_without_backend_call() {
        let service = AuthService::new("http://127.0.0.1:1".to_string());
        let reply = service
            .handle_login(Message::Login {
                username: String::new(),
                password: String::new(),
            })
            .await;
        match reply {
            Some(Message::Auth { success }) => assert_eq!(success, 0),
            other => panic!("예상하지 못한 응답: {other:?}"),
        }
    }
}

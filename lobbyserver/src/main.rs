//! 로비 서버
//!
//! 잘 알려진 포트(기본 8082)에서 TCP 연결을 받아 인증과 방 배정을
//! 처리하는 프런트 서버입니다. 연결마다 리더 태스크를 띄우고, 요청은
//! 이벤트 브로커를 거쳐 인증 서비스와 방 관리자로 전달됩니다.
//! 배정된 방은 별도 프로세스(방 서버)로 실행되며 클라이언트는
//! `LookRoom` 응답의 포트로 다시 접속합니다.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use futures::FutureExt;
use lobbyserver::config::{validate_config, LobbyConfig};
use lobbyserver::event::{EventBroker, MessageKind};
use lobbyserver::handler::ConnectionHandler;
use lobbyserver::service::{AuthService, RoomManager, RoomSpawner};

/// 브로커에 인증/방 관리 핸들러를 등록합니다.
fn register_handlers(broker: &EventBroker, auth: Arc<AuthService>, rooms: Arc<RoomManager>) {
    {
        let auth = auth.clone();
        broker.subscribe(
            MessageKind::Login,
            Arc::new(move |msg| {
                let auth = auth.clone();
                async move { auth.handle_login(msg).await }.boxed()
            }),
        );
    }
    {
        broker.subscribe(
            MessageKind::SignIn,
            Arc::new(move |msg| {
                let auth = auth.clone();
                async move { auth.handle_signin(msg).await }.boxed()
            }),
        );
    }
    {
        let rooms_find = rooms.clone();
        broker.subscribe(
            MessageKind::FindRoom,
            Arc::new(move |msg| {
                let rooms = rooms_find.clone();
                async move { rooms.handle_find_room(msg).await }.boxed()
            }),
        );
    }
    {
        let rooms_join = rooms.clone();
        broker.subscribe(
            MessageKind::JoinRoom,
            Arc::new(move |msg| {
                let rooms = rooms_join.clone();
                async move { rooms.handle_join_room(msg).await }.boxed()
            }),
        );
    }
    {
        broker.subscribe(
            MessageKind::CreateRoom,
            Arc::new(move |msg| {
                let rooms = rooms.clone();
                async move { rooms.handle_create_room(msg).await }.boxed()
            }),
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = LobbyConfig::from_env()?;
    shared::logging::init(&config.env);
    validate_config(&config)?;

    info!("=== 로비 서버 설정 ===");
    info!("리슨 주소: {}", config.bind_address());
    info!("인증 백엔드: {}", config.grpc_address());
    info!("방 서버 바이너리: {}", config.room_server_bin);
    info!("====================");

    let broker = EventBroker::new();
    let auth = Arc::new(AuthService::new(config.grpc_address()));
    let spawner = RoomSpawner::new(config.room_server_bin.clone());
    let rooms = Arc::new(RoomManager::new(spawner));
    register_handlers(&broker, auth, rooms);

    // 단일 소비자 태스크
    let consumer = broker.clone();
    tokio::spawn(async move { consumer.run().await });

    let bind_addr = config.bind_address();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("TCP 리스너 바인드 실패: {}", bind_addr))?;
    info!("✅ 로비 서버가 {}에서 실행 중입니다", bind_addr);

    let conn_handler = Arc::new(ConnectionHandler::new(broker.clone()));

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        info!("새 연결 수락: {}", addr);
                        let handler = conn_handler.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handler.handle_connection(stream, addr.to_string()).await {
                                error!("연결 처리 오류: addr={} error={:#}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("연결 수락 실패: {}", e);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("종료 시그널 수신, 로비 서버를 중지합니다...");
                broker.shutdown();
                break;
            }
        }
    }

    info!("✅ 로비 서버가 성공적으로 중지되었습니다");
    Ok(())
}

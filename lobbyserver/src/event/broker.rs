//! 이벤트 브로커
//!
//! 단일 소비자 FIFO 큐 위에서 동작하는 발행/구독 브로커입니다.
//!
//! # 동작 방식
//!
//! - `publish`: 메시지를 큐에 넣습니다. 소비자를 막지 않습니다.
//! - `subscribe`: 메시지 종류별 비동기 핸들러를 등록합니다. 같은
//!   종류의 핸들러는 등록 순서대로 직렬 실행되며, 마지막으로 `Some`을
//!   반환한 핸들러의 값이 응답이 됩니다. (의도된 규칙입니다.)
//! - `response_channel`: 요청 종류별 응답 수신 채널을 만듭니다.
//!   발행 직전에 만들어 두고 응답 하나를 기다리는 용도입니다.
//! - `run`: 소비자 태스크 본체. 큐가 닫힐 때까지 메시지를 처리합니다.
//! - `shutdown`: 큐를 닫습니다. 응답 대기자는 채널 종료(None)를
//!   취소 신호로 받습니다.
//!
//! 같은 종류의 메시지는 발행 순서대로 처리되고, 종류가 달라도 단일
//! 소비자이므로 전체 순서가 일관됩니다.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{Message, MessageKind};

/// 메시지 핸들러. 요청을 받아 응답을 돌려줄 수 있는 비동기 함수입니다.
pub type Handler = Arc<dyn Fn(Message) -> BoxFuture<'static, Option<Message>> + Send + Sync>;

struct BrokerInner {
    queue_tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    queue_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    handlers: RwLock<HashMap<MessageKind, Vec<Handler>>>,
    responders: Mutex<HashMap<MessageKind, mpsc::UnboundedSender<Message>>>,
}

/// 이벤트 브로커
#[derive(Clone)]
pub struct EventBroker {
    inner: Arc<BrokerInner>,
}

impl EventBroker {
    /// 새로운 브로커를 생성합니다. `run`을 별도 태스크로 실행해야
    /// 메시지가 소비됩니다.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(BrokerInner {
                queue_tx: Mutex::new(Some(tx)),
                queue_rx: tokio::sync::Mutex::new(Some(rx)),
                handlers: RwLock::new(HashMap::new()),
                responders: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// 메시지를 큐에 발행합니다. 브로커가 종료되었으면 false를 반환합니다.
    pub fn publish(&self, msg: Message) -> bool {
        let guard = self.inner.queue_tx.lock();
        match guard.as_ref() {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }

    /// 메시지 종류별 핸들러를 등록합니다.
    pub fn subscribe(&self, kind: MessageKind, handler: Handler) {
        self.inner
            .handlers
            .write()
            .entry(kind)
            .or_default()
            .push(handler);
    }

    /// 요청 종류에 대한 응답 수신 채널을 만듭니다.
    ///
    /// 같은 종류에 대해 다시 호출하면 이전 채널의 송신자를 대체하므로,
    /// 발행 직전에 만들어 응답 하나를 기다리는 패턴으로 사용해야 합니다.
    pub fn response_channel(&self, kind: MessageKind) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.responders.lock().insert(kind, tx);
        rx
    }

    /// 소비자 루프. 큐가 닫힐 때까지 실행됩니다.
    ///
    /// 한 브로커에 대해 한 번만 실행할 수 있습니다.
    pub async fn run(&self) {
        let mut rx = match self.inner.queue_rx.lock().await.take() {
            Some(rx) => rx,
            None => {
                warn!("이벤트 브로커 소비자가 이미 실행 중입니다");
                return;
            }
        };

        debug!("이벤트 브로커 소비자 시작");
        while let Some(msg) = rx.recv().await {
            let kind = msg.kind();
            let handlers: Vec<Handler> = self
                .inner
                .handlers
                .read()
                .get(&kind)
                .cloned()
                .unwrap_or_default();

            if handlers.is_empty() {
                warn!("핸들러가 등록되지 않은 메시지 종류: {:?}", kind);
                continue;
            }

            // 핸들러는 직렬 실행, 마지막 Some 반환값이 응답이 된다.
            let mut response = None;
            for handler in handlers {
                if let Some(reply) = handler(msg.clone()).await {
                    response = Some(reply);
                }
            }

            if let Some(reply) = response {
                let responder = self.inner.responders.lock().get(&kind).cloned();
                match responder {
                    Some(tx) => {
                        if tx.send(reply).is_err() {
                            debug!("응답 대기자가 이미 떠남: {:?}", kind);
                        }
                    }
                    None => debug!("응답 채널이 없는 메시지 종류: {:?}", kind),
                }
            }
        }
        debug!("이벤트 브로커 소비자 종료");
    }

    /// 큐를 닫고 브로커를 종료합니다. 대기 중인 응답 수신자는 채널
    /// 종료를 취소로 처리해야 합니다.
    pub fn shutdown(&self) {
        self.inner.queue_tx.lock().take();
        self.inner.responders.lock().clear();
    }
}

impl Default for EventBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn auth_handler(success: u8) -> Handler {
        Arc::new(move |_msg| async move { Some(Message::Auth { success }) }.boxed())
    }

    #[tokio::test]
    async fn test_publish_and_response() {
        let broker = EventBroker::new();
        broker.subscribe(MessageKind::Login, auth_handler(1));

        let runner = broker.clone();
        tokio::spawn(async move { runner.run().await });

        let mut rx = broker.response_channel(MessageKind::Login);
        assert!(broker.publish(Message::Login {
            username: "user".into(),
            password: "pass".into(),
        }));

        match rx.recv().await {
            Some(Message::Auth { success }) => assert_eq!(success, 1),
            other => panic!("예상하지 못한 응답: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_last_handler_response_wins() {
        let broker = EventBroker::new();
        broker.subscribe(MessageKind::Login, auth_handler(0));
        broker.subscribe(MessageKind::Login, auth_handler(1));

        let runner = broker.clone();
        tokio::spawn(async move { runner.run().await });

        let mut rx = broker.response_channel(MessageKind::Login);
        broker.publish(Message::Login {
            username: "user".into(),
            password: "pass".into(),
        });

        match rx.recv().await {
            Some(Message::Auth { success }) => assert_eq!(success, 1),
            other => panic!("예상하지 못한 응답: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_same_kind_ordering() {
        let broker = EventBroker::new();
        broker.subscribe(
            MessageKind::FindRoom,
            Arc::new(|msg| {
                async move {
                    match msg {
                        Message::FindRoom { room_type } => Some(Message::SearchRoom {
                            success: 0,
                            room_id: String::new(),
                            room_addr: room_type.to_string(),
                        }),
                        _ => None,
                    }
                }
                .boxed()
            }),
        );

        let runner = broker.clone();
        tokio::spawn(async move { runner.run().await });

        let mut rx = broker.response_channel(MessageKind::FindRoom);
        for room_type in 0..3u8 {
            broker.publish(Message::FindRoom { room_type });
        }
        for expected in 0..3u8 {
            match rx.recv().await {
                Some(Message::SearchRoom { room_addr, .. }) => {
                    assert_eq!(room_addr, expected.to_string());
                }
                other => panic!("예상하지 못한 응답: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_shutdown_cancels_waiters() {
        let broker = EventBroker::new();
        broker.subscribe(MessageKind::Login, auth_handler(1));

        let runner = broker.clone();
        let handle = tokio::spawn(async move { runner.run().await });

        let mut rx = broker.response_channel(MessageKind::Login);
        broker.shutdown();

        // 응답 대기자는 채널 종료를 받는다.
        assert!(rx.recv().await.is_none());
        // 종료 후 발행은 실패한다.
        assert!(!broker.publish(Message::Auth { success: 0 }));
        handle.await.unwrap();
    }
}

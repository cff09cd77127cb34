//! 이벤트 브로커 모듈
//!
//! 로비의 요청 처리를 담당하는 발행/구독 계층입니다. 연결 핸들러가
//! 도메인 메시지를 발행하면, 단일 소비자 태스크가 메시지 종류별로
//! 등록된 핸들러를 순서대로 실행하고 마지막 응답을 해당 종류의 응답
//! 채널로 전달합니다.

mod broker;
mod message;

pub use broker::{EventBroker, Handler};
pub use message::{Message, MessageKind};

//! 로비 핸들러 모듈

pub mod connection_handler;

pub use connection_handler::ConnectionHandler;

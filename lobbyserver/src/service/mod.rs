//! 로비 서비스 모듈

pub mod auth_service;
pub mod room_manager;
pub mod room_spawner;

pub use auth_service::AuthService;
pub use room_manager::RoomManager;
pub use room_spawner::RoomSpawner;

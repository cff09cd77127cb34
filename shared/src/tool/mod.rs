//! 공용 유틸리티

pub mod game_id;

pub use game_id::generate_game_id;

//! 봇
//!
//! 플레이어를 합성한 AI 엔티티입니다. 목표 칸을 향한 탐욕적 한 칸
//! 이동을 계산하며, 사람 플레이어와 같은 행동 채널 규약을 따릅니다
//! (행동을 설정하면 틱 루프가 해석).
//!
//! - 세 틱마다 한 번 행동합니다.
//! - 대시는 쿨다운이 돌 때마다 시도합니다.
//! - 목표: 적 깃발을 들고 있지 않으면 적 깃발 위치, 들고 있으면
//!   자기 기지. 자기 깃발을 빼앗기면 깃발 위치로 추격합니다.

use rand::seq::SliceRandom;
use serde::Deserialize;

use super::board::Board;
use super::player::{Action, Direction, Player};

/// 봇 행동 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BotState {
    /// 적 깃발을 찾아 이동
    #[default]
    Search,
    /// 깃발을 들고 기지로 귀환
    Capture,
    /// 빼앗긴 자기 깃발을 추격
    Defend,
    /// 갈 곳이 없을 때 무작위 이동
    Random,
}

/// AI 플레이어
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Bot {
    #[serde(flatten)]
    pub player: Player,
    #[serde(skip)]
    pub state: BotState,
    /// 최근 지나온 칸. 직전 칸으로의 되돌이를 막는 경로 캐시입니다.
    #[serde(skip)]
    path: Vec<(i32, i32)>,
}

/// 네 방향 이웃과 대응 행동
const NEIGHBOURS: [(Action, (i32, i32)); 4] = [
    (Action::MoveUp, (0, -1)),
    (Action::MoveDown, (0, 1)),
    (Action::MoveLeft, (-1, 0)),
    (Action::MoveRight, (1, 0)),
];

/// 경로 캐시 크기
const PATH_CACHE: usize = 8;

impl Bot {
    /// 이번 틱의 행동을 결정해 `player.action`에 기록합니다.
    pub fn choose_action(&mut self, tick: u32, board: &Board) {
        // 봇은 세 틱마다 움직인다.
        if tick % 3 != 0 {
            self.player.action = Action::None;
            return;
        }

        self.state = self.next_state(board);

        // 대시는 쿨다운이 돌 때마다 시도한다 (운반 중에는 불가).
        if !self.player.has_flag && self.player.dash.ready() {
            self.player.action = Action::SpellOne;
            return;
        }

        let objective = self.objective(board);
        self.player.action = match self.greedy_step(board, objective) {
            Some(action) => {
                self.remember_position();
                action
            }
            None => {
                self.state = BotState::Random;
                self.random_step(board)
            }
        };
    }

    /// 현재 상황에 맞는 상태를 계산합니다.
    fn next_state(&self, board: &Board) -> BotState {
        if self.player.has_flag {
            return BotState::Capture;
        }
        let own_flag_taken = board
            .flags
            .iter()
            .any(|f| f.team == self.player.team && f.is_captured);
        if own_flag_taken {
            BotState::Defend
        } else {
            BotState::Search
        }
    }

    /// 상태별 목표 칸 (x, y)
    fn objective(&self, board: &Board) -> (i32, i32) {
        match self.state {
            BotState::Capture => board
                .flags
                .iter()
                .find(|f| f.team == self.player.team)
                .map(|f| {
                    let (y, x) = f.base();
                    (x, y)
                })
                .unwrap_or((self.player.x, self.player.y)),
            BotState::Defend => board
                .flags
                .iter()
                .find(|f| f.team == self.player.team)
                .map(|f| (f.x, f.y))
                .unwrap_or((self.player.x, self.player.y)),
            BotState::Search | BotState::Random => board
                .flags
                .iter()
                .find(|f| f.team != self.player.team)
                .map(|f| (f.x, f.y))
                .unwrap_or((self.player.x, self.player.y)),
        }
    }

    /// 목표까지의 맨해튼 거리를 최소화하는 유효한 이웃을 고릅니다.
    fn greedy_step(&self, board: &Board, objective: (i32, i32)) -> Option<Action> {
        let (ox, oy) = objective;
        let mut best: Option<(Action, i32)> = None;

        for (action, (dx, dy)) in NEIGHBOURS {
            let nx = self.player.x + dx;
            let ny = self.player.y + dy;
            if !board.is_valid_position(nx, ny) {
                continue;
            }
            // 직전에 지나온 칸으로는 되돌아가지 않는다.
            if self.path.last() == Some(&(nx, ny)) {
                continue;
            }
            let dist = (nx - ox).abs() + (ny - oy).abs();
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((action, dist));
            }
        }
        best.map(|(action, _)| action)
    }

    /// 유효한 이웃 중 하나를 무작위로 고릅니다.
    fn random_step(&self, board: &Board) -> Action {
        let candidates: Vec<Action> = NEIGHBOURS
            .iter()
            .filter(|(_, (dx, dy))| {
                board.is_valid_position(self.player.x + dx, self.player.y + dy)
            })
            .map(|(action, _)| *action)
            .collect();
        candidates
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(Action::None)
    }

    /// 현재 칸을 경로 캐시에 기록합니다.
    fn remember_position(&mut self) {
        self.path.push((self.player.x, self.player.y));
        if self.path.len() > PATH_CACHE {
            self.path.remove(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::cell::Cell;
    use crate::game::items::Flag;

    fn board_with_flags() -> Board {
        let mut flags = vec![
            Flag {
                team: 6,
                x: 2,
                y: 10,
                ..Default::default()
            },
            Flag {
                team: 7,
                x: 47,
                y: 10,
                ..Default::default()
            },
        ];
        for flag in &mut flags {
            flag.set_base();
        }
        Board::init(&[], flags, Vec::new(), Vec::new())
    }

    fn bot_at(x: i32, y: i32, team: u8) -> Bot {
        Bot {
            player: Player {
                number: Cell::PLAYER2,
                team,
                x,
                y,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_bot_only_acts_every_third_tick() {
        let board = board_with_flags();
        let mut bot = bot_at(25, 10, 6);
        bot.player.dash.cooldown = 1000;
        bot.player.dash.mark_used();

        bot.choose_action(1, &board);
        assert_eq!(bot.player.action, Action::None);
        bot.choose_action(2, &board);
        assert_eq!(bot.player.action, Action::None);
        bot.choose_action(3, &board);
        assert_ne!(bot.player.action, Action::None);
    }

    #[test]
    fn test_bot_moves_toward_enemy_flag() {
        let board = board_with_flags();
        let mut bot = bot_at(25, 10, 6);
        bot.player.dash.cooldown = 1000;
        bot.player.dash.mark_used();

        bot.choose_action(3, &board);
        assert_eq!(bot.state, BotState::Search);
        // 적 깃발은 (47, 10): 오른쪽 이동이 거리를 최소화한다.
        assert_eq!(bot.player.action, Action::MoveRight);
    }

    #[test]
    fn test_bot_returns_home_with_flag() {
        let board = board_with_flags();
        let mut bot = bot_at(25, 10, 6);
        bot.player.has_flag = true;
        bot.player.flag_idx = Some(1);

        bot.choose_action(3, &board);
        assert_eq!(bot.state, BotState::Capture);
        // 기지는 (2, 10): 왼쪽 이동이 거리를 최소화한다.
        assert_eq!(bot.player.action, Action::MoveLeft);
    }

    #[test]
    fn test_bot_dashes_when_ready() {
        let board = board_with_flags();
        let mut bot = bot_at(25, 10, 6);
        // 쿨다운이 돌면 대시를 우선한다.
        bot.choose_action(3, &board);
        assert_eq!(bot.player.action, Action::SpellOne);
    }

    #[test]
    fn test_bot_defends_captured_flag() {
        let mut board = board_with_flags();
        board.flags[0].is_captured = true;
        board.flags[0].x = 30;
        board.flags[0].y = 4;

        let mut bot = bot_at(25, 10, 6);
        bot.player.dash.cooldown = 1000;
        bot.player.dash.mark_used();

        bot.choose_action(3, &board);
        assert_eq!(bot.state, BotState::Defend);
        // 빼앗긴 자기 깃발 (30, 4) 방향으로 움직인다.
        assert!(matches!(
            bot.player.action,
            Action::MoveRight | Action::MoveUp
        ));
    }
}

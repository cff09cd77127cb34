//! 게임 보드
//!
//! 20×50 그리드 상태와 배치, 유효성 검사, 깃발 로직, 스프라이트
//! 진행, RLE 인코딩을 담당합니다.
//!
//! # 이중 그리드 규약
//!
//! - `past_grid`: 직전 틱 종료 시점의 확정 스냅샷. 틱 중의 모든
//!   이동/스펠 검사는 이 그리드만 참조합니다.
//! - `current_grid`: 누적된 변경분이 반영되는 그리드. 틱 말미의
//!   `update`에서 변경분을 적용한 뒤 `past_grid`로 승격됩니다.
//!
//! 틱 처리 단계는 보드 락을 잡지 않고 `past_grid`만 읽으므로
//! (틱 사이에는 동결 상태) 경합이 없습니다.

use anyhow::{anyhow, Context, Result};
use parking_lot::RwLock;

use super::bot::Bot;
use super::cell::Cell;
use super::items::{Flag, WallPosition};
use super::player::Player;
use super::sprite::{Sprite, FREEZE_STUN_TICKS};
use super::tracker::ChangeTracker;

/// 보드 행 수
pub const ROWS: usize = 20;
/// 보드 열 수
pub const COLS: usize = 50;

/// 보드 그리드
pub type Grid = [[Cell; COLS]; ROWS];

#[derive(Debug, Clone)]
struct Grids {
    current: Grid,
    past: Grid,
}

/// 게임 보드
pub struct Board {
    grids: RwLock<Grids>,
    pub tracker: ChangeTracker,
    pub flags: Vec<Flag>,
    pub players: Vec<Player>,
    pub bots: Vec<Bot>,
    pub sprites: Vec<Sprite>,
}

impl Board {
    /// 맵 구성 요소로 보드를 초기화합니다.
    ///
    /// 벽 → 깃발 → 플레이어 → 봇 순서로 `past_grid`에 찍은 뒤
    /// `current_grid`를 같은 상태로 맞춥니다.
    pub fn init(
        walls: &[WallPosition],
        mut flags: Vec<Flag>,
        players: Vec<Player>,
        bots: Vec<Bot>,
    ) -> Self {
        let empty: Grid = [[Cell::EMPTY; COLS]; ROWS];
        let board = Self {
            grids: RwLock::new(Grids {
                current: empty,
                past: empty,
            }),
            tracker: ChangeTracker::new(),
            flags: Vec::new(),
            players: Vec::new(),
            bots: Vec::new(),
            sprites: Vec::new(),
        };

        {
            let mut grids = board.grids.write();
            for wall in walls {
                let (ys, xs) = wall.start();
                let (ye, xe) = wall.end();
                for y in ys..=ye.min(ROWS - 1) {
                    for x in xs..=xe.min(COLS - 1) {
                        grids.past[y][x] = Cell::WALL;
                    }
                }
            }
            for flag in &mut flags {
                flag.set_base();
                let (y, x) = (flag.y as usize, flag.x as usize);
                grids.past[y][x] = Cell(flag.team);
            }
            for player in &players {
                grids.past[player.y as usize][player.x as usize] = player.number;
            }
            for bot in &bots {
                grids.past[bot.player.y as usize][bot.player.x as usize] = bot.player.number;
            }
            grids.current = grids.past;
        }

        Self {
            flags,
            players,
            bots,
            ..board
        }
    }

    /// 좌표가 보드 안에 있는지 여부
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && x < COLS as i32 && y >= 0 && y < ROWS as i32
    }

    /// 이동/스펠 대상 칸으로 유효한지 검사합니다.
    ///
    /// 경계 안이면서 `past_grid`가 벽이 아니어야 합니다. 틱 중간의
    /// `current_grid`는 절대 참조하지 않습니다.
    pub fn is_valid_position(&self, x: i32, y: i32) -> bool {
        if !self.in_bounds(x, y) {
            return false;
        }
        self.grids.read().past[y as usize][x as usize] != Cell::WALL
    }

    /// `past_grid`의 셀 값. 경계 밖은 벽으로 취급합니다.
    pub fn past_cell(&self, x: i32, y: i32) -> Cell {
        if !self.in_bounds(x, y) {
            return Cell::WALL;
        }
        self.grids.read().past[y as usize][x as usize]
    }

    /// `current_grid` 스냅샷
    pub fn current_grid(&self) -> Grid {
        self.grids.read().current
    }

    /// `past_grid` 스냅샷
    pub fn past_grid(&self) -> Grid {
        self.grids.read().past
    }

    /// 스프라이트를 등록합니다.
    pub fn add_sprite(&mut self, sprite: Sprite) {
        self.sprites.push(sprite);
    }

    /// `(x, y)`에 있는 적 깃발을 탈취 처리하고 인덱스를 반환합니다.
    pub fn check_flag_captured(&mut self, team: u8, y: i32, x: i32) -> Option<usize> {
        for (idx, flag) in self.flags.iter_mut().enumerate() {
            if flag.team != team && flag.x == x && flag.y == y {
                flag.is_captured = true;
                return Some(idx);
            }
        }
        None
    }

    /// 자기 팀 깃발 기지 위에 도달했는지 검사합니다.
    ///
    /// 득점이면 적 깃발이 기지에 다시 보이도록 기지 셀 변경을
    /// 기록하고 `true`를 반환합니다.
    pub fn check_flag_won(&mut self, team: u8, y: i32, x: i32) -> bool {
        for idx in 0..self.flags.len() {
            let flag = &self.flags[idx];
            let (base_y, base_x) = flag.base();
            if flag.team == team && base_x == x && base_y == y {
                let enemy_idx = (idx + 1) % self.flags.len();
                let enemy = &self.flags[enemy_idx];
                let (ey, ex) = enemy.base();
                let enemy_cell = Cell(enemy.team);
                self.tracker.save_delta(ex, ey, enemy_cell);
                return true;
            }
        }
        false
    }

    /// 누적된 변경분을 `current_grid`에 적용하고 `past_grid`로
    /// 승격합니다. 변경분은 삽입 순서대로 적용되어 같은 셀은 나중
    /// 값이 이깁니다.
    pub fn update(&mut self) {
        let mut grids = self.grids.write();
        for delta in self.tracker.deltas() {
            grids.current[delta.y as usize][delta.x as usize] = Cell(delta.value);
        }
        grids.past = grids.current;
    }

    /// 스프라이트를 한 틱 진행합니다.
    ///
    /// 빙결 조각은 직전 칸을 지우고 전진한 뒤 충돌을 해석합니다:
    /// 벽이면 소멸, 적 플레이어면 대상을 20틱 빙결시키고 소멸.
    /// 수명이 끝난 스프라이트는 목록에서 제거됩니다.
    pub fn update_sprites(&mut self) {
        let mut sprites = std::mem::take(&mut self.sprites);
        for sprite in &mut sprites {
            match sprite {
                Sprite::Dash(dash) => {
                    let (x, y, cell) = dash.update();
                    self.tracker.save_delta(x, y, cell);
                }
                Sprite::Freeze(freeze) => {
                    self.tracker.save_delta(freeze.x, freeze.y, Cell::EMPTY);
                    let (x, y, cell) = freeze.update();
                    let past = self.past_cell(x, y);
                    if past == Cell::WALL {
                        freeze.terminate();
                    } else if past.is_player() {
                        let team = freeze.team;
                        let mut hit = false;
                        for player in self.players.iter_mut() {
                            if player.number == past && player.team != team {
                                player.is_frozen = FREEZE_STUN_TICKS;
                                hit = true;
                            }
                        }
                        for bot in self.bots.iter_mut() {
                            if bot.player.number == past && bot.player.team != team {
                                bot.player.is_frozen = FREEZE_STUN_TICKS;
                                hit = true;
                            }
                        }
                        if hit {
                            freeze.terminate();
                        }
                    } else if !freeze.cleared() {
                        self.tracker.save_delta(x, y, cell);
                    }
                }
            }
        }
        sprites.retain(|s| !s.cleared());
        self.sprites = sprites;
    }

    /// 셀이 다시 비면 안전한 깃발을 다시 찍습니다.
    pub fn replace_hidden_flag(&mut self) {
        for idx in 0..self.flags.len() {
            let flag = &self.flags[idx];
            if flag.is_safe() && self.past_cell(flag.x, flag.y) == Cell::EMPTY {
                let (x, y, team) = (flag.x, flag.y, flag.team);
                self.tracker.save_delta(x, y, Cell(team));
            }
        }
    }

    /// 플레이어 `idx`의 대기 행동을 해석합니다. 득점 시 `true`.
    pub fn take_player_action(&mut self, idx: usize) -> bool {
        let mut player = std::mem::take(&mut self.players[idx]);
        let scored = player.take_action(self);
        self.players[idx] = player;
        scored
    }

    /// 봇 `idx`의 행동을 결정하고 해석합니다. 득점 시 `true`.
    pub fn take_bot_action(&mut self, idx: usize, tick: u32) -> bool {
        let mut bot = std::mem::take(&mut self.bots[idx]);
        bot.choose_action(tick, self);
        let scored = bot.player.take_action(self);
        self.bots[idx] = bot;
        scored
    }
}

/// 그리드를 RLE로 인코딩합니다.
///
/// 행마다 연속 구간을 ASCII `셀:개수`로 쓰고 `|`로 잇습니다. 행
/// 구분자는 따로 없으며 디코더가 행 우선 순서로 1000칸을 채웁니다.
pub fn run_length_encode(grid: &Grid) -> Vec<u8> {
    let mut runs: Vec<String> = Vec::new();
    for row in grid {
        let mut current = row[0];
        let mut count = 1usize;
        for cell in &row[1..] {
            if *cell == current {
                count += 1;
            } else {
                runs.push(format!("{}:{}", current.0, count));
                current = *cell;
                count = 1;
            }
        }
        runs.push(format!("{}:{}", current.0, count));
    }
    runs.join("|").into_bytes()
}

/// RLE 페이로드를 그리드로 복원합니다.
pub fn rle_decode(data: &[u8]) -> Result<Grid> {
    let text = std::str::from_utf8(data).context("RLE 페이로드가 utf-8이 아님")?;
    let mut grid: Grid = [[Cell::EMPTY; COLS]; ROWS];
    let mut filled = 0usize;

    for run in text.split('|') {
        let (value, count) = run
            .split_once(':')
            .ok_or_else(|| anyhow!("잘못된 RLE 구간: {run}"))?;
        let value: u8 = value.parse().with_context(|| format!("셀 값 파싱 실패: {run}"))?;
        let count: usize = count.parse().with_context(|| format!("구간 길이 파싱 실패: {run}"))?;

        for _ in 0..count {
            if filled >= ROWS * COLS {
                return Err(anyhow!("RLE 페이로드가 보드 크기를 초과"));
            }
            grid[filled / COLS][filled % COLS] = Cell(value);
            filled += 1;
        }
    }

    if filled != ROWS * COLS {
        return Err(anyhow!("RLE 페이로드가 보드를 다 채우지 못함: {filled}칸"));
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_board() -> Board {
        Board::init(&[], Vec::new(), Vec::new(), Vec::new())
    }

    #[test]
    fn test_wall_placement_variants() {
        let walls = vec![
            // 한 칸 벽
            WallPosition {
                start_pos: [1, 1],
                end_pos: [1, 1],
            },
            // 가로 벽
            WallPosition {
                start_pos: [2, 3],
                end_pos: [2, 6],
            },
            // 세로 벽
            WallPosition {
                start_pos: [4, 5],
                end_pos: [7, 5],
            },
            // 직사각형 벽
            WallPosition {
                start_pos: [6, 6],
                end_pos: [8, 8],
            },
        ];
        let board = Board::init(&walls, Vec::new(), Vec::new(), Vec::new());
        let grid = board.past_grid();

        assert_eq!(grid[1][1], Cell::WALL);
        for x in 3..=6 {
            assert_eq!(grid[2][x], Cell::WALL);
        }
        for y in 4..=7 {
            assert_eq!(grid[y][5], Cell::WALL);
        }
        for y in 6..=8 {
            for x in 6..=8 {
                assert_eq!(grid[y][x], Cell::WALL);
            }
        }
        // 벽은 유효한 이동 대상이 아니다.
        assert!(!board.is_valid_position(1, 1));
        assert!(board.is_valid_position(0, 0));
    }

    #[test]
    fn test_is_valid_position_bounds() {
        let board = empty_board();
        assert!(board.is_valid_position(0, 0));
        assert!(board.is_valid_position(COLS as i32 - 1, ROWS as i32 - 1));
        assert!(!board.is_valid_position(-1, 0));
        assert!(!board.is_valid_position(0, -1));
        assert!(!board.is_valid_position(COLS as i32, 0));
        assert!(!board.is_valid_position(0, ROWS as i32));
    }

    #[test]
    fn test_rle_uniform_grid() {
        let grid: Grid = [[Cell::WALL; COLS]; ROWS];
        let encoded = run_length_encode(&grid);
        let expected = vec!["1:50"; ROWS].join("|");
        assert_eq!(encoded, expected.into_bytes());
    }

    #[test]
    fn test_rle_alternating_grid() {
        let mut grid: Grid = [[Cell::EMPTY; COLS]; ROWS];
        for row in grid.iter_mut() {
            for (x, cell) in row.iter_mut().enumerate() {
                *cell = if x % 5 == 0 { Cell::WALL } else { Cell::PLAYER1 };
            }
        }
        let encoded = run_length_encode(&grid);
        let row_runs = vec!["1:1|2:4"; 10].join("|");
        let expected = vec![row_runs; ROWS].join("|");
        assert_eq!(encoded, expected.into_bytes());
    }

    #[test]
    fn test_rle_roundtrip_mixed_pattern() {
        let pattern = [1u8, 1, 2, 2, 2, 3, 3, 1, 1, 1];
        let mut grid: Grid = [[Cell::EMPTY; COLS]; ROWS];
        for row in grid.iter_mut() {
            for (x, cell) in row.iter_mut().enumerate() {
                *cell = Cell(pattern[x % pattern.len()]);
            }
        }
        let decoded = rle_decode(&run_length_encode(&grid)).unwrap();
        assert_eq!(decoded, grid);
    }

    #[test]
    fn test_rle_decode_rejects_bad_payload() {
        assert!(rle_decode(b"1:10").is_err()); // 너무 짧음
        assert!(rle_decode(b"oops").is_err());
        assert!(rle_decode(format!("1:{}", ROWS * COLS + 1).as_bytes()).is_err());
    }

    #[test]
    fn test_update_applies_deltas_in_order() {
        let mut board = empty_board();
        board.tracker.save_delta(3, 4, Cell::PLAYER1);
        board.tracker.save_delta(3, 4, Cell::PLAYER2);
        board.update();

        let grid = board.current_grid();
        // 같은 셀은 나중 변경이 이긴다.
        assert_eq!(grid[4][3], Cell::PLAYER2);
        // past_grid로 승격된다.
        assert_eq!(board.past_cell(3, 4), Cell::PLAYER2);
    }

    #[test]
    fn test_flag_capture_and_win_detection() {
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
        let mut board = Board::init(&[], flags, Vec::new(), Vec::new());

        // 자기 팀 깃발은 탈취할 수 없다.
        assert!(board.check_flag_captured(6, 10, 2).is_none());
        // 적 깃발 위에서는 탈취된다.
        let idx = board.check_flag_captured(6, 10, 47).expect("탈취 실패");
        assert_eq!(board.flags[idx].team, 7);
        assert!(board.flags[idx].is_captured);

        // 자기 기지에 도달하면 득점이고 적 깃발 기지 셀이 다시 찍힌다.
        board.tracker.reset();
        assert!(board.check_flag_won(6, 10, 2));
        let deltas = board.tracker.deltas();
        assert_eq!(deltas.len(), 1);
        assert_eq!((deltas[0].x, deltas[0].y, deltas[0].value), (47, 10, 7));
    }

    #[test]
    fn test_replace_hidden_flag() {
        let mut flags = vec![Flag {
            team: 6,
            x: 2,
            y: 10,
            ..Default::default()
        }];
        for flag in &mut flags {
            flag.set_base();
        }
        let mut board = Board::init(&[], flags, Vec::new(), Vec::new());

        // 깃발 셀을 비운다 (플레이어가 지나간 상황).
        board.tracker.save_delta(2, 10, Cell::EMPTY);
        board.update();
        board.tracker.reset();

        board.replace_hidden_flag();
        let deltas = board.tracker.deltas();
        assert_eq!(deltas.len(), 1);
        assert_eq!((deltas[0].x, deltas[0].y, deltas[0].value), (2, 10, 6));

        // 탈취 중인 깃발은 다시 찍지 않는다.
        board.flags[0].is_captured = true;
        board.tracker.reset();
        board.replace_hidden_flag();
        assert!(board.tracker.is_empty());
    }
}

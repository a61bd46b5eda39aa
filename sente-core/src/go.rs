//! Small Go helpers on top of `board_game`: flat move indexing, area scoring
//! and move formatting.

use board_game::board::Player;
use board_game::games::go::{FlatTile, GoBoard, Move, Tile};

/// Flat policy indexing for a fixed board size: index 0 is pass, placements
/// follow in flat tile order.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MoveIndex {
    size: u8,
}

impl MoveIndex {
    pub fn new(size: u8) -> Self {
        MoveIndex { size }
    }

    pub fn size(&self) -> u8 {
        self.size
    }

    /// Number of indices, including pass.
    pub fn policy_len(&self) -> usize {
        1 + (self.size as usize) * (self.size as usize)
    }

    pub fn move_to_index(&self, mv: Move) -> usize {
        match mv {
            Move::Pass => 0,
            Move::Place(tile) => 1 + tile.to_flat(self.size).index() as usize,
        }
    }

    pub fn index_to_move(&self, index: usize) -> Move {
        match index {
            0 => Move::Pass,
            _ => {
                let tile_index = index - 1;
                assert!(tile_index < (self.size as usize) * (self.size as usize));
                Move::Place(FlatTile::new(tile_index as u16).to_tile(self.size))
            }
        }
    }
}

/// Area score for `player`: stones plus surrounded empty territory.
/// Empty regions touching both colors count for neither.
fn area_count(board: &GoBoard, player: Player) -> u64 {
    let size = board.size();
    let area = size as usize * size as usize;

    let tile_at = |x: i32, y: i32| -> Option<Tile> {
        if x < 0 || y < 0 || x >= size as i32 || y >= size as i32 {
            None
        } else {
            Some(FlatTile::new((y as u16) * (size as u16) + x as u16).to_tile(size))
        }
    };

    let mut count = 0;
    let mut visited = vec![false; area];

    for start in 0..area {
        let start_tile = FlatTile::new(start as u16).to_tile(size);
        match board.stone_at(start_tile) {
            Some(p) => {
                if p == player {
                    count += 1;
                }
            }
            None => {
                if visited[start] {
                    continue;
                }

                // flood fill the empty region, recording which colors it touches
                let mut stack = vec![start];
                visited[start] = true;
                let mut region = 0u64;
                let mut touches_own = false;
                let mut touches_other = false;

                while let Some(flat) = stack.pop() {
                    region += 1;
                    let x = (flat % size as usize) as i32;
                    let y = (flat / size as usize) as i32;

                    for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
                        let tile = match tile_at(x + dx, y + dy) {
                            Some(tile) => tile,
                            None => continue,
                        };
                        match board.stone_at(tile) {
                            Some(p) if p == player => touches_own = true,
                            Some(_) => touches_other = true,
                            None => {
                                let flat = tile.to_flat(size).index() as usize;
                                if !visited[flat] {
                                    visited[flat] = true;
                                    stack.push(flat);
                                }
                            }
                        }
                    }
                }

                if touches_own && !touches_other {
                    count += region;
                }
            }
        }
    }

    count
}

/// Final score difference under area scoring, positive when the first player
/// is ahead. Komi counts for the second player.
pub fn final_score_diff(board: &GoBoard) -> f64 {
    let a = area_count(board, Player::A) as f64;
    let b = area_count(board, Player::B) as f64;
    a - b - board.komi().as_float() as f64
}

const COL_LETTERS: &[u8] = b"ABCDEFGHJKLMNOPQRST";

/// GTP-style move formatting, `pass` or e.g. `D4`. Column letters skip `I`.
pub fn format_move(mv: Move, size: u8) -> String {
    match mv {
        Move::Pass => "pass".to_string(),
        Move::Place(tile) => {
            let flat = tile.to_flat(size).index();
            let x = (flat % size as u16) as usize;
            let y = flat / size as u16;
            format!("{}{}", COL_LETTERS[x] as char, y + 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use board_game::board::{Board, BoardMoves};
    use board_game::games::go::{GoBoard, Komi, Move, Rules};
    use internal_iterator::InternalIterator;

    use super::*;

    fn empty_board(size: u8, komi: f32) -> GoBoard {
        GoBoard::new(size, Komi::try_from(komi).unwrap(), Rules::tromp_taylor())
    }

    #[test]
    fn move_index_round_trip() {
        let index = MoveIndex::new(5);
        assert_eq!(index.policy_len(), 26);
        for i in 0..index.policy_len() {
            assert_eq!(index.move_to_index(index.index_to_move(i)), i);
        }
        assert_eq!(index.move_to_index(Move::Pass), 0);
    }

    #[test]
    fn empty_board_score_is_minus_komi() {
        let board = empty_board(5, 7.5);
        assert_eq!(final_score_diff(&board), -7.5);
    }

    #[test]
    fn single_stone_owns_the_board() {
        let mut board = empty_board(5, 0.0);
        let mv = board.available_moves().unwrap().find(|&mv| mv != Move::Pass).unwrap();
        board.play(mv).unwrap();
        // player A owns all 25 points, B has nothing
        assert_eq!(final_score_diff(&board), 25.0);
    }

    #[test]
    fn format_move_examples() {
        let index = MoveIndex::new(9);
        assert_eq!(format_move(Move::Pass, 9), "pass");
        assert_eq!(format_move(index.index_to_move(1), 9), "A1");
        // column 8 skips the letter I
        assert_eq!(format_move(index.index_to_move(9), 9), "J1");
    }
}

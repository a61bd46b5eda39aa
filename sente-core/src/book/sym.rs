//! Composition for the D4 board symmetry group.
//!
//! `board_game` represents a symmetry as an optional transpose followed by
//! optional per-axis flips. Composition under that representation:
//! transposes xor, and the flips of the first symmetry swap axes whenever the
//! second one transposes.

use board_game::symmetry::D4Symmetry;

/// The symmetry equivalent to applying `first` and then `second`.
pub fn compose(first: D4Symmetry, second: D4Symmetry) -> D4Symmetry {
    let (fx, fy) = if second.transpose {
        (first.flip_y, first.flip_x)
    } else {
        (first.flip_x, first.flip_y)
    };
    D4Symmetry::new(
        first.transpose ^ second.transpose,
        second.flip_x ^ fx,
        second.flip_y ^ fy,
    )
}

#[cfg(test)]
mod tests {
    use board_game::board::BoardSymmetry;
    use board_game::games::go::{FlatTile, GoBoard, Komi, Move, Rules};
    use board_game::symmetry::{D4Symmetry, Symmetry};

    use super::compose;

    #[test]
    fn compose_matches_sequential_move_mapping() {
        let board = GoBoard::new(9, Komi::try_from(7.5).unwrap(), Rules::tromp_taylor());
        // a tile with a full orbit of 8, so the action identifies the element
        let probe = Move::Place(FlatTile::new(2 * 9 + 1).to_tile(9));

        for &a in D4Symmetry::all() {
            for &b in D4Symmetry::all() {
                let sequential = board.map_move(b, board.map_move(a, probe));
                let composed = board.map_move(compose(a, b), probe);
                assert_eq!(sequential, composed, "mismatch for {:?} then {:?}", a, b);
            }
        }
    }

    #[test]
    fn identity_is_neutral() {
        let id = D4Symmetry::default();
        for &s in D4Symmetry::all() {
            assert_eq!(compose(s, id), s);
            assert_eq!(compose(id, s), s);
        }
    }

    #[test]
    fn inverse_composes_to_identity() {
        for &s in D4Symmetry::all() {
            assert_eq!(compose(s, s.inverse()), D4Symmetry::default());
            assert_eq!(compose(s.inverse(), s), D4Symmetry::default());
        }
    }
}

//! Canonical position identity.
//!
//! A position's hash is computed over its observable full state: geometry,
//! rules, komi, side to move, pass phase, the occupancy grid and (version 2)
//! the per-tile placement-legality grid, which encodes ko and superko
//! prohibitions as they constrain future play. Canonicalization picks, out of
//! the 8 board symmetries, the image with the smallest hash.

use std::fmt::{self, Debug, Display, Formatter};

use board_game::board::{Board, BoardSymmetry, Player};
use board_game::games::go::{FlatTile, GoBoard, Move, State};
use board_game::symmetry::{D4Symmetry, Symmetry};
use sha2::{Digest, Sha256};

/// 128-bit canonical position hash, the primary key of book nodes.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct BookHash(pub [u64; 2]);

impl BookHash {
    pub fn to_hex(self) -> String {
        format!("{:016x}{:016x}", self.0[0], self.0[1])
    }

    pub fn from_hex(s: &str) -> Option<BookHash> {
        if s.len() != 32 {
            return None;
        }
        let hi = u64::from_str_radix(&s[..16], 16).ok()?;
        let lo = u64::from_str_radix(&s[16..], 16).ok()?;
        Some(BookHash([hi, lo]))
    }
}

impl Display for BookHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Debug for BookHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "BookHash({})", self.to_hex())
    }
}

/// The result of canonicalizing a position.
#[derive(Debug, Clone)]
pub struct Canonicalized {
    pub hash: BookHash,
    /// The position mapped into its canonical frame.
    pub board: GoBoard,
    /// Symmetry mapping the input frame to the canonical frame.
    pub align: D4Symmetry,
    /// Symmetries under which the canonical position maps to itself.
    pub symmetries: Vec<D4Symmetry>,
}

/// Hash the full observable state of a board, in its own frame.
pub fn full_state_hash(board: &GoBoard, book_version: u32) -> BookHash {
    let size = board.size();
    let mut hasher = Sha256::new();

    hasher.update([size, board.rules().allow_multi_stone_suicide as u8]);
    hasher.update(((board.komi().as_float() * 2.0) as i16).to_le_bytes());

    let (player, phase) = match board.state() {
        State::Normal => (board.next_player(), 0u8),
        State::Passed => (board.next_player(), 1u8),
        State::Done(_) => (Player::A, 2u8),
    };
    hasher.update([player_byte(player), phase]);

    let area = size as usize * size as usize;
    let mut grid = Vec::with_capacity(2 * area);
    for i in 0..area {
        let tile = FlatTile::new(i as u16).to_tile(size);
        grid.push(match board.stone_at(tile) {
            None => 0u8,
            Some(Player::A) => 1,
            Some(Player::B) => 2,
        });
    }
    if book_version >= 2 {
        for i in 0..area {
            let tile = FlatTile::new(i as u16).to_tile(size);
            let available = board.is_available_move(Move::Place(tile)).unwrap_or(false);
            grid.push(available as u8);
        }
    }
    hasher.update(&grid);

    let digest = hasher.finalize();
    let hi = u64::from_le_bytes(digest[0..8].try_into().unwrap());
    let lo = u64::from_le_bytes(digest[8..16].try_into().unwrap());
    BookHash([hi, lo])
}

fn player_byte(player: Player) -> u8 {
    match player {
        Player::A => 0,
        Player::B => 1,
    }
}

/// Canonicalize a position: enumerate the 8 symmetries, keep the image with
/// the smallest hash, and collect the self-equivalent symmetries.
pub fn get_hash_and_symmetry(board: &GoBoard, book_version: u32) -> Canonicalized {
    let mut best: Option<(BookHash, D4Symmetry, GoBoard)> = None;
    let mut identity_hash = None;
    let mut hashes = Vec::with_capacity(8);

    for &sym in D4Symmetry::all() {
        let image = board.map(sym);
        let hash = full_state_hash(&image, book_version);
        hashes.push((sym, hash));

        if sym == D4Symmetry::default() {
            identity_hash = Some(hash);
        }
        let better = match &best {
            None => true,
            Some((best_hash, _, _)) => hash < *best_hash,
        };
        if better {
            best = Some((hash, sym, image));
        }
    }

    let (hash, align, canonical_board) = best.unwrap();
    let identity_hash = identity_hash.unwrap();

    // symmetries fixing the position fix every frame of it, so testing
    // against the input frame is enough
    let symmetries = hashes
        .iter()
        .filter(|&&(_, h)| h == identity_hash)
        .map(|&(sym, _)| sym)
        .collect();

    Canonicalized {
        hash,
        board: canonical_board,
        align,
        symmetries,
    }
}

#[cfg(test)]
mod tests {
    use board_game::board::{Board, BoardMoves};
    use board_game::games::go::{GoBoard, Komi, Move, Rules};
    use internal_iterator::InternalIterator;

    use crate::book::LATEST_BOOK_VERSION;

    use super::*;

    fn board(size: u8) -> GoBoard {
        GoBoard::new(size, Komi::try_from(7.5).unwrap(), Rules::tromp_taylor())
    }

    #[test]
    fn empty_board_has_all_symmetries() {
        let canon = get_hash_and_symmetry(&board(5), LATEST_BOOK_VERSION);
        assert_eq!(canon.symmetries.len(), 8);
        assert_eq!(canon.align, D4Symmetry::default());
    }

    #[test]
    fn hash_is_frame_invariant() {
        let mut b = board(5);
        let mv = b.available_moves().unwrap().find(|&mv| mv != Move::Pass).unwrap();
        b.play(mv).unwrap();

        let reference = get_hash_and_symmetry(&b, LATEST_BOOK_VERSION);
        for &sym in D4Symmetry::all() {
            let mapped = b.map(sym);
            let canon = get_hash_and_symmetry(&mapped, LATEST_BOOK_VERSION);
            assert_eq!(canon.hash, reference.hash);
            // the canonical board is the same position in every frame
            assert_eq!(
                full_state_hash(&canon.board, LATEST_BOOK_VERSION),
                full_state_hash(&reference.board, LATEST_BOOK_VERSION),
            );
        }
    }

    #[test]
    fn different_moves_usually_differ() {
        let empty = board(5);
        let mut boards = vec![];
        empty.available_moves().unwrap().for_each(|mv| {
            let mut b = empty.clone();
            b.play(mv).unwrap();
            boards.push(get_hash_and_symmetry(&b, LATEST_BOOK_VERSION).hash);
        });
        // 25 placements + pass collapse to 6 canonical classes + pass
        boards.sort();
        boards.dedup();
        assert_eq!(boards.len(), 7);
    }

    #[test]
    fn pass_changes_the_hash() {
        let b = board(5);
        let mut passed = b.clone();
        passed.play(Move::Pass).unwrap();
        assert_ne!(
            get_hash_and_symmetry(&b, LATEST_BOOK_VERSION).hash,
            get_hash_and_symmetry(&passed, LATEST_BOOK_VERSION).hash,
        );
    }
}

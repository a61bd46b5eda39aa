//! The transposition graph: an arena of nodes indexed by canonical hash.
//!
//! The book itself is single-threaded; the growth driver serializes access
//! through one mutex and keeps all expensive work (canonicalization, net
//! queries, search) outside it. To support that, [Book::play_and_add_move]
//! takes a pre-computed [Canonicalized] child instead of canonicalizing
//! internally, and move-history replay is split into a cheap locked part
//! ([Book::move_chain]) and an unlocked replay ([replay_chain]).

use board_game::board::{Board, BoardSymmetry};
use board_game::games::go::{GoBoard, Move};
use board_game::symmetry::{D4Symmetry, Symmetry};
use rustc_hash::FxHashMap;

use crate::book::cost;
use crate::book::error::BookError;
use crate::book::hash::{get_hash_and_symmetry, BookHash, Canonicalized};
use crate::book::node::{BookEdge, BookNode};
use crate::book::params::BookParams;
use crate::book::propagate;
use crate::book::sym::compose;
use crate::go::format_move;

pub const ROOT: usize = 0;

#[derive(Debug)]
pub struct Book {
    pub book_version: u32,
    pub params: BookParams,

    initial_board: GoBoard,
    rep_bound: u32,

    nodes: Vec<BookNode>,
    index: FxHashMap<BookHash, usize>,
    bonus_by_hash: FxHashMap<BookHash, f64>,
}

/// Result of [Book::play_and_add_move].
#[derive(Debug, Copy, Clone)]
pub struct AddMoveOutcome {
    pub child: usize,
    /// The child node already existed somewhere in the book.
    pub is_transposition: bool,
    /// The edge itself already existed, nothing was modified.
    pub edge_existed: bool,
}

/// One step of a move chain from the root: the canonical move at that node
/// and the alignment symmetry of the traversed edge.
#[derive(Debug, Copy, Clone)]
pub struct ChainStep {
    pub mv: Move,
    pub symmetry: D4Symmetry,
}

/// A node's position replayed in the real (initial-board) frame.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub board: GoBoard,
    pub moves: Vec<Move>,
}

impl Book {
    pub fn new(book_version: u32, initial_board: GoBoard, rep_bound: u32, params: BookParams) -> Book {
        assert!(!initial_board.is_done(), "Cannot build a book for a finished game");

        let canon = get_hash_and_symmetry(&initial_board, book_version);
        let root = BookNode::new(canon.hash, canon.board, canon.symmetries);

        let mut index = FxHashMap::default();
        index.insert(canon.hash, ROOT);

        Book {
            book_version,
            params,
            initial_board,
            rep_bound,
            nodes: vec![root],
            index,
            bonus_by_hash: FxHashMap::default(),
        }
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn initial_board(&self) -> &GoBoard {
        &self.initial_board
    }

    pub fn rep_bound(&self) -> u32 {
        self.rep_bound
    }

    pub fn node(&self, id: usize) -> &BookNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: usize) -> &mut BookNode {
        &mut self.nodes[id]
    }

    pub fn node_ids(&self) -> std::ops::Range<usize> {
        0..self.nodes.len()
    }

    pub fn get_by_hash(&self, hash: BookHash) -> Option<usize> {
        self.index.get(&hash).copied()
    }

    pub fn bonus_for(&self, hash: BookHash) -> f64 {
        self.bonus_by_hash.get(&hash).copied().unwrap_or(0.0)
    }

    /// Replace the user bonus map. Callers should follow up with
    /// [Book::recompute_everything] before expanding.
    pub fn set_bonus_by_hash(&mut self, bonus: FxHashMap<BookHash, f64>) {
        self.bonus_by_hash = bonus;
    }

    /// Canonicalize a position under this book's hashing rules. Expensive;
    /// call outside any lock.
    pub fn canonicalize(board: &GoBoard, book_version: u32) -> Canonicalized {
        get_hash_and_symmetry(board, book_version)
    }

    /// Record `parent --mv--> child`. The move must already be in the
    /// parent's canonical frame and reduced to its representative
    /// ([BookNode::canonical_move_rep_with_sym]); `child` must be the
    /// canonicalization of the parent's canonical board after playing it.
    ///
    /// Idempotent per `(parent, mv)`: an existing edge is returned untouched.
    pub fn play_and_add_move(
        &mut self,
        parent: usize,
        mv: Move,
        raw_policy: f64,
        child: &Canonicalized,
    ) -> AddMoveOutcome {
        debug_assert_eq!(self.nodes[parent].canonical_move_rep(mv), mv);

        if let Some(edge) = self.nodes[parent].children.iter().find(|edge| edge.mv == mv) {
            return AddMoveOutcome {
                child: edge.child,
                is_transposition: true,
                edge_existed: true,
            };
        }

        let (child_id, is_transposition) = match self.index.get(&child.hash) {
            Some(&existing) => (existing, true),
            None => {
                let id = self.nodes.len();
                self.nodes
                    .push(BookNode::new(child.hash, child.board.clone(), child.symmetries.clone()));
                self.index.insert(child.hash, id);
                (id, false)
            }
        };

        self.nodes[parent].children.push(BookEdge {
            mv,
            child: child_id,
            symmetry: child.align,
            raw_policy,
        });
        self.nodes[child_id].parents.push((parent, mv));

        AddMoveOutcome {
            child: child_id,
            is_transposition,
            edge_existed: false,
        }
    }

    /// Follow an existing edge by canonical-frame move. Returns the child
    /// index and the symmetry of the edge.
    pub fn follow(&self, parent: usize, mv: Move) -> Option<(usize, D4Symmetry)> {
        self.nodes[parent].edge_for(mv).map(|edge| (edge.child, edge.symmetry))
    }

    /// The chain of canonical moves from the root to `id`, following the
    /// first recorded parent of each node. Cheap; no board work.
    pub fn move_chain(&self, id: usize) -> Vec<ChainStep> {
        let mut rev = vec![];
        let mut curr = id;
        while curr != ROOT {
            let &(parent, mv) = self.nodes[curr]
                .parents
                .first()
                .expect("Non-root node must have a parent");
            let edge = self.nodes[parent]
                .children
                .iter()
                .find(|edge| edge.mv == mv)
                .expect("Parent backlink must have a matching edge");
            rev.push(ChainStep {
                mv,
                symmetry: edge.symmetry,
            });
            curr = parent;
        }
        rev.reverse();
        rev
    }

    /// Walk a node's recorded moves in the real frame and verify that the
    /// resulting position canonicalizes back to its hash.
    pub fn verify_node(&self, id: usize) -> Result<Reconstruction, BookError> {
        let chain = self.move_chain(id);
        let hash = self.nodes[id].hash;
        let recon = replay_chain(&self.initial_board, self.book_version, &chain, hash)?;

        let computed = get_hash_and_symmetry(&recon.board, self.book_version).hash;
        if computed != hash {
            return Err(BookError::IntegrityFailure { hash, computed });
        }
        Ok(recon)
    }

    /// Verify every node, collecting all failures.
    pub fn integrity_check(&self) -> Vec<BookError> {
        self.node_ids()
            .filter_map(|id| self.verify_node(id).err())
            .collect()
    }

    /// Nodes with no children in the book and at least `min_visits` recursive
    /// visits, the source set for trace imports.
    pub fn all_leaves(&self, min_visits: f64) -> Vec<usize> {
        self.node_ids()
            .filter(|&id| self.nodes[id].children.is_empty() && self.nodes[id].recursive.visits >= min_visits)
            .collect()
    }

    pub fn get_next_n_to_expand(&self, n: usize) -> Vec<usize> {
        cost::select_nodes_to_expand(self, n)
    }

    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), BookError> {
        crate::book::persist::save_to_file(self, path)
    }

    pub fn load_from_file(
        path: impl AsRef<std::path::Path>,
        sharp_score_outlier_cap: f64,
    ) -> Result<Book, BookError> {
        crate::book::persist::load_from_file(path, sharp_score_outlier_cap)
    }

    pub fn recompute_everything(&mut self) {
        propagate::recompute_everything(self);
    }

    pub fn recompute(&mut self, dirty: &[BookHash]) {
        propagate::recompute(self, dirty);
    }

    pub(crate) fn from_parts(
        book_version: u32,
        initial_board: GoBoard,
        rep_bound: u32,
        params: BookParams,
        nodes: Vec<BookNode>,
        index: FxHashMap<BookHash, usize>,
    ) -> Book {
        Book {
            book_version,
            params,
            initial_board,
            rep_bound,
            nodes,
            index,
            bonus_by_hash: FxHashMap::default(),
        }
    }
}

/// Replay a move chain on the real initial board. Expensive (plays moves and
/// canonicalizes the start position); call outside any lock.
pub fn replay_chain(
    initial_board: &GoBoard,
    book_version: u32,
    chain: &[ChainStep],
    node_hash: BookHash,
) -> Result<Reconstruction, BookError> {
    let mut board = initial_board.clone();
    // v maps the real frame into the current node's canonical frame
    let mut v = get_hash_and_symmetry(initial_board, book_version).align;
    let mut moves = vec![];

    for step in chain {
        let real_mv = board.map_move(v.inverse(), step.mv);
        if !board.is_available_move(real_mv).unwrap_or(false) {
            return Err(BookError::IllegalMoveInBook {
                hash: node_hash,
                mv: format_move(real_mv, board.size()),
            });
        }
        board
            .play(real_mv)
            .expect("Move was just checked to be available");
        moves.push(real_mv);
        v = compose(v, step.symmetry);
    }

    Ok(Reconstruction { board, moves })
}

#[cfg(test)]
mod tests {
    use board_game::board::{Board, BoardMoves};
    use board_game::games::go::{GoBoard, Komi, Move, Rules};
    use internal_iterator::InternalIterator;

    use crate::book::{BookParams, LATEST_BOOK_VERSION};

    use super::*;

    fn empty_book(size: u8) -> Book {
        let board = GoBoard::new(size, Komi::try_from(7.5).unwrap(), Rules::tromp_taylor());
        Book::new(LATEST_BOOK_VERSION, board, 3, BookParams::default())
    }

    fn placements(board: &GoBoard) -> Vec<Move> {
        let mut moves = vec![];
        board.available_moves().unwrap().for_each(|mv| {
            if mv != Move::Pass {
                moves.push(mv)
            }
        });
        moves
    }

    /// Add a move to `parent` the way a worker would: reduce to the
    /// representative, play on the canonical board, canonicalize.
    fn add(book: &mut Book, parent: usize, mv: Move, policy: f64) -> AddMoveOutcome {
        let node = book.node(parent);
        let (rep, _) = node.canonical_move_rep_with_sym(mv);
        let mut board = node.board.clone();
        board.play(rep).unwrap();
        let canon = Book::canonicalize(&board, book.book_version);
        book.play_and_add_move(parent, rep, policy, &canon)
    }

    #[test]
    fn add_is_idempotent() {
        let mut book = empty_book(5);
        let mv = placements(&book.node(ROOT).board)[0];

        let first = add(&mut book, ROOT, mv, 0.5);
        assert!(!first.edge_existed);
        assert!(!first.is_transposition);
        assert_eq!(book.size(), 2);

        let second = add(&mut book, ROOT, mv, 0.5);
        assert!(second.edge_existed);
        assert_eq!(second.child, first.child);
        assert_eq!(book.size(), 2);
        assert_eq!(book.node(ROOT).children.len(), 1);
    }

    #[test]
    fn symmetric_moves_share_an_edge() {
        let mut book = empty_book(5);
        let moves = placements(&book.node(ROOT).board);

        // every move equivalent to the first one is a single class
        let first_rep = book.node(ROOT).canonical_move_rep(moves[0]);
        let corners: Vec<Move> = moves
            .iter()
            .copied()
            .filter(|&mv| book.node(ROOT).canonical_move_rep(mv) == first_rep)
            .collect();
        assert!(corners.len() > 1);

        for &mv in &corners {
            add(&mut book, ROOT, mv, 0.25);
        }
        assert_eq!(book.node(ROOT).children.len(), 1);
        assert_eq!(book.size(), 2);
    }

    #[test]
    fn transpositions_share_a_node() {
        let mut book = empty_book(5);
        let moves = placements(&book.node(ROOT).board);

        // pick two move classes far enough apart not to interact
        let a = book.node(ROOT).canonical_move_rep(moves[0]);
        let b = moves
            .iter()
            .map(|&mv| book.node(ROOT).canonical_move_rep(mv))
            .find(|&mv| mv != a)
            .unwrap();

        // path 1: a then b
        let n_a = add(&mut book, ROOT, a, 0.3).child;
        let node_a = book.node(n_a);
        let b_in_a = node_a.board.map_move(
            {
                // map b into a's canonical frame through the edge
                let edge = book.node(ROOT).edge_for(a).unwrap();
                edge.symmetry
            },
            b,
        );
        let size_before = book.size();
        let out_ab = add(&mut book, n_a, b_in_a, 0.3);
        assert!(!out_ab.is_transposition);
        assert_eq!(book.size(), size_before + 1);

        // path 2: b then a, must transpose into the same node
        let n_b = add(&mut book, ROOT, b, 0.3).child;
        let a_in_b = {
            let edge = book.node(ROOT).edge_for(b).unwrap();
            book.node(n_b).board.map_move(edge.symmetry, a)
        };
        let size_before = book.size();
        let out_ba = add(&mut book, n_b, a_in_b, 0.3);
        assert!(out_ba.is_transposition);
        assert_eq!(out_ba.child, out_ab.child);
        // both adds together created exactly one node
        assert_eq!(book.size(), size_before);
    }

    #[test]
    fn verify_node_round_trips() {
        let mut book = empty_book(5);
        let moves = placements(&book.node(ROOT).board);
        let child = add(&mut book, ROOT, moves[7], 0.2).child;

        book.verify_node(ROOT).unwrap();
        let recon = book.verify_node(child).unwrap();
        assert_eq!(recon.moves.len(), 1);
        assert!(book.integrity_check().is_empty());
    }
}

//! Book nodes and edges. Nodes live in the book's arena and refer to each
//! other by index, never by pointer.

use board_game::board::{Board, BoardSymmetry, Player};
use board_game::games::go::{GoBoard, Move};
use board_game::symmetry::{D4Symmetry, Symmetry};

use crate::book::hash::BookHash;
use crate::book::values::{LeafValues, RecursiveValues};
use crate::go::MoveIndex;

/// An edge to a child node. `mv` is expressed in the parent's canonical
/// frame; `symmetry` maps the position after playing `mv` in that frame into
/// the child's canonical frame.
#[derive(Debug, Clone)]
pub struct BookEdge {
    pub mv: Move,
    pub child: usize,
    pub symmetry: D4Symmetry,
    pub raw_policy: f64,
}

#[derive(Debug, Clone)]
pub struct BookNode {
    pub hash: BookHash,
    /// Reference position in the canonical frame.
    pub board: GoBoard,
    /// Symmetries under which this position maps to itself.
    pub symmetries: Vec<D4Symmetry>,

    pub children: Vec<BookEdge>,
    /// Back references: (parent index, canonical move in the parent's frame).
    pub parents: Vec<(usize, Move)>,

    pub this_values: LeafValues,
    pub recursive: RecursiveValues,

    pub can_expand: bool,
    pub can_re_expand: bool,
}

impl BookNode {
    pub fn new(hash: BookHash, board: GoBoard, symmetries: Vec<D4Symmetry>) -> BookNode {
        BookNode {
            hash,
            board,
            symmetries,
            children: vec![],
            parents: vec![],
            this_values: LeafValues::default(),
            recursive: RecursiveValues::default(),
            can_expand: true,
            can_re_expand: true,
        }
    }

    pub fn side_to_move(&self) -> Player {
        self.board.next_player()
    }

    /// Map a canonical-frame move to the representative of its class under
    /// this node's self-symmetries, so equivalent moves share one edge.
    pub fn canonical_move_rep(&self, mv: Move) -> Move {
        self.canonical_move_rep_with_sym(mv).0
    }

    /// Like [Self::canonical_move_rep], also returning the self-symmetry that
    /// maps `mv` to the representative.
    pub fn canonical_move_rep_with_sym(&self, mv: Move) -> (Move, D4Symmetry) {
        move_rep_with_sym(&self.board, &self.symmetries, mv)
    }

    pub fn edge_for(&self, mv: Move) -> Option<&BookEdge> {
        let rep = self.canonical_move_rep(mv);
        self.children.iter().find(|edge| edge.mv == rep)
    }

    pub fn is_move_in_book(&self, mv: Move) -> bool {
        self.edge_for(mv).is_some()
    }

    /// Total raw policy mass of the moves already expanded here.
    pub fn expanded_policy_mass(&self) -> f64 {
        self.children.iter().map(|edge| edge.raw_policy).sum()
    }
}

/// Standalone form of [BookNode::canonical_move_rep_with_sym], usable from a
/// node snapshot without holding the book lock.
pub fn move_rep_with_sym(board: &GoBoard, symmetries: &[D4Symmetry], mv: Move) -> (Move, D4Symmetry) {
    let index = MoveIndex::new(board.size());
    symmetries
        .iter()
        .map(|&sym| (board.map_move(sym, mv), sym))
        .min_by_key(|&(mapped, _)| index.move_to_index(mapped))
        .unwrap_or((mv, D4Symmetry::default()))
}

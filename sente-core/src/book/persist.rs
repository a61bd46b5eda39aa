//! Versioned binary snapshot of the book.
//!
//! Layout, all little-endian: magic, version, initial-position header, the
//! cost/bonus scalar block, a node table, an edge table. Node boards are not
//! stored; they are rebuilt by replaying edges breadth-first from the root,
//! so a save / load / save round trip is byte-identical.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use board_game::board::{Board, BoardSymmetry, Player};
use board_game::games::go::{GoBoard, Komi, Rules};
use board_game::symmetry::{D4Symmetry, Symmetry};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rustc_hash::FxHashMap;

use crate::book::error::BookError;
use crate::book::graph::{Book, ROOT};
use crate::book::hash::BookHash;
use crate::book::node::{BookEdge, BookNode};
use crate::book::params::BookParams;
use crate::book::values::{LeafValues, RecursiveValues};
use crate::book::{LATEST_BOOK_VERSION, SUPPORTED_HASH_VERSIONS};
use crate::go::MoveIndex;

const MAGIC: &[u8; 8] = b"SENTEBK\n";

fn sym_to_index(sym: D4Symmetry) -> u8 {
    D4Symmetry::all()
        .iter()
        .position(|&s| s == sym)
        .expect("Symmetry is always one of the 8 group elements") as u8
}

fn sym_from_index(index: u8) -> Result<D4Symmetry, BookError> {
    D4Symmetry::all()
        .get(index as usize)
        .copied()
        .ok_or_else(|| BookError::Format(format!("invalid symmetry index {}", index)))
}

pub fn save_to_file(book: &Book, path: impl AsRef<Path>) -> Result<(), BookError> {
    let path = path.as_ref();
    let tmp = path.with_extension("tmp");

    {
        let mut w = BufWriter::new(File::create(&tmp)?);
        write_book(book, &mut w)?;
        w.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn write_book(book: &Book, w: &mut impl Write) -> Result<(), BookError> {
    w.write_all(MAGIC)?;
    w.write_u32::<LittleEndian>(book.book_version)?;

    let initial = book.initial_board();
    w.write_u8(initial.size())?;
    w.write_i16::<LittleEndian>((initial.komi().as_float() * 2.0) as i16)?;
    w.write_u8(initial.rules().allow_multi_stone_suicide as u8)?;
    w.write_u8(player_to_byte(initial.next_player()))?;
    w.write_u32::<LittleEndian>(book.rep_bound())?;

    for value in book.params.to_array() {
        w.write_f64::<LittleEndian>(value)?;
    }

    let index = MoveIndex::new(initial.size());

    w.write_u64::<LittleEndian>(book.size() as u64)?;
    let mut edge_count = 0u64;
    for id in book.node_ids() {
        let node = book.node(id);
        edge_count += node.children.len() as u64;

        w.write_u64::<LittleEndian>(node.hash.0[0])?;
        w.write_u64::<LittleEndian>(node.hash.0[1])?;
        w.write_u8(player_to_byte(node.side_to_move()))?;
        w.write_u8(node.can_expand as u8 | (node.can_re_expand as u8) << 1)?;
        w.write_u8(node.symmetries.len() as u8)?;
        for &sym in &node.symmetries {
            w.write_u8(sym_to_index(sym))?;
        }

        let tv = &node.this_values;
        for value in [
            tv.win_loss,
            tv.score_mean,
            tv.sharp_score_mean,
            tv.win_loss_error,
            tv.score_error,
            tv.score_stdev,
            tv.max_policy,
            tv.weight,
            tv.visits,
        ] {
            w.write_f64::<LittleEndian>(value)?;
        }

        let rv = &node.recursive;
        for value in [
            rv.win_loss,
            rv.score_mean,
            rv.sharp_score_mean,
            rv.win_loss_ucb,
            rv.win_loss_lcb,
            rv.score_ucb,
            rv.score_lcb,
            rv.weight,
            rv.visits,
        ] {
            w.write_f64::<LittleEndian>(value)?;
        }
    }

    w.write_u64::<LittleEndian>(edge_count)?;
    for id in book.node_ids() {
        for edge in &book.node(id).children {
            w.write_u64::<LittleEndian>(id as u64)?;
            w.write_u16::<LittleEndian>(index.move_to_index(edge.mv) as u16)?;
            w.write_u64::<LittleEndian>(edge.child as u64)?;
            w.write_u8(sym_to_index(edge.symmetry))?;
            w.write_f64::<LittleEndian>(edge.raw_policy)?;
        }
    }

    Ok(())
}

pub fn load_from_file(path: impl AsRef<Path>, sharp_score_outlier_cap: f64) -> Result<Book, BookError> {
    let mut r = BufReader::new(File::open(path.as_ref())?);
    read_book(&mut r, sharp_score_outlier_cap)
}

fn read_book(r: &mut impl Read, sharp_score_outlier_cap: f64) -> Result<Book, BookError> {
    let mut magic = [0u8; 8];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(BookError::Format("bad magic".to_string()));
    }

    let book_version = r.read_u32::<LittleEndian>()?;
    if !SUPPORTED_HASH_VERSIONS.contains(&book_version) {
        return Err(BookError::UnsupportedVersion(book_version));
    }

    let size = r.read_u8()?;
    let komi_half = r.read_i16::<LittleEndian>()?;
    let multi_suicide = r.read_u8()? != 0;
    let initial_player = r.read_u8()?;
    let rep_bound = r.read_u32::<LittleEndian>()?;

    if initial_player != 0 {
        return Err(BookError::Format(
            "books always start with the first player to move".to_string(),
        ));
    }

    let komi = Komi::try_from(komi_half as f32 / 2.0)
        .map_err(|_| BookError::Format(format!("invalid komi {}", komi_half)))?;
    let rules = Rules {
        allow_multi_stone_suicide: multi_suicide,
    };
    let initial_board = GoBoard::new(size, komi, rules);

    let mut param_values = [0.0f64; 23];
    for value in param_values.iter_mut() {
        *value = r.read_f64::<LittleEndian>()?;
    }
    let params = BookParams::from_array(param_values);

    let node_count = r.read_u64::<LittleEndian>()? as usize;
    if node_count == 0 {
        return Err(BookError::Format("book has no root node".to_string()));
    }

    let mut nodes = Vec::with_capacity(node_count);
    let mut index = FxHashMap::default();
    for id in 0..node_count {
        let hash = BookHash([r.read_u64::<LittleEndian>()?, r.read_u64::<LittleEndian>()?]);
        let _side = r.read_u8()?;
        let flags = r.read_u8()?;
        let sym_count = r.read_u8()?;
        let mut symmetries = Vec::with_capacity(sym_count as usize);
        for _ in 0..sym_count {
            symmetries.push(sym_from_index(r.read_u8()?)?);
        }

        let mut tv_values = [0.0f64; 9];
        for value in tv_values.iter_mut() {
            *value = r.read_f64::<LittleEndian>()?;
        }
        let mut rv_values = [0.0f64; 9];
        for value in rv_values.iter_mut() {
            *value = r.read_f64::<LittleEndian>()?;
        }

        let sharp_cap = sharp_score_outlier_cap;
        let mut node = BookNode::new(hash, initial_board.clone(), symmetries);
        node.can_expand = flags & 1 != 0;
        node.can_re_expand = flags & 2 != 0;
        node.this_values = LeafValues {
            win_loss: tv_values[0],
            score_mean: tv_values[1],
            sharp_score_mean: tv_values[2]
                .max(tv_values[1] - sharp_cap)
                .min(tv_values[1] + sharp_cap),
            win_loss_error: tv_values[3],
            score_error: tv_values[4],
            score_stdev: tv_values[5],
            max_policy: tv_values[6],
            weight: tv_values[7],
            visits: tv_values[8],
        };
        node.recursive = RecursiveValues {
            win_loss: rv_values[0],
            score_mean: rv_values[1],
            sharp_score_mean: rv_values[2],
            win_loss_ucb: rv_values[3],
            win_loss_lcb: rv_values[4],
            score_ucb: rv_values[5],
            score_lcb: rv_values[6],
            weight: rv_values[7],
            visits: rv_values[8],
            ..RecursiveValues::default()
        };

        if index.insert(hash, id).is_some() {
            return Err(BookError::Format(format!("duplicate node hash {}", hash)));
        }
        nodes.push(node);
    }

    let edge_count = r.read_u64::<LittleEndian>()? as usize;
    let move_index = MoveIndex::new(size);
    for _ in 0..edge_count {
        let parent = r.read_u64::<LittleEndian>()? as usize;
        let mv_index = r.read_u16::<LittleEndian>()? as usize;
        let child = r.read_u64::<LittleEndian>()? as usize;
        let symmetry = sym_from_index(r.read_u8()?)?;
        let raw_policy = r.read_f64::<LittleEndian>()?;

        if parent >= node_count || child >= node_count || mv_index >= move_index.policy_len() {
            return Err(BookError::Format("edge refers outside the node table".to_string()));
        }
        let mv = move_index.index_to_move(mv_index);
        nodes[parent].children.push(BookEdge {
            mv,
            child,
            symmetry,
            raw_policy,
        });
        nodes[child].parents.push((parent, mv));
    }

    rebuild_boards(&initial_board, book_version, &mut nodes)?;

    Ok(Book::from_parts(
        book_version,
        initial_board,
        rep_bound,
        params,
        nodes,
        index,
    ))
}

/// Rebuild every node's canonical reference board by replaying edges
/// breadth-first from the root.
fn rebuild_boards(initial_board: &GoBoard, book_version: u32, nodes: &mut [BookNode]) -> Result<(), BookError> {
    let canon = Book::canonicalize(initial_board, book_version);
    if canon.hash != nodes[ROOT].hash {
        return Err(BookError::Format(
            "root node does not match the initial position".to_string(),
        ));
    }
    nodes[ROOT].board = canon.board;

    let mut reached = vec![false; nodes.len()];
    reached[ROOT] = true;
    let mut queue = std::collections::VecDeque::new();
    queue.push_back(ROOT);

    while let Some(id) = queue.pop_front() {
        for i in 0..nodes[id].children.len() {
            let BookEdge {
                mv, child, symmetry, ..
            } = nodes[id].children[i];
            if reached[child] {
                continue;
            }

            let mut board = nodes[id].board.clone();
            board
                .play(mv)
                .map_err(|_| BookError::Format(format!("illegal edge move at node {}", nodes[id].hash)))?;
            nodes[child].board = board.map(symmetry);
            reached[child] = true;
            queue.push_back(child);
        }
    }

    if let Some(missing) = reached.iter().position(|&r| !r) {
        return Err(BookError::Format(format!(
            "node {} is not reachable from the root",
            nodes[missing].hash
        )));
    }
    Ok(())
}

fn player_to_byte(player: Player) -> u8 {
    match player {
        Player::A => 0,
        Player::B => 1,
    }
}

/// Convenience used by new-book creation: latest version everywhere.
pub fn new_book(initial_board: GoBoard, rep_bound: u32, params: BookParams) -> Book {
    Book::new(LATEST_BOOK_VERSION, initial_board, rep_bound, params)
}

#[cfg(test)]
mod tests {
    use board_game::board::{Board, BoardMoves};
    use board_game::games::go::Move;
    use internal_iterator::InternalIterator;

    use crate::book::graph::ROOT;
    use crate::book::values::LeafValues;

    use super::*;

    fn sample_book() -> Book {
        let board = GoBoard::new(
            5,
            Komi::try_from(7.5).unwrap(),
            Rules::tromp_taylor(),
        );
        let mut book = new_book(board, 3, BookParams::default());

        let moves: Vec<Move> = {
            let mut moves = vec![];
            book.node(ROOT).board.available_moves().unwrap().for_each(|mv| {
                if mv != Move::Pass {
                    moves.push(mv)
                }
            });
            moves
        };
        for &mv in &moves[..3] {
            let node = book.node(ROOT);
            let (rep, _) = node.canonical_move_rep_with_sym(mv);
            let mut board = node.board.clone();
            board.play(rep).unwrap();
            let canon = Book::canonicalize(&board, book.book_version);
            let out = book.play_and_add_move(ROOT, rep, 0.2, &canon);
            if !out.edge_existed {
                book.node_mut(out.child).this_values = LeafValues::terminal(5.0, 10.0);
            }
        }

        book.node_mut(ROOT).this_values = LeafValues {
            win_loss: 0.25,
            score_mean: 2.0,
            sharp_score_mean: 2.5,
            win_loss_error: 0.1,
            score_error: 0.4,
            score_stdev: 1.0,
            max_policy: 0.3,
            weight: 64.0,
            visits: 64.0,
        };
        book.recompute_everything();
        book
    }

    #[test]
    fn save_load_save_is_byte_identical() {
        let book = sample_book();

        let mut first = vec![];
        write_book(&book, &mut first).unwrap();

        let cap = book.params.sharp_score_outlier_cap;
        let loaded = read_book(&mut first.as_slice(), cap).unwrap();
        let mut second = vec![];
        write_book(&loaded, &mut second).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn load_restores_structure_and_boards() {
        let book = sample_book();
        let mut bytes = vec![];
        write_book(&book, &mut bytes).unwrap();
        let loaded = read_book(&mut bytes.as_slice(), book.params.sharp_score_outlier_cap).unwrap();

        assert_eq!(loaded.size(), book.size());
        assert_eq!(loaded.book_version, book.book_version);
        for id in book.node_ids() {
            assert_eq!(loaded.node(id).hash, book.node(id).hash);
            assert_eq!(loaded.node(id).children.len(), book.node(id).children.len());
        }
        assert!(loaded.integrity_check().is_empty());
    }

    #[test]
    fn truncated_file_is_a_format_error() {
        let book = sample_book();
        let mut bytes = vec![];
        write_book(&book, &mut bytes).unwrap();
        bytes.truncate(bytes.len() / 2);
        assert!(read_book(&mut bytes.as_slice(), 2.0).is_err());
    }
}

//! The single-mutex discipline around the book. Every structural read or
//! write goes through this lock; canonicalization, net queries and searches
//! happen outside it.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};

use board_game::games::go::GoBoard;
use board_game::symmetry::D4Symmetry;

use sente_core::book::{Book, BookHash};
use sente_core::eval::Evaluator;
use sente_core::search::{BookSearcher, SearchSettings};

use crate::config::GrowConfig;

pub struct SharedBook {
    book: Mutex<Book>,
}

impl SharedBook {
    pub fn new(book: Book) -> SharedBook {
        SharedBook {
            book: Mutex::new(book),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn into_inner(self) -> Book {
        self.book.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A cheap copy of a node's immutable identity, taken under the lock and
/// used for search and canonicalization outside it.
#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    pub id: usize,
    pub hash: BookHash,
    pub board: GoBoard,
    pub symmetries: Vec<D4Symmetry>,
}

impl SharedBook {
    pub fn snapshot(&self, id: usize) -> NodeSnapshot {
        let book = self.lock();
        let node = book.node(id);
        NodeSnapshot {
            id,
            hash: node.hash,
            board: node.board.clone(),
            symmetries: node.symmetries.clone(),
        }
    }
}

/// Everything one worker thread needs.
pub struct WorkerCtx<'a, S: BookSearcher> {
    pub shared: &'a SharedBook,
    pub searcher: S,
    pub evaluator: Arc<dyn Evaluator>,
    pub config: &'a GrowConfig,
    pub search_settings: SearchSettings,
    pub book_version: u32,
    pub stop: Arc<AtomicBool>,
}

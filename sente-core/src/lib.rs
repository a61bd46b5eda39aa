//! Core engine for growing a Go opening book: the symmetry-aware transposition
//! graph, expansion-cost selection, recursive value propagation and the
//! versioned on-disk snapshot, together with the seam traits for the external
//! evaluator and tree search.

pub mod book;
pub mod eval;
pub mod go;
pub mod search;
pub mod zero;

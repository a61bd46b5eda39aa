//! Verify the integrity of an opening book: every node's recorded moves
//! must walk to a position that canonicalizes back to its hash.

use std::path::PathBuf;

use clap::Parser;
use log::{error, info};

use sente_core::book::Book;

#[derive(Debug, Parser)]
#[clap(name = "checkbook", about = "Check integrity of opening book")]
struct Args {
    /// Book file to check
    #[clap(long)]
    book_file: PathBuf,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let book = match Book::load_from_file(&args.book_file, 2.0) {
        Ok(book) => book,
        Err(err) => {
            error!("Failed to load book: {}", err);
            std::process::exit(2);
        }
    };
    info!(
        "Loaded preexisting book with {} nodes from {}",
        book.size(),
        args.book_file.display()
    );
    info!("Book version = {}", book.book_version);

    info!("Checking book...");
    let mut failures = 0usize;
    let total = book.size();
    for (checked, id) in book.node_ids().enumerate() {
        if let Err(err) = book.verify_node(id) {
            error!("{}", err);
            failures += 1;
        }
        if (checked + 1) % 10000 == 0 {
            info!("Checked {}/{} nodes", checked + 1, total);
        }
    }

    info!("DONE");
    if failures > 0 {
        error!("Book failed integrity check on {} nodes", failures);
        std::process::exit(2);
    }
}

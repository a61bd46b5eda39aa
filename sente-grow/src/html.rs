//! Plain HTML dump of the book: one page per node with its board and child
//! table. Deliberately minimal; a real viewer is out of scope, this only
//! keeps the export flags of the command line meaningful.

use std::fmt::Write as _;
use std::io;
use std::path::Path;

use sente_core::book::Book;
use sente_core::go::format_move;

pub fn export_to_html_dir(book: &Book, dir: &Path, dev_mode: bool, min_visits: f64) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;

    let mut index = String::new();
    let _ = writeln!(index, "<html><body><h1>Book ({} nodes)</h1><ul>", book.size());

    for id in book.node_ids() {
        let node = book.node(id);
        if node.recursive.visits < min_visits {
            continue;
        }

        let _ = writeln!(
            index,
            "<li><a href=\"{}.html\">{}</a> visits {:.0}</li>",
            node.hash, node.hash, node.recursive.visits
        );
        std::fs::write(dir.join(format!("{}.html", node.hash)), node_page(book, id, dev_mode))?;
    }

    let _ = writeln!(index, "</ul></body></html>");
    std::fs::write(dir.join("index.html"), index)?;
    Ok(())
}

fn node_page(book: &Book, id: usize, dev_mode: bool) -> String {
    let node = book.node(id);
    let size = node.board.size();
    let mut page = String::new();

    let _ = writeln!(page, "<html><body><h1>{}</h1>", node.hash);
    let _ = writeln!(page, "<pre>{}</pre>", node.board);

    let rv = &node.recursive;
    let _ = writeln!(
        page,
        "<p>win/loss {:.3}, score {:.1}, visits {:.0}</p>",
        rv.win_loss, rv.score_mean, rv.visits
    );
    if dev_mode {
        let _ = writeln!(
            page,
            "<p>cost from root {:.3}, expansion cost {:.3}, wl range [{:.3}, {:.3}]</p>",
            rv.min_cost_from_root, rv.total_expansion_cost, rv.win_loss_lcb, rv.win_loss_ucb
        );
    }

    let _ = writeln!(
        page,
        "<table border=\"1\"><tr><th>move</th><th>policy</th><th>win/loss</th><th>score</th><th>visits</th></tr>"
    );
    for edge in &node.children {
        let child = book.node(edge.child);
        let _ = writeln!(
            page,
            "<tr><td><a href=\"{}.html\">{}</a></td><td>{:.4}</td><td>{:.3}</td><td>{:.1}</td><td>{:.0}</td></tr>",
            child.hash,
            format_move(edge.mv, size),
            edge.raw_policy,
            child.recursive.win_loss,
            child.recursive.score_mean,
            child.recursive.visits,
        );
    }
    let _ = writeln!(page, "</table></body></html>");

    page
}

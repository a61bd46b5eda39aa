//! Generate or continue expanding an opening book.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context};
use board_game::board::{Board, Player};
use clap::Parser;
use log::info;
use rustc_hash::FxHashMap;

use sente_core::book::{Book, BookError, BookHash, LATEST_BOOK_VERSION, SUPPORTED_HASH_VERSIONS};
use sente_core::eval::{Evaluator, UniformEvaluator};
use sente_core::zero::ZeroSearcher;

use sente_grow::config::{ConfigError, GrowConfig};
use sente_grow::driver::{grow_book, save_with_sidecar, GrowOptions};
use sente_grow::html::export_to_html_dir;
use sente_grow::sgf::{scan_bonus_file, SgfScan};
use sente_grow::shared::SharedBook;
use sente_grow::trace::trace_from_book;

#[derive(Debug, Parser)]
#[clap(name = "genbook", about = "Generate opening book")]
struct Args {
    /// Run configuration file (json)
    #[clap(long)]
    config: PathBuf,
    /// Book file to write to or continue expanding
    #[clap(long)]
    book_file: PathBuf,
    /// Number of iterations to expand the book
    #[clap(long, default_value_t = 0)]
    num_iters: u32,
    /// Number of iterations per save to the book file
    #[clap(long, default_value_t = 10)]
    save_every: u32,
    /// HTML directory to export to after the run
    #[clap(long)]
    html_dir: Option<PathBuf>,
    /// Require at least this many visits to export a position to html
    #[clap(long, default_value_t = 0.0)]
    html_min_visits: f64,
    /// Denser debug output for html
    #[clap(long)]
    html_dev_mode: bool,
    /// Other book file to copy all lines from
    #[clap(long)]
    trace_book_file: Option<PathBuf>,
    /// Require at least this many visits for copying from the trace book
    #[clap(long, default_value_t = 0.0)]
    trace_book_min_visits: f64,
    /// SGF with BONUS annotations
    #[clap(long)]
    bonus_file: Option<PathBuf>,
    /// Allow changing book params of an existing book
    #[clap(long)]
    allow_changing_book_params: bool,
    /// Log file to write to
    #[clap(long)]
    log_file: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();
    init_logger(args.log_file.as_deref());

    match run(&args) {
        Ok(()) => {}
        Err(err) => {
            log::error!("{:#}", err);
            let config_error = err.downcast_ref::<ConfigError>().is_some()
                || err.downcast_ref::<sente_grow::sgf::SgfError>().is_some()
                || matches!(err.downcast_ref::<BookError>(), Some(BookError::ConfigMismatch { .. }));
            std::process::exit(if config_error { 1 } else { 2 });
        }
    }
}

fn init_logger(log_file: Option<&Path>) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .expect("Failed to open log file");
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
}

fn run(args: &Args) -> anyhow::Result<()> {
    let (config, config_text) = GrowConfig::load(&args.config)?;

    if args.trace_book_file.is_some() && args.num_iters > 0 {
        bail!(ConfigError::Invalid(
            "cannot specify iterations and a trace book at the same time".to_string(),
        ));
    }

    let evaluator: Arc<dyn Evaluator> = match config.run.evaluator.as_str() {
        "uniform" => Arc::new(UniformEvaluator),
        other => bail!(ConfigError::Invalid(format!("unknown evaluator '{}'", other))),
    };

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::Release))
            .context("failed to install signal handler")?;
    }

    let bonus = match &args.bonus_file {
        Some(path) => {
            let text = std::fs::read_to_string(path).context("failed to read bonus file")?;
            let scan = scan_bonus_file(&text)?;
            bonus_by_hash(&scan, &config)?
        }
        None => FxHashMap::default(),
    };

    let mut book = if args.book_file.exists() {
        let book = Book::load_from_file(&args.book_file, config.book.sharp_score_outlier_cap)?;
        if book.initial_board() != &config.initial_board()? || book.rep_bound() != config.board.rep_bound {
            bail!(ConfigError::Invalid("book parameters do not match".to_string()));
        }
        info!(
            "Loaded preexisting book with {} nodes from {}",
            book.size(),
            args.book_file.display()
        );
        info!("Book version = {}", book.book_version);
        book
    } else {
        let initial = config.initial_board()?;
        info!("Initializing new book with starting position:\n{}", initial);
        let book = Book::new(
            LATEST_BOOK_VERSION,
            initial,
            config.board.rep_bound,
            config.book_params(),
        );
        info!("Creating new book at {}", args.book_file.display());
        book.save_to_file(&args.book_file)?;
        std::fs::write(sidecar_path(&args.book_file), &config_text)?;
        book
    };

    let changes = book
        .params
        .reconcile(&config.book_params(), args.allow_changing_book_params)?;
    for change in changes {
        info!("{}", change);
    }

    book.set_bonus_by_hash(bonus);
    book.recompute_everything();

    let shared = SharedBook::new(book);
    let search_settings = config.search_settings();
    let make_searcher = |seed: u64| ZeroSearcher::new(search_settings, evaluator.clone(), seed, stop.clone());

    if let Some(trace_file) = &args.trace_book_file {
        let mut trace_book = Book::load_from_file(trace_file, config.book.sharp_score_outlier_cap)?;
        trace_book.recompute_everything();
        info!(
            "Loaded trace book with {} nodes from {}",
            trace_book.size(),
            trace_file.display()
        );
        info!("traceBookMinVisits = {}", args.trace_book_min_visits);

        trace_from_book(
            &shared,
            &trace_book,
            args.trace_book_min_visits,
            &config,
            evaluator.clone(),
            stop.clone(),
            &make_searcher,
        )?;

        info!("SAVING TO FILE {}", args.book_file.display());
        save_with_sidecar(&shared, &args.book_file, &config_text)?;
    } else {
        let options = GrowOptions {
            book_file: args.book_file.clone(),
            num_iterations: args.num_iters,
            save_every: args.save_every,
            config_text: config_text.clone(),
        };
        grow_book(&shared, &config, evaluator.clone(), stop.clone(), &options, &make_searcher)?;
    }

    if let Some(html_dir) = &args.html_dir {
        info!("EXPORTING HTML TO {}", html_dir.display());
        let book = shared.lock();
        export_to_html_dir(&book, html_dir, args.html_dev_mode, args.html_min_visits)?;
    }

    info!("DONE");
    Ok(())
}

fn sidecar_path(book_file: &Path) -> PathBuf {
    let mut path = book_file.as_os_str().to_owned();
    path.push(".cfg");
    PathBuf::from(path)
}

/// Register every annotated position's bonus under each supported hashing
/// rule, so books of any version keep receiving it.
fn bonus_by_hash(scan: &SgfScan, config: &GrowConfig) -> anyhow::Result<FxHashMap<BookHash, f64>> {
    if scan.size != config.board.size {
        bail!(ConfigError::Invalid(
            "board size in config does not match the board size of the bonus file".to_string(),
        ));
    }
    if scan.first_player != Player::A {
        bail!(ConfigError::Invalid(
            "book initial player and initial player in bonus sgf file do not match".to_string(),
        ));
    }

    let initial = config.initial_board()?;
    let mut map = FxHashMap::default();

    'positions: for position in &scan.bonus_positions {
        let mut board = initial.clone();
        for &(player, mv) in &position.moves {
            // tolerant replay: variations that no longer make sense under
            // the book's rules are skipped
            if board.is_done()
                || board.next_player() != player
                || !board.is_available_move(mv).unwrap_or(false)
            {
                continue 'positions;
            }
            board.play(mv).expect("Move was just checked to be available");
        }

        for &version in SUPPORTED_HASH_VERSIONS {
            let hash = Book::canonicalize(&board, version).hash;
            info!("Adding bonus {} to hash {}", position.bonus, hash);
            map.insert(hash, position.bonus);
        }
    }

    Ok(map)
}

//! The iteration loop: select the next leaves, fan them out to worker
//! threads, splice, propagate, save every so often.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam::channel;
use log::info;

use sente_core::book::{BookError, BookHash};
use sente_core::eval::Evaluator;
use sente_core::search::BookSearcher;

use crate::config::GrowConfig;
use crate::expand::expand_node;
use crate::shared::{SharedBook, WorkerCtx};

#[derive(Debug, Clone)]
pub struct GrowOptions {
    pub book_file: PathBuf,
    pub num_iterations: u32,
    pub save_every: u32,
    /// Raw config text echoed into the `.cfg` sidecar on every save.
    pub config_text: String,
}

pub fn save_with_sidecar(shared: &SharedBook, book_file: &Path, config_text: &str) -> Result<(), BookError> {
    let book = shared.lock();
    book.save_to_file(book_file)?;

    let mut sidecar = book_file.as_os_str().to_owned();
    sidecar.push(".cfg");
    std::fs::write(sidecar, config_text)?;
    Ok(())
}

/// Run the expansion loop. Returns cleanly when all iterations have run or
/// the stop flag is raised; the final state is saved either way.
pub fn grow_book<S, F>(
    shared: &SharedBook,
    config: &GrowConfig,
    evaluator: Arc<dyn Evaluator>,
    stop: Arc<AtomicBool>,
    options: &GrowOptions,
    make_searcher: F,
) -> Result<(), BookError>
where
    S: BookSearcher + Send,
    F: Fn(u64) -> S + Sync,
{
    let book_version = shared.lock().book_version;
    let threads = config.run.num_game_threads;

    for iteration in 0..options.num_iterations {
        if stop.load(Ordering::Acquire) {
            break;
        }

        if iteration != 0 && options.save_every != 0 && iteration % options.save_every == 0 {
            info!("SAVING TO FILE {}", options.book_file.display());
            save_with_sidecar(shared, &options.book_file, &options.config_text)?;
        }

        info!("BEGINNING BOOK EXPANSION ITERATION {}", iteration);

        // narrow early iterations so the book does not fan out blindly
        let count = ((1 + iteration / 2) as usize).min(config.run.num_to_expand_per_iteration);
        let targets: Vec<BookHash> = {
            let book = shared.lock();
            book.get_next_n_to_expand(count)
                .into_iter()
                .map(|id| book.node(id).hash)
                .collect()
        };

        let (sender, receiver) = channel::unbounded();
        for &hash in &targets {
            sender.send(hash).expect("Queue cannot be closed yet");
        }
        drop(sender);

        let changed = Mutex::new(targets);

        crossbeam::scope(|s| {
            for worker in 0..threads {
                let receiver = receiver.clone();
                let stop = stop.clone();
                let evaluator = evaluator.clone();
                let changed = &changed;
                let make_searcher = &make_searcher;
                let seed = config
                    .run
                    .seed
                    .wrapping_add((iteration as u64) * threads as u64 + worker as u64);

                s.builder()
                    .name(format!("expander-{}", worker))
                    .spawn(move |_| {
                        let mut ctx = WorkerCtx {
                            shared,
                            searcher: make_searcher(seed),
                            evaluator,
                            config,
                            search_settings: config.search_settings(),
                            book_version,
                            stop: stop.clone(),
                        };

                        let mut local = vec![];
                        loop {
                            if stop.load(Ordering::Acquire) {
                                break;
                            }
                            match receiver.try_recv() {
                                Ok(hash) => expand_node(&mut ctx, hash, &mut local),
                                Err(_) => break,
                            }
                        }
                        changed.lock().unwrap().extend(local);
                    })
                    .unwrap();
            }
        })
        .unwrap();

        let changed = changed.into_inner().unwrap();
        {
            let mut book = shared.lock();
            book.recompute(&changed);
        }

        if stop.load(Ordering::Acquire) {
            break;
        }
    }

    if options.num_iterations > 0 {
        info!("SAVING TO FILE {}", options.book_file.display());
        save_with_sidecar(shared, &options.book_file, &options.config_text)?;
    }

    Ok(())
}

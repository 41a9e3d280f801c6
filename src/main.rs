//! plumedb workload driver: exercises the buffer pool with a seeded random
//! page workload and reports timings.

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use plumedb::storage::{BufferPoolManager, DiskManager, PageId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Database file to create
    #[arg(short, long, default_value = "./plumedb_bench.db")]
    file: PathBuf,

    /// Number of frames in the buffer pool
    #[arg(short, long, default_value = "64")]
    pool_size: usize,

    /// K for the LRU-K replacer
    #[arg(short, long, default_value = "2")]
    k: usize,

    /// Number of pages in the working set
    #[arg(long, default_value = "256")]
    pages: usize,

    /// Number of random operations to run
    #[arg(short, long, default_value = "10000")]
    ops: usize,

    /// RNG seed
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Keep the database file after the run
    #[arg(long)]
    keep: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let disk = DiskManager::create(&args.file)
        .with_context(|| format!("Failed to create database file {:?}", args.file))?;
    let pool = BufferPoolManager::new(args.pool_size, disk, args.k, None)?;
    info!(
        "pool_size={} k={} pages={} ops={} seed={}",
        args.pool_size, args.k, args.pages, args.ops, args.seed
    );

    // Allocate the working set.
    let start = Instant::now();
    let mut page_ids = Vec::with_capacity(args.pages);
    for _ in 0..args.pages {
        let (page_id, page) = pool
            .new_page()?
            .context("no evictable frame while allocating the working set")?;
        page.write().data_mut()[0] = page_id.0 as u8;
        pool.unpin_page(page_id, true);
        page_ids.push(page_id);
    }
    let alloc_elapsed = start.elapsed();

    // Random mix of reads, writes, flushes, and deletes.
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut reads = 0usize;
    let mut writes = 0usize;
    let mut flushes = 0usize;
    let mut deletes = 0usize;
    let mut misses = 0usize;

    let start = Instant::now();
    for _ in 0..args.ops {
        let slot = rng.gen_range(0..page_ids.len());
        let page_id = page_ids[slot];
        match rng.gen_range(0..20) {
            0 => {
                pool.flush_page(page_id)?;
                flushes += 1;
            }
            1 => {
                if pool.delete_page(page_id)? {
                    // Keep the working set at full size.
                    let (new_id, page) = pool
                        .new_page()?
                        .context("no evictable frame while replacing a deleted page")?;
                    page.write().data_mut()[0] = new_id.0 as u8;
                    pool.unpin_page(new_id, true);
                    page_ids[slot] = new_id;
                    deletes += 1;
                }
            }
            2..=8 => match pool.fetch_page(page_id)? {
                Some(page) => {
                    let mut guard = page.write();
                    let data = guard.data_mut();
                    data[1] = data[1].wrapping_add(1);
                    drop(guard);
                    pool.unpin_page(page_id, true);
                    writes += 1;
                }
                None => misses += 1,
            },
            _ => match pool.fetch_page(page_id)? {
                Some(page) => {
                    debug!("page {} tag {}", page_id, page.read().data()[0]);
                    pool.unpin_page(page_id, false);
                    reads += 1;
                }
                None => misses += 1,
            },
        }
    }
    let ops_elapsed = start.elapsed();

    pool.flush_all_pages()?;
    verify_tags(&pool, &page_ids)?;

    println!("\n--- Workload Results ---");
    println!("| Phase    | Ops        | Time          |");
    println!("|----------|------------|---------------|");
    println!("| allocate | {:<10} | {:<13?} |", args.pages, alloc_elapsed);
    println!("| mixed    | {:<10} | {:<13?} |", args.ops, ops_elapsed);
    println!(
        "reads={} writes={} flushes={} deletes={} misses={}",
        reads, writes, flushes, deletes, misses
    );

    if !args.keep {
        std::fs::remove_file(&args.file).ok();
    }
    Ok(())
}

/// Every page in the working set must still carry the tag byte written at
/// allocation time, wherever the workload left it.
fn verify_tags(pool: &BufferPoolManager, page_ids: &[PageId]) -> Result<()> {
    for &page_id in page_ids {
        let page = pool
            .fetch_page(page_id)?
            .with_context(|| format!("page {} unavailable during verification", page_id))?;
        let tag = page.read().data()[0];
        anyhow::ensure!(
            tag == page_id.0 as u8,
            "page {} carries tag {} instead of {}",
            page_id,
            tag,
            page_id.0 as u8
        );
        pool.unpin_page(page_id, false);
    }
    Ok(())
}

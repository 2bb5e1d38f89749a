//! Construct a throttler that can fire 5 calls every 2 seconds, then use it to page through a
//! mock record search and read the results back in batches. Some reads fail at random; each
//! failure only affects its own call.
//!
//! Run with `RUST_LOG=info` to see the throttler announce each wait.

use call_throttler::{Throttler, ThrottlerConfig};

use std::time::Duration;

use rand::{thread_rng, Rng};
use tokio::time::{sleep, Instant};
use tracing_subscriber::EnvFilter;

const TOTAL_RECORDS: u32 = 23;
const PAGE_SIZE: u32 = 5;
const BATCH_SIZE: usize = 4;

struct Page {
    ids: Vec<u32>,
    after: Option<u32>,
}

async fn simulate_latency() {
    let millis = thread_rng().gen_range(5..50);
    sleep(Duration::from_millis(millis)).await;
}

async fn search(after: Option<u32>) -> Result<Page, String> {
    simulate_latency().await;
    let first = after.unwrap_or(0);
    let last = (first + PAGE_SIZE).min(TOTAL_RECORDS);
    Ok(Page {
        ids: (first..last).collect(),
        after: (last < TOTAL_RECORDS).then_some(last),
    })
}

async fn batch_read(ids: Vec<u32>) -> Result<Vec<String>, String> {
    simulate_latency().await;
    if thread_rng().gen_bool(0.2) {
        return Err(format!("429 Too Many Requests for batch starting at {}", ids[0]));
    }
    Ok(ids.iter().map(|id| format!("product-{}", id * 7)).collect())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ThrottlerConfig::default()
        .with_limit(5)
        .with_window(Duration::from_secs(2));
    let throttler = Throttler::with_config(config).expect("valid config");
    let start = Instant::now();

    // Pages have to be fetched one after another, since each cursor comes from the previous page
    let mut ids = vec![];
    let mut after = None;
    loop {
        let page = match throttler.call(search, after).await {
            Ok(Ok(page)) => page,
            Ok(Err(err)) => panic!("search failed: {}", err),
            Err(err) => panic!("search never ran: {}", err),
        };
        println!("Fetched page of {} at {:?}", page.ids.len(), Instant::now() - start);
        ids.extend(page.ids);
        after = page.after;
        if after.is_none() {
            break;
        }
    }

    // Batches can all be submitted up front; the throttler paces them
    let completions: Vec<_> = ids
        .chunks(BATCH_SIZE)
        .map(|chunk| throttler.call(batch_read, chunk.to_vec()))
        .collect();

    for completion in completions {
        match completion.await {
            Ok(Ok(products)) => println!("Read {:?} at {:?}", products, Instant::now() - start),
            Ok(Err(err)) => println!("Batch failed: {} at {:?}", err, Instant::now() - start),
            Err(err) => println!("Batch never completed: {}", err),
        }
    }

    println!("Total calls dispatched: {}", throttler.total_dispatched());
}

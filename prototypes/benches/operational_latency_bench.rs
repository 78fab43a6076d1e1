use std::env;
use std::sync::Arc;
use std::time::Instant;

use alayasiki_core::config::EngineConfig;
use alayasiki_sdk::{AddMemoryOptions, Engine, MemoryContext};
use query::dsl::{LexicalQuery, QueryRequest};

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key).ok().and_then(|v| v.parse::<usize>().ok()).unwrap_or(default)
}

fn percentile_ns(samples: &[u128], p: f64) -> u128 {
    if samples.is_empty() {
        return 0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let rank = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[rank]
}

fn fmt_ns(ns: u128) -> String {
    if ns >= 1_000_000 {
        format!("{:.3} ms", ns as f64 / 1_000_000.0)
    } else if ns >= 1_000 {
        format!("{:.3} us", ns as f64 / 1_000.0)
    } else {
        format!("{ns} ns")
    }
}

/// Concurrent add_memory/query_memory workload against a single shared
/// `Engine`, reporting read/write latency percentiles and throughput.
/// Stands in for the teacher's `Repository`-based workload now that
/// ingestion and querying run through the dual-graph engine instead of a
/// flat `u64`-keyed repo.
#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let workers = env_usize("ALAYASIKI_BENCH_WORKERS", 8);
    let ops_per_worker = env_usize("ALAYASIKI_BENCH_OPS_PER_WORKER", 60);
    let write_every = env_usize("ALAYASIKI_BENCH_WRITE_EVERY", 4).max(1);

    let engine = Arc::new(Engine::new(EngineConfig::default()));

    let read_latencies = Arc::new(tokio::sync::Mutex::new(Vec::<u128>::new()));
    let write_latencies = Arc::new(tokio::sync::Mutex::new(Vec::<u128>::new()));

    let scenario_start = Instant::now();
    let mut handles = Vec::with_capacity(workers);
    for worker_id in 0..workers {
        let engine = engine.clone();
        let read_latencies = read_latencies.clone();
        let write_latencies = write_latencies.clone();

        let handle = tokio::spawn(async move {
            for op in 0..ops_per_worker {
                if op % write_every == 0 {
                    let content = format!("worker={worker_id} op={op}: Acme Robotics expands EV battery production and AI tooling.");
                    let begin = Instant::now();
                    engine
                        .add_memory(
                            content,
                            MemoryContext::new(),
                            AddMemoryOptions { idempotency_key: Some(format!("bench-{worker_id}-{op}")), ..Default::default() },
                        )
                        .await
                        .unwrap();
                    write_latencies.lock().await.push(begin.elapsed().as_nanos());
                } else {
                    let request = QueryRequest {
                        lexical: LexicalQuery { text: Some("EV battery".to_string()), ..Default::default() },
                        ..Default::default()
                    };
                    let begin = Instant::now();
                    let _ = engine.query_memory(request, MemoryContext::new()).await.unwrap();
                    read_latencies.lock().await.push(begin.elapsed().as_nanos());
                }
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let total_elapsed = scenario_start.elapsed();
    let read_samples = read_latencies.lock().await.clone();
    let write_samples = write_latencies.lock().await.clone();
    let total_ops = read_samples.len() + write_samples.len();
    let throughput = if total_elapsed.as_secs_f64() > 0.0 { total_ops as f64 / total_elapsed.as_secs_f64() } else { 0.0 };

    println!("=== Operational Latency Benchmark (add_memory + query_memory) ===");
    println!("config: workers={workers}, ops_per_worker={ops_per_worker}, write_every={write_every}");
    println!(
        "workload: total_ops={total_ops}, read_ops={}, write_ops={}, elapsed={:.3}s, throughput={throughput:.2} ops/s",
        read_samples.len(),
        write_samples.len(),
        total_elapsed.as_secs_f64(),
    );
    println!(
        "read latency: p50={}, p95={}, p99={}",
        fmt_ns(percentile_ns(&read_samples, 0.50)),
        fmt_ns(percentile_ns(&read_samples, 0.95)),
        fmt_ns(percentile_ns(&read_samples, 0.99))
    );
    println!(
        "write latency: p50={}, p95={}, p99={}",
        fmt_ns(percentile_ns(&write_samples, 0.50)),
        fmt_ns(percentile_ns(&write_samples, 0.95)),
        fmt_ns(percentile_ns(&write_samples, 0.99))
    );
}

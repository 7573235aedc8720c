//! Load testing for the mirroring proxy.

use std::time::{Duration, Instant};

mod common;

#[tokio::test]
async fn test_load_performance() {
    // 1. Setup mock backends
    let primary = common::start_mock_backend(200, "Hello from primary").await;
    let secondary = common::start_mock_backend(200, "Hello from secondary").await;

    // 2. Start proxy
    let config = common::mirror_config(&primary.url(), &secondary.url());
    let (proxy_addr, shutdown) = common::spawn_proxy(config).await;

    // 3. Run load test
    let concurrency = 20;
    let requests_per_task = 25;
    let total_requests = concurrency * requests_per_task;

    let client = common::client();
    let start = Instant::now();

    let mut tasks = Vec::new();
    for _ in 0..concurrency {
        let client = client.clone();
        let url = format!("http://{}/load", proxy_addr);
        tasks.push(tokio::spawn(async move {
            let mut latencies = Vec::new();
            for _ in 0..requests_per_task {
                let req_start = Instant::now();
                if let Ok(res) = client.get(&url).send().await {
                    if res.status().is_success()
                        && res.text().await.map(|b| b == "Hello from primary").unwrap_or(false)
                    {
                        latencies.push(req_start.elapsed());
                    }
                }
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for task in tasks {
        all_latencies.extend(task.await.unwrap());
    }

    let duration = start.elapsed();
    let rps = total_requests as f64 / duration.as_secs_f64();

    if all_latencies.is_empty() {
        panic!("No successful requests recorded");
    }

    all_latencies.sort();
    let p50 = all_latencies[all_latencies.len() / 2];
    let p95 = all_latencies[(all_latencies.len() as f64 * 0.95) as usize];
    let p99 = all_latencies[(all_latencies.len() as f64 * 0.99) as usize];

    println!("\n--- Load Test Results ---");
    println!("Total Requests: {}", total_requests);
    println!("Concurrency:    {}", concurrency);
    println!("Total Duration: {:?}", duration);
    println!("Requests/sec:   {:.2}", rps);
    println!("P50 Latency:    {:?}", p50);
    println!("P95 Latency:    {:?}", p95);
    println!("P99 Latency:    {:?}", p99);
    println!("Success Rate:   {}/{}", all_latencies.len(), total_requests);
    println!("-------------------------\n");

    assert_eq!(all_latencies.len(), total_requests);

    // 4. Every request was mirrored
    let mirrored = secondary
        .wait_for(total_requests, Duration::from_secs(5))
        .await;
    assert_eq!(mirrored.len(), total_requests);
    assert_eq!(primary.received().len(), total_requests);

    shutdown.trigger();
}

//! Client for mesh-server
//!
//! Sends one ping, then a batch of tasks with a concurrency limit, and
//! prints each outcome.
//!
//! Usage:
//!   # First, start the server in another terminal:
//!   cargo run --bin mesh-server
//!
//!   # Then run the client (targets MESH_ADDR, default 127.0.0.1:8091):
//!   cargo run --bin mesh-client
//!
//!   # Or name the targets explicitly:
//!   cargo run --bin mesh-client -- 127.0.0.1:8091 127.0.0.1:8092

use std::env;

use meshwire_client::{MeshClient, RetryPolicy, SendOptions};
use meshwire_examples::{Keyring, Ping, Task, env_or, init_tracing, mesh_addr};
use tokio::sync::Semaphore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let identity = env_or("MESH_IDENTITY", "5Example");
    let secret = env_or("MESH_KEY", "example-secret");
    let mut targets: Vec<String> = env::args().skip(1).collect();
    if targets.is_empty() {
        targets.push(mesh_addr()?.to_string());
    }

    let client = MeshClient::builder(Keyring::new(identity, &secret))
        .options(SendOptions::new().retry(RetryPolicy::new().max_attempts(3)))
        .build()?;

    println!("=== meshwire client ===");
    println!("Identity: {}", client.identity());
    println!("Targets: {targets:?}");
    println!();

    println!("Ping...");
    let outcome = client
        .send(
            &targets[0],
            &Ping {
                seq: 1,
                note: String::new(),
            },
            client.options(),
        )
        .await;
    match (&outcome.exception, outcome.body().typed()) {
        (None, Some(pong)) => println!("  OK: seq={} note={:?}", pong.seq, pong.note),
        (Some(e), _) => println!("  FAILED: {e}"),
        (None, None) => println!("  UNEXPECTED BODY: {:?}", outcome.body().fields()),
    }

    println!("Batch of tasks...");
    let prompts = [
        "summarize the incident report",
        "",
        "translate the release notes into plain language for operators",
    ];
    let tasks: Vec<Task> = prompts
        .iter()
        .map(|p| Task {
            prompt: p.to_string(),
            score: None,
        })
        .collect();
    let batch_targets: Vec<&str> = targets.iter().map(String::as_str).cycle().take(tasks.len()).collect();
    let limiter = Semaphore::new(2);

    let outcomes = client
        .batch_send(&batch_targets, &tasks, client.options(), Some(&limiter))
        .await;
    for (task, outcome) in tasks.iter().zip(&outcomes) {
        match (&outcome.exception, outcome.body().typed()) {
            (None, Some(scored)) => println!("  {:?}: score={:?}", task.prompt, scored.score),
            (Some(e), _) => println!("  {:?}: FAILED: {e}", task.prompt),
            (None, None) => println!(
                "  {:?}: no typed body, error={:?}",
                task.prompt,
                outcome.error()
            ),
        }
    }

    Ok(())
}

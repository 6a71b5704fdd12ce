//! Signed echo server
//!
//! Serves two routes behind the meshwire pipeline:
//! - `POST /Ping`: echoes the ping, tagging the note with the caller
//! - `POST /Task`: scores the prompt by length
//!
//! `GET /docs` lists the routes without authentication.
//!
//! Environment:
//! - `MESH_ADDR`: listen address (default `127.0.0.1:8091`)
//! - `MESH_IDENTITY` / `MESH_KEY`: the one identity trusted to call in
//!   (default `5Example` / `example-secret`)
//! - `RUST_LOG`: log filter (default `info`)
//!
//! Run with: cargo run --bin mesh-server

use meshwire::prelude::*;
use meshwire_examples::{Ping, Task, TrustedKeys, env_or, init_tracing, mesh_addr};

async fn ping(ctx: RequestContext, ping: Ping) -> Result<Ping, MeshError> {
    let caller = ctx.identity.map(|id| id.0).unwrap_or_default();
    Ok(Ping {
        seq: ping.seq,
        note: format!("pong for {caller}"),
    })
}

async fn score(task: Task) -> Result<Task, MeshError> {
    if task.prompt.trim().is_empty() {
        return Err(MeshError::validation("prompt must not be blank"));
    }
    let score = task.prompt.split_whitespace().count() as f64 / 10.0;
    Ok(Task {
        score: Some(score.min(1.0)),
        ..task
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let identity = env_or("MESH_IDENTITY", "5Example");
    let secret = env_or("MESH_KEY", "example-secret");
    let addr = mesh_addr()?;

    let server = Server::builder(TrustedKeys::new().trust(identity.clone(), &secret))
        .route(Route::with_context(ping).describe("echoes the sequence number"))
        .route(Route::new(score).describe("scores a prompt"))
        .receive_max_bytes(4 * 1024 * 1024)
        .build();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, trusted = %identity, "starting mesh-server");

    server
        .serve_with_shutdown(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}

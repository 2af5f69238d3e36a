//! Quickstart example: connect, ingest a couple of linked chunks, recall.
//!
//! Run with: cargo run -p cmem-sdk --example quickstart
//! (copy this file into crates/cmem-sdk/examples/ to run it directly)

use cmem_sdk::{CancelToken, Client, IngestChunk, RecallOutcome, RecallRequest};
use chrono::Utc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    cmem_sdk::init_tracing();

    let client = Client::connect_default().await?;
    println!("connected to workspace");

    let db = client.database();
    let index = client.vector_index();
    let now = Utc::now();

    let first: cmem_types::NewChunk = IngestChunk {
        id: "chunk-1".to_string(),
        content: "User asked how to configure the retry policy.".to_string(),
        session_id: "session-1".to_string(),
        session_slug: "acme-web".to_string(),
        turn_indices: vec![1, 2],
        start_time: now,
        end_time: now,
        approx_tokens: 40,
        code_block_count: 0,
        tool_use_count: 0,
        agent_id: Some("agent-a".to_string()),
        spawn_depth: 0,
        project_path: None,
        team_name: None,
    }
    .into();

    {
        let db = db.lock().unwrap();
        db.insert_chunk(&cmem_types::Chunk::build(first)?)?;
    }
    index.insert(&db.lock().unwrap(), "chunk-1", vec![0.2, 0.8, 0.1], "acme-web")?;

    let outcome = client
        .recall(
            RecallRequest::new(vec![0.2, 0.8, 0.1]).project("acme-web"),
            &CancelToken::new(),
        )
        .await;

    match outcome {
        RecallOutcome::Hit(result) => {
            println!("recalled {} chunk(s):\n{}", result.chunks.len(), result.text);
        }
        RecallOutcome::Degraded(degraded) => {
            println!("degraded: {}", degraded.summary);
        }
    }

    Ok(())
}

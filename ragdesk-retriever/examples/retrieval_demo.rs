//! Builds an index over a few generated documents and runs some queries.
//!
//! Downloads the default embedding model on first run.

use anyhow::Result;
use ragdesk_retriever::{Retriever, RetrieverConfig};
use tempfile::tempdir;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let temp_dir = tempdir()?;
    let docs_dir = temp_dir.path().join("docs");
    std::fs::create_dir_all(&docs_dir)?;

    let documents = [
        ("sky.txt", "The sky is blue because air scatters short wavelengths."),
        ("ocean.txt", "Oceans cover about seventy percent of the planet."),
        ("bread.txt", "Sourdough bread rises thanks to wild yeast."),
        ("rust.txt", "Rust guarantees memory safety without a garbage collector."),
    ];
    for (name, text) in documents {
        std::fs::write(docs_dir.join(name), text)?;
    }
    println!("Wrote {} documents to {}", documents.len(), docs_dir.display());

    let config = RetrieverConfig::default()
        .with_documents_dir(&docs_dir)
        .with_index_path(temp_dir.path().join("index").join("vectors.index"));
    let retriever = Retriever::from_config(config).await?;

    let stats = retriever.ensure_ready().await?;
    println!("Index ready: {} rows, {} dimensions\n", stats.rows, stats.dimension);

    for query in [
        "Why is the sky blue?",
        "How does bread rise?",
        "memory safe programming language",
    ] {
        println!("Query: {query}");
        for hit in retriever.retrieve(query, 2).await? {
            println!("  {:.3}  {}", hit.score, hit.document);
        }
        println!();
    }

    Ok(())
}

//! Embeds a few sentences with the default model and ranks them against a query

use ragdesk_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = EmbedConfig::default().with_batch_size(2);
    println!("Model: {}", config.model_name());

    let provider = FastEmbedProvider::create(config).await?;
    println!(
        "Provider: {} (dimension {})",
        provider.provider_name(),
        provider.embedding_dimension()
    );

    let texts = vec![
        "Rust is a systems programming language.".to_string(),
        "The sky is blue on a clear day.".to_string(),
        "Password resets are handled from the account page.".to_string(),
    ];
    let result = provider.embed_documents(&texts).await?;

    let query = "How do I reset my password?";
    let Some(query_vector) = provider.embed_query(query).await? else {
        return Ok(());
    };

    println!("Query: \"{query}\"");
    for (text, embedding) in texts.iter().zip(&result.embeddings) {
        let score = query_vector.dot(embedding).unwrap_or_default();
        println!("  {score:.3}  {text}");
    }

    Ok(())
}

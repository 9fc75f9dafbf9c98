//! `kb search`: run a query and print ranked results.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::query::{QueryEngine, QueryHit, QueryRequest};

pub fn run_search(
    config: &Config,
    query: &str,
    tags: &[String],
    deps: &[String],
    limit: Option<usize>,
    explain: bool,
) -> Result<()> {
    let store = db::connect(config)?;
    let engine = QueryEngine::new(&store, config.score_weights());
    let hits = engine.search(&QueryRequest {
        text: query,
        tags,
        dependencies: deps,
        limit: limit.unwrap_or(config.retrieval.final_limit),
    })?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        print_hit(i + 1, hit, explain);
    }
    Ok(())
}

fn print_hit(rank: usize, hit: &QueryHit, explain: bool) {
    let marker = if hit.incomplete { "  (incomplete)" } else { "" };
    println!("{}. [{:.2}] {}{}", rank, hit.score, hit.id, marker);
    if !hit.summary.is_empty() {
        println!("    {}", hit.summary);
    }
    println!("    matched: {}", hit.matched.join(", "));
    println!("    indexed: {}", hit.indexed_at.format("%Y-%m-%d %H:%M"));
    if explain {
        println!(
            "    score: tag {:.2} + dependency {:.2} + summary {:.2}",
            hit.breakdown.tag, hit.breakdown.dependency, hit.breakdown.summary
        );
    }
    println!();
}

use anyhow::Result;
use scout_indexer::{IndexStats, SyncUpdate};
use scout_store::{TextMatch, VectorMatch};
use serde_json::json;
use std::path::Path;

fn symbol_label(symbol_path: Option<&str>) -> &str {
    symbol_path.unwrap_or("(anonymous)")
}

pub fn print_stats(stats: &IndexStats, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(stats)?);
        return Ok(());
    }
    println!(
        "Indexed {} files in {}ms: +{} chunks, ~{} updated, -{} removed, {} unchanged",
        stats.files,
        stats.time_ms,
        stats.chunks_added,
        stats.chunks_updated,
        stats.chunks_removed,
        stats.files_unchanged
    );
    if stats.files_removed > 0 {
        println!("Forgot {} deleted files", stats.files_removed);
    }
    for error in &stats.errors {
        eprintln!("warning: {error}");
    }
    Ok(())
}

pub fn print_update(update: &SyncUpdate, as_json: bool) -> Result<()> {
    if as_json {
        println!(
            "{}",
            json!({
                "success": update.success,
                "reason": &update.reason,
                "duration_ms": update.duration_ms,
                "stats": &update.stats,
            })
        );
        return Ok(());
    }
    match &update.stats {
        Some(stats) if stats.total_mutations() > 0 => {
            println!(
                "Synced {} files in {}ms (+{} ~{} -{})",
                stats.files,
                update.duration_ms,
                stats.chunks_added,
                stats.chunks_updated,
                stats.chunks_removed
            );
        }
        Some(_) => {}
        None => eprintln!("Sync failed ({})", update.reason),
    }
    Ok(())
}

pub fn print_text_matches(matches: &[TextMatch], as_json: bool) -> Result<()> {
    if as_json {
        let rows: Vec<_> = matches
            .iter()
            .map(|m| {
                json!({
                    "path": &m.chunk.file_path,
                    "symbol": &m.chunk.symbol_path,
                    "lines": [m.chunk.start_line, m.chunk.end_line],
                    "match_count": m.match_count,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if matches.is_empty() {
        println!("No matches");
        return Ok(());
    }
    for m in matches {
        println!(
            "{}:{}-{} {} ({} matches)",
            m.chunk.file_path,
            m.chunk.start_line,
            m.chunk.end_line,
            symbol_label(m.chunk.symbol_path.as_deref()),
            m.match_count
        );
    }
    Ok(())
}

pub fn print_vector_matches(matches: &[VectorMatch], as_json: bool) -> Result<()> {
    if as_json {
        let rows: Vec<_> = matches
            .iter()
            .map(|m| {
                json!({
                    "path": &m.chunk.file_path,
                    "symbol": &m.chunk.symbol_path,
                    "lines": [m.chunk.start_line, m.chunk.end_line],
                    "score": m.score,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if matches.is_empty() {
        println!("No matches");
        return Ok(());
    }
    for m in matches {
        println!(
            "{:.3} {}:{}-{} {}",
            m.score,
            m.chunk.file_path,
            m.chunk.start_line,
            m.chunk.end_line,
            symbol_label(m.chunk.symbol_path.as_deref())
        );
    }
    Ok(())
}

pub fn print_status(root: &Path, files: usize, chunks: usize, as_json: bool) -> Result<()> {
    if as_json {
        println!(
            "{}",
            json!({
                "root": root.display().to_string(),
                "files": files,
                "chunks": chunks,
            })
        );
        return Ok(());
    }
    println!("{}: {} files, {} chunks indexed", root.display(), files, chunks);
    Ok(())
}

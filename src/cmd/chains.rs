//! Pipeline inspection: `chainrun chains <pipeline.toml>`.

use anyhow::Result;
use std::path::Path;

use chainrun::pipeline::PipelineFile;

pub fn cmd_chains(pipeline_path: &Path) -> Result<()> {
    let pipeline = PipelineFile::load(pipeline_path)?;
    let manager = pipeline.build(pipeline.settings.clone())?;

    println!("{} chain(s) in {}", manager.n_chains(), pipeline_path.display());
    for chain in manager.chains() {
        let mut details = Vec::new();
        if chain.is_forked() {
            details.push(format!("fork {}", chain.fork()));
        }
        if let Some(limit) = chain.repeat_limit() {
            details.push(format!("repeat limit {}", limit));
        }
        if details.is_empty() {
            println!("  {}", chain.name());
        } else {
            println!("  {} ({})", chain.name(), details.join(", "));
        }
        for link in chain.link_names() {
            println!("    - {}", link);
        }
    }
    Ok(())
}

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    /// Run duration in seconds
    #[arg(long, default_value_t = 30.0)]
    pub duration: f64,

    /// Path to config TOML
    #[arg(long, default_value = "config.toml")]
    pub config: String,

    /// Seed for deterministic behavior (random when omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Cells to touch at startup, comma-separated indices 0-63
    #[arg(long, default_value = "9,18,27,36")]
    pub cells: String,

    /// Emit engine snapshots as JSON lines
    #[arg(long, default_value_t = false)]
    pub snapshots: bool,

    /// Snapshot period in seconds
    #[arg(long, default_value_t = 2.0)]
    pub snapshot_period: f64,
}

/// Parse a comma-separated cell index list like "5,12,20".
pub fn parse_cells(s: &str) -> Vec<usize> {
    s.split(',')
        .filter_map(|part| part.trim().parse::<usize>().ok())
        .filter(|&i| i < crate::patch::registry::CELL_COUNT)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cells_skips_junk_and_out_of_range() {
        assert_eq!(parse_cells("5, 12,abc,99,63"), vec![5, 12, 63]);
        assert!(parse_cells("").is_empty());
    }
}

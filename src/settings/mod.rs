use clap::{Parser, Subcommand, value_parser};
use itertools::Itertools;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(name = "Strewn")]
#[command(version)]
#[command(about = "Procedural instance scattering with CRC-keyed resource reuse")]
pub struct CliArgs {
    /// Root directory of RON asset manifests. Without it, a built-in demo
    /// catalog is served straight from memory.
    #[arg(long, env = "STREWN_ASSET_DIR")]
    pub asset_dir: Option<String>,

    #[command(subcommand)]
    pub operation_mode: OperationMode,
}

#[derive(Subcommand, Debug)]
pub enum OperationMode {
    /// Scatters meshes across a rectangle over repeated generation passes,
    /// stepped under a per-frame time budget.
    Scatter {
        /// Ground rectangle to cover, e.g. "(120, 80)".
        #[arg(value_parser = value_parser!(Extent))]
        area: Extent,
        #[arg(long, default_value_t = 2048)]
        points: usize,
        #[arg(long, default_value_t = 6)]
        passes: u32,
        /// Per-quantum budget in milliseconds.
        #[arg(long, default_value_t = 2)]
        budget_ms: u64,
        #[arg(long, default_value_t = 0x5EED)]
        seed: u32,
        /// Chance per pass of re-rolling the points instead of replaying them.
        #[arg(long, default_value_t = 0.25)]
        churn: f32,
        /// Pool snapshot file; written after the last pass, then read back to
        /// run one handover pass with a fresh generator.
        #[arg(long)]
        snapshot: Option<String>,
    },
    /// Replays one fixed scatter for many passes and reports reuse totals.
    Soak {
        #[arg(long, default_value_t = 64)]
        passes: u32,
        #[arg(long, default_value_t = 4096)]
        points: usize,
        #[arg(long, default_value_t = 0x5EED)]
        seed: u32,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct Extent {
    pub x: f32,
    pub z: f32,
}

fn trim_brackets(input: &str) -> &str {
    let mut chars = input.chars();
    chars.next(); // skip first
    chars.next_back(); // skip last
    chars.as_str()
}

impl FromStr for Extent {
    type Err = String;

    // (x, z)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let string: String = s.chars().filter(|&c| !c.is_whitespace()).collect();
        if !string.starts_with("(") || !string.ends_with(")") {
            return Err("Missing start or end bracket".to_string());
        }

        let trimmed_str = trim_brackets(string.as_str());
        let splits = trimmed_str.split(',').collect_vec();

        if splits.len() != 2 {
            return Err(format!("Comma splitting resulted in {} splits, not 2!", splits.len()));
        }

        let components: Vec<f32> = splits
            .iter()
            .map(|&split| split.parse::<f32>().map_err(|e| e.to_string()))
            .try_collect()?;

        Ok(Extent {
            x: components[0],
            z: components[1],
        })
    }
}

use crate::error::{CoocError, Result};
use crate::parallel::default_workers;
use crate::reweight::Reweighting;


pub const DEFAULT_WINDOW_SIZE: usize = 5;
pub const DEFAULT_BATCH_SIZE: usize = 64;
/// Longest line, in pieces, the model accepts.
pub const DEFAULT_MAX_PIECES: usize = 512;
pub const DEFAULT_COO_SCALE: f64 = 1.0;

/// Settings shared by the pipeline stages. Built once and checked before any output exists.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub window_size: usize,
    pub reweighting: Reweighting,
    pub workers: usize,
    pub coo_scale: f64,
    pub batch_size: usize,
    pub max_pieces: usize,
}

impl PipelineConfig {
    pub fn new(
        window_size: usize,
        reweighting: Reweighting,
        workers: usize,
        coo_scale: f64,
        batch_size: usize,
        max_pieces: usize,
    ) -> Result<PipelineConfig> {
        if window_size == 0 {
            return Err(CoocError::Config("window size must be at least 1".into()));
        }
        if workers == 0 {
            return Err(CoocError::Config("need at least one worker".into()));
        }
        if !(coo_scale.is_finite() && coo_scale > 0.0) {
            return Err(CoocError::Config(format!("co-occurrence scale must be positive, got {}", coo_scale)));
        }
        if batch_size == 0 || max_pieces == 0 {
            return Err(CoocError::Config("batch size and maximum pieces must be positive".into()));
        }
        Ok(PipelineConfig { window_size, reweighting, workers, coo_scale, batch_size, max_pieces })
    }

    pub fn with_defaults(reweighting: Reweighting) -> PipelineConfig {
        PipelineConfig {
            window_size: DEFAULT_WINDOW_SIZE,
            reweighting,
            workers: default_workers(),
            coo_scale: DEFAULT_COO_SCALE,
            batch_size: DEFAULT_BATCH_SIZE,
            max_pieces: DEFAULT_MAX_PIECES,
        }
    }
}

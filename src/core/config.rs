//! Agent configuration with documented constants
//!
//! Loaded from a TOML file. Every section falls back to its defaults, so a
//! config only needs to name what it changes.

use crate::actions::OperationKind;
use crate::core::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration for one agent run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Window title of the game; also names the default database file
    pub game_name: String,
    /// Label for this run in logs
    pub run_name: String,
    /// Task description handed to the judge when evaluating skills
    pub task: String,
    /// Step budget for `Agent::run`
    pub max_steps: u64,
    /// Skip skill learning entirely and let the model act directly each step
    pub baseline: bool,
    /// Seed for the selection policy and random guidance (None = entropy)
    pub seed: Option<u64>,
    /// Optional system prompt describing the game, used by baseline mode
    pub pre_knowledge: Option<String>,
    pub memory: MemoryConfig,
    pub brain: BrainConfig,
    pub explore: ExploreConfig,
    pub perception: PerceptionConfig,
    pub evolution: EvolutionConfig,
    pub guidance: GuidanceConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            game_name: "game".to_string(),
            run_name: "default".to_string(),
            task: "Play the game".to_string(),
            max_steps: 1000,
            baseline: false,
            seed: None,
            pre_knowledge: None,
            memory: MemoryConfig::default(),
            brain: BrainConfig::default(),
            explore: ExploreConfig::default(),
            perception: PerceptionConfig::default(),
            evolution: EvolutionConfig::default(),
            guidance: GuidanceConfig::default(),
        }
    }
}

/// Long-term memory settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// SQLite file; `None` derives `<game_name>.db`
    pub db_path: Option<PathBuf>,
    /// Minimum cosine similarity for a screen to resolve to a stored state
    ///
    /// At 0.85, cosmetic changes (hover highlights, counters) stay in the
    /// same state while a new menu or scene creates a new one.
    pub sim_threshold: f64,
    /// Directory receiving a PNG of every newly created state (audit trail)
    pub state_dump_dir: Option<PathBuf>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            sim_threshold: 0.85,
            state_dump_dir: None,
        }
    }
}

/// Wire format spoken by a model endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    Anthropic,
    OpenAi,
    /// OpenAI transport, free-text `Action: click(...)` replies instead of tools
    ActionText,
}

/// One model endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model: String,
    pub api_url: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Explicit wire format; detected from `api_url` when absent
    pub format: Option<ModelFormat>,
    pub max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-7-sonnet-20250219".to_string(),
            api_url: "https://api.anthropic.com/v1/messages".to_string(),
            api_key_env: "LLM_API_KEY".to_string(),
            format: None,
            max_tokens: 3000,
        }
    }
}

/// Decision-making settings: model endpoints and bandit constants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainConfig {
    /// Model used for naming, clustering and cluster selection
    pub base_model: ModelConfig,
    /// Model used for judging skill outcomes
    pub evaluate_model: ModelConfig,
    /// Exploration constant C in `fitness + C * sqrt(ln N / n)`
    pub uct_c: f64,
    /// Base score of the synthetic Explore arm
    ///
    /// A skill needs fitness above this value (all else equal) to be
    /// preferred over exploring.
    pub uct_threshold: f64,
    /// Attempts per judge call before the run is aborted
    pub max_attempts: u32,
    /// Pause between judge attempts
    pub retry_backoff_ms: u64,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            base_model: ModelConfig::default(),
            evaluate_model: ModelConfig::default(),
            uct_c: 1.0,
            uct_threshold: 2.0,
            max_attempts: 3,
            retry_backoff_ms: 100,
        }
    }
}

/// Exploration and exploitation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExploreConfig {
    /// Never take the Explore arm (pure exploitation)
    pub close_explore: bool,
    /// Skip outcome judging; every replay that changes the screen continues
    pub close_evaluate: bool,
    /// Skip the per-episode reset click
    pub close_reset: bool,
    /// Operation kinds proposed for every detected object
    pub operates: Vec<OperationKind>,
    /// Longest operation sequence a skill may have
    pub max_operation_length: usize,
    /// Seconds to wait after each operation during exploration
    pub exec_duration_secs: f64,
    /// Seconds to wait after each operation while replaying a skill
    pub replay_delay_secs: f64,
    /// New skills collected from one node before moving on
    pub skills_per_pass: usize,
    /// Augmentation attempts from one node before moving on
    ///
    /// Bounds the loop when every attempt is a miss (nothing changed or the
    /// guide declined).
    pub max_attempts_per_pass: usize,
    /// Heuristic value given to nodes created by exploration
    pub augment_value: f64,
    /// Window-relative point right-clicked to dismiss overlays between episodes
    pub reset_point: Option<(i32, i32)>,
}

impl Default for ExploreConfig {
    fn default() -> Self {
        Self {
            close_explore: false,
            close_evaluate: false,
            close_reset: true,
            operates: vec![OperationKind::Click],
            max_operation_length: 2,
            exec_duration_secs: 3.0,
            replay_delay_secs: 2.0,
            skills_per_pass: 3,
            max_attempts_per_pass: 10,
            augment_value: 3.0,
            reset_point: None,
        }
    }
}

/// Constants for the pure perception helpers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    /// Fraction of changed pixels above which an action counts as having acted
    pub change_ratio_threshold: f64,
    /// Grayscale difference for a pixel to count as changed
    pub pixel_delta: u8,
    /// Pre/post similarity below which exploration ends the branch
    pub state_change_threshold: f64,
    /// Relative area tolerance when rematching objects
    pub area_tolerance: f64,
    /// Maximum hash Hamming distance when rematching objects
    pub hash_threshold: u32,
    /// Acceptance score for multi-angle template grounding
    pub grounding_threshold: f64,
    /// Acceptance score for plain template grounding
    pub plain_grounding_threshold: f64,
    pub detection: DetectionFilter,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            change_ratio_threshold: 0.015,
            pixel_delta: 30,
            state_change_threshold: 0.85,
            area_tolerance: 0.1,
            hash_threshold: 15,
            grounding_threshold: 0.8,
            plain_grounding_threshold: 0.65,
            detection: DetectionFilter::default(),
        }
    }
}

/// Post-processing applied to raw regions from a segmentation backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionFilter {
    /// Regions covering more than this fraction of the screen are backgrounds
    pub max_area_fraction: f64,
    /// Regions with a side at or below this many pixels are noise
    pub min_side: u32,
    /// Crops with a lower grayscale standard deviation are flat fills
    pub min_contrast: f64,
    /// Regions centred above this row belong to the window title bar
    pub min_center_y: i32,
    /// Centres closer than this (per axis) are duplicates
    pub duplicate_distance: i32,
    /// Hashes closer than this are duplicates
    pub duplicate_hash_distance: u32,
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self {
            max_area_fraction: 0.03,
            min_side: 5,
            min_contrast: 10.0,
            min_center_y: 25,
            duplicate_distance: 6,
            duplicate_hash_distance: 5,
        }
    }
}

/// Skill pruning thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Trials a skill must exceed before it can be judged
    pub observation_threshold: u32,
    /// Fitness below which an observed skill is deleted
    pub fitness_threshold: i64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            observation_threshold: 4,
            fitness_threshold: 2,
        }
    }
}

/// Who picks the next untried operation during exploration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuideKind {
    Human,
    Random,
    Model,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidanceConfig {
    pub kind: GuideKind,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            kind: GuideKind::Random,
        }
    }
}

impl AgentConfig {
    /// Read and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AgentConfig = toml::from_str(content)?;
        config.validate().map_err(AgentError::Config)?;
        Ok(config)
    }

    /// Database path, defaulting to `<game_name>.db`
    pub fn db_path(&self) -> PathBuf {
        self.memory
            .db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.db", self.game_name)))
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(format!("{} ({}) must be within [0, 1]", name, v))
            }
        };
        unit("memory.sim_threshold", self.memory.sim_threshold)?;
        unit(
            "perception.change_ratio_threshold",
            self.perception.change_ratio_threshold,
        )?;
        unit(
            "perception.state_change_threshold",
            self.perception.state_change_threshold,
        )?;
        unit("perception.area_tolerance", self.perception.area_tolerance)?;

        if self.brain.uct_c < 0.0 {
            return Err(format!("brain.uct_c ({}) must be non-negative", self.brain.uct_c));
        }
        if self.brain.max_attempts == 0 {
            return Err("brain.max_attempts must be at least 1".into());
        }
        if self.explore.max_operation_length == 0 {
            return Err("explore.max_operation_length must be at least 1".into());
        }
        if self.explore.exec_duration_secs < 0.0 || self.explore.replay_delay_secs < 0.0 {
            return Err("explore delays must be non-negative".into());
        }
        if self.explore.operates.is_empty() && !self.explore.close_explore {
            return Err("explore.operates is empty but exploration is enabled".into());
        }
        Ok(())
    }
}

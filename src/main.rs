//! Bottom-Up Agent - memory inspection tool
//!
//! Reads the skill memory of a game named by a config file. Running the live
//! agent needs screen capture and input backends and goes through the
//! library's `Agent` API.

use bottom_up_agent::core::config::AgentConfig;
use bottom_up_agent::core::error::{AgentError, Result};
use bottom_up_agent::core::types::{ClusterId, StateId};
use bottom_up_agent::memory::MemoryStore;
use bottom_up_agent::skills::{evolve, prune_clusters};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Inspect and maintain what the agent has learned
#[derive(Parser, Debug)]
#[command(name = "bottom-up-agent")]
#[command(about = "Inspect the states, skills and clusters learned for a game")]
struct Args {
    /// Agent config (TOML)
    #[arg(long, short = 'c')]
    config: PathBuf,

    /// Print records as JSON where supported
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List stored states
    States,
    /// List skills, optionally of one state
    Skills {
        #[arg(long)]
        state: Option<i64>,
    },
    /// List skill clusters
    Clusters,
    /// Print the search tree of a state
    Tree {
        #[arg(long)]
        state: i64,
    },
    /// Retire weak skills of a cluster now
    Evolve {
        #[arg(long)]
        cluster: i64,
    },
    /// Validate the config and print it with defaults filled in
    CheckConfig,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("bottom_up_agent=info")),
        )
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = AgentConfig::load(&args.config)?;
    if let Command::CheckConfig = args.command {
        let rendered =
            toml::to_string_pretty(&config).map_err(|e| AgentError::Config(e.to_string()))?;
        println!("{}", rendered);
        return Ok(());
    }

    let db_path = config.db_path();
    tracing::info!(db = %db_path.display(), "opening memory");
    let store = MemoryStore::open(&db_path)?;

    match args.command {
        Command::States => {
            for state in store.list_states()? {
                println!(
                    "state {:>4}  nodes {:>4}  objects {:>4}  clusters {:?}",
                    state.id,
                    state.tree.len(),
                    state.object_ids.len(),
                    state.cluster_ids.iter().map(|c| c.0).collect::<Vec<_>>()
                );
            }
        }
        Command::Skills { state } => {
            let skills = store.list_skills(state.map(StateId))?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&skills)?);
                return Ok(());
            }
            for skill in skills {
                println!(
                    "skill {:>4}  fitness {:>3}  trials {:>3}  state {:>4}  {} ({} ops)",
                    skill.id,
                    skill.fitness,
                    skill.trials,
                    skill.state_id,
                    skill.name,
                    skill.operations.len()
                );
            }
        }
        Command::Clusters => {
            for cluster in store.list_clusters()? {
                println!(
                    "cluster {:>4}  explored {:>3}  {}  members {:?}",
                    cluster.id,
                    cluster.explore_count,
                    cluster.name,
                    cluster.members.iter().map(|s| s.0).collect::<Vec<_>>()
                );
            }
        }
        Command::Tree { state } => {
            let state = store
                .get_state(StateId(state))?
                .ok_or(AgentError::StateNotFound(StateId(state)))?;
            if args.json {
                println!("{}", state.tree.to_json()?);
                return Ok(());
            }
            println!("optimal node {}", state.tree.optimal_node_id());
            for node in state.tree.nodes() {
                let last = node
                    .last_operation()
                    .map(|op| op.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}node {} value {:.1} visits {}{}  {}",
                    "  ".repeat(node.depth()),
                    node.id,
                    node.value,
                    node.n_visits,
                    if node.fixed { " fixed" } else { "" },
                    last
                );
            }
        }
        Command::Evolve { cluster } => {
            let id = ClusterId(cluster);
            let cluster = store.get_cluster(id)?.ok_or(AgentError::ClusterNotFound(id))?;
            let skills = store.get_skills(&cluster.members)?;
            let outcome = evolve(
                &store,
                &cluster,
                &skills,
                config.evolution.observation_threshold,
                config.evolution.fitness_threshold,
            )?;
            if outcome.cluster_deleted {
                for mut state in store.list_states()? {
                    if state.cluster_ids.contains(&id) {
                        prune_clusters(&store, &mut state)?;
                    }
                }
            }
            println!(
                "deleted {} skill(s){}",
                outcome.deleted.len(),
                if outcome.cluster_deleted {
                    "; cluster emptied and deleted"
                } else {
                    ""
                }
            );
        }
        Command::CheckConfig => {}
    }
    Ok(())
}

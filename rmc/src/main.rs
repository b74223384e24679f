use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rmc::models::{
    ClaimPatch, ConflictFilter, ConflictStatus, CreateEntryRequest, MemoryEntry, QueryFilter,
    RelationType, ResolutionStrategy, RetrieveOptions, UpdatePatch, DEFAULT_ACTOR,
};
use rmc::{Config, Rmc};

#[derive(Parser)]
#[command(name = "rmc")]
#[command(about = "Relational memory cache for AI agents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a new memory entry
    Create {
        #[arg(long)]
        org: String,
        #[arg(long)]
        namespace: String,
        #[arg(long = "type", default_value = "fact")]
        content_type: String,
        #[arg(long)]
        confidence: Option<f64>,
        #[arg(long, requires = "claim_value")]
        claim_key: Option<String>,
        #[arg(long, requires = "claim_key")]
        claim_value: Option<String>,
        #[arg(long)]
        actor: Option<String>,
        content: String,
    },
    /// Write a new version of an entry
    Update {
        id: String,
        #[arg(long)]
        content: Option<String>,
        #[arg(long = "type")]
        content_type: Option<String>,
        #[arg(long)]
        confidence: Option<f64>,
        #[arg(long, requires = "claim_value", conflicts_with = "clear_claim")]
        claim_key: Option<String>,
        #[arg(long, requires = "claim_key")]
        claim_value: Option<String>,
        #[arg(long)]
        clear_claim: bool,
        #[arg(long, default_value = DEFAULT_ACTOR)]
        actor: String,
    },
    /// Show one entry
    Get { id: String },
    /// Rank entries by similarity and quality
    Query {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        min_similarity: Option<f32>,
        text: String,
    },
    /// Direct matches plus related context and inference paths
    Retrieve {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        depth: Option<usize>,
        /// Relation types to follow (comma separated)
        #[arg(long, value_delimiter = ',')]
        types: Vec<RelationType>,
        #[arg(long)]
        no_paths: bool,
        #[arg(long)]
        min_confidence: Option<f32>,
        #[arg(long)]
        node_budget: Option<usize>,
        #[arg(long)]
        time_budget_ms: Option<u64>,
        #[arg(long)]
        limit: Option<usize>,
        text: String,
    },
    /// Settle a pending conflict
    Resolve {
        conflict_id: String,
        #[arg(long, value_enum)]
        strategy: StrategyArg,
        /// Winning entry for the manual strategy
        #[arg(long, required_if_eq("strategy", "manual"))]
        winner: Option<String>,
        #[arg(long, default_value = DEFAULT_ACTOR)]
        actor: String,
    },
    /// Close a pending conflict without a winner
    Dismiss {
        conflict_id: String,
        #[arg(long)]
        reason: Option<String>,
        #[arg(long, default_value = DEFAULT_ACTOR)]
        actor: String,
    },
    /// List conflicts
    Conflicts {
        #[arg(long)]
        org: String,
        #[arg(long)]
        namespace: Option<String>,
        #[arg(long)]
        status: Option<ConflictStatus>,
    },
    /// Show every version sharing an entry's root, oldest first
    Chain { id: String },
    /// Report broken version-tree links
    Check,
}

#[derive(Args)]
struct ScopeArgs {
    #[arg(long)]
    org: String,
    #[arg(long)]
    namespace: Option<String>,
    /// Match the namespace exactly instead of including descendants
    #[arg(long)]
    exact: bool,
    #[arg(long = "type")]
    content_type: Option<String>,
    #[arg(long)]
    include_superseded: bool,
}

impl ScopeArgs {
    fn filter(&self) -> QueryFilter {
        QueryFilter {
            namespace: self.namespace.clone(),
            include_descendants: !self.exact,
            content_type: self.content_type.clone(),
            include_superseded: self.include_superseded,
            ..QueryFilter::new(self.org.clone())
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Manual,
    HighestConfidence,
    MostRecent,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Vectors are internal; keep them out of printed entries.
fn without_embedding(mut entry: MemoryEntry) -> MemoryEntry {
    entry.embedding.clear();
    entry
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "rmc=info".into());
    let json = std::env::var("RMC_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    init_tracing();

    let rmc = Rmc::open(Config::from_env()).await?;
    let outcome = run(&rmc, cli.command).await;

    if let Err(error) = rmc.drain().await {
        tracing::warn!(error = %error, "Failed to drain background work");
    }
    outcome
}

async fn run(rmc: &Rmc, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Create {
            org,
            namespace,
            content_type,
            confidence,
            claim_key,
            claim_value,
            actor,
            content,
        } => {
            let request = CreateEntryRequest {
                confidence,
                claim_key,
                claim_value,
                created_by: actor,
                ..CreateEntryRequest::new(org, namespace, content_type, content)
            };
            print_json(&without_embedding(rmc.create(request).await?))
        }
        Command::Update {
            id,
            content,
            content_type,
            confidence,
            claim_key,
            claim_value,
            clear_claim,
            actor,
        } => {
            let claim = match (claim_key, claim_value, clear_claim) {
                (_, _, true) => Some(ClaimPatch::Clear),
                (Some(key), Some(value), false) => Some(ClaimPatch::Set { key, value }),
                _ => None,
            };
            let patch = UpdatePatch {
                content,
                content_type,
                confidence,
                claim,
            };
            print_json(&without_embedding(rmc.update(&id, patch, &actor).await?))
        }
        Command::Get { id } => print_json(&without_embedding(rmc.get(&id).await?)),
        Command::Query {
            scope,
            limit,
            min_similarity,
            text,
        } => {
            let filter = QueryFilter {
                limit,
                min_similarity,
                ..scope.filter()
            };
            let mut results = rmc.query(&filter, &text).await?;
            for scored in &mut results {
                scored.entry.embedding.clear();
            }
            print_json(&results)
        }
        Command::Retrieve {
            scope,
            depth,
            types,
            no_paths,
            min_confidence,
            node_budget,
            time_budget_ms,
            limit,
            text,
        } => {
            let defaults = rmc.retriever.default_options();
            let options = RetrieveOptions {
                max_depth: depth.unwrap_or(defaults.max_depth),
                relation_types: if types.is_empty() {
                    defaults.relation_types
                } else {
                    types
                },
                include_inference_paths: !no_paths,
                min_confidence: min_confidence.unwrap_or(defaults.min_confidence),
                node_budget: node_budget.unwrap_or(defaults.node_budget),
                time_budget_ms: time_budget_ms.unwrap_or(defaults.time_budget_ms),
                limit,
            };
            let mut result = rmc.retrieve(&scope.filter(), &text, &options).await?;
            for scored in &mut result.direct_matches {
                scored.entry.embedding.clear();
            }
            for related in &mut result.related_context {
                related.entry.embedding.clear();
            }
            print_json(&result)
        }
        Command::Resolve {
            conflict_id,
            strategy,
            winner,
            actor,
        } => {
            let strategy = match (strategy, winner) {
                (StrategyArg::Manual, Some(winner_id)) => ResolutionStrategy::Manual { winner_id },
                (StrategyArg::Manual, None) => {
                    anyhow::bail!("--winner is required for the manual strategy")
                }
                (StrategyArg::HighestConfidence, _) => ResolutionStrategy::HighestConfidence,
                (StrategyArg::MostRecent, _) => ResolutionStrategy::MostRecent,
            };
            print_json(&rmc.resolve_conflict(&conflict_id, strategy, &actor).await?)
        }
        Command::Dismiss {
            conflict_id,
            reason,
            actor,
        } => print_json(
            &rmc
                .dismiss_conflict(&conflict_id, &actor, reason.as_deref())
                .await?,
        ),
        Command::Conflicts {
            org,
            namespace,
            status,
        } => {
            let filter = ConflictFilter {
                org_id: org,
                namespace,
                status,
            };
            print_json(&rmc.list_conflicts(&filter).await?)
        }
        Command::Chain { id } => {
            let chain: Vec<MemoryEntry> = rmc
                .get_version_chain(&id)
                .await?
                .into_iter()
                .map(without_embedding)
                .collect();
            print_json(&chain)
        }
        Command::Check => {
            let violations = rmc.check_invariants().await?;
            print_json(&violations)?;
            if !violations.is_empty() {
                anyhow::bail!("{} version tree violations", violations.len());
            }
            Ok(())
        }
    }
}

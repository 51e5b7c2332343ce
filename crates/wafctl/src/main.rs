// # wafctl - WAF Classic regex set client
//
// Thin integration layer over `changetoken-waf`:
// 1. Parse arguments (flags or `WAFCTL_*` environment variables)
// 2. Load retry policies (built-in defaults, then the optional JSON file)
// 3. Build the AWS SDK client
// 4. Run one command, with Ctrl-C canceling any retry in progress
//
// No retry logic lives here; every mutation goes through
// `ChangeTokenRetryer` inside the library.
//
// ## Example
//
// ```bash
// wafctl pattern-set create blocked-paths --pattern '^/admin' --pattern '^/wp-login'
// wafctl pattern-set update <id> --pattern '^/admin'
// wafctl match-set delete <id>
// WAFCTL_CONFIG=/etc/wafctl/retry.json wafctl pattern-set delete <id>
// ```

use anyhow::{Context, Result};
use changetoken_core::{
    ChangeTokenSource, PolicyRegistry, RetryContext, RetryEvent, RetryPoliciesConfig,
};
use changetoken_waf::{
    RegexMatchSets, RegexPatternSetSpec, RegexPatternSets, SdkWafClient, WafClientConfig,
};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit codes
///
/// - 0: Command succeeded
/// - 1: Configuration error (bad flags, unreadable policy file)
/// - 2: Runtime error (the command failed)
#[derive(Debug, Clone, Copy)]
enum WafctlExitCode {
    Success = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<WafctlExitCode> for ExitCode {
    fn from(code: WafctlExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Parser, Debug)]
#[command(name = "wafctl")]
#[command(about = "Manage AWS WAF Classic regex pattern sets and match sets")]
#[command(version)]
struct Cli {
    /// AWS region (WAF Classic is served from us-east-1)
    #[arg(long, env = "WAFCTL_REGION", global = true)]
    region: Option<String>,

    /// Endpoint override, e.g. a local emulator
    #[arg(long, env = "WAFCTL_ENDPOINT_URL", global = true)]
    endpoint_url: Option<String>,

    /// JSON file with retry policies
    #[arg(long, env = "WAFCTL_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "WAFCTL_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a change token and print it
    ChangeToken,

    /// Regex pattern sets
    PatternSet {
        #[command(subcommand)]
        action: PatternSetCommand,
    },

    /// Regex match sets
    MatchSet {
        #[command(subcommand)]
        action: MatchSetCommand,
    },
}

#[derive(Subcommand, Debug)]
enum PatternSetCommand {
    /// Create a set holding the given patterns
    Create {
        name: String,

        /// Regex pattern string (repeatable)
        #[arg(long = "pattern")]
        patterns: Vec<String>,
    },

    /// Print a set as JSON
    Show { id: String },

    /// Replace a set's patterns with the given ones
    Update {
        id: String,

        /// Regex pattern string (repeatable)
        #[arg(long = "pattern")]
        patterns: Vec<String>,
    },

    /// Empty and delete a set
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
enum MatchSetCommand {
    /// Print a set as JSON
    Show { id: String },

    /// Empty and delete a set
    Delete { id: String },
}

fn parse_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => anyhow::bail!(
            "log level '{}' is not valid. Valid levels: trace, debug, info, warn, error",
            other
        ),
    }
}

/// Built-in WAF policies, overridden by the config file if one is given
fn load_policies(path: Option<&PathBuf>) -> Result<(PolicyRegistry, RetryPoliciesConfig)> {
    let registry = PolicyRegistry::new();
    changetoken_waf::register(&registry);

    let config = match path {
        Some(path) => {
            let config = RetryPoliciesConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            registry.apply_config(&config)?;
            config
        }
        None => RetryPoliciesConfig::new(),
    };

    Ok((registry, config))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match parse_level(&cli.log_level) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return WafctlExitCode::ConfigError.into();
        }
    };

    // Logs go to stderr; stdout carries command output
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return WafctlExitCode::ConfigError.into();
    }

    let (registry, config) = match load_policies(cli.config.as_ref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return WafctlExitCode::ConfigError.into();
        }
    };
    debug!("Retry policies: {:?}", registry.list_policies());

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return WafctlExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run(cli, Arc::new(registry), config).await {
            Ok(()) => WafctlExitCode::Success,
            Err(e) => {
                error!("{:#}", e);
                WafctlExitCode::RuntimeError
            }
        }
    });

    result.into()
}

async fn run(cli: Cli, registry: Arc<PolicyRegistry>, config: RetryPoliciesConfig) -> Result<()> {
    let client = Arc::new(
        SdkWafClient::connect(&WafClientConfig {
            region: cli.region.clone(),
            endpoint_url: cli.endpoint_url.clone(),
        })
        .await,
    );

    let ctx = RetryContext::new();
    spawn_interrupt_handler(ctx.clone());
    let event_tx = spawn_event_logger(config.event_channel_capacity);

    match cli.command {
        Command::ChangeToken => {
            let token = client.fetch_change_token().await?;
            println!("{}", token.as_str());
        }

        Command::PatternSet { action } => {
            let sets = RegexPatternSets::new(client, registry).with_event_sender(event_tx);
            match action {
                PatternSetCommand::Create { name, patterns } => {
                    let spec = RegexPatternSetSpec {
                        name,
                        regex_pattern_strings: patterns,
                    };
                    let set = sets.create(&ctx, &spec).await?;
                    print_json(serde_json::to_value(&set)?)?;
                }
                PatternSetCommand::Show { id } => {
                    let set = sets
                        .read(&id)
                        .await?
                        .with_context(|| format!("regex pattern set {} not found", id))?;
                    print_json(serde_json::to_value(&set)?)?;
                }
                PatternSetCommand::Update { id, patterns } => {
                    let set = sets.update(&ctx, &id, &patterns).await?;
                    print_json(serde_json::to_value(&set)?)?;
                }
                PatternSetCommand::Delete { id } => {
                    sets.delete(&ctx, &id).await?;
                    info!("Regex pattern set {} deleted", id);
                }
            }
        }

        Command::MatchSet { action } => {
            let sets = RegexMatchSets::new(client, registry).with_event_sender(event_tx);
            match action {
                MatchSetCommand::Show { id } => {
                    let set = sets
                        .read(&id)
                        .await?
                        .with_context(|| format!("regex match set {} not found", id))?;
                    print_json(serde_json::to_value(&set)?)?;
                }
                MatchSetCommand::Delete { id } => {
                    sets.delete(&ctx, &id).await?;
                    info!("Regex match set {} deleted", id);
                }
            }
        }
    }

    Ok(())
}

fn print_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Cancel `ctx` on Ctrl-C
fn spawn_interrupt_handler(ctx: RetryContext) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, canceling");
                ctx.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}

/// Log retry events at debug level
fn spawn_event_logger(capacity: usize) -> mpsc::Sender<RetryEvent> {
    let (tx, mut rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                RetryEvent::AttemptFailed {
                    operation,
                    target,
                    attempt,
                    kind,
                    delay,
                } => info!(
                    "{} ({}) attempt {} failed with {:?}, retrying in {:?}",
                    operation, target, attempt, kind, delay
                ),
                other => debug!("Retry event: {:?}", other),
            }
        }
    });
    tx
}

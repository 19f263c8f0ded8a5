//! Verdict command-line surface.
//!
//! Drives the three agents against a policy corpus loaded from files:
//! `evaluate` for the enforcement agent, `resolve` for the constraint
//! solver, `route` for approval routing, plus `info` and `register` for
//! agent metadata.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use verdict_approvals::{Requester, RequestPriority, RoutingRequest};
use verdict_config::Config;
use verdict_policy::{EvaluationContext, EvaluationRequest, PolicyDocument};
use verdict_runtime::{
    AgentRegistration, AgentResponse, ExecutionContext, PolicyDecisionPoint,
};

/// Policy decision point for LLM operations.
#[derive(Parser, Debug)]
#[command(name = "verdict", version, about)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "VERDICT_LOG_LEVEL", default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate a context against the policy corpus.
    Evaluate(EvaluateArgs),
    /// Resolve constraint conflicts for a context (always traced).
    Resolve(EvaluateArgs),
    /// Route an action context for approval.
    Route(RouteArgs),
    /// Print agent registration metadata.
    Info,
    /// Register the agents with the record sink.
    Register,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    /// Context: a file path or an inline JSON object.
    #[arg(long)]
    context: String,

    /// Request identifier; generated when omitted.
    #[arg(long)]
    request_id: Option<String>,

    /// Comma-separated restricting set of policy ids.
    #[arg(long, value_delimiter = ',')]
    policies: Option<Vec<String>>,

    /// Policy document files (JSON or YAML) to load.
    #[arg(long = "policy-file")]
    policy_files: Vec<PathBuf>,

    /// Evaluate without caching or persistence.
    #[arg(long)]
    dry_run: bool,

    /// Record a full per-rule trace.
    #[arg(long)]
    trace: bool,

    /// Print the raw decision event as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct RouteArgs {
    /// Action context: a file path or an inline JSON object.
    #[arg(long)]
    context: String,

    /// Requester identifier.
    #[arg(long, default_value = "cli")]
    requester: String,

    /// Requester roles.
    #[arg(long, value_delimiter = ',')]
    roles: Vec<String>,

    /// Request priority (low, normal, high, critical, emergency).
    #[arg(long, default_value = "normal")]
    priority: String,

    /// Approval rule files (JSON or YAML) to load.
    #[arg(long = "rules-file")]
    rules_files: Vec<PathBuf>,

    /// Print the raw decision event as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_logging(&cli.log_level) {
        eprintln!("failed to initialise logging: {err}");
        return ExitCode::FAILURE;
    }

    match run(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<ExitCode> {
    let config = Config::from_env().context("loading configuration")?;

    match command {
        Command::Evaluate(args) => evaluate(config, args, false).await,
        Command::Resolve(args) => evaluate(config, args, true).await,
        Command::Route(args) => route(config, args).await,
        Command::Info => {
            let registrations = AgentRegistration::all();
            println!("{}", serde_json::to_string_pretty(&registrations)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Register => {
            let pdp = PolicyDecisionPoint::new(config);
            pdp.register().await;
            info!("agents registered with the record sink");
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn evaluate(config: Config, args: EvaluateArgs, resolve: bool) -> Result<ExitCode> {
    let pdp = PolicyDecisionPoint::new(config);
    load_policies(&pdp, &args.policy_files).await?;

    let context = parse_context(&args.context)?;
    let request_id = args
        .request_id
        .unwrap_or_else(|| format!("cli-{}", uuid_suffix()));
    let mut request = EvaluationRequest::new(request_id, context)
        .with_dry_run(args.dry_run)
        .with_trace(args.trace || resolve);
    if let Some(policies) = args.policies {
        request = request.with_policies(policies);
    }

    let execution = ExecutionContext::new(format!("cli-{}", uuid_suffix()), "cli");
    let response = if resolve {
        pdp.resolve(&execution, request).await
    } else {
        pdp.enforce(&execution, request).await
    };

    print_response(&response, args.json)?;
    Ok(exit_code_for(&response))
}

async fn route(config: Config, args: RouteArgs) -> Result<ExitCode> {
    let mut pdp = PolicyDecisionPoint::new(config);
    if !args.rules_files.is_empty() {
        let mut rules = Vec::new();
        for path in &args.rules_files {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let parsed: Vec<verdict_approvals::ApprovalRule> = serde_yaml::from_str(&content)
                .or_else(|_| serde_json::from_str(&content))
                .with_context(|| format!("parsing {}", path.display()))?;
            for rule in &parsed {
                rule.validate()
                    .with_context(|| format!("validating rule `{}`", rule.id))?;
            }
            rules.extend(parsed);
        }
        pdp = pdp.with_approval_rules(rules);
    }

    let context = parse_context(&args.context)?;
    let priority = parse_priority(&args.priority)?;
    let request = RoutingRequest::new(context, Requester::new(args.requester, args.roles))
        .with_priority(priority);

    let execution = ExecutionContext::new(format!("cli-{}", uuid_suffix()), "cli");
    let response = pdp.route(&execution, request).await;

    if args.json {
        print_response(&response, true)?;
    } else if let Some(event) = &response.data {
        // The routing targets are what an operator wants to see.
        println!(
            "{}",
            serde_json::to_string_pretty(&event.outputs).context("serialising routing output")?
        );
    }
    Ok(exit_code_for(&response))
}

async fn load_policies(pdp: &PolicyDecisionPoint, files: &[PathBuf]) -> Result<()> {
    for path in files {
        let document = PolicyDocument::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?;
        let violations = document.validate();
        if !violations.is_empty() {
            for violation in &violations {
                warn!(%violation, "policy document violation");
            }
            bail!(
                "{} failed validation with {} violation(s)",
                path.display(),
                violations.len()
            );
        }
        for policy in document.policies {
            pdp.create_policy(policy, "cli", None)
                .await
                .with_context(|| format!("loading policies from {}", path.display()))?;
        }
    }
    Ok(())
}

fn parse_context(raw: &str) -> Result<EvaluationContext> {
    let text = if raw.trim_start().starts_with('{') {
        raw.to_owned()
    } else {
        std::fs::read_to_string(raw).with_context(|| format!("reading context file {raw}"))?
    };
    let value: serde_json::Value =
        serde_json::from_str(&text).context("parsing context as JSON")?;
    EvaluationContext::from_value(value).context("context must be a JSON object")
}

fn parse_priority(raw: &str) -> Result<RequestPriority> {
    match raw.to_ascii_lowercase().as_str() {
        "low" => Ok(RequestPriority::Low),
        "normal" => Ok(RequestPriority::Normal),
        "high" => Ok(RequestPriority::High),
        "critical" => Ok(RequestPriority::Critical),
        "emergency" => Ok(RequestPriority::Emergency),
        other => bail!("unknown priority `{other}`"),
    }
}

fn print_response(response: &AgentResponse, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }
    match (&response.data, &response.error) {
        (Some(event), _) => println!("{}", serde_json::to_string_pretty(event)?),
        (None, Some(error)) => eprintln!("{}: {}", error.code, error.message),
        (None, None) => {}
    }
    Ok(())
}

/// Exit code 0 exactly when the decision allows the action.
fn exit_code_for(response: &AgentResponse) -> ExitCode {
    let allowed = response
        .data
        .as_ref()
        .map(|event| {
            event.outputs.get("allowed").and_then(serde_json::Value::as_bool).unwrap_or_else(|| {
                // Solver and router events have no `allowed` flag; treat
                // anything that is not an error event as allowed.
                !event.is_error()
            })
        })
        .unwrap_or(false);
    if response.success && allowed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn uuid_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn init_logging(level: &str) -> Result<()> {
    let level = match level.to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting tracing subscriber")
}

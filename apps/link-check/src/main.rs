//! link-check: run one link request through the validation pipeline.
//!
//! Reads a JSON `LinkRequest` from a file (or `-` for stdin), seeds an
//! in-memory store from `LINK_FIXTURES`, and prints either the normalized
//! link or the rejection as JSON on stdout. Logs go to stderr.
//!
//! Exit codes: 0 accepted, 2 rejected, 1 configuration or collaborator fault.

use std::env;
use std::fs;
use std::io::{self, Read};
use std::process::ExitCode;
use std::sync::Arc;

use domain::adapters::memory::{self, InMemoryStore};
use domain::{
    LinkProcessor, LinkRequest, LinkService, PlanTier, ProcessError, ProcessOptions, SystemClock,
    WorkspaceContext,
};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

struct Args {
    input: String,
    workspace: Option<String>,
    plan: PlanTier,
    user: Option<String>,
    bulk: bool,
    skip_key_checks: bool,
    skip_external_id_checks: bool,
    persist: bool,
}

fn print_usage() {
    eprintln!(
        "{}\n\nUsage:\n  link-check <request.json|-> [--workspace <id>] [--plan free|pro|business|enterprise]\n             [--user <id>] [--bulk] [--skip-key-checks] [--skip-external-id-checks] [--persist]\n\nNotes:\n  - Seed data comes from LINK_FIXTURES; nothing is kept between runs.\n  - --persist also stores the link, so store constraint violations surface.",
        domain::about()
    );
}

fn parse_args(raw: Vec<String>) -> Result<Args, String> {
    let mut input = None;
    let mut args = Args {
        input: String::new(),
        workspace: None,
        plan: PlanTier::Free,
        user: None,
        bulk: false,
        skip_key_checks: false,
        skip_external_id_checks: false,
        persist: false,
    };

    let mut i = 0;
    while i < raw.len() {
        let value = |flag: &str| -> Result<String, String> {
            raw.get(i + 1)
                .cloned()
                .ok_or_else(|| format!("{} requires a value", flag))
        };
        match raw[i].as_str() {
            "--workspace" => {
                args.workspace = Some(value("--workspace")?);
                i += 2;
            }
            "--plan" => {
                let plan = value("--plan")?;
                args.plan =
                    PlanTier::parse(&plan).ok_or_else(|| format!("unknown plan: {}", plan))?;
                i += 2;
            }
            "--user" => {
                args.user = Some(value("--user")?);
                i += 2;
            }
            "--bulk" => {
                args.bulk = true;
                i += 1;
            }
            "--skip-key-checks" => {
                args.skip_key_checks = true;
                i += 1;
            }
            "--skip-external-id-checks" => {
                args.skip_external_id_checks = true;
                i += 1;
            }
            "--persist" => {
                args.persist = true;
                i += 1;
            }
            flag if flag.starts_with("--") => return Err(format!("unknown argument: {}", flag)),
            path => {
                if input.replace(path.to_string()).is_some() {
                    return Err("only one request file may be given".into());
                }
                i += 1;
            }
        }
    }

    args.input = input.ok_or("missing <request.json>")?;
    Ok(args)
}

impl Args {
    fn options(&self) -> ProcessOptions {
        ProcessOptions {
            workspace: self
                .workspace
                .as_ref()
                .map(|id| WorkspaceContext::new(id.clone(), self.plan)),
            user_id: self.user.clone(),
            bulk: self.bulk,
            skip_key_checks: self.skip_key_checks,
            skip_external_id_checks: self.skip_external_id_checks,
            ..ProcessOptions::default()
        }
    }
}

fn read_request(input: &str) -> Result<LinkRequest, String> {
    let raw = if input == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("cannot read stdin: {}", e))?;
        buf
    } else {
        fs::read_to_string(input).map_err(|e| format!("cannot read '{}': {}", input, e))?
    };
    serde_json::from_str(&raw).map_err(|e| format!("invalid request JSON: {}", e))
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(io::stderr),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(fmt::layer().pretty().with_target(true).with_writer(io::stderr))
                .init();
        }
    }
}

async fn run(cfg: config::Config, args: Args) -> Result<ExitCode, String> {
    let payload = read_request(&args.input)?;
    let opts = args.options();

    let store = Arc::new(InMemoryStore::new(cfg.pipeline.clone(), cfg.fixtures));
    let deps = memory::collaborators(store, Arc::new(SystemClock));
    let processor = LinkProcessor::new(cfg.pipeline, deps);

    let outcome = if args.persist {
        LinkService::new(processor).create(payload, &opts).await
    } else {
        processor.process(payload, &opts).await
    };

    match outcome {
        Ok(link) => {
            let out = serde_json::to_string_pretty(&link)
                .map_err(|e| format!("cannot encode link: {}", e))?;
            println!("{}", out);
            Ok(ExitCode::SUCCESS)
        }
        Err(ProcessError::Rejected(rejection)) => {
            let body = json!({
                "error": {
                    "code": rejection.code.api_code(),
                    "kind": rejection.code.as_str(),
                    "message": rejection.message,
                }
            });
            println!("{}", body);
            Ok(ExitCode::from(2))
        }
        Err(ProcessError::Store(e)) => Err(format!("collaborator failure: {}", e)),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let raw: Vec<String> = env::args().skip(1).collect();
    if raw.is_empty() || raw.iter().any(|a| a == "-h" || a == "--help") {
        print_usage();
        return ExitCode::SUCCESS;
    }

    let cfg = match config::Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&cfg);
    cfg.warn_if_degraded();

    let args = match parse_args(raw) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("error: {}", msg);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    info!(input = %args.input, persist = args.persist, "processing link request");
    match run(cfg, args).await {
        Ok(code) => code,
        Err(msg) => {
            error!(%msg, "link-check failed");
            ExitCode::FAILURE
        }
    }
}

//! Sukoon CLI
//!
//! Deterministic safety routing from the command line:
//! - `route` / `tags`: run the policy gate pieces on one utterance
//! - `turn`: run a full pipeline turn and print the decision JSON
//! - `expand`: show concept expansion for a query
//! - `eval`: offline safety / crisis eval, writes a metrics report
//! - `config`: show which config files were loaded and the digest

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sukoon_pipeline::eval::{run_eval, write_report, EvalConfig};
use sukoon_pipeline::{
    classify_route, ConfigHandle, ConfigSources, FileStatus, InMemoryUsageStore, Pipeline,
    SukoonConfig, TurnRequest,
};
use sukoon_policy::{classify_topic, infer_tags, Route, Topic};
use sukoon_text::Lang;

/// Directory used when no `--config-dir` is given.
const DEFAULT_CONFIG_DIR: &str = "configs";

#[derive(Parser)]
#[command(name = "sukoon")]
#[command(author, version, about = "Sukoon: deterministic safety routing for wellbeing conversations")]
struct Cli {
    /// Config directory; repeat to layer, earlier directories win per file.
    #[arg(long = "config-dir", global = true)]
    config_dirs: Vec<PathBuf>,

    /// Debug-level logs on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one utterance into crisis / assist / abstain.
    Route { text: String },

    /// Infer policy tags for one utterance.
    Tags {
        text: String,
        /// Topic override (anxiety, depression, other).
        #[arg(long)]
        topic: Option<Topic>,
    },

    /// Run one full turn and print the decision JSON.
    Turn {
        text: String,
        /// Language hint (en, ur).
        #[arg(long, value_parser = parse_lang)]
        lang: Option<Lang>,
        #[arg(long)]
        topic: Option<Topic>,
        /// Skip the term gate and use this route.
        #[arg(long)]
        predecided: Option<Route>,
        #[arg(long)]
        user: Option<String>,
    },

    /// Show concept expansion for a query.
    Expand { query: String },

    /// Offline safety / crisis eval.
    Eval {
        /// Eval YAML (seed items when omitted).
        file: Option<PathBuf>,
        /// Report path (overrides `out_path` in the eval file).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Show loaded config files and the config digest.
    Config,
}

fn parse_lang(s: &str) -> std::result::Result<Lang, String> {
    Lang::from_code(s).ok_or_else(|| format!("unknown language: {s} (expected en or ur)"))
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn sources(dirs: &[PathBuf]) -> ConfigSources {
    if dirs.is_empty() {
        ConfigSources::new([DEFAULT_CONFIG_DIR])
    } else {
        ConfigSources::new(dirs.iter().cloned())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn route_label(route: Route) -> colored::ColoredString {
    match route {
        Route::Crisis => route.as_str().red().bold(),
        Route::Abstain => route.as_str().yellow().bold(),
        Route::Assist => route.as_str().green().bold(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let sources = sources(&cli.config_dirs);

    match cli.command {
        Commands::Route { text } => {
            let config = SukoonConfig::load(&sources);
            let decision = classify_route(&config, &text);
            eprintln!("{} {}", "route".bold(), route_label(decision.route));
            print_json(&decision)?;
        }
        Commands::Tags { text, topic } => {
            let topic = topic.unwrap_or_else(|| classify_topic(&text));
            let tags = infer_tags(&text, topic);
            print_json(&serde_json::json!({
                "topic": topic,
                "policy_tags": tags.as_strings(),
            }))?;
        }
        Commands::Turn {
            text,
            lang,
            topic,
            predecided,
            user,
        } => cmd_turn(sources, text, lang, topic, predecided, user)?,
        Commands::Expand { query } => {
            let config = SukoonConfig::load(&sources);
            let expansion = config.concepts.expand(&query);
            print_json(&serde_json::json!({
                "lambda": config.concepts.lambda(),
                "expansion": expansion,
            }))?;
        }
        Commands::Eval { file, out } => cmd_eval(&sources, file.as_deref(), out)?,
        Commands::Config => cmd_config(&sources)?,
    }
    Ok(())
}

fn cmd_turn(
    sources: ConfigSources,
    text: String,
    lang: Option<Lang>,
    topic: Option<Topic>,
    predecided: Option<Route>,
    user: Option<String>,
) -> Result<()> {
    let handle = Arc::new(ConfigHandle::load(sources));
    let pipeline = Pipeline::new(handle).with_usage_store(Arc::new(InMemoryUsageStore::new()));

    let request = TurnRequest {
        text,
        lang,
        topic,
        predecided_route: predecided,
        user_id: user,
        crisis_signals: None,
    };
    let decision = pipeline
        .run(&request)
        .map_err(|e| anyhow!("turn failed: {e}"))?;

    eprintln!(
        "{} {} {} {}ms",
        "route".bold(),
        route_label(decision.route),
        decision.reason.map(|r| r.as_str()).unwrap_or("").dimmed(),
        decision.metrics.total_ms
    );
    print_json(&decision)
}

fn cmd_eval(sources: &ConfigSources, file: Option<&Path>, out: Option<PathBuf>) -> Result<()> {
    let config = SukoonConfig::load(sources);
    let eval = EvalConfig::load(file)?;
    let report = run_eval(&config, &eval)?;
    let out = out.unwrap_or_else(|| eval.out_path.clone());
    write_report(&report, &out)?;

    let results = &report.results;
    eprintln!(
        "{} safety rate {:.2} ({}/{}), crisis tp={} fp={} fn={} tn={}",
        if results.ok { "ok".green().bold() } else { "FAIL".red().bold() },
        results.safety.rate,
        results.safety.halted,
        results.safety.total,
        results.crisis.tp,
        results.crisis.fp,
        results.crisis.fn_,
        results.crisis.tn,
    );
    eprintln!("{} {}", "wrote".green().bold(), out.display().to_string().bold());

    if !results.ok {
        bail!("safety eval below threshold");
    }
    Ok(())
}

fn cmd_config(sources: &ConfigSources) -> Result<()> {
    let config = SukoonConfig::load(sources);
    for file in &config.files {
        let status = match &file.status {
            FileStatus::Loaded { .. } => "loaded".green(),
            FileStatus::Missing => "missing".yellow(),
            FileStatus::Fallback { .. } => "fallback".red(),
        };
        eprintln!("  {} {}", status, file.name);
    }
    eprintln!("{} {}", "digest".bold(), config.digest);
    print_json(&serde_json::json!({
        "config_dirs": sources.dirs(),
        "digest": config.digest,
        "files": config.files,
        "crisis_escalate_deadline_seconds": config.safety.crisis_flow_config().escalate_deadline_seconds(),
        "ckg_lambda": config.concepts.lambda(),
        "retrieval": config.retrieval,
        "kb_items": config.knowledge_base.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args.iter().copied()).unwrap()
    }

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn route_takes_text() {
        let Commands::Route { text } = parse(&["sukoon", "route", "who are you"]).command else {
            panic!("expected route");
        };
        assert_eq!(text, "who are you");
    }

    #[test]
    fn tags_accepts_topic_override() {
        let Commands::Tags { text, topic } =
            parse(&["sukoon", "tags", "dose?", "--topic", "anxiety"]).command
        else {
            panic!("expected tags");
        };
        assert_eq!(text, "dose?");
        assert_eq!(topic, Some(Topic::Anxiety));
        assert!(Cli::try_parse_from(["sukoon", "tags", "x", "--topic", "finance"]).is_err());
    }

    #[test]
    fn turn_parses_every_option_and_global_flags() {
        let cli = parse(&[
            "sukoon",
            "turn",
            "saans ki mashq",
            "--lang",
            "ur",
            "--topic",
            "depression",
            "--predecided",
            "crisis",
            "--user",
            "u1",
            "--config-dir",
            "overlay",
            "--config-dir",
            "configs",
            "-v",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config_dirs, vec![PathBuf::from("overlay"), PathBuf::from("configs")]);
        let Commands::Turn {
            text,
            lang,
            topic,
            predecided,
            user,
        } = cli.command
        else {
            panic!("expected turn");
        };
        assert_eq!(text, "saans ki mashq");
        assert_eq!(lang, Some(Lang::Ur));
        assert_eq!(topic, Some(Topic::Depression));
        assert_eq!(predecided, Some(Route::Crisis));
        assert_eq!(user.as_deref(), Some("u1"));
    }

    #[test]
    fn turn_rejects_unknown_language_and_route() {
        assert!(Cli::try_parse_from(["sukoon", "turn", "hi", "--lang", "fr"]).is_err());
        assert!(Cli::try_parse_from(["sukoon", "turn", "hi", "--predecided", "maybe"]).is_err());
    }

    #[test]
    fn expand_takes_query() {
        let Commands::Expand { query } = parse(&["sukoon", "expand", "PHQ 9"]).command else {
            panic!("expected expand");
        };
        assert_eq!(query, "PHQ 9");
    }

    #[test]
    fn eval_file_and_out_are_optional() {
        let Commands::Eval { file, out } = parse(&["sukoon", "eval"]).command else {
            panic!("expected eval");
        };
        assert!(file.is_none() && out.is_none());

        let Commands::Eval { file, out } =
            parse(&["sukoon", "eval", "configs/eval_safety.yaml", "--out", "m.json"]).command
        else {
            panic!("expected eval");
        };
        assert_eq!(file, Some(PathBuf::from("configs/eval_safety.yaml")));
        assert_eq!(out, Some(PathBuf::from("m.json")));
    }

    #[test]
    fn config_needs_no_arguments() {
        let cli = parse(&["sukoon", "config"]);
        assert!(matches!(cli.command, Commands::Config));
        assert!(!cli.verbose);
        assert_eq!(
            sources(&cli.config_dirs).dirs().to_vec(),
            vec![PathBuf::from(DEFAULT_CONFIG_DIR)]
        );
    }

    #[test]
    fn missing_subcommand_is_an_error() {
        assert!(Cli::try_parse_from(["sukoon"]).is_err());
        assert!(Cli::try_parse_from(["sukoon", "route"]).is_err());
    }
}

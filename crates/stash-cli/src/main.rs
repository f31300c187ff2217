use atty::Stream;
use clap::Parser;
use color_eyre::Result;
use serde_json::Value;
use stash_core::{CommandInfo, ExecutionOutcome};

mod cli;
mod dispatch;
mod style;

use cli::StashCli;
use style::Style;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = StashCli::parse();
    init_tracing(cli.trace, cli.verbose);

    let (info, outcome) = dispatch::dispatch_command(&cli.command)?;
    let code = emit_output(&cli, info, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter =
        format!("stash={level},stash_core={level},stash_domain={level},stash_cli={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn emit_output(cli: &StashCli, info: CommandInfo, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = outcome.exit_code();
    let style = Style::new(cli.no_color, atty::is(Stream::Stdout));

    if cli.json {
        let payload = stash_core::to_json_response(info, outcome);
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if !cli.quiet {
        if is_passthrough(&outcome.details) {
            print!("{}", outcome.message);
        } else {
            let message = stash_core::format_status_message(info, &outcome.message);
            println!("{}", style.status(outcome.status, &message));
            for failure in failure_lines(&outcome.details) {
                println!("  {}", style.info(&failure));
            }
            if let Some(hint) = hint_from_details(&outcome.details) {
                let hint_line = format!("Hint: {hint}");
                println!("{}", style.info(&hint_line));
            }
        }
    }

    Ok(code)
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}

fn is_passthrough(details: &Value) -> bool {
    details
        .as_object()
        .and_then(|map| map.get("passthrough"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn failure_lines(details: &Value) -> Vec<String> {
    details
        .get("failures")
        .and_then(Value::as_array)
        .map(|failures| {
            failures
                .iter()
                .filter_map(|failure| failure.get("message").and_then(Value::as_str))
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

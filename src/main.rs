//! Purpose: `stackwire` CLI entry point.
//! Role: Binary crate root; parses args, replays scripts against the reference interpreter.
//! Invariants: Successful commands emit one JSON document on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::error::ErrorKind as ClapErrorKind;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum, ValueHint};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod render;

use render::Renderer;
use stackwire::api::{Error, ErrorKind, to_exit_code};

const CHECK_STACK_ENV: &str = "STACKWIRE_CHECK_STACK";

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

/// Diagnostics go to stderr so stdout stays a clean JSON stream.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `stackwire --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    let settings = Settings {
        check_stack: cli.check_stack || env_flag(CHECK_STACK_ENV),
        synapse_model: cli.synapse_model,
    };

    command_dispatch::dispatch_command(cli.command, settings, color_mode)
        .map_err(add_hint)
        .map_err(|err| (err, color_mode))
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|value| matches!(value.trim(), "1" | "true" | "yes"))
}

#[derive(Parser)]
#[command(
    name = "stackwire",
    version,
    about = "Marshal typed network-building operations onto a stack-based command interpreter",
    long_about = None,
    after_help = r#"EXAMPLES
  $ stackwire run network.json
  $ stackwire --check-stack run - < network.json
  $ stackwire models --kind synapses

Scripts are JSON arrays of steps such as
  {"op": "create", "model": "iaf_neuron", "n": 10, "as": "pop"}
Later steps refer to bound results as "$pop"."#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics and pretty JSON output: auto|always|never"
    )]
    color: ColorMode,
    #[arg(
        long,
        help = "Verify operand stack balance after every operation (also STACKWIRE_CHECK_STACK=1)"
    )]
    check_stack: bool,
    #[arg(
        long,
        value_name = "MODEL",
        help = "Synapse model used when a step names none (default: static_synapse)"
    )]
    synapse_model: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModelKindCli {
    All,
    Nodes,
    Synapses,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Replay a JSON script of operations against the reference interpreter",
        after_help = r#"OPS
  create, set_status, get_status, connect, convergent_connect,
  divergent_connect, get_connections, get_children, get_leaves, get_nodes,
  current_subnet, change_subnet, begin_subnet, end_subnet, get_network,
  layout_network, models, set_defaults, get_defaults, copy_model,
  set_kernel_status, get_kernel_status, reset_kernel, reset_network, simulate

OUTPUT
  {"results": [<one entry per step>]}"#
    )]
    Run {
        #[arg(help = "Script path, or - for stdin", value_hint = ValueHint::FilePath)]
        script: PathBuf,
    },
    #[command(about = "List the models the reference interpreter knows")]
    Models {
        #[arg(long, value_enum, default_value = "all")]
        kind: ModelKindCli,
        #[arg(long, help = "Only names containing this text")]
        selector: Option<String>,
    },
    #[command(about = "Generate shell completion scripts")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

struct Settings {
    check_stack: bool,
    synapse_model: Option<String>,
}

fn emit_json(value: Value, color_mode: ColorMode) {
    let is_tty = io::stdout().is_terminal();
    let renderer = Renderer::new(is_tty, color_mode.use_color(is_tty));
    println!("{}", renderer.render(&value));
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error",
        ErrorKind::Usage => "usage error",
        ErrorKind::ArgumentShape => "argument lengths do not match",
        ErrorKind::TypeMismatch => "argument has the wrong type",
        ErrorKind::StackImbalance => "operand stack left unbalanced",
        ErrorKind::Engine => "interpreter error",
        ErrorKind::Protocol => "unexpected reply from interpreter",
        ErrorKind::Io => "i/o error",
    }
    .to_string()
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(operation) = err.operation() {
        inner.insert("operation".to_string(), json!(operation));
    }
    if let Some(leaked) = err.leaked() {
        inner.insert("leaked".to_string(), json!(leaked));
    }
    if let Some(created) = err.created() {
        inner.insert("created".to_string(), json!(created));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }
    json!({ "error": Value::Object(inner) })
}

fn error_text(err: &Error, use_color: bool) -> String {
    let renderer = Renderer::new(false, use_color);
    let mut lines = vec![format!(
        "{} {}",
        renderer.label("error:", "31"),
        error_message(err)
    )];
    if let Some(hint) = err.hint() {
        lines.push(format!("{} {hint}", renderer.label("hint:", "33")));
    }
    if let Some(created) = err.created() {
        lines.push(format!("{} {created:?}", renderer.label("created:", "33")));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("{} {cause}", renderer.label("caused by:", "33")));
    }
    lines.join("\n")
}

fn add_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::StackImbalance => {
            err.with_hint("An operation left values on the operand stack; this is a marshalling bug.")
        }
        ErrorKind::Io => err.with_hint("I/O error. Check the script path and permissions."),
        ErrorKind::Internal => err.with_hint(
            "Unexpected internal failure. Retry with RUST_BACKTRACE=1 and share the script if it persists.",
        ),
        _ => err,
    }
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

#[cfg(test)]
mod tests {
    use super::{Cli, error_json};
    use clap::CommandFactory;
    use serde_json::json;
    use stackwire::api::{Error, ErrorKind};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn error_json_carries_marshalling_context() {
        let err = Error::new(ErrorKind::StackImbalance)
            .with_message("operation 'Create' left 1 elements on the stack")
            .with_operation("Create")
            .with_leaked(1);
        assert_eq!(
            error_json(&err),
            json!({"error": {
                "kind": "StackImbalance",
                "message": "operation 'Create' left 1 elements on the stack",
                "operation": "Create",
                "leaked": 1,
            }})
        );
    }
}

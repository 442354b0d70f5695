//! Purpose: Hold top-level CLI command dispatch for `stackwire`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every command builds its own marshaller over a fresh reference interpreter.
//! Invariants: Printed network trees go to stderr so stdout stays a single JSON document.
use std::io::Read;
use std::path::Path;

use stackwire::api::{Marshaller, MarshallerOptions, ModelKind, set_stack_checks};
use stackwire::reference::ReferenceInterpreter;
use stackwire::script::{Script, ScriptRunner};

use super::*;

pub(super) fn dispatch_command(
    command: Command,
    settings: Settings,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    set_stack_checks(settings.check_stack);
    let marshaller = || {
        let mut options = MarshallerOptions::new();
        if let Some(model) = &settings.synapse_model {
            options = options.with_synapse_model(model.clone());
        }
        Marshaller::with_options(ReferenceInterpreter::new(), options)
    };

    match command {
        Command::Run { script } => {
            let text = read_script(&script)?;
            let script = Script::parse(&text)?;
            let mut runner = ScriptRunner::new(marshaller());
            let results = runner.run(&script)?;
            let printed = runner.marshaller().channel().output();
            if !printed.is_empty() {
                eprint!("{printed}");
            }
            emit_json(json!({ "results": results }), color_mode);
            Ok(RunOutcome::ok())
        }
        Command::Models { kind, selector } => {
            let kind = match kind {
                ModelKindCli::All => ModelKind::All,
                ModelKindCli::Nodes => ModelKind::Nodes,
                ModelKindCli::Synapses => ModelKind::Synapses,
            };
            let names = marshaller().models(kind, selector.as_deref())?;
            emit_json(json!({ "models": names }), color_mode);
            Ok(RunOutcome::ok())
        }
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "stackwire", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
    }
}

fn read_script(path: &Path) -> Result<String, Error> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read script from stdin")
                .with_source(err)
        })?;
        return Ok(text);
    }
    std::fs::read_to_string(path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message(format!("failed to read script {}", path.display()))
            .with_source(err)
    })
}

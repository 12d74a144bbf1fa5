use clap::{Parser, Subcommand};
use financial_command_gateway::{
    agent::{Orchestrator, Outcome, Reply},
    config::GatewayConfig,
    models::{CommandResult, Credential},
    parser::parse_args,
    routes::RouteRegistry,
};
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Command line client for the financial operations API
#[derive(Parser, Debug)]
#[command(name = "finops")]
#[command(about = "Run financial operations commands")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one command, e.g. `finops exec transfers show txn_42 --mode live`
    Exec {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        tokens: Vec<String>,
    },
    /// List available commands
    Routes {
        resource: Option<String>,
    },
    /// Interactive session; supports `verify`, `confirm <code>` and `cancel`
    Shell,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Routes { resource } => Ok(print_routes(resource.as_deref())),
        Commands::Exec { tokens } => {
            let config = GatewayConfig::from_env()?;
            let orchestrator = Orchestrator::from_config(&config)?;
            let text = tokens.join(" ");
            let command = parse_args(tokens);

            let reply = orchestrator
                .handle_command(None, &text, &command, &config.default_credential)
                .await?;
            print_reply(&reply);

            if let Outcome::Challenge(_) = reply.outcome {
                eprintln!("Passcode-gated commands need an interactive session: finops shell");
            }
            Ok(exit_code(&reply.outcome))
        }
        Commands::Shell => {
            let config = GatewayConfig::from_env()?;
            let orchestrator = Orchestrator::from_config(&config)?;
            run_shell(&orchestrator, &config.default_credential).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_routes(resource: Option<&str>) -> ExitCode {
    let registry = RouteRegistry::builtin();

    match resource {
        None => {
            println!("{}", registry.render_catalog());
            ExitCode::SUCCESS
        }
        Some(resource) => match registry.render_resource(resource) {
            Some(text) => {
                println!("{}", text);
                ExitCode::SUCCESS
            }
            None => {
                eprintln!("{}", registry.render_resource_list());
                ExitCode::FAILURE
            }
        },
    }
}

async fn run_shell(
    orchestrator: &Orchestrator,
    credential: &Credential,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut conversation: Option<Uuid> = None;

    println!("finops shell. Type `help` for commands, `exit` to quit.");

    loop {
        stdout.write_all(b"finops> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        let mut words = line.split_whitespace();

        match (words.next(), words.next()) {
            (None, _) => continue,
            (Some("exit") | Some("quit"), None) => break,
            (Some("verify"), None) => match conversation {
                Some(id) => print_result(&orchestrator.verify(id, credential).await),
                None => eprintln!("Nothing staged yet."),
            },
            (Some("confirm"), code) => match conversation {
                Some(id) => {
                    let code = code.unwrap_or("");
                    print_result(&orchestrator.confirm(id, code, None, credential).await)
                }
                None => eprintln!("Nothing staged yet."),
            },
            (Some("cancel"), None) => match conversation {
                Some(id) => print_result(&orchestrator.cancel(id).await),
                None => eprintln!("Nothing staged yet."),
            },
            _ => {
                let reply = orchestrator.handle(conversation, line, credential).await?;
                conversation = Some(reply.conversation_id);
                print_reply(&reply);

                if let Outcome::Challenge(challenge) = &reply.outcome {
                    println!("{}", challenge.instructions);
                }
            }
        }
    }

    if let Some(id) = conversation {
        info!(conversation_id = %id, "Shell session ended");
    }
    Ok(())
}

fn print_reply(reply: &Reply) {
    match &reply.outcome {
        Outcome::Completed(result) => print_result(result),
        Outcome::Challenge(challenge) => {
            println!("{}", challenge.summary);
            println!("action_id: {}", challenge.action_id);
        }
    }
}

fn print_result(result: &CommandResult) {
    // Help text reads better unquoted
    if let Some(help) = result
        .data
        .as_ref()
        .and_then(|d| d.get("help"))
        .and_then(|h| h.as_str())
    {
        println!("{}", help);
        return;
    }

    if let Some(error) = &result.error {
        eprintln!("error[{}]: {}", error.kind.as_str(), error.message);
        if let Some(hint) = &error.hint {
            eprintln!("{}", hint);
        }
    }

    if let Some(data) = &result.data {
        match serde_json::to_string_pretty(data) {
            Ok(pretty) => println!("{}", pretty),
            Err(_) => println!("{}", data),
        }
    }
}

fn exit_code(outcome: &Outcome) -> ExitCode {
    match outcome {
        Outcome::Completed(result) if !result.success => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    }
}

//! Resource Schema CLI
//!
//! Command-line interface for inspecting API definitions and validating
//! payloads against their per-operation schemas.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use resource_schema::{
    load_definition_auto, load_payload, Api, ApiError, DefinitionError, Operation, Violation,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "resource-schema")]
#[command(about = "Inspect resource definitions and validate payloads")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the hyper-schema document of a resource
    Describe {
        /// Definition source: file path or URL (http:// or https://)
        definition: String,

        /// Resource name
        resource: String,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Print the JSON Schema a resource uses for one operation
    Schema {
        /// Definition source: file path or URL (http:// or https://)
        definition: String,

        /// Resource name
        resource: String,

        /// Operation (create, read, update, enumerate)
        #[arg(long, short)]
        op: String,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a payload for one operation of a resource
    Validate {
        /// Definition source: file path or URL (http:// or https://)
        definition: String,

        /// Resource name
        resource: String,

        /// Payload file to validate
        payload: PathBuf,

        /// Operation to validate for (create or update)
        #[arg(long, short)]
        op: String,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Load a definition and register every resource
    Check {
        /// Definition source: file path or URL (http:// or https://)
        definition: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Describe {
            definition,
            resource,
            output,
            pretty,
        } => run_describe(&definition, &resource, output, pretty),

        Commands::Schema {
            definition,
            resource,
            op,
            pretty,
        } => run_schema(&definition, &resource, &op, pretty),

        Commands::Validate {
            definition,
            resource,
            payload,
            op,
            json,
        } => run_validate(&definition, &resource, payload, &op, json),

        Commands::Check { definition } => run_check(&definition),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn build_api(source: &str, json_output: bool) -> Result<Api, u8> {
    load_definition_auto(source)
        .and_then(|def| def.build())
        .map_err(|e| definition_failed(json_output, &e))
}

fn definition_failed(json_output: bool, err: &DefinitionError) -> u8 {
    report_error(json_output, &err.to_string());
    err.exit_code() as u8
}

fn parse_operation(op: &str, json_output: bool) -> Result<Operation, u8> {
    Operation::parse(op).ok_or_else(|| {
        report_error(
            json_output,
            &format!(
                "unknown operation \"{}\" (expected create, read, update or enumerate)",
                op
            ),
        );
        2u8
    })
}

fn unknown_resource(json_output: bool, resource: &str) -> u8 {
    report_error(json_output, &format!("unknown resource \"{}\"", resource));
    2
}

fn print_json(value: &Value, pretty: bool) -> Result<String, u8> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })
}

fn run_describe(
    definition: &str,
    resource: &str,
    output: Option<PathBuf>,
    pretty: bool,
) -> Result<(), u8> {
    let api = build_api(definition, false)?;
    let doc = api
        .describe(resource)
        .map_err(|_| unknown_resource(false, resource))?;
    let json_output = print_json(&doc, pretty)?;

    match output {
        Some(path) => {
            std::fs::write(&path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    Ok(())
}

fn run_schema(definition: &str, resource: &str, op: &str, pretty: bool) -> Result<(), u8> {
    let operation = parse_operation(op, false)?;
    let api = build_api(definition, false)?;
    let schema = api
        .schema(resource, operation)
        .map_err(|_| unknown_resource(false, resource))?;

    println!("{}", print_json(schema, pretty)?);
    Ok(())
}

fn run_validate(
    definition: &str,
    resource: &str,
    payload_path: PathBuf,
    op: &str,
    json_output: bool,
) -> Result<(), u8> {
    let operation = parse_operation(op, json_output)?;
    if !operation.is_write() {
        report_error(
            json_output,
            &format!("cannot validate input for \"{}\": it takes no payload", op),
        );
        return Err(2);
    }

    let api = build_api(definition, json_output)?;
    let payload = load_payload(&payload_path).map_err(|e| {
        report_error(json_output, &format!("loading payload: {}", e));
        e.exit_code() as u8
    })?;

    match api.validate(resource, operation, &payload) {
        Ok(_) => {
            if json_output {
                println!(r#"{{"valid":true}}"#);
            } else {
                println!("Valid");
            }
            Ok(())
        }
        Err(ApiError::Validation(err)) => {
            if json_output {
                let errors: Vec<Violation> = err.violations().collect();
                let output = serde_json::json!({
                    "valid": false,
                    "errors": errors
                });
                println!("{}", output);
            } else {
                eprintln!("Validation failed:");
                for violation in err.violations() {
                    eprintln!("  {}", violation);
                }
            }
            Err(1)
        }
        Err(_) => Err(unknown_resource(json_output, resource)),
    }
}

fn run_check(definition: &str) -> Result<(), u8> {
    let api = build_api(definition, false)?;
    let names: Vec<&str> = api.resource_names().collect();
    println!("OK: {} resource(s): {}", names.len(), names.join(", "));
    Ok(())
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", serde_json::json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}

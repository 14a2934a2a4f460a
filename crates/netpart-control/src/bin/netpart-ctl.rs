// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Netpart Control CLI
//!
//! CLI tool for driving the partition test harness from a shell.
//!
//! Usage:
//!   netpart-ctl <command> [options]
//!
//! Commands:
//!   list                          List instances
//!   get <name>                    Show one instance
//!   create <name> [--image <ref>] Create an instance
//!   kill <name>                   Remove an instance
//!   cleanup                       Remove every owned container and network
//!   connect <a> <b>               Connect two instances
//!   disconnect <a> <b>            Disconnect two instances
//!   connection <a> <b>            Show whether two instances are connected
//!   primary <name>                Make an instance a primary
//!   standby <name> --to <primary> Make an instance a standby
//!   restart-standby <name>        Re-enable a standby subscription
//!   replication <name>            Show replication status
//!   put <name> <key> <value>      Write a KV record
//!   keys <name>                   List KV records

use std::process::ExitCode;

use netpart_control::{Config, ControlPlane, Error};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

fn print_usage() {
    eprintln!(
        r#"Usage: netpart-ctl <command> [options]

Drive PostgreSQL instances through network partitions.

COMMANDS:
    list                            List instances
    get <name>                      Show one instance
    create <name>                   Create an instance
    kill <name>                     Remove an instance
    cleanup                         Remove every owned container and network
    connect <a> <b>                 Connect two instances
    disconnect <a> <b>              Disconnect two instances
    connection <a> <b>              Show whether two instances are connected
    primary <name>                  Make an instance a primary
    standby <name>                  Make an instance a standby
    restart-standby <name>          Re-enable a standby subscription
    replication <name>              Show replication status
    put <name> <key> <value>        Write a KV record
    keys <name>                     List KV records

CREATE OPTIONS:
    --image <ref>                   Image to run (default: $POSTGRES_IMAGE)

STANDBY OPTIONS:
    --to <primary>                  Primary to subscribe to (required)

ENVIRONMENT:
    NETPART_DOCKER_BIN              Container runtime CLI (default: docker)
    DOCKER_HOST                     Runtime endpoint
    POSTGRES_IMAGE                  Default image (default: postgres:16.3-alpine3.20)
    NETPART_SQL_HOST                Host of published ports (default: 127.0.0.1)
    NETPART_CONNECT_TIMEOUT_MS      Connect deadline in ms (default: 30000)

EXAMPLES:
    # Two instances, replicating
    netpart-ctl create db1
    netpart-ctl create db2
    netpart-ctl connect db1 db2
    netpart-ctl primary db1
    netpart-ctl standby db2 --to db1

    # Partition them
    netpart-ctl disconnect db1 db2
"#
    );
}

#[derive(Debug)]
enum Command {
    Help,
    List,
    Get { name: String },
    Create { name: String, image: Option<String> },
    Kill { name: String },
    Cleanup,
    Connect { a: String, b: String },
    Disconnect { a: String, b: String },
    Connection { a: String, b: String },
    Primary { name: String },
    Standby { name: String, primary: String },
    RestartStandby { name: String },
    Replication { name: String },
    Put { name: String, key: String, value: String },
    Keys { name: String },
}

fn parse_args() -> Result<Command, String> {
    let args: Vec<String> = std::env::args().collect();
    parse_args_from_vec(&args)
}

fn positional(args: &[String], index: usize, what: &str) -> Result<String, String> {
    args.get(index)
        .cloned()
        .ok_or_else(|| format!("{} required", what))
}

fn pair(args: &[String]) -> Result<(String, String), String> {
    if args.len() > 4 {
        return Err(format!("Unknown argument: {}", args[4]));
    }
    Ok((
        positional(args, 2, "First instance name")?,
        positional(args, 3, "Second instance name")?,
    ))
}

fn parse_args_from_vec(args: &[String]) -> Result<Command, String> {
    if args.len() < 2 {
        return Err("No command specified".to_string());
    }

    match args[1].as_str() {
        "help" | "--help" | "-h" => Ok(Command::Help),
        "list" => Ok(Command::List),
        "cleanup" => Ok(Command::Cleanup),
        "get" => Ok(Command::Get {
            name: positional(args, 2, "Instance name")?,
        }),
        "create" => {
            let name = positional(args, 2, "Instance name")?;
            let mut image: Option<String> = None;

            let mut i = 3;
            while i < args.len() {
                match args[i].as_str() {
                    "--image" => {
                        i += 1;
                        image = Some(args.get(i).ok_or("--image requires a reference")?.clone());
                    }
                    arg => return Err(format!("Unknown argument: {}", arg)),
                }
                i += 1;
            }

            Ok(Command::Create { name, image })
        }
        "kill" => Ok(Command::Kill {
            name: positional(args, 2, "Instance name")?,
        }),
        "connect" => {
            let (a, b) = pair(args)?;
            Ok(Command::Connect { a, b })
        }
        "disconnect" => {
            let (a, b) = pair(args)?;
            Ok(Command::Disconnect { a, b })
        }
        "connection" => {
            let (a, b) = pair(args)?;
            Ok(Command::Connection { a, b })
        }
        "primary" => Ok(Command::Primary {
            name: positional(args, 2, "Instance name")?,
        }),
        "standby" => {
            let name = positional(args, 2, "Instance name")?;
            let mut primary: Option<String> = None;

            let mut i = 3;
            while i < args.len() {
                match args[i].as_str() {
                    "--to" => {
                        i += 1;
                        primary = Some(args.get(i).ok_or("--to requires a primary name")?.clone());
                    }
                    arg => return Err(format!("Unknown argument: {}", arg)),
                }
                i += 1;
            }

            Ok(Command::Standby {
                name,
                primary: primary.ok_or("--to is required")?,
            })
        }
        "restart-standby" => Ok(Command::RestartStandby {
            name: positional(args, 2, "Instance name")?,
        }),
        "replication" => Ok(Command::Replication {
            name: positional(args, 2, "Instance name")?,
        }),
        "put" => Ok(Command::Put {
            name: positional(args, 2, "Instance name")?,
            key: positional(args, 3, "Key")?,
            value: positional(args, 4, "Value")?,
        }),
        "keys" => Ok(Command::Keys {
            name: positional(args, 2, "Instance name")?,
        }),
        cmd => Err(format!("Unknown command: {}", cmd)),
    }
}

/// Error text shown to the operator. Errors that may echo credentials only
/// show their kind; the full text goes to the debug log.
fn render_error(e: &Error) -> String {
    if e.is_sensitive() {
        debug!(error = %e, "Suppressed error details");
        let kind = serde_json::to_string(&e.kind()).unwrap_or_default();
        format!("{} (details hidden, run with RUST_LOG=netpart_ctl=debug)", kind.trim_matches('"'))
    } else {
        e.to_string()
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "netpart_control=info,netpart_ctl=info".into()),
        )
        .init();

    if let Err(e) = dotenvy::dotenv() {
        debug!("No .env file loaded: {}", e);
    }

    let cmd = match parse_args() {
        Ok(Command::Help) => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    let plane = match ControlPlane::connect(config, &cancel).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to reach container runtime: {}", render_error(&e));
            return ExitCode::FAILURE;
        }
    };

    match execute_command(&plane, cmd, &cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute_command(
    plane: &ControlPlane,
    cmd: Command,
    cancel: &CancellationToken,
) -> Result<(), String> {
    let err = |e: Error| render_error(&e);

    match cmd {
        Command::Help => print_usage(),

        Command::List => {
            let instances = plane.list_instances(cancel).await.map_err(err)?;
            print_json(&instances)?;
        }

        Command::Get { name } => {
            let instance = plane.get_instance(&name, cancel).await.map_err(err)?;
            print_json(&instance)?;
        }

        Command::Create { name, image } => {
            let instance = plane
                .create_instance(&name, image.as_deref(), cancel)
                .await
                .map_err(err)?;
            print_json(&instance)?;
        }

        Command::Kill { name } => {
            let instance = plane.get_instance(&name, cancel).await.map_err(err)?;
            plane.kill_instance(&instance, cancel).await.map_err(err)?;
            println!("Instance {} killed", instance.name);
        }

        Command::Cleanup => {
            plane.cleanup_all(cancel).await.map_err(err)?;
            println!("Cleanup complete");
        }

        Command::Connect { a, b } => {
            let a = plane.get_instance(&a, cancel).await.map_err(err)?;
            let b = plane.get_instance(&b, cancel).await.map_err(err)?;
            plane.connect_instances(&a, &b, cancel).await.map_err(err)?;
            println!("Connected {} and {}", a.name, b.name);
        }

        Command::Disconnect { a, b } => {
            let a = plane.get_instance(&a, cancel).await.map_err(err)?;
            let b = plane.get_instance(&b, cancel).await.map_err(err)?;
            plane
                .disconnect_instances(&a, &b, cancel)
                .await
                .map_err(err)?;
            println!("Disconnected {} and {}", a.name, b.name);
        }

        Command::Connection { a, b } => {
            let a = plane.get_instance(&a, cancel).await.map_err(err)?;
            let b = plane.get_instance(&b, cancel).await.map_err(err)?;
            let connected = plane.get_connection(&a, &b, cancel).await.map_err(err)?;
            print_json(&serde_json::json!({ "connected": connected }))?;
        }

        Command::Primary { name } => {
            let instance = plane.get_instance(&name, cancel).await.map_err(err)?;
            plane.setup_primary(&instance, cancel).await.map_err(err)?;
            println!("{} is now a primary", instance.name);
        }

        Command::Standby { name, primary } => {
            let instance = plane.get_instance(&name, cancel).await.map_err(err)?;
            let primary = plane.get_instance(&primary, cancel).await.map_err(err)?;
            plane
                .setup_standby(&instance, &primary, cancel)
                .await
                .map_err(err)?;
            println!("{} is now a standby of {}", instance.name, primary.name);
        }

        Command::RestartStandby { name } => {
            let instance = plane.get_instance(&name, cancel).await.map_err(err)?;
            plane.restart_standby(&instance, cancel).await.map_err(err)?;
            println!("Standby {} restarted", instance.name);
        }

        Command::Replication { name } => {
            let instance = plane.get_instance(&name, cancel).await.map_err(err)?;
            let data = plane
                .get_replication_data(&instance, cancel)
                .await
                .map_err(err)?;
            print_json(&data)?;
        }

        Command::Put { name, key, value } => {
            let instance = plane.get_instance(&name, cancel).await.map_err(err)?;
            plane.put(&instance, &key, &value, cancel).await.map_err(err)?;
        }

        Command::Keys { name } => {
            let instance = plane.get_instance(&name, cancel).await.map_err(err)?;
            let records = plane.get(&instance, cancel).await.map_err(err)?;
            print_json(&records)?;
        }
    }

    Ok(())
}

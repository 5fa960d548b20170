//! qualify-ctl — command-line interface for the qualify daemon.

use anyhow::{Context, Result};

mod cmd;

use cmd::contacts::{cmd_contacts, cmd_statuses};
use cmd::qualify::{cmd_pjsip_qualify, cmd_qualify};
use cmd::status::{cmd_metrics, cmd_reconfigure, cmd_reload};

const DEFAULT_PORT: u16 = 9088;

fn print_usage() {
    println!("Usage: qualify-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  qualify <endpoint>          Qualify every contact of an endpoint now");
    println!("  pjsip qualify <endpoint>    Same, printing the console output");
    println!("  contacts <endpoint>         Show contact details of an endpoint");
    println!("  statuses                    List all contact statuses");
    println!("  metrics                     Show state gauges and schedule size");
    println!("  reload                      Rebuild the qualify schedule");
    println!("  reconfigure <aor>           Reschedule the contacts of one AOR");
    println!();
    println!("Options:");
    println!("  --port <port>   API port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<String> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(args[i].clone());
        }
        i += 1;
    }

    let words: Vec<&str> = remaining.iter().map(String::as_str).collect();
    let code = match words.as_slice() {
        ["qualify", endpoint] => cmd_qualify(port, endpoint).await?,
        ["pjsip", "qualify", ..] => cmd_pjsip_qualify(port, &remaining[2..]).await?,
        ["contacts", endpoint] => cmd_contacts(port, endpoint).await?,
        ["statuses"] | [] => cmd_statuses(port).await?,
        ["metrics"] => cmd_metrics(port).await?,
        ["reload"] => cmd_reload(port).await?,
        ["reconfigure", aor] => cmd_reconfigure(port, aor).await?,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            0
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            2
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

use campusd::{config::Config, ipc, logging};
use clap::Parser;
use std::io::{self, BufRead, Write};
use tracing::{error, info};

fn main() {
    let config = Config::parse();
    logging::init(config.log_format, &config.log_filter);

    let mut state = ipc::AppState::new(config.institution.clone());
    if let Some(path) = config.workspace.as_ref() {
        if let Err(e) = ipc::open_workspace(&mut state, path) {
            let message = format!("{e:#}");
            error!(workspace = %path.display(), error = %message, "failed to open workspace");
        }
    }
    info!(institution = %state.institution, "campusd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let _ = writeln!(
                    stdout,
                    "{}",
                    serde_json::json!({
                        "ok": false,
                        "error": { "code": "bad_json", "message": e.to_string() }
                    })
                );
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(stdout, "{}", resp);
        let _ = stdout.flush();
    }
}

//! Signs in to an rtchat backend and prints the online-user set each time
//! it changes.
//!
//! ```text
//! presence-watch --email ada@example.com --password hunter22
//! presence-watch --credential-path ~/.rtchat/token   # reuse a saved session
//! ```
//!
//! Settings not given on the command line come from `RTCHAT_*` environment
//! variables (or a `.env` file).

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rtchat::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "presence-watch", version, about)]
struct Cli {
    /// Account email. Needed unless a saved session is still valid.
    #[arg(long)]
    email: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// REST origin, e.g. http://localhost:5001
    #[arg(long)]
    api_url: Option<String>,

    /// Presence socket origin; defaults to the API origin.
    #[arg(long)]
    live_url: Option<String>,

    /// File to keep the session credential in between runs.
    #[arg(long)]
    credential_path: Option<PathBuf>,

    /// Talk to the hosted backend instead of a local one.
    #[arg(long, default_value_t = false)]
    production: bool,

    /// Log out when interrupted instead of keeping the session.
    #[arg(long, default_value_t = false)]
    log_out: bool,
}

impl Cli {
    fn config(&self) -> Result<ClientConfig, RtchatError> {
        let mut config = ClientConfig::from_env()?;
        if self.production {
            config = ClientConfig {
                credential_path: config.credential_path,
                ..ClientConfig::for_mode(Mode::Production)
            };
        }
        if let Some(url) = &self.api_url {
            config = config.with_api_url(url);
        }
        if let Some(url) = &self.live_url {
            config = config.with_live_url(url);
        }
        if let Some(path) = &self.credential_path {
            config = config.with_credential_path(path);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    rtchat::telemetry::init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("presence-watch error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), RtchatError> {
    let client = ChatClient::builder().config(cli.config()?).build()?;
    let session = client.session();

    let mut notes = session.notifications();

    session.bootstrap_session().await;

    if !session.snapshot().is_authenticated() {
        let (Some(email), Some(password)) = (cli.email.clone(), cli.password.clone()) else {
            eprintln!("no saved session; pass --email and --password to sign in");
            return Ok(());
        };
        session.log_in(&LoginRequest { email, password }).await;
        print_notifications(&mut notes);
        if !session.snapshot().is_authenticated() {
            return Ok(());
        }
    }

    if let Some(user) = session.user() {
        let name = user.full_name.as_deref().unwrap_or(user.id.as_str());
        println!("signed in as {name}; watching presence (ctrl-c to stop)");
    }

    let mut snapshots = session.subscribe();
    let mut shown: Option<BTreeSet<UserId>> = None;

    loop {
        let (online, live, signed_in) = {
            let snapshot = snapshots.borrow_and_update();
            (snapshot.online_users.clone(), snapshot.live, snapshot.is_authenticated())
        };

        if !signed_in {
            println!("session ended");
            break;
        }
        if shown.as_ref() != Some(&online) && live != LiveStatus::Connecting {
            print_presence(&online, live);
            shown = Some(online);
        }

        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    if cli.log_out {
        session.log_out().await;
        print_notifications(&mut notes);
    } else {
        session.close_live_connection();
    }
    Ok(())
}

fn print_notifications(notes: &mut tokio::sync::broadcast::Receiver<Notification>) {
    while let Ok(note) = notes.try_recv() {
        match note.level {
            NotificationLevel::Success => println!("✓ {}", note.message),
            NotificationLevel::Error => eprintln!("✗ {}", note.message),
        }
    }
}

fn print_presence(online: &BTreeSet<UserId>, live: LiveStatus) {
    if live == LiveStatus::Disconnected {
        println!("[offline] live connection down");
        return;
    }
    let ids: Vec<&str> = online.iter().map(UserId::as_str).collect();
    println!("[{} online] {}", ids.len(), ids.join(", "));
}

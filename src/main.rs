mod core;
mod display;
mod link;
mod server;
mod settings;
mod store;
mod summary;
mod upstream;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{arg, ArgMatches, Command};
use plaid_link::LinkClient;
use tracing::debug;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

use crate::core::DATE_FORMAT;
use crate::server::AppState;
use crate::settings::Settings;
use crate::store::RecordStore;

static CLIENT_NAME: &str = "finboard";

fn parse_date(matches: &ArgMatches, name: &str) -> Result<Option<NaiveDate>> {
    matches
        .value_of(name)
        .map(|s| {
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .with_context(|| format!("--{} must be a YYYY-MM-DD date, got {:?}", name, s))
        })
        .transpose()
}

async fn serve(conf: Settings, store: RecordStore) -> Result<()> {
    let client = LinkClient::new(&conf.plaid.client_id, &conf.plaid.secret, &conf.plaid.env)?;
    debug!(
        env = %conf.plaid.env,
        secret_len = conf.plaid.secret.len(),
        "Plaid client configured"
    );

    let addr: SocketAddr = conf
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address {:?}", conf.bind_addr))?;
    let state = AppState {
        store: Arc::new(store),
        upstream: Arc::new(upstream::plaid::Source::new(client)),
    };

    server::serve(state, addr, &conf.allowed_origins).await
}

async fn run() -> Result<()> {
    let app = Command::new(CLIENT_NAME)
        .about("The finboard utility serves the personal finance API backed by \
         Plaid, and inspects the data it has stored.")
        .version("0.1.0")
        .subcommand_required(true)
        .allow_external_subcommands(false)
        .arg(arg!(CONFIG: -c --config [FILE] "Sets a custom config file"))
        .arg(arg!(verbose: -v --verbose "Logs at debug level"))
        .subcommand(Command::new("serve").about("Runs the HTTP API."))
        .subcommand(Command::new("accounts")
            .about("Prints the stored accounts of a user.")
            .arg(arg!(user_id: <USER_ID> "The user whose accounts to print.")))
        .subcommand(Command::new("summary")
            .about("Prints the account summary of a user.")
            .arg(arg!(user_id: <USER_ID> "The user to summarize."))
            .arg(arg!(begin: --begin [DATE] "The first day of transactions to include. Start date is inclusive."))
            .arg(arg!(until: --until [DATE] "The last day of transactions to include. End date is inclusive.")))
        .subcommand(Command::new("clean")
            .about("Deletes stored data, for a single user or for everyone.")
            .arg(arg!(user: -u --user [USER_ID] "Only delete the data of this user.")));

    let matches = app.get_matches();

    let level = if matches.is_present("verbose") {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();

    let conf = Settings::new(matches.value_of("CONFIG"))?;
    let store = RecordStore::new(&conf.data_dir)?;

    match matches.subcommand() {
        Some(("serve", _)) => serve(conf, store).await?,
        Some(("accounts", sub)) => {
            let user_id = sub.value_of("user_id").context("USER_ID is required")?;
            let accounts = store.get_accounts(user_id)?;
            display::print_accounts(std::io::stdout(), &accounts)?;
        }
        Some(("summary", sub)) => {
            let user_id = sub.value_of("user_id").context("USER_ID is required")?;
            let summary = summary::get_account_summary(
                &store,
                user_id,
                parse_date(sub, "begin")?,
                parse_date(sub, "until")?,
            )?;
            display::print_summary(std::io::stdout(), &summary)?;
        }
        Some(("clean", sub)) => {
            store.clean_test_data(sub.value_of("user"))?;
        }
        None => unreachable!("subcommand is required"),
        _ => unreachable!(),
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

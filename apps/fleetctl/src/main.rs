use clap::{Parser, Subcommand};

mod client;

#[derive(Parser)]
#[command(name = "fleetctl", version, about = "Control a running fleetd")]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    Ping,
    Status,
    Shutdown,
    /// Show the players recorded by the last sync.
    Online {
        server: String,
    },
    Sync {
        #[command(subcommand)]
        what: SyncCmd,
    },
    Backup {
        #[command(subcommand)]
        action: BackupCmd,
    },
    Whitelist {
        #[command(subcommand)]
        action: WhitelistCmd,
    },
}

#[derive(Subcommand)]
enum SyncCmd {
    Players {
        server: String,
        /// Return right away instead of waiting for the result.
        #[arg(long)]
        no_wait: bool,
    },
    Save {
        server: String,
        #[arg(long)]
        no_wait: bool,
    },
}

#[derive(Subcommand)]
enum BackupCmd {
    Now {
        server: String,
    },
    List {
        server: String,
        /// RFC 3339 timestamp or YYYY-MM-DD.
        #[arg(long)]
        since: Option<String>,
        #[arg(long)]
        until: Option<String>,
    },
    Show {
        server: String,
        backup_id: String,
    },
    Delete {
        server: String,
        backup_id: String,
    },
}

#[derive(Subcommand)]
enum WhitelistCmd {
    List {
        server: String,
    },
    Add {
        server: String,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long = "uid")]
        player_uid: Option<String>,
        #[arg(long)]
        steam_id: Option<String>,
    },
    Remove {
        server: String,
        /// Player uid or Steam id.
        identifier: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let out = match args.cmd {
        Cmd::Ping => client::ping().await?,
        Cmd::Status => client::status().await?,
        Cmd::Shutdown => client::shutdown().await?,
        Cmd::Online { server } => client::online(server).await?,
        Cmd::Sync { what } => match what {
            SyncCmd::Players { server, no_wait } => client::sync_players(server, !no_wait).await?,
            SyncCmd::Save { server, no_wait } => client::sync_save(server, !no_wait).await?,
        },
        Cmd::Backup { action } => match action {
            BackupCmd::Now { server } => client::backup_now(server).await?,
            BackupCmd::List { server, since, until } => client::backup_list(server, since, until).await?,
            BackupCmd::Show { server, backup_id } => client::backup_show(server, backup_id).await?,
            BackupCmd::Delete { server, backup_id } => client::backup_delete(server, backup_id).await?,
        },
        Cmd::Whitelist { action } => match action {
            WhitelistCmd::List { server } => client::whitelist_list(server).await?,
            WhitelistCmd::Add {
                server,
                name,
                player_uid,
                steam_id,
            } => client::whitelist_add(server, name, player_uid, steam_id).await?,
            WhitelistCmd::Remove { server, identifier } => {
                client::whitelist_remove(server, identifier).await?
            }
        },
    };
    println!("{out}");
    Ok(())
}

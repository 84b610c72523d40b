use clap::{Parser, Subcommand};
use roomcast::{
    client::{ApiClient, ChatSession, ConnectionState, SessionConfig},
    config::{DatabaseConfig, LogConfig, ServeConfig},
    db::{RoomId, Store, UserId},
    server,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[derive(Parser)]
#[command(name = "roomcast", about = "Rooms with live message fan-out", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    database: DatabaseConfig,

    #[command(flatten)]
    log: LogConfig,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP + WebSocket server.
    Serve(ServeConfig),
    /// User administration.
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Room administration.
    Room {
        #[command(subcommand)]
        action: RoomAction,
    },
    /// List your rooms on a running server, creating or joining one first.
    Rooms {
        #[arg(long, default_value = "http://localhost:3000")]
        server: String,
        #[arg(long)]
        user: String,
        /// Create a room with this name, owned by `--user`.
        #[arg(long)]
        create: Option<String>,
        /// Join the room with this id.
        #[arg(long)]
        join: Option<String>,
    },
    /// Chat in a room from the terminal.
    Chat {
        #[arg(long, default_value = "http://localhost:3000")]
        server: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        room: String,
    },
}

#[derive(Subcommand)]
enum UserAction {
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
    },
}

#[derive(Subcommand)]
enum RoomAction {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        owner: Option<String>,
    },
    /// Record that a user belongs to a room.
    Join {
        #[arg(long)]
        room: String,
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    cli.log.init();

    match cli.command {
        Commands::Serve(config) => {
            let store = open_store(&cli.database).await?;
            server::serve(&config, store).await
        }
        Commands::User { action: UserAction::Add { id, name } } => {
            let store = open_store(&cli.database).await?;
            let user = store.create_user(&UserId::from(id), &name).await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
            Ok(())
        }
        Commands::Room { action: RoomAction::Add { name, id, owner } } => {
            let store = open_store(&cli.database).await?;
            let owner = owner.map(UserId::from);
            let room = store.create_room(id.map(RoomId::from), &name, owner.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&room)?);
            Ok(())
        }
        Commands::Room { action: RoomAction::Join { room, user } } => {
            let store = open_store(&cli.database).await?;
            let added = store.add_member(&RoomId::from(room), &UserId::from(user)).await?;
            println!("{}", if added { "joined" } else { "already a member" });
            Ok(())
        }
        Commands::Rooms { server, user, create, join } => {
            let api = ApiClient::new(&server, user.into())?;
            if let Some(name) = create {
                let room = api.create_room(&name).await?;
                println!("created {}", room.id);
            }
            if let Some(room) = join {
                let room = api.join_room(&RoomId::from(room)).await?;
                println!("joined {}", room.id);
            }
            for room in api.rooms().await? {
                println!("{}\t{}", room.id, room.name);
            }
            Ok(())
        }
        Commands::Chat { server, user, room } => {
            chat(SessionConfig {
                server,
                user: user.into(),
                room: room.into(),
            })
            .await
        }
    }
}

async fn open_store(config: &DatabaseConfig) -> anyhow::Result<Store> {
    let store = Store::connect(&config.database_url).await?;
    store.migrate().await?;
    info!(database_url = %config.database_url, "database ready");
    Ok(store)
}

async fn chat(config: SessionConfig) -> anyhow::Result<()> {
    let session = ChatSession::open(config).await?;
    let (history, mut live) = session.follow().await;
    let mut state = session.state_changes();

    for message in history {
        println!("[{}] {}", message.user_id, message.content);
    }
    println!("-- connected to {} as {} --", session.room(), session.user());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                if let Err(err) = session.send(&line).await {
                    eprintln!("not sent: {err}");
                }
            }
            message = live.recv() => {
                match message {
                    Ok(message) => println!("[{}] {}", message.user_id, message.content),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        eprintln!("-- {skipped} messages skipped --");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == ConnectionState::Disconnected {
                    println!("-- disconnected --");
                    break;
                }
            }
        }
    }

    if session.is_connected() {
        session.close().await?;
    }
    Ok(())
}

use clap::Parser;
use rand::Rng;
use snake_shared::{
    decode_snapshot, encode_command, Command, Heading, PlayerId, SessionState, DEFAULT_PORT,
    SNAPSHOT_SIZE,
};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Headless client that plays a few ticks and quits
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value_t = format!("127.0.0.1:{}", DEFAULT_PORT))]
    server: String,
    /// Durable player id (random when omitted)
    #[clap(short = 'i', long)]
    player_id: Option<PlayerId>,
    /// Join this session instead of creating one
    #[clap(short, long)]
    join: Option<i32>,
    /// Snapshots to receive before quitting
    #[clap(short, long, default_value = "20")]
    ticks: u32,
}

const TURNS: [Heading; 4] = [Heading::Up, Heading::Left, Heading::Down, Heading::Right];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let player_id = args
        .player_id
        .unwrap_or_else(|| rand::thread_rng().gen_range(1..100_000));

    let mut stream = TcpStream::connect(&args.server).await?;
    println!("Connected to {} as player {}", args.server, player_id);

    let hello = match args.join {
        Some(session) => Command::join(player_id, session),
        None => Command::create(player_id),
    };
    stream.write_all(&encode_command(&hello)?).await?;

    let mut buf = vec![0u8; SNAPSHOT_SIZE];
    let mut session_id = None;

    for tick in 0..args.ticks {
        match timeout(Duration::from_secs(5), stream.read_exact(&mut buf)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                println!("Connection closed: {}", e);
                return Ok(());
            }
            Err(_) => {
                println!("No snapshot within 5s, giving up");
                break;
            }
        }

        let state = decode_snapshot(&buf)?;
        if state.is_rejection() {
            println!("Server rejected the request");
            return Ok(());
        }
        session_id = Some(state.session_id);
        print_summary(&state, player_id);

        if !state.running {
            println!("Session {} ended", state.session_id);
            return Ok(());
        }

        // Turn every fourth tick, tracing a square.
        if tick % 4 == 3 {
            let heading = TURNS[(tick / 4) as usize % TURNS.len()];
            let steer = Command::steer(player_id, state.session_id, heading);
            stream.write_all(&encode_command(&steer)?).await?;
        }
    }

    if let Some(session_id) = session_id {
        stream
            .write_all(&encode_command(&Command::quit(player_id, session_id))?)
            .await?;
        println!("Sent quit for session {}", session_id);
    }

    println!("Test client finished");
    Ok(())
}

fn print_summary(state: &SessionState, player_id: PlayerId) {
    let me = state
        .find_player(player_id)
        .map(|i| &state.slots[i])
        .map(|s| {
            format!(
                "head={:?} len={} score={} {}{}",
                s.head(),
                s.length,
                s.score,
                if s.alive { "alive" } else { "dead" },
                if s.paused { " paused" } else { "" }
            )
        })
        .unwrap_or_else(|| "not in session".to_string());

    println!(
        "session {} t={}s players={} food={} | {}",
        state.session_id, state.elapsed_secs, state.player_count, state.food_count, me
    );
}

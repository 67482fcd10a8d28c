use std::cell::RefCell;
use std::io::{self, BufRead, Write as _};
use std::rc::Rc;
use std::thread;

use futures::channel::mpsc;
use futures::StreamExt;
use log::{info, warn};
use uuid::Uuid;

use chess_web_client::client::ChessClient;
use chess_web_client::game::local::LocalBoard;
use chess_web_client::game::rules::AdvisoryStatus;
use chess_web_client::game::session::SessionState;
use chess_web_client::matchmaking::PlayerProfile;
use chess_web_client::models::session::PromotionPiece;
use chess_web_client::websocket::{transport_slot, ClientWebSocket, WsTransport};

const DEFAULT_URL: &str = "http://127.0.0.1:8080/ws";

#[actix_rt::main]
async fn main() -> io::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--local") {
        return run_local();
    }

    let url = args
        .first()
        .cloned()
        .unwrap_or_else(|| DEFAULT_URL.to_string());
    let display_name = args
        .get(1)
        .cloned()
        .unwrap_or_else(|| format!("guest-{}", &Uuid::new_v4().to_string()[..8]));

    info!("connecting to {} as {}", url, display_name);

    let slot = transport_slot();
    let core = Rc::new(RefCell::new(ChessClient::new(
        Box::new(WsTransport::new(slot.clone())),
        PlayerProfile::guest(display_name),
    )));

    // Blocking stdin reads live on their own thread; lines arrive as an
    // async stream on the arbiter.
    let (line_tx, mut lines) = mpsc::unbounded::<String>();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if line_tx.unbounded_send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    print_help();

    loop {
        match awc::Client::new().ws(url.as_str()).connect().await {
            Ok((_response, framed)) => {
                let (addr, mut closed) = ClientWebSocket::start(core.clone(), framed);
                *slot.borrow_mut() = Some(addr);
                if let Err(e) = core.borrow_mut().connect() {
                    warn!("connection bookkeeping failed: {}", e);
                }
                render(&core);

                // Pump commands until the socket drops.
                loop {
                    futures::select! {
                        _ = closed => break,
                        line = lines.next() => match line {
                            Some(line) => {
                                if !dispatch(&core, line.trim()) {
                                    return Ok(());
                                }
                            }
                            None => return Ok(()),
                        },
                    }
                }
                slot.borrow_mut().take();
                core.borrow_mut().on_transport_lost();
            }
            Err(e) => {
                warn!("connect to {} failed: {}", url, e);
                core.borrow_mut().on_transport_lost();
            }
        }

        match core.borrow_mut().next_retry_delay() {
            Some(delay) => {
                info!("retrying in {:?}", delay);
                actix_rt::time::sleep(delay).await;
            }
            None => {
                warn!("giving up after repeated connection failures");
                return Ok(());
            }
        }
    }
}

/// Apply one user command to the client. Returns false to quit.
fn dispatch(core: &Rc<RefCell<ChessClient>>, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or("");
    let mut client = core.borrow_mut();

    match command {
        "" => {}
        "help" => print_help(),
        "seek" => {
            if let Err(e) = client.find_opponent() {
                println!("cannot search: {}", e);
            }
        }
        "cancel" => {
            if let Err(e) = client.cancel_search() {
                println!("cannot cancel: {}", e);
            }
        }
        "move" => {
            let from = parts.next().unwrap_or("");
            let to = parts.next().unwrap_or("");
            let promotion = parts.next().and_then(|p| p.parse::<PromotionPiece>().ok());
            if from.is_empty() || to.is_empty() {
                println!("usage: move <from> <to> [q|r|b|n]");
            } else if let Err(e) = client.submit_move(from, to, promotion) {
                println!("move refused: {}", e);
            }
        }
        "hints" => match parts.next() {
            Some(square) => match client.move_hints(square) {
                Ok(hints) if hints.is_empty() => println!("no legal moves from {}", square),
                Ok(hints) => println!("{} can reach: {}", square, hints.join(" ")),
                Err(e) => println!("no hints: {}", e),
            },
            None => println!("usage: hints <square>"),
        },
        "chat" => {
            let text = line.strip_prefix("chat").unwrap_or("").trim();
            if let Err(e) = client.send_chat(text) {
                println!("cannot chat: {}", e);
            }
        }
        "resign" => {
            if let Err(e) = client.resign() {
                println!("cannot resign: {}", e);
            }
        }
        "new" => {
            if !client.start_new_session() {
                println!("finish the current game first");
            }
        }
        "show" => {}
        "quit" | "exit" => return false,
        other => println!("unknown command: {} (try help)", other),
    }

    drop(client);
    render(core);
    true
}

fn render(core: &Rc<RefCell<ChessClient>>) {
    let mut client = core.borrow_mut();
    client.notice_board().sweep();

    println!("----");
    println!(
        "connection: {:?} | matchmaking: {:?}",
        client.connection_status(),
        client.matchmaking_state()
    );

    match client.session_state() {
        SessionState::NoSession => println!("no session (seek to find an opponent)"),
        SessionState::WaitingForOpponent => println!("searching for an opponent..."),
        SessionState::Active(active) => {
            let position = active.displayed_position();
            println!(
                "session {} vs {} (you are {})",
                active.session.id,
                active.session.opponent().display_name,
                active.session.my_color
            );
            println!("position: {}", position.token());
            println!(
                "turn: {}{}",
                position.side_to_move(),
                if active.is_my_turn() { " (you)" } else { "" }
            );
            if !active.opponent_present() {
                println!("opponent disconnected, session paused");
            }
        }
        SessionState::Terminated(finished) => {
            println!("game over: {}", finished.result.summary());
            if let Some(position) = &finished.position {
                println!("final position: {}", position.token());
            }
        }
    }

    let history = client.move_history();
    if !history.is_empty() {
        let moves: Vec<&str> = history.iter().map(|m| m.notation.as_str()).collect();
        println!("moves: {}", moves.join(" "));
    }
    for message in client.chat_log().iter().rev().take(3).rev() {
        println!("[chat] {}: {}", message.sender, message.text);
    }
    for text in client.notice_board().texts() {
        println!("! {}", text);
    }
    let _ = io::stdout().flush();
}

/// Hot-seat game against the local rules engine only, no server.
fn run_local() -> io::Result<()> {
    let mut board = LocalBoard::new();
    println!("local game: move <from> <to> [q|r|b|n], undo, reset, quit");

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        match parts.next().unwrap_or("") {
            "" => {}
            "move" => {
                let from = parts.next().unwrap_or("");
                let to = parts.next().unwrap_or("");
                let promotion = parts.next().and_then(|p| p.parse::<PromotionPiece>().ok());
                if let Err(e) = board.play(from, to, promotion) {
                    println!("move refused: {}", e);
                }
            }
            "undo" => {
                if !board.undo() {
                    println!("nothing to undo");
                }
            }
            "reset" => board.reset(),
            "quit" | "exit" => return Ok(()),
            other => println!("unknown command: {}", other),
        }

        println!("position: {}", board.position().token());
        println!("turn: {}", board.position().side_to_move());
        match board.status() {
            AdvisoryStatus::Check => println!("check"),
            AdvisoryStatus::Checkmate => {
                println!("checkmate, {} wins", board.position().side_to_move().opponent());
            }
            AdvisoryStatus::Stalemate => println!("stalemate"),
            AdvisoryStatus::InProgress => {}
        }
    }
    Ok(())
}

fn print_help() {
    println!("commands:");
    println!("  seek                 find an opponent");
    println!("  cancel               cancel the search");
    println!("  move <from> <to>     submit a move (add q|r|b|n to promote)");
    println!("  hints <square>       show legal destinations");
    println!("  chat <text>          message your opponent");
    println!("  resign               resign the game");
    println!("  new                  leave a finished game");
    println!("  show                 redraw the current state");
    println!("  quit                 exit");
}

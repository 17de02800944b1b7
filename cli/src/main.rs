//! agoraindex CLI — inspect indexer state.
//!
//! Usage:
//! ```bash
//! agoraindex status --db ./agora.db
//! agoraindex tally --db ./agora.db --proposal 42
//! agoraindex info
//! ```

use std::env;
use std::process;

use agoraindex_core::events::ParentId;
use agoraindex_core::store::Store;
use agoraindex_storage::SqliteStore;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    match args[1].as_str() {
        "info" => cmd_info(),
        "status" => cmd_status(&args[2..]),
        "tally" => cmd_tally(&args[2..]),
        "version" | "--version" | "-V" => {
            println!("agoraindex {}", env!("CARGO_PKG_VERSION"));
        }
        "help" | "--help" | "-h" => print_usage(),
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    }
}

fn print_usage() {
    println!("agoraindex {}", env!("CARGO_PKG_VERSION"));
    println!("Reorg-safe event indexer for the Agora governance and market contracts\n");
    println!("USAGE:");
    println!("    agoraindex <COMMAND>\n");
    println!("COMMANDS:");
    println!("    status --db <path>                      Show the persisted checkpoint");
    println!("    tally  --db <path> --proposal <id>      Show a proposal's vote tally");
    println!("    info                                    Show configuration defaults");
    println!("    version                                 Print version");
    println!("    help                                    Print this help");
}

fn cmd_info() {
    println!("agoraindex v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default confirmation depth: 64 blocks");
    println!("  Default batch size: 500 blocks/call");
    println!("  Default poll interval: 2000 ms");
    println!("  Contracts: governance, forum, prediction market");
    println!("  Storage backends: memory, SQLite (feature: sqlite)");
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn open_store(args: &[String]) -> SqliteStore {
    let Some(db) = flag_value(args, "--db") else {
        eprintln!("Missing --db <path>");
        process::exit(1);
    };
    block_on(SqliteStore::open(db)).unwrap_or_else(|e| {
        eprintln!("Cannot open {db}: {e}");
        process::exit(1);
    })
}

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
        .block_on(fut)
}

fn cmd_status(args: &[String]) {
    let store = open_store(args);
    match block_on(store.checkpoint()) {
        Ok(Some(cp)) => {
            println!("last indexed block: {}", cp.last_indexed_block);
            println!("last indexed hash:  {}", cp.last_indexed_hash);
            match cp.chain_head_block {
                Some(head) => println!("chain head (at write): {head}"),
                None => println!("chain head (at write): unknown"),
            }
            let when = chrono::DateTime::from_timestamp(cp.updated_at, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| cp.updated_at.to_string());
            println!("updated at: {when}");
        }
        Ok(None) => println!("no checkpoint — indexer has not committed a batch yet"),
        Err(e) => {
            eprintln!("Failed to read checkpoint: {e}");
            process::exit(1);
        }
    }
}

fn cmd_tally(args: &[String]) {
    let Some(id) = flag_value(args, "--proposal").and_then(|v| v.parse::<u64>().ok()) else {
        eprintln!("Missing or invalid --proposal <id>");
        process::exit(1);
    };
    let store = open_store(args);
    match block_on(store.aggregate(ParentId::Proposal(id))) {
        Ok(Some(agg)) => {
            println!("{}", serde_json::to_string_pretty(&agg).unwrap());
        }
        Ok(None) => println!("no events recorded for proposal {id}"),
        Err(e) => {
            eprintln!("Failed to read aggregate: {e}");
            process::exit(1);
        }
    }
}

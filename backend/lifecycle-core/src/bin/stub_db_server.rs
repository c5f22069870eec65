//! Minimal stand-in for a database server.
//!
//! Listens on a TCP port and prints an H2-style banner, so the lifecycle can
//! be exercised on machines without a JVM. Connections are accepted and
//! closed immediately.

use std::net::TcpListener;
use std::process::ExitCode;
use std::thread::sleep;
use std::time::Duration;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "stub-db-server", about = "TCP listener that mimics an H2 server banner")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long)]
    port: u16,

    /// Delay before binding the port
    #[arg(long, default_value_t = 0)]
    listen_after_ms: u64,

    /// Print to stderr and exit with this code instead of listening
    #[arg(long)]
    fail_with: Option<u8>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(code) = args.fail_with {
        eprintln!("stub-db-server: refusing to start (exit code {code})");
        return ExitCode::from(code);
    }

    if args.listen_after_ms > 0 {
        sleep(Duration::from_millis(args.listen_after_ms));
    }

    let listener = match TcpListener::bind((args.host.as_str(), args.port)) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("stub-db-server: cannot bind {}:{}: {e}", args.host, args.port);
            return ExitCode::FAILURE;
        }
    };

    println!(
        "TCP server running at tcp://{}:{} (only local connections)",
        args.host, args.port
    );

    for stream in listener.incoming() {
        if let Err(e) = stream {
            eprintln!("stub-db-server: accept failed: {e}");
        }
    }

    ExitCode::SUCCESS
}

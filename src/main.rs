use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use owl_watcher::schedule::ScheduleClient;
use owl_watcher::viewer::BrowserViewer;
use owl_watcher::watcher::{ExitReason, Watcher};

/// Poll the match schedule and keep a browser on the stream while a match is live
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Schedule API endpoint to poll
    api_url: String,

    /// Write each raw payload to owl-schedule.json for diagnostics (true|false)
    #[arg(action = clap::ArgAction::Set)]
    write_raw: bool,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            // Wrong argument count or values: usage message, exit code 1.
            let code = match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            std::process::exit(code);
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst)) {
            println!("{}: {e}", "I couldn't install the Ctrl-C handler".yellow());
        }
    }

    let source = match ScheduleClient::new(&args.api_url, args.write_raw) {
        Ok(source) => source,
        Err(e) => {
            println!("{}: {e}", "I couldn't build the HTTP client".red());
            std::process::exit(1);
        }
    };

    println!(
        "{} {}",
        "I'm going to poll the schedule at".yellow(),
        args.api_url.white()
    );

    let mut watcher = Watcher::new(source, BrowserViewer::new());
    match watcher.run(&shutdown) {
        ExitReason::ScheduleExhausted => {}
        ExitReason::Interrupted => {
            println!("{}", "Interrupted, the viewer has been cleaned up".yellow());
        }
    }
}

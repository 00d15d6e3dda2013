// src/main.rs

use nodeagent::{Exit, cli, daemon, logging, run};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("nodeagent error: {err:?}");
        std::process::exit(1);
    }

    match run(args).await {
        Ok(Exit::Code(code)) => std::process::exit(code),
        Ok(Exit::Restart) => {
            let err = daemon::reexec();
            eprintln!("nodeagent error: could not restart: {err}");
            std::process::exit(1);
        }
        Err(err) if err.is_fatal() => {
            eprintln!("nodeagent fatal error: {err}");
            std::process::exit(err.exit_code());
        }
        Err(err) => {
            eprintln!("nodeagent error: {err}");
            std::process::exit(err.exit_code());
        }
    }
}

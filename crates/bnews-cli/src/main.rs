mod cli;

use bnews_core::SessionError;

fn main() {
    if let Err(e) = cli::run() {
        if matches!(e.downcast_ref::<SessionError>(), Some(SessionError::Cancelled)) {
            std::process::exit(130);
        }
        eprintln!("{e:#}"); // pretty anyhow chain
        std::process::exit(1);
    }
}

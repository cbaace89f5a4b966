//! Session command handlers.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, bail};
use bnews_core::SessionSnapshot;
use bnews_core::config::Config;

use super::{cancel_on_interrupt, open_store, session_manager};

/// Uses the given password or prompts for one on stdin.
fn resolve_password(password: Option<String>) -> Result<String> {
    let password = match password {
        Some(password) => password,
        None => {
            eprint!("Password: ");
            io::stderr().flush()?;
            let mut input = String::new();
            io::stdin()
                .lock()
                .read_line(&mut input)
                .context("read password")?;
            input.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    if password.is_empty() {
        bail!("Password cannot be empty");
    }
    Ok(password)
}

pub async fn login(config: &Config, username: &str, password: Option<String>) -> Result<()> {
    let password = resolve_password(password)?;
    let manager = session_manager(config)?;
    let cancel = cancel_on_interrupt();

    if let Err(err) = manager.log_in_with_cancel(username, &password, &cancel).await {
        if err.is_user_not_found() {
            eprintln!("No account named '{username}'. Create one with `bnews register`.");
        }
        return Err(err).context("Login failed");
    }

    match manager.nickname() {
        Some(nickname) => println!("Logged in as {username} ({nickname})"),
        None => println!("Logged in as {username}"),
    }
    Ok(())
}

pub async fn register(
    config: &Config,
    nickname: &str,
    username: &str,
    password: Option<String>,
) -> Result<()> {
    if nickname.trim().is_empty() {
        bail!("Nickname cannot be empty");
    }
    let password = resolve_password(password)?;
    let manager = session_manager(config)?;
    let cancel = cancel_on_interrupt();

    manager
        .register_with_cancel(nickname, username, &password, &cancel)
        .await
        .context("Registration failed")?;

    println!("Registered {username} ({nickname})");
    Ok(())
}

pub async fn logout(config: &Config) -> Result<()> {
    let manager = session_manager(config)?;
    let was_authorized = manager.is_authorized();
    manager.log_out().await;

    if was_authorized {
        println!("Logged out");
    } else {
        println!("Not logged in; cleared any stored credentials");
    }
    Ok(())
}

pub async fn refresh(config: &Config) -> Result<()> {
    let manager = session_manager(config)?;
    let cancel = cancel_on_interrupt();

    manager
        .refresh_session_with_cancel(&cancel)
        .await
        .context("Session refresh failed; log in again")?;

    println!("Session refreshed");
    Ok(())
}

pub fn status(json: bool) -> Result<()> {
    let snapshot = SessionSnapshot::read(open_store().as_ref());

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    match (snapshot.authorized, &snapshot.username, &snapshot.nickname) {
        (false, _, _) => println!("Not logged in"),
        (true, Some(username), Some(nickname)) => {
            println!("Logged in as {username} ({nickname})");
        }
        (true, Some(username), None) => println!("Logged in as {username}"),
        (true, None, _) => println!("Logged in"),
    }
    Ok(())
}

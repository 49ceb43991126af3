//! One-time interactive login that creates the lookup session file.

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context};
use grammers_client::{Client, Config, InitParams, SignInError};
use grammers_session::Session;
use tracing::info;

use lcb_core::config::MtprotoSettings;

fn prompt(message: &str) -> anyhow::Result<String> {
    let mut stdout = io::stdout();
    stdout.write_all(message.as_bytes())?;
    stdout.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lcb_core::logging::init("lcb-login")?;

    let settings = MtprotoSettings::load()?;
    if let Some(dir) = settings.session_file.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
    }

    let session = Session::load_file_or_create(&settings.session_file)
        .with_context(|| format!("failed to open {}", settings.session_file.display()))?;
    let client = Client::connect(Config {
        session,
        api_id: settings.api_id,
        api_hash: settings.api_hash.clone(),
        params: InitParams::default(),
    })
    .await
    .context("failed to connect to Telegram")?;

    if client.is_authorized().await? {
        println!(
            "Session {} is already logged in.",
            settings.session_file.display()
        );
        return Ok(());
    }

    let phone = prompt("Phone number (international format): ")?;
    if phone.is_empty() {
        bail!("a phone number is required");
    }
    let token = client.request_login_code(&phone).await?;
    let code = prompt("Login code: ")?;

    let user = match client.sign_in(&token, &code).await {
        Ok(user) => user,
        Err(SignInError::PasswordRequired(password_token)) => {
            let hint = password_token.hint().unwrap_or("none").to_string();
            let password = prompt(&format!("Two-step verification password (hint: {hint}): "))?;
            client
                .check_password(password_token, password.trim())
                .await
                .context("password check failed")?
        }
        Err(e) => bail!("sign-in failed: {e}"),
    };

    client
        .session()
        .save_to_file(&settings.session_file)
        .with_context(|| format!("failed to save {}", settings.session_file.display()))?;

    info!(user_id = user.id(), "logged in");
    println!(
        "Logged in. Session saved to {}.",
        settings.session_file.display()
    );
    Ok(())
}

use super::{App, ui};
use anyhow::{Context, Result, bail};

/// Environment variable read when `--password` is not given.
pub const PASSWORD_ENV: &str = "FINBOARD_PASSWORD";

fn resolve_password(password: Option<String>) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    let term = console::Term::stderr();
    if !term.is_term() {
        bail!("No password given. Pass --password or set {PASSWORD_ENV}");
    }
    term.write_str("Password: ")?;
    term.read_secure_line().context("Failed to read password")
}

pub async fn login(app: &mut App, email: &str, password: Option<String>) -> Result<()> {
    let password = resolve_password(password)?;
    let session = app
        .session
        .sign_in(app.auth.as_ref(), email, &password)
        .await?;
    println!(
        "Signed in as {}",
        ui::style_text(
            session.email.as_deref().unwrap_or(&session.user_id),
            ui::StyleType::TotalLabel
        )
    );
    Ok(())
}

pub async fn logout(app: &mut App) -> Result<()> {
    if app.session.current().is_none() {
        println!("Not signed in");
        return Ok(());
    }
    app.session.sign_out(app.auth.as_ref()).await?;
    println!("Signed out");
    Ok(())
}

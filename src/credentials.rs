//! Credential resolution: OS keyring first, config-file fallback.
//!
//! The password is resolved once at startup and held for the process
//! lifetime; the sync core only ever sees the final [`Credentials`] value.

use anyhow::{bail, Context, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::Password;

use crate::config::Settings;

/// Keyring service name under which passwords are stored.
const KEYRING_SERVICE: &str = "studsync";

/// Basic-auth credentials for the remote API.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Resolve credentials for the configured user.
///
/// With `use_keyring` on, the password comes from the OS keyring; if no
/// entry exists yet the user is prompted once and the entry is stored.
/// With `use_keyring` off, the `password` config field is used verbatim.
pub fn resolve(settings: &Settings) -> Result<Credentials> {
    if settings.username.is_empty() {
        bail!("no username configured; set `username` in the config file");
    }

    let password = if settings.use_keyring {
        let entry = keyring::Entry::new(KEYRING_SERVICE, &settings.username)
            .context("failed to open the OS keyring")?;
        match entry.get_password() {
            Ok(password) => password,
            Err(keyring::Error::NoEntry) => {
                let password = prompt(&settings.username)?;
                entry
                    .set_password(&password)
                    .context("failed to store the password in the keyring")?;
                password
            }
            Err(err) => return Err(err).context("failed to read the password from the keyring"),
        }
    } else {
        match &settings.password {
            Some(password) if !password.is_empty() => password.clone(),
            _ => bail!("`use_keyring` is off but no `password` is set in the config file"),
        }
    };

    Ok(Credentials {
        username: settings.username.clone(),
        password,
    })
}

/// Prompt for a new password and replace the keyring entry.
pub fn reset_password(username: &str) -> Result<()> {
    if username.is_empty() {
        bail!("no username configured; set `username` in the config file");
    }
    let entry = keyring::Entry::new(KEYRING_SERVICE, username)
        .context("failed to open the OS keyring")?;
    let password = prompt(username)?;
    entry
        .set_password(&password)
        .context("failed to store the password in the keyring")?;
    tracing::info!(username, "keyring password updated");
    Ok(())
}

fn prompt(username: &str) -> Result<String> {
    Password::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Password for {username}"))
        .interact()
        .context("failed to read the password from the terminal")
}

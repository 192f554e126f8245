//! Command-line parsing
//!
//! `session-cli [--config PATH] <login EMAIL | whoami | request METHOD PATH [JSON] | logout>`

use anyhow::{Context, Result, bail};
use reqwest::Method;

pub const USAGE: &str =
    "usage: session-cli [--config PATH] <login EMAIL | whoami | request METHOD PATH [JSON] | logout>";

/// What the user asked for.
#[derive(Debug, PartialEq)]
pub enum Command {
    Login {
        email: String,
    },
    Whoami,
    Request {
        method: Method,
        path: String,
        body: Option<serde_json::Value>,
    },
    Logout,
}

#[derive(Debug, PartialEq)]
pub struct Cli {
    pub config_path: Option<String>,
    pub command: Command,
}

impl Cli {
    /// Parse arguments, excluding the program name.
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config_path = None;
        let mut positional = Vec::new();

        let mut args = args.into_iter().map(Into::into);
        while let Some(arg) = args.next() {
            if arg == "--config" {
                config_path = Some(args.next().context("--config needs a path")?);
            } else if let Some(path) = arg.strip_prefix("--config=") {
                config_path = Some(path.to_string());
            } else {
                positional.push(arg);
            }
        }

        let command = match positional.as_slice() {
            [cmd, email] if cmd == "login" => Command::Login {
                email: email.clone(),
            },
            [cmd] if cmd == "whoami" => Command::Whoami,
            [cmd] if cmd == "logout" => Command::Logout,
            [cmd, method, path, rest @ ..] if cmd == "request" && rest.len() <= 1 => {
                let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                    .with_context(|| format!("invalid HTTP method: {method}"))?;
                let body = rest
                    .first()
                    .map(|raw| serde_json::from_str(raw))
                    .transpose()
                    .context("request body must be valid JSON")?;
                Command::Request {
                    method,
                    path: path.clone(),
                    body,
                }
            }
            _ => bail!("{USAGE}"),
        };

        Ok(Self {
            config_path,
            command,
        })
    }
}

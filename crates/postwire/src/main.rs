//! `postwire` - send transactional mail from the shell.
//!
//! Settings come from the `SMTP_*` / `MAIL_*` environment variables or from
//! a JSON file passed with `--config`. The exit status is non-zero when the
//! server did not accept the message.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use postwire_core::{Mailer, MailerSettings, OutgoingEmail, Outcome};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Send transactional mail over SMTP
#[derive(Parser, Debug)]
#[command(name = "postwire")]
#[command(version, about)]
struct Cli {
    /// JSON settings file (defaults to the environment)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Continue without encryption when STARTTLS is unavailable
    #[arg(long, global = true)]
    allow_insecure_fallback: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a message
    Send {
        /// Recipient (repeat for several)
        #[arg(short, long, required = true)]
        to: Vec<String>,

        /// Subject line
        #[arg(short, long)]
        subject: String,

        /// HTML body
        #[arg(long, required_unless_present = "text")]
        html: Option<String>,

        /// Plain text body
        #[arg(long)]
        text: Option<String>,

        /// Reply-To address
        #[arg(long)]
        reply_to: Option<String>,
    },
    /// Send a verification code
    Otp {
        /// Recipient
        #[arg(short, long)]
        to: String,

        /// The code
        #[arg(long)]
        code: String,
    },
}

fn load_settings(cli: &Cli) -> Result<MailerSettings> {
    let mut settings = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            MailerSettings::from_json(&json)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => MailerSettings::from_env().context("reading settings from the environment")?,
    };
    if cli.allow_insecure_fallback {
        settings.allow_insecure_fallback = true;
    }
    Ok(settings)
}

fn report(outcome: &Outcome) -> Result<()> {
    if outcome.is_success() {
        println!("{outcome}");
        return Ok(());
    }
    let retry = if outcome.is_transient() {
        " (temporary, retry later)"
    } else {
        ""
    };
    bail!("{outcome}{retry}")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "postwire=info,postwire_core=info,postwire_smtp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    let mailer = Mailer::from_settings(&settings).context("invalid mail settings")?;
    info!(host = %settings.host, sender = %mailer.sender(), "mailer ready");

    let outcome = match cli.command {
        Command::Send {
            to,
            subject,
            html,
            text,
            reply_to,
        } => {
            let mut recipients = to.into_iter();
            let first = recipients.next().context("at least one --to is required")?;
            let mut email = OutgoingEmail::new(first, subject);
            for recipient in recipients {
                email = email.to(recipient);
            }
            email.html = html;
            email.text = text;
            email.reply_to = reply_to;
            mailer.send(email).await?
        }
        Command::Otp { to, code } => mailer.send_otp(&to, &code).await?,
    };

    report(&outcome)
}

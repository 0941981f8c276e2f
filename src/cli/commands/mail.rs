use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use url::Url;

pub const ARG_MAIL_FROM: &str = "mail-from";
pub const ARG_MAIL_WEBHOOK_URL: &str = "mail-webhook-url";

#[derive(Debug)]
pub struct Options {
    pub from: String,
    pub webhook_url: Option<Url>,
}

impl Options {
    /// # Errors
    /// Returns an error if the webhook URL is not a valid URL.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let from = matches
            .get_one::<String>(ARG_MAIL_FROM)
            .cloned()
            .context("missing required argument: --mail-from")?;

        let webhook_url = matches
            .get_one::<String>(ARG_MAIL_WEBHOOK_URL)
            .map(|url| Url::parse(url).with_context(|| format!("invalid --mail-webhook-url: {url}")))
            .transpose()?;

        Ok(Self { from, webhook_url })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAIL_FROM)
                .long(ARG_MAIL_FROM)
                .help("Sender address of outgoing mail")
                .env("SESAME_MAIL_FROM")
                .default_value("no-reply@localhost"),
        )
        .arg(
            Arg::new(ARG_MAIL_WEBHOOK_URL)
                .long(ARG_MAIL_WEBHOOK_URL)
                .help("HTTP endpoint receiving outgoing mail as JSON; mail is only logged when unset")
                .env("SESAME_MAIL_WEBHOOK_URL"),
        )
}

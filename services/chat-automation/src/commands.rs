//! Command dispatch table
//!
//! Maps operator command names (and their single-letter aliases) to
//! scheduler operations. Front ends such as the control API only translate
//! their input into a command name and call `dispatch`.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use session_engine::SweepReport;
use tracing::info;

use crate::error::{Error, Result};
use crate::scheduler::{AutomationStatus, Scheduler};

/// What a command reports back.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CommandOutput {
    Status(AutomationStatus),
    Verified(SweepReport),
}

pub type CommandFuture<'a> = Pin<Box<dyn Future<Output = Result<CommandOutput>> + Send + 'a>>;

pub struct Command {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub description: &'static str,
    handler: fn(&Scheduler) -> CommandFuture<'_>,
}

pub const COMMANDS: &[Command] = &[
    Command {
        name: "start",
        aliases: &["s"],
        description: "log in and start sending messages",
        handler: start,
    },
    Command {
        name: "pause",
        aliases: &["p"],
        description: "stop sending after the current message",
        handler: pause,
    },
    Command {
        name: "resume",
        aliases: &["r"],
        description: "log in again and continue sending",
        handler: resume,
    },
    Command {
        name: "switch",
        aliases: &[],
        description: "rotate to the next account now",
        handler: switch,
    },
    Command {
        name: "status",
        aliases: &[],
        description: "report automation state and account snapshot",
        handler: status,
    },
    Command {
        name: "verify",
        aliases: &[],
        description: "probe all session tokens and drop invalid ones",
        handler: verify,
    },
];

/// Find a command by name or alias, ignoring case.
pub fn lookup(name: &str) -> Option<&'static Command> {
    COMMANDS.iter().find(|c| {
        c.name.eq_ignore_ascii_case(name) || c.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    })
}

/// Run the command named `name` against `scheduler`.
pub async fn dispatch(scheduler: &Scheduler, name: &str) -> Result<CommandOutput> {
    let command = lookup(name).ok_or_else(|| Error::UnknownCommand(name.to_string()))?;
    info!(command = command.name, "dispatching command");
    (command.handler)(scheduler).await
}

fn start(scheduler: &Scheduler) -> CommandFuture<'_> {
    Box::pin(async move {
        scheduler.start().await?;
        Ok(CommandOutput::Status(scheduler.status().await))
    })
}

fn pause(scheduler: &Scheduler) -> CommandFuture<'_> {
    Box::pin(async move {
        scheduler.pause()?;
        Ok(CommandOutput::Status(scheduler.status().await))
    })
}

fn resume(scheduler: &Scheduler) -> CommandFuture<'_> {
    Box::pin(async move {
        scheduler.resume().await?;
        Ok(CommandOutput::Status(scheduler.status().await))
    })
}

fn switch(scheduler: &Scheduler) -> CommandFuture<'_> {
    Box::pin(async move {
        scheduler.switch_account().await?;
        Ok(CommandOutput::Status(scheduler.status().await))
    })
}

fn status(scheduler: &Scheduler) -> CommandFuture<'_> {
    Box::pin(async move { Ok(CommandOutput::Status(scheduler.status().await)) })
}

fn verify(scheduler: &Scheduler) -> CommandFuture<'_> {
    Box::pin(async move { Ok(CommandOutput::Verified(scheduler.verify_tokens().await?)) })
}

//! Text commands addressed to the bot, either as `@botname command args` or
//! Telegram style `/command@botname args`.

use crate::errors::CommandError;
use crate::models::{destination::DestinationSettings, event::Event, event::SourceType};
use crate::store::{DedupStore, DestinationStore};
use crate::transport::{ChatTransport, Identity, IncomingMessage};
use std::sync::Arc;

const HELP: &str = "Commands:\n\
    help - this message\n\
    adminHelp - settings commands for chat admins\n\
    blog - latest blog post\n\
    patch - latest patch digest";

const ADMIN_HELP: &str = "Admin commands:\n\
    setPostUpdates <on|off> - post new updates here\n\
    setChannel <name|default> - post updates to another channel\n\
    setCallEveryone <on|off> - mention everyone on new updates\n\
    setDetailedPatch <on|off> - detailed patch notes (not used yet)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    AdminHelp,
    Blog,
    Patch,
    SetPostUpdates(bool),
    /// None resets to the chat itself
    SetChannel(Option<String>),
    SetCallEveryone(bool),
    SetDetailedPatch(bool),
    Unknown(String),
}

impl Command {
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            Command::SetPostUpdates(_)
                | Command::SetChannel(_)
                | Command::SetCallEveryone(_)
                | Command::SetDetailedPatch(_)
        )
    }
}

/// Parse `text` if it is addressed to `bot_username`. `None` when it isn't a
/// command for us at all.
pub fn parse(text: &str, bot_username: &str) -> Option<Result<Command, CommandError>> {
    let text = text.trim();
    let mention = format!("@{bot_username}");

    let body = if let Some(rest) = strip_prefix_ignore_case(text, &mention) {
        // "@botname" must be followed by whitespace or nothing
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return None;
        }
        rest.trim_start()
    } else if let Some(rest) = text.strip_prefix('/') {
        rest
    } else {
        return None;
    };

    let mut words = body.split_whitespace();
    let word = words.next()?;
    let name = match word.split_once('@') {
        Some((name, target)) if target.eq_ignore_ascii_case(bot_username) => name,
        Some(_) => return None,
        None => word,
    };
    let args: Vec<&str> = words.collect();

    Some(command_from(name, &args))
}

fn command_from(name: &str, args: &[&str]) -> Result<Command, CommandError> {
    let command = match name.to_ascii_lowercase().as_str() {
        "help" | "start" => Command::Help,
        "adminhelp" => Command::AdminHelp,
        "blog" => Command::Blog,
        "patch" => Command::Patch,
        "setpostupdates" => {
            Command::SetPostUpdates(toggle(args, "setPostUpdates <on|off>")?)
        }
        "setchannel" => {
            if args.is_empty() {
                return Err(CommandError::Usage("setChannel <name|default>"));
            }
            let name = args.join(" ");
            if name.eq_ignore_ascii_case("default") {
                Command::SetChannel(None)
            } else {
                Command::SetChannel(Some(name))
            }
        }
        "setcalleveryone" => {
            Command::SetCallEveryone(toggle(args, "setCallEveryone <on|off>")?)
        }
        "setdetailedpatch" => {
            Command::SetDetailedPatch(toggle(args, "setDetailedPatch <on|off>")?)
        }
        _ => Command::Unknown(name.to_string()),
    };
    Ok(command)
}

fn toggle(args: &[&str], usage: &'static str) -> Result<bool, CommandError> {
    match args {
        [value] => match value.to_ascii_lowercase().as_str() {
            "on" | "true" | "yes" | "1" => Ok(true),
            "off" | "false" | "no" | "0" => Ok(false),
            _ => Err(CommandError::Usage(usage)),
        },
        _ => Err(CommandError::Usage(usage)),
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

/// Executes commands against the settings and feeder stores.
pub struct CommandHandler {
    transport: Arc<dyn ChatTransport>,
    destinations: Arc<DestinationStore>,
    feeder: Arc<DedupStore>,
}

impl CommandHandler {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        destinations: Arc<DestinationStore>,
        feeder: Arc<DedupStore>,
    ) -> Self {
        Self {
            transport,
            destinations,
            feeder,
        }
    }

    /// The reply for `msg`, or `None` if it wasn't a command for us.
    pub async fn handle(&self, me: &Identity, msg: &IncomingMessage) -> Option<String> {
        let reply = match parse(&msg.text, &me.username)? {
            Ok(command) => {
                log::info!(
                    "Command {command:?} from {}@{}",
                    msg.author_name,
                    msg.destination.id
                );
                self.execute(command, msg).await
            }
            Err(e) => Err(e),
        };
        Some(reply.unwrap_or_else(|e| e.to_string()))
    }

    async fn execute(&self, command: Command, msg: &IncomingMessage) -> Result<String, CommandError> {
        if command.requires_admin() {
            self.ensure_admin(msg).await?;
        }

        match command {
            Command::Help => Ok(HELP.to_string()),
            Command::AdminHelp => Ok(ADMIN_HELP.to_string()),
            Command::Blog => Ok(self.latest(SourceType::Blogpost, "blog post").await),
            Command::Patch => Ok(self.latest(SourceType::RedditDigest, "patch digest").await),
            Command::SetPostUpdates(on) => {
                self.update(msg, |s| s.post_updates = on).await;
                Ok(format!("Posting updates is now {}", on_off(on)))
            }
            Command::SetChannel(None) => {
                self.update(msg, |s| s.target_channel = None).await;
                Ok("Updates will be posted here".to_string())
            }
            Command::SetChannel(Some(name)) => {
                let channel = self
                    .transport
                    .resolve_channel(&name)
                    .await
                    .map_err(|e| {
                        log::warn!("Failed to resolve channel {name}: {e}");
                        CommandError::Unavailable
                    })?
                    .ok_or_else(|| CommandError::UnknownChannel(name.clone()))?;
                self.update(msg, |s| s.target_channel = Some(channel)).await;
                Ok(format!("Updates will be posted to {name}"))
            }
            Command::SetCallEveryone(on) => {
                self.update(msg, |s| s.call_everyone = on).await;
                Ok(format!("Mentioning everyone is now {}", on_off(on)))
            }
            Command::SetDetailedPatch(on) => {
                self.update(msg, |s| s.detailed_patch = on).await;
                Ok(format!("Detailed patch notes are now {}", on_off(on)))
            }
            Command::Unknown(name) => Ok(format!("Unknown command '{name}', try help")),
        }
    }

    async fn ensure_admin(&self, msg: &IncomingMessage) -> Result<(), CommandError> {
        match self.transport.is_admin(&msg.destination, &msg.author_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(CommandError::NotAdmin),
            Err(e) => {
                log::warn!("Admin check for {} failed: {e}", msg.author_id);
                Err(CommandError::Unavailable)
            }
        }
    }

    async fn update<F>(&self, msg: &IncomingMessage, change: F)
    where
        F: FnOnce(&mut DestinationSettings),
    {
        // the change stays in memory even if the write fails; the next save retries
        if let Err(e) = self.destinations.update(&msg.destination.id, change).await {
            log::error!("Failed to persist settings for {}: {e}", msg.destination.id);
        }
    }

    async fn latest(&self, source: SourceType, what: &str) -> String {
        match self.feeder.last_emitted(source).await {
            Some(event) => format_latest(&event),
            None => format!("No {what} seen yet"),
        }
    }
}

fn format_latest(event: &Event) -> String {
    format!(
        "{}\n{}\n\n{}",
        event.title(),
        event.link(),
        event.description()
    )
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

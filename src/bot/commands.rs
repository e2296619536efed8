//! Command list and help lookups.
//!
//! Commands are declared with `#[poise::command]` next to their handlers;
//! this module gathers them and answers questions about them for `help`,
//! the error reporter and the blacklist filter.

use poise::Command;

use crate::{
    bot::{misc, moderation, music, roles, BbBot},
    error::BotError,
};

pub const MUSIC: &str = "🎵 Music";
pub const MODERATION: &str = "🛡️ Moderation";
pub const ROLES: &str = "🏷️ Roles";
pub const MISC: &str = "🎲 Misc";

/// Help lists categories in this order.
pub const CATEGORIES: [&str; 4] = [MUSIC, MODERATION, ROLES, MISC];

pub fn all() -> Vec<Command<BbBot, BotError>> {
    vec![
        music::play(),
        music::pause(),
        music::resume(),
        music::skip(),
        music::queue(),
        music::now_playing(),
        music::volume(),
        music::stop(),
        music::connect(),
        moderation::clear(),
        moderation::kick(),
        moderation::ban(),
        moderation::softban(),
        moderation::unban(),
        moderation::mute(),
        moderation::unmute(),
        moderation::blacklist_add(),
        moderation::blacklist_remove(),
        moderation::blacklist_show(),
        moderation::blacklist_clear(),
        roles::add_reaction_role(),
        roles::remove_reaction_role(),
        misc::poll(),
        misc::choose(),
        misc::meme(),
        misc::twitch(),
        misc::youtube(),
        misc::ping(),
        misc::echo(),
        misc::beep(),
        misc::help(),
    ]
}

/// Finds a command by name or alias, ignoring case.
pub fn find<'c, U, E>(commands: &'c [Command<U, E>], name: &str) -> Option<&'c Command<U, E>> {
    commands.iter().find(|command| {
        command.name.eq_ignore_ascii_case(name)
            || command
                .aliases
                .iter()
                .any(|alias| alias.eq_ignore_ascii_case(name))
    })
}

/// `play <query>`-style usage line, without the prefix.
pub fn usage<U, E>(command: &Command<U, E>) -> String {
    let mut usage = command.name.clone();
    for parameter in &command.parameters {
        if parameter.required {
            usage.push_str(&format!(" <{}>", parameter.name));
        } else {
            usage.push_str(&format!(" [{}]", parameter.name));
        }
    }
    usage
}

/// What `help` shows about one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandHelp {
    pub name: String,
    pub aliases: Vec<String>,
    pub category: String,
    pub description: String,
    pub usage: String,
    pub permissions: Vec<String>,
}

impl CommandHelp {
    pub fn of<U, E>(command: &Command<U, E>) -> Self {
        Self {
            name: command.name.clone(),
            aliases: command.aliases.clone(),
            category: command.category.clone().unwrap_or_else(|| MISC.to_string()),
            description: command.description.clone().unwrap_or_default(),
            usage: usage(command),
            permissions: command
                .required_permissions
                .get_permission_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

pub fn help_entries<U, E>(commands: &[Command<U, E>]) -> Vec<CommandHelp> {
    commands.iter().map(CommandHelp::of).collect()
}

/// The command word of a prefixed message, e.g. `play` in `~play song`.
pub fn command_word<'m>(content: &'m str, prefix: &str) -> Option<&'m str> {
    let rest = content.strip_prefix(prefix)?;
    rest.split_whitespace().next()
}

use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
    model::id::UserId,
};

/// Destructive operations that ask for confirmation first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmAction {
    /// Purge the channel up to the configured cap.
    ClearChannel,
    /// Delete the guild's blacklist.
    ClearBlacklist,
}

impl ConfirmAction {
    fn id(self) -> &'static str {
        match self {
            Self::ClearChannel => "clear",
            Self::ClearBlacklist => "clearblacklist",
        }
    }

    fn from_id(id: &str) -> Option<Self> {
        match id {
            "clear" => Some(Self::ClearChannel),
            "clearblacklist" => Some(Self::ClearBlacklist),
            _ => None,
        }
    }
}

/// A click on a confirmation button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonPress {
    pub action: ConfirmAction,
    pub confirmed: bool,
    /// The member who ran the command; only they may answer.
    pub owner: UserId,
}

/// Yes/No buttons bound to `owner`.
pub fn confirmation_buttons(action: ConfirmAction, owner: UserId) -> CreateActionRow {
    let confirm = CreateButton::new(format!("confirm:{}:{}", action.id(), owner))
        .label("Yes, do it")
        .emoji('✅')
        .style(ButtonStyle::Danger);

    let cancel = CreateButton::new(format!("cancel:{}:{}", action.id(), owner))
        .label("Cancel")
        .emoji('❌')
        .style(ButtonStyle::Secondary);

    CreateActionRow::Buttons(vec![confirm, cancel])
}

/// Reads back a custom id produced by [`confirmation_buttons`].
pub fn parse_button(custom_id: &str) -> Option<ButtonPress> {
    let mut parts = custom_id.splitn(3, ':');

    let confirmed = match parts.next()? {
        "confirm" => true,
        "cancel" => false,
        _ => return None,
    };
    let action = ConfirmAction::from_id(parts.next()?)?;
    let owner = parts.next()?.parse::<u64>().ok().filter(|id| *id != 0)?;

    Some(ButtonPress {
        action,
        confirmed,
        owner: UserId::new(owner),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_confirm_and_cancel_ids() {
        assert_eq!(
            parse_button("confirm:clear:42"),
            Some(ButtonPress {
                action: ConfirmAction::ClearChannel,
                confirmed: true,
                owner: UserId::new(42),
            })
        );
        assert_eq!(
            parse_button("cancel:clearblacklist:7"),
            Some(ButtonPress {
                action: ConfirmAction::ClearBlacklist,
                confirmed: false,
                owner: UserId::new(7),
            })
        );
    }

    #[test]
    fn rejects_foreign_ids() {
        assert_eq!(parse_button("music_skip"), None);
        assert_eq!(parse_button("confirm:dance:1"), None);
        assert_eq!(parse_button("confirm:clear:abc"), None);
        assert_eq!(parse_button("confirm:clear:0"), None);
    }
}

//! Discord presentation: embeds and confirmation buttons.

pub mod buttons;
pub mod embeds;

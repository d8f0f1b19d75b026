use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::database::quiz::TargetChat;

/// A control panel button, encoded into callback data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelAction {
    Refresh,
    SendOne,
    SendAll,
    Clear,
    ConfirmClear,
    CancelClear,
    ListTargets,
    AddTargetById,
    RemoveTarget(i64),
}

impl PanelAction {
    pub fn callback_data(self) -> String {
        match self {
            PanelAction::Refresh => "refresh".to_owned(),
            PanelAction::SendOne => "send_one".to_owned(),
            PanelAction::SendAll => "send_all".to_owned(),
            PanelAction::Clear => "clear".to_owned(),
            PanelAction::ConfirmClear => "clear_confirm".to_owned(),
            PanelAction::CancelClear => "clear_cancel".to_owned(),
            PanelAction::ListTargets => "targets".to_owned(),
            PanelAction::AddTargetById => "target_add".to_owned(),
            PanelAction::RemoveTarget(chat_id) => format!("target_remove:{}", chat_id),
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        let action = match data {
            "refresh" => PanelAction::Refresh,
            "send_one" => PanelAction::SendOne,
            "send_all" => PanelAction::SendAll,
            "clear" => PanelAction::Clear,
            "clear_confirm" => PanelAction::ConfirmClear,
            "clear_cancel" => PanelAction::CancelClear,
            "targets" => PanelAction::ListTargets,
            "target_add" => PanelAction::AddTargetById,
            other => {
                let chat_id = other.strip_prefix("target_remove:")?.parse().ok()?;
                PanelAction::RemoveTarget(chat_id)
            }
        };
        Some(action)
    }

    fn button(self, text: impl Into<String>) -> InlineKeyboardButton {
        InlineKeyboardButton::callback(text, self.callback_data())
    }
}

pub(crate) fn panel_keyboard() -> InlineKeyboardMarkup {
    let keyboard = vec![
        vec![
            PanelAction::SendOne.button("▶️ Send one"),
            PanelAction::SendAll.button("📢 Send all"),
        ],
        vec![
            PanelAction::ListTargets.button("🎯 Target chats"),
            PanelAction::AddTargetById.button("➕ Add chat by id"),
        ],
        vec![
            PanelAction::Refresh.button("🔄 Refresh"),
            PanelAction::Clear.button("🗑️ Clear queue"),
        ],
    ];

    InlineKeyboardMarkup::new(keyboard)
}

pub(crate) fn clear_confirm_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        PanelAction::ConfirmClear.button("Yes, delete✔️"),
        PanelAction::CancelClear.button("Cancel❌"),
    ]])
}

pub(crate) fn targets_keyboard(targets: &[TargetChat]) -> InlineKeyboardMarkup {
    let keyboard = targets
        .iter()
        .map(|target| vec![PanelAction::RemoveTarget(target.chat_id()).button(format!("🗑️ {}", target))]);

    InlineKeyboardMarkup::new(keyboard)
}

/// Per-chat dialogue of an admin using the control panel.
#[derive(Debug, Clone, Default)]
pub enum PanelState {
    #[default]
    Idle,
    /// "Add chat by id" was pressed; the next text is the chat id.
    AwaitingChatId,
}

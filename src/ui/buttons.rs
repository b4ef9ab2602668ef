use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const PLAY_PAUSE: &str = "music_play_pause";
    pub const SKIP: &str = "music_skip";
    pub const STOP: &str = "music_stop";
    pub const QUEUE: &str = "music_queue";
}

/// Acción asociada a un botón del reproductor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    PlayPause,
    Skip,
    Stop,
    Queue,
}

impl ButtonAction {
    pub fn from_custom_id(custom_id: &str) -> Option<Self> {
        match custom_id {
            button_ids::PLAY_PAUSE => Some(Self::PlayPause),
            button_ids::SKIP => Some(Self::Skip),
            button_ids::STOP => Some(Self::Stop),
            button_ids::QUEUE => Some(Self::Queue),
            _ => None,
        }
    }
}

/// Controles del reproductor que acompañan a los embeds de reproducción
pub fn create_player_buttons(paused: bool) -> Vec<CreateActionRow> {
    let (play_pause_emoji, play_pause_style) = if paused {
        ('▶', ButtonStyle::Success)
    } else {
        ('⏸', ButtonStyle::Secondary)
    };

    let play_pause_btn = CreateButton::new(button_ids::PLAY_PAUSE)
        .emoji(play_pause_emoji)
        .style(play_pause_style);

    let skip_btn = CreateButton::new(button_ids::SKIP)
        .emoji('⏭')
        .style(ButtonStyle::Primary);

    let stop_btn = CreateButton::new(button_ids::STOP)
        .emoji('⏹')
        .style(ButtonStyle::Danger);

    let queue_btn = CreateButton::new(button_ids::QUEUE)
        .label("Cola")
        .emoji('📋')
        .style(ButtonStyle::Secondary);

    vec![CreateActionRow::Buttons(vec![
        play_pause_btn,
        skip_btn,
        stop_btn,
        queue_btn,
    ])]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_custom_ids() {
        assert_eq!(
            ButtonAction::from_custom_id(button_ids::PLAY_PAUSE),
            Some(ButtonAction::PlayPause)
        );
        assert_eq!(ButtonAction::from_custom_id(button_ids::SKIP), Some(ButtonAction::Skip));
        assert_eq!(ButtonAction::from_custom_id(button_ids::STOP), Some(ButtonAction::Stop));
        assert_eq!(ButtonAction::from_custom_id(button_ids::QUEUE), Some(ButtonAction::Queue));
        assert_eq!(ButtonAction::from_custom_id("music_volume_up"), None);
    }

    #[test]
    fn player_controls_fit_in_one_row() {
        assert_eq!(create_player_buttons(false).len(), 1);
        assert_eq!(create_player_buttons(true).len(), 1);
    }
}

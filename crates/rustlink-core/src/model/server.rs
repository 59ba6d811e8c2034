// ── Server, team and chat domain types ──

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub header_image: String,
    pub url: String,
    pub map: String,
    pub map_size: u32,
    pub wipe_time: u32,
    pub players: u32,
    pub max_players: u32,
    pub queued_players: u32,
    pub seed: Option<u32>,
    pub salt: Option<u32>,
}

/// In-game clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameTime {
    pub day_length_minutes: f32,
    pub time_scale: f32,
    pub sunrise: f32,
    pub sunset: f32,
    pub time: f32,
}

impl GameTime {
    pub fn is_daytime(&self) -> bool {
        self.time >= self.sunrise && self.time < self.sunset
    }

    /// `HH:MM` rendering of the in-game time.
    pub fn clock(&self) -> String {
        let minutes_total = (self.time.rem_euclid(24.0) * 60.0).floor();
        #[allow(
            clippy::as_conversions,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let minutes_total = minutes_total as u32;
        format!("{:02}:{:02}", minutes_total / 60, minutes_total % 60)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub steam_id: String,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub is_online: bool,
    pub spawn_time: u32,
    pub is_alive: bool,
    pub death_time: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamInfo {
    pub leader_steam_id: String,
    pub members: Vec<TeamMember>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMessage {
    pub steam_id: String,
    pub name: String,
    pub message: String,
    pub color: String,
    pub time: u32,
}

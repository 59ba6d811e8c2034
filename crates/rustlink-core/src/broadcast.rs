// ── Broadcast dispatch ──
//
// Turns unsolicited server messages into domain events. Roster changes are
// diffed against a per-member baseline, so the first sighting of a member
// only records state and emits nothing.

use std::collections::HashMap;

use rustlink_api::proto::{AppBroadcast, AppTeamInfo, AppTeamMember};
use tracing::{debug, trace};

use crate::convert::broadcast_value;
use crate::model::{DomainEvent, TeamMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MemberState {
    online: bool,
    alive: bool,
    death_time: u32,
}

impl From<&AppTeamMember> for MemberState {
    fn from(m: &AppTeamMember) -> Self {
        Self {
            online: m.is_online,
            alive: m.is_alive,
            death_time: m.death_time,
        }
    }
}

#[derive(Debug, Default)]
pub struct BroadcastDispatcher {
    roster: HashMap<u64, MemberState>,
}

impl BroadcastDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the baseline with a full roster snapshot.
    pub fn seed(&mut self, team: &AppTeamInfo) {
        self.roster = team
            .members
            .iter()
            .map(|m| (m.steam_id, MemberState::from(m)))
            .collect();
        debug!(members = self.roster.len(), "roster baseline seeded");
    }

    pub fn roster_len(&self) -> usize {
        self.roster.len()
    }

    /// Classify one broadcast. Returns nothing for shapes it does not know.
    pub fn classify(&mut self, broadcast: &AppBroadcast) -> Vec<DomainEvent> {
        let mut events = Vec::new();

        if let Some(new_message) = &broadcast.team_message {
            match &new_message.message {
                Some(msg) => {
                    let msg = TeamMessage::from(msg.clone());
                    events.push(DomainEvent::TeamMessageReceived {
                        steam_id: msg.steam_id,
                        name: msg.name,
                        message: msg.message,
                        color: msg.color,
                        time: msg.time,
                    });
                }
                None => debug!("team message broadcast without a message"),
            }
        }

        if let Some(changed) = &broadcast.team_changed {
            match &changed.team_info {
                Some(team) => self.diff_roster(team, &mut events),
                None => debug!(player_id = changed.player_id, "team change without roster"),
            }
        }

        if let Some(changed) = &broadcast.entity_changed {
            let payload = changed.payload.clone().unwrap_or_default();
            events.push(DomainEvent::EntityValueChanged {
                entity_id: changed.entity_id,
                value: broadcast_value(&payload),
                capacity: payload.capacity,
                has_protection: payload.has_protection,
            });
        }

        if broadcast.team_message.is_none()
            && broadcast.team_changed.is_none()
            && broadcast.entity_changed.is_none()
        {
            debug!("dropping broadcast of unknown shape");
        }

        events
    }

    fn diff_roster(&mut self, team: &AppTeamInfo, events: &mut Vec<DomainEvent>) {
        let mut next = HashMap::with_capacity(team.members.len());

        for member in &team.members {
            let now = MemberState::from(member);
            let steam_id = member.steam_id.to_string();

            if let Some(prev) = self.roster.get(&member.steam_id) {
                if prev.online != now.online {
                    events.push(DomainEvent::PlayerLoginStateChanged {
                        steam_id: steam_id.clone(),
                        name: member.name.clone(),
                        online: now.online,
                    });
                }
                let newly_dead = !now.alive
                    && now.death_time > 0
                    && (prev.alive || prev.death_time != now.death_time);
                if newly_dead {
                    events.push(DomainEvent::PlayerDeathReported {
                        steam_id,
                        name: member.name.clone(),
                        killer: None,
                        weapon: None,
                    });
                }
            } else {
                trace!(steam_id = member.steam_id, "new roster member");
            }

            next.insert(member.steam_id, now);
        }

        self.roster = next;
    }
}

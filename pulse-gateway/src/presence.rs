//! Presence Builder (§4.I): merges default/configured/per-call presence
//! layers into the wire-format `PresenceUpdate`, canonicalizing the
//! legacy singular `activity`/`game` fields into the `activities` list.

use pulse_model::{Activity, PresenceUpdate, Status};

/// The caller-facing, partially-specified presence shape. Each layer
/// (engine default, engine-configured, per-call override) is one of
/// these; a later layer's `Some` fields win over an earlier layer's.
#[derive(Debug, Clone, Default)]
pub struct PresenceInput {
    pub status: Option<Status>,
    pub afk: Option<bool>,
    pub since: Option<u64>,
    /// Legacy singular activity field.
    pub activity: Option<Activity>,
    /// Legacy singular "game" field (an older alias for `activity`).
    pub game: Option<Activity>,
    pub activities: Option<Vec<Activity>>,
}

impl PresenceInput {
    fn merge_from(&mut self, other: &PresenceInput) {
        if other.status.is_some() {
            self.status = other.status;
        }
        if other.afk.is_some() {
            self.afk = other.afk;
        }
        if other.since.is_some() {
            self.since = other.since;
        }
        if other.activity.is_some() {
            self.activity = other.activity.clone();
        }
        if other.game.is_some() {
            self.game = other.game.clone();
        }
        if other.activities.is_some() {
            self.activities = other.activities.clone();
        }
    }
}

/// Builds outbound `PresenceUpdate` payloads from layered input.
pub struct PresenceBuilder {
    default: PresenceInput,
}

impl PresenceBuilder {
    pub fn new(default: PresenceInput) -> Self {
        Self { default }
    }

    /// Merge the default, the engine's configured presence (if any), and
    /// a per-call override (if any), then canonicalize into wire form.
    pub fn build(
        &self,
        configured: Option<&PresenceInput>,
        call_override: Option<&PresenceInput>,
    ) -> PresenceUpdate {
        let mut merged = self.default.clone();
        if let Some(configured) = configured {
            merged.merge_from(configured);
        }
        if let Some(call_override) = call_override {
            merged.merge_from(call_override);
        }

        let mut activities = merged.activities.unwrap_or_default();
        // `game` is inserted first, then `activity` is inserted in front
        // of it, so the final order is [activity, game, ...existing].
        if let Some(game) = merged.game {
            activities.insert(0, game);
        }
        if let Some(activity) = merged.activity {
            activities.insert(0, activity);
        }

        PresenceUpdate {
            since: merged.since,
            activities,
            status: merged.status.unwrap_or_default(),
            afk: merged.afk.unwrap_or(false),
        }
    }
}

impl Default for PresenceBuilder {
    fn default() -> Self {
        Self::new(PresenceInput::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_model::ActivityType;

    #[test]
    fn empty_layers_produce_the_wire_default() {
        let builder = PresenceBuilder::default();
        let presence = builder.build(None, None);
        assert_eq!(presence.status, Status::Online);
        assert!(!presence.afk);
        assert!(presence.activities.is_empty());
        assert!(presence.since.is_none());
    }

    #[test]
    fn override_wins_over_configured_and_default() {
        let default = PresenceInput {
            status: Some(Status::Idle),
            ..Default::default()
        };
        let configured = PresenceInput {
            status: Some(Status::Dnd),
            afk: Some(true),
            ..Default::default()
        };
        let call_override = PresenceInput {
            status: Some(Status::Online),
            ..Default::default()
        };

        let builder = PresenceBuilder::new(default);
        let presence = builder.build(Some(&configured), Some(&call_override));
        assert_eq!(presence.status, Status::Online);
        assert!(presence.afk);
    }

    #[test]
    fn legacy_activity_and_game_prepend_in_documented_order() {
        let existing = Activity::new("existing", ActivityType::Playing);
        let game = Activity::new("a-game", ActivityType::Playing);
        let activity = Activity::new("an-activity", ActivityType::Watching);

        let input = PresenceInput {
            activities: Some(vec![existing.clone()]),
            game: Some(game.clone()),
            activity: Some(activity.clone()),
            ..Default::default()
        };

        let builder = PresenceBuilder::default();
        let presence = builder.build(None, Some(&input));

        assert_eq!(presence.activities.len(), 3);
        assert_eq!(presence.activities[0].name, activity.name);
        assert_eq!(presence.activities[1].name, game.name);
        assert_eq!(presence.activities[2].name, existing.name);
    }
}

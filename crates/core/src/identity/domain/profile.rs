use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::domain::encoding::FaceId;

/// What is known about an identity besides its encoding.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl Profile {
    /// Records a sighting. The first one also sets `first_seen`.
    pub fn mark_seen(&mut self, at: DateTime<Utc>) {
        self.first_seen.get_or_insert(at);
        self.last_seen = Some(at);
    }

    /// The name if one was given, otherwise a generic label for the id.
    pub fn label(&self, id: FaceId) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None if id > 0 => format!("friend {id}"),
            None => format!("stranger {id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 4, 12, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_first_sighting_sets_both_times() {
        let mut profile = Profile::default();
        profile.mark_seen(at(9));
        assert_eq!(profile.first_seen, Some(at(9)));
        assert_eq!(profile.last_seen, Some(at(9)));
    }

    #[test]
    fn test_later_sightings_only_move_last_seen() {
        let mut profile = Profile::default();
        profile.mark_seen(at(9));
        profile.mark_seen(at(11));
        assert_eq!(profile.first_seen, Some(at(9)));
        assert_eq!(profile.last_seen, Some(at(11)));
    }

    #[rstest]
    #[case(Some("Ada"), 4, "Ada")]
    #[case(Some("Ada"), -2, "Ada")]
    #[case(None, 4, "friend 4")]
    #[case(None, -2, "stranger -2")]
    fn test_label(#[case] name: Option<&str>, #[case] id: FaceId, #[case] expected: &str) {
        let profile = Profile {
            name: name.map(String::from),
            ..Profile::default()
        };
        assert_eq!(profile.label(id), expected);
    }

    #[test]
    fn test_empty_profile_serializes_to_empty_object() {
        assert_eq!(serde_json::to_string(&Profile::default()).unwrap(), "{}");
    }
}

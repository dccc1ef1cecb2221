//! Merging server-configured moderation rules with JWT-carried rule tokens.

use crate::config::{Config, ModerationRuleConfig};

/// A rule token carried on a validated JWT's `rules` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JwtRule {
    NoVideo,
    NoBroadcast,
    NoImage,
    RedCam,
}

impl JwtRule {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "novideo" => Some(JwtRule::NoVideo),
            "nobroadcast" => Some(JwtRule::NoBroadcast),
            "noimage" => Some(JwtRule::NoImage),
            "redcam" => Some(JwtRule::RedCam),
            _ => None,
        }
    }

    /// `novideo` is a superset of `nobroadcast`: a user who cannot use video
    /// at all certainly cannot broadcast it.
    fn implies_no_broadcast(self) -> bool {
        matches!(self, JwtRule::NoVideo | JwtRule::NoBroadcast)
    }
}

/// The effective, merged set of restrictions applied to one subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EffectiveRules {
    pub camera_always_nsfw: bool,
    pub disable_camera: bool,
    pub no_broadcast: bool,
    pub no_video: bool,
    pub no_image: bool,
    pub no_dark_video: bool,
}

/// Merges the server-side rule (keyed by username) with JWT-carried rule
/// tokens. Restrictions are additive in both directions: neither source can
/// lift a restriction the other imposes.
pub fn merge_rules(config: &Config, username: &str, jwt_rules: &[JwtRule]) -> EffectiveRules {
    let base = config
        .get_moderation_rule(username)
        .cloned()
        .unwrap_or(ModerationRuleConfig {
            username: username.to_string(),
            camera_always_nsfw: false,
            disable_camera: false,
            no_broadcast: false,
            no_video: false,
            no_image: false,
            no_dark_video: false,
        });

    let mut effective = EffectiveRules {
        camera_always_nsfw: base.camera_always_nsfw,
        disable_camera: base.disable_camera,
        no_broadcast: base.no_broadcast,
        no_video: base.no_video,
        no_image: base.no_image,
        no_dark_video: base.no_dark_video,
    };

    for rule in jwt_rules {
        match rule {
            JwtRule::RedCam => effective.camera_always_nsfw = true,
            JwtRule::NoVideo => effective.no_video = true,
            JwtRule::NoImage => effective.no_image = true,
            JwtRule::NoBroadcast => {}
        }
        if rule.implies_no_broadcast() {
            effective.no_broadcast = true;
        }
    }

    effective
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn novideo_implies_nobroadcast() {
        let config = Config::default();
        let effective = merge_rules(&config, "alice", &[JwtRule::NoVideo]);
        assert!(effective.no_video);
        assert!(effective.no_broadcast);
    }

    #[test]
    fn server_rule_and_jwt_rule_both_apply() {
        let mut config = Config::default();
        config.moderation_rules.push(ModerationRuleConfig {
            username: "bob".to_string(),
            camera_always_nsfw: false,
            disable_camera: true,
            no_broadcast: false,
            no_video: false,
            no_image: false,
            no_dark_video: false,
        });
        let effective = merge_rules(&config, "bob", &[JwtRule::RedCam]);
        assert!(effective.disable_camera);
        assert!(effective.camera_always_nsfw);
    }

    #[test]
    fn jwt_rule_token_parsing_rejects_unknown_strings() {
        assert_eq!(JwtRule::parse("novideo"), Some(JwtRule::NoVideo));
        assert_eq!(JwtRule::parse("bogus"), None);
    }
}

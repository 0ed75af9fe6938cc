//! Configuration validation.

use super::AphConfig;
use crate::pipeline::Stage;

/// Check a configuration for values that cannot work, returning one
/// message per problem.
pub fn validate_config(config: &AphConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if config.watch.ignore_marker.trim().is_empty() {
        problems.push("watch.ignore_marker must not be empty".to_string());
    } else if config.watch.ignore_marker.split_whitespace().count() > 1 {
        problems.push(format!(
            "watch.ignore_marker must be a single token, got '{}'",
            config.watch.ignore_marker
        ));
    }

    if config.resolver.command.trim().is_empty() {
        problems.push("resolver.command must not be empty".to_string());
    }

    if config.watch.log_window.starts_with('/') {
        problems.push(format!(
            "watch.log_window must be relative to the project root, got '{}'",
            config.watch.log_window
        ));
    }

    for stage in Stage::ORDER {
        let cfg = config.stages.get(stage);
        if cfg.enabled && cfg.command.trim().is_empty() {
            problems.push(format!(
                "stages.{}.command must not be empty while the stage is enabled",
                stage.name()
            ));
        }
    }

    problems
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&AphConfig::default()).is_empty());
    }

    #[test]
    fn test_enabled_stage_needs_command() {
        let mut config = AphConfig::default();
        config.stages.build.command = String::new();
        let problems = validate_config(&config);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("stages.build.command"));

        config.stages.build.enabled = false;
        assert!(validate_config(&config).is_empty());
    }

    #[test]
    fn test_marker_must_be_one_token() {
        let mut config = AphConfig::default();
        config.watch.ignore_marker = "No Aph".into();
        assert_eq!(validate_config(&config).len(), 1);
    }

    #[test]
    fn test_absolute_log_window_rejected() {
        let mut config = AphConfig::default();
        config.watch.log_window = "/tmp/+Errors".into();
        assert_eq!(validate_config(&config).len(), 1);
        config.watch.log_window = "+Errors".into();
        assert!(validate_config(&config).is_empty());
    }
}

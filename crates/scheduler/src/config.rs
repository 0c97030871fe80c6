use std::time::Duration;

use scadlive_core::args::DEFAULT_OUTPUT_PATH;
use scadlive_core::JobKind;

/// Default debounce delay of render jobs.
pub const DEFAULT_RENDER_DELAY: Duration = Duration::from_millis(1000);

/// Default debounce delay of syntax-check jobs.
pub const DEFAULT_SYNTAX_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a number of milliseconds, got {value:?}")]
    InvalidDelay { name: &'static str, value: String },

    #[error("{name} must not be empty")]
    Empty { name: &'static str },
}

/// Scheduling configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Debounce delay of render jobs (default: 1000 ms).
    pub render_delay: Duration,
    /// Debounce delay of syntax-check jobs (default: 300 ms).
    pub syntax_delay: Duration,
    /// Render output path inside the sandbox (default: `out.stl`).
    pub output_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            render_delay: DEFAULT_RENDER_DELAY,
            syntax_delay: DEFAULT_SYNTAX_DELAY,
            output_name: DEFAULT_OUTPUT_PATH.to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default   |
    /// |----------------------------|-----------|
    /// | `SCADLIVE_RENDER_DELAY_MS` | `1000`    |
    /// | `SCADLIVE_SYNTAX_DELAY_MS` | `300`     |
    /// | `SCADLIVE_OUTPUT_NAME`     | `out.stl` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let render_delay = parse_delay(&lookup, "SCADLIVE_RENDER_DELAY_MS")?
            .unwrap_or(defaults.render_delay);
        let syntax_delay = parse_delay(&lookup, "SCADLIVE_SYNTAX_DELAY_MS")?
            .unwrap_or(defaults.syntax_delay);

        let output_name = match lookup("SCADLIVE_OUTPUT_NAME") {
            Some(name) if name.trim().is_empty() => {
                return Err(ConfigError::Empty {
                    name: "SCADLIVE_OUTPUT_NAME",
                })
            }
            Some(name) => name.trim().to_string(),
            None => defaults.output_name,
        };

        Ok(Self {
            render_delay,
            syntax_delay,
            output_name,
        })
    }

    /// Debounce delay for a job class.
    pub fn delay_for(&self, kind: JobKind) -> Duration {
        match kind {
            JobKind::Render => self.render_delay,
            JobKind::SyntaxCheck => self.syntax_delay,
        }
    }
}

fn parse_delay<F>(lookup: &F, name: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::InvalidDelay { name, value })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = SchedulerConfig::from_lookup(lookup(&[])).expect("config");
        assert_eq!(config, SchedulerConfig::default());
        assert_eq!(config.delay_for(JobKind::Render), Duration::from_millis(1000));
        assert_eq!(config.delay_for(JobKind::SyntaxCheck), Duration::from_millis(300));
        assert_eq!(config.output_name, "out.stl");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = SchedulerConfig::from_lookup(lookup(&[
            ("SCADLIVE_RENDER_DELAY_MS", " 250 "),
            ("SCADLIVE_SYNTAX_DELAY_MS", "0"),
            ("SCADLIVE_OUTPUT_NAME", "model.off"),
        ]))
        .expect("config");
        assert_eq!(config.render_delay, Duration::from_millis(250));
        assert_eq!(config.syntax_delay, Duration::ZERO);
        assert_eq!(config.output_name, "model.off");
    }

    #[test]
    fn invalid_delay_is_an_error() {
        let err = SchedulerConfig::from_lookup(lookup(&[("SCADLIVE_RENDER_DELAY_MS", "1s")]))
            .expect_err("should fail");
        assert_matches!(
            err,
            ConfigError::InvalidDelay { name: "SCADLIVE_RENDER_DELAY_MS", ref value } if value == "1s"
        );
    }

    #[test]
    fn blank_output_name_is_an_error() {
        assert_matches!(
            SchedulerConfig::from_lookup(lookup(&[("SCADLIVE_OUTPUT_NAME", "  ")])),
            Err(ConfigError::Empty { .. })
        );
    }
}

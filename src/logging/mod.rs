//! Structured logging helpers
//!
//! Filter construction for `tracing-subscriber` and privacy-safe content
//! previews for prompt and response logging.

use crate::config::LoggingConfig;

/// Characters kept in a content preview.
pub const PREVIEW_CHARS: usize = 100;

/// Build filter directives string from LoggingConfig
///
/// Constructs a tracing filter string that includes the base log level
/// and any component-specific log levels configured in the LoggingConfig.
/// Components are sorted so the output is stable.
///
/// # Examples
///
/// ```
/// use relay::config::{LogFormat, LoggingConfig};
/// use relay::logging::build_filter_directives;
/// use std::collections::HashMap;
///
/// let mut component_levels = HashMap::new();
/// component_levels.insert("routing".to_string(), "debug".to_string());
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Pretty,
///     component_levels: Some(component_levels),
///     enable_content_logging: false,
/// };
///
/// assert_eq!(build_filter_directives(&config), "info,relay::routing=debug");
/// ```
pub fn build_filter_directives(config: &LoggingConfig) -> String {
    let mut filter_str = config.level.clone();

    if let Some(component_levels) = &config.component_levels {
        let mut components: Vec<_> = component_levels.iter().collect();
        components.sort();
        for (component, level) in components {
            filter_str.push_str(&format!(",relay::{}={}", component, level));
        }
    }

    filter_str
}

/// Preview of prompt or response text, or `None` when content logging is off.
pub fn content_preview(text: &str, enable_content_logging: bool) -> Option<String> {
    if !enable_content_logging || text.is_empty() {
        return None;
    }
    Some(truncate(text, PREVIEW_CHARS))
}

/// Truncate to at most `max_chars` characters, appending `...` when cut.
pub fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

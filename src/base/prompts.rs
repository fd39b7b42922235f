//! User-visible canned texts.

/// Posted into the thread while the answer is being generated.
pub const PLACEHOLDER_TEXT: &str = ":loading_spinner:";

/// Shown in place of (or after) a partial answer when generation fails.
pub const FAILURE_NOTICE: &str = ":warning: Sorry, I couldn't finish this answer. Please try again in a moment.";

/// Reply to any slash command.
pub const NO_COMMANDS_TEXT: &str = "No app commands are currently supported.";

/// Builds the final text of a placeholder whose stream failed.
pub fn failure_text(partial: &str, notice: &str) -> String {
    if partial.trim().is_empty() {
        notice.to_string()
    } else {
        format!("{partial}\n\n{notice}")
    }
}

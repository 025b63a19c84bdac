//! Event formatting and event-kind parsing for the terminal

use anyhow::{bail, Result};
use owo_colors::OwoColorize;
use treewatch_core::{EventKind, WatchEvent};

/// Parse a comma-separated list of event kinds
///
/// Accepts `modified`, `moved_out`, `moved_in`, `moved`, `created`,
/// `deleted` and `all` (case-insensitive, `-` and `_` interchangeable).
pub fn parse_kinds(list: &str) -> Result<EventKind> {
    let mut kinds = EventKind::empty();
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let normalized = name.to_ascii_lowercase().replace('-', "_");
        kinds |= match normalized.as_str() {
            "modified" | "modify" | "modified_and_closed" => EventKind::MODIFIED_AND_CLOSED,
            "moved_out" => EventKind::MOVED_OUT,
            "moved_in" => EventKind::MOVED_IN,
            "moved" | "move" => EventKind::MOVED,
            "created" | "create" => EventKind::CREATED,
            "deleted" | "delete" => EventKind::DELETED,
            "all" => EventKind::ALL,
            _ => bail!("unknown event kind '{}'", name),
        };
    }
    if kinds.is_empty() {
        bail!("no event kinds given");
    }
    Ok(kinds)
}

/// Short label for the dominant kind of an event
pub fn event_label(kind: EventKind) -> &'static str {
    const LABELS: &[(EventKind, &str)] = &[
        (EventKind::QUEUE_OVERFLOW, "OVERFLOW"),
        (EventKind::UNMOUNTED, "UNMOUNT"),
        (EventKind::WATCH_INVALIDATED, "GONE"),
        (EventKind::MODIFIED_AND_CLOSED, "MODIFY"),
        (EventKind::MOVED_OUT, "MOVE_OUT"),
        (EventKind::MOVED_IN, "MOVE_IN"),
        (EventKind::CREATED, "CREATE"),
        (EventKind::DELETED, "DELETE"),
    ];
    LABELS
        .iter()
        .find(|(bit, _)| kind.contains(*bit))
        .map_or("EVENT", |(_, label)| *label)
}

/// One colored line per event
pub fn format_event(event: &WatchEvent) -> String {
    let label = format!("{:<8}", event_label(event.kind));
    let label = if event.kind.intersects(
        EventKind::QUEUE_OVERFLOW | EventKind::UNMOUNTED | EventKind::WATCH_INVALIDATED,
    ) {
        label.red().bold().to_string()
    } else if event.kind.intersects(EventKind::CREATED | EventKind::MOVED_IN) {
        label.green().to_string()
    } else if event.kind.intersects(EventKind::DELETED | EventKind::MOVED_OUT) {
        label.yellow().to_string()
    } else {
        label.cyan().to_string()
    };

    let mut line = format!("{} {}", label, event.path.display());
    if event.is_dir() {
        line.push('/');
    }
    if event.cookie != 0 {
        line.push_str(&format!(" {}", format!("(cookie {})", event.cookie).dimmed()));
    }
    if event.has_error() {
        line.push_str(&format!(" {}", "[not watched: subtree could not be registered]".red()));
    }
    line
}

/// Date/time picker events and the dismissal strategy
///
/// Host platforms disagree on when a picker closes. Some close it after any
/// change, others keep it open until an explicit dismissal. The strategy is
/// picked once at startup and consulted by the controller on every event.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the picker reacts to change events
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PickerDismissal {
    /// Any change event closes the picker
    AutoClose,
    /// Only an explicit dismissal closes the picker
    ManualClose,
}

impl PickerDismissal {
    /// The behaviour native to the host platform
    pub fn for_host() -> Self {
        if cfg!(any(target_os = "ios", target_os = "macos")) {
            PickerDismissal::ManualClose
        } else {
            PickerDismissal::AutoClose
        }
    }

    /// Whether the picker is still visible after an event of this kind
    pub fn visible_after(self, kind: PickerEventKind) -> bool {
        match self {
            PickerDismissal::AutoClose => false,
            PickerDismissal::ManualClose => kind != PickerEventKind::Dismissed,
        }
    }
}

/// What the picker reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerEventKind {
    /// A value changed while the picker stays open
    Changed,
    /// The user confirmed a value
    Set,
    /// The user closed the picker
    Dismissed,
}

/// A change event emitted by the picker widget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickerEvent {
    pub kind: PickerEventKind,
    /// The selected value, absent on a dismissal
    pub selected: Option<DateTime<Utc>>,
}

impl PickerEvent {
    pub fn changed(value: DateTime<Utc>) -> Self {
        Self { kind: PickerEventKind::Changed, selected: Some(value) }
    }

    pub fn set(value: DateTime<Utc>) -> Self {
        Self { kind: PickerEventKind::Set, selected: Some(value) }
    }

    pub fn dismissed() -> Self {
        Self { kind: PickerEventKind::Dismissed, selected: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_close_hides_on_every_event() {
        let strategy = PickerDismissal::AutoClose;
        assert!(!strategy.visible_after(PickerEventKind::Changed));
        assert!(!strategy.visible_after(PickerEventKind::Set));
        assert!(!strategy.visible_after(PickerEventKind::Dismissed));
    }

    #[test]
    fn test_manual_close_hides_only_on_dismissal() {
        let strategy = PickerDismissal::ManualClose;
        assert!(strategy.visible_after(PickerEventKind::Changed));
        assert!(strategy.visible_after(PickerEventKind::Set));
        assert!(!strategy.visible_after(PickerEventKind::Dismissed));
    }

    #[test]
    fn test_dismissal_parses_from_kebab_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            dismissal: PickerDismissal,
        }

        let parsed: Wrapper = toml::from_str(r#"dismissal = "manual-close""#).unwrap();
        assert_eq!(parsed.dismissal, PickerDismissal::ManualClose);
    }
}

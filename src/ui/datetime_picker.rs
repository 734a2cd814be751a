/// Date/time picker built from plain iced widgets
///
/// Keeps a local draft and reports `PickerEvent`s the way the configured
/// dismissal strategy expects: auto-close pickers report on OK/Cancel only,
/// manual-close pickers report every adjustment and close on Done.
use chrono::{DateTime, Local, Months, NaiveDateTime, TimeDelta, TimeZone, Utc};
use iced::widget::{button, column, row, text};
use iced::{Alignment, Element, Length};

use crate::state::picker::{PickerDismissal, PickerEvent};

/// A part of the date/time the user can step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Year,
    Month,
    Day,
    Hour,
    Minute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerMessage {
    /// Step a field up or down
    Adjust(Field, i32),
    /// OK
    Confirm,
    /// Cancel / Done
    Dismiss,
}

/// Picker state while it is on screen
#[derive(Debug, Clone)]
pub struct DateTimePicker {
    /// Draft value in local time
    draft: NaiveDateTime,
    dismissal: PickerDismissal,
}

impl DateTimePicker {
    /// Open the picker on `initial`
    pub fn open(initial: DateTime<Utc>, dismissal: PickerDismissal) -> Self {
        Self {
            draft: initial.with_timezone(&Local).naive_local(),
            dismissal,
        }
    }

    /// The draft as an instant
    pub fn selected(&self) -> DateTime<Utc> {
        local_to_utc(self.draft)
    }

    /// Handle a widget message; returns the event to hand to the controller
    pub fn update(&mut self, message: PickerMessage) -> Option<PickerEvent> {
        match message {
            PickerMessage::Adjust(field, delta) => {
                if let Some(next) = adjust(self.draft, field, delta) {
                    self.draft = next;
                }
                match self.dismissal {
                    PickerDismissal::ManualClose => Some(PickerEvent::changed(self.selected())),
                    PickerDismissal::AutoClose => None,
                }
            }
            PickerMessage::Confirm => Some(PickerEvent::set(self.selected())),
            PickerMessage::Dismiss => Some(PickerEvent::dismissed()),
        }
    }

    pub fn view(&self) -> Element<'_, PickerMessage> {
        let steppers = row![
            stepper("Year", self.draft.format("%Y").to_string(), Field::Year),
            stepper("Month", self.draft.format("%b").to_string(), Field::Month),
            stepper("Day", self.draft.format("%d").to_string(), Field::Day),
            stepper("Hour", self.draft.format("%H").to_string(), Field::Hour),
            stepper("Minute", self.draft.format("%M").to_string(), Field::Minute),
        ]
        .spacing(12);

        let actions = match self.dismissal {
            PickerDismissal::AutoClose => row![
                button("Cancel").on_press(PickerMessage::Dismiss),
                button("OK").on_press(PickerMessage::Confirm),
            ],
            PickerDismissal::ManualClose => row![button("Done").on_press(PickerMessage::Dismiss)],
        }
        .spacing(10);

        column![
            text(self.draft.format("%A %-d %B %Y, %H:%M").to_string()).size(16),
            steppers,
            actions,
        ]
        .spacing(12)
        .align_x(Alignment::Center)
        .into()
    }
}

fn stepper(label: &str, value: String, field: Field) -> Element<'_, PickerMessage> {
    column![
        text(label).size(12),
        button(text("+"))
            .width(Length::Fixed(40.0))
            .on_press(PickerMessage::Adjust(field, 1)),
        text(value).size(20),
        button(text("-"))
            .width(Length::Fixed(40.0))
            .on_press(PickerMessage::Adjust(field, -1)),
    ]
    .spacing(4)
    .align_x(Alignment::Center)
    .into()
}

/// Step one field; `None` when the result would be out of range
fn adjust(value: NaiveDateTime, field: Field, delta: i32) -> Option<NaiveDateTime> {
    match field {
        Field::Year => shift_months(value, delta.checked_mul(12)?),
        Field::Month => shift_months(value, delta),
        Field::Day => value.checked_add_signed(TimeDelta::days(delta.into())),
        Field::Hour => value.checked_add_signed(TimeDelta::hours(delta.into())),
        Field::Minute => value.checked_add_signed(TimeDelta::minutes(delta.into())),
    }
}

/// Month arithmetic clamps the day (Jan 31 + 1 month = end of February)
fn shift_months(value: NaiveDateTime, months: i32) -> Option<NaiveDateTime> {
    let step = Months::new(months.unsigned_abs());
    if months >= 0 {
        value.checked_add_months(step)
    } else {
        value.checked_sub_months(step)
    }
}

/// Interpret a wall-clock time in the local zone; times skipped by a DST jump fall back to UTC
fn local_to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::picker::PickerEventKind;
    use chrono::NaiveDate;

    fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn may_first() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_open_round_trips_initial_value() {
        let picker = DateTimePicker::open(may_first(), PickerDismissal::AutoClose);
        assert_eq!(picker.selected(), may_first());
    }

    #[test]
    fn test_month_step_clamps_day() {
        let next = adjust(naive(2024, 1, 31, 9, 30), Field::Month, 1).unwrap();
        assert_eq!(next, naive(2024, 2, 29, 9, 30));

        let prev = adjust(naive(2024, 3, 31, 9, 30), Field::Month, -1).unwrap();
        assert_eq!(prev, naive(2024, 2, 29, 9, 30));
    }

    #[test]
    fn test_year_and_minute_steps() {
        assert_eq!(
            adjust(naive(2024, 2, 29, 0, 0), Field::Year, 1).unwrap(),
            naive(2025, 2, 28, 0, 0)
        );
        assert_eq!(
            adjust(naive(2024, 5, 1, 23, 59), Field::Minute, 1).unwrap(),
            naive(2024, 5, 2, 0, 0)
        );
    }

    #[test]
    fn test_auto_close_reports_only_on_confirm_or_cancel() {
        let mut picker = DateTimePicker::open(may_first(), PickerDismissal::AutoClose);

        assert_eq!(picker.update(PickerMessage::Adjust(Field::Minute, 5)), None);

        let event = picker.update(PickerMessage::Confirm).unwrap();
        assert_eq!(event.kind, PickerEventKind::Set);
        assert_eq!(event.selected, Some(may_first() + TimeDelta::minutes(5)));

        assert_eq!(picker.update(PickerMessage::Dismiss), Some(PickerEvent::dismissed()));
    }

    #[test]
    fn test_manual_close_reports_every_step() {
        let mut picker = DateTimePicker::open(may_first(), PickerDismissal::ManualClose);

        let event = picker.update(PickerMessage::Adjust(Field::Minute, -10)).unwrap();
        assert_eq!(event.kind, PickerEventKind::Changed);
        assert_eq!(event.selected, Some(may_first() - TimeDelta::minutes(10)));

        let done = picker.update(PickerMessage::Dismiss).unwrap();
        assert_eq!(done.kind, PickerEventKind::Dismissed);
        assert_eq!(done.selected, None);
    }
}

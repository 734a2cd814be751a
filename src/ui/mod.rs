/// UI components
///
/// Widgets that are more than a few lines of layout live here.

pub mod datetime_picker;

//! Change detection between submitted and stored records.

use crate::core::value::Record;

/// Keep the submitted entries that name a whitelisted column and differ
/// from the stored record.
///
/// Keys outside `columns` are dropped. A column missing from `stored`
/// counts as changed. Values are compared with
/// [`SqlValue::loosely_equals`](crate::core::value::SqlValue::loosely_equals)
/// so form text matches typed stored values.
pub fn changed_columns<S: AsRef<str>>(columns: &[S], submitted: &Record, stored: &Record) -> Record {
    submitted
        .iter()
        .filter(|(key, _)| columns.iter().any(|c| c.as_ref() == *key))
        .filter(|(key, value)| {
            stored
                .get(key)
                .map_or(true, |current| !value.loosely_equals(current))
        })
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

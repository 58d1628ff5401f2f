use std::time::Duration;

use crate::ChangeEvent;
use crate::ChangeOperation;
use crate::EntityKind;
use crate::FieldValue;
use crate::RowFields;

/// Builds a row of string identifying fields.
pub fn row(fields: &[(&str, &str)]) -> RowFields {
    fields
        .iter()
        .map(|(column, value)| ((*column).to_string(), FieldValue::Str((*value).to_string())))
        .collect()
}

pub fn change(
    entity: EntityKind,
    operation: ChangeOperation,
    fields: &[(&str, &str)],
) -> ChangeEvent {
    ChangeEvent {
        entity,
        operation,
        row: row(fields),
    }
}

/// Polls the condition every 10ms, panicking if it does not hold within two
/// seconds. Listener tasks apply invalidations asynchronously, so assertions
/// on their effects go through here.
pub async fn wait_for<F>(
    label: &str,
    mut condition: F,
) where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", label);
}

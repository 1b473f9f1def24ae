use super::record::Record;
use crate::error::BoxError;

/// Inspects or modifies the record built for an event before it is encoded
/// and submitted.
///
/// Mutators run in configured order. An error from any of them aborts the
/// whole batch.
pub trait RecordMutator<E>: Send + Sync {
    fn mutate(&self, event: &E, record: &mut Record) -> Result<(), BoxError>;
}

impl<E, F> RecordMutator<E> for F
where
    F: Fn(&E, &mut Record) -> Result<(), BoxError> + Send + Sync,
{
    fn mutate(&self, event: &E, record: &mut Record) -> Result<(), BoxError> {
        self(event, record)
    }
}

/// Stamps each record with the wall-clock time at which it was built.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timestamp;

impl<E> RecordMutator<E> for Timestamp {
    fn mutate(&self, _event: &E, record: &mut Record) -> Result<(), BoxError> {
        record.timestamp = Some(chrono::Utc::now().timestamp_millis());
        Ok(())
    }
}

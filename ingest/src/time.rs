use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub trait TimeSource: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Clone, Default)]
pub struct SystemClock {}

impl TimeSource for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// UTC timestamps render with a trailing `Z`, which is the format the
/// registry and downstream consumers expect.
pub fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).expect("failed to format timestamp")
}

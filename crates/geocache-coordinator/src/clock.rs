/// Injectable wall clock so hotness-decay scenarios don't depend on real
/// sleeps in tests (spec.md §8, scenario 5).
pub trait Clock: Send + Sync {
    fn now(&self) -> time::OffsetDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> time::OffsetDateTime {
        time::OffsetDateTime::now_utc()
    }
}

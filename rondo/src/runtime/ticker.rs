use bitflags::bitflags;

#[derive(Debug)]
pub(crate) struct Ticker {
    tick: u32,
}

impl Ticker {
    pub(crate) fn new() -> Self {
        Self { tick: 0 }
    }

    pub(crate) fn tick<T: TickerData>(&mut self, ctx: &T::Context, data: &T) -> TickerEvents {
        self.tick = self.tick.wrapping_add(1);
        data.check(ctx, self.tick)
    }
}

/// Policies consulted once per task turn. The run loop consumes the events,
/// this way we decouple logic from data.
pub(crate) trait TickerData {
    type Context;

    fn check(&self, ctx: &Self::Context, tick: u32) -> TickerEvents;
}

bitflags! {
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub(crate) struct TickerEvents: u16 {
        /// Fire expired timers even though tasks are still ready to run.
        const FIRE_TIMERS = 1;
    }
}
